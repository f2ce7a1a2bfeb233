//! Prompt templates sent alongside the captured dashboard image.
//!
//! The dashboard template pins the model to a fixed JSON contract: every
//! number must be read off the image, unreadable values use literal fallback
//! phrases and categorical fields come from closed option sets.

use crate::model::RunContext;

/// Bump whenever [`dashboard_prompt`] changes so stored records stay auditable.
pub const DASHBOARD_PROMPT_VERSION: &str = "v8-detailed-6graphs-15m";
pub const QUESTION_PROMPT_VERSION: &str = "q1-freeform";

/// Panel titles the dashboard template asks the model to describe, in order.
pub const PANEL_TITLES: [&str; 6] = [
    "PM2.5 & PM10 Over Time",
    "Temperature Over Time",
    "Humidity Over Time",
    "AQI Levels (Bar)",
    "Latest Pollutant Distribution",
    "Change Comparison (Latest vs Previous)",
];

/// Which template a single model call should use.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptSpec {
    /// Six-panel JSON contract used by persisted runs.
    Dashboard,
    /// Free-form answer to one user question. Applies to one call only.
    Question(String),
}

impl PromptSpec {
    pub fn version(&self) -> &'static str {
        match self {
            PromptSpec::Dashboard => DASHBOARD_PROMPT_VERSION,
            PromptSpec::Question(_) => QUESTION_PROMPT_VERSION,
        }
    }

    pub fn render(&self, context: &RunContext) -> String {
        match self {
            PromptSpec::Dashboard => dashboard_prompt(context),
            PromptSpec::Question(q) => question_prompt(q),
        }
    }
}

pub fn dashboard_prompt(context: &RunContext) -> String {
    let mut prompt = DASHBOARD_TEMPLATE.trim().to_string();
    if !context.is_empty() {
        prompt.push_str("\n\nTRUSTED CONTEXT (from the capture harness, not from the image):\n");
        for (k, v) in context {
            let rendered = match v {
                serde_json::Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            prompt.push_str(&format!("- {}: {}\n", k, rendered));
        }
        prompt = prompt.trim_end().to_string();
    }
    prompt
}

pub fn question_prompt(question: &str) -> String {
    format!(
        r#"You are analyzing ONE screenshot of a weather/air quality dashboard.
User question: "{}"

Answer the question based ONLY on what is visible in the screenshot.
Focus on recent data (right side of lines/bars).
Use exact numbers if readable, or approximate ranges.
Be concise, natural, and accurate."#,
        question.trim()
    )
}

const DASHBOARD_TEMPLATE: &str = r#"
You are a STRICT visual analyst examining EXACTLY ONE screenshot of a weather/air quality dashboard.

MANDATORY RULES — VIOLATE ANY AND YOUR RESPONSE IS INVALID:

1. There are EXACTLY SIX graphs. Describe EACH one separately and accurately:
   - Graph 1: "PM2.5 & PM10 Over Time" (orange PM2.5 line, green PM10 line)
   - Graph 2: "Temperature Over Time" (red temperature line)
   - Graph 3: "Humidity Over Time" (blue humidity line)
   - Graph 4: "AQI Levels (Bar)" (colored bars)
   - Graph 5: "Latest Pollutant Distribution" (pie chart with segments for PM2.5, PM10, O3, NO2, SO2, CO)
   - Graph 6: "Change Comparison (Latest vs Previous)" (bar chart with % change bars)

2. For each graph, report ONLY what is CLEARLY VISIBLE:
   - Read exact numbers from right side, legend, tooltip, pie labels, or bar text
   - If lines/bars/pie segments are flat/constant → MUST say "completely flat — no visible change"
   - If number/label is too small/unreadable → say "value/label too small to read accurately"
   - NEVER guess, estimate, invent, or assume any number, range, trend, or percentage

3. Summary MUST mention ALL SIX graphs — no skipping any
4. STRICTLY FORBIDDEN: cryptocurrency, coins, BTC, ETH, trading, disease, cases, deaths, outbreaks

Return STRICT JSON ONLY — no extra text, no markdown, no explanations.

{
  "summary": "3-5 sentences describing ALL SIX graphs. Report only visible values/trends (or 'flat/no change'). Include health/weather note only if justified by visible data.",
  "graph_descriptions": [
    {
      "graph_title": "PM2.5 & PM10 Over Time",
      "visible_recent_values": "exact numbers (e.g. PM2.5 = 107, PM10 = 36) or 'too small to read'",
      "trend": "completely flat|up|down|unclear",
      "recent_change_3_5min": "exact observation or 'no change visible'"
    },
    {
      "graph_title": "Temperature Over Time",
      "visible_recent_values": "exact numbers (e.g. Temp = 23°C) or 'too small to read'",
      "trend": "completely flat|up|down|unclear",
      "recent_change_3_5min": "exact observation or 'no change visible'"
    },
    {
      "graph_title": "Humidity Over Time",
      "visible_recent_values": "exact numbers (e.g. Humidity = 57%) or 'too small to read'",
      "trend": "completely flat|up|down|unclear",
      "recent_change_3_5min": "exact observation or 'no change visible'"
    },
    {
      "graph_title": "AQI Levels (Bar)",
      "visible_recent_value": "exact AQI number (e.g. 107) or 'too small to read'",
      "trend": "completely flat|up|down|unclear",
      "recent_change_3_5min": "exact observation or 'no change visible'",
      "health_risk": "Good|Moderate|Unhealthy for sensitive groups|Unhealthy|Very unhealthy|Hazardous — based ONLY on visible AQI number"
    },
    {
      "graph_title": "Latest Pollutant Distribution",
      "visible_values": "report main segments and percentages (e.g. PM2.5 40%, PM10 30%) or 'too small to read'",
      "dominant_pollutant": "name of largest slice or 'unclear'",
      "description": "short observation or 'no change visible'"
    },
    {
      "graph_title": "Change Comparison (Latest vs Previous)",
      "visible_changes": "report exact % values for each bar (e.g. PM2.5 +0%, AQI -2%) or 'too small to read'",
      "overall_change_trend": "positive|negative|mixed|flat|unclear",
      "description": "short observation of which metrics changed most"
    }
  ],
  "overall_trend": "completely flat|up|down|mixed|unclear",
  "health_weather_note": "1-2 sentences based ONLY on visible numbers (e.g. 'PM2.5 at 107 indicates unhealthy air')",
  "relationships": [
    {"statement": "short observation relating two or more graphs", "confidence": 0-1}
  ],
  "confidence_notes": ["list only real uncertainties, e.g. 'Only few data points', 'All lines flat', 'Labels too small to read exact numbers'"]
}
"#;
