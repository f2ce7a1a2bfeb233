//! Turning model text into something storable or displayable.
//!
//! Persisted runs decode strictly and never touch the text. The question
//! path only strips code fences so the answer reads cleanly.

use serde_json::Value;

const REQUIRED_KEYS: [&str; 6] = [
    "summary",
    "graph_descriptions",
    "overall_trend",
    "health_weather_note",
    "relationships",
    "confidence_notes",
];

#[derive(Debug, Clone, PartialEq)]
pub enum Interpretation {
    /// Strict JSON decode succeeded.
    Parsed(Value),
    /// Not valid JSON. The raw text is kept by the caller untouched.
    Unparsed { error: String },
    /// Display text for the question path, fences removed.
    Raw(String),
}

impl Interpretation {
    pub fn into_structured(self) -> Option<Value> {
        match self {
            Interpretation::Parsed(v) => Some(v),
            _ => None,
        }
    }
}

/// Strict decode: no trimming of fences, no repair. Never fails.
pub fn interpret_strict(raw: &str) -> Interpretation {
    match serde_json::from_str::<Value>(raw) {
        Ok(v) => Interpretation::Parsed(v),
        Err(e) => Interpretation::Unparsed {
            error: e.to_string(),
        },
    }
}

pub fn interpret_answer(raw: &str) -> Interpretation {
    Interpretation::Raw(clean_answer(raw))
}

pub fn clean_answer(raw: &str) -> String {
    raw.trim()
        .replace("```json", "")
        .replace("```", "")
        .trim()
        .to_string()
}

/// Deviations from the six-panel contract. Informational only.
pub fn contract_warnings(value: &Value) -> Vec<String> {
    let Some(obj) = value.as_object() else {
        return vec!["top-level value is not an object".to_string()];
    };

    let mut out = Vec::new();
    for key in REQUIRED_KEYS {
        if !obj.contains_key(key) {
            out.push(format!("missing key: {}", key));
        }
    }

    if let Some(panels) = obj.get("graph_descriptions").and_then(Value::as_array) {
        if panels.len() != crate::prompts::PANEL_TITLES.len() {
            out.push(format!(
                "expected {} graph descriptions, got {}",
                crate::prompts::PANEL_TITLES.len(),
                panels.len()
            ));
        }
    }

    if let Some(rels) = obj.get("relationships").and_then(Value::as_array) {
        for (i, rel) in rels.iter().enumerate() {
            match rel.get("confidence").and_then(Value::as_f64) {
                Some(c) if (0.0..=1.0).contains(&c) => {}
                Some(c) => out.push(format!("relationships[{}].confidence {} outside [0,1]", i, c)),
                None => out.push(format!("relationships[{}] has no numeric confidence", i)),
            }
        }
    }
    out
}

/// First panel whose `graph_title` contains `needle`, case-insensitively.
pub fn find_panel<'a>(value: &'a Value, needle: &str) -> Option<&'a Value> {
    let needle = needle.to_lowercase();
    value
        .get("graph_descriptions")?
        .as_array()?
        .iter()
        .find(|p| {
            p.get("graph_title")
                .and_then(Value::as_str)
                .map(|t| t.to_lowercase().contains(&needle))
                .unwrap_or(false)
        })
}

pub fn panel_titles(value: &Value) -> Vec<String> {
    value
        .get("graph_descriptions")
        .and_then(Value::as_array)
        .map(|panels| {
            panels
                .iter()
                .filter_map(|p| p.get("graph_title").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}
