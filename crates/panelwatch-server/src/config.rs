use std::env;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind: String,
    /// Run the fixed-cadence capture loop alongside the HTTP surface.
    pub scheduler: bool,
    pub log_level: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:8787".to_string(),
            scheduler: true,
            log_level: "info".to_string(),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|k| env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut cfg = Self::default();
        if let Some(v) = lookup("PANELWATCH_BIND") {
            if !v.trim().is_empty() {
                cfg.bind = v.trim().to_string();
            }
        }
        if let Some(v) = lookup("PANELWATCH_SCHEDULER") {
            match v.trim().to_ascii_lowercase().as_str() {
                "0" | "false" | "off" | "no" => cfg.scheduler = false,
                "1" | "true" | "on" | "yes" => cfg.scheduler = true,
                _ => {}
            }
        }
        if let Some(v) = lookup("PANELWATCH_LOG") {
            cfg.log_level = v;
        }
        cfg
    }
}
