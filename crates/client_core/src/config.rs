use std::fs;

use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub backend_url: String,
    pub preview_debounce_ms: u64,
    pub event_capacity: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            backend_url: "http://127.0.0.1:5000".into(),
            preview_debounce_ms: 450,
            event_capacity: 256,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct FileConfig {
    backend_url: Option<String>,
    preview_debounce_ms: Option<u64>,
    event_capacity: Option<usize>,
}

pub fn load_config() -> SessionConfig {
    let mut config = SessionConfig::default();

    if let Ok(raw) = fs::read_to_string("session.toml") {
        apply_file_config(&mut config, &raw);
    }

    if let Ok(v) = std::env::var("BACKEND_URL") {
        config.backend_url = v;
    }
    if let Ok(v) = std::env::var("PREVIEW_DEBOUNCE_MS") {
        if let Ok(parsed) = v.parse() {
            config.preview_debounce_ms = parsed;
        }
    }

    config
}

fn apply_file_config(config: &mut SessionConfig, raw: &str) {
    let Ok(file_cfg) = toml::from_str::<FileConfig>(raw) else {
        return;
    };
    if let Some(v) = file_cfg.backend_url {
        config.backend_url = v;
    }
    if let Some(v) = file_cfg.preview_debounce_ms {
        config.preview_debounce_ms = v;
    }
    if let Some(v) = file_cfg.event_capacity {
        config.event_capacity = v;
    }
}
