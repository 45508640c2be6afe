//! Session configuration loaded from `<data_dir>/courier_config.json`.
//!
//! Every key is optional and falls back to its default on a missing file,
//! malformed JSON, or a wrong-typed value. Config never fails construction.

use std::path::Path;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    /// Network environment handed to the messaging client.
    pub env: String,
    /// Cap on how many messages a history fetch requests. `None` fetches the
    /// full history.
    pub history_limit: Option<u32>,
    /// Auto-select the most recent conversation after the bulk load when
    /// nothing is selected.
    pub auto_select_first: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            env: "production".to_string(),
            history_limit: None,
            auto_select_first: true,
        }
    }
}

pub fn load_session_config(data_dir: &str) -> SessionConfig {
    let path = Path::new(data_dir).join("courier_config.json");
    let Ok(bytes) = std::fs::read(&path) else {
        return SessionConfig::default();
    };

    let Ok(v) = serde_json::from_slice::<serde_json::Value>(&bytes) else {
        tracing::warn!(path = %path.display(), "unparseable config; using defaults");
        return SessionConfig::default();
    };
    let Some(obj) = v.as_object() else {
        return SessionConfig::default();
    };

    let defaults = SessionConfig::default();

    let env = obj
        .get("env")
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
        .unwrap_or(defaults.env);

    let history_limit = obj
        .get("history_limit")
        .and_then(|v| v.as_u64())
        .and_then(|n| u32::try_from(n).ok());

    let auto_select_first = obj
        .get("auto_select_first")
        .and_then(|v| v.as_bool())
        .unwrap_or(defaults.auto_select_first);

    SessionConfig {
        env,
        history_limit,
        auto_select_first,
    }
}
