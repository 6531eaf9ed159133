use std::fs;
use std::path::Path;
use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::ConfigError;
use crate::relay::DEFAULT_RELAY_WARMUP;

pub const DEFAULT_CONFIG_PATH: &str = "config/group-chat.json";

/// Settings read from the optional JSON config file. Every field may be left
/// out; command line flags take precedence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AppConfig {
    pub bootstrap_nodes: Vec<String>,
    pub nickname: Option<String>,
    pub relay_warmup_secs: Option<u64>,
}

impl AppConfig {
    pub fn relay_warmup(&self) -> Duration {
        self.relay_warmup_secs
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_RELAY_WARMUP)
    }
}

/// Reads the config file at `path`. A missing or unusable file yields the
/// defaults; a field with a bad value is dropped on its own.
pub fn load_config(path: &str) -> AppConfig {
    let path = Path::new(path);
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) => {
            log::info!("No config file at {} ({err}); using defaults", path.display());
            return AppConfig::default();
        }
    };

    match parse_config(&content) {
        Ok((config, rejected)) => {
            for problem in rejected {
                log::warn!("{}: {problem}", path.display());
            }
            config
        }
        Err(err) => {
            log::warn!("Ignoring config file {}: {err}", path.display());
            AppConfig::default()
        }
    }
}

/// Parses a config document field by field. Returns the config plus one
/// message per field that was ignored, naming the field.
pub fn parse_config(content: &str) -> Result<(AppConfig, Vec<String>), ConfigError> {
    let Value::Object(mut fields) = serde_json::from_str::<Value>(content)? else {
        return Err(ConfigError::NotAnObject);
    };

    let mut config = AppConfig::default();
    let mut rejected = Vec::new();
    take_field(&mut fields, "bootstrap_nodes", &mut config.bootstrap_nodes, &mut rejected);
    take_field(&mut fields, "nickname", &mut config.nickname, &mut rejected);
    take_field(&mut fields, "relay_warmup_secs", &mut config.relay_warmup_secs, &mut rejected);

    for unknown in fields.keys() {
        rejected.push(format!("unknown field `{unknown}` ignored"));
    }
    Ok((config, rejected))
}

fn take_field<T: DeserializeOwned>(
    fields: &mut Map<String, Value>,
    name: &str,
    slot: &mut T,
    rejected: &mut Vec<String>,
) {
    let Some(value) = fields.remove(name) else {
        return;
    };
    match serde_json::from_value(value) {
        Ok(parsed) => *slot = parsed,
        Err(err) => rejected.push(format!("field `{name}` ignored: {err}")),
    }
}

/// Bootstrap entries from the command line first, then the config file,
/// without repeats.
pub fn merge_bootstrap(cli: &[String], config: &[String]) -> Vec<String> {
    let mut merged: Vec<String> = Vec::with_capacity(cli.len() + config.len());
    for entry in cli.iter().chain(config) {
        if !merged.contains(entry) {
            merged.push(entry.clone());
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let config = load_config(path.to_str().unwrap());

        assert_eq!(config, AppConfig::default());
        assert_eq!(config.relay_warmup(), DEFAULT_RELAY_WARMUP);
    }

    #[test]
    fn reads_partial_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, r#"{ "nickname": "carol", "relay_warmup_secs": 5 }"#).unwrap();

        let config = load_config(path.to_str().unwrap());
        assert_eq!(config.nickname.as_deref(), Some("carol"));
        assert!(config.bootstrap_nodes.is_empty());
        assert_eq!(config.relay_warmup(), Duration::from_secs(5));
    }

    #[test]
    fn malformed_file_gives_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        fs::write(&path, "{ bootstrap_nodes: ").unwrap();

        assert_eq!(load_config(path.to_str().unwrap()), AppConfig::default());
    }

    #[test]
    fn bad_field_is_dropped_and_named() {
        let (config, rejected) =
            parse_config(r#"{ "nickname": 7, "relay_warmup_secs": 5, "colour": "red" }"#).unwrap();

        assert_eq!(config.nickname, None);
        assert_eq!(config.relay_warmup(), Duration::from_secs(5));
        assert_eq!(rejected.len(), 2);
        assert!(rejected[0].starts_with("field `nickname` ignored"));
        assert_eq!(rejected[1], "unknown field `colour` ignored");
    }

    #[test]
    fn non_object_document_is_rejected() {
        assert_matches!(parse_config("[]"), Err(ConfigError::NotAnObject));
        assert_matches!(parse_config("{ bootstrap_nodes: "), Err(ConfigError::Syntax(_)));
        assert_eq!(parse_config("{}").unwrap(), (AppConfig::default(), Vec::new()));
    }

    #[test]
    fn merge_keeps_cli_first_and_drops_repeats() {
        let cli = vec!["/a".to_string(), "/b".to_string()];
        let config = vec!["/b".to_string(), "/c".to_string()];
        assert_eq!(merge_bootstrap(&cli, &config), vec!["/a", "/b", "/c"]);
    }
}
