use std::env;
use std::str::FromStr;

use anyhow::{anyhow, bail, Context, Result};
use sota_interpreter::{EngineConfig, SubmitPolicy};

/// Application configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    pub engine: EngineConfig,

    // Logging
    pub log_json: bool,
}

impl Config {
    /// Load configuration from the environment (and `.env` if present).
    /// Every setting has a default; malformed values are errors.
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. `from_env` passes `std::env::var`.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let engine = EngineConfig::builder()
            .queue_capacity(capacity(&lookup, "SOTA_QUEUE_CAPACITY", 1024)?)
            .command_capacity(capacity(&lookup, "SOTA_COMMAND_CAPACITY", 1024)?)
            .subscriber_capacity(capacity(&lookup, "SOTA_SUBSCRIBER_CAPACITY", 256)?)
            .submit_policy(match lookup("SOTA_SUBMIT_POLICY") {
                Some(raw) => SubmitPolicy::from_str(&raw)
                    .map_err(|e| anyhow!(e))
                    .context("SOTA_SUBMIT_POLICY")?,
                None => SubmitPolicy::Block,
            })
            .recover_rules(flag(&lookup, "SOTA_RECOVER_RULES", true)?)
            .build();

        Ok(Self {
            engine,
            log_json: flag(&lookup, "SOTA_LOG_JSON", false)?,
        })
    }

    pub fn log_summary(&self) {
        tracing::info!("Config loaded:");
        tracing::info!("  SOTA_QUEUE_CAPACITY: {}", self.engine.queue_capacity);
        tracing::info!("  SOTA_COMMAND_CAPACITY: {}", self.engine.command_capacity);
        tracing::info!("  SOTA_SUBSCRIBER_CAPACITY: {}", self.engine.subscriber_capacity);
        tracing::info!("  SOTA_SUBMIT_POLICY: {}", self.engine.submit_policy);
        tracing::info!("  SOTA_RECOVER_RULES: {}", self.engine.recover_rules);
        tracing::info!("  SOTA_LOG_JSON: {}", self.log_json);
    }
}

fn capacity(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: usize,
) -> Result<usize> {
    let Some(raw) = lookup(key) else {
        return Ok(default);
    };
    let value: usize = raw
        .trim()
        .parse()
        .with_context(|| format!("{key} must be a positive integer, got '{raw}'"))?;
    if value == 0 {
        bail!("{key} must be greater than zero");
    }
    Ok(value)
}

fn flag(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: bool) -> Result<bool> {
    match lookup(key).as_deref().map(str::trim) {
        None => Ok(default),
        Some("1") | Some("true") | Some("yes") => Ok(true),
        Some("0") | Some("false") | Some("no") => Ok(false),
        Some(other) => bail!("{key} must be true or false, got '{other}'"),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = Config::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.engine.queue_capacity, 1024);
        assert_eq!(config.engine.subscriber_capacity, 256);
        assert_eq!(config.engine.submit_policy, SubmitPolicy::Block);
        assert!(config.engine.recover_rules);
        assert!(!config.log_json);
    }

    #[test]
    fn values_are_read_from_lookup() {
        let config = Config::from_lookup(lookup(&[
            ("SOTA_QUEUE_CAPACITY", "8"),
            ("SOTA_SUBMIT_POLICY", "reject"),
            ("SOTA_RECOVER_RULES", "false"),
            ("SOTA_LOG_JSON", "1"),
        ]))
        .unwrap();
        assert_eq!(config.engine.queue_capacity, 8);
        assert_eq!(config.engine.submit_policy, SubmitPolicy::Reject);
        assert!(!config.engine.recover_rules);
        assert!(config.log_json);
    }

    #[test]
    fn malformed_values_are_errors() {
        assert!(Config::from_lookup(lookup(&[("SOTA_QUEUE_CAPACITY", "lots")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SOTA_SUBSCRIBER_CAPACITY", "0")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SOTA_SUBMIT_POLICY", "drop")])).is_err());
        assert!(Config::from_lookup(lookup(&[("SOTA_LOG_JSON", "maybe")])).is_err());
    }
}
