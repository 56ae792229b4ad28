use serde::Deserialize;

/// Root application configuration. Loaded from environment variables
/// with the prefix `OUTREACH__` and an optional `outreach.toml` file.
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    #[serde(default = "default_node_id")]
    pub node_id: String,
    #[serde(default)]
    pub api: ApiConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
    #[serde(default)]
    pub sequences: SequencesConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

/// What a `FAILED` activity report does to its assignment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FailurePolicy {
    /// Move on to the next step, same as a completed activity.
    #[default]
    Advance,
    /// Keep the current step so the next tick schedules it again.
    Retry,
    /// Stop the assignment.
    Stop,
}

// ─── Sequence Engine Config ─────────────────────────────────────────────
#[derive(Debug, Clone, Deserialize)]
pub struct SequencesConfig {
    #[serde(default)]
    pub failure_policy: FailurePolicy,
    #[serde(default = "default_max_prospects_per_assign")]
    pub max_prospects_per_assign: usize,
    #[serde(default = "default_recent_assignments_limit")]
    pub recent_assignments_limit: usize,
    #[serde(default)]
    pub seed_demo_data: bool,
}

fn default_node_id() -> String {
    "outreach-01".to_string()
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_metrics_enabled() -> bool {
    true
}
fn default_metrics_port() -> u16 {
    9091
}
fn default_max_prospects_per_assign() -> usize {
    1000
}
fn default_recent_assignments_limit() -> usize {
    10
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            port: default_metrics_port(),
        }
    }
}

impl Default for SequencesConfig {
    fn default() -> Self {
        Self {
            failure_policy: FailurePolicy::default(),
            max_prospects_per_assign: default_max_prospects_per_assign(),
            recent_assignments_limit: default_recent_assignments_limit(),
            seed_demo_data: false,
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            node_id: default_node_id(),
            api: ApiConfig::default(),
            metrics: MetricsConfig::default(),
            sequences: SequencesConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration from environment variables and optional config file.
    pub fn load() -> Result<Self, config::ConfigError> {
        let builder = config::Config::builder()
            .add_source(config::File::with_name("outreach").required(false))
            .add_source(
                config::Environment::with_prefix("OUTREACH")
                    .separator("__")
                    .try_parsing(true),
            );

        let config = builder.build()?;
        config.try_deserialize()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::default();
        assert_eq!(config.api.http_port, 8080);
        assert_eq!(config.sequences.failure_policy, FailurePolicy::Advance);
        assert_eq!(config.sequences.recent_assignments_limit, 10);
        assert!(!config.sequences.seed_demo_data);
    }

    #[test]
    fn test_partial_document_fills_defaults() {
        let config: AppConfig = serde_json::from_value(serde_json::json!({
            "sequences": { "failure_policy": "retry" }
        }))
        .unwrap();
        assert_eq!(config.sequences.failure_policy, FailurePolicy::Retry);
        assert_eq!(config.sequences.max_prospects_per_assign, 1000);
        assert_eq!(config.node_id, "outreach-01");
    }
}
