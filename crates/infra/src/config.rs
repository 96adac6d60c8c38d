use serde::Deserialize;

use reelhub_domain::execution::ExecutionMode;
use reelhub_domain::recommendations::DEFAULT_RECOMMENDATION_LIMIT;
use reelhub_domain::related::{DEFAULT_FANOUT_WIDTH, DEFAULT_RELATED_COUNT};

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub app_env: String,
    pub log_level: String,
    pub data_backend: String,
    pub surreal_endpoint: String,
    pub surreal_ns: String,
    pub surreal_db: String,
    pub surreal_user: String,
    pub surreal_pass: String,
    pub comment_execution_mode: String,
    pub related_videos_count: usize,
    pub related_fanout_width: usize,
    pub recommendation_graph: String,
    pub recommendation_limit: usize,
}

impl AppConfig {
    pub fn load() -> Result<Self, config::ConfigError> {
        dotenvy::dotenv().ok();
        let cfg = config::Config::builder()
            .set_default("app_env", "development")?
            .set_default("log_level", "info")?
            .set_default("data_backend", "memory")?
            .set_default("surreal_endpoint", "ws://127.0.0.1:8000")?
            .set_default("surreal_ns", "reelhub")?
            .set_default("surreal_db", "catalog")?
            .set_default("surreal_user", "root")?
            .set_default("surreal_pass", "root")?
            .set_default("comment_execution_mode", "inline")?
            .set_default("related_videos_count", DEFAULT_RELATED_COUNT as u64)?
            .set_default("related_fanout_width", DEFAULT_FANOUT_WIDTH as u64)?
            .set_default("recommendation_graph", "reelhub_graph")?
            .set_default("recommendation_limit", DEFAULT_RECOMMENDATION_LIMIT as u64)?
            .add_source(config::Environment::default().separator("__"))
            .build()?;
        cfg.try_deserialize()
    }

    pub fn is_production(&self) -> bool {
        self.app_env.eq_ignore_ascii_case("production")
    }

    pub fn uses_surreal(&self) -> bool {
        self.data_backend.eq_ignore_ascii_case("surreal")
    }

    pub fn execution_mode(&self) -> Result<ExecutionMode, config::ConfigError> {
        self.comment_execution_mode.parse().map_err(|err| {
            config::ConfigError::Message(format!("comment_execution_mode: {err}"))
        })
    }

    pub fn validate(&self) -> Result<(), config::ConfigError> {
        match self.data_backend.to_ascii_lowercase().as_str() {
            "memory" | "surreal" => {}
            other => {
                return Err(config::ConfigError::Message(format!(
                    "data_backend must be 'memory' or 'surreal', got '{other}'"
                )));
            }
        }
        self.execution_mode()?;
        if self.related_videos_count == 0 {
            return Err(config::ConfigError::Message(
                "related_videos_count must be at least 1".into(),
            ));
        }
        if self.related_fanout_width == 0 {
            return Err(config::ConfigError::Message(
                "related_fanout_width must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> AppConfig {
        AppConfig {
            app_env: "development".into(),
            log_level: "info".into(),
            data_backend: "memory".into(),
            surreal_endpoint: "ws://127.0.0.1:8000".into(),
            surreal_ns: "reelhub".into(),
            surreal_db: "catalog".into(),
            surreal_user: "root".into(),
            surreal_pass: "root".into(),
            comment_execution_mode: "detached".into(),
            related_videos_count: 4,
            related_fanout_width: 3,
            recommendation_graph: "reelhub_graph".into(),
            recommendation_limit: 100,
        }
    }

    #[test]
    fn sample_config_is_valid() {
        let config = sample();
        assert!(config.validate().is_ok());
        assert_eq!(config.execution_mode().unwrap(), ExecutionMode::Detached);
        assert!(!config.uses_surreal());
    }

    #[test]
    fn unknown_backend_is_rejected() {
        let mut config = sample();
        config.data_backend = "cassandra".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn zero_fanout_width_is_rejected() {
        let mut config = sample();
        config.related_fanout_width = 0;
        assert!(config.validate().is_err());
    }
}
