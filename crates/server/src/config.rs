use pipeline::services::LlmConfig;
use pipeline::PipelineConfig;
use std::time::Duration;

/// Server configuration resolved from the environment.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    pub llm: LlmConfig,
    pub pipeline: PipelineConfig,
    /// Base URL of the external OCR/ASR service, if one is configured.
    pub extractor_url: Option<String>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        let mut llm = LlmConfig {
            api_key: std::env::var("OPENROUTER_API_KEY").unwrap_or_default(),
            ..Default::default()
        };
        if let Ok(base_url) = std::env::var("LLM_BASE_URL") {
            llm.base_url = base_url;
        }
        if let Ok(model) = std::env::var("LLM_MODEL") {
            llm.model = model;
        }

        let mut pipeline = PipelineConfig::default();
        if let Some(timeout) = env_parse::<u64>("STAGE_TIMEOUT_SECS") {
            pipeline.stage_timeout = Duration::from_secs(timeout);
        }
        if let Some(threshold) = env_parse::<f32>("VERIFIER_CONFIDENCE_THRESHOLD") {
            pipeline.verifier_confidence_threshold = threshold;
        }
        if let Some(threshold) = env_parse::<f32>("EXTRACTION_CONFIDENCE_THRESHOLD") {
            pipeline.extraction_confidence_threshold = threshold;
        }

        Self {
            host: std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string()),
            port: env_parse("PORT").unwrap_or(3001),
            database_url: std::env::var("DATABASE_URL")
                .unwrap_or_else(|_| "sqlite:solver.db?mode=rwc".to_string()),
            llm,
            pipeline,
            extractor_url: std::env::var("EXTRACTOR_URL").ok(),
        }
    }

    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    std::env::var(key).ok().and_then(|v| v.parse().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bind_addr() {
        let config = ServerConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            database_url: "sqlite::memory:".to_string(),
            llm: LlmConfig::default(),
            pipeline: PipelineConfig::default(),
            extractor_url: None,
        };
        assert_eq!(config.bind_addr(), "127.0.0.1:8080");
    }
}
