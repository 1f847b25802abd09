use crate::domain::error::{AppError, Result};
use crate::domain::llm_config::LLMConfig;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_PREFIX: &str = "TESTCASE_FORGE_";
pub const CONFIG_PATH_ENV: &str = "TESTCASE_FORGE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "testcase-forge.toml";

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 3001,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DatabaseConfig {
    pub path: PathBuf,
    pub max_connections: u32,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("testcase-forge.db"),
            max_connections: 4,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    Hashing,
    Remote,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProvider,
    /// Vector width of the hashing embedder.
    pub dimensions: usize,
    /// Remote embedding model; falls back to the generation model.
    pub model: Option<String>,
    /// Remote embedding endpoint; falls back to the generation endpoint.
    pub base_url: Option<String>,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::Hashing,
            dimensions: 256,
            model: None,
            base_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PipelineConfig {
    pub chunk_max_size: usize,
    pub top_k: usize,
    pub min_similarity: Option<f32>,
    pub generation_timeout_secs: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chunk_max_size: 1000,
            top_k: 5,
            min_similarity: None,
            generation_timeout_secs: 90,
        }
    }
}

impl PipelineConfig {
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub llm: LLMConfig,
    pub embedding: EmbeddingConfig,
    pub pipeline: PipelineConfig,
    pub log_level: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            llm: LLMConfig::default(),
            embedding: EmbeddingConfig::default(),
            pipeline: PipelineConfig::default(),
            log_level: "info".to_string(),
        }
    }
}

impl AppConfig {
    /// Defaults, then the TOML file, then `TESTCASE_FORGE_*` variables.
    pub fn load() -> Result<Self> {
        let path = std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        Self::from_figment(Self::figment(&path, ENV_PREFIX))
    }

    pub fn figment(toml_path: &Path, env_prefix: &str) -> Figment {
        Figment::from(Serialized::defaults(AppConfig::default()))
            .merge(Toml::file(toml_path))
            .merge(Env::prefixed(env_prefix).split("__"))
    }

    pub fn from_figment(figment: Figment) -> Result<Self> {
        let config: AppConfig = figment.extract()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        let mut errors = Vec::new();

        if self.server.port == 0 {
            errors.push("server.port must be non-zero".to_string());
        }
        if self.database.max_connections == 0 {
            errors.push("database.max_connections must be at least 1".to_string());
        }
        if self.embedding.dimensions == 0 {
            errors.push("embedding.dimensions must be at least 1".to_string());
        }
        if self.pipeline.chunk_max_size == 0 {
            errors.push("pipeline.chunk_max_size must be at least 1".to_string());
        }
        if self.pipeline.top_k == 0 {
            errors.push("pipeline.top_k must be at least 1".to_string());
        }
        if let Some(threshold) = self.pipeline.min_similarity {
            if !(-1.0..=1.0).contains(&threshold) {
                errors.push(format!(
                    "pipeline.min_similarity must be within [-1, 1], got {}",
                    threshold
                ));
            }
        }
        if self.pipeline.generation_timeout_secs == 0 {
            errors.push("pipeline.generation_timeout_secs must be at least 1".to_string());
        }
        if let Err(e) = url::Url::parse(&self.llm.base_url) {
            errors.push(format!("llm.base_url is not a valid URL: {}", e));
        }
        if let Some(base_url) = &self.embedding.base_url {
            if let Err(e) = url::Url::parse(base_url) {
                errors.push(format!("embedding.base_url is not a valid URL: {}", e));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(AppError::ConfigError(errors.join("; ")))
        }
    }

    /// Generation settings reused for remote embedding, with the embedding overrides applied.
    pub fn embedding_llm_config(&self) -> LLMConfig {
        let mut config = self.llm.clone();
        if let Some(model) = &self.embedding.model {
            config.model = model.clone();
        }
        if let Some(base_url) = &self.embedding.base_url {
            config.base_url = base_url.clone();
        }
        config
    }

    pub fn bind_address(&self) -> (String, u16) {
        (self.server.host.clone(), self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::llm_config::LLMProvider;
    use std::io::Write;

    fn write_toml(contents: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(contents.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults_when_file_missing() {
        let dir = tempfile::tempdir().unwrap();
        let config = AppConfig::from_figment(AppConfig::figment(
            &dir.path().join("absent.toml"),
            "TCF_TEST_DEFAULTS_",
        ))
        .unwrap();

        assert_eq!(config.server.port, 3001);
        assert_eq!(config.pipeline.chunk_max_size, 1000);
        assert_eq!(config.pipeline.top_k, 5);
        assert_eq!(config.pipeline.min_similarity, None);
        assert_eq!(config.pipeline.generation_timeout(), Duration::from_secs(90));
        assert_eq!(config.embedding.provider, EmbeddingProvider::Hashing);
    }

    #[test]
    fn test_toml_overrides_defaults() {
        let file = write_toml(
            r#"
log_level = "debug"

[server]
port = 8080

[llm]
provider = "Google"
base_url = "https://generativelanguage.googleapis.com/v1beta"
model = "gemini-1.5-flash"

[pipeline]
top_k = 3
min_similarity = 0.7
"#,
        );
        let config =
            AppConfig::from_figment(AppConfig::figment(file.path(), "TCF_TEST_TOML_")).unwrap();

        assert_eq!(config.server.port, 8080);
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.llm.provider, LLMProvider::Google);
        assert_eq!(config.pipeline.top_k, 3);
        assert_eq!(config.pipeline.min_similarity, Some(0.7));
        assert_eq!(config.log_level, "debug");
    }

    #[test]
    fn test_env_overrides_toml() {
        let file = write_toml("[pipeline]\ntop_k = 3\n");
        std::env::set_var("TCF_TEST_ENV_PIPELINE__TOP_K", "9");
        let config =
            AppConfig::from_figment(AppConfig::figment(file.path(), "TCF_TEST_ENV_")).unwrap();
        std::env::remove_var("TCF_TEST_ENV_PIPELINE__TOP_K");

        assert_eq!(config.pipeline.top_k, 9);
    }

    #[test]
    fn test_validation_collects_errors() {
        let file = write_toml(
            r#"
[llm]
base_url = "not a url"

[pipeline]
top_k = 0
min_similarity = 1.5
"#,
        );
        let err = AppConfig::from_figment(AppConfig::figment(file.path(), "TCF_TEST_INVALID_"))
            .unwrap_err();

        match err {
            AppError::ConfigError(msg) => {
                assert!(msg.contains("top_k"));
                assert!(msg.contains("min_similarity"));
                assert!(msg.contains("llm.base_url"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_embedding_overrides() {
        let mut config = AppConfig::default();
        config.embedding.model = Some("nomic-embed-text".to_string());
        let embedding = config.embedding_llm_config();
        assert_eq!(embedding.model, "nomic-embed-text");
        assert_eq!(embedding.base_url, config.llm.base_url);
    }
}
