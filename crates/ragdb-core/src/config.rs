//! Layered configuration and path helpers.
//!
//! Uses Figment to merge `config.toml` + `config.<env>.toml` + `APP_*` env vars
//! (nested keys separated by `__`, e.g. `APP_RETRIEVAL__TOP_K=8`). Provides
//! helpers to expand `~` and `${VAR}` and to resolve relative paths against a
//! known base directory.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

pub struct Config {
    figment: Figment,
    env_name: String,
}

impl Config {
    pub fn load() -> anyhow::Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        figment = figment.merge(Env::prefixed("APP_").split("__"));

        let config = Self { figment, env_name };
        config.validate_for_env()?;
        Ok(config)
    }

    pub fn from_figment(figment: Figment) -> Self {
        Self { figment, env_name: "custom".to_string() }
    }

    pub fn env_name(&self) -> &str {
        &self.env_name
    }

    pub fn get<T>(&self, key: &str) -> anyhow::Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| anyhow::anyhow!("Failed to get '{}': {}", key, e))
    }

    pub fn settings(&self) -> anyhow::Result<Settings> {
        self.figment
            .extract()
            .map_err(|e| anyhow::anyhow!("Failed to read settings: {}", e))
    }

    fn validate_for_env(&self) -> anyhow::Result<()> {
        let settings = self.settings()?;
        if settings.retrieval.top_k == 0 {
            anyhow::bail!("retrieval.top_k must be a positive integer");
        }
        match self.env_name.as_str() {
            "prod" | "production" if settings.embedding.fake => {
                anyhow::bail!("embedding.fake must not be enabled in production")
            }
            _ => Ok(()),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub data: DataSettings,
    #[serde(default)]
    pub retrieval: RetrievalSettings,
    #[serde(default)]
    pub embedding: EmbeddingSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DataSettings {
    /// Directory holding one sub-directory of artifacts per subject.
    pub dir: String,
    /// Path of the corpus registry JSON file.
    pub registry: String,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self { dir: "data/processed".to_string(), registry: "data/corpus_registry.json".to_string() }
    }
}

impl DataSettings {
    pub fn data_dir(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.dir)
    }

    pub fn registry_path(&self, base: &Path) -> PathBuf {
        resolve_with_base(base, &self.registry)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalSettings {
    pub top_k: usize,
    pub strategy: StrategyConfig,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self { top_k: 5, strategy: StrategyConfig::default() }
    }
}

/// Describes which retriever graph to build.
///
/// `kind` is kept as a string so an unknown `type` surfaces as a
/// configuration error from the factory rather than a parse failure here.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StrategyConfig {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub subject: Option<String>,
    #[serde(default)]
    pub dense_subject: Option<String>,
    #[serde(default)]
    pub sparse_subject: Option<String>,
    #[serde(default)]
    pub alpha: Option<f32>,
    #[serde(default)]
    pub embed_timeout_ms: Option<u64>,
    #[serde(default)]
    pub dense_scores: DenseScoreMode,
}

impl Default for StrategyConfig {
    fn default() -> Self {
        Self {
            kind: "dense".to_string(),
            subject: None,
            dense_subject: None,
            sparse_subject: None,
            alpha: None,
            embed_timeout_ms: None,
            dense_scores: DenseScoreMode::Raw,
        }
    }
}

impl StrategyConfig {
    pub fn dense(subject: &str) -> Self {
        Self { subject: Some(subject.to_string()), ..Self::default() }
    }

    pub fn hybrid(subject: &str, alpha: f32) -> Self {
        Self { kind: "hybrid".to_string(), subject: Some(subject.to_string()), alpha: Some(alpha), ..Self::default() }
    }
}

/// How dense similarities enter hybrid fusion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DenseScoreMode {
    /// Fuse the raw cosine similarity, which may be negative.
    #[default]
    Raw,
    /// Clamp dense similarities into [0, 1] before fusing.
    Clip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    /// Use the deterministic hashing embedder instead of a model.
    pub fake: bool,
    pub dim: usize,
    pub max_len: usize,
    pub model_dir: Option<String>,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self { fake: false, dim: 1024, max_len: 512, model_dir: None }
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}

/// Resolve a possibly relative path against a given base directory after expansion.
/// If `p` is absolute, it's returned as-is; otherwise `base.join(p)` is returned.
pub fn resolve_with_base<S: AsRef<str>>(base: &Path, p: S) -> PathBuf {
    let p = expand_path(p);
    if p.is_absolute() { p } else { base.join(p) }
}
