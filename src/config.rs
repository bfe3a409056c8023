//! Runtime configuration utilities for labnorm.

use std::{
    env, fmt,
    path::{Path, PathBuf},
    str::FromStr,
};

use anyhow::{bail, Context};
use clap::ValueEnum;
use serde::Deserialize;

/// Remote classification provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum AiProvider {
    /// Alibaba Cloud DashScope (OpenAI-compatible mode).
    Aliyun,
    /// Zhipu GLM open platform.
    Zhipu,
    /// Remote classification disabled.
    None,
}

impl fmt::Display for AiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Aliyun => "aliyun",
            Self::Zhipu => "zhipu",
            Self::None => "none",
        };
        f.write_str(name)
    }
}

impl FromStr for AiProvider {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "aliyun" | "dashscope" => Ok(Self::Aliyun),
            "zhipu" | "glm" => Ok(Self::Zhipu),
            "none" | "off" | "" => Ok(Self::None),
            other => bail!("unknown AI_SERVICE_PROVIDER {other:?}"),
        }
    }
}

/// How indicators are pulled out of report text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionStrategy {
    /// Fixed regular-expression rules per report type.
    Rules,
    /// Structured extraction delegated to the configured chat endpoint.
    Delegated,
}

impl FromStr for ExtractionStrategy {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" | "regex" => Ok(Self::Rules),
            "delegated" | "ai" => Ok(Self::Delegated),
            other => bail!("unknown EXTRACTION_STRATEGY {other:?}"),
        }
    }
}

/// Application configuration resolved from `.env` and defaults.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Lexical confidence below which a term is escalated to the classifier.
    pub ai_normalization_threshold: f64,
    /// Which remote classifier transport to use.
    pub ai_provider: AiProvider,
    pub aliyun_api_key: Option<String>,
    pub aliyun_model: String,
    pub aliyun_base_url: String,
    pub zhipu_api_key: Option<String>,
    pub zhipu_model: String,
    pub zhipu_base_url: String,
    /// Upper bound on a single classifier or extraction call.
    pub ai_request_timeout_secs: u64,
    pub extraction_strategy: ExtractionStrategy,
    /// Optional JSON file of `{canonical: [variants]}` merged into the dictionary.
    pub extra_terms_path: Option<PathBuf>,
    /// Root folder for written artefacts.
    pub outputs_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ai_normalization_threshold: 0.5,
            ai_provider: AiProvider::Zhipu,
            aliyun_api_key: None,
            aliyun_model: "qwen-turbo".to_string(),
            aliyun_base_url: "https://dashscope.aliyuncs.com/compatible-mode/v1".to_string(),
            zhipu_api_key: None,
            zhipu_model: "glm-4-flash".to_string(),
            zhipu_base_url: "https://open.bigmodel.cn/api/paas/v4".to_string(),
            ai_request_timeout_secs: 60,
            extraction_strategy: ExtractionStrategy::Rules,
            extra_terms_path: None,
            outputs_dir: PathBuf::from("./outputs"),
        }
    }
}

impl Settings {
    /// Load configuration from environment with reasonable defaults.
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Build settings from an arbitrary key lookup; unset keys keep defaults.
    pub fn from_lookup<F>(lookup: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut settings = Self::default();

        if let Some(raw) = lookup("AI_NORMALIZATION_THRESHOLD") {
            settings.ai_normalization_threshold = raw
                .trim()
                .parse()
                .with_context(|| format!("parsing AI_NORMALIZATION_THRESHOLD={raw:?}"))?;
        }
        if let Some(raw) = lookup("AI_SERVICE_PROVIDER") {
            settings.ai_provider = raw.parse()?;
        }
        settings.aliyun_api_key = lookup("ALIYUN_API_KEY");
        if let Some(model) = lookup("ALIYUN_MODEL") {
            settings.aliyun_model = model;
        }
        if let Some(url) = lookup("ALIYUN_BASE_URL") {
            settings.aliyun_base_url = url;
        }
        settings.zhipu_api_key = lookup("ZHIPU_API_KEY");
        if let Some(model) = lookup("ZHIPU_MODEL") {
            settings.zhipu_model = model;
        }
        if let Some(url) = lookup("ZHIPU_BASE_URL") {
            settings.zhipu_base_url = url;
        }
        if let Some(raw) = lookup("AI_REQUEST_TIMEOUT_SECS") {
            settings.ai_request_timeout_secs = raw
                .trim()
                .parse()
                .with_context(|| format!("parsing AI_REQUEST_TIMEOUT_SECS={raw:?}"))?;
        }
        if let Some(raw) = lookup("EXTRACTION_STRATEGY") {
            settings.extraction_strategy = raw.parse()?;
        }
        settings.extra_terms_path = lookup("EXTRA_TERMS_PATH")
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        if let Some(dir) = lookup("OUTPUTS_DIR") {
            settings.outputs_dir = PathBuf::from(dir);
        }

        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> anyhow::Result<()> {
        if !(0.0..=1.0).contains(&self.ai_normalization_threshold) {
            bail!(
                "AI_NORMALIZATION_THRESHOLD must lie in [0, 1], got {}",
                self.ai_normalization_threshold
            );
        }
        if self.ai_request_timeout_secs == 0 {
            bail!("AI_REQUEST_TIMEOUT_SECS must be positive");
        }
        Ok(())
    }

    /// Convenience helper for derived output path segments.
    pub fn join_output<P: AsRef<Path>>(&self, path: P) -> PathBuf {
        self.outputs_dir.join(path)
    }
}
