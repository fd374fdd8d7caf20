use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use crate::pipeline::ConcurrencyMode;
use crate::secrets::KeySource;

/// Upper bound for the per-job step worker pool.
pub const MAX_WORKERS: usize = 8;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub version: String,
    #[serde(default = "default_output_folder")]
    pub output_folder: String,
    /// Either a bare code (`"FR"`) or `"<code> - <name>"` as shown in pickers.
    #[serde(default = "default_language")]
    pub default_language: String,
    #[serde(default)]
    pub default_service: TranslationService,
    #[serde(default)]
    pub use_gpu: bool,
    #[serde(default = "default_whisper_model")]
    pub whisper_model: String,
    #[serde(default)]
    pub concurrency: ConcurrencySetting,
    #[serde(default = "default_worker_count")]
    pub worker_count: usize,
    /// Subtitle cues translated concurrently; `1` translates in serial batches.
    #[serde(default = "default_translation_workers")]
    pub translation_workers: usize,
    #[serde(default = "default_deepl_key")]
    pub deepl: KeySource,
    #[serde(default = "default_openai_key")]
    pub openai: KeySource,
}

fn default_output_folder() -> String {
    "output".to_string()
}

fn default_language() -> String {
    "FR - French".to_string()
}

fn default_whisper_model() -> String {
    "large-v3-turbo".to_string()
}

fn default_translation_workers() -> usize {
    1
}

fn default_deepl_key() -> KeySource {
    KeySource::from_env_var("DEEPL_API_KEY")
}

fn default_openai_key() -> KeySource {
    KeySource::from_env_var("OPENAI_API_KEY")
}

pub fn default_worker_count() -> usize {
    num_cpus::get().clamp(1, MAX_WORKERS)
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            output_folder: default_output_folder(),
            default_language: default_language(),
            default_service: TranslationService::default(),
            use_gpu: false,
            whisper_model: default_whisper_model(),
            concurrency: ConcurrencySetting::default(),
            worker_count: default_worker_count(),
            translation_workers: default_translation_workers(),
            deepl: default_deepl_key(),
            openai: default_openai_key(),
        }
    }
}

impl Config {
    /// Language code portion of `default_language` (`"FR - French"` -> `"FR"`).
    pub fn default_language_code(&self) -> &str {
        language_code(&self.default_language)
    }

    pub fn output_path(&self) -> PathBuf {
        PathBuf::from(&self.output_folder)
    }

    pub fn concurrency_mode(&self) -> ConcurrencyMode {
        match self.concurrency {
            ConcurrencySetting::Sequential => ConcurrencyMode::Sequential,
            ConcurrencySetting::Parallel => {
                ConcurrencyMode::BoundedParallel(self.worker_count.clamp(1, MAX_WORKERS))
            }
        }
    }
}

/// Strips a `" - <name>"` suffix from a language label.
pub fn language_code(label: &str) -> &str {
    label.split(" - ").next().unwrap_or("").trim()
}

/// Codes end up in file names, so only `A-Z a-z 0-9 - _` are allowed
/// (`FR`, `pt-BR`, `zh_Hans`).
pub fn is_valid_language_code(code: &str) -> bool {
    !code.is_empty()
        && code
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ConcurrencySetting {
    #[default]
    Parallel,
    Sequential,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum TranslationService {
    #[serde(rename = "deepl")]
    DeepL,
    #[default]
    #[serde(rename = "chatgpt")]
    ChatGpt,
    O3,
}

impl fmt::Display for TranslationService {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TranslationService::DeepL => write!(f, "DeepL"),
            TranslationService::ChatGpt => write!(f, "ChatGPT"),
            TranslationService::O3 => write!(f, "O3"),
        }
    }
}

impl FromStr for TranslationService {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "deepl" => Ok(TranslationService::DeepL),
            "chatgpt" | "openai" | "gpt" => Ok(TranslationService::ChatGpt),
            "o3" | "o3-mini" => Ok(TranslationService::O3),
            other => Err(format!("Unknown translation service: {}", other)),
        }
    }
}
