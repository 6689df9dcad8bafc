use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::sim::TimeBase;
use crate::tuning::stopping::DEFAULT_GOAL;
use crate::tuning::{Aggressiveness, GainSet, StepInfoOptions, TuningMode};

pub const CONFIG_FILE_NAME: &str = "pidtune.toml";
pub const OPENAI_API_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_LOCAL_API_URL: &str = "http://localhost:11434/v1";
/// Models whose name starts with this prefix are served by the cloud API.
pub const CLOUD_MODEL_PREFIX: &str = "gpt";

/// Plant `numerator / denominator`, optionally followed by a pure delay.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlantConfig {
    #[serde(default = "default_plant_numerator")]
    pub numerator: Vec<f64>,
    #[serde(default = "default_plant_denominator")]
    pub denominator: Vec<f64>,
    #[serde(default)]
    pub dead_time: f64,
    #[serde(default = "default_pade_order")]
    pub pade_order: usize,
}

fn default_plant_numerator() -> Vec<f64> {
    vec![1.0]
}

fn default_plant_denominator() -> Vec<f64> {
    // (s + 1)^3
    vec![1.0, 3.0, 3.0, 1.0]
}

fn default_pade_order() -> usize {
    5
}

impl Default for PlantConfig {
    fn default() -> Self {
        Self {
            numerator: default_plant_numerator(),
            denominator: default_plant_denominator(),
            dead_time: 0.0,
            pade_order: default_pade_order(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TunerConfig {
    // Advisory model. Names starting with "gpt" go to the OpenAI API, anything
    // else to a local OpenAI-compatible server.
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default)]
    pub llm_api_url: Option<String>,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub temperature: f32,
    #[serde(default = "default_advisory_timeout_secs")]
    pub advisory_timeout_secs: u64,

    // Tuning loop
    #[serde(default)]
    pub mode: TuningMode,
    #[serde(default)]
    pub aggressiveness: Aggressiveness,
    #[serde(default = "default_goal")]
    pub goal: f64,
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,
    #[serde(default = "default_iteration_pause_ms")]
    pub iteration_pause_ms: u64,
    #[serde(default)]
    pub initial_gains: GainSet,

    // Simulation
    #[serde(default)]
    pub plant: PlantConfig,
    #[serde(default)]
    pub time_base: TimeBase,
    #[serde(default)]
    pub step_info: StepInfoOptions,

    // Output
    #[serde(default = "default_output_csv")]
    pub output_csv: String,
    #[serde(default)]
    pub report_json: Option<String>,
}

fn default_llm_model() -> String {
    "gpt-4o".to_string()
}

fn default_max_tokens() -> u32 {
    200
}

fn default_advisory_timeout_secs() -> u64 {
    60
}

fn default_goal() -> f64 {
    DEFAULT_GOAL
}

fn default_max_iterations() -> usize {
    50
}

fn default_iteration_pause_ms() -> u64 {
    1000
}

fn default_output_csv() -> String {
    "pidtune_history.csv".to_string()
}

impl Default for TunerConfig {
    fn default() -> Self {
        Self {
            llm_model: default_llm_model(),
            llm_api_url: None,
            llm_api_key: None,
            max_tokens: default_max_tokens(),
            temperature: 0.0,
            advisory_timeout_secs: default_advisory_timeout_secs(),
            mode: TuningMode::default(),
            aggressiveness: Aggressiveness::default(),
            goal: default_goal(),
            max_iterations: default_max_iterations(),
            iteration_pause_ms: default_iteration_pause_ms(),
            initial_gains: GainSet::default(),
            plant: PlantConfig::default(),
            time_base: TimeBase::default(),
            step_info: StepInfoOptions::default(),
            output_csv: default_output_csv(),
            report_json: None,
        }
    }
}

impl TunerConfig {
    /// Get the directory containing the executable
    fn get_base_dir() -> PathBuf {
        match std::env::current_exe() {
            Ok(exe_path) => exe_path
                .parent()
                .map(|p| p.to_path_buf())
                .unwrap_or_else(|| PathBuf::from(".")),
            Err(_) => PathBuf::from("."),
        }
    }

    /// Get the path to the config file (relative to executable)
    pub fn config_path() -> PathBuf {
        Self::get_base_dir().join(CONFIG_FILE_NAME)
    }

    /// Load an explicit config file. Unlike [`TunerConfig::load`], a missing
    /// or malformed file is an error.
    pub fn load_from(path: &Path) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;
        let config = toml::from_str::<TunerConfig>(&contents)
            .with_context(|| format!("Failed to parse config file {:?}", path))?;
        tracing::info!("Loaded config from {:?}", path);
        Ok(config)
    }

    /// Load config from pidtune.toml (next to executable), falling back to
    /// defaults + environment variables.
    pub fn load() -> Self {
        let path = Self::config_path();

        if let Ok(contents) = fs::read_to_string(&path) {
            match toml::from_str::<TunerConfig>(&contents) {
                Ok(config) => {
                    tracing::info!("Loaded config from {:?}", path);
                    return config;
                }
                Err(e) => {
                    tracing::error!("Failed to parse {:?}: {}", path, e);
                }
            }
        }

        tracing::debug!("No config file found, using defaults + env vars");
        Self::from_env()
    }

    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();

        if let Some(model) = lookup("PIDTUNE_MODEL") {
            if !model.trim().is_empty() {
                config.llm_model = model;
            }
        }

        if let Some(mode) = lookup("PIDTUNE_MODE") {
            match mode.parse() {
                Ok(mode) => config.mode = mode,
                Err(e) => tracing::warn!("Ignoring PIDTUNE_MODE: {}", e),
            }
        }

        if let Some(level) = lookup("PIDTUNE_AGGRESSIVENESS") {
            match level.parse() {
                Ok(level) => config.aggressiveness = level,
                Err(e) => tracing::warn!("Ignoring PIDTUNE_AGGRESSIVENESS: {}", e),
            }
        }

        if let Some(goal) = lookup("PIDTUNE_GOAL") {
            if let Ok(goal) = goal.parse() {
                config.goal = goal;
            }
        }

        if let Some(max) = lookup("PIDTUNE_MAX_ITERATIONS") {
            if let Ok(max) = max.parse() {
                config.max_iterations = max;
            }
        }

        if let Some(pause) = lookup("PIDTUNE_PAUSE_MS") {
            if let Ok(pause) = pause.parse() {
                config.iteration_pause_ms = pause;
            }
        }

        config
    }

    pub fn iteration_pause(&self) -> Duration {
        Duration::from_millis(self.iteration_pause_ms)
    }

    pub fn advisory_timeout(&self) -> Duration {
        Duration::from_secs(self.advisory_timeout_secs)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AdvisoryBackend {
    Cloud,
    Local,
}

/// Where advisory requests go and how they authenticate. Resolved once per run.
#[derive(Debug, Clone, PartialEq)]
pub struct AdvisoryEndpoint {
    pub backend: AdvisoryBackend,
    pub api_url: String,
    pub api_key: String,
}

impl AdvisoryEndpoint {
    pub fn backend_for_model(model: &str) -> AdvisoryBackend {
        if model.starts_with(CLOUD_MODEL_PREFIX) {
            AdvisoryBackend::Cloud
        } else {
            AdvisoryBackend::Local
        }
    }

    pub fn resolve(config: &TunerConfig) -> Result<Self> {
        Self::resolve_with(config, |key| env::var(key).ok())
    }

    fn resolve_with(config: &TunerConfig, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |v: Option<String>| v.filter(|s| !s.trim().is_empty());

        match Self::backend_for_model(&config.llm_model) {
            AdvisoryBackend::Cloud => {
                let api_key = non_empty(config.llm_api_key.clone())
                    .or_else(|| non_empty(lookup("OPENAI_API_KEY")))
                    .with_context(|| {
                        format!(
                            "model '{}' uses the OpenAI API but OPENAI_API_KEY is not set",
                            config.llm_model
                        )
                    })?;
                let api_url = non_empty(config.llm_api_url.clone())
                    .unwrap_or_else(|| OPENAI_API_URL.to_string());
                tracing::info!("Using OpenAI API ({})", config.llm_model);
                Ok(Self {
                    backend: AdvisoryBackend::Cloud,
                    api_url,
                    api_key,
                })
            }
            AdvisoryBackend::Local => {
                let api_url = non_empty(config.llm_api_url.clone())
                    .or_else(|| non_empty(lookup("OLLAMA_HOST")))
                    .unwrap_or_else(|| {
                        tracing::warn!(
                            "OLLAMA_HOST is not set; falling back to {}",
                            DEFAULT_LOCAL_API_URL
                        );
                        DEFAULT_LOCAL_API_URL.to_string()
                    });
                let api_key =
                    non_empty(config.llm_api_key.clone()).unwrap_or_else(|| "ollama".to_string());
                tracing::info!("Using local API ({}) at {}", config.llm_model, api_url);
                Ok(Self {
                    backend: AdvisoryBackend::Local,
                    api_url,
                    api_key,
                })
            }
        }
    }
}
