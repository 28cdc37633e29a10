use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config failed: {0}")]
    Read(String),
    #[error("parse config failed: {0}")]
    Parse(String),
    #[error("schema load failed: {0}")]
    SchemaLoad(String),
    #[error("schema validation failed: {0}")]
    SchemaValidation(String),
    #[error("unsupported config: {0}")]
    UnsupportedConfig(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: Server,
    #[serde(default)]
    pub catalog: Catalog,
    #[serde(default)]
    pub scoring: Scoring,
    #[serde(default)]
    pub retry: Retry,
    pub weather: Weather,
    pub generator: Generator,
    pub moderation: Moderation,
    #[serde(default)]
    pub redaction: Redaction,
    pub reports: Reports,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Server {
    pub listen_addr: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Catalog {
    /// Extra catalog merged on top of the embedded seed activities.
    #[serde(default)]
    pub extended_path: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Scoring {
    pub age_weight: f64,
    pub duration_penalty_per_minute: f64,
    pub season_bonus: f64,
    pub weather_bonus: f64,
    pub outdoor_precipitation_penalty: f64,
    pub optional_material_bonus: f64,
    pub mood_bonus: f64,
    pub topic_bonus: f64,
    pub topic_bonus_cap: f64,
    pub location_bonus: f64,
    pub effort_bonus: f64,
    pub over_budget_penalty: f64,
    pub daily_rotation_margin: f64,
    pub alternatives: usize,
}

impl Default for Scoring {
    fn default() -> Self {
        Self {
            age_weight: 3.0,
            duration_penalty_per_minute: 0.1,
            season_bonus: 1.0,
            weather_bonus: 1.25,
            outdoor_precipitation_penalty: 2.0,
            optional_material_bonus: 0.5,
            mood_bonus: 1.0,
            topic_bonus: 0.6,
            topic_bonus_cap: 2.0,
            location_bonus: 1.0,
            effort_bonus: 0.5,
            over_budget_penalty: 2.0,
            daily_rotation_margin: 0.0,
            alternatives: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Retry {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
    pub jitter_ratio: f64,
}

impl Default for Retry {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
            jitter_ratio: 0.25,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Weather {
    pub provider: String,
    #[serde(default = "default_weather_base_url")]
    pub base_url: String,
    #[serde(default = "default_latitude")]
    pub latitude: f64,
    #[serde(default = "default_longitude")]
    pub longitude: f64,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Generator {
    pub provider: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_generator_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_generator_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Moderation {
    pub provider: String,
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_moderation_model")]
    pub model: String,
    #[serde(default = "default_api_key_env")]
    pub api_key_env: String,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Redaction {
    #[serde(default)]
    pub family_names: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reports {
    pub sink: String,
    #[serde(default = "default_reports_jsonl_path")]
    pub jsonl_path: String,
    #[serde(default)]
    pub sqlite_path: Option<String>,
}

fn default_weather_base_url() -> String {
    "https://api.open-meteo.com/v1/forecast".to_string()
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

// Düsseldorf, the default Stadtteil of the seed catalog.
fn default_latitude() -> f64 {
    51.2277
}

fn default_longitude() -> f64 {
    6.7735
}

fn default_timeout_ms() -> u64 {
    5_000
}

fn default_generator_timeout_ms() -> u64 {
    30_000
}

fn default_generator_model() -> String {
    "gpt-4o-mini".to_string()
}

fn default_moderation_model() -> String {
    "omni-moderation-latest".to_string()
}

fn default_api_key_env() -> String {
    "OPENAI_API_KEY".to_string()
}

fn default_max_input_chars() -> usize {
    4_000
}

fn default_reports_jsonl_path() -> String {
    "./plan-reports.jsonl".to_string()
}

pub fn load_and_validate(path: &str) -> Result<Config, ConfigError> {
    let config_text =
        std::fs::read_to_string(path).map_err(|e| ConfigError::Read(e.to_string()))?;
    let value: serde_yaml::Value =
        serde_yaml::from_str(&config_text).map_err(|e| ConfigError::Parse(e.to_string()))?;

    let instance = serde_json::to_value(value).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_against_schema(&instance)?;

    let cfg: Config =
        serde_json::from_value(instance).map_err(|e| ConfigError::Parse(e.to_string()))?;
    validate_runtime_support(&cfg)?;
    Ok(cfg)
}

fn validate_against_schema(instance: &serde_json::Value) -> Result<(), ConfigError> {
    let schema_path = [
        std::path::PathBuf::from("config/config.schema.json"),
        std::path::Path::new(env!("CARGO_MANIFEST_DIR"))
            .join("../..")
            .join("config/config.schema.json"),
    ]
    .into_iter()
    .find(|p| p.exists())
    .ok_or_else(|| {
        ConfigError::SchemaLoad(
            "config schema not found at config/config.schema.json or workspace config path"
                .to_string(),
        )
    })?;

    let schema_text =
        std::fs::read_to_string(schema_path).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    let schema: serde_json::Value =
        serde_json::from_str(&schema_text).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;

    let validator =
        jsonschema::validator_for(&schema).map_err(|e| ConfigError::SchemaLoad(e.to_string()))?;
    if let Err(first) = validator.validate(instance) {
        return Err(ConfigError::SchemaValidation(first.to_string()));
    }
    Ok(())
}

fn validate_runtime_support(cfg: &Config) -> Result<(), ConfigError> {
    if cfg.retry.max_attempts == 0 {
        return Err(ConfigError::UnsupportedConfig(
            "retry.max_attempts must be >= 1".to_string(),
        ));
    }
    if cfg.retry.max_delay_ms < cfg.retry.base_delay_ms {
        return Err(ConfigError::UnsupportedConfig(
            "retry.max_delay_ms must be >= retry.base_delay_ms".to_string(),
        ));
    }
    if !(0.0..=1.0).contains(&cfg.retry.jitter_ratio) {
        return Err(ConfigError::UnsupportedConfig(
            "retry.jitter_ratio must be within [0, 1]".to_string(),
        ));
    }
    if cfg.scoring.daily_rotation_margin < 0.0 {
        return Err(ConfigError::UnsupportedConfig(
            "scoring.daily_rotation_margin must be >= 0".to_string(),
        ));
    }
    if cfg.weather.provider != "none" && cfg.weather.provider != "open_meteo" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "weather.provider={} is not implemented; supported: none, open_meteo",
            cfg.weather.provider
        )));
    }
    if cfg.generator.provider != "offline" && cfg.generator.provider != "openai" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "generator.provider={} is not implemented; supported: offline, openai",
            cfg.generator.provider
        )));
    }
    if cfg.moderation.provider != "none" && cfg.moderation.provider != "openai" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "moderation.provider={} is not implemented; supported: none, openai",
            cfg.moderation.provider
        )));
    }
    if cfg.generator.provider == "openai" && cfg.moderation.provider != "openai" {
        return Err(ConfigError::UnsupportedConfig(
            "generator.provider=openai requires moderation.provider=openai".to_string(),
        ));
    }
    if cfg.generator.max_input_chars < 200 {
        return Err(ConfigError::UnsupportedConfig(
            "generator.max_input_chars must be >= 200".to_string(),
        ));
    }
    if cfg.reports.sink != "jsonl" && cfg.reports.sink != "sqlite" {
        return Err(ConfigError::UnsupportedConfig(format!(
            "reports.sink={} is not implemented; supported: jsonl, sqlite",
            cfg.reports.sink
        )));
    }
    if cfg.reports.sink == "sqlite"
        && cfg
            .reports
            .sqlite_path
            .as_ref()
            .map(|v| v.trim().is_empty())
            .unwrap_or(true)
    {
        return Err(ConfigError::UnsupportedConfig(
            "reports.sqlite_path is required when reports.sink=sqlite".to_string(),
        ));
    }
    Ok(())
}
