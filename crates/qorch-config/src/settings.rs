//! The top-level `Settings` value and its validation pass.

use crate::ConfigError;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RuntimeEnvironment {
    Development,
    Staging,
    Production,
}

impl Default for RuntimeEnvironment {
    fn default() -> Self {
        RuntimeEnvironment::Development
    }
}

/// C6 model routing policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RouterMode {
    Hybrid,
    LocalOnly,
    CloudOnly,
}

impl Default for RouterMode {
    fn default() -> Self {
        RouterMode::Hybrid
    }
}

fn default_phi_mode() -> qorch_core::PhiMode {
    qorch_core::PhiMode::Strict
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhiConfig {
    #[serde(default = "default_phi_mode")]
    pub mode: qorch_core::PhiMode,
}

impl Default for PhiConfig {
    fn default() -> Self {
        Self { mode: default_phi_mode() }
    }
}

fn default_temperature() -> f32 {
    0.2
}
fn default_max_tokens() -> u32 {
    1024
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default)]
    pub streaming: bool,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            streaming: true,
        }
    }
}

fn default_vad_threshold() -> f32 {
    0.5
}
fn default_silence_ms() -> u64 {
    500
}
fn default_sample_rate() -> u32 {
    16_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoiceConfig {
    #[serde(default = "default_vad_threshold")]
    pub vad_threshold: f32,
    #[serde(default = "default_silence_ms")]
    pub silence_ms: u64,
    #[serde(default = "default_barge_in_enabled")]
    pub barge_in_enabled: bool,
    #[serde(default = "default_sample_rate")]
    pub sample_rate: u32,
}

fn default_barge_in_enabled() -> bool {
    true
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            vad_threshold: default_vad_threshold(),
            silence_ms: default_silence_ms(),
            barge_in_enabled: default_barge_in_enabled(),
            sample_rate: default_sample_rate(),
        }
    }
}

fn default_failure_threshold() -> u32 {
    5
}
fn default_breaker_timeout_sec() -> u64 {
    60
}
fn default_half_open_requests() -> u32 {
    1
}
fn default_success_threshold() -> u32 {
    2
}

/// C11 circuit breaker parameters, hot-reloadable (§10 "Supplemental
/// features") — never the PHI/HIPAA flags, which are fixed at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerConfig {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_breaker_timeout_sec")]
    pub timeout_sec: u64,
    #[serde(default = "default_half_open_requests")]
    pub half_open_requests: u32,
    #[serde(default = "default_success_threshold")]
    pub success_threshold: u32,
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            timeout_sec: default_breaker_timeout_sec(),
            half_open_requests: default_half_open_requests(),
            success_threshold: default_success_threshold(),
        }
    }
}

fn default_history_limit() -> usize {
    10
}
fn default_cache_ttl_sec() -> u64 {
    1800
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextConfig {
    #[serde(default = "default_history_limit")]
    pub history_limit: usize,
    #[serde(default = "default_cache_ttl_sec")]
    pub cache_ttl_sec: u64,
}

impl Default for ContextConfig {
    fn default() -> Self {
        Self {
            history_limit: default_history_limit(),
            cache_ttl_sec: default_cache_ttl_sec(),
        }
    }
}

fn default_search_timeout_ms() -> u64 {
    5000
}
fn default_max_parallel_sources() -> usize {
    3
}
fn default_result_limit_per_source() -> usize {
    10
}
fn default_confidence_threshold() -> f32 {
    0.3
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}
fn default_port() -> u16 {
    8080
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { host: default_host(), port: default_port() }
    }
}

/// The fully loaded and validated application configuration (§6
/// "Configuration options recognized").
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: RuntimeEnvironment,
    #[serde(default)]
    pub hipaa_mode: bool,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub router_mode: RouterMode,
    #[serde(default = "default_search_timeout_ms")]
    pub search_timeout_ms: u64,
    #[serde(default = "default_max_parallel_sources")]
    pub max_parallel_sources: usize,
    #[serde(default = "default_result_limit_per_source")]
    pub result_limit_per_source: usize,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    #[serde(default)]
    pub phi: PhiConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub voice: VoiceConfig,
    #[serde(default)]
    pub breaker: BreakerConfig,
    #[serde(default)]
    pub context: ContextConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            environment: RuntimeEnvironment::default(),
            hipaa_mode: false,
            server: ServerConfig::default(),
            router_mode: RouterMode::default(),
            search_timeout_ms: default_search_timeout_ms(),
            max_parallel_sources: default_max_parallel_sources(),
            result_limit_per_source: default_result_limit_per_source(),
            confidence_threshold: default_confidence_threshold(),
            phi: PhiConfig::default(),
            llm: LlmConfig::default(),
            voice: VoiceConfig::default(),
            breaker: BreakerConfig::default(),
            context: ContextConfig::default(),
        }
    }
}

impl Settings {
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_phi()?;
        self.validate_router()?;
        self.validate_search()?;
        self.validate_breaker()?;
        Ok(())
    }

    fn validate_phi(&self) -> Result<(), ConfigError> {
        if self.hipaa_mode && matches!(self.phi.mode, qorch_core::PhiMode::Off) {
            return Err(ConfigError::InvalidValue {
                field: "phi.mode".to_string(),
                message: "phi_mode=off is forbidden when hipaa_mode is enabled".to_string(),
            });
        }
        Ok(())
    }

    fn validate_router(&self) -> Result<(), ConfigError> {
        if self.hipaa_mode && matches!(self.router_mode, RouterMode::CloudOnly) {
            return Err(ConfigError::InvalidValue {
                field: "router_mode".to_string(),
                message: "router_mode=cloud_only is forbidden when hipaa_mode is enabled"
                    .to_string(),
            });
        }
        Ok(())
    }

    fn validate_search(&self) -> Result<(), ConfigError> {
        if !(1..=20000).contains(&self.search_timeout_ms) {
            return Err(ConfigError::InvalidValue {
                field: "search_timeout_ms".to_string(),
                message: "must be between 1 and 20000".to_string(),
            });
        }
        if self.max_parallel_sources == 0 {
            return Err(ConfigError::InvalidValue {
                field: "max_parallel_sources".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            return Err(ConfigError::InvalidValue {
                field: "confidence_threshold".to_string(),
                message: "must be between 0.0 and 1.0".to_string(),
            });
        }
        Ok(())
    }

    fn validate_breaker(&self) -> Result<(), ConfigError> {
        if self.breaker.failure_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "breaker.failure_threshold".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.breaker.success_threshold == 0 {
            return Err(ConfigError::InvalidValue {
                field: "breaker.success_threshold".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

/// Loads layered configuration: `config/default.{toml,yaml}`, then
/// `config/{env}.{toml,yaml}` if present, then `QORCH__`-prefixed
/// environment variables (double underscore separator, e.g.
/// `QORCH__ROUTER_MODE=local_only`), then validates the result.
pub fn load_settings(env: Option<&str>) -> Result<Settings, ConfigError> {
    let env_name = env.unwrap_or("development");

    let builder = config::Config::builder()
        .add_source(config::File::with_name("config/default").required(false))
        .add_source(config::File::with_name(&format!("config/{env_name}")).required(false))
        .add_source(
            config::Environment::with_prefix("QORCH")
                .separator("__")
                .try_parsing(true),
        );

    let raw = builder.build()?;
    let settings: Settings = raw.try_deserialize()?;
    settings.validate()?;
    Ok(settings)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_settings_pass_validation() {
        assert!(Settings::default().validate().is_ok());
    }

    #[test]
    fn hipaa_mode_rejects_phi_off() {
        let mut settings = Settings::default();
        settings.hipaa_mode = true;
        settings.phi.mode = qorch_core::PhiMode::Off;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn hipaa_mode_rejects_cloud_only_router() {
        let mut settings = Settings::default();
        settings.hipaa_mode = true;
        settings.router_mode = RouterMode::CloudOnly;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn cloud_only_without_hipaa_is_permitted() {
        let mut settings = Settings::default();
        settings.router_mode = RouterMode::CloudOnly;
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn confidence_threshold_out_of_range_is_rejected() {
        let mut settings = Settings::default();
        settings.confidence_threshold = 1.5;
        assert!(settings.validate().is_err());
    }
}
