use serde::{Deserialize, Serialize};
use std::fmt;

/// Error type for configuration loading and validation.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("Config validation error: {0}")]
    Validation(String),
}

/// Client-facing exposure mode for upstream reasoning/thinking markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ThinkMode {
    Reasoning,
    Think,
    Strip,
    #[default]
    Details,
}

impl fmt::Display for ThinkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ThinkMode::Reasoning => write!(f, "reasoning"),
            ThinkMode::Think => write!(f, "think"),
            ThinkMode::Strip => write!(f, "strip"),
            ThinkMode::Details => write!(f, "details"),
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub runtime_worker_threads: Option<usize>,
}

fn default_port() -> u16 {
    8080
}
fn default_host() -> String {
    "0.0.0.0".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            host: default_host(),
            runtime_worker_threads: None,
        }
    }
}

/// zai upstream endpoint and bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UpstreamConfig {
    #[serde(default = "default_upstream_protocol")]
    pub protocol: String,
    #[serde(default = "default_upstream_host")]
    pub host: String,
    #[serde(default)]
    pub token: String,
}

fn default_upstream_protocol() -> String {
    "https:".to_string()
}
fn default_upstream_host() -> String {
    "chat.z.ai".to_string()
}

impl Default for UpstreamConfig {
    fn default() -> Self {
        Self {
            protocol: default_upstream_protocol(),
            host: default_upstream_host(),
            token: String::new(),
        }
    }
}

impl UpstreamConfig {
    /// Base origin, e.g. `https://chat.z.ai`.
    #[must_use]
    pub fn origin(&self) -> String {
        format!("{}//{}", self.protocol, self.host)
    }
}

/// qwen upstream endpoint and bearer token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QwenConfig {
    #[serde(default = "default_qwen_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub token: String,
}

fn default_qwen_base_url() -> String {
    "https://portal.qwen.ai/v1".to_string()
}

impl Default for QwenConfig {
    fn default() -> Self {
        Self {
            base_url: default_qwen_base_url(),
            token: String::new(),
        }
    }
}

/// Model defaults and reasoning exposure.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    #[serde(default = "default_model")]
    pub default: String,
    #[serde(default)]
    pub think_mode: ThinkMode,
}

fn default_model() -> String {
    "GLM-4-6-API-V1".to_string()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            default: default_model(),
            think_mode: ThinkMode::default(),
        }
    }
}

/// Browser-mimicking header set sent to the zai upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HeadersConfig {
    #[serde(default = "default_accept")]
    pub accept: String,
    #[serde(default = "default_accept_language")]
    pub accept_language: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
    #[serde(default = "default_sec_ch_ua")]
    pub sec_ch_ua: String,
    #[serde(default = "default_sec_ch_ua_mobile")]
    pub sec_ch_ua_mobile: String,
    #[serde(default = "default_sec_ch_ua_platform")]
    pub sec_ch_ua_platform: String,
    #[serde(default = "default_fe_version")]
    pub x_fe_version: String,
}

fn default_accept() -> String {
    "*/*".to_string()
}
fn default_accept_language() -> String {
    "en-US".to_string()
}
fn default_user_agent() -> String {
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/141.0.0.0 Safari/537.36".to_string()
}
fn default_sec_ch_ua() -> String {
    r#""Chromium";v="141", "Not?A_Brand";v="8""#.to_string()
}
fn default_sec_ch_ua_mobile() -> String {
    "?0".to_string()
}
fn default_sec_ch_ua_platform() -> String {
    "Linux".to_string()
}
fn default_fe_version() -> String {
    "prod-fe-1.0.117".to_string()
}

impl Default for HeadersConfig {
    fn default() -> Self {
        Self {
            accept: default_accept(),
            accept_language: default_accept_language(),
            user_agent: default_user_agent(),
            sec_ch_ua: default_sec_ch_ua(),
            sec_ch_ua_mobile: default_sec_ch_ua_mobile(),
            sec_ch_ua_platform: default_sec_ch_ua_platform(),
            x_fe_version: default_fe_version(),
        }
    }
}

/// Feature flags and settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeaturesConfig {
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_log_level() -> String {
    "INFO".to_string()
}

impl Default for FeaturesConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

/// Hard limits on per-request buffering.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_tool_call_buffer_max")]
    pub tool_call_buffer_max: usize,
}

fn default_tool_call_buffer_max() -> usize {
    256 * 1024
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            tool_call_buffer_max: default_tool_call_buffer_max(),
        }
    }
}

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub upstream: UpstreamConfig,
    #[serde(default)]
    pub qwen: QwenConfig,
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub headers: HeadersConfig,
    #[serde(default)]
    pub features: FeaturesConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl AppConfig {
    /// Header map sent with every zai upstream request.
    ///
    /// The Origin/Referer pair is derived from the configured upstream host so
    /// the request resembles a browser session on that origin.
    #[must_use]
    pub fn upstream_headers(&self) -> Vec<(&'static str, String)> {
        let origin = self.upstream.origin();
        vec![
            ("Accept", self.headers.accept.clone()),
            ("Accept-Language", self.headers.accept_language.clone()),
            ("Cache-Control", "no-cache".to_string()),
            ("Pragma", "no-cache".to_string()),
            ("Sec-Ch-Ua", self.headers.sec_ch_ua.clone()),
            ("Sec-Ch-Ua-Mobile", self.headers.sec_ch_ua_mobile.clone()),
            (
                "Sec-Ch-Ua-Platform",
                self.headers.sec_ch_ua_platform.clone(),
            ),
            ("Sec-Fetch-Dest", "empty".to_string()),
            ("Sec-Fetch-Mode", "cors".to_string()),
            ("Sec-Fetch-Site", "same-origin".to_string()),
            ("User-Agent", self.headers.user_agent.clone()),
            ("X-FE-Version", self.headers.x_fe_version.clone()),
            ("Origin", origin.clone()),
            ("Referer", format!("{origin}/")),
        ]
    }
}

/// Load configuration from a YAML file, apply environment overrides, validate.
///
/// A missing file is not an error: defaults plus environment variables then
/// fully describe the configuration.
///
/// # Errors
///
/// Returns [`ConfigError::Io`] when reading an existing file fails,
/// [`ConfigError::Yaml`] when parsing fails, or [`ConfigError::Validation`]
/// when semantic validation fails.
pub fn load_config(path: &str) -> Result<AppConfig, ConfigError> {
    let mut config = if std::path::Path::new(path).exists() {
        let contents = std::fs::read_to_string(path)?;
        serde_yaml::from_str(&contents)?
    } else {
        AppConfig::default()
    };
    apply_env_overrides(&mut config);
    validate_config(&config)?;
    Ok(config)
}

fn apply_env_overrides(config: &mut AppConfig) {
    if let Ok(port) = std::env::var("PORT") {
        if let Ok(port) = port.parse() {
            config.server.port = port;
        }
    }
    if let Ok(host) = std::env::var("HOST") {
        if !host.is_empty() {
            config.server.host = host;
        }
    }
    if let Ok(token) = std::env::var("ZAI_TOKEN") {
        if !token.trim().is_empty() {
            config.upstream.token = token.trim().to_string();
        }
    }
    if let Ok(token) = std::env::var("QWEN_TOKEN") {
        if !token.trim().is_empty() {
            config.qwen.token = token.trim().to_string();
        }
    }
    if let Ok(model) = std::env::var("MODEL") {
        if !model.is_empty() {
            config.model.default = model;
        }
    }
    if let Ok(mode) = std::env::var("THINK_MODE") {
        match mode.as_str() {
            "reasoning" => config.model.think_mode = ThinkMode::Reasoning,
            "think" => config.model.think_mode = ThinkMode::Think,
            "strip" => config.model.think_mode = ThinkMode::Strip,
            "details" => config.model.think_mode = ThinkMode::Details,
            _ => {}
        }
    }
    if let Ok(level) = std::env::var("LOG_LEVEL") {
        if !level.is_empty() {
            config.features.log_level = level;
        }
    }
}

fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    if config.server.port == 0 {
        return Err(ConfigError::Validation("server.port must be nonzero".into()));
    }
    if config.upstream.token.is_empty() {
        return Err(ConfigError::Validation(
            "upstream.token (or ZAI_TOKEN) is required".into(),
        ));
    }
    if config.upstream.host.is_empty() {
        return Err(ConfigError::Validation("upstream.host is required".into()));
    }
    if config.limits.tool_call_buffer_max == 0 {
        return Err(ConfigError::Validation(
            "limits.tool_call_buffer_max must be nonzero".into(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.model.think_mode, ThinkMode::Details);
        assert_eq!(config.model.default, "GLM-4-6-API-V1");
        assert_eq!(config.limits.tool_call_buffer_max, 256 * 1024);
        assert_eq!(config.upstream.origin(), "https://chat.z.ai");
    }

    #[test]
    fn think_mode_serde_roundtrip() {
        let json = serde_json::to_string(&ThinkMode::Reasoning).unwrap();
        assert_eq!(json, "\"reasoning\"");
        let mode: ThinkMode = serde_json::from_str("\"strip\"").unwrap();
        assert_eq!(mode, ThinkMode::Strip);
    }

    #[test]
    fn yaml_parse_overrides_defaults() {
        let yaml = r#"
server:
  port: 9000
upstream:
  token: "tok-1"
model:
  think_mode: think
"#;
        let config: AppConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.upstream.token, "tok-1");
        assert_eq!(config.model.think_mode, ThinkMode::Think);
        // untouched sections keep their defaults
        assert_eq!(config.upstream.host, "chat.z.ai");
        assert_eq!(config.qwen.base_url, "https://portal.qwen.ai/v1");
    }

    #[test]
    fn validation_requires_upstream_token() {
        let config = AppConfig::default();
        assert!(matches!(
            validate_config(&config),
            Err(ConfigError::Validation(_))
        ));
    }

    #[test]
    fn upstream_headers_include_origin_and_referer() {
        let mut config = AppConfig::default();
        config.upstream.token = "t".into();
        let headers = config.upstream_headers();
        let origin = headers.iter().find(|(k, _)| *k == "Origin").unwrap();
        assert_eq!(origin.1, "https://chat.z.ai");
        let referer = headers.iter().find(|(k, _)| *k == "Referer").unwrap();
        assert_eq!(referer.1, "https://chat.z.ai/");
    }
}
