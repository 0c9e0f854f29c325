use crate::app::pipelines::dispatch::DispatchSettings;
use crate::core::channel::ChannelTimings;
use crate::core::gateway::GatewaySettings;
use crate::utils::error::{GatewayError, Result};
use crate::utils::validation::{
    validate_non_empty_string, validate_path, validate_range, validate_url, Validate,
};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// 簡訊單則的上限，超過 10 段串接簡訊視為設定錯誤
pub const MAX_CONFIGURABLE_LENGTH: usize = 1530;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    pub sms: SmsConfig,
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SmsConfig {
    pub gsm_device: String,
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,
    #[serde(default = "default_listen")]
    pub listen: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub sim_pin: Option<String>,
    #[serde(default = "default_max_message_length")]
    pub max_message_length: usize,
    #[serde(default = "default_message_log")]
    pub message_log: String,
    #[serde(default = "default_send_wait_seconds")]
    pub send_wait_seconds: u64,
    #[serde(default = "default_read_timeout_seconds")]
    pub read_timeout_seconds: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,
    #[serde(default = "default_receive_wait_seconds")]
    pub receive_wait_seconds: u64,
}

fn default_baud_rate() -> u32 {
    crate::adapters::serial::DEFAULT_BAUD_RATE
}

fn default_listen() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8001
}

fn default_max_message_length() -> usize {
    160
}

fn default_message_log() -> String {
    "messages.log".to_string()
}

fn default_send_wait_seconds() -> u64 {
    5
}

fn default_read_timeout_seconds() -> u64 {
    10
}

fn default_timeout_seconds() -> u64 {
    10
}

fn default_receive_wait_seconds() -> u64 {
    10
}

impl GatewayConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(|e| GatewayError::ConfigError {
            message: format!("Cannot read {}: {}", path.as_ref().display(), e),
        })?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content)?;

        let table: toml::Table =
            toml::from_str(&processed_content).map_err(|e| GatewayError::ConfigValidationError {
                field: "toml_parsing".to_string(),
                message: format!("TOML parsing error: {}", e),
            })?;
        for section in ["sms", "api"] {
            if !table.contains_key(section) {
                return Err(GatewayError::MissingConfigError {
                    field: format!("[{}]", section),
                });
            }
        }

        toml::from_str(&processed_content).map_err(|e| GatewayError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${API_PASSWORD})，未設定的變數保留原樣
    fn substitute_env_vars(content: &str) -> Result<String> {
        use regex::Regex;
        let re = Regex::new(r"\$\{([^}]+)\}").map_err(|e| GatewayError::ConfigError {
            message: format!("Invalid substitution pattern: {}", e),
        })?;

        let result = re.replace_all(content, |caps: &regex::Captures| {
            let var_name = &caps[1];
            std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
        });

        Ok(result.to_string())
    }

    /// TCP 服務綁定的位址
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.sms.listen, self.sms.port)
    }

    pub fn channel_timings(&self) -> ChannelTimings {
        ChannelTimings {
            read_timeout: Duration::from_secs(self.sms.read_timeout_seconds),
            ..ChannelTimings::default()
        }
    }

    pub fn dispatch_settings(&self) -> DispatchSettings {
        DispatchSettings {
            send_wait: Duration::from_secs(self.sms.send_wait_seconds),
            max_message_length: self.sms.max_message_length,
        }
    }

    pub fn gateway_settings(&self) -> GatewaySettings {
        GatewaySettings {
            dispatch: self.dispatch_settings(),
            receive_wait: Duration::from_secs(self.api.receive_wait_seconds),
        }
    }

    pub fn api_timeout(&self) -> Duration {
        Duration::from_secs(self.api.timeout_seconds)
    }
}

impl Validate for GatewayConfig {
    fn validate(&self) -> Result<()> {
        validate_path("sms.gsm_device", &self.sms.gsm_device)?;
        validate_non_empty_string("sms.listen", &self.sms.listen)?;
        validate_range("sms.port", self.sms.port, 1, u16::MAX)?;
        validate_range(
            "sms.max_message_length",
            self.sms.max_message_length,
            1,
            MAX_CONFIGURABLE_LENGTH,
        )?;
        validate_path("sms.message_log", &self.sms.message_log)?;
        if let Some(pin) = &self.sms.sim_pin {
            if pin.is_empty() || !pin.chars().all(|c| c.is_ascii_digit()) {
                return Err(GatewayError::InvalidConfigValueError {
                    field: "sms.sim_pin".to_string(),
                    value: "<hidden>".to_string(),
                    reason: "PIN must contain digits only".to_string(),
                });
            }
        }

        validate_url("api.url", &self.api.url)?;
        validate_non_empty_string("api.user", &self.api.user)?;
        validate_non_empty_string("api.password", &self.api.password)?;
        validate_range("api.timeout_seconds", self.api.timeout_seconds, 1, 3600)?;

        Ok(())
    }
}
