use crate::domain::model::CommandStatus;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Serial port error: {0}")]
    SerialError(#[from] serialport::Error),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Modem answered {status} to '{command}'")]
    ModemStatus {
        command: String,
        status: CommandStatus,
    },

    #[error("Malformed message listing: {message}")]
    MalformedListing { message: String },

    #[error("Delivery rejected by API with HTTP {status}")]
    DeliveryRejected { status: u16 },

    #[error("Malformed ingress payload: {message}")]
    MalformedIngress { message: String },
}

/// 錯誤嚴重程度，決定 CLI 的退出碼
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl GatewayError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            GatewayError::DeliveryRejected { .. } | GatewayError::MalformedIngress { .. } => {
                ErrorSeverity::Low
            }
            GatewayError::ApiError(_) | GatewayError::ModemStatus { .. } => ErrorSeverity::Medium,
            GatewayError::MalformedListing { .. } | GatewayError::SerializationError(_) => {
                ErrorSeverity::High
            }
            GatewayError::SerialError(_)
            | GatewayError::IoError(_)
            | GatewayError::ConfigError { .. }
            | GatewayError::ConfigValidationError { .. }
            | GatewayError::MissingConfigError { .. }
            | GatewayError::InvalidConfigValueError { .. } => ErrorSeverity::Critical,
        }
    }

    pub fn recovery_suggestion(&self) -> String {
        match self {
            GatewayError::SerialError(_) => {
                "Check that gsm_device points at the modem and that the user may open it".to_string()
            }
            GatewayError::ApiError(_) | GatewayError::DeliveryRejected { .. } => {
                "Check the [api] url and credentials".to_string()
            }
            GatewayError::IoError(_) => "Check file permissions and free disk space".to_string(),
            GatewayError::SerializationError(_) | GatewayError::MalformedIngress { .. } => {
                "Send a JSON body of the form {\"messages\":[{\"number\":..,\"message\":..}]}"
                    .to_string()
            }
            GatewayError::ConfigError { .. }
            | GatewayError::ConfigValidationError { .. }
            | GatewayError::InvalidConfigValueError { .. } => {
                "Fix the configuration file and restart".to_string()
            }
            GatewayError::MissingConfigError { field } => {
                format!("Add the missing '{}' entry to the configuration file", field)
            }
            GatewayError::ModemStatus { status, .. } => match status {
                CommandStatus::ErrorSimPuk => {
                    "The SIM requires a PUK code; unlock it manually before restarting".to_string()
                }
                CommandStatus::Timeout => {
                    "The modem did not answer in time; check power and baud rate".to_string()
                }
                _ => "Retry the command or reboot the modem".to_string(),
            },
            GatewayError::MalformedListing { .. } => {
                "The modem firmware answered AT+CMGL with an unexpected layout".to_string()
            }
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            GatewayError::SerialError(e) => format!("Cannot open the GSM modem: {}", e),
            GatewayError::MissingConfigError { field } => {
                format!("Configuration is missing '{}'", field)
            }
            GatewayError::ModemStatus { command, status } => {
                format!("The modem rejected '{}' ({})", command, status)
            }
            other => other.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, GatewayError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_startup_failures_are_critical() {
        let err = GatewayError::MissingConfigError {
            field: "[sms]".to_string(),
        };
        assert_eq!(err.severity(), ErrorSeverity::Critical);
        assert!(err.user_friendly_message().contains("[sms]"));
    }

    #[test]
    fn test_puk_lock_asks_for_operator() {
        let err = GatewayError::ModemStatus {
            command: "AT+CPIN".to_string(),
            status: CommandStatus::ErrorSimPuk,
        };
        assert_eq!(err.severity(), ErrorSeverity::Medium);
        assert!(err.recovery_suggestion().contains("PUK"));
        assert_eq!(err.to_string(), "Modem answered ERROR_SIM_PUK to 'AT+CPIN'");
    }

    #[test]
    fn test_pipeline_faults_are_low_severity() {
        assert_eq!(
            GatewayError::DeliveryRejected { status: 502 }.severity(),
            ErrorSeverity::Low
        );
        assert_eq!(
            GatewayError::MalformedIngress {
                message: "eof".to_string()
            }
            .severity(),
            ErrorSeverity::Low
        );
    }
}
