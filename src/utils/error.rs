use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AstrogetError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("API request failed: {0}")]
    ApiError(#[from] reqwest::Error),

    #[error("Invalid URL: {0}")]
    UrlError(#[from] url::ParseError),

    #[error("CSV processing error: {0}")]
    CsvError(#[from] csv::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Configuration validation failed for '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Could not connect to {endpoint}. {message}")]
    ServerConnectionError { endpoint: String, message: String },

    #[error(
        "The Astro Archive Client you are running expects an older version of the API services. \
         Please upgrade to the latest \"astroget\". The Client you are using expected version \
         {expected} but got {actual} from the Astro Archive Server at {api_url}."
    )]
    ApiVersionMismatch {
        expected: f64,
        actual: f64,
        api_url: String,
    },

    #[error("[{code}] {message}")]
    ServerError { code: String, message: String },

    #[error("[JOBACTIV] {0}")]
    JobActive(String),

    #[error("[NOPRED] {0}")]
    CannotPredict(String),

    #[error("Invalid FITS data: {message}")]
    InvalidFits { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

pub type Result<T> = std::result::Result<T, AstrogetError>;

/// Status body the archive server sends with non-200 responses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ServerStatus {
    #[serde(rename = "errorCode", default)]
    pub error_code: Option<String>,
    #[serde(rename = "errorMessage", default)]
    pub error_message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub traceback: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Network,
    Server,
    Configuration,
    Data,
    Storage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl AstrogetError {
    /// Map a server status body onto the matching client error.
    pub fn from_status(status: &ServerStatus) -> Self {
        let message = status
            .error_message
            .clone()
            .unwrap_or_else(|| "<NA>".to_string());

        match status.error_code.as_deref() {
            Some("JOBACTIV") => AstrogetError::JobActive(message),
            Some("NOPRED") => AstrogetError::CannotPredict(message),
            code => {
                let code = code.unwrap_or("UNKNOWN");
                AstrogetError::ServerError {
                    code: "UNKNOWN".to_string(),
                    message: format!("{} [{}]", message, code),
                }
            }
        }
    }

    /// Short error code, at most 8 characters.
    pub fn error_code(&self) -> &str {
        match self {
            AstrogetError::JobActive(_) => "JOBACTIV",
            AstrogetError::CannotPredict(_) => "NOPRED",
            AstrogetError::ServerError { code, .. } => code,
            AstrogetError::ServerConnectionError { .. } => "NOCONN",
            AstrogetError::ApiVersionMismatch { .. } => "BADAPI",
            AstrogetError::InvalidFits { .. } => "BADFITS",
            AstrogetError::ConfigError { .. }
            | AstrogetError::ConfigValidationError { .. }
            | AstrogetError::InvalidConfigValueError { .. }
            | AstrogetError::MissingConfigError { .. } => "BADCONF",
            _ => "UNKAGET",
        }
    }

    pub fn to_status(&self) -> ServerStatus {
        let message = match self {
            AstrogetError::JobActive(message) | AstrogetError::CannotPredict(message) => {
                message.clone()
            }
            AstrogetError::ServerError { message, .. } => message.clone(),
            other => other.to_string(),
        };
        ServerStatus {
            error_code: Some(self.error_code().to_string()),
            error_message: Some(message),
            traceback: None,
        }
    }

    pub fn category(&self) -> ErrorCategory {
        match self {
            AstrogetError::ApiError(_) | AstrogetError::ServerConnectionError { .. } => {
                ErrorCategory::Network
            }
            AstrogetError::ServerError { .. }
            | AstrogetError::JobActive(_)
            | AstrogetError::CannotPredict(_)
            | AstrogetError::ApiVersionMismatch { .. } => ErrorCategory::Server,
            AstrogetError::UrlError(_)
            | AstrogetError::ConfigError { .. }
            | AstrogetError::ConfigValidationError { .. }
            | AstrogetError::InvalidConfigValueError { .. }
            | AstrogetError::MissingConfigError { .. } => ErrorCategory::Configuration,
            AstrogetError::IoError(_) | AstrogetError::ZipError(_) => ErrorCategory::Storage,
            AstrogetError::CsvError(_)
            | AstrogetError::SerializationError(_)
            | AstrogetError::InvalidFits { .. }
            | AstrogetError::ProcessingError { .. } => ErrorCategory::Data,
        }
    }

    pub fn severity(&self) -> ErrorSeverity {
        match self {
            AstrogetError::JobActive(_) | AstrogetError::CannotPredict(_) => ErrorSeverity::Low,
            AstrogetError::ApiError(_)
            | AstrogetError::ServerConnectionError { .. }
            | AstrogetError::ServerError { .. } => ErrorSeverity::Medium,
            AstrogetError::IoError(_) | AstrogetError::ApiVersionMismatch { .. } => {
                ErrorSeverity::Critical
            }
            _ => ErrorSeverity::High,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            AstrogetError::ServerConnectionError { endpoint, .. } => {
                format!("Cannot reach the Astro Archive Server at {}", endpoint)
            }
            AstrogetError::ApiVersionMismatch {
                expected, actual, ..
            } => format!(
                "This client expects API version {} but the server runs {}",
                expected, actual
            ),
            AstrogetError::JobActive(_) => {
                "The requested job has not completed yet".to_string()
            }
            AstrogetError::InvalidConfigValueError { field, reason, .. } => {
                format!("Invalid setting '{}': {}", field, reason)
            }
            AstrogetError::MissingConfigError { field } => {
                format!("Missing required setting '{}'", field)
            }
            AstrogetError::InvalidFits { message } => format!("Not a valid FITS file: {}", message),
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.category() {
            ErrorCategory::Network => {
                "Check your network connection and the --url value, or raise --connect-timeout"
            }
            ErrorCategory::Server => match self {
                AstrogetError::JobActive(_) => "Wait for the job to finish and try again",
                AstrogetError::ApiVersionMismatch { .. } => "Upgrade astroget to the latest release",
                _ => "Run again with --verbose and report the output to the archive help desk",
            },
            ErrorCategory::Configuration => "Review the command line flags and configuration file",
            ErrorCategory::Storage => "Check that the output path exists and is writable",
            ErrorCategory::Data => "Run again with --verbose to inspect the server response",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_status_job_active() {
        let status = ServerStatus {
            error_code: Some("JOBACTIV".to_string()),
            error_message: Some("still running".to_string()),
            traceback: None,
        };
        let err = AstrogetError::from_status(&status);
        assert!(matches!(err, AstrogetError::JobActive(ref m) if m == "still running"));
        assert_eq!(err.error_code(), "JOBACTIV");
        assert_eq!(err.severity(), ErrorSeverity::Low);
    }

    #[test]
    fn test_from_status_unknown_code() {
        let status: ServerStatus =
            serde_json::from_str(r#"{"errorCode": "BADFLD", "errorMessage": "no such field"}"#)
                .unwrap();
        let err = AstrogetError::from_status(&status);
        assert_eq!(err.to_string(), "[UNKNOWN] no such field [BADFLD]");
        assert_eq!(err.category(), ErrorCategory::Server);
    }

    #[test]
    fn test_from_status_missing_fields() {
        let err = AstrogetError::from_status(&ServerStatus::default());
        assert_eq!(err.to_string(), "[UNKNOWN] <NA> [UNKNOWN]");
    }

    #[test]
    fn test_to_status_round_trips_code() {
        let err = AstrogetError::CannotPredict("not enough work".to_string());
        let status = err.to_status();
        assert_eq!(status.error_code.as_deref(), Some("NOPRED"));
        assert_eq!(status.error_message.as_deref(), Some("not enough work"));
    }

    #[test]
    fn test_error_codes_fit_in_eight_chars() {
        let errors = vec![
            AstrogetError::JobActive(String::new()),
            AstrogetError::ProcessingError {
                message: String::new(),
            },
            AstrogetError::InvalidFits {
                message: String::new(),
            },
            AstrogetError::MissingConfigError {
                field: "url".to_string(),
            },
        ];
        for err in errors {
            assert!(err.error_code().len() <= 8, "{}", err.error_code());
        }
    }
}
