use crate::config::{validate_provider, DEFAULT_CONCURRENT_REQUESTS};
use crate::core::client::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_READ_TIMEOUT};
use crate::domain::ports::ConfigProvider;
use crate::utils::error::{AstrogetError, Result};
use crate::utils::validation::Validate;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::OnceLock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub server: ServerConfig,
    pub output: Option<OutputConfig>,
    pub client: Option<ClientConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub url: String,
    pub connect_timeout: Option<f64>,
    pub read_timeout: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    pub verbose: Option<bool>,
    pub show_curl: Option<bool>,
    pub concurrent_requests: Option<usize>,
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([^}]+)\}").expect("valid env var pattern"))
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path).map_err(AstrogetError::IoError)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed_content = Self::substitute_env_vars(content);

        toml::from_str(&processed_content).map_err(|e| AstrogetError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${ASTROGET_URL})；未設定的保持原樣
    fn substitute_env_vars(content: &str) -> String {
        env_var_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let var_name = &caps[1];
                std::env::var(var_name).unwrap_or_else(|_| format!("${{{}}}", var_name))
            })
            .into_owned()
    }
}

impl ConfigProvider for TomlConfig {
    fn server_url(&self) -> &str {
        &self.server.url
    }

    fn output_path(&self) -> &str {
        self.output.as_ref().map(|o| o.path.as_str()).unwrap_or(".")
    }

    fn connect_timeout(&self) -> f64 {
        self.server.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    fn read_timeout(&self) -> f64 {
        self.server.read_timeout.unwrap_or(DEFAULT_READ_TIMEOUT)
    }

    fn verbose(&self) -> bool {
        self.client.as_ref().and_then(|c| c.verbose).unwrap_or(false)
    }

    fn show_curl(&self) -> bool {
        self.client.as_ref().and_then(|c| c.show_curl).unwrap_or(false)
    }

    fn concurrent_requests(&self) -> usize {
        self.client
            .as_ref()
            .and_then(|c| c.concurrent_requests)
            .unwrap_or(DEFAULT_CONCURRENT_REQUESTS)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        validate_provider(self)
    }
}
