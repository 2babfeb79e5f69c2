use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::service::cascade::TaxSettings;
use crate::service::column_solver::SolverSettings;
use crate::tolerance::ToleranceModel;

/// Default location of the optional configuration file (any format the
/// `config` crate recognises by extension).
pub const DEFAULT_CONFIG_FILE: &str = "config/invoice-math";

/// Environment prefix; nested keys use `__`, e.g. `INVOICE_MATH__SERVER__PORT`.
pub const ENV_PREFIX: &str = "INVOICE_MATH";

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub engine: EngineSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8080,
        }
    }
}

/// Everything the math engine needs; no I/O involved.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    pub tolerances: ToleranceModel,
    pub tax: TaxSettings,
    pub solver: SolverSettings,
}

impl AppConfig {
    /// Defaults, then `config/invoice-math.*` if present, then environment.
    pub fn load() -> Result<Self> {
        let file = std::env::var(format!("{ENV_PREFIX}_CONFIG"))
            .unwrap_or_else(|_| DEFAULT_CONFIG_FILE.to_string());
        Self::load_from(&file)
    }

    pub fn load_from(file: &str) -> Result<Self> {
        let settings = ::config::Config::builder()
            .add_source(::config::Config::try_from(&AppConfig::default())?)
            .add_source(::config::File::with_name(file).required(false))
            .add_source(
                ::config::Environment::with_prefix(ENV_PREFIX)
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;
        Ok(settings.try_deserialize()?)
    }
}
