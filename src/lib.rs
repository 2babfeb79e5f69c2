pub mod api;
pub mod config;
pub mod constants;
pub mod error;
pub mod models;
pub mod numeric;
pub mod service;
pub mod tolerance;

pub use config::{AppConfig, EngineSettings};
pub use error::MathError;
pub use service::MathValidator;
pub use tolerance::{Tolerance, ToleranceModel};
