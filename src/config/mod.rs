//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → handed to HttpServer::new, which builds every subsystem from it
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; backend membership is fixed for the
//!   life of the process
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    AbuseFilterConfig, CacheConfig, CorsConfig, ListenerConfig, ObservabilityConfig, ProxyConfig,
    TransportConfig,
};
pub use validation::{validate_config, validate_log_level, ValidationError};
