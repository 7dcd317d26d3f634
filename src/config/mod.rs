//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML, optional)
//!     → loader.rs (parse & deserialize)
//!     → schema.rs (PORT / ENV overlay)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → shared with all subsystems at startup
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; there is no reload
//! - All fields have defaults to allow minimal configs
//! - Bypass mode is never on unless explicitly requested

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, load_startup_config, ConfigError};
pub use schema::{
    CorsConfig, DocumentConfig, ListenerConfig, ObservabilityConfig, PolicyConfig, ProxyConfig,
    RedirectConfig, TimeoutConfig, TlsConfig,
};
