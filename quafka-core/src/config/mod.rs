//! Configuration management for Quafka.
//!
//! - Typed value objects with defaults and builders ([`schema`])
//! - Layered loading from defaults, TOML files and environment ([`loader`])
//! - Field and cross-field validation ([`validator`])
//!
//! # Examples
//!
//! ```rust,no_run
//! use quafka_core::config::ConfigLoader;
//!
//! let config = ConfigLoader::new()
//!     .with_file("quafka.toml")
//!     .load()
//!     .expect("failed to load configuration");
//!
//! println!("Broker will bind to {}", config.server.bind_address());
//! ```

pub mod loader;
pub mod schema;
pub mod validator;

pub use loader::ConfigLoader;
pub use schema::*;
pub use validator::ConfigValidator;
