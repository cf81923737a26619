//! Configuration loading and validation
//!
//! All components receive an immutable [`Config`] at construction time;
//! there are no ambient configuration singletons.

pub mod parser;
pub mod types;
pub mod validation;

pub use parser::{compute_config_hash, load_config, load_config_with_hash};
pub use types::{AuthConfig, BackofficeConfig, Config, ScraperConfig, StorageConfig};
