use crate::config::types::Config;
use crate::ConfigError;
use url::Url;

/// Validates a loaded configuration
///
/// Checks the invariants the rest of the crate relies on:
/// - the base URL parses and is http(s)
/// - some authentication material is present (cookie or credentials)
/// - concurrency, batch and chunk sizes are non-zero
/// - a sink key accompanies a sink URL
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    let base = Url::parse(&config.backoffice.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("{}: {}", config.backoffice.base_url, e)))?;
    if base.scheme() != "http" && base.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base-url must be http(s), got scheme {}",
            base.scheme()
        )));
    }

    let has_credentials =
        config.backoffice.username.is_some() && config.backoffice.password.is_some();
    if config.backoffice.session_cookie.is_none() && !has_credentials {
        return Err(ConfigError::Validation(
            "either session-cookie or username/password must be provided".to_string(),
        ));
    }

    if config.scraper.concurrency == 0 {
        return Err(ConfigError::Validation(
            "concurrency must be at least 1".to_string(),
        ));
    }
    if config.scraper.batch_size == 0 {
        return Err(ConfigError::Validation(
            "batch-size must be at least 1".to_string(),
        ));
    }
    if config.scraper.chunk_size == 0 {
        return Err(ConfigError::Validation(
            "chunk-size must be at least 1".to_string(),
        ));
    }
    if config.scraper.rate_per_domain < 0.0 {
        return Err(ConfigError::Validation(
            "rate-per-domain must not be negative".to_string(),
        ));
    }

    if config.storage.sink_url.is_some() && config.storage.sink_key.is_none() {
        return Err(ConfigError::Validation(
            "sink-url requires sink-key".to_string(),
        ));
    }

    if config.auth.login_weak_threshold == 0 || config.auth.conflict_threshold == 0 {
        return Err(ConfigError::Validation(
            "detector thresholds must be at least 1".to_string(),
        ));
    }

    Ok(())
}
