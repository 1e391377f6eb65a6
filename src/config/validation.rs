use super::{AppConfig, ConfigError};

pub(crate) const VALID_LOG_LEVELS: [&str; 6] =
    ["DEBUG", "INFO", "WARNING", "ERROR", "CRITICAL", "DISABLED"];

/// Validate the full application config, returning an error if any rule is violated.
///
/// # Errors
///
/// Returns [`ConfigError::Validation`] when any configuration invariant is violated.
pub fn validate_config(config: &AppConfig) -> Result<(), ConfigError> {
    validate_client_config(config)?;
    validate_openai_config(config)?;
    validate_stream_config(config)?;
    validate_log_level(config)?;
    Ok(())
}

fn validation_err(msg: impl Into<String>) -> ConfigError {
    ConfigError::Validation(msg.into())
}

fn validate_client_config(config: &AppConfig) -> Result<(), ConfigError> {
    let client = &config.client;
    if client.timeout_secs == 0 {
        return Err(validation_err("client.timeout_secs must be greater than 0"));
    }
    if client.connect_timeout_secs == 0 {
        return Err(validation_err(
            "client.connect_timeout_secs must be greater than 0",
        ));
    }
    Ok(())
}

fn validate_openai_config(config: &AppConfig) -> Result<(), ConfigError> {
    let openai = &config.openai;
    if !openai.base_url.starts_with("http://") && !openai.base_url.starts_with("https://") {
        return Err(validation_err(
            "openai.base_url must start with http:// or https://",
        ));
    }
    if openai.api_key.trim().is_empty() {
        return Err(validation_err("openai.api_key cannot be empty"));
    }
    if !(0.0..=2.0).contains(&openai.temperature) {
        return Err(validation_err(
            "openai.temperature must be between 0.0 and 2.0",
        ));
    }
    Ok(())
}

fn validate_stream_config(config: &AppConfig) -> Result<(), ConfigError> {
    config.stream.validate()
}

fn validate_log_level(config: &AppConfig) -> Result<(), ConfigError> {
    if !VALID_LOG_LEVELS.contains(&config.log_level.to_uppercase().as_str()) {
        return Err(validation_err(format!(
            "log_level must be one of {VALID_LOG_LEVELS:?}"
        )));
    }
    Ok(())
}
