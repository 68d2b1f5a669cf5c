use std::time::Duration;
use url::Url;

use crate::monitoring::types::{CheckInterval, IntervalUnit, Protocol};

/// Rejected user input, with a message fit for the API response
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

impl ValidationError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }
}

pub type ValidationResult<T> = Result<T, ValidationError>;

pub fn parse_protocol(protocol: &str) -> ValidationResult<Protocol> {
    protocol
        .parse()
        .map_err(|_| ValidationError::new(format!("Invalid protocol '{protocol}'. Must be http or https")))
}

/// Validate a scheme-less target such as `example.com/health` and return it trimmed
pub fn validate_target_url(url: &str) -> ValidationResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::new("URL cannot be empty"));
    }
    if url.contains("://") {
        return Err(ValidationError::new("URL must not include a scheme, set the protocol field instead"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(ValidationError::new("URL cannot contain whitespace"));
    }

    match Url::parse(&format!("http://{url}")) {
        Ok(parsed) if parsed.host_str().is_some_and(|h| !h.is_empty()) => Ok(url.to_string()),
        Ok(_) => Err(ValidationError::new("URL must have a valid host")),
        Err(e) => Err(ValidationError::new(format!("Invalid URL: {e}"))),
    }
}

/// Build an interval from user input, enforcing the configured minimum
pub fn validate_interval(value: u32, unit: &str, min_interval: Duration) -> ValidationResult<CheckInterval> {
    let unit: IntervalUnit = unit.parse().map_err(|_| {
        ValidationError::new(format!("Invalid unit '{unit}'. Must be second, minute, hour or day"))
    })?;
    let interval = CheckInterval::new(value, unit);

    if !interval.is_valid() {
        return Err(ValidationError::new("Frequency must be greater than zero"));
    }
    if interval.as_duration() < min_interval {
        return Err(ValidationError::new(format!(
            "Interval {interval} is shorter than the minimum of {} seconds",
            min_interval.as_secs()
        )));
    }
    Ok(interval)
}

pub fn validate_email(address: &str) -> ValidationResult<String> {
    let address = address.trim();
    address
        .parse::<lettre::Address>()
        .map(|_| address.to_string())
        .map_err(|e| ValidationError::new(format!("Invalid email address: {e}")))
}

/// Validate a webhook destination; unlike targets it carries its own scheme
pub fn validate_webhook_url(url: &str) -> ValidationResult<String> {
    let url = url.trim();
    if url.is_empty() {
        return Err(ValidationError::new("Webhook URL cannot be empty"));
    }

    let parsed = Url::parse(url).map_err(|e| ValidationError::new(format!("Invalid webhook URL: {e}")))?;
    match parsed.scheme() {
        "http" | "https" => {}
        scheme => {
            return Err(ValidationError::new(format!("Invalid scheme '{scheme}'. Must be http or https")));
        }
    }
    if parsed.host_str().is_none() {
        return Err(ValidationError::new("Webhook URL must have a valid host"));
    }
    Ok(url.to_string())
}
