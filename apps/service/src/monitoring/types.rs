use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

/// Opaque identity of a monitor target.
pub type TargetId = Uuid;

/// Returned when a stored or submitted string does not name a known variant.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct ParseEnumError {
    kind: &'static str,
    value: String,
}

impl ParseEnumError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self { kind, value: value.to_string() }
    }
}

/// Protocol used to reach a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Protocol {
    Http,
    Https,
}

impl Protocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            Protocol::Http => "http",
            Protocol::Https => "https",
        }
    }
}

impl fmt::Display for Protocol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Protocol {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "http" => Ok(Protocol::Http),
            "https" => Ok(Protocol::Https),
            _ => Err(ParseEnumError::new("protocol", s)),
        }
    }
}

/// Unit of a check interval
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntervalUnit {
    Second,
    Minute,
    Hour,
    Day,
}

impl IntervalUnit {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntervalUnit::Second => "second",
            IntervalUnit::Minute => "minute",
            IntervalUnit::Hour => "hour",
            IntervalUnit::Day => "day",
        }
    }

    fn seconds(&self) -> u64 {
        match self {
            IntervalUnit::Second => 1,
            IntervalUnit::Minute => 60,
            IntervalUnit::Hour => 3600,
            IntervalUnit::Day => 86_400,
        }
    }
}

impl fmt::Display for IntervalUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntervalUnit {
    type Err = ParseEnumError;

    /// Accepts singular and plural forms (`minute`, `minutes`).
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_ascii_lowercase();
        match normalized.strip_suffix('s').unwrap_or(&normalized) {
            "second" => Ok(IntervalUnit::Second),
            "minute" => Ok(IntervalUnit::Minute),
            "hour" => Ok(IntervalUnit::Hour),
            "day" => Ok(IntervalUnit::Day),
            _ => Err(ParseEnumError::new("interval unit", s)),
        }
    }
}

/// How often a target is probed, e.g. `5 minute`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckInterval {
    pub value: u32,
    pub unit: IntervalUnit,
}

impl CheckInterval {
    pub fn new(value: u32, unit: IntervalUnit) -> Self {
        Self { value, unit }
    }

    pub fn seconds(value: u32) -> Self {
        Self::new(value, IntervalUnit::Second)
    }

    pub fn minutes(value: u32) -> Self {
        Self::new(value, IntervalUnit::Minute)
    }

    /// A zero value is never a valid schedule.
    pub fn is_valid(&self) -> bool {
        self.value > 0
    }

    pub fn as_duration(&self) -> Duration {
        Duration::from_secs(u64::from(self.value) * self.unit.seconds())
    }
}

impl fmt::Display for CheckInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.value, self.unit)
    }
}

/// Availability classification of a target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MonitorStatus {
    #[default]
    Unknown,
    Up,
    Down,
}

impl MonitorStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            MonitorStatus::Unknown => "unknown",
            MonitorStatus::Up => "up",
            MonitorStatus::Down => "down",
        }
    }
}

impl fmt::Display for MonitorStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MonitorStatus {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(MonitorStatus::Unknown),
            "up" => Ok(MonitorStatus::Up),
            "down" => Ok(MonitorStatus::Down),
            _ => Err(ParseEnumError::new("status", s)),
        }
    }
}

/// A monitored endpoint owned by a user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorTarget {
    pub id: TargetId,
    pub user_id: String,
    pub protocol: Protocol,
    /// Host and optional port/path, without a scheme (`example.com/health`).
    pub url: String,
    pub interval: CheckInterval,
    pub status: MonitorStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl MonitorTarget {
    /// Create a new, not yet observed target
    pub fn new(
        user_id: impl Into<String>,
        protocol: Protocol,
        url: impl Into<String>,
        interval: CheckInterval,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            protocol,
            url: url.into(),
            interval,
            status: MonitorStatus::Unknown,
            created_at: now,
            updated_at: now,
        }
    }

    /// Full request URL for the probe
    pub fn endpoint(&self) -> String {
        format!("{}://{}", self.protocol, self.url)
    }
}

/// What the probe executor observed, before it is stamped into a [`ProbeResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub status: MonitorStatus,
    pub descriptor: String,
    pub latency: Duration,
}

impl ProbeOutcome {
    pub fn up(status_code: u16, latency: Duration) -> Self {
        Self { status: MonitorStatus::Up, descriptor: status_code.to_string(), latency }
    }

    pub fn down(reason: impl Into<String>, latency: Duration) -> Self {
        Self { status: MonitorStatus::Down, descriptor: reason.into(), latency }
    }
}

/// One persisted probe observation. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProbeResult {
    pub id: Uuid,
    pub target_id: TargetId,
    pub status: MonitorStatus,
    /// Response code (`"200"`) or a failure reason.
    pub descriptor: String,
    pub latency_ms: u64,
    pub timestamp: DateTime<Utc>,
}

impl ProbeResult {
    pub fn from_outcome(target_id: TargetId, outcome: &ProbeOutcome, timestamp: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_id,
            status: outcome.status,
            descriptor: outcome.descriptor.clone(),
            latency_ms: u64::try_from(outcome.latency.as_millis()).unwrap_or(u64::MAX),
            timestamp,
        }
    }

    pub fn latency(&self) -> Duration {
        Duration::from_millis(self.latency_ms)
    }
}

/// Notification channel of an integration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IntegrationKind {
    Email,
    Webhook,
}

impl IntegrationKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IntegrationKind::Email => "email",
            IntegrationKind::Webhook => "webhook",
        }
    }
}

impl fmt::Display for IntegrationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for IntegrationKind {
    type Err = ParseEnumError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "email" => Ok(IntegrationKind::Email),
            "webhook" => Ok(IntegrationKind::Webhook),
            _ => Err(ParseEnumError::new("integration type", s)),
        }
    }
}

/// A user's notification destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Integration {
    pub id: Uuid,
    pub user_id: String,
    pub kind: IntegrationKind,
    /// Email address or webhook URL, depending on `kind`.
    pub destination: String,
    pub created_at: DateTime<Utc>,
}

impl Integration {
    pub fn new(user_id: impl Into<String>, kind: IntegrationKind, destination: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            user_id: user_id.into(),
            kind,
            destination: destination.into(),
            created_at: Utc::now(),
        }
    }
}
