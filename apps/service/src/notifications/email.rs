//! Email notification delivery via SMTP.
//!
//! [`EmailDelivery`] wraps the `lettre` async SMTP transport. It is only
//! constructed when an `[notifications.smtp]` section is configured.

use lettre::message::header::ContentType;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

use super::StatusChange;
use crate::config::SmtpConfig;
use crate::monitoring::transition::TransitionKind;

/// Error type for email delivery failures.
#[derive(Debug, thiserror::Error)]
pub enum EmailError {
    /// SMTP transport-level failure (authentication, connection, etc.).
    #[error("SMTP transport error: {0}")]
    Transport(#[from] lettre::transport::smtp::Error),

    /// The recipient or sender address could not be parsed.
    #[error("Email address parse error: {0}")]
    Address(#[from] lettre::address::AddressError),

    /// The MIME message could not be assembled.
    #[error("Email build error: {0}")]
    Build(String),
}

/// Sends status change emails via SMTP.
pub struct EmailDelivery {
    from: String,
    mailer: AsyncSmtpTransport<Tokio1Executor>,
}

impl EmailDelivery {
    pub fn new(config: &SmtpConfig) -> Result<Self, EmailError> {
        let mut builder =
            AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(&config.host)?.port(config.port);

        if let (Some(user), Some(password)) = (&config.user, &config.password) {
            builder = builder.credentials(Credentials::new(user.clone(), password.clone()));
        }

        Ok(Self { from: config.from.clone(), mailer: builder.build() })
    }

    /// Send a notification email for `change` to `to_email`.
    pub async fn deliver(&self, to_email: &str, change: &StatusChange) -> Result<(), EmailError> {
        let email = compose(&self.from, to_email, change)?;

        self.mailer.send(email).await?;
        tracing::info!(to = to_email, target_id = %change.target.id, "Status change email sent");
        Ok(())
    }
}

fn compose(from: &str, to: &str, change: &StatusChange) -> Result<Message, EmailError> {
    Message::builder()
        .from(from.parse()?)
        .to(to.parse()?)
        .subject(subject(change))
        .header(ContentType::TEXT_PLAIN)
        .body(body(change))
        .map_err(|e| EmailError::Build(e.to_string()))
}

fn subject(change: &StatusChange) -> String {
    let state = match change.transition {
        TransitionKind::Recovered => "is back up",
        TransitionKind::Degraded => "is down",
        _ => "changed status",
    };
    format!("[Uptime] {} {}", change.target.endpoint(), state)
}

fn body(change: &StatusChange) -> String {
    format!(
        "Target: {}\nStatus: {}\nDetails: {}\nLatency: {} ms\nTime: {}",
        change.target.endpoint(),
        change.result.status,
        change.result.descriptor,
        change.result.latency_ms,
        change.result.timestamp.to_rfc3339(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::sample_change;

    #[test]
    fn subject_names_endpoint_and_direction() {
        let change = sample_change(TransitionKind::Degraded);
        assert_eq!(subject(&change), format!("[Uptime] {} is down", change.target.endpoint()));

        let change = sample_change(TransitionKind::Recovered);
        assert!(subject(&change).ends_with("is back up"));
    }

    #[test]
    fn body_carries_result_details() {
        let change = sample_change(TransitionKind::Degraded);
        let text = body(&change);
        assert!(text.contains("Status: down"));
        assert!(text.contains(&change.result.descriptor));
    }

    #[test]
    fn compose_rejects_bad_recipient() {
        let change = sample_change(TransitionKind::Degraded);
        let err = compose("noreply@uptime.local", "not an address", &change).unwrap_err();
        assert!(matches!(err, EmailError::Address(_)));
        assert!(compose("noreply@uptime.local", "ops@example.com", &change).is_ok());
    }
}
