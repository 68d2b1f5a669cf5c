/// Notification fan-out for status changes
///
/// The scheduler hands every degraded/recovered transition to a
/// [`Notifier`]. The production implementation looks up the owner's
/// integrations and delivers over each configured channel.
pub mod email;
pub mod webhook;

use async_trait::async_trait;
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;

use crate::config::NotificationConfig;
use crate::database::Database;
use crate::error::StoreError;
use crate::monitoring::transition::TransitionKind;
use crate::monitoring::types::{Integration, IntegrationKind, MonitorTarget, ProbeResult};
use email::{EmailDelivery, EmailError};
use webhook::{WebhookDelivery, WebhookError};

/// A notifiable change in a target's availability
#[derive(Debug, Clone, Serialize)]
pub struct StatusChange {
    pub user_id: String,
    pub target: MonitorTarget,
    pub transition: TransitionKind,
    pub result: ProbeResult,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("failed to load integrations: {0}")]
    Store(#[from] StoreError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    #[error(transparent)]
    Email(#[from] EmailError),

    #[error("{failed} of {attempted} deliveries failed")]
    Partial { failed: usize, attempted: usize },
}

/// Receives status changes from the scheduler. Callers do not wait on
/// delivery, so implementations may take as long as they need.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError>;
}

/// Delivers a change to every integration of the target's owner
pub struct NotificationDispatcher {
    database: Arc<dyn Database>,
    webhook: WebhookDelivery,
    email: Option<EmailDelivery>,
}

impl NotificationDispatcher {
    pub fn new(database: Arc<dyn Database>, webhook: WebhookDelivery, email: Option<EmailDelivery>) -> Self {
        Self { database, webhook, email }
    }

    pub fn from_config(database: Arc<dyn Database>, config: &NotificationConfig) -> Result<Self, NotifyError> {
        let webhook = WebhookDelivery::new(config.webhook_timeout(), config.webhook_retries)?;
        let email = config.smtp.as_ref().map(EmailDelivery::new).transpose()?;
        if email.is_none() {
            tracing::info!("SMTP not configured, email integrations will be skipped");
        }
        Ok(Self::new(database, webhook, email))
    }

    async fn deliver(&self, integration: &Integration, change: &StatusChange) -> Result<bool, NotifyError> {
        match integration.kind {
            IntegrationKind::Webhook => {
                self.webhook.deliver(&integration.destination, change).await?;
                Ok(true)
            }
            IntegrationKind::Email => match &self.email {
                Some(mailer) => {
                    mailer.deliver(&integration.destination, change).await?;
                    Ok(true)
                }
                None => {
                    tracing::warn!(integration_id = %integration.id, "Skipping email integration, SMTP is not configured");
                    Ok(false)
                }
            },
        }
    }
}

#[async_trait]
impl Notifier for NotificationDispatcher {
    async fn notify(&self, change: &StatusChange) -> Result<(), NotifyError> {
        let integrations = self.database.list_integrations(&change.user_id).await?;
        if integrations.is_empty() {
            tracing::debug!(user_id = %change.user_id, "No integrations configured, nothing to notify");
            return Ok(());
        }

        let outcomes =
            futures::future::join_all(integrations.iter().map(|i| self.deliver(i, change))).await;

        let mut failed = 0;
        for (integration, outcome) in integrations.iter().zip(&outcomes) {
            if let Err(e) = outcome {
                failed += 1;
                tracing::warn!(
                    integration_id = %integration.id,
                    kind = %integration.kind,
                    error = %e,
                    "Notification delivery failed"
                );
            }
        }

        if failed > 0 {
            return Err(NotifyError::Partial { failed, attempted: integrations.len() });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{MemoryStore, sample_change, spawn_http_stub};
    use std::time::Duration;

    fn dispatcher(store: Arc<MemoryStore>) -> NotificationDispatcher {
        let webhook = WebhookDelivery::with_backoff(Duration::from_secs(5), 0, Duration::from_millis(1)).unwrap();
        NotificationDispatcher::new(store, webhook, None)
    }

    #[tokio::test]
    async fn no_integrations_is_ok() {
        let store = Arc::new(MemoryStore::default());
        dispatcher(store).notify(&sample_change(TransitionKind::Degraded)).await.unwrap();
    }

    #[tokio::test]
    async fn delivers_to_every_webhook_of_the_owner() {
        let first = spawn_http_stub(200, Duration::ZERO).await;
        let second = spawn_http_stub(204, Duration::ZERO).await;
        let other_user = spawn_http_stub(200, Duration::ZERO).await;

        let change = sample_change(TransitionKind::Degraded);
        let store = Arc::new(MemoryStore::default());
        for (user, stub) in [(&change.user_id, &first), (&change.user_id, &second)] {
            store.insert_integration(Integration::new(user.as_str(), IntegrationKind::Webhook, format!("http://{}/", stub.addr)));
        }
        store.insert_integration(Integration::new("someone-else", IntegrationKind::Webhook, format!("http://{}/", other_user.addr)));

        dispatcher(store).notify(&change).await.unwrap();
        assert_eq!(first.hits(), 1);
        assert_eq!(second.hits(), 1);
        assert_eq!(other_user.hits(), 0);
    }

    #[tokio::test]
    async fn one_failing_channel_does_not_block_the_rest() {
        let good = spawn_http_stub(200, Duration::ZERO).await;
        let bad = spawn_http_stub(500, Duration::ZERO).await;

        let change = sample_change(TransitionKind::Recovered);
        let store = Arc::new(MemoryStore::default());
        store.insert_integration(Integration::new(change.user_id.as_str(), IntegrationKind::Webhook, format!("http://{}/", bad.addr)));
        store.insert_integration(Integration::new(change.user_id.as_str(), IntegrationKind::Webhook, format!("http://{}/", good.addr)));

        let err = dispatcher(store).notify(&change).await.unwrap_err();
        assert!(matches!(err, NotifyError::Partial { failed: 1, attempted: 2 }));
        assert_eq!(good.hits(), 1);
    }

    #[tokio::test]
    async fn email_without_smtp_is_skipped() {
        let change = sample_change(TransitionKind::Degraded);
        let store = Arc::new(MemoryStore::default());
        store.insert_integration(Integration::new(change.user_id.as_str(), IntegrationKind::Email, "ops@example.com"));

        dispatcher(store).notify(&change).await.unwrap();
    }
}
