use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use tracing::{debug, info};

use crate::users::model::User;

pub const USER_REGISTERED: &str = "users.event.register";
pub const USER_UPDATED: &str = "users.event.update";

/// Notification sink for user lifecycle events.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, routing_key: &str, user: &User) -> anyhow::Result<()>;
}

/// Publishes onto NATS, one subject per routing key.
pub struct NatsPublisher {
    client: async_nats::Client,
}

impl NatsPublisher {
    pub async fn connect(url: &str) -> anyhow::Result<Self> {
        let client = async_nats::ConnectOptions::new()
            .name("users-api")
            .connect(url)
            .await
            .with_context(|| format!("connect to event bus at {url}"))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, routing_key: &str, user: &User) -> anyhow::Result<()> {
        let payload = serde_json::to_vec(user).context("serialize user event")?;
        self.client
            .publish(routing_key.to_string(), Bytes::from(payload))
            .await
            .context("nats publish")?;
        debug!(routing_key, user_id = user.id, "event published");
        Ok(())
    }
}

/// Used when no event bus is configured.
pub struct LogPublisher;

#[async_trait]
impl EventPublisher for LogPublisher {
    async fn publish(&self, routing_key: &str, user: &User) -> anyhow::Result<()> {
        info!(routing_key, user_id = user.id, "event (no bus configured)");
        Ok(())
    }
}
