use anyhow::Result;
use async_trait::async_trait;
use flowpay_core::{DomainEvent, EventSink};
use redis::{AsyncCommands, Client};
use serde::Serialize;

pub const ESCROW_EVENTS_CHANNEL: &str = "escrow.events";

#[derive(Clone)]
pub struct RedisBus {
    client: Client,
    channel: String,
}

impl RedisBus {
    pub fn connect(redis_url: &str) -> Result<Self> {
        let client = Client::open(redis_url)?;
        Ok(Self {
            client,
            channel: ESCROW_EVENTS_CHANNEL.to_string(),
        })
    }

    pub fn on_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = channel.into();
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub async fn publish_json<T: Serialize>(&self, channel: &str, payload: &T) -> Result<()> {
        let mut connection = self.client.get_multiplexed_async_connection().await?;
        let serialized = serde_json::to_string(payload)?;
        let _: i64 = connection.publish(channel, serialized).await?;
        Ok(())
    }
}

#[async_trait]
impl EventSink for RedisBus {
    async fn publish(&self, event: &DomainEvent) -> Result<()> {
        self.publish_json(&self.channel, event).await
    }
}
