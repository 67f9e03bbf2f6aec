// Copyright (c) 2025 - Cowboy AI, Inc.
//! NATS event sink

use async_nats::{Client, ConnectOptions};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

use super::{EventSink, LifecycleEvent};
use crate::errors::{EventError, EventResult};

/// Configuration for NATS connection
#[derive(Debug, Clone)]
pub struct NatsConfig {
    /// NATS server URLs
    pub servers: Vec<String>,
    /// Client name
    pub name: String,
    /// Connection timeout
    pub connect_timeout: Duration,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            servers: vec!["nats://localhost:4222".to_string()],
            name: "cim-cluster".to_string(),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

impl NatsConfig {
    /// Read `NATS_URL` (comma-separated), falling back to defaults
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            servers: std::env::var("NATS_URL")
                .map(|urls| urls.split(',').map(|u| u.trim().to_string()).collect())
                .unwrap_or(defaults.servers),
            ..defaults
        }
    }
}

/// Sink publishing lifecycle events as JSON to NATS
#[derive(Clone)]
pub struct NatsEventSink {
    client: Client,
}

impl NatsEventSink {
    /// Connect to NATS
    pub async fn connect(config: NatsConfig) -> EventResult<Self> {
        let options = ConnectOptions::new()
            .name(&config.name)
            .connection_timeout(config.connect_timeout);

        let client = async_nats::connect_with_options(config.servers.join(","), options)
            .await
            .map_err(|e| EventError::Publish(e.to_string()))?;

        info!("Connected to NATS at {:?}", config.servers);
        Ok(Self { client })
    }

    /// Wrap an existing client
    pub fn from_client(client: Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl EventSink for NatsEventSink {
    async fn publish(&self, event: &LifecycleEvent) -> EventResult<()> {
        let subject = event.subject();
        let payload = serde_json::to_vec(event)?;

        self.client
            .publish(subject.clone(), payload.into())
            .await
            .map_err(|e| EventError::Publish(e.to_string()))?;

        debug!("Published lifecycle event to subject: {}", subject);
        Ok(())
    }
}
