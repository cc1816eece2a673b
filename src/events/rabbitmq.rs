// src/events/rabbitmq.rs
//! AMQP publisher

use async_trait::async_trait;
use lapin::{
    options::{BasicPublishOptions, ExchangeDeclareOptions, QueueDeclareOptions},
    types::FieldTable,
    BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind,
};
use std::collections::HashSet;
use tokio::sync::{Mutex, RwLock};
use tracing::{info, warn};

use super::{Destination, EventPublisher, PublishError};

/// Publishes persistent JSON messages. Queues and exchanges are declared
/// durable the first time something is sent to them.
pub struct RabbitMqPublisher {
    connection: Connection,
    channel: RwLock<Channel>,
    declared: Mutex<HashSet<Destination>>,
}

fn broker(e: lapin::Error) -> PublishError {
    PublishError::Broker(e.to_string())
}

impl RabbitMqPublisher {
    pub async fn connect(url: &str) -> Result<Self, PublishError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(broker)?;
        let channel = connection.create_channel().await.map_err(broker)?;

        info!("✅ Connected to RabbitMQ");

        Ok(Self {
            connection,
            channel: RwLock::new(channel),
            declared: Mutex::new(HashSet::new()),
        })
    }

    /// Current channel, recreated if the broker closed it
    async fn channel(&self) -> Result<Channel, PublishError> {
        if !self.connection.status().connected() {
            return Err(PublishError::Broker("RabbitMQ connection lost".to_string()));
        }

        {
            let channel = self.channel.read().await;
            if channel.status().connected() {
                return Ok(channel.clone());
            }
        }

        warn!("RabbitMQ channel closed, reopening");
        let fresh = self.connection.create_channel().await.map_err(broker)?;
        *self.channel.write().await = fresh.clone();
        // Declarations are per broker, but redo them in case the broker restarted
        self.declared.lock().await.clear();

        Ok(fresh)
    }

    async fn declare(
        &self,
        channel: &Channel,
        destination: Destination,
    ) -> Result<(), PublishError> {
        let mut declared = self.declared.lock().await;
        if declared.contains(&destination) {
            return Ok(());
        }

        match destination {
            Destination::Queue(name) => {
                channel
                    .queue_declare(
                        name,
                        QueueDeclareOptions {
                            durable: true,
                            ..Default::default()
                        },
                        FieldTable::default(),
                    )
                    .await
                    .map_err(broker)?;
            }
            Destination::Exchange(name) => {
                channel
                    .exchange_declare(
                        name,
                        ExchangeKind::Fanout,
                        ExchangeDeclareOptions {
                            durable: true,
                            ..Default::default()
                        },
                        FieldTable::default(),
                    )
                    .await
                    .map_err(broker)?;
            }
        }

        declared.insert(destination);
        Ok(())
    }
}

#[async_trait]
impl EventPublisher for RabbitMqPublisher {
    async fn publish(
        &self,
        destination: Destination,
        payload: Vec<u8>,
    ) -> Result<(), PublishError> {
        let channel = self.channel().await?;
        self.declare(&channel, destination).await?;

        let (exchange, routing_key) = match destination {
            Destination::Queue(name) => ("", name),
            Destination::Exchange(name) => (name, ""),
        };

        channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // Persistent
            )
            .await
            .map_err(broker)?
            .await
            .map_err(broker)?;

        Ok(())
    }
}
