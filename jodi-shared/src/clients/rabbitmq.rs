use lapin::{
    options::*, types::AMQPValue, types::FieldTable, BasicProperties, Channel, Connection,
    ConnectionProperties, Consumer,
};
use serde::Serialize;

use crate::types::Event;

const EXCHANGE_NAME: &str = "jodi.events";

#[derive(Clone)]
pub struct RabbitMQClient {
    channel: Channel,
}

impl RabbitMQClient {
    pub async fn connect(url: &str) -> Result<Self, lapin::Error> {
        let conn = Connection::connect(url, ConnectionProperties::default()).await?;
        let channel = conn.create_channel().await?;

        // Declare the topic exchange
        channel
            .exchange_declare(
                EXCHANGE_NAME,
                lapin::ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        tracing::info!(url = %url, "connected to RabbitMQ");
        Ok(Self { channel })
    }

    /// Publish an event with a routing key
    pub async fn publish<T: Serialize>(
        &self,
        routing_key: &str,
        event: &Event<T>,
    ) -> Result<(), lapin::Error> {
        let payload = serde_json::to_vec(event)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to serialize event");
                lapin::Error::IOError(std::sync::Arc::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e,
                )))
            })?;

        self.channel
            .basic_publish(
                EXCHANGE_NAME,
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                BasicProperties::default()
                    .with_content_type("application/json".into())
                    .with_delivery_mode(2), // persistent
            )
            .await?
            .await?;

        tracing::debug!(
            routing_key = %routing_key,
            event_id = %event.id,
            "event published"
        );

        Ok(())
    }

    /// Declare a durable work queue together with its delay queue.
    ///
    /// Messages published to the delay queue carry a per-message TTL and no
    /// consumer; when the TTL fires they dead-letter into the work queue via
    /// the default exchange. Bursts of enqueues for the same profile land in
    /// the work queue a few seconds apart and the idempotent handler
    /// collapses them.
    pub async fn declare_work_queue(
        &self,
        work_queue: &str,
        delay_queue: &str,
    ) -> Result<(), lapin::Error> {
        self.channel
            .queue_declare(
                work_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString("".into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(work_queue.into()),
        );

        self.channel
            .queue_declare(
                delay_queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await?;

        tracing::info!(
            work_queue = %work_queue,
            delay_queue = %delay_queue,
            "work queue declared"
        );

        Ok(())
    }

    /// Publish a job onto a work queue via the default exchange, optionally
    /// holding it in the delay queue for `delay_ms` first.
    pub async fn publish_job<T: Serialize>(
        &self,
        work_queue: &str,
        delay_queue: &str,
        job: &Event<T>,
        delay_ms: u64,
    ) -> Result<(), lapin::Error> {
        let payload = serde_json::to_vec(job)
            .map_err(|e| {
                tracing::error!(error = %e, "failed to serialize job");
                lapin::Error::IOError(std::sync::Arc::new(std::io::Error::new(
                    std::io::ErrorKind::InvalidData,
                    e,
                )))
            })?;

        let mut properties = BasicProperties::default()
            .with_content_type("application/json".into())
            .with_delivery_mode(2);

        let routing_key = if delay_ms > 0 {
            properties = properties.with_expiration(delay_ms.to_string().into());
            delay_queue
        } else {
            work_queue
        };

        self.channel
            .basic_publish(
                "",
                routing_key,
                BasicPublishOptions::default(),
                &payload,
                properties,
            )
            .await?
            .await?;

        tracing::debug!(
            queue = %routing_key,
            job_id = %job.id,
            delay_ms = delay_ms,
            "job enqueued"
        );

        Ok(())
    }

    /// Declare a queue and bind it to routing keys
    pub async fn subscribe(
        &self,
        queue_name: &str,
        routing_keys: &[&str],
    ) -> Result<Consumer, lapin::Error> {
        // Declare durable queue
        self.channel
            .queue_declare(
                queue_name,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        // Bind queue to each routing key
        for key in routing_keys {
            self.channel
                .queue_bind(
                    queue_name,
                    EXCHANGE_NAME,
                    key,
                    QueueBindOptions::default(),
                    FieldTable::default(),
                )
                .await?;
        }

        // Start consuming
        let consumer = self.channel
            .basic_consume(
                queue_name,
                &format!("{queue_name}-consumer"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(
            queue = %queue_name,
            bindings = ?routing_keys,
            "subscribed to RabbitMQ queue"
        );

        Ok(consumer)
    }

    /// Consume directly from an already-declared work queue.
    pub async fn consume(&self, queue_name: &str) -> Result<Consumer, lapin::Error> {
        let consumer = self.channel
            .basic_consume(
                queue_name,
                &format!("{queue_name}-worker"),
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        tracing::info!(queue = %queue_name, "consuming work queue");
        Ok(consumer)
    }

    pub fn channel(&self) -> &Channel {
        &self.channel
    }
}
