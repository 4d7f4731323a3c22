use async_trait::async_trait;
use lapin::{
    BasicProperties, Channel, Connection, ConnectionProperties, Consumer, ExchangeKind,
    options::{
        BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
        BasicRejectOptions, ExchangeDeclareOptions, QueueBindOptions, QueueDeclareOptions,
    },
    types::{AMQPValue, FieldTable},
};
use tracing::{debug, info};

use crate::config::{Config, MessagingConfig, StreamBinding};
use crate::error::DispatchError;

/// Outbound transport capability. Publishers depend on this instead of the
/// concrete broker client so dispatch logic is testable without a broker.
#[async_trait]
pub trait MessageBus: Send + Sync {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), DispatchError>;
}

pub struct RabbitMqClient {
    channel: Channel,
}

impl RabbitMqClient {
    pub async fn connect(config: &Config) -> Result<Self, DispatchError> {
        info!(url = %config.rabbitmq_url, "Connecting to RabbitMQ");

        let connection =
            Connection::connect(&config.rabbitmq_url, ConnectionProperties::default()).await?;

        let channel = connection.create_channel().await?;

        channel
            .basic_qos(config.prefetch_count, BasicQosOptions::default())
            .await?;

        info!("RabbitMQ channel created");

        let client = Self { channel };
        client.declare_topology(&config.messaging()).await?;

        Ok(client)
    }

    /// Declares every exchange, queue and dead-letter pair the pipeline uses.
    /// Idempotent; runs once at process start.
    async fn declare_topology(&self, messaging: &MessagingConfig) -> Result<(), DispatchError> {
        self.declare_stream(&messaging.reservation_completed)
            .await?;
        self.declare_stream(&messaging.ticket_issued).await?;
        self.declare_stream(&messaging.send_result).await?;

        for exchange in [
            &messaging.email_exchange,
            &messaging.sms_exchange,
            &messaging.mms_exchange,
            &messaging.chat_exchange,
        ] {
            self.declare_topic_exchange(exchange).await?;
        }

        info!("Messaging topology declared");

        Ok(())
    }

    /// One logical stream: topic exchange + durable queue + dead-letter
    /// exchange/queue bound under the `dlq.`-prefixed routing key. Messages
    /// rejected on the primary queue reroute to the DLQ instead of dropping.
    async fn declare_stream(&self, binding: &StreamBinding) -> Result<(), DispatchError> {
        self.declare_topic_exchange(&binding.exchange).await?;

        let dlx = binding.dead_letter_exchange();
        let dlq_routing_key = binding.dead_letter_routing_key();

        let mut args = FieldTable::default();
        args.insert(
            "x-dead-letter-exchange".into(),
            AMQPValue::LongString(dlx.clone().into()),
        );
        args.insert(
            "x-dead-letter-routing-key".into(),
            AMQPValue::LongString(dlq_routing_key.clone().into()),
        );

        self.channel
            .queue_declare(
                &binding.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                args,
            )
            .await?;

        self.channel
            .queue_bind(
                &binding.queue,
                &binding.exchange,
                &binding.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        self.declare_topic_exchange(&dlx).await?;

        let dlq = binding.dead_letter_queue();
        self.channel
            .queue_declare(
                &dlq,
                QueueDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;

        self.channel
            .queue_bind(
                &dlq,
                &dlx,
                &dlq_routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await?;

        debug!(
            exchange = %binding.exchange,
            queue = %binding.queue,
            dlq = %dlq,
            "Stream declared"
        );

        Ok(())
    }

    async fn declare_topic_exchange(&self, name: &str) -> Result<(), DispatchError> {
        self.channel
            .exchange_declare(
                name,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..Default::default()
                },
                FieldTable::default(),
            )
            .await?;
        Ok(())
    }

    pub async fn create_consumer(
        &self,
        queue: &str,
        consumer_tag: &str,
    ) -> Result<Consumer, DispatchError> {
        let consumer = self
            .channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await?;

        info!(queue, consumer_tag, "Consumer created");

        Ok(consumer)
    }

    pub async fn acknowledge(&self, delivery_tag: u64) -> Result<(), DispatchError> {
        self.channel
            .basic_ack(delivery_tag, BasicAckOptions::default())
            .await?;
        Ok(())
    }

    pub async fn reject(&self, delivery_tag: u64, requeue: bool) -> Result<(), DispatchError> {
        self.channel
            .basic_reject(delivery_tag, BasicRejectOptions { requeue })
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MessageBus for RabbitMqClient {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), DispatchError> {
        self.channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(2),
            )
            .await?;

        debug!(exchange, routing_key, bytes = payload.len(), "Published");

        Ok(())
    }
}
