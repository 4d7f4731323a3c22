use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{error, info};

use crate::clients::rbmq::MessageBus;
use crate::config::MessagingConfig;
use crate::error::DispatchError;
use crate::models::event::{Envelope, SendRequest};
use crate::models::notification::{Channel, Notification};

/// Outbound adapter for one channel. `publish_retry` defaults to `publish`;
/// a publisher may override it to frame the event as a resend downstream.
#[async_trait]
pub trait NotificationPublisher: Send + Sync {
    fn channel(&self) -> Channel;

    fn supports(&self, channel: Channel) -> bool {
        self.channel() == channel
    }

    async fn publish(&self, notification: &Notification) -> Result<(), DispatchError>;

    async fn publish_retry(&self, notification: &Notification) -> Result<(), DispatchError> {
        self.publish(notification).await
    }
}

impl std::fmt::Debug for dyn NotificationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPublisher")
            .field("channel", &self.channel())
            .finish()
    }
}

async fn publish_envelope(
    bus: &dyn MessageBus,
    service_name: &str,
    exchange: &str,
    event: &SendRequest,
) -> Result<(), DispatchError> {
    let envelope = Envelope::wrap(service_name, event)?;
    let payload = serde_json::to_vec(&envelope)?;

    match bus.publish(exchange, event.routing_key(), &payload).await {
        Ok(()) => {
            info!(
                notification_id = event.notification_id(),
                exchange,
                routing_key = event.routing_key(),
                "Send-request event published"
            );
            Ok(())
        }
        Err(e) => {
            // A publish the broker never accepted must surface to the caller
            // so the persisted record state stays consistent with reality.
            error!(
                notification_id = event.notification_id(),
                exchange,
                routing_key = event.routing_key(),
                error = %e,
                "Send-request publish failed"
            );
            Err(e)
        }
    }
}

fn persisted_id(notification: &Notification) -> Result<i64, DispatchError> {
    notification
        .id
        .ok_or_else(|| DispatchError::Storage("cannot publish an unsaved notification".into()))
}

pub struct EmailNotificationPublisher {
    bus: Arc<dyn MessageBus>,
    exchange: String,
    service_name: String,
}

impl EmailNotificationPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, exchange: &str, service_name: &str) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl NotificationPublisher for EmailNotificationPublisher {
    fn channel(&self) -> Channel {
        Channel::Email
    }

    async fn publish(&self, notification: &Notification) -> Result<(), DispatchError> {
        let id = persisted_id(notification)?;
        let event = SendRequest::email(notification, id, true);
        publish_envelope(self.bus.as_ref(), &self.service_name, &self.exchange, &event).await
    }
}

pub struct SmsNotificationPublisher {
    bus: Arc<dyn MessageBus>,
    exchange: String,
    service_name: String,
}

impl SmsNotificationPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, exchange: &str, service_name: &str) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl NotificationPublisher for SmsNotificationPublisher {
    fn channel(&self) -> Channel {
        Channel::Sms
    }

    async fn publish(&self, notification: &Notification) -> Result<(), DispatchError> {
        let id = persisted_id(notification)?;
        let event = SendRequest::sms(notification, id);
        publish_envelope(self.bus.as_ref(), &self.service_name, &self.exchange, &event).await
    }
}

pub struct MmsNotificationPublisher {
    bus: Arc<dyn MessageBus>,
    exchange: String,
    service_name: String,
}

impl MmsNotificationPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, exchange: &str, service_name: &str) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl NotificationPublisher for MmsNotificationPublisher {
    fn channel(&self) -> Channel {
        Channel::Mms
    }

    /// The inline image rides in the record's `option` field, pre-rendered
    /// by the delivery strategy, so no re-derivation happens here.
    async fn publish(&self, notification: &Notification) -> Result<(), DispatchError> {
        let id = persisted_id(notification)?;
        let event = SendRequest::mms(notification, id);
        publish_envelope(self.bus.as_ref(), &self.service_name, &self.exchange, &event).await
    }
}

pub struct ChatNotificationPublisher {
    bus: Arc<dyn MessageBus>,
    exchange: String,
    service_name: String,
}

impl ChatNotificationPublisher {
    pub fn new(bus: Arc<dyn MessageBus>, exchange: &str, service_name: &str) -> Self {
        Self {
            bus,
            exchange: exchange.into(),
            service_name: service_name.into(),
        }
    }
}

#[async_trait]
impl NotificationPublisher for ChatNotificationPublisher {
    fn channel(&self) -> Channel {
        Channel::Chat
    }

    async fn publish(&self, notification: &Notification) -> Result<(), DispatchError> {
        let id = persisted_id(notification)?;
        let event = SendRequest::chat(notification, id);
        publish_envelope(self.bus.as_ref(), &self.service_name, &self.exchange, &event).await
    }
}

/// Channel-to-publisher registry built once at startup. Lookup is O(1); a
/// channel without a registered adapter is a configuration error, surfaced
/// rather than silently dropped.
pub struct PublisherRouter {
    publishers: HashMap<Channel, Arc<dyn NotificationPublisher>>,
}

impl PublisherRouter {
    pub fn new(publishers: Vec<Arc<dyn NotificationPublisher>>) -> Self {
        let mut map: HashMap<Channel, Arc<dyn NotificationPublisher>> = HashMap::new();
        for publisher in publishers {
            map.entry(publisher.channel()).or_insert(publisher);
        }
        Self { publishers: map }
    }

    /// Registry covering every channel, wired to the channel exchanges.
    pub fn standard(
        bus: Arc<dyn MessageBus>,
        messaging: &MessagingConfig,
        service_name: &str,
    ) -> Self {
        Self::new(vec![
            Arc::new(EmailNotificationPublisher::new(
                Arc::clone(&bus),
                &messaging.email_exchange,
                service_name,
            )),
            Arc::new(SmsNotificationPublisher::new(
                Arc::clone(&bus),
                &messaging.sms_exchange,
                service_name,
            )),
            Arc::new(MmsNotificationPublisher::new(
                Arc::clone(&bus),
                &messaging.mms_exchange,
                service_name,
            )),
            Arc::new(ChatNotificationPublisher::new(
                Arc::clone(&bus),
                &messaging.chat_exchange,
                service_name,
            )),
        ])
    }

    pub fn get_publisher(
        &self,
        channel: Channel,
    ) -> Result<&Arc<dyn NotificationPublisher>, DispatchError> {
        self.publishers
            .get(&channel)
            .ok_or(DispatchError::UnsupportedChannel(channel))
    }
}
