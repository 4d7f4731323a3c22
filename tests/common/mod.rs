use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{
    Mutex,
    atomic::{AtomicBool, AtomicI64, Ordering},
};

use async_trait::async_trait;
use uuid::Uuid;

use notification_dispatch::{
    clients::{database::NotificationStore, rbmq::MessageBus},
    error::DispatchError,
    models::{
        event::Envelope,
        notification::{Channel, Notification},
        response::{Page, PageRequest},
    },
};

#[derive(Debug, Clone)]
pub struct PublishedMessage {
    pub exchange: String,
    pub routing_key: String,
    pub payload: Vec<u8>,
}

impl PublishedMessage {
    pub fn payload_json(&self) -> serde_json::Value {
        let envelope: Envelope = serde_json::from_slice(&self.payload).unwrap();
        envelope.payload
    }
}

/// Records publishes instead of talking to a broker; can be switched into a
/// failing mode to simulate transport faults.
#[derive(Default)]
pub struct RecordingBus {
    messages: Mutex<Vec<PublishedMessage>>,
    fail: AtomicBool,
}

impl RecordingBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    pub fn published(&self) -> Vec<PublishedMessage> {
        self.messages.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageBus for RecordingBus {
    async fn publish(
        &self,
        exchange: &str,
        routing_key: &str,
        payload: &[u8],
    ) -> Result<(), DispatchError> {
        if self.fail.load(Ordering::SeqCst) {
            return Err(DispatchError::Transport("broker unavailable".into()));
        }

        self.messages.lock().unwrap().push(PublishedMessage {
            exchange: exchange.to_string(),
            routing_key: routing_key.to_string(),
            payload: payload.to_vec(),
        });

        Ok(())
    }
}

/// In-memory stand-in for the Postgres store, with sequential id assignment.
#[derive(Default)]
pub struct InMemoryStore {
    notifications: Mutex<HashMap<i64, Notification>>,
    next_id: AtomicI64,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            notifications: Mutex::new(HashMap::new()),
            next_id: AtomicI64::new(1),
        }
    }

    pub fn get(&self, id: i64) -> Option<Notification> {
        self.notifications.lock().unwrap().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.notifications.lock().unwrap().len()
    }
}

#[async_trait]
impl NotificationStore for InMemoryStore {
    async fn save(&self, mut notification: Notification) -> Result<Notification, DispatchError> {
        let id = match notification.id {
            Some(id) => id,
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                notification.id = Some(id);
                id
            }
        };

        self.notifications
            .lock()
            .unwrap()
            .insert(id, notification.clone());

        Ok(notification)
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>, DispatchError> {
        Ok(self.notifications.lock().unwrap().get(&id).cloned())
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError> {
        Ok(self.page_of(|n| n.user_id == user_id, page))
    }

    async fn find_by_user_and_channel(
        &self,
        user_id: Uuid,
        channel: Channel,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError> {
        Ok(self.page_of(|n| n.user_id == user_id && n.channel == channel, page))
    }
}

impl InMemoryStore {
    fn page_of(
        &self,
        predicate: impl Fn(&Notification) -> bool,
        page: PageRequest,
    ) -> Page<Notification> {
        let guard = self.notifications.lock().unwrap();
        let mut matched: Vec<Notification> =
            guard.values().filter(|n| predicate(n)).cloned().collect();
        matched.sort_by_key(|n| std::cmp::Reverse(n.id));

        let total = matched.len() as u64;
        let items = matched
            .into_iter()
            .skip(page.offset() as usize)
            .take(page.limit as usize)
            .collect();

        Page {
            items,
            total,
            request: page,
        }
    }
}

pub fn template_dir() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("templates")
}
