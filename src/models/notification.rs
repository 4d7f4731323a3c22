use std::collections::HashMap;
use std::fmt::{Display, Formatter};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub const MAX_RETRY_COUNT: u32 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Channel {
    Email,
    Sms,
    Mms,
    Chat,
}

impl Channel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Email => "EMAIL",
            Channel::Sms => "SMS",
            Channel::Mms => "MMS",
            Channel::Chat => "CHAT",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "EMAIL" => Some(Channel::Email),
            "SMS" => Some(Channel::Sms),
            "MMS" => Some(Channel::Mms),
            "CHAT" => Some(Channel::Chat),
            _ => None,
        }
    }
}

impl Display for Channel {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum NotificationStatus {
    Pending,
    Processing,
    Sent,
    Failed,
}

impl NotificationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            NotificationStatus::Pending => "PENDING",
            NotificationStatus::Processing => "PROCESSING",
            NotificationStatus::Sent => "SENT",
            NotificationStatus::Failed => "FAILED",
        }
    }

    pub fn from_str_opt(s: &str) -> Option<Self> {
        match s {
            "PENDING" => Some(NotificationStatus::Pending),
            "PROCESSING" => Some(NotificationStatus::Processing),
            "SENT" => Some(NotificationStatus::Sent),
            "FAILED" => Some(NotificationStatus::Failed),
            _ => None,
        }
    }
}

impl Display for NotificationStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One dispatch attempt's durable lifecycle record. Owned exclusively by the
/// orchestrator; `retry_count` increases only on the transition into FAILED.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Notification {
    pub id: Option<i64>,
    pub user_id: Uuid,
    pub event_type: String,
    pub channel: Channel,
    pub template_code: String,
    pub subject: Option<String>,
    pub content: String,
    pub recipient: String,
    pub status: NotificationStatus,
    pub error_message: Option<String>,
    pub sent_at: Option<DateTime<Utc>>,
    pub retry_count: u32,
    /// Auxiliary payload (e.g. a pre-rendered barcode image) carried so the
    /// channel publisher does not have to re-derive it.
    pub option: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Notification {
    #[allow(clippy::too_many_arguments)]
    pub fn create(
        user_id: Uuid,
        event_type: &str,
        channel: Channel,
        template_code: &str,
        subject: Option<String>,
        content: String,
        recipient: &str,
        option: Option<String>,
    ) -> Self {
        Self {
            id: None,
            user_id,
            event_type: event_type.to_string(),
            channel,
            template_code: template_code.to_string(),
            subject,
            content,
            recipient: recipient.to_string(),
            status: NotificationStatus::Pending,
            error_message: None,
            sent_at: None,
            retry_count: 0,
            option,
            created_at: Utc::now(),
        }
    }

    pub fn mark_as_processing(&mut self) {
        self.status = NotificationStatus::Processing;
    }

    pub fn mark_as_sent(&mut self) {
        self.status = NotificationStatus::Sent;
        self.sent_at = Some(Utc::now());
    }

    pub fn mark_as_failed(&mut self, error_message: &str) {
        self.status = NotificationStatus::Failed;
        self.error_message = Some(error_message.to_string());
        self.retry_count += 1;
    }

    pub fn can_retry(&self, max_retry_count: u32) -> bool {
        self.retry_count < max_retry_count && self.status == NotificationStatus::Failed
    }
}

/// Input to `NotificationService::send_notification`.
#[derive(Debug, Clone)]
pub struct NotificationRequest {
    pub user_id: Uuid,
    pub event_type: String,
    pub channel: Channel,
    pub template_code: String,
    pub recipient: String,
    pub template_variables: HashMap<String, serde_json::Value>,
    pub option: Option<String>,
}
