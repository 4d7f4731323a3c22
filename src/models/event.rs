use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::notification::{Channel, Notification};

/// Generic integration-event wrapper every message on the wire travels in.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub event_id: Uuid,
    pub occurred_at: DateTime<Utc>,
    pub source: String,
    pub payload: serde_json::Value,
}

impl Envelope {
    pub fn wrap<T: Serialize>(source: &str, payload: &T) -> Result<Self, DispatchError> {
        Ok(Self {
            event_id: Uuid::new_v4(),
            occurred_at: Utc::now(),
            source: source.to_string(),
            payload: serde_json::to_value(payload)?,
        })
    }

    pub fn payload_as<T: for<'de> Deserialize<'de>>(&self) -> Result<T, DispatchError> {
        Ok(serde_json::from_value(self.payload.clone())?)
    }
}

/// Ticket-issuance delivery method; maps 1:1 onto a channel in that context.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TicketDeliveryMethod {
    Email,
    Mms,
}

impl TicketDeliveryMethod {
    pub fn to_channel(self) -> Channel {
        match self {
            TicketDeliveryMethod::Email => Channel::Email,
            TicketDeliveryMethod::Mms => Channel::Mms,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TicketDeliveryMethod::Email => "EMAIL",
            TicketDeliveryMethod::Mms => "MMS",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReservationCompletedEvent {
    pub reservation_id: Uuid,
    pub reserver_id: Uuid,
    pub reserver_email: String,
    pub reservation_number: String,
    pub reserver_name: String,
    pub product_name: String,
    pub performance_date: NaiveDateTime,
    pub art_hall_name: String,
    pub stage_name: String,
    pub seat_number: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TicketIssuedEvent {
    pub ticket_id: Uuid,
    pub receive_method: TicketDeliveryMethod,
    pub reservation_id: Uuid,
    pub reservation_number: String,
    pub reserver_id: Uuid,
    pub recipient: String,
    pub reserver_name: String,
    pub product_name: String,
    pub performance_date: NaiveDateTime,
    pub art_hall_name: String,
    pub stage_name: String,
    pub seat_number: String,
}

/// Asynchronous send-result reported back by the external channel senders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationResultEvent {
    pub notification_id: i64,
    pub success: bool,
    #[serde(default)]
    pub error_message: Option<String>,
}

/// Outbound send-request, one variant per channel. `notification_id` is the
/// correlation key back to the notification record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SendRequest {
    #[serde(rename_all = "camelCase")]
    Email {
        notification_id: i64,
        email: String,
        subject: Option<String>,
        content: String,
        html: bool,
    },
    #[serde(rename_all = "camelCase")]
    Mms {
        notification_id: i64,
        phone_number: String,
        message: String,
        image_base64: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    Sms {
        notification_id: i64,
        phone_number: String,
        message: String,
    },
    #[serde(rename_all = "camelCase")]
    Chat {
        notification_id: i64,
        channel_id: String,
        message: String,
    },
}

impl SendRequest {
    pub fn email(notification: &Notification, id: i64, html: bool) -> Self {
        SendRequest::Email {
            notification_id: id,
            email: notification.recipient.clone(),
            subject: notification.subject.clone(),
            content: notification.content.clone(),
            html,
        }
    }

    pub fn sms(notification: &Notification, id: i64) -> Self {
        SendRequest::Sms {
            notification_id: id,
            phone_number: notification.recipient.clone(),
            message: notification.content.clone(),
        }
    }

    pub fn mms(notification: &Notification, id: i64) -> Self {
        SendRequest::Mms {
            notification_id: id,
            phone_number: notification.recipient.clone(),
            message: notification.content.clone(),
            image_base64: notification.option.clone(),
        }
    }

    pub fn chat(notification: &Notification, id: i64) -> Self {
        SendRequest::Chat {
            notification_id: id,
            channel_id: notification.recipient.clone(),
            message: notification.content.clone(),
        }
    }

    pub fn notification_id(&self) -> i64 {
        match self {
            SendRequest::Email {
                notification_id, ..
            }
            | SendRequest::Mms {
                notification_id, ..
            }
            | SendRequest::Sms {
                notification_id, ..
            }
            | SendRequest::Chat {
                notification_id, ..
            } => *notification_id,
        }
    }

    pub fn routing_key(&self) -> &'static str {
        match self {
            SendRequest::Email { .. } => "email.send",
            SendRequest::Sms { .. } => "sms.send",
            SendRequest::Mms { .. } => "mms.send",
            SendRequest::Chat { .. } => "chat.send",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_round_trips_payload() {
        let result = NotificationResultEvent {
            notification_id: 7,
            success: false,
            error_message: Some("SMTP timeout".into()),
        };

        let envelope = Envelope::wrap("notification-dispatch", &result).unwrap();
        let decoded: NotificationResultEvent = envelope.payload_as().unwrap();

        assert_eq!(decoded.notification_id, 7);
        assert!(!decoded.success);
        assert_eq!(decoded.error_message.as_deref(), Some("SMTP timeout"));
    }

    #[test]
    fn send_request_routing_keys_are_fixed_per_channel() {
        let n = Notification::create(
            Uuid::new_v4(),
            "TICKET_ISSUED",
            Channel::Sms,
            "TICKET_ISSUED",
            None,
            "body".into(),
            "01012345678",
            None,
        );

        assert_eq!(SendRequest::email(&n, 1, true).routing_key(), "email.send");
        assert_eq!(SendRequest::sms(&n, 1).routing_key(), "sms.send");
        assert_eq!(SendRequest::mms(&n, 1).routing_key(), "mms.send");
        assert_eq!(SendRequest::chat(&n, 1).routing_key(), "chat.send");
    }

    #[test]
    fn email_request_serializes_with_camel_case_fields() {
        let n = Notification::create(
            Uuid::new_v4(),
            "TICKET_ISSUED",
            Channel::Email,
            "TICKET_ISSUED",
            Some("Your ticket".into()),
            "<p>body</p>".into(),
            "a@b.com",
            None,
        );

        let json = serde_json::to_value(SendRequest::email(&n, 42, true)).unwrap();
        assert_eq!(json["notificationId"], 42);
        assert_eq!(json["email"], "a@b.com");
        assert_eq!(json["html"], true);
    }
}
