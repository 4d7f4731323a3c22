use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::info;

use crate::error::DispatchError;
use crate::models::event::{TicketDeliveryMethod, TicketIssuedEvent};
use crate::models::notification::NotificationRequest;
use crate::qrcode::QrCodeEncoder;
use crate::service::NotificationService;

const EVENT_TYPE: &str = "TICKET_ISSUED";
const TEMPLATE_CODE: &str = "TICKET_ISSUED";
const DATE_FORMAT: &str = "%Y년 %m월 %d일 %H:%M";

/// One strategy per ticket receive method. Builds the channel-appropriate
/// template variables (rendering a verification barcode where the channel
/// embeds one) and hands off to the orchestrator.
#[async_trait]
pub trait TicketDeliveryStrategy: Send + Sync {
    fn method(&self) -> TicketDeliveryMethod;

    async fn deliver(
        &self,
        event: &TicketIssuedEvent,
        verify_url: &str,
    ) -> Result<(), DispatchError>;
}

/// Email delivery: full variable set with the verification URL and a
/// full-resolution display PNG as template fields.
pub struct EmailTicketDeliveryStrategy {
    service: Arc<NotificationService>,
    encoder: Arc<QrCodeEncoder>,
}

impl EmailTicketDeliveryStrategy {
    pub fn new(service: Arc<NotificationService>, encoder: Arc<QrCodeEncoder>) -> Self {
        Self { service, encoder }
    }
}

#[async_trait]
impl TicketDeliveryStrategy for EmailTicketDeliveryStrategy {
    fn method(&self) -> TicketDeliveryMethod {
        TicketDeliveryMethod::Email
    }

    async fn deliver(
        &self,
        event: &TicketIssuedEvent,
        verify_url: &str,
    ) -> Result<(), DispatchError> {
        let qr_code = self.encoder.encode_for_display(verify_url)?;

        let mut variables = common_variables(event);
        variables.insert(
            "reservationNumber".into(),
            json!(event.reservation_number.clone()),
        );
        variables.insert("artHallName".into(), json!(event.art_hall_name.clone()));
        variables.insert("stageName".into(), json!(event.stage_name.clone()));
        variables.insert("qrCodeImage".into(), json!(qr_code.clone()));
        variables.insert("verifyUrl".into(), json!(verify_url));

        let request = NotificationRequest {
            user_id: event.reserver_id,
            event_type: EVENT_TYPE.into(),
            channel: self.method().to_channel(),
            template_code: TEMPLATE_CODE.into(),
            recipient: event.recipient.clone(),
            template_variables: variables,
            option: Some(qr_code),
        };

        self.service.send_notification(request).await?;
        Ok(())
    }
}

/// MMS delivery: compact variable set, no URL field. The barcode goes inline
/// as a size-capped JPEG through the auxiliary option so the MMS publisher
/// can attach it as media.
pub struct MmsTicketDeliveryStrategy {
    service: Arc<NotificationService>,
    encoder: Arc<QrCodeEncoder>,
}

impl MmsTicketDeliveryStrategy {
    pub fn new(service: Arc<NotificationService>, encoder: Arc<QrCodeEncoder>) -> Self {
        Self { service, encoder }
    }
}

#[async_trait]
impl TicketDeliveryStrategy for MmsTicketDeliveryStrategy {
    fn method(&self) -> TicketDeliveryMethod {
        TicketDeliveryMethod::Mms
    }

    async fn deliver(
        &self,
        event: &TicketIssuedEvent,
        verify_url: &str,
    ) -> Result<(), DispatchError> {
        let qr_code = self.encoder.encode_for_constrained_transport(verify_url)?;

        let request = NotificationRequest {
            user_id: event.reserver_id,
            event_type: EVENT_TYPE.into(),
            channel: self.method().to_channel(),
            template_code: TEMPLATE_CODE.into(),
            recipient: event.recipient.clone(),
            template_variables: common_variables(event),
            option: Some(qr_code),
        };

        self.service.send_notification(request).await?;
        Ok(())
    }
}

fn common_variables(event: &TicketIssuedEvent) -> HashMap<String, serde_json::Value> {
    HashMap::from([
        ("ticketId".into(), json!(event.ticket_id.to_string())),
        ("reserverName".into(), json!(event.reserver_name.clone())),
        ("productName".into(), json!(event.product_name.clone())),
        (
            "performanceDate".into(),
            json!(event.performance_date.format(DATE_FORMAT).to_string()),
        ),
        ("seatNumber".into(), json!(event.seat_number.clone())),
    ])
}

/// Selects the delivery strategy for a ticket-issued event and derives the
/// verification URL from the ticket id.
pub struct TicketDeliveryCoordinator {
    strategies: HashMap<TicketDeliveryMethod, Arc<dyn TicketDeliveryStrategy>>,
    verify_base_url: String,
}

impl TicketDeliveryCoordinator {
    pub fn new(
        strategies: Vec<Arc<dyn TicketDeliveryStrategy>>,
        verify_base_url: &str,
    ) -> Self {
        let mut map: HashMap<TicketDeliveryMethod, Arc<dyn TicketDeliveryStrategy>> =
            HashMap::new();
        for strategy in strategies {
            map.entry(strategy.method()).or_insert(strategy);
        }
        Self {
            strategies: map,
            verify_base_url: verify_base_url.into(),
        }
    }

    pub fn standard(
        service: Arc<NotificationService>,
        encoder: Arc<QrCodeEncoder>,
        verify_base_url: &str,
    ) -> Self {
        Self::new(
            vec![
                Arc::new(EmailTicketDeliveryStrategy::new(
                    Arc::clone(&service),
                    Arc::clone(&encoder),
                )),
                Arc::new(MmsTicketDeliveryStrategy::new(service, encoder)),
            ],
            verify_base_url,
        )
    }

    pub async fn deliver_ticket(&self, event: &TicketIssuedEvent) -> Result<(), DispatchError> {
        let strategy = self
            .strategies
            .get(&event.receive_method)
            .ok_or_else(|| {
                DispatchError::UnsupportedMethod(event.receive_method.as_str().to_string())
            })?;

        let verify_url = format!("{}{}", self.verify_base_url, event.ticket_id);

        info!(
            ticket_id = %event.ticket_id,
            method = event.receive_method.as_str(),
            "Delivering ticket"
        );

        strategy.deliver(event, &verify_url).await
    }
}
