use std::collections::HashMap;
use std::sync::Arc;

use futures_util::StreamExt;
use serde_json::json;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::clients::rbmq::RabbitMqClient;
use crate::config::StreamBinding;
use crate::delivery::TicketDeliveryCoordinator;
use crate::error::DispatchError;
use crate::models::event::{Envelope, NotificationResultEvent, ReservationCompletedEvent};
use crate::models::notification::{Channel, NotificationRequest};
use crate::service::NotificationService;

const RESERVATION_EVENT_TYPE: &str = "RESERVATION_COMPLETED";
const RESERVATION_TEMPLATE_CODE: &str = "RESERVATION_SUCCESS";
const DATE_FORMAT: &str = "%Y년 %m월 %d일 %H:%M";

/// Reservation-completed notices are advisory: handler errors are logged and
/// absorbed so this stream never blocks on a poison message.
pub async fn run_reservation_listener(
    rabbit: Arc<RabbitMqClient>,
    service: Arc<NotificationService>,
    binding: StreamBinding,
) -> Result<(), DispatchError> {
    let mut consumer = rabbit
        .create_consumer(&binding.queue, "reservation_worker")
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, queue = %binding.queue, "Consumer stream error");
                continue;
            }
        };

        if let Err(e) = handle_reservation_completed(&service, &delivery.data).await {
            error!(error = %e, "Reservation-completed handling failed");
        }

        rabbit.acknowledge(delivery.delivery_tag).await?;
    }

    Ok(())
}

async fn handle_reservation_completed(
    service: &NotificationService,
    data: &[u8],
) -> Result<(), DispatchError> {
    let envelope: Envelope = serde_json::from_slice(data)?;
    let payload: ReservationCompletedEvent = envelope.payload_as()?;

    info!(
        reservation_id = %payload.reservation_id,
        user_id = %payload.reserver_id,
        "Reservation-completed event received"
    );

    let request = NotificationRequest {
        user_id: payload.reserver_id,
        event_type: RESERVATION_EVENT_TYPE.into(),
        channel: Channel::Email,
        template_code: RESERVATION_TEMPLATE_CODE.into(),
        recipient: payload.reserver_email.clone(),
        template_variables: reservation_variables(&payload),
        option: None,
    };

    service.send_notification(request).await?;

    info!(reservation_id = %payload.reservation_id, "Reservation notification dispatched");

    Ok(())
}

fn reservation_variables(
    event: &ReservationCompletedEvent,
) -> HashMap<String, serde_json::Value> {
    HashMap::from([
        (
            "reservationNumber".into(),
            json!(event.reservation_number.clone()),
        ),
        ("reserverName".into(), json!(event.reserver_name.clone())),
        ("productName".into(), json!(event.product_name.clone())),
        (
            "performanceDate".into(),
            json!(event.performance_date.format(DATE_FORMAT).to_string()),
        ),
        ("artHallName".into(), json!(event.art_hall_name.clone())),
        ("stageName".into(), json!(event.stage_name.clone())),
        ("seatNumber".into(), json!(event.seat_number.clone())),
    ])
}

/// Ticket issuance is not advisory: a failed handling is rejected without
/// requeue so the broker dead-letters the message for inspection/replay.
pub async fn run_ticket_listener(
    rabbit: Arc<RabbitMqClient>,
    coordinator: Arc<TicketDeliveryCoordinator>,
    binding: StreamBinding,
) -> Result<(), DispatchError> {
    let mut consumer = rabbit
        .create_consumer(&binding.queue, "ticket_worker")
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, queue = %binding.queue, "Consumer stream error");
                continue;
            }
        };

        match handle_ticket_issued(&coordinator, &delivery.data).await {
            Ok(()) => rabbit.acknowledge(delivery.delivery_tag).await?,
            Err(e) => {
                error!(error = %e, "Ticket-issued handling failed, dead-lettering");
                rabbit.reject(delivery.delivery_tag, false).await?;
            }
        }
    }

    Ok(())
}

async fn handle_ticket_issued(
    coordinator: &TicketDeliveryCoordinator,
    data: &[u8],
) -> Result<(), DispatchError> {
    let envelope: Envelope = serde_json::from_slice(data)?;
    let payload = envelope.payload_as()?;

    coordinator.deliver_ticket(&payload).await?;

    Ok(())
}

/// Send-result handling always finalizes notification state; failures are
/// logged but never re-raised into the broker.
pub async fn run_result_listener(
    rabbit: Arc<RabbitMqClient>,
    service: Arc<NotificationService>,
    binding: StreamBinding,
) -> Result<(), DispatchError> {
    let mut consumer = rabbit
        .create_consumer(&binding.queue, "result_worker")
        .await?;

    while let Some(delivery) = consumer.next().await {
        let delivery = match delivery {
            Ok(delivery) => delivery,
            Err(e) => {
                error!(error = %e, queue = %binding.queue, "Consumer stream error");
                continue;
            }
        };

        if let Err(e) = handle_send_result(&service, &delivery.data).await {
            warn!(error = %e, "Send-result handling failed");
        }

        rabbit.acknowledge(delivery.delivery_tag).await?;
    }

    Ok(())
}

/// Resolves when a spawned listener task finishes for any reason. A consumer
/// that stops consuming is an outage even when it exits cleanly (the broker
/// closing the stream makes the loop end with `Ok`), so every outcome maps to
/// an error the supervisor can act on.
pub async fn supervise(
    name: &'static str,
    handle: JoinHandle<Result<(), DispatchError>>,
) -> DispatchError {
    match handle.await {
        Ok(Ok(())) => {
            error!(listener = name, "Listener stream ended");
            DispatchError::Transport(format!("{name} listener stream ended"))
        }
        Ok(Err(e)) => {
            error!(listener = name, error = %e, "Listener failed");
            e
        }
        Err(e) => {
            error!(listener = name, error = %e, "Listener task aborted");
            DispatchError::Transport(format!("{name} listener task aborted: {e}"))
        }
    }
}

async fn handle_send_result(
    service: &NotificationService,
    data: &[u8],
) -> Result<(), DispatchError> {
    let envelope: Envelope = serde_json::from_slice(data)?;
    let payload: NotificationResultEvent = envelope.payload_as()?;

    info!(
        notification_id = payload.notification_id,
        success = payload.success,
        "Send result received"
    );

    service
        .update_send_result(
            payload.notification_id,
            payload.success,
            payload.error_message.as_deref(),
        )
        .await
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Test: a listener task that ends cleanly is still reported as an
    /// outage so the process does not keep running without consumers
    #[tokio::test]
    async fn supervise_maps_clean_exit_to_error() {
        let handle = tokio::spawn(async { Ok(()) });

        let err = supervise("reservation", handle).await;

        assert!(matches!(err, DispatchError::Transport(_)));
        assert!(err.to_string().contains("reservation"));
    }

    /// Test: a listener failure surfaces unchanged through the supervisor
    #[tokio::test]
    async fn supervise_propagates_listener_error() {
        let handle =
            tokio::spawn(async { Err(DispatchError::Transport("connection reset".into())) });

        let err = supervise("ticket", handle).await;

        assert!(err.to_string().contains("connection reset"));
    }
}
