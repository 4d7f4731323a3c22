mod common;

use std::sync::Arc;

use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::NaiveDate;
use uuid::Uuid;

use common::{InMemoryStore, RecordingBus, template_dir};
use notification_dispatch::{
    clients::{database::NotificationStore, rbmq::MessageBus},
    config::Config,
    delivery::TicketDeliveryCoordinator,
    error::DispatchError,
    models::{
        event::{TicketDeliveryMethod, TicketIssuedEvent},
        notification::{Channel, NotificationStatus},
    },
    publisher::PublisherRouter,
    qrcode::QrCodeEncoder,
    service::NotificationService,
    template::TemplateService,
};

struct Fixture {
    bus: Arc<RecordingBus>,
    store: Arc<InMemoryStore>,
    coordinator: TicketDeliveryCoordinator,
}

fn fixture() -> Fixture {
    let config = Config::load().unwrap();
    let messaging = config.messaging();

    let bus = Arc::new(RecordingBus::new());
    let store = Arc::new(InMemoryStore::new());

    let router = PublisherRouter::standard(
        Arc::clone(&bus) as Arc<dyn MessageBus>,
        &messaging,
        "notification-dispatch-test",
    );
    let service = Arc::new(NotificationService::new(
        Arc::clone(&store) as Arc<dyn NotificationStore>,
        TemplateService::new(template_dir()),
        router,
        config.max_retry_attempts,
    ));
    let encoder = Arc::new(QrCodeEncoder::new(config.image_config()));

    let coordinator =
        TicketDeliveryCoordinator::standard(service, encoder, &config.verify_base_url);

    Fixture {
        bus,
        store,
        coordinator,
    }
}

fn ticket_event(method: TicketDeliveryMethod, recipient: &str) -> TicketIssuedEvent {
    TicketIssuedEvent {
        ticket_id: Uuid::new_v4(),
        receive_method: method,
        reservation_id: Uuid::new_v4(),
        reservation_number: "R-2026-0001".into(),
        reserver_id: Uuid::new_v4(),
        recipient: recipient.into(),
        reserver_name: "김예매".into(),
        product_name: "오페라의 유령".into(),
        performance_date: NaiveDate::from_ymd_opt(2026, 9, 1)
            .unwrap()
            .and_hms_opt(19, 30, 0)
            .unwrap(),
        art_hall_name: "예술의전당".into(),
        stage_name: "오페라극장".into(),
        seat_number: "A-12".into(),
    }
}

/// Test: EMAIL receive method produces an email notification with the
/// display QR and verification URL rendered into the content
#[tokio::test]
async fn test_email_ticket_delivery_embeds_display_qr() -> Result<()> {
    let f = fixture();
    let event = ticket_event(TicketDeliveryMethod::Email, "a@b.com");

    f.coordinator.deliver_ticket(&event).await?;

    let record = f.store.get(1).unwrap();
    assert_eq!(record.channel, Channel::Email);
    assert_eq!(record.status, NotificationStatus::Processing);
    assert!(record.content.contains("data:image/png;base64,"));
    assert!(
        record.content.contains(&event.ticket_id.to_string()),
        "verification URL carries the ticket id"
    );
    assert!(record.content.contains("2026년 09월 01일 19:30"));

    let published = f.bus.published();
    assert_eq!(published.len(), 1);
    assert_eq!(published[0].routing_key, "email.send");

    Ok(())
}

/// Test: MMS receive method stores a size-capped JPEG in the option field
/// and attaches it to the outbound event (Scenario C)
#[tokio::test]
async fn test_mms_ticket_delivery_attaches_constrained_qr() -> Result<()> {
    let f = fixture();
    let event = ticket_event(TicketDeliveryMethod::Mms, "01012345678");

    f.coordinator.deliver_ticket(&event).await?;

    let record = f.store.get(1).unwrap();
    assert_eq!(record.channel, Channel::Mms);

    let option = record.option.expect("MMS notification carries the image");
    let encoded = option
        .strip_prefix("data:image/jpeg;base64,")
        .expect("option is a jpeg data uri");
    assert!(!encoded.is_empty());

    let raw = BASE64.decode(encoded)?;
    assert!(raw.len() <= 200 * 1024, "inline image respects the MMS cap");

    let published = f.bus.published();
    assert_eq!(published[0].routing_key, "mms.send");
    let payload = published[0].payload_json();
    assert_eq!(payload["phoneNumber"], "01012345678");
    assert_eq!(payload["imageBase64"], serde_json::json!(option));

    Ok(())
}

/// Test: MMS template variables omit the verification URL; the image rides
/// inline instead
#[tokio::test]
async fn test_mms_content_has_no_verify_url() -> Result<()> {
    let f = fixture();
    let event = ticket_event(TicketDeliveryMethod::Mms, "01012345678");

    f.coordinator.deliver_ticket(&event).await?;

    let record = f.store.get(1).unwrap();
    assert!(!record.content.contains("ticket/checked"));
    assert!(record.content.contains("김예매"));

    Ok(())
}

/// Test: a delivery method without a registered strategy is an
/// unsupported-method error
#[tokio::test]
async fn test_unregistered_method_is_unsupported() -> Result<()> {
    let coordinator =
        TicketDeliveryCoordinator::new(vec![], "https://example.com/ticket/checked?ticketId=");
    let event = ticket_event(TicketDeliveryMethod::Mms, "01012345678");

    let err = coordinator.deliver_ticket(&event).await.unwrap_err();
    assert!(matches!(err, DispatchError::UnsupportedMethod(_)));
    assert!(err.is_configuration());

    Ok(())
}
