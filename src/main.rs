use std::sync::Arc;

use anyhow::{Error, Result};
use tracing::info;
use tracing_subscriber::EnvFilter;

use notification_dispatch::{
    api::run_api_server,
    clients::{
        database::PgNotificationStore,
        rbmq::{MessageBus, RabbitMqClient},
    },
    config::Config,
    delivery::TicketDeliveryCoordinator,
    listener::{run_reservation_listener, run_result_listener, run_ticket_listener, supervise},
    publisher::PublisherRouter,
    qrcode::QrCodeEncoder,
    service::NotificationService,
    template::TemplateService,
};

#[tokio::main]
async fn main() -> Result<(), Error> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()))
        .init();

    let config = Config::load()?;
    let messaging = config.messaging();

    let rabbit = Arc::new(RabbitMqClient::connect(&config).await?);
    let store = Arc::new(PgNotificationStore::connect(&config.database_url).await?);

    let router = PublisherRouter::standard(
        Arc::clone(&rabbit) as Arc<dyn MessageBus>,
        &messaging,
        &config.service_name,
    );
    let templates = TemplateService::new(&config.template_dir);
    let service = Arc::new(NotificationService::new(
        store,
        templates,
        router,
        config.max_retry_attempts,
    ));

    let encoder = Arc::new(QrCodeEncoder::new(config.image_config()));
    let coordinator = Arc::new(TicketDeliveryCoordinator::standard(
        Arc::clone(&service),
        encoder,
        &config.verify_base_url,
    ));

    info!("Notification dispatch service starting");

    let reservation_task = tokio::spawn(run_reservation_listener(
        Arc::clone(&rabbit),
        Arc::clone(&service),
        messaging.reservation_completed.clone(),
    ));
    let ticket_task = tokio::spawn(run_ticket_listener(
        Arc::clone(&rabbit),
        coordinator,
        messaging.ticket_issued.clone(),
    ));
    let result_task = tokio::spawn(run_result_listener(
        Arc::clone(&rabbit),
        Arc::clone(&service),
        messaging.send_result.clone(),
    ));

    // Any listener dying is a process-level failure: without its consumer the
    // service would keep serving HTTP while messages pile up unprocessed.
    tokio::select! {
        server = run_api_server(&config, service) => {
            server.map_err(|e| anyhow::anyhow!("API server failed: {}", e))
        }
        e = supervise("reservation", reservation_task) => Err(e.into()),
        e = supervise("ticket", ticket_task) => Err(e.into()),
        e = supervise("result", result_task) => Err(e.into()),
    }
}
