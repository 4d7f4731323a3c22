use std::sync::Arc;

use tracing::{info, warn};
use uuid::Uuid;

use crate::clients::database::NotificationStore;
use crate::error::DispatchError;
use crate::models::notification::{Channel, Notification, NotificationRequest};
use crate::models::response::{Page, PageRequest};
use crate::publisher::PublisherRouter;
use crate::template::TemplateService;

/// Orchestrates the notification lifecycle: creates records, advances their
/// state and triggers publication through the channel router. The record is
/// owned exclusively by this service.
pub struct NotificationService {
    store: Arc<dyn NotificationStore>,
    templates: TemplateService,
    router: PublisherRouter,
    max_retry_count: u32,
}

impl NotificationService {
    pub fn new(
        store: Arc<dyn NotificationStore>,
        templates: TemplateService,
        router: PublisherRouter,
        max_retry_count: u32,
    ) -> Self {
        Self {
            store,
            templates,
            router,
            max_retry_count,
        }
    }

    /// Renders the templates, persists the record in PROCESSING and publishes
    /// exactly one send-request event. A publish failure propagates; the
    /// record stays persisted in PROCESSING for operational reconciliation.
    pub async fn send_notification(
        &self,
        request: NotificationRequest,
    ) -> Result<Notification, DispatchError> {
        info!(
            user_id = %request.user_id,
            event_type = %request.event_type,
            channel = %request.channel,
            "Notification requested"
        );

        let subject = self.render_subject(&request)?;
        let content = self.templates.render_template(
            &request.template_code,
            request.channel,
            &request.template_variables,
        )?;

        let mut notification = Notification::create(
            request.user_id,
            &request.event_type,
            request.channel,
            &request.template_code,
            subject,
            content,
            &request.recipient,
            request.option,
        );
        notification.mark_as_processing();

        let saved = self.store.save(notification).await?;
        info!(notification_id = saved.id, "Notification created");

        self.router
            .get_publisher(saved.channel)?
            .publish(&saved)
            .await?;

        Ok(saved)
    }

    /// Finalizes a dispatch attempt from an asynchronous send result. On
    /// failure the record transitions to FAILED and is re-published while the
    /// retry budget lasts; at the cap it stays FAILED terminally, visible to
    /// operators through the query APIs.
    pub async fn update_send_result(
        &self,
        notification_id: i64,
        success: bool,
        error_message: Option<&str>,
    ) -> Result<(), DispatchError> {
        let mut notification = self
            .store
            .find_by_id(notification_id)
            .await?
            .ok_or(DispatchError::NotFound(notification_id))?;

        if success {
            notification.mark_as_sent();
            self.store.save(notification).await?;
            info!(notification_id, "Notification sent");
            return Ok(());
        }

        notification.mark_as_failed(error_message.unwrap_or("unknown send failure"));
        let saved = self.store.save(notification).await?;

        warn!(
            notification_id,
            retry_count = saved.retry_count,
            "Notification send failed"
        );

        if saved.can_retry(self.max_retry_count) {
            info!(notification_id, "Re-publishing notification");
            self.router
                .get_publisher(saved.channel)?
                .publish_retry(&saved)
                .await?;
        } else {
            warn!(
                notification_id,
                retry_count = saved.retry_count,
                "Retry budget exhausted, notification terminally failed"
            );
        }

        Ok(())
    }

    pub async fn get_notification(
        &self,
        notification_id: i64,
    ) -> Result<Notification, DispatchError> {
        self.store
            .find_by_id(notification_id)
            .await?
            .ok_or(DispatchError::NotFound(notification_id))
    }

    pub async fn get_notifications(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError> {
        self.store.find_by_user(user_id, page).await
    }

    pub async fn get_notifications_by_channel(
        &self,
        user_id: Uuid,
        channel: Channel,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError> {
        self.store
            .find_by_user_and_channel(user_id, channel, page)
            .await
    }

    // Only EMAIL carries a rendered subject.
    fn render_subject(&self, request: &NotificationRequest) -> Result<Option<String>, DispatchError> {
        if request.channel != Channel::Email {
            return Ok(None);
        }

        self.templates
            .render_email_subject(&request.template_code, &request.template_variables)
            .map(Some)
    }
}
