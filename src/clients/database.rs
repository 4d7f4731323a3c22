use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::DispatchError;
use crate::models::notification::{Channel, Notification, NotificationStatus};
use crate::models::response::{Page, PageRequest};

/// Persistence capability for notification records. The orchestrator only
/// needs save/find/paginated-query semantics; row-level consistency is left
/// to the backing store.
#[async_trait]
pub trait NotificationStore: Send + Sync {
    async fn save(&self, notification: Notification) -> Result<Notification, DispatchError>;

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>, DispatchError>;

    async fn find_by_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError>;

    async fn find_by_user_and_channel(
        &self,
        user_id: Uuid,
        channel: Channel,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError>;
}

pub struct PgNotificationStore {
    pool: PgPool,
}

impl PgNotificationStore {
    pub async fn connect(database_url: &str) -> Result<Self, DispatchError> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await?;

        info!("PostgreSQL connection established");

        Ok(Self { pool })
    }

    pub async fn health_check(&self) -> Result<(), DispatchError> {
        sqlx::query("SELECT 1").fetch_one(&self.pool).await?;
        Ok(())
    }

    fn from_row(row: &PgRow) -> Result<Notification, DispatchError> {
        let channel: String = row.try_get("channel")?;
        let status: String = row.try_get("status")?;

        Ok(Notification {
            id: Some(row.try_get("id")?),
            user_id: row.try_get("user_id")?,
            event_type: row.try_get("event_type")?,
            channel: Channel::from_str_opt(&channel)
                .ok_or_else(|| DispatchError::Storage(format!("unknown channel: {channel}")))?,
            template_code: row.try_get("template_code")?,
            subject: row.try_get("subject")?,
            content: row.try_get("content")?,
            recipient: row.try_get("recipient")?,
            status: NotificationStatus::from_str_opt(&status)
                .ok_or_else(|| DispatchError::Storage(format!("unknown status: {status}")))?,
            error_message: row.try_get("error_message")?,
            sent_at: row.try_get("sent_at")?,
            retry_count: row.try_get::<i32, _>("retry_count")? as u32,
            option: row.try_get("option")?,
            created_at: row.try_get("created_at")?,
        })
    }

    async fn fetch_page(
        &self,
        user_id: Uuid,
        channel: Option<Channel>,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError> {
        let rows = match channel {
            Some(channel) => {
                sqlx::query(
                    r#"
                    SELECT * FROM notifications
                    WHERE user_id = $1 AND channel = $2
                    ORDER BY id DESC
                    LIMIT $3 OFFSET $4
                    "#,
                )
                .bind(user_id)
                .bind(channel.as_str())
                .bind(page.limit as i64)
                .bind(page.offset() as i64)
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(
                    r#"
                    SELECT * FROM notifications
                    WHERE user_id = $1
                    ORDER BY id DESC
                    LIMIT $2 OFFSET $3
                    "#,
                )
                .bind(user_id)
                .bind(page.limit as i64)
                .bind(page.offset() as i64)
                .fetch_all(&self.pool)
                .await?
            }
        };

        let total: i64 = match channel {
            Some(channel) => {
                sqlx::query_scalar(
                    "SELECT COUNT(*) FROM notifications WHERE user_id = $1 AND channel = $2",
                )
                .bind(user_id)
                .bind(channel.as_str())
                .fetch_one(&self.pool)
                .await?
            }
            None => {
                sqlx::query_scalar("SELECT COUNT(*) FROM notifications WHERE user_id = $1")
                    .bind(user_id)
                    .fetch_one(&self.pool)
                    .await?
            }
        };

        let items = rows
            .iter()
            .map(Self::from_row)
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Page {
            items,
            total: total as u64,
            request: page,
        })
    }
}

#[async_trait]
impl NotificationStore for PgNotificationStore {
    async fn save(&self, mut notification: Notification) -> Result<Notification, DispatchError> {
        match notification.id {
            None => {
                let id: i64 = sqlx::query_scalar(
                    r#"
                    INSERT INTO notifications (
                        user_id, event_type, channel, template_code, subject,
                        content, recipient, status, error_message, sent_at,
                        retry_count, "option", created_at
                    )
                    VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
                    RETURNING id
                    "#,
                )
                .bind(notification.user_id)
                .bind(&notification.event_type)
                .bind(notification.channel.as_str())
                .bind(&notification.template_code)
                .bind(&notification.subject)
                .bind(&notification.content)
                .bind(&notification.recipient)
                .bind(notification.status.as_str())
                .bind(&notification.error_message)
                .bind(notification.sent_at)
                .bind(notification.retry_count as i32)
                .bind(&notification.option)
                .bind(notification.created_at)
                .fetch_one(&self.pool)
                .await?;

                notification.id = Some(id);

                debug!(notification_id = id, "Notification inserted");

                Ok(notification)
            }
            Some(id) => {
                sqlx::query(
                    r#"
                    UPDATE notifications
                    SET status = $2, error_message = $3, sent_at = $4, retry_count = $5
                    WHERE id = $1
                    "#,
                )
                .bind(id)
                .bind(notification.status.as_str())
                .bind(&notification.error_message)
                .bind(notification.sent_at)
                .bind(notification.retry_count as i32)
                .execute(&self.pool)
                .await?;

                debug!(notification_id = id, status = %notification.status, "Notification updated");

                Ok(notification)
            }
        }
    }

    async fn find_by_id(&self, id: i64) -> Result<Option<Notification>, DispatchError> {
        let row = sqlx::query("SELECT * FROM notifications WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.as_ref().map(Self::from_row).transpose()
    }

    async fn find_by_user(
        &self,
        user_id: Uuid,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError> {
        self.fetch_page(user_id, None, page).await
    }

    async fn find_by_user_and_channel(
        &self,
        user_id: Uuid,
        channel: Channel,
        page: PageRequest,
    ) -> Result<Page<Notification>, DispatchError> {
        self.fetch_page(user_id, Some(channel), page).await
    }
}
