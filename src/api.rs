use std::sync::Arc;

use axum::{
    Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::get,
};
use serde::Deserialize;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::error::DispatchError;
use crate::models::notification::Channel;
use crate::models::response::{ApiResponse, NotificationResponse, PageRequest};
use crate::service::NotificationService;

pub struct AppState {
    service: Arc<NotificationService>,
}

pub fn build_router(service: Arc<NotificationService>) -> Router {
    let state = Arc::new(AppState { service });

    Router::new()
        .route("/health", get(health_check))
        .route("/api/v1/notifications/{id}", get(get_notification))
        .route(
            "/api/v1/users/{user_id}/notifications",
            get(get_user_notifications),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub async fn run_api_server(
    config: &Config,
    service: Arc<NotificationService>,
) -> Result<(), Box<dyn std::error::Error>> {
    let app = build_router(service);

    let addr = format!("0.0.0.0:{}", config.server_port);
    let listener = TcpListener::bind(&addr).await?;

    info!(address = %addr, "API server started");

    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse::success((), "healthy".to_string())),
    )
}

async fn get_notification(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> impl IntoResponse {
    match state.service.get_notification(id).await {
        Ok(notification) => (
            StatusCode::OK,
            Json(ApiResponse::success(
                NotificationResponse::from(&notification),
                "notification found".to_string(),
            )),
        ),
        Err(e) => error_response(e),
    }
}

#[derive(Debug, Deserialize)]
struct NotificationQuery {
    page: Option<u64>,
    limit: Option<u64>,
    channel: Option<String>,
}

impl NotificationQuery {
    fn page_request(&self) -> PageRequest {
        let defaults = PageRequest::default();
        PageRequest {
            page: self.page.unwrap_or(defaults.page),
            limit: self.limit.unwrap_or(defaults.limit),
        }
    }
}

async fn get_user_notifications(
    State(state): State<Arc<AppState>>,
    Path(user_id): Path<Uuid>,
    Query(query): Query<NotificationQuery>,
) -> impl IntoResponse {
    let channel = match query.channel.as_deref() {
        Some(raw) => match Channel::from_str_opt(raw) {
            Some(channel) => Some(channel),
            None => {
                return (
                    StatusCode::BAD_REQUEST,
                    Json(ApiResponse::error(
                        format!("unknown channel: {raw}"),
                        "invalid query".to_string(),
                    )),
                );
            }
        },
        None => None,
    };

    let page = query.page_request();
    let result = match channel {
        Some(channel) => {
            state
                .service
                .get_notifications_by_channel(user_id, channel, page)
                .await
        }
        None => state.service.get_notifications(user_id, page).await,
    };

    match result {
        Ok(page) => {
            let meta = page.meta();
            let items: Vec<NotificationResponse> =
                page.items.iter().map(NotificationResponse::from).collect();
            (
                StatusCode::OK,
                Json(
                    ApiResponse::success(items, "notifications listed".to_string())
                        .with_meta(meta),
                ),
            )
        }
        Err(e) => error_response(e),
    }
}

fn error_response<T>(e: DispatchError) -> (StatusCode, Json<ApiResponse<T>>) {
    let status = match &e {
        DispatchError::NotFound(_) => StatusCode::NOT_FOUND,
        _ => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (
        status,
        Json(ApiResponse::error(e.to_string(), "request failed".to_string())),
    )
}
