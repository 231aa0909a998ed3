//! HTTP API
//!
//! | Method | Path | Operation |
//! |---|---|---|
//! | POST | `/users` | register |
//! | GET | `/users?id=&password=` | login |
//! | DELETE | `/users` | unregister |
//! | GET | `/users/register-info/{token}` | registration info |
//! | GET | `/users/client-code/{username}` | client archive download |
//! | GET | `/healthz` | liveness |

use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::header::{CONTENT_DISPOSITION, CONTENT_TYPE};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use tracing::info;

use gantry_common::model::{RegisterInfo, RegisterRequest};

use crate::error::ApiError;
use crate::service::TenantService;

/// Shared state for handlers
#[derive(Clone)]
pub struct AppState {
    /// Tenant operations
    pub tenants: Arc<dyn TenantService>,
}

/// Tenant name and secret
#[derive(Debug, Deserialize)]
pub struct Credentials {
    /// Tenant name
    pub id: String,
    /// Tenant secret
    pub password: String,
}

/// Response carrying a token
#[derive(Debug, Serialize)]
pub struct TokenResponse {
    /// Always true; failures use the error body
    pub success: bool,
    /// Access token
    pub token: String,
}

/// Response with no payload
#[derive(Debug, Serialize)]
pub struct SuccessResponse {
    /// Always true; failures use the error body
    pub success: bool,
}

/// Build the API router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(
            "/users",
            get(login_handler)
                .post(register_handler)
                .delete(unregister_handler),
        )
        .route("/users/register-info/{token}", get(register_info_handler))
        .route("/users/client-code/{username}", get(client_code_handler))
        .route("/healthz", get(|| async { "ok" }))
        .with_state(state)
}

/// Serve the API until the process is stopped
pub async fn serve(addr: SocketAddr, state: AppState) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "Starting Gantry API server");
    axum::serve(listener, router(state)).await
}

async fn register_handler(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.tenants.register(request).await?;
    Ok(Json(TokenResponse {
        success: true,
        token,
    }))
}

async fn login_handler(
    State(state): State<AppState>,
    Query(credentials): Query<Credentials>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state
        .tenants
        .login(&credentials.id, &credentials.password)
        .await?;
    Ok(Json(TokenResponse {
        success: true,
        token,
    }))
}

async fn unregister_handler(
    State(state): State<AppState>,
    Json(credentials): Json<Credentials>,
) -> Result<Json<SuccessResponse>, ApiError> {
    state
        .tenants
        .unregister(&credentials.id, &credentials.password)
        .await?;
    Ok(Json(SuccessResponse { success: true }))
}

async fn register_info_handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<Json<RegisterInfo>, ApiError> {
    Ok(Json(state.tenants.register_info(&token).await?))
}

async fn client_code_handler(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let artifact = state.tenants.client_artifact(&username).await?;
    let headers = [
        (CONTENT_TYPE, "application/octet-stream".to_string()),
        (
            CONTENT_DISPOSITION,
            format!("attachment; filename={}", artifact.file_name),
        ),
    ];
    Ok((headers, artifact.content))
}
