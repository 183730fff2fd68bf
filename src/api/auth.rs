/// Registration, login and token endpoints
use crate::{
    account::{Account, AuthResponse, ChangePasswordRequest, LoginRequest, RefreshRequest, RegisterRequest, TokenPair},
    auth::AuthContext,
    context::AppContext,
    error::AppResult,
};
use axum::{
    extract::{Query, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

pub fn routes() -> Router<AppContext> {
    Router::new()
        .route("/api/auth/register", post(register))
        .route("/api/auth/login", post(login))
        .route("/api/auth/refresh", post(refresh))
        .route("/api/auth/me", get(me))
        .route("/api/auth/check-phone", get(check_phone))
        .route("/api/auth/check-email", get(check_email))
        .route("/api/auth/change-password", post(change_password))
}

/// Create an account and log it in
async fn register(
    State(ctx): State<AppContext>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<AuthResponse>)> {
    let now = Utc::now();
    let account = ctx.account_manager.register(req, now).await?;
    let tokens = ctx.account_manager.issue_tokens(&account, now)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { account, tokens })))
}

async fn login(
    State(ctx): State<AppContext>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<AuthResponse>> {
    let response = ctx
        .account_manager
        .login(&req.phone, &req.password, Utc::now())
        .await?;
    Ok(Json(response))
}

async fn refresh(
    State(ctx): State<AppContext>,
    Json(req): Json<RefreshRequest>,
) -> AppResult<Json<TokenPair>> {
    let tokens = ctx
        .account_manager
        .refresh(&req.refresh_token, Utc::now())
        .await?;
    Ok(Json(tokens))
}

async fn me(auth: AuthContext) -> Json<Account> {
    Json(auth.account)
}

#[derive(Debug, Deserialize)]
struct CheckPhoneParams {
    phone: String,
}

#[derive(Debug, Serialize)]
struct CheckPhoneResponse {
    phone: String,
    available: bool,
}

async fn check_phone(
    State(ctx): State<AppContext>,
    Query(params): Query<CheckPhoneParams>,
) -> AppResult<Json<CheckPhoneResponse>> {
    let phone = params.phone.trim().to_string();
    let available = ctx.account_manager.is_phone_available(&phone).await?;
    Ok(Json(CheckPhoneResponse { phone, available }))
}

#[derive(Debug, Deserialize)]
struct CheckEmailParams {
    #[serde(default)]
    email: String,
}

#[derive(Debug, Serialize)]
struct CheckEmailResponse {
    email: String,
    available: bool,
}

async fn check_email(
    State(ctx): State<AppContext>,
    Query(params): Query<CheckEmailParams>,
) -> AppResult<Json<CheckEmailResponse>> {
    let email = params.email.trim().to_string();
    let available = ctx.account_manager.is_email_available(Some(&email)).await?;
    Ok(Json(CheckEmailResponse { email, available }))
}

async fn change_password(
    State(ctx): State<AppContext>,
    auth: AuthContext,
    Json(req): Json<ChangePasswordRequest>,
) -> AppResult<Json<Value>> {
    ctx.account_manager
        .change_password(auth.account_id, req)
        .await?;
    Ok(Json(json!({ "message": "Password updated" })))
}
