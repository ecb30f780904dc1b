//! `user.UserService` 的 RPC 路由

use std::collections::HashMap;

use application::{
    AccountView, LoginRequest, RecordActivityRequest, RegisterRequest, TokenPair,
    UpdateAccountRequest, UpdatePreferencesRequest,
};
use axum::{extract::State, http::HeaderMap, routing::post, Json, Router};
use chrono::{DateTime, Utc};
use domain::{AccountId, AccountRole, AiPreferences, Preferences, UserStats};
use serde::{Deserialize, Serialize};

use crate::{
    error::ApiError,
    rpc::{done, respond, Done, RpcResult},
    state::UserApiState,
};

#[derive(Debug, Deserialize)]
struct RegisterPayload {
    email: String,
    username: String,
    password: String,
    first_name: Option<String>,
    last_name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct LoginPayload {
    email: String,
    password: String,
    #[serde(default)]
    remember_me: bool,
    ip_address: Option<String>,
    user_agent: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RefreshPayload {
    refresh_token: String,
}

#[derive(Debug, Deserialize)]
struct VerifyPayload {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserIdPayload {
    user_id: String,
}

#[derive(Debug, Deserialize)]
struct UpdateUserPayload {
    user_id: String,
    username: Option<String>,
    first_name: Option<String>,
    last_name: Option<String>,
    avatar_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct UpdatePreferencesPayload {
    user_id: String,
    theme: Option<String>,
    language: Option<String>,
    timezone: Option<String>,
    notifications_enabled: Option<bool>,
    email_notifications: Option<bool>,
    push_notifications: Option<bool>,
    ai_preferences: Option<AiPreferences>,
    profile_visibility: Option<String>,
    data_sharing: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct StatsPayload {
    user_id: String,
    from: Option<DateTime<Utc>>,
    to: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize)]
struct RecordActivityPayload {
    user_id: String,
    activity_type: String,
    #[serde(default)]
    metadata: HashMap<String, String>,
    ip_address: Option<String>,
    user_agent: Option<String>,
    session_id: Option<String>,
}

#[derive(Debug, Serialize)]
struct AuthReply {
    user: AccountView,
    tokens: TokenPair,
}

#[derive(Debug, Serialize)]
struct TokensReply {
    tokens: TokenPair,
}

#[derive(Debug, Serialize)]
struct VerifyReply {
    valid: bool,
    user_id: AccountId,
    role: AccountRole,
    expires_at: i64,
    user: AccountView,
}

#[derive(Debug, Serialize)]
struct UserReply {
    user: AccountView,
}

#[derive(Debug, Serialize)]
struct PreferencesReply {
    preferences: Preferences,
}

#[derive(Debug, Serialize)]
struct StatsReply {
    stats: UserStats,
}

pub fn user_routes() -> Router<UserApiState> {
    Router::new()
        .route("/user.UserService/Register", post(register))
        .route("/user.UserService/Login", post(login))
        .route("/user.UserService/RefreshToken", post(refresh_token))
        .route("/user.UserService/VerifyToken", post(verify_token))
        .route("/user.UserService/Logout", post(logout))
        .route("/user.UserService/GetUser", post(get_user))
        .route("/user.UserService/UpdateUser", post(update_user))
        .route("/user.UserService/DeleteUser", post(delete_user))
        .route("/user.UserService/GetPreferences", post(get_preferences))
        .route("/user.UserService/UpdatePreferences", post(update_preferences))
        .route("/user.UserService/GetUserStats", post(get_user_stats))
        .route("/user.UserService/RecordActivity", post(record_activity))
}

fn header(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.split(',').next().unwrap_or(value).trim().to_owned())
        .filter(|value| !value.is_empty())
}

async fn register(
    State(state): State<UserApiState>,
    Json(payload): Json<RegisterPayload>,
) -> RpcResult<AuthReply> {
    let result = state
        .account_service
        .register(RegisterRequest {
            email: payload.email,
            username: payload.username,
            password: payload.password,
            first_name: payload.first_name,
            last_name: payload.last_name,
        })
        .await;
    respond(result, |outcome| AuthReply {
        user: outcome.account,
        tokens: outcome.tokens,
    })
}

async fn login(
    State(state): State<UserApiState>,
    headers: HeaderMap,
    Json(payload): Json<LoginPayload>,
) -> RpcResult<AuthReply> {
    let result = state
        .account_service
        .login(LoginRequest {
            email: payload.email,
            password: payload.password,
            remember_me: payload.remember_me,
            ip_address: payload
                .ip_address
                .or_else(|| header(&headers, "x-forwarded-for")),
            user_agent: payload
                .user_agent
                .or_else(|| header(&headers, "user-agent")),
        })
        .await;
    respond(result, |outcome| AuthReply {
        user: outcome.account,
        tokens: outcome.tokens,
    })
}

async fn refresh_token(
    State(state): State<UserApiState>,
    Json(payload): Json<RefreshPayload>,
) -> RpcResult<TokensReply> {
    let result = state.account_service.refresh(&payload.refresh_token).await;
    respond(result, |tokens| TokensReply { tokens })
}

async fn verify_token(
    State(state): State<UserApiState>,
    Json(payload): Json<VerifyPayload>,
) -> RpcResult<VerifyReply> {
    let result = state.account_service.verify_token(&payload.access_token).await;
    respond(result, |verified| VerifyReply {
        valid: true,
        user_id: verified.account.id,
        role: verified.claims.role,
        expires_at: verified.claims.exp,
        user: verified.account,
    })
}

async fn logout(
    State(state): State<UserApiState>,
    Json(payload): Json<UserIdPayload>,
) -> Result<Json<Done>, ApiError> {
    let result = async {
        let id = AccountId::parse("user_id", &payload.user_id)?;
        state.account_service.logout(id).await
    }
    .await;
    done(result)
}

async fn get_user(
    State(state): State<UserApiState>,
    Json(payload): Json<UserIdPayload>,
) -> RpcResult<UserReply> {
    let result = async {
        let id = AccountId::parse("user_id", &payload.user_id)?;
        state.account_service.get_account(id).await
    }
    .await;
    respond(result, |user| UserReply { user })
}

async fn update_user(
    State(state): State<UserApiState>,
    Json(payload): Json<UpdateUserPayload>,
) -> RpcResult<UserReply> {
    let result = async {
        let id = AccountId::parse("user_id", &payload.user_id)?;
        state
            .account_service
            .update_account(UpdateAccountRequest {
                account_id: id,
                username: payload.username,
                first_name: payload.first_name,
                last_name: payload.last_name,
                avatar_url: payload.avatar_url,
            })
            .await
    }
    .await;
    respond(result, |user| UserReply { user })
}

async fn delete_user(
    State(state): State<UserApiState>,
    Json(payload): Json<UserIdPayload>,
) -> Result<Json<Done>, ApiError> {
    let result = async {
        let id = AccountId::parse("user_id", &payload.user_id)?;
        state.account_service.delete_account(id).await
    }
    .await;
    done(result)
}

async fn get_preferences(
    State(state): State<UserApiState>,
    Json(payload): Json<UserIdPayload>,
) -> RpcResult<PreferencesReply> {
    let result = async {
        let id = AccountId::parse("user_id", &payload.user_id)?;
        state.account_service.get_preferences(id).await
    }
    .await;
    respond(result, |preferences| PreferencesReply { preferences })
}

async fn update_preferences(
    State(state): State<UserApiState>,
    Json(payload): Json<UpdatePreferencesPayload>,
) -> RpcResult<PreferencesReply> {
    let result = async {
        let id = AccountId::parse("user_id", &payload.user_id)?;
        state
            .account_service
            .update_preferences(UpdatePreferencesRequest {
                account_id: id,
                theme: payload.theme,
                language: payload.language,
                timezone: payload.timezone,
                notifications_enabled: payload.notifications_enabled,
                email_notifications: payload.email_notifications,
                push_notifications: payload.push_notifications,
                ai_preferences: payload.ai_preferences,
                profile_visibility: payload.profile_visibility,
                data_sharing: payload.data_sharing,
            })
            .await
    }
    .await;
    respond(result, |preferences| PreferencesReply { preferences })
}

async fn get_user_stats(
    State(state): State<UserApiState>,
    Json(payload): Json<StatsPayload>,
) -> RpcResult<StatsReply> {
    let result = async {
        let id = AccountId::parse("user_id", &payload.user_id)?;
        state
            .account_service
            .get_stats(id, payload.from, payload.to)
            .await
    }
    .await;
    respond(result, |stats| StatsReply { stats })
}

async fn record_activity(
    State(state): State<UserApiState>,
    Json(payload): Json<RecordActivityPayload>,
) -> Result<Json<Done>, ApiError> {
    let result = async {
        let id = AccountId::parse("user_id", &payload.user_id)?;
        state
            .account_service
            .record_activity(RecordActivityRequest {
                account_id: id,
                activity_type: payload.activity_type,
                metadata: payload.metadata,
                ip_address: payload.ip_address,
                user_agent: payload.user_agent,
                session_id: payload.session_id,
            })
            .await
    }
    .await;
    done(result)
}
