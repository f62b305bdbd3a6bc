use std::time::Duration;

use axum::extract::State;
use axum::Json;

use crate::auth::jwt;
use crate::auth::middleware::AuthUser;
use crate::auth::password::verify_password_blocking;
use crate::auth::users::normalize_email;
use crate::client_ip::ClientIp;
use crate::dto::*;
use crate::error::AppError;
use crate::state::AppState;

const INVALID_CREDENTIALS: &str = "Invalid email or password";
const RATE_LIMITED: &str = "Too many login attempts. Please try again later.";

fn locked_message(remaining: Duration) -> String {
    let minutes = remaining.as_secs().div_ceil(60).max(1);
    format!("Account is temporarily locked. Try again in {minutes} minute(s).")
}

/// Password login guarded by per-IP and per-email rate limits and by the
/// per-email lockout.
pub async fn login(
    State(state): State<AppState>,
    ClientIp(ip): ClientIp,
    Json(body): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    let email = normalize_email(&body.email);
    if email.is_empty() || body.password.is_empty() {
        return Err(AppError::BadRequest(
            "Email and password are required".to_string(),
        ));
    }

    let governor = &state.governor;
    let ip_limited = governor.check_rate(&format!("login:{ip}"), "login").await;
    let email_limited = governor.check_rate(&email, "login").await;
    if *ip_limited.value() || *email_limited.value() {
        tracing::warn!("Login rate limit hit for {email} from {ip}");
        return Err(AppError::RateLimited(RATE_LIMITED.to_string()));
    }

    let lock = governor.lock_state(&email).await.into_value();
    if let Some(remaining) = lock.remaining {
        tracing::warn!("Login attempt for locked account {email} from {ip}");
        return Err(AppError::Locked(locked_message(remaining)));
    }

    let user = state.users.find_by_email(&email);
    let valid = match &user {
        Some(user) => {
            verify_password_blocking(user.password_hash.clone(), body.password.clone()).await?
        }
        None => false,
    };

    let user = match user {
        Some(user) if valid => user,
        _ => {
            let attempts = governor.record_failed_attempt(&email).await.into_value();
            tracing::warn!("Failed login attempt for {email} from {ip} ({attempts} recent)");
            return Err(AppError::Auth(INVALID_CREDENTIALS.to_string()));
        }
    };

    governor.reset_failed_attempts(&email).await;
    let (token, expires_at) = jwt::create_token(
        &state.config.auth.jwt_secret,
        state.config.auth.jwt_ttl_hours,
        &user,
    )?;
    tracing::info!("User {email} logged in");

    Ok(Json(LoginResponse {
        token,
        expires_at,
        user: UserDto::from(&user),
    }))
}

pub async fn me(user: AuthUser, State(state): State<AppState>) -> Result<Json<UserDto>, AppError> {
    let record = state
        .users
        .find_by_id(&user.id)
        .ok_or_else(|| AppError::NotFound("User not found".to_string()))?;
    Ok(Json(UserDto::from(&record)))
}
