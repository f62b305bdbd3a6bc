use axum::extract::State;
use axum::Json;

use crate::auth::middleware::AdminUser;
use crate::auth::password::hash_password;
use crate::auth::users::Role;
use crate::dto::*;
use crate::error::AppError;
use crate::state::AppState;

/// Removes rate-limit, failed-attempt and lock records for an identifier
/// (an email, or `login:<ip>`).
pub async fn clear_rate_limits(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(body): Json<ClearRateLimitsRequest>,
) -> Result<Json<ClearRateLimitsResponse>, AppError> {
    let identifier = body.identifier.trim();
    if identifier.is_empty() {
        return Err(AppError::BadRequest("identifier is required".to_string()));
    }
    // Emails are stored lowercase by the login path.
    let identifier = if identifier.contains('@') {
        identifier.to_lowercase()
    } else {
        identifier.to_string()
    };

    let removed = state.governor.clear_rate_limits(&identifier).await?;
    tracing::info!("{} cleared rate limits for {identifier}", admin.email);
    Ok(Json(ClearRateLimitsResponse {
        success: true,
        removed,
    }))
}

pub async fn list_users(
    AdminUser(_): AdminUser,
    State(state): State<AppState>,
) -> Json<UsersResponse> {
    let users = state.users.list().iter().map(UserDto::from).collect();
    Json(UsersResponse { users })
}

pub async fn create_user(
    AdminUser(admin): AdminUser,
    State(state): State<AppState>,
    Json(body): Json<CreateUserRequest>,
) -> Result<Json<UserDto>, AppError> {
    if body.password.len() < 8 {
        return Err(AppError::BadRequest(
            "Password must be at least 8 characters".to_string(),
        ));
    }
    let password = body.password;
    let hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::Internal(e.to_string()))??;

    let user = state.users.create(
        &body.email,
        &body.name,
        hash,
        body.role.unwrap_or(Role::Member),
    )?;
    tracing::info!("{} created user {}", admin.email, user.email);
    Ok(Json(UserDto::from(&user)))
}
