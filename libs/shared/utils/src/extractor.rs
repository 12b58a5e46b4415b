use std::sync::Arc;

use axum::{
    body::Body,
    extract::State,
    http::{header::AUTHORIZATION, Request},
    middleware::Next,
    response::Response,
};
use tracing::debug;

use shared_config::AppConfig;
use shared_models::auth::{User, UserRole};
use shared_models::error::AppError;

use crate::jwt::validate_token;

/// Verifies the bearer token and stores the resulting [`User`] in the request
/// extensions for the `Extension<User>` extractor.
pub async fn auth_middleware(
    State(config): State<Arc<AppConfig>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let auth_value = request
        .headers()
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Auth("Missing authorization header".to_string()))?
        .to_str()
        .map_err(|_| AppError::Auth("Invalid authorization header format".to_string()))?;

    let token = auth_value
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::Auth("Invalid authorization header format".to_string()))?;

    let user = validate_token(token, &config.supabase_jwt_secret)
        .map_err(|e| AppError::Auth(e.to_string()))?;

    request.extensions_mut().insert(user);

    Ok(next.run(request).await)
}

/// Fails with 403 unless the user holds one of `roles`.
pub fn require_role(user: &User, roles: &[UserRole]) -> Result<UserRole, AppError> {
    match user.user_role() {
        Some(role) if roles.contains(&role) => Ok(role),
        _ => {
            debug!("User {} with role {:?} denied, requires one of {:?}", user.id, user.role, roles);
            Err(AppError::Forbidden("Insufficient permissions for this operation".to_string()))
        }
    }
}
