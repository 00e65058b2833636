use axum::extract::FromRequestParts;
use axum::http::header;
use axum::http::request::Parts;
use axum::http::HeaderName;
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::app::auth::AuthService;
use crate::domain::requester::Requester;
use crate::http::AppError;
use crate::AppState;

#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl AuthUser {
    pub fn requester(&self) -> Requester {
        Requester::author(self.user_id)
    }
}

/// Bearer auth for routes that also serve anonymous callers. A missing
/// header is anonymous; a bad token is still rejected.
#[derive(Debug, Clone)]
pub struct MaybeAuthUser(pub Option<AuthUser>);

#[derive(Debug, Clone)]
pub struct AdminToken;

/// Staff caller: a valid admin token, attributed to the bearer user when one
/// is also supplied.
#[derive(Debug, Clone)]
pub struct Moderator(pub Requester);

const ADMIN_TOKEN_HEADER: HeaderName = HeaderName::from_static("x-admin-token");

fn authenticate(parts: &Parts, state: &AppState) -> Result<Option<AuthUser>, AppError> {
    let Some(auth_header) = parts.headers.get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let auth_header = auth_header
        .to_str()
        .map_err(|_| AppError::unauthorized("invalid Authorization header"))?;

    let token = auth_header
        .strip_prefix("Bearer ")
        .ok_or_else(|| AppError::unauthorized("invalid Authorization header"))?;

    let service = AuthService::new(state.paseto_access_key, state.access_ttl_minutes);
    let session = service.authenticate_access_token(token).map_err(|err| {
        tracing::error!(error = ?err, "failed to authenticate");
        AppError::internal("failed to authenticate")
    })?;

    let session = session.ok_or_else(|| AppError::unauthorized("invalid token"))?;
    Ok(Some(AuthUser {
        user_id: session.user_id,
    }))
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        authenticate(parts, state)?
            .ok_or_else(|| AppError::unauthorized("missing Authorization header"))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for MaybeAuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        Ok(MaybeAuthUser(authenticate(parts, state)?))
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for AdminToken {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let expected = state
            .admin_token
            .as_ref()
            .ok_or_else(|| AppError::forbidden("admin token not configured"))?;

        let provided = parts
            .headers
            .get(ADMIN_TOKEN_HEADER)
            .and_then(|value| value.to_str().ok())
            .ok_or_else(|| AppError::forbidden("missing admin token"))?;

        if !bool::from(provided.as_bytes().ct_eq(expected.as_bytes())) {
            return Err(AppError::forbidden("invalid admin token"));
        }

        Ok(AdminToken)
    }
}

#[axum::async_trait]
impl FromRequestParts<AppState> for Moderator {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        AdminToken::from_request_parts(parts, state).await?;
        let user_id = authenticate(parts, state)?.map_or(Uuid::nil(), |user| user.user_id);
        Ok(Moderator(Requester::moderator(user_id)))
    }
}
