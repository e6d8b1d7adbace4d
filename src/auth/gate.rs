//! Bearer-token gate for protected routes.
//!
//! `require_auth` runs before the handler and short-circuits with
//! 401 `{"error": "Unauthenticated"}` when the request carries no usable
//! token. On success the verified [`AuthContext`] is stored in the request
//! extensions, where the `AuthContext` extractor picks it up.

use actix_web::body::MessageBody;
use actix_web::dev::{Payload, ServiceRequest, ServiceResponse};
use actix_web::http::header;
use actix_web::middleware::Next;
use actix_web::{web, Error, FromRequest, HttpMessage, HttpRequest, ResponseError};
use chrono::{DateTime, Utc};
use futures::future::{ready, FutureExt, LocalBoxFuture};
use tracing::warn;
use uuid::Uuid;

use crate::db::User;
use crate::error::{AppError, AuthError};
use crate::AppState;

/// Identity attached to a request whose bearer token checked out.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
    pub token_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

/// Extracts the token from `Authorization: Bearer <token>`.
pub fn bearer_token(req: &HttpRequest) -> Result<&str, AuthError> {
    let value = req
        .headers()
        .get(header::AUTHORIZATION)
        .ok_or(AuthError::MissingToken)?
        .to_str()
        .map_err(|_| AuthError::InvalidToken)?;

    let (scheme, token) = value.trim().split_once(' ').ok_or(AuthError::InvalidToken)?;
    let token = token.trim();
    if !scheme.eq_ignore_ascii_case("bearer") || token.is_empty() {
        return Err(AuthError::InvalidToken);
    }
    Ok(token)
}

pub async fn authenticate(req: &HttpRequest) -> Result<AuthContext, AppError> {
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::Internal("application state not configured".into()))?;
    let token = bearer_token(req)?;
    state.auth_service.verify_token(token).await
}

pub async fn require_auth(
    req: ServiceRequest,
    next: Next<impl MessageBody + 'static>,
) -> Result<ServiceResponse<impl MessageBody>, Error> {
    let outcome = authenticate(req.request()).await;
    match outcome {
        Ok(context) => {
            req.extensions_mut().insert(context);
            next.call(req).await.map(ServiceResponse::map_into_left_body)
        }
        Err(e) => {
            warn!(path = %req.path(), reason = %e, "Rejected unauthenticated request");
            let response = e.error_response();
            Ok(req.into_response(response).map_into_right_body())
        }
    }
}

impl FromRequest for AuthContext {
    type Error = AppError;
    type Future = LocalBoxFuture<'static, Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        if let Some(context) = req.extensions().get::<AuthContext>().cloned() {
            return ready(Ok(context)).boxed_local();
        }

        // Ungated route: verify the header here instead.
        let req = req.clone();
        async move { authenticate(&req).await }.boxed_local()
    }
}
