use actix_web::{http::header, web, HttpRequest, HttpResponse};
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::auth::gate::AuthContext;
use crate::auth::service::LoginOutcome;
use crate::db::User;
use crate::error::AppError;
use crate::AppState;

/// Fields of a request body. A body that is not a JSON object reads as
/// empty and a non-string value reads as absent, so both end up as
/// validation messages rather than transport errors.
#[derive(Debug, Default)]
pub struct BodyFields(Map<String, Value>);

impl BodyFields {
    pub fn parse(body: &[u8]) -> Self {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Self(map),
            _ => Self::default(),
        }
    }

    pub fn text(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }
}

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user: User,
}

pub async fn register(
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received registration request");
    let fields = BodyFields::parse(&body);
    let user = state
        .auth_service
        .register(fields.text("name"), fields.text("email"), fields.text("password"))
        .await?;

    Ok(HttpResponse::Ok().json(RegisterResponse {
        message: "Success!",
        user,
    }))
}

#[derive(Debug, Serialize)]
pub struct TokenResponse {
    pub success: bool,
    pub access_token: String,
    pub token_type: &'static str,
    pub expires_in: String,
    pub refresh_token_expires: String,
    pub user: User,
}

pub async fn login(
    body: web::Bytes,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    info!("Received login request");
    let fields = BodyFields::parse(&body);
    let outcome = state
        .auth_service
        .login(fields.text("email"), fields.text("password"))
        .await?;

    Ok(token_response(&state, outcome))
}

fn token_response(state: &AppState, outcome: LoginOutcome) -> HttpResponse {
    let tokens = state.auth_service.tokens();
    HttpResponse::Ok().json(TokenResponse {
        success: true,
        access_token: outcome.token.token,
        token_type: "Bearer",
        expires_in: tokens.display(outcome.token.expires_at),
        refresh_token_expires: tokens.display(outcome.token.refresh_expires_at),
        user: outcome.user,
    })
}

#[derive(Debug, Serialize)]
pub struct LogoutAck {
    pub success: bool,
    pub msg: String,
}

/// Always answers 200; failures are reported in the body.
pub async fn logout(
    auth: Result<AuthContext, AppError>,
    state: web::Data<AppState>,
) -> HttpResponse {
    let outcome = match auth {
        Ok(context) => state.auth_service.logout(&context).await,
        Err(e) => Err(e),
    };

    let ack = match outcome {
        Ok(()) => LogoutAck {
            success: true,
            msg: "User logged out!".to_string(),
        },
        Err(e) => {
            warn!("Logout failed: {}", e);
            LogoutAck {
                success: false,
                msg: failure_message(&e),
            }
        }
    };
    HttpResponse::Ok().json(ack)
}

fn failure_message(err: &AppError) -> String {
    match err {
        AppError::Auth(e) => e.to_string(),
        other => other.to_string(),
    }
}

pub async fn refresh_token(
    req: HttpRequest,
    state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let presented = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok());
    let outcome = state.auth_service.refresh_token(presented)?;
    Ok(token_response(&state, outcome))
}

pub async fn user_profile(auth: AuthContext) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "user": auth.user }))
}
