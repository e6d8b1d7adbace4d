use std::sync::Arc;
use chrono::Utc;
use tracing::{info, warn};

use crate::auth::gate::AuthContext;
use crate::auth::password::{hash_password, verify_password};
use crate::auth::revocation::RevokedTokens;
use crate::auth::token::{IssuedToken, TokenIssuer};
use crate::auth::validation::{self, Layout, ValidationErrors};
use crate::db::{User, UserStore};
use crate::error::{AppError, AuthError, DatabaseError};

pub const EMAIL_TAKEN: &str = "The email has already been taken.";

/// Emails are stored and looked up lower-cased, so uniqueness ignores case.
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// A freshly issued token together with the user it was issued to.
#[derive(Debug, Clone)]
pub struct LoginOutcome {
    pub token: IssuedToken,
    pub user: User,
}

pub struct AuthService {
    store: Arc<dyn UserStore>,
    tokens: TokenIssuer,
    revoked: RevokedTokens,
}

impl AuthService {
    pub fn new(store: Arc<dyn UserStore>, tokens: TokenIssuer, revoked: RevokedTokens) -> Self {
        Self {
            store,
            tokens,
            revoked,
        }
    }

    pub fn tokens(&self) -> &TokenIssuer {
        &self.tokens
    }

    pub fn revoked(&self) -> &RevokedTokens {
        &self.revoked
    }

    pub async fn register(
        &self,
        name: Option<&str>,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<User, AppError> {
        let mut errors = ValidationErrors::new(Layout::Messages);
        let name = validation::required(&mut errors, "name", name);
        let email = validation::email(&mut errors, email).map(normalize_email);
        if let Some(email) = &email {
            if self.store.get_user_by_email(email).await?.is_some() {
                errors.add("email", EMAIL_TAKEN);
            }
        }
        let password = validation::password(&mut errors, password);

        let (name, email, password) = match (name, email, password) {
            (Some(name), Some(email), Some(password)) if errors.is_empty() => (name, email, password),
            _ => return Err(errors.into()),
        };

        let password_hash = hash_password(password).await?;
        let user = User::new(name.to_string(), email, password_hash);

        match self.store.create_user(&user).await {
            Ok(user) => {
                info!(user_id = %user.id, "User registered");
                Ok(user)
            }
            // Lost a race with a concurrent registration for the same email.
            Err(AppError::Database(DatabaseError::Duplicate)) => {
                let mut errors = ValidationErrors::new(Layout::Messages);
                errors.add("email", EMAIL_TAKEN);
                Err(errors.into())
            }
            Err(e) => Err(e),
        }
    }

    pub async fn login(
        &self,
        email: Option<&str>,
        password: Option<&str>,
    ) -> Result<LoginOutcome, AppError> {
        let mut errors = ValidationErrors::new(Layout::ByField);
        let email = validation::email(&mut errors, email).map(normalize_email);
        let password = validation::password(&mut errors, password);

        let (email, password) = match (email, password) {
            (Some(email), Some(password)) => (email, password),
            _ => return Err(errors.into()),
        };

        let user = match self.store.get_user_by_email(&email).await? {
            Some(user) => user,
            None => {
                warn!("Login attempt for unknown email");
                return Err(AuthError::InvalidCredentials.into());
            }
        };

        if !verify_password(password, &user.password_hash).await? {
            warn!(user_id = %user.id, "Login attempt with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        let token = self.tokens.issue(&user, Utc::now())?;
        info!(user_id = %user.id, token_id = %token.token_id, "Token issued");

        Ok(LoginOutcome { token, user })
    }

    /// Revokes the caller's token until it would have expired anyway.
    pub async fn logout(&self, context: &AuthContext) -> Result<(), AppError> {
        self.revoked.revoke(context.token_id, context.expires_at).await;
        info!(user_id = %context.user.id, token_id = %context.token_id, "Token revoked");
        Ok(())
    }

    /// Refresh issuance is not supported; every request is refused.
    pub fn refresh_token(&self, presented: Option<&str>) -> Result<LoginOutcome, AppError> {
        warn!(
            token_presented = presented.is_some(),
            "Refresh token request rejected"
        );
        Err(AuthError::RefreshRejected.into())
    }

    pub async fn verify_token(&self, token: &str) -> Result<AuthContext, AppError> {
        let claims = self.tokens.verify(token)?;

        if self.revoked.is_revoked(claims.jti).await {
            return Err(AuthError::TokenRevoked.into());
        }

        let user = self
            .store
            .get_user_by_id(claims.sub)
            .await?
            .ok_or(AuthError::UnknownUser)?;

        Ok(AuthContext {
            user,
            token_id: claims.jti,
            expires_at: claims.expires_at(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Settings;
    use crate::db::{InMemoryUserStore, MockUserStore};
    use chrono::Duration;

    fn service_with(store: Arc<dyn UserStore>) -> AuthService {
        let settings = Settings::new_for_test().unwrap();
        AuthService::new(
            store,
            TokenIssuer::new(&settings.auth).unwrap(),
            RevokedTokens::new(),
        )
    }

    fn validation_errors(err: AppError) -> ValidationErrors {
        match err {
            AppError::Validation(errors) => errors,
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let store = InMemoryUserStore::new();
        let service = service_with(Arc::new(store.clone()));

        let user = service
            .register(Some("Ada"), Some("ada@example.com"), Some("secret1"))
            .await
            .unwrap();
        assert_ne!(user.password_hash, "secret1");
        assert_eq!(store.len().await, 1);

        let outcome = service
            .login(Some("ada@example.com"), Some("secret1"))
            .await
            .unwrap();
        assert_eq!(outcome.user.id, user.id);
        assert_eq!(outcome.token.expires_at - outcome.token.issued_at, Duration::minutes(3));

        let context = service.verify_token(&outcome.token.token).await.unwrap();
        assert_eq!(context.user.id, user.id);
    }

    #[tokio::test]
    async fn test_register_aggregates_errors() {
        let service = service_with(Arc::new(InMemoryUserStore::new()));
        let errors = validation_errors(
            service
                .register(None, Some("nope"), Some("12345"))
                .await
                .unwrap_err(),
        );
        assert_eq!(
            errors.messages().collect::<Vec<_>>(),
            vec![
                "The name field is required.",
                "The email must be a valid email address.",
                "The password must be at least 6 characters.",
            ]
        );
    }

    #[tokio::test]
    async fn test_register_duplicate_email() {
        let store = InMemoryUserStore::new();
        let service = service_with(Arc::new(store.clone()));
        service
            .register(Some("Ada"), Some("ada@example.com"), Some("secret1"))
            .await
            .unwrap();

        let errors = validation_errors(
            service
                .register(Some("Eve"), Some("ada@example.com"), Some("secret2"))
                .await
                .unwrap_err(),
        );
        assert_eq!(errors.messages().collect::<Vec<_>>(), vec![EMAIL_TAKEN]);
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_email_uniqueness_ignores_case() {
        let store = InMemoryUserStore::new();
        let service = service_with(Arc::new(store.clone()));
        let user = service
            .register(Some("Ada"), Some("Ada@Example.com"), Some("secret1"))
            .await
            .unwrap();
        assert_eq!(user.email, "ada@example.com");

        let errors = validation_errors(
            service
                .register(Some("Eve"), Some("ada@example.com"), Some("secret2"))
                .await
                .unwrap_err(),
        );
        assert_eq!(errors.messages().collect::<Vec<_>>(), vec![EMAIL_TAKEN]);
        assert_eq!(store.len().await, 1);

        let outcome = service
            .login(Some("ADA@example.COM"), Some("secret1"))
            .await
            .unwrap();
        assert_eq!(outcome.user.id, user.id);
    }

    #[tokio::test]
    async fn test_register_insert_race_reported_as_taken() {
        let mut store = MockUserStore::new();
        store.expect_get_user_by_email().returning(|_| Ok(None));
        store
            .expect_create_user()
            .returning(|_| Err(DatabaseError::Duplicate.into()));
        let service = service_with(Arc::new(store));

        let errors = validation_errors(
            service
                .register(Some("Ada"), Some("ada@example.com"), Some("secret1"))
                .await
                .unwrap_err(),
        );
        assert!(errors.has("email"));
    }

    #[tokio::test]
    async fn test_register_store_failure_propagates() {
        let mut store = MockUserStore::new();
        store.expect_get_user_by_email().returning(|_| Ok(None));
        store
            .expect_create_user()
            .returning(|_| Err(DatabaseError::Connection("down".into()).into()));
        let service = service_with(Arc::new(store));

        let err = service
            .register(Some("Ada"), Some("ada@example.com"), Some("secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Database(DatabaseError::Connection(_))));
    }

    #[tokio::test]
    async fn test_login_wrong_password_is_unauthorized() {
        let service = service_with(Arc::new(InMemoryUserStore::new()));
        service
            .register(Some("Ada"), Some("ada@example.com"), Some("secret1"))
            .await
            .unwrap();

        let err = service
            .login(Some("ada@example.com"), Some("secret2"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidCredentials)));

        let err = service
            .login(Some("nobody@example.com"), Some("secret1"))
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::InvalidCredentials)));
    }

    #[tokio::test]
    async fn test_login_validation_by_field() {
        let service = service_with(Arc::new(InMemoryUserStore::new()));
        let errors = validation_errors(service.login(None, Some("123")).await.unwrap_err());
        assert!(errors.has("email"));
        assert!(errors.has("password"));
    }

    #[tokio::test]
    async fn test_logout_revokes_token() {
        let service = service_with(Arc::new(InMemoryUserStore::new()));
        service
            .register(Some("Ada"), Some("ada@example.com"), Some("secret1"))
            .await
            .unwrap();
        let outcome = service
            .login(Some("ada@example.com"), Some("secret1"))
            .await
            .unwrap();

        let context = service.verify_token(&outcome.token.token).await.unwrap();
        service.logout(&context).await.unwrap();

        let err = service.verify_token(&outcome.token.token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::TokenRevoked)));
    }

    #[tokio::test]
    async fn test_token_for_missing_user() {
        let service = service_with(Arc::new(InMemoryUserStore::new()));
        let ghost = User::new("Ghost".into(), "ghost@example.com".into(), "hash".into());
        let issued = service.tokens().issue(&ghost, Utc::now()).unwrap();

        let err = service.verify_token(&issued.token).await.unwrap_err();
        assert!(matches!(err, AppError::Auth(AuthError::UnknownUser)));
    }

    #[test]
    fn test_refresh_always_rejected() {
        let service = service_with(Arc::new(InMemoryUserStore::new()));
        for presented in [None, Some(""), Some("Bearer abc.def.ghi")] {
            let err = service.refresh_token(presented).unwrap_err();
            assert!(matches!(err, AppError::Auth(AuthError::RefreshRejected)));
        }
    }
}
