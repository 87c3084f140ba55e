//! Authentication service layer
//!
//! Provides business logic for user registration, login, logout and the
//! caller's own profile.

use super::jwt::{generate_access_token, JwtConfig};
use super::middleware::AuthenticatedUser;
use super::password::{hash_password_with_config, verify_password, PasswordConfig};
use super::revocation::RevocationRegistry;
use crate::audit::{audit_log, AuditContext, AuditEvent};
use crate::error::AppError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use stash_core::{ProfileChanges, StashError, UserId, UserRepository};
use std::sync::Arc;
use tokio::sync::OnceCell;
use utoipa::ToSchema;

const CREDENTIALS_REQUIRED: &str = "Email and password are required";
const INVALID_CREDENTIALS: &str = "Invalid credentials";

/// Verified against on unknown-email logins so both failures cost one Argon2 run
const DUMMY_PASSWORD: &str = "stash-login-timing-equaliser";

/// User registration request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// User login request
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Profile update request; absent or empty fields are left unchanged
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

/// Registration response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct RegisterResponse {
    pub message: String,
    #[schema(value_type = i64)]
    pub id: UserId,
}

/// Login response with access token
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct LoginResponse {
    pub message: String,
    pub access_token: String,
    pub token_type: String,
    /// Token lifetime in seconds
    pub expires_in: u64,
}

/// Plain confirmation message
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// The caller's own account
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ProfileResponse {
    #[schema(value_type = i64)]
    pub id: UserId,
    pub email: String,
    pub created_at: DateTime<Utc>,
}

/// Profile update response
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateProfileResponse {
    pub message: String,
    #[schema(value_type = i64)]
    pub id: UserId,
    pub email: String,
}

/// Treat `""` the same as a missing field
fn present(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.is_empty())
}

/// Authentication service
#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserRepository>,
    jwt_config: JwtConfig,
    password_config: PasswordConfig,
    revocations: Arc<dyn RevocationRegistry>,
    dummy_hash: Arc<OnceCell<String>>,
}

impl AuthService {
    /// Create a new authentication service
    pub fn new(
        users: Arc<dyn UserRepository>,
        jwt_config: JwtConfig,
        password_config: PasswordConfig,
        revocations: Arc<dyn RevocationRegistry>,
    ) -> Self {
        Self {
            users,
            jwt_config,
            password_config,
            revocations,
            dummy_hash: Arc::new(OnceCell::new()),
        }
    }

    pub fn jwt_config(&self) -> &JwtConfig {
        &self.jwt_config
    }

    /// Register a new user
    ///
    /// # Returns
    ///
    /// * `Ok(RegisterResponse)` - Id of the new user
    /// * `Err(AppError::BadRequest)` - Email or password missing
    /// * `Err(AppError::Conflict)` - Email already registered
    pub async fn register(
        &self,
        request: RegisterRequest,
        ctx: &AuditContext,
    ) -> Result<RegisterResponse, AppError> {
        let (Some(email), Some(password)) = (present(request.email), present(request.password))
        else {
            return Err(AppError::BadRequest(CREDENTIALS_REQUIRED.to_string()));
        };

        if self.users.find_user_by_email(&email).await?.is_some() {
            self.audit_registration_failure(&email, "email already exists", ctx);
            return Err(AppError::Conflict("Email already exists".to_string()));
        }

        let password_hash = self.hash(password).await?;

        // A concurrent registration can still win the race; the UNIQUE index decides
        let user = match self.users.create_user(&email, &password_hash).await {
            Ok(user) => user,
            Err(StashError::Conflict(_)) => {
                self.audit_registration_failure(&email, "email already exists", ctx);
                return Err(AppError::Conflict("Email already exists".to_string()));
            }
            Err(e) => return Err(e.into()),
        };

        audit_log(&AuditEvent::RegistrationSuccess {
            user_id: user.id,
            email: user.email.clone(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(RegisterResponse {
            message: "User registered successfully".to_string(),
            id: user.id,
        })
    }

    /// Login with email and password
    ///
    /// Unknown email and wrong password fail identically.
    pub async fn login(
        &self,
        request: LoginRequest,
        ctx: &AuditContext,
    ) -> Result<LoginResponse, AppError> {
        let (Some(email), Some(password)) = (present(request.email), present(request.password))
        else {
            return Err(AppError::BadRequest(CREDENTIALS_REQUIRED.to_string()));
        };

        let Some(user) = self.users.find_user_by_email(&email).await? else {
            let dummy_hash = self.dummy_hash().await?;
            self.verify(password, dummy_hash).await?;
            self.audit_login_failure(&email, "unknown email", ctx);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        };

        if !self.verify(password, user.password_hash.clone()).await? {
            self.audit_login_failure(&email, "wrong password", ctx);
            return Err(AppError::Unauthorized(INVALID_CREDENTIALS.to_string()));
        }

        let access_token = generate_access_token(&self.jwt_config, user.id)
            .map_err(|e| AppError::Internal(format!("Failed to generate access token: {e}")))?;

        audit_log(&AuditEvent::LoginSuccess {
            user_id: user.id,
            email: user.email,
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });

        Ok(LoginResponse {
            message: "Login successful".to_string(),
            access_token,
            token_type: "Bearer".to_string(),
            expires_in: self.jwt_config.access_expiration_secs,
        })
    }

    /// Revoke the token that authenticated this request
    pub async fn logout(
        &self,
        session: &AuthenticatedUser,
        ctx: &AuditContext,
    ) -> Result<MessageResponse, AppError> {
        self.revocations
            .revoke(&session.jti, session.expires_at)
            .await
            .map_err(|e| AppError::Internal(e.to_string()))?;

        audit_log(&AuditEvent::Logout {
            subject: session.subject.clone(),
            jti: session.jti.clone(),
            ip_address: ctx.ip_address.clone(),
        });

        Ok(MessageResponse::new("Logout successful"))
    }

    /// Get the caller's profile
    pub async fn get_profile(&self, user_id: UserId) -> Result<ProfileResponse, AppError> {
        let user = self
            .users
            .find_user_by_id(user_id)
            .await?
            .ok_or_else(|| AppError::NotFound("User".to_string()))?;

        Ok(ProfileResponse {
            id: user.id,
            email: user.email,
            created_at: user.created_at,
        })
    }

    /// Update the caller's email and/or password
    pub async fn update_profile(
        &self,
        user_id: UserId,
        request: UpdateProfileRequest,
        ctx: &AuditContext,
    ) -> Result<UpdateProfileResponse, AppError> {
        if self.users.find_user_by_id(user_id).await?.is_none() {
            return Err(AppError::NotFound("User".to_string()));
        }

        let email = present(request.email);
        if let Some(email) = &email {
            if self.users.email_taken_by_other(email, user_id).await? {
                return Err(AppError::Conflict(
                    "Email already used by another user".to_string(),
                ));
            }
        }

        let password_hash = match present(request.password) {
            Some(password) => Some(self.hash(password).await?),
            None => None,
        };
        let password_changed = password_hash.is_some();

        let changes = ProfileChanges {
            email,
            password_hash,
        };

        let user = match self.users.update_user(user_id, &changes).await {
            Ok(Some(user)) => user,
            Ok(None) => return Err(AppError::NotFound("User".to_string())),
            Err(StashError::Conflict(_)) => {
                return Err(AppError::Conflict(
                    "Email already used by another user".to_string(),
                ))
            }
            Err(e) => return Err(e.into()),
        };

        if changes.email.is_some() {
            audit_log(&AuditEvent::ProfileUpdate {
                user_id,
                email: user.email.clone(),
                ip_address: ctx.ip_address.clone(),
            });
        }
        if password_changed {
            audit_log(&AuditEvent::PasswordChange {
                user_id,
                ip_address: ctx.ip_address.clone(),
                user_agent: ctx.user_agent.clone(),
            });
        }

        Ok(UpdateProfileResponse {
            message: "Profile updated".to_string(),
            id: user.id,
            email: user.email,
        })
    }

    async fn hash(&self, password: String) -> Result<String, AppError> {
        let config = self.password_config.clone();
        tokio::task::spawn_blocking(move || hash_password_with_config(&password, &config))
            .await
            .map_err(|e| AppError::Internal(format!("Password hashing task failed: {e}")))?
            .map_err(|e| AppError::Internal(e.to_string()))
    }

    /// Hash of [`DUMMY_PASSWORD`] under the configured parameters, computed once
    async fn dummy_hash(&self) -> Result<String, AppError> {
        self.dummy_hash
            .get_or_try_init(|| self.hash(DUMMY_PASSWORD.to_string()))
            .await
            .cloned()
    }

    async fn verify(&self, password: String, hash: String) -> Result<bool, AppError> {
        tokio::task::spawn_blocking(move || verify_password(&password, &hash))
            .await
            .map_err(|e| AppError::Internal(format!("Password verification task failed: {e}")))
    }

    fn audit_registration_failure(&self, email: &str, reason: &str, ctx: &AuditContext) {
        audit_log(&AuditEvent::RegistrationFailure {
            email: email.to_string(),
            reason: reason.to_string(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });
    }

    fn audit_login_failure(&self, email: &str, reason: &str, ctx: &AuditContext) {
        audit_log(&AuditEvent::LoginFailure {
            email: email.to_string(),
            reason: reason.to_string(),
            ip_address: ctx.ip_address.clone(),
            user_agent: ctx.user_agent.clone(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::jwt::validate_access_token;
    use crate::auth::revocation::InMemoryRevocationRegistry;
    use async_trait::async_trait;
    use stash_core::{SqliteStore, User};

    fn service_over(users: Arc<dyn UserRepository>) -> AuthService {
        AuthService::new(
            users,
            JwtConfig::default(),
            PasswordConfig::minimal(),
            Arc::new(InMemoryRevocationRegistry::new()),
        )
    }

    async fn service() -> AuthService {
        let store = SqliteStore::in_memory().await.unwrap();
        service_over(Arc::new(store))
    }

    /// Email lookups miss, so only the UNIQUE index can catch a duplicate
    struct LookupMisses(SqliteStore);

    #[async_trait]
    impl UserRepository for LookupMisses {
        async fn create_user(&self, email: &str, password_hash: &str) -> stash_core::Result<User> {
            self.0.create_user(email, password_hash).await
        }

        async fn find_user_by_email(&self, _email: &str) -> stash_core::Result<Option<User>> {
            Ok(None)
        }

        async fn find_user_by_id(&self, id: UserId) -> stash_core::Result<Option<User>> {
            self.0.find_user_by_id(id).await
        }

        async fn email_taken_by_other(
            &self,
            email: &str,
            excluding: UserId,
        ) -> stash_core::Result<bool> {
            self.0.email_taken_by_other(email, excluding).await
        }

        async fn update_user(
            &self,
            id: UserId,
            changes: &ProfileChanges,
        ) -> stash_core::Result<Option<User>> {
            self.0.update_user(id, changes).await
        }
    }

    fn creds(email: &str, password: &str) -> (Option<String>, Option<String>) {
        (Some(email.to_string()), Some(password.to_string()))
    }

    async fn register(svc: &AuthService, email: &str, password: &str) -> UserId {
        let (email, password) = creds(email, password);
        svc.register(RegisterRequest { email, password }, &AuditContext::default())
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_register_then_login_subject_matches() {
        let svc = service().await;
        let id = register(&svc, "a@example.com", "pw").await;

        let (email, password) = creds("a@example.com", "pw");
        let login = svc
            .login(LoginRequest { email, password }, &AuditContext::default())
            .await
            .unwrap();

        let claims = validate_access_token(svc.jwt_config(), &login.access_token).unwrap();
        assert_eq!(claims.sub.parse::<UserId>().unwrap(), id);
        assert_eq!(login.token_type, "Bearer");
        assert_eq!(login.expires_in, 900);
    }

    #[tokio::test]
    async fn test_register_requires_both_fields() {
        let svc = service().await;
        let ctx = AuditContext::default();

        for request in [
            RegisterRequest::default(),
            RegisterRequest {
                email: Some("a@example.com".into()),
                password: None,
            },
            RegisterRequest {
                email: Some(String::new()),
                password: Some("pw".into()),
            },
        ] {
            let err = svc.register(request, &ctx).await.unwrap_err();
            assert!(matches!(err, AppError::BadRequest(ref m) if m == CREDENTIALS_REQUIRED));
        }
    }

    #[tokio::test]
    async fn test_duplicate_registration() {
        let svc = service().await;
        register(&svc, "dup@example.com", "one").await;

        let (email, password) = creds("dup@example.com", "two");
        let err = svc
            .register(RegisterRequest { email, password }, &AuditContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Email already exists"));
    }

    #[tokio::test]
    async fn test_duplicate_registration_caught_by_unique_index() {
        let store = SqliteStore::in_memory().await.unwrap();
        store.create_user("dup@example.com", "existing").await.unwrap();
        let svc = service_over(Arc::new(LookupMisses(store)));

        let (email, password) = creds("dup@example.com", "two");
        let err = svc
            .register(RegisterRequest { email, password }, &AuditContext::default())
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(ref m) if m == "Email already exists"));
    }

    #[tokio::test]
    async fn test_unknown_email_still_verifies_a_hash() {
        let svc = service().await;
        assert!(!svc.dummy_hash.initialized());

        let (email, password) = creds("ghost@example.com", DUMMY_PASSWORD);
        let err = svc
            .login(LoginRequest { email, password }, &AuditContext::default())
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::Unauthorized(ref m) if m == INVALID_CREDENTIALS));
        let dummy = svc.dummy_hash.get().unwrap();
        assert!(verify_password(DUMMY_PASSWORD, dummy));
    }

    #[tokio::test]
    async fn test_login_failures_are_indistinguishable() {
        let svc = service().await;
        register(&svc, "a@example.com", "pw").await;
        let ctx = AuditContext::default();

        let (email, password) = creds("a@example.com", "nope");
        let wrong_password = svc
            .login(LoginRequest { email, password }, &ctx)
            .await
            .unwrap_err();
        let (email, password) = creds("ghost@example.com", "pw");
        let unknown_email = svc
            .login(LoginRequest { email, password }, &ctx)
            .await
            .unwrap_err();

        assert!(matches!(wrong_password, AppError::Unauthorized(ref m) if m == INVALID_CREDENTIALS));
        assert!(matches!(unknown_email, AppError::Unauthorized(ref m) if m == INVALID_CREDENTIALS));
    }

    #[tokio::test]
    async fn test_update_profile_password_and_collision() {
        let svc = service().await;
        let ctx = AuditContext::default();
        let a = register(&svc, "a@example.com", "pw").await;
        register(&svc, "b@example.com", "pw").await;

        let err = svc
            .update_profile(
                a,
                UpdateProfileRequest {
                    email: Some("b@example.com".into()),
                    password: None,
                },
                &ctx,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, AppError::Conflict(_)));
        assert_eq!(svc.get_profile(a).await.unwrap().email, "a@example.com");

        let updated = svc
            .update_profile(
                a,
                UpdateProfileRequest {
                    email: Some(String::new()),
                    password: Some("new-pw".into()),
                },
                &ctx,
            )
            .await
            .unwrap();
        assert_eq!(updated.email, "a@example.com");

        let (email, password) = creds("a@example.com", "new-pw");
        assert!(svc.login(LoginRequest { email, password }, &ctx).await.is_ok());
    }

    #[tokio::test]
    async fn test_profile_of_missing_user() {
        let svc = service().await;
        let err = svc.get_profile(UserId::new(404)).await.unwrap_err();
        assert!(matches!(err, AppError::NotFound(ref r) if r == "User"));
    }
}
