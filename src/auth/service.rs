//! Account Flows
//! Mission: Glue credentials, users and tokens into signup / login / update

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::jwt::{IssuedToken, TokenIssuer};
use crate::auth::models::{Identity, LoginRequest, SignupRequest, UpdateUserRequest, User};
use crate::auth::password::PasswordCredentialStore;
use crate::auth::user_store::{NewUser, UserChanges, UserStore};
use std::sync::Arc;
use tracing::{info, warn};

/// Account operations exposed to route handlers and collaborators.
#[derive(Clone)]
pub struct AuthService {
    users: UserStore,
    passwords: PasswordCredentialStore,
    tokens: Arc<TokenIssuer>,
}

impl AuthService {
    pub fn new(
        users: UserStore,
        passwords: PasswordCredentialStore,
        tokens: Arc<TokenIssuer>,
    ) -> Self {
        Self {
            users,
            passwords,
            tokens,
        }
    }

    pub fn tokens(&self) -> &Arc<TokenIssuer> {
        &self.tokens
    }

    /// Create an account and sign its first token.
    pub async fn signup(&self, req: SignupRequest) -> AuthResult<(User, IssuedToken)> {
        require_non_empty("username", &req.username)?;
        require_email(&req.email)?;
        require_non_empty("password", &req.password)?;

        let credential = self.passwords.create(&req.password).await?;
        let user = self
            .users
            .insert(NewUser {
                email: req.email,
                username: req.username,
                credential,
            })
            .await?;

        let issued = self.tokens.issue(user.id, &user.username).await?;
        Ok((user, issued))
    }

    /// Check email + password and sign a fresh token.
    pub async fn login(&self, req: LoginRequest) -> AuthResult<(User, IssuedToken)> {
        info!("🔐 Login attempt: {}", req.email);

        let Some(user) = self.users.get_by_email(&req.email).await? else {
            self.passwords.dummy_verify(&req.password).await?;
            warn!("❌ Failed login attempt: {}", req.email);
            return Err(AuthError::InvalidCredentials);
        };

        if !self.passwords.verify(&req.password, &user.credential).await? {
            warn!("❌ Failed login attempt: {}", req.email);
            return Err(AuthError::InvalidCredentials);
        }

        let issued = self.tokens.issue(user.id, &user.username).await?;
        info!("✅ Login successful: {} ({})", user.username, user.id);
        Ok((user, issued))
    }

    /// Load the caller's account.
    pub async fn current_user(&self, identity: &Identity) -> AuthResult<User> {
        self.users
            .get_by_id(identity.user_id)
            .await?
            .ok_or(AuthError::Unauthenticated("account no longer exists"))
    }

    /// Apply a profile update.
    ///
    /// A new password gets a credential under the current defaults, ends the
    /// session that made the request and returns a replacement token. Without
    /// a password change the returned token is `None`.
    ///
    /// The session is ended before the credential is written. If that fails
    /// nothing is stored and the old password and session both stay valid.
    pub async fn update_user(
        &self,
        identity: &Identity,
        req: UpdateUserRequest,
    ) -> AuthResult<(User, Option<IssuedToken>)> {
        if let Some(email) = req.email.as_deref() {
            require_email(email)?;
        }
        if let Some(username) = req.username.as_deref() {
            require_non_empty("username", username)?;
        }

        let credential = match req.password.as_deref() {
            Some(password) => {
                require_non_empty("password", password)?;
                Some(self.passwords.create(password).await?)
            }
            None => None,
        };
        let password_changed = credential.is_some();

        if password_changed {
            self.invalidate_session(&identity.sign_id).await?;
        }

        let changes = UserChanges {
            email: req.email,
            username: req.username,
            bio: req.bio,
            image: req.image,
            credential,
        };

        let user = self
            .users
            .update(identity.user_id, changes)
            .await?
            .ok_or(AuthError::Unauthenticated("account no longer exists"))?;

        if !password_changed {
            return Ok((user, None));
        }

        info!("🔑 Password changed for {} ({}), session ended", user.username, user.id);

        let issued = self.tokens.issue(user.id, &user.username).await?;
        Ok((user, Some(issued)))
    }

    /// Revoke the token carrying `sign_id`.
    pub async fn invalidate_session(&self, sign_id: &str) -> AuthResult<()> {
        self.tokens.tracker().invalidate(sign_id).await
    }

    pub async fn profile(&self, username: &str) -> AuthResult<Option<User>> {
        self.users.get_by_username(username).await
    }
}

fn require_email(email: &str) -> AuthResult<()> {
    require_non_empty("email", email)?;
    if !email.contains('@') {
        return Err(AuthError::Validation {
            field: "email",
            message: "is invalid",
        });
    }
    Ok(())
}

fn require_non_empty(field: &'static str, value: &str) -> AuthResult<()> {
    if value.trim().is_empty() {
        return Err(AuthError::Validation {
            field,
            message: "can't be blank",
        });
    }
    Ok(())
}
