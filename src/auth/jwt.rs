//! JWT Token Issuer
//! Mission: Sign tokens whose validity can be withdrawn before they expire

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::models::Claims;
use crate::auth::revocation::RevocationTracker;
use anyhow::{anyhow, Context};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{Duration, Utc};
use jsonwebtoken::{
    decode, encode, errors::ErrorKind, Algorithm, DecodingKey, EncodingKey, Header, Validation,
};
use rand::{rngs::OsRng, RngCore};
use std::sync::Arc;
use tracing::{debug, warn};

/// Random bytes behind each sign id.
const SIGN_ID_BYTES: usize = 16;

/// Fresh sign ids tried before giving up on registration.
const MAX_REGISTER_ATTEMPTS: usize = 3;

/// A signed token together with the claims inside it.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub claims: Claims,
}

/// Issues and verifies HS256 tokens backed by the revocation tracker.
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    ttl: Duration,
    tracker: Arc<RevocationTracker>,
}

impl TokenIssuer {
    pub fn new(secret: &str, ttl: Duration, tracker: Arc<RevocationTracker>) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.leeway = 0;

        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
            ttl,
            tracker,
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn tracker(&self) -> &Arc<RevocationTracker> {
        &self.tracker
    }

    /// Sign a token for the given subject.
    ///
    /// The sign id is durably registered before the token is returned, so a
    /// token handed to a caller always verifies until it is invalidated or
    /// expires.
    pub async fn issue(&self, user_id: i64, username: &str) -> AuthResult<IssuedToken> {
        let now = Utc::now();
        let exp = (now + self.ttl).timestamp();
        let sign_id = self.register_fresh_sign_id(exp).await?;

        let claims = Claims {
            id: user_id,
            username: username.to_string(),
            sign_id,
            iat: now.timestamp(),
            exp,
        };

        let token = match encode(&Header::new(Algorithm::HS256), &claims, &self.encoding_key) {
            Ok(token) => token,
            Err(e) => {
                // Don't leave a registered id that no token carries.
                self.tracker.invalidate(&claims.sign_id).await?;
                return Err(anyhow::Error::new(e).context("Failed to sign JWT").into());
            }
        };

        debug!(
            "Issued JWT for user {} ({}), expires in {}h",
            claims.username,
            claims.id,
            self.ttl.num_hours()
        );

        Ok(IssuedToken { token, claims })
    }

    async fn register_fresh_sign_id(&self, exp: i64) -> AuthResult<String> {
        for attempt in 1..=MAX_REGISTER_ATTEMPTS {
            let sign_id = generate_sign_id();
            if self.tracker.register(&sign_id, exp).await? {
                return Ok(sign_id);
            }
            warn!(attempt, "Sign id collision, regenerating");
        }
        Err(AuthError::Infrastructure(anyhow!(
            "could not register a unique sign id after {} attempts",
            MAX_REGISTER_ATTEMPTS
        )))
    }

    /// Check signature, expiry and revocation status.
    pub async fn verify(&self, token: &str) -> AuthResult<Claims> {
        let claims = decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| match e.kind() {
                ErrorKind::ExpiredSignature => AuthError::Unauthenticated("token expired"),
                ErrorKind::InvalidSignature => AuthError::Unauthenticated("bad signature"),
                _ => AuthError::Unauthenticated("malformed token"),
            })?
            .claims;

        if !self.tracker.is_valid(&claims.sign_id).await? {
            debug!("Rejected revoked JWT for user {}", claims.username);
            return Err(AuthError::Unauthenticated("token revoked"));
        }

        Ok(claims)
    }

    /// Read claims without checking signature, expiry or revocation.
    ///
    /// Diagnostics only. Never authorize anything with the result.
    pub fn decode(&self, token: &str) -> anyhow::Result<Claims> {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.insecure_disable_signature_validation();
        validation.validate_exp = false;
        validation.required_spec_claims.clear();

        let data = decode::<Claims>(token, &DecodingKey::from_secret(&[]), &validation)
            .context("Failed to decode JWT payload")?;
        Ok(data.claims)
    }
}

fn generate_sign_id() -> String {
    let mut bytes = [0u8; SIGN_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
