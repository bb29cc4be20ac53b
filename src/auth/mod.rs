//! Authentication Module
//! Mission: Password credentials, revocable JWTs and the request gateway

pub mod api;
pub mod error;
pub mod jwt;
pub mod middleware;
pub mod models;
pub mod password;
pub mod revocation;
pub mod service;
pub mod user_store;

pub use error::{AuthError, AuthResult};
pub use jwt::{IssuedToken, TokenIssuer};
pub use middleware::{optional_auth, require_auth};
pub use password::{Credential, HashAlgorithm, KdfParams, PasswordCredentialStore};
pub use revocation::{InMemoryValidCache, RevocationStore, RevocationTracker, ValidTokenCache};
pub use service::AuthService;
pub use user_store::UserStore;
