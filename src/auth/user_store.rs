//! User Storage
//! Mission: Store accounts and their credentials in SQLite

use crate::auth::error::{AuthError, AuthResult};
use crate::auth::models::User;
use crate::auth::password::{Credential, HashAlgorithm};
use crate::db::{is_constraint_violation, Database};
use anyhow::{anyhow, Context};
use rusqlite::{params, Connection, OptionalExtension, Row};
use tracing::info;

const USER_COLUMNS: &str =
    "id, email, username, bio, image, salt, hash, hash_algorithm, hash_iterations";

/// Fields for a new account.
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub username: String,
    pub credential: Credential,
}

/// Partial update. `None` leaves the column as is.
#[derive(Debug, Clone, Default)]
pub struct UserChanges {
    pub email: Option<String>,
    pub username: Option<String>,
    pub bio: Option<String>,
    pub image: Option<String>,
    pub credential: Option<Credential>,
}

/// User storage with SQLite backend
#[derive(Clone)]
pub struct UserStore {
    db: Database,
}

impl UserStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    /// Insert a new account. Email/username collisions map to
    /// [`AuthError::DuplicateAccount`] without saying which one collided.
    pub async fn insert(&self, new_user: NewUser) -> AuthResult<User> {
        let inserted = self
            .db
            .run(move |conn| {
                let c = &new_user.credential;
                let result = conn.execute(
                    "INSERT INTO users (email, username, salt, hash, hash_algorithm, hash_iterations)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                    params![
                        new_user.email,
                        new_user.username,
                        c.salt,
                        c.hash,
                        c.algorithm.as_str(),
                        c.iterations,
                    ],
                );
                match result {
                    Ok(_) => {
                        let id = conn.last_insert_rowid();
                        Ok(Some(fetch_by_id(conn, id)?.context("Inserted user vanished")?))
                    }
                    Err(e) if is_constraint_violation(&e) => Ok(None),
                    Err(e) => Err(e).context("Failed to insert user"),
                }
            })
            .await?;

        let user = inserted.ok_or(AuthError::DuplicateAccount)?;
        info!("✅ Created user: {} ({})", user.username, user.id);
        Ok(user)
    }

    pub async fn get_by_id(&self, id: i64) -> AuthResult<Option<User>> {
        Ok(self.db.run(move |conn| fetch_by_id(conn, id)).await?)
    }

    pub async fn get_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let email = email.to_string();
        Ok(self
            .db
            .run(move |conn| fetch_one(conn, "email", &email))
            .await?)
    }

    pub async fn get_by_username(&self, username: &str) -> AuthResult<Option<User>> {
        let username = username.to_string();
        Ok(self
            .db
            .run(move |conn| fetch_one(conn, "username", &username))
            .await?)
    }

    /// Apply `changes` and return the stored record. `Ok(None)` if the user
    /// no longer exists.
    pub async fn update(&self, id: i64, changes: UserChanges) -> AuthResult<Option<User>> {
        let updated = self
            .db
            .run(move |conn| {
                let c = changes.credential.as_ref();
                let result = conn.execute(
                    "UPDATE users SET
                        email = COALESCE(?2, email),
                        username = COALESCE(?3, username),
                        bio = COALESCE(?4, bio),
                        image = COALESCE(?5, image),
                        salt = COALESCE(?6, salt),
                        hash = COALESCE(?7, hash),
                        hash_algorithm = COALESCE(?8, hash_algorithm),
                        hash_iterations = COALESCE(?9, hash_iterations)
                     WHERE id = ?1",
                    params![
                        id,
                        changes.email,
                        changes.username,
                        changes.bio,
                        changes.image,
                        c.map(|c| c.salt.clone()),
                        c.map(|c| c.hash.clone()),
                        c.map(|c| c.algorithm.as_str()),
                        c.map(|c| c.iterations),
                    ],
                );
                match result {
                    Ok(0) => Ok(Some(None)),
                    Ok(_) => Ok(Some(fetch_by_id(conn, id)?)),
                    Err(e) if is_constraint_violation(&e) => Ok(None),
                    Err(e) => Err(e).context("Failed to update user"),
                }
            })
            .await?;

        updated.ok_or(AuthError::DuplicateAccount)
    }
}

fn fetch_by_id(conn: &Connection, id: i64) -> anyhow::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?1"),
        params![id],
        row_to_parts,
    )
    .optional()
    .context("Failed to load user")?
    .map(UserParts::into_user)
    .transpose()
}

fn fetch_one(
    conn: &Connection,
    column: &'static str,
    value: &str,
) -> anyhow::Result<Option<User>> {
    conn.query_row(
        &format!("SELECT {USER_COLUMNS} FROM users WHERE {column} = ?1"),
        params![value],
        row_to_parts,
    )
    .optional()
    .context("Failed to load user")?
    .map(UserParts::into_user)
    .transpose()
}

/// Raw row, before the algorithm column is parsed.
struct UserParts {
    id: i64,
    email: String,
    username: String,
    bio: Option<String>,
    image: Option<String>,
    salt: Vec<u8>,
    hash: Vec<u8>,
    algorithm: String,
    iterations: u32,
}

fn row_to_parts(row: &Row<'_>) -> rusqlite::Result<UserParts> {
    Ok(UserParts {
        id: row.get(0)?,
        email: row.get(1)?,
        username: row.get(2)?,
        bio: row.get(3)?,
        image: row.get(4)?,
        salt: row.get(5)?,
        hash: row.get(6)?,
        algorithm: row.get(7)?,
        iterations: row.get(8)?,
    })
}

impl UserParts {
    fn into_user(self) -> anyhow::Result<User> {
        let algorithm = self
            .algorithm
            .parse::<HashAlgorithm>()
            .map_err(|e| anyhow!("user {}: {}", self.id, e))?;
        Ok(User {
            id: self.id,
            email: self.email,
            username: self.username,
            bio: self.bio,
            image: self.image,
            credential: Credential {
                salt: self.salt,
                hash: self.hash,
                algorithm,
                iterations: self.iterations,
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn credential(tag: u8) -> Credential {
        Credential {
            salt: vec![tag; 32],
            hash: vec![tag; 64],
            algorithm: HashAlgorithm::Sha256,
            iterations: 1_000,
        }
    }

    fn new_user(email: &str, username: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            username: username.to_string(),
            credential: credential(1),
        }
    }

    fn create_test_store() -> UserStore {
        UserStore::new(Database::open_in_memory().unwrap())
    }

    #[tokio::test]
    async fn test_create_and_retrieve_user() {
        let store = create_test_store();

        let user = store.insert(new_user("a@x.com", "alice")).await.unwrap();
        assert!(user.id > 0);
        assert_eq!(user.credential, credential(1));

        let by_email = store.get_by_email("a@x.com").await.unwrap().unwrap();
        let by_name = store.get_by_username("alice").await.unwrap().unwrap();
        let by_id = store.get_by_id(user.id).await.unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
        assert_eq!(by_name.id, user.id);
        assert_eq!(by_id.email, "a@x.com");
        assert_eq!(by_id.credential.algorithm, HashAlgorithm::Sha256);
    }

    #[tokio::test]
    async fn test_missing_user_is_none() {
        let store = create_test_store();
        assert!(store.get_by_email("nobody@x.com").await.unwrap().is_none());
        assert!(store.get_by_id(999).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_duplicate_email_or_username_rejected() {
        let store = create_test_store();
        store.insert(new_user("a@x.com", "alice")).await.unwrap();

        let same_email = store.insert(new_user("a@x.com", "other")).await;
        let same_name = store.insert(new_user("b@x.com", "alice")).await;
        assert!(matches!(same_email, Err(AuthError::DuplicateAccount)));
        assert!(matches!(same_name, Err(AuthError::DuplicateAccount)));
    }

    #[tokio::test]
    async fn test_partial_update_keeps_other_fields() {
        let store = create_test_store();
        let user = store.insert(new_user("a@x.com", "alice")).await.unwrap();

        let updated = store
            .update(
                user.id,
                UserChanges {
                    bio: Some("hello".to_string()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();

        assert_eq!(updated.bio.as_deref(), Some("hello"));
        assert_eq!(updated.email, "a@x.com");
        assert_eq!(updated.credential, credential(1));
    }

    #[tokio::test]
    async fn test_update_credential() {
        let store = create_test_store();
        let user = store.insert(new_user("a@x.com", "alice")).await.unwrap();

        let mut replacement = credential(9);
        replacement.algorithm = HashAlgorithm::Sha512;
        let updated = store
            .update(
                user.id,
                UserChanges {
                    credential: Some(replacement.clone()),
                    ..Default::default()
                },
            )
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.credential, replacement);
    }

    #[tokio::test]
    async fn test_update_into_taken_email_is_duplicate() {
        let store = create_test_store();
        store.insert(new_user("a@x.com", "alice")).await.unwrap();
        let bob = store.insert(new_user("b@x.com", "bob")).await.unwrap();

        let result = store
            .update(
                bob.id,
                UserChanges {
                    email: Some("a@x.com".to_string()),
                    ..Default::default()
                },
            )
            .await;
        assert!(matches!(result, Err(AuthError::DuplicateAccount)));
    }

    #[tokio::test]
    async fn test_update_missing_user() {
        let store = create_test_store();
        let result = store.update(404, UserChanges::default()).await.unwrap();
        assert!(result.is_none());
    }
}
