use async_trait::async_trait;
use sqlx::PgPool;
use thiserror::Error;

use crate::users::{model::User, repo_types::UserRow};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("user not found")]
    NotFound,

    #[error("email '{0}' already registered")]
    DuplicateEmail(String),

    #[error("corrupt user row: {0}")]
    Corrupt(String),

    #[error("database error: {0}")]
    Internal(#[from] sqlx::Error),
}

pub type RepoResult<T> = Result<T, RepoError>;

/// Persistence operations used by the user service. Every write is one
/// statement against one row.
#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn get(&self, id: i64) -> RepoResult<User>;

    async fn get_by_email(&self, email: &str) -> RepoResult<User>;

    /// Inserts the user and stores the assigned id back into it.
    async fn save(&self, user: &mut User) -> RepoResult<()>;

    /// Writes names, email, password and last_modified.
    async fn update(&self, user: &User) -> RepoResult<()>;

    /// Same as `update`, plus status and role.
    async fn update_admin(&self, user: &User) -> RepoResult<()>;

    /// Soft delete: status becomes `inactive`.
    async fn delete(&self, id: i64) -> RepoResult<()>;
}

const SELECT_USER: &str = r#"
    SELECT id, first_name, last_name, email, password, date_created, last_modified, status, role
    FROM users
"#;

#[derive(Clone)]
pub struct PgUserRepository {
    db: PgPool,
}

impl PgUserRepository {
    pub fn new(db: PgPool) -> Self {
        Self { db }
    }
}

fn into_user(row: Option<UserRow>) -> RepoResult<User> {
    let row = row.ok_or(RepoError::NotFound)?;
    User::try_from(row).map_err(RepoError::Corrupt)
}

fn classify_write(err: sqlx::Error, email: &str) -> RepoError {
    match &err {
        sqlx::Error::Database(db) if db.is_unique_violation() => {
            RepoError::DuplicateEmail(email.to_string())
        }
        _ => RepoError::Internal(err),
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn get(&self, id: i64) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn get_by_email(&self, email: &str) -> RepoResult<User> {
        let row = sqlx::query_as::<_, UserRow>(&format!("{SELECT_USER} WHERE email = $1"))
            .bind(email)
            .fetch_optional(&self.db)
            .await?;
        into_user(row)
    }

    async fn save(&self, user: &mut User) -> RepoResult<()> {
        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO users (first_name, last_name, email, password, date_created, last_modified, status, role)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            RETURNING id
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.date_created)
        .bind(&user.last_modified)
        .bind(user.status.as_str())
        .bind(user.role.as_str())
        .fetch_one(&self.db)
        .await
        .map_err(|e| classify_write(e, &user.email))?;
        user.id = id;
        Ok(())
    }

    async fn update(&self, user: &User) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET first_name = $1, last_name = $2, email = $3, password = $4, last_modified = $5
            WHERE id = $6
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(&user.last_modified)
        .bind(user.id)
        .execute(&self.db)
        .await
        .map_err(|e| classify_write(e, &user.email))?;
        Ok(())
    }

    async fn update_admin(&self, user: &User) -> RepoResult<()> {
        sqlx::query(
            r#"
            UPDATE users
            SET first_name = $1, last_name = $2, email = $3, password = $4,
                status = $5, role = $6, last_modified = $7
            WHERE id = $8
            "#,
        )
        .bind(&user.first_name)
        .bind(&user.last_name)
        .bind(&user.email)
        .bind(&user.password)
        .bind(user.status.as_str())
        .bind(user.role.as_str())
        .bind(&user.last_modified)
        .bind(user.id)
        .execute(&self.db)
        .await
        .map_err(|e| classify_write(e, &user.email))?;
        Ok(())
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        sqlx::query("UPDATE users SET status = 'inactive' WHERE id = $1")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }
}

/// In-memory repository used by the service and handler tests.
#[cfg(test)]
pub mod memory {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    use tokio::sync::RwLock;

    use super::*;
    use crate::users::model::Status;

    #[derive(Default)]
    pub struct InMemoryUserRepository {
        users: RwLock<BTreeMap<i64, User>>,
        fail: AtomicBool,
        fail_writes: AtomicBool,
        pub update_calls: AtomicUsize,
        pub admin_update_calls: AtomicUsize,
    }

    impl InMemoryUserRepository {
        pub fn new() -> Self {
            Self::default()
        }

        /// Every following call fails with an internal error.
        pub fn fail_all(&self) {
            self.fail.store(true, Ordering::SeqCst);
        }

        /// `update` and `update_admin` fail with an internal error; reads still work.
        pub fn fail_writes(&self) {
            self.fail_writes.store(true, Ordering::SeqCst);
        }

        pub async fn stored(&self, id: i64) -> Option<User> {
            self.users.read().await.get(&id).cloned()
        }

        fn check(&self) -> RepoResult<()> {
            if self.fail.load(Ordering::SeqCst) {
                return Err(RepoError::Internal(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }

        fn check_write(&self) -> RepoResult<()> {
            self.check()?;
            if self.fail_writes.load(Ordering::SeqCst) {
                return Err(RepoError::Internal(sqlx::Error::PoolTimedOut));
            }
            Ok(())
        }

        fn email_taken(users: &BTreeMap<i64, User>, email: &str, except: i64) -> bool {
            users
                .values()
                .any(|u| u.id != except && u.email.eq_ignore_ascii_case(email))
        }
    }

    #[async_trait]
    impl UserRepository for InMemoryUserRepository {
        async fn get(&self, id: i64) -> RepoResult<User> {
            self.check()?;
            self.users.read().await.get(&id).cloned().ok_or(RepoError::NotFound)
        }

        async fn get_by_email(&self, email: &str) -> RepoResult<User> {
            self.check()?;
            self.users
                .read()
                .await
                .values()
                .find(|u| u.email == email)
                .cloned()
                .ok_or(RepoError::NotFound)
        }

        async fn save(&self, user: &mut User) -> RepoResult<()> {
            self.check()?;
            let mut users = self.users.write().await;
            if Self::email_taken(&users, &user.email, 0) {
                return Err(RepoError::DuplicateEmail(user.email.clone()));
            }
            user.id = users.keys().next_back().copied().unwrap_or(0) + 1;
            users.insert(user.id, user.clone());
            Ok(())
        }

        async fn update(&self, user: &User) -> RepoResult<()> {
            self.check_write()?;
            self.update_calls.fetch_add(1, Ordering::SeqCst);
            let mut users = self.users.write().await;
            if Self::email_taken(&users, &user.email, user.id) {
                return Err(RepoError::DuplicateEmail(user.email.clone()));
            }
            if let Some(stored) = users.get_mut(&user.id) {
                stored.first_name = user.first_name.clone();
                stored.last_name = user.last_name.clone();
                stored.email = user.email.clone();
                stored.password = user.password.clone();
                stored.last_modified = user.last_modified.clone();
            }
            Ok(())
        }

        async fn update_admin(&self, user: &User) -> RepoResult<()> {
            self.check_write()?;
            self.admin_update_calls.fetch_add(1, Ordering::SeqCst);
            let mut users = self.users.write().await;
            if Self::email_taken(&users, &user.email, user.id) {
                return Err(RepoError::DuplicateEmail(user.email.clone()));
            }
            if let Some(stored) = users.get_mut(&user.id) {
                *stored = user.clone();
            }
            Ok(())
        }

        async fn delete(&self, id: i64) -> RepoResult<()> {
            self.check()?;
            if let Some(stored) = self.users.write().await.get_mut(&id) {
                stored.status = Status::Inactive;
            }
            Ok(())
        }
    }
}
