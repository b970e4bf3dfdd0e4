use std::sync::Arc;

use anyhow::Context;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{error, info, instrument, warn};

use crate::{
    auth::password::{hash_password, verify_password},
    error::ApiError,
    events::{EventPublisher, USER_REGISTERED, USER_UPDATED},
    users::{
        model::{now_stamp, NewUser, Role, Status, User, UserPatch},
        repo::{RepoError, UserRepository},
    },
};

pub(crate) fn is_valid_email(email: &str) -> bool {
    lazy_static! {
        static ref EMAIL_RE: Regex = Regex::new(r"^[^@\s]+@[^@\s]+$").unwrap();
    }
    EMAIL_RE.is_match(email)
}

pub(crate) fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Trims and upper-cases the first letter of every word; the rest is kept.
pub(crate) fn normalize_name(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    let mut word_start = true;
    for c in name.trim().chars() {
        if word_start {
            out.extend(c.to_uppercase());
        } else {
            out.push(c);
        }
        word_start = !c.is_alphanumeric() && c != '_';
    }
    out
}

/// Runs bcrypt work off the async workers. A panicked or cancelled task is an error.
async fn blocking<T, F>(f: F) -> anyhow::Result<T>
where
    F: FnOnce() -> T + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .context("blocking task did not complete")
}

async fn hash_blocking(plain: String) -> anyhow::Result<String> {
    blocking(move || hash_password(&plain)).await?
}

async fn verify_blocking(plain: String, hash: String) -> anyhow::Result<bool> {
    blocking(move || verify_password(&plain, &hash)).await
}

/// Registration, login, lookup and update of user accounts.
#[derive(Clone)]
pub struct UserService {
    repo: Arc<dyn UserRepository>,
    events: Arc<dyn EventPublisher>,
}

impl UserService {
    pub fn new(repo: Arc<dyn UserRepository>, events: Arc<dyn EventPublisher>) -> Self {
        Self { repo, events }
    }

    /// Fire-and-forget: runs detached and only logs failures.
    fn publish(&self, routing_key: &'static str, user: User) {
        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            if let Err(e) = events.publish(routing_key, &user).await {
                warn!(error = %e, routing_key, user_id = user.id, "event publish failed");
            }
        });
    }

    #[instrument(skip(self))]
    pub async fn get_user(&self, id: i64) -> Result<User, ApiError> {
        match self.repo.get(id).await {
            Ok(user) => Ok(user),
            Err(RepoError::NotFound) => Err(ApiError::not_found("user not found")),
            Err(e) => {
                error!(error = %e, user_id = id, "get user failed");
                Err(ApiError::internal("error while trying to get user, try again later"))
            }
        }
    }

    #[instrument(skip(self, input), fields(email = %input.email))]
    pub async fn register(&self, input: NewUser) -> Result<User, ApiError> {
        let email = normalize_email(&input.email);
        let first_name = normalize_name(&input.first_name);
        let last_name = normalize_name(&input.last_name);

        if !is_valid_email(&email) {
            return Err(ApiError::bad_request("invalid email address"));
        }
        if input.password.is_empty() {
            return Err(ApiError::bad_request("invalid password"));
        }
        if first_name.is_empty() {
            return Err(ApiError::bad_request("invalid first name"));
        }
        if last_name.is_empty() {
            return Err(ApiError::bad_request("invalid last name"));
        }

        let register_failed =
            || ApiError::internal("error while trying to register, try again later");

        let password = hash_blocking(input.password).await.map_err(|e| {
            error!(error = %e, "hash password failed");
            register_failed()
        })?;

        let mut user = User {
            id: 0,
            first_name,
            last_name,
            email,
            password,
            date_created: now_stamp(),
            last_modified: String::new(),
            status: Status::Active,
            role: Role::User,
        };

        match self.repo.save(&mut user).await {
            Ok(()) => {}
            Err(RepoError::DuplicateEmail(email)) => {
                warn!(%email, "email already registered");
                return Err(ApiError::bad_request("email already registered"));
            }
            Err(e) => {
                error!(error = %e, "save user failed");
                return Err(register_failed());
            }
        }

        info!(user_id = user.id, "user registered");
        self.publish(USER_REGISTERED, user.clone());
        Ok(user)
    }

    /// Unknown email and wrong password produce the same error.
    #[instrument(skip(self, password))]
    pub async fn login(&self, email: &str, password: &str) -> Result<User, ApiError> {
        let email = normalize_email(email);
        let user = match self.repo.get_by_email(&email).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => {
                warn!(%email, "login unknown email");
                return Err(ApiError::bad_request("invalid credentials"));
            }
            Err(e) => {
                error!(error = %e, "get user by email failed");
                return Err(ApiError::internal("error while trying to login, try again later"));
            }
        };

        let matches = verify_blocking(password.to_string(), user.password.clone())
            .await
            .map_err(|e| {
                error!(error = %e, user_id = user.id, "verify password failed");
                ApiError::internal("error while trying to login, try again later")
            })?;
        if !matches {
            warn!(user_id = user.id, "login invalid password");
            return Err(ApiError::bad_request("invalid credentials"));
        }

        info!(user_id = user.id, "user logged in");
        Ok(user)
    }

    /// Merges `patch` over the stored user. Status and role are persisted
    /// only when `is_admin` is set.
    #[instrument(skip(self, patch), fields(user_id = patch.id))]
    pub async fn update(&self, patch: UserPatch, is_admin: bool) -> Result<User, ApiError> {
        let old = match self.repo.get(patch.id).await {
            Ok(user) => user,
            Err(RepoError::NotFound) => return Err(ApiError::not_found("user not found")),
            Err(e) => {
                error!(error = %e, "fetch user for update failed");
                return Err(ApiError::internal(
                    "error while trying to fetch user, try again later",
                ));
            }
        };

        let update_failed =
            || ApiError::internal("error while trying to update user, try again later");

        let email = if patch.email.trim().is_empty() {
            old.email.clone()
        } else {
            let email = normalize_email(&patch.email);
            if !is_valid_email(&email) {
                return Err(ApiError::bad_request("invalid email address"));
            }
            email
        };

        let password = if patch.password.is_empty() {
            old.password.clone()
        } else {
            hash_blocking(patch.password).await.map_err(|e| {
                error!(error = %e, "hash password failed");
                update_failed()
            })?
        };

        let user = User {
            id: old.id,
            first_name: keep_if_blank(&patch.first_name, &old.first_name),
            last_name: keep_if_blank(&patch.last_name, &old.last_name),
            email,
            password,
            date_created: old.date_created.clone(),
            last_modified: now_stamp(),
            status: patch.status.unwrap_or(old.status),
            role: patch.role.unwrap_or(old.role),
        };

        let classify = |e: RepoError| match e {
            RepoError::DuplicateEmail(email) => {
                warn!(%email, "email already registered");
                ApiError::bad_request("email already registered")
            }
            e => {
                error!(error = %e, "update user failed");
                update_failed()
            }
        };

        if is_admin {
            self.repo.update_admin(&user).await.map_err(classify)?;
        }
        self.repo.update(&user).await.map_err(classify)?;

        info!(is_admin, "user updated");
        self.publish(USER_UPDATED, user.clone());
        Ok(user)
    }

    /// Soft delete.
    #[instrument(skip(self))]
    pub async fn deactivate(&self, id: i64) -> Result<(), ApiError> {
        self.repo.delete(id).await.map_err(|e| {
            error!(error = %e, user_id = id, "delete user failed");
            ApiError::internal("error while trying to delete user, try again later")
        })?;
        info!(user_id = id, "user deactivated");
        Ok(())
    }
}

fn keep_if_blank(incoming: &str, old: &str) -> String {
    if incoming.trim().is_empty() {
        old.to_string()
    } else {
        normalize_name(incoming)
    }
}
