use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tracing::{instrument, warn};

use crate::{
    auth::{authority::AuthorizationIdentity, extractors::AuthUser},
    error::ApiError,
    state::AppState,
    users::{
        dto::{LoginRequest, RegisterRequest, UpdateRequest},
        model::{NewUser, Role, Status, User, UserPatch},
    },
};

const FORBIDDEN: &str = "you don't have the permissions to access this resource";

pub fn user_routes() -> Router<AppState> {
    Router::new()
        .route("/users", post(register))
        .route("/users/login", post(login))
        .route(
            "/users/:user_id",
            get(get_user).put(update_user).delete(delete_user),
        )
}

fn body<T>(payload: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    payload.map(|Json(p)| p).map_err(|e| {
        warn!(error = %e, "rejected request body");
        ApiError::bad_request("invalid request")
    })
}

fn parse_user_id(raw: &str) -> Result<i64, ApiError> {
    raw.parse::<i64>()
        .map_err(|_| ApiError::bad_request("user id not valid"))
}

fn can_read(identity: &AuthorizationIdentity, id: i64) -> bool {
    identity.id == id
}

fn can_write(identity: &AuthorizationIdentity, id: i64) -> bool {
    identity.id == id || identity.is_admin()
}

#[instrument(skip(state, payload))]
pub async fn register(
    State(state): State<AppState>,
    payload: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<User>), ApiError> {
    let req = body(payload)?;
    if req.password != req.confirm_password {
        return Err(ApiError::bad_request("passwords are not equal"));
    }

    let user = state
        .users
        .register(NewUser {
            first_name: req.first_name,
            last_name: req.last_name,
            email: req.email,
            password: req.password,
        })
        .await?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[instrument(skip(state, payload))]
pub async fn login(
    State(state): State<AppState>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let req = body(payload)?;
    let user = state.users.login(&req.email, &req.password).await?;
    Ok(Json(user))
}

#[instrument(skip(state))]
pub async fn get_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(user_id): Path<String>,
) -> Result<Json<User>, ApiError> {
    let id = parse_user_id(&user_id)?;
    if !can_read(&identity, id) {
        return Err(ApiError::unauthorized(FORBIDDEN));
    }
    Ok(Json(state.users.get_user(id).await?))
}

#[instrument(skip(state, payload))]
pub async fn update_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(user_id): Path<String>,
    payload: Result<Json<UpdateRequest>, JsonRejection>,
) -> Result<Json<User>, ApiError> {
    let id = parse_user_id(&user_id)?;
    if !can_write(&identity, id) {
        return Err(ApiError::unauthorized(FORBIDDEN));
    }

    let req = body(payload)?;
    if req.password != req.confirm_password {
        return Err(ApiError::bad_request("passwords are not equal"));
    }

    let is_admin = identity.is_admin();
    let (status, role) = if is_admin {
        (
            parse_optional::<Status>(&req.status, "invalid status")?,
            parse_optional::<Role>(&req.role, "invalid role")?,
        )
    } else {
        (None, None)
    };

    let patch = UserPatch {
        id,
        first_name: req.first_name,
        last_name: req.last_name,
        email: req.email,
        password: req.password,
        status,
        role,
    };
    Ok(Json(state.users.update(patch, is_admin).await?))
}

#[instrument(skip(state))]
pub async fn delete_user(
    State(state): State<AppState>,
    AuthUser(identity): AuthUser,
    Path(user_id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_user_id(&user_id)?;
    if !identity.is_admin() {
        return Err(ApiError::unauthorized(FORBIDDEN));
    }
    state.users.deactivate(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

fn parse_optional<T: std::str::FromStr>(raw: &str, msg: &str) -> Result<Option<T>, ApiError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Ok(None);
    }
    raw.to_lowercase()
        .parse()
        .map(Some)
        .map_err(|_| ApiError::bad_request(msg))
}
