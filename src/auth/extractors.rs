use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::debug;

use super::authority::{AuthorityError, AuthorizationIdentity};
use crate::{error::ApiError, state::AppState};

/// Bearer-token gate. Resolves the caller through the authority before the
/// handler runs; rejects the request otherwise.
pub struct AuthUser(pub AuthorizationIdentity);

/// Splits `Bearer <token>` and returns the token.
pub(crate) fn bearer_token(header: Option<&[u8]>) -> Result<&str, ApiError> {
    let raw = match header {
        Some(raw) if !raw.is_empty() => raw,
        _ => return Err(ApiError::bad_request("no authorization header was provided")),
    };
    let value = std::str::from_utf8(raw)
        .map_err(|_| ApiError::bad_request("invalid authorization header format"))?;

    let fields: Vec<&str> = value.split(' ').collect();
    let [scheme, token] = fields.as_slice() else {
        return Err(ApiError::bad_request("invalid authorization header format"));
    };
    if *scheme != "Bearer" {
        return Err(ApiError::bad_request("authorization type not supported"));
    }
    Ok(*token)
}

#[async_trait]
impl FromRequestParts<AppState> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts.headers.get(AUTHORIZATION).map(|h| h.as_bytes()))?;

        let identity = state.authority.verify(token).await.map_err(|e| match e {
            AuthorityError::Unavailable(_) => {
                ApiError::internal("couldn't verify session's validity")
            }
            AuthorityError::Rejected(status) => {
                debug!(%status, "session rejected");
                ApiError::unauthorized("you are not logged in")
            }
        })?;

        Ok(AuthUser(identity))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_or_empty_header() {
        for header in [None, Some(&b""[..])] {
            assert_eq!(
                bearer_token(header).unwrap_err(),
                ApiError::bad_request("no authorization header was provided")
            );
        }
    }

    #[test]
    fn header_needs_exactly_two_fields() {
        for value in ["Bearer", "Bearer a b", "Bearer  token", "token"] {
            assert_eq!(
                bearer_token(Some(value.as_bytes())).unwrap_err(),
                ApiError::bad_request("invalid authorization header format"),
                "{value}"
            );
        }
    }

    #[test]
    fn only_bearer_scheme() {
        for value in ["Basic dXNlcjpwYXNz", "bearer token"] {
            assert_eq!(
                bearer_token(Some(value.as_bytes())).unwrap_err(),
                ApiError::bad_request("authorization type not supported")
            );
        }
    }

    #[test]
    fn non_utf8_is_bad_format() {
        assert_eq!(
            bearer_token(Some(&[0x42u8, 0xff, 0x20, 0x61][..])).unwrap_err(),
            ApiError::bad_request("invalid authorization header format")
        );
    }

    #[test]
    fn extracts_token() {
        assert_eq!(bearer_token(Some(&b"Bearer abc123"[..])).unwrap(), "abc123");
    }
}
