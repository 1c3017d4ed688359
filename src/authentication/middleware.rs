use std::sync::Arc;

use warp::{reject::Rejection, Filter};

use super::jwt::{verify_jwt_session, SessionData};
use crate::{constants::AUTHORIZATION_SCHEMES, error::ApiError};

/// Extracts the token from `Authorization: Token <token>` (or `Bearer`).
pub fn parse_authorization(header: &str) -> Option<&str> {
    let (scheme, token) = header.trim().split_once(' ')?;
    let token = token.trim();

    if token.is_empty() || !AUTHORIZATION_SCHEMES.iter().any(|s| s.eq_ignore_ascii_case(scheme)) {
        return None;
    }

    Some(token)
}

pub fn with_session(
    secret: Arc<str>,
) -> impl Filter<Extract = (SessionData,), Error = Rejection> + Clone {
    warp::header::optional::<String>("authorization").and_then(move |header: Option<String>| {
        let secret = secret.clone();
        async move {
            let header = header.ok_or_else(|| warp::reject::custom(ApiError::NotAuthenticated))?;
            let token = parse_authorization(&header).ok_or_else(|| {
                warp::reject::custom(ApiError::AuthenticationFailed(
                    "Invalid token header. No credentials provided.",
                ))
            })?;

            verify_jwt_session(token, &secret)
                .map(SessionData::from)
                .map_err(warp::reject::custom)
        }
    })
}
