use crate::domain::party::{Party, PartyKind};
use crate::error::{AppError, Result};
use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

pub const PARTY_ID_HEADER: &str = "x-party-id";
pub const PARTY_KIND_HEADER: &str = "x-party-kind";

/// Caller identity asserted by the upstream authenticator.
#[derive(Debug, Clone, Copy)]
pub struct Caller(pub Party);

impl<S: Send + Sync> FromRequestParts<S> for Caller {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self> {
        party_from_headers(&parts.headers).map(Self)
    }
}

/// # Errors
/// Returns `AppError::Unauthenticated` if either header is missing or malformed.
pub fn party_from_headers(headers: &HeaderMap) -> Result<Party> {
    let id = headers.get(PARTY_ID_HEADER).and_then(|v| v.to_str().ok()).ok_or(AppError::Unauthenticated)?;
    let kind = headers.get(PARTY_KIND_HEADER).and_then(|v| v.to_str().ok()).ok_or(AppError::Unauthenticated)?;
    parse_party(id, kind)
}

/// Parses a positive party id and a side name. Id 0 is reserved for system messages.
///
/// # Errors
/// Returns `AppError::Unauthenticated` if either part is malformed.
pub fn parse_party(id: &str, kind: &str) -> Result<Party> {
    let id: i64 = id.trim().parse().map_err(|_| AppError::Unauthenticated)?;
    if id <= 0 {
        return Err(AppError::Unauthenticated);
    }
    let kind: PartyKind = kind.parse().map_err(|_| AppError::Unauthenticated)?;
    Ok(Party::new(id, kind))
}
