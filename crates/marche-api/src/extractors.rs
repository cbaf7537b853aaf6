//! Custom Axum extractors
//!
//! The gateway authenticates the caller and forwards the identity as
//! `x-actor-id` and `x-actor-role`. Requests without both are rejected
//! before any handler runs.

use axum::{
    async_trait,
    extract::{FromRequest, FromRequestParts, Request},
    http::request::Parts,
    Json,
};
use marche_types::{Actor, Role, UserId};
use serde::de::DeserializeOwned;

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// Identity acting on this request
#[derive(Debug, Clone, Copy)]
pub struct RequestActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for RequestActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ApiError::Unauthenticated(format!("missing {} header", name)))
        };

        let user_id = UserId::parse(header(ACTOR_ID_HEADER)?)
            .map_err(|e| ApiError::Unauthenticated(format!("invalid {}: {}", ACTOR_ID_HEADER, e)))?;
        let role: Role = header(ACTOR_ROLE_HEADER)?
            .parse()
            .map_err(|e| ApiError::Unauthenticated(format!("invalid {}: {}", ACTOR_ROLE_HEADER, e)))?;

        Ok(RequestActor(Actor::new(user_id, role)))
    }
}

/// JSON extractor with validation
pub struct ValidatedJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ValidatedJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + validator::Validate,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state)
            .await
            .map_err(|e| ApiError::BadRequest(e.body_text()))?;

        value
            .validate()
            .map_err(|e| ApiError::ValidationError(format_validation_errors(&e)))?;

        Ok(ValidatedJson(value))
    }
}

fn format_validation_errors(errors: &validator::ValidationErrors) -> String {
    errors
        .field_errors()
        .iter()
        .flat_map(|(field, errs)| {
            errs.iter().map(move |e| {
                e.message
                    .as_ref()
                    .map(|m| m.to_string())
                    .unwrap_or_else(|| format!("{}: validation failed", field))
            })
        })
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::Request as HttpRequest;

    async fn extract(builder: axum::http::request::Builder) -> Result<RequestActor, ApiError> {
        let (mut parts, _) = builder.body(()).unwrap().into_parts();
        RequestActor::from_request_parts(&mut parts, &()).await
    }

    #[tokio::test]
    async fn test_actor_from_headers() {
        let user = UserId::new();
        let actor = extract(
            HttpRequest::builder()
                .header(ACTOR_ID_HEADER, user.to_string())
                .header(ACTOR_ROLE_HEADER, "seller"),
        )
        .await
        .unwrap();
        assert_eq!(actor.0, Actor::seller(user));
    }

    #[tokio::test]
    async fn test_missing_or_bad_identity_is_unauthenticated() {
        let missing = extract(HttpRequest::builder()).await.unwrap_err();
        assert!(matches!(missing, ApiError::Unauthenticated(_)));

        let bad_role = extract(
            HttpRequest::builder()
                .header(ACTOR_ID_HEADER, UserId::new().to_string())
                .header(ACTOR_ROLE_HEADER, "courier"),
        )
        .await
        .unwrap_err();
        assert!(matches!(bad_role, ApiError::Unauthenticated(_)));

        let bad_id = extract(
            HttpRequest::builder()
                .header(ACTOR_ID_HEADER, "not-a-uuid")
                .header(ACTOR_ROLE_HEADER, "admin"),
        )
        .await
        .unwrap_err();
        assert!(matches!(bad_id, ApiError::Unauthenticated(_)));
    }
}
