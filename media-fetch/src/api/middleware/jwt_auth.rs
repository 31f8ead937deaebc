//! Bearer-token authentication.
//!
//! [`JwtAuthLayer`] validates the `Authorization` header and stores the
//! [`Claims`] in the request extensions; handlers read them via [`AuthUser`].

use axum::{
    extract::FromRequestParts,
    http::{StatusCode, header::AUTHORIZATION, request::Parts},
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use crate::api::error::ApiError;
use crate::api::jwt::{Claims, JwtError, JwtService};

#[derive(Debug)]
pub enum JwtAuthError {
    MissingToken,
    /// Header present but not `Bearer <token>`
    InvalidFormat,
    InvalidToken(JwtError),
}

impl IntoResponse for JwtAuthError {
    fn into_response(self) -> Response {
        let message = match self {
            JwtAuthError::MissingToken => "Missing authorization token",
            JwtAuthError::InvalidFormat => "Invalid token format",
            JwtAuthError::InvalidToken(JwtError::TokenExpired) => "Token has expired",
            JwtAuthError::InvalidToken(_) => "Invalid token",
        };
        ApiError::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message).into_response()
    }
}

fn bearer_token(value: Option<&axum::http::HeaderValue>) -> Result<&str, JwtAuthError> {
    let header = value.ok_or(JwtAuthError::MissingToken)?;
    let header = header.to_str().map_err(|_| JwtAuthError::InvalidFormat)?;
    header
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(JwtAuthError::InvalidFormat)
}

/// Layer validating bearer tokens on every request it wraps.
#[derive(Clone)]
pub struct JwtAuthLayer {
    jwt_service: Arc<JwtService>,
}

impl JwtAuthLayer {
    pub fn new(jwt_service: Arc<JwtService>) -> Self {
        Self { jwt_service }
    }
}

impl<S> tower::Layer<S> for JwtAuthLayer {
    type Service = JwtAuthService<S>;

    fn layer(&self, inner: S) -> Self::Service {
        JwtAuthService {
            inner,
            jwt_service: self.jwt_service.clone(),
        }
    }
}

#[derive(Clone)]
pub struct JwtAuthService<S> {
    inner: S,
    jwt_service: Arc<JwtService>,
}

impl<S, B> tower::Service<axum::http::Request<B>> for JwtAuthService<S>
where
    S: tower::Service<axum::http::Request<B>, Response = Response> + Clone + Send + 'static,
    S::Future: Send,
    B: Send + 'static,
{
    type Response = S::Response;
    type Error = S::Error;
    type Future = std::pin::Pin<
        Box<dyn std::future::Future<Output = Result<Self::Response, Self::Error>> + Send>,
    >;

    fn poll_ready(
        &mut self,
        cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<Result<(), Self::Error>> {
        self.inner.poll_ready(cx)
    }

    fn call(&mut self, request: axum::http::Request<B>) -> Self::Future {
        let jwt_service = self.jwt_service.clone();
        let mut inner = self.inner.clone();

        Box::pin(async move {
            let claims = match bearer_token(request.headers().get(AUTHORIZATION)) {
                Ok(token) => match jwt_service.validate_token(token) {
                    Ok(claims) => claims,
                    Err(e) => {
                        tracing::debug!("Rejected bearer token: {}", e);
                        return Ok(JwtAuthError::InvalidToken(e).into_response());
                    }
                },
                Err(e) => return Ok(e.into_response()),
            };

            let (mut parts, body) = request.into_parts();
            parts.extensions.insert(claims);
            inner
                .call(axum::http::Request::from_parts(parts, body))
                .await
        })
    }
}

/// The authenticated caller of a handler.
#[derive(Debug, Clone)]
pub struct AuthUser(pub Claims);

impl<S: Send + Sync> FromRequestParts<S> for AuthUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Claims>()
            .cloned()
            .map(AuthUser)
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}
