//! The HTTP seam.
//!
//! Nothing in this crate opens a socket. Callers hand in a [`Transport`] that
//! performs one request and returns the whole response; tests use in-memory
//! ones.

use std::sync::Arc;

use async_trait::async_trait;
use http::header::ACCEPT;
use http::{Method, Request, Response, StatusCode};
use thiserror::Error;
use url::Url;

/// Failures below the HTTP status level.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid request for {url}: {message}")]
    InvalidRequest { url: String, message: String },
    #[error("request to {url} failed: {message}")]
    Failed { url: String, message: String },
    #[error("request to {url} timed out")]
    Timeout { url: String },
}

/// Performs a single HTTP exchange.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: Request<()>) -> Result<Response<Vec<u8>>, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for &T {
    async fn send(&self, request: Request<()>) -> Result<Response<Vec<u8>>, TransportError> {
        (**self).send(request).await
    }
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for Arc<T> {
    async fn send(&self, request: Request<()>) -> Result<Response<Vec<u8>>, TransportError> {
        (**self).send(request).await
    }
}

/// 4xx: the resource is missing or forbidden, which callers treat as absent.
pub fn is_absent(status: StatusCode) -> bool {
    status.is_client_error()
}

/// A bodiless request for `url` that asks for `accept`.
pub fn request(method: Method, url: &Url, accept: &str) -> Result<Request<()>, TransportError> {
    Request::builder()
        .method(method)
        .uri(url.as_str())
        .header(ACCEPT, accept)
        .body(())
        .map_err(|e| TransportError::InvalidRequest {
            url: url.to_string(),
            message: e.to_string(),
        })
}
