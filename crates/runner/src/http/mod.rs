//! HTTP transport used to replay stages
//!
//! Requests are written to the socket byte for byte so that malformed and
//! raw requests reach the WAF untouched. [`Transport`] is the seam the stage
//! executor talks to; [`HttpClient`] is the socket implementation.

mod client;
mod request;
mod response;

pub use client::{ClientConfig, HttpClient};
pub use request::{Request, RequestLine};
pub use response::Response;

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;
use wafreplay_common::Destination;

#[derive(Error, Debug)]
pub enum HttpError {
    #[error("connect to {addr} failed: {source}")]
    Connect {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("connect to {addr} timed out after {timeout:?}")]
    ConnectTimeout { addr: String, timeout: Duration },

    #[error("no response within {timeout:?}")]
    ReadTimeout { timeout: Duration },

    #[error("TLS error: {0}")]
    Tls(String),

    #[error("not connected")]
    NotConnected,

    #[error("connection closed before a response was received")]
    ConnectionClosed,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

pub type HttpResult<T> = Result<T, HttpError>;

/// Connection-oriented request/response transport
#[async_trait]
pub trait Transport: Send {
    /// Open a new connection to `dest`, dropping any current one
    async fn connect(&mut self, dest: &Destination) -> HttpResult<()>;

    /// Keep the current connection if it targets `dest` and is still usable,
    /// otherwise open a new one
    async fn connect_or_reuse(&mut self, dest: &Destination) -> HttpResult<()>;

    /// Send a request on the current connection and read its response
    async fn send(&mut self, request: &Request) -> HttpResult<Response>;
}
