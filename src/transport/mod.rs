//! Transport abstraction over the HTTP library.
//!
//! Clients never talk to reqwest directly; they go through [`Transport`]
//! (blocking) or [`AsyncTransport`] (cooperative), which makes the retry
//! orchestrators testable with mocks.

mod blocking;
mod session;
mod shared;

use async_trait::async_trait;

use crate::error::TransportError;
use crate::http::{RawResponse, RequestDescriptor};

pub use blocking::ReqwestTransport;
pub use session::ReqwestSession;
pub use shared::{SharedSession, TransportFactory};

/// Performs exactly one blocking HTTP exchange.
#[cfg_attr(test, mockall::automock)]
pub trait Transport: Send + Sync {
    /// Returns the response for any status, or the reason none was received.
    fn execute(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError>;
}

/// Performs exactly one HTTP exchange without blocking the runtime.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait AsyncTransport: Send + Sync {
    async fn execute(&self, request: &RequestDescriptor) -> Result<RawResponse, TransportError>;

    /// Releases the underlying connections. Later requests fail.
    async fn close(&self);
}
