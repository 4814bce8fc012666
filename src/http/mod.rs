//! Request and response types shared by transports and clients.

mod request;
mod response;

pub use request::{Body, RequestDescriptor, RequestOptions};
pub use response::{AttemptOutcome, CallResult, Payload, RawResponse};
