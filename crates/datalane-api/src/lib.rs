//! Async network transport for `datalane`.
//!
//! The orchestration layer in `datalane-core` never talks to `reqwest`
//! directly. It hands a [`Request`] to anything implementing [`Transport`]
//! and gets a [`Response`] or an [`Error`] back. [`HttpTransport`] is the
//! production implementation; tests substitute their own.

pub mod client;
pub mod error;
pub mod request;
pub mod transport;

pub use client::{HttpTransport, Transport};
pub use error::Error;
pub use request::{BODY_PARAM, Method, Request, Response};
pub use transport::{TlsMode, TransportConfig};
