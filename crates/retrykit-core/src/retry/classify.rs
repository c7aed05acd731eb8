//! Decide whether a failed attempt is worth retrying.
//!
//! Priority: an HTTP status decides alone; otherwise a named error category;
//! otherwise keywords in the lowercased message.

use std::io;

use crate::policy::RetryPolicy;
use crate::retry::error::RequestError;

/// Message fragments that mark an unnamed error as transient.
pub const RETRYABLE_MESSAGE_KEYWORDS: [&str; 6] = [
    "network",
    "timeout",
    "connection",
    "fetch",
    "aborted",
    "unavailable",
];

/// What the classifier needs to know about an error.
pub trait Classify {
    /// HTTP status carried by the error, if any.
    fn status(&self) -> Option<u16> {
        None
    }

    /// Named category (e.g. `TimeoutError`), if any.
    fn category(&self) -> Option<&str> {
        None
    }

    fn message(&self) -> String;
}

impl Classify for RequestError {
    fn status(&self) -> Option<u16> {
        match self {
            RequestError::Http { status } => Some(*status),
            _ => None,
        }
    }

    fn category(&self) -> Option<&str> {
        match self {
            RequestError::Network { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

impl Classify for io::Error {
    fn category(&self) -> Option<&str> {
        match self.kind() {
            io::ErrorKind::TimedOut => Some("TimeoutError"),
            io::ErrorKind::ConnectionRefused
            | io::ErrorKind::ConnectionReset
            | io::ErrorKind::ConnectionAborted
            | io::ErrorKind::NotConnected
            | io::ErrorKind::BrokenPipe => Some("ConnectionError"),
            _ => None,
        }
    }

    fn message(&self) -> String {
        self.to_string()
    }
}

impl Classify for anyhow::Error {
    fn message(&self) -> String {
        format!("{:#}", self)
    }
}

/// Whether `error` should be retried under `policy`.
pub fn is_retryable<E: Classify + ?Sized>(error: &E, policy: &RetryPolicy) -> bool {
    if let Some(status) = error.status() {
        return policy.retryable_statuses.contains(&status);
    }
    if let Some(name) = error.category() {
        return policy.retryable_errors.contains(name);
    }
    let message = error.message().to_lowercase();
    RETRYABLE_MESSAGE_KEYWORDS
        .iter()
        .any(|kw| message.contains(kw))
}

/// Map a non-success HTTP status to a request error.
pub fn classify_http_status(code: u32) -> RequestError {
    RequestError::Http {
        status: u16::try_from(code).unwrap_or(u16::MAX),
    }
}

/// Map a curl failure to a named category where one applies.
pub fn classify_curl_error(e: &curl::Error) -> RequestError {
    let message = e.to_string();
    if e.is_operation_timedout() {
        return RequestError::network("TimeoutError", message);
    }
    if e.is_couldnt_connect()
        || e.is_couldnt_resolve_host()
        || e.is_couldnt_resolve_proxy()
        || e.is_read_error()
        || e.is_recv_error()
        || e.is_send_error()
        || e.is_got_nothing()
    {
        return RequestError::network("ConnectionError", message);
    }
    if e.is_aborted_by_callback() {
        return RequestError::network("AbortError", message);
    }
    if e.is_ssl_connect_error() || e.is_partial_file() {
        return RequestError::network("NetworkError", message);
    }
    RequestError::Other(message)
}
