//! Minimal HTTP request executor built on the curl crate (libcurl).
//!
//! Performs one request and maps the outcome onto [`RequestError`] so the
//! engine can classify it: non-2xx responses become `Http`, transport
//! failures become named network categories.

use std::time::Duration;

use crate::retry::{classify_curl_error, classify_http_status, RequestError};

/// Outcome of a successful (2xx) request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResponse {
    pub status: u32,
    pub body_len: usize,
}

/// Perform a single request with the given method.
///
/// The body is read and discarded (only its length is kept). Runs in the
/// current thread; call from `spawn_blocking` if used from async code.
pub fn request(url: &str, method: &str, timeout: Duration) -> Result<ProbeResponse, RequestError> {
    let method = method.to_ascii_uppercase();
    let mut body_len = 0usize;

    let mut easy = curl::easy::Easy::new();
    configure(&mut easy, url, &method, timeout).map_err(|e| classify_curl_error(&e))?;

    {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| {
                body_len += data.len();
                Ok(data.len())
            })
            .map_err(|e| classify_curl_error(&e))?;
        transfer.perform().map_err(|e| classify_curl_error(&e))?;
    }

    let code = easy.response_code().map_err(|e| classify_curl_error(&e))?;
    if !(200..300).contains(&code) {
        return Err(classify_http_status(code));
    }
    Ok(ProbeResponse {
        status: code,
        body_len,
    })
}

fn configure(
    easy: &mut curl::easy::Easy,
    url: &str,
    method: &str,
    timeout: Duration,
) -> Result<(), curl::Error> {
    easy.url(url)?;
    easy.follow_location(true)?;
    easy.connect_timeout(timeout.min(Duration::from_secs(15)))?;
    easy.timeout(timeout)?;
    match method {
        "" | "GET" => {}
        "HEAD" => easy.nobody(true)?,
        other => easy.custom_request(other)?,
    }
    Ok(())
}

/// `request` on the blocking thread pool.
pub async fn request_async(
    url: &str,
    method: &str,
    timeout: Duration,
) -> Result<ProbeResponse, RequestError> {
    let url = url.to_string();
    let method = method.to_string();
    tokio::task::spawn_blocking(move || request(&url, &method, timeout))
        .await
        .unwrap_or_else(|e| Err(RequestError::Other(format!("probe task failed: {e}"))))
}
