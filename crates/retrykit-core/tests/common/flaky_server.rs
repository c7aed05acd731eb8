//! Minimal HTTP/1.1 server for integration tests that fails a fixed number
//! of times before succeeding.
//!
//! Every request is counted. The first `failures` requests get
//! `failure_status`; later ones get 200 with a small body.

use std::io::{Read, Write};
use std::net::TcpListener;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;

#[derive(Debug, Clone, Copy)]
pub struct FlakyServerOptions {
    /// How many requests fail before the server starts answering 200.
    pub failures: usize,
    /// Status line used for failing requests.
    pub failure_status: &'static str,
}

impl Default for FlakyServerOptions {
    fn default() -> Self {
        Self {
            failures: 2,
            failure_status: "503 Service Unavailable",
        }
    }
}

/// Handle to a running server: base URL and request counter.
pub struct FlakyServer {
    pub url: String,
    hits: Arc<AtomicUsize>,
}

impl FlakyServer {
    pub fn hits(&self) -> usize {
        self.hits.load(Ordering::SeqCst)
    }
}

/// Starts a server in a background thread. Runs until the process exits.
pub fn start(opts: FlakyServerOptions) -> FlakyServer {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let hits = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&hits);
    thread::spawn(move || {
        for stream in listener.incoming().flatten() {
            let n = counter.fetch_add(1, Ordering::SeqCst);
            thread::spawn(move || handle(stream, n, opts));
        }
    });
    FlakyServer {
        url: format!("http://127.0.0.1:{}/api/orders", port),
        hits,
    }
}

fn handle(mut stream: std::net::TcpStream, index: usize, opts: FlakyServerOptions) {
    let _ = stream.set_read_timeout(Some(std::time::Duration::from_secs(2)));
    let _ = stream.set_write_timeout(Some(std::time::Duration::from_secs(2)));
    let mut buf = [0u8; 8192];
    match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(_) => {}
    }
    let (status, body): (&str, &[u8]) = if index < opts.failures {
        (opts.failure_status, b"")
    } else {
        ("200 OK", b"{\"ok\":true}")
    };
    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        status,
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.write_all(body);
}
