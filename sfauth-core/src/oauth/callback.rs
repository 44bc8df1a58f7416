//! Local OAuth redirect listener racing manual code entry.
//!
//! The authorization code can arrive two ways: the browser follows the
//! redirect to `http://localhost:{port}/callback`, or the user pastes the
//! code (or the whole redirect URL) into the terminal. Whichever comes
//! first wins; later arrivals are ignored. Both race a wall-clock deadline.
//!
//! ```text
//! Idle -> Listening -> { Resolved(code) | Resolved(error) | TimedOut } -> Closed
//! ```
//!
//! The terminal line is read on a plain OS thread because a blocking stdin
//! read cannot be cancelled. When the HTTP side wins, that thread stays
//! parked until the process exits.
//!
//! # Example
//!
//! ```rust,no_run
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! use sfauth_core::oauth::CallbackListener;
//! use std::time::Duration;
//!
//! let pending = CallbackListener::new(8080).start().await?;
//! pending.spawn_manual_input(std::io::BufReader::new(std::io::stdin()));
//!
//! let deadline = tokio::time::Instant::now() + Duration::from_secs(300);
//! let code = pending.wait(deadline).await?.into_code()?;
//! # Ok(())
//! # }
//! ```

use std::io::BufRead;
use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use url::Url;

use crate::model::CALLBACK_PATH;

/// Message used when a callback or pasted input carries neither a code nor an error.
pub const NO_CODE_MESSAGE: &str = "no authorization code received";

/// How long the listener stays open after resolution so the browser gets its page.
const SHUTDOWN_GRACE: Duration = Duration::from_millis(100);

/// How long a connection may take to send its request line and headers.
const READ_TIMEOUT: Duration = Duration::from_secs(30);

const MAX_REQUEST_BYTES: usize = 8 * 1024;

/// Error type for the callback flow.
#[derive(Debug, Error)]
pub enum CallbackError {
    /// The callback port is taken. The port is part of the registered
    /// redirect URL, so no other port is tried.
    #[error("failed to start callback server on port {port}: {source}")]
    Bind {
        port: u16,
        #[source]
        source: std::io::Error,
    },

    /// Neither the callback nor manual input arrived before the deadline.
    #[error("authorization timed out")]
    TimedOut,

    /// The provider (or the pasted redirect) reported an error.
    #[error("authorization failed: {0}")]
    Denied(String),

    /// The callback carried neither a code nor an error.
    #[error("{}", NO_CODE_MESSAGE)]
    NoCode,

    /// Socket error while setting up the listener.
    #[error("callback server I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Outcome of the race: exactly one of a code or an error message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackResult {
    /// The authorization code.
    Code(String),
    /// `error` or `error: error_description` from the provider.
    Error(String),
}

impl CallbackResult {
    /// Turn the result into the authorization code or an error.
    pub fn into_code(self) -> Result<String, CallbackError> {
        match self {
            CallbackResult::Code(code) if code.is_empty() => Err(CallbackError::NoCode),
            CallbackResult::Code(code) => Ok(code),
            CallbackResult::Error(message) if message == NO_CODE_MESSAGE => Err(CallbackError::NoCode),
            CallbackResult::Error(message) => Err(CallbackError::Denied(message)),
        }
    }
}

/// First-writer-wins slot shared by the HTTP handler and the input thread.
struct Resolver {
    tx: mpsc::Sender<CallbackResult>,
    resolved: Notify,
    done: AtomicBool,
}

impl Resolver {
    /// Record `result` if nothing has been recorded yet.
    fn resolve(&self, result: CallbackResult) -> bool {
        if self.done.swap(true, Ordering::SeqCst) {
            tracing::debug!("callback already resolved, ignoring");
            return false;
        }
        // Capacity 1 and a single successful writer, so this never blocks or fails.
        let _ = self.tx.try_send(result);
        self.resolved.notify_one();
        true
    }
}

/// Configuration for the local callback listener.
#[derive(Debug, Clone)]
pub struct CallbackListener {
    port: u16,
    expected_state: Option<String>,
}

impl CallbackListener {
    /// Listen on `127.0.0.1:{port}`. Port 0 picks a free port (tests).
    pub fn new(port: u16) -> Self {
        Self {
            port,
            expected_state: None,
        }
    }

    /// Reject callbacks whose `state` differs from `state`.
    ///
    /// A mismatching callback gets an error page but does not resolve the
    /// race, so a stray request cannot abort a genuine login.
    pub fn with_expected_state(mut self, state: impl Into<String>) -> Self {
        self.expected_state = Some(state.into());
        self
    }

    /// Bind the port and start serving.
    ///
    /// Fails immediately with [`CallbackError::Bind`] if the port is in use.
    pub async fn start(self) -> Result<PendingCallback, CallbackError> {
        let addr = SocketAddr::from(([127, 0, 0, 1], self.port));
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|source| CallbackError::Bind {
                port: self.port,
                source,
            })?;
        let local_addr = listener.local_addr()?;

        tracing::info!("Listening for OAuth callback on {}", local_addr);

        let (tx, rx) = mpsc::channel(1);
        let resolver = Arc::new(Resolver {
            tx,
            resolved: Notify::new(),
            done: AtomicBool::new(false),
        });

        let server = tokio::spawn(serve(listener, self.expected_state, resolver.clone()));

        Ok(PendingCallback {
            local_addr,
            resolver,
            rx,
            server: Some(server),
        })
    }
}

/// A running listener waiting for the authorization code.
pub struct PendingCallback {
    local_addr: SocketAddr,
    resolver: Arc<Resolver>,
    rx: mpsc::Receiver<CallbackResult>,
    server: Option<JoinHandle<()>>,
}

impl PendingCallback {
    /// Address the listener is bound to.
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Race one line of `reader` against the HTTP callback.
    ///
    /// The line may be a raw code or a full redirect URL. End of input or a
    /// read error leaves the race to the callback and the deadline.
    pub fn spawn_manual_input<R>(&self, mut reader: R)
    where
        R: BufRead + Send + 'static,
    {
        let resolver = self.resolver.clone();
        let spawned = std::thread::Builder::new()
            .name("sfauth-manual-input".to_string())
            .spawn(move || {
                let mut line = String::new();
                match reader.read_line(&mut line) {
                    Ok(0) => tracing::debug!("manual input closed without a line"),
                    Ok(_) => {
                        resolver.resolve(manual_result(&line));
                    }
                    Err(e) => tracing::debug!(error = %e, "failed to read manual input"),
                }
            });

        if let Err(e) = spawned {
            tracing::warn!(error = %e, "could not start manual input reader");
        }
    }

    /// Wait for the first result or the deadline.
    ///
    /// The listener is closed shortly after either happens.
    pub async fn wait(mut self, deadline: Instant) -> Result<CallbackResult, CallbackError> {
        let server = self.server.take();
        let resolver = self.resolver.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = tokio::time::sleep_until(deadline) => {}
                _ = resolver.resolved.notified() => {}
            }
            tokio::time::sleep(SHUTDOWN_GRACE).await;
            if let Some(server) = server {
                server.abort();
            }
            tracing::debug!("callback listener closed");
        });

        match tokio::time::timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(result)) => Ok(result),
            Ok(None) | Err(_) => Err(CallbackError::TimedOut),
        }
    }
}

impl Drop for PendingCallback {
    fn drop(&mut self) {
        if let Some(server) = self.server.take() {
            server.abort();
        }
    }
}

async fn serve(listener: TcpListener, expected_state: Option<String>, resolver: Arc<Resolver>) {
    let expected_state: Arc<Option<String>> = Arc::new(expected_state);

    loop {
        match listener.accept().await {
            Ok((socket, peer)) => {
                tracing::debug!(%peer, "callback connection accepted");
                tokio::spawn(handle_connection(
                    socket,
                    expected_state.clone(),
                    resolver.clone(),
                ));
            }
            Err(e) => {
                resolver.resolve(CallbackResult::Error(format!("callback server error: {}", e)));
                return;
            }
        }
    }
}

async fn handle_connection(
    mut socket: TcpStream,
    expected_state: Arc<Option<String>>,
    resolver: Arc<Resolver>,
) {
    let target = match tokio::time::timeout(READ_TIMEOUT, read_request_target(&mut socket)).await {
        Ok(Ok(Some(target))) => target,
        Ok(Ok(None)) => {
            let _ = socket.write_all(http_response("400 Bad Request", BAD_REQUEST_PAGE).as_bytes()).await;
            return;
        }
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "failed to read callback request");
            return;
        }
        Err(_) => {
            tracing::debug!("callback request timed out");
            return;
        }
    };

    let response = respond(&target, (*expected_state).as_deref(), &resolver);
    if let Err(e) = socket.write_all(response.as_bytes()).await {
        tracing::debug!(error = %e, "failed to write callback response");
    }
    let _ = socket.shutdown().await;
}

/// Read the request head and return the request target, if well formed.
async fn read_request_target(socket: &mut TcpStream) -> std::io::Result<Option<String>> {
    let mut buf = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    loop {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);
        if buf.windows(4).any(|w| w == b"\r\n\r\n") || buf.len() >= MAX_REQUEST_BYTES {
            break;
        }
    }

    let head = String::from_utf8_lossy(&buf);
    let Some(request_line) = head.lines().next() else {
        return Ok(None);
    };

    let mut parts = request_line.split_whitespace();
    match (parts.next(), parts.next()) {
        (Some(_method), Some(target)) if target.starts_with('/') => Ok(Some(target.to_string())),
        _ => Ok(None),
    }
}

/// Build the HTTP response for a request target, resolving the race if it
/// is a callback.
fn respond(target: &str, expected_state: Option<&str>, resolver: &Resolver) -> String {
    let Ok(url) = Url::parse(&format!("http://localhost{}", target)) else {
        return http_response("400 Bad Request", BAD_REQUEST_PAGE);
    };

    if url.path() != CALLBACK_PATH {
        return http_response("404 Not Found", NOT_FOUND_PAGE);
    }

    if let Some(expected) = expected_state {
        let state = query_param(&url, "state");
        if state.as_deref().is_some_and(|s| s != expected) {
            tracing::warn!("ignoring OAuth callback with mismatched state");
            return http_response("400 Bad Request", &failure_page("state parameter mismatch"));
        }
    }

    let result = result_from_query(&url);
    let page = match &result {
        CallbackResult::Code(_) => SUCCESS_PAGE.to_string(),
        CallbackResult::Error(message) if message == NO_CODE_MESSAGE => NO_CODE_PAGE.to_string(),
        CallbackResult::Error(message) => failure_page(message),
    };

    resolver.resolve(result);
    http_response("200 OK", &page)
}

fn query_param(url: &Url, key: &str) -> Option<String> {
    url.query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Interpret the query of a redirect URL.
fn result_from_query(url: &Url) -> CallbackResult {
    let error = query_param(url, "error").unwrap_or_default();
    if !error.is_empty() {
        return match query_param(url, "error_description") {
            Some(description) if !description.is_empty() => {
                CallbackResult::Error(format!("{}: {}", error, description))
            }
            _ => CallbackResult::Error(error),
        };
    }

    match query_param(url, "code") {
        Some(code) if !code.is_empty() => CallbackResult::Code(code),
        _ => CallbackResult::Error(NO_CODE_MESSAGE.to_string()),
    }
}

fn is_localhost_url(input: &str) -> bool {
    input.starts_with("http://localhost") || input.starts_with("https://localhost")
}

/// Extract an authorization code from user input.
///
/// Accepts a raw code or a full `localhost` redirect URL, whose `code`
/// query parameter is returned URL-decoded. A redirect URL without a code
/// yields an empty string.
pub fn extract_auth_code(input: &str) -> String {
    let input = input.trim();

    if is_localhost_url(input) {
        return Url::parse(input)
            .ok()
            .and_then(|url| query_param(&url, "code"))
            .unwrap_or_default();
    }

    input.to_string()
}

/// Interpret a pasted line. Pasted redirect URLs carrying an error resolve
/// as that error.
fn manual_result(input: &str) -> CallbackResult {
    let input = input.trim();

    if is_localhost_url(input) {
        return match Url::parse(input) {
            Ok(url) => result_from_query(&url),
            Err(_) => CallbackResult::Error(NO_CODE_MESSAGE.to_string()),
        };
    }

    if input.is_empty() {
        return CallbackResult::Error(NO_CODE_MESSAGE.to_string());
    }
    CallbackResult::Code(input.to_string())
}

fn http_response(status: &str, body: &str) -> String {
    format!(
        "HTTP/1.1 {}\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        status,
        body.len(),
        body
    )
}

fn html_escape(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

const SUCCESS_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Authentication Successful</title></head>
<body>
<h1>Authentication Successful!</h1>
<p>You can close this window and return to the terminal.</p>
</body>
</html>";

const NO_CODE_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Authentication Failed</title></head>
<body>
<h1>Authentication Failed</h1>
<p>No authorization code received.</p>
<p>You can close this window.</p>
</body>
</html>";

const NOT_FOUND_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Not Found</title></head>
<body><h1>Not Found</h1></body>
</html>";

const BAD_REQUEST_PAGE: &str = "<!DOCTYPE html>
<html>
<head><title>Bad Request</title></head>
<body><h1>Bad Request</h1></body>
</html>";

fn failure_page(message: &str) -> String {
    format!(
        "<!DOCTYPE html>
<html>
<head><title>Authentication Failed</title></head>
<body>
<h1>Authentication Failed</h1>
<p>Error: {}</p>
<p>You can close this window.</p>
</body>
</html>",
        html_escape(message)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn resolver() -> (Resolver, mpsc::Receiver<CallbackResult>) {
        let (tx, rx) = mpsc::channel(1);
        (
            Resolver {
                tx,
                resolved: Notify::new(),
                done: AtomicBool::new(false),
            },
            rx,
        )
    }

    #[test]
    fn test_extract_auth_code() {
        assert_eq!(extract_auth_code("abc123"), "abc123");
        assert_eq!(
            extract_auth_code("http://localhost:8080/callback?code=abc123&state=s"),
            "abc123"
        );
        assert_eq!(
            extract_auth_code("http://localhost:8080/callback?code=4%2F0AQS"),
            "4/0AQS"
        );
        assert_eq!(
            extract_auth_code("http://localhost:8080/callback?error=access_denied"),
            ""
        );
        assert_eq!(extract_auth_code(""), "");
        assert_eq!(extract_auth_code("  abc123  "), "abc123");
        assert_eq!(
            extract_auth_code("https://localhost/callback?code=aPrx%3D%3D"),
            "aPrx=="
        );
    }

    #[test]
    fn test_manual_result() {
        assert_eq!(manual_result("abc123\n"), CallbackResult::Code("abc123".to_string()));
        assert_eq!(
            manual_result("http://localhost:8080/callback?code=4%2F0AQS\n"),
            CallbackResult::Code("4/0AQS".to_string())
        );
        assert_eq!(
            manual_result("http://localhost:8080/callback?error=access_denied&error_description=end-user+denied"),
            CallbackResult::Error("access_denied: end-user denied".to_string())
        );
        assert_eq!(
            manual_result("\n"),
            CallbackResult::Error(NO_CODE_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_into_code() {
        assert_eq!(CallbackResult::Code("x".to_string()).into_code().unwrap(), "x");
        assert!(matches!(
            CallbackResult::Code(String::new()).into_code(),
            Err(CallbackError::NoCode)
        ));
        assert!(matches!(
            CallbackResult::Error(NO_CODE_MESSAGE.to_string()).into_code(),
            Err(CallbackError::NoCode)
        ));

        let err = CallbackResult::Error("access_denied".to_string())
            .into_code()
            .unwrap_err();
        assert_eq!(err.to_string(), "authorization failed: access_denied");
    }

    #[test]
    fn test_respond_code() {
        let (resolver, mut rx) = resolver();

        let response = respond("/callback?code=abc&state=s1", Some("s1"), &resolver);

        assert!(response.starts_with("HTTP/1.1 200 OK\r\n"));
        assert!(response.contains("Content-Type: text/html"));
        assert!(response.contains("Authentication Successful!"));
        assert_eq!(rx.try_recv().unwrap(), CallbackResult::Code("abc".to_string()));
    }

    #[test]
    fn test_respond_first_writer_wins() {
        let (resolver, mut rx) = resolver();

        respond("/callback?code=first", None, &resolver);
        respond("/callback?code=second", None, &resolver);
        assert!(!resolver.resolve(CallbackResult::Code("third".to_string())));

        assert_eq!(rx.try_recv().unwrap(), CallbackResult::Code("first".to_string()));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_respond_error_is_escaped() {
        let (resolver, mut rx) = resolver();

        let response = respond(
            "/callback?error=access_denied&error_description=%3Cscript%3Ealert(1)%3C%2Fscript%3E",
            None,
            &resolver,
        );

        assert!(response.contains("&lt;script&gt;"));
        assert!(!response.contains("<script>"));
        assert_eq!(
            rx.try_recv().unwrap(),
            CallbackResult::Error("access_denied: <script>alert(1)</script>".to_string())
        );
    }

    #[test]
    fn test_respond_no_code() {
        let (resolver, mut rx) = resolver();

        let response = respond("/callback", None, &resolver);

        assert!(response.contains("No authorization code received."));
        assert_eq!(
            rx.try_recv().unwrap(),
            CallbackResult::Error(NO_CODE_MESSAGE.to_string())
        );
    }

    #[test]
    fn test_respond_ignores_other_paths_and_bad_state() {
        let (resolver, mut rx) = resolver();

        let not_found = respond("/favicon.ico", None, &resolver);
        assert!(not_found.starts_with("HTTP/1.1 404 Not Found"));

        let mismatch = respond("/callback?code=abc&state=forged", Some("expected"), &resolver);
        assert!(mismatch.starts_with("HTTP/1.1 400 Bad Request"));

        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn test_http_response_content_length() {
        let response = http_response("200 OK", "héllo");
        assert!(response.contains("Content-Length: 6\r\n"));
        assert!(response.ends_with("\r\n\r\nhéllo"));
    }
}
