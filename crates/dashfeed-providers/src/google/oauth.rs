//! OAuth 2.0 authorization code flow with PKCE for Google APIs.
//!
//! The pieces here are used by the consent flows in [`super::flow`]:
//!
//! 1. [`PkceFlow`] generates the verifier, challenge and CSRF state and
//!    builds the consent URL.
//! 2. [`LoopbackListener`] receives Google's redirect on `127.0.0.1`.
//! 3. [`OAuthClient`] exchanges the code for tokens and refreshes them later.

use std::net::TcpListener;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::Rng as _;
use serde::Deserialize;
use sha2::{Digest, Sha256};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

use super::config::{GoogleConfig, OAuthCredentials};
use super::tokens::TokenInfo;

/// The PKCE code verifier length (in bytes, before base64 encoding).
const CODE_VERIFIER_LENGTH: usize = 32;

/// How long the loopback listener waits for Google's redirect.
pub const CALLBACK_TIMEOUT: Duration = Duration::from_secs(300);

/// Path the loopback redirect URI points at.
const CALLBACK_PATH: &str = "/callback";

/// Pause after a failed accept.
const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Token endpoint client.
#[derive(Debug)]
pub struct OAuthClient {
    credentials: OAuthCredentials,
    token_url: String,
    http_client: reqwest::Client,
}

impl OAuthClient {
    /// Creates a token endpoint client from the Google configuration.
    pub fn new(config: &GoogleConfig) -> Self {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout)
            .user_agent(&config.user_agent)
            .build()
            .expect("failed to create HTTP client");

        Self {
            credentials: config.credentials.clone(),
            token_url: config.token_url.clone(),
            http_client,
        }
    }

    /// Returns the OAuth client ID.
    pub fn client_id(&self) -> &str {
        &self.credentials.client_id
    }

    /// Trades a refresh token for a new access token.
    pub async fn refresh_token(&self, refresh_token: &str) -> ProviderResult<TokenResponse> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("refresh_token", refresh_token),
            ("grant_type", "refresh_token"),
        ];

        let response = self.post_token_request(&params, "token refresh").await?;
        info!("refreshed access token");
        Ok(response)
    }

    /// Exchanges an authorization code for a token set.
    pub async fn exchange_code(
        &self,
        code: &str,
        verifier: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> ProviderResult<TokenInfo> {
        let params = [
            ("client_id", self.credentials.client_id.as_str()),
            ("client_secret", self.credentials.client_secret.as_str()),
            ("code", code),
            ("code_verifier", verifier),
            ("grant_type", "authorization_code"),
            ("redirect_uri", redirect_uri),
        ];

        let response = self.post_token_request(&params, "token exchange").await?;
        info!("obtained tokens from authorization code");
        Ok(TokenInfo::new(
            response.access_token,
            response.refresh_token,
            response.expires_in,
            scopes.to_vec(),
        ))
    }

    async fn post_token_request(
        &self,
        params: &[(&str, &str)],
        what: &str,
    ) -> ProviderResult<TokenResponse> {
        let response = self
            .http_client
            .post(&self.token_url)
            .form(params)
            .send()
            .await
            .map_err(ProviderError::from_request)?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| ProviderError::network(format!("failed to read response: {}", e)))?;

        if !status.is_success() {
            return Err(ProviderError::authentication(format!(
                "{} failed ({}): {}",
                what, status, body
            )));
        }

        serde_json::from_str(&body).map_err(|e| {
            ProviderError::invalid_response(format!("invalid token response: {}", e))
        })
    }
}

/// Response from Google's token endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<i64>,
}

/// PKCE state for one consent attempt (RFC 7636).
#[derive(Debug)]
pub struct PkceFlow {
    /// The code verifier (high-entropy random string).
    pub verifier: String,
    /// The code challenge (SHA-256 of the verifier, base64url encoded).
    pub challenge: String,
    /// Random state echoed back by Google.
    pub state: String,
}

impl PkceFlow {
    /// Creates a new PKCE flow with random verifier and state.
    pub fn new() -> Self {
        let verifier = random_urlsafe(CODE_VERIFIER_LENGTH);
        let challenge = Self::compute_challenge(&verifier);
        let state = random_urlsafe(16);

        Self {
            verifier,
            challenge,
            state,
        }
    }

    fn compute_challenge(verifier: &str) -> String {
        let digest = Sha256::digest(verifier.as_bytes());
        URL_SAFE_NO_PAD.encode(digest)
    }

    /// Builds the consent URL.
    ///
    /// `access_type=offline` and `prompt=consent` make Google issue a refresh
    /// token every time.
    pub fn authorization_url(
        &self,
        auth_url: &str,
        client_id: &str,
        redirect_uri: &str,
        scopes: &[String],
    ) -> String {
        let scope = scopes.join(" ");

        format!(
            "{}?client_id={}&redirect_uri={}&response_type=code&scope={}&\
            code_challenge={}&code_challenge_method=S256&state={}&\
            access_type=offline&prompt=consent",
            auth_url,
            urlencoding::encode(client_id),
            urlencoding::encode(redirect_uri),
            urlencoding::encode(&scope),
            urlencoding::encode(&self.challenge),
            urlencoding::encode(&self.state),
        )
    }

    /// Checks the state echoed back by Google.
    pub fn verify_state(&self, received: Option<&str>) -> ProviderResult<()> {
        match received {
            Some(state) if state == self.state => Ok(()),
            Some(_) => Err(ProviderError::authentication(
                "OAuth state mismatch, discarding authorization code",
            )),
            None => Err(ProviderError::authentication(
                "OAuth redirect carried no state, discarding authorization code",
            )),
        }
    }
}

impl Default for PkceFlow {
    fn default() -> Self {
        Self::new()
    }
}

fn random_urlsafe(len: usize) -> String {
    let mut rng = rand::rng();
    let bytes: Vec<u8> = (0..len).map(|_| rng.random()).collect();
    URL_SAFE_NO_PAD.encode(&bytes)
}

/// Returns the loopback redirect URI for `port`.
pub fn loopback_redirect_uri(port: u16) -> String {
    format!("http://127.0.0.1:{}{}", port, CALLBACK_PATH)
}

/// The authorization result carried by a redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallbackParams {
    pub code: String,
    pub state: Option<String>,
}

impl CallbackParams {
    /// Extracts `code`/`state`/`error` from a redirect query string.
    pub fn from_query(query: &str) -> ProviderResult<Self> {
        let mut code = None;
        let mut state = None;
        let mut error = None;

        for (key, value) in url::form_urlencoded::parse(query.as_bytes()) {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Err(ProviderError::authentication(format!(
                "authorization denied: {}",
                error
            )));
        }

        match code {
            Some(code) if !code.is_empty() => Ok(Self { code, state }),
            _ => Err(ProviderError::authentication(
                "missing authorization code in redirect",
            )),
        }
    }
}

/// A bound loopback listener waiting for Google's redirect.
#[derive(Debug)]
pub struct LoopbackListener {
    listener: TcpListener,
    port: u16,
}

impl LoopbackListener {
    /// Binds the first free port in the inclusive range.
    pub fn bind(port_range: (u16, u16)) -> ProviderResult<Self> {
        for port in port_range.0..=port_range.1 {
            if let Ok(listener) = TcpListener::bind(("127.0.0.1", port)) {
                let port = listener.local_addr().map(|a| a.port()).unwrap_or(port);
                debug!("bound loopback listener on port {}", port);
                return Ok(Self { listener, port });
            }
        }
        Err(ProviderError::configuration(format!(
            "no available port in range {}-{}",
            port_range.0, port_range.1
        )))
    }

    /// The port the listener is bound to.
    pub fn port(&self) -> u16 {
        self.port
    }

    /// The redirect URI to register in the consent URL.
    pub fn redirect_uri(&self) -> String {
        loopback_redirect_uri(self.port)
    }

    /// Waits for the redirect and returns its parameters.
    ///
    /// Requests for other paths (such as a browser's favicon request) get a
    /// 404 and the wait continues. The socket is closed when this returns.
    pub async fn wait_for_callback(self, timeout: Duration) -> ProviderResult<CallbackParams> {
        self.listener.set_nonblocking(true).map_err(|e| {
            ProviderError::internal("failed to configure loopback listener").with_source(e)
        })?;
        let listener = tokio::net::TcpListener::from_std(self.listener).map_err(|e| {
            ProviderError::internal("failed to register loopback listener").with_source(e)
        })?;

        match tokio::time::timeout(timeout, accept_callback(&listener)).await {
            Ok(result) => result,
            Err(_) => Err(ProviderError::interaction(format!(
                "no OAuth redirect received within {} seconds",
                timeout.as_secs()
            ))),
        }
    }
}

async fn accept_callback(listener: &tokio::net::TcpListener) -> ProviderResult<CallbackParams> {
    loop {
        match listener.accept().await {
            Ok((stream, _)) => {
                if let Some(result) = handle_callback(stream).await {
                    return result;
                }
            }
            Err(e) => {
                warn!("failed to accept connection: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
        }
    }
}

/// Serves one request on the loopback listener.
///
/// Returns `None` for requests that are not the OAuth redirect.
async fn handle_callback(mut stream: TcpStream) -> Option<ProviderResult<CallbackParams>> {
    let (read_half, mut write_half) = stream.split();
    let mut reader = BufReader::new(read_half);
    let mut request_line = String::new();
    reader.read_line(&mut request_line).await.ok()?;

    // GET /callback?code=...&state=... HTTP/1.1
    let mut parts = request_line.split_whitespace();
    if parts.next() != Some("GET") {
        return None;
    }
    let target = parts.next()?;
    let (path, query) = target.split_once('?').unwrap_or((target, ""));
    if path != CALLBACK_PATH {
        let _ = write_half
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\n\r\n")
            .await;
        return None;
    }

    let result = CallbackParams::from_query(query);
    let response = if result.is_ok() {
        "HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Authorization Successful</h1>\
        <p>You can close this window and return to the terminal.</p></body></html>"
    } else {
        "HTTP/1.1 400 Bad Request\r\nContent-Type: text/html\r\n\r\n\
        <html><body><h1>Authorization Failed</h1>\
        <p>You can close this window.</p></body></html>"
    };
    let _ = write_half.write_all(response.as_bytes()).await;
    let _ = write_half.flush().await;

    Some(result)
}
