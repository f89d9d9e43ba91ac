//! Interactive consent flows.
//!
//! Three strategies share the [`CredentialFlow`] contract and are tried in a
//! fixed order: browser, console, manual. An [`EnvironmentCapabilities`]
//! probe lets flows that cannot work here bow out before they bind ports or
//! wait on a terminal.

use std::future::Future;
use std::io::IsTerminal;
use std::pin::Pin;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{debug, info, warn};

use crate::error::{ProviderError, ProviderResult};

use super::config::GoogleConfig;
use super::oauth::{
    CALLBACK_TIMEOUT, CallbackParams, LoopbackListener, OAuthClient, PkceFlow,
    loopback_redirect_uri,
};
use super::tokens::TokenInfo;

/// A boxed future that is Send.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What the current process can use to reach the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnvironmentCapabilities {
    /// A browser can be opened on this machine.
    pub graphical_display: bool,
    /// Standard input is an interactive terminal.
    pub interactive_stdin: bool,
}

impl EnvironmentCapabilities {
    /// Probes the running process.
    pub fn probe() -> Self {
        Self {
            graphical_display: has_graphical_display(),
            interactive_stdin: std::io::stdin().is_terminal(),
        }
    }

    /// Nothing is available; every flow fails fast.
    pub fn headless() -> Self {
        Self {
            graphical_display: false,
            interactive_stdin: false,
        }
    }
}

#[cfg(any(target_os = "macos", target_os = "windows"))]
fn has_graphical_display() -> bool {
    true
}

#[cfg(not(any(target_os = "macos", target_os = "windows")))]
fn has_graphical_display() -> bool {
    ["DISPLAY", "WAYLAND_DISPLAY"]
        .iter()
        .any(|var| std::env::var_os(var).is_some_and(|v| !v.is_empty()))
}

/// A way to obtain a new credential from the operator.
pub trait CredentialFlow: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the flow can run given the probed capabilities.
    fn is_available(&self, capabilities: &EnvironmentCapabilities) -> bool;

    /// Runs the consent and returns the issued credential.
    fn obtain_credential<'a>(
        &'a self,
        oauth: &'a OAuthClient,
        config: &'a GoogleConfig,
    ) -> BoxFuture<'a, ProviderResult<TokenInfo>>;
}

/// The standard flow order.
pub fn default_flows() -> Vec<Box<dyn CredentialFlow>> {
    vec![
        Box::new(BrowserFlow),
        Box::new(ConsoleFlow),
        Box::new(ManualFlow),
    ]
}

/// Runs the flows in order until one yields a credential.
///
/// Unavailable flows are skipped; a failing flow hands over to the next.
pub async fn run_consent(
    flows: &[Box<dyn CredentialFlow>],
    capabilities: &EnvironmentCapabilities,
    oauth: &OAuthClient,
    config: &GoogleConfig,
) -> ProviderResult<TokenInfo> {
    let mut last_error = None;

    for flow in flows {
        if !flow.is_available(capabilities) {
            debug!(flow = flow.name(), "consent flow unavailable, skipping");
            continue;
        }

        info!(flow = flow.name(), "starting consent flow");
        match flow.obtain_credential(oauth, config).await {
            Ok(token) => return Ok(token),
            Err(e) => {
                warn!(flow = flow.name(), "consent flow failed: {}", e);
                last_error = Some(e);
            }
        }
    }

    let message = "no consent flow succeeded; run `calendar-feed auth` where a browser or terminal is available";
    Err(match last_error {
        Some(e) => ProviderError::interaction(message).with_source(e),
        None => ProviderError::interaction(message),
    })
}

/// Opens the system browser and receives the redirect on a loopback port.
#[derive(Debug, Default, Clone, Copy)]
pub struct BrowserFlow;

impl CredentialFlow for BrowserFlow {
    fn name(&self) -> &'static str {
        "browser"
    }

    fn is_available(&self, capabilities: &EnvironmentCapabilities) -> bool {
        capabilities.graphical_display
    }

    fn obtain_credential<'a>(
        &'a self,
        oauth: &'a OAuthClient,
        config: &'a GoogleConfig,
    ) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        Box::pin(async move {
            let pkce = PkceFlow::new();
            let listener = LoopbackListener::bind(config.loopback_port_range)?;
            let redirect_uri = listener.redirect_uri();
            let auth_url = pkce.authorization_url(
                &config.auth_url,
                oauth.client_id(),
                &redirect_uri,
                &config.scopes,
            );

            debug!("authorization URL: {}", auth_url);
            open::that(&auth_url).map_err(|e| {
                ProviderError::interaction(format!("failed to open browser: {}", e))
            })?;
            info!("waiting for consent in the browser");

            let params = listener.wait_for_callback(CALLBACK_TIMEOUT).await?;
            pkce.verify_state(params.state.as_deref())?;
            oauth
                .exchange_code(&params.code, &pkce.verifier, &redirect_uri, &config.scopes)
                .await
        })
    }
}

/// Prints the consent URL and receives the redirect on a loopback port.
///
/// For machines without a browser: the operator opens the URL elsewhere and
/// forwards the port (for example with `ssh -L`), or pastes the code or the
/// redirect address into the terminal. Whichever arrives first is used.
#[derive(Debug, Default, Clone, Copy)]
pub struct ConsoleFlow;

impl CredentialFlow for ConsoleFlow {
    fn name(&self) -> &'static str {
        "console"
    }

    fn is_available(&self, capabilities: &EnvironmentCapabilities) -> bool {
        capabilities.interactive_stdin
    }

    fn obtain_credential<'a>(
        &'a self,
        oauth: &'a OAuthClient,
        config: &'a GoogleConfig,
    ) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        Box::pin(async move {
            let pkce = PkceFlow::new();
            let listener = LoopbackListener::bind(config.loopback_port_range)?;
            let redirect_uri = listener.redirect_uri();
            let auth_url = pkce.authorization_url(
                &config.auth_url,
                oauth.client_id(),
                &redirect_uri,
                &config.scopes,
            );

            eprintln!(
                "\nOpen this URL in a browser that can reach port {} on this machine\n\
                (e.g. after `ssh -L {}:127.0.0.1:{} <this host>`):\n\n{}\n\n\
                Without a forwarded port the browser fails to load the 127.0.0.1\n\
                page; paste the authorization code or that page's address here:",
                listener.port(),
                listener.port(),
                listener.port(),
                auth_url
            );

            let stdin = BufReader::new(tokio::io::stdin());
            let params = await_authorization(listener, stdin, &pkce, CALLBACK_TIMEOUT).await?;
            oauth
                .exchange_code(&params.code, &pkce.verifier, &redirect_uri, &config.scopes)
                .await
        })
    }
}

/// Prints the consent URL and reads the code back from stdin.
///
/// No listener is bound. After consent the browser fails to load the
/// loopback redirect; the operator pastes the code or the whole address.
#[derive(Debug, Default, Clone, Copy)]
pub struct ManualFlow;

impl CredentialFlow for ManualFlow {
    fn name(&self) -> &'static str {
        "manual"
    }

    fn is_available(&self, capabilities: &EnvironmentCapabilities) -> bool {
        capabilities.interactive_stdin
    }

    fn obtain_credential<'a>(
        &'a self,
        oauth: &'a OAuthClient,
        config: &'a GoogleConfig,
    ) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
        Box::pin(async move {
            let pkce = PkceFlow::new();
            let redirect_uri = loopback_redirect_uri(config.loopback_port_range.0);
            let auth_url = pkce.authorization_url(
                &config.auth_url,
                oauth.client_id(),
                &redirect_uri,
                &config.scopes,
            );

            eprintln!(
                "\nOpen this URL in any browser and grant access:\n\n{}\n\n\
                The browser will then fail to load a 127.0.0.1 page. Paste the\n\
                authorization code or the full address of that page here:",
                auth_url
            );

            let input = read_line(CALLBACK_TIMEOUT).await?;
            let params = parse_manual_input(&input)?;
            verify_pasted_state(&pkce, &params)?;
            oauth
                .exchange_code(&params.code, &pkce.verifier, &redirect_uri, &config.scopes)
                .await
        })
    }
}

/// Waits for the loopback redirect or a line of pasted input.
///
/// Blank lines are skipped. Once `input` is closed only the listener is
/// awaited. `timeout` bounds the whole wait.
async fn await_authorization<R>(
    listener: LoopbackListener,
    input: R,
    pkce: &PkceFlow,
    timeout: Duration,
) -> ProviderResult<CallbackParams>
where
    R: AsyncBufRead + Unpin,
{
    let callback = listener.wait_for_callback(timeout);
    tokio::pin!(callback);
    let mut lines = input.lines();
    let mut input_open = true;

    loop {
        tokio::select! {
            result = &mut callback => {
                let params = result?;
                pkce.verify_state(params.state.as_deref())?;
                debug!("authorization code received on loopback");
                return Ok(params);
            }
            line = lines.next_line(), if input_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let params = parse_manual_input(&line)?;
                    verify_pasted_state(pkce, &params)?;
                    debug!("authorization code pasted");
                    return Ok(params);
                }
                Ok(None) => input_open = false,
                Err(e) => {
                    warn!("failed to read stdin: {}", e);
                    input_open = false;
                }
            },
        }
    }
}

/// A pasted bare code has no state; anything else must match.
fn verify_pasted_state(pkce: &PkceFlow, params: &CallbackParams) -> ProviderResult<()> {
    match params.state {
        Some(_) => pkce.verify_state(params.state.as_deref()),
        None => Ok(()),
    }
}

async fn read_line(timeout: Duration) -> ProviderResult<String> {
    let mut line = String::new();
    let mut stdin = BufReader::new(tokio::io::stdin());

    match tokio::time::timeout(timeout, stdin.read_line(&mut line)).await {
        Ok(Ok(0)) => Err(ProviderError::interaction("stdin closed before a code was entered")),
        Ok(Ok(_)) => Ok(line),
        Ok(Err(e)) => Err(ProviderError::interaction("failed to read stdin").with_source(e)),
        Err(_) => Err(ProviderError::interaction("timed out waiting for the authorization code")),
    }
}

/// Accepts a bare authorization code, a query string, or a redirect URL.
pub fn parse_manual_input(input: &str) -> ProviderResult<CallbackParams> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ProviderError::interaction("no authorization code entered"));
    }

    if let Ok(url) = url::Url::parse(input) {
        return CallbackParams::from_query(url.query().unwrap_or_default());
    }

    if let Some(query) = input.strip_prefix('?') {
        return CallbackParams::from_query(query);
    }
    if input.contains("code=") {
        return CallbackParams::from_query(input);
    }

    Ok(CallbackParams {
        code: input.to_string(),
        state: None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::google::OAuthCredentials;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct ScriptedFlow {
        name: &'static str,
        available: bool,
        succeed: bool,
        calls: Arc<AtomicUsize>,
    }

    impl CredentialFlow for ScriptedFlow {
        fn name(&self) -> &'static str {
            self.name
        }

        fn is_available(&self, _: &EnvironmentCapabilities) -> bool {
            self.available
        }

        fn obtain_credential<'a>(
            &'a self,
            _: &'a OAuthClient,
            _: &'a GoogleConfig,
        ) -> BoxFuture<'a, ProviderResult<TokenInfo>> {
            Box::pin(async move {
                self.calls.fetch_add(1, Ordering::SeqCst);
                if self.succeed {
                    Ok(TokenInfo::new(self.name, None, Some(3600), vec![]))
                } else {
                    Err(ProviderError::interaction("declined"))
                }
            })
        }
    }

    fn scripted(name: &'static str, available: bool, succeed: bool) -> (Box<dyn CredentialFlow>, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let flow = ScriptedFlow {
            name,
            available,
            succeed,
            calls: calls.clone(),
        };
        (Box::new(flow), calls)
    }

    fn config() -> GoogleConfig {
        GoogleConfig::new(OAuthCredentials::new(
            "test-client.apps.googleusercontent.com",
            "secret",
        ))
    }

    #[test]
    fn flow_availability_follows_capabilities() {
        let headless = EnvironmentCapabilities::headless();
        assert!(!BrowserFlow.is_available(&headless));
        assert!(!ConsoleFlow.is_available(&headless));
        assert!(!ManualFlow.is_available(&headless));

        let ssh = EnvironmentCapabilities {
            graphical_display: false,
            interactive_stdin: true,
        };
        assert!(!BrowserFlow.is_available(&ssh));
        assert!(ConsoleFlow.is_available(&ssh));
        assert!(ManualFlow.is_available(&ssh));
    }

    async fn send_redirect(port: u16, query: String) {
        use tokio::io::AsyncWriteExt;

        let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
            .await
            .unwrap();
        stream
            .write_all(format!("GET /callback?{} HTTP/1.1\r\n\r\n", query).as_bytes())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn pasted_code_is_used_before_the_redirect_arrives() {
        let pkce = PkceFlow::new();
        let listener = LoopbackListener::bind((0, 0)).unwrap();
        let input: &[u8] = b"\n  4/0Ab-pasted  \n";

        let params = tokio::time::timeout(
            Duration::from_secs(2),
            await_authorization(listener, input, &pkce, Duration::from_secs(300)),
        )
        .await
        .expect("pasted input should not wait for the listener")
        .unwrap();

        assert_eq!(params.code, "4/0Ab-pasted");
        assert_eq!(params.state, None);
    }

    #[tokio::test]
    async fn pasted_redirect_address_must_carry_our_state() {
        let pkce = PkceFlow::new();
        let listener = LoopbackListener::bind((0, 0)).unwrap();
        let good = format!(
            "http://127.0.0.1:8080/callback?code=abc&state={}\n",
            pkce.state
        );

        let params = await_authorization(listener, good.as_bytes(), &pkce, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(params.code, "abc");

        let listener = LoopbackListener::bind((0, 0)).unwrap();
        let forged: &[u8] = b"http://127.0.0.1:8080/callback?code=abc&state=forged\n";
        let err = await_authorization(listener, forged, &pkce, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
    }

    #[tokio::test]
    async fn closed_input_leaves_the_listener_waiting() {
        let pkce = PkceFlow::new();
        let listener = LoopbackListener::bind((0, 0)).unwrap();
        let port = listener.port();
        let query = format!("code=from-browser&state={}", pkce.state);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            send_redirect(port, query).await;
        });

        let params = await_authorization(listener, &b""[..], &pkce, Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(params.code, "from-browser");
    }

    #[tokio::test]
    async fn redirect_without_state_is_rejected() {
        let pkce = PkceFlow::new();
        let listener = LoopbackListener::bind((0, 0)).unwrap();
        let port = listener.port();
        tokio::spawn(send_redirect(port, "code=abc".to_string()));

        let err = await_authorization(listener, &b""[..], &pkce, Duration::from_secs(5))
            .await
            .unwrap_err();
        assert!(err.is_authentication());
    }

    #[test]
    fn default_order() {
        let names: Vec<&str> = default_flows().iter().map(|f| f.name()).collect();
        assert_eq!(names, vec!["browser", "console", "manual"]);
    }

    #[tokio::test]
    async fn chain_falls_through_to_next_flow() {
        let config = config();
        let oauth = OAuthClient::new(&config);
        let (browser, browser_calls) = scripted("browser", false, true);
        let (console, console_calls) = scripted("console", true, false);
        let (manual, manual_calls) = scripted("manual", true, true);

        let token = run_consent(
            &[browser, console, manual],
            &EnvironmentCapabilities::headless(),
            &oauth,
            &config,
        )
        .await
        .unwrap();

        assert_eq!(token.access_token, "manual");
        assert_eq!(browser_calls.load(Ordering::SeqCst), 0);
        assert_eq!(console_calls.load(Ordering::SeqCst), 1);
        assert_eq!(manual_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn chain_without_usable_flow_fails() {
        let config = config();
        let oauth = OAuthClient::new(&config);

        let err = run_consent(
            &default_flows(),
            &EnvironmentCapabilities::headless(),
            &oauth,
            &config,
        )
        .await
        .unwrap_err();
        assert_eq!(err.code(), crate::ProviderErrorCode::Interaction);
    }

    #[test]
    fn manual_input_forms() {
        let bare = parse_manual_input("  4/0AbCdEf \n").unwrap();
        assert_eq!(bare.code, "4/0AbCdEf");
        assert!(bare.state.is_none());

        let url = parse_manual_input(
            "http://127.0.0.1:8080/callback?state=s1&code=4%2F0Ab&scope=https://www.googleapis.com/auth/calendar.readonly",
        )
        .unwrap();
        assert_eq!(url.code, "4/0Ab");
        assert_eq!(url.state.as_deref(), Some("s1"));

        let query = parse_manual_input("?code=xyz&state=s2").unwrap();
        assert_eq!(query.code, "xyz");

        assert!(parse_manual_input("").is_err());
        assert!(parse_manual_input("http://127.0.0.1:8080/callback?error=access_denied").is_err());
    }
}
