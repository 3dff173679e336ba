//! OAuth2 installed-app flow for Google Drive
//!
//! Implements the Authorization Code flow with PKCE (RFC 7636) for a desktop
//! client registered in the Google Cloud console.
//!
//! ## Components
//!
//! - [`ClientSecrets`] - The downloaded `client_secret_*.json` file
//! - [`Tokens`] - Access/refresh token pair with expiry
//! - [`TokenStore`] - Token persistence in a JSON file or the system keyring
//! - [`PKCEFlow`] - OAuth2 PKCE challenge/exchange/refresh logic
//! - [`LocalCallbackServer`] - Loopback HTTP server for the OAuth redirect
//! - [`GoogleAuthenticator`] - Reuses, refreshes or obtains tokens

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use chrono::{DateTime, Duration, Utc};
use gpgwatch_core::config::{GoogleDriveConfig, TokenStorage};
use oauth2::{
    basic::BasicClient, AuthUrl, AuthorizationCode, ClientId, ClientSecret, CsrfToken,
    EndpointNotSet, EndpointSet, PkceCodeChallenge, PkceCodeVerifier, RedirectUrl, RefreshToken,
    Scope, TokenResponse, TokenUrl,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

/// Google OAuth2 authorization endpoint
pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/auth";

/// Google OAuth2 token endpoint
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Access limited to files created by this application
pub const DRIVE_FILE_SCOPE: &str = "https://www.googleapis.com/auth/drive.file";

/// Access tokens expiring within this many seconds are refreshed before use
pub const REFRESH_MARGIN_SECS: i64 = 60;

/// Keyring service name for storing tokens
const KEYRING_SERVICE: &str = "gpgwatch";

// ============================================================================
// ClientSecrets
// ============================================================================

#[derive(Debug, Deserialize)]
struct ClientSecretsFile {
    installed: Option<ClientSecrets>,
    web: Option<ClientSecrets>,
}

/// OAuth client registration downloaded from the Google Cloud console
#[derive(Debug, Clone, Deserialize)]
pub struct ClientSecrets {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
    #[serde(default = "default_auth_uri")]
    pub auth_uri: String,
    #[serde(default = "default_token_uri")]
    pub token_uri: String,
}

fn default_auth_uri() -> String {
    GOOGLE_AUTH_URL.to_string()
}

fn default_token_uri() -> String {
    GOOGLE_TOKEN_URL.to_string()
}

impl ClientSecrets {
    /// Parses `{"installed": {...}}` (or `{"web": {...}}`) JSON
    pub fn from_json(json: &str) -> Result<Self> {
        let file: ClientSecretsFile =
            serde_json::from_str(json).context("Failed to parse client secrets JSON")?;
        file.installed
            .or(file.web)
            .context("Client secrets JSON has neither an \"installed\" nor a \"web\" section")
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path).with_context(|| {
            format!("Google Drive credentials file not found: {}", path.display())
        })?;
        Self::from_json(&json)
    }
}

// ============================================================================
// Tokens
// ============================================================================

/// OAuth tokens received from Google
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tokens {
    /// Bearer token for authenticating API requests
    pub access_token: String,
    /// Token for refreshing the access token without user interaction
    pub refresh_token: Option<String>,
    /// When the access token expires
    pub expires_at: DateTime<Utc>,
}

impl Tokens {
    /// Returns true if the access token has expired
    pub fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }

    /// Returns true if the access token will expire within the given duration
    pub fn expires_within(&self, duration: Duration) -> bool {
        Utc::now() + duration >= self.expires_at
    }
}

fn tokens_from_response<R: TokenResponse>(response: &R, previous_refresh: Option<&str>) -> Tokens {
    let expires_at = response
        .expires_in()
        .map(|d| Utc::now() + Duration::seconds(d.as_secs() as i64))
        .unwrap_or_else(|| Utc::now() + Duration::hours(1));

    Tokens {
        access_token: response.access_token().secret().to_string(),
        refresh_token: response
            .refresh_token()
            .map(|t| t.secret().to_string())
            .or_else(|| previous_refresh.map(str::to_string)),
        expires_at,
    }
}

// ============================================================================
// TokenStore
// ============================================================================

/// Where Google tokens are persisted between runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenStore {
    /// JSON file, created with owner-only permissions on Unix
    File(PathBuf),
    /// System keyring entry under service `gpgwatch`
    Keyring { account: String },
}

impl TokenStore {
    pub fn from_config(config: &GoogleDriveConfig) -> Self {
        match config.token_storage {
            TokenStorage::File => TokenStore::File(config.token_path()),
            TokenStorage::Keyring => TokenStore::Keyring {
                account: "google_drive".to_string(),
            },
        }
    }

    /// Loads stored tokens; `None` when nothing was stored yet
    pub fn load(&self) -> Result<Option<Tokens>> {
        match self {
            TokenStore::File(path) => {
                if !path.exists() {
                    debug!(path = %path.display(), "No stored Google Drive token");
                    return Ok(None);
                }
                let json = std::fs::read_to_string(path)
                    .with_context(|| format!("Failed to read token file {}", path.display()))?;
                let tokens = serde_json::from_str(&json)
                    .with_context(|| format!("Failed to parse token file {}", path.display()))?;
                info!(path = %path.display(), "Loaded existing Google Drive token");
                Ok(Some(tokens))
            }
            TokenStore::Keyring { account } => {
                let entry = keyring::Entry::new(KEYRING_SERVICE, account)
                    .context("Failed to create keyring entry")?;
                match entry.get_password() {
                    Ok(json) => {
                        let tokens = serde_json::from_str(&json)
                            .context("Failed to deserialize tokens from keyring")?;
                        debug!(account, "Loaded tokens from keyring");
                        Ok(Some(tokens))
                    }
                    Err(keyring::Error::NoEntry) => {
                        debug!(account, "No tokens found in keyring");
                        Ok(None)
                    }
                    Err(e) => Err(anyhow::Error::new(e).context("Failed to read from keyring")),
                }
            }
        }
    }

    pub fn store(&self, tokens: &Tokens) -> Result<()> {
        let json = serde_json::to_string_pretty(tokens).context("Failed to serialize tokens")?;
        match self {
            TokenStore::File(path) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent).with_context(|| {
                        format!("Failed to create token directory {}", parent.display())
                    })?;
                }
                std::fs::write(path, json)
                    .with_context(|| format!("Failed to write token file {}", path.display()))?;
                #[cfg(unix)]
                {
                    use std::os::unix::fs::PermissionsExt;
                    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
                }
                info!(path = %path.display(), "Saved Google Drive token");
                Ok(())
            }
            TokenStore::Keyring { account } => {
                let entry = keyring::Entry::new(KEYRING_SERVICE, account)
                    .context("Failed to create keyring entry")?;
                entry
                    .set_password(&json)
                    .context("Failed to store tokens in keyring")?;
                debug!(account, "Stored tokens in keyring");
                Ok(())
            }
        }
    }

    pub fn clear(&self) -> Result<()> {
        match self {
            TokenStore::File(path) => match std::fs::remove_file(path) {
                Ok(()) => Ok(()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(anyhow::Error::new(e).context("Failed to remove token file")),
            },
            TokenStore::Keyring { account } => {
                let entry = keyring::Entry::new(KEYRING_SERVICE, account)
                    .context("Failed to create keyring entry")?;
                match entry.delete_credential() {
                    Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
                    Err(e) => Err(anyhow::Error::new(e).context("Failed to delete from keyring")),
                }
            }
        }
    }
}

// ============================================================================
// PKCEFlow
// ============================================================================

/// OAuth2 PKCE flow implementation using the `oauth2` crate
pub struct PKCEFlow {
    client: BasicClient<EndpointSet, EndpointNotSet, EndpointNotSet, EndpointNotSet, EndpointSet>,
    scopes: Vec<String>,
}

impl PKCEFlow {
    pub fn new(secrets: &ClientSecrets) -> Result<Self> {
        let mut client = BasicClient::new(ClientId::new(secrets.client_id.clone()))
            .set_auth_uri(AuthUrl::new(secrets.auth_uri.clone()).context("Invalid authorization URL")?)
            .set_token_uri(TokenUrl::new(secrets.token_uri.clone()).context("Invalid token URL")?);
        if let Some(secret) = &secrets.client_secret {
            client = client.set_client_secret(ClientSecret::new(secret.clone()));
        }

        Ok(Self {
            client,
            scopes: vec![DRIVE_FILE_SCOPE.to_string()],
        })
    }

    /// Sets the loopback redirect URI used by the authorization request
    pub fn with_redirect_uri(mut self, uri: &str) -> Result<Self> {
        self.client = self
            .client
            .set_redirect_uri(RedirectUrl::new(uri.to_string()).context("Invalid redirect URI")?);
        Ok(self)
    }

    /// Generates an authorization URL with a PKCE challenge
    ///
    /// Requests offline access so Google returns a refresh token.
    pub fn generate_auth_url(&self) -> (String, CsrfToken, PkceCodeVerifier) {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self.client.authorize_url(CsrfToken::new_random);
        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (auth_url, csrf_token) = auth_request
            .add_extra_param("access_type", "offline")
            .add_extra_param("prompt", "consent")
            .set_pkce_challenge(pkce_challenge)
            .url();

        debug!("Generated authorization URL");
        (auth_url.to_string(), csrf_token, pkce_verifier)
    }

    /// Exchanges an authorization code for OAuth tokens
    pub async fn exchange_code(&self, code: String, pkce_verifier: PkceCodeVerifier) -> Result<Tokens> {
        info!("Exchanging authorization code for tokens");

        let http_client = reqwest::Client::new();
        let token_result = self
            .client
            .exchange_code(AuthorizationCode::new(code))
            .set_pkce_verifier(pkce_verifier)
            .request_async(&http_client)
            .await
            .context("Failed to exchange authorization code")?;

        Ok(tokens_from_response(&token_result, None))
    }

    /// Refreshes an expired access token, keeping the old refresh token if
    /// Google does not rotate it
    pub async fn refresh_token(&self, refresh_token: &str) -> Result<Tokens> {
        info!("Refreshing Google Drive access token");

        let http_client = reqwest::Client::new();
        let token_result = self
            .client
            .exchange_refresh_token(&RefreshToken::new(refresh_token.to_string()))
            .request_async(&http_client)
            .await
            .context("Failed to refresh token")?;

        Ok(tokens_from_response(&token_result, Some(refresh_token)))
    }
}

// ============================================================================
// LocalCallbackServer
// ============================================================================

/// Loopback HTTP server receiving the OAuth2 redirect
///
/// Binds an ephemeral port on `127.0.0.1`; the redirect URI is only known
/// after binding.
pub struct LocalCallbackServer {
    listener: tokio::net::TcpListener,
    port: u16,
}

/// Parameters extracted from the OAuth2 callback
#[derive(Debug)]
pub struct CallbackParams {
    /// The authorization code
    pub code: String,
    /// The CSRF state parameter
    pub state: String,
}

impl LocalCallbackServer {
    pub async fn bind() -> Result<Self> {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .context("Failed to bind OAuth callback server")?;
        let port = listener.local_addr()?.port();
        info!(port, "OAuth callback server listening");
        Ok(Self { listener, port })
    }

    pub fn redirect_uri(&self) -> String {
        format!("http://127.0.0.1:{}/", self.port)
    }

    /// Serves connections until one carries the authorization code
    pub async fn wait(self) -> Result<CallbackParams> {
        use http_body_util::Full;
        use hyper::body::Bytes;
        use hyper::server::conn::http1;
        use hyper::service::service_fn;
        use hyper::{header, Request, Response, StatusCode};
        use hyper_util::rt::TokioIo;
        use tokio::sync::{oneshot, Mutex};

        let (tx, mut rx) = oneshot::channel::<CallbackParams>();
        let tx = Arc::new(Mutex::new(Some(tx)));

        loop {
            tokio::select! {
                params = &mut rx => {
                    let params = params.context("Callback server closed without receiving parameters")?;
                    info!("Received OAuth callback with authorization code");
                    return Ok(params);
                }
                accepted = self.listener.accept() => {
                    let (stream, _addr) = accepted.context("Failed to accept callback connection")?;
                    let tx = tx.clone();
                    let service = service_fn(move |req: Request<hyper::body::Incoming>| {
                        let tx = tx.clone();
                        async move {
                            let uri = req.uri().to_string();
                            debug!(uri, "Callback server received request");

                            let (status, html) = match parse_callback_params(&uri) {
                                Some(params) => {
                                    if let Some(sender) = tx.lock().await.take() {
                                        let _ = sender.send(params);
                                    }
                                    (StatusCode::OK, success_html())
                                }
                                None => (
                                    StatusCode::BAD_REQUEST,
                                    error_html("Missing authorization code in callback"),
                                ),
                            };

                            let mut response = Response::new(Full::new(Bytes::from(html)));
                            *response.status_mut() = status;
                            response.headers_mut().insert(
                                header::CONTENT_TYPE,
                                header::HeaderValue::from_static("text/html; charset=utf-8"),
                            );
                            Ok::<_, hyper::Error>(response)
                        }
                    });

                    tokio::spawn(async move {
                        if let Err(e) = http1::Builder::new()
                            .serve_connection(TokioIo::new(stream), service)
                            .await
                        {
                            warn!("Callback server connection error: {}", e);
                        }
                    });
                }
            }
        }
    }
}

/// Parses the authorization code and state from a callback URI
fn parse_callback_params(uri: &str) -> Option<CallbackParams> {
    let url = url::Url::parse(&format!("http://localhost{}", uri)).ok()?;
    let mut code = None;
    let mut state = None;

    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.to_string()),
            "state" => state = Some(value.to_string()),
            _ => {}
        }
    }

    Some(CallbackParams {
        code: code?,
        state: state.unwrap_or_default(),
    })
}

fn success_html() -> String {
    r#"<!DOCTYPE html>
<html>
<head><title>gpgwatch - Authentication Successful</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Successful</h1>
    <p>gpgwatch can now upload encrypted files to Google Drive.</p>
    <p>You can close this window.</p>
</body>
</html>"#
        .to_string()
}

fn error_html(message: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html>
<head><title>gpgwatch - Authentication Error</title></head>
<body style="font-family: sans-serif; text-align: center; padding-top: 50px;">
    <h1>Authentication Error</h1>
    <p>{}</p>
    <p>Please close this window and try again.</p>
</body>
</html>"#,
        message
    )
}

// ============================================================================
// GoogleAuthenticator
// ============================================================================

/// Obtains a valid access token, prompting the user only when needed
///
/// 1. Stored token still valid: reuse it
/// 2. Stored token expired with a refresh token: refresh and store
/// 3. Otherwise: run the interactive browser flow and store the result
pub struct GoogleAuthenticator {
    secrets: ClientSecrets,
    store: TokenStore,
}

impl GoogleAuthenticator {
    pub fn new(secrets: ClientSecrets, store: TokenStore) -> Self {
        Self { secrets, store }
    }

    pub fn store(&self) -> &TokenStore {
        &self.store
    }

    pub async fn tokens(&self) -> Result<Tokens> {
        if let Some(tokens) = self.store.load()? {
            if !tokens.expires_within(Duration::seconds(REFRESH_MARGIN_SECS)) {
                return Ok(tokens);
            }
            if tokens.refresh_token.is_some() {
                match self.refresh(&tokens).await {
                    Ok(fresh) => return Ok(fresh),
                    Err(e) => warn!(error = %e, "Token refresh failed, starting a new login"),
                }
            }
        }

        let tokens = self.login().await?;
        self.store.store(&tokens)?;
        Ok(tokens)
    }

    /// Renews `current` with its refresh token and stores the result
    ///
    /// Never opens a browser, so it is safe to call while watching.
    pub async fn refresh(&self, current: &Tokens) -> Result<Tokens> {
        let refresh = current
            .refresh_token
            .as_deref()
            .context("No refresh token stored; restart gpgwatch to log in again")?;
        let fresh = PKCEFlow::new(&self.secrets)?.refresh_token(refresh).await?;
        self.store.store(&fresh)?;
        Ok(fresh)
    }

    /// Runs the interactive OAuth2 PKCE flow in the user's browser
    pub async fn login(&self) -> Result<Tokens> {
        info!("Starting Google Drive OAuth flow");

        let server = LocalCallbackServer::bind().await?;
        let flow = PKCEFlow::new(&self.secrets)?.with_redirect_uri(&server.redirect_uri())?;
        let (auth_url, csrf_token, pkce_verifier) = flow.generate_auth_url();

        if let Err(e) = webbrowser::open(&auth_url) {
            warn!(error = %e, "Could not open a browser");
        }
        info!(url = %auth_url, "Complete authentication in your browser");

        let callback = server.wait().await?;
        if callback.state != *csrf_token.secret() {
            anyhow::bail!("OAuth callback state mismatch; possible CSRF attempt");
        }

        let tokens = flow.exchange_code(callback.code, pkce_verifier).await?;
        info!("Google Drive OAuth flow completed");
        Ok(tokens)
    }
}
