//! Configuration types for bim-acquire

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Environment variable holding the OAuth2 client id
pub const CLIENT_ID_ENV: &str = "APS_CLIENT_ID";
/// Environment variable holding the OAuth2 client secret
pub const CLIENT_SECRET_ENV: &str = "APS_CLIENT_SECRET";

/// Main configuration for the acquisition pipeline
///
/// Fields are organized into one sub-config per pipeline component:
/// - [`credentials`](ClientCredentials) - OAuth2 client id/secret
/// - [`auth`](AuthConfig) - identity provider endpoints and scopes
/// - [`platform`](PlatformConfig) - document platform API origin
/// - [`resolver`](ResolverConfig) - which folder and file to look for
/// - [`conversion`](ConversionConfig) - output formats and manifest polling
/// - [`broker`](BrokerConfig) - backend proxy for signed downloads
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct Config {
    /// OAuth2 client credentials
    #[serde(default)]
    pub credentials: ClientCredentials,

    /// Identity provider settings
    #[serde(default)]
    pub auth: AuthConfig,

    /// Document platform settings
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Hierarchy resolution settings
    #[serde(default)]
    pub resolver: ResolverConfig,

    /// Translation job settings
    #[serde(default)]
    pub conversion: ConversionConfig,

    /// Download proxy settings
    #[serde(default)]
    pub broker: BrokerConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Event channel settings
    #[serde(default)]
    pub events: EventConfig,
}

impl Config {
    /// Load a JSON configuration file and validate it
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = tokio::fs::read_to_string(path).await.map_err(|e| {
            Error::Io(std::io::Error::new(
                e.kind(),
                format!("Failed to read config file '{}': {}", path.display(), e),
            ))
        })?;
        let config: Config = serde_json::from_str(&text)?;
        config.validate()?;
        Ok(config)
    }

    /// Check that every endpoint parses and every limit is usable
    ///
    /// Empty client credentials are accepted here; they are reported by the
    /// token exchange instead, which must not touch the network without them.
    pub fn validate(&self) -> Result<()> {
        parse_url(&self.auth.authorize_url, "auth.authorize_url")?;
        parse_url(&self.auth.token_url, "auth.token_url")?;
        parse_url(&self.auth.redirect_uri, "auth.redirect_uri")?;
        parse_url(&self.platform.base_url, "platform.base_url")?;
        parse_url(&self.broker.base_url, "broker.base_url")?;

        if self.auth.scopes.is_empty() {
            return Err(Error::config("at least one scope is required", "auth.scopes"));
        }
        if self.resolver.target_file_suffix.trim().is_empty() {
            return Err(Error::config(
                "target file suffix must not be empty",
                "resolver.target_file_suffix",
            ));
        }
        if self.conversion.output_formats.is_empty() {
            return Err(Error::config(
                "at least one output format is required",
                "conversion.output_formats",
            ));
        }
        if self.conversion.poll.max_attempts == 0 {
            return Err(Error::config(
                "max_attempts must be at least 1",
                "conversion.poll.max_attempts",
            ));
        }
        if self.events.capacity == 0 {
            return Err(Error::config(
                "event capacity must be at least 1",
                "events.capacity",
            ));
        }
        Ok(())
    }
}

/// OAuth2 client credentials
#[derive(Clone, Default, Serialize, Deserialize)]
pub struct ClientCredentials {
    /// Application client id
    #[serde(default)]
    pub client_id: String,

    /// Application client secret
    #[serde(default)]
    pub client_secret: String,
}

impl ClientCredentials {
    /// Create credentials from explicit values
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
        }
    }

    /// Read credentials from `APS_CLIENT_ID` and `APS_CLIENT_SECRET`
    ///
    /// Unset variables yield empty strings.
    pub fn from_env() -> Self {
        Self {
            client_id: std::env::var(CLIENT_ID_ENV).unwrap_or_default(),
            client_secret: std::env::var(CLIENT_SECRET_ENV).unwrap_or_default(),
        }
    }

    /// Whether both the id and the secret are non-blank
    pub fn is_complete(&self) -> bool {
        !self.client_id.trim().is_empty() && !self.client_secret.trim().is_empty()
    }
}

impl std::fmt::Debug for ClientCredentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientCredentials")
            .field("client_id", &self.client_id)
            .field("client_secret", &"<redacted>")
            .finish()
    }
}

/// Identity provider configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Authorization endpoint the user is sent to
    #[serde(default = "default_authorize_url")]
    pub authorize_url: String,

    /// Token endpoint for the code exchange
    #[serde(default = "default_token_url")]
    pub token_url: String,

    /// Where the provider redirects back to (the app origin)
    #[serde(default = "default_redirect_uri")]
    pub redirect_uri: String,

    /// Requested scopes (default: data:read, data:write)
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            authorize_url: default_authorize_url(),
            token_url: default_token_url(),
            redirect_uri: default_redirect_uri(),
            scopes: default_scopes(),
        }
    }
}

/// Document platform configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// API origin; hub listing, job and manifest paths are joined onto it
    #[serde(default = "default_platform_base_url")]
    pub base_url: String,
}

impl Default for PlatformConfig {
    fn default() -> Self {
        Self {
            base_url: default_platform_base_url(),
        }
    }
}

/// Hierarchy resolution configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ResolverConfig {
    /// Name filter applied to the project's root folder contents
    #[serde(default = "default_folder_name")]
    pub folder_name: String,

    /// The first file whose name ends with this is selected
    #[serde(default = "default_target_file_suffix")]
    pub target_file_suffix: String,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            folder_name: default_folder_name(),
            target_file_suffix: default_target_file_suffix(),
        }
    }
}

/// Translation job configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ConversionConfig {
    /// Requested output formats (default: ["ifc"])
    #[serde(default = "default_output_formats")]
    pub output_formats: Vec<String>,

    /// Manifest polling limits
    #[serde(default)]
    pub poll: PollConfig,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            output_formats: default_output_formats(),
            poll: PollConfig::default(),
        }
    }
}

/// Manifest polling configuration
///
/// The first poll happens immediately; each later one waits `interval`.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PollConfig {
    /// Delay between manifest fetches (default: 2 seconds)
    #[serde(default = "default_poll_interval", with = "duration_millis_serde")]
    pub interval: Duration,

    /// Maximum number of manifest fetches (default: 150)
    #[serde(default = "default_poll_max_attempts")]
    pub max_attempts: u32,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: default_poll_interval(),
            max_attempts: default_poll_max_attempts(),
        }
    }
}

/// Backend proxy configuration for signed downloads
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BrokerConfig {
    /// Origin (and prefix) of the trusted proxy functions
    #[serde(default = "default_broker_base_url")]
    pub base_url: String,

    /// Function that mints the signed cookies
    #[serde(default = "default_mint_path")]
    pub mint_path: String,

    /// Function that streams the artifact bytes
    #[serde(default = "default_download_path")]
    pub download_path: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: default_broker_base_url(),
            mint_path: default_mint_path(),
            download_path: default_download_path(),
        }
    }
}

/// HTTP client configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout (default: 30 seconds)
    #[serde(default = "default_request_timeout", with = "duration_serde")]
    pub request_timeout: Duration,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            request_timeout: default_request_timeout(),
        }
    }
}

/// Event channel configuration
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct EventConfig {
    /// Broadcast buffer size per subscriber (default: 64)
    #[serde(default = "default_event_capacity")]
    pub capacity: usize,
}

impl Default for EventConfig {
    fn default() -> Self {
        Self {
            capacity: default_event_capacity(),
        }
    }
}

/// Join a relative API path onto a configured base URL
///
/// The base is treated as a directory even without a trailing slash, so
/// `http://host/.netlify` + `functions/getFile` keeps the `.netlify` prefix.
pub(crate) fn endpoint(base: &str, path: &str) -> Result<Url> {
    let mut base = base.trim().to_string();
    if !base.ends_with('/') {
        base.push('/');
    }
    let base = Url::parse(&base).map_err(|e| Error::Other(format!("invalid base URL {base:?}: {e}")))?;
    base.join(path.trim_start_matches('/'))
        .map_err(|e| Error::Other(format!("invalid API path {path:?}: {e}")))
}

fn parse_url(value: &str, key: &str) -> Result<Url> {
    if value.trim().is_empty() {
        return Err(Error::config("URL must not be empty", key));
    }
    Url::parse(value).map_err(|e| Error::config(format!("invalid URL {value:?}: {e}"), key))
}

fn default_authorize_url() -> String {
    "https://developer.api.autodesk.com/authentication/v2/authorize".to_string()
}

fn default_token_url() -> String {
    "https://developer.api.autodesk.com/authentication/v2/token".to_string()
}

fn default_redirect_uri() -> String {
    "http://localhost:8080".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["data:read".to_string(), "data:write".to_string()]
}

fn default_platform_base_url() -> String {
    "https://developer.api.autodesk.com".to_string()
}

fn default_folder_name() -> String {
    "Project Files".to_string()
}

fn default_target_file_suffix() -> String {
    ".rvt".to_string()
}

fn default_output_formats() -> Vec<String> {
    vec!["ifc".to_string()]
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(2)
}

fn default_poll_max_attempts() -> u32 {
    150
}

fn default_broker_base_url() -> String {
    "http://localhost:8888/.netlify".to_string()
}

fn default_mint_path() -> String {
    "functions/getFile".to_string()
}

fn default_download_path() -> String {
    "functions/getFileData".to_string()
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_event_capacity() -> usize {
    64
}

// Duration serialization helper
mod duration_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_secs())
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let secs = u64::deserialize(deserializer)?;
        Ok(Duration::from_secs(secs))
    }
}

// Millisecond variant for sub-second poll intervals
mod duration_millis_serde {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(u64::try_from(duration.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}
