//! Core types for bim-acquire

use chrono::{DateTime, Utc};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;
use std::sync::Arc;
use url::Url;

/// Bearer credential for platform API calls, with its provenance
///
/// Lives only for the duration of one pipeline run. The value is never
/// printed in full by `Debug` or `Display`.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    value: String,
    /// Token type reported by the provider (normally "Bearer")
    pub token_type: Option<String>,
    /// Lifetime in seconds reported by the provider
    pub expires_in: Option<u64>,
    /// When the token was received
    pub obtained_at: DateTime<Utc>,
}

impl AccessToken {
    /// Wrap a raw token value received just now
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            token_type: None,
            expires_in: None,
            obtained_at: Utc::now(),
        }
    }

    /// The raw token, for use in an `Authorization` header
    pub fn secret(&self) -> &str {
        &self.value
    }
}

impl std::fmt::Display for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let prefix: String = self.value.chars().take(4).collect();
        write!(f, "{}…(len={})", prefix, self.value.len())
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("value", &format_args!("{self}"))
            .field("token_type", &self.token_type)
            .field("expires_in", &self.expires_in)
            .field("obtained_at", &self.obtained_at)
            .finish()
    }
}

/// One-time code returned by the identity provider after user consent
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AuthorizationCode {
    code: String,
    /// The redirect URL the code was read from
    pub origin: Option<Url>,
}

impl AuthorizationCode {
    /// Create a code that was not read from a redirect (tests, manual entry)
    pub fn new(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            origin: None,
        }
    }

    /// Create a code read from the given redirect-back URL
    pub fn from_redirect(code: impl Into<String>, origin: Url) -> Self {
        Self {
            code: code.into(),
            origin: Some(origin),
        }
    }

    /// The code value
    pub fn as_str(&self) -> &str {
        &self.code
    }
}

macro_rules! link_ref {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq)]
        pub struct $name(pub Url);

        impl $name {
            /// The hyperlink to fetch next
            pub fn url(&self) -> &Url {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.0)
            }
        }
    };
}

link_ref!(
    /// Link to the projects of the first hub
    HubRef
);
link_ref!(
    /// Link to the root-folder contents of the first project
    ProjectRef
);
link_ref!(
    /// Link to the contents of the project-files folder
    FolderRef
);

macro_rules! opaque_id {
    ($(#[$doc:meta])* $name:ident) => {
        $(#[$doc])*
        #[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            /// Get the inner string
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                f.write_str(&self.0)
            }
        }
    };
}

opaque_id!(
    /// Storage identifier of the located source file
    FileIdentifier
);
opaque_id!(
    /// URN of a submitted translation job
    JobUrn
);
opaque_id!(
    /// URN of a translation job's output derivative
    DerivativeUrn
);

/// Identifier for one pipeline run, unique per pipeline instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunId(pub u64);

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Level of the hub/project/folder/file hierarchy
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolveStage {
    /// Account hub listing
    Hub,
    /// Projects of a hub
    Project,
    /// Root folder contents filtered by name
    Folder,
    /// Folder contents searched for the target file
    File,
}

impl std::fmt::Display for ResolveStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ResolveStage::Hub => "hub",
            ResolveStage::Project => "project",
            ResolveStage::Folder => "folder",
            ResolveStage::File => "file",
        };
        f.write_str(s)
    }
}

/// Pipeline stage, in execution order
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    /// Authorization code exchange
    Authorize,
    /// First hub lookup
    ResolveHub,
    /// First project lookup
    ResolveProject,
    /// Project-files folder lookup
    ResolveFolder,
    /// Target file lookup
    ResolveFile,
    /// Translation job submission
    SubmitJob,
    /// Manifest polling
    AwaitManifest,
    /// Signed credential minting
    MintCredential,
    /// Artifact byte download
    Download,
    /// Model decoding
    Decode,
}

impl From<ResolveStage> for Stage {
    fn from(stage: ResolveStage) -> Self {
        match stage {
            ResolveStage::Hub => Stage::ResolveHub,
            ResolveStage::Project => Stage::ResolveProject,
            ResolveStage::Folder => Stage::ResolveFolder,
            ResolveStage::File => Stage::ResolveFile,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Stage::Authorize => "authorize",
            Stage::ResolveHub => "resolve_hub",
            Stage::ResolveProject => "resolve_project",
            Stage::ResolveFolder => "resolve_folder",
            Stage::ResolveFile => "resolve_file",
            Stage::SubmitJob => "submit_job",
            Stage::AwaitManifest => "await_manifest",
            Stage::MintCredential => "mint_credential",
            Stage::Download => "download",
            Stage::Decode => "decode",
        };
        f.write_str(s)
    }
}

/// Snapshot of a translation job's progress
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ManifestState {
    /// Still converting; `progress` is the provider's text (e.g. "25% complete")
    InProgress {
        /// Progress text from the manifest
        progress: String,
    },
    /// Finished; the converted artifact is available
    Complete {
        /// Identifier of the first derivative's first child
        derivative: DerivativeUrn,
    },
    /// The provider gave up on the job
    Failed {
        /// Status text from the manifest (e.g. "failed", "timeout")
        status: String,
    },
}

impl ManifestState {
    /// Whether polling should stop at this state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ManifestState::InProgress { .. })
    }
}

/// How the credential's cookies were laid out when it was minted
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CookieLayout {
    /// `{ "url": .., "cookies": [..] }`
    List,
    /// `{ "url": .., "cookie1": .., "cookie2": .., .. }`
    Numbered,
}

/// Short-lived credential bundle authorizing the artifact download
///
/// Serializes back in the same layout it was received in, so the download
/// proxy sees exactly what the mint proxy issued.
#[derive(Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawCredential")]
pub struct SignedDownloadCredential {
    url: String,
    cookies: Vec<String>,
    layout: CookieLayout,
}

impl SignedDownloadCredential {
    /// Build a credential in the list layout
    pub fn new(url: impl Into<String>, cookies: Vec<String>) -> Self {
        Self {
            url: url.into(),
            cookies,
            layout: CookieLayout::List,
        }
    }

    /// Signed download URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Signed cookie values, in issue order
    pub fn cookies(&self) -> &[String] {
        &self.cookies
    }

    /// Layout the credential will be forwarded in
    pub fn layout(&self) -> CookieLayout {
        self.layout
    }
}

impl std::fmt::Debug for SignedDownloadCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignedDownloadCredential")
            .field("url", &self.url)
            .field("cookies", &format_args!("<{} redacted>", self.cookies.len()))
            .field("layout", &self.layout)
            .finish()
    }
}

#[derive(Deserialize)]
struct RawCredential {
    url: String,
    #[serde(default)]
    cookies: Option<Vec<String>>,
    #[serde(flatten)]
    rest: BTreeMap<String, serde_json::Value>,
}

impl TryFrom<RawCredential> for SignedDownloadCredential {
    type Error = String;

    fn try_from(raw: RawCredential) -> Result<Self, Self::Error> {
        if raw.url.trim().is_empty() {
            return Err("credential url is empty".to_string());
        }

        let (cookies, layout) = match raw.cookies {
            Some(list) => (list, CookieLayout::List),
            None => {
                let mut numbered: Vec<(u32, String)> = raw
                    .rest
                    .into_iter()
                    .filter_map(|(key, value)| {
                        let n = key.strip_prefix("cookie")?.parse::<u32>().ok()?;
                        let value = value.as_str()?.to_string();
                        Some((n, value))
                    })
                    .collect();
                numbered.sort_by_key(|(n, _)| *n);
                (
                    numbered.into_iter().map(|(_, v)| v).collect(),
                    CookieLayout::Numbered,
                )
            }
        };

        if cookies.is_empty() {
            return Err("credential carries no cookies".to_string());
        }

        Ok(Self {
            url: raw.url,
            cookies,
            layout,
        })
    }
}

impl Serialize for SignedDownloadCredential {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match self.layout {
            CookieLayout::List => {
                let mut map = serializer.serialize_map(Some(2))?;
                map.serialize_entry("url", &self.url)?;
                map.serialize_entry("cookies", &self.cookies)?;
                map.end()
            }
            CookieLayout::Numbered => {
                let mut map = serializer.serialize_map(Some(1 + self.cookies.len()))?;
                map.serialize_entry("url", &self.url)?;
                for (i, cookie) in self.cookies.iter().enumerate() {
                    map.serialize_entry(&format!("cookie{}", i + 1), cookie)?;
                }
                map.end()
            }
        }
    }
}

/// Event emitted during a pipeline run
///
/// `M` is the decoded model type produced by the configured
/// [`ModelDecoder`](crate::decode::ModelDecoder).
pub enum PipelineEvent<M> {
    /// A run began
    RunStarted {
        /// Run identifier
        run_id: RunId,
    },

    /// A stage finished successfully
    StageCompleted {
        /// Run identifier
        run_id: RunId,
        /// The stage that finished
        stage: Stage,
    },

    /// The run halted at a stage
    RunFailed {
        /// Run identifier
        run_id: RunId,
        /// The stage that failed
        stage: Stage,
        /// Machine-readable error code
        code: &'static str,
        /// Human-readable error message
        message: String,
    },

    /// The converted model is ready (exactly one per successful run)
    ProcessingFinished {
        /// Run identifier
        run_id: RunId,
        /// The decoded model
        model: Arc<M>,
    },
}

impl<M> PipelineEvent<M> {
    /// The run this event belongs to
    pub fn run_id(&self) -> RunId {
        match self {
            PipelineEvent::RunStarted { run_id }
            | PipelineEvent::StageCompleted { run_id, .. }
            | PipelineEvent::RunFailed { run_id, .. }
            | PipelineEvent::ProcessingFinished { run_id, .. } => *run_id,
        }
    }
}

// Manual impls: `M` itself need not be Clone or Debug.
impl<M> Clone for PipelineEvent<M> {
    fn clone(&self) -> Self {
        match self {
            PipelineEvent::RunStarted { run_id } => PipelineEvent::RunStarted { run_id: *run_id },
            PipelineEvent::StageCompleted { run_id, stage } => PipelineEvent::StageCompleted {
                run_id: *run_id,
                stage: *stage,
            },
            PipelineEvent::RunFailed {
                run_id,
                stage,
                code,
                message,
            } => PipelineEvent::RunFailed {
                run_id: *run_id,
                stage: *stage,
                code: *code,
                message: message.clone(),
            },
            PipelineEvent::ProcessingFinished { run_id, model } => {
                PipelineEvent::ProcessingFinished {
                    run_id: *run_id,
                    model: Arc::clone(model),
                }
            }
        }
    }
}

impl<M> std::fmt::Debug for PipelineEvent<M> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PipelineEvent::RunStarted { run_id } => {
                f.debug_struct("RunStarted").field("run_id", run_id).finish()
            }
            PipelineEvent::StageCompleted { run_id, stage } => f
                .debug_struct("StageCompleted")
                .field("run_id", run_id)
                .field("stage", stage)
                .finish(),
            PipelineEvent::RunFailed {
                run_id,
                stage,
                code,
                message,
            } => f
                .debug_struct("RunFailed")
                .field("run_id", run_id)
                .field("stage", stage)
                .field("code", code)
                .field("message", message)
                .finish(),
            PipelineEvent::ProcessingFinished { run_id, .. } => f
                .debug_struct("ProcessingFinished")
                .field("run_id", run_id)
                .finish_non_exhaustive(),
        }
    }
}
