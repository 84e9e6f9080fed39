//! Error types for bim-acquire
//!
//! This module provides the error taxonomy for the acquisition pipeline:
//! - One sub-enum per pipeline component (auth, resolution, conversion, download broker)
//! - Machine-readable error codes for failure events and log fields
//! - The [`Stage`](crate::types::Stage) context is attached by the pipeline, not here

use crate::types::ResolveStage;
use reqwest::StatusCode;
use thiserror::Error;

/// Result type alias for bim-acquire operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for bim-acquire
///
/// Every pipeline stage reports its failure through one of these variants. The
/// pipeline itself never propagates them out of a run; it records the first one
/// in [`RunOutcome::Halted`](crate::pipeline::RunOutcome::Halted).
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "platform.base_url")
        key: Option<String>,
    },

    /// OAuth2 authorization or token exchange failed
    #[error("authorization error: {0}")]
    Auth(#[from] AuthError),

    /// A hub/project/folder/file lookup failed (ResourceNotFoundError)
    #[error("resource not found: {0}")]
    ResourceNotFound(#[from] ResolveError),

    /// Translation job submission or manifest polling failed
    #[error("conversion error: {0}")]
    Conversion(#[from] ConversionError),

    /// Signed credential minting or artifact download failed
    #[error("download broker error: {0}")]
    Broker(#[from] BrokerError),

    /// The converted bytes could not be decoded into a model
    #[error("decode error: {0}")]
    Decode(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error (config file loading)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other error
    #[error("{0}")]
    Other(String),
}

/// OAuth2 authorization-code flow errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Client id or client secret is empty
    #[error("client credentials are not configured")]
    MissingCredentials,

    /// The authorization code is empty
    #[error("authorization code is empty")]
    MissingCode,

    /// The token endpoint returned a non-success status
    #[error("token endpoint returned {status}: {body}")]
    TokenRejected {
        /// HTTP status returned by the token endpoint
        status: StatusCode,
        /// Truncated response body, for diagnostics
        body: String,
    },

    /// The token endpoint could not be reached
    #[error("token endpoint unreachable: {0}")]
    Unreachable(String),

    /// The token endpoint answered 2xx but without a usable `access_token`
    #[error("token response did not contain an access token")]
    MalformedTokenResponse,

    /// A platform call was attempted before a token was obtained
    #[error("no access token available; authorize first")]
    NotAuthenticated,

    /// The authorization URL could not be built
    #[error("invalid authorization endpoint: {0}")]
    InvalidEndpoint(String),
}

/// Hierarchy resolution errors (hub, project, folder, file)
#[derive(Debug, Error)]
pub enum ResolveError {
    /// The listing request for a stage returned a non-success status
    #[error("{stage} listing returned {status}")]
    RequestFailed {
        /// The resolution stage that failed
        stage: ResolveStage,
        /// HTTP status returned by the platform
        status: StatusCode,
    },

    /// The listing request for a stage never got a response
    #[error("{stage} listing unreachable: {reason}")]
    Unreachable {
        /// The resolution stage that failed
        stage: ResolveStage,
        /// Transport error message
        reason: String,
    },

    /// The expected key path was absent from the stage's response
    #[error("{stage} response has no value at {path}")]
    MissingKey {
        /// The resolution stage that failed
        stage: ResolveStage,
        /// JSON pointer that was expected to resolve
        path: String,
    },

    /// The stage's response body is not JSON
    #[error("{stage} response is not valid JSON: {reason}")]
    InvalidBody {
        /// The resolution stage that failed
        stage: ResolveStage,
        /// Parser message
        reason: String,
    },

    /// The link extracted for a stage is not a valid URL
    #[error("{stage} link is not a valid URL: {link}")]
    InvalidLink {
        /// The resolution stage that produced the link
        stage: ResolveStage,
        /// The offending link text
        link: String,
    },

    /// No folder entry ends with the requested suffix
    #[error("no file ending with {suffix:?} in folder")]
    NoMatchingFile {
        /// Suffix that was searched for
        suffix: String,
    },
}

/// Translation job errors
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The job endpoint rejected the submission (JobSubmissionError)
    #[error("job submission rejected (status {status}, result {result:?})")]
    SubmissionRejected {
        /// HTTP status returned by the job endpoint
        status: StatusCode,
        /// The `result` field of the body, if any
        result: Option<String>,
    },

    /// The job request never got a usable response (JobSubmissionError)
    #[error("job submission failed: {reason}")]
    SubmissionFailed {
        /// Transport or body error message
        reason: String,
    },

    /// A manifest request failed mid-poll (PollingError)
    #[error("manifest poll for {urn} failed: {reason}")]
    Polling {
        /// The job URN being polled
        urn: String,
        /// Why the tick failed
        reason: String,
    },

    /// The provider reported the job as failed or timed out
    #[error("translation job {urn} ended with status {status:?}")]
    JobFailed {
        /// The job URN
        urn: String,
        /// Status reported by the manifest
        status: String,
    },

    /// The manifest never reached a terminal state within the attempt budget
    #[error("translation job {urn} still in progress after {attempts} polls")]
    PollTimeout {
        /// The job URN
        urn: String,
        /// Number of manifest fetches performed
        attempts: u32,
    },

    /// The manifest reported completion but listed no derivative
    #[error("manifest for {urn} is complete but has no derivative")]
    MissingDerivative {
        /// The job URN
        urn: String,
    },
}

/// Backend-proxy download errors
#[derive(Debug, Error)]
pub enum BrokerError {
    /// The credential-minting proxy failed (CredentialMintError)
    #[error("credential mint failed: {0}")]
    CredentialMint(String),

    /// The download proxy failed (DownloadError)
    #[error("artifact download failed: {0}")]
    Download(String),
}

impl Error {
    /// Get the machine-readable error code
    ///
    /// Stable across releases; used in [`PipelineEvent::RunFailed`](crate::types::PipelineEvent::RunFailed).
    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Config { .. } => "config_error",
            Error::Auth(_) => "auth_error",
            Error::ResourceNotFound(_) => "resource_not_found",
            Error::Conversion(e) => match e {
                ConversionError::SubmissionRejected { .. }
                | ConversionError::SubmissionFailed { .. } => "job_submission_failed",
                ConversionError::Polling { .. } => "polling_failed",
                ConversionError::JobFailed { .. } => "job_failed",
                ConversionError::PollTimeout { .. } => "poll_timeout",
                ConversionError::MissingDerivative { .. } => "missing_derivative",
            },
            Error::Broker(e) => match e {
                BrokerError::CredentialMint(_) => "credential_mint_failed",
                BrokerError::Download(_) => "download_failed",
            },
            Error::Decode(_) => "decode_failed",
            Error::Serialization(_) => "serialization_error",
            Error::Io(_) => "io_error",
            Error::Other(_) => "internal_error",
        }
    }

    pub(crate) fn config(message: impl Into<String>, key: &str) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }
}

/// Keep error bodies short enough for a log line
pub(crate) fn body_snippet(body: &str) -> String {
    const MAX_CHARS: usize = 240;
    let trimmed = body.trim();
    if trimmed.chars().count() <= MAX_CHARS {
        return trimmed.to_string();
    }
    let mut out: String = trimmed.chars().take(MAX_CHARS).collect();
    out.push('…');
    out
}
