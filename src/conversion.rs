//! Translation job submission and manifest polling
//!
//! A job is submitted once and never resubmitted. Completion is observed by
//! polling the job's manifest with [`poll_until`](crate::poll::poll_until):
//! a fixed interval between fetches and a bounded number of fetches.
//!
//! Manifest interpretation, in order:
//! 1. `status` of `failed` or `timeout` → [`ManifestState::Failed`]
//! 2. `progress == "complete"` → [`ManifestState::Complete`] with the first
//!    derivative's first child URN
//! 3. anything else → [`ManifestState::InProgress`]

use crate::auth::TokenStore;
use crate::config::{ConversionConfig, PlatformConfig, endpoint};
use crate::error::{ConversionError, Error, Result, body_snippet};
use crate::poll::{PollOutcome, poll_until};
use crate::types::{DerivativeUrn, FileIdentifier, JobUrn, ManifestState};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use serde::{Deserialize, Serialize};
use url::Url;

/// Job submission path, relative to the platform base URL
const JOB_PATH: &str = "modelderivative/v2/designdata/job";

/// Parent of `{urn}/manifest`, relative to the platform base URL
const DESIGN_DATA_PATH: &str = "modelderivative/v2/designdata/";

/// Submission `result` values that mean the job was accepted
const ACCEPTED_RESULTS: &[&str] = &["created", "success"];

/// Manifest `status` values that end a job without output
const FAILED_STATUSES: &[&str] = &["failed", "timeout"];

#[derive(Debug, Serialize)]
struct JobRequest<'a> {
    input: JobInput,
    output: JobOutput<'a>,
}

#[derive(Debug, Serialize)]
struct JobInput {
    urn: String,
}

#[derive(Debug, Serialize)]
struct JobOutput<'a> {
    formats: Vec<OutputFormat<'a>>,
}

#[derive(Debug, Serialize)]
struct OutputFormat<'a> {
    #[serde(rename = "type")]
    kind: &'a str,
}

impl<'a> JobRequest<'a> {
    fn new(file: &FileIdentifier, formats: &'a [String]) -> Self {
        Self {
            input: JobInput {
                urn: STANDARD.encode(file.as_str()),
            },
            output: JobOutput {
                formats: formats
                    .iter()
                    .map(|kind| OutputFormat { kind: kind.as_str() })
                    .collect(),
            },
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct JobResponse {
    #[serde(default)]
    result: Option<String>,
    #[serde(default)]
    urn: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct Manifest {
    #[serde(default)]
    status: Option<String>,
    #[serde(default)]
    progress: Option<String>,
    #[serde(default)]
    derivatives: Vec<ManifestDerivative>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestDerivative {
    #[serde(default)]
    children: Vec<ManifestChild>,
}

#[derive(Debug, Default, Deserialize)]
struct ManifestChild {
    #[serde(default)]
    urn: Option<String>,
}

impl Manifest {
    fn first_derivative(&self) -> Option<&str> {
        self.derivatives
            .first()?
            .children
            .first()?
            .urn
            .as_deref()
            .filter(|urn| !urn.is_empty())
    }

    fn into_state(self, job: &JobUrn) -> Result<ManifestState> {
        if let Some(status) = self.status.as_deref()
            && FAILED_STATUSES.contains(&status)
        {
            return Ok(ManifestState::Failed {
                status: status.to_string(),
            });
        }

        let progress = self.progress.clone().unwrap_or_default();
        if progress != "complete" {
            return Ok(ManifestState::InProgress { progress });
        }

        let derivative = self
            .first_derivative()
            .ok_or_else(|| ConversionError::MissingDerivative {
                urn: job.to_string(),
            })?;
        Ok(ManifestState::Complete {
            derivative: DerivativeUrn::from(derivative),
        })
    }
}

/// Submits translation jobs and waits for their output
pub struct ConversionJobOrchestrator {
    client: reqwest::Client,
    platform: PlatformConfig,
    config: ConversionConfig,
    tokens: TokenStore,
}

impl ConversionJobOrchestrator {
    /// Create an orchestrator that authenticates with the token in `tokens`
    pub fn new(
        client: reqwest::Client,
        platform: PlatformConfig,
        config: ConversionConfig,
        tokens: TokenStore,
    ) -> Self {
        Self {
            client,
            platform,
            config,
            tokens,
        }
    }

    /// Submit a job converting `file` into the configured output formats
    ///
    /// Accepted only on a 2xx status whose body `result` is `created` or
    /// `success` and which names the job's URN.
    pub async fn submit_job(&self, file: &FileIdentifier) -> Result<JobUrn> {
        let token = self.tokens.require().await?;
        let url = endpoint(&self.platform.base_url, JOB_PATH)?;
        let request = JobRequest::new(file, &self.config.output_formats);

        tracing::debug!(file_id = %file, formats = ?self.config.output_formats, "Submitting translation job");

        let response = self
            .client
            .post(url)
            .bearer_auth(token.secret())
            .json(&request)
            .send()
            .await
            .map_err(|e| ConversionError::SubmissionFailed {
                reason: e.to_string(),
            })?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| ConversionError::SubmissionFailed {
                reason: e.to_string(),
            })?;
        let body: JobResponse = serde_json::from_str(&text).unwrap_or_default();

        let accepted = body
            .result
            .as_deref()
            .is_some_and(|result| ACCEPTED_RESULTS.contains(&result));
        if !status.is_success() || !accepted {
            tracing::warn!(
                status = %status,
                result = ?body.result,
                body = %body_snippet(&text),
                "Translation job rejected"
            );
            return Err(ConversionError::SubmissionRejected {
                status,
                result: body.result,
            }
            .into());
        }

        match body.urn.filter(|urn| !urn.trim().is_empty()) {
            Some(urn) => {
                let job = JobUrn(urn);
                tracing::info!(job = %job, "Translation job accepted");
                Ok(job)
            }
            None => Err(ConversionError::SubmissionRejected {
                status,
                result: body.result,
            }
            .into()),
        }
    }

    /// Fetch the job's manifest once and interpret it
    pub async fn fetch_manifest(&self, job: &JobUrn) -> Result<ManifestState> {
        let polling = |reason: String| ConversionError::Polling {
            urn: job.to_string(),
            reason,
        };

        let token = self.tokens.require().await?;
        let url = self.manifest_url(job)?;

        let response = self
            .client
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| polling(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(polling(format!("manifest returned {status}")).into());
        }

        let manifest: Manifest = response
            .json()
            .await
            .map_err(|e| polling(format!("unreadable manifest: {e}")))?;
        manifest.into_state(job)
    }

    /// Poll the manifest until the job completes, fails, or the budget runs out
    pub async fn await_completion(&self, job: &JobUrn) -> Result<DerivativeUrn> {
        let poll = &self.config.poll;
        tracing::info!(
            job = %job,
            interval_ms = poll.interval.as_millis(),
            max_attempts = poll.max_attempts,
            "Waiting for translation"
        );

        let outcome = poll_until(
            poll,
            |attempt| async move {
                let state = self.fetch_manifest(job).await?;
                tracing::debug!(job = %job, attempt, state = ?state, "Manifest polled");
                Ok::<_, Error>(state)
            },
            ManifestState::is_terminal,
        )
        .await?;

        match outcome {
            PollOutcome::Ready {
                state: ManifestState::Complete { derivative },
                attempts,
            } => {
                tracing::info!(job = %job, derivative = %derivative, attempts, "Translation complete");
                Ok(derivative)
            }
            PollOutcome::Ready {
                state: ManifestState::Failed { status },
                ..
            } => Err(ConversionError::JobFailed {
                urn: job.to_string(),
                status,
            }
            .into()),
            PollOutcome::Ready {
                state: ManifestState::InProgress { .. },
                attempts,
            }
            | PollOutcome::Exhausted { attempts, .. } => Err(ConversionError::PollTimeout {
                urn: job.to_string(),
                attempts,
            }
            .into()),
        }
    }

    fn manifest_url(&self, job: &JobUrn) -> Result<Url> {
        let mut url = endpoint(&self.platform.base_url, DESIGN_DATA_PATH)?;
        url.path_segments_mut()
            .map_err(|_| Error::config("base URL cannot carry a path", "platform.base_url"))?
            .pop_if_empty()
            .push(job.as_str())
            .push("manifest");
        Ok(url)
    }
}
