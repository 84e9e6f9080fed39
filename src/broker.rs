//! Two-step artifact download through the trusted backend proxy
//!
//! Cookie signing needs secrets that must stay server-side, so neither step
//! talks to the platform directly: the proxy first mints a signed credential
//! for the derivative, then fetches the bytes on presentation of it.

use crate::config::{BrokerConfig, endpoint};
use crate::error::{BrokerError, Result, body_snippet};
use crate::types::{AccessToken, DerivativeUrn, JobUrn, SignedDownloadCredential};
use bytes::Bytes;
use serde::Serialize;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MintRequest<'a> {
    job_urn: &'a str,
    file_urn: &'a str,
    access_token: &'a str,
}

/// Client for the credential-mint and download proxy functions
pub struct SecureDownloadBroker {
    client: reqwest::Client,
    config: BrokerConfig,
}

impl SecureDownloadBroker {
    /// Create a broker talking to the proxy at `config.base_url`
    pub fn new(client: reqwest::Client, config: BrokerConfig) -> Self {
        Self { client, config }
    }

    /// Ask the proxy to sign a download credential for `derivative`
    pub async fn mint_download_credential(
        &self,
        job: &JobUrn,
        derivative: &DerivativeUrn,
        token: &AccessToken,
    ) -> Result<SignedDownloadCredential> {
        let url = endpoint(&self.config.base_url, &self.config.mint_path)?;
        let request = MintRequest {
            job_urn: job.as_str(),
            file_urn: derivative.as_str(),
            access_token: token.secret(),
        };

        let response = self
            .client
            .post(url)
            .json(&request)
            .send()
            .await
            .map_err(|e| BrokerError::CredentialMint(e.to_string()))?;

        let status = response.status();
        let text = response
            .text()
            .await
            .map_err(|e| BrokerError::CredentialMint(e.to_string()))?;
        if !status.is_success() {
            return Err(BrokerError::CredentialMint(format!(
                "proxy returned {status}: {}",
                body_snippet(&text)
            ))
            .into());
        }

        let credential: SignedDownloadCredential = serde_json::from_str(&text)
            .map_err(|e| BrokerError::CredentialMint(format!("unusable credential: {e}")))?;

        tracing::info!(
            job = %job,
            cookies = credential.cookies().len(),
            layout = ?credential.layout(),
            "Download credential minted"
        );
        Ok(credential)
    }

    /// Download the converted artifact with a minted credential
    pub async fn download_artifact(&self, credential: &SignedDownloadCredential) -> Result<Bytes> {
        let url = endpoint(&self.config.base_url, &self.config.download_path)?;

        let response = self
            .client
            .post(url)
            .json(credential)
            .send()
            .await
            .map_err(|e| BrokerError::Download(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(BrokerError::Download(format!(
                "proxy returned {status}: {}",
                body_snippet(&text)
            ))
            .into());
        }

        let bytes = response
            .bytes()
            .await
            .map_err(|e| BrokerError::Download(e.to_string()))?;
        if bytes.is_empty() {
            return Err(BrokerError::Download("proxy returned an empty body".to_string()).into());
        }

        tracing::info!(size = bytes.len(), "Artifact downloaded");
        Ok(bytes)
    }
}
