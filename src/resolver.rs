//! Hub → project → folder → file resolution
//!
//! Each level of the platform's directory API returns a differently shaped,
//! deeply nested JSON document. Every stage here issues exactly one
//! authenticated GET and reads one value at a fixed JSON pointer, so a schema
//! change in one response shape cannot leak into the others.
//!
//! Only the first hub and the first project are considered. Accounts with
//! several of either always resolve into the first listed.

use crate::auth::TokenStore;
use crate::config::{PlatformConfig, ResolverConfig, endpoint};
use crate::error::{ResolveError, Result};
use crate::types::{FileIdentifier, FolderRef, HubRef, ProjectRef, ResolveStage};
use serde_json::Value;
use url::{Url, form_urlencoded};

/// Hub listing path, relative to the platform base URL
const HUBS_PATH: &str = "project/v1/hubs";

const HUB_PROJECTS_POINTER: &str = "/data/0/relationships/projects/links/related/href";
const ROOT_FOLDER_POINTER: &str = "/data/0/relationships/rootFolder/meta/link/href";
const FOLDER_CONTENTS_POINTER: &str = "/data/0/relationships/contents/links/related/href";
const ENTRY_NAME_POINTER: &str = "/attributes/name";
const STORAGE_ID_POINTER: &str = "/relationships/storage/data/id";

/// Query parameter that filters folder contents by name
const NAME_FILTER_PARAM: &str = "filter[attributes.name]";

/// Walks the platform hierarchy to the target file
pub struct ResourceResolver {
    client: reqwest::Client,
    platform: PlatformConfig,
    config: ResolverConfig,
    tokens: TokenStore,
}

impl ResourceResolver {
    /// Create a resolver that authenticates with the token in `tokens`
    pub fn new(
        client: reqwest::Client,
        platform: PlatformConfig,
        config: ResolverConfig,
        tokens: TokenStore,
    ) -> Self {
        Self {
            client,
            platform,
            config,
            tokens,
        }
    }

    /// The configured target file suffix
    pub fn target_file_suffix(&self) -> &str {
        &self.config.target_file_suffix
    }

    /// Run all four stages, looking for a file ending with `suffix`
    pub async fn resolve(&self, suffix: &str) -> Result<FileIdentifier> {
        let hub = self.resolve_hub().await?;
        let project = self.resolve_project(&hub).await?;
        let folder = self.resolve_folder(&project).await?;
        self.resolve_file(&folder, suffix).await
    }

    /// First hub in the account; yields its related-projects link
    pub async fn resolve_hub(&self) -> Result<HubRef> {
        let url = endpoint(&self.platform.base_url, HUBS_PATH)?;
        let body = self.get_json(ResolveStage::Hub, url).await?;
        let link = pointer_str(ResolveStage::Hub, &body, HUB_PROJECTS_POINTER)?;
        let hub = HubRef(parse_link(ResolveStage::Hub, link)?);

        tracing::info!(projects = %hub, "Hub resolved");
        Ok(hub)
    }

    /// First project under the hub; yields its root folder's contents link
    pub async fn resolve_project(&self, hub: &HubRef) -> Result<ProjectRef> {
        let body = self.get_json(ResolveStage::Project, hub.url().clone()).await?;
        let root = pointer_str(ResolveStage::Project, &body, ROOT_FOLDER_POINTER)?;
        let contents = format!("{}/contents", root.trim_end_matches('/'));
        let project = ProjectRef(parse_link(ResolveStage::Project, &contents)?);

        tracing::info!(root_contents = %project, "Project resolved");
        Ok(project)
    }

    /// The configured folder (default "Project Files"); yields its contents link
    pub async fn resolve_folder(&self, project: &ProjectRef) -> Result<FolderRef> {
        let mut url = project.url().clone();
        append_query_pair(&mut url, NAME_FILTER_PARAM, &self.config.folder_name);

        let body = self.get_json(ResolveStage::Folder, url).await?;
        let link = pointer_str(ResolveStage::Folder, &body, FOLDER_CONTENTS_POINTER)?;
        let folder = FolderRef(parse_link(ResolveStage::Folder, link)?);

        tracing::info!(folder = %self.config.folder_name, contents = %folder, "Folder resolved");
        Ok(folder)
    }

    /// First folder entry whose name ends with `suffix`; yields its storage id
    ///
    /// Entries are read from the listing's `included` versions, in order.
    pub async fn resolve_file(&self, folder: &FolderRef, suffix: &str) -> Result<FileIdentifier> {
        let body = self.get_json(ResolveStage::File, folder.url().clone()).await?;
        let entries = body
            .get("included")
            .and_then(Value::as_array)
            .ok_or_else(|| ResolveError::MissingKey {
                stage: ResolveStage::File,
                path: "/included".to_string(),
            })?;

        let entry = entries
            .iter()
            .find(|entry| {
                entry
                    .pointer(ENTRY_NAME_POINTER)
                    .and_then(Value::as_str)
                    .is_some_and(|name| name.ends_with(suffix))
            })
            .ok_or_else(|| ResolveError::NoMatchingFile {
                suffix: suffix.to_string(),
            })?;

        let id = pointer_str(ResolveStage::File, entry, STORAGE_ID_POINTER)?;
        let file = FileIdentifier(id.to_string());

        tracing::info!(file_id = %file, "File resolved");
        Ok(file)
    }

    async fn get_json(&self, stage: ResolveStage, url: Url) -> Result<Value> {
        let token = self.tokens.require().await?;
        tracing::debug!(stage = %stage, url = %url, "Listing");

        let response = self
            .client
            .get(url)
            .bearer_auth(token.secret())
            .send()
            .await
            .map_err(|e| ResolveError::Unreachable {
                stage,
                reason: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            tracing::warn!(stage = %stage, status = %status, "Listing request failed");
            return Err(ResolveError::RequestFailed { stage, status }.into());
        }

        let text = response.text().await.map_err(|e| ResolveError::Unreachable {
            stage,
            reason: e.to_string(),
        })?;
        serde_json::from_str(&text).map_err(|e| {
            ResolveError::InvalidBody {
                stage,
                reason: e.to_string(),
            }
            .into()
        })
    }
}

fn pointer_str<'a>(stage: ResolveStage, body: &'a Value, pointer: &str) -> Result<&'a str> {
    body.pointer(pointer)
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
        .ok_or_else(|| {
            ResolveError::MissingKey {
                stage,
                path: pointer.to_string(),
            }
            .into()
        })
}

/// Append `key=value`, encoding spaces as `%20` rather than form-style `+`
fn append_query_pair(url: &mut Url, key: &str, value: &str) {
    // byte_serialize escapes a literal '+' as %2B, so every '+' left is a space
    let encode = |raw: &str| {
        form_urlencoded::byte_serialize(raw.as_bytes())
            .collect::<String>()
            .replace('+', "%20")
    };
    let pair = format!("{}={}", encode(key), encode(value));
    let query = match url.query() {
        Some(existing) if !existing.is_empty() => format!("{existing}&{pair}"),
        _ => pair,
    };
    url.set_query(Some(&query));
}

fn parse_link(stage: ResolveStage, link: &str) -> Result<Url> {
    Url::parse(link).map_err(|_| {
        ResolveError::InvalidLink {
            stage,
            link: link.to_string(),
        }
        .into()
    })
}
