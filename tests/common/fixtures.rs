//! Canonical platform payloads and a mock of every endpoint a run touches

use async_trait::async_trait;
use bim_acquire::{ModelDecoder, Result};
use bytes::Bytes;
use serde_json::json;
use std::sync::{Arc, Mutex};
use wiremock::matchers::{method, path, query_param};
use wiremock::{Mock, MockBuilder, MockServer, ResponseTemplate};

use super::TARGET_FILE;

/// Storage id of the target file in the folder listing
pub const FILE_ID: &str = "abc123";
/// Job URN returned by the submission endpoint
pub const JOB_URN: &str = "job-999";
/// Derivative URN in the completed manifest
pub const DERIVATIVE_URN: &str = "deriv-1";
/// Access token issued by the token endpoint
pub const ACCESS_TOKEN: &str = "tok-e2e";

/// Minimal IFC file served by the download proxy
pub const SAMPLE_IFC: &str = "ISO-10303-21;
HEADER;
FILE_DESCRIPTION(('ViewDefinition [CoordinationView]'),'2;1');
FILE_SCHEMA(('IFC4'));
ENDSEC;
DATA;
#1=IFCPROJECT('0YvctVUKr0kugbFTf53O9L',$,'Burj',$,$,$,$,$,$);
#2=IFCWALL('2O2Fr$t4X7Zf8NOew3FLOH',$,'Wall-001',$,$,$,$,$);
#3=IFCWALL('1kTvXnbbzCWw8lcMd1dR4o',$,'Wall-002',$,$,$,$,$);
ENDSEC;
END-ISO-10303-21;
";

/// Every endpoint of a run, in the order a run calls them
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum Endpoint {
    Token,
    Hubs,
    Projects,
    FolderFilter,
    FolderContents,
    Job,
    Manifest,
    Mint,
    Download,
}

impl Endpoint {
    pub const ALL: [Endpoint; 9] = [
        Endpoint::Token,
        Endpoint::Hubs,
        Endpoint::Projects,
        Endpoint::FolderFilter,
        Endpoint::FolderContents,
        Endpoint::Job,
        Endpoint::Manifest,
        Endpoint::Mint,
        Endpoint::Download,
    ];

    fn mock(self, server: &MockServer) -> (MockBuilder, ResponseTemplate) {
        let base = server.uri();
        match self {
            Endpoint::Token => (
                Mock::given(method("POST")).and(path("/authentication/v2/token")),
                ResponseTemplate::new(200).set_body_json(json!({
                    "access_token": ACCESS_TOKEN,
                    "token_type": "Bearer",
                    "expires_in": 3599
                })),
            ),
            Endpoint::Hubs => (
                Mock::given(method("GET")).and(path("/project/v1/hubs")),
                ResponseTemplate::new(200).set_body_json(json!({
                    "data": [{
                        "type": "hubs",
                        "id": "b.hub",
                        "relationships": { "projects": { "links": { "related": {
                            "href": format!("{base}/project/v1/hubs/b.hub/projects")
                        }}}}
                    }]
                })),
            ),
            Endpoint::Projects => (
                Mock::given(method("GET")).and(path("/project/v1/hubs/b.hub/projects")),
                ResponseTemplate::new(200).set_body_json(json!({
                    "data": [{
                        "type": "projects",
                        "id": "b.proj",
                        "relationships": { "rootFolder": { "meta": { "link": {
                            "href": format!("{base}/data/v1/projects/b.proj/folders/root-folder")
                        }}}}
                    }]
                })),
            ),
            Endpoint::FolderFilter => (
                Mock::given(method("GET"))
                    .and(path("/data/v1/projects/b.proj/folders/root-folder/contents"))
                    .and(query_param("filter[attributes.name]", "Project Files")),
                ResponseTemplate::new(200).set_body_json(json!({
                    "data": [{
                        "type": "folders",
                        "attributes": { "name": "Project Files" },
                        "relationships": { "contents": { "links": { "related": {
                            "href": format!("{base}/data/v1/projects/b.proj/folders/project-files/contents")
                        }}}}
                    }]
                })),
            ),
            Endpoint::FolderContents => (
                Mock::given(method("GET"))
                    .and(path("/data/v1/projects/b.proj/folders/project-files/contents")),
                ResponseTemplate::new(200).set_body_json(json!({
                    "data": [],
                    "included": [
                        version("site plan.dwg", "dwg-1"),
                        version(TARGET_FILE, FILE_ID),
                        version(&format!("old {TARGET_FILE}"), "stale-2"),
                    ]
                })),
            ),
            Endpoint::Job => (
                Mock::given(method("POST")).and(path("/modelderivative/v2/designdata/job")),
                ResponseTemplate::new(200).set_body_json(json!({
                    "result": "created",
                    "urn": JOB_URN
                })),
            ),
            Endpoint::Manifest => (
                Mock::given(method("GET")).and(path(format!(
                    "/modelderivative/v2/designdata/{JOB_URN}/manifest"
                ))),
                ResponseTemplate::new(200).set_body_json(json!({
                    "status": "success",
                    "progress": "complete",
                    "derivatives": [{ "children": [{ "urn": DERIVATIVE_URN }] }]
                })),
            ),
            Endpoint::Mint => (
                Mock::given(method("POST")).and(path("/.netlify/functions/getFile")),
                ResponseTemplate::new(200).set_body_json(json!({
                    "url": "https://x",
                    "cookies": ["CloudFront-Policy=p", "CloudFront-Key-Pair-Id=k", "CloudFront-Signature=s"]
                })),
            ),
            Endpoint::Download => (
                Mock::given(method("POST")).and(path("/.netlify/functions/getFileData")),
                ResponseTemplate::new(200).set_body_bytes(SAMPLE_IFC.as_bytes().to_vec()),
            ),
        }
    }
}

fn version(name: &str, storage_id: &str) -> serde_json::Value {
    json!({
        "type": "versions",
        "attributes": { "name": name },
        "relationships": { "storage": { "data": { "type": "objects", "id": storage_id } } }
    })
}

/// Mount every endpoint, each expected exactly once
pub async fn mount_platform(server: &MockServer) {
    mount_platform_failing_at(server, None).await;
}

/// Mount every endpoint; `fail_at` answers with the given status instead
///
/// Endpoints after the failing one are mounted with `expect(0)`, so the server
/// panics on drop if the run went any further.
pub async fn mount_platform_failing_at(server: &MockServer, fail_at: Option<(Endpoint, u16)>) {
    for endpoint in Endpoint::ALL {
        let (mock, success) = endpoint.mock(server);
        let mounted = match fail_at {
            Some((failing, status)) if failing == endpoint => {
                mock.respond_with(ResponseTemplate::new(status)).expect(1)
            }
            Some((failing, _)) if endpoint > failing => mock.respond_with(success).expect(0),
            _ => mock.respond_with(success).expect(1),
        };
        mounted
            .named(format!("{endpoint:?}"))
            .mount(server)
            .await;
    }
}

/// Decoder that records every buffer it is given and returns it unchanged
#[derive(Clone, Default)]
pub struct RecordingDecoder {
    calls: Arc<Mutex<Vec<Bytes>>>,
}

impl RecordingDecoder {
    pub fn calls(&self) -> Vec<Bytes> {
        self.calls.lock().expect("decoder mutex poisoned").clone()
    }
}

#[async_trait]
impl ModelDecoder for RecordingDecoder {
    type Model = Bytes;

    async fn decode(&self, bytes: Bytes) -> Result<Bytes> {
        self.calls
            .lock()
            .expect("decoder mutex poisoned")
            .push(bytes.clone());
        Ok(bytes)
    }
}
