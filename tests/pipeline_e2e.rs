//! End-to-end pipeline runs against a mocked platform and download proxy
//!
//! Every endpoint of a run is served by one wiremock server. Mocks carry
//! `expect(n)` call counts, so a run that goes past a failing stage makes the
//! server panic when the test ends.

mod common;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bim_acquire::{AcquisitionPipeline, PipelineEvent, RunOutcome, Stage, StepModelDecoder};
use common::{
    DERIVATIVE_URN, Endpoint, FILE_ID, JOB_URN, RecordingDecoder, SAMPLE_IFC, completed_stages,
    drain, finished_count, mount_platform, mount_platform_failing_at, redirected_with_code,
    single_failure, test_config,
};
use std::sync::Arc;
use wiremock::MockServer;

#[tokio::test]
async fn full_run_decodes_once_and_notifies_once() {
    let server = MockServer::start().await;
    mount_platform(&server).await;

    let decoder = RecordingDecoder::default();
    let pipeline = AcquisitionPipeline::new(test_config(&server), decoder.clone()).unwrap();
    let mut events = pipeline.subscribe();

    let outcome = pipeline.run(&redirected_with_code("auth-code")).await;

    let model = outcome.model().expect("run should complete").clone();
    assert_eq!(&model[..], SAMPLE_IFC.as_bytes());

    let calls = decoder.calls();
    assert_eq!(calls.len(), 1, "decoder must run exactly once");
    assert_eq!(&calls[0][..], SAMPLE_IFC.as_bytes());

    let published = drain(&mut events);
    assert_eq!(finished_count(&published), 1);
    assert!(matches!(published.first(), Some(PipelineEvent::RunStarted { .. })));
    match published.last() {
        Some(PipelineEvent::ProcessingFinished { model: sent, .. }) => {
            assert!(Arc::ptr_eq(sent, &model), "subscribers get the same model")
        }
        other => panic!("last event should be the completion, got {other:?}"),
    }
    assert_eq!(
        completed_stages(&published),
        vec![
            Stage::Authorize,
            Stage::ResolveHub,
            Stage::ResolveProject,
            Stage::ResolveFolder,
            Stage::ResolveFile,
            Stage::SubmitJob,
            Stage::AwaitManifest,
            Stage::MintCredential,
            Stage::Download,
            Stage::Decode,
        ]
    );

    assert!(
        !pipeline.tokens().is_authenticated().await,
        "token is torn down when the run ends"
    );
}

#[tokio::test]
async fn full_run_requests_carry_the_resolved_identifiers() {
    let server = MockServer::start().await;
    mount_platform(&server).await;

    let pipeline = AcquisitionPipeline::new(test_config(&server), RecordingDecoder::default()).unwrap();
    assert!(pipeline.run(&redirected_with_code("auth-code")).await.is_completed());

    let requests = server.received_requests().await.unwrap();
    let body_of = |suffix: &str| -> serde_json::Value {
        let request = requests
            .iter()
            .find(|r| r.url.path().ends_with(suffix))
            .unwrap_or_else(|| panic!("no request to {suffix}"));
        serde_json::from_slice(&request.body).unwrap()
    };

    assert_eq!(
        body_of("/designdata/job")["input"]["urn"],
        STANDARD.encode(FILE_ID)
    );

    let mint = body_of("/functions/getFile");
    assert_eq!(mint["jobUrn"], JOB_URN);
    assert_eq!(mint["fileUrn"], DERIVATIVE_URN);
    assert_eq!(mint["accessToken"], common::ACCESS_TOKEN);

    let download = body_of("/functions/getFileData");
    assert_eq!(download["url"], "https://x");
    assert_eq!(download["cookies"].as_array().unwrap().len(), 3);
}

#[tokio::test]
async fn built_in_decoder_produces_ifc_summary() {
    let server = MockServer::start().await;
    mount_platform(&server).await;

    let pipeline =
        AcquisitionPipeline::new(test_config(&server), StepModelDecoder::new().unwrap()).unwrap();

    match pipeline.run(&redirected_with_code("auth-code")).await {
        RunOutcome::Completed(model) => {
            assert_eq!(model.schema, "IFC4");
            assert_eq!(model.entity_count, 3);
            assert_eq!(model.count_of("IFCWALL"), 2);
        }
        other => panic!("expected completion, got {other:?}"),
    }
}

#[tokio::test]
async fn hub_401_calls_nothing_further() {
    let server = MockServer::start().await;
    mount_platform_failing_at(&server, Some((Endpoint::Hubs, 401))).await;

    let decoder = RecordingDecoder::default();
    let pipeline = AcquisitionPipeline::new(test_config(&server), decoder.clone()).unwrap();
    let mut events = pipeline.subscribe();

    let outcome = pipeline.run(&redirected_with_code("auth-code")).await;

    match outcome {
        RunOutcome::Halted { stage, error } => {
            assert_eq!(stage, Stage::ResolveHub);
            assert_eq!(error.error_code(), "resource_not_found");
            assert!(error.to_string().contains("401"));
        }
        other => panic!("expected Halted, got {other:?}"),
    }

    let published = drain(&mut events);
    assert_eq!(finished_count(&published), 0);
    assert_eq!(single_failure(&published), (Stage::ResolveHub, "resource_not_found"));
    assert!(decoder.calls().is_empty());
    assert!(!pipeline.tokens().is_authenticated().await);
}

#[tokio::test]
async fn each_resolution_failure_halts_before_the_next_request() {
    let cases = [
        (Endpoint::Hubs, 403, Stage::ResolveHub),
        (Endpoint::Projects, 404, Stage::ResolveProject),
        (Endpoint::FolderFilter, 500, Stage::ResolveFolder),
        (Endpoint::FolderContents, 404, Stage::ResolveFile),
    ];

    for (endpoint, status, expected_stage) in cases {
        let server = MockServer::start().await;
        mount_platform_failing_at(&server, Some((endpoint, status))).await;

        let pipeline =
            AcquisitionPipeline::new(test_config(&server), RecordingDecoder::default()).unwrap();
        let mut events = pipeline.subscribe();

        match pipeline.run(&redirected_with_code("auth-code")).await {
            RunOutcome::Halted { stage, .. } => {
                assert_eq!(stage, expected_stage, "failing {endpoint:?}")
            }
            other => panic!("failing {endpoint:?}: expected Halted, got {other:?}"),
        }
        assert_eq!(finished_count(&drain(&mut events)), 0);

        // Later endpoints must not have been called
        server.verify().await;
    }
}

#[tokio::test]
async fn later_stage_failures_map_to_their_codes() {
    let cases = [
        (Endpoint::Token, 401, Stage::Authorize, "auth_error"),
        (Endpoint::Job, 400, Stage::SubmitJob, "job_submission_failed"),
        (Endpoint::Manifest, 503, Stage::AwaitManifest, "polling_failed"),
        (Endpoint::Mint, 502, Stage::MintCredential, "credential_mint_failed"),
        (Endpoint::Download, 403, Stage::Download, "download_failed"),
    ];

    for (endpoint, status, expected_stage, expected_code) in cases {
        let server = MockServer::start().await;
        mount_platform_failing_at(&server, Some((endpoint, status))).await;

        let decoder = RecordingDecoder::default();
        let pipeline = AcquisitionPipeline::new(test_config(&server), decoder.clone()).unwrap();
        let mut events = pipeline.subscribe();

        let outcome = pipeline.run(&redirected_with_code("auth-code")).await;
        assert!(!outcome.is_completed(), "failing {endpoint:?} must not complete");

        let published = drain(&mut events);
        assert_eq!(
            single_failure(&published),
            (expected_stage, expected_code),
            "failing {endpoint:?}"
        );
        assert_eq!(finished_count(&published), 0);
        assert!(decoder.calls().is_empty());

        server.verify().await;
    }
}

#[tokio::test]
async fn undecodable_artifact_halts_at_decode() {
    let server = MockServer::start().await;
    mount_platform(&server).await;

    // The fixture bytes are a valid file; a decoder for another format rejects them
    struct RejectingDecoder;

    #[async_trait::async_trait]
    impl bim_acquire::ModelDecoder for RejectingDecoder {
        type Model = ();

        async fn decode(&self, _bytes: bytes::Bytes) -> bim_acquire::Result<()> {
            Err(bim_acquire::Error::Decode("not a glTF container".into()))
        }
    }

    let pipeline = AcquisitionPipeline::new(test_config(&server), RejectingDecoder).unwrap();
    let mut events = pipeline.subscribe();

    let outcome = pipeline.run(&redirected_with_code("auth-code")).await;

    assert!(matches!(
        outcome,
        RunOutcome::Halted {
            stage: Stage::Decode,
            ..
        }
    ));
    assert_eq!(
        single_failure(&drain(&mut events)),
        (Stage::Decode, "decode_failed")
    );
}

#[tokio::test]
async fn consumed_code_is_not_reused() {
    let server = MockServer::start().await;
    mount_platform(&server).await;

    let pipeline = AcquisitionPipeline::new(test_config(&server), RecordingDecoder::default()).unwrap();
    let nav = redirected_with_code("auth-code");

    assert!(pipeline.run(&nav).await.is_completed());

    // Same redirect again: no second token exchange, every mock stays at one call
    assert!(matches!(pipeline.run(&nav).await, RunOutcome::NotAuthorized));
}

#[tokio::test]
async fn second_concurrent_run_is_busy() {
    let server = MockServer::start().await;
    mount_platform(&server).await;

    let pipeline = AcquisitionPipeline::new(test_config(&server), RecordingDecoder::default()).unwrap();
    let nav = redirected_with_code("auth-code");

    let (first, second) = tokio::join!(pipeline.run(&nav), pipeline.run(&nav));

    assert!(first.is_completed());
    assert!(matches!(second, RunOutcome::Busy));
    assert!(!pipeline.is_running());
}

#[tokio::test]
async fn run_ids_increase_per_run() {
    let server = MockServer::start().await;
    mount_platform_failing_at(&server, Some((Endpoint::Hubs, 500))).await;

    let pipeline = AcquisitionPipeline::new(test_config(&server), RecordingDecoder::default()).unwrap();
    let mut events = pipeline.subscribe();

    pipeline.run(&redirected_with_code("first")).await;
    let first: Vec<_> = drain(&mut events).iter().map(|e| e.run_id()).collect();

    server.reset().await;
    mount_platform_failing_at(&server, Some((Endpoint::Hubs, 500))).await;
    pipeline.run(&redirected_with_code("second")).await;
    let second: Vec<_> = drain(&mut events).iter().map(|e| e.run_id()).collect();

    assert!(first.iter().all(|id| id.0 == 1));
    assert!(second.iter().all(|id| id.0 == 2));
    assert!(!second.is_empty());
}
