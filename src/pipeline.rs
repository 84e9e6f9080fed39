//! End-to-end acquisition: authorize, resolve, convert, download, decode
//!
//! [`AcquisitionPipeline`] owns one of each component plus the token store
//! they share. A run is strictly linear and halts at the first failing stage;
//! the failure is logged and published as [`PipelineEvent::RunFailed`], never
//! propagated as a panic or an `Err` to the host.

use crate::auth::{AuthSession, NavigationContext, TokenStore};
use crate::broker::SecureDownloadBroker;
use crate::config::Config;
use crate::conversion::ConversionJobOrchestrator;
use crate::decode::ModelDecoder;
use crate::error::{Error, Result};
use crate::events::{EventBus, Subscription};
use crate::resolver::ResourceResolver;
use crate::types::{AuthorizationCode, PipelineEvent, RunId, Stage};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use url::Url;

/// User agent sent with every request
const USER_AGENT: &str = concat!("bim-acquire/", env!("CARGO_PKG_VERSION"));

/// How a call to [`AcquisitionPipeline::run`] ended
#[derive(Debug)]
pub enum RunOutcome<M> {
    /// Every stage succeeded; the model was also published to subscribers
    Completed(Arc<M>),
    /// A stage failed and no later stage was attempted
    Halted {
        /// The stage that failed
        stage: Stage,
        /// What went wrong
        error: Error,
    },
    /// The navigation context carries no usable authorization code yet
    NotAuthorized,
    /// Another run was already in flight; nothing was done
    Busy,
}

impl<M> RunOutcome<M> {
    /// The decoded model, if the run completed
    pub fn model(&self) -> Option<&Arc<M>> {
        match self {
            RunOutcome::Completed(model) => Some(model),
            _ => None,
        }
    }

    /// Whether the run completed
    pub fn is_completed(&self) -> bool {
        matches!(self, RunOutcome::Completed(_))
    }
}

/// A stage failure as seen by the run loop
struct StageFailure {
    stage: Stage,
    error: Error,
}

trait AtStage<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure>;
}

impl<T> AtStage<T> for Result<T> {
    fn at(self, stage: Stage) -> std::result::Result<T, StageFailure> {
        self.map_err(|error| StageFailure { stage, error })
    }
}

/// Clears the in-flight flag when a run ends, however it ends
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Composes the acquisition stages and notifies subscribers of the result
///
/// At most one run is in flight per pipeline. The access token lives only for
/// the duration of a run; every run needs a fresh authorization code.
pub struct AcquisitionPipeline<D: ModelDecoder> {
    config: Config,
    tokens: TokenStore,
    auth: AuthSession,
    resolver: ResourceResolver,
    conversion: ConversionJobOrchestrator,
    broker: SecureDownloadBroker,
    decoder: D,
    events: EventBus<D::Model>,
    running: AtomicBool,
    last_run: AtomicU64,
}

impl<D: ModelDecoder> AcquisitionPipeline<D> {
    /// Validate `config` and build the pipeline with its own HTTP client
    pub fn new(config: Config, decoder: D) -> Result<Self> {
        config.validate()?;

        let client = reqwest::Client::builder()
            .timeout(config.http.request_timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| Error::Other(format!("Failed to create HTTP client: {}", e)))?;

        Self::with_client(config, decoder, client)
    }

    /// Like [`new`](Self::new), but with a caller-supplied HTTP client
    pub fn with_client(config: Config, decoder: D, client: reqwest::Client) -> Result<Self> {
        config.validate()?;

        let tokens = TokenStore::new();
        let auth = AuthSession::new(
            client.clone(),
            config.credentials.clone(),
            config.auth.clone(),
            tokens.clone(),
        );
        let resolver = ResourceResolver::new(
            client.clone(),
            config.platform.clone(),
            config.resolver.clone(),
            tokens.clone(),
        );
        let conversion = ConversionJobOrchestrator::new(
            client.clone(),
            config.platform.clone(),
            config.conversion.clone(),
            tokens.clone(),
        );
        let broker = SecureDownloadBroker::new(client, config.broker.clone());
        let events = EventBus::new(config.events.capacity);

        Ok(Self {
            config,
            tokens,
            auth,
            resolver,
            conversion,
            broker,
            decoder,
            events,
            running: AtomicBool::new(false),
            last_run: AtomicU64::new(0),
        })
    }

    /// The configuration this pipeline was built with
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// The token store shared by this pipeline's components
    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    /// Receive events from runs started after this call
    pub fn subscribe(&self) -> Subscription<D::Model> {
        self.events.subscribe()
    }

    /// The event bus, for hosts that hand it to other tasks
    pub fn events(&self) -> &EventBus<D::Model> {
        &self.events
    }

    /// Whether a run is in flight
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Send the user to the provider's consent page
    ///
    /// The redirect back lands in `nav`; call [`run`](Self::run) with the same
    /// context afterwards.
    pub fn authorize(&self, nav: &dyn NavigationContext) -> Result<Url> {
        self.auth.begin_authorization(nav)
    }

    /// Alias of [`run`](Self::run), named after the host-facing action
    pub async fn search_resource(&self, nav: &dyn NavigationContext) -> RunOutcome<D::Model> {
        self.run(nav).await
    }

    /// Run the whole acquisition once
    ///
    /// Returns [`RunOutcome::Busy`] immediately if another run is in flight,
    /// and [`RunOutcome::NotAuthorized`] if `nav` carries no fresh code.
    pub async fn run(&self, nav: &dyn NavigationContext) -> RunOutcome<D::Model> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            tracing::info!("Acquisition already running; ignoring request");
            return RunOutcome::Busy;
        };

        let Some(code) = self.auth.extract_authorization_code(nav) else {
            tracing::info!("No authorization code available; authorize first");
            return RunOutcome::NotAuthorized;
        };

        let run_id = RunId(self.last_run.fetch_add(1, Ordering::Relaxed) + 1);
        tracing::info!(run_id = %run_id, "Acquisition started");
        self.events.emit(PipelineEvent::RunStarted { run_id });

        let outcome = match self.acquire(run_id, &code).await {
            Ok(model) => {
                let model = Arc::new(model);
                tracing::info!(run_id = %run_id, "Acquisition finished");
                self.events.emit(PipelineEvent::ProcessingFinished {
                    run_id,
                    model: Arc::clone(&model),
                });
                RunOutcome::Completed(model)
            }
            Err(StageFailure { stage, error }) => {
                tracing::warn!(
                    run_id = %run_id,
                    stage = %stage,
                    code = error.error_code(),
                    error = %error,
                    "Acquisition halted"
                );
                self.events.emit(PipelineEvent::RunFailed {
                    run_id,
                    stage,
                    code: error.error_code(),
                    message: error.to_string(),
                });
                RunOutcome::Halted { stage, error }
            }
        };

        self.tokens.clear().await;
        outcome
    }

    async fn acquire(
        &self,
        run_id: RunId,
        code: &AuthorizationCode,
    ) -> std::result::Result<D::Model, StageFailure> {
        let token = self
            .auth
            .exchange_code_for_token(code)
            .await
            .at(Stage::Authorize)?;
        self.stage_completed(run_id, Stage::Authorize);

        let hub = self.resolver.resolve_hub().await.at(Stage::ResolveHub)?;
        self.stage_completed(run_id, Stage::ResolveHub);

        let project = self
            .resolver
            .resolve_project(&hub)
            .await
            .at(Stage::ResolveProject)?;
        self.stage_completed(run_id, Stage::ResolveProject);

        let folder = self
            .resolver
            .resolve_folder(&project)
            .await
            .at(Stage::ResolveFolder)?;
        self.stage_completed(run_id, Stage::ResolveFolder);

        let file = self
            .resolver
            .resolve_file(&folder, self.resolver.target_file_suffix())
            .await
            .at(Stage::ResolveFile)?;
        self.stage_completed(run_id, Stage::ResolveFile);

        let job = self
            .conversion
            .submit_job(&file)
            .await
            .at(Stage::SubmitJob)?;
        self.stage_completed(run_id, Stage::SubmitJob);

        let derivative = self
            .conversion
            .await_completion(&job)
            .await
            .at(Stage::AwaitManifest)?;
        self.stage_completed(run_id, Stage::AwaitManifest);

        let credential = self
            .broker
            .mint_download_credential(&job, &derivative, &token)
            .await
            .at(Stage::MintCredential)?;
        self.stage_completed(run_id, Stage::MintCredential);

        let bytes = self
            .broker
            .download_artifact(&credential)
            .await
            .at(Stage::Download)?;
        self.stage_completed(run_id, Stage::Download);

        let model = self.decoder.decode(bytes).await.at(Stage::Decode)?;
        self.stage_completed(run_id, Stage::Decode);

        Ok(model)
    }

    fn stage_completed(&self, run_id: RunId, stage: Stage) {
        tracing::debug!(run_id = %run_id, stage = %stage, "Stage completed");
        self.events
            .emit(PipelineEvent::StageCompleted { run_id, stage });
    }
}
