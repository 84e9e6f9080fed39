//! # bim-acquire
//!
//! Acquisition pipeline that pulls a building model out of a cloud
//! document-management platform, has the platform convert it to IFC, and hands
//! the decoded result to whoever is listening.
//!
//! ## Design Philosophy
//!
//! bim-acquire is designed to be:
//! - **Linear and fail-fast** - Each stage runs once, the first failure halts the run
//! - **Host-agnostic** - The OAuth redirect goes through a [`NavigationContext`],
//!   so browsers, terminals and servers plug in their own callback handling
//! - **Library-first** - No UI; hosts call [`AcquisitionPipeline::authorize`] and
//!   [`AcquisitionPipeline::run`] and subscribe to [`PipelineEvent`]s
//! - **Bounded** - Manifest polling has a fixed interval and an attempt limit
//!
//! ## Quick Start
//!
//! ```no_run
//! use bim_acquire::{AcquisitionPipeline, Config, ManualNavigation, PipelineEvent, StepModelDecoder};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::load("bim-acquire.json").await?;
//!     let pipeline = AcquisitionPipeline::new(config, StepModelDecoder::new()?)?;
//!
//!     // Subscribe before running; late subscribers miss earlier events
//!     let mut events = pipeline.subscribe();
//!     tokio::spawn(async move {
//!         while let Some(event) = events.recv().await {
//!             if let PipelineEvent::ProcessingFinished { model, .. } = event {
//!                 println!("loaded {} entities ({})", model.entity_count, model.schema);
//!             }
//!         }
//!     });
//!
//!     let nav = ManualNavigation::new();
//!     let url = pipeline.authorize(&nav)?;
//!     println!("open {url} and paste the address you are sent back to");
//!     // ... nav.complete_redirect_str(&pasted)?;
//!
//!     pipeline.run(&nav).await;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::unwrap_used)]
#![warn(clippy::expect_used)]

/// OAuth2 authorization-code flow and token storage
pub mod auth;
/// Download broker (credential minting and artifact fetch)
pub mod broker;
/// Configuration types
pub mod config;
/// Translation job submission and manifest polling
pub mod conversion;
/// Model decoding collaborator
pub mod decode;
/// Error types
pub mod error;
/// Pipeline event publish/subscribe
pub mod events;
/// Stage composition and run control
pub mod pipeline;
/// Bounded fixed-interval polling
pub mod poll;
/// Hub/project/folder/file resolution
pub mod resolver;
/// Core types
pub mod types;

// Re-export commonly used types
pub use auth::{AuthSession, ManualNavigation, NavigationContext, TokenStore};
pub use broker::SecureDownloadBroker;
pub use config::Config;
pub use conversion::ConversionJobOrchestrator;
pub use decode::{IfcModel, ModelDecoder, StepModelDecoder};
pub use error::{AuthError, BrokerError, ConversionError, Error, ResolveError, Result};
pub use events::{EventBus, Subscription};
pub use pipeline::{AcquisitionPipeline, RunOutcome};
pub use resolver::ResourceResolver;
pub use types::{
    AccessToken, AuthorizationCode, DerivativeUrn, FileIdentifier, FolderRef, HubRef, JobUrn,
    ManifestState, PipelineEvent, ProjectRef, RunId, SignedDownloadCredential, Stage,
};
