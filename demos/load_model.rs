//! Terminal host for the acquisition pipeline
//!
//! This example shows a non-browser host driving the whole flow:
//! - Loading configuration from a file, or defaults plus environment credentials
//! - Printing the authorization URL instead of redirecting a browser
//! - Reading the pasted redirect-back address from stdin
//! - Running the pipeline and printing what subscribers receive
//!
//! ```bash
//! APS_CLIENT_ID=... APS_CLIENT_SECRET=... cargo run --example load_model
//! cargo run --example load_model -- bim-acquire.json
//! ```

use bim_acquire::config::ClientCredentials;
use bim_acquire::{
    AcquisitionPipeline, Config, ManualNavigation, PipelineEvent, RunOutcome, StepModelDecoder,
};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("bim_acquire=info")),
        )
        .init();

    let mut config = match std::env::args().nth(1) {
        Some(path) => Config::load(path).await?,
        None => Config::default(),
    };
    if !config.credentials.is_complete() {
        config.credentials = ClientCredentials::from_env();
    }

    let pipeline = AcquisitionPipeline::new(config, StepModelDecoder::new()?)?;
    println!(
        "Looking for *{} under {}",
        pipeline.config().resolver.target_file_suffix,
        pipeline.config().platform.base_url
    );

    let mut events = pipeline.events().subscribe();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                PipelineEvent::RunStarted { run_id } => println!("▶ run {run_id} started"),
                PipelineEvent::StageCompleted { stage, .. } => println!("  ✓ {stage}"),
                PipelineEvent::RunFailed {
                    stage, code, message, ..
                } => {
                    println!("  ✗ {stage} failed [{code}]: {message}");
                    break;
                }
                PipelineEvent::ProcessingFinished { model, .. } => {
                    println!(
                        "■ model ready: schema {}, {} entities, {} walls",
                        model.schema,
                        model.entity_count,
                        model.count_of("IFCWALL")
                    );
                    break;
                }
            }
        }
    });

    let nav = ManualNavigation::new();
    let url = pipeline.authorize(&nav)?;
    println!("Open this URL in a browser and sign in:\n\n  {url}\n");
    println!("Then paste the full address you were redirected to:");

    let mut line = String::new();
    BufReader::new(tokio::io::stdin()).read_line(&mut line).await?;
    nav.complete_redirect_str(&line)?;

    match pipeline.run(&nav).await {
        RunOutcome::Completed(_) => {}
        RunOutcome::Halted { stage, error } => {
            eprintln!("acquisition stopped at {stage}: {error}");
        }
        RunOutcome::NotAuthorized => {
            eprintln!("that address carries no authorization code");
        }
        RunOutcome::Busy => eprintln!("another acquisition is already running"),
    }

    // Closes the event bus so the printer sees the end of the stream
    drop(pipeline);
    printer.await?;
    Ok(())
}
