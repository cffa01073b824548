//! synopsis-cluster: run one clustering job and report how it ended.

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use clap::Parser;
use uuid::Uuid;

use synopsis_api::{open_storage, AppConfig, SynopsisService};
use synopsis_core::JobStatus;
use synopsis_inference::OllamaBackend;
use synopsis_jobs::JobEvent;

#[derive(Parser)]
#[command(name = "synopsis-cluster")]
#[command(author, version, about = "Cluster one embedding batch with k-means")]
struct Cli {
    /// Batch whose embeddings are partitioned
    batch_id: String,

    /// Number of clusters
    #[arg(allow_negative_numbers = true)]
    k: i64,

    /// Job id to record (default: a fresh UUIDv7)
    #[arg(long)]
    job_id: Option<String>,

    /// Give up waiting after this many seconds
    #[arg(long, default_value_t = 600)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    synopsis_api::init_tracing("synopsis_api=info,synopsis_jobs=info");

    let cli = Cli::parse();
    let config = AppConfig::from_env()?;
    let storage = open_storage(&config).await?;
    let ollama = Arc::new(OllamaBackend::from_env()?);
    let service = SynopsisService::new(storage, ollama.clone(), ollama, config.service_options());

    let job_id = cli.job_id.unwrap_or_else(|| Uuid::now_v7().to_string());
    let mut events = service.scheduler().events();
    service
        .submit_clustering(&cli.batch_id, cli.k, &job_id)
        .await
        .context("failed to submit clustering job")?;

    let wait = async {
        loop {
            match events.recv().await {
                Ok(JobEvent::Completed { job_id: id, .. }) | Ok(JobEvent::Failed { job_id: id, .. })
                    if id == job_id =>
                {
                    break
                }
                Ok(_) => {}
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => {
                    if let Ok(Some(status)) = service.job_status(&job_id).await {
                        if status.is_terminal() {
                            break;
                        }
                    }
                }
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    };
    if tokio::time::timeout(Duration::from_secs(cli.timeout_secs), wait)
        .await
        .is_err()
    {
        bail!("job {job_id} still running after {}s", cli.timeout_secs);
    }

    let job = service
        .job(&job_id)
        .await?
        .with_context(|| format!("job {job_id} disappeared"))?;
    println!("{} {}", job.id, job.status);
    match job.status {
        JobStatus::Complete => Ok(()),
        JobStatus::Failed => bail!(
            "clustering failed: {}",
            job.error_message.unwrap_or_default()
        ),
        JobStatus::Running => bail!("job {job_id} is still running"),
    }
}
