use anyhow::{Context, Result};
use filestream::config::PipelineConfig;
use filestream::stream::Job;
use log::info;
use tokio::signal;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    let path = std::env::args()
        .nth(1)
        .context("usage: filestream <config.json>")?;
    let config = PipelineConfig::from_path(&path)?;

    let mut job = Job::from_config(&config).spawn();
    let job_id = job.job_id.clone();
    println!("Started job {}.", job_id);

    if let Some(stop) = job.stop_handle() {
        let job_id = job_id.clone();
        tokio::spawn(async move {
            if signal::ctrl_c().await.is_ok() {
                println!("Kill job {}.", job_id);
                stop.stop();
            }
        });
    }

    let summary = job.wait().await?;
    info!(
        "job {} done, produced {} consumed {}",
        job_id, summary.produced, summary.consumed
    );
    println!(
        "{} elements read, {} elements written",
        summary.produced, summary.consumed
    );
    Ok(())
}
