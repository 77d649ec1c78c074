use anyhow::Context;
use ro_engine::{run_job, JobSpec};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let path = std::env::args()
        .nth(1)
        .context("usage: ro-run <job.json>")?;
    let json = tokio::fs::read_to_string(&path)
        .await
        .with_context(|| format!("reading job file {path}"))?;
    let spec = JobSpec::from_json(&json).with_context(|| format!("parsing job file {path}"))?;

    let report = run_job(spec).await?;
    println!("{}", report.to_json()?);

    if !report.is_success() {
        std::process::exit(2);
    }
    Ok(())
}
