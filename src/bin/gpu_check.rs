use causal_lm_runner::{AppConfig, diagnostics::GpuReport, telemetry::init_tracing};

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    init_tracing();
    let config = AppConfig::from_env()?;
    tracing::debug!(smi = %config.nvidia_smi_path.display(), "collecting GPU report");

    let report = GpuReport::collect(&config.nvidia_smi_path, config.gpu_query_timeout).await;
    print!("{report}");
    Ok(())
}
