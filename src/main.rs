use clap::Parser;

use causal_lm_runner::{
    AppConfig, Cli, ExecutionPlan, ModelSource, TorchBackend, generate, load,
    model::{ModelBackend, format_with_system},
    telemetry::init_tracing,
};

fn main() -> anyhow::Result<()> {
    init_tracing();
    let cli = Cli::parse();
    let config = AppConfig::from_env()?;

    let backend = TorchBackend;
    let request = cli.load_request();
    let plan = ExecutionPlan::resolve(&request, backend.gpu_available(), config.quant_group_size);
    let source = ModelSource::resolve(&request.model_id, &config)?;

    let loaded = load(&backend, &source, plan)?;
    tracing::info!(metadata = ?loaded.model.metadata(), "model ready");

    let prompt = format_with_system(&loaded.tokenizer, cli.system.as_deref(), &cli.prompt);
    let generation = cli.generation_request(prompt, &config);
    let result = generate(&loaded.tokenizer, &loaded.model, &generation)?;
    tracing::info!(
        tokens = result.tokens_generated,
        elapsed_ms = result.total_time_ms as u64,
        tokens_per_second = result.tokens_per_second,
        "generation complete"
    );

    // The chat template may echo the prompt; the full sequence is printed as is.
    println!("{}", result.text);
    Ok(())
}
