use anyhow::{Context, Result};
use chainpilot_cli::args::CliArgs;
use chainpilot_cli::commands;
use chainpilot_cli::context::AgentContext;
use chainpilot_config::AppConfig;
use clap::Parser;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = CliArgs::parse();
    init_tracing(cli.log_json);

    let config = AppConfig::load(&cli.config)
        .with_context(|| format!("failed to load {}", cli.config.display()))?;

    let cancel = CancellationToken::new();
    let ctx = AgentContext::connect(config, cli.network.as_deref(), cancel.clone())?;

    let shutdown = cancel.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            warn!(target: "chainpilot", "interrupt received, cancelling pending operations");
            shutdown.cancel();
        }
    });

    let output = commands::run(&ctx, cli.command).await?;
    println!("{}", serde_json::to_string_pretty(&output)?);

    info!(target: "chainpilot", "done");
    Ok(())
}

fn init_tracing(json: bool) {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info,chainpilot=info"));
    let builder = fmt().with_env_filter(env_filter).with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}
