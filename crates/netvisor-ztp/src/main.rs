//! netvisor-ztp entry point.
//!
//! Loads the run configuration, provisions the fabric and writes one JSON
//! envelope per switch to stdout or the `--report` file.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

use netvisor_cli_common::{CliTransport, LocalTransport, SshTransport};
use netvisor_ztp::{Envelope, FabricPlan, Provisioner, TransportKind, ZtpConfig};

/// Zero-touch provisioning of a Netvisor leaf/spine fabric
#[derive(Parser, Debug)]
#[command(name = "netvisor-ztp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Run configuration (TOML)
    #[arg(short = 'c', long)]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error); RUST_LOG takes precedence
    #[arg(short = 'l', long, default_value = "info")]
    log_level: String,

    /// Override the configured transport (local or ssh)
    #[arg(long)]
    transport: Option<TransportKind>,

    /// Write the JSON envelopes here instead of stdout
    #[arg(long)]
    report: Option<PathBuf>,
}

fn init_logging(level: &str) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_writer(io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to set tracing subscriber")?;
    Ok(())
}

fn transport(config: &ZtpConfig) -> Arc<dyn CliTransport> {
    match config.transport.kind {
        TransportKind::Local => Arc::new(LocalTransport),
        TransportKind::Ssh => Arc::new(SshTransport::new(
            config.transport.ssh_user.clone(),
            config.transport.ssh_options.clone(),
        )),
    }
}

fn write_envelopes(envelopes: &[Envelope], path: Option<&PathBuf>) -> anyhow::Result<()> {
    match path {
        Some(path) => {
            let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, envelopes)?;
            writer.write_all(b"\n")?;
            writer.flush()?;
        }
        None => {
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for envelope in envelopes {
                serde_json::to_writer(&mut out, envelope)?;
                out.write_all(b"\n")?;
            }
        }
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let mut config = ZtpConfig::from_file(&args.config)
        .with_context(|| format!("Failed to load {}", args.config.display()))?;
    if let Some(kind) = args.transport {
        config.transport.kind = kind;
    }
    info!(
        "Fabric {}: {} spines, {} leaves, {:?} mode over {}",
        config.fabric_name,
        config.spine_list.len(),
        config.leaf_list.len(),
        config.mode,
        config.transport.kind
    );
    let transport = transport(&config);
    let plan = FabricPlan::from_config(config)?;

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    let signal_handle = tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => {
                warn!("Received SIGINT, cancelling the run");
                on_signal.cancel();
            }
            Err(err) => error!("Failed to listen for ctrl-c: {}", err),
        }
    });

    let summary = Provisioner::new(plan, transport)
        .with_cancellation(cancel)
        .run()
        .await;
    signal_handle.abort();

    write_envelopes(&summary.report.envelopes(), args.report.as_ref())?;
    if let Some(err) = &summary.error {
        error!("Provisioning failed: {}", err);
    }
    Ok(summary.succeeded())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = init_logging(&args.log_level) {
        eprintln!("netvisor-ztp: {:#}", err);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(true) => {
            info!("Provisioning complete");
            ExitCode::SUCCESS
        }
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            error!("{:#}", err);
            ExitCode::FAILURE
        }
    }
}
