use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use bouncer_metrics::prometheus::{PrometheusConfig, PrometheusExporter};
use clap::Parser;
use tokio::sync::watch;
use tracing::{info, warn};

use pushgw_bouncer::config::{Overrides, Settings};
use pushgw_bouncer::context::AppContext;
use pushgw_bouncer::scheduler::Scheduler;
use pushgw_bouncer::telemetry;

#[derive(Parser, Debug)]
#[command(name = "pushgw-bouncer", version)]
#[command(about = "Restart containers whose Pushgateway metrics have gone stale")]
struct Args {
    /// Path to the YAML config file (default: config.yml, if present)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Pushgateway URL (e.g., "http://retro:9091")
    #[arg(long)]
    pushgw: Option<String>,

    /// Interval between checks (e.g., "60s", "5m", or whole seconds)
    #[arg(long)]
    check_interval: Option<String>,

    /// Address for the Prometheus metrics endpoint
    #[arg(long)]
    listen_addr: Option<String>,

    /// Log level (error|warn|info|debug|trace)
    #[arg(long)]
    log_level: Option<String>,

    /// Location of the LXD unix socket
    #[arg(long)]
    socket_lxd: Option<PathBuf>,

    /// Location of the Docker unix socket
    #[arg(long)]
    socket_docker: Option<PathBuf>,

    /// Log remediation instead of performing it
    #[arg(long)]
    dry_run: bool,

    /// Run a single check and exit
    #[arg(long)]
    once: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            pushgw: self.pushgw.clone(),
            check_interval: self.check_interval.clone(),
            listen_addr: self.listen_addr.clone(),
            log_level: self.log_level.clone(),
            socket_lxd: self.socket_lxd.clone(),
            socket_docker: self.socket_docker.clone(),
            dry_run: self.dry_run,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let settings = Settings::load(args.config.as_deref(), &args.overrides())
        .context("failed to load configuration")?;
    telemetry::init_tracing(&settings.log_level, settings.log_format);

    info!(pushgateway = %settings.push_gw, dry_run = settings.dry_run, "Starting pushgw-bouncer");
    for rejected in &settings.rejected {
        warn!(monitor = %rejected.monitor(), error = %rejected, "Invalid monitor, it will not be checked");
    }

    let ctx = AppContext::build(settings)
        .await
        .context("failed to connect remediation backend")?;
    let source = Arc::new(
        ctx.pushgateway()
            .context("failed to build Pushgateway client")?,
    );
    let mut scheduler = Scheduler::new(
        source,
        ctx.monitors(),
        ctx.counters.clone(),
        ctx.settings.check_interval,
    )
    .with_missing_data_policy(ctx.settings.on_missing_data);

    if args.once {
        let report = scheduler.tick().await;
        if report.fetch_failed {
            bail!("failed to fetch metrics from {}", ctx.settings.push_gw);
        }
        return Ok(());
    }

    let exporter = PrometheusExporter::new(
        PrometheusConfig::builder()
            .listen_addr(ctx.settings.listen_addr.clone())
            .build(),
        ctx.counters.clone(),
    );
    let server = exporter
        .start_server()
        .await
        .with_context(|| format!("failed to listen on {}", ctx.settings.listen_addr))?;

    let (stop_tx, stop_rx) = watch::channel(false);
    let scheduler_task = tokio::spawn(scheduler.run(stop_rx));

    shutdown_signal().await;
    info!("Shutdown requested, finishing current check");
    let _ = stop_tx.send(true);

    scheduler_task.await.context("scheduler task failed")?;
    server.abort();
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Unable to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Unable to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}
