use clap::{Parser, Subcommand};
use miette::{IntoDiagnostic, Result};
use order_relay::config::Config;
use order_relay::logging;
use order_relay::relay::Relay;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Scan every branch inbox once and queue new orders
    Scan,
    /// Drain the submission queue once
    Submit,
    /// Move quarantined files back for another attempt
    Retry,
    /// Email the failed ledgers of every branch
    Notify,
    /// Run all jobs on their schedules until Ctrl-C
    Run,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init();

    let config = Config::from_env().into_diagnostic()?;
    let relay = Relay::connect(config).await.into_diagnostic()?;

    match cli.command {
        Command::Scan => {
            let report = relay.scan().await.into_diagnostic()?;
            println!(
                "scanned {} file(s): {} queued, {} blocked, {} skipped, {} failed",
                report.seen, report.queued, report.blocked, report.skipped, report.failed
            );
        }
        Command::Submit => {
            let report = relay.submit().await.into_diagnostic()?;
            println!(
                "received {} message(s): {} succeeded, {} voided, {} failed, {} duplicate, {} dropped",
                report.received,
                report.succeeded,
                report.voided,
                report.failed,
                report.duplicates,
                report.dropped
            );
        }
        Command::Retry => {
            let report = relay.retry().await.into_diagnostic()?;
            println!(
                "readmitted {} file(s), dead-lettered {}, moved {} failed log(s)",
                report.readmitted, report.dead_lettered, report.logs_moved
            );
        }
        Command::Notify => {
            let report = relay.notify().await.into_diagnostic()?;
            println!(
                "sent {} email(s) with {} attachment(s)",
                report.emails_sent, report.attachments
            );
        }
        Command::Run => {
            let shutdown = CancellationToken::new();
            let on_signal = shutdown.clone();
            tokio::spawn(async move {
                match tokio::signal::ctrl_c().await {
                    Ok(()) => {
                        info!("Ctrl-C received, finishing current ticks");
                        on_signal.cancel();
                    }
                    Err(e) => warn!(error = %e, "cannot listen for Ctrl-C"),
                }
            });
            relay.run(shutdown).await.into_diagnostic()?;
        }
    }

    Ok(())
}
