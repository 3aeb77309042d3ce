use std::sync::Arc;

use anyhow::Result;
use clap::Parser;
use tokio::sync::watch;

use watchmove::{cli::Cli, consumer::run_consumer, Poller};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    cli.setup_logging()?;

    tracing::info!("The application is starting...");

    let config = cli.to_config()?;
    if let Err(err) = config.validate() {
        tracing::error!("{err:#}");
        eprintln!("Error: {err:#}");
        std::process::exit(1);
    }

    let action = Arc::new(cli.action(&config)?);

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let shutdown_tx = Arc::new(shutdown_tx);
    let signal_tx = Arc::clone(&shutdown_tx);
    ctrlc::set_handler(move || {
        let _ = signal_tx.send(true);
    })?;

    let (poller, outputs) = Poller::new(config.lister(), config.poll_interval());
    let stats = outputs.stats();
    let poller_task = tokio::spawn(poller.watch(shutdown_rx.clone()));
    let mut consumer_task = tokio::spawn(run_consumer(outputs, action, shutdown_rx.clone()));

    tracing::info!(
        src = %config.watch_dir.display(),
        dst = %config.destination_dir.display(),
        "The application is started."
    );

    // Wait for Ctrl+C or for the consumer to give up on a poller error
    let mut stop = shutdown_rx;
    let finished = tokio::select! {
        _ = stop.changed() => None,
        result = &mut consumer_task => Some(result),
    };
    let _ = shutdown_tx.send(true);

    let consumer_result = match finished {
        Some(result) => result,
        None => consumer_task.await,
    };
    poller_task.await?;

    tracing::info!(
        polls = stats.polls(),
        batches_dropped = stats.batches_dropped(),
        files_dropped = stats.files_dropped(),
        "The application is stopped."
    );

    match consumer_result? {
        Ok(report) => {
            tracing::info!(
                processed = report.processed,
                failed = report.failed,
                skipped = report.skipped,
                "consumer summary"
            );
            Ok(())
        }
        Err(err) => {
            tracing::error!("{err:#}");
            Err(err)
        }
    }
}
