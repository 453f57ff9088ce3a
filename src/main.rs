use std::io::Write;

use clap::Parser;

use ragstream::config;
use ragstream::logging;
use ragstream::orchestrator::RunEvent;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cfg = config::Config::parse();

    logging::setup_logging(&cfg.log_level)?;
    config::validate_config(&cfg)?;

    log::debug!("ragstream {}", ragstream::VERSION);

    let orchestrator = config::build_orchestrator(&cfg)?;
    let mut run = orchestrator.run(cfg.generation_request());

    let token = run.cancellation_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            log::info!("interrupt received, stopping");
            token.cancel();
        }
    });

    if let Some(limit) = cfg.stop_after {
        let token = run.cancellation_token();
        tokio::spawn(async move {
            tokio::time::sleep(limit).await;
            log::info!("stop-after elapsed ({})", humantime::format_duration(limit));
            token.cancel();
        });
    }

    let mut stdout = std::io::stdout();
    while let Some(event) = run.next_event().await {
        match event {
            RunEvent::Chunk(text) => {
                stdout.write_all(text.as_bytes())?;
                stdout.flush()?;
            }
            RunEvent::Completed { record, .. } => {
                writeln!(stdout)?;
                log::info!(
                    "done in {}ms (~{} tokens)",
                    record.duration_ms,
                    record.token_estimate
                );
                break;
            }
            RunEvent::Failed { message, .. } => {
                eprintln!("error: {}", message);
                orchestrator.flush_history().await;
                std::process::exit(1);
            }
            RunEvent::Cancelled => {
                log::warn!("cancelled before generation started");
                break;
            }
        }
    }

    orchestrator.flush_history().await;
    Ok(())
}
