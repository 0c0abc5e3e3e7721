//! `conductor` — replays an NDJSON file of commands and events through the
//! order fulfillment conductor.
//!
//! Usage: `conductor [FILE]`. Reads standard input when no file is given.

use std::process::ExitCode;

use conductor_runtime::input::{InputRecord, parse_line};
use conductor_runtime::{RunSummary, RuntimeConfig, RuntimeError, Stores, fulfillment_conductor};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> ExitCode {
    conductor_runtime::telemetry::init();

    match run().await {
        Ok(summary) if summary.saga_failures == 0 => ExitCode::SUCCESS,
        Ok(_) => ExitCode::from(2),
        Err(err) => {
            error!(error = %err, "conductor failed");
            ExitCode::FAILURE
        }
    }
}

async fn run() -> Result<RunSummary, RuntimeError> {
    info!("Starting conductor");

    let config = RuntimeConfig::load()?;
    let stores = Stores::connect(&config).await?;
    let conductor = fulfillment_conductor(stores, &config)?;

    let mut summary = conductor.resume().await;
    let replayed = match std::env::args().nth(1) {
        Some(path) => {
            info!(%path, "reading input file");
            let file = tokio::fs::File::open(&path).await?;
            replay(&conductor, BufReader::new(file)).await?
        }
        None => replay(&conductor, BufReader::new(tokio::io::stdin())).await?,
    };
    summary.absorb(&replayed);

    info!(
        events_published = summary.events_published,
        commands_dispatched = summary.commands_dispatched,
        saga_failures = summary.saga_failures,
        events_dropped = summary.events_dropped,
        "input replayed"
    );
    Ok(summary)
}

async fn replay<R>(
    conductor: &conductor_runtime::Conductor,
    reader: R,
) -> Result<RunSummary, RuntimeError>
where
    R: AsyncBufRead + Unpin,
{
    let mut total = RunSummary::default();
    let mut lines = reader.lines();
    let mut line_number = 0;
    while let Some(line) = lines.next_line().await? {
        line_number += 1;
        let Some(record) = parse_line(line_number, &line)? else {
            continue;
        };
        let summary = match record {
            InputRecord::Command(command) => {
                match conductor.submit_envelope(&command.into_envelope()).await {
                    Ok(summary) => summary,
                    Err(err) => {
                        warn!(line = line_number, error = %err, "command rejected");
                        continue;
                    }
                }
            }
            InputRecord::Event(event) => conductor.publish(*event).await,
        };
        total.absorb(&summary);
    }
    Ok(total)
}
