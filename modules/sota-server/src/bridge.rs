//! JSON-lines bridge between a byte stream and a running `Sota`.
//!
//! One `Command` per line. The terminal event of each command is written back
//! as one JSON line. A line starting with `!` is submitted fire-and-forget and
//! writes nothing. Blank lines are ignored; malformed lines are logged and
//! skipped.

use anyhow::Result;
use sota_common::Command;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::warn;

use crate::runtime::Sota;

/// What happened to the lines of one session.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct BridgeStats {
    pub interpreted: usize,
    pub sent: usize,
    pub skipped: usize,
}

#[derive(Debug)]
enum Line {
    Interpret(Command),
    Send(Command),
}

fn parse_line(line: &str) -> Option<serde_json::Result<Line>> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    Some(match line.strip_prefix('!') {
        Some(rest) => serde_json::from_str(rest.trim()).map(Line::Send),
        None => serde_json::from_str(line).map(Line::Interpret),
    })
}

/// Feed every line of `input` to `sota` until EOF.
pub async fn serve_lines<R, W>(sota: &Sota, input: R, mut output: W) -> Result<BridgeStats>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut stats = BridgeStats::default();
    let mut lines = input.lines();

    while let Some(raw) = lines.next_line().await? {
        match parse_line(&raw) {
            None => {}
            Some(Err(e)) => {
                warn!(error = %e, "Skipping malformed command line");
                stats.skipped += 1;
            }
            Some(Ok(Line::Send(command))) => {
                sota.send(command).await?;
                stats.sent += 1;
            }
            Some(Ok(Line::Interpret(command))) => {
                let event = sota.interpret(command).await?;
                let mut json = serde_json::to_string(&event)?;
                json.push('\n');
                output.write_all(json.as_bytes()).await?;
                stats.interpreted += 1;
            }
        }
    }

    output.flush().await?;
    Ok(stats)
}
