use std::io::BufRead;
use std::thread::JoinHandle;

use anyhow::{Context, Result};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use super::{ChatMessage, FeedEvent};

/// Decode a single feed line: an array is the connect-time backlog, an object
/// is a live message.
///
/// The backlog is cut to `history_limit` entries, keeping the newest ones.
/// Backlog entries that don't decode are logged and dropped on their own so
/// the rest of the batch still gets through.
pub fn parse_line(line: &str, history_limit: usize) -> Result<FeedEvent> {
    let value: Value = serde_json::from_str(line).context("Feed line is not valid JSON")?;

    match value {
        Value::Array(mut entries) => {
            entries.truncate(history_limit);
            let messages = entries
                .into_iter()
                .enumerate()
                .filter_map(|(index, entry)| decode_backlog_entry(index, entry))
                .collect();
            Ok(FeedEvent::Backlog(messages))
        }
        Value::Object(_) => {
            let message = serde_json::from_value(value).context("Invalid live message")?;
            Ok(FeedEvent::Live(message))
        }
        _ => anyhow::bail!("Expected a message object or an array of messages"),
    }
}

fn decode_backlog_entry(index: usize, entry: Value) -> Option<ChatMessage> {
    let id = entry
        .get("id")
        .map(|id| id.to_string())
        .unwrap_or_else(|| "<none>".to_string());

    match serde_json::from_value(entry) {
        Ok(message) => Some(message),
        Err(e) => {
            warn!("Skipping backlog entry {} (id {}): {}", index, id, e);
            None
        }
    }
}

/// Read the line-delimited JSON feed until EOF, pushing every decoded event
/// onto `tx`. Blocks the calling thread.
///
/// Malformed lines are logged and skipped. Returns early if the receiving
/// side has gone away.
pub fn run<R: BufRead>(
    reader: R,
    history_limit: usize,
    tx: &mpsc::Sender<FeedEvent>,
) -> Result<()> {
    info!("Starting JSON-lines feed (history limit {})...", history_limit);

    let mut line_no = 0usize;
    for line in reader.lines() {
        let line = line.context("Failed to read from feed")?;
        line_no += 1;
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let event = match parse_line(line, history_limit) {
            Ok(event) => event,
            Err(e) => {
                warn!("Skipping malformed feed line {}: {:#}", line_no, e);
                continue;
            }
        };

        debug!("Feed line {} decoded", line_no);
        if tx.blocking_send(event).is_err() {
            info!("Pipeline closed, stopping feed");
            return Ok(());
        }
    }

    info!("Feed ended after {} lines", line_no);
    Ok(())
}

/// Run the feed on a dedicated thread.
///
/// Blocking reads (stdin in particular) can't be cancelled, so the thread is
/// detached from the async runtime: shutdown never waits on it, and it dies
/// with the process.
pub fn spawn<R>(
    reader: R,
    history_limit: usize,
    tx: mpsc::Sender<FeedEvent>,
) -> Result<JoinHandle<()>>
where
    R: BufRead + Send + 'static,
{
    std::thread::Builder::new()
        .name("topicrelay-feed".to_string())
        .spawn(move || {
            if let Err(e) = run(reader, history_limit, &tx) {
                error!("Feed failed: {:#}", e);
            }
        })
        .context("Failed to start feed reader thread")
}
