use std::future::Future;

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use crate::command;
use crate::cursor::{CursorStore, WatermarkRecord};
use crate::forwarder::CommandSink;
use crate::platform::{ChatMessage, FeedEvent};

/// Outcome of one [`Pipeline::process_batch`] call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Messages not seen before
    pub fresh: usize,
    /// Commands handed to the sink
    pub forwarded: usize,
}

/// Turns feed deliveries into forwarded commands, recording progress in the
/// cursor store after every message.
///
/// Calls must be serialized; [`Pipeline::run`] does that by draining a single
/// channel.
pub struct Pipeline<S> {
    store: CursorStore,
    sink: S,
}

impl<S: CommandSink> Pipeline<S> {
    pub fn new(store: CursorStore, sink: S) -> Self {
        Self { store, sink }
    }

    #[cfg(test)]
    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Process a delivery from the feed.
    ///
    /// Messages up to the stored stop point are skipped; the rest are handled
    /// oldest-first. A cursor write failure aborts the remainder of the batch.
    pub async fn process_batch(
        &self,
        messages: Vec<ChatMessage>,
        newest_first: bool,
    ) -> Result<BatchReport> {
        let mut record = self.store.load().await;
        let fresh = select_fresh(&record, messages, newest_first);

        let mut report = BatchReport {
            fresh: fresh.len(),
            forwarded: 0,
        };
        if fresh.is_empty() {
            debug!("No new messages in batch");
            return Ok(report);
        }

        for message in &fresh {
            if let Some(command) = command::parse(message) {
                self.sink.send(&command).await;
                report.forwarded += 1;
            }

            record.advance(message);
            self.store
                .save(&record)
                .await
                .with_context(|| format!("Failed to record message {} as processed", message.id))?;
        }

        Ok(report)
    }

    /// Drain feed events until every sender is dropped or `shutdown`
    /// resolves. Shutdown is only observed between batches.
    pub async fn run<F>(&self, mut rx: mpsc::Receiver<FeedEvent>, shutdown: F)
    where
        F: Future<Output = ()>,
    {
        info!("Pipeline is running (cursor: {})", self.store.path().display());
        tokio::pin!(shutdown);

        loop {
            let event = tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, pipeline stopped");
                    return;
                }
                event = rx.recv() => match event {
                    Some(event) => event,
                    None => break,
                },
            };

            let (messages, newest_first) = event.into_batch();
            match self.process_batch(messages, newest_first).await {
                Ok(report) => debug!(
                    "Batch done: {} new, {} forwarded",
                    report.fresh, report.forwarded
                ),
                Err(e) => error!("Error processing batch: {:#}", e),
            }
        }

        info!("Feed closed, pipeline stopped");
    }
}

/// Pick the messages newer than the stored stop point, oldest first.
///
/// The scan walks newest to oldest and stops at the first message whose id is
/// the stop point; everything from there back was handled by an earlier run.
pub fn select_fresh(
    record: &WatermarkRecord,
    mut messages: Vec<ChatMessage>,
    newest_first: bool,
) -> Vec<ChatMessage> {
    if !newest_first {
        messages.reverse();
    }

    let mut fresh: Vec<ChatMessage> = messages
        .into_iter()
        .take_while(|m| !record.is_stop_point(&m.id))
        .collect();
    fresh.reverse();
    fresh
}
