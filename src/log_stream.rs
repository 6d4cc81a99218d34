//! `LogStream`: advances a block-range cursor over a `Client`, handing
//! each fetched segment to a user handler while the next fetch is
//! already in flight.

use std::collections::BTreeSet;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::sync::Mutex;

use crate::client::Client;
use crate::error::ErrorKind;
use crate::types::{Address, LogSegment, LogTopicFilter, Timespan, UInt64};

/// Injected sink for completed segments, mirroring the teacher's
/// pattern of a trait-object callback rather than a bare closure so it
/// stays object-safe behind an `Arc`.
#[async_trait]
pub trait LogHandler: Send + Sync {
    async fn handle(&self, segment: LogSegment, client: &Client);
}

pub struct LogStreamConfig {
    pub handler: Arc<dyn LogHandler>,
    pub client: Arc<Client>,
    pub from_block: UInt64,
    pub addresses: BTreeSet<Address>,
    pub topics: LogTopicFilter,
    pub interval: Timespan,
    pub log_range: UInt64,
}

impl LogStreamConfig {
    /// `log_range` defaults to the widest `log_range_boundary` among
    /// `client`'s configured endpoints; override with a direct field
    /// assignment if a narrower fixed window is wanted.
    pub fn new(handler: Arc<dyn LogHandler>, client: Arc<Client>) -> Self {
        let log_range = client.max_log_range_boundary();
        Self {
            handler,
            client,
            from_block: UInt64::new(0).unwrap(),
            addresses: BTreeSet::new(),
            topics: LogTopicFilter::empty(),
            interval: Timespan::from_secs(6),
            log_range,
        }
    }
}

struct StreamState {
    reader_block_number: UInt64,
    reader_output: Option<LogSegment>,
    processor_input: Option<LogSegment>,
}

pub struct LogStream {
    handler: Arc<dyn LogHandler>,
    client: Arc<Client>,
    addresses: BTreeSet<Address>,
    topics: LogTopicFilter,
    interval: Timespan,
    log_range: UInt64,
    state: Mutex<StreamState>,
}

impl LogStream {
    pub fn new(config: LogStreamConfig) -> Self {
        Self {
            handler: config.handler,
            client: config.client,
            addresses: config.addresses,
            topics: config.topics,
            interval: config.interval,
            log_range: config.log_range,
            state: Mutex::new(StreamState {
                reader_block_number: config.from_block,
                reader_output: None,
                processor_input: None,
            }),
        }
    }

    async fn read_logs(&self) {
        let mut state = self.state.lock().await;
        if state.reader_output.is_some() {
            return;
        }
        let from_block = state.reader_block_number;
        let to_block = UInt64::new(
            from_block.get().saturating_add(self.log_range.get()).saturating_sub(1),
        )
        .unwrap_or(UInt64::new(u64::MAX).unwrap());
        let filter = match crate::types::LogFilter::new(
            from_block,
            to_block,
            self.addresses.clone(),
            self.topics.clone(),
        ) {
            Ok(f) => f,
            Err(e) => {
                tracing::warn!(error = %e, "log stream built an invalid filter");
                return;
            }
        };
        drop(state);

        match self.client.get_logs(&filter).await {
            Ok(response) => {
                let mut state = self.state.lock().await;
                state.reader_block_number = UInt64::new(response.data.to_block.get().saturating_add(1))
                    .unwrap_or(UInt64::new(u64::MAX).unwrap());
                state.reader_output = Some(response.data);
            }
            Err(err) => {
                tracing::warn!(error = %err, "log stream fetch failed, retrying same window");
            }
        }
    }

    async fn process_logs(&self) {
        let segment = {
            let mut state = self.state.lock().await;
            state.processor_input.take()
        };
        if let Some(segment) = segment {
            self.handler.handle(segment, &self.client).await;
        }
    }

    async fn advance_slots(&self) {
        let mut state = self.state.lock().await;
        if state.processor_input.is_none() {
            state.processor_input = state.reader_output.take();
        }
    }

    /// Runs the fetch/handle loop until `cancel` reports `true`,
    /// checked at the interval boundary. Pass a receiver that never
    /// fires to run indefinitely.
    pub async fn run(&self, mut cancel: watch::Receiver<bool>) {
        loop {
            tokio::join!(self.read_logs(), self.process_logs());
            self.advance_slots().await;
            if *cancel.borrow() {
                return;
            }
            tokio::select! {
                _ = tokio::time::sleep(self.interval.as_duration()) => {}
                _ = cancel.changed() => {
                    if *cancel.borrow() {
                        return;
                    }
                }
            }
        }
    }

    /// Returns an error if cancelled without ever stopping cleanly is
    /// not applicable here; provided for callers that do not need
    /// cancellation.
    pub async fn run_forever(&self) -> Result<(), ErrorKind> {
        let (_tx, rx) = watch::channel(false);
        self.run(rx).await;
        Ok(())
    }
}
