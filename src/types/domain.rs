//! Domain entities: blocks, transactions, logs, and the filters used to
//! request them.

use std::collections::BTreeSet;

use thiserror::Error;

use super::primitives::{Address, ByteData, ByteData32, DataSize, Timespan, Timestamp, UInt16, UInt64};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Block {
    pub number: UInt64,
    pub timestamp: Timestamp,
    pub transactions: Vec<ByteData32>,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Transaction {
    pub hash: ByteData32,
    pub from: Address,
    pub to: Address,
    pub block_number: UInt64,
    pub transaction_index: UInt16,
}

/// Ordered sequence of at most 4 topics forming the topics a concrete log
/// actually carries.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LogTopicCombination(Vec<ByteData32>);

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("at most 4 topics are allowed, got {0}")]
pub struct TooManyTopicsError(usize);

impl LogTopicCombination {
    pub fn new(topics: Vec<ByteData32>) -> Result<Self, TooManyTopicsError> {
        if topics.len() > 4 {
            return Err(TooManyTopicsError(topics.len()));
        }
        Ok(Self(topics))
    }

    pub fn as_slice(&self) -> &[ByteData32] {
        &self.0
    }
}

/// One position in a `LogTopicFilter`: either an exact topic, or a set of
/// topics matched disjunctively.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TopicFilterEntry {
    Single(ByteData32),
    AnyOf(BTreeSet<ByteData32>),
}

/// Ordered sequence of at most 4 filter positions.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct LogTopicFilter(Vec<TopicFilterEntry>);

impl LogTopicFilter {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn new(entries: Vec<TopicFilterEntry>) -> Result<Self, TooManyTopicsError> {
        if entries.len() > 4 {
            return Err(TooManyTopicsError(entries.len()));
        }
        Ok(Self(entries))
    }

    pub fn as_slice(&self) -> &[TopicFilterEntry] {
        &self.0
    }

    /// Whether a concrete topic combination satisfies this filter:
    /// shorter combinations only match an all-wildcard filter.
    pub fn matches(&self, combination: &LogTopicCombination) -> bool {
        for (i, entry) in self.0.iter().enumerate() {
            match combination.as_slice().get(i) {
                None => return false,
                Some(topic) => match entry {
                    TopicFilterEntry::Single(expected) => {
                        if topic != expected {
                            return false;
                        }
                    }
                    TopicFilterEntry::AnyOf(set) => {
                        if !set.contains(topic) {
                            return false;
                        }
                    }
                },
            }
        }
        true
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogFilterError {
    #[error("fromBlock {from} is greater than toBlock {to}")]
    InvertedRange { from: u64, to: u64 },
    #[error(transparent)]
    TooManyTopics(#[from] TooManyTopicsError),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogFilter {
    pub from_block: UInt64,
    pub to_block: UInt64,
    pub addresses: BTreeSet<Address>,
    pub topics: LogTopicFilter,
}

impl LogFilter {
    pub fn new(
        from_block: UInt64,
        to_block: UInt64,
        addresses: BTreeSet<Address>,
        topics: LogTopicFilter,
    ) -> Result<Self, LogFilterError> {
        if from_block > to_block {
            return Err(LogFilterError::InvertedRange {
                from: from_block.get(),
                to: to_block.get(),
            });
        }
        Ok(Self {
            from_block,
            to_block,
            addresses,
            topics,
        })
    }

    /// Returns a copy of this filter narrowed to `[from_block, to_block]`,
    /// which must already lie within the original range.
    pub fn narrowed_to(&self, from_block: UInt64, to_block: UInt64) -> Self {
        Self {
            from_block,
            to_block,
            addresses: self.addresses.clone(),
            topics: self.topics.clone(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Log {
    pub address: Address,
    pub block_number: UInt64,
    pub log_index: UInt16,
    pub transaction_index: UInt16,
    pub topics: LogTopicCombination,
    pub data: ByteData,
    pub block_hash: ByteData32,
    pub transaction_hash: ByteData32,
}

/// A contiguous, fully-safe slice of log history returned by one
/// `eth_getLogs` call.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LogSegment {
    pub logs: Vec<Log>,
    pub from_block: UInt64,
    pub to_block: UInt64,
    pub latest_block: UInt64,
    pub safe_block: UInt64,
}

impl LogSegment {
    /// Builds a segment, sorting logs by `(block_number, log_index)` as
    /// the invariant requires. Panics if a log falls outside
    /// `[from_block, to_block]` — any such log is a decoding bug in
    /// `Node`, not a recoverable runtime condition.
    pub fn new(
        mut logs: Vec<Log>,
        from_block: UInt64,
        to_block: UInt64,
        latest_block: UInt64,
        safe_block: UInt64,
    ) -> Self {
        for log in &logs {
            assert!(
                log.block_number >= from_block && log.block_number <= to_block,
                "BUG: log block {} outside segment range [{}, {}]",
                log.block_number,
                from_block,
                to_block
            );
        }
        logs.sort_by_key(|l| (l.block_number, l.log_index));
        Self {
            logs,
            from_block,
            to_block,
            latest_block,
            safe_block,
        }
    }
}

/// Wraps a decoded RPC result with instrumentation measured by `Node`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NodeResponse<T> {
    pub data: T,
    pub size: DataSize,
    pub elapsed: Timespan,
}

impl<T> NodeResponse<T> {
    pub fn new(data: T, size: DataSize, elapsed: Timespan) -> Self {
        Self { data, size, elapsed }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> NodeResponse<U> {
        NodeResponse {
            data: f(self.data),
            size: self.size,
            elapsed: self.elapsed,
        }
    }
}
