pub mod domain;
pub mod primitives;

pub use domain::{
    Block, Log, LogFilter, LogFilterError, LogSegment, LogTopicCombination, LogTopicFilter,
    NodeResponse, TooManyTopicsError, TopicFilterEntry, Transaction,
};
pub use primitives::{
    Address, ByteData, ByteData32, DataSize, HexError, HttpUrl, HttpUrlError, Timespan, Timestamp,
    UInt, UInt16, UInt64,
};
