//! `SafeNode`: the reliability facade over one [`Node`] and its
//! [`RequestValve`]. Every operation clears valve admission first and
//! reports outcomes back to the valve afterward.

use std::sync::Arc;

use async_trait::async_trait;

use crate::clock::Clock;
use crate::config::EthEndpoint;
use crate::error::ErrorKind;
use crate::node::Node;
use crate::transport::HttpTransport;
use crate::types::{
    ByteData32, Block, LogFilter, LogSegment, NodeResponse, Transaction, UInt, UInt64,
};
use crate::valve::RequestValve;
use serde_json::Value;

const SINGLE_CALL_TOKENS: u64 = 1;
const GET_LOGS_TOKENS: u64 = 2;

/// The typed operation surface `Gateway` dispatches across a tier of
/// nodes. One method per RPC kind, realizing "dispatch by method name"
/// from the source as ordinary trait methods instead.
#[async_trait]
pub trait RpcCapability: Send + Sync {
    async fn get_block_number(&self) -> Result<NodeResponse<UInt64>, ErrorKind>;
    async fn get_block_by_number(&self, number: UInt64) -> Result<NodeResponse<Block>, ErrorKind>;
    async fn get_transaction_by_hash(
        &self,
        hash: ByteData32,
    ) -> Result<NodeResponse<Transaction>, ErrorKind>;
    async fn get_logs(&self, filter: &LogFilter) -> Result<NodeResponse<LogSegment>, ErrorKind>;
    async fn call(&self, method: &str, params: Value) -> Result<NodeResponse<Value>, ErrorKind>;
}

#[derive(Debug)]
pub struct SafeNode {
    node: Node,
    valve: RequestValve,
}

impl SafeNode {
    pub fn new(endpoint: EthEndpoint, transport: Arc<dyn HttpTransport>, clock: Arc<dyn Clock>) -> Self {
        let valve = RequestValve::new(endpoint.clone(), clock);
        let node = Node::new(endpoint, transport);
        Self { node, valve }
    }

    pub fn endpoint(&self) -> &EthEndpoint {
        self.node.endpoint()
    }

    async fn _safe_block_info(&self) -> Result<UInt64, ErrorKind> {
        let response = self.node.get_block_number().await?;
        self.valve.set_latest_block(response.data).await;
        Ok(response.data)
    }

    /// Narrows `filter` to the range the valve currently trusts:
    /// `[filter.from_block, min(from_block + log_range - 1, filter.to_block, safe_block)]`.
    async fn _make_safe_filter(&self, filter: &LogFilter) -> Result<(LogFilter, UInt64, UInt64), ErrorKind> {
        let latest = self._safe_block_info().await?;
        let safe_block = self
            .valve
            .safe_block_number()
            .await
            .ok_or(ErrorKind::UnsafeBlock)?;
        if safe_block < filter.from_block {
            return Err(ErrorKind::UnsafeBlock);
        }
        let log_range = self.valve.log_range().await;
        let tentative_to = UInt64::new(
            filter
                .from_block
                .get()
                .saturating_add(log_range.get())
                .saturating_sub(1),
        )
        .unwrap_or(UInt64::new(u64::MAX).unwrap());
        let effective_to = tentative_to.min(filter.to_block).min(safe_block);
        Ok((filter.narrowed_to(filter.from_block, effective_to), latest, safe_block))
    }
}

#[async_trait]
impl RpcCapability for SafeNode {
    async fn get_block_number(&self) -> Result<NodeResponse<UInt64>, ErrorKind> {
        self.valve.open(UInt::new(SINGLE_CALL_TOKENS).unwrap(), None).await?;
        match self.node.get_block_number().await {
            Ok(response) => {
                self.valve.set_latest_block(response.data).await;
                Ok(response)
            }
            Err(err) => {
                self.valve.report_error(&err).await;
                Err(err)
            }
        }
    }

    async fn get_block_by_number(&self, number: UInt64) -> Result<NodeResponse<Block>, ErrorKind> {
        self.valve
            .open(UInt::new(SINGLE_CALL_TOKENS).unwrap(), Some(number))
            .await?;
        match self.node.get_block_by_number(number).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.valve.report_error(&err).await;
                Err(err)
            }
        }
    }

    async fn get_transaction_by_hash(
        &self,
        hash: ByteData32,
    ) -> Result<NodeResponse<Transaction>, ErrorKind> {
        self.valve.open(UInt::new(SINGLE_CALL_TOKENS).unwrap(), None).await?;
        match self.node.get_transaction_by_hash(hash).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.valve.report_error(&err).await;
                Err(err)
            }
        }
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<NodeResponse<LogSegment>, ErrorKind> {
        self.valve.open(UInt::new(GET_LOGS_TOKENS).unwrap(), Some(filter.from_block)).await?;

        let (safe_filter, latest, safe_block) = match self._make_safe_filter(filter).await {
            Ok(v) => v,
            Err(err) => {
                self.valve.give_back_quota(UInt::new(1).unwrap()).await;
                return Err(err);
            }
        };

        match self.node.get_logs(&safe_filter).await {
            Ok(response) => {
                let segment = LogSegment::new(
                    response.data,
                    safe_filter.from_block,
                    safe_filter.to_block,
                    latest,
                    safe_block,
                );
                let wrapped = NodeResponse::new(segment, response.size, response.elapsed);
                self.valve.update_log_range(&wrapped).await;
                Ok(wrapped)
            }
            Err(err) => {
                self.valve.report_error(&err).await;
                Err(err)
            }
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<NodeResponse<Value>, ErrorKind> {
        self.valve.open(UInt::new(SINGLE_CALL_TOKENS).unwrap(), None).await?;
        match self.node.call(method, params).await {
            Ok(response) => Ok(response),
            Err(err) => {
                self.valve.report_error(&err).await;
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::FakeClock;
    use crate::transport::{MockHttpTransport, RawHttpResponse};
    use crate::types::{HttpUrl, LogTopicFilter, Timespan};
    use std::collections::BTreeSet;

    fn safe_node(transport: MockHttpTransport) -> SafeNode {
        SafeNode::new(
            EthEndpoint::new(HttpUrl::parse("http://0.0.0.0/").unwrap()),
            Arc::new(transport),
            Arc::new(FakeClock::new(0)),
        )
    }

    fn ok_response(body: &'static [u8]) -> RawHttpResponse {
        RawHttpResponse {
            status: 200,
            body: body.to_vec(),
            elapsed: Timespan::from_millis(1),
        }
    }

    #[tokio::test]
    async fn get_logs_calls_block_number_then_get_logs_and_narrows_range() {
        let mut transport = MockHttpTransport::new();
        let mut call_count = 0;
        transport.expect_post().times(2).returning(move |_, body, _, _| {
            call_count += 1;
            let text = String::from_utf8(body).unwrap();
            if text.contains("eth_blockNumber") {
                Ok(ok_response(br#"{"id":0,"jsonrpc":"2.0","result":"0x64"}"#))
            } else {
                assert!(text.contains("eth_getLogs"));
                Ok(ok_response(br#"{"id":0,"jsonrpc":"2.0","result":[]}"#))
            }
        });
        let node = safe_node(transport);
        let filter = LogFilter::new(
            UInt64::new(1).unwrap(),
            UInt64::new(9000).unwrap(),
            BTreeSet::new(),
            LogTopicFilter::empty(),
        )
        .unwrap();
        let segment = node.get_logs(&filter).await.unwrap();
        // safe_block = 100 - 15 = 85; log_range starts at 10, so
        // effective_to = min(1 + 10 - 1, 9000, 85) = 10.
        assert_eq!(segment.data.to_block.get(), 10);
        assert_eq!(segment.data.safe_block.get(), 85);
        assert_eq!(segment.data.latest_block.get(), 100);
    }

    #[tokio::test]
    async fn get_logs_rejects_when_safe_block_precedes_from_block() {
        let mut transport = MockHttpTransport::new();
        transport.expect_post().times(1).returning(|_, _, _, _| {
            Ok(ok_response(br#"{"id":0,"jsonrpc":"2.0","result":"0x5"}"#))
        });
        let node = safe_node(transport);
        let filter = LogFilter::new(
            UInt64::new(1000).unwrap(),
            UInt64::new(2000).unwrap(),
            BTreeSet::new(),
            LogTopicFilter::empty(),
        )
        .unwrap();
        let err = node.get_logs(&filter).await.unwrap_err();
        assert_eq!(err, ErrorKind::UnsafeBlock);
    }

    #[tokio::test]
    async fn node_error_locks_valve_and_surfaces() {
        let mut transport = MockHttpTransport::new();
        transport.expect_post().returning(|_, _, _, _| {
            Ok(RawHttpResponse {
                status: 503,
                body: Vec::new(),
                elapsed: Timespan::from_millis(1),
            })
        });
        let node = safe_node(transport);
        let err = node.get_block_number().await.unwrap_err();
        assert_eq!(err, ErrorKind::Overloading { explicit: true });
        // The lock must surface the error that caused it, not a generic
        // implicit-overloading placeholder.
        let err2 = node.get_block_number().await.unwrap_err();
        assert_eq!(err2, ErrorKind::Overloading { explicit: true });
    }
}
