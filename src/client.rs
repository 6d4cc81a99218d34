//! `Client`: the public entry point. Composes a primary and a backup
//! `Gateway`, validates endpoint lists, and forwards every operation to
//! the primary tier (which cascades to backup on its own).

use std::sync::Arc;

use serde_json::Value;

use crate::clock::{Clock, SystemClock};
use crate::config::{validate_endpoint_lists, EthEndpoint};
use crate::error::{ErrorKind, ValidationError};
use crate::gateway::Gateway;
use crate::safe_node::SafeNode;
use crate::transport::{HttpTransport, ReqwestTransport};
use crate::types::{ByteData32, Block, LogFilter, LogSegment, NodeResponse, Transaction, UInt64};

#[derive(Debug)]
pub struct Client {
    primary: Gateway<SafeNode>,
}

impl Client {
    /// Builds a client with the default `reqwest`-backed transport and
    /// system clock.
    pub fn new(primary: Vec<EthEndpoint>, backup: Vec<EthEndpoint>) -> Result<Self, ValidationError> {
        Self::with_transport(primary, backup, Arc::new(ReqwestTransport::default()), Arc::new(SystemClock))
    }

    pub fn with_transport(
        primary: Vec<EthEndpoint>,
        backup: Vec<EthEndpoint>,
        transport: Arc<dyn HttpTransport>,
        clock: Arc<dyn Clock>,
    ) -> Result<Self, ValidationError> {
        validate_endpoint_lists(&primary, &backup)?;

        let backup_nodes: Vec<SafeNode> = backup
            .into_iter()
            .map(|e| SafeNode::new(e, transport.clone(), clock.clone()))
            .collect();
        let backup_gateway = if backup_nodes.is_empty() {
            None
        } else {
            Some(Box::new(Gateway::new(backup_nodes, None)))
        };

        let primary_nodes: Vec<SafeNode> = primary
            .into_iter()
            .map(|e| SafeNode::new(e, transport.clone(), clock.clone()))
            .collect();
        let primary_gateway = Gateway::new(primary_nodes, backup_gateway);

        Ok(Self { primary: primary_gateway })
    }

    pub async fn get_block_number(&self) -> Result<NodeResponse<UInt64>, ErrorKind> {
        self.primary.get_block_number().await
    }

    pub async fn get_block_by_number(&self, number: UInt64) -> Result<NodeResponse<Block>, ErrorKind> {
        self.primary.get_block_by_number(number).await
    }

    pub async fn get_transaction_by_hash(
        &self,
        hash: ByteData32,
    ) -> Result<NodeResponse<Transaction>, ErrorKind> {
        self.primary.get_transaction_by_hash(hash).await
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<NodeResponse<LogSegment>, ErrorKind> {
        self.primary.get_logs(filter).await
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<NodeResponse<Value>, ErrorKind> {
        self.primary.call(method, params).await
    }

    /// The widest `log_range_boundary` across every configured
    /// endpoint, used to size a `LogStream`'s fetch window.
    pub fn max_log_range_boundary(&self) -> UInt64 {
        self.primary.max_log_range_boundary().unwrap_or(UInt64::new(1).unwrap())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests_support::FakeClock;
    use crate::transport::{MockHttpTransport, RawHttpResponse};
    use crate::types::{HttpUrl, Timespan};

    #[test]
    fn rejects_empty_primary() {
        let err = Client::with_transport(
            vec![],
            vec![],
            Arc::new(MockHttpTransport::new()),
            Arc::new(FakeClock::new(0)),
        )
        .unwrap_err();
        assert_eq!(err, ValidationError::EmptyPrimary);
    }

    #[tokio::test]
    async fn falls_back_to_backup_when_primary_exhausted() {
        // One shared mock transport routes by URL, since both tiers'
        // `SafeNode`s hold the same `Arc<dyn HttpTransport>`.
        let mut transport = MockHttpTransport::new();
        transport.expect_post().returning(|url, _, _, _| {
            if url.as_str().contains("bad") {
                Ok(RawHttpResponse {
                    status: 503,
                    body: Vec::new(),
                    elapsed: Timespan::from_millis(1),
                })
            } else {
                Ok(RawHttpResponse {
                    status: 200,
                    body: br#"{"id":0,"jsonrpc":"2.0","result":"0x1"}"#.to_vec(),
                    elapsed: Timespan::from_millis(1),
                })
            }
        });

        let client = Client::with_transport(
            vec![EthEndpoint::new(HttpUrl::parse("https://bad.example/").unwrap())],
            vec![EthEndpoint::new(HttpUrl::parse("https://good.example/").unwrap())],
            Arc::new(transport),
            Arc::new(FakeClock::new(0)),
        )
        .unwrap();

        let resp = client.get_block_number().await.unwrap();
        assert_eq!(resp.data.get(), 1);
    }
}
