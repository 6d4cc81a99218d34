//! `Gateway`: round-robin dispatch with per-call failover across one
//! tier of nodes, cascading to a lower tier when the whole tier fails.

use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicUsize, Ordering};

use serde_json::Value;

use crate::error::ErrorKind;
use crate::safe_node::RpcCapability;
use crate::types::{ByteData32, Block, LogFilter, LogSegment, NodeResponse, Transaction, UInt64};

#[derive(Debug)]
pub struct Gateway<N: RpcCapability> {
    nodes: Vec<N>,
    cursor: AtomicUsize,
    lower_layer: Option<Box<Gateway<N>>>,
}

impl<N: RpcCapability> Gateway<N> {
    pub fn new(nodes: Vec<N>, lower_layer: Option<Box<Gateway<N>>>) -> Self {
        Self {
            nodes,
            cursor: AtomicUsize::new(0),
            lower_layer,
        }
    }

    fn next_index(&self) -> usize {
        if self.nodes.is_empty() {
            return 0;
        }
        self.cursor.fetch_add(1, Ordering::Relaxed) % self.nodes.len()
    }

    // Returns a boxed, type-erased future rather than `impl Future` so the
    // cascade into `lower_layer.proxy(..)` below does not expand into an
    // infinitely-sized recursive future type.
    fn proxy<'a, T, F, Fut>(&'a self, op: F) -> Pin<Box<dyn Future<Output = Result<T, ErrorKind>> + Send + 'a>>
    where
        T: Send + 'a,
        F: Fn(&N) -> Fut + Send + Sync + 'a,
        Fut: Future<Output = Result<T, ErrorKind>> + Send + 'a,
    {
        Box::pin(async move {
            if self.nodes.is_empty() {
                return match &self.lower_layer {
                    Some(lower) => lower.proxy(op).await,
                    None => Err(ErrorKind::GatewayNoBackend),
                };
            }

            let mut last_error = None;
            for _ in 0..self.nodes.len() {
                let index = self.next_index();
                let node = &self.nodes[index];
                tracing::debug!(node = index, "gateway attempt");
                match op(node).await {
                    Ok(value) => return Ok(value),
                    Err(err) => {
                        tracing::warn!(node = index, error = %err, "gateway node failed");
                        last_error = Some(err);
                    }
                }
            }

            match &self.lower_layer {
                Some(lower) => lower.proxy(op).await,
                None => Err(ErrorKind::GatewayBadBackend {
                    source: Box::new(last_error.expect("BUG: node list was non-empty")),
                }),
            }
        })
    }

    pub async fn get_block_number(&self) -> Result<NodeResponse<UInt64>, ErrorKind> {
        self.proxy(|node| node.get_block_number()).await
    }

    pub async fn get_block_by_number(&self, number: UInt64) -> Result<NodeResponse<Block>, ErrorKind> {
        self.proxy(|node| node.get_block_by_number(number)).await
    }

    pub async fn get_transaction_by_hash(
        &self,
        hash: ByteData32,
    ) -> Result<NodeResponse<Transaction>, ErrorKind> {
        self.proxy(|node| node.get_transaction_by_hash(hash)).await
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<NodeResponse<LogSegment>, ErrorKind> {
        self.proxy(|node| node.get_logs(filter)).await
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<NodeResponse<Value>, ErrorKind> {
        self.proxy(|node| node.call(method, params.clone())).await
    }
}

impl Gateway<crate::safe_node::SafeNode> {
    /// The widest `log_range_boundary` across every configured endpoint
    /// in this tier and any lower tier, used to size `LogStream`'s
    /// fetch window.
    pub fn max_log_range_boundary(&self) -> Option<UInt64> {
        let own = self.nodes.iter().map(|n| n.endpoint().log_range_boundary).max();
        let lower = self.lower_layer.as_ref().and_then(|g| g.max_log_range_boundary());
        match (own, lower) {
            (Some(a), Some(b)) => Some(a.max(b)),
            (a, b) => a.or(b),
        }
    }
}
