//! `Node`: one HTTP endpoint. Marshals RPC calls, classifies transport
//! and protocol failures into the stable [`ErrorKind`] taxonomy, and
//! measures response size/time for the valve's adaptive estimator.

use std::sync::Arc;

use serde_json::{json, Value};

use crate::config::EthEndpoint;
use crate::error::ErrorKind;
use crate::rpc::{decode_response, encode_request, RpcEnvelope};
use crate::transport::{HttpTransport, TransportError};
use crate::types::{
    Address, ByteData, ByteData32, Block, DataSize, Log, LogFilter, LogTopicCombination,
    NodeResponse, Timestamp, Transaction, TopicFilterEntry, UInt16, UInt64,
};

#[derive(Debug)]
pub struct Node {
    endpoint: EthEndpoint,
    transport: Arc<dyn HttpTransport>,
}

impl Node {
    pub fn new(endpoint: EthEndpoint, transport: Arc<dyn HttpTransport>) -> Self {
        Self { endpoint, transport }
    }

    pub fn endpoint(&self) -> &EthEndpoint {
        &self.endpoint
    }

    async fn call_raw(&self, method: &str, params: Value) -> Result<NodeResponse<RpcEnvelope>, ErrorKind> {
        let body = encode_request(method, params);
        let auth = self.endpoint.basic_auth();
        let raw = self
            .transport
            .post(&self.endpoint.url, body, self.endpoint.timeout, auth)
            .await
            .map_err(|e| match e {
                TransportError::Timeout => ErrorKind::Overloading { explicit: false },
                TransportError::ConnectFailed(_) => ErrorKind::Overloading { explicit: false },
                TransportError::Other(msg) => ErrorKind::BadServer(msg),
            })?;

        if raw.status == 429 || raw.status == 503 {
            return Err(ErrorKind::Overloading { explicit: true });
        }
        if raw.status >= 500 {
            return Err(ErrorKind::BadServer(format!("http status {}", raw.status)));
        }
        if !(100..300).contains(&raw.status) {
            return Err(ErrorKind::BadRequest(format!("http status {}", raw.status)));
        }

        let envelope = decode_response(&raw.body).map_err(|e| ErrorKind::BadResponse(e.0))?;
        if let RpcEnvelope::Error(message) = envelope {
            return Err(ErrorKind::BadRequest(message));
        }
        let size = DataSize::from_bytes(raw.body.len() as u64);
        Ok(NodeResponse::new(envelope, size, raw.elapsed))
    }

    pub async fn get_block_number(&self) -> Result<NodeResponse<UInt64>, ErrorKind> {
        let resp = self.call_raw("eth_blockNumber", json!([])).await?;
        match resp.data {
            RpcEnvelope::Result(Value::String(s)) => {
                let n = UInt64::from_hex(&s).map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
                Ok(resp.map(|_| n))
            }
            _ => Err(ErrorKind::BadResponse("expected hex block number".to_string())),
        }
    }

    pub async fn get_block_by_number(&self, number: UInt64) -> Result<NodeResponse<Block>, ErrorKind> {
        let params = json!([number.to_hex(), false]);
        let resp = self.call_raw("eth_getBlockByNumber", params).await?;
        match resp.data {
            RpcEnvelope::Null => Err(ErrorKind::NoBlock),
            RpcEnvelope::Result(value) => {
                let block = parse_block(&value)?;
                Ok(resp.map(|_| block))
            }
            RpcEnvelope::Error(_) => unreachable!("handled in call_raw"),
        }
    }

    pub async fn get_transaction_by_hash(
        &self,
        hash: ByteData32,
    ) -> Result<NodeResponse<Transaction>, ErrorKind> {
        let params = json!([hash.to_hex()]);
        let resp = self.call_raw("eth_getTransactionByHash", params).await?;
        match resp.data {
            RpcEnvelope::Null => Err(ErrorKind::NoTransaction),
            RpcEnvelope::Result(value) => {
                let tx = parse_transaction(&value)?;
                Ok(resp.map(|_| tx))
            }
            RpcEnvelope::Error(_) => unreachable!("handled in call_raw"),
        }
    }

    pub async fn get_logs(&self, filter: &LogFilter) -> Result<NodeResponse<Vec<Log>>, ErrorKind> {
        let params = json!([build_get_logs_filter(filter)]);
        let resp = self.call_raw("eth_getLogs", params).await?;
        match resp.data {
            RpcEnvelope::Result(Value::Array(items)) => {
                let mut logs = Vec::with_capacity(items.len());
                for item in &items {
                    logs.push(parse_log(item)?);
                }
                Ok(resp.map(|_| logs))
            }
            _ => Err(ErrorKind::BadResponse("expected array of logs".to_string())),
        }
    }

    pub async fn call(&self, method: &str, params: Value) -> Result<NodeResponse<Value>, ErrorKind> {
        let resp = self.call_raw(method, params).await?;
        match resp.data {
            RpcEnvelope::Result(value) => Ok(resp.map(|_| value)),
            RpcEnvelope::Null => Ok(resp.map(|_| Value::Null)),
            RpcEnvelope::Error(_) => unreachable!("handled in call_raw"),
        }
    }
}

fn field<'a>(value: &'a Value, name: &str) -> Result<&'a Value, ErrorKind> {
    value
        .get(name)
        .ok_or_else(|| ErrorKind::BadResponse(format!("missing field {name}")))
}

fn field_str<'a>(value: &'a Value, name: &str) -> Result<&'a str, ErrorKind> {
    field(value, name)?
        .as_str()
        .ok_or_else(|| ErrorKind::BadResponse(format!("field {name} is not a string")))
}

fn parse_block(value: &Value) -> Result<Block, ErrorKind> {
    let number = UInt64::from_hex(field_str(value, "number")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let timestamp_secs = UInt64::from_hex(field_str(value, "timestamp")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let timestamp = Timestamp::from_millis(timestamp_secs.get() * 1000);
    let transactions = field(value, "transactions")?
        .as_array()
        .ok_or_else(|| ErrorKind::BadResponse("transactions is not an array".to_string()))?
        .iter()
        .map(|v| {
            let s = v
                .as_str()
                .ok_or_else(|| ErrorKind::BadResponse("transaction hash is not a string".to_string()))?;
            ByteData32::from_hex(s).map_err(|e| ErrorKind::BadResponse(e.to_string()))
        })
        .collect::<Result<Vec<_>, ErrorKind>>()?;
    Ok(Block {
        number,
        timestamp,
        transactions,
    })
}

fn parse_transaction(value: &Value) -> Result<Transaction, ErrorKind> {
    let hash = ByteData32::from_hex(field_str(value, "hash")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let from = Address::from_hex(field_str(value, "from")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let to = Address::from_hex(field_str(value, "to")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let block_number = UInt64::from_hex(field_str(value, "blockNumber")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let transaction_index = UInt16::from_hex(field_str(value, "transactionIndex")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    Ok(Transaction {
        hash,
        from,
        to,
        block_number,
        transaction_index,
    })
}

fn parse_log(value: &Value) -> Result<Log, ErrorKind> {
    let address = Address::from_hex(field_str(value, "address")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let block_number = UInt64::from_hex(field_str(value, "blockNumber")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let log_index = UInt16::from_hex(field_str(value, "logIndex")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let transaction_index = UInt16::from_hex(field_str(value, "transactionIndex")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let topics_raw = field(value, "topics")?
        .as_array()
        .ok_or_else(|| ErrorKind::BadResponse("topics is not an array".to_string()))?;
    let topics = topics_raw
        .iter()
        .map(|v| {
            let s = v
                .as_str()
                .ok_or_else(|| ErrorKind::BadResponse("topic is not a string".to_string()))?;
            ByteData32::from_hex(s).map_err(|e| ErrorKind::BadResponse(e.to_string()))
        })
        .collect::<Result<Vec<_>, ErrorKind>>()?;
    let topics = LogTopicCombination::new(topics).map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    // Tolerates the non-standard literal "0x" for `data`, unlike every
    // other hex field decoded above.
    let data = ByteData::from_bad_hex(field_str(value, "data")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let block_hash = ByteData32::from_hex(field_str(value, "blockHash")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    let transaction_hash = ByteData32::from_hex(field_str(value, "transactionHash")?)
        .map_err(|e| ErrorKind::BadResponse(e.to_string()))?;
    Ok(Log {
        address,
        block_number,
        log_index,
        transaction_index,
        topics,
        data,
        block_hash,
        transaction_hash,
    })
}

fn build_get_logs_filter(filter: &LogFilter) -> Value {
    let mut object = serde_json::Map::new();
    object.insert("fromBlock".to_string(), json!(filter.from_block.to_hex()));
    object.insert("toBlock".to_string(), json!(filter.to_block.to_hex()));
    if !filter.addresses.is_empty() {
        let addresses: Vec<_> = filter.addresses.iter().map(|a| a.to_hex()).collect();
        object.insert("address".to_string(), json!(addresses));
    }
    if !filter.topics.as_slice().is_empty() {
        let topics: Vec<Value> = filter
            .topics
            .as_slice()
            .iter()
            .map(|entry| match entry {
                TopicFilterEntry::Single(topic) => json!(topic.to_hex()),
                TopicFilterEntry::AnyOf(set) => {
                    json!(set.iter().map(|t| t.to_hex()).collect::<Vec<_>>())
                }
            })
            .collect();
        object.insert("topics".to_string(), json!(topics));
    }
    Value::Object(object)
}
