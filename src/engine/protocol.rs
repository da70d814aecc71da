//! Wire-protocol adapters. The engine is generic over this trait; the
//! transaction and block variants differ only in subscription parameters and
//! in the small fixed schemas parsed out of each notification.

use super::types::{EventContent, KeyedNotification};
use crate::error::ParseError;
use serde::Deserialize;
use serde_json::{json, Value};

pub trait FeedProtocol: Send + Sync + 'static {
    /// Event noun used in logs and reports ("transactions", "blocks").
    fn event_name(&self) -> &'static str;

    /// Subscribe request for the gateway feed: (method, params).
    fn reference_subscription(&self, feed_name: &str, include_contents: bool) -> (&'static str, Value);

    /// Subscribe request for the node feed.
    fn comparator_subscription(&self) -> (&'static str, Value);

    /// Detail-fetch RPC for the enrichment pool.
    fn content_request(&self, key: &str) -> (&'static str, Value);

    /// Extract key (and any inline content) from a gateway notification.
    fn parse_reference(&self, raw: &[u8]) -> Result<KeyedNotification, ParseError>;

    /// Extract the key from a node notification.
    fn parse_comparator(&self, raw: &[u8]) -> Result<String, ParseError>;

    /// Decode a detail-fetch response. `Ok(None)` when the node does not
    /// know the key yet; such results are silently skipped.
    fn parse_content(&self, raw: &[u8]) -> Result<Option<EventContent>, ParseError>;
}

// -- transaction variant ----------------------------------------------------

#[derive(Deserialize)]
struct GatewayTxNotification {
    params: GatewayTxParams,
}

#[derive(Deserialize)]
struct GatewayTxParams {
    result: GatewayTxResult,
}

#[derive(Deserialize)]
struct GatewayTxResult {
    #[serde(rename = "txHash")]
    tx_hash: String,
    #[serde(rename = "txContents", default)]
    tx_contents: GatewayTxContents,
}

#[derive(Deserialize, Default)]
struct GatewayTxContents {
    #[serde(rename = "gasPrice")]
    gas_price: Option<String>,
    to: Option<String>,
}

#[derive(Deserialize)]
struct NodeTxNotification {
    params: NodeTxParams,
}

#[derive(Deserialize)]
struct NodeTxParams {
    /// The subscription result is the bare transaction hash.
    result: String,
}

#[derive(Deserialize)]
struct NodeTxContentsResponse {
    result: Option<NodeTxContents>,
}

#[derive(Deserialize)]
struct NodeTxContents {
    #[serde(rename = "gasPrice")]
    gas_price: Option<String>,
    to: Option<String>,
}

pub struct TxProtocol;

impl FeedProtocol for TxProtocol {
    fn event_name(&self) -> &'static str {
        "transactions"
    }

    fn reference_subscription(&self, feed_name: &str, include_contents: bool) -> (&'static str, Value) {
        let include = if include_contents {
            json!(["tx_hash", "tx_contents.gas_price", "tx_contents.to"])
        } else {
            json!(["tx_hash"])
        };
        ("subscribe", json!([feed_name, { "include": include }]))
    }

    fn comparator_subscription(&self) -> (&'static str, Value) {
        ("eth_subscribe", json!(["newPendingTransactions"]))
    }

    fn content_request(&self, key: &str) -> (&'static str, Value) {
        ("eth_getTransactionByHash", json!([key]))
    }

    fn parse_reference(&self, raw: &[u8]) -> Result<KeyedNotification, ParseError> {
        let msg: GatewayTxNotification = serde_json::from_slice(raw)?;
        let result = msg.params.result;
        Ok(KeyedNotification {
            key: result.tx_hash,
            content: Some(EventContent {
                gas_price: result.tx_contents.gas_price,
                to: result.tx_contents.to,
            }),
        })
    }

    fn parse_comparator(&self, raw: &[u8]) -> Result<String, ParseError> {
        let msg: NodeTxNotification = serde_json::from_slice(raw)?;
        Ok(msg.params.result)
    }

    fn parse_content(&self, raw: &[u8]) -> Result<Option<EventContent>, ParseError> {
        let msg: NodeTxContentsResponse = serde_json::from_slice(raw)?;
        Ok(msg.result.map(|c| EventContent {
            gas_price: c.gas_price,
            to: c.to,
        }))
    }
}

// -- block variant ----------------------------------------------------------

#[derive(Deserialize)]
struct GatewayBkNotification {
    params: GatewayBkParams,
}

#[derive(Deserialize)]
struct GatewayBkParams {
    result: HashOnly,
}

#[derive(Deserialize)]
struct NodeBkNotification {
    params: NodeBkParams,
}

#[derive(Deserialize)]
struct NodeBkParams {
    result: HashOnly,
}

#[derive(Deserialize)]
struct HashOnly {
    hash: String,
}

#[derive(Deserialize)]
struct NodeBkContentsResponse {
    result: Option<HashOnly>,
}

pub struct BlockProtocol;

impl FeedProtocol for BlockProtocol {
    fn event_name(&self) -> &'static str {
        "blocks"
    }

    fn reference_subscription(&self, feed_name: &str, include_contents: bool) -> (&'static str, Value) {
        let include = if include_contents {
            json!(["hash", "header"])
        } else {
            json!(["hash"])
        };
        ("subscribe", json!([feed_name, { "include": include }]))
    }

    fn comparator_subscription(&self) -> (&'static str, Value) {
        ("eth_subscribe", json!(["newHeads"]))
    }

    fn content_request(&self, key: &str) -> (&'static str, Value) {
        ("eth_getBlockByHash", json!([key, true]))
    }

    fn parse_reference(&self, raw: &[u8]) -> Result<KeyedNotification, ParseError> {
        let msg: GatewayBkNotification = serde_json::from_slice(raw)?;
        Ok(KeyedNotification {
            key: msg.params.result.hash,
            // Blocks carry no filterable content.
            content: None,
        })
    }

    fn parse_comparator(&self, raw: &[u8]) -> Result<String, ParseError> {
        let msg: NodeBkNotification = serde_json::from_slice(raw)?;
        Ok(msg.params.result.hash)
    }

    fn parse_content(&self, raw: &[u8]) -> Result<Option<EventContent>, ParseError> {
        let msg: NodeBkContentsResponse = serde_json::from_slice(raw)?;
        // Presence of the block is all that matters for correlation.
        Ok(msg.result.map(|_| EventContent::default()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_gateway_tx_notification() {
        let raw = br#"{"params":{"subscription":"abc","result":{"txHash":"0xf00","txContents":{"gasPrice":"0x3b9aca00","to":"0xAAA"}}}}"#;
        let note = TxProtocol.parse_reference(raw).unwrap();
        assert_eq!(note.key, "0xf00");
        let content = note.content.unwrap();
        assert_eq!(content.gas_price.as_deref(), Some("0x3b9aca00"));
        assert_eq!(content.to.as_deref(), Some("0xAAA"));
    }

    #[test]
    fn test_parse_gateway_tx_without_contents() {
        let raw = br#"{"params":{"result":{"txHash":"0xf00"}}}"#;
        let note = TxProtocol.parse_reference(raw).unwrap();
        assert_eq!(note.key, "0xf00");
        let content = note.content.unwrap();
        assert!(content.gas_price.is_none());
        assert!(content.to.is_none());
    }

    #[test]
    fn test_parse_node_tx_notification() {
        let raw = br#"{"params":{"subscription":"0x1","result":"0xbeef"}}"#;
        assert_eq!(TxProtocol.parse_comparator(raw).unwrap(), "0xbeef");
    }

    #[test]
    fn test_parse_tx_contents_null_result() {
        let raw = br#"{"jsonrpc":"2.0","id":3,"result":null}"#;
        assert!(TxProtocol.parse_content(raw).unwrap().is_none());
    }

    #[test]
    fn test_parse_block_notifications() {
        let gw = br#"{"params":{"result":{"hash":"0xb10c"}}}"#;
        assert_eq!(BlockProtocol.parse_reference(gw).unwrap().key, "0xb10c");

        let node = br#"{"params":{"subscription":"0x1","result":{"hash":"0xb10c","number":"0x1"}}}"#;
        assert_eq!(BlockProtocol.parse_comparator(node).unwrap(), "0xb10c");
    }

    #[test]
    fn test_malformed_payload_is_parse_error() {
        assert!(TxProtocol.parse_reference(b"not json").is_err());
        assert!(BlockProtocol.parse_comparator(b"{}").is_err());
    }
}
