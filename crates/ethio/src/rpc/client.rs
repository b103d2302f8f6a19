use std::{
    fmt,
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;
use cairn_primitives::buf::Buf32;
use reqwest::{
    header::{HeaderMap, CONTENT_TYPE},
    Client,
};
use serde::{de, Deserialize};
use serde_json::{json, Value};
use tokio::time::sleep;
use tracing::*;

use super::{
    error::{ClientError, ClientResult},
    traits::L1Client,
    types::{RawTxReceipt, RpcTxStatus},
};

/// The maximum number of retries for a transport-level failure.
const MAX_RETRIES: u8 = 3;

/// Delay between transport retries.
const RETRY_DELAY_MS: u64 = 1_000;

/// An `async` JSON-RPC 2.0 client for the base chain node.
#[derive(Debug)]
pub struct HttpL1Client {
    url: String,
    client: Client,
    /// The ID of the current request.
    id: AtomicUsize,
}

/// Error object inside a JSON-RPC response.
#[derive(Debug, Clone, Deserialize)]
struct RpcErrorPayload {
    code: i32,
    message: String,
}

/// Response returned by the RPC server. `result` is kept as a raw [`Value`]
/// because a null result is a legitimate answer for some methods (e.g. a
/// receipt query for an unknown tx).
#[derive(Debug, Clone, Deserialize)]
struct Response {
    #[serde(default)]
    result: Value,
    error: Option<RpcErrorPayload>,
}

impl HttpL1Client {
    pub fn new(url: String, timeout: Duration) -> ClientResult<Self> {
        let content_type = "application/json"
            .parse()
            .map_err(|_| ClientError::Other("error parsing header".to_string()))?;
        let headers = HeaderMap::from_iter([(CONTENT_TYPE, content_type)]);

        let client = Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .build()
            .map_err(|e| ClientError::Other(format!("could not create client: {e}")))?;

        trace!(%url, "created L1 client");

        Ok(Self {
            url,
            client,
            id: AtomicUsize::new(0),
        })
    }

    fn next_id(&self) -> usize {
        self.id.fetch_add(1, Ordering::AcqRel)
    }

    async fn call<T: de::DeserializeOwned + fmt::Debug>(
        &self,
        method: &str,
        params: &[Value],
    ) -> ClientResult<T> {
        let mut retries = 0;
        loop {
            trace!(%method, ?params, %retries, "calling L1 client");

            let response = self
                .client
                .post(&self.url)
                .json(&json!({
                    "jsonrpc": "2.0",
                    "id": self.next_id(),
                    "method": method,
                    "params": params,
                }))
                .send()
                .await;

            match response {
                Ok(resp) => {
                    let data = resp
                        .json::<Response>()
                        .await
                        .map_err(|e| ClientError::Parse(e.to_string()))?;
                    if let Some(err) = data.error {
                        return Err(ClientError::Server(err.code, err.message));
                    }
                    return serde_json::from_value(data.result)
                        .map_err(|e| ClientError::Parse(e.to_string()));
                }
                Err(err) => {
                    // Connect/timeout failures are worth retrying in place;
                    // anything else bubbles up.
                    if !(err.is_connect() || err.is_timeout() || err.is_request()) {
                        return Err(ClientError::Network(err.to_string()));
                    }
                    warn!(%method, err = %err, "transport error, retrying");
                }
            }

            retries += 1;
            if retries >= MAX_RETRIES {
                return Err(ClientError::Network(format!(
                    "no response after {MAX_RETRIES} retries"
                )));
            }
            sleep(Duration::from_millis(RETRY_DELAY_MS)).await;
        }
    }
}

fn parse_hex_u64(value: &str) -> ClientResult<u64> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    u64::from_str_radix(digits, 16)
        .map_err(|e| ClientError::Parse(format!("bad hex quantity {value}: {e}")))
}

fn parse_hex_hash(value: &str) -> ClientResult<Buf32> {
    let digits = value.strip_prefix("0x").unwrap_or(value);
    let bytes =
        hex::decode(digits).map_err(|e| ClientError::Parse(format!("bad hash {value}: {e}")))?;
    let array: [u8; 32] = bytes
        .try_into()
        .map_err(|_| ClientError::Parse(format!("bad hash length in {value}")))?;
    Ok(array.into())
}

#[async_trait]
impl L1Client for HttpL1Client {
    async fn get_gas_price(&self) -> ClientResult<u64> {
        let price: String = self.call("eth_gasPrice", &[]).await?;
        parse_hex_u64(&price)
    }

    async fn send_raw_tx(&self, tx_raw: &[u8]) -> ClientResult<Buf32> {
        let raw = format!("0x{}", hex::encode(tx_raw));
        let txid: String = self
            .call("eth_sendRawTransaction", &[Value::String(raw)])
            .await?;
        parse_hex_hash(&txid)
    }

    async fn get_tx_status(&self, txid: Buf32) -> ClientResult<Option<RpcTxStatus>> {
        let id = format!("0x{}", hex::encode(txid.as_slice()));
        let receipt: Option<RawTxReceipt> = self
            .call("eth_getTransactionReceipt", &[Value::String(id)])
            .await?;

        let Some(receipt) = receipt else {
            return Ok(None);
        };
        // A receipt without a block number is still floating in the mempool.
        let Some(block_number) = receipt.block_number else {
            return Ok(None);
        };

        let block_height = parse_hex_u64(&block_number)?;
        let success = match receipt.status.as_deref() {
            Some(status) => parse_hex_u64(status)? == 1,
            None => true,
        };
        Ok(Some(RpcTxStatus {
            block_height,
            success,
        }))
    }

    async fn get_chain_height(&self) -> ClientResult<u64> {
        let height: String = self.call("eth_blockNumber", &[]).await?;
        parse_hex_u64(&height)
    }

    async fn get_account_nonce(&self, account: &str) -> ClientResult<u64> {
        let nonce: String = self
            .call(
                "eth_getTransactionCount",
                &[
                    Value::String(account.to_string()),
                    Value::String("latest".to_string()),
                ],
            )
            .await?;
        parse_hex_u64(&nonce)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_hex_u64() {
        assert_eq!(parse_hex_u64("0x10").unwrap(), 16);
        assert_eq!(parse_hex_u64("ff").unwrap(), 255);
        assert!(parse_hex_u64("0xzz").is_err());
    }

    #[test]
    fn test_parse_hex_hash() {
        let hash = format!("0x{}", "ab".repeat(32));
        assert_eq!(parse_hex_hash(&hash).unwrap(), Buf32::from([0xab; 32]));
        assert!(parse_hex_hash("0x1234").is_err());
    }
}
