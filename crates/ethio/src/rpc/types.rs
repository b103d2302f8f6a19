use serde::Deserialize;

/// Inclusion report for a transaction as the node currently sees it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RpcTxStatus {
    /// Height of the block the transaction is included in.
    pub block_height: u64,
    /// Whether execution succeeded. `false` means the call reverted.
    pub success: bool,
}

/// Wire form of `eth_getTransactionReceipt`, reduced to the fields we read.
#[derive(Debug, Clone, Deserialize)]
pub struct RawTxReceipt {
    #[serde(rename = "blockNumber")]
    pub block_number: Option<String>,
    pub status: Option<String>,
}
