use async_trait::async_trait;
use cairn_primitives::buf::Buf32;

use super::{error::ClientResult, types::RpcTxStatus};

#[async_trait]
pub trait L1Client: Sync + Send + 'static {
    /// One observation of the network gas price, in wei.
    async fn get_gas_price(&self) -> ClientResult<u64>;

    /// Submit a signed raw transaction, returning the txid the node computed.
    async fn send_raw_tx(&self, tx_raw: &[u8]) -> ClientResult<Buf32>;

    /// Inclusion status of a transaction. `None` means the canonical chain
    /// currently has no record of it, which after an earlier inclusion
    /// indicates a reorg.
    async fn get_tx_status(&self, txid: Buf32) -> ClientResult<Option<RpcTxStatus>>;

    /// Current canonical chain height.
    async fn get_chain_height(&self) -> ClientResult<u64>;

    /// Next nonce for the account as the chain sees it.
    async fn get_account_nonce(&self, account: &str) -> ClientResult<u64>;
}
