use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Mutex,
    },
};

use async_trait::async_trait;
use cairn_primitives::buf::Buf32;
use sha2::{Digest, Sha256};

use crate::rpc::{
    error::{ClientError, ClientResult},
    traits::L1Client,
    types::RpcTxStatus,
};

/// A test implementation of the L1 client with scriptable chain state.
#[derive(Debug, Default)]
pub struct TestL1Client {
    height: AtomicU64,
    gas_price: AtomicU64,
    account_nonce: AtomicU64,
    fail_sends: AtomicBool,
    included: Mutex<HashMap<Buf32, RpcTxStatus>>,
    sent: Mutex<Vec<Buf32>>,
}

impl TestL1Client {
    pub fn new(height: u64) -> Self {
        Self {
            height: AtomicU64::new(height),
            ..Default::default()
        }
    }

    pub fn set_height(&self, height: u64) {
        self.height.store(height, Ordering::Relaxed);
    }

    pub fn set_gas_price(&self, price: u64) {
        self.gas_price.store(price, Ordering::Relaxed);
    }

    pub fn set_account_nonce(&self, nonce: u64) {
        self.account_nonce.store(nonce, Ordering::Relaxed);
    }

    /// Make every subsequent send fail with a transport error.
    pub fn set_fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::Relaxed);
    }

    /// Script a transaction as included at `height`.
    pub fn include_tx(&self, txid: Buf32, height: u64, success: bool) {
        self.included.lock().unwrap().insert(
            txid,
            RpcTxStatus {
                block_height: height,
                success,
            },
        );
    }

    /// Remove a transaction from the canonical chain, as a reorg would.
    pub fn drop_tx(&self, txid: Buf32) {
        self.included.lock().unwrap().remove(&txid);
    }

    /// Number of raw transactions the client accepted.
    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl L1Client for TestL1Client {
    async fn get_gas_price(&self) -> ClientResult<u64> {
        Ok(self.gas_price.load(Ordering::Relaxed))
    }

    async fn send_raw_tx(&self, tx_raw: &[u8]) -> ClientResult<Buf32> {
        if self.fail_sends.load(Ordering::Relaxed) {
            return Err(ClientError::Network("injected send failure".to_string()));
        }
        let digest: [u8; 32] = Sha256::digest(tx_raw).into();
        let txid = Buf32::from(digest);
        self.sent.lock().unwrap().push(txid);
        Ok(txid)
    }

    async fn get_tx_status(&self, txid: Buf32) -> ClientResult<Option<RpcTxStatus>> {
        Ok(self.included.lock().unwrap().get(&txid).copied())
    }

    async fn get_chain_height(&self) -> ClientResult<u64> {
        Ok(self.height.load(Ordering::Relaxed))
    }

    async fn get_account_nonce(&self, _account: &str) -> ClientResult<u64> {
        Ok(self.account_nonce.load(Ordering::Relaxed))
    }
}
