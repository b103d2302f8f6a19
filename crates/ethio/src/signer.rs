use cairn_primitives::buf::Buf32;
use sha2::{Digest, Sha256};

/// A fully built and signed transaction, ready for broadcast.
#[derive(Debug, Clone)]
pub struct SignedTx {
    pub raw: Vec<u8>,
    pub txid: Buf32,
}

/// Builds and signs the concrete chain transaction carrying an operation
/// payload. The production signer is a collaborator (wallet, HSM); the engine
/// only needs the bytes and the id back.
pub trait TxSigner: Send + Sync + 'static {
    fn sign_tx(&self, payload: &[u8], nonce: u64, gas_price: u64) -> anyhow::Result<SignedTx>;
}

/// Deterministic digest-based signer backing tests and dev runs. The "txid"
/// commits to account, nonce, gas price and payload, so a replacement attempt
/// with a bumped price gets a fresh id while an identical rebuild does not.
#[derive(Debug, Clone)]
pub struct DigestSigner {
    account: String,
}

impl DigestSigner {
    pub fn new(account: String) -> Self {
        Self { account }
    }

    pub fn account(&self) -> &str {
        &self.account
    }
}

impl TxSigner for DigestSigner {
    fn sign_tx(&self, payload: &[u8], nonce: u64, gas_price: u64) -> anyhow::Result<SignedTx> {
        let mut hasher = Sha256::new();
        hasher.update(self.account.as_bytes());
        hasher.update(nonce.to_be_bytes());
        hasher.update(gas_price.to_be_bytes());
        hasher.update(payload);
        let digest: [u8; 32] = hasher.finalize().into();

        let mut raw = Vec::with_capacity(16 + payload.len() + digest.len());
        raw.extend_from_slice(&nonce.to_be_bytes());
        raw.extend_from_slice(&gas_price.to_be_bytes());
        raw.extend_from_slice(payload);
        raw.extend_from_slice(&digest);

        Ok(SignedTx {
            raw,
            txid: digest.into(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_price_bump_changes_txid() {
        let signer = DigestSigner::new("0xabc".to_string());
        let a = signer.sign_tx(b"payload", 3, 100).unwrap();
        let b = signer.sign_tx(b"payload", 3, 150).unwrap();
        let a2 = signer.sign_tx(b"payload", 3, 100).unwrap();

        assert_ne!(a.txid, b.txid, "replacement must get a fresh txid");
        assert_eq!(a.txid, a2.txid, "identical rebuild must be stable");
    }
}
