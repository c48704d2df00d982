//! Wallet generation.
//!
//! # Security
//! - Keys are generated from the OS RNG
//! - Keys are never logged; only the address is
//! - The gateway keeps no copy after the operation result is delivered

use alloy::signers::local::PrivateKeySigner;

use crate::blockchain::types::{BlockchainResult, NewWallet};

/// Generate a fresh externally-owned account.
pub fn generate() -> BlockchainResult<NewWallet> {
    let signer = PrivateKeySigner::random();
    let address = signer.address();

    tracing::info!(address = %address, "Wallet generated");

    Ok(NewWallet {
        address,
        private_key: alloy::hex::encode_prefixed(signer.to_bytes()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_key_matches_address() {
        let wallet = generate().unwrap();
        let restored: PrivateKeySigner = wallet
            .private_key
            .trim_start_matches("0x")
            .parse()
            .unwrap();
        assert_eq!(restored.address(), wallet.address);
    }

    #[test]
    fn test_wallets_are_unique() {
        let a = generate().unwrap();
        let b = generate().unwrap();
        assert_ne!(a.address, b.address);
        assert_eq!(a.private_key.len(), 66);
    }
}
