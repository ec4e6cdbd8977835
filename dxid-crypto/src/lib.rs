//! Ed25519 signing and address derivation for the node.
//!
//! Signature verification itself happens here, upstream of the
//! validation core in `dxid-core`: by the time a [`dxid_core::SignedTransaction`]
//! reaches [`dxid_core::ValidationContext`], its `signed_addresses` set is
//! already the verified output of [`DefaultCryptoProvider::verify_signature`]
//! run against every claimed signer.

use anyhow::Result;
use blake3::Hasher;
use dxid_core::{Address, BlockHash, BlockHeader, CryptoProvider};
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey, SIGNATURE_LENGTH};
use rand::rngs::OsRng;
use std::convert::TryInto;

#[derive(Debug, Clone)]
pub struct KeyMaterial {
    pub public_key: Vec<u8>,
    pub secret_key: Vec<u8>,
}

pub fn generate_ed25519() -> KeyMaterial {
    let mut csprng = OsRng;
    let signing = SigningKey::generate(&mut csprng);
    let verify = signing.verifying_key();
    KeyMaterial {
        public_key: verify.to_bytes().to_vec(),
        secret_key: signing.to_bytes().to_vec(),
    }
}

#[derive(Debug, Default)]
pub struct DefaultCryptoProvider;

impl DefaultCryptoProvider {
    pub fn new() -> Self {
        Self
    }
}

impl CryptoProvider for DefaultCryptoProvider {
    fn address_from_public_key(&self, pk: &[u8]) -> Result<Address> {
        let mut hasher = Hasher::new();
        hasher.update(pk);
        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(digest.as_bytes());
        Ok(out)
    }

    fn verify_signature(&self, pk: &[u8], msg: &[u8], sig: &[u8]) -> Result<bool> {
        let pk_arr: [u8; 32] = pk.try_into().map_err(|_| anyhow::anyhow!("bad pk length"))?;
        let vk = VerifyingKey::from_bytes(&pk_arr)?;
        let sig_arr: [u8; SIGNATURE_LENGTH] = sig
            .try_into()
            .map_err(|_| anyhow::anyhow!("bad sig length"))?;
        let signature = Signature::from_bytes(&sig_arr);
        Ok(vk.verify(msg, &signature).is_ok())
    }

    fn sign_message(&self, sk: &[u8], msg: &[u8]) -> Result<Vec<u8>> {
        let sk_arr: [u8; 32] = sk.try_into().map_err(|_| anyhow::anyhow!("bad sk length"))?;
        let signing = SigningKey::from_bytes(&sk_arr);
        let sig = signing.sign(msg);
        Ok(sig.to_bytes().to_vec())
    }

    fn hash_block_header(&self, header: &BlockHeader) -> BlockHash {
        let encoded = serde_json::to_vec(header).unwrap();
        blake3::hash(&encoded).into()
    }
}

pub fn address_to_string(addr: &Address) -> String {
    bs58::encode(addr).into_string()
}

pub fn address_from_string(s: &str) -> Result<Address> {
    let bytes = bs58::decode(s).into_vec()?;
    if bytes.len() != 32 {
        return Err(anyhow::anyhow!("invalid address length"));
    }
    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify() {
        let kp = generate_ed25519();
        let provider = DefaultCryptoProvider::new();
        let msg = b"hello world";
        let sig = provider.sign_message(&kp.secret_key, msg).unwrap();
        assert!(provider.verify_signature(&kp.public_key, msg, &sig).unwrap());
    }

    #[test]
    fn tampered_signature_rejected() {
        let kp = generate_ed25519();
        let provider = DefaultCryptoProvider::new();
        let sig = provider.sign_message(&kp.secret_key, b"hello").unwrap();
        assert!(!provider.verify_signature(&kp.public_key, b"goodbye", &sig).unwrap());
    }

    #[test]
    fn address_roundtrips_through_base58() {
        let provider = DefaultCryptoProvider::new();
        let kp = generate_ed25519();
        let addr = provider.address_from_public_key(&kp.public_key).unwrap();
        let encoded = address_to_string(&addr);
        assert_eq!(address_from_string(&encoded).unwrap(), addr);
    }
}
