// src/crypto.rs
// Authenticated public-key encryption for Phoenix envelopes.
//
// Curve25519 key agreement (x25519-dalek) derives a shared secret that is
// hashed into a 256-bit session key, then XSalsa20-Poly1305 provides
// confidentiality and integrity over the serialized plaintext — the same
// "box" construction WalletConnect's reference clients use.

use rand::rngs::OsRng;
use serde::{de::DeserializeOwned, Serialize};
use sha2::{Digest, Sha256};
use x25519_dalek::{PublicKey, StaticSecret};
use xsalsa20poly1305::{
    aead::{Aead, KeyInit},
    Key, XNonce, XSalsa20Poly1305,
};
use zeroize::Zeroize;

use crate::codec::{base64_decode, base64_encode};
use crate::error::{PhoenixError, Result};

const NONCE_SIZE: usize = 24;

/// Our own ephemeral key pair, generated fresh per pairing.
pub struct CryptoEngine {
    keypair: Option<(StaticSecret, PublicKey)>,
    peer_public_key: Option<PublicKey>,
}

/// Base64 form of a `CryptoEngine`'s state, suitable for the session store.
/// `secret_key` is wiped on drop — this is the only copy of the private
/// key material that escapes `StaticSecret`'s own internal zeroizing.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredKeys {
    pub secret_key: String,
    pub public_key: String,
    pub peer_public_key: Option<String>,
}

impl Drop for StoredKeys {
    fn drop(&mut self) {
        self.secret_key.zeroize();
    }
}

impl CryptoEngine {
    pub fn new() -> Self {
        CryptoEngine {
            keypair: None,
            peer_public_key: None,
        }
    }

    /// Generates a fresh key pair using a cryptographically secure RNG.
    /// Replaces any previously bound peer key.
    pub fn generate(&mut self) -> String {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        let encoded = base64_encode(public.as_bytes());
        self.keypair = Some((secret, public));
        self.peer_public_key = None;
        encoded
    }

    pub fn public_key(&self) -> Option<String> {
        self.keypair.as_ref().map(|(_, pk)| base64_encode(pk.as_bytes()))
    }

    /// Binds the peer's public key. Fails if already bound to a
    /// different key — protects against mid-session pivoting.
    pub fn bind_peer(&mut self, peer_public_key_b64: &str) -> Result<()> {
        let peer_pk = decode_public_key(peer_public_key_b64)?;
        if let Some(existing) = &self.peer_public_key {
            if existing.as_bytes() != peer_pk.as_bytes() {
                return Err(PhoenixError::InvalidPairingUri(
                    "peer public key already bound to a different key".into(),
                ));
            }
            return Ok(());
        }
        self.peer_public_key = Some(peer_pk);
        Ok(())
    }

    pub fn is_bound(&self) -> bool {
        self.peer_public_key.is_some()
    }

    fn session_cipher(&self) -> Result<XSalsa20Poly1305> {
        let (secret, _) = self.keypair.as_ref().ok_or(PhoenixError::NotConnected)?;
        let peer_pk = self.peer_public_key.as_ref().ok_or(PhoenixError::NotConnected)?;

        let shared = secret.diffie_hellman(peer_pk);
        let mut hasher = Sha256::new();
        hasher.update(shared.as_bytes());
        let key_bytes: [u8; 32] = hasher.finalize().into();

        Ok(XSalsa20Poly1305::new(Key::from_slice(&key_bytes)))
    }

    /// Serializes `message` as JSON, encrypts it with a fresh random
    /// 24-byte nonce, and returns `(ciphertext_b64, nonce_b64)`.
    pub fn encrypt<T: Serialize>(&self, message: &T) -> Result<(String, String)> {
        let cipher = self.session_cipher()?;

        let mut nonce_bytes = [0u8; NONCE_SIZE];
        rand::RngCore::fill_bytes(&mut OsRng, &mut nonce_bytes);
        let nonce = XNonce::from_slice(&nonce_bytes);

        let plaintext = serde_json::to_vec(message)?;
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_ref())
            .map_err(|_| PhoenixError::DecryptError)?;

        Ok((base64_encode(&ciphertext), base64_encode(nonce_bytes)))
    }

    /// Decrypts and deserializes. On MAC failure or tampered input,
    /// returns `DecryptError` without distinguishing the cause.
    pub fn decrypt<T: DeserializeOwned>(&self, ciphertext_b64: &str, nonce_b64: &str) -> Result<T> {
        let cipher = self.session_cipher()?;

        let nonce_bytes = base64_decode(nonce_b64).map_err(|_| PhoenixError::DecryptError)?;
        if nonce_bytes.len() != NONCE_SIZE {
            return Err(PhoenixError::DecryptError);
        }
        let nonce = XNonce::from_slice(&nonce_bytes);

        let ciphertext = base64_decode(ciphertext_b64).map_err(|_| PhoenixError::DecryptError)?;
        let plaintext = cipher
            .decrypt(nonce, ciphertext.as_ref())
            .map_err(|_| PhoenixError::DecryptError)?;

        serde_json::from_slice(&plaintext).map_err(|_| PhoenixError::DecryptError)
    }

    /// Exports current key material for persistence.
    pub fn export(&self) -> Option<StoredKeys> {
        let (secret, public) = self.keypair.as_ref()?;
        Some(StoredKeys {
            secret_key: base64_encode(secret.to_bytes()),
            public_key: base64_encode(public.as_bytes()),
            peer_public_key: self.peer_public_key.as_ref().map(|pk| base64_encode(pk.as_bytes())),
        })
    }

    /// Re-imports previously exported key material, re-binding the peer
    /// key if one was present.
    pub fn import(stored: &StoredKeys) -> Result<Self> {
        let secret_bytes: [u8; 32] = base64_decode(&stored.secret_key)?
            .try_into()
            .map_err(|_| PhoenixError::PersistenceError("invalid secret key length".into()))?;
        let secret = StaticSecret::from(secret_bytes);
        let public = PublicKey::from(&secret);

        let declared_public = decode_public_key(&stored.public_key)?;
        if declared_public.as_bytes() != public.as_bytes() {
            return Err(PhoenixError::PersistenceError(
                "stored public key does not match derived public key".into(),
            ));
        }

        let peer_public_key = match &stored.peer_public_key {
            Some(pk) => Some(decode_public_key(pk)?),
            None => None,
        };

        Ok(CryptoEngine {
            keypair: Some((secret, public)),
            peer_public_key,
        })
    }
}

impl Default for CryptoEngine {
    fn default() -> Self {
        Self::new()
    }
}

fn decode_public_key(b64: &str) -> Result<PublicKey> {
    let bytes: [u8; 32] = base64_decode(b64)?
        .try_into()
        .map_err(|_| PhoenixError::InvalidPairingUri("public key must be 32 bytes".into()))?;
    Ok(PublicKey::from(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Serialize, Deserialize, PartialEq)]
    struct Msg {
        body: String,
    }

    fn paired() -> (CryptoEngine, CryptoEngine) {
        let mut a = CryptoEngine::new();
        let mut b = CryptoEngine::new();
        let pub_a = a.generate();
        let pub_b = b.generate();
        a.bind_peer(&pub_b).unwrap();
        b.bind_peer(&pub_a).unwrap();
        (a, b)
    }

    #[test]
    fn decrypt_inverts_encrypt() {
        let (a, b) = paired();
        let msg = Msg { body: "hello".into() };
        let (ct, nonce) = a.encrypt(&msg).unwrap();
        let decrypted: Msg = b.decrypt(&ct, &nonce).unwrap();
        assert_eq!(decrypted, msg);
    }

    #[test]
    fn tampered_ciphertext_fails_closed() {
        let (a, b) = paired();
        let msg = Msg { body: "hello".into() };
        let (ct, nonce) = a.encrypt(&msg).unwrap();

        let mut bad_bytes = base64_decode(&ct).unwrap();
        bad_bytes[0] ^= 0xFF;
        let bad_ct = base64_encode(&bad_bytes);

        let result: Result<Msg> = b.decrypt(&bad_ct, &nonce);
        assert!(matches!(result, Err(PhoenixError::DecryptError)));
    }

    #[test]
    fn tampered_nonce_fails_closed() {
        let (a, b) = paired();
        let msg = Msg { body: "hello".into() };
        let (ct, nonce) = a.encrypt(&msg).unwrap();

        let mut bad_nonce_bytes = base64_decode(&nonce).unwrap();
        bad_nonce_bytes[0] ^= 0xFF;
        let bad_nonce = base64_encode(&bad_nonce_bytes);

        let result: Result<Msg> = b.decrypt(&ct, &bad_nonce);
        assert!(matches!(result, Err(PhoenixError::DecryptError)));
    }

    #[test]
    fn encrypt_fails_fast_without_binding() {
        let mut a = CryptoEngine::new();
        a.generate();
        let result = a.encrypt(&Msg { body: "x".into() });
        assert!(matches!(result, Err(PhoenixError::NotConnected)));
    }

    #[test]
    fn bind_peer_rejects_pivot() {
        let mut a = CryptoEngine::new();
        a.generate();
        let mut other = CryptoEngine::new();
        let pub1 = other.generate();
        let mut yet_another = CryptoEngine::new();
        let pub2 = yet_another.generate();

        a.bind_peer(&pub1).unwrap();
        let err = a.bind_peer(&pub2).unwrap_err();
        assert!(matches!(err, PhoenixError::InvalidPairingUri(_)));
    }

    #[test]
    fn bind_peer_is_idempotent_for_the_same_key() {
        let mut a = CryptoEngine::new();
        a.generate();
        let mut other = CryptoEngine::new();
        let pub1 = other.generate();
        a.bind_peer(&pub1).unwrap();
        assert!(a.bind_peer(&pub1).is_ok());
    }

    #[test]
    fn export_import_round_trips_and_rebinds_peer() {
        let (mut a, mut b) = paired();
        let stored = a.export().unwrap();
        let restored = CryptoEngine::import(&stored).unwrap();

        let msg = Msg { body: "restored".into() };
        let (ct, nonce) = restored.encrypt(&msg).unwrap();
        let decrypted: Msg = b.decrypt(&ct, &nonce).unwrap();
        assert_eq!(decrypted, msg);

        // sanity: `a`'s own session still works independent of `restored`
        let (ct2, nonce2) = a.encrypt(&msg).unwrap();
        let decrypted2: Msg = b.decrypt(&ct2, &nonce2).unwrap();
        assert_eq!(decrypted2, msg);
        let _ = &mut b;
    }

    #[test]
    fn different_nonces_yield_different_ciphertext() {
        let (a, _b) = paired();
        let msg = Msg { body: "same".into() };
        let (ct1, nonce1) = a.encrypt(&msg).unwrap();
        let (ct2, nonce2) = a.encrypt(&msg).unwrap();
        assert_ne!(nonce1, nonce2);
        assert_ne!(ct1, ct2);
    }
}
