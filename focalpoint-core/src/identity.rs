//! Deterministic identities derived from a passphrase.
//!
//! 1. `entropy = SHA-512(passphrase)[..32]`
//! 2. `mnemonic = BIP39(entropy)`, 24 English words
//! 3. `master_seed = BIP39 seed(mnemonic, "")`
//! 4. `seed(account, address) = HMAC-SHA512("inconsiderable",
//!    master_seed || account || address)[..32]`
//! 5. Ed25519 keypair from that seed
//!
//! Keys previously handed out by the network were derived this way, so
//! every step must stay bit-exact. Nothing here touches disk or the
//! network, and secret intermediates are zeroized as they go out of scope.

use std::fmt;

use base64::Engine;
use bip39::Mnemonic;
use ed25519_dalek::{Signature, Signer, SigningKey, VerifyingKey};
use hmac::{Hmac, Mac};
use sha2::{Digest, Sha512};
use zeroize::Zeroizing;

type HmacSha512 = Hmac<Sha512>;

/// HMAC key separating per-address seeds from the master seed.
pub const DERIVATION_KEY: &[u8] = b"inconsiderable";

/// Addresses derived under each account.
pub const DEFAULT_ADDRESSES_PER_ACCOUNT: u8 = 7;

/// Accounts derived when importing a key set.
pub const DEFAULT_IMPORT_ACCOUNTS: u8 = 10;

/// Position of a keypair in the derivation tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DerivationPath {
    pub account: u8,
    pub address: u8,
}

impl fmt::Display for DerivationPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "m/{}/{}", self.account, self.address)
    }
}

/// An Ed25519 keypair derived from a passphrase.
///
/// The signing key is wiped on drop. There is intentionally no `Clone`,
/// and `Debug` shows only the path and public key.
pub struct DerivedKeypair {
    path: DerivationPath,
    signing_key: SigningKey,
}

impl DerivedKeypair {
    pub fn path(&self) -> DerivationPath {
        self.path
    }

    pub fn verifying_key(&self) -> VerifyingKey {
        self.signing_key.verifying_key()
    }

    /// Standard base64 of the 32-byte public key.
    pub fn public_key(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(self.verifying_key().to_bytes())
    }

    /// The 64-byte expanded private key (seed followed by public key).
    pub fn private_key_bytes(&self) -> Zeroizing<[u8; 64]> {
        Zeroizing::new(self.signing_key.to_keypair_bytes())
    }

    /// Detached signature over `message`.
    pub fn sign(&self, message: &[u8]) -> Signature {
        self.signing_key.sign(message)
    }
}

impl fmt::Debug for DerivedKeypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivedKeypair")
            .field("path", &self.path)
            .field("public_key", &self.public_key())
            .finish_non_exhaustive()
    }
}

/// 256 bits of entropy taken from the passphrase digest.
pub fn passphrase_entropy(passphrase: &str) -> Zeroizing<[u8; 32]> {
    let digest = Sha512::digest(passphrase.as_bytes());
    let mut entropy = Zeroizing::new([0u8; 32]);
    entropy.copy_from_slice(&digest[..32]);
    entropy
}

/// The 24-word mnemonic for a passphrase.
pub fn passphrase_to_mnemonic(passphrase: &str) -> Mnemonic {
    let entropy = passphrase_entropy(passphrase);
    // 32 bytes is a valid BIP39 entropy length, so this cannot fail.
    Mnemonic::from_entropy(entropy.as_slice()).expect("256-bit entropy always encodes")
}

fn master_seed(mnemonic: &Mnemonic) -> Zeroizing<[u8; 64]> {
    Zeroizing::new(mnemonic.to_seed(""))
}

/// Seed for one `(account, address)` position.
pub fn derive_seed(master_seed: &[u8; 64], path: DerivationPath) -> Zeroizing<[u8; 32]> {
    let mut mac =
        HmacSha512::new_from_slice(DERIVATION_KEY).expect("HMAC accepts keys of any length");
    mac.update(master_seed);
    mac.update(&[path.account, path.address]);
    let digest = mac.finalize().into_bytes();

    let mut seed = Zeroizing::new([0u8; 32]);
    seed.copy_from_slice(&digest[..32]);
    seed
}

/// Derive `account_count * addresses_per_account` keypairs, accounts in the
/// outer loop and addresses in the inner loop, both from zero.
pub fn derive(passphrase: &str, account_count: u8, addresses_per_account: u8) -> Vec<DerivedKeypair> {
    let mnemonic = passphrase_to_mnemonic(passphrase);
    let master = master_seed(&mnemonic);

    let mut keypairs =
        Vec::with_capacity(usize::from(account_count) * usize::from(addresses_per_account));
    for account in 0..account_count {
        for address in 0..addresses_per_account {
            let path = DerivationPath { account, address };
            let seed = derive_seed(&master, path);
            keypairs.push(DerivedKeypair {
                path,
                signing_key: SigningKey::from_bytes(&seed),
            });
        }
    }
    keypairs
}

/// Derive and keep only the public keys, in derivation order.
pub fn derive_public_keys(
    passphrase: &str,
    account_count: u8,
    addresses_per_account: u8,
) -> Vec<String> {
    derive(passphrase, account_count, addresses_per_account)
        .iter()
        .map(DerivedKeypair::public_key)
        .collect()
}
