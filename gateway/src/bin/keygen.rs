//! Generates the production and shadow RSA-4096 signing keys used by the
//! warrant authority, plus their public counterparts for the backend to
//! verify against. Skips any key pair that already exists.

use rsa::pkcs8::{EncodePrivateKey, EncodePublicKey, LineEnding};
use rsa::{RsaPrivateKey, RsaPublicKey};
use std::path::Path;

const KEY_BITS: usize = 4096;

fn generate_keypair_if_missing(private_path: &Path, public_path: &Path) -> anyhow::Result<()> {
    if private_path.exists() && public_path.exists() {
        tracing::info!(?private_path, "keypair already exists, skipping");
        return Ok(());
    }
    for path in [private_path, public_path] {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    let mut rng = rand::thread_rng();
    let private_key = RsaPrivateKey::new(&mut rng, KEY_BITS)?;
    let private_pem = private_key.to_pkcs8_pem(LineEnding::LF)?;
    std::fs::write(private_path, private_pem.as_bytes())?;

    let public_key = RsaPublicKey::from(&private_key);
    let public_pem = public_key.to_public_key_pem(LineEnding::LF)?;
    std::fs::write(public_path, public_pem.as_bytes())?;

    tracing::info!(?private_path, ?public_path, bits = KEY_BITS, "generated signing keypair");
    Ok(())
}

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().init();
    generate_keypair_if_missing(
        Path::new("keys/private_prime.pem"),
        Path::new("keys/public_prime.pem"),
    )?;
    generate_keypair_if_missing(
        Path::new("keys/private_shadow.pem"),
        Path::new("keys/public_shadow.pem"),
    )?;
    Ok(())
}
