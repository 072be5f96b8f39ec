use anyhow::{Context, Result};
use russh::keys::{Algorithm, PrivateKey};
use std::path::Path;

/// Decode a client private key (OpenSSH, PKCS#8 or PKCS#1 PEM).
pub fn decode_private_key(pem: &str, passphrase: Option<&str>) -> Result<PrivateKey> {
    russh::keys::decode_secret_key(pem, passphrase)
        .map_err(|e| anyhow::anyhow!("decoding private key: {}", e))
}

pub fn load_private_key(path: &Path, passphrase: Option<&str>) -> Result<PrivateKey> {
    let pem = zeroize::Zeroizing::new(
        std::fs::read_to_string(path)
            .with_context(|| format!("reading private key: {}", path.display()))?,
    );
    decode_private_key(&pem, passphrase)
}

pub fn generate_client_key() -> Result<PrivateKey> {
    PrivateKey::random(&mut rand::rngs::OsRng, Algorithm::Ed25519)
        .map_err(|e| anyhow::anyhow!("Ed25519 key generation failed: {}", e))
}

/// `authorized_keys` line for the key.
pub fn public_key_line(key: &PrivateKey) -> Result<String> {
    key.public_key()
        .to_openssh()
        .map_err(|e| anyhow::anyhow!("encoding public key: {}", e))
}

pub fn save_private_key(key: &PrivateKey, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("creating directory: {}", parent.display()))?;
        }
    }

    let mut buf = zeroize::Zeroizing::new(Vec::new());
    russh::keys::encode_pkcs8_pem(key, &mut *buf)
        .map_err(|e| anyhow::anyhow!("encoding private key: {}", e))?;

    // Write with restrictive permissions from the start (no TOCTOU window)
    #[cfg(unix)]
    {
        use std::io::Write;
        use std::os::unix::fs::OpenOptionsExt;
        let mut file = std::fs::OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .mode(0o600)
            .open(path)
            .with_context(|| format!("creating key file: {}", path.display()))?;
        file.write_all(&buf)
            .with_context(|| format!("writing private key: {}", path.display()))?;
    }

    #[cfg(not(unix))]
    {
        std::fs::write(path, &*buf)
            .with_context(|| format!("writing private key: {}", path.display()))?;
    }

    Ok(())
}
