use super::{AuthMode, RelayError};
use std::io::ErrorKind;
use std::path::Path;
use zeroize::Zeroizing;

/// Authentication strategy for one session, selected once at accept time.
pub enum AuthStrategy {
    /// Single password attempt. If the server then offers
    /// keyboard-interactive, one round is answered with empty responses.
    Password(Zeroizing<String>),
    /// Process-wide private key, read from disk for this session. Decoding
    /// happens at authentication time so a malformed key fails like any
    /// other remote rejection.
    PrivateKey {
        pem: Zeroizing<String>,
        passphrase: Option<Zeroizing<String>>,
    },
}

impl AuthStrategy {
    pub fn mode(&self) -> AuthMode {
        match self {
            Self::Password(_) => AuthMode::Password,
            Self::PrivateKey { .. } => AuthMode::PrivateKey,
        }
    }
}

impl std::fmt::Debug for AuthStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Password(_) => f.write_str("Password(***)"),
            Self::PrivateKey { .. } => f.write_str("PrivateKey(***)"),
        }
    }
}

/// Pick the strategy for a session. Fails before any network attempt when
/// key auth is selected and the key file is absent or unreadable.
pub async fn resolve(
    password: Option<Zeroizing<String>>,
    key_path: &Path,
    passphrase: Option<&str>,
) -> Result<AuthStrategy, RelayError> {
    if let Some(password) = password {
        return Ok(AuthStrategy::Password(password));
    }

    let pem = match tokio::fs::read_to_string(key_path).await {
        Ok(pem) => Zeroizing::new(pem),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            return Err(RelayError::KeyNotFound(key_path.display().to_string()));
        }
        Err(e) => {
            return Err(RelayError::KeyUnreadable(format!(
                "{}: {}",
                key_path.display(),
                e
            )));
        }
    };
    if pem.trim().is_empty() {
        return Err(RelayError::KeyUnreadable(format!(
            "{}: empty file",
            key_path.display()
        )));
    }

    Ok(AuthStrategy::PrivateKey {
        pem,
        passphrase: passphrase.map(|p| Zeroizing::new(p.to_string())),
    })
}
