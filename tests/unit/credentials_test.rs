use std::io::Write;
use webssh_relay::relay::credentials::{resolve, AuthStrategy};
use webssh_relay::relay::{AuthMode, RelayError};
use webssh_relay::ssh::keys;
use zeroize::Zeroizing;

#[tokio::test]
async fn test_password_selected_when_present() {
    let strategy = resolve(
        Some(Zeroizing::new("secret".to_string())),
        std::path::Path::new("/nonexistent/key"),
        None,
    )
    .await
    .unwrap();
    assert_eq!(strategy.mode(), AuthMode::Password);
    assert_eq!(format!("{strategy:?}"), "Password(***)");
}

#[tokio::test]
async fn test_missing_key_fails_before_connecting() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("absent");
    let err = resolve(None, &path, None).await.unwrap_err();
    assert!(matches!(err, RelayError::KeyNotFound(_)));
    assert_eq!(err.reason(), "key_not_found");
    assert!(err.notice().contains("key not found"));
}

#[tokio::test]
async fn test_empty_key_file_is_unreadable() {
    let mut f = tempfile::NamedTempFile::new().unwrap();
    f.write_all(b"  \n").unwrap();
    let err = resolve(None, f.path(), None).await.unwrap_err();
    assert!(matches!(err, RelayError::KeyUnreadable(_)));
}

#[tokio::test]
async fn test_generated_key_resolves_to_key_strategy() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("id_ed25519");
    let key = keys::generate_client_key().unwrap();
    keys::save_private_key(&key, &path).unwrap();

    let strategy = resolve(None, &path, Some("unused")).await.unwrap();
    assert_eq!(strategy.mode(), AuthMode::PrivateKey);
    match strategy {
        AuthStrategy::PrivateKey { pem, passphrase } => {
            assert!(pem.contains("PRIVATE KEY"));
            assert_eq!(passphrase.as_deref().map(|p| p.as_str()), Some("unused"));
        }
        other => panic!("unexpected strategy: {other:?}"),
    }
}
