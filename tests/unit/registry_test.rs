use std::sync::Arc;
use webssh_relay::relay::{AuthMode, LiveSession, SessionRegistry, SessionUpdate};

fn live(id: &str, host: &str) -> LiveSession {
    LiveSession::new(
        id.to_string(),
        host.to_string(),
        "tester".to_string(),
        AuthMode::Password,
        "10.0.0.1".to_string(),
    )
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_sessions_do_not_interfere() {
    let registry = Arc::new(SessionRegistry::new());
    let mut tasks = Vec::new();

    for i in 0..64 {
        let registry = registry.clone();
        tasks.push(tokio::spawn(async move {
            let id = format!("s{i}");
            registry
                .insert(live(&id, &format!("host{i}")))
                .expect("fresh id");
            registry.update(
                &id,
                SessionUpdate {
                    window: Some((100 + i, 30)),
                    ..Default::default()
                },
            );
            if i % 2 == 0 {
                registry.update(
                    &id,
                    SessionUpdate {
                        established: Some(true),
                        ..Default::default()
                    },
                );
            }
            if i % 4 == 0 {
                registry.remove(&id);
            }
        }));
    }
    for t in tasks {
        t.await.unwrap();
    }

    assert_eq!(registry.len(), 48);
    for snap in registry.snapshot() {
        let i: u32 = snap.id[1..].parse().unwrap();
        assert_eq!(snap.host, format!("host{i}"));
        assert_eq!(snap.window, Some((100 + i, 30)));
        assert_eq!(snap.established, i % 2 == 0);
    }
}

#[test]
fn test_duplicate_id_is_refused() {
    let registry = SessionRegistry::new();
    assert!(registry.insert(live("dup", "a")).is_some());
    assert!(registry.insert(live("dup", "b")).is_none());
    assert_eq!(registry.get("dup").unwrap().host, "a");
}

#[test]
fn test_update_unknown_id_is_noop() {
    let registry = SessionRegistry::new();
    assert!(!registry.update(
        "ghost",
        SessionUpdate {
            established: Some(true),
            ..Default::default()
        }
    ));
    assert!(registry.is_empty());
}

#[test]
fn test_established_never_reverts() {
    let registry = SessionRegistry::new();
    registry.insert(live("x", "h"));
    registry.update(
        "x",
        SessionUpdate {
            established: Some(true),
            ..Default::default()
        },
    );
    registry.update(
        "x",
        SessionUpdate {
            established: Some(false),
            ..Default::default()
        },
    );
    assert!(registry.get("x").unwrap().is_established());
}

#[test]
fn test_remove_twice_returns_none() {
    let registry = SessionRegistry::new();
    registry.insert(live("r", "h"));
    assert!(registry.remove("r").is_some());
    assert!(registry.remove("r").is_none());
    assert!(registry.get("r").is_none());
}
