//! Behaviour tests for SessionManager against a fake backend

mod common;

use booth_client::AuthResponse;
use booth_core::{BoothError, Registration, Role, SessionStatus};
use booth_session::{
    decode_stored_user, FileSessionStore, MemorySessionStore, SessionManager, SessionStore,
    TOKEN_KEY, USER_KEY,
};
use common::{ann_profile, Failure, FakeBackend, FlakyStore};
use std::sync::Arc;
use tempfile::TempDir;

fn setup(backend: FakeBackend) -> (Arc<SessionManager>, Arc<FakeBackend>, Arc<MemorySessionStore>) {
    let backend = Arc::new(backend);
    let store = Arc::new(MemorySessionStore::new());
    let manager = Arc::new(SessionManager::new(backend.clone(), store.clone()));
    manager.restore();
    (manager, backend, store)
}

async fn wait_for_call(backend: &FakeBackend, call: &str) {
    while !backend.calls().iter().any(|c| c == call) {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn test_login_scenario_ann() {
    let (manager, backend, store) = setup(FakeBackend::with_ann());
    assert_eq!(manager.current_session().status(), SessionStatus::Anonymous);

    let session = manager.login("a@x.com", "secret").await.unwrap();

    let user = session.user().unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.display_name, "Ann");
    assert_eq!(user.email, "a@x.com");
    assert_eq!(user.role, Some(Role::Admin));
    assert_eq!(user.phone.as_deref(), Some("0812345678"));
    assert!(user.created_at.is_some());
    assert_eq!(session.token(), Some("T1"));
    assert_eq!(session.status(), SessionStatus::Authenticated);
    assert_eq!(manager.current_session(), session);

    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("T1"));
    let stored_user = decode_stored_user(&store.get(USER_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(&stored_user, user);

    assert_eq!(backend.calls(), vec!["login a@x.com", "me T1"]);
}

#[tokio::test]
async fn test_login_while_authenticated_replaces_session() {
    let backend = FakeBackend::with_ann();
    backend.add_account(
        "b@x.com",
        "hunter22",
        "T2",
        booth_client::RawProfile {
            object_id: Some("u2".to_string()),
            name: Some("Bob".to_string()),
            role: Some("member".to_string()),
            ..Default::default()
        },
    );
    let (manager, _, store) = setup(backend);

    manager.login("a@x.com", "secret").await.unwrap();
    let session = manager.login("b@x.com", "hunter22").await.unwrap();

    assert_eq!(session.user().unwrap().id, "u2");
    assert_eq!(session.role(), Some(Role::Member));
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("T2"));
}

#[tokio::test]
async fn test_logout_clears_state_even_when_backend_fails() {
    let (manager, backend, store) = setup(FakeBackend::with_ann());
    manager.login("a@x.com", "secret").await.unwrap();
    backend.fail_logout(Failure::ServerError);

    let notification = manager.logout().expect("a token was held");

    // Local state is gone before the backend has answered
    let session = manager.current_session();
    assert_eq!(session.status(), SessionStatus::Anonymous);
    assert!(session.user().is_none());
    assert!(session.token().is_none());
    assert!(store.is_empty());

    notification.await.unwrap();
    assert!(backend.calls().contains(&"logout T1".to_string()));
    assert!(!manager.current_session().is_authenticated());
}

#[tokio::test]
async fn test_logout_when_anonymous_skips_backend() {
    let (manager, backend, _) = setup(FakeBackend::with_ann());

    assert!(manager.logout().is_none());
    assert_eq!(manager.current_session().status(), SessionStatus::Anonymous);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_logout_before_restore_is_ignored() {
    let manager = SessionManager::new(
        Arc::new(FakeBackend::with_ann()),
        Arc::new(MemorySessionStore::new()),
    );

    assert!(manager.logout().is_none());
    assert_eq!(manager.current_session().status(), SessionStatus::Uninitialized);
}

#[tokio::test]
async fn test_login_before_restore_is_rejected() {
    let backend = Arc::new(FakeBackend::with_ann());
    let manager = SessionManager::new(backend.clone(), Arc::new(MemorySessionStore::new()));

    let result = manager.login("a@x.com", "secret").await;
    assert!(matches!(result, Err(BoothError::Validation { .. })));
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_session_survives_restart() {
    let temp_dir = TempDir::new().unwrap();

    let first = SessionManager::new(
        Arc::new(FakeBackend::with_ann()),
        Arc::new(FileSessionStore::new(temp_dir.path())),
    );
    first.restore();
    let logged_in = first.login("a@x.com", "secret").await.unwrap();
    drop(first);

    let backend = Arc::new(FakeBackend::new());
    let second = SessionManager::new(
        backend.clone(),
        Arc::new(FileSessionStore::new(temp_dir.path())),
    );
    let restored = second.restore();

    assert_eq!(restored.status(), SessionStatus::Authenticated);
    assert_eq!(restored.user(), logged_in.user());
    assert_eq!(restored.token(), Some("T1"));
    // Restoring never talks to the backend
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_corrupt_stored_user_restores_anonymous() {
    let temp_dir = TempDir::new().unwrap();
    let store = Arc::new(FileSessionStore::new(temp_dir.path()));
    store
        .set_all(&[(TOKEN_KEY, "T1"), (USER_KEY, "{not json")])
        .unwrap();

    let manager = SessionManager::new(Arc::new(FakeBackend::new()), store.clone());
    let session = manager.restore();

    assert_eq!(session.status(), SessionStatus::Anonymous);
    assert!(session.user().is_none());
    assert_eq!(store.get(TOKEN_KEY).unwrap(), None);
    assert_eq!(store.get(USER_KEY).unwrap(), None);
}

#[test]
fn test_restore_survives_failing_cleanup() {
    let store = Arc::new(FlakyStore::new());
    store
        .set_all(&[(TOKEN_KEY, "T1"), (USER_KEY, r#"{"id":""}"#)])
        .unwrap();
    store.fail_removes(true);

    let manager = SessionManager::new(Arc::new(FakeBackend::new()), store);
    assert_eq!(manager.restore().status(), SessionStatus::Anonymous);
}

#[tokio::test]
async fn test_profile_failure_falls_back_to_login_response() {
    let backend = FakeBackend::with_ann();
    backend.set_login_body(AuthResponse {
        success: true,
        token: Some("T1".to_string()),
        profile: booth_client::RawProfile {
            object_id: Some("u1".to_string()),
            name: Some("Ann".to_string()),
            email: Some("a@x.com".to_string()),
            ..Default::default()
        },
        ..Default::default()
    });
    backend.fail_me(Some(Failure::ServerError));
    let (manager, _, _) = setup(backend);

    let session = manager.login("a@x.com", "secret").await.unwrap();
    let user = session.user().unwrap();
    assert_eq!(user.id, "u1");
    assert_eq!(user.display_name, "Ann");
    assert_eq!(user.role, None);
    assert_eq!(session.token(), Some("T1"));
}

#[tokio::test]
async fn test_fallback_prefers_embedded_profile() {
    let backend = FakeBackend::with_ann();
    backend.set_login_body(AuthResponse {
        success: true,
        token: Some("T1".to_string()),
        data: Some(serde_json::json!({"_id": "u1", "name": "Ann", "role": "user"})),
        ..Default::default()
    });
    backend.fail_me(Some(Failure::NotSuccess));
    let (manager, _, _) = setup(backend);

    let session = manager.login("a@x.com", "secret").await.unwrap();
    let user = session.user().unwrap();
    assert_eq!(user.role, Some(Role::Member));
    // No email in the response, so the login email is used
    assert_eq!(user.email, "a@x.com");
}

#[tokio::test]
async fn test_fallback_without_identity_is_protocol_error() {
    let backend = FakeBackend::with_ann();
    backend.set_login_body(AuthResponse {
        success: true,
        token: Some("T1".to_string()),
        ..Default::default()
    });
    backend.fail_me(Some(Failure::Network));
    let (manager, _, store) = setup(backend);

    let result = manager.login("a@x.com", "secret").await;
    assert!(matches!(result, Err(BoothError::Protocol { .. })));
    assert_eq!(manager.current_session().status(), SessionStatus::Anonymous);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_rejected_credentials() {
    let (manager, _, store) = setup(FakeBackend::with_ann());

    let error = manager.login("a@x.com", "wrong").await.unwrap_err();
    assert!(matches!(error, BoothError::Authentication { .. }));
    assert_eq!(error.user_message(), "Invalid credentials");
    assert!(!manager.current_session().is_authenticated());
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_unsuccessful_login_body() {
    let backend = FakeBackend::with_ann();
    backend.set_login_body(AuthResponse {
        success: false,
        message: Some("Account locked".to_string()),
        ..Default::default()
    });
    let (manager, backend, _) = setup(backend);

    let error = manager.login("a@x.com", "secret").await.unwrap_err();
    assert_eq!(error.user_message(), "Account locked");

    backend.set_login_body(AuthResponse::default());
    let error = manager.login("a@x.com", "secret").await.unwrap_err();
    assert!(matches!(error, BoothError::Authentication { .. }));
    assert_eq!(error.user_message(), "Login failed");
}

#[tokio::test]
async fn test_login_without_token_is_protocol_error() {
    let backend = FakeBackend::with_ann();
    backend.set_login_body(AuthResponse {
        success: true,
        token: Some("   ".to_string()),
        ..Default::default()
    });
    let (manager, backend, _) = setup(backend);

    let error = manager.login("a@x.com", "secret").await.unwrap_err();
    assert!(matches!(error, BoothError::Protocol { .. }));
    assert_eq!(error.user_message(), "Invalid response from server");
    // No profile lookup without a token
    assert_eq!(backend.calls(), vec!["login a@x.com"]);
}

#[tokio::test]
async fn test_unreachable_backend() {
    let backend = FakeBackend::with_ann();
    backend.fail_login(Failure::Network);
    let (manager, _, _) = setup(backend);

    let error = manager.login("a@x.com", "secret").await.unwrap_err();
    assert!(matches!(error, BoothError::Network { .. }));
    assert!(error.is_recoverable());
}

#[tokio::test]
async fn test_empty_credentials_never_reach_backend() {
    let (manager, backend, _) = setup(FakeBackend::with_ann());

    let error = manager.login("   ", "secret").await.unwrap_err();
    assert!(matches!(error, BoothError::Validation { .. }));
    let error = manager.login("a@x.com", "").await.unwrap_err();
    assert!(matches!(error, BoothError::Validation { .. }));

    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_storage_failure_fails_login_without_publishing() {
    let backend = Arc::new(FakeBackend::with_ann());
    let store = Arc::new(FlakyStore::new());
    let manager = SessionManager::new(backend, store.clone());
    manager.restore();
    let mut updates = manager.subscribe();
    updates.borrow_and_update();

    store.fail_writes(true);
    let error = manager.login("a@x.com", "secret").await.unwrap_err();
    assert!(matches!(error, BoothError::Storage { .. }));
    assert_eq!(manager.current_session().status(), SessionStatus::Anonymous);
    assert!(!updates.has_changed().unwrap());

    store.fail_writes(false);
    assert!(manager.login("a@x.com", "secret").await.is_ok());
}

#[tokio::test]
async fn test_overlapping_logins_latest_wins() {
    let backend = FakeBackend::with_ann();
    backend.add_account(
        "b@x.com",
        "hunter22",
        "T2",
        booth_client::RawProfile {
            object_id: Some("u2".to_string()),
            name: Some("Bob".to_string()),
            ..Default::default()
        },
    );
    let gate = backend.gate_login("a@x.com");
    let (manager, backend, store) = setup(backend);

    let slow = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login("a@x.com", "secret").await })
    };
    wait_for_call(&backend, "login a@x.com").await;

    let fast = manager.login("b@x.com", "hunter22").await.unwrap();
    assert_eq!(fast.user().unwrap().id, "u2");

    gate.notify_one();
    let slow_result = slow.await.unwrap();
    assert!(matches!(slow_result, Err(BoothError::Superseded { .. })));

    let session = manager.current_session();
    assert_eq!(session.user().unwrap().id, "u2");
    assert_eq!(session.token(), Some("T2"));
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("T2"));
}

#[tokio::test]
async fn test_logout_during_login_wins() {
    let backend = FakeBackend::with_ann();
    let gate = backend.gate_login("a@x.com");
    let (manager, backend, store) = setup(backend);

    let pending = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login("a@x.com", "secret").await })
    };
    wait_for_call(&backend, "login a@x.com").await;

    assert!(manager.logout().is_none());
    gate.notify_one();

    let result = pending.await.unwrap();
    assert!(matches!(result, Err(BoothError::Superseded { .. })));
    assert_eq!(manager.current_session().status(), SessionStatus::Anonymous);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_subscribers_see_durable_snapshots() {
    let backend = Arc::new(FakeBackend::with_ann());
    let store = Arc::new(MemorySessionStore::new());
    let manager = SessionManager::new(backend, store.clone());
    let mut updates = manager.subscribe();
    assert_eq!(updates.borrow().status(), SessionStatus::Uninitialized);

    manager.restore();
    assert_eq!(
        updates.borrow_and_update().status(),
        SessionStatus::Anonymous
    );

    let observer = {
        let store = store.clone();
        tokio::spawn(async move {
            updates.changed().await.unwrap();
            let session = updates.borrow_and_update().clone();
            // The write happened before the publish
            let stored_token = store.get(TOKEN_KEY).unwrap();
            (session, stored_token)
        })
    };

    manager.login("a@x.com", "secret").await.unwrap();
    let (session, stored_token) = observer.await.unwrap();

    assert!(session.is_authenticated());
    assert_eq!(session.user().is_some(), session.token().is_some());
    assert_eq!(stored_token.as_deref(), session.token());
}

#[tokio::test]
async fn test_refresh_updates_profile() {
    let (manager, backend, store) = setup(FakeBackend::with_ann());
    manager.login("a@x.com", "secret").await.unwrap();

    backend.set_profile(
        "a@x.com",
        booth_client::RawProfile {
            name: Some("Ann Lee".to_string()),
            role: Some("member".to_string()),
            email: None,
            ..ann_profile()
        },
    );
    let session = manager.refresh().await.unwrap();

    let user = session.user().unwrap();
    assert_eq!(user.display_name, "Ann Lee");
    assert_eq!(user.role, Some(Role::Member));
    assert_eq!(user.email, "a@x.com");
    assert_eq!(session.token(), Some("T1"));

    let stored = decode_stored_user(&store.get(USER_KEY).unwrap().unwrap()).unwrap();
    assert_eq!(stored.display_name, "Ann Lee");
}

#[tokio::test]
async fn test_refresh_with_rejected_token_logs_out() {
    for failure in [Failure::Unauthorized, Failure::NotSuccess] {
        let (manager, backend, store) = setup(FakeBackend::with_ann());
        manager.login("a@x.com", "secret").await.unwrap();
        backend.fail_me(Some(failure));

        let session = manager.refresh().await.unwrap();
        assert_eq!(session.status(), SessionStatus::Anonymous);
        assert_eq!(manager.current_session(), session);
        assert!(store.is_empty());
    }
}

#[tokio::test]
async fn test_refresh_keeps_session_on_transient_failure() {
    for failure in [Failure::Network, Failure::ServerError] {
        let (manager, backend, store) = setup(FakeBackend::with_ann());
        let before = manager.login("a@x.com", "secret").await.unwrap();
        backend.fail_me(Some(failure));

        let error = manager.refresh().await.unwrap_err();
        assert!(error.is_recoverable());
        assert_eq!(manager.current_session(), before);
        assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("T1"));
    }
}

/// Manager restored from a stored session for Ann with token `T0`
fn restored_with_old_token(
    backend: FakeBackend,
) -> (Arc<SessionManager>, Arc<FakeBackend>, Arc<MemorySessionStore>) {
    let backend = Arc::new(backend);
    let store = Arc::new(MemorySessionStore::with_entries(&[
        (TOKEN_KEY, "T0"),
        (USER_KEY, r#"{"id":"u1","email":"a@x.com"}"#),
    ]));
    let manager = Arc::new(SessionManager::new(backend.clone(), store.clone()));
    assert!(manager.restore().is_authenticated());
    (manager, backend, store)
}

#[tokio::test]
async fn test_refresh_cannot_restore_session_replaced_by_login() {
    let backend = FakeBackend::with_ann();
    // T0 is still valid for Ann
    backend.add_account("old@x.com", "unused", "T0", ann_profile());
    backend.add_account(
        "b@x.com",
        "hunter22",
        "T2",
        booth_client::RawProfile {
            object_id: Some("u2".to_string()),
            name: Some("Bob".to_string()),
            ..Default::default()
        },
    );
    let login_gate = backend.gate_login("b@x.com");
    let me_gate = backend.gate_me("T0");
    let (manager, backend, store) = restored_with_old_token(backend);

    let login = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.login("b@x.com", "hunter22").await })
    };
    wait_for_call(&backend, "login b@x.com").await;

    let refresh = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.refresh().await })
    };
    wait_for_call(&backend, "me T0").await;

    login_gate.notify_one();
    let logged_in = login.await.unwrap().unwrap();
    assert_eq!(logged_in.user().unwrap().id, "u2");

    me_gate.notify_one();
    let refreshed = refresh.await.unwrap();
    assert!(matches!(refreshed, Err(BoothError::Superseded { .. })));

    let session = manager.current_session();
    assert_eq!(session.user().unwrap().id, "u2");
    assert_eq!(session.token(), Some("T2"));
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("T2"));
}

#[tokio::test]
async fn test_rejected_old_token_does_not_expire_new_login() {
    // No account holds T0, so the backend answers 401 for it
    let backend = FakeBackend::with_ann();
    let me_gate = backend.gate_me("T0");
    let (manager, backend, store) = restored_with_old_token(backend);

    let refresh = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.refresh().await })
    };
    wait_for_call(&backend, "me T0").await;

    let logged_in = manager.login("a@x.com", "secret").await.unwrap();
    assert_eq!(logged_in.token(), Some("T1"));

    me_gate.notify_one();
    let refreshed = refresh.await.unwrap();
    assert!(matches!(refreshed, Err(BoothError::Superseded { .. })));

    let session = manager.current_session();
    assert!(session.is_authenticated());
    assert_eq!(session.token(), Some("T1"));
    assert_eq!(store.get(TOKEN_KEY).unwrap().as_deref(), Some("T1"));
}

#[tokio::test]
async fn test_refresh_during_logout_stays_logged_out() {
    let backend = FakeBackend::with_ann();
    let me_gate = backend.gate_me("T1");
    let (manager, backend, store) = setup(backend);
    // Let the login's own profile lookup through
    me_gate.notify_one();
    manager.login("a@x.com", "secret").await.unwrap();

    let refresh = {
        let manager = manager.clone();
        tokio::spawn(async move { manager.refresh().await })
    };
    while backend.calls().iter().filter(|c| *c == "me T1").count() < 2 {
        tokio::task::yield_now().await;
    }

    manager.logout();
    me_gate.notify_one();

    let refreshed = refresh.await.unwrap();
    assert!(matches!(refreshed, Err(BoothError::Superseded { .. })));
    assert_eq!(manager.current_session().status(), SessionStatus::Anonymous);
    assert!(store.is_empty());
}

#[tokio::test]
async fn test_refresh_when_anonymous_is_noop() {
    let (manager, backend, _) = setup(FakeBackend::with_ann());

    let session = manager.refresh().await.unwrap();
    assert_eq!(session.status(), SessionStatus::Anonymous);
    assert!(backend.calls().is_empty());
}

#[tokio::test]
async fn test_register_leaves_session_alone() {
    let (manager, backend, store) = setup(FakeBackend::with_ann());

    let registration = Registration::new("Bob", "b@x.com", "0898765432", "hunter22", Role::Member);
    let response = manager.register(&registration).await.unwrap();
    assert!(response.success);
    assert_eq!(response.profile.role.as_deref(), Some("member"));
    assert_eq!(manager.current_session().status(), SessionStatus::Anonymous);
    assert!(store.is_empty());

    // The new account can log in
    let session = manager.login("b@x.com", "hunter22").await.unwrap();
    assert_eq!(session.user().unwrap().display_name, "Bob");

    let duplicate = Registration::new("Ann", "a@x.com", "0812345678", "secret", Role::Admin);
    let error = manager.register(&duplicate).await.unwrap_err();
    assert_eq!(error.user_message(), "Email already registered");

    let calls_before = backend.calls().len();
    let blank = Registration::new(" ", "c@x.com", "", "pw", Role::Member);
    assert!(matches!(
        manager.register(&blank).await,
        Err(BoothError::Validation { .. })
    ));
    assert_eq!(backend.calls().len(), calls_before);
}

#[tokio::test]
async fn test_concurrent_readers_never_see_torn_session() {
    let (manager, _, _) = setup(FakeBackend::with_ann());

    let readers: Vec<_> = (0..4)
        .map(|_| {
            let manager = manager.clone();
            tokio::spawn(async move {
                for _ in 0..200 {
                    let session = manager.current_session();
                    assert_eq!(session.user().is_some(), session.token().is_some());
                    tokio::task::yield_now().await;
                }
            })
        })
        .collect();

    for _ in 0..20 {
        manager.login("a@x.com", "secret").await.unwrap();
        manager.logout();
    }

    for result in futures::future::join_all(readers).await {
        result.unwrap();
    }
}
