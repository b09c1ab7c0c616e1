use super::*;
use crate::backend::{BackendEvent, FixtureBackend};
use crate::test_support::fixture_backend;
use tempfile::TempDir;

fn manager_with(backend: Arc<FixtureBackend>, dir: &Path) -> SessionManager {
    SessionManager::new(
        backend,
        CredentialStore::open(dir).unwrap(),
        Duration::from_secs(5),
    )
}

fn manager(dir: &Path) -> (SessionManager, Arc<FixtureBackend>) {
    let backend = fixture_backend();
    (manager_with(backend.clone(), dir), backend)
}

#[tokio::test]
async fn test_login_then_logout_round_trip() {
    let dir = TempDir::new().unwrap();
    let (session, backend) = manager(dir.path());
    assert_eq!(session.state(), AuthState::LoggedOut);

    let outcome = session
        .login(LoginRequest::with_password("alice", "pw"))
        .await
        .unwrap();
    assert!(outcome.is_ok());
    assert!(session.is_logged_in());
    assert_eq!(session.require_session().unwrap().account, "alice");

    session.logout().await;
    assert!(!session.is_logged_in());
    assert!(!backend.is_connected());
    assert_eq!(
        session.require_session(),
        Err(GatewayError::NotAuthenticated)
    );

    // Idempotent.
    session.logout().await;
    assert_eq!(session.state(), AuthState::LoggedOut);
}

#[tokio::test]
async fn test_failed_login_is_an_outcome_and_persists_nothing() {
    let dir = TempDir::new().unwrap();
    let (session, _backend) = manager(dir.path());

    let outcome = session
        .login(LoginRequest::with_password("alice", "wrong"))
        .await
        .unwrap();
    assert_eq!(outcome.result, LoginResult::InvalidCredentials);
    assert_eq!(session.state(), AuthState::LoggedOut);
    assert!(!session.relogin_available());
    assert!(!dir.path().join("lastuser").exists());
}

#[tokio::test]
async fn test_needs_2fa_outcome() {
    let dir = TempDir::new().unwrap();
    let (session, _backend) = manager(dir.path());
    let outcome = session
        .login(LoginRequest::with_password("bob", "secret"))
        .await
        .unwrap();
    assert_eq!(outcome.result, LoginResult::Needs2fa);
    assert!(!session.is_logged_in());
}

#[tokio::test]
async fn test_relogin_available_after_login() {
    let dir = TempDir::new().unwrap();
    let (session, _backend) = manager(dir.path());
    assert!(!session.relogin_available());

    session
        .login(LoginRequest::with_password("alice", "pw"))
        .await
        .unwrap();
    assert!(session.relogin_available());
}

#[tokio::test]
async fn test_relogin_resumes_in_a_new_process() {
    let dir = TempDir::new().unwrap();
    let (first, _backend) = manager(dir.path());
    first
        .login(LoginRequest::with_password("alice", "pw"))
        .await
        .unwrap();

    let (second, _backend) = manager(dir.path());
    let outcome = second.relogin_from_saved(None).await.unwrap();
    assert_eq!(outcome, LoginOutcome::ok("alice"));
    assert!(second.is_logged_in());

    let named = second.relogin_from_saved(Some("alice")).await.unwrap();
    assert!(named.is_ok());
}

#[tokio::test]
async fn test_relogin_without_saved_session() {
    let dir = TempDir::new().unwrap();
    let (session, _backend) = manager(dir.path());
    let outcome = session.relogin_from_saved(None).await.unwrap();
    assert_eq!(outcome.result, LoginResult::NoSavedSession);
    assert_eq!(session.state(), AuthState::LoggedOut);

    let outcome = session.relogin_from_saved(Some("bob")).await.unwrap();
    assert_eq!(outcome.result, LoginResult::NoSavedSession);
}

#[tokio::test]
async fn test_relogin_with_malformed_token_has_no_saved_session() {
    let dir = TempDir::new().unwrap();
    let (session, _backend) = manager(dir.path());
    session
        .login(LoginRequest::with_password("alice", "pw"))
        .await
        .unwrap();
    std::fs::write(dir.path().join("alice.key"), "").unwrap();

    assert!(!session.relogin_available());
    let outcome = session.relogin_from_saved(None).await.unwrap();
    assert_eq!(outcome.result, LoginResult::NoSavedSession);
}

#[tokio::test]
async fn test_relogin_with_rejected_token() {
    let dir = TempDir::new().unwrap();
    let store = CredentialStore::open(dir.path()).unwrap();
    store.save("alice", "bm90LWEtdG9rZW4").unwrap();
    let (session, _backend) = manager(dir.path());

    let outcome = session.relogin_from_saved(None).await.unwrap();
    assert_eq!(outcome.result, LoginResult::InvalidCredentials);
    assert!(!session.is_logged_in());
}

#[tokio::test]
async fn test_concurrent_login_is_rejected() {
    let dir = TempDir::new().unwrap();
    let backend = fixture_backend();
    backend.set_auth_delay(Duration::from_millis(200));
    let session = Arc::new(manager_with(backend, dir.path()));

    let first = {
        let session = session.clone();
        tokio::spawn(async move {
            session
                .login(LoginRequest::with_password("alice", "pw"))
                .await
        })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(session.state(), AuthState::Authenticating);

    let second = session
        .login(LoginRequest::with_password("alice", "pw"))
        .await;
    assert_eq!(second, Err(GatewayError::LoginInProgress));
    assert_eq!(
        session.relogin_from_saved(None).await,
        Err(GatewayError::LoginInProgress)
    );

    assert!(first.await.unwrap().unwrap().is_ok());
    assert!(session.is_logged_in());
}

#[tokio::test]
async fn test_auth_timeout_reports_network_error() {
    let dir = TempDir::new().unwrap();
    let backend = fixture_backend();
    backend.set_auth_delay(Duration::from_secs(2));
    let session = SessionManager::new(
        backend,
        CredentialStore::open(dir.path()).unwrap(),
        Duration::from_millis(50),
    );

    let outcome = session
        .login(LoginRequest::with_password("alice", "pw"))
        .await
        .unwrap();
    assert_eq!(outcome.result, LoginResult::NetworkError);
    assert!(outcome.message.unwrap().contains("timed out"));
    assert_eq!(session.state(), AuthState::Disconnected);
}

#[tokio::test]
async fn test_disconnect_requires_new_login() {
    let dir = TempDir::new().unwrap();
    let (session, backend) = manager(dir.path());
    let mut changes = session.subscribe();
    session
        .login(LoginRequest::with_password("alice", "pw"))
        .await
        .unwrap();

    backend.emit(BackendEvent::Disconnected {
        reason: "reset".to_string(),
    });
    session.mark_disconnected("reset");

    assert_eq!(session.state(), AuthState::Disconnected);
    assert_eq!(
        session.require_session(),
        Err(GatewayError::NotAuthenticated)
    );
    assert!(changes.has_changed().unwrap());
    assert_eq!(*changes.borrow_and_update(), AuthState::Disconnected);

    // A second notice changes nothing.
    session.mark_disconnected("again");
    assert!(!changes.has_changed().unwrap());

    assert!(session.relogin_from_saved(None).await.unwrap().is_ok());
    assert!(session.is_logged_in());
}

#[tokio::test]
async fn test_anonymous_session_is_not_persisted() {
    let dir = TempDir::new().unwrap();
    let (session, _backend) = manager(dir.path());
    let request = LoginRequest {
        user: "anonymous".to_string(),
        ..LoginRequest::default()
    };
    assert!(session.login(request).await.unwrap().is_ok());
    assert!(session.require_session().unwrap().is_anonymous());
    assert!(!session.relogin_available());
}

#[tokio::test]
async fn test_set_credential_location_switches_store() {
    let dir = TempDir::new().unwrap();
    let (session, _backend) = manager(dir.path());
    session
        .login(LoginRequest::with_password("alice", "pw"))
        .await
        .unwrap();
    assert!(session.relogin_available());

    let other = dir.path().join("elsewhere");
    assert!(session.set_credential_location(&other));
    assert_eq!(session.credential_dir(), other);
    assert!(!session.relogin_available());

    let blocker = dir.path().join("file");
    std::fs::write(&blocker, "x").unwrap();
    assert!(!session.set_credential_location(&blocker.join("sub")));
    assert_eq!(session.credential_dir(), other);
}
