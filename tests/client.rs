mod common;

use std::net::SocketAddr;
use std::ops::ControlFlow;
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;

use common::TestApp;
use student_registry::client::{ApiClient, ClientError, Dashboard, EventStream, SessionState, SessionStore};
use student_registry::models::{Department, NewRegistration, ProfileChanges, RegistrationPatch};
use student_registry::router;

async fn serve() -> (SocketAddr, TestApp) {
    let t = TestApp::new();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = router(t.state.clone());
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    (addr, t)
}

fn client(addr: SocketAddr, session: Arc<SessionStore>) -> ApiClient {
    ApiClient::new(format!("http://{}/", addr), session)
}

fn registration(first_name: &str) -> NewRegistration {
    NewRegistration {
        first_name: Some(first_name.to_string()),
        last_name: Some("Lovelace".to_string()),
        email: Some("ada@example.com".to_string()),
        department: Some(Department::IctAndMathematics),
        ..Default::default()
    }
}

#[tokio::test]
async fn signup_establishes_session_and_attaches_token() {
    let (addr, _t) = serve().await;
    let session = Arc::new(SessionStore::in_memory());
    let api = client(addr, session.clone());

    let user = api
        .signup("Ada", "Lovelace", "Ada@Example.com", "pw12345")
        .await
        .unwrap();
    assert_eq!(user.email, "ada@example.com");
    assert_eq!(session.user().await.unwrap().id, user.id);

    let me = api.me().await.unwrap();
    assert_eq!(me.id, user.id);

    let renamed = api
        .update_me(&ProfileChanges {
            first_name: Some("Augusta".to_string()),
            ..Default::default()
        })
        .await
        .unwrap();
    assert_eq!(renamed.first_name, "Augusta");
    assert_eq!(session.user().await.unwrap().first_name, "Augusta");

    let created = api.create_registration(&registration("Ada")).await.unwrap();
    let fetched = api.registration(created.id).await.unwrap();
    assert_eq!(fetched, created);

    let updated = api
        .update_registration(
            created.id,
            &RegistrationPatch {
                phone: Some("999".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();
    assert_eq!(updated.phone.as_deref(), Some("999"));
    assert_eq!(updated.department, Some(Department::IctAndMathematics));
    assert_eq!(api.list_registrations().await.unwrap().len(), 1);
}

#[tokio::test]
async fn server_message_is_surfaced_verbatim() {
    let (addr, _t) = serve().await;
    let api = client(addr, Arc::new(SessionStore::in_memory()));
    api.signup("Ada", "Lovelace", "ada@example.com", "pw12345")
        .await
        .unwrap();
    api.logout().await.unwrap();

    match api.login("ada@example.com", "wrong").await {
        Err(ClientError::Server { status, message }) => {
            assert_eq!(status, 401);
            assert_eq!(message, "Invalid credentials");
        }
        other => panic!("unexpected result: {:?}", other),
    }

    let err = api.list_registrations().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
}

#[tokio::test]
async fn failed_login_keeps_current_session() {
    let (addr, _t) = serve().await;
    let session = Arc::new(SessionStore::in_memory());
    let api = client(addr, session.clone());
    let user = api
        .signup("Ada", "Lovelace", "ada@example.com", "pw12345")
        .await
        .unwrap();

    let err = api.login("ada@example.com", "wrong").await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert_eq!(session.user().await.unwrap().id, user.id);
    assert_eq!(api.me().await.unwrap().id, user.id);
}

#[tokio::test]
async fn rejected_token_forces_logout() {
    let (addr, _t) = serve().await;
    let session = Arc::new(SessionStore::in_memory());
    let api = client(addr, session.clone());
    let user = api
        .signup("Ada", "Lovelace", "ada@example.com", "pw12345")
        .await
        .unwrap();

    session
        .establish(SessionState {
            token: "expired.or.forged".to_string(),
            user,
        })
        .await
        .unwrap();
    let err = api.me().await.unwrap_err();
    assert_eq!(err.status(), Some(401));
    assert!(!session.is_authenticated().await);
    assert!(session.token().await.is_none());
}

#[tokio::test]
async fn dashboard_refreshes_on_push_events() {
    let (addr, _t) = serve().await;
    let session = Arc::new(SessionStore::in_memory());
    let writer = client(addr, session.clone());
    writer
        .signup("Ada", "Lovelace", "ada@example.com", "pw12345")
        .await
        .unwrap();

    let viewer = client(addr, session);
    let mut dashboard = Dashboard::new();
    dashboard.refresh(&viewer).await.unwrap();
    assert_eq!(dashboard.stats.as_ref().unwrap().total, 0);

    let mut events = EventStream::connect(&viewer).await.unwrap();
    let watcher = tokio::spawn(async move {
        dashboard
            .watch(&viewer, &mut events, |d| {
                if d.refreshes >= 2 {
                    ControlFlow::Break(())
                } else {
                    ControlFlow::Continue(())
                }
            })
            .await
            .unwrap();
        dashboard
    });

    let created = writer.create_registration(&registration("Ada")).await.unwrap();

    let dashboard = tokio::time::timeout(Duration::from_secs(5), watcher)
        .await
        .expect("no push event arrived")
        .unwrap();
    assert_eq!(dashboard.stats.as_ref().unwrap().total, 1);
    assert_eq!(dashboard.registrations.len(), 1);
    assert_eq!(dashboard.registrations[0].id, created.id);
}
