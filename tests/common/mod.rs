#![allow(dead_code)]

use axum::body::Body;
use axum::http::{header, Method, Request, StatusCode};
use axum::Router;
use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;
use uuid::Uuid;

use student_registry::auth::hash_password;
use student_registry::models::{Role, UserAccount};
use student_registry::notify::BroadcastBus;
use student_registry::store::{CredentialStore, MemoryStore};
use student_registry::token::TokenService;
use student_registry::{router, AppState};

pub const SECRET: &[u8] = b"integration-secret";

pub struct TestApp {
    pub app: Router,
    pub state: AppState,
    pub store: Arc<MemoryStore>,
}

impl TestApp {
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let bus = Arc::new(BroadcastBus::new(16));
        let tokens = TokenService::new(SECRET, chrono::Duration::days(7));
        let state = AppState::new(store.clone(), tokens, bus);
        Self {
            app: router(state.clone()),
            state,
            store,
        }
    }

    pub async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Option<Value>,
    ) -> (StatusCode, Value) {
        let mut builder = Request::builder().method(method).uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        let request = match body {
            Some(json) => builder
                .header(header::CONTENT_TYPE, "application/json")
                .body(Body::from(json.to_string()))
                .unwrap(),
            None => builder.body(Body::empty()).unwrap(),
        };

        let response = self.app.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).into_owned()))
        };
        (status, value)
    }

    /// Signs up a student and returns `(token, user id)`.
    pub async fn signup(&self, first_name: &str, email: &str) -> (String, String) {
        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/signup",
                None,
                Some(serde_json::json!({
                    "firstName": first_name,
                    "lastName": "Tester",
                    "email": email,
                    "password": "pw12345"
                })),
            )
            .await;
        assert_eq!(status, StatusCode::CREATED, "signup failed: {}", body);
        (
            body["token"].as_str().unwrap().to_string(),
            body["user"]["id"].as_str().unwrap().to_string(),
        )
    }

    /// Admins cannot sign up through the API; seed one and log in.
    pub async fn admin_token(&self) -> String {
        let now = Utc::now();
        let admin = UserAccount {
            id: Uuid::new_v4(),
            first_name: "Root".to_string(),
            last_name: "Admin".to_string(),
            email: "admin@example.com".to_string(),
            password_hash: hash_password("adminpw").unwrap(),
            role: Role::Admin,
            created_at: now,
            updated_at: now,
        };
        self.store.insert_user(&admin).await.unwrap();

        let (status, body) = self
            .send(
                Method::POST,
                "/api/auth/login",
                None,
                Some(serde_json::json!({ "email": "admin@example.com", "password": "adminpw" })),
            )
            .await;
        assert_eq!(status, StatusCode::OK);
        body["token"].as_str().unwrap().to_string()
    }

    pub async fn create_registration(&self, token: &str, body: Value) -> Value {
        let (status, created) = self
            .send(Method::POST, "/api/registrations", Some(token), Some(body))
            .await;
        assert_eq!(status, StatusCode::CREATED, "create failed: {}", created);
        created
    }
}

pub fn bob_registration() -> Value {
    serde_json::json!({
        "firstName": "Bob",
        "lastName": "Smith",
        "email": "bob@example.com",
        "phone": "123456",
        "program": "Business Intelligence with Technology",
        "department": "Accountancy"
    })
}
