use reqwest::header::AUTHORIZATION;
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

use super::session::{SessionState, SessionStore};
use super::ClientError;
use crate::auth::LoggedIn;
use crate::models::{
    NewRegistration, ProfileChanges, PublicUser, Registration, RegistrationPatch, Stats,
};

#[derive(Debug, Deserialize)]
struct ErrorBody {
    message: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SignupBody<'a> {
    first_name: &'a str,
    last_name: &'a str,
    email: &'a str,
    password: &'a str,
}

#[derive(Serialize)]
struct LoginBody<'a> {
    email: &'a str,
    password: &'a str,
}

pub struct ApiClient {
    http: reqwest::Client,
    base: String,
    session: Arc<SessionStore>,
}

impl ApiClient {
    pub fn new<S: Into<String>>(base: S, session: Arc<SessionStore>) -> Self {
        Self {
            http: reqwest::Client::new(),
            base: base.into().trim_end_matches('/').to_string(),
            session,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base, path)
    }

    /// Builds a request, attaching the stored token when there is one.
    async fn request(&self, method: Method, path: &str) -> (RequestBuilder, bool) {
        let builder = self.http.request(method, self.url(path));
        match self.session.token().await {
            Some(token) => (builder.header(AUTHORIZATION, format!("Bearer {}", token)), true),
            None => (builder, false),
        }
    }

    async fn send(&self, builder: RequestBuilder, authed: bool) -> Result<Response, ClientError> {
        let response = builder.send().await?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let text = response.text().await.unwrap_or_default();
        let message = serde_json::from_str::<ErrorBody>(&text)
            .map(|body| body.message)
            .unwrap_or(text);
        if status == StatusCode::UNAUTHORIZED && authed {
            // stale or expired token: force a fresh login
            self.session.logout().await?;
        }
        Err(ClientError::Server {
            status: status.as_u16(),
            message,
        })
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ClientError> {
        let (builder, authed) = self.request(Method::GET, path).await;
        Ok(self.send(builder, authed).await?.json().await?)
    }

    async fn call<B, T>(&self, method: Method, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let (builder, authed) = self.request(method, path).await;
        Ok(self.send(builder.json(body), authed).await?.json().await?)
    }

    /// Sign-in endpoints never carry the stored token, so a failed attempt
    /// leaves the current session alone.
    async fn anonymous<B, T>(&self, path: &str, body: &B) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let builder = self.http.post(self.url(path)).json(body);
        Ok(self.send(builder, false).await?.json().await?)
    }

    async fn establish(&self, logged_in: LoggedIn) -> Result<PublicUser, ClientError> {
        let user = logged_in.user.clone();
        self.session
            .establish(SessionState {
                token: logged_in.token,
                user: logged_in.user,
            })
            .await?;
        Ok(user)
    }

    pub async fn signup(
        &self,
        first_name: &str,
        last_name: &str,
        email: &str,
        password: &str,
    ) -> Result<PublicUser, ClientError> {
        let body = SignupBody {
            first_name,
            last_name,
            email,
            password,
        };
        let logged_in: LoggedIn = self.anonymous("/api/auth/signup", &body).await?;
        self.establish(logged_in).await
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<PublicUser, ClientError> {
        let body = LoginBody { email, password };
        let logged_in: LoggedIn = self.anonymous("/api/auth/login", &body).await?;
        self.establish(logged_in).await
    }

    pub async fn logout(&self) -> Result<(), ClientError> {
        self.session.logout().await
    }

    pub async fn me(&self) -> Result<PublicUser, ClientError> {
        self.get("/api/users/me").await
    }

    pub async fn update_me(&self, changes: &ProfileChanges) -> Result<PublicUser, ClientError> {
        let user: PublicUser = self
            .call(Method::PUT, "/api/users/me", changes)
            .await?;
        if let Some(mut current) = self.session.current().await {
            current.user = user.clone();
            self.session.establish(current).await?;
        }
        Ok(user)
    }

    pub async fn create_registration(
        &self,
        fields: &NewRegistration,
    ) -> Result<Registration, ClientError> {
        self.call(Method::POST, "/api/registrations", fields).await
    }

    pub async fn list_registrations(&self) -> Result<Vec<Registration>, ClientError> {
        self.get("/api/registrations").await
    }

    pub async fn registration(&self, id: Uuid) -> Result<Registration, ClientError> {
        self.get(&format!("/api/registrations/{}", id)).await
    }

    pub async fn update_registration(
        &self,
        id: Uuid,
        patch: &RegistrationPatch,
    ) -> Result<Registration, ClientError> {
        self.call(Method::PUT, &format!("/api/registrations/{}", id), patch)
            .await
    }

    pub async fn stats(&self) -> Result<Stats, ClientError> {
        self.get("/api/registrations/stats").await
    }

    pub(crate) async fn open_events(&self) -> Result<Response, ClientError> {
        let (builder, authed) = self.request(Method::GET, "/api/events").await;
        self.send(
            builder.header(reqwest::header::ACCEPT, "text/event-stream"),
            authed,
        )
        .await
    }
}
