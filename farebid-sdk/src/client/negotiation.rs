//! Negotiation API client (gateway / trusted backend → farebid server).
//!
//! Every request carries a gateway-signed actor assertion. The client
//! re-signs on each call so the timestamp stays fresh.

use reqwest::{Client, RequestBuilder};
use url::Url;
use uuid::Uuid;

use super::push::PushStream;
use super::{ClientError, parse_response};
use crate::objects::{CounterRequest, CreateSessionRequest, SessionView};
use crate::signature::{ACTOR_HEADER, ActorClaim, SIGNATURE_HEADER, sign_actor};

/// Typed client for the `/negotiation` API, acting as one actor.
#[derive(Debug, Clone)]
pub struct NegotiationClient {
    http: Client,
    base_url: Url,
    secret: Vec<u8>,
    actor: ActorClaim,
}

impl NegotiationClient {
    /// * `base_url` – root URL of the farebid server.
    /// * `gateway_secret` – HMAC secret shared between gateway and server.
    /// * `actor` – identity every request is made as.
    pub fn new(base_url: Url, gateway_secret: impl Into<Vec<u8>>, actor: ActorClaim) -> Self {
        Self {
            http: Client::new(),
            base_url,
            secret: gateway_secret.into(),
            actor,
        }
    }

    /// Replace the default `reqwest::Client` with a custom one.
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Same credentials, different actor.
    pub fn as_actor(&self, actor: ActorClaim) -> Self {
        Self {
            actor,
            ..self.clone()
        }
    }

    pub fn actor(&self) -> ActorClaim {
        self.actor
    }

    fn signed(&self, builder: RequestBuilder) -> RequestBuilder {
        builder
            .header(ACTOR_HEADER, self.actor.to_string())
            .header(SIGNATURE_HEADER, sign_actor(&self.actor, &self.secret))
    }

    /// `POST /negotiation/sessions` – open a session as the rider.
    pub async fn create_session(
        &self,
        request: &CreateSessionRequest,
    ) -> Result<SessionView, ClientError> {
        let url = self.base_url.join("/negotiation/sessions")?;
        let resp = self.signed(self.http.post(url)).json(request).send().await?;
        parse_response(resp).await
    }

    /// `GET /negotiation/sessions/{id}`
    pub async fn get_session(&self, session_id: Uuid) -> Result<SessionView, ClientError> {
        let url = self
            .base_url
            .join(&format!("/negotiation/sessions/{session_id}"))?;
        let resp = self.signed(self.http.get(url)).send().await?;
        parse_response(resp).await
    }

    /// `POST /negotiation/sessions/{id}/counter`
    pub async fn counter(
        &self,
        session_id: Uuid,
        amount: rust_decimal::Decimal,
    ) -> Result<SessionView, ClientError> {
        let url = self
            .base_url
            .join(&format!("/negotiation/sessions/{session_id}/counter"))?;
        let resp = self
            .signed(self.http.post(url))
            .json(&CounterRequest { amount })
            .send()
            .await?;
        parse_response(resp).await
    }

    /// `POST /negotiation/sessions/{id}/accept`
    pub async fn accept(&self, session_id: Uuid) -> Result<SessionView, ClientError> {
        self.post_action(session_id, "accept").await
    }

    /// `POST /negotiation/sessions/{id}/withdraw`
    pub async fn withdraw(&self, session_id: Uuid) -> Result<SessionView, ClientError> {
        self.post_action(session_id, "withdraw").await
    }

    /// `POST /negotiation/sessions/{id}/reject`
    pub async fn reject(&self, session_id: Uuid) -> Result<SessionView, ClientError> {
        self.post_action(session_id, "reject").await
    }

    /// `POST /negotiation/sessions/{id}/join` – driver joins a fan-out
    /// session before it is bound.
    pub async fn join(&self, session_id: Uuid) -> Result<SessionView, ClientError> {
        self.post_action(session_id, "join").await
    }

    async fn post_action(
        &self,
        session_id: Uuid,
        action: &str,
    ) -> Result<SessionView, ClientError> {
        let url = self
            .base_url
            .join(&format!("/negotiation/sessions/{session_id}/{action}"))?;
        let resp = self.signed(self.http.post(url)).send().await?;
        parse_response(resp).await
    }

    /// `GET /negotiation/ws?session_id={id}` – open the push stream.
    pub async fn subscribe(&self, session_id: Uuid) -> Result<PushStream, ClientError> {
        let mut url = self.base_url.join("/negotiation/ws")?;
        let scheme = match url.scheme() {
            "https" => "wss",
            _ => "ws",
        };
        // Url::set_scheme refuses http -> ws; rebuild from the string form.
        let rest = url.as_str().split_once("://").map(|(_, r)| r.to_owned());
        if let Some(rest) = rest {
            url = Url::parse(&format!("{scheme}://{rest}"))?;
        }
        url.query_pairs_mut()
            .append_pair("session_id", &session_id.to_string());
        PushStream::connect(url, self.actor, &self.secret).await
    }
}
