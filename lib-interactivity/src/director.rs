//! Client for the directory service that hands out signalling endpoints and
//! credentials for publishing to and subscribing from a stream.

use std::fmt;

use anyhow::{anyhow, bail, Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub const DEFAULT_DIRECTOR_URL: &str = "https://director.millicast.com";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IceServer {
  #[serde(default)]
  pub urls: Value,
  #[serde(default)]
  pub username: Option<String>,
  #[serde(default)]
  pub credential: Option<String>,
}

/// Connection details for one publish or subscribe session.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionCredentials {
  pub urls: Vec<String>,
  pub jwt: String,
  #[serde(default)]
  pub stream_account_id: Option<String>,
  #[serde(default)]
  pub ice_servers: Vec<IceServer>,
}

impl ConnectionCredentials {
  /// The first signalling URL with the session token attached.
  pub fn signalling_url(&self) -> Result<String> {
    let url = self
      .urls
      .first()
      .context("directory returned no signalling url")?;
    Ok(format!("{}?token={}", url, self.jwt))
  }
}

#[derive(Deserialize)]
struct Envelope {
  #[serde(default)]
  status: Option<String>,
  data: Value,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PublishRequest<'a> {
  stream_name: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SubscribeRequest<'a> {
  stream_account_id: &'a str,
  stream_name: &'a str,
  unauthorized_subscribe: bool,
}

#[derive(Clone)]
pub struct Director {
  client: reqwest::Client,
  endpoint: String,
}

impl fmt::Debug for Director {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Director")
      .field("endpoint", &self.endpoint)
      .finish()
  }
}

impl Default for Director {
  fn default() -> Self {
    Self::new(DEFAULT_DIRECTOR_URL)
  }
}

impl Director {
  pub fn new(endpoint: impl Into<String>) -> Self {
    Self {
      client: reqwest::Client::new(),
      endpoint: endpoint.into().trim_end_matches('/').to_owned(),
    }
  }

  pub fn endpoint(&self) -> &str {
    &self.endpoint
  }

  #[tracing::instrument(level = "debug", skip(token), err)]
  pub async fn publisher(&self, token: &str, stream_name: &str) -> Result<ConnectionCredentials> {
    let request = self
      .client
      .post(format!("{}/api/director/publish", self.endpoint))
      .bearer_auth(token)
      .json(&PublishRequest { stream_name });
    self.send(request).await
  }

  #[tracing::instrument(level = "debug", skip(subscriber_token), err)]
  pub async fn subscriber(
    &self,
    stream_name: &str,
    stream_account_id: &str,
    subscriber_token: Option<&str>,
  ) -> Result<ConnectionCredentials> {
    let mut request = self
      .client
      .post(format!("{}/api/director/subscribe", self.endpoint))
      .json(&SubscribeRequest {
        stream_account_id,
        stream_name,
        unauthorized_subscribe: subscriber_token.is_none(),
      });
    if let Some(token) = subscriber_token {
      request = request.bearer_auth(token);
    }
    self.send(request).await
  }

  async fn send(&self, request: reqwest::RequestBuilder) -> Result<ConnectionCredentials> {
    let response = request
      .send()
      .await
      .context("failed to reach directory")?;
    let status = response.status();
    let body = response
      .text()
      .await
      .context("failed to read directory response")?;
    debug!("directory replied {}: {}", status, body);

    let envelope: Envelope = match serde_json::from_str(&body) {
      Ok(envelope) => envelope,
      Err(_) if !status.is_success() => bail!("directory request failed with {}", status),
      Err(e) => return Err(anyhow!(e).context("invalid directory response")),
    };
    if !status.is_success() || envelope.status.as_deref() == Some("fail") {
      let message = envelope
        .data
        .get("message")
        .and_then(Value::as_str)
        .unwrap_or("no message");
      bail!("directory request failed with {}: {}", status, message);
    }
    serde_json::from_value(envelope.data).context("invalid directory credentials")
  }
}

/// Resolves fresh credentials whenever an engine (re)connects a session.
#[async_trait]
pub trait TokenGenerator: Send + Sync {
  async fn generate(&self) -> Result<ConnectionCredentials>;
}

#[derive(Debug, Clone)]
pub struct PublisherTokenGenerator {
  director: Director,
  token: String,
  stream_name: String,
}

impl PublisherTokenGenerator {
  pub fn new(director: Director, token: &str, stream_name: &str) -> Self {
    Self {
      director,
      token: token.to_owned(),
      stream_name: stream_name.to_owned(),
    }
  }
}

#[async_trait]
impl TokenGenerator for PublisherTokenGenerator {
  async fn generate(&self) -> Result<ConnectionCredentials> {
    self
      .director
      .publisher(&self.token, &self.stream_name)
      .await
  }
}

#[derive(Debug, Clone)]
pub struct SubscriberTokenGenerator {
  director: Director,
  stream_name: String,
  stream_account_id: String,
  subscriber_token: Option<String>,
}

impl SubscriberTokenGenerator {
  pub fn new(
    director: Director,
    stream_name: &str,
    stream_account_id: &str,
    subscriber_token: Option<&str>,
  ) -> Self {
    Self {
      director,
      stream_name: stream_name.to_owned(),
      stream_account_id: stream_account_id.to_owned(),
      subscriber_token: subscriber_token.map(str::to_owned),
    }
  }
}

#[async_trait]
impl TokenGenerator for SubscriberTokenGenerator {
  async fn generate(&self) -> Result<ConnectionCredentials> {
    self
      .director
      .subscriber(
        &self.stream_name,
        &self.stream_account_id,
        self.subscriber_token.as_deref(),
      )
      .await
  }
}
