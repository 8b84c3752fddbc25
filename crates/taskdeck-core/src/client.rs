use std::sync::Arc;
use std::time::{
  Duration,
  Instant
};

use reqwest::Method;
use reqwest::header::{
  ACCEPT,
  AUTHORIZATION,
  CONTENT_TYPE,
  HeaderMap,
  HeaderName,
  HeaderValue
};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{
  debug,
  instrument,
  warn
};

use crate::cache::TagCache;
use crate::config::Config;
use crate::envelope::{
  Envelope,
  RequestError,
  decode_body
};
use crate::session::SessionProvider;

const JSON: &str = "application/json";

#[derive(Debug, Clone)]
pub struct CallOptions {
  pub method:     Method,
  pub headers:    Vec<(String, String)>,
  pub body:       Option<Value>,
  pub timeout:    Option<Duration>,
  pub auth:       bool,
  pub tags:       Vec<String>,
  pub revalidate: Vec<String>
}

impl CallOptions {
  pub fn new(method: Method) -> Self {
    Self {
      method,
      headers: vec![],
      body: None,
      timeout: None,
      auth: false,
      tags: vec![],
      revalidate: vec![]
    }
  }

  pub fn get() -> Self {
    Self::new(Method::GET)
  }

  pub fn post(body: Value) -> Self {
    Self::new(Method::POST).body(body)
  }

  pub fn put(body: Value) -> Self {
    Self::new(Method::PUT).body(body)
  }

  pub fn delete() -> Self {
    Self::new(Method::DELETE)
  }

  pub fn body(
    mut self,
    body: Value
  ) -> Self {
    self.body = Some(body);
    self
  }

  pub fn header(
    mut self,
    name: &str,
    value: &str
  ) -> Self {
    self.headers.push((
      name.to_string(),
      value.to_string()
    ));
    self
  }

  pub fn timeout(
    mut self,
    timeout: Duration
  ) -> Self {
    self.timeout = Some(timeout);
    self
  }

  pub fn authenticated(mut self) -> Self {
    self.auth = true;
    self
  }

  pub fn tagged(
    mut self,
    tag: &str
  ) -> Self {
    self.tags.push(tag.to_string());
    self
  }

  pub fn revalidates(
    mut self,
    tag: &str
  ) -> Self {
    self
      .revalidate
      .push(tag.to_string());
    self
  }
}

/// HTTP client for the task API. Every
/// call resolves to an [`Envelope`];
/// nothing escapes as an error or panic.
#[derive(Clone)]
pub struct ApiClient {
  http:     reqwest::Client,
  base_url: String,
  timeout:  Duration,
  session:  Arc<dyn SessionProvider>,
  cache:    Arc<dyn TagCache>
}

impl std::fmt::Debug for ApiClient {
  fn fmt(
    &self,
    f: &mut std::fmt::Formatter<'_>
  ) -> std::fmt::Result {
    f.debug_struct("ApiClient")
      .field("base_url", &self.base_url)
      .field("timeout", &self.timeout)
      .finish_non_exhaustive()
  }
}

impl ApiClient {
  pub fn new(
    base_url: &str,
    timeout: Duration,
    session: Arc<dyn SessionProvider>,
    cache: Arc<dyn TagCache>
  ) -> anyhow::Result<Self> {
    use anyhow::Context;

    let http = reqwest::Client::builder()
      .build()
      .context(
        "failed building HTTP client"
      )?;

    Ok(Self {
      http,
      base_url: base_url
        .trim_end_matches('/')
        .to_string(),
      timeout,
      session,
      cache
    })
  }

  pub fn from_config(
    cfg: &Config,
    session: Arc<dyn SessionProvider>,
    cache: Arc<dyn TagCache>
  ) -> anyhow::Result<Self> {
    Self::new(
      &cfg.base_url(),
      cfg.request_timeout()?,
      session,
      cache
    )
  }

  pub fn base_url(&self) -> &str {
    &self.base_url
  }

  pub fn url(&self, path: &str) -> String {
    if path.starts_with("http://")
      || path.starts_with("https://")
    {
      return path.to_string();
    }
    if path.starts_with('/') {
      format!("{}{}", self.base_url, path)
    } else {
      format!("{}/{}", self.base_url, path)
    }
  }

  #[instrument(skip(self, options), fields(method = %options.method, auth = options.auth))]
  pub async fn call<T>(
    &self,
    path: &str,
    options: CallOptions
  ) -> Envelope<T>
  where
    T: DeserializeOwned
  {
    let url = self.url(path);
    let headers =
      match self.build_headers(&options) {
        | Ok(headers) => headers,
        | Err(err) => {
          debug!(error = %err, "call rejected before sending");
          return Envelope::Err(err);
        }
      };

    let mut request = self
      .http
      .request(options.method.clone(), &url)
      .headers(headers);
    if let Some(body) = &options.body {
      request =
        request.body(body.to_string());
    }

    self.cache.observe(&url, &options.tags);

    let limit =
      options.timeout.unwrap_or(self.timeout);
    let started = Instant::now();

    // Dropping the exchange on timeout
    // aborts the request; its result is
    // never looked at.
    let exchange = async {
      let response =
        request.send().await.map_err(
          |err| {
            RequestError::Transport(
              err.to_string()
            )
          }
        )?;
      let status = response.status();
      let body =
        response.bytes().await.map_err(
          |err| {
            RequestError::Transport(
              format!(
                "failed reading body: \
                 {err}"
              )
            )
          }
        )?;
      Ok::<_, RequestError>((status, body))
    };

    let envelope = match tokio::time::timeout(
      limit, exchange
    )
    .await
    {
      | Err(_) => {
        warn!(
          url = %url,
          timeout_ms = limit.as_millis() as u64,
          "request timed out; aborted"
        );
        Envelope::Err(RequestError::Timeout(
          limit
        ))
      }
      | Ok(Err(err)) => {
        warn!(url = %url, error = %err, "request failed");
        Envelope::Err(err)
      }
      | Ok(Ok((status, body))) => {
        debug!(
          url = %url,
          status = status.as_u16(),
          bytes = body.len(),
          elapsed_ms = started.elapsed().as_millis() as u64,
          "response received"
        );
        decode_body(&body)
      }
    };

    if envelope.is_ok() {
      for tag in &options.revalidate {
        self.cache.revalidate(tag);
      }
    }

    envelope
  }

  /// Defaults, then the bearer token,
  /// then the caller's own headers.
  pub(crate) fn build_headers(
    &self,
    options: &CallOptions
  ) -> Result<HeaderMap, RequestError> {
    let mut headers = HeaderMap::new();
    headers.insert(
      CONTENT_TYPE,
      HeaderValue::from_static(JSON)
    );
    headers.insert(
      ACCEPT,
      HeaderValue::from_static(JSON)
    );

    if options.auth {
      let token = self
        .session
        .token()
        .filter(|t| !t.is_empty())
        .ok_or_else(|| {
          RequestError::Session(
            "not signed in".to_string()
          )
        })?;
      let mut value = HeaderValue::from_str(
        &format!("Bearer {token}")
      )
      .map_err(|_| {
        RequestError::Session(
          "session token is not a valid \
           header value"
            .to_string()
        )
      })?;
      value.set_sensitive(true);
      headers.insert(AUTHORIZATION, value);
    }

    for (name, value) in &options.headers {
      let name = HeaderName::from_bytes(
        name.as_bytes()
      )
      .map_err(|err| {
        RequestError::Transport(format!(
          "invalid header name {name}: \
           {err}"
        ))
      })?;
      let value = HeaderValue::from_str(
        value
      )
      .map_err(|err| {
        RequestError::Transport(format!(
          "invalid value for header \
           {name}: {err}"
        ))
      })?;
      headers.insert(name, value);
    }

    Ok(headers)
  }
}
