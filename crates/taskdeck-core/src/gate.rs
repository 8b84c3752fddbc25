use regex::Regex;
use tracing::debug;

use crate::routes;
use crate::session::cookie_value;

/// Paths served without a session,
/// matched as a prefix of whatever
/// follows the leading slash.
const PUBLIC_PREFIXES: &[&str] = &[
  "api",
  "_next/static",
  "_next/image",
  "favicon.ico",
  "sitemap.xml",
  "robots.txt",
  "signin",
  "signup"
];

#[derive(
  Debug, Clone, Copy, PartialEq, Eq,
)]
pub enum GateState {
  Authorized,
  Unauthorized
}

impl GateState {
  pub fn from_token(
    token: Option<&str>
  ) -> Self {
    match token {
      | Some(t) if !t.trim().is_empty() => {
        GateState::Authorized
      }
      | _ => GateState::Unauthorized
    }
  }
}

#[derive(
  Debug, Clone, PartialEq, Eq,
)]
pub enum GateDecision {
  Allow,
  RedirectTo(String)
}

#[derive(Debug, Clone)]
pub struct SessionGate {
  cookie_name: String,
  signin_path: String,
  public:      Regex
}

impl SessionGate {
  pub fn new(
    cookie_name: &str
  ) -> anyhow::Result<Self> {
    let alternatives = PUBLIC_PREFIXES
      .iter()
      .map(|prefix| regex::escape(prefix))
      .collect::<Vec<_>>()
      .join("|");
    let public = Regex::new(&format!(
      "^/(?:{alternatives})"
    ))?;

    Ok(Self {
      cookie_name: cookie_name.to_string(),
      signin_path: routes::SIGNIN
        .to_string(),
      public
    })
  }

  pub fn is_protected(
    &self,
    path: &str
  ) -> bool {
    !self.public.is_match(path)
  }

  /// Decides from the token alone; its
  /// signature and expiry are the API's
  /// business.
  #[tracing::instrument(skip(self, token), fields(has_token = token.is_some()))]
  pub fn decide(
    &self,
    path: &str,
    token: Option<&str>
  ) -> GateDecision {
    if !self.is_protected(path) {
      return GateDecision::Allow;
    }

    match GateState::from_token(token) {
      | GateState::Authorized => {
        GateDecision::Allow
      }
      | GateState::Unauthorized => {
        debug!(path, to = %self.signin_path, "redirecting unauthenticated request");
        GateDecision::RedirectTo(
          self.signin_path.clone()
        )
      }
    }
  }

  /// Same decision, reading the token
  /// from a raw `Cookie` header.
  pub fn decide_request(
    &self,
    path: &str,
    cookie_header: Option<&str>
  ) -> GateDecision {
    let token = cookie_header.and_then(
      |header| {
        cookie_value(
          header,
          &self.cookie_name
        )
      }
    );
    self.decide(path, token)
  }
}
