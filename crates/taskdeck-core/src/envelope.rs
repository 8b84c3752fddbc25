use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::{
  Deserialize,
  Serialize
};
use serde_json::Value;
use thiserror::Error;

#[derive(
  Debug, Clone, PartialEq, Eq, Error,
)]
pub enum RequestError {
  #[error("request failed: {0}")]
  Transport(String),

  #[error(
    "request timed out after {} ms",
    .0.as_millis()
  )]
  Timeout(Duration),

  #[error("unexpected response: {0}")]
  Protocol(String),

  /// Server-supplied message, shown to
  /// the user as-is.
  #[error("{0}")]
  Application(String),

  #[error("{0}")]
  Session(String)
}

/// Outcome of every outbound call.
#[derive(Debug, Clone, PartialEq)]
pub enum Envelope<T> {
  Ok(T),
  Err(RequestError)
}

impl<T> Envelope<T> {
  pub fn is_ok(&self) -> bool {
    matches!(self, Envelope::Ok(_))
  }

  pub fn ok(self) -> Option<T> {
    match self {
      | Envelope::Ok(data) => Some(data),
      | Envelope::Err(_) => None
    }
  }

  pub fn message(
    &self
  ) -> Option<String> {
    match self {
      | Envelope::Ok(_) => None,
      | Envelope::Err(err) => {
        Some(err.to_string())
      }
    }
  }

  pub fn map<U, F>(
    self,
    f: F
  ) -> Envelope<U>
  where
    F: FnOnce(T) -> U
  {
    match self {
      | Envelope::Ok(data) => {
        Envelope::Ok(f(data))
      }
      | Envelope::Err(err) => {
        Envelope::Err(err)
      }
    }
  }

  pub fn into_result(
    self
  ) -> Result<T, RequestError> {
    match self {
      | Envelope::Ok(data) => Ok(data),
      | Envelope::Err(err) => Err(err)
    }
  }
}

impl<T: Serialize> Envelope<T> {
  pub fn to_wire(&self) -> WireEnvelope {
    match self {
      | Envelope::Ok(data) => {
        match serde_json::to_value(data) {
          | Ok(value) => WireEnvelope {
            success: true,
            data:    Some(value),
            error:   None
          },
          | Err(err) => WireEnvelope {
            success: false,
            data:    None,
            error:   Some(err.to_string())
          }
        }
      }
      | Envelope::Err(err) => {
        WireEnvelope {
          success: false,
          data:    None,
          error:   Some(err.to_string())
        }
      }
    }
  }
}

/// `{success, data?, error?}` as the
/// API sends it.
#[derive(
  Debug,
  Clone,
  Serialize,
  Deserialize,
  PartialEq,
)]
pub struct WireEnvelope {
  pub success: bool,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub data:    Option<Value>,
  #[serde(
    default,
    skip_serializing_if = "Option::is_none"
  )]
  pub error:   Option<String>
}

/// Only a well-formed JSON envelope may
/// claim success; anything else is a
/// protocol failure.
pub fn decode_body<T>(
  body: &[u8]
) -> Envelope<T>
where
  T: DeserializeOwned
{
  let wire: WireEnvelope =
    match serde_json::from_slice(body) {
      | Ok(wire) => wire,
      | Err(err) => {
        return Envelope::Err(
          RequestError::Protocol(
            format!(
              "body is not a JSON \
               envelope: {err}"
            )
          )
        );
      }
    };

  if !wire.success {
    return Envelope::Err(
      RequestError::Application(
        wire.error.unwrap_or_else(|| {
          "request was not successful"
            .to_string()
        })
      )
    );
  }

  match serde_json::from_value::<T>(
    wire.data.unwrap_or(Value::Null)
  ) {
    | Ok(data) => Envelope::Ok(data),
    | Err(err) => {
      Envelope::Err(
        RequestError::Protocol(format!(
          "unexpected data shape: {err}"
        ))
      )
    }
  }
}
