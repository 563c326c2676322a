//! Error type for `tavis-graph`.

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("http error: {0}")]
  Http(#[from] reqwest::Error),

  #[error("platform access token expired: {0}")]
  TokenExpired(String),

  #[error("platform api error (status {status}): {message}")]
  Api { status: u16, message: String },
}

impl Error {
  pub fn is_token_expired(&self) -> bool {
    matches!(self, Self::TokenExpired(_))
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// The platform's error envelope, `{"error": {...}}`.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorEnvelope {
  pub error: ApiErrorBody,
}

#[derive(Debug, Deserialize)]
pub(crate) struct ApiErrorBody {
  #[serde(default)]
  pub message: String,
  #[serde(default, rename = "type")]
  pub kind:    String,
  #[serde(default)]
  pub code:    i64,
}

/// Map a non-2xx response body onto the taxonomy. Error code 190 and the
/// `OAuthException` type both mean the page access token needs renewing.
pub(crate) fn classify(status: u16, body: Option<ApiErrorBody>) -> Error {
  match body {
    Some(body) if body.code == 190 || body.kind == "OAuthException" => {
      Error::TokenExpired(body.message)
    }
    Some(body) => Error::Api { status, message: body.message },
    None => Error::Api { status, message: "unrecognised error body".to_owned() },
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn body(code: i64, kind: &str) -> ApiErrorBody {
    ApiErrorBody {
      message: "boom".to_owned(),
      kind:    kind.to_owned(),
      code,
    }
  }

  #[test]
  fn code_190_is_token_expiry() {
    assert!(classify(400, Some(body(190, "SomethingElse"))).is_token_expired());
  }

  #[test]
  fn oauth_exception_is_token_expiry() {
    assert!(classify(401, Some(body(0, "OAuthException"))).is_token_expired());
  }

  #[test]
  fn other_codes_stay_generic() {
    let err = classify(400, Some(body(100, "GraphMethodException")));
    assert!(matches!(err, Error::Api { status: 400, .. }));
  }

  #[test]
  fn unparsable_body_stays_generic() {
    assert!(matches!(classify(502, None), Error::Api { status: 502, .. }));
  }
}
