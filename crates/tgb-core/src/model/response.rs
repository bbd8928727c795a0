use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{errors::Error, Result};

/// HTTP status used by the Bot API for flood control.
pub const STATUS_OK: u16 = 200;
pub const STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// <https://core.telegram.org/bots/api#responseparameters>
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseParameters {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub migrate_to_chat_id: Option<i64>,
    /// Seconds left before the request may be repeated.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_after: Option<u64>,
}

/// Response envelope shared by every Bot API method.
#[derive(Clone, Debug, Deserialize)]
pub struct Envelope<T> {
    pub ok: bool,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub error_code: Option<i64>,
    #[serde(default)]
    pub parameters: Option<ResponseParameters>,
    pub result: Option<T>,
}

impl<T> Envelope<T> {
    /// Classify the envelope into a typed result.
    ///
    /// `status` is the HTTP status the envelope arrived with, if any.
    pub fn into_result(self, status: Option<u16>) -> Result<T> {
        if self.ok {
            return self.result.ok_or_else(|| {
                Error::Transport("response is ok but carries no result".to_string())
            });
        }

        let description = self
            .description
            .unwrap_or_else(|| "no description".to_string());
        let retry_after = self
            .parameters
            .as_ref()
            .and_then(|p| p.retry_after)
            .map(Duration::from_secs);

        let flood = status == Some(STATUS_TOO_MANY_REQUESTS)
            || self.error_code == Some(i64::from(STATUS_TOO_MANY_REQUESTS));
        if flood || retry_after.is_some() {
            return Err(Error::RateLimited {
                retry_after,
                description,
            });
        }

        Err(Error::Rejected {
            status,
            error_code: self.error_code,
            description,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(body: &str) -> Envelope<Vec<i64>> {
        serde_json::from_str(body).unwrap()
    }

    #[test]
    fn ok_envelope_yields_result() {
        let env = parse(r#"{"ok":true,"result":[1,2,3]}"#);
        assert_eq!(env.into_result(Some(200)).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn ok_without_result_is_a_transport_error() {
        let err = parse(r#"{"ok":true}"#).into_result(Some(200)).unwrap_err();
        assert!(matches!(err, Error::Transport(_)), "{err:?}");
    }

    #[test]
    fn flood_control_carries_retry_after() {
        let env = parse(
            r#"{"ok":false,"error_code":429,"description":"Too Many Requests: retry after 5","parameters":{"retry_after":5}}"#,
        );
        let err = env.into_result(Some(429)).unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn status_429_without_parameters_is_still_rate_limited() {
        let err = parse(r#"{"ok":false}"#)
            .into_result(Some(STATUS_TOO_MANY_REQUESTS))
            .unwrap_err();
        assert!(err.is_rate_limited());
        assert_eq!(err.retry_after(), None);
    }

    #[test]
    fn other_failures_are_rejections() {
        let err = parse(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#)
            .into_result(Some(401))
            .unwrap_err();
        match err {
            Error::Rejected {
                status,
                error_code,
                description,
            } => {
                assert_eq!(status, Some(401));
                assert_eq!(error_code, Some(401));
                assert_eq!(description, "Unauthorized");
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }
}
