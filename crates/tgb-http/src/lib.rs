//! Bot API adapter over `reqwest`.
//!
//! Every method goes through [`BotClient::exchange`], which sends the call in
//! one of the supported request styles, decodes the `{ok, result, ...}`
//! envelope and logs a single "request finished" line with the token masked.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{de::DeserializeOwned, Serialize};

use tgb_core::{
    config::{self, Config},
    errors::Error,
    model::{Envelope, File, Message, Update, User},
    params::{encode_values, GetFileParams, PollParams, SendMessageParams},
    ports::{Fetch, UpdateSource},
    Result,
};

/// Extra time granted to a long-poll request on top of its server-side wait.
pub const LONG_POLL_GRACE: Duration = Duration::from_secs(10);

/// How method parameters are put on the wire.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RequestStyle {
    /// `GET` with a URL query string.
    Get,
    /// `POST` with an `application/x-www-form-urlencoded` body.
    PostForm,
    /// `POST` with an `application/json` body.
    PostJson,
}

impl RequestStyle {
    fn verb(self) -> &'static str {
        match self {
            RequestStyle::Get => "GET",
            RequestStyle::PostForm | RequestStyle::PostJson => "POST",
        }
    }
}

/// Decoded result of one call, together with the HTTP status it arrived with.
#[derive(Debug)]
pub struct Reply<T> {
    /// `None` when the request never produced a response.
    pub status: Option<u16>,
    pub result: Result<T>,
}

#[derive(Clone, Debug)]
pub struct BotClient {
    api_url: String,
    redacted_url: String,
    http: reqwest::Client,
}

impl BotClient {
    pub fn new(api_base: &str, token: &str, http_timeout: Duration) -> Result<Self> {
        let api_url = config::api_url(api_base, token);
        let http = reqwest::Client::builder()
            .timeout(http_timeout)
            .build()
            .map_err(|e| Error::Transport(format!("http client build: {e}")))?;
        Ok(Self {
            redacted_url: config::redact_token(&api_url, token),
            api_url,
            http,
        })
    }

    pub fn from_config(cfg: &Config) -> Result<Self> {
        Self::new(&cfg.api_base, &cfg.bot_token, cfg.http_timeout)
    }

    /// Method base URL with the token masked, safe to log.
    pub fn redacted_url(&self) -> &str {
        &self.redacted_url
    }

    /// <https://core.telegram.org/bots/api#getme>
    pub async fn get_me(&self) -> Result<User> {
        self.call("getMe", RequestStyle::Get, &serde_json::Map::new())
            .await
    }

    /// <https://core.telegram.org/bots/api#getupdates>
    pub async fn get_updates(&self, params: &PollParams) -> Result<Vec<Update>> {
        self.poll(params).await.result
    }

    /// <https://core.telegram.org/bots/api#sendmessage>
    pub async fn send_message(&self, params: &SendMessageParams) -> Result<Message> {
        self.call("sendMessage", RequestStyle::PostJson, params)
            .await
    }

    /// <https://core.telegram.org/bots/api#getfile>
    pub async fn get_file(&self, file_id: impl Into<String>) -> Result<File> {
        let params = GetFileParams {
            file_id: file_id.into(),
        };
        self.call("getFile", RequestStyle::PostForm, &params).await
    }

    /// Download URL for a `file_path` returned by [`BotClient::get_file`].
    pub fn file_url(&self, file_path: &str) -> String {
        // <base>/bot<token>/ -> <base>/file/bot<token>/<path>
        match self.api_url.rfind("/bot") {
            Some(at) => format!(
                "{}/file{}{}",
                &self.api_url[..at],
                &self.api_url[at..],
                file_path.trim_start_matches('/')
            ),
            None => format!("{}{}", self.api_url, file_path),
        }
    }

    /// Call `method` and return only the typed result.
    pub async fn call<T, P>(&self, method: &str, style: RequestStyle, params: &P) -> Result<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized + Sync,
    {
        self.exchange(method, style, params, None).await.result
    }

    /// Call `method`, keeping the HTTP status next to the decoded result.
    ///
    /// `timeout` overrides the client-wide request timeout.
    pub async fn exchange<T, P>(
        &self,
        method: &str,
        style: RequestStyle,
        params: &P,
        timeout: Option<Duration>,
    ) -> Reply<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized + Sync,
    {
        let started = Instant::now();
        let reply = self.send(method, style, params, timeout).await;

        let elapsed_ms = started.elapsed().as_millis() as u64;
        let status = reply.status.unwrap_or(0);
        match &reply.result {
            Ok(_) => tracing::debug!(
                verb = style.verb(),
                url = %format!("{}{method}", self.redacted_url),
                status,
                elapsed_ms,
                "request finished"
            ),
            Err(e) => tracing::info!(
                verb = style.verb(),
                url = %format!("{}{method}", self.redacted_url),
                status,
                elapsed_ms,
                error = %e,
                "request finished"
            ),
        }
        reply
    }

    async fn send<T, P>(
        &self,
        method: &str,
        style: RequestStyle,
        params: &P,
        timeout: Option<Duration>,
    ) -> Reply<T>
    where
        T: DeserializeOwned,
        P: Serialize + ?Sized + Sync,
    {
        let url = format!("{}{method}", self.api_url);
        let request = match style {
            RequestStyle::Get => match encode_values(params) {
                Ok(pairs) if pairs.is_empty() => self.http.get(&url),
                Ok(pairs) => self.http.get(&url).query(&pairs),
                Err(e) => return Reply::unsent(e),
            },
            RequestStyle::PostForm => match encode_values(params) {
                Ok(pairs) => self.http.post(&url).form(&pairs),
                Err(e) => return Reply::unsent(e),
            },
            RequestStyle::PostJson => self.http.post(&url).json(params),
        };
        let request = match timeout {
            Some(t) => request.timeout(t),
            None => request,
        };

        let response = match request.send().await {
            Ok(r) => r,
            Err(e) => {
                return Reply::unsent(Error::Transport(format!(
                    "{method} request failed: {}",
                    e.without_url()
                )))
            }
        };

        let status = response.status().as_u16();
        let body = match response.text().await {
            Ok(b) => b,
            Err(e) => {
                return Reply {
                    status: Some(status),
                    result: Err(Error::Transport(format!(
                        "{method} response body: {}",
                        e.without_url()
                    ))),
                }
            }
        };

        Reply {
            status: Some(status),
            result: decode(method, status, &body),
        }
    }

    async fn poll(&self, params: &PollParams) -> Reply<Vec<Update>> {
        let timeout = Duration::from_secs(u64::from(params.timeout)) + LONG_POLL_GRACE;
        self.exchange("getUpdates", RequestStyle::Get, params, Some(timeout))
            .await
    }
}

impl<T> Reply<T> {
    fn unsent(error: Error) -> Self {
        Self {
            status: None,
            result: Err(error),
        }
    }
}

fn decode<T: DeserializeOwned>(method: &str, status: u16, body: &str) -> Result<T> {
    match serde_json::from_str::<Envelope<T>>(body) {
        Ok(envelope) => envelope.into_result(Some(status)),
        Err(e) => Err(Error::Transport(format!(
            "{method}: undecodable response (status {status}): {e}; body: {}",
            body.chars().take(200).collect::<String>()
        ))),
    }
}

#[async_trait]
impl UpdateSource for BotClient {
    async fn fetch_updates(&self, params: &PollParams) -> Fetch {
        let reply = self.poll(params).await;
        Fetch {
            status: reply.status,
            result: reply.result,
        }
    }
}
