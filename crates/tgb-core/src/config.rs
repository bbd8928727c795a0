use std::{
    env, fs,
    path::{Path, PathBuf},
    time::Duration,
};

use regex::Regex;

use crate::{errors::Error, model::UpdateKind, params::PollParams, Result};

pub const DEFAULT_API_BASE: &str = "https://api.telegram.org";

/// Typed configuration for a polling bot process.
#[derive(Clone, Debug)]
pub struct Config {
    pub bot_token: String,
    pub api_base: String,

    // Polling
    pub poll_timeout: u32,
    pub poll_limit: u32,
    pub allowed_updates: Option<Vec<UpdateKind>>,
    pub initial_offset: Option<i64>,
    pub channel_capacity: usize,

    // Plain (non long-poll) requests
    pub http_timeout: Duration,
}

impl Config {
    /// Load from the process environment (and `.env`, without overriding).
    pub fn load() -> Result<Self> {
        Self::load_with_token_file(None)
    }

    /// Like [`Config::load`], but an explicit token file wins over the environment.
    pub fn load_with_token_file(token_file: Option<&Path>) -> Result<Self> {
        load_dotenv_if_present(Path::new(".env"));
        Self::from_lookup(token_file, |key| env::var(key).ok())
    }

    /// Build from an arbitrary key lookup (the environment in production).
    pub fn from_lookup(
        token_file: Option<&Path>,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        let get = |key: &str| lookup(key).map(|v| v.trim().to_string()).and_then(non_empty);

        let bot_token = match token_file {
            Some(path) => load_token_file(path)?,
            None => match (get("TELEGRAM_BOT_TOKEN"), get("TELEGRAM_BOT_TOKEN_FILE")) {
                (Some(token), _) => token,
                (None, Some(path)) => load_token_file(Path::new(&path))?,
                (None, None) => {
                    return Err(Error::Config(
                        "TELEGRAM_BOT_TOKEN or TELEGRAM_BOT_TOKEN_FILE is required".to_string(),
                    ))
                }
            },
        };
        validate_token(&bot_token)?;

        let api_base = get("TELEGRAM_API_BASE").unwrap_or_else(|| DEFAULT_API_BASE.to_string());

        let poll_timeout = parse_or("POLL_TIMEOUT_SECS", get("POLL_TIMEOUT_SECS"), 30)?;
        let poll_limit = parse_or("POLL_LIMIT", get("POLL_LIMIT"), 100)?;
        let allowed_updates = get("POLL_ALLOWED_UPDATES")
            .map(|csv| parse_update_kinds(&csv))
            .transpose()?;
        let initial_offset = get("POLL_INITIAL_OFFSET")
            .map(|v| parse_value::<i64>("POLL_INITIAL_OFFSET", &v))
            .transpose()?;
        let channel_capacity =
            parse_or("UPDATE_CHANNEL_CAPACITY", get("UPDATE_CHANNEL_CAPACITY"), 64_usize)?.max(1);
        let http_timeout = Duration::from_secs(parse_or(
            "HTTP_TIMEOUT_SECS",
            get("HTTP_TIMEOUT_SECS"),
            10_u64,
        )?);

        let cfg = Self {
            bot_token,
            api_base,
            poll_timeout,
            poll_limit,
            allowed_updates,
            initial_offset,
            channel_capacity,
            http_timeout,
        };
        cfg.poll_params().validate()?;
        Ok(cfg)
    }

    pub fn api_url(&self) -> String {
        api_url(&self.api_base, &self.bot_token)
    }

    /// Parameters of the first round of a polling session.
    pub fn poll_params(&self) -> PollParams {
        PollParams {
            offset: self.initial_offset,
            timeout: self.poll_timeout,
            limit: self.poll_limit,
            allowed_updates: self.allowed_updates.clone(),
        }
    }
}

/// Method base URL for a bot: `<base>/bot<token>/`.
pub fn api_url(base: &str, token: &str) -> String {
    format!("{}/bot{token}/", base.trim_end_matches('/'))
}

/// Read a bot token from the first line of `path`.
pub fn load_token_file(path: &Path) -> Result<String> {
    let contents = fs::read_to_string(path).map_err(|e| Error::TokenFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let token = contents.lines().next().unwrap_or("").trim().to_string();
    if token.is_empty() {
        return Err(Error::TokenFile {
            path: PathBuf::from(path),
            reason: "file is empty".to_string(),
        });
    }
    Ok(token)
}

/// Tokens look like `123456:AA-bb_CC`.
pub fn validate_token(token: &str) -> Result<()> {
    let re = Regex::new(r"^\d+:[\w-]+$")
        .map_err(|e| Error::Config(format!("token pattern: {e}")))?;
    if !re.is_match(token) {
        return Err(Error::Config(
            "bot token must look like <bot id>:<secret>".to_string(),
        ));
    }
    Ok(())
}

/// Replace every occurrence of the token so URLs can be logged.
pub fn redact_token(text: &str, token: &str) -> String {
    if token.is_empty() {
        return text.to_string();
    }
    text.replace(token, "<redacted>")
}

fn parse_update_kinds(csv: &str) -> Result<Vec<UpdateKind>> {
    csv.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(str::parse)
        .collect()
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    raw.parse::<T>()
        .map_err(|e| Error::Config(format!("{key}: invalid value {raw:?}: {e}")))
}

fn parse_or<T: std::str::FromStr>(key: &str, raw: Option<String>, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match raw {
        Some(v) => parse_value(key, &v),
        None => Ok(default),
    }
}

/// Apply `.env` entries that the real environment does not already define.
fn load_dotenv_if_present(path: &Path) {
    let Ok(contents) = fs::read_to_string(path) else {
        return;
    };
    for (key, value) in parse_dotenv(&contents) {
        if env::var_os(&key).is_none() {
            env::set_var(key, value);
        }
    }
}

/// `KEY=value` lines; `#` comments, blank lines and an `export ` prefix are
/// accepted, and one pair of matching quotes around the value is removed.
fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    ['"', '\'']
        .iter()
        .find_map(|q| value.strip_prefix(*q)?.strip_suffix(*q))
        .unwrap_or(value)
}

fn non_empty(s: String) -> Option<String> {
    if s.is_empty() {
        None
    } else {
        Some(s)
    }
}
