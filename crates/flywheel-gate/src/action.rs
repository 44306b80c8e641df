//! The `flywheel` query parameter.

use std::collections::HashMap;
use std::time::Duration;

use axum::extract::Query;
use flywheel_core::parse_duration;
use flywheel_lifecycle::PingKind;
use http::Uri;

/// Query parameter carrying the action indicator.
pub const ACTION_PARAM: &str = "flywheel";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    /// No indicator: ordinary traffic.
    PassThrough,
    Start,
    Stop,
    Status,
    StopIn(Duration),
    /// A `stop-in` whose duration did not parse. Answered as a status query.
    InvalidStopIn(String),
    /// Answered from configuration without asking the lifecycle actor.
    Config,
    /// Any other value. Treated like ordinary traffic, answered as JSON.
    Unknown(String),
}

impl Action {
    pub fn from_uri(uri: &Uri) -> Self {
        let params = Query::<HashMap<String, String>>::try_from_uri(uri)
            .map(|Query(params)| params)
            .unwrap_or_default();
        match params.get(ACTION_PARAM) {
            Some(value) if !value.is_empty() => Self::parse(value),
            _ => Action::PassThrough,
        }
    }

    pub fn parse(value: &str) -> Self {
        match value {
            "start" => Action::Start,
            "stop" => Action::Stop,
            "status" => Action::Status,
            "config" => Action::Config,
            other => match other
                .strip_prefix("stop-in:")
                .or_else(|| other.strip_prefix("stop_in:"))
            {
                Some(raw) => match parse_duration(raw) {
                    Some(duration) => Action::StopIn(duration),
                    None => Action::InvalidStopIn(raw.to_string()),
                },
                None => Action::Unknown(other.to_string()),
            },
        }
    }

    /// The request sent to the lifecycle actor, `None` for `config`.
    pub fn ping_kind(&self) -> Option<PingKind> {
        match self {
            Action::PassThrough | Action::Unknown(_) => Some(PingKind::Touch),
            Action::Start => Some(PingKind::Start),
            Action::Stop => Some(PingKind::Stop),
            Action::Status | Action::InvalidStopIn(_) => Some(PingKind::Status),
            Action::StopIn(duration) => Some(PingKind::StopIn(*duration)),
            Action::Config => None,
        }
    }

    /// Error to attach to the reply independently of the actor.
    pub fn error(&self) -> Option<String> {
        match self {
            Action::InvalidStopIn(raw) => Some(format!("invalid duration {raw:?}")),
            _ => None,
        }
    }
}

/// `path?query` of `uri` with the action parameter removed.
pub fn without_action(uri: &Uri) -> String {
    let pairs = retained_pairs(uri);
    if pairs.is_empty() {
        uri.path().to_string()
    } else {
        format!("{}?{}", uri.path(), pairs.join("&"))
    }
}

/// `path?query` of `uri` with the action parameter set to `start`.
pub fn with_start_action(uri: &Uri) -> String {
    let mut pairs = retained_pairs(uri);
    pairs.push(format!("{ACTION_PARAM}=start"));
    format!("{}?{}", uri.path(), pairs.join("&"))
}

/// Raw query pairs whose decoded key is not the action parameter.
///
/// Keys are compared after percent-decoding, the same way `from_uri` reads
/// them, so an encoded action key is stripped too.
fn retained_pairs(uri: &Uri) -> Vec<&str> {
    let decoded = Query::<Vec<(String, String)>>::try_from_uri(uri)
        .map(|Query(pairs)| pairs)
        .unwrap_or_default();
    uri.query()
        .unwrap_or_default()
        .split('&')
        .filter(|pair| !pair.is_empty())
        .enumerate()
        .filter(|(i, pair)| {
            let key = decoded
                .get(*i)
                .map(|(key, _)| key.as_str())
                .or_else(|| pair.split('=').next());
            key != Some(ACTION_PARAM)
        })
        .map(|(_, pair)| pair)
        .collect()
}
