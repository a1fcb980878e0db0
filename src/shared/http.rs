use base64::Engine;
use std::time::Duration;

const ERROR_BODY_LIMIT: usize = 512;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HttpFailure {
    Status { status: u16, body: String },
    Transport(String),
}

impl HttpFailure {
    pub fn is_auth_failure(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == 401 || *status == 403)
    }
}

impl std::fmt::Display for HttpFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Status { status, body } => write!(f, "status {status}: {body}"),
            Self::Transport(message) => write!(f, "transport error: {message}"),
        }
    }
}

pub fn http_agent(timeout: Duration) -> ureq::Agent {
    ureq::AgentBuilder::new().timeout(timeout).build()
}

pub fn basic_auth_value(username: &str, password: &str) -> String {
    let encoded =
        base64::engine::general_purpose::STANDARD.encode(format!("{username}:{password}"));
    format!("Basic {encoded}")
}

pub fn bearer_value(token: &str) -> String {
    format!("Bearer {token}")
}

pub fn classify_error(err: ureq::Error) -> HttpFailure {
    match err {
        ureq::Error::Status(status, response) => {
            let body = response.into_string().unwrap_or_default();
            HttpFailure::Status {
                status,
                body: clip(&body, ERROR_BODY_LIMIT),
            }
        }
        ureq::Error::Transport(transport) => HttpFailure::Transport(transport.to_string()),
    }
}

pub fn encode_query(pairs: &[(&str, &str)]) -> String {
    pairs
        .iter()
        .map(|(key, value)| {
            format!(
                "{}={}",
                urlencoding::encode(key),
                urlencoding::encode(value)
            )
        })
        .collect::<Vec<_>>()
        .join("&")
}

pub fn join_url(base: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

pub fn clip(value: &str, max_chars: usize) -> String {
    value.chars().take(max_chars).collect()
}
