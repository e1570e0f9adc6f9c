use serde::Serialize;
use std::fmt;

#[derive(Debug, Clone, PartialEq)]
pub enum IngestError {
    /// No feed credential configured. Fatal, raised before any fetch.
    CredentialMissing,
    /// Non-success HTTP status (`status` set) or a network/body failure.
    Transport { status: Option<u16>, detail: String },
    /// The feed answered but reported a logical error (bad station, quota, ...).
    UpstreamApi { message: String },
    /// Payload not usable: non-ok status, missing `data`, malformed entries.
    Schema { detail: String },
    /// A forecast `day` that is not `YYYY-MM-DD`.
    DateParse { value: String, detail: String },
}

impl IngestError {
    pub fn schema(detail: impl Into<String>) -> Self {
        Self::Schema {
            detail: detail.into(),
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::CredentialMissing => FailureKind::CredentialMissing,
            Self::Transport { .. } => FailureKind::Transport,
            Self::UpstreamApi { .. } => FailureKind::UpstreamApi,
            Self::Schema { .. } => FailureKind::Schema,
            Self::DateParse { .. } => FailureKind::DateParse,
        }
    }

    /// Whether the backfill loop may skip the day and carry on.
    pub fn is_per_day(&self) -> bool {
        !matches!(self, Self::CredentialMissing)
    }
}

impl fmt::Display for IngestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::CredentialMissing => write!(f, "AQICN_API_TOKEN is required"),
            Self::Transport {
                status: Some(status),
                detail,
            } => write!(f, "failed to fetch data: HTTP {status}: {detail}"),
            Self::Transport { status: None, detail } => {
                write!(f, "failed to fetch data: {detail}")
            }
            Self::UpstreamApi { message } => write!(f, "API error: {message}"),
            Self::Schema { detail } => write!(f, "invalid data: {detail}"),
            Self::DateParse { value, detail } => {
                write!(f, "invalid forecast date {value:?}: {detail}")
            }
        }
    }
}

impl std::error::Error for IngestError {}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    CredentialMissing,
    Transport,
    UpstreamApi,
    Schema,
    DateParse,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CredentialMissing => "credential_missing",
            Self::Transport => "transport",
            Self::UpstreamApi => "upstream_api",
            Self::Schema => "schema",
            Self::DateParse => "date_parse",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
