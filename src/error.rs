//! Error taxonomy for a single report cycle.
//!
//! Every variant is recoverable at the cycle boundary: the scheduler logs it
//! and waits for the next tick. Only configuration problems are fatal and
//! those never reach this type.

/// Everything that can go wrong while fetching, reporting or persisting.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Transport failure (connect, timeout, body read). The URL is stripped
    /// from the inner error so the bot token never ends up in logs.
    #[error("network error talking to {endpoint}: {source}")]
    Network {
        endpoint: &'static str,
        #[source]
        source: reqwest::Error,
    },

    /// The census API answered, but not with a success status.
    #[error("{endpoint} answered with HTTP {status}")]
    HttpStatus {
        endpoint: &'static str,
        status: reqwest::StatusCode,
    },

    /// Snapshot body was not JSON or lacked `nodes`.
    #[error("malformed snapshot: {0}")]
    Parse(#[from] serde_json::Error),

    /// Telegram refused a chunk. Chunks before it were already posted.
    #[error("delivery rejected with HTTP {status} after {delivered} chunk(s): {description}")]
    Delivery {
        status: reqwest::StatusCode,
        description: String,
        delivered: usize,
    },

    #[error("persisted state is unreadable: {0}")]
    StateCorrupt(String),

    #[error("state file i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    pub(crate) fn network(endpoint: &'static str, source: reqwest::Error) -> Self {
        Error::Network {
            endpoint,
            source: source.without_url(),
        }
    }

    /// Short stable label used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Network { .. } | Error::HttpStatus { .. } => "network",
            Error::Parse(_) => "parse",
            Error::Delivery { .. } => "delivery",
            Error::StateCorrupt(_) => "state_corrupt",
            Error::Io(_) => "io",
        }
    }
}
