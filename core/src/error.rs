use thiserror::Error;

/// Why a ticker's price could not be obtained.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PriceFailure {
    /// The provider has never heard of the ticker.
    UnknownTicker,
    /// The provider knows the ticker but could not serve a usable price.
    Upstream(String),
}

impl std::fmt::Display for PriceFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnknownTicker    => write!(f, "unknown ticker"),
            Self::Upstream(reason) => write!(f, "{reason}"),
        }
    }
}

#[derive(Error, Debug)]
pub enum SimError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Price unavailable for '{ticker}': {reason}")]
    PriceUnavailable { ticker: String, reason: PriceFailure },

    #[error("Internal computation error: {0}")]
    InternalComputation(String),

    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl SimError {
    pub fn invalid(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn unknown_ticker(ticker: &str) -> Self {
        Self::PriceUnavailable {
            ticker: ticker.to_string(),
            reason: PriceFailure::UnknownTicker,
        }
    }

    pub fn upstream(ticker: &str, reason: impl Into<String>) -> Self {
        Self::PriceUnavailable {
            ticker: ticker.to_string(),
            reason: PriceFailure::Upstream(reason.into()),
        }
    }

    /// HTTP-equivalent status code for surfacing this error at a boundary.
    pub fn status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) => 400,
            Self::PriceUnavailable { reason: PriceFailure::UnknownTicker, .. } => 404,
            Self::PriceUnavailable { reason: PriceFailure::Upstream(_), .. }  => 502,
            Self::InternalComputation(_)
            | Self::Database(_)
            | Self::Serialization(_)
            | Self::Other(_) => 500,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;
