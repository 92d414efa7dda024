/// Tagged error kinds, one per the five error categories in the error-handling
/// design: transient network failures are retried below this layer and never
/// surface here; the remaining four are propagated explicitly so callers can
/// match on kind rather than parse a message.
#[derive(thiserror::Error, Debug)]
pub enum EngineError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("order rejected: {0}")]
    Rejected(String),

    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("fatal exposure on {market}: unhedged loss {loss_cents}c exceeds cap")]
    FatalExposure { market: String, loss_cents: i64 },

    #[error("cycle desync: event for {event_slug} dropped, expected {expected_slug}")]
    CycleDesync {
        event_slug: String,
        expected_slug: String,
    },
}

pub type EngineResult<T> = Result<T, EngineError>;
