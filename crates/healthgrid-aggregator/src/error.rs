//! Error types for talking to the health aggregator.

use thiserror::Error;

pub type AggregatorResult<T> = Result<T, AggregatorError>;

/// Errors seen by aggregator handles. Message handling itself never fails.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AggregatorError {
    #[error("health aggregator mailbox is closed")]
    Closed,

    #[error("health aggregator dropped the reply for {0}")]
    NoReply(&'static str),
}
