use std::error::Error as StdError;

use snafu::Snafu;

/// The narrow error surface of the channel core.
///
/// The core deliberately does not treat `put` on a closed channel, or `take` on an ended one, as
/// errors — those are ordinary control flow (`false` and `None` respectively, per the state
/// machine's own contract). `ChannelError` only covers construction-time misuse and failures
/// that bubble up out of user-supplied callbacks.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum ChannelError {
    /// A bounded channel was constructed with a capacity of zero.
    #[snafu(display("channel capacity must be greater than zero"))]
    InvalidCapacity,

    /// A user transform failed (panicked, or returned an error through a fallible adapter) while
    /// processing a value.
    #[snafu(display("transform failed while processing a value: {source}"))]
    TransformFailed {
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A `produce` callback returned an error. This terminates the producer task but does not
    /// itself change the channel's state.
    #[snafu(display("producer callback failed: {source}"))]
    ProducerFailed {
        source: Box<dyn StdError + Send + Sync>,
    },

    /// A `consume` callback returned an error. This terminates the consumer task but does not
    /// itself change the channel's state.
    #[snafu(display("consumer callback failed: {source}"))]
    ConsumerFailed {
        source: Box<dyn StdError + Send + Sync>,
    },
}

pub type Result<T, E = ChannelError> = std::result::Result<T, E>;
