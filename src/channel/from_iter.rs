use crate::support::FixedQueue;
use crate::transform::Transform;
use crate::Payload;

use super::core::{maybe_transition_to_ended, Channel, State};

impl<T: Payload> Channel<T> {
    /// Builds a channel pre-loaded with `values`, buffered at a capacity equal to the number of
    /// values materialized from it (minimum one, so an empty source still yields a valid,
    /// immediately-drainable channel rather than hitting the zero-capacity restriction ordinary
    /// construction enforces).
    ///
    /// If `keep_open` is false the channel is `Closed` immediately, so it ends as soon as its
    /// preloaded values are taken; if true it stays `Open` and behaves like any other buffered
    /// channel seeded with an initial backlog.
    pub fn from_iter<I>(values: I, keep_open: bool) -> Self
    where
        I: IntoIterator<Item = T>,
    {
        let items: Vec<T> = values.into_iter().collect();
        let mut buf = FixedQueue::new(items.len().max(1));
        for value in items {
            buf.push(value);
        }

        let channel = Self::build(Some(buf), Transform::default());

        if !keep_open {
            let mut state = channel.inner.state.lock();
            state.state = State::Closed;
            maybe_transition_to_ended(&mut state);
        }

        channel
    }
}
