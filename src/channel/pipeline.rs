use futures::future::join_all;

use crate::transform::Transform;
use crate::Payload;

use super::core::{Channel, State};

impl<T: Payload> Channel<T> {
    /// Wires `channel` as a downstream of this one and returns it, so chains read left to right:
    /// `source.pipe(stage_a).pipe(stage_b)`.
    ///
    /// Once wired, this channel lazily spawns a single background task (if it hasn't already) that
    /// `take`s from it in a loop and forwards every value into the current set of downstream
    /// channels, fanning a value out to all of them concurrently when there is more than one.
    pub fn pipe(&self, channel: Channel<T>) -> Channel<T> {
        self.add_downstream(channel.clone());
        channel
    }

    /// Wires every channel in `channels` as a downstream, in order, returning the last one (or
    /// this channel itself if `channels` was empty).
    pub fn pipe_many<I>(&self, channels: I) -> Channel<T>
    where
        I: IntoIterator<Item = Channel<T>>,
    {
        let mut last = None;
        for channel in channels {
            self.add_downstream(channel.clone());
            last = Some(channel);
        }
        last.unwrap_or_else(|| self.clone())
    }

    /// Removes `channel` from this channel's downstream pipeline, if present. Siblings already
    /// wired alongside it are unaffected.
    pub fn unpipe(&self, channel: &Channel<T>) -> &Self {
        let mut state = self.inner.state.lock();
        state
            .pipeline
            .retain(|existing| !std::sync::Arc::ptr_eq(&existing.inner, &channel.inner));
        self
    }

    fn add_downstream(&self, channel: Channel<T>) {
        {
            let mut state = self.inner.state.lock();
            state.pipeline.push(channel);
        }
        self.ensure_forwarder();
    }

    fn ensure_forwarder(&self) {
        {
            let mut state = self.inner.state.lock();
            if state.forwarder_spawned {
                return;
            }
            state.forwarder_spawned = true;
        }

        let this = self.clone();
        tokio::spawn(async move { this.run_forwarder().await });
    }

    async fn run_forwarder(&self) {
        loop {
            let downstreams = {
                let mut state = self.inner.state.lock();
                if state.state == State::Ended {
                    break;
                }
                if state.pipeline.is_empty() {
                    // The last downstream was `unpipe`d; nothing to forward to right now. Clear
                    // the guard and stop, rather than idling. A later `pipe()` sees the cleared
                    // guard and spawns a fresh forwarder.
                    state.forwarder_spawned = false;
                    break;
                }
                state.pipeline.clone()
            };

            match self.take().await {
                None => break,
                Some(value) => {
                    let puts = downstreams.into_iter().map(|downstream| {
                        let value = value.clone();
                        async move { downstream.put(value).await }
                    });
                    // A downstream's transform can fail independently of the others; the value has
                    // already left this channel by the time the forwarder runs, so there is no
                    // caller left to propagate the error to. Trace it and keep forwarding to the
                    // remaining downstreams instead of taking the whole pipeline down with it.
                    for result in join_all(puts).await {
                        if let Err(error) = result {
                            error!(%error, "pipeline forwarder failed to deliver a value downstream");
                        }
                    }
                }
            }
        }
    }

    /// Builds a `(first, last)` pair of `transforms.len() + 1` chained channels: `first` carries
    /// `transforms[0]`, each subsequent channel carries the next transform, and `last` is a plain
    /// sink with the identity transform. Equivalent to constructing each channel individually and
    /// `pipe`-ing them together in order.
    pub fn pipeline(transforms: Vec<Transform<T>>) -> (Channel<T>, Channel<T>) {
        let mut stages: Vec<Channel<T>> = transforms
            .into_iter()
            .map(|transform| Channel::build(None, transform))
            .collect();
        stages.push(Channel::new());

        for i in 0..stages.len() - 1 {
            let next = stages[i + 1].clone();
            stages[i].pipe(next);
        }

        let last = stages.last().unwrap().clone();
        let first = stages.first().unwrap().clone();
        (first, last)
    }

    /// Returns a new channel fed by this channel and every channel in `sources`: each source is
    /// piped into the merged output, which closes once every source has reached `Ended`.
    pub fn merge<I>(&self, sources: I) -> Channel<T>
    where
        I: IntoIterator<Item = Channel<T>>,
    {
        let mut all = vec![self.clone()];
        all.extend(sources);
        Self::merge_all(all)
    }

    fn merge_all(sources: Vec<Channel<T>>) -> Channel<T> {
        let out = Channel::new();

        for source in &sources {
            source.pipe(out.clone());
        }

        let out_done = out.clone();
        tokio::spawn(async move {
            join_all(sources.iter().map(Channel::done)).await;
            out_done.close(false);
        });

        out
    }
}
