use std::error::Error as StdError;
use std::future::Future;

use snafu::ResultExt;
use tokio::task::JoinHandle;

use crate::error::{ConsumerFailedSnafu, ProducerFailedSnafu};
use crate::{ChannelError, Payload};

use super::core::{Channel, State};

impl<T: Payload> Channel<T> {
    /// Spawns a task that repeatedly calls `f`, `put`ting whatever it produces, until the channel
    /// stops accepting puts (it is no longer `Open`) or `f` returns an error.
    pub fn produce<F, Fut>(&self, f: F) -> JoinHandle<Result<(), ChannelError>>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, Box<dyn StdError + Send + Sync>>> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            loop {
                if this.state() != State::Open {
                    return Ok(());
                }

                let value = f().await.context(ProducerFailedSnafu)?;

                if !this.put(value).await? {
                    return Ok(());
                }
            }
        })
    }

    /// Spawns a task that `take`s values in a loop and calls `f` with each one, until the channel
    /// is drained and ended or `f` returns an error.
    pub fn consume<F, Fut>(&self, f: F) -> JoinHandle<Result<(), ChannelError>>
    where
        F: Fn(T) -> Fut + Send + 'static,
        Fut: Future<Output = Result<(), Box<dyn StdError + Send + Sync>>> + Send + 'static,
    {
        let this = self.clone();
        tokio::spawn(async move {
            while let Some(value) = this.take().await {
                f(value).await.context(ConsumerFailedSnafu)?;
            }
            Ok(())
        })
    }
}
