// ── Channel-backed observers ──
//
// An `Observer` implementation that forwards every delivered batch into
// an unbounded channel, so async consumers can await updates instead of
// implementing the callback trait themselves.

use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tracing::debug;

use crate::model::{DataItem, Observer, ObserverHandle};

/// Observer that pushes each batch into a channel.
pub struct ChannelObserver {
    name: String,
    tx: mpsc::UnboundedSender<Vec<DataItem>>,
}

impl ChannelObserver {
    /// Create an observer and the receiving end of its batches.
    pub fn channel(name: impl Into<String>) -> (ObserverHandle, ObserverStream) {
        let (tx, rx) = mpsc::unbounded_channel();
        let observer = std::sync::Arc::new(Self {
            name: name.into(),
            tx,
        });
        (ObserverHandle::from(observer), ObserverStream { rx })
    }
}

impl Observer for ChannelObserver {
    fn name(&self) -> &str {
        &self.name
    }

    fn notify(&self, values: Vec<DataItem>) {
        if self.tx.send(values).is_err() {
            debug!(observer = %self.name, "receiver dropped; batch discarded");
        }
    }
}

/// Receiving side of a [`ChannelObserver`].
pub struct ObserverStream {
    rx: mpsc::UnboundedReceiver<Vec<DataItem>>,
}

impl ObserverStream {
    /// Wait for the next batch. `None` once the observer is gone and
    /// every queued batch has been read.
    pub async fn recv(&mut self) -> Option<Vec<DataItem>> {
        self.rx.recv().await
    }

    /// Next batch if one is already queued.
    pub fn try_recv(&mut self) -> Option<Vec<DataItem>> {
        self.rx.try_recv().ok()
    }

    /// Every batch queued right now, oldest first.
    pub fn drain(&mut self) -> Vec<Vec<DataItem>> {
        std::iter::from_fn(|| self.try_recv()).collect()
    }

    /// Convert into a `Stream` for use with `StreamExt` combinators.
    pub fn into_stream(self) -> ObserverBatchStream {
        ObserverBatchStream {
            inner: UnboundedReceiverStream::new(self.rx),
        }
    }
}

/// `Stream` adapter yielding one `Vec<DataItem>` per delivery.
pub struct ObserverBatchStream {
    inner: UnboundedReceiverStream<Vec<DataItem>>,
}

impl Stream for ObserverBatchStream {
    type Item = Vec<DataItem>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        Pin::new(&mut self.inner).poll_next(cx)
    }
}
