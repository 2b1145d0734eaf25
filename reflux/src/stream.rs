//! Bridge from the callback protocol to `futures::Stream`

use crate::error::Failure;
use crate::publisher::Publisher;
use crate::signal::Signal;
use crate::subscriber::Subscriber;
use crate::subscription::SubscriptionRef;
use futures::Stream;
use parking_lot::Mutex;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::mpsc;
use tracing::debug;

/// Stream of the values of one subscription
///
/// Yields `Ok` for every value and a final `Err` if the run failed. The
/// stream ends after the terminal signal.
pub struct SignalStream<T> {
    receiver: mpsc::UnboundedReceiver<Signal<T>>,
    subscription: Arc<Mutex<Option<SubscriptionRef>>>,
    done: bool,
}

impl<T: Send + 'static> SignalStream<T> {
    /// Subscribe to `publisher`, requesting `batch` values up front
    pub(crate) fn subscribe<P>(publisher: &P, batch: u64) -> Self
    where
        P: Publisher<T> + ?Sized,
    {
        let (sender, receiver) = mpsc::unbounded_channel();
        let subscription = Arc::new(Mutex::new(None));
        publisher.subscribe(Box::new(ChannelSubscriber {
            sender,
            subscription: subscription.clone(),
            batch: batch.max(1),
        }));
        Self {
            receiver,
            subscription,
            done: false,
        }
    }
}

impl<T> SignalStream<T> {
    fn release(&mut self) -> Option<SubscriptionRef> {
        self.done = true;
        self.subscription.lock().take()
    }
}

impl<T> Stream for SignalStream<T> {
    type Item = Result<T, Failure>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        if self.done {
            return Poll::Ready(None);
        }
        match self.receiver.poll_recv(cx) {
            Poll::Ready(Some(Signal::Next(value))) => {
                let subscription = self.subscription.lock().clone();
                if let Some(subscription) = subscription {
                    subscription.request(1);
                }
                Poll::Ready(Some(Ok(value)))
            }
            Poll::Ready(Some(Signal::Error(failure))) => {
                self.release();
                Poll::Ready(Some(Err(failure)))
            }
            Poll::Ready(Some(Signal::Complete)) | Poll::Ready(None) => {
                self.release();
                Poll::Ready(None)
            }
            Poll::Pending => Poll::Pending,
        }
    }
}

impl<T> Drop for SignalStream<T> {
    fn drop(&mut self) {
        if let Some(subscription) = self.release() {
            debug!("Signal stream dropped, cancelling subscription");
            subscription.cancel();
        }
    }
}

struct ChannelSubscriber<T> {
    sender: mpsc::UnboundedSender<Signal<T>>,
    subscription: Arc<Mutex<Option<SubscriptionRef>>>,
    batch: u64,
}

impl<T: Send + 'static> Subscriber<T> for ChannelSubscriber<T> {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        *self.subscription.lock() = Some(subscription.clone());
        subscription.request(self.batch);
    }

    fn on_next(&mut self, value: T) {
        // Receiver gone means the stream was dropped and cancelled
        let _ = self.sender.send(Signal::Next(value));
    }

    fn on_error(&mut self, failure: Failure) {
        self.subscription.lock().take();
        let _ = self.sender.send(Signal::Error(failure));
    }

    fn on_complete(&mut self) {
        self.subscription.lock().take();
        let _ = self.sender.send(Signal::Complete);
    }
}
