//! Side-effect hooks on every signal and demand change

use crate::error::Failure;
use crate::publisher::{Publisher, PublisherRef};
use crate::subscriber::{BoxSubscriber, Subscriber};
use crate::subscription::{Subscription, SubscriptionRef};
use std::sync::Arc;
use tracing::info;

type Hook = Arc<dyn Fn() + Send + Sync>;
type ValueHook<T> = Arc<dyn Fn(&T) + Send + Sync>;
type FailureHook = Arc<dyn Fn(&Failure) + Send + Sync>;
type RequestHook = Arc<dyn Fn(u64) + Send + Sync>;

/// Callbacks invoked before the corresponding signal is forwarded
pub(crate) struct Hooks<T> {
    pub(crate) on_subscribe: Option<Hook>,
    pub(crate) on_next: Option<ValueHook<T>>,
    pub(crate) on_error: Option<FailureHook>,
    pub(crate) on_complete: Option<Hook>,
    pub(crate) on_request: Option<RequestHook>,
    pub(crate) on_cancel: Option<Hook>,
}

impl<T> Default for Hooks<T> {
    fn default() -> Self {
        Self {
            on_subscribe: None,
            on_next: None,
            on_error: None,
            on_complete: None,
            on_request: None,
            on_cancel: None,
        }
    }
}

impl<T> Clone for Hooks<T> {
    fn clone(&self) -> Self {
        Self {
            on_subscribe: self.on_subscribe.clone(),
            on_next: self.on_next.clone(),
            on_error: self.on_error.clone(),
            on_complete: self.on_complete.clone(),
            on_request: self.on_request.clone(),
            on_cancel: self.on_cancel.clone(),
        }
    }
}

impl<T: std::fmt::Debug + 'static> Hooks<T> {
    /// Hooks that report every signal under `category`
    pub(crate) fn logging(category: &str) -> Self {
        let name: Arc<str> = Arc::from(category);
        let subscribe = name.clone();
        let next = name.clone();
        let error = name.clone();
        let complete = name.clone();
        let request = name.clone();
        let cancel = name;
        Self {
            on_subscribe: Some(Arc::new(move || {
                info!(category = %subscribe, "onSubscribe()");
            })),
            on_next: Some(Arc::new(move |value: &T| {
                info!(category = %next, "onNext({:?})", value);
            })),
            on_error: Some(Arc::new(move |failure: &Failure| {
                info!(category = %error, "onError({})", failure);
            })),
            on_complete: Some(Arc::new(move || {
                info!(category = %complete, "onComplete()");
            })),
            on_request: Some(Arc::new(move |n: u64| {
                if n == crate::subscription::UNBOUNDED {
                    info!(category = %request, "request(unbounded)");
                } else {
                    info!(category = %request, "request({})", n);
                }
            })),
            on_cancel: Some(Arc::new(move || {
                info!(category = %cancel, "cancel()");
            })),
        }
    }
}

pub(crate) struct Peek<T> {
    source: PublisherRef<T>,
    hooks: Hooks<T>,
}

impl<T> Peek<T> {
    pub(crate) fn new(source: PublisherRef<T>, hooks: Hooks<T>) -> Self {
        Self { source, hooks }
    }
}

impl<T: Send + 'static> Publisher<T> for Peek<T> {
    fn subscribe(&self, subscriber: BoxSubscriber<T>) {
        self.source.subscribe(Box::new(PeekSubscriber {
            downstream: subscriber,
            hooks: self.hooks.clone(),
        }));
    }
}

struct PeekSubscription {
    upstream: SubscriptionRef,
    on_request: Option<RequestHook>,
    on_cancel: Option<Hook>,
}

impl Subscription for PeekSubscription {
    fn request(&self, n: u64) {
        if let Some(hook) = &self.on_request {
            hook(n);
        }
        self.upstream.request(n);
    }

    fn cancel(&self) {
        if let Some(hook) = &self.on_cancel {
            hook();
        }
        self.upstream.cancel();
    }
}

struct PeekSubscriber<T> {
    downstream: BoxSubscriber<T>,
    hooks: Hooks<T>,
}

impl<T: Send + 'static> Subscriber<T> for PeekSubscriber<T> {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        if let Some(hook) = &self.hooks.on_subscribe {
            hook();
        }
        let subscription: SubscriptionRef =
            if self.hooks.on_request.is_none() && self.hooks.on_cancel.is_none() {
                subscription
            } else {
                Arc::new(PeekSubscription {
                    upstream: subscription,
                    on_request: self.hooks.on_request.clone(),
                    on_cancel: self.hooks.on_cancel.clone(),
                })
            };
        self.downstream.on_subscribe(subscription);
    }

    fn on_next(&mut self, value: T) {
        if let Some(hook) = &self.hooks.on_next {
            hook(&value);
        }
        self.downstream.on_next(value);
    }

    fn on_error(&mut self, failure: Failure) {
        if let Some(hook) = &self.hooks.on_error {
            hook(&failure);
        }
        self.downstream.on_error(failure);
    }

    fn on_complete(&mut self) {
        if let Some(hook) = &self.hooks.on_complete {
            hook();
        }
        self.downstream.on_complete();
    }
}
