//! Merging of inner publishers
//!
//! Every upstream value is mapped to an inner publisher which is subscribed
//! right away. Inner values land in one shared queue and a single
//! work-in-progress drain hands them to the downstream, so signals reach it
//! serially even when inners run on different scheduler threads.

use crate::error::{Failure, ReactiveError};
use crate::flux::Flux;
use crate::publisher::{Publisher, PublisherRef};
use crate::subscriber::{BoxSubscriber, Subscriber};
use crate::subscription::{Demand, Flag, Subscription, SubscriptionRef, UNBOUNDED, WorkInProgress};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use tracing::{debug, warn};

/// Default number of values requested from each inner publisher up front
pub const DEFAULT_PREFETCH: u64 = 32;

pub(crate) type InnerMapper<T, R> = Arc<dyn Fn(T) -> Flux<R> + Send + Sync>;

pub(crate) struct FlatMap<T, R> {
    source: PublisherRef<T>,
    mapper: InnerMapper<T, R>,
    concurrency: u64,
    prefetch: u64,
}

impl<T, R> FlatMap<T, R> {
    pub(crate) fn new(
        source: PublisherRef<T>,
        mapper: InnerMapper<T, R>,
        concurrency: u64,
        prefetch: u64,
    ) -> Self {
        Self {
            source,
            mapper,
            concurrency: concurrency.max(1),
            prefetch: prefetch.max(1),
        }
    }
}

impl<T, R> Publisher<R> for FlatMap<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn subscribe(&self, subscriber: BoxSubscriber<R>) {
        let main = Arc::new(FlatMapMain {
            downstream: Mutex::new(Some(subscriber)),
            queue: Mutex::new(VecDeque::new()),
            inners: Mutex::new(HashMap::new()),
            upstream: Mutex::new(None),
            error: Mutex::new(None),
            requested: Demand::new(),
            wip: WorkInProgress::new(),
            active: AtomicUsize::new(0),
            next_id: AtomicU64::new(0),
            upstream_done: Flag::new(),
            cancelled: Flag::new(),
            concurrency: self.concurrency,
            prefetch: self.prefetch,
        });

        self.source.subscribe(Box::new(FlatMapOuter {
            main,
            mapper: self.mapper.clone(),
            done: false,
        }));
    }
}

struct FlatMapMain<R> {
    downstream: Mutex<Option<BoxSubscriber<R>>>,
    /// Merged inner values tagged with the id of the inner that produced them
    queue: Mutex<VecDeque<(u64, R)>>,
    inners: Mutex<HashMap<u64, SubscriptionRef>>,
    upstream: Mutex<Option<SubscriptionRef>>,
    /// First failure observed; later ones are dropped
    error: Mutex<Option<Failure>>,
    requested: Demand,
    wip: WorkInProgress,
    /// Inners subscribed and not yet terminated
    active: AtomicUsize,
    next_id: AtomicU64,
    upstream_done: Flag,
    /// Raised on downstream cancel and on termination
    cancelled: Flag,
    concurrency: u64,
    prefetch: u64,
}

impl<R: Send + 'static> FlatMapMain<R> {
    fn drain(&self) {
        if self.wip.enter() {
            self.drain_loop(1);
        }
    }

    fn drain_loop(&self, mut missed: usize) {
        loop {
            let delivered = self.emit();
            self.replenish(delivered);
            missed = self.wip.leave(missed);
            if missed == 0 {
                break;
            }
        }
    }

    /// Deliver what demand allows. Returns the ids of inners whose values
    /// were delivered, so their prefetch can be topped up outside the lock.
    fn emit(&self) -> Vec<u64> {
        let mut delivered = Vec::new();
        let mut downstream = self.downstream.lock();

        loop {
            if downstream.is_none() {
                self.queue.lock().clear();
                return delivered;
            }

            let failure = self.error.lock().take();
            if let Some(failure) = failure {
                self.cancelled.raise();
                self.queue.lock().clear();
                if let Some(mut subscriber) = downstream.take() {
                    subscriber.on_error(failure);
                }
                return delivered;
            }

            if self.cancelled.is_raised() {
                downstream.take();
                self.queue.lock().clear();
                return delivered;
            }

            // Read completion state before looking at the queue: an inner
            // enqueues its values before it counts as terminated
            let done =
                self.upstream_done.is_raised() && self.active.load(Ordering::Acquire) == 0;

            let next = if self.requested.current() > 0 {
                self.queue.lock().pop_front()
            } else {
                None
            };

            match next {
                Some((id, value)) => {
                    self.requested.produced(1);
                    if let Some(subscriber) = downstream.as_mut() {
                        subscriber.on_next(value);
                    }
                    delivered.push(id);
                }
                None => {
                    let empty = self.queue.lock().is_empty();
                    if done && empty {
                        self.cancelled.raise();
                        if let Some(mut subscriber) = downstream.take() {
                            debug!("flat_map completed");
                            subscriber.on_complete();
                        }
                    }
                    return delivered;
                }
            }
        }
    }

    fn replenish(&self, delivered: Vec<u64>) {
        if delivered.is_empty() || self.prefetch == UNBOUNDED || self.cancelled.is_raised() {
            return;
        }
        let mut counts: HashMap<u64, u64> = HashMap::new();
        for id in delivered {
            *counts.entry(id).or_insert(0) += 1;
        }
        for (id, count) in counts {
            let inner = self.inners.lock().get(&id).cloned();
            if let Some(inner) = inner {
                inner.request(count);
            }
        }
    }

    fn fail(&self, failure: Failure) {
        {
            let mut slot = self.error.lock();
            if slot.is_some() || self.cancelled.is_raised() {
                warn!("flat_map dropped a failure after termination: {}", failure);
                return;
            }
            *slot = Some(failure);
        }
        self.cancel_sources();
        self.drain();
    }

    /// Cancel upstream and every active inner
    fn cancel_sources(&self) {
        let upstream = self.upstream.lock().take();
        if let Some(upstream) = upstream {
            upstream.cancel();
        }
        let inners: Vec<SubscriptionRef> = self.inners.lock().drain().map(|(_, s)| s).collect();
        if !inners.is_empty() {
            debug!("flat_map cancelling {} inner subscription(s)", inners.len());
        }
        for inner in inners {
            inner.cancel();
        }
    }

    fn inner_completed(&self, id: u64) {
        self.inners.lock().remove(&id);
        self.active.fetch_sub(1, Ordering::AcqRel);
        if self.concurrency != UNBOUNDED && !self.cancelled.is_raised() {
            let upstream = self.upstream.lock().clone();
            if let Some(upstream) = upstream {
                upstream.request(1);
            }
        }
        self.drain();
    }
}

impl<R: Send + 'static> Subscription for FlatMapMain<R> {
    fn request(&self, n: u64) {
        if n == 0 {
            self.fail(ReactiveError::NonPositiveRequest(0).into());
            return;
        }
        self.requested.add(n);
        self.drain();
    }

    fn cancel(&self) {
        if !self.cancelled.raise() {
            return;
        }
        debug!("flat_map cancelled by downstream");
        self.cancel_sources();
        self.drain();
    }
}

struct FlatMapOuter<T, R> {
    main: Arc<FlatMapMain<R>>,
    mapper: InnerMapper<T, R>,
    done: bool,
}

impl<T, R> Subscriber<T> for FlatMapOuter<T, R>
where
    T: Send + 'static,
    R: Send + 'static,
{
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        let main = &self.main;
        *main.upstream.lock() = Some(subscription.clone());

        // Own the drain while the downstream subscribes so its requests are
        // only recorded
        main.wip.enter();
        {
            let handle: SubscriptionRef = main.clone();
            let mut downstream = main.downstream.lock();
            if let Some(subscriber) = downstream.as_mut() {
                subscriber.on_subscribe(handle);
            }
        }
        main.drain_loop(1);

        if !main.cancelled.is_raised() {
            subscription.request(main.concurrency);
        }
    }

    fn on_next(&mut self, value: T) {
        if self.done || self.main.cancelled.is_raised() {
            return;
        }
        let inner = (self.mapper)(value);
        let id = self.main.next_id.fetch_add(1, Ordering::AcqRel);
        self.main.active.fetch_add(1, Ordering::AcqRel);
        inner.subscribe(Box::new(FlatMapInner {
            main: self.main.clone(),
            id,
            done: false,
        }));
    }

    fn on_error(&mut self, failure: Failure) {
        if self.done {
            return;
        }
        self.done = true;
        self.main.upstream.lock().take();
        self.main.fail(failure);
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.main.upstream.lock().take();
        self.main.upstream_done.raise();
        self.main.drain();
    }
}

struct FlatMapInner<R> {
    main: Arc<FlatMapMain<R>>,
    id: u64,
    done: bool,
}

impl<R: Send + 'static> Subscriber<R> for FlatMapInner<R> {
    fn on_subscribe(&mut self, subscription: SubscriptionRef) {
        if self.main.cancelled.is_raised() {
            subscription.cancel();
            return;
        }
        self.main
            .inners
            .lock()
            .insert(self.id, subscription.clone());
        // A cancel racing with the insert above may have missed this inner
        if self.main.cancelled.is_raised() {
            self.main.inners.lock().remove(&self.id);
            subscription.cancel();
            return;
        }
        subscription.request(self.main.prefetch);
    }

    fn on_next(&mut self, value: R) {
        if self.done {
            return;
        }
        self.main.queue.lock().push_back((self.id, value));
        self.main.drain();
    }

    fn on_error(&mut self, failure: Failure) {
        if self.done {
            return;
        }
        self.done = true;
        self.main.inners.lock().remove(&self.id);
        self.main.active.fetch_sub(1, Ordering::AcqRel);
        self.main.fail(failure);
    }

    fn on_complete(&mut self) {
        if self.done {
            return;
        }
        self.done = true;
        self.main.inner_completed(self.id);
    }
}
