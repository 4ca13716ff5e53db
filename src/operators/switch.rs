//! Switch: only the most recent inner stream is subscribed.
//!
//! Each inner stream gets a [`Link`]. A new inner stream asks the current link
//! to cancel and is subscribed from that link's cancellation callback, after the
//! old stream stopped delivering.
//!
//! Each link's completion hook holds the switch strongly; the cycle is broken
//! when the downstream subscriber is canceled.

use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::observable::{Item, Notification, Observable, Observer};
use crate::operators::Link;
use crate::scheduler::SchedulerRef;
use crate::state::LinkState;
use crate::subscriber::Subscriber;

struct Current<T> {
    link: Option<(u64, Link<T>)>,
    next_id: u64,
    outer_done: bool,
}

struct Switch<T> {
    current: Mutex<Current<T>>,
    obs: Observer<T>,
    sched: SchedulerRef,
    sub: Subscriber,
}

impl<T: Item> Switch<T> {
    fn switch_to(self: &Arc<Self>, inner: Observable<T>) {
        let this = self.clone();
        let (link, previous) = {
            let mut cur = self.current.lock();
            if self.sub.canceled() {
                return;
            }
            let id = cur.next_id;
            cur.next_id += 1;
            let link = Link::new(self.obs.clone(), self.sub.add_child(), move || {
                this.inner_complete(id)
            });
            let previous = cur.link.replace((id, link.clone()));
            (link, previous)
        };

        let sched = self.sched.clone();
        let subscribe = move || {
            let _ = link.subscribe(&inner, sched);
        };
        match previous {
            Some((_, old)) => old.cancel(subscribe),
            None => subscribe(),
        }
    }

    fn inner_complete(&self, id: u64) {
        let finished = {
            let cur = self.current.lock();
            cur.outer_done && cur.link.as_ref().is_some_and(|(current, _)| *current == id)
        };
        if finished {
            self.obs.complete();
        }
    }

    /// Drops the current link, releasing its hook's reference to the switch.
    fn release(weak: &Weak<Self>) {
        let Some(this) = weak.upgrade() else {
            return;
        };
        let link = this.current.lock().link.take();
        drop(link);
    }

    fn outer_complete(&self) {
        let finished = {
            let mut cur = self.current.lock();
            cur.outer_done = true;
            match &cur.link {
                None => true,
                Some((_, link)) => matches!(link.state(), LinkState::Completing | LinkState::Complete),
            }
        };
        if finished {
            self.obs.complete();
        }
    }
}

fn switch_outer<U: Item, T: Item>(
    outer: Observable<U>,
    project: Arc<dyn Fn(U) -> Observable<T> + Send + Sync>,
) -> Observable<T> {
    Observable::create(move |obs: Observer<T>, sched: SchedulerRef, sub: Subscriber| {
        let state = Arc::new(Switch {
            current: Mutex::new(Current {
                link: None,
                next_id: 0,
                outer_done: false,
            }),
            obs: obs.serialized(),
            sched: sched.clone(),
            sub: sub.clone(),
        });
        let weak = Arc::downgrade(&state);
        sub.on_unsubscribe(move || Switch::release(&weak));
        let project = project.clone();
        let outer_obs = Observer::new(move |n: Notification<U>| match n {
            Notification::Next(v) => state.switch_to(project(v)),
            Notification::Error(e) => state.obs.error(e),
            Notification::Complete => state.outer_complete(),
        });
        outer.run(outer_obs, sched, sub.add_child());
    })
}

impl<T: Item> Observable<T> {
    /// Maps every value to a stream and mirrors only the most recent one.
    pub fn switch_map<R: Item>(
        &self,
        project: impl Fn(T) -> Observable<R> + Send + Sync + 'static,
    ) -> Observable<R> {
        switch_outer(self.clone(), Arc::new(project))
    }
}

impl<T: Item> Observable<Observable<T>> {
    /// Mirrors the most recent inner stream, dropping the previous one.
    ///
    /// Completes once the outer stream and the current inner stream have both
    /// completed.
    pub fn switch_all(&self) -> Observable<T> {
        switch_outer(self.clone(), Arc::new(|inner: Observable<T>| inner))
    }
}
