//! Scheduler - "Run after the current synchronous work".
//!
//! A thread-local `LocalPool` holds continuations: first `update` pulls of new
//! display controllers and the settlement of deferred cell values. Nothing runs
//! until [`tick`] drains the pool, so every mutation made in the same
//! synchronous phase is batched into one pass.

use std::cell::RefCell;
use std::future::Future;

use futures::executor::{LocalPool, LocalSpawner};
use futures::task::LocalSpawnExt;

struct Scheduler {
    pool: RefCell<LocalPool>,
    spawner: RefCell<LocalSpawner>,
}

impl Scheduler {
    fn new() -> Self {
        let pool = LocalPool::new();
        let spawner = pool.spawner();
        Self {
            pool: RefCell::new(pool),
            spawner: RefCell::new(spawner),
        }
    }
}

thread_local! {
    static SCHEDULER: Scheduler = Scheduler::new();
}

/// Queue a future to be polled on the next tick.
pub fn spawn(future: impl Future<Output = ()> + 'static) {
    // Clone the spawner so a task spawning more tasks never hits a borrow.
    let spawner = SCHEDULER.with(|scheduler| scheduler.spawner.borrow().clone());
    if let Err(error) = spawner.spawn_local(future) {
        tracing::warn!(%error, "scheduler rejected task");
    }
}

/// Queue a closure to run on the next tick.
pub fn defer(f: impl FnOnce() + 'static) {
    spawn(async move { f() });
}

/// Run queued work until nothing is ready.
///
/// Returns false without doing anything when called from inside a task.
pub fn tick() -> bool {
    SCHEDULER.with(|scheduler| match scheduler.pool.try_borrow_mut() {
        Ok(mut pool) => {
            pool.run_until_stalled();
            true
        }
        Err(_) => false,
    })
}

/// Drop all queued work (for testing).
pub(crate) fn reset_scheduler() {
    let fresh = Scheduler::new();
    let old = SCHEDULER.with(|scheduler| {
        let pool = scheduler.pool.replace(fresh.pool.into_inner());
        scheduler.spawner.replace(fresh.spawner.into_inner());
        pool
    });
    drop(old);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::Cell;
    use std::rc::Rc;

    #[test]
    fn test_deferred_work_waits_for_tick() {
        reset_scheduler();

        let ran = Rc::new(Cell::new(0));
        let ran_clone = ran.clone();
        defer(move || ran_clone.set(ran_clone.get() + 1));

        assert_eq!(ran.get(), 0);
        assert!(tick());
        assert_eq!(ran.get(), 1);
        tick();
        assert_eq!(ran.get(), 1);
    }

    #[test]
    fn test_tasks_can_spawn_tasks() {
        reset_scheduler();

        let order = Rc::new(RefCell::new(Vec::new()));
        let outer = order.clone();
        defer(move || {
            outer.borrow_mut().push("outer");
            let inner = outer.clone();
            defer(move || inner.borrow_mut().push("inner"));
        });

        tick();
        assert_eq!(*order.borrow(), vec!["outer", "inner"]);
    }

    #[test]
    fn test_reentrant_tick_is_noop() {
        reset_scheduler();

        let nested = Rc::new(Cell::new(true));
        let nested_clone = nested.clone();
        defer(move || nested_clone.set(tick()));

        tick();
        assert!(!nested.get());
    }

    #[test]
    fn test_reset_drops_queued_work() {
        reset_scheduler();

        let ran = Rc::new(Cell::new(false));
        let ran_clone = ran.clone();
        defer(move || ran_clone.set(true));
        reset_scheduler();
        tick();
        assert!(!ran.get());
    }
}
