//! Deferred values - Cells whose computation is not ready yet.
//!
//! A rule returns [`Pending`] (see `Scope::defer`) when a prerequisite is not
//! available. Readers see the pending value and may await it. When it settles,
//! a scheduled continuation swaps the cached value exactly like an assignment
//! would, invalidating dependents. A rejected value leaves the cell dirty.

use std::cell::Cell;
use std::fmt;
use std::future::Future;

use futures::FutureExt;
use futures::future::{LocalBoxFuture, Shared};

use super::cell::CellKey;
use super::{runtime, scheduler};
use crate::error::Result;
use crate::types::Value;

thread_local! {
    static NEXT_ID: Cell<u64> = const { Cell::new(1) };
}

/// A value that will be known later. Clones share the same outcome.
#[derive(Clone)]
pub struct Pending {
    id: u64,
    future: Shared<LocalBoxFuture<'static, Result<Value>>>,
}

impl Pending {
    pub fn new(future: impl Future<Output = Result<Value>> + 'static) -> Self {
        let id = NEXT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            id,
            future: future.boxed_local().shared(),
        }
    }

    /// Already settled value.
    pub fn ready(value: Value) -> Self {
        Self::new(futures::future::ready(Ok(value)))
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    /// Outcome, if it has settled.
    pub fn peek(&self) -> Option<Result<Value>> {
        self.future.peek().cloned()
    }

    /// Future resolving to the outcome.
    pub fn resolved(&self) -> impl Future<Output = Result<Value>> + 'static {
        self.future.clone()
    }
}

impl fmt::Debug for Pending {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Pending")
            .field("id", &self.id)
            .field("settled", &self.future.peek().is_some())
            .finish()
    }
}

/// Settle `key` when `pending` resolves.
pub(crate) fn watch(key: CellKey, pending: Pending) {
    let id = pending.id;
    let outcome = pending.resolved();
    scheduler::spawn(async move {
        let outcome = outcome.await;
        runtime::settle(&key, id, outcome);
    });
}
