//! Evaluation Stack - Ambient read tracking.
//!
//! Every recomputation pushes a frame naming the cell being computed. Reads
//! made while that frame is on top are recorded as its dependencies. Frames
//! nest, so a computation that pulls another stale cell (or a continuation that
//! starts a fresh evaluation) gets its own frame and never leaks reads into
//! the outer one.

use std::cell::RefCell;

use super::cell::CellKey;

struct Frame {
    /// None for untracked frames: reads are not recorded anywhere.
    reader: Option<CellKey>,
    reads: Vec<CellKey>,
}

thread_local! {
    static STACK: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

/// Pops its frame when dropped, also on unwind.
pub(crate) struct FrameGuard {
    depth: usize,
    finished: bool,
}

impl FrameGuard {
    /// Pop the frame and return what it read, in read order.
    pub fn finish(mut self) -> Vec<CellKey> {
        self.finished = true;
        pop(self.depth)
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if !self.finished {
            pop(self.depth);
        }
    }
}

fn pop(depth: usize) -> Vec<CellKey> {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        // Frames above ours belong to evaluations that unwound without finishing.
        stack.truncate(depth + 1);
        stack.pop().map(|frame| frame.reads).unwrap_or_default()
    })
}

/// Push a frame recording reads on behalf of `reader`.
pub(crate) fn enter(reader: Option<CellKey>) -> FrameGuard {
    let depth = STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        stack.push(Frame {
            reader,
            reads: Vec::new(),
        });
        stack.len() - 1
    });
    FrameGuard {
        depth,
        finished: false,
    }
}

/// Record a read of `key` in the innermost frame.
///
/// Returns the reader that should become a dependent of `key`.
pub(crate) fn record(key: &CellKey) -> Option<CellKey> {
    STACK.with(|stack| {
        let mut stack = stack.borrow_mut();
        let frame = stack.last_mut()?;
        let reader = frame.reader.clone()?;
        if reader == *key {
            return None;
        }
        if !frame.reads.contains(key) {
            frame.reads.push(key.clone());
        }
        Some(reader)
    })
}

/// Number of frames on the stack.
pub(crate) fn depth() -> usize {
    STACK.with(|stack| stack.borrow().len())
}

/// No evaluation in progress.
pub(crate) fn is_idle() -> bool {
    depth() == 0
}

/// Run `f` without recording any of its reads.
///
/// Constructing nodes inside a rule goes through here, so the new node's
/// initial reads do not become dependencies of the rule that built it.
/// Eager cells it invalidated are flushed once no evaluation is in progress.
pub fn untracked<R>(f: impl FnOnce() -> R) -> R {
    let guard = enter(None);
    let result = f();
    guard.finish();
    // Eager cells queued inside run before control returns, unless an outer
    // evaluation will flush them.
    super::runtime::flush_eager_if_idle();
    result
}

pub(crate) fn reset_tracking() {
    STACK.with(|stack| stack.borrow_mut().clear());
}
