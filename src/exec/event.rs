// src/exec/event.rs

//! Completion handles returned by executors.
//!
//! An executor creates a ([`CompletionSignal`], [`CompletionHandle`]) pair per
//! dispatched operation, keeps the signal, and fires it once the work is done.
//! Handles are cheap to clone and may be polled or awaited from any thread
//! while the signal fires.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::Notify;

#[derive(Debug, Default)]
struct Signal {
    done: AtomicBool,
    notify: Notify,
}

/// Executor-side half: fires completion exactly once.
#[derive(Debug, Clone)]
pub struct CompletionSignal {
    inner: Arc<Signal>,
}

impl CompletionSignal {
    pub fn complete(&self) {
        if !self.inner.done.swap(true, Ordering::AcqRel) {
            self.inner.notify.notify_waiters();
        }
    }

    pub fn is_complete(&self) -> bool {
        self.inner.done.load(Ordering::Acquire)
    }
}

#[derive(Clone)]
enum Inner {
    Single(Arc<Signal>),
    /// Completes once every member completes.
    Joined(Arc<[CompletionHandle]>),
}

/// Observer-side half of an asynchronous operation.
#[derive(Clone)]
pub struct CompletionHandle {
    inner: Inner,
}

impl CompletionHandle {
    /// A new pending operation.
    pub fn pair() -> (CompletionSignal, CompletionHandle) {
        let signal = Arc::new(Signal::default());
        (
            CompletionSignal {
                inner: Arc::clone(&signal),
            },
            CompletionHandle {
                inner: Inner::Single(signal),
            },
        )
    }

    /// A handle that is already complete.
    pub fn completed() -> Self {
        let (signal, handle) = Self::pair();
        signal.complete();
        handle
    }

    /// Combine several handles into one. A single handle is returned as is.
    pub fn join(mut handles: Vec<CompletionHandle>) -> Self {
        if handles.len() == 1 {
            if let Some(handle) = handles.pop() {
                return handle;
            }
        }
        CompletionHandle {
            inner: Inner::Joined(handles.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        match &self.inner {
            Inner::Single(signal) => signal.done.load(Ordering::Acquire),
            Inner::Joined(members) => members.iter().all(CompletionHandle::is_complete),
        }
    }

    /// Wait until the operation completes.
    pub async fn wait(&self) {
        let mut signals = Vec::new();
        self.collect_signals(&mut signals);

        for signal in signals {
            loop {
                // Register before checking the flag so a concurrent
                // `notify_waiters` cannot slip in between.
                let notified = signal.notify.notified();
                if signal.done.load(Ordering::Acquire) {
                    break;
                }
                notified.await;
            }
        }
    }

    fn collect_signals(&self, out: &mut Vec<Arc<Signal>>) {
        match &self.inner {
            Inner::Single(signal) => out.push(Arc::clone(signal)),
            Inner::Joined(members) => {
                for member in members.iter() {
                    member.collect_signals(out);
                }
            }
        }
    }

    /// Number of underlying single operations.
    pub fn operation_count(&self) -> usize {
        match &self.inner {
            Inner::Single(_) => 1,
            Inner::Joined(members) => members.iter().map(CompletionHandle::operation_count).sum(),
        }
    }
}

impl fmt::Debug for CompletionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CompletionHandle")
            .field("operations", &self.operation_count())
            .field("complete", &self.is_complete())
            .finish()
    }
}
