//! The serialized invocation runtime.
//!
//! The engine handle is not safe for concurrent use, so one worker thread
//! owns the [`Gateway`] and executes invocations strictly one at a time.
//! The busy policy is REJECT — a second invocation arriving while one is
//! in flight receives `SessionBusy` immediately; nothing queues behind a
//! long-running solve.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{bounded, Receiver, Sender};
use tracing::info;

use crate::error::GatewayError;
use crate::ir::{InvocationResult, ToolRequest};

use super::Gateway;

enum Job {
    Invoke {
        request: ToolRequest,
        reply: Sender<InvocationResult>,
    },
}

/// Clears the in-flight flag when the caller is done with an invocation.
#[derive(Debug)]
struct BusyGuard(Arc<AtomicBool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// Handle to one in-flight invocation.
///
/// The runtime stays busy until this handle is joined or dropped.
#[derive(Debug)]
pub struct InvocationHandle {
    rx: Receiver<InvocationResult>,
    _busy: BusyGuard,
}

impl InvocationHandle {
    /// Waits for the invocation to complete.
    ///
    /// If the worker disappears before replying, the result is an
    /// `EngineError` failure rather than a fault.
    #[must_use]
    pub fn join(self) -> InvocationResult {
        self.rx.recv().unwrap_or_else(|_| {
            InvocationResult::failure(&GatewayError::engine("invocation worker disconnected"))
        })
    }
}

/// A single-worker runtime enforcing one invocation in flight.
pub struct GatewayRuntime {
    tx: Sender<Job>,
    busy: Arc<AtomicBool>,
    worker: Option<JoinHandle<()>>,
}

impl GatewayRuntime {
    /// Starts the worker thread that owns the gateway.
    #[must_use]
    pub fn start(mut gateway: Gateway) -> Self {
        let (tx, rx) = bounded::<Job>(1);
        let worker = thread::Builder::new()
            .name("gridgate-worker".to_string())
            .spawn(move || {
                while let Ok(Job::Invoke { request, reply }) = rx.recv() {
                    let result = gateway.handle(&request);
                    let _ = reply.send(result);
                }
            })
            .expect("failed to spawn gridgate worker");

        Self {
            tx,
            busy: Arc::new(AtomicBool::new(false)),
            worker: Some(worker),
        }
    }

    /// Submits a request without waiting. Fails with `Busy` if an
    /// invocation is already in flight.
    pub fn submit(&self, request: ToolRequest) -> Result<InvocationHandle, GatewayError> {
        if self
            .busy
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .is_err()
        {
            return Err(GatewayError::Busy);
        }
        let guard = BusyGuard(Arc::clone(&self.busy));

        let (reply_tx, reply_rx) = bounded::<InvocationResult>(1);
        let job = Job::Invoke {
            request,
            reply: reply_tx,
        };
        if self.tx.send(job).is_err() {
            return Err(GatewayError::engine("invocation worker disconnected"));
        }
        Ok(InvocationHandle {
            rx: reply_rx,
            _busy: guard,
        })
    }

    /// Submits a request and waits for its result. A rejected submit
    /// becomes a `SessionBusy` failure response.
    #[must_use]
    pub fn invoke(&self, request: ToolRequest) -> InvocationResult {
        match self.submit(request) {
            Ok(handle) => handle.join(),
            Err(err) => InvocationResult::failure(&err),
        }
    }
}

impl Drop for GatewayRuntime {
    fn drop(&mut self) {
        // Close the channel so the worker exits, then join it.
        let (closed, _) = bounded::<Job>(0);
        drop(std::mem::replace(&mut self.tx, closed));
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
            info!("invocation worker stopped");
        }
    }
}
