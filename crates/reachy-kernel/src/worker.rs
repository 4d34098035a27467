//! Runs one primitive on its own thread so the manager can stop waiting for
//! it at a deadline.
//!
//! The manager side keeps a request channel and a reply channel.  Replies
//! come back in request order, so after every outstanding reply has been
//! drained the next reply belongs to the next request.  A call that misses
//! its deadline stays outstanding; its reply is discarded when it finally
//! arrives, and no new request is sent to a worker that is still busy.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::thread;
use std::time::{Duration, Instant};

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender, TryRecvError};
use reachy_types::{CommandVector, ReachyError};

use crate::primitive::Primitive;

enum Request {
    Propose,
    Start,
    Stop,
}

enum Reply {
    Proposal(Result<CommandVector, String>),
    Started(Result<(), ReachyError>),
    Stopped,
}

/// Why a worker call produced no usable reply.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum CallError {
    /// An earlier call has not returned yet.
    Busy,
    /// No reply before the deadline.  The call keeps running.
    TimedOut,
    /// The call returned an error or panicked.
    Failed(String),
    /// The worker thread is gone.
    Disconnected,
}

impl CallError {
    pub(crate) fn reason(&self) -> String {
        match self {
            CallError::Busy => "previous call has not returned yet".to_string(),
            CallError::TimedOut => "no reply before the deadline".to_string(),
            CallError::Failed(reason) => reason.clone(),
            CallError::Disconnected => "primitive thread exited".to_string(),
        }
    }
}

/// Manager-side handle to a primitive running on its own thread.
///
/// Dropping the handle closes the request channel; the thread exits once
/// its current call returns.
pub(crate) struct PrimitiveWorker {
    requests: Sender<Request>,
    replies: Receiver<Reply>,
    outstanding: usize,
}

impl PrimitiveWorker {
    /// Move `primitive` onto a new thread named after it.
    pub(crate) fn spawn(name: &str, mut primitive: Box<dyn Primitive>) -> Result<Self, ReachyError> {
        let (requests, request_rx) = crossbeam_channel::unbounded::<Request>();
        let (reply_tx, replies) = crossbeam_channel::unbounded::<Reply>();
        let owner = name.to_string();

        thread::Builder::new()
            .name(format!("primitive-{name}"))
            .spawn(move || {
                for request in request_rx {
                    let reply = match request {
                        Request::Propose => Reply::Proposal(
                            match panic::catch_unwind(AssertUnwindSafe(|| primitive.propose())) {
                                Ok(Ok(vector)) => Ok(vector),
                                Ok(Err(e)) => Err(e.to_string()),
                                Err(payload) => Err(format!(
                                    "proposal panicked: {}",
                                    panic_message(payload.as_ref())
                                )),
                            },
                        ),
                        Request::Start => Reply::Started(
                            panic::catch_unwind(AssertUnwindSafe(|| primitive.on_start()))
                                .unwrap_or_else(|payload| {
                                    Err(ReachyError::PrimitiveTickFailure {
                                        primitive: owner.clone(),
                                        reason: format!(
                                            "start hook panicked: {}",
                                            panic_message(payload.as_ref())
                                        ),
                                    })
                                }),
                        ),
                        Request::Stop => {
                            let _ = panic::catch_unwind(AssertUnwindSafe(|| primitive.on_stop()));
                            Reply::Stopped
                        }
                    };
                    if reply_tx.send(reply).is_err() {
                        break;
                    }
                }
            })
            .map_err(|e| ReachyError::HardwareFault {
                component: format!("primitive '{name}'"),
                details: format!("failed to spawn primitive thread: {e}"),
            })?;

        Ok(Self {
            requests,
            replies,
            outstanding: 0,
        })
    }

    /// Whether an earlier call is still running.
    pub(crate) fn is_busy(&mut self) -> bool {
        self.drain();
        self.outstanding > 0
    }

    /// Ask for a proposal without waiting for it.  Several workers can be
    /// asked first and collected against one shared deadline.
    pub(crate) fn request_proposal(&mut self) -> Result<(), CallError> {
        if self.is_busy() {
            return Err(CallError::Busy);
        }
        self.send(Request::Propose)
    }

    /// Collect the proposal asked for by
    /// [`request_proposal`][Self::request_proposal].
    pub(crate) fn collect_proposal(&mut self, deadline: Instant) -> Result<CommandVector, CallError> {
        match self.wait(deadline)? {
            Reply::Proposal(Ok(vector)) => Ok(vector),
            Reply::Proposal(Err(reason)) => Err(CallError::Failed(reason)),
            _ => Err(CallError::Disconnected),
        }
    }

    /// Run the start hook, waiting at most `timeout`.
    pub(crate) fn start(&mut self, timeout: Duration) -> Result<Result<(), ReachyError>, CallError> {
        if self.is_busy() {
            return Err(CallError::Busy);
        }
        self.send(Request::Start)?;
        match self.wait(Instant::now() + timeout)? {
            Reply::Started(result) => Ok(result),
            _ => Err(CallError::Disconnected),
        }
    }

    /// Run the stop hook, waiting at most `timeout`.  A busy worker still
    /// gets the request; it runs once the current call returns.
    pub(crate) fn stop(&mut self, timeout: Duration) -> Result<(), CallError> {
        let waiting_behind = self.is_busy();
        self.send(Request::Stop)?;
        if waiting_behind {
            return Err(CallError::Busy);
        }
        match self.wait(Instant::now() + timeout)? {
            Reply::Stopped => Ok(()),
            _ => Err(CallError::Disconnected),
        }
    }

    fn send(&mut self, request: Request) -> Result<(), CallError> {
        self.requests.send(request).map_err(|_| CallError::Disconnected)?;
        self.outstanding += 1;
        Ok(())
    }

    fn wait(&mut self, deadline: Instant) -> Result<Reply, CallError> {
        match self.replies.recv_deadline(deadline) {
            Ok(reply) => {
                self.outstanding -= 1;
                Ok(reply)
            }
            Err(RecvTimeoutError::Timeout) => Err(CallError::TimedOut),
            Err(RecvTimeoutError::Disconnected) => Err(CallError::Disconnected),
        }
    }

    /// Discard replies to calls that already missed their deadline.
    fn drain(&mut self) {
        while self.outstanding > 0 {
            match self.replies.try_recv() {
                Ok(_) => self.outstanding -= 1,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    self.outstanding = 0;
                    break;
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.as_str()
    } else {
        "unknown panic"
    }
}
