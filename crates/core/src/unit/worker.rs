//! The per-unit worker task: a dedicated thread draining one unit's queued commands, plus a
//! periodic motor-timeout tick.
//!
//! The three signal sources from the design (I/O queue, control queue, periodic timer) are
//! merged onto one `std::sync::mpsc` channel carrying a [`WorkerMessage`]; `recv_timeout`
//! against the motor-timeout period stands in for the timer, since std's `mpsc` has no `select!`
//! across a queue and a clock. The engine itself lives behind a shared [`Mutex`] so that
//! always-immediate commands (see [`crate::command::Command::is_always_immediate`]) can run on
//! the caller's own thread without going through this queue at all, while still respecting the
//! same unit lock the worker uses.

use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::command::{Command, Reply, Request, Router};
use crate::common::error::DeviceError;

use super::UnitEngine;

enum WorkerMessage {
    Io {
        request: Request,
        reply_to: Sender<Reply>,
    },
    Stop,
}

/// The live half of a [`UnitWorker`]: a channel to its thread plus the join handle, present only
/// while the thread is actually running.
struct RunningState {
    sender: Sender<WorkerMessage>,
    handle: JoinHandle<()>,
}

/// A handle to a unit worker, whose thread can be stopped and later restarted.
pub struct UnitWorker {
    engine: Arc<Mutex<UnitEngine>>,
    tick: Duration,
    running: Mutex<Option<RunningState>>,
}

impl std::fmt::Debug for UnitWorker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnitWorker")
            .field("running", &self.is_running())
            .finish_non_exhaustive()
    }
}

/// Spawns a fresh worker thread over `engine`, ticking its motor timeout every `tick`.
///
/// # Panics
///
/// Panics if the OS refuses to spawn the thread: a device whose workers cannot be spawned cannot
/// run at all, so there is no degraded mode to fall back to.
fn spawn_thread(engine: &Arc<Mutex<UnitEngine>>, tick: Duration) -> RunningState {
    let unit_id = {
        #[allow(clippy::unwrap_used)]
        engine.lock().unwrap().id()
    };
    let worker_engine = Arc::clone(engine);
    let (sender, receiver) = mpsc::channel::<WorkerMessage>();
    let handle = std::thread::Builder::new()
        .name(format!("unit-{unit_id}-worker"))
        .spawn(move || run(&worker_engine, &receiver, tick))
        .unwrap_or_else(|err| panic!("failed to spawn worker for unit {unit_id}: {err}"));
    RunningState { sender, handle }
}

impl UnitWorker {
    /// Spawns a worker owning `engine`, started immediately.
    #[must_use]
    pub fn spawn(engine: UnitEngine, tick: Duration) -> Self {
        let engine = Arc::new(Mutex::new(engine));
        let running = spawn_thread(&engine, tick);
        Self {
            engine,
            tick,
            running: Mutex::new(Some(running)),
        }
    }

    /// The shared engine handle, for running always-immediate commands on the caller's context.
    #[must_use]
    pub fn engine(&self) -> &Arc<Mutex<UnitEngine>> {
        &self.engine
    }

    /// Whether this unit's worker thread is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        #[allow(clippy::unwrap_used)]
        self.running.lock().unwrap().is_some()
    }

    /// Enqueues `request`, returning its reply once the worker processes it.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::Aborted`] if the worker is stopped, or has stopped and will never
    /// process the request.
    pub fn submit(&self, request: Request) -> Reply {
        #[allow(clippy::unwrap_used)]
        let running = self.running.lock().unwrap();
        let Some(state) = running.as_ref() else {
            return Err(DeviceError::Aborted);
        };
        let (reply_tx, reply_rx) = mpsc::channel();
        if state
            .sender
            .send(WorkerMessage::Io {
                request,
                reply_to: reply_tx,
            })
            .is_err()
        {
            return Err(DeviceError::Aborted);
        }
        drop(running);
        reply_rx.recv().unwrap_or(Err(DeviceError::Aborted))
    }

    /// Starts the worker thread if it isn't already running. A no-op if it is.
    ///
    /// # Errors
    ///
    /// This never fails; the `Result` matches every other control command's signature.
    pub fn start(&self) -> Result<(), DeviceError> {
        #[allow(clippy::unwrap_used)]
        let mut running = self.running.lock().unwrap();
        if running.is_none() {
            *running = Some(spawn_thread(&self.engine, self.tick));
        }
        Ok(())
    }

    /// Stops the worker thread, provided no medium is currently inserted. A no-op if the worker
    /// is already stopped.
    ///
    /// # Errors
    ///
    /// Returns [`DeviceError::DriveInUse`] if a medium is inserted.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread itself panicked.
    pub fn stop_if_idle(&self) -> Result<(), DeviceError> {
        #[allow(clippy::unwrap_used)]
        let mut running = self.running.lock().unwrap();
        let Some(state) = running.take() else {
            return Ok(());
        };
        #[allow(clippy::unwrap_used)]
        let has_medium = self.engine.lock().unwrap().has_medium();
        if has_medium {
            *running = Some(state);
            return Err(DeviceError::DriveInUse);
        }
        let _ = state.sender.send(WorkerMessage::Stop);
        #[allow(clippy::unwrap_used)]
        state.handle.join().expect("unit worker thread panicked");
        Ok(())
    }

    /// Unconditionally stops the worker thread (if running) and returns the shared engine handle,
    /// so the caller (the supervisor) can finish tearing the unit down regardless of its state.
    ///
    /// # Panics
    ///
    /// Panics if the worker thread itself panicked.
    pub fn teardown(self) -> Arc<Mutex<UnitEngine>> {
        {
            #[allow(clippy::unwrap_used)]
            let mut running = self.running.lock().unwrap();
            if let Some(state) = running.take() {
                let _ = state.sender.send(WorkerMessage::Stop);
                #[allow(clippy::unwrap_used)]
                state.handle.join().expect("unit worker thread panicked");
            }
        }
        self.engine
    }
}

fn run(engine: &Arc<Mutex<UnitEngine>>, receiver: &mpsc::Receiver<WorkerMessage>, tick: Duration) {
    let unit_id = {
        #[allow(clippy::unwrap_used)]
        engine.lock().unwrap().id()
    };
    debug!(unit = unit_id, "worker started");
    loop {
        match receiver.recv_timeout(tick) {
            Ok(WorkerMessage::Io { request, reply_to }) => {
                trace!(unit = unit_id, command = ?request.command, "dispatching queued request");
                #[allow(clippy::unwrap_used)]
                let mut guard = engine.lock().unwrap();
                if let Command::AddChangeInt(id, listener) = request.command {
                    guard.park_change_listener(id, listener, reply_to);
                } else {
                    let reply = Router::dispatch(&mut guard, request);
                    drop(guard);
                    let _ = reply_to.send(reply);
                }
            }
            Ok(WorkerMessage::Stop) => {
                #[allow(clippy::unwrap_used)]
                engine.lock().unwrap().abort_parked_listeners();
                break;
            }
            Err(RecvTimeoutError::Timeout) => {
                #[allow(clippy::unwrap_used)]
                let mut guard = engine.lock().unwrap();
                if let Err(err) = guard.motor_timeout_tick() {
                    warn!(unit = unit_id, ?err, "motor timeout write-back failed");
                }
            }
            Err(RecvTimeoutError::Disconnected) => {
                #[allow(clippy::unwrap_used)]
                engine.lock().unwrap().abort_parked_listeners();
                break;
            }
        }
    }
    debug!(unit = unit_id, "worker stopped");
}
