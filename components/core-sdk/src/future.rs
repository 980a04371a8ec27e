// Copyright 2025 The Rivet Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Task store for async operations.
//!
//! An async entry point spawns its future here and returns the task handle.
//! Nothing drives the future except the host's `future_poll` calls:
//!
//! - a poll that reaches a terminal state returns `POLL_READY` and never
//!   invokes the continuation
//! - a poll that returns `POLL_PENDING` arranges for the continuation to be
//!   invoked exactly once, when the future's waker fires
//! - `future_cancel` drops the future and releases any pending poll with
//!   `POLL_READY`

use std::collections::HashMap;
use std::future::Future;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock};
use std::task::{Context, Poll, Wake, Waker};

use rivet_ffi_primitives::wire::{encode, WireFormat};
use rivet_ffi_primitives::{
    panic_message, CallStatus, CallStatusCode, ContinuationCallback, RustBuffer, POLL_MAYBE_READY,
    POLL_PENDING, POLL_READY,
};

use crate::buffer::buffer_from_vec;
use crate::call::{write_cancelled, write_panic, write_status};

/// Successful task output, matching the three `future_complete_*` shapes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskValue {
    Buffer(Vec<u8>),
    U64(u64),
    Void,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskError {
    /// Wire-encoded domain error.
    Domain(Vec<u8>),
    Panic(String),
}

pub type TaskResult = Result<TaskValue, TaskError>;

type BoxedTask = Pin<Box<dyn Future<Output = TaskResult> + Send>>;

static CONTINUATION: OnceLock<ContinuationCallback> = OnceLock::new();

pub(crate) fn set_continuation(callback: ContinuationCallback) {
    if let Err(rejected) = CONTINUATION.set(callback) {
        if CONTINUATION.get().map(|current| *current as usize) != Some(rejected as usize) {
            log::warn!("Ignoring a second, different continuation callback");
        }
    }
}

fn fire(data: u64, poll_result: i8) {
    match CONTINUATION.get() {
        Some(continuation) => continuation(data, poll_result),
        None => log::error!("Task woke before a continuation callback was registered"),
    }
}

// ============================================================================
// Waker
// ============================================================================

const POLLING: u8 = 0;
const WOKEN_DURING_POLL: u8 = 1;
const ARMED: u8 = 2;
const SPENT: u8 = 3;

/// Waker handed to the future for one poll. Invokes the continuation at most
/// once, and never while the poll that created it is still running.
struct ContinuationWaker {
    data: u64,
    state: AtomicU8,
}

impl ContinuationWaker {
    fn new(data: u64) -> Self {
        Self {
            data,
            state: AtomicU8::new(POLLING),
        }
    }

    fn wake_with(&self, poll_result: i8) {
        let mut current = self.state.load(Ordering::Acquire);
        loop {
            let next = match current {
                POLLING => WOKEN_DURING_POLL,
                ARMED => SPENT,
                _ => return,
            };
            match self
                .state
                .compare_exchange(current, next, Ordering::AcqRel, Ordering::Acquire)
            {
                Ok(_) => {
                    if next == SPENT {
                        fire(self.data, poll_result);
                    }
                    return;
                }
                Err(actual) => current = actual,
            }
        }
    }

    /// Called once the poll returned `Pending`. Returns true if the future
    /// already woke during the poll and the continuation is now due.
    fn arm(&self) -> bool {
        match self
            .state
            .compare_exchange(POLLING, ARMED, Ordering::AcqRel, Ordering::Acquire)
        {
            Ok(_) => false,
            Err(_) => self
                .state
                .compare_exchange(WOKEN_DURING_POLL, SPENT, Ordering::AcqRel, Ordering::Acquire)
                .is_ok(),
        }
    }

    fn disarm(&self) {
        self.state.store(SPENT, Ordering::Release);
    }
}

impl Wake for ContinuationWaker {
    fn wake(self: Arc<Self>) {
        self.wake_with(POLL_MAYBE_READY);
    }

    fn wake_by_ref(self: &Arc<Self>) {
        self.wake_with(POLL_MAYBE_READY);
    }
}

// ============================================================================
// Store
// ============================================================================

#[derive(Default)]
struct Task {
    future: Option<BoxedTask>,
    output: Option<TaskResult>,
    cancelled: bool,
    pending: Option<Arc<ContinuationWaker>>,
}

struct TaskStore {
    next_handle: AtomicU64,
    tasks: Mutex<HashMap<u64, Arc<Mutex<Task>>>>,
}

fn store() -> &'static TaskStore {
    static STORE: OnceLock<TaskStore> = OnceLock::new();
    STORE.get_or_init(|| TaskStore {
        next_handle: AtomicU64::new(1),
        tasks: Mutex::new(HashMap::new()),
    })
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn lookup(handle: u64) -> Option<Arc<Mutex<Task>>> {
    lock(&store().tasks).get(&handle).cloned()
}

/// Register `future` and return its task handle.
pub fn spawn<F>(future: F) -> u64
where
    F: Future<Output = TaskResult> + Send + 'static,
{
    let store = store();
    let handle = store.next_handle.fetch_add(1, Ordering::Relaxed);
    let task = Task {
        future: Some(Box::pin(future)),
        ..Task::default()
    };
    lock(&store.tasks).insert(handle, Arc::new(Mutex::new(task)));
    log::trace!("Spawned task {handle}");
    handle
}

/// Spawn a future whose value and error are wire-encoded on completion.
pub fn spawn_lowered<T, E, F>(future: F) -> u64
where
    T: WireFormat + 'static,
    E: WireFormat + 'static,
    F: Future<Output = Result<T, E>> + Send + 'static,
{
    spawn(async move {
        match future.await {
            Ok(value) => encode(&value)
                .map(TaskValue::Buffer)
                .map_err(|e| TaskError::Panic(format!("failed to encode task result: {e}"))),
            Err(error) => Err(match encode(&error) {
                Ok(bytes) => TaskError::Domain(bytes),
                Err(e) => TaskError::Panic(format!("failed to encode task error: {e}")),
            }),
        }
    })
}

/// True while `handle` has not been freed.
pub fn is_live(handle: u64) -> bool {
    lock(&store().tasks).contains_key(&handle)
}

pub(crate) fn poll(handle: u64, callback_data: u64) -> i8 {
    let Some(task) = lookup(handle) else {
        log::error!("future_poll on unknown task handle {handle}");
        return POLL_READY;
    };

    let waker_state = Arc::new(ContinuationWaker::new(callback_data));
    let fire_now = {
        let mut task = lock(&task);
        if let Some(previous) = task.pending.take() {
            previous.disarm();
        }
        if task.cancelled || task.output.is_some() {
            return POLL_READY;
        }
        let Some(future) = task.future.as_mut() else {
            return POLL_READY;
        };

        let waker = Waker::from(Arc::clone(&waker_state));
        let mut cx = Context::from_waker(&waker);
        match catch_unwind(AssertUnwindSafe(|| future.as_mut().poll(&mut cx))) {
            Ok(Poll::Pending) => {
                task.pending = Some(Arc::clone(&waker_state));
                waker_state.arm()
            }
            Ok(Poll::Ready(output)) => {
                waker_state.disarm();
                task.future = None;
                task.output = Some(output);
                return POLL_READY;
            }
            Err(payload) => {
                waker_state.disarm();
                task.future = None;
                task.output = Some(Err(TaskError::Panic(panic_message(payload.as_ref()))));
                return POLL_READY;
            }
        }
    };

    if fire_now {
        fire(callback_data, POLL_MAYBE_READY);
    }
    POLL_PENDING
}

pub(crate) fn cancel(handle: u64) {
    let Some(task) = lookup(handle) else {
        log::warn!("future_cancel on unknown task handle {handle}");
        return;
    };
    let (future, pending) = {
        let mut task = lock(&task);
        task.cancelled = true;
        task.output = None;
        (task.future.take(), task.pending.take())
    };
    drop(future);
    if let Some(pending) = pending {
        pending.wake_with(POLL_READY);
    }
    log::debug!("Cancelled task {handle}");
}

pub(crate) fn free(handle: u64) {
    let removed = lock(&store().tasks).remove(&handle);
    match removed {
        Some(task) => {
            if let Some(pending) = lock(&task).pending.take() {
                pending.disarm();
            }
            log::trace!("Freed task {handle}");
        }
        None => log::warn!("future_free on unknown task handle {handle}"),
    }
}

fn take_output(handle: u64, status: *mut CallStatus) -> Option<TaskValue> {
    let Some(task) = lookup(handle) else {
        write_panic(status, &format!("unknown task handle {handle}"));
        return None;
    };
    let mut task = lock(&task);
    if task.cancelled {
        write_cancelled(status);
        return None;
    }
    match task.output.take() {
        None => {
            write_panic(status, &format!("task {handle} completed before it was ready"));
            None
        }
        Some(Ok(value)) => Some(value),
        Some(Err(TaskError::Domain(bytes))) => {
            write_status(status, CallStatusCode::Error, bytes);
            None
        }
        Some(Err(TaskError::Panic(message))) => {
            write_panic(status, &message);
            None
        }
    }
}

fn shape_mismatch(status: *mut CallStatus, handle: u64, expected: &str, found: &TaskValue) {
    write_panic(
        status,
        &format!("task {handle} completed as {expected} but produced {found:?}"),
    );
}

pub(crate) fn complete_buffer(handle: u64, status: *mut CallStatus) -> RustBuffer {
    match take_output(handle, status) {
        Some(TaskValue::Buffer(bytes)) => buffer_from_vec(bytes),
        Some(other) => {
            shape_mismatch(status, handle, "buffer", &other);
            RustBuffer::empty()
        }
        None => RustBuffer::empty(),
    }
}

pub(crate) fn complete_u64(handle: u64, status: *mut CallStatus) -> u64 {
    match take_output(handle, status) {
        Some(TaskValue::U64(value)) => value,
        Some(other) => {
            shape_mismatch(status, handle, "u64", &other);
            0
        }
        None => 0,
    }
}

pub(crate) fn complete_void(handle: u64, status: *mut CallStatus) {
    match take_output(handle, status) {
        Some(TaskValue::Void) | None => {}
        Some(other) => shape_mismatch(status, handle, "void", &other),
    }
}
