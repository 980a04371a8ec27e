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

//! Async bridge: drives core tasks to completion from host futures.
//!
//! Each poll registers a single-shot wake channel under a fresh id and passes
//! the id to `future_poll` as callback data. `POLL_READY` means the task is
//! terminal and no continuation will come; anything else means the core will
//! invoke the continuation exactly once with that id, which sends the poll
//! result into the channel.
//!
//! The task is always freed once the call ends, and cancelled first if the
//! caller's future is dropped before the task reached a terminal state.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, OnceLock};

use rivet_ffi_primitives::wire::WireFormat;
use rivet_ffi_primitives::{CallStatus, POLL_READY};
use tokio::sync::oneshot;

use crate::buffer::CoreBuffer;
use crate::call::{rust_call, rust_call_with_error};
use crate::error::{CallError, Fault};
use crate::runtime::Runtime;

// ============================================================================
// Wake registry
// ============================================================================

#[derive(Default)]
struct WakeChannels {
    pending: HashMap<u64, oneshot::Sender<i8>>,
    /// Polls whose waiter went away before the continuation arrived.
    abandoned: HashSet<u64>,
}

struct WakeRegistry {
    next_id: AtomicU64,
    channels: Mutex<WakeChannels>,
}

fn registry() -> &'static WakeRegistry {
    static REGISTRY: OnceLock<WakeRegistry> = OnceLock::new();
    REGISTRY.get_or_init(|| WakeRegistry {
        next_id: AtomicU64::new(1),
        channels: Mutex::new(WakeChannels::default()),
    })
}

fn channels() -> MutexGuard<'static, WakeChannels> {
    registry()
        .channels
        .lock()
        .unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// A wake channel registered for one poll; unregistered on drop.
struct WakeRegistration {
    id: u64,
    /// Set once the core answered the poll with anything but `POLL_READY`.
    armed: bool,
}

impl WakeRegistration {
    fn new() -> (Self, oneshot::Receiver<i8>) {
        let (sender, receiver) = oneshot::channel();
        let id = registry().next_id.fetch_add(1, Ordering::Relaxed);
        channels().pending.insert(id, sender);
        (Self { id, armed: false }, receiver)
    }
}

impl Drop for WakeRegistration {
    fn drop(&mut self) {
        let mut channels = channels();
        if channels.pending.remove(&self.id).is_some() && self.armed {
            // The core still owes this poll a continuation.
            channels.abandoned.insert(self.id);
        }
    }
}

/// The continuation installed in every core.
extern "C" fn continuation_callback(data: u64, poll_result: i8) {
    let (sender, abandoned) = {
        let mut channels = channels();
        match channels.pending.remove(&data) {
            Some(sender) => (Some(sender), false),
            None => (None, channels.abandoned.remove(&data)),
        }
    };
    match sender {
        // The receiver may already be gone if the caller was dropped.
        Some(sender) => {
            let _ = sender.send(poll_result);
        }
        None if abandoned => {
            log::debug!("Continuation for abandoned poll {data} (result {poll_result})")
        }
        None => log::warn!("Continuation for unknown poll {data}"),
    }
}

pub(crate) fn install_continuation(runtime: &Runtime) -> Result<(), Fault> {
    let vtable = runtime.vtable();
    rust_call(runtime, |status| unsafe {
        (vtable.future_continuation_callback_set)(continuation_callback, status)
    })
}

// ============================================================================
// Polling
// ============================================================================

/// How a task was driven to completion.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PollReport {
    /// `future_poll` calls made.
    pub polls: u32,
    /// Continuations received.
    pub wakeups: u32,
}

/// Poll `handle` until it reaches a terminal state. Does not complete or
/// free the task.
pub async fn poll_to_completion(runtime: &Runtime, handle: u64) -> Result<PollReport, Fault> {
    let vtable = runtime.vtable();
    let mut report = PollReport::default();
    loop {
        let (mut registration, receiver) = WakeRegistration::new();
        let id = registration.id;
        report.polls += 1;
        let immediate = rust_call(runtime, |status| unsafe {
            (vtable.future_poll)(handle, id, status)
        })?;
        if immediate == POLL_READY {
            return Ok(report);
        }
        registration.armed = true;

        let woken = receiver.await.map_err(|_| Fault::WakeChannelClosed)?;
        drop(registration);
        report.wakeups += 1;
        if woken == POLL_READY {
            return Ok(report);
        }
    }
}

/// Owns a task handle for the duration of a call.
struct PendingTask<'a> {
    runtime: &'a Runtime,
    handle: u64,
    terminal: bool,
}

impl Drop for PendingTask<'_> {
    fn drop(&mut self) {
        let vtable = self.runtime.vtable();
        let handle = self.handle;
        if !self.terminal {
            if let Err(fault) = rust_call(self.runtime, |status| unsafe {
                (vtable.future_cancel)(handle, status)
            }) {
                log::error!("Failed to cancel task {handle}: {fault}");
            }
        }
        if let Err(fault) = rust_call(self.runtime, |status| unsafe {
            (vtable.future_free)(handle, status)
        }) {
            log::error!("Failed to free task {handle}: {fault}");
        }
    }
}

/// Result shapes a task can complete with.
pub trait Completion: Sized {
    fn complete<E: WireFormat>(runtime: &Runtime, handle: u64) -> Result<Self, CallError<E>>;
}

impl Completion for () {
    fn complete<E: WireFormat>(runtime: &Runtime, handle: u64) -> Result<Self, CallError<E>> {
        let vtable = runtime.vtable();
        rust_call_with_error(runtime, |status| unsafe {
            (vtable.future_complete_void)(handle, status)
        })
    }
}

impl Completion for u64 {
    fn complete<E: WireFormat>(runtime: &Runtime, handle: u64) -> Result<Self, CallError<E>> {
        let vtable = runtime.vtable();
        rust_call_with_error(runtime, |status| unsafe {
            (vtable.future_complete_u64)(handle, status)
        })
    }
}

impl Completion for CoreBuffer {
    fn complete<E: WireFormat>(runtime: &Runtime, handle: u64) -> Result<Self, CallError<E>> {
        let vtable = runtime.vtable();
        let raw = rust_call_with_error(runtime, |status| unsafe {
            (vtable.future_complete_buffer)(handle, status)
        })?;
        // SAFETY: completion buffers are core-allocated and owned by the caller.
        Ok(unsafe { CoreBuffer::from_raw(runtime, raw) })
    }
}

/// Start a core task with `start`, drive it, and complete it as `R`.
pub async fn call_async<R, E, F>(runtime: &Runtime, start: F) -> Result<R, CallError<E>>
where
    R: Completion,
    E: WireFormat,
    F: FnOnce(&mut CallStatus) -> u64,
{
    let handle = rust_call_with_error::<_, E, _>(runtime, start)?;
    let mut task = PendingTask {
        runtime,
        handle,
        terminal: false,
    };

    let report = poll_to_completion(runtime, handle).await?;
    task.terminal = true;
    log::trace!(
        "Task {handle} finished after {} polls and {} wakeups",
        report.polls,
        report.wakeups
    );

    R::complete(runtime, handle)
}

/// [`call_async`] for tasks completing with a wire-encoded `T`.
pub async fn call_async_lift<T, E, F>(runtime: &Runtime, start: F) -> Result<T, CallError<E>>
where
    T: WireFormat,
    E: WireFormat,
    F: FnOnce(&mut CallStatus) -> u64,
{
    let buffer: CoreBuffer = call_async(runtime, start).await?;
    Ok(buffer.lift()?)
}

/// Blocking variant of [`call_async`] for callers outside an async context.
pub fn call_blocking<R, E, F>(runtime: &Runtime, start: F) -> Result<R, CallError<E>>
where
    R: Completion,
    E: WireFormat,
    F: FnOnce(&mut CallStatus) -> u64,
{
    futures::executor::block_on(call_async(runtime, start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn is_abandoned(id: u64) -> bool {
        channels().abandoned.contains(&id)
    }

    #[test]
    fn test_continuation_reaches_waiting_poll() {
        let (mut registration, mut receiver) = WakeRegistration::new();
        registration.armed = true;
        let id = registration.id;

        continuation_callback(id, POLL_READY);
        assert_eq!(receiver.try_recv().unwrap(), POLL_READY);

        drop(registration);
        assert!(!is_abandoned(id));
    }

    #[test]
    fn test_dropped_pending_poll_is_marked_abandoned() {
        let (mut registration, _receiver) = WakeRegistration::new();
        registration.armed = true;
        let id = registration.id;

        drop(registration);
        assert!(is_abandoned(id));

        // The continuation the core still owes clears the mark.
        continuation_callback(id, POLL_READY);
        assert!(!is_abandoned(id));
        assert!(!channels().pending.contains_key(&id));
    }

    #[test]
    fn test_ready_poll_leaves_nothing_behind() {
        let (registration, _receiver) = WakeRegistration::new();
        let id = registration.id;

        drop(registration);
        assert!(!is_abandoned(id));
        assert!(!channels().pending.contains_key(&id));
    }
}
