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

//! Driving core tasks from host futures.

mod common;

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use common::{operation, RoomError, StartFn};
use rivet_host_sdk::{
    call_async, call_async_lift, call_blocking, poll_to_completion, rust_call, CallError,
    Completion, PollReport, Runtime,
};

fn start(runtime: &Runtime, name: &str, argument: u64) -> u64 {
    let start: StartFn = unsafe { operation(runtime, name) };
    rust_call(runtime, |status| unsafe { start(argument, status) }).unwrap()
}

fn free(runtime: &Runtime, handle: u64) {
    let vtable = runtime.vtable();
    rust_call(runtime, |status| unsafe { (vtable.future_free)(handle, status) }).unwrap();
}

#[tokio::test]
async fn test_synchronous_completion_never_waits() {
    let runtime = common::runtime();
    let handle = start(&runtime, "fn_ready_value", 7);

    let report = poll_to_completion(&runtime, handle).await.unwrap();
    assert_eq!(report, PollReport { polls: 1, wakeups: 0 });

    let value = <u64 as Completion>::complete::<RoomError>(&runtime, handle).unwrap();
    assert_eq!(value, 7);
    free(&runtime, handle);
    assert!(!rivet_core_sdk::is_live(handle));
}

#[tokio::test]
async fn test_each_pending_poll_gets_one_continuation() {
    let runtime = common::runtime();
    for pending in [1u32, 3, 10] {
        let handle = start(&runtime, "fn_countdown", pending as u64);

        let report = poll_to_completion(&runtime, handle).await.unwrap();
        assert_eq!(
            report,
            PollReport {
                polls: pending + 1,
                wakeups: pending,
            }
        );

        let value = <u64 as Completion>::complete::<RoomError>(&runtime, handle).unwrap();
        assert_eq!(value, pending as u64);
        free(&runtime, handle);
    }
}

#[tokio::test]
async fn test_call_async_returns_value_and_frees_task() {
    let runtime = common::runtime();
    let started = AtomicU64::new(0);
    let start_fn: StartFn = unsafe { operation(&runtime, "fn_countdown") };

    let value: u64 = call_async::<_, RoomError, _>(&runtime, |status| {
        let handle = unsafe { start_fn(4, status) };
        started.store(handle, Ordering::SeqCst);
        handle
    })
    .await
    .unwrap();

    assert_eq!(value, 4);
    assert!(!rivet_core_sdk::is_live(started.load(Ordering::SeqCst)));
}

#[tokio::test]
async fn test_wakeup_from_another_thread() {
    let runtime = common::runtime();
    let start_fn: StartFn = unsafe { operation(&runtime, "fn_delayed") };

    let result: Result<(), CallError<RoomError>> =
        call_async(&runtime, |status| unsafe { start_fn(20, status) }).await;
    result.unwrap();
}

#[tokio::test]
async fn test_concurrent_tasks_complete_independently() {
    let runtime = common::runtime();
    let start_fn: StartFn = unsafe { operation(&runtime, "fn_countdown") };

    let calls = (1..=8u64).map(|n| {
        let runtime = runtime.clone();
        tokio::spawn(async move {
            call_async::<u64, RoomError, _>(&runtime, |status| unsafe { start_fn(n, status) })
                .await
                .unwrap()
        })
    });
    let mut results = Vec::new();
    for call in calls {
        results.push(call.await.unwrap());
    }
    assert_eq!(results, (1..=8u64).collect::<Vec<_>>());
}

#[tokio::test]
async fn test_lifted_result_and_domain_error() {
    let runtime = common::runtime();
    let start_fn: StartFn = unsafe { operation(&runtime, "fn_room_name_async") };

    let name: String = call_async_lift::<_, RoomError, _>(&runtime, |status| unsafe {
        start_fn(1, status)
    })
    .await
    .unwrap();
    assert_eq!(name, "lobby");

    let err = call_async_lift::<String, RoomError, _>(&runtime, |status| unsafe {
        start_fn(2, status)
    })
    .await
    .unwrap_err();
    assert_eq!(
        err.domain(),
        Some(RoomError::NotFound {
            message: "not found".to_string(),
        })
    );
}

#[tokio::test]
async fn test_dropping_the_call_cancels_and_frees() {
    let runtime = common::runtime();
    let started = AtomicU64::new(0);
    let start_fn: StartFn = unsafe { operation(&runtime, "fn_stalled") };

    let call = call_async::<(), RoomError, _>(&runtime, |status| {
        let handle = unsafe { start_fn(0, status) };
        started.store(handle, Ordering::SeqCst);
        handle
    });
    let outcome = tokio::time::timeout(Duration::from_millis(50), call).await;
    assert!(outcome.is_err());

    let handle = started.load(Ordering::SeqCst);
    assert_ne!(handle, 0);
    assert!(!rivet_core_sdk::is_live(handle));
}

#[tokio::test]
async fn test_cancelled_task_reaches_terminal_state() {
    let runtime = common::runtime();
    let handle = start(&runtime, "fn_stalled", 0);
    let vtable = runtime.vtable();

    rust_call(&runtime, |status| unsafe { (vtable.future_cancel)(handle, status) }).unwrap();
    let report = poll_to_completion(&runtime, handle).await.unwrap();
    assert_eq!(report.polls, 1);

    let err = <() as Completion>::complete::<RoomError>(&runtime, handle).unwrap_err();
    assert!(err.is_cancelled());
    free(&runtime, handle);
}

#[test]
fn test_call_blocking_outside_async_context() {
    let runtime = common::runtime();
    let start_fn: StartFn = unsafe { operation(&runtime, "fn_countdown") };

    let value: u64 =
        call_blocking::<_, RoomError, _>(&runtime, |status| unsafe { start_fn(3, status) })
            .unwrap();
    assert_eq!(value, 3);

    let delayed: StartFn = unsafe { operation(&runtime, "fn_delayed") };
    call_blocking::<(), RoomError, _>(&runtime, |status| unsafe { delayed(5, status) }).unwrap();
}
