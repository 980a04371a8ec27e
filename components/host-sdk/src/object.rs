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

//! Object lifetime governor.
//!
//! An [`FfiObject`] wraps a pointer to a core-owned object. Calls borrow it
//! through an [`ObjectGuard`]; [`FfiObject::dispose`] marks it released. The
//! core's free function runs exactly once, after disposal and after the last
//! outstanding guard is gone, whatever the interleaving.
//!
//! The counter starts at 0 and counts live guards. Disposal consumes the
//! initial reference, so the counter reaches -1 only when the object is both
//! disposed and unborrowed; the thread that moves it there frees.

use std::ffi::c_void;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};

use rivet_ffi_primitives::{ObjectCloneFn, ObjectFreeFn};

use crate::call::rust_call;
use crate::error::Fault;
use crate::runtime::Runtime;

pub struct FfiObject {
    runtime: Runtime,
    type_name: &'static str,
    pointer: *mut c_void,
    call_counter: AtomicI64,
    destroyed: AtomicBool,
    clone_fn: Option<ObjectCloneFn>,
    free_fn: ObjectFreeFn,
}

// SAFETY: the pointer is only handed to the core while the counter proves
// the object alive, and the core's objects are shareable across threads.
unsafe impl Send for FfiObject {}
unsafe impl Sync for FfiObject {}

impl FfiObject {
    /// Take ownership of a core object.
    ///
    /// With a `clone_fn`, each borrow hands out a fresh reference obtained
    /// from the core instead of the stored pointer.
    ///
    /// # Safety
    /// `pointer` must be a live object of `runtime`'s core that `free_fn`
    /// (and `clone_fn`, if given) accept.
    pub unsafe fn new(
        runtime: &Runtime,
        type_name: &'static str,
        pointer: *mut c_void,
        clone_fn: Option<ObjectCloneFn>,
        free_fn: ObjectFreeFn,
    ) -> Self {
        Self {
            runtime: runtime.clone(),
            type_name,
            pointer,
            call_counter: AtomicI64::new(0),
            destroyed: AtomicBool::new(false),
            clone_fn,
            free_fn,
        }
    }

    pub fn type_name(&self) -> &'static str {
        self.type_name
    }

    /// Borrow the object for one call. Fails once the object is disposed,
    /// even if earlier guards still keep it alive.
    pub fn borrow(&self) -> Result<ObjectGuard<'_>, Fault> {
        let mut counter = self.call_counter.load(Ordering::Acquire);
        loop {
            if counter <= -1 || self.destroyed.load(Ordering::Acquire) {
                return Err(Fault::ObjectDestroyed(self.type_name));
            }
            if counter == i64::MAX {
                return Err(Fault::CallCounterOverflow(self.type_name));
            }
            match self.call_counter.compare_exchange_weak(
                counter,
                counter + 1,
                Ordering::AcqRel,
                Ordering::Acquire,
            ) {
                Ok(_) => break,
                Err(actual) => counter = actual,
            }
        }

        // Built before cloning so a failed clone still releases the borrow.
        let mut guard = ObjectGuard {
            object: self,
            pointer: self.pointer,
        };
        if let Some(clone_fn) = self.clone_fn {
            let pointer = self.pointer;
            guard.pointer =
                rust_call(&self.runtime, |status| unsafe { clone_fn(pointer, status) })?;
        }
        Ok(guard)
    }

    /// Release the object. Only the first call has an effect; the free runs
    /// now or when the last outstanding guard drops.
    pub fn dispose(&self) {
        if self
            .destroyed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            self.release();
        }
    }

    pub fn is_destroyed(&self) -> bool {
        self.destroyed.load(Ordering::Acquire)
    }

    fn release(&self) {
        if self.call_counter.fetch_sub(1, Ordering::AcqRel) == 0 {
            self.free();
        }
    }

    fn free(&self) {
        let pointer = self.pointer;
        let free_fn = self.free_fn;
        match rust_call(&self.runtime, |status| unsafe { free_fn(pointer, status) }) {
            Ok(()) => log::trace!("Freed {} object {:p}", self.type_name, pointer),
            Err(fault) => log::error!("Failed to free {} object: {fault}", self.type_name),
        }
    }
}

impl Drop for FfiObject {
    fn drop(&mut self) {
        // No guard can outlive the object, so this frees if not yet freed.
        self.dispose();
    }
}

impl fmt::Debug for FfiObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FfiObject")
            .field("type_name", &self.type_name)
            .field("pointer", &self.pointer)
            .field("call_counter", &self.call_counter.load(Ordering::Relaxed))
            .field("destroyed", &self.is_destroyed())
            .finish()
    }
}

/// Proof that the object stays alive; the pointer is valid for the guard's
/// lifetime.
pub struct ObjectGuard<'a> {
    object: &'a FfiObject,
    pointer: *mut c_void,
}

impl ObjectGuard<'_> {
    pub fn pointer(&self) -> *mut c_void {
        self.pointer
    }

    /// The pointer as written into a buffer argument.
    pub fn pointer_bits(&self) -> u64 {
        self.pointer as usize as u64
    }
}

impl Drop for ObjectGuard<'_> {
    fn drop(&mut self) {
        self.object.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::ContractSpec;
    use crate::symbols::SymbolTable;
    use rivet_ffi_primitives::{CallStatus, CONTRACT_VERSION};
    use std::sync::atomic::AtomicUsize;

    unsafe extern "C" fn count_free(pointer: *mut c_void, _status: *mut CallStatus) {
        (*(pointer as *const AtomicUsize)).fetch_add(1, Ordering::SeqCst);
    }

    fn governed(frees: &AtomicUsize) -> FfiObject {
        let mut table = SymbolTable::new();
        table.extend_prefixed("rivet_object_", rivet_core_sdk::runtime_symbols());
        let runtime = Runtime::new(
            Box::new(table),
            "rivet_object_",
            &ContractSpec::new(CONTRACT_VERSION),
        )
        .unwrap();
        let pointer = frees as *const AtomicUsize as *mut c_void;
        unsafe { FfiObject::new(&runtime, "Room", pointer, None, count_free) }
    }

    #[test]
    fn test_borrow_at_counter_limit_overflows() {
        let frees = AtomicUsize::new(0);
        let object = governed(&frees);

        object.call_counter.store(i64::MAX, Ordering::SeqCst);
        assert_eq!(
            object.borrow().err(),
            Some(Fault::CallCounterOverflow("Room"))
        );

        object.call_counter.store(0, Ordering::SeqCst);
        drop(object);
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_counter_settles_at_released_state() {
        let frees = AtomicUsize::new(0);
        let object = governed(&frees);

        let guards: Vec<_> = (0..5).map(|_| object.borrow().unwrap()).collect();
        assert_eq!(object.call_counter.load(Ordering::SeqCst), 5);

        object.dispose();
        assert_eq!(object.call_counter.load(Ordering::SeqCst), 4);
        drop(guards);
        assert_eq!(object.call_counter.load(Ordering::SeqCst), -1);
        assert_eq!(frees.load(Ordering::SeqCst), 1);

        object.dispose();
        assert_eq!(object.call_counter.load(Ordering::SeqCst), -1);
        assert_eq!(frees.load(Ordering::SeqCst), 1);
    }
}
