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

//! Host-side ownership of core-allocated buffers.

use std::fmt;

use rivet_ffi_primitives::wire::{decode, encode, EncodeError, WireFormat};
use rivet_ffi_primitives::{ForeignBytes, RustBuffer};

use crate::call::rust_call;
use crate::error::Fault;
use crate::runtime::Runtime;

/// A [`RustBuffer`] owned by the host. Dropping it returns the allocation
/// to the core; [`CoreBuffer::into_raw`] hands ownership to the core instead.
pub struct CoreBuffer {
    runtime: Runtime,
    raw: RustBuffer,
}

// SAFETY: the buffer is exclusively owned and only freed through the core's
// thread-safe allocator.
unsafe impl Send for CoreBuffer {}

impl CoreBuffer {
    /// Take ownership of a buffer the core returned.
    ///
    /// # Safety
    /// `raw` must have been allocated by `runtime`'s core (or be the zeroed
    /// empty buffer) and not be owned by anyone else.
    pub unsafe fn from_raw(runtime: &Runtime, raw: RustBuffer) -> Self {
        Self {
            runtime: runtime.clone(),
            raw,
        }
    }

    pub fn empty(runtime: &Runtime) -> Self {
        Self {
            runtime: runtime.clone(),
            raw: RustBuffer::empty(),
        }
    }

    /// Allocate an empty buffer with room for `size` bytes.
    pub fn alloc(runtime: &Runtime, size: u64) -> Result<Self, Fault> {
        let vtable = runtime.vtable();
        let raw = rust_call(runtime, |status| unsafe { (vtable.rustbuffer_alloc)(size, status) })?;
        Ok(unsafe { Self::from_raw(runtime, raw) })
    }

    /// Copy `bytes` into a new core-allocated buffer.
    pub fn from_bytes(runtime: &Runtime, bytes: &[u8]) -> Result<Self, Fault> {
        if bytes.is_empty() {
            return Ok(Self::empty(runtime));
        }
        let lent = ForeignBytes::from_slice(bytes)
            .ok_or(EncodeError::LengthOverflow { len: bytes.len() })?;
        let vtable = runtime.vtable();
        let raw = rust_call(runtime, |status| unsafe {
            (vtable.rustbuffer_from_bytes)(lent, status)
        })?;
        Ok(unsafe { Self::from_raw(runtime, raw) })
    }

    /// Grow the buffer by at least `additional` bytes of capacity. The old
    /// allocation passes to the core either way.
    pub fn reserve(mut self, additional: u64) -> Result<Self, Fault> {
        let raw = std::mem::take(&mut self.raw);
        let vtable = self.runtime.vtable();
        let grown = rust_call(&self.runtime, |status| unsafe {
            (vtable.rustbuffer_reserve)(raw, additional, status)
        })?;
        self.raw = grown;
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.raw.len()
    }

    pub fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    pub fn capacity(&self) -> u64 {
        self.raw.capacity
    }

    pub fn as_slice(&self) -> &[u8] {
        // SAFETY: owned core buffer with `len` initialized bytes.
        unsafe { self.raw.as_slice() }
    }

    /// Hand ownership to the core, for passing as an argument.
    pub fn into_raw(mut self) -> RustBuffer {
        std::mem::take(&mut self.raw)
    }

    /// Decode the whole buffer as `T`, then free it. Leftover bytes are a
    /// protocol violation.
    pub fn lift<T: WireFormat>(self) -> Result<T, Fault> {
        Ok(decode(self.as_slice())?)
    }

    /// Read the buffer as raw UTF-8 text, as used by panic payloads.
    pub fn lift_string_lossy(self) -> String {
        String::from_utf8_lossy(self.as_slice()).into_owned()
    }
}

/// Encode `value` into a core-allocated buffer.
pub fn lower<T: WireFormat>(runtime: &Runtime, value: &T) -> Result<CoreBuffer, Fault> {
    let bytes = encode(value)?;
    CoreBuffer::from_bytes(runtime, &bytes)
}

impl Drop for CoreBuffer {
    fn drop(&mut self) {
        if self.raw.is_null() {
            return;
        }
        let raw = std::mem::take(&mut self.raw);
        let vtable = self.runtime.vtable();
        if let Err(fault) = rust_call(&self.runtime, |status| unsafe {
            (vtable.rustbuffer_free)(raw, status)
        }) {
            log::error!("Failed to free core buffer: {fault}");
        }
    }
}

impl fmt::Debug for CoreBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoreBuffer")
            .field("len", &self.raw.len)
            .field("capacity", &self.raw.capacity)
            .finish()
    }
}
