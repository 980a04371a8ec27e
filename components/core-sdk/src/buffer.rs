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

//! The allocator behind [`RustBuffer`]: buffers are `Vec<u8>` allocations
//! handed across the boundary and reclaimed here.

use std::mem::ManuallyDrop;

use rivet_ffi_primitives::RustBuffer;

/// Give up ownership of `bytes` as a [`RustBuffer`].
pub fn buffer_from_vec(bytes: Vec<u8>) -> RustBuffer {
    let mut bytes = ManuallyDrop::new(bytes);
    RustBuffer {
        capacity: bytes.capacity() as u64,
        len: bytes.len() as u64,
        data: bytes.as_mut_ptr(),
    }
}

/// Reclaim a buffer produced by [`buffer_from_vec`].
///
/// # Safety
/// `buffer` must come from [`buffer_from_vec`] (or be the zeroed empty
/// buffer) and must not be used again afterwards.
pub unsafe fn buffer_into_vec(buffer: RustBuffer) -> Vec<u8> {
    if buffer.data.is_null() {
        return Vec::new();
    }
    Vec::from_raw_parts(buffer.data, buffer.len as usize, buffer.capacity as usize)
}

/// Grow `buffer` so at least `additional` more bytes fit after `len`.
///
/// # Safety
/// Same as [`buffer_into_vec`].
pub unsafe fn buffer_reserve(buffer: RustBuffer, additional: usize) -> RustBuffer {
    let mut bytes = buffer_into_vec(buffer);
    bytes.reserve(additional);
    buffer_from_vec(bytes)
}
