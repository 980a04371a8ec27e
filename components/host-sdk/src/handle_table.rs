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

//! Integer handles for host objects passed to the core.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::error::Fault;

/// Maps handles to instances and back. Handles start at 1, are never reused,
/// and inserting the same `Arc` twice returns the same handle.
pub struct HandleTable<T: ?Sized> {
    inner: RwLock<TableInner<T>>,
}

struct TableInner<T: ?Sized> {
    last_handle: u64,
    by_handle: HashMap<u64, Arc<T>>,
    by_identity: HashMap<usize, u64>,
}

fn identity<T: ?Sized>(instance: &Arc<T>) -> usize {
    Arc::as_ptr(instance) as *const () as usize
}

impl<T: ?Sized> HandleTable<T> {
    pub fn new() -> Self {
        Self {
            inner: RwLock::new(TableInner {
                last_handle: 0,
                by_handle: HashMap::new(),
                by_identity: HashMap::new(),
            }),
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, TableInner<T>> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, TableInner<T>> {
        self.inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn insert(&self, instance: Arc<T>) -> u64 {
        let mut inner = self.write();
        let key = identity(&instance);
        if let Some(handle) = inner.by_identity.get(&key) {
            return *handle;
        }
        inner.last_handle += 1;
        let handle = inner.last_handle;
        inner.by_handle.insert(handle, instance);
        inner.by_identity.insert(key, handle);
        handle
    }

    /// Resolve a handle. An unknown handle means the core used a handle
    /// after releasing it.
    pub fn get(&self, handle: u64) -> Result<Arc<T>, Fault> {
        self.read()
            .by_handle
            .get(&handle)
            .cloned()
            .ok_or(Fault::UnknownHandle(handle))
    }

    /// Drop the table's reference. Removing an absent handle is a no-op.
    pub fn remove(&self, handle: u64) -> Option<Arc<T>> {
        let mut inner = self.write();
        let instance = inner.by_handle.remove(&handle)?;
        inner.by_identity.remove(&identity(&instance));
        Some(instance)
    }

    pub fn contains(&self, handle: u64) -> bool {
        self.read().by_handle.contains_key(&handle)
    }

    pub fn len(&self) -> usize {
        self.read().by_handle.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T: ?Sized> Default for HandleTable<T> {
    fn default() -> Self {
        Self::new()
    }
}
