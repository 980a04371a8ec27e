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

use std::collections::{BTreeMap, HashMap};
use std::hash::Hash;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use super::{DecodeError, EncodeError, WireFormat, WireReader, WireWriter};

const NANOS_PER_SEC: u32 = 1_000_000_000;

macro_rules! impl_scalar {
    ($($ty:ty => $put:ident, $get:ident;)*) => {
        $(
            impl WireFormat for $ty {
                fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
                    writer.$put(*self);
                    Ok(())
                }

                fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
                    reader.$get()
                }
            }
        )*
    };
}

impl_scalar! {
    i8 => put_i8, get_i8;
    u8 => put_u8, get_u8;
    i16 => put_i16, get_i16;
    u16 => put_u16, get_u16;
    i32 => put_i32, get_i32;
    u32 => put_u32, get_u32;
    i64 => put_i64, get_i64;
    u64 => put_u64, get_u64;
    f32 => put_f32, get_f32;
    f64 => put_f64, get_f64;
    bool => put_bool, get_bool;
}

impl WireFormat for String {
    fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        writer.put_str(self)
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        reader.get_string()
    }
}

impl<T: WireFormat> WireFormat for Option<T> {
    fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        match self {
            None => {
                writer.put_i8(0);
                Ok(())
            }
            Some(value) => {
                writer.put_i8(1);
                value.write(writer)
            }
        }
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        match reader.get_i8()? {
            0 => Ok(None),
            1 => Ok(Some(T::read(reader)?)),
            other => Err(DecodeError::InvalidPresenceFlag(other)),
        }
    }
}

impl<T: WireFormat> WireFormat for Vec<T> {
    fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        writer.put_len(self.len())?;
        for item in self {
            item.write(writer)?;
        }
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.get_len()?;
        // Each element takes at least one byte; cap the preallocation so a
        // corrupt count cannot reserve more than the buffer could hold.
        let mut items = Vec::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            items.push(T::read(reader)?);
        }
        Ok(items)
    }
}

impl<K, V> WireFormat for HashMap<K, V>
where
    K: WireFormat + Eq + Hash,
    V: WireFormat,
{
    fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        writer.put_len(self.len())?;
        for (key, value) in self {
            key.write(writer)?;
            value.write(writer)?;
        }
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.get_len()?;
        let mut map = HashMap::with_capacity(count.min(reader.remaining()));
        for _ in 0..count {
            let key = K::read(reader)?;
            let value = V::read(reader)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl<K, V> WireFormat for BTreeMap<K, V>
where
    K: WireFormat + Ord,
    V: WireFormat,
{
    fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        writer.put_len(self.len())?;
        for (key, value) in self {
            key.write(writer)?;
            value.write(writer)?;
        }
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let count = reader.get_len()?;
        let mut map = BTreeMap::new();
        for _ in 0..count {
            let key = K::read(reader)?;
            let value = V::read(reader)?;
            map.insert(key, value);
        }
        Ok(map)
    }
}

impl WireFormat for Duration {
    fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        writer.put_u64(self.as_secs());
        writer.put_u32(self.subsec_nanos());
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let secs = reader.get_u64()?;
        let nanos = read_nanos(reader, "Duration")?;
        Ok(Duration::new(secs, nanos))
    }
}

impl WireFormat for SystemTime {
    fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError> {
        let (secs, nanos) = match self.duration_since(UNIX_EPOCH) {
            Ok(after) => {
                let secs = i64::try_from(after.as_secs()).map_err(|_| out_of_range())?;
                (secs, after.subsec_nanos())
            }
            Err(err) => {
                // Before the epoch: negative seconds, nanoseconds still
                // counted forward from them.
                let before = err.duration();
                let secs = i64::try_from(before.as_secs()).map_err(|_| out_of_range())?;
                match before.subsec_nanos() {
                    0 => (-secs, 0),
                    nanos => (-secs - 1, NANOS_PER_SEC - nanos),
                }
            }
        };
        writer.put_i64(secs);
        writer.put_u32(nanos);
        Ok(())
    }

    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError> {
        let secs = reader.get_i64()?;
        let nanos = read_nanos(reader, "SystemTime")?;
        let overflow = || DecodeError::InvalidValue {
            type_name: "SystemTime",
            reason: format!("{secs}s from the epoch is not representable"),
        };
        let base = if secs >= 0 {
            UNIX_EPOCH.checked_add(Duration::from_secs(secs.unsigned_abs()))
        } else {
            UNIX_EPOCH.checked_sub(Duration::from_secs(secs.unsigned_abs()))
        };
        base.and_then(|t| t.checked_add(Duration::from_nanos(u64::from(nanos))))
            .ok_or_else(overflow)
    }
}

fn read_nanos(reader: &mut WireReader<'_>, type_name: &'static str) -> Result<u32, DecodeError> {
    let nanos = reader.get_u32()?;
    if nanos >= NANOS_PER_SEC {
        return Err(DecodeError::InvalidValue {
            type_name,
            reason: format!("nanosecond field {nanos} is out of range"),
        });
    }
    Ok(nanos)
}

fn out_of_range() -> EncodeError {
    EncodeError::InvalidValue {
        type_name: "SystemTime",
        reason: "seconds from the epoch exceed i64".to_string(),
    }
}
