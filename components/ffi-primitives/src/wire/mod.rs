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

//! Wire format for values crossing the boundary in a buffer.
//!
//! All multi-byte scalars are big-endian. Layouts:
//!
//! | Type              | Encoding                                            |
//! |-------------------|-----------------------------------------------------|
//! | `i8`..`u64`       | fixed width                                          |
//! | `f32` / `f64`     | IEEE-754 bit pattern, fixed width                    |
//! | `bool`            | one signed byte, `0` or `1`                          |
//! | `String` / bytes  | `i32` length, then the raw bytes                     |
//! | `Option<T>`       | one byte presence flag, then `T` if present          |
//! | `Vec<T>`          | `i32` count, then each element                       |
//! | maps              | `i32` count, then key/value pairs                    |
//! | `Duration`        | `u64` seconds, `u32` nanoseconds                     |
//! | `SystemTime`      | `i64` seconds from the epoch (signed), `u32` nanos   |
//! | records           | each field in declaration order                      |
//! | enums             | `i32` discriminant from 1, then the variant's fields |

mod impls;

use thiserror::Error;

/// Failure to decode a buffer. Always a protocol violation: the two sides
/// disagree on the shape of the data.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// Fewer bytes remain than the next value needs.
    #[error("unexpected end of buffer: needed {needed} bytes, {remaining} remaining")]
    UnexpectedEof { needed: usize, remaining: usize },

    /// A length or count prefix was negative.
    #[error("negative length prefix {0}")]
    NegativeLength(i32),

    #[error("invalid boolean byte {0}")]
    InvalidBool(i8),

    #[error("invalid optional presence flag {0}")]
    InvalidPresenceFlag(i8),

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown discriminant {value} for {type_name}")]
    UnknownDiscriminant { type_name: &'static str, value: i32 },

    /// The value decoded but bytes were left over.
    #[error("{remaining} junk bytes remaining in buffer after decoding")]
    TrailingBytes { remaining: usize },

    #[error("invalid {type_name}: {reason}")]
    InvalidValue {
        type_name: &'static str,
        reason: String,
    },
}

/// Failure to encode a value.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EncodeError {
    #[error("length {len} does not fit in a 32-bit prefix")]
    LengthOverflow { len: usize },

    #[error("invalid {type_name}: {reason}")]
    InvalidValue {
        type_name: &'static str,
        reason: String,
    },
}

/// A type with a wire encoding.
pub trait WireFormat: Sized {
    fn write(&self, writer: &mut WireWriter) -> Result<(), EncodeError>;
    fn read(reader: &mut WireReader<'_>) -> Result<Self, DecodeError>;
}

/// Encode a single value.
pub fn encode<T: WireFormat>(value: &T) -> Result<Vec<u8>, EncodeError> {
    let mut writer = WireWriter::new();
    value.write(&mut writer)?;
    Ok(writer.into_bytes())
}

/// Decode a single value that must consume all of `bytes`.
pub fn decode<T: WireFormat>(bytes: &[u8]) -> Result<T, DecodeError> {
    let mut reader = WireReader::new(bytes);
    let value = T::read(&mut reader)?;
    reader.finish()?;
    Ok(value)
}

// ============================================================================
// Writer
// ============================================================================

/// Append-only encoder.
#[derive(Debug, Default, Clone)]
pub struct WireWriter {
    buf: Vec<u8>,
}

macro_rules! put_scalar {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self, value: $ty) {
                self.buf.extend_from_slice(&value.to_be_bytes());
            }
        )*
    };
}

impl WireWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    put_scalar! {
        put_i8: i8,
        put_u8: u8,
        put_i16: i16,
        put_u16: u16,
        put_i32: i32,
        put_u32: u32,
        put_i64: i64,
        put_u64: u64,
        put_f32: f32,
        put_f64: f64,
    }

    pub fn put_bool(&mut self, value: bool) {
        self.put_i8(i8::from(value));
    }

    /// Write an `i32` length or count prefix.
    pub fn put_len(&mut self, len: usize) -> Result<(), EncodeError> {
        let prefix = i32::try_from(len).map_err(|_| EncodeError::LengthOverflow { len })?;
        self.put_i32(prefix);
        Ok(())
    }

    /// Write length-prefixed raw bytes.
    pub fn put_bytes(&mut self, bytes: &[u8]) -> Result<(), EncodeError> {
        self.put_len(bytes.len())?;
        self.buf.extend_from_slice(bytes);
        Ok(())
    }

    pub fn put_str(&mut self, value: &str) -> Result<(), EncodeError> {
        self.put_bytes(value.as_bytes())
    }

    pub fn write<T: WireFormat>(&mut self, value: &T) -> Result<(), EncodeError> {
        value.write(self)
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.buf
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.buf
    }
}

// ============================================================================
// Reader
// ============================================================================

/// Cursor over a borrowed buffer.
#[derive(Debug, Clone)]
pub struct WireReader<'a> {
    data: &'a [u8],
    pos: usize,
}

macro_rules! get_scalar {
    ($($name:ident: $ty:ty),* $(,)?) => {
        $(
            pub fn $name(&mut self) -> Result<$ty, DecodeError> {
                let bytes = self.take(std::mem::size_of::<$ty>())?;
                let mut raw = [0u8; std::mem::size_of::<$ty>()];
                raw.copy_from_slice(bytes);
                Ok(<$ty>::from_be_bytes(raw))
            }
        )*
    };
}

impl<'a> WireReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes not yet consumed.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Consume exactly `n` bytes.
    pub fn take(&mut self, n: usize) -> Result<&'a [u8], DecodeError> {
        let remaining = self.remaining();
        if n > remaining {
            return Err(DecodeError::UnexpectedEof {
                needed: n,
                remaining,
            });
        }
        let slice = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(slice)
    }

    get_scalar! {
        get_i8: i8,
        get_u8: u8,
        get_i16: i16,
        get_u16: u16,
        get_i32: i32,
        get_u32: u32,
        get_i64: i64,
        get_u64: u64,
        get_f32: f32,
        get_f64: f64,
    }

    pub fn get_bool(&mut self) -> Result<bool, DecodeError> {
        match self.get_i8()? {
            0 => Ok(false),
            1 => Ok(true),
            other => Err(DecodeError::InvalidBool(other)),
        }
    }

    /// Read an `i32` length or count prefix.
    pub fn get_len(&mut self) -> Result<usize, DecodeError> {
        let len = self.get_i32()?;
        usize::try_from(len).map_err(|_| DecodeError::NegativeLength(len))
    }

    pub fn get_bytes(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.get_len()?;
        self.take(len)
    }

    pub fn get_string(&mut self) -> Result<String, DecodeError> {
        let bytes = self.get_bytes()?;
        std::str::from_utf8(bytes)
            .map(str::to_owned)
            .map_err(|_| DecodeError::InvalidUtf8)
    }

    pub fn read<T: WireFormat>(&mut self) -> Result<T, DecodeError> {
        T::read(self)
    }

    /// Assert that the whole buffer was consumed.
    pub fn finish(self) -> Result<(), DecodeError> {
        match self.remaining() {
            0 => Ok(()),
            remaining => Err(DecodeError::TrailingBytes { remaining }),
        }
    }
}
