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

//! Declarative macros for entry point tables and wire-encoded types.
//!
//! - [`core_vtable!`]: Generate a struct of `extern "C"` entry points resolved by name
//! - [`wire_record!`]: Declare a struct encoded field by field in declaration order
//! - [`wire_enum!`]: Declare an enum encoded as an `i32` discriminant plus variant fields

/// Generate a struct holding one `unsafe extern "C" fn` pointer per declared
/// entry point, plus a `resolve` constructor that looks each one up by name.
///
/// `Send + Sync` are automatically implemented.
///
/// # Example
///
/// ```rust
/// use rivet_ffi_primitives::*;
///
/// core_vtable! {
///     /// Entry points of a counter library.
///     pub struct CounterVtable {
///         fn counter_new(status: *mut CallStatus) -> u64,
///         fn counter_bump(handle: u64, by: u32, status: *mut CallStatus),
///     }
/// }
///
/// assert_eq!(CounterVtable::SYMBOLS, &["counter_new", "counter_bump"]);
/// ```
#[macro_export]
macro_rules! core_vtable {
    (
        $(#[$meta:meta])*
        pub struct $name:ident {
            $(
                $(#[$fn_meta:meta])*
                fn $method:ident ( $($param:ident : $param_ty:ty),* $(,)? ) $(-> $ret:ty)?
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        #[derive(Clone, Copy)]
        pub struct $name {
            $(
                $(#[$fn_meta])*
                pub $method: unsafe extern "C" fn($($param: $param_ty),*) $(-> $ret)?,
            )*
        }

        unsafe impl Send for $name {}
        unsafe impl Sync for $name {}

        impl $name {
            /// Unprefixed symbol names, in declaration order.
            pub const SYMBOLS: &'static [&'static str] = &[$(stringify!($method)),*];

            /// Resolve every entry point through `lookup`. On failure, returns
            /// the unprefixed name of the first symbol that could not be found.
            ///
            /// # Safety
            /// Every non-null address returned by `lookup` must be a function
            /// with exactly the declared signature.
            pub unsafe fn resolve<F>(mut lookup: F) -> ::std::result::Result<Self, &'static str>
            where
                F: FnMut(&str) -> ::std::option::Option<*const ::std::ffi::c_void>,
            {
                Ok(Self {
                    $(
                        $method: {
                            let address = match lookup(stringify!($method)) {
                                Some(address) if !address.is_null() => address,
                                _ => return Err(stringify!($method)),
                            };
                            ::std::mem::transmute::<
                                *const ::std::ffi::c_void,
                                unsafe extern "C" fn($($param_ty),*) $(-> $ret)?,
                            >(address)
                        },
                    )*
                })
            }
        }

        impl ::std::fmt::Debug for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter<'_>) -> ::std::fmt::Result {
                f.debug_struct(stringify!($name))
                    $(.field(stringify!($method), &(self.$method as *const ::std::ffi::c_void)))*
                    .finish()
            }
        }
    };
}

/// Declare a struct whose wire form is each field's encoding in declaration
/// order, with no framing of its own.
///
/// # Example
///
/// ```rust
/// use rivet_ffi_primitives::wire::{decode, encode};
/// use rivet_ffi_primitives::wire_record;
///
/// wire_record! {
///     #[derive(Debug, PartialEq)]
///     pub struct Point {
///         pub x: i32,
///         pub y: i32,
///     }
/// }
///
/// let bytes = encode(&Point { x: 1, y: 2 }).unwrap();
/// assert_eq!(bytes, vec![0, 0, 0, 1, 0, 0, 0, 2]);
/// assert_eq!(decode::<Point>(&bytes).unwrap(), Point { x: 1, y: 2 });
/// ```
#[macro_export]
macro_rules! wire_record {
    (
        $(#[$meta:meta])*
        $vis:vis struct $name:ident {
            $(
                $(#[$field_meta:meta])*
                $field_vis:vis $field:ident : $field_ty:ty
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis struct $name {
            $(
                $(#[$field_meta])*
                $field_vis $field: $field_ty,
            )*
        }

        impl $crate::wire::WireFormat for $name {
            #[allow(unused_variables)]
            fn write(
                &self,
                writer: &mut $crate::wire::WireWriter,
            ) -> ::std::result::Result<(), $crate::wire::EncodeError> {
                $( $crate::wire::WireFormat::write(&self.$field, writer)?; )*
                Ok(())
            }

            #[allow(unused_variables)]
            fn read(
                reader: &mut $crate::wire::WireReader<'_>,
            ) -> ::std::result::Result<Self, $crate::wire::DecodeError> {
                Ok(Self {
                    $( $field: <$field_ty as $crate::wire::WireFormat>::read(reader)?, )*
                })
            }
        }
    };
}

/// Declare an enum whose wire form is its `i32` discriminant followed by the
/// variant's fields in declaration order. Discriminants are written out
/// explicitly and start at 1.
///
/// Decoding a discriminant with no matching variant fails with
/// [`DecodeError::UnknownDiscriminant`](crate::wire::DecodeError::UnknownDiscriminant).
///
/// # Example
///
/// ```rust
/// use rivet_ffi_primitives::wire::{decode, encode};
/// use rivet_ffi_primitives::wire_enum;
///
/// wire_enum! {
///     #[derive(Debug, PartialEq)]
///     pub enum Shape {
///         Empty = 1,
///         Square { side: u32 } = 2,
///     }
/// }
///
/// let bytes = encode(&Shape::Square { side: 3 }).unwrap();
/// assert_eq!(bytes, vec![0, 0, 0, 2, 0, 0, 0, 3]);
/// assert_eq!(decode::<Shape>(&[0, 0, 0, 1]).unwrap(), Shape::Empty);
/// assert!(decode::<Shape>(&[0, 0, 0, 9]).is_err());
/// ```
#[macro_export]
macro_rules! wire_enum {
    (
        $(#[$meta:meta])*
        $vis:vis enum $name:ident {
            $(
                $(#[$variant_meta:meta])*
                $variant:ident $({ $($field:ident : $field_ty:ty),* $(,)? })? = $discriminant:literal
            ),* $(,)?
        }
    ) => {
        $(#[$meta])*
        $vis enum $name {
            $(
                $(#[$variant_meta])*
                $variant $({ $($field: $field_ty),* })?,
            )*
        }

        impl $crate::wire::WireFormat for $name {
            fn write(
                &self,
                writer: &mut $crate::wire::WireWriter,
            ) -> ::std::result::Result<(), $crate::wire::EncodeError> {
                match self {
                    $(
                        $name::$variant $({ $($field),* })? => {
                            writer.put_i32($discriminant);
                            $($( $crate::wire::WireFormat::write($field, writer)?; )*)?
                        }
                    )*
                }
                Ok(())
            }

            fn read(
                reader: &mut $crate::wire::WireReader<'_>,
            ) -> ::std::result::Result<Self, $crate::wire::DecodeError> {
                match reader.get_i32()? {
                    $(
                        $discriminant => Ok($name::$variant $({
                            $($field: <$field_ty as $crate::wire::WireFormat>::read(reader)?),*
                        })?),
                    )*
                    other => Err($crate::wire::DecodeError::UnknownDiscriminant {
                        type_name: stringify!($name),
                        value: other,
                    }),
                }
            }
        }
    };
}
