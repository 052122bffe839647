// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Reading Python's pickle format
//!
//! # Pickle format
//!
//! Please see the [Python docs](http://docs.python.org/library/pickle) for
//! details on the pickle format.
//!
//! This crate reads pickle protocols 0, 1 and 2 — the versions the Python 2
//! series writes, and which Python 3 can still emit for compatibility.  It
//! is a reader only; there is no serializer.
//!
//! # Supported types
//!
//! Pickle is very powerful.  It is capable of serializing pretty arbitrary
//! graphs of Python objects, with most custom classes being serialized out
//! of the box.  This crate only supports Python's built-in types that map
//! cleanly to Rust constructs.  There are:
//!
//! * None
//! * Boolean (Rust `bool`)
//! * Integers (Rust `i64` or bigints from num)
//! * Floats (Rust `f64`)
//! * Strings, both the byte-string and unicode flavors (Rust `String`)
//! * Lists and tuples (`Vec<Value>`)
//! * Dictionaries (`BTreeMap<HashableValue, Value>`)
//! * Sets, via the `__builtin__.set` constructor (`BTreeSet<HashableValue>`)
//!
//! Containers are shared handles: back-references through the pickle memo
//! preserve identity, so shared and self-referential structure decodes the
//! way Python wrote it.  Opcodes that would reconstruct arbitrary class
//! instances, persistent IDs and extension registries are refused with a
//! clean error instead of being partially executed.  The only sanctioned
//! hook for foreign constructors is the [`Resolver`] trait.
//!
//! # Exported API
//!
//! The `value_from_*` functions decode a stream into a [`Value`] tree.  The
//! generic `from_*` functions additionally unpack that tree into any type
//! implementing serde's `Deserialize` — integers widen with overflow
//! checks, struct fields match dict keys by serde name, verbatim, or with
//! the first character uppercased, and `Option`/`Box` destinations give
//! pointer semantics.  [`unpack_into`] assigns into an existing value with
//! configurable strictness, and the [`helpers`] module projects a decode
//! result to one expected type without an intermediate error check:
//!
//! ```
//! use brine::{helpers, value_from_slice, DeOptions};
//!
//! let answer = helpers::int(value_from_slice(b"I42\n.", DeOptions::new())).unwrap();
//! assert_eq!(answer, 42);
//! ```
//!
//! *Note on enums:* enum variants unpack from Python tuples `(name, data)`
//! (or a plain string for unit variants).
//!
//! # Minimum Supported Rust Version
//!
//! The minimum supported version of the toolchain is 1.65.

pub use self::de::{
    from_reader, from_slice, value_from_reader, value_from_slice, DeOptions, Machine,
};

pub use self::error::{Error, ErrorCode, Fault, Result};

pub use self::resolve::{BuiltinResolver, Resolver};

pub use self::unpack::{from_value, unpack_into, UnpackInto, Unpacker};

pub use self::value::{GlobalRef, HashableValue, Value};

mod consts;
pub mod de;
pub mod error;
pub mod helpers;
mod read;
pub mod resolve;
pub mod unpack;
pub mod value;

#[cfg(test)]
#[path = "../test/mod.rs"]
mod test;
