// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Error objects and codes

use std::error;
use std::fmt;
use std::io;
use std::result;
use serde::de;

#[derive(Clone, PartialEq, Debug)]
pub enum ErrorCode {
    /// Unknown or deliberately refused opcode
    Unsupported(u8),
    /// EOF while reading an opcode argument
    EofWhileReading,
    /// Stack underflowed
    StackUnderflow,
    /// Mark-consuming opcode found no mark on the stack
    MarkNotFound,
    /// Length prefix found negative
    NegativeLength,
    /// Length prefix exceeds the configured operand ceiling
    LengthTooLarge(u64),
    /// String decoding as UTF-8 failed
    StringNotUtf8,
    /// Wrong stack top type for opcode
    InvalidStackTop(&'static str, &'static str),
    /// Value not hashable, but used as dict key or set item
    ValueNotHashable,
    /// The resolver rejected a module.name constructor
    UnresolvableGlobal(String, String),
    /// A value was missing from the memo
    MissingMemo(u32),
    /// Invalid literal found
    InvalidLiteral(Vec<u8>),
    /// STOP reached with an empty stack, or the stream ended before STOP
    NoResult,
    /// Decoded root could not be projected to the requested type
    WrongType(&'static str, &'static str),
    /// Numeric value does not fit the destination type
    Overflow(String, &'static str),
    /// A destination field had no matching source key
    MissingField(String),
    /// A source key had no destination field, or its value would not unpack;
    /// the path names the offending key from the root
    MismatchedField(Vec<String>, String),
    /// Structure unpacking error reported through serde
    Structure(String),
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            ErrorCode::Unsupported(op) => write!(fmt, "unsupported opcode 0x{:02x}", op),
            ErrorCode::EofWhileReading => write!(fmt, "EOF while reading opcode argument"),
            ErrorCode::StackUnderflow => write!(fmt, "pickle stack underflow"),
            ErrorCode::MarkNotFound => write!(fmt, "no mark on the stack"),
            ErrorCode::NegativeLength => write!(fmt, "negative length prefix"),
            ErrorCode::LengthTooLarge(len) =>
                write!(fmt, "length prefix {} exceeds the operand ceiling", len),
            ErrorCode::StringNotUtf8 => write!(fmt, "string is not UTF-8 encoded"),
            ErrorCode::InvalidStackTop(expected, got) =>
                write!(fmt, "invalid stack top, expected {}, got {}", expected, got),
            ErrorCode::ValueNotHashable => write!(fmt, "dict key or set item not hashable"),
            ErrorCode::UnresolvableGlobal(ref module, ref name) =>
                write!(fmt, "unresolvable global: {}.{}", module, name),
            ErrorCode::MissingMemo(index) => write!(fmt, "missing memo with index {}", index),
            ErrorCode::InvalidLiteral(ref lit) =>
                write!(fmt, "literal is invalid: {}", String::from_utf8_lossy(lit)),
            ErrorCode::NoResult => write!(fmt, "input did not produce a value"),
            ErrorCode::WrongType(requested, got) =>
                write!(fmt, "cannot convert {} to {}", got, requested),
            ErrorCode::Overflow(ref value, target) =>
                write!(fmt, "value {} overflows target type {}", value, target),
            ErrorCode::MissingField(ref field) =>
                write!(fmt, "no source key for field {:?}", field),
            ErrorCode::MismatchedField(ref path, ref cause) =>
                write!(fmt, "mismatched field {:?}: {}", path.join("."), cause),
            ErrorCode::Structure(ref msg) => fmt.write_str(msg),
        }
    }
}

/// Machine context captured at the point of failure.
#[derive(Clone, Default, PartialEq, Debug)]
pub struct Fault {
    /// Byte offset of the input position.
    pub pos: usize,
    /// The opcode being executed.
    pub opcode: u8,
    /// Value stack depth.
    pub stack_depth: usize,
    /// Memo table size.
    pub memo_size: usize,
}

impl fmt::Display for Fault {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        write!(fmt, "opcode 0x{:02x} at offset {} (stack depth {}, memo size {})",
               self.opcode, self.pos, self.stack_depth, self.memo_size)
    }
}

/// This type represents all possible errors that can occur when decoding a
/// pickle stream or unpacking the decoded value.
#[derive(Debug)]
pub enum Error {
    /// Some IO error occurred while reading from the byte source.
    Io(io::Error),
    /// The pickle machine failed while interpreting the stream.
    Eval(ErrorCode, Fault),
    /// The decoded value could not be transformed into the requested shape.
    Syntax(ErrorCode),
}

impl From<io::Error> for Error {
    fn from(error: io::Error) -> Error {
        Error::Io(error)
    }
}

pub type Result<T> = result::Result<T, Error>;

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Error::Io(ref error) => error.fmt(fmt),
            Error::Eval(ref code, ref fault) =>
                write!(fmt, "eval error on {}: {}", fault, code),
            Error::Syntax(ref code) => write!(fmt, "unpacking error: {}", code),
        }
    }
}

impl error::Error for Error {}

impl de::Error for Error {
    fn custom<T: fmt::Display>(msg: T) -> Error {
        Error::Syntax(ErrorCode::Structure(msg.to_string()))
    }
}
