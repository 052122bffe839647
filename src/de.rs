// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! # Pickle decoding
//!
//! Note: pickles are not a declarative format, but a program for a
//! stack-based VM.  Each value that is decoded is simply put on the stack,
//! and some operations pop items from the stack and construct new data with
//! them.  The machine here interprets that program: a value stack, a memo
//! table for back-references, and one handler per opcode.  On STOP, the top
//! of the stack is the decoded root value.
//!
//! Containers are shared handles (see [`Value`]), so a container that is
//! stored in the memo and mutated afterwards by APPEND(S)/SETITEM(S) exposes
//! the mutation through every back-reference.  That is how shared and
//! self-referential structure round-trips through the memo.

use std::cell::RefCell;
use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::rc::Rc;
use std::str;
use num_bigint::BigInt;
use serde::de;

use crate::consts::*;
use crate::error::{Error, ErrorCode, Fault, Result};
use crate::read::OpReader;
use crate::resolve::{BuiltinResolver, Resolver};
use crate::unpack::from_value;
use crate::value::{HashableValue, Value};

/// Options for decoding a pickle stream.
#[derive(Clone)]
pub struct DeOptions {
    max_operand_len: usize,
    resolver: Option<Rc<dyn Resolver>>,
}

impl Default for DeOptions {
    fn default() -> DeOptions {
        DeOptions { max_operand_len: 0x7fff_ffff, resolver: None }
    }
}

impl DeOptions {
    /// Default options: operand lengths capped at 2^31 - 1, the
    /// [`BuiltinResolver`] answering for GLOBAL/REDUCE.
    pub fn new() -> DeOptions {
        Default::default()
    }

    /// Caps every declared length in the stream (string payloads, long
    /// payloads, memo indices).  A stream declaring a longer operand fails
    /// instead of allocating.
    pub fn max_operand_len(mut self, len: usize) -> DeOptions {
        self.max_operand_len = len;
        self
    }

    /// Installs a resolver consulted by the GLOBAL and REDUCE opcodes in
    /// place of the default [`BuiltinResolver`].
    pub fn resolver(mut self, resolver: Rc<dyn Resolver>) -> DeOptions {
        self.resolver = Some(resolver);
        self
    }
}

impl fmt::Debug for DeOptions {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        fmt.debug_struct("DeOptions")
           .field("max_operand_len", &self.max_operand_len)
           .field("resolver", &self.resolver.as_ref().map(|_| "custom"))
           .finish()
    }
}

/// Dispatcher state after an opcode was executed.
enum Flow {
    Running,
    Halted,
}

/// Decodes one pickle stream into one [`Value`].
pub struct Machine<R> {
    rdr: OpReader<R>,
    stack: Vec<Value>,
    memo: BTreeMap<u32, Value>,
    current_opcode: u8,
    options: DeOptions,
}

impl<R: io::Read> Machine<R> {
    pub fn new(rdr: R, options: DeOptions) -> Machine<R> {
        Machine {
            rdr: OpReader::new(rdr),
            stack: Vec::with_capacity(128),
            memo: BTreeMap::new(),
            current_opcode: 0,
            options,
        }
    }

    /// Runs the dispatch loop to completion and returns the root value.
    pub fn decode(mut self) -> Result<Value> {
        loop {
            let opcode = match self.rdr.read_byte() {
                Ok(opcode) => opcode,
                // The stream ended before STOP was executed.
                Err(ref err) if err.kind() == io::ErrorKind::UnexpectedEof =>
                    return self.error(ErrorCode::NoResult),
                Err(err) => return Err(Error::Io(err)),
            };
            self.current_opcode = opcode;
            match self.dispatch(opcode)? {
                Flow::Running => {}
                Flow::Halted => break,
            }
        }
        match self.stack.pop() {
            Some(root) => {
                if root.is_stack_only() {
                    self.error(ErrorCode::InvalidStackTop("value", root.type_name()))
                } else {
                    Ok(root)
                }
            }
            None => self.error(ErrorCode::NoResult),
        }
    }

    fn dispatch(&mut self, opcode: u8) -> Result<Flow> {
        match opcode {
            STOP => return Ok(Flow::Halted),

            // Mark and stack control
            MARK => self.stack.push(Value::Mark),
            POP => { self.pop()?; }
            POP_MARK => { self.pop_to_mark()?; }
            DUP => self.op_dup()?,
            PROTO => { self.read_byte()?; }

            // Singletons
            NONE => self.stack.push(Value::None),
            NEWTRUE => self.stack.push(Value::Bool(true)),
            NEWFALSE => self.stack.push(Value::Bool(false)),

            // ASCII-formatted numbers
            INT => self.op_int()?,
            LONG => self.op_long()?,
            FLOAT => self.op_float()?,

            // Binary-coded numbers
            BININT => self.op_binint()?,
            BININT1 => self.op_binint1()?,
            BININT2 => self.op_binint2()?,
            BINFLOAT => self.op_binfloat()?,
            LONG1 => self.op_long1()?,
            LONG4 => self.op_long4()?,

            // Strings
            STRING => self.op_string()?,
            BINSTRING => self.op_binstring()?,
            SHORT_BINSTRING => self.op_short_binstring()?,
            UNICODE => self.op_unicode()?,
            BINUNICODE => self.op_binunicode()?,

            // Memo
            GET => self.op_get()?,
            BINGET => self.op_binget()?,
            LONG_BINGET => self.op_long_binget()?,
            PUT => self.op_put()?,
            BINPUT => self.op_binput()?,
            LONG_BINPUT => self.op_long_binput()?,

            // Containers
            EMPTY_LIST => self.stack.push(Value::list(vec![])),
            EMPTY_TUPLE => self.stack.push(Value::tuple(vec![])),
            EMPTY_DICT => self.stack.push(Value::dict(BTreeMap::new())),
            LIST => self.op_list()?,
            TUPLE => self.op_tuple()?,
            TUPLE1 => self.op_tuple_n(1)?,
            TUPLE2 => self.op_tuple_n(2)?,
            TUPLE3 => self.op_tuple_n(3)?,
            DICT => self.op_dict()?,
            APPEND => self.op_append()?,
            APPENDS => self.op_appends()?,
            SETITEM => self.op_setitem()?,
            SETITEMS => self.op_setitems()?,

            // Constructors
            GLOBAL => self.op_global()?,
            REDUCE => self.op_reduce()?,

            // Unassigned slots, and the refused object-construction,
            // persistent-ID and extension-registry opcodes.
            _ => return self.error(ErrorCode::Unsupported(opcode)),
        }
        Ok(Flow::Running)
    }

    // Scalar handlers

    fn op_int(&mut self) -> Result<()> {
        let line = self.read_line()?;
        // Protocol 0 spells booleans as the integers "00" and "01".
        let value = match &line[..] {
            b"00" => Value::Bool(false),
            b"01" => Value::Bool(true),
            _ => match str::from_utf8(&line).unwrap_or("").parse::<i64>() {
                Ok(i) => Value::I64(i),
                Err(_) => return self.error(ErrorCode::InvalidLiteral(line)),
            },
        };
        self.stack.push(value);
        Ok(())
    }

    fn op_long(&mut self) -> Result<()> {
        let mut line = self.read_line()?;
        // Remove the "L" suffix Python 2 appends.
        if line.last() == Some(&b'L') {
            line.pop();
        }
        match BigInt::parse_bytes(&line, 10) {
            Some(i) => {
                self.stack.push(Value::Int(i));
                Ok(())
            }
            None => self.error(ErrorCode::InvalidLiteral(line)),
        }
    }

    fn op_long1(&mut self) -> Result<()> {
        let len = self.read_u8()?;
        let bytes = self.read_bytes(len as u64)?;
        self.stack.push(Value::Int(BigInt::from_signed_bytes_le(&bytes)));
        Ok(())
    }

    fn op_long4(&mut self) -> Result<()> {
        let len = self.read_u32_le()?;
        let bytes = self.read_bytes(len as u64)?;
        self.stack.push(Value::Int(BigInt::from_signed_bytes_le(&bytes)));
        Ok(())
    }

    fn op_binint(&mut self) -> Result<()> {
        let value = self.read_i32_le()?;
        self.stack.push(Value::I64(value as i64));
        Ok(())
    }

    fn op_binint1(&mut self) -> Result<()> {
        let value = self.read_u8()?;
        self.stack.push(Value::I64(value as i64));
        Ok(())
    }

    fn op_binint2(&mut self) -> Result<()> {
        let value = self.read_u16_le()?;
        self.stack.push(Value::I64(value as i64));
        Ok(())
    }

    fn op_float(&mut self) -> Result<()> {
        let line = self.read_line()?;
        match str::from_utf8(&line).unwrap_or("").parse::<f64>() {
            Ok(f) => {
                self.stack.push(Value::F64(f));
                Ok(())
            }
            Err(_) => self.error(ErrorCode::InvalidLiteral(line)),
        }
    }

    fn op_binfloat(&mut self) -> Result<()> {
        let value = self.rdr.read_f64_be().map_err(|err| self.io_error(err))?;
        self.stack.push(Value::F64(value));
        Ok(())
    }

    fn op_string(&mut self) -> Result<()> {
        let line = self.read_line()?;
        // The payload must be wrapped in matching single or double quotes.
        let quoted = line.len() >= 2 && line[0] == line[line.len() - 1]
            && (line[0] == b'"' || line[0] == b'\'');
        if !quoted {
            return self.error(ErrorCode::InvalidLiteral(line));
        }
        match decode_escaped_string(&line[1..line.len() - 1]) {
            Some(bytes) => self.push_text(bytes),
            None => self.error(ErrorCode::InvalidLiteral(line)),
        }
    }

    fn op_binstring(&mut self) -> Result<()> {
        let len = self.read_i32_le()?;
        if len < 0 {
            return self.error(ErrorCode::NegativeLength);
        }
        let bytes = self.read_bytes(len as u64)?;
        self.push_text(bytes)
    }

    fn op_short_binstring(&mut self) -> Result<()> {
        let len = self.read_u8()?;
        let bytes = self.read_bytes(len as u64)?;
        self.push_text(bytes)
    }

    fn op_unicode(&mut self) -> Result<()> {
        let line = self.read_line()?;
        match decode_escaped_unicode(&line) {
            Some(s) => {
                self.stack.push(Value::String(s));
                Ok(())
            }
            None => self.error(ErrorCode::InvalidLiteral(line)),
        }
    }

    fn op_binunicode(&mut self) -> Result<()> {
        let len = self.read_u32_le()?;
        let bytes = self.read_bytes(len as u64)?;
        self.push_text(bytes)
    }

    // Memo handlers

    fn op_get(&mut self) -> Result<()> {
        let line = self.read_line()?;
        let index = self.parse_memo_index(line)?;
        self.memo_load(index)
    }

    fn op_binget(&mut self) -> Result<()> {
        let index = self.read_u8()?;
        self.memo_load(index as u32)
    }

    fn op_long_binget(&mut self) -> Result<()> {
        let index = self.read_u32_le()?;
        self.memo_load(index)
    }

    fn op_put(&mut self) -> Result<()> {
        let line = self.read_line()?;
        let index = self.parse_memo_index(line)?;
        self.memo_store(index)
    }

    fn op_binput(&mut self) -> Result<()> {
        let index = self.read_u8()?;
        self.memo_store(index as u32)
    }

    fn op_long_binput(&mut self) -> Result<()> {
        let index = self.read_u32_le()?;
        self.memo_store(index)
    }

    // Mark and stack control

    fn op_dup(&mut self) -> Result<()> {
        // For containers this clones the handle, so both entries alias.
        let top = match self.stack.last() {
            Some(v) => v.clone(),
            None => return self.error(ErrorCode::StackUnderflow),
        };
        self.stack.push(top);
        Ok(())
    }

    // Container handlers

    fn op_list(&mut self) -> Result<()> {
        let items = self.pop_values_to_mark()?;
        self.stack.push(Value::list(items));
        Ok(())
    }

    fn op_tuple(&mut self) -> Result<()> {
        let items = self.pop_values_to_mark()?;
        self.stack.push(Value::tuple(items));
        Ok(())
    }

    fn op_tuple_n(&mut self, n: usize) -> Result<()> {
        if self.stack.len() < n {
            return self.error(ErrorCode::StackUnderflow);
        }
        let items = self.stack.split_off(self.stack.len() - n);
        self.check_values(&items)?;
        self.stack.push(Value::tuple(items));
        Ok(())
    }

    fn op_dict(&mut self) -> Result<()> {
        let items = self.pop_values_to_mark()?;
        let mut entries = BTreeMap::new();
        self.insert_pairs(&mut entries, items)?;
        self.stack.push(Value::dict(entries));
        Ok(())
    }

    fn op_append(&mut self) -> Result<()> {
        let value = self.pop_value()?;
        let list = self.top_list()?;
        list.borrow_mut().push(value);
        Ok(())
    }

    fn op_appends(&mut self) -> Result<()> {
        let items = self.pop_values_to_mark()?;
        let list = self.top_list()?;
        list.borrow_mut().extend(items);
        Ok(())
    }

    fn op_setitem(&mut self) -> Result<()> {
        let value = self.pop_value()?;
        let key = self.pop()?;
        let dict = self.top_dict()?;
        let key = self.hashable(key)?;
        dict.borrow_mut().insert(key, value);
        Ok(())
    }

    fn op_setitems(&mut self) -> Result<()> {
        let items = self.pop_values_to_mark()?;
        let dict = self.top_dict()?;
        let mut entries = dict.borrow_mut();
        self.insert_pairs(&mut entries, items)
    }

    // Constructor handlers

    fn op_global(&mut self) -> Result<()> {
        let module = self.read_text_line()?;
        let name = self.read_text_line()?;
        match self.resolve(&module, &name, None) {
            Some(value) => {
                self.stack.push(value);
                Ok(())
            }
            None => self.error(ErrorCode::UnresolvableGlobal(module, name)),
        }
    }

    fn op_reduce(&mut self) -> Result<()> {
        let args = self.pop()?;
        let constructor = match self.pop()? {
            Value::Global(global) => global,
            other => return self.error(
                ErrorCode::InvalidStackTop("global constructor", other.type_name())),
        };
        match self.resolve(&constructor.module, &constructor.name, Some(args)) {
            Some(value) => {
                self.stack.push(value);
                Ok(())
            }
            None => self.error(ErrorCode::UnresolvableGlobal(
                constructor.module.clone(), constructor.name.clone())),
        }
    }

    fn resolve(&self, module: &str, name: &str, args: Option<Value>) -> Option<Value> {
        match self.options.resolver {
            Some(ref resolver) => resolver.resolve(module, name, args),
            None => BuiltinResolver.resolve(module, name, args),
        }
    }

    // Stack and memo state

    fn pop(&mut self) -> Result<Value> {
        match self.stack.pop() {
            Some(value) => Ok(value),
            None => self.error(ErrorCode::StackUnderflow),
        }
    }

    /// Pops the run of items above the nearest mark, in stack order, and
    /// drops the mark itself.
    fn pop_to_mark(&mut self) -> Result<Vec<Value>> {
        let mark = match self.stack.iter().rposition(|v| matches!(v, Value::Mark)) {
            Some(index) => index,
            None => return self.error(ErrorCode::MarkNotFound),
        };
        let items = self.stack.split_off(mark + 1);
        self.stack.pop();
        Ok(items)
    }

    /// Like `pop_to_mark`, for container construction: the sentinels never
    /// become container items.
    fn pop_values_to_mark(&mut self) -> Result<Vec<Value>> {
        let items = self.pop_to_mark()?;
        self.check_values(&items)?;
        Ok(items)
    }

    fn pop_value(&mut self) -> Result<Value> {
        let value = self.pop()?;
        if value.is_stack_only() {
            return self.error(ErrorCode::InvalidStackTop("value", value.type_name()));
        }
        Ok(value)
    }

    fn check_values(&self, items: &[Value]) -> Result<()> {
        match items.iter().find(|item| item.is_stack_only()) {
            Some(item) => self.error(ErrorCode::InvalidStackTop("value", item.type_name())),
            None => Ok(()),
        }
    }

    fn top_list(&mut self) -> Result<Rc<RefCell<Vec<Value>>>> {
        let got = match self.stack.last() {
            Some(Value::List(items)) => return Ok(items.clone()),
            Some(other) => other.type_name(),
            None => return self.error(ErrorCode::StackUnderflow),
        };
        self.error(ErrorCode::InvalidStackTop("list", got))
    }

    fn top_dict(&mut self) -> Result<Rc<RefCell<BTreeMap<HashableValue, Value>>>> {
        let got = match self.stack.last() {
            Some(Value::Dict(entries)) => return Ok(entries.clone()),
            Some(other) => other.type_name(),
            None => return self.error(ErrorCode::StackUnderflow),
        };
        self.error(ErrorCode::InvalidStackTop("dict", got))
    }

    /// Inserts a popped run of alternating keys and values.  A dangling key
    /// means the run was one item short.
    fn insert_pairs(&self, entries: &mut BTreeMap<HashableValue, Value>,
                    items: Vec<Value>) -> Result<()> {
        let mut pending: Option<Value> = None;
        for item in items {
            match pending.take() {
                None => pending = Some(item),
                Some(key) => {
                    let key = self.hashable(key)?;
                    entries.insert(key, item);
                }
            }
        }
        if pending.is_some() {
            return self.error(ErrorCode::StackUnderflow);
        }
        Ok(())
    }

    fn hashable(&self, value: Value) -> Result<HashableValue> {
        match value.to_hashable() {
            Some(key) => Ok(key),
            None => self.error(ErrorCode::ValueNotHashable),
        }
    }

    fn memo_store(&mut self, index: u32) -> Result<()> {
        if index as u64 > self.options.max_operand_len as u64 {
            return self.error(ErrorCode::LengthTooLarge(index as u64));
        }
        // The top of the stack is not popped; for containers the stored
        // handle aliases the stack entry, so later in-place mutation is
        // visible through the memo.
        let value = match self.stack.last() {
            Some(value) => value.clone(),
            None => return self.error(ErrorCode::StackUnderflow),
        };
        self.memo.insert(index, value);
        Ok(())
    }

    fn memo_load(&mut self, index: u32) -> Result<()> {
        match self.memo.get(&index) {
            Some(value) => {
                let value = value.clone();
                self.stack.push(value);
                Ok(())
            }
            None => self.error(ErrorCode::MissingMemo(index)),
        }
    }

    fn parse_memo_index(&self, line: Vec<u8>) -> Result<u32> {
        match str::from_utf8(&line).unwrap_or("").parse::<u32>() {
            Ok(index) => Ok(index),
            Err(_) => self.error(ErrorCode::InvalidLiteral(line)),
        }
    }

    // Byte source access, with I/O failures mapped into machine errors

    fn read_byte(&mut self) -> Result<u8> {
        self.rdr.read_byte().map_err(|err| self.io_error(err))
    }

    fn read_u8(&mut self) -> Result<u8> {
        self.rdr.read_u8().map_err(|err| self.io_error(err))
    }

    fn read_u16_le(&mut self) -> Result<u16> {
        self.rdr.read_u16_le().map_err(|err| self.io_error(err))
    }

    fn read_u32_le(&mut self) -> Result<u32> {
        self.rdr.read_u32_le().map_err(|err| self.io_error(err))
    }

    fn read_i32_le(&mut self) -> Result<i32> {
        self.rdr.read_i32_le().map_err(|err| self.io_error(err))
    }

    fn read_line(&mut self) -> Result<Vec<u8>> {
        self.rdr.read_line().map_err(|err| self.io_error(err))
    }

    /// Reads a declared-length operand, honoring the configured ceiling.
    fn read_bytes(&mut self, len: u64) -> Result<Vec<u8>> {
        if len > self.options.max_operand_len as u64 {
            return self.error(ErrorCode::LengthTooLarge(len));
        }
        self.rdr.read_bytes(len as usize).map_err(|err| self.io_error(err))
    }

    fn read_text_line(&mut self) -> Result<String> {
        let line = self.read_line()?;
        match String::from_utf8(line) {
            Ok(s) => Ok(s),
            Err(_) => self.error(ErrorCode::StringNotUtf8),
        }
    }

    fn push_text(&mut self, bytes: Vec<u8>) -> Result<()> {
        match String::from_utf8(bytes) {
            Ok(s) => {
                self.stack.push(Value::String(s));
                Ok(())
            }
            Err(_) => self.error(ErrorCode::StringNotUtf8),
        }
    }

    fn io_error(&self, err: io::Error) -> Error {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            Error::Eval(ErrorCode::EofWhileReading, self.fault())
        } else {
            Error::Io(err)
        }
    }

    fn fault(&self) -> Fault {
        Fault {
            pos: self.rdr.pos(),
            opcode: self.current_opcode,
            stack_depth: self.stack.len(),
            memo_size: self.memo.len(),
        }
    }

    fn error<T>(&self, code: ErrorCode) -> Result<T> {
        Err(Error::Eval(code, self.fault()))
    }
}

/// Decodes a Python-string-escaped payload into raw bytes.  The accepted
/// escape alphabet is `\\ \' \" \a \b \f \n \r \t \v \xHH \ooo`; anything
/// else, including a trailing lone backslash, is rejected.
fn decode_escaped_string(s: &[u8]) -> Option<Vec<u8>> {
    let mut result = Vec::with_capacity(s.len());
    let mut iter = s.iter().copied().peekable();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            result.push(b);
            continue;
        }
        match iter.next()? {
            b'\\' => result.push(b'\\'),
            b'\'' => result.push(b'\''),
            b'"' => result.push(b'"'),
            b'a' => result.push(0x07),
            b'b' => result.push(0x08),
            b'f' => result.push(0x0c),
            b'n' => result.push(b'\n'),
            b'r' => result.push(b'\r'),
            b't' => result.push(b'\t'),
            b'v' => result.push(0x0b),
            b'x' => {
                let hi = hex_digit(iter.next()?)?;
                let lo = hex_digit(iter.next()?)?;
                result.push((hi * 16 + lo) as u8);
            }
            digit @ b'0'..=b'7' => {
                // One to three octal digits.
                let mut value = (digit - b'0') as u32;
                for _ in 0..2 {
                    match iter.peek() {
                        Some(&next @ b'0'..=b'7') => {
                            value = value * 8 + (next - b'0') as u32;
                            iter.next();
                        }
                        _ => break,
                    }
                }
                if value > 0xff {
                    return None;
                }
                result.push(value as u8);
            }
            _ => return None,
        }
    }
    Some(result)
}

/// Decodes a raw-unicode-escape payload.  Only `\uHHHH` and `\UHHHHHHHH`
/// are escapes; `\\` yields a backslash and every other backslash is
/// literal.  Non-escape bytes are Latin-1.
fn decode_escaped_unicode(s: &[u8]) -> Option<String> {
    let mut result = String::with_capacity(s.len());
    let mut iter = s.iter().copied().peekable();
    while let Some(b) = iter.next() {
        if b != b'\\' {
            result.push(b as char);
            continue;
        }
        let ndigits = match iter.peek() {
            Some(b'u') => 4,
            Some(b'U') => 8,
            Some(b'\\') => {
                iter.next();
                result.push('\\');
                continue;
            }
            _ => {
                result.push('\\');
                continue;
            }
        };
        iter.next();
        let mut accum = 0;
        for _ in 0..ndigits {
            accum = accum * 16 + hex_digit(iter.next()?)?;
        }
        result.push(char::from_u32(accum)?);
    }
    Some(result)
}

fn hex_digit(b: u8) -> Option<u32> {
    (b as char).to_digit(16)
}

/// Decodes a value from a `std::io::Read`.
pub fn value_from_reader<R: io::Read>(rdr: R, options: DeOptions) -> Result<Value> {
    Machine::new(rdr, options).decode()
}

/// Decodes a value from a byte slice.
pub fn value_from_slice(data: &[u8], options: DeOptions) -> Result<Value> {
    value_from_reader(data, options)
}

/// Decodes a stream and unpacks the root into any deserializable type.
pub fn from_reader<R: io::Read, T: de::DeserializeOwned>(rdr: R, options: DeOptions) -> Result<T> {
    from_value(value_from_reader(rdr, options)?)
}

/// Decodes a byte slice and unpacks the root into any deserializable type.
pub fn from_slice<T: de::DeserializeOwned>(data: &[u8], options: DeOptions) -> Result<T> {
    from_value(value_from_slice(data, options)?)
}
