// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Python values as decoded from a pickle stream.

use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::rc::Rc;
use num_bigint::BigInt;

/// A value decoded from a pickle stream.
///
/// Scalars compare by value.  Aggregates (`List`, `Tuple`, `Dict`, `Set`)
/// are handles with shared ownership: cloning a `Value` clones the handle,
/// and a mutation performed through one handle (as the APPEND and SETITEM
/// opcode families do after a container was memoized) is observable through
/// every other handle.  This is what makes shared and self-referential
/// structure representable.  Note that a self-referential value makes naive
/// recursive traversal (including `PartialEq` and `Display`) diverge;
/// callers traversing unknown data should track visited handles.
#[derive(Clone, Debug)]
pub enum Value {
    /// None
    None,
    /// Boolean
    Bool(bool),
    /// Normal-sized integer
    I64(i64),
    /// Big integer
    Int(BigInt),
    /// Float
    F64(f64),
    /// Unicode string
    String(String),
    /// List
    List(Rc<RefCell<Vec<Value>>>),
    /// Tuple
    Tuple(Rc<Vec<Value>>),
    /// Dictionary
    Dict(Rc<RefCell<BTreeMap<HashableValue, Value>>>),
    /// Set
    Set(Rc<RefCell<BTreeSet<HashableValue>>>),
    /// The stack sentinel delimiting a run of items for the bulk aggregation
    /// opcodes.  Only ever lives on the machine stack; a decode result never
    /// contains it.
    Mark,
    /// A constructor reference produced by the GLOBAL opcode and consumed by
    /// REDUCE.  Only ever lives on the machine stack.
    Global(Rc<GlobalRef>),
}

/// A `module.name` constructor reference.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct GlobalRef {
    pub module: String,
    pub name: String,
}

/// The subset of values usable as dict keys and set members.
#[derive(Clone, Debug)]
pub enum HashableValue {
    /// None
    None,
    /// Boolean
    Bool(bool),
    /// Normal-sized integer
    I64(i64),
    /// Big integer
    Int(BigInt),
    /// Float
    F64(f64),
    /// Unicode string
    String(String),
    /// Tuple
    Tuple(Box<[HashableValue]>),
}

impl Value {
    /// Creates a fresh list value from the given items.
    pub fn list(items: Vec<Value>) -> Value {
        Value::List(Rc::new(RefCell::new(items)))
    }

    /// Creates a fresh tuple value from the given items.
    pub fn tuple(items: Vec<Value>) -> Value {
        Value::Tuple(Rc::new(items))
    }

    /// Creates a fresh dict value from the given entries.
    pub fn dict(entries: BTreeMap<HashableValue, Value>) -> Value {
        Value::Dict(Rc::new(RefCell::new(entries)))
    }

    /// Creates a fresh set value from the given members.
    pub fn set(members: BTreeSet<HashableValue>) -> Value {
        Value::Set(Rc::new(RefCell::new(members)))
    }

    pub(crate) fn global(module: String, name: String) -> Value {
        Value::Global(Rc::new(GlobalRef { module, name }))
    }

    /// A shallow description of the value's type, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match *self {
            Value::None => "none",
            Value::Bool(_) => "bool",
            Value::I64(_) => "int",
            Value::Int(_) => "long",
            Value::F64(_) => "float",
            Value::String(_) => "string",
            Value::List(_) => "list",
            Value::Tuple(_) => "tuple",
            Value::Dict(_) => "dict",
            Value::Set(_) => "set",
            Value::Mark => "mark",
            Value::Global(_) => "global",
        }
    }

    /// True for the stack-only variants that must never appear in a result.
    pub(crate) fn is_stack_only(&self) -> bool {
        matches!(*self, Value::Mark | Value::Global(_))
    }

    /// Converts the value into its hashable counterpart, if it has one.
    /// Aggregates other than tuples, and the stack-only variants, have none.
    pub fn to_hashable(self) -> Option<HashableValue> {
        match self {
            Value::None => Some(HashableValue::None),
            Value::Bool(b) => Some(HashableValue::Bool(b)),
            Value::I64(i) => Some(HashableValue::I64(i)),
            Value::Int(i) => Some(HashableValue::Int(i)),
            Value::F64(f) => Some(HashableValue::F64(f)),
            Value::String(s) => Some(HashableValue::String(s)),
            Value::Tuple(items) => {
                let hashed: Option<Vec<_>> =
                    items.iter().cloned().map(Value::to_hashable).collect();
                hashed.map(|v| HashableValue::Tuple(v.into_boxed_slice()))
            }
            _ => None,
        }
    }
}

impl HashableValue {
    /// Converts back into a plain `Value`.
    pub fn to_value(self) -> Value {
        match self {
            HashableValue::None => Value::None,
            HashableValue::Bool(b) => Value::Bool(b),
            HashableValue::I64(i) => Value::I64(i),
            HashableValue::Int(i) => Value::Int(i),
            HashableValue::F64(f) => Value::F64(f),
            HashableValue::String(s) => Value::String(s),
            HashableValue::Tuple(items) => {
                Value::tuple(items.into_vec().into_iter().map(HashableValue::to_value).collect())
            }
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::None, Value::None) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::I64(a), Value::I64(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            // Python's `int` and `long` compare equal when the magnitudes do.
            (Value::I64(a), Value::Int(b)) | (Value::Int(b), Value::I64(a)) =>
                BigInt::from(*a) == *b,
            (Value::F64(a), Value::F64(b)) => a == b || (a.is_nan() && b.is_nan()),
            (Value::String(a), Value::String(b)) => a == b,
            (Value::List(a), Value::List(b)) =>
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b) || a == b,
            (Value::Dict(a), Value::Dict(b)) =>
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Set(a), Value::Set(b)) =>
                Rc::ptr_eq(a, b) || *a.borrow() == *b.borrow(),
            (Value::Mark, Value::Mark) => true,
            (Value::Global(a), Value::Global(b)) => a == b,
            _ => false,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            Value::None => fmt.write_str("None"),
            Value::Bool(b) => fmt.write_str(if b { "True" } else { "False" }),
            Value::I64(i) => write!(fmt, "{}", i),
            Value::Int(ref i) => write!(fmt, "{}", i),
            Value::F64(f) => write!(fmt, "{}", f),
            Value::String(ref s) => write!(fmt, "{:?}", s),
            Value::List(ref items) => {
                fmt.write_str("[")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 { fmt.write_str(", ")?; }
                    item.fmt(fmt)?;
                }
                fmt.write_str("]")
            }
            Value::Tuple(ref items) => {
                fmt.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { fmt.write_str(", ")?; }
                    item.fmt(fmt)?;
                }
                if items.len() == 1 { fmt.write_str(",")?; }
                fmt.write_str(")")
            }
            Value::Dict(ref entries) => {
                fmt.write_str("{")?;
                for (i, (key, value)) in entries.borrow().iter().enumerate() {
                    if i > 0 { fmt.write_str(", ")?; }
                    write!(fmt, "{}: {}", key, value)?;
                }
                fmt.write_str("}")
            }
            Value::Set(ref members) => {
                fmt.write_str("set([")?;
                for (i, member) in members.borrow().iter().enumerate() {
                    if i > 0 { fmt.write_str(", ")?; }
                    member.fmt(fmt)?;
                }
                fmt.write_str("])")
            }
            Value::Mark => fmt.write_str("<mark>"),
            Value::Global(ref g) => write!(fmt, "<{}.{}>", g.module, g.name),
        }
    }
}

impl fmt::Display for HashableValue {
    fn fmt(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
        match *self {
            HashableValue::None => fmt.write_str("None"),
            HashableValue::Bool(b) => fmt.write_str(if b { "True" } else { "False" }),
            HashableValue::I64(i) => write!(fmt, "{}", i),
            HashableValue::Int(ref i) => write!(fmt, "{}", i),
            HashableValue::F64(f) => write!(fmt, "{}", f),
            HashableValue::String(ref s) => write!(fmt, "{:?}", s),
            HashableValue::Tuple(ref items) => {
                fmt.write_str("(")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 { fmt.write_str(", ")?; }
                    item.fmt(fmt)?;
                }
                if items.len() == 1 { fmt.write_str(",")?; }
                fmt.write_str(")")
            }
        }
    }
}

impl PartialEq for HashableValue {
    fn eq(&self, other: &HashableValue) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for HashableValue {}

impl PartialOrd for HashableValue {
    fn partial_cmp(&self, other: &HashableValue) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Implement a (more or less) consistent ordering for HashableValues
/// so that they can be added to dictionaries and sets.
///
/// This is done similar to Python 2's ordering of different types.
impl Ord for HashableValue {
    fn cmp(&self, other: &HashableValue) -> Ordering {
        use self::HashableValue::*;
        match *self {
            None => match *other {
                None => Ordering::Equal,
                _    => Ordering::Less,
            },
            Bool(b) => match *other {
                Bool(b2) => b.cmp(&b2),
                None     => Ordering::Greater,
                _        => Ordering::Less,
            },
            I64(i) => match *other {
                None        => Ordering::Greater,
                Bool(b)     => i.cmp(&(b as i64)),
                I64(i2)     => i.cmp(&i2),
                Int(ref bi) => BigInt::from(i).cmp(bi),
                F64(f)      => i.cmp(&(f as i64)),
                _           => Ordering::Less,
            },
            Int(ref bi) => match *other {
                None         => Ordering::Greater,
                Bool(b)      => bi.cmp(&BigInt::from(b as i64)),
                I64(i)       => bi.cmp(&BigInt::from(i)),
                Int(ref bi2) => bi.cmp(bi2),
                F64(f)       => bi.cmp(&BigInt::from(f as i64)),
                _            => Ordering::Less,
            },
            F64(f) => match *other {
                None        => Ordering::Greater,
                Bool(b)     => float_ord(f, b as i64 as f64),
                I64(i)      => float_ord(f, i as f64),
                Int(ref bi) => BigInt::from(f as i64).cmp(bi),
                F64(f2)     => float_ord(f, f2),
                _           => Ordering::Less,
            },
            String(ref s) => match *other {
                Tuple(_)       => Ordering::Less,
                String(ref s2) => s.cmp(s2),
                _              => Ordering::Greater,
            },
            Tuple(ref t) => match *other {
                Tuple(ref t2) => t.cmp(t2),
                _             => Ordering::Greater,
            },
        }
    }
}

/// A reasonable total ordering for floats.
fn float_ord(f: f64, g: f64) -> Ordering {
    match f.partial_cmp(&g) {
        Some(o) => o,
        None    => Ordering::Less,
    }
}
