// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! Projections from a decode result to a single expected type.
//!
//! Each helper takes the `Result` of a decode call and is error
//! transparent: an `Err` input is returned unchanged, so
//! `helpers::int(value_from_slice(data, options))` composes without an
//! intermediate check.  A root of the wrong variant yields a
//! [`WrongType`](crate::ErrorCode::WrongType) error.

use std::collections::BTreeMap;
use num_bigint::BigInt;

use crate::error::{Error, ErrorCode, Result};
use crate::value::{HashableValue, Value};

fn wrong_type<T>(requested: &'static str, value: &Value) -> Result<T> {
    Err(Error::Syntax(ErrorCode::WrongType(requested, value.type_name())))
}

/// Projects the root to an `i64`.
pub fn int(result: Result<Value>) -> Result<i64> {
    match result? {
        Value::I64(v) => Ok(v),
        ref other => wrong_type("int", other),
    }
}

/// Projects the root to a `BigInt`.  A normal-sized integer widens.
pub fn big(result: Result<Value>) -> Result<BigInt> {
    match result? {
        Value::Int(v) => Ok(v),
        Value::I64(v) => Ok(BigInt::from(v)),
        ref other => wrong_type("long", other),
    }
}

/// Projects the root to a `bool`.
pub fn boolean(result: Result<Value>) -> Result<bool> {
    match result? {
        Value::Bool(v) => Ok(v),
        ref other => wrong_type("bool", other),
    }
}

/// Projects the root to an `f64`.
pub fn float(result: Result<Value>) -> Result<f64> {
    match result? {
        Value::F64(v) => Ok(v),
        ref other => wrong_type("float", other),
    }
}

/// Projects the root to a `String`.
pub fn text(result: Result<Value>) -> Result<String> {
    match result? {
        Value::String(v) => Ok(v),
        ref other => wrong_type("string", other),
    }
}

/// Projects the root to the items of a list or tuple.
pub fn list_or_tuple(result: Result<Value>) -> Result<Vec<Value>> {
    match result? {
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Tuple(items) => Ok(items.as_ref().clone()),
        ref other => wrong_type("list or tuple", other),
    }
}

/// Projects the root to the entries of a dict.
pub fn dict(result: Result<Value>) -> Result<BTreeMap<HashableValue, Value>> {
    match result? {
        Value::Dict(entries) => Ok(entries.borrow().clone()),
        ref other => wrong_type("dict", other),
    }
}

/// Projects the root to the entries of a dict whose keys are all text.
pub fn dict_text(result: Result<Value>) -> Result<BTreeMap<String, Value>> {
    let entries = dict(result)?;
    let mut result = BTreeMap::new();
    for (key, value) in entries {
        match key {
            HashableValue::String(key) => {
                result.insert(key, value);
            }
            other => return Err(Error::Syntax(
                ErrorCode::WrongType("dict with text keys", other.to_value().type_name()))),
        }
    }
    Ok(result)
}
