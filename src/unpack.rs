// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! # The structural unpacker
//!
//! Projects a decoded [`Value`] tree onto a caller-supplied typed
//! destination through serde.  The projection is strict by default:
//! integers widen with overflow checks, floats accept only floats, text
//! accepts only text.  For struct destinations a source key matches a field
//! by its serde-level name (so `#[serde(rename = "...")]` names the source
//! key explicitly), verbatim, or with the field name's first character
//! ASCII-uppercased — in that order.
//!
//! Two switches control struct behavior: `allow_missing_fields` (default
//! true) tolerates destination fields the source does not mention, and
//! `allow_mismatched_fields` (default false) tolerates source keys that
//! have no destination field or whose value will not unpack.  Skipping a
//! mismatched value works by removing the offending entry from the (shared)
//! source dict and re-running the projection, so the source tree passed to
//! the unpacker is consumed conceptually, not borrowed.
//!
//! Self-referential sources combined with a struct destination are not
//! detected; that is the caller's concern.

use std::collections::BTreeMap;
use std::fmt;
use std::result::Result as StdResult;
use std::vec;
use num_bigint::BigInt;
use num_traits::ToPrimitive;
use serde::de::{self, IntoDeserializer};
use serde::forward_to_deserialize_any;
use serde::Deserializer;

use crate::error::{Error, ErrorCode, Result};
use crate::value::{HashableValue, Value};

/// Options for projecting a decoded value onto a typed destination.
#[derive(Clone, Debug)]
pub struct Unpacker {
    allow_missing_fields: bool,
    allow_mismatched_fields: bool,
}

impl Default for Unpacker {
    fn default() -> Unpacker {
        Unpacker { allow_missing_fields: true, allow_mismatched_fields: false }
    }
}

impl Unpacker {
    pub fn new() -> Unpacker {
        Default::default()
    }

    /// When false, every destination field must be named by a source key.
    /// When true (the default), absent fields fall through to serde's
    /// `Option`/`default` handling.
    pub fn allow_missing_fields(mut self, allow: bool) -> Unpacker {
        self.allow_missing_fields = allow;
        self
    }

    /// When true, source keys without a destination field, and source
    /// values the destination field cannot hold, are dropped instead of
    /// failing the projection.
    pub fn allow_mismatched_fields(mut self, allow: bool) -> Unpacker {
        self.allow_mismatched_fields = allow;
        self
    }

    /// Projects a decode result onto `T`.  An `Err` input passes through
    /// unchanged, so `unpack(value_from_slice(..))` composes without an
    /// intermediate check.
    pub fn unpack<T: de::DeserializeOwned>(&self, result: Result<Value>) -> Result<T> {
        let value = result?;
        loop {
            match T::deserialize(ValueDeserializer { value: value.clone(), opts: self }) {
                Err(Error::Syntax(ErrorCode::MismatchedField(path, cause)))
                    if self.allow_mismatched_fields =>
                {
                    // Drop the offending entry and run the projection again.
                    // Every pass removes one entry, so this terminates.  If
                    // the exact entry cannot be reached (it sits inside a
                    // sequence, say), dropping the whole top-level field
                    // matches skipping it.
                    let removed = remove_entry(&value, &path)
                        || (path.len() > 1 && remove_entry(&value, &path[..1]));
                    if !removed {
                        return Err(Error::Syntax(ErrorCode::MismatchedField(path, cause)));
                    }
                }
                other => return other,
            }
        }
    }
}

/// Projects a value onto `T` with default options.
pub fn from_value<T: de::DeserializeOwned>(value: Value) -> Result<T> {
    Unpacker::new().unpack(Ok(value))
}

/// Starts an unpacking chain that assigns into `dest`:
/// `unpack_into(&mut dest).from(value_from_slice(data, options))`.
pub fn unpack_into<T: de::DeserializeOwned>(dest: &mut T) -> UnpackInto<'_, T> {
    UnpackInto { dest, options: Unpacker::new() }
}

/// The destination half of [`unpack_into`].
pub struct UnpackInto<'a, T> {
    dest: &'a mut T,
    options: Unpacker,
}

impl<'a, T: de::DeserializeOwned> UnpackInto<'a, T> {
    pub fn allow_missing_fields(mut self, allow: bool) -> Self {
        self.options = self.options.allow_missing_fields(allow);
        self
    }

    pub fn allow_mismatched_fields(mut self, allow: bool) -> Self {
        self.options = self.options.allow_mismatched_fields(allow);
        self
    }

    /// Consumes a decode result and assigns the projection into the
    /// destination.  An `Err` input passes through unchanged.
    pub fn from(self, result: Result<Value>) -> Result<()> {
        *self.dest = self.options.unpack(result)?;
        Ok(())
    }
}

/// Removes the dict entry named by a source-key path.  Returns false if the
/// path cannot be walked to a removable entry.
fn remove_entry(value: &Value, path: &[String]) -> bool {
    let (last, walk) = match path.split_last() {
        Some(split) => split,
        None => return false,
    };
    let mut current = value.clone();
    for key in walk {
        let next = match current {
            Value::Dict(ref entries) =>
                entries.borrow().get(&HashableValue::String(key.clone())).cloned(),
            _ => None,
        };
        match next {
            Some(value) => current = value,
            None => return false,
        }
    }
    match current {
        Value::Dict(ref entries) =>
            entries.borrow_mut().remove(&HashableValue::String(last.clone())).is_some(),
        _ => false,
    }
}

fn wrong_type(requested: &'static str, got: &'static str) -> Error {
    Error::Syntax(ErrorCode::WrongType(requested, got))
}

fn lower_first(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_ascii_lowercase().to_string() + chars.as_str(),
        None => String::new(),
    }
}

/// Wraps a failure in struct-field position with the source key, building
/// the key path outward so the offending entry stays addressable.
fn prepend_field(key: String, err: Error) -> Error {
    match err {
        Error::Syntax(ErrorCode::MismatchedField(mut path, cause)) => {
            path.insert(0, key);
            Error::Syntax(ErrorCode::MismatchedField(path, cause))
        }
        err => Error::Syntax(ErrorCode::MismatchedField(vec![key], err.to_string())),
    }
}

struct ValueDeserializer<'o> {
    value: Value,
    opts: &'o Unpacker,
}

macro_rules! deserialize_integer {
    ($method:ident, $visit:ident, $ty:ty, $to_prim:ident) => {
        fn $method<V>(self, visitor: V) -> Result<V::Value>
            where V: de::Visitor<'de>
        {
            match self.value {
                Value::I64(v) => match <$ty>::try_from(v) {
                    Ok(v) => visitor.$visit(v),
                    Err(_) => Err(Error::Syntax(
                        ErrorCode::Overflow(v.to_string(), stringify!($ty)))),
                },
                Value::Int(ref v) => match v.$to_prim() {
                    Some(v) => visitor.$visit(v),
                    None => Err(Error::Syntax(
                        ErrorCode::Overflow(v.to_string(), stringify!($ty)))),
                },
                ref other => Err(wrong_type(stringify!($ty), other.type_name())),
            }
        }
    }
}

impl<'de, 'o> de::Deserializer<'de> for ValueDeserializer<'o> {
    type Error = Error;

    fn deserialize_any<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        let opts = self.opts;
        match self.value {
            Value::None => visitor.visit_unit(),
            Value::Bool(b) => visitor.visit_bool(b),
            Value::I64(v) => visitor.visit_i64(v),
            Value::Int(ref v) => {
                if let Some(v) = v.to_i64() {
                    visitor.visit_i64(v)
                } else if let Some(v) = v.to_u64() {
                    visitor.visit_u64(v)
                } else if let Some(v) = v.to_i128() {
                    visitor.visit_i128(v)
                } else if let Some(v) = v.to_u128() {
                    visitor.visit_u128(v)
                } else {
                    Err(de::Error::custom("integer too large"))
                }
            }
            Value::F64(v) => visitor.visit_f64(v),
            Value::String(s) => visitor.visit_string(s),
            value @ (Value::List(_) | Value::Tuple(_) | Value::Set(_)) =>
                ValueDeserializer { value, opts }.deserialize_seq(visitor),
            value @ Value::Dict(_) =>
                ValueDeserializer { value, opts }.deserialize_map(visitor),
            ref other => Err(wrong_type("value", other.type_name())),
        }
    }

    deserialize_integer!(deserialize_i8, visit_i8, i8, to_i8);
    deserialize_integer!(deserialize_i16, visit_i16, i16, to_i16);
    deserialize_integer!(deserialize_i32, visit_i32, i32, to_i32);
    deserialize_integer!(deserialize_i64, visit_i64, i64, to_i64);
    deserialize_integer!(deserialize_i128, visit_i128, i128, to_i128);
    deserialize_integer!(deserialize_u8, visit_u8, u8, to_u8);
    deserialize_integer!(deserialize_u16, visit_u16, u16, to_u16);
    deserialize_integer!(deserialize_u32, visit_u32, u32, to_u32);
    deserialize_integer!(deserialize_u64, visit_u64, u64, to_u64);
    deserialize_integer!(deserialize_u128, visit_u128, u128, to_u128);

    fn deserialize_f32<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        // Integers are not promoted to floats.
        match self.value {
            Value::F64(v) => visitor.visit_f32(v as f32),
            ref other => Err(wrong_type("f32", other.type_name())),
        }
    }

    fn deserialize_f64<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        match self.value {
            Value::F64(v) => visitor.visit_f64(v),
            ref other => Err(wrong_type("f64", other.type_name())),
        }
    }

    fn deserialize_bool<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        match self.value {
            Value::Bool(b) => visitor.visit_bool(b),
            ref other => Err(wrong_type("bool", other.type_name())),
        }
    }

    fn deserialize_str<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        match self.value {
            Value::String(s) => visitor.visit_string(s),
            ref other => Err(wrong_type("string", other.type_name())),
        }
    }

    fn deserialize_string<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        self.deserialize_str(visitor)
    }

    fn deserialize_option<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        match self.value {
            Value::None => visitor.visit_none(),
            _ => visitor.visit_some(self),
        }
    }

    fn deserialize_newtype_struct<V>(self, _name: &'static str, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        visitor.visit_newtype_struct(self)
    }

    fn deserialize_seq<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        let opts = self.opts;
        let items: Vec<Value> = match self.value {
            Value::List(items) => items.borrow().clone(),
            Value::Tuple(items) => items.as_ref().clone(),
            Value::Set(members) =>
                members.borrow().iter().cloned().map(HashableValue::to_value).collect(),
            ref other => return Err(wrong_type("sequence", other.type_name())),
        };
        visitor.visit_seq(SeqDeserializer { iter: items.into_iter(), opts })
    }

    fn deserialize_tuple<V>(self, _len: usize, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_tuple_struct<V>(self, _name: &'static str, _len: usize,
                                   visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        self.deserialize_seq(visitor)
    }

    fn deserialize_map<V>(self, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        let opts = self.opts;
        let entries: Vec<(HashableValue, Value)> = match self.value {
            Value::Dict(entries) =>
                entries.borrow().iter().map(|(k, v)| (k.clone(), v.clone())).collect(),
            ref other => return Err(wrong_type("dict", other.type_name())),
        };
        visitor.visit_map(MapDeserializer { iter: entries.into_iter(), value: None, opts })
    }

    fn deserialize_struct<V>(self, _name: &'static str, fields: &'static [&'static str],
                             visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        let opts = self.opts;
        let dict = match self.value {
            Value::Dict(entries) => entries,
            ref other => return Err(wrong_type("dict", other.type_name())),
        };
        let mut matched: Vec<(String, &'static str, Value)> = Vec::new();
        for (key, value) in dict.borrow().iter() {
            let key = match key {
                HashableValue::String(s) => s.clone(),
                other => return Err(de::Error::custom(
                    format!("non-text key {} cannot match a field", other))),
            };
            let field = fields.iter().find(|&&f| f == key).copied()
                .or_else(|| {
                    let lowered = lower_first(&key);
                    fields.iter().find(|&&f| f == lowered).copied()
                });
            match field {
                Some(field) => matched.push((key, field, value.clone())),
                None if opts.allow_mismatched_fields => {}
                None => return Err(Error::Syntax(ErrorCode::MismatchedField(
                    vec![key], "no matching field in destination".into()))),
            }
        }
        if !opts.allow_missing_fields {
            for &field in fields {
                if !matched.iter().any(|(_, matched_field, _)| *matched_field == field) {
                    return Err(Error::Syntax(ErrorCode::MissingField(field.into())));
                }
            }
        }
        visitor.visit_map(StructDeserializer { iter: matched.into_iter(), pending: None, opts })
    }

    fn deserialize_enum<V>(self, _name: &'static str, _variants: &'static [&'static str],
                           visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        // Variants decode from their pickled tuple form `(name, [data])`,
        // or a plain string for unit variants.
        let opts = self.opts;
        match self.value {
            Value::String(variant) =>
                visitor.visit_enum(EnumDeserializer { variant, value: None, opts }),
            Value::Tuple(items) => {
                let mut iter = items.as_ref().clone().into_iter();
                let variant = match iter.next() {
                    Some(Value::String(s)) => s,
                    _ => return Err(de::Error::custom(
                        "enum tuple must start with the variant name")),
                };
                let value = iter.next();
                if iter.next().is_some() {
                    return Err(de::Error::custom("enum tuple has too many items"));
                }
                visitor.visit_enum(EnumDeserializer { variant, value, opts })
            }
            ref other => Err(wrong_type("enum representation", other.type_name())),
        }
    }

    forward_to_deserialize_any! {
        char bytes byte_buf unit unit_struct identifier ignored_any
    }
}

struct SeqDeserializer<'o> {
    iter: vec::IntoIter<Value>,
    opts: &'o Unpacker,
}

impl<'de, 'o> de::SeqAccess<'de> for SeqDeserializer<'o> {
    type Error = Error;

    fn next_element_seed<S>(&mut self, seed: S) -> Result<Option<S::Value>>
        where S: de::DeserializeSeed<'de>
    {
        match self.iter.next() {
            Some(value) =>
                seed.deserialize(ValueDeserializer { value, opts: self.opts }).map(Some),
            None => Ok(None),
        }
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct MapDeserializer<'o> {
    iter: vec::IntoIter<(HashableValue, Value)>,
    value: Option<Value>,
    opts: &'o Unpacker,
}

impl<'de, 'o> de::MapAccess<'de> for MapDeserializer<'o> {
    type Error = Error;

    fn next_key_seed<S>(&mut self, seed: S) -> Result<Option<S::Value>>
        where S: de::DeserializeSeed<'de>
    {
        match self.iter.next() {
            Some((key, value)) => {
                self.value = Some(value);
                seed.deserialize(ValueDeserializer { value: key.to_value(), opts: self.opts })
                    .map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<S>(&mut self, seed: S) -> Result<S::Value>
        where S: de::DeserializeSeed<'de>
    {
        let value = self.value.take().unwrap();
        seed.deserialize(ValueDeserializer { value, opts: self.opts })
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct StructDeserializer<'o> {
    iter: vec::IntoIter<(String, &'static str, Value)>,
    pending: Option<(String, Value)>,
    opts: &'o Unpacker,
}

impl<'de, 'o> de::MapAccess<'de> for StructDeserializer<'o> {
    type Error = Error;

    fn next_key_seed<S>(&mut self, seed: S) -> Result<Option<S::Value>>
        where S: de::DeserializeSeed<'de>
    {
        match self.iter.next() {
            Some((key, field, value)) => {
                self.pending = Some((key, value));
                seed.deserialize(de::value::BorrowedStrDeserializer::new(field)).map(Some)
            }
            None => Ok(None),
        }
    }

    fn next_value_seed<S>(&mut self, seed: S) -> Result<S::Value>
        where S: de::DeserializeSeed<'de>
    {
        let (key, value) = self.pending.take().unwrap();
        seed.deserialize(ValueDeserializer { value, opts: self.opts })
            .map_err(|err| prepend_field(key, err))
    }

    fn size_hint(&self) -> Option<usize> {
        Some(self.iter.len())
    }
}

struct EnumDeserializer<'o> {
    variant: String,
    value: Option<Value>,
    opts: &'o Unpacker,
}

impl<'de, 'o> de::EnumAccess<'de> for EnumDeserializer<'o> {
    type Error = Error;
    type Variant = VariantDeserializer<'o>;

    fn variant_seed<S>(self, seed: S) -> Result<(S::Value, Self::Variant)>
        where S: de::DeserializeSeed<'de>
    {
        let variant = seed.deserialize(IntoDeserializer::<Error>::into_deserializer(self.variant))?;
        Ok((variant, VariantDeserializer { value: self.value, opts: self.opts }))
    }
}

struct VariantDeserializer<'o> {
    value: Option<Value>,
    opts: &'o Unpacker,
}

impl<'de, 'o> de::VariantAccess<'de> for VariantDeserializer<'o> {
    type Error = Error;

    fn unit_variant(self) -> Result<()> {
        match self.value {
            None => Ok(()),
            Some(_) => Err(de::Error::custom("unexpected data for unit variant")),
        }
    }

    fn newtype_variant_seed<S>(self, seed: S) -> Result<S::Value>
        where S: de::DeserializeSeed<'de>
    {
        match self.value {
            Some(value) => seed.deserialize(ValueDeserializer { value, opts: self.opts }),
            None => Err(de::Error::custom("missing data for newtype variant")),
        }
    }

    fn tuple_variant<V>(self, _len: usize, visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        match self.value {
            Some(value) =>
                ValueDeserializer { value, opts: self.opts }.deserialize_seq(visitor),
            None => Err(de::Error::custom("missing data for tuple variant")),
        }
    }

    fn struct_variant<V>(self, fields: &'static [&'static str], visitor: V) -> Result<V::Value>
        where V: de::Visitor<'de>
    {
        match self.value {
            Some(value) =>
                ValueDeserializer { value, opts: self.opts }
                    .deserialize_struct("", fields, visitor),
            None => Err(de::Error::custom("missing data for struct variant")),
        }
    }
}

impl<'de> de::Deserialize<'de> for Value {
    fn deserialize<D>(deser: D) -> StdResult<Value, D::Error>
        where D: de::Deserializer<'de>
    {
        struct ValueVisitor;

        impl<'de> de::Visitor<'de> for ValueVisitor {
            type Value = Value;

            fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
                fmt.write_str("a pickleable value")
            }

            fn visit_bool<E>(self, value: bool) -> StdResult<Value, E> {
                Ok(Value::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> StdResult<Value, E> {
                Ok(Value::I64(value))
            }

            fn visit_u64<E>(self, value: u64) -> StdResult<Value, E> {
                match i64::try_from(value) {
                    Ok(value) => Ok(Value::I64(value)),
                    Err(_) => Ok(Value::Int(BigInt::from(value))),
                }
            }

            fn visit_i128<E>(self, value: i128) -> StdResult<Value, E> {
                match i64::try_from(value) {
                    Ok(value) => Ok(Value::I64(value)),
                    Err(_) => Ok(Value::Int(BigInt::from(value))),
                }
            }

            fn visit_u128<E>(self, value: u128) -> StdResult<Value, E> {
                match i64::try_from(value) {
                    Ok(value) => Ok(Value::I64(value)),
                    Err(_) => Ok(Value::Int(BigInt::from(value))),
                }
            }

            fn visit_f64<E>(self, value: f64) -> StdResult<Value, E> {
                Ok(Value::F64(value))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> StdResult<Value, E> {
                Ok(Value::String(value.into()))
            }

            fn visit_string<E>(self, value: String) -> StdResult<Value, E> {
                Ok(Value::String(value))
            }

            fn visit_none<E>(self) -> StdResult<Value, E> {
                Ok(Value::None)
            }

            fn visit_some<D>(self, deser: D) -> StdResult<Value, D::Error>
                where D: de::Deserializer<'de>
            {
                de::Deserialize::deserialize(deser)
            }

            fn visit_unit<E>(self) -> StdResult<Value, E> {
                Ok(Value::None)
            }

            fn visit_seq<A>(self, mut access: A) -> StdResult<Value, A::Error>
                where A: de::SeqAccess<'de>
            {
                let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(item) = access.next_element()? {
                    items.push(item);
                }
                Ok(Value::list(items))
            }

            fn visit_map<A>(self, mut access: A) -> StdResult<Value, A::Error>
                where A: de::MapAccess<'de>
            {
                let mut entries = BTreeMap::new();
                while let Some((key, value)) = access.next_entry::<HashableValue, Value>()? {
                    entries.insert(key, value);
                }
                Ok(Value::dict(entries))
            }
        }

        deser.deserialize_any(ValueVisitor)
    }
}

impl<'de> de::Deserialize<'de> for HashableValue {
    fn deserialize<D>(deser: D) -> StdResult<HashableValue, D::Error>
        where D: de::Deserializer<'de>
    {
        struct HashableVisitor;

        impl<'de> de::Visitor<'de> for HashableVisitor {
            type Value = HashableValue;

            fn expecting(&self, fmt: &mut fmt::Formatter) -> fmt::Result {
                fmt.write_str("a hashable pickleable value")
            }

            fn visit_bool<E>(self, value: bool) -> StdResult<HashableValue, E> {
                Ok(HashableValue::Bool(value))
            }

            fn visit_i64<E>(self, value: i64) -> StdResult<HashableValue, E> {
                Ok(HashableValue::I64(value))
            }

            fn visit_u64<E>(self, value: u64) -> StdResult<HashableValue, E> {
                match i64::try_from(value) {
                    Ok(value) => Ok(HashableValue::I64(value)),
                    Err(_) => Ok(HashableValue::Int(BigInt::from(value))),
                }
            }

            fn visit_i128<E>(self, value: i128) -> StdResult<HashableValue, E> {
                match i64::try_from(value) {
                    Ok(value) => Ok(HashableValue::I64(value)),
                    Err(_) => Ok(HashableValue::Int(BigInt::from(value))),
                }
            }

            fn visit_u128<E>(self, value: u128) -> StdResult<HashableValue, E> {
                match i64::try_from(value) {
                    Ok(value) => Ok(HashableValue::I64(value)),
                    Err(_) => Ok(HashableValue::Int(BigInt::from(value))),
                }
            }

            fn visit_f64<E>(self, value: f64) -> StdResult<HashableValue, E> {
                Ok(HashableValue::F64(value))
            }

            fn visit_str<E: de::Error>(self, value: &str) -> StdResult<HashableValue, E> {
                Ok(HashableValue::String(value.into()))
            }

            fn visit_string<E>(self, value: String) -> StdResult<HashableValue, E> {
                Ok(HashableValue::String(value))
            }

            fn visit_none<E>(self) -> StdResult<HashableValue, E> {
                Ok(HashableValue::None)
            }

            fn visit_unit<E>(self) -> StdResult<HashableValue, E> {
                Ok(HashableValue::None)
            }

            fn visit_seq<A>(self, mut access: A) -> StdResult<HashableValue, A::Error>
                where A: de::SeqAccess<'de>
            {
                let mut items = Vec::with_capacity(access.size_hint().unwrap_or(0));
                while let Some(item) = access.next_element()? {
                    items.push(item);
                }
                Ok(HashableValue::Tuple(items.into_boxed_slice()))
            }
        }

        deser.deserialize_any(HashableVisitor)
    }
}
