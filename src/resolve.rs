// Copyright (c) 2024 The brine developers.  Licensed under the Apache License,
// Version 2.0 <LICENSE-APACHE or http://www.apache.org/licenses/LICENSE-2.0>
// or the MIT license <LICENSE-MIT or http://opensource.org/licenses/MIT>, at
// your option. This file may not be copied, modified, or distributed except
// according to those terms.

//! The resolver hook for the GLOBAL and REDUCE opcodes.

use std::collections::BTreeSet;
use crate::value::Value;

/// Turns a `module.name` constructor reference into a value.
///
/// This is the only extension point for foreign constructors.  The GLOBAL
/// opcode consults the resolver with `args` of `None`; REDUCE consults it
/// again with the argument value popped from the stack (usually a tuple).
/// Returning `None` marks the constructor as unresolvable, which the machine
/// reports as a decode error.
pub trait Resolver {
    fn resolve(&self, module: &str, name: &str, args: Option<Value>) -> Option<Value>;
}

/// The default resolver.  It recognizes exactly one constructor,
/// `__builtin__.set`: without arguments it answers with the constructor
/// reference itself (to be applied by REDUCE), and with an argument tuple
/// holding a single list or tuple of hashable members it builds the set.
#[derive(Clone, Copy, Default, Debug)]
pub struct BuiltinResolver;

impl Resolver for BuiltinResolver {
    fn resolve(&self, module: &str, name: &str, args: Option<Value>) -> Option<Value> {
        if module != "__builtin__" || name != "set" {
            return None;
        }
        match args {
            None => Some(Value::global(module.into(), name.into())),
            Some(args) => set_from_args(args),
        }
    }
}

fn set_from_args(args: Value) -> Option<Value> {
    let members = match args {
        Value::Tuple(items) => match items.as_slice() {
            [Value::List(members)] => members.borrow().clone(),
            [Value::Tuple(members)] => members.as_slice().to_vec(),
            _ => return None,
        },
        _ => return None,
    };
    let set: Option<BTreeSet<_>> = members.into_iter().map(Value::to_hashable).collect();
    set.map(Value::set)
}
