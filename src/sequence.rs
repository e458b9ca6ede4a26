//! Coercion of array-like and custom-iterable values into ordered sequences.
//!
//! Used wherever variadic arguments travel as a single value: the super-call
//! forwarding path, the benchmark collaborator, and the seeded accessor
//! methods all accept "something list-shaped" and normalize it here.

use crate::error::{RtErrorKind, RtResult, err};
use crate::value::Value;

/// Convert a value into an ordered sequence.
///
/// - `none` is the empty sequence
/// - lists yield their items in order
/// - strings yield their characters
/// - instances that respond to `toArray` are asked, and the result is coerced
///   in turn
///
/// Anything else is a `TypeError`; there is no silent undefined-filled
/// fallback.
pub fn to_sequence(value: &Value) -> RtResult<Vec<Value>> {
    match value {
        Value::None => Ok(Vec::new()),
        Value::List(items) => Ok(items.borrow().clone()),
        Value::Str(s) => Ok(s.chars().map(|c| Value::str(c.to_string())).collect()),
        Value::Instance(inst) if inst.responds_to("toArray") => {
            let converted = inst.call("toArray", &[])?;
            to_sequence(&converted)
        }
        other => Err(err(
            RtErrorKind::TypeError("sequence"),
            format!("cannot convert {} into a sequence", other.type_name()),
        )),
    }
}
