use peek_runtime::Value;

use super::collection::enumerable;
use super::{arity, conversion_error, hash_insert, inspect};
use crate::ast::Block;
use crate::interpreter::{raise, Flow, Interpreter};

fn lookup<'e>(entries: &'e [(Value, Value)], key: &Value) -> Option<&'e Value> {
    entries
        .iter()
        .find(|(candidate, _)| candidate.equals(key))
        .map(|(_, value)| value)
}

fn pair(key: &Value, value: &Value) -> Value {
    Value::array(vec![key.clone(), value.clone()])
}

pub(super) fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    entries: &[(Value, Value)],
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    let value = match name {
        "[]" => {
            arity(args, 1..=1)?;
            lookup(entries, &args[0]).cloned().unwrap_or(Value::Nil)
        }
        "fetch" => {
            arity(args, 1..=2)?;
            match (lookup(entries, &args[0]), block, args.get(1)) {
                (Some(value), _, _) => value.clone(),
                (None, Some(block), _) => interp.yield_block(block, &[args[0].clone()])?,
                (None, None, Some(default)) => default.clone(),
                (None, None, None) => {
                    return Err(raise(
                        "KeyError",
                        format!("key not found: {}", inspect(&args[0])?),
                    ))
                }
            }
        }
        "dig" => {
            let Some((first, rest)) = args.split_first() else {
                return arity(args, 1..=usize::MAX).map(|()| Value::Nil);
            };
            let found = lookup(entries, first).cloned().unwrap_or(Value::Nil);
            if rest.is_empty() || found.is_nil() {
                found
            } else {
                interp.dispatch(&found, "dig", rest, None)?
            }
        }
        "key?" | "has_key?" | "include?" | "member?" => {
            arity(args, 1..=1)?;
            Value::Bool(lookup(entries, &args[0]).is_some())
        }
        "value?" | "has_value?" => {
            arity(args, 1..=1)?;
            Value::Bool(entries.iter().any(|(_, value)| value.equals(&args[0])))
        }
        "key" => {
            arity(args, 1..=1)?;
            entries
                .iter()
                .find(|(_, value)| value.equals(&args[0]))
                .map_or(Value::Nil, |(key, _)| key.clone())
        }
        "keys" => Value::array(entries.iter().map(|(key, _)| key.clone()).collect()),
        "values" => Value::array(entries.iter().map(|(_, value)| value.clone()).collect()),
        "length" | "size" => Value::Int(entries.len() as i64),
        "empty?" => Value::Bool(entries.is_empty()),
        "to_a" | "entries" => Value::array(entries.iter().map(|(k, v)| pair(k, v)).collect()),
        "to_h" => receiver.clone(),
        "each" | "each_pair" => {
            if let Some(block) = block {
                for (key, value) in entries {
                    interp.yield_block(block, &[pair(key, value)])?;
                }
            }
            receiver.clone()
        }
        "select" | "filter" | "reject" => {
            let Some(block) = block else {
                return Ok(Value::hash(entries.to_vec()));
            };
            let keep = name != "reject";
            let mut out = Vec::new();
            for (key, value) in entries {
                if interp.yield_block(block, &[pair(key, value)])?.truthy() == keep {
                    out.push((key.clone(), value.clone()));
                }
            }
            Value::hash(out)
        }
        "merge" => {
            let mut merged = entries.to_vec();
            for other in args {
                let Value::Hash(heap) = other else {
                    return Err(conversion_error(other, "Hash"));
                };
                for (key, value) in heap.snapshot() {
                    interp.check()?;
                    hash_insert(&mut merged, key, value);
                }
            }
            Value::hash(merged)
        }
        "invert" => {
            let mut inverted = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                interp.check()?;
                hash_insert(&mut inverted, value.clone(), key.clone());
            }
            Value::hash(inverted)
        }
        "transform_values" => {
            let Some(block) = block else {
                return Ok(Value::hash(entries.to_vec()));
            };
            let mut out = Vec::with_capacity(entries.len());
            for (key, value) in entries {
                out.push((key.clone(), interp.yield_block(block, &[value.clone()])?));
            }
            Value::hash(out)
        }
        _ => {
            let pairs: Vec<Value> = entries.iter().map(|(k, v)| pair(k, v)).collect();
            return enumerable(interp, receiver, &pairs, name, args, block);
        }
    };
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_uses_ruby_equality() {
        let entries = vec![
            (Value::symbol("a"), Value::Int(1)),
            (Value::Int(2), Value::str("two")),
        ];
        assert!(matches!(lookup(&entries, &Value::symbol("a")), Some(Value::Int(1))));
        // Keys compare with `==`, so a float key finds the integer entry.
        assert!(lookup(&entries, &Value::Float(2.0)).is_some());
        assert!(lookup(&entries, &Value::str("a")).is_none());
    }
}
