use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use peek_runtime::Value;

use super::{arity, case_equals, display, inspect};
use crate::ast::Block;
use crate::interpreter::{no_method, raise, Flow, Interpreter};
use crate::sandbox::{self, ReceiverKind};

/// Methods every value answers, plus the `nil`/`true`/`false` specifics.
pub(crate) fn call(
    interp: &mut Interpreter<'_>,
    receiver: &Value,
    name: &str,
    args: &[Value],
    block: Option<&Block>,
) -> Flow<Value> {
    if let Some(value) = call_singleton(receiver, name, args)? {
        return Ok(value);
    }
    let value = match name {
        "==" | "!=" => {
            arity(args, 1..=1)?;
            Value::Bool(receiver.equals(&args[0]) == (name == "=="))
        }
        "equal?" => {
            arity(args, 1..=1)?;
            Value::Bool(match (receiver.identity(), args[0].identity()) {
                (Some(a), Some(b)) => a == b,
                (None, None) => receiver.equals(&args[0]),
                _ => false,
            })
        }
        "eql?" => {
            arity(args, 1..=1)?;
            Value::Bool(receiver.type_name() == args[0].type_name() && receiver.equals(&args[0]))
        }
        "!" => Value::Bool(!receiver.truthy()),
        "===" => {
            arity(args, 1..=1)?;
            Value::Bool(case_equals(interp, receiver, &args[0]))
        }
        "=~" => Value::Nil,
        "hash" => Value::Int(hash_of(receiver)?),
        "class" => Value::class(receiver.type_name()),
        "inspect" => Value::str(inspect(receiver)?),
        "to_s" => match receiver {
            Value::Object(heap) => Value::str(format!("#<{}>", heap.read().class)),
            other => Value::str(display(other)?),
        },
        "nil?" => Value::Bool(receiver.is_nil()),
        "is_a?" | "kind_of?" | "instance_of?" => {
            arity(args, 1..=1)?;
            let Value::Class(class) = &args[0] else {
                return Err(raise("TypeError", "class or module required"));
            };
            Value::Bool(if name == "instance_of?" {
                receiver.type_name() == **class
            } else {
                is_kind_of(interp, receiver, class)
            })
        }
        "respond_to?" => {
            arity(args, 1..=2)?;
            let method = method_name(&args[0])?;
            Value::Bool(responds_to(interp, receiver, &method))
        }
        "frozen?" => Value::Bool(!matches!(
            receiver,
            Value::Str(_) | Value::Array(_) | Value::Hash(_) | Value::Object(_)
        )),
        "instance_variables" => match receiver {
            Value::Object(heap) => Value::array(
                heap.read()
                    .fields
                    .iter()
                    .map(|(field, _)| Value::symbol(format!("@{field}")))
                    .collect(),
            ),
            _ => Value::array(Vec::new()),
        },
        "instance_variable_get" | "instance_variable_defined?" => {
            arity(args, 1..=1)?;
            let ivar = method_name(&args[0])?;
            let Some(field) = ivar.strip_prefix('@').filter(|f| !f.is_empty()) else {
                return Err(raise(
                    "NameError",
                    format!("'{ivar}' is not allowed as an instance variable name"),
                ));
            };
            let found = match receiver {
                Value::Object(heap) => heap.read().field(field).cloned(),
                _ => None,
            };
            if name == "instance_variable_get" {
                found.unwrap_or(Value::Nil)
            } else {
                Value::Bool(found.is_some())
            }
        }
        "object_id" => Value::Int(object_id(receiver)?),
        "itself" => receiver.clone(),
        "then" | "yield_self" => match block {
            Some(block) => interp.yield_block(block, std::slice::from_ref(receiver))?,
            None => receiver.clone(),
        },
        _ => return Err(no_method(receiver, name)),
    };
    Ok(value)
}

/// Conversions and logical operators of `nil`, `true` and `false`.
fn call_singleton(receiver: &Value, name: &str, args: &[Value]) -> Flow<Option<Value>> {
    let value = match (receiver, name) {
        (Value::Nil, "to_a") => Value::array(Vec::new()),
        (Value::Nil, "to_s") => Value::str(""),
        (Value::Nil, "to_i") => Value::Int(0),
        (Value::Nil, "to_f") => Value::Float(0.0),
        (Value::Nil, "to_h") => Value::hash(Vec::new()),
        (Value::Nil | Value::Bool(_), "&" | "|" | "^") => {
            arity(args, 1..=1)?;
            let lhs = receiver.truthy();
            let rhs = args[0].truthy();
            Value::Bool(match name {
                "&" => lhs && rhs,
                "|" => lhs || rhs,
                _ => lhs != rhs,
            })
        }
        _ => return Ok(None),
    };
    Ok(Some(value))
}

fn method_name(value: &Value) -> Flow<String> {
    match value {
        Value::Symbol(name) | Value::Str(name) => Ok(name.to_string()),
        other => {
            let rendered = inspect(other)?;
            Err(raise(
                "TypeError",
                format!("{rendered} is not a symbol nor a string"),
            ))
        }
    }
}

fn responds_to(interp: &Interpreter<'_>, receiver: &Value, method: &str) -> bool {
    if sandbox::is_meta_programming(method) {
        return false;
    }
    match receiver {
        Value::Object(heap) => {
            let instance = heap.read();
            interp.registry().find_method(&instance.class, method).is_some()
                || instance.field(method).is_some()
                || sandbox::is_call_allowed("Object", method, ReceiverKind::Instance)
        }
        Value::Class(class) => {
            interp.registry().find_singleton_method(class, method).is_some()
                || sandbox::is_call_allowed(class, method, ReceiverKind::Type)
                || sandbox::is_call_allowed("Class", method, ReceiverKind::Instance)
        }
        other => sandbox::is_call_allowed(&other.type_name(), method, ReceiverKind::Instance),
    }
}

fn hash_of(value: &Value) -> Flow<i64> {
    if let Some(id) = value.identity() {
        return Ok(id.get() as i64);
    }
    // 1 == 1.0, so integral floats hash like the integer.
    let canonical = match value {
        Value::Float(f) if f.fract() == 0.0 && f.abs() < i64::MAX as f64 => Value::Int(*f as i64),
        other => other.clone(),
    };
    let mut hasher = DefaultHasher::new();
    canonical.type_name().hash(&mut hasher);
    inspect(&canonical)?.hash(&mut hasher);
    Ok(hasher.finish() as i64)
}

fn object_id(value: &Value) -> Flow<i64> {
    Ok(match value {
        Value::Nil => 8,
        Value::Bool(true) => 20,
        Value::Bool(false) => 0,
        Value::Int(n) => n.wrapping_mul(2).wrapping_add(1),
        other => match other.identity() {
            Some(id) => (id.get() as i64).wrapping_mul(8),
            None => hash_of(other)? & !7,
        },
    })
}

/// `value.is_a?(class)` for host and builtin values.
pub(super) fn is_kind_of(interp: &Interpreter<'_>, value: &Value, class: &str) -> bool {
    let type_name = value.type_name();
    if type_name == class || matches!(class, "Object" | "Kernel" | "BasicObject") {
        return true;
    }
    match value {
        Value::Object(_) => interp.registry().is_subclass_of(&type_name, class),
        Value::Class(_) => class == "Module",
        _ => sandbox::builtin_ancestors(&type_name).contains(&class),
    }
}

fn builtin_superclass(class: &str) -> Option<&'static str> {
    match class {
        "BasicObject" => None,
        "Object" => Some("BasicObject"),
        "Integer" | "Float" => Some("Numeric"),
        "Class" => Some("Module"),
        _ => Some("Object"),
    }
}

/// Methods answered by class values, e.g. `Point.name` or `Integer === x`.
/// Anything else is handled like an ordinary object.
pub(crate) fn call_on_class(
    interp: &mut Interpreter<'_>,
    class: &str,
    name: &str,
    args: &[Value],
) -> Flow<Value> {
    let value = match name {
        "name" | "to_s" | "inspect" => Value::str(class),
        "===" => {
            arity(args, 1..=1)?;
            Value::Bool(is_kind_of(interp, &args[0], class))
        }
        "superclass" => {
            let parent = match interp.registry().class(class) {
                Some(def) => Some(def.superclass.as_deref().unwrap_or("Object").to_owned()),
                None => builtin_superclass(class).map(str::to_owned),
            };
            parent.map_or(Value::Nil, Value::class)
        }
        _ => return call(interp, &Value::class(class), name, args, None),
    };
    Ok(value)
}
