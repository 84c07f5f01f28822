//! JSON description of a paused program.
//!
//! Used by the CLI and by tests to stand in for a live stack provider:
//!
//! ```json
//! {
//!   "classes": [{ "name": "Point", "methods": { "norm": { "params": [], "body": "@x + @y" } } }],
//!   "globals": { "$requests": 3 },
//!   "frames": [{
//!     "function": "handle",
//!     "location": { "path": "app.rb", "line": 12 },
//!     "locals": { "p": { "$class": "Point", "fields": { "x": 1, "y": 2 } } }
//!   }]
//! }
//! ```
//!
//! Plain JSON maps become hashes with string keys. Tagged maps describe the
//! other value kinds: `$symbol`, `$range`, `$time`, `$regexp` (with optional
//! `options` flags), `$class`, `$class_ref`,
//! `$hash` (entry pairs with arbitrary keys), `$array`, `$opaque`. Any tagged
//! compound may carry `"$id"`; `{"$ref": id}` elsewhere refers back to it,
//! including from inside itself, so shared and cyclic graphs can be expressed.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::{Map, Value as Json};

use crate::frame::{CallStack, Frame, SourceLocation};
use crate::pattern::{Pattern, PatternOptions};
use crate::registry::{ClassDef, ClassRegistry, MethodDef};
use crate::value::{Heap, Instance, IntRange, OpaqueValue, Value};
use crate::RuntimeError;

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct StackFixture {
    #[serde(default)]
    classes: Vec<ClassFixture>,
    #[serde(default)]
    constants: Map<String, Json>,
    #[serde(default)]
    globals: Map<String, Json>,
    #[serde(default)]
    frames: Vec<FrameFixture>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct ClassFixture {
    name: String,
    #[serde(default)]
    superclass: Option<String>,
    #[serde(default)]
    methods: HashMap<String, MethodDef>,
    #[serde(default)]
    singleton_methods: HashMap<String, MethodDef>,
    #[serde(default)]
    constants: Map<String, Json>,
    #[serde(default)]
    class_variables: Map<String, Json>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FrameFixture {
    function: String,
    location: SourceLocation,
    #[serde(default)]
    arguments: Map<String, Json>,
    #[serde(default)]
    locals: Map<String, Json>,
    #[serde(default)]
    receiver: Json,
}

/// Parse a stack fixture document.
pub fn load_call_stack(text: &str) -> Result<CallStack, RuntimeError> {
    let fixture: StackFixture = serde_json::from_str(text)?;
    let mut builder = ValueBuilder::default();

    let mut registry = ClassRegistry::new();
    for class in fixture.classes {
        let mut def = ClassDef::new(class.name);
        def.superclass = class.superclass;
        def.methods = class.methods;
        def.singleton_methods = class.singleton_methods;
        for (name, json) in class.constants {
            def.constants.insert(name, builder.build(&json)?);
        }
        for (name, json) in class.class_variables {
            def.class_variables.insert(name, builder.build(&json)?);
        }
        registry.define_class(def);
    }
    for (name, json) in fixture.constants {
        registry.define_constant(name, builder.build(&json)?);
    }
    for (name, json) in fixture.globals {
        let name = if name.starts_with('$') {
            name
        } else {
            format!("${name}")
        };
        registry.set_global(name, builder.build(&json)?);
    }

    let mut frames = Vec::with_capacity(fixture.frames.len());
    for frame in fixture.frames {
        let mut out = Frame::new(frame.function, frame.location);
        for (name, json) in frame.arguments {
            out.arguments.push((name, builder.build(&json)?));
        }
        for (name, json) in frame.locals {
            out.locals.push((name, builder.build(&json)?));
        }
        out.receiver = builder.build(&frame.receiver)?;
        frames.push(out);
    }

    Ok(CallStack::new(frames, Arc::new(registry)))
}

/// Convert a single JSON value using the fixture conventions.
pub fn value_from_json(json: &Json) -> Result<Value, RuntimeError> {
    ValueBuilder::default().build(json)
}

#[derive(Default)]
struct ValueBuilder {
    ids: HashMap<String, Value>,
}

fn fixture_error(message: impl Into<String>) -> RuntimeError {
    RuntimeError::Fixture(message.into())
}

impl ValueBuilder {
    fn build(&mut self, json: &Json) -> Result<Value, RuntimeError> {
        match json {
            Json::Null => Ok(Value::Nil),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Ok(Value::Int(i)),
                None => n
                    .as_f64()
                    .map(Value::Float)
                    .ok_or_else(|| fixture_error(format!("unsupported number {n}"))),
            },
            Json::String(s) => Ok(Value::str(s.as_str())),
            Json::Array(items) => {
                let items = items
                    .iter()
                    .map(|item| self.build(item))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::array(items))
            }
            Json::Object(map) => self.build_map(map),
        }
    }

    fn build_map(&mut self, map: &Map<String, Json>) -> Result<Value, RuntimeError> {
        if let Some(id) = map.get("$ref") {
            let id = id
                .as_str()
                .ok_or_else(|| fixture_error("`$ref` must be a string"))?;
            return self
                .ids
                .get(id)
                .cloned()
                .ok_or_else(|| fixture_error(format!("unknown `$ref` {id:?}")));
        }
        if let Some(name) = map.get("$symbol") {
            return Ok(Value::symbol(expect_str(name, "$symbol")?));
        }
        if let Some(name) = map.get("$class_ref") {
            return Ok(Value::class(expect_str(name, "$class_ref")?));
        }
        if let Some(secs) = map.get("$time") {
            let secs = secs
                .as_f64()
                .ok_or_else(|| fixture_error("`$time` must be a number"))?;
            return Ok(Value::Time(secs));
        }
        if let Some(source) = map.get("$regexp") {
            let flags = match map.get("options") {
                Some(flags) => expect_str(flags, "options")?,
                None => "",
            };
            let pattern = Pattern::new(expect_str(source, "$regexp")?, PatternOptions::from_flags(flags)?)?;
            return Ok(Value::regexp(pattern));
        }
        if let Some(bounds) = map.get("$range") {
            let bounds = bounds
                .as_array()
                .filter(|bounds| bounds.len() == 2)
                .ok_or_else(|| fixture_error("`$range` must be [start, end]"))?;
            let start = bounds[0].as_i64();
            let end = bounds[1].as_i64();
            let (Some(start), Some(end)) = (start, end) else {
                return Err(fixture_error("`$range` bounds must be integers"));
            };
            let exclusive = map
                .get("exclusive")
                .and_then(Json::as_bool)
                .unwrap_or(false);
            return Ok(Value::Range(IntRange::new(start, end, exclusive)));
        }
        if let Some(type_name) = map.get("$opaque") {
            let type_name = expect_str(type_name, "$opaque")?;
            let rendering = match map.get("inspect_error").and_then(Json::as_str) {
                Some(error) => Err(error.to_owned()),
                None => Ok(map
                    .get("inspect")
                    .and_then(Json::as_str)
                    .map(str::to_owned)
                    .unwrap_or_else(|| format!("#<{type_name}>"))),
            };
            return Ok(Value::Foreign(Arc::new(OpaqueValue::new(
                type_name, rendering,
            ))));
        }

        let id = match map.get("$id") {
            Some(id) => Some(expect_str(id, "$id")?.to_owned()),
            None => None,
        };

        if let Some(items) = map.get("$array") {
            let items = items
                .as_array()
                .ok_or_else(|| fixture_error("`$array` must be an array"))?;
            let heap = Heap::new(Vec::new());
            self.register(id, Value::Array(heap.clone()));
            let built = items
                .iter()
                .map(|item| self.build(item))
                .collect::<Result<Vec<_>, _>>()?;
            *heap.write() = built;
            return Ok(Value::Array(heap));
        }
        if let Some(entries) = map.get("$hash") {
            let entries = entries
                .as_array()
                .ok_or_else(|| fixture_error("`$hash` must be an array of pairs"))?;
            let heap = Heap::new(Vec::new());
            self.register(id, Value::Hash(heap.clone()));
            let mut built = Vec::with_capacity(entries.len());
            for entry in entries {
                let pair = entry
                    .as_array()
                    .filter(|pair| pair.len() == 2)
                    .ok_or_else(|| fixture_error("`$hash` entries must be [key, value]"))?;
                built.push((self.build(&pair[0])?, self.build(&pair[1])?));
            }
            *heap.write() = built;
            return Ok(Value::Hash(heap));
        }
        if let Some(class) = map.get("$class") {
            let class = expect_str(class, "$class")?;
            let heap = Heap::new(Instance::new(class));
            self.register(id, Value::Object(heap.clone()));
            let mut fields = Vec::new();
            if let Some(raw) = map.get("fields") {
                let raw = raw
                    .as_object()
                    .ok_or_else(|| fixture_error("`fields` must be an object"))?;
                for (name, json) in raw {
                    let name = name.strip_prefix('@').unwrap_or(name).to_owned();
                    fields.push((name, self.build(json)?));
                }
            }
            heap.write().fields = fields;
            return Ok(Value::Object(heap));
        }
        if id.is_some() {
            return Err(fixture_error(
                "`$id` requires `$array`, `$hash` or `$class`",
            ));
        }
        if let Some(tag) = map.keys().find(|key| key.starts_with('$')) {
            return Err(fixture_error(format!("unknown tag {tag:?}")));
        }

        let mut entries = Vec::with_capacity(map.len());
        for (key, json) in map {
            entries.push((Value::str(key.as_str()), self.build(json)?));
        }
        Ok(Value::hash(entries))
    }

    fn register(&mut self, id: Option<String>, value: Value) {
        if let Some(id) = id {
            self.ids.insert(id, value);
        }
    }
}

fn expect_str<'a>(json: &'a Json, tag: &str) -> Result<&'a str, RuntimeError> {
    json.as_str()
        .ok_or_else(|| fixture_error(format!("`{tag}` must be a string")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn builds_frames_and_registry() {
        let stack = load_call_stack(
            &json!({
                "classes": [{
                    "name": "Point",
                    "methods": { "sum": { "params": [], "body": "@x + @y" } }
                }],
                "globals": { "requests": 3 },
                "frames": [{
                    "function": "handle",
                    "location": { "path": "app.rb", "line": 12 },
                    "arguments": { "id": 7 },
                    "locals": { "p": { "$class": "Point", "fields": { "@x": 1, "y": 2 } } }
                }]
            })
            .to_string(),
        )
        .unwrap();

        assert_eq!(stack.frames.len(), 1);
        let frame = &stack.frames[0];
        assert_eq!(frame.location, SourceLocation::new("app.rb", 12));
        assert!(matches!(frame.lookup("id"), Some(Value::Int(7))));
        let point = frame.lookup("p").unwrap();
        assert_eq!(point.inspect().unwrap(), "#<Point @x=1, @y=2>");
        assert!(stack.registry.find_method("Point", "sum").is_some());
        assert!(matches!(stack.registry.global("$requests"), Some(Value::Int(3))));
    }

    #[test]
    fn refs_share_identity_and_allow_cycles() {
        let value = value_from_json(&json!({
            "$array": [
                { "$id": "h", "$hash": [[{ "$symbol": "k" }, 1]] },
                { "$ref": "h" },
                { "$id": "self", "$array": [{ "$ref": "self" }] }
            ]
        }))
        .unwrap();

        let Value::Array(heap) = &value else {
            panic!("expected array");
        };
        let items = heap.snapshot();
        assert_eq!(items[0].identity(), items[1].identity());
        assert_eq!(value.inspect().unwrap(), "[{:k=>1}, {:k=>1}, [[...]]]");
    }

    #[test]
    fn tagged_scalars() {
        let value = value_from_json(&json!([
            { "$symbol": "!" },
            { "$range": [1, 5], "exclusive": true },
            { "$time": 0 },
            { "$opaque": "Socket", "inspect_error": "closed" },
            { "$regexp": "^GET /", "options": "i" }
        ]))
        .unwrap();
        let Value::Array(heap) = &value else {
            panic!("expected array");
        };
        let items = heap.snapshot();
        assert_eq!(items[0].inspect().unwrap(), ":!");
        assert_eq!(items[1].inspect().unwrap(), "1...5");
        assert!(matches!(items[2], Value::Time(_)));
        assert!(items[3].inspect().is_err());
        assert_eq!(items[4].inspect().unwrap(), "/^GET \\//i");
    }

    #[test]
    fn invalid_regexps_are_errors() {
        let err = value_from_json(&json!({ "$regexp": "(" })).unwrap_err();
        assert!(matches!(err, RuntimeError::Regexp(_)), "{err:?}");
    }

    #[test]
    fn unknown_refs_are_errors() {
        let err = value_from_json(&json!({ "$ref": "nope" })).unwrap_err();
        assert!(matches!(err, RuntimeError::Fixture(_)), "{err:?}");
    }
}
