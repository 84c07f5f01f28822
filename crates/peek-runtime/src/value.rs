use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};

use crate::pattern::Pattern;

/// Stable identity of a heap-allocated value.
///
/// Identities are process-unique and never reused, so they can key a side
/// table for the lifetime of a capture.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(u64);

static NEXT_OBJECT_ID: AtomicU64 = AtomicU64::new(1);

impl ObjectId {
    pub fn next() -> Self {
        Self(NEXT_OBJECT_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:016x}", self.0)
    }
}

/// Contents of a [`Heap`] cell that can hand their member values over when
/// the last reference to the cell goes away.
pub trait HeapContents {
    fn take_values(&mut self, out: &mut Vec<Value>);
}

impl HeapContents for Vec<Value> {
    fn take_values(&mut self, out: &mut Vec<Value>) {
        out.append(self);
    }
}

impl HeapContents for Vec<(Value, Value)> {
    fn take_values(&mut self, out: &mut Vec<Value>) {
        for (key, value) in self.drain(..) {
            out.push(key);
            out.push(value);
        }
    }
}

impl HeapContents for Instance {
    fn take_values(&mut self, out: &mut Vec<Value>) {
        out.extend(self.fields.drain(..).map(|(_, value)| value));
    }
}

/// A shared, interior-mutable heap cell with identity.
///
/// The host program owns writes; the evaluator only ever takes read locks.
pub struct Heap<T: HeapContents> {
    id: ObjectId,
    cell: Arc<RwLock<T>>,
}

impl<T: HeapContents> Heap<T> {
    pub fn new(value: T) -> Self {
        Self {
            id: ObjectId::next(),
            cell: Arc::new(RwLock::new(value)),
        }
    }

    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn read(&self) -> RwLockReadGuard<'_, T> {
        self.cell.read()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, T> {
        self.cell.write()
    }

    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.cell, &other.cell)
    }

    /// Move the members out if this is the last reference to the cell.
    fn take_if_unique(&mut self, out: &mut Vec<Value>) {
        if let Some(cell) = Arc::get_mut(&mut self.cell) {
            cell.get_mut().take_values(out);
        }
    }
}

// Nested values are released from a worklist rather than through recursive
// drops, so a value built a hundred thousand levels deep cannot exhaust the
// stack of whichever thread lets go of it.
impl<T: HeapContents> Drop for Heap<T> {
    fn drop(&mut self) {
        let mut pending = Vec::new();
        self.take_if_unique(&mut pending);
        while let Some(mut value) = pending.pop() {
            match &mut value {
                Value::Array(heap) => heap.take_if_unique(&mut pending),
                Value::Hash(heap) => heap.take_if_unique(&mut pending),
                Value::Object(heap) => heap.take_if_unique(&mut pending),
                _ => {}
            }
        }
    }
}

impl<T: HeapContents + Clone> Heap<T> {
    /// Copy of the current contents; lets callers iterate without holding the
    /// lock across re-entrant reads.
    pub fn snapshot(&self) -> T {
        self.cell.read().clone()
    }
}

impl<T: HeapContents> Clone for Heap<T> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            cell: Arc::clone(&self.cell),
        }
    }
}

impl<T: HeapContents> fmt::Debug for Heap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Heap").field("id", &self.id).finish_non_exhaustive()
    }
}

/// An instance of a host class.
#[derive(Clone, Debug, Default)]
pub struct Instance {
    pub class: Arc<str>,
    /// Instance variables in definition order, stored without the `@` sigil.
    pub fields: Vec<(String, Value)>,
}

impl Instance {
    pub fn new(class: impl Into<Arc<str>>) -> Self {
        Self {
            class: class.into(),
            fields: Vec::new(),
        }
    }

    pub fn field(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct IntRange {
    pub start: i64,
    pub end: i64,
    pub exclusive: bool,
}

impl IntRange {
    pub fn new(start: i64, end: i64, exclusive: bool) -> Self {
        Self {
            start,
            end,
            exclusive,
        }
    }

    /// Last element included in the range, if any.
    pub fn last_included(&self) -> Option<i64> {
        let last = if self.exclusive {
            self.end.checked_sub(1)?
        } else {
            self.end
        };
        (last >= self.start).then_some(last)
    }

    pub fn len(&self) -> u64 {
        match self.last_included() {
            Some(last) => (last as i128 - self.start as i128 + 1) as u64,
            None => 0,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, value: i64) -> bool {
        value >= self.start && self.last_included().is_some_and(|last| value <= last)
    }

    pub fn iter(&self) -> impl Iterator<Item = i64> {
        let start = self.start;
        let last = self.last_included();
        let mut next = Some(start);
        std::iter::from_fn(move || {
            let current = next?;
            let last = last?;
            if current > last {
                return None;
            }
            next = current.checked_add(1);
            Some(current)
        })
    }
}

/// A value owned by native host code that the agent can only observe through
/// its textual representation.
pub trait ForeignValue: fmt::Debug + Send + Sync {
    fn type_name(&self) -> &str;

    fn identity(&self) -> ObjectId;

    /// Render the value. Host implementations may fail (e.g. a closed stream).
    fn inspect(&self) -> Result<String, String>;
}

/// A [`ForeignValue`] with a fixed rendering, used for fixtures and for hosts
/// that pre-render opaque handles.
#[derive(Debug)]
pub struct OpaqueValue {
    id: ObjectId,
    type_name: String,
    rendering: Result<String, String>,
}

impl OpaqueValue {
    pub fn new(type_name: impl Into<String>, rendering: Result<String, String>) -> Self {
        Self {
            id: ObjectId::next(),
            type_name: type_name.into(),
            rendering,
        }
    }
}

impl ForeignValue for OpaqueValue {
    fn type_name(&self) -> &str {
        &self.type_name
    }

    fn identity(&self) -> ObjectId {
        self.id
    }

    fn inspect(&self) -> Result<String, String> {
        self.rendering.clone()
    }
}

/// A live runtime value.
///
/// Scalars are stored inline; arrays, hashes and instances live in shared
/// [`Heap`] cells so that two references to the same object observe the same
/// identity and contents.
#[derive(Clone, Debug)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Symbol(Arc<str>),
    Range(IntRange),
    /// Seconds since the Unix epoch, UTC.
    Time(f64),
    Regexp(Arc<Pattern>),
    Array(Heap<Vec<Value>>),
    Hash(Heap<Vec<(Value, Value)>>),
    Object(Heap<Instance>),
    /// A class or module referenced by name.
    Class(Arc<str>),
    Foreign(Arc<dyn ForeignValue>),
}

/// Structural comparisons stop descending past this depth.
const MAX_EQUALITY_DEPTH: usize = 32;

/// Deepest container nesting that rendering and flattening descend into, and
/// that an evaluation result may have.
pub const MAX_VALUE_DEPTH: usize = 256;

impl Value {
    pub fn str(value: impl Into<Arc<str>>) -> Self {
        Value::Str(value.into())
    }

    pub fn symbol(name: impl Into<Arc<str>>) -> Self {
        Value::Symbol(name.into())
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Heap::new(items))
    }

    pub fn hash(entries: Vec<(Value, Value)>) -> Self {
        Value::Hash(Heap::new(entries))
    }

    pub fn object(class: impl Into<Arc<str>>, fields: Vec<(String, Value)>) -> Self {
        Value::Object(Heap::new(Instance {
            class: class.into(),
            fields,
        }))
    }

    pub fn regexp(pattern: Pattern) -> Self {
        Value::Regexp(Arc::new(pattern))
    }

    pub fn class(name: impl Into<Arc<str>>) -> Self {
        Value::Class(name.into())
    }

    pub fn type_name(&self) -> String {
        match self {
            Value::Nil => "NilClass".to_owned(),
            Value::Bool(true) => "TrueClass".to_owned(),
            Value::Bool(false) => "FalseClass".to_owned(),
            Value::Int(_) => "Integer".to_owned(),
            Value::Float(_) => "Float".to_owned(),
            Value::Str(_) => "String".to_owned(),
            Value::Symbol(_) => "Symbol".to_owned(),
            Value::Range(_) => "Range".to_owned(),
            Value::Time(_) => "Time".to_owned(),
            Value::Regexp(_) => "Regexp".to_owned(),
            Value::Array(_) => "Array".to_owned(),
            Value::Hash(_) => "Hash".to_owned(),
            Value::Object(heap) => heap.read().class.to_string(),
            Value::Class(_) => "Class".to_owned(),
            Value::Foreign(foreign) => foreign.type_name().to_owned(),
        }
    }

    /// Identity of heap-allocated values; scalars have none.
    pub fn identity(&self) -> Option<ObjectId> {
        match self {
            Value::Array(heap) => Some(heap.id()),
            Value::Hash(heap) => Some(heap.id()),
            Value::Object(heap) => Some(heap.id()),
            Value::Foreign(foreign) => Some(foreign.identity()),
            _ => None,
        }
    }

    pub fn truthy(&self) -> bool {
        !matches!(self, Value::Nil | Value::Bool(false))
    }

    pub fn is_nil(&self) -> bool {
        matches!(self, Value::Nil)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Ruby `==` semantics for the built-in types: numeric values compare
    /// across `Integer`/`Float`, collections compare element-wise, host
    /// objects compare by identity.
    pub fn equals(&self, other: &Value) -> bool {
        self.equals_at(other, 0)
    }

    fn equals_at(&self, other: &Value, depth: usize) -> bool {
        if depth > MAX_EQUALITY_DEPTH {
            return false;
        }
        match (self, other) {
            (Value::Nil, Value::Nil) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a == b,
            (Value::Int(a), Value::Float(b)) | (Value::Float(b), Value::Int(a)) => {
                (*a as f64) == *b
            }
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Symbol(a), Value::Symbol(b)) => a == b,
            (Value::Range(a), Value::Range(b)) => a == b,
            (Value::Time(a), Value::Time(b)) => a == b,
            (Value::Regexp(a), Value::Regexp(b)) => a == b,
            (Value::Class(a), Value::Class(b)) => a == b,
            (Value::Array(a), Value::Array(b)) => {
                if a.ptr_eq(b) {
                    return true;
                }
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len()
                    && a.iter()
                        .zip(b.iter())
                        .all(|(x, y)| x.equals_at(y, depth + 1))
            }
            (Value::Hash(a), Value::Hash(b)) => {
                if a.ptr_eq(b) {
                    return true;
                }
                let (a, b) = (a.snapshot(), b.snapshot());
                a.len() == b.len()
                    && a.iter().all(|(key, value)| {
                        b.iter().any(|(other_key, other_value)| {
                            key.equals_at(other_key, depth + 1)
                                && value.equals_at(other_value, depth + 1)
                        })
                    })
            }
            (Value::Object(a), Value::Object(b)) => a.ptr_eq(b),
            (Value::Foreign(a), Value::Foreign(b)) => a.identity() == b.identity(),
            _ => false,
        }
    }

    /// Whether containers nest more than `limit` levels below this value.
    ///
    /// Walks with an explicit stack; each heap cell is visited once, so
    /// cycles and shared members terminate.
    pub fn nests_deeper_than(&self, limit: usize) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![(self.clone(), 0usize)];
        while let Some((value, depth)) = pending.pop() {
            let members = match &value {
                Value::Array(heap) if visited.insert(heap.id()) => heap.snapshot(),
                Value::Hash(heap) if visited.insert(heap.id()) => {
                    let mut members = Vec::new();
                    heap.snapshot().take_values(&mut members);
                    members
                }
                Value::Object(heap) if visited.insert(heap.id()) => {
                    heap.read().fields.iter().map(|(_, v)| v.clone()).collect()
                }
                _ => continue,
            };
            if depth >= limit && !members.is_empty() {
                return true;
            }
            pending.extend(members.into_iter().map(|member| (member, depth + 1)));
        }
        false
    }

    /// Look up `key` in a hash value.
    pub fn hash_get(&self, key: &Value) -> Option<Value> {
        match self {
            Value::Hash(heap) => heap
                .read()
                .iter()
                .find(|(candidate, _)| candidate.equals(key))
                .map(|(_, value)| value.clone()),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        Value::Float(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.into())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Str(value.into())
    }
}
