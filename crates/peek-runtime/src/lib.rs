//! Live program state as seen by the Peek agent.
//!
//! The agent never owns program state; it observes it through [`Value`]s
//! whose compound variants point into shared heap cells, and through the
//! [`Frame`]s a stack provider hands over when a breakpoint location is hit.

mod clock;
mod fixture;
mod frame;
mod inspect;
mod pattern;
mod registry;
mod value;

use thiserror::Error;

pub use clock::{now_secs, utc_datetime};
pub use fixture::{load_call_stack, value_from_json};
pub use frame::{CallStack, Frame, SourceLocation};
pub use pattern::{Pattern, PatternOptions};
pub use registry::{ClassDef, ClassRegistry, MethodDef, MethodLookup, NativeMethod};
pub use value::{
    ForeignValue, Heap, HeapContents, Instance, IntRange, ObjectId, OpaqueValue, Value,
    MAX_VALUE_DEPTH,
};

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("unable to inspect {type_name}: {message}")]
    Inspect { type_name: String, message: String },
    #[error("invalid regexp: {0}")]
    Regexp(String),
    #[error("time {0} is out of range")]
    TimeOutOfRange(f64),
    #[error("invalid stack fixture: {0}")]
    Fixture(String),
    #[error("invalid stack fixture json: {0}")]
    Json(#[from] serde_json::Error),
}
