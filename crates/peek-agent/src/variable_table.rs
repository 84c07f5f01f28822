use std::collections::HashMap;

use peek_runtime::ObjectId;
use serde::{Serialize, Serializer};

use crate::variable::Variable;

/// Index of the "buffer full" entry every table starts with.
pub const BUFFER_FULL_INDEX: usize = 0;

/// Compound values captured during one breakpoint hit, stored once each and
/// referenced by index from the captured trees.
///
/// Entries are keyed by the identity of the live object they were captured
/// from, so shared and cyclic structures produce a single entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VariableTable {
    variables: Vec<Variable>,
    index_by_id: HashMap<ObjectId, usize>,
}

impl VariableTable {
    pub fn new() -> Self {
        Self {
            variables: vec![Variable::buffer_full()],
            index_by_id: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.variables.len()
    }

    /// `true` when nothing but the buffer-full entry has been added.
    pub fn is_empty(&self) -> bool {
        self.variables.len() <= 1
    }

    pub fn get(&self, index: usize) -> Option<&Variable> {
        self.variables.get(index)
    }

    pub fn variables(&self) -> &[Variable] {
        &self.variables
    }

    pub fn lookup(&self, id: ObjectId) -> Option<usize> {
        self.index_by_id.get(&id).copied()
    }

    /// Append an entry that has no originating identity.
    pub fn push(&mut self, variable: Variable) -> usize {
        self.variables.push(variable);
        self.variables.len() - 1
    }

    /// Claim the slot for `id` before its members are captured, so a cycle
    /// back to `id` finds the index instead of recursing.
    pub fn reserve(&mut self, id: ObjectId) -> usize {
        if let Some(index) = self.lookup(id) {
            return index;
        }
        let index = self.push(Variable::default());
        self.index_by_id.insert(id, index);
        index
    }

    /// Fill a slot returned by [`VariableTable::reserve`].
    pub fn set(&mut self, index: usize, variable: Variable) {
        if let Some(slot) = self.variables.get_mut(index) {
            *slot = variable;
        }
    }
}

impl Default for VariableTable {
    fn default() -> Self {
        Self::new()
    }
}

impl Serialize for VariableTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.variables.serialize(serializer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_the_buffer_full_entry() {
        let table = VariableTable::new();
        assert_eq!(table.len(), 1);
        assert!(table.is_empty());
        assert!(table.get(BUFFER_FULL_INDEX).unwrap().is_error());
    }

    #[test]
    fn reserve_is_idempotent_per_identity() {
        let mut table = VariableTable::new();
        let a = ObjectId::next();
        let b = ObjectId::next();

        let first = table.reserve(a);
        assert_eq!(table.reserve(a), first);
        let second = table.reserve(b);
        assert_ne!(first, second);
        assert_eq!(table.len(), 3);

        table.set(first, Variable::scalar(None, "Array", "[]"));
        assert_eq!(table.get(first).unwrap().value.as_deref(), Some("[]"));
        assert_eq!(table.lookup(b), Some(second));
    }
}
