//! Binding descriptors between caller-owned slots and tree columns.

use crate::tree::Tree;
use crate::value::Slot;

/// Reads one leaf of a branch into a caller-owned slot.
#[derive(Debug, Clone)]
pub struct ReadVar {
    /// Branch name.
    pub name: String,
    /// Leaf name; the branch's single leaf when `None`.
    pub leaf: Option<String>,
    pub value: Slot,
    count: Option<String>,
}

impl ReadVar {
    pub fn new(name: &str, value: Slot) -> Self {
        Self {
            name: name.to_string(),
            leaf: None,
            value,
            count: None,
        }
    }

    pub fn with_leaf(mut self, leaf: &str) -> Self {
        self.leaf = Some(leaf.to_string());
        self
    }

    /// Name of the count leaf sizing this column, known once bound.
    pub fn count(&self) -> Option<&str> {
        self.count.as_deref()
    }

    pub(crate) fn bind(&mut self, leaf: &str, count: Option<&str>) {
        self.leaf = Some(leaf.to_string());
        self.count = count.map(str::to_string);
    }

    /// Whether `name` designates this binding's branch or leaf.
    pub fn matches(&self, name: &str) -> bool {
        self.name == name || self.leaf.as_deref() == Some(name)
    }
}

/// Writes one column from a caller-owned slot.
///
/// `name` follows the dimension grammar: `x`, `arr[3]`, `mat[2][3]`,
/// `sli[n]`. The slot's value fixes the element kind.
#[derive(Debug, Clone)]
pub struct WriteVar {
    pub name: String,
    pub value: Slot,
    /// Count column for slices, when not spelled in `name`.
    pub count: Option<String>,
}

impl WriteVar {
    pub fn new(name: &str, value: Slot) -> Self {
        Self {
            name: name.to_string(),
            value,
            count: None,
        }
    }

    pub fn with_count(mut self, count: &str) -> Self {
        self.count = Some(count.to_string());
        self
    }
}

/// One binding per leaf of `tree`, each with a fresh default-valued slot.
pub fn new_read_vars(tree: &Tree) -> Vec<ReadVar> {
    tree.leaves()
        .iter()
        .map(|lr| {
            let leaf = lr.leaf();
            ReadVar {
                name: lr.branch().name().to_string(),
                leaf: Some(leaf.name().to_string()),
                value: Slot::new(leaf.new_value()),
                count: leaf.count().map(str::to_string),
            }
        })
        .collect()
}
