use std::fmt;
use std::rc::Rc;

use crate::branch::Branch;
use crate::chain::Chain;
use crate::join::Join;
use crate::leaf::Leaf;
use crate::Result;

/// A tree backed by its own branches.
#[derive(Debug)]
pub struct PlainTree {
    name: String,
    title: String,
    entries: i64,
    branches: Vec<Rc<Branch>>,
}

impl PlainTree {
    pub(crate) fn new(name: &str, title: &str, entries: i64, branches: Vec<Rc<Branch>>) -> Self {
        Self {
            name: name.to_string(),
            title: title.to_string(),
            entries,
            branches,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn entries(&self) -> i64 {
        self.entries
    }

    pub fn branches(&self) -> &[Rc<Branch>] {
        &self.branches
    }

    pub fn branch(&self, name: &str) -> Option<&Rc<Branch>> {
        self.branches.iter().find(|b| b.name() == name)
    }

    pub fn leaves(&self) -> Vec<LeafRef> {
        self.branches.iter().flat_map(LeafRef::all).collect()
    }

    pub fn leaf(&self, name: &str) -> Option<LeafRef> {
        self.branches.iter().find_map(|b| {
            b.leaf(name).map(|(index, _)| LeafRef {
                branch: b.clone(),
                index,
            })
        })
    }

    /// Bytes written to the file for all branches, before and after
    /// compression.
    pub fn tot_bytes(&self) -> i64 {
        self.branches.iter().map(|b| b.tot_bytes()).sum()
    }

    pub fn zip_bytes(&self) -> i64 {
        self.branches.iter().map(|b| b.zip_bytes()).sum()
    }
}

/// A leaf addressed through the branch carrying it.
#[derive(Clone)]
pub struct LeafRef {
    branch: Rc<Branch>,
    index: usize,
}

impl LeafRef {
    fn all(branch: &Rc<Branch>) -> impl Iterator<Item = LeafRef> + '_ {
        (0..branch.leaves().len()).map(|index| LeafRef {
            branch: branch.clone(),
            index,
        })
    }

    pub fn branch(&self) -> &Rc<Branch> {
        &self.branch
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn leaf(&self) -> &Leaf {
        &self.branch.leaves()[self.index]
    }

    pub fn name(&self) -> &str {
        self.leaf().name()
    }
}

impl fmt::Debug for LeafRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LeafRef")
            .field("branch", &self.branch.name())
            .field("leaf", &self.name())
            .finish()
    }
}

/// Any readable tree.
///
/// For a chain, name, title and the branch and leaf catalogs are those of
/// the currently active constituent; callers crossing a constituent
/// boundary must look branches up again.
#[derive(Debug, Clone)]
pub enum Tree {
    Plain(Rc<PlainTree>),
    Chain(Rc<Chain>),
    Join(Rc<Join>),
}

impl Tree {
    /// Concatenates `trees` end to end.
    pub fn chain(trees: Vec<Tree>) -> Tree {
        Tree::Chain(Rc::new(Chain::new(trees)))
    }

    /// Merges `trees` column-wise.
    pub fn join(trees: Vec<Tree>) -> Result<Tree> {
        Ok(Tree::Join(Rc::new(Join::new(trees)?)))
    }

    pub fn name(&self) -> String {
        match self {
            Tree::Plain(t) => t.name().to_string(),
            Tree::Chain(c) => c.name(),
            Tree::Join(j) => j.name().to_string(),
        }
    }

    pub fn title(&self) -> String {
        match self {
            Tree::Plain(t) => t.title().to_string(),
            Tree::Chain(c) => c.title(),
            Tree::Join(j) => j.title().to_string(),
        }
    }

    pub fn entries(&self) -> i64 {
        match self {
            Tree::Plain(t) => t.entries(),
            Tree::Chain(c) => c.entries(),
            Tree::Join(j) => j.entries(),
        }
    }

    pub fn branches(&self) -> Vec<Rc<Branch>> {
        match self {
            Tree::Plain(t) => t.branches().to_vec(),
            Tree::Chain(c) => c.current().map(|t| t.branches()).unwrap_or_default(),
            Tree::Join(j) => j.branches().to_vec(),
        }
    }

    pub fn branch(&self, name: &str) -> Option<Rc<Branch>> {
        match self {
            Tree::Plain(t) => t.branch(name).cloned(),
            Tree::Chain(c) => c.current()?.branch(name),
            Tree::Join(j) => j.branch(name).cloned(),
        }
    }

    pub fn leaves(&self) -> Vec<LeafRef> {
        match self {
            Tree::Plain(t) => t.leaves(),
            Tree::Chain(c) => c.current().map(|t| t.leaves()).unwrap_or_default(),
            Tree::Join(j) => j.leaves().to_vec(),
        }
    }

    pub fn leaf(&self, name: &str) -> Option<LeafRef> {
        match self {
            Tree::Plain(t) => t.leaf(name),
            Tree::Chain(c) => c.current()?.leaf(name),
            Tree::Join(j) => j.leaf(name).cloned(),
        }
    }
}
