//! Column-wise merge of trees with aligned entries.

use std::collections::HashMap;
use std::rc::Rc;

use crate::branch::Branch;
use crate::tree::{LeafRef, Tree};
use crate::{Error, Result};

/// Trees sharing entry numbers, read as one tree carrying all their
/// branches.
///
/// Entry counts and branch-name disjointness are checked once, at
/// construction.
#[derive(Debug)]
pub struct Join {
    trees: Vec<Tree>,
    name: String,
    title: String,
    branches: Vec<Rc<Branch>>,
    bmap: HashMap<String, Rc<Branch>>,
    leaves: Vec<LeafRef>,
    lmap: HashMap<String, LeafRef>,
}

impl Join {
    pub fn new(trees: Vec<Tree>) -> Result<Self> {
        let Some(first) = trees.first() else {
            return Err(Error::NoTreesToJoin);
        };
        if let Some(Tree::Chain(c)) = trees.iter().find(|t| matches!(t, Tree::Chain(_))) {
            return Err(Error::JoinChain(c.name()));
        }

        let want = first.entries();
        for t in &trees[1..] {
            if t.entries() != want {
                return Err(Error::JoinEntries {
                    tree: t.name(),
                    got: t.entries(),
                    want,
                });
            }
        }

        let catalogs: Vec<Vec<Rc<Branch>>> = trees.iter().map(Tree::branches).collect();
        for (i, bi) in catalogs.iter().enumerate() {
            for (j, bj) in catalogs.iter().enumerate().skip(i + 1) {
                if let Some(b) = bi.iter().find(|b| bj.iter().any(|o| o.name() == b.name())) {
                    return Err(Error::JoinCollision {
                        first: trees[i].name(),
                        second: trees[j].name(),
                        branch: b.name().to_string(),
                    });
                }
            }
        }

        let branches: Vec<Rc<Branch>> = catalogs.into_iter().flatten().collect();
        let bmap = branches
            .iter()
            .map(|b| (b.name().to_string(), b.clone()))
            .collect();
        let leaves: Vec<LeafRef> = trees.iter().flat_map(Tree::leaves).collect();
        let mut lmap = HashMap::with_capacity(leaves.len());
        for leaf in &leaves {
            lmap.entry(leaf.name().to_string())
                .or_insert_with(|| leaf.clone());
        }

        let names: Vec<String> = trees.iter().map(Tree::name).collect();
        let titles: Vec<String> = trees.iter().map(Tree::title).collect();
        Ok(Self {
            name: format!("join_{}", names.join("_")),
            title: titles.join(", "),
            trees,
            branches,
            bmap,
            leaves,
            lmap,
        })
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    /// Entries of the first constituent, equal to every other's.
    pub fn entries(&self) -> i64 {
        self.trees[0].entries()
    }

    pub fn branches(&self) -> &[Rc<Branch>] {
        &self.branches
    }

    pub fn branch(&self, name: &str) -> Option<&Rc<Branch>> {
        self.bmap.get(name)
    }

    pub fn leaves(&self) -> &[LeafRef] {
        &self.leaves
    }

    pub fn leaf(&self, name: &str) -> Option<&LeafRef> {
        self.lmap.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::PlainTree;
    use pretty_assertions::assert_eq;

    fn tree(name: &str, entries: i64) -> Tree {
        Tree::Plain(Rc::new(PlainTree::new(name, &format!("{name}-title"), entries, Vec::new())))
    }

    #[test]
    fn identity_is_synthesized() {
        let j = Join::new(vec![tree("a", 3), tree("b", 3), tree("c", 3)]).unwrap();
        assert_eq!(j.name(), "join_a_b_c");
        assert_eq!(j.title(), "a-title, b-title, c-title");
        assert_eq!(j.entries(), 3);
    }

    #[test]
    fn construction_errors() {
        assert_eq!(
            Join::new(Vec::new()).unwrap_err().to_string(),
            "no trees to join"
        );
        assert_eq!(
            Join::new(vec![tree("a", 3), tree("b", 4)])
                .unwrap_err()
                .to_string(),
            "invalid number of entries in tree b (got=4, want=3)"
        );
        let chain = Tree::chain(vec![tree("a", 3)]);
        assert!(matches!(
            Join::new(vec![tree("b", 3), chain]),
            Err(Error::JoinChain(_))
        ));
    }
}
