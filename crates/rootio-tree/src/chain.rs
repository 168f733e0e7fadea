//! Sequential concatenation of trees.

use std::cell::Cell;

use log::debug;

use crate::tree::Tree;
use crate::{Error, Result};

#[derive(Debug, Clone, Copy)]
struct Cursor {
    /// Active constituent; -1 before first use, `trees.len()` once exhausted.
    cur: i64,
    off: i64,
    tot: i64,
}

/// Trees read one after the other, entries numbered contiguously.
///
/// `offs[i]` counts the entries of the trees before `i` and `tots[i]` those
/// up to and including `i`.
#[derive(Debug)]
pub struct Chain {
    trees: Vec<Tree>,
    offs: Vec<i64>,
    tots: Vec<i64>,
    cursor: Cell<Cursor>,
}

impl Chain {
    /// Nested chains are flattened into their constituents.
    pub fn new(trees: Vec<Tree>) -> Self {
        let trees: Vec<Tree> = trees
            .into_iter()
            .flat_map(|t| match t {
                Tree::Chain(c) => c.trees.clone(),
                t => vec![t],
            })
            .collect();

        let mut offs = Vec::with_capacity(trees.len());
        let mut tots = Vec::with_capacity(trees.len());
        let mut sum = 0;
        for t in &trees {
            offs.push(sum);
            sum += t.entries();
            tots.push(sum);
        }
        Self {
            trees,
            offs,
            tots,
            cursor: Cell::new(Cursor {
                cur: -1,
                off: 0,
                tot: 0,
            }),
        }
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    /// Entries before each constituent.
    pub fn offs(&self) -> &[i64] {
        &self.offs
    }

    /// Entries through each constituent, inclusive.
    pub fn tots(&self) -> &[i64] {
        &self.tots
    }

    /// Total entries, summed on every call.
    pub fn entries(&self) -> i64 {
        self.trees.iter().map(Tree::entries).sum()
    }

    /// Index of the active constituent, -1 before first use.
    pub fn cur(&self) -> i64 {
        self.cursor.get().cur
    }

    /// First global entry of the active constituent.
    pub fn off(&self) -> i64 {
        self.cursor.get().off
    }

    /// One past the last global entry of the active constituent.
    pub fn tot(&self) -> i64 {
        self.cursor.get().tot
    }

    /// Activates constituent `i`. Past the end the chain is exhausted and
    /// `None` is returned.
    pub fn load_tree(&self, i: usize) -> Option<&Tree> {
        match self.trees.get(i) {
            Some(t) => {
                let (off, tot) = (self.offs[i], self.tots[i]);
                self.cursor.set(Cursor {
                    cur: i as i64,
                    off,
                    tot,
                });
                debug!("chain: tree {i} ({}) active for entries [{off}, {tot})", t.name());
                Some(t)
            }
            None => {
                let total = self.tots.last().copied().unwrap_or(0);
                self.cursor.set(Cursor {
                    cur: self.trees.len() as i64,
                    off: total,
                    tot: total,
                });
                None
            }
        }
    }

    /// The active constituent, loading the first one on first use.
    pub fn current(&self) -> Option<&Tree> {
        let cur = self.cursor.get().cur;
        if cur < 0 {
            return self.load_tree(0);
        }
        self.trees.get(cur as usize)
    }

    /// Constituent holding global `entry`; empty trees never match.
    pub fn find_tree(&self, entry: i64) -> Option<usize> {
        self.offs
            .iter()
            .zip(&self.tots)
            .position(|(&off, &tot)| off <= entry && entry < tot)
    }

    /// Name of the active constituent, empty once exhausted.
    pub fn name(&self) -> String {
        self.current().map(Tree::name).unwrap_or_default()
    }

    pub fn title(&self) -> String {
        self.current().map(Tree::title).unwrap_or_default()
    }
}

/// One constituent's share of a global entry range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChainSlice {
    pub index: usize,
    /// Local range inside the constituent.
    pub beg: i64,
    pub end: i64,
    /// Global number of the constituent's first entry.
    pub offset: i64,
}

/// A chain restricted to the global half-open range `[beg, end)`.
#[derive(Debug)]
pub struct RChain<'a> {
    chain: &'a Chain,
    beg: i64,
    end: i64,
    ibeg: usize,
    iend: usize,
}

impl<'a> RChain<'a> {
    pub fn new(chain: &'a Chain, beg: i64, end: i64) -> Result<Self> {
        let ibeg = chain
            .tots
            .iter()
            .position(|&tot| tot > beg)
            .ok_or_else(|| Error::Range {
                beg,
                end,
                reason: "could not find first tree".into(),
            })?;
        let iend = chain
            .tots
            .iter()
            .position(|&tot| tot >= end)
            .map_or(chain.trees.len(), |i| i + 1);
        if iend <= ibeg {
            return Err(Error::Range {
                beg,
                end,
                reason: "could not find last tree".into(),
            });
        }
        Ok(Self {
            chain,
            beg,
            end,
            ibeg,
            iend,
        })
    }

    /// Constituent index range `[ibeg, iend)` covering the entry range.
    pub fn trees(&self) -> (usize, usize) {
        (self.ibeg, self.iend)
    }

    /// Per-constituent local ranges, skipping constituents left empty.
    pub fn slices(&self) -> impl Iterator<Item = ChainSlice> + '_ {
        (self.ibeg..self.iend).filter_map(move |i| {
            let off = self.chain.offs[i];
            let beg = (self.beg - off).max(0);
            let end = (self.end - off).min(self.chain.tots[i] - off);
            (beg < end).then_some(ChainSlice {
                index: i,
                beg,
                end,
                offset: off,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tree::PlainTree;
    use pretty_assertions::assert_eq;
    use std::rc::Rc;

    fn tree(name: &str, entries: i64) -> Tree {
        Tree::Plain(Rc::new(PlainTree::new(name, "title", entries, Vec::new())))
    }

    fn chain(entries: &[i64]) -> Chain {
        Chain::new(
            entries
                .iter()
                .enumerate()
                .map(|(i, &n)| tree(&format!("t{i}"), n))
                .collect(),
        )
    }

    #[test]
    fn prefix_sums() {
        let c = chain(&[4, 0, 3, 5]);
        assert_eq!(c.offs(), &[0, 4, 4, 7]);
        assert_eq!(c.tots(), &[4, 4, 7, 12]);
        assert_eq!(c.entries(), 12);
        assert_eq!(c.find_tree(4), Some(2));
        assert_eq!(c.find_tree(11), Some(3));
        assert_eq!(c.find_tree(12), None);
    }

    #[test]
    fn cursor_loads_lazily_and_exhausts() {
        let c = chain(&[2, 3]);
        assert_eq!(c.cur(), -1);
        assert_eq!(c.name(), "t0");
        assert_eq!(c.cur(), 0);

        assert!(c.load_tree(1).is_some());
        assert_eq!((c.off(), c.tot()), (2, 5));

        assert!(c.load_tree(2).is_none());
        assert_eq!((c.cur(), c.off(), c.tot()), (2, 5, 5));
        assert_eq!(c.name(), "");
        assert_eq!(c.title(), "");
    }

    #[test]
    fn nested_chains_are_flattened() {
        let inner = Tree::Chain(Rc::new(chain(&[1, 2])));
        let c = Chain::new(vec![inner, tree("last", 3)]);
        assert_eq!(c.trees().len(), 3);
        assert_eq!(c.tots(), &[1, 3, 6]);
    }

    #[test]
    fn bounded_ranges_map_to_local_slices() {
        let c = chain(&[4, 4, 4, 4]);
        let r = RChain::new(&c, 3, 9).unwrap();
        assert_eq!(r.trees(), (0, 3));
        let got: Vec<ChainSlice> = r.slices().collect();
        assert_eq!(
            got,
            vec![
                ChainSlice { index: 0, beg: 3, end: 4, offset: 0 },
                ChainSlice { index: 1, beg: 0, end: 4, offset: 4 },
                ChainSlice { index: 2, beg: 0, end: 1, offset: 8 },
            ]
        );

        let r = RChain::new(&c, 4, 8).unwrap();
        assert_eq!(r.trees(), (1, 2));

        // An end past the total runs through the last tree.
        let r = RChain::new(&c, 0, 100).unwrap();
        assert_eq!(r.trees(), (0, 4));
        assert_eq!(r.slices().last().map(|s| s.end), Some(4));

        assert!(RChain::new(&c, 16, 16).is_err());
    }

    #[test]
    fn empty_constituents_yield_no_slice() {
        let c = chain(&[2, 0, 2]);
        let idx: Vec<usize> = RChain::new(&c, 0, 4).unwrap().slices().map(|s| s.index).collect();
        assert_eq!(idx, vec![0, 2]);
    }
}
