//! Entry cursor over plain, chained and joined trees.

use std::rc::Rc;

use log::debug;

use crate::branch::{Branch, CountSource};
use crate::chain::Chain;
use crate::tree::Tree;
use crate::value::Slot;
use crate::vars::ReadVar;
use crate::{Error, Result};

#[derive(Debug)]
struct ScanField {
    branch: Rc<Branch>,
    leaf: usize,
    slot: Slot,
    /// Index into the scanner's count fields.
    count: Option<usize>,
    /// Loaded by the count pass already.
    dup: bool,
}

#[derive(Debug)]
struct CountField {
    branch: Rc<Branch>,
    leaf: usize,
    slot: Slot,
}

impl CountField {
    fn source(&self) -> CountSource<'_> {
        CountSource {
            branch: &self.branch,
            leaf: self.leaf,
        }
    }
}

/// Binds `rvars` against `tree`, returning the per-binding fields and the
/// distinct count leaves they depend on.
fn bind(tree: &Tree, rvars: &mut [ReadVar]) -> Result<(Vec<ScanField>, Vec<CountField>)> {
    let tname = tree.name();
    let mut fields = Vec::with_capacity(rvars.len());
    for (i, rv) in rvars.iter_mut().enumerate() {
        let fail = |reason: String| Error::Binding {
            index: i,
            name: rv.name.clone(),
            tree: tname.clone(),
            reason,
        };
        let branch = tree.branch(&rv.name).ok_or_else(|| Error::NoBranch {
            tree: tname.clone(),
            name: rv.name.clone(),
        })?;
        let lname = rv.leaf.as_deref();
        let ileaf = match (lname, branch.leaves()) {
            (None, [_]) => 0,
            (lname, _) => {
                let lname = lname.unwrap_or(&rv.name);
                branch
                    .leaf(lname)
                    .map(|(i, _)| i)
                    .ok_or_else(|| Error::NoLeaf {
                        tree: tname.clone(),
                        name: lname.to_string(),
                    })?
            }
        };
        let leaf = &branch.leaves()[ileaf];
        if let Some(reason) = rv.value.with(|v| {
            (!leaf.accepts(v))
                .then(|| format!("slot holds a {v} value, leaf {:?} is {}", leaf.name(), leaf.layout()))
        }) {
            return Err(fail(reason));
        }
        rv.bind(leaf.name(), leaf.count());
        fields.push(ScanField {
            branch: branch.clone(),
            leaf: ileaf,
            slot: rv.value.clone(),
            count: None,
            dup: false,
        });
    }

    let mut counts: Vec<CountField> = Vec::new();
    for i in 0..fields.len() {
        let Some(cname) = rvars[i].count().map(str::to_string) else {
            continue;
        };
        let pos = counts
            .iter()
            .position(|c| c.branch.leaves()[c.leaf].name() == cname);
        let ci = match pos {
            Some(ci) => ci,
            None => {
                let lr = tree.leaf(&cname).ok_or_else(|| Error::NoLeaf {
                    tree: tname.clone(),
                    name: cname.clone(),
                })?;
                let cleaf = lr.leaf();
                if cleaf.len() != 1 || !cleaf.kind().is_integer() || cleaf.count().is_some() {
                    return Err(Error::Binding {
                        index: i,
                        name: rvars[i].name.clone(),
                        tree: tname.clone(),
                        reason: format!("count leaf {cname:?} is not an integer scalar"),
                    });
                }
                // A count column the caller bound too shares the caller's slot
                // and is loaded by the count pass only.
                let owner = fields
                    .iter_mut()
                    .find(|f| Rc::ptr_eq(&f.branch, lr.branch()) && f.leaf == lr.index());
                let slot = match owner {
                    Some(f) => {
                        f.dup = true;
                        f.slot.clone()
                    }
                    None => Slot::new(cleaf.new_value()),
                };
                counts.push(CountField {
                    branch: lr.branch().clone(),
                    leaf: lr.index(),
                    slot,
                });
                counts.len() - 1
            }
        };
        fields[i].count = Some(ci);
    }
    Ok((fields, counts))
}

/// Iterates the entries of a tree, materializing bound columns into their
/// slots on demand.
///
/// On a chain, crossing into the next constituent rebinds every field to
/// the newly active tree.
#[derive(Debug)]
pub struct Scanner {
    tree: Tree,
    rvars: Vec<ReadVar>,
    /// Iterations done and to do.
    i: i64,
    n: i64,
    cur: i64,
    /// Global window `[off, tot)` of the active chain constituent.
    off: i64,
    tot: i64,
    err: Option<Error>,
    fields: Vec<ScanField>,
    counts: Vec<CountField>,
    closed: bool,
}

impl Scanner {
    /// Binds `rvars` to `tree`. Each binding gets its leaf and count names
    /// filled in.
    pub fn new(tree: &Tree, rvars: &mut [ReadVar]) -> Result<Self> {
        let n = tree.entries();
        let (off, tot, view) = match tree {
            Tree::Chain(c) => {
                let view = c.load_tree(0).cloned();
                (c.off(), c.tot(), view)
            }
            t => (0, n, Some(t.clone())),
        };
        let (fields, counts) = match &view {
            Some(view) => bind(view, rvars)?,
            None if rvars.is_empty() => (Vec::new(), Vec::new()),
            None => {
                return Err(Error::NoBranch {
                    tree: tree.name(),
                    name: rvars[0].name.clone(),
                })
            }
        };
        Ok(Self {
            tree: tree.clone(),
            rvars: rvars.to_vec(),
            i: 0,
            n,
            cur: -1,
            off,
            tot,
            err: None,
            fields,
            counts,
            closed: false,
        })
    }

    fn chain(&self) -> Option<Rc<Chain>> {
        match &self.tree {
            Tree::Chain(c) => Some(c.clone()),
            _ => None,
        }
    }

    /// Activates constituent `i` and rebinds every field to it.
    fn reconnect(&mut self, chain: &Chain, i: usize) -> Result<()> {
        let tree = chain.load_tree(i).cloned();
        self.off = chain.off();
        self.tot = chain.tot();
        let Some(tree) = tree else {
            return Ok(());
        };
        debug!(
            "scanner: reconnecting {} fields to tree {i} ({}), entries [{}, {})",
            self.fields.len(),
            tree.name(),
            self.off,
            self.tot
        );
        let (fields, counts) = bind(&tree, &mut self.rvars)?;
        self.fields = fields;
        self.counts = counts;
        Ok(())
    }

    /// Advances to the next entry. Returns whether an entry was still due;
    /// crossing into the next chain constituent is transparent.
    pub fn next(&mut self) -> bool {
        if self.closed {
            return false;
        }
        let more = self.i < self.n;
        self.cur += 1;
        self.i += 1;
        if more && self.cur >= self.tot && self.err.is_none() {
            if let Some(chain) = self.chain() {
                let res = match chain.find_tree(self.cur) {
                    Some(j) => self.reconnect(&chain, j),
                    None => Err(Error::NoTreeForEntry(self.cur)),
                };
                if let Err(err) = res {
                    self.err = Some(err);
                }
            }
        }
        more
    }

    /// Positions the cursor so that the next call to [`Scanner::next`] lands
    /// on global entry `i`. Seeking to the total entry count exhausts the
    /// cursor. Entries outside `[0, entries]` are refused and leave the
    /// cursor where it was.
    pub fn seek_entry(&mut self, i: i64) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("scanner"));
        }
        if !(0..=self.n).contains(&i) {
            return Err(Error::SeekRange {
                entry: i,
                entries: self.n,
            });
        }
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        if let Some(chain) = self.chain() {
            if i < self.off || i >= self.tot {
                let res = if i == self.n {
                    self.reconnect(&chain, chain.trees().len())
                } else {
                    match chain.find_tree(i) {
                        Some(j) => self.reconnect(&chain, j),
                        None => Err(Error::NoTreeForEntry(i)),
                    }
                };
                if let Err(err) = res {
                    self.err = Some(err.clone());
                    return Err(err);
                }
            }
        }
        self.i = i;
        self.cur = i - 1;
        Ok(())
    }

    /// Global index of the current entry, -1 before the first [`Scanner::next`].
    pub fn entry(&self) -> i64 {
        self.cur
    }

    /// First failure seen, if any.
    pub fn err(&self) -> Option<&Error> {
        self.err.as_ref()
    }

    /// Loads the current entry into the bound slots: count leaves first, then
    /// every other field.
    pub fn scan(&mut self) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("scanner"));
        }
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        let entry = self.cur - self.off;
        let res = self.load(entry);
        if let Err(err) = &res {
            self.err = Some(err.clone());
        }
        res
    }

    fn load(&self, entry: i64) -> Result<()> {
        for c in &self.counts {
            let v = c.branch.read_leaf(entry, c.leaf, None, None)?;
            c.slot.set(v);
        }
        for f in self.fields.iter().filter(|f| !f.dup) {
            let (count, src) = match f.count {
                Some(ci) => {
                    let c = &self.counts[ci];
                    (c.slot.with(|v| v.as_i64()), Some(c.source()))
                }
                None => (None, None),
            };
            let v = f.branch.read_leaf(entry, f.leaf, count, src)?;
            f.slot.set(v);
        }
        Ok(())
    }

    /// Releases the bindings. Further calls report the scanner as closed.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.fields.clear();
        self.counts.clear();
        self.rvars.clear();
    }
}
