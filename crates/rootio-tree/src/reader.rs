use std::cell::Cell;
use std::rc::Rc;
use std::sync::Arc;

use log::debug;
use serde::{Deserialize, Serialize};

use crate::chain::{Chain, RChain};
use crate::formula::Formula;
use crate::scanner::Scanner;
use crate::tree::Tree;
use crate::value::Value;
use crate::vars::{new_read_vars, ReadVar};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReaderOptions {
    /// Half-open entry range; an end of -1 reads through the last entry.
    pub range: (i64, i64),
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self { range: (0, -1) }
    }
}

impl ReaderOptions {
    pub fn with_range(mut self, beg: i64, end: i64) -> Self {
        self.range = (beg, end);
        self
    }
}

/// Per-entry context handed to [`Reader::read`] callbacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RCtx {
    /// Global entry number, chain-wide for chains.
    pub entry: i64,
}

type Callback<'a> = dyn FnMut(&RCtx) -> Result<()> + 'a;

/// Range-bounded reader over any tree.
#[derive(Debug)]
pub struct Reader {
    tree: Tree,
    rvars: Vec<ReadVar>,
    beg: i64,
    end: i64,
    scan: Scanner,
    /// Bindings were added since the scanner was built.
    dirty: bool,
    /// Current global entry, shared with formulas.
    entry: Rc<Cell<i64>>,
    /// Global number of this reader's entry 0.
    offset: i64,
    closed: bool,
}

impl Reader {
    pub fn new(tree: &Tree, rvars: Vec<ReadVar>, opts: ReaderOptions) -> Result<Self> {
        let n = tree.entries();
        let (beg, end) = match opts.range {
            (beg, -1) => (beg, n),
            r => r,
        };
        let bad = |reason: String| Err(Error::Range { beg, end, reason });
        if beg < 0 {
            return bad(format!("start={beg} < 0"));
        }
        if beg > end {
            return bad(format!("start={beg} > end={end}"));
        }
        if beg > n {
            return bad(format!("start={beg} > tree-entries={n}"));
        }
        if end > n {
            return bad(format!("end={end} > tree-entries={n}"));
        }

        let mut rvars = rvars;
        let scan = Scanner::new(tree, &mut rvars).map_err(|e| Error::Scanner(Box::new(e)))?;
        Ok(Self {
            tree: tree.clone(),
            rvars,
            beg,
            end,
            scan,
            dirty: false,
            entry: Rc::new(Cell::new(-1)),
            offset: 0,
            closed: false,
        })
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    /// Live bindings, including those added for formulas.
    pub fn read_vars(&self) -> &[ReadVar] {
        &self.rvars
    }

    pub fn range(&self) -> (i64, i64) {
        (self.beg, self.end)
    }

    /// Runs `f` once per entry of the range, after loading the bound slots.
    ///
    /// The first failure, from loading or from `f`, stops the pass.
    pub fn read<F, E>(&mut self, mut f: F) -> Result<()>
    where
        F: FnMut(&RCtx) -> std::result::Result<(), E>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let mut cb = |ctx: &RCtx| {
            f(ctx).map_err(|e| {
                let cause: Box<dyn std::error::Error + Send + Sync> = e.into();
                Error::Process {
                    entry: ctx.entry,
                    cause: Arc::from(cause),
                }
            })
        };
        self.run(&mut cb)
    }

    fn run(&mut self, f: &mut Callback<'_>) -> Result<()> {
        if self.closed {
            return Err(Error::Closed("reader"));
        }
        if self.dirty {
            debug!(
                "reader: rebuilding scanner for {} read-vars",
                self.rvars.len()
            );
            self.scan.close();
            self.scan = Scanner::new(&self.tree, &mut self.rvars)
                .map_err(|e| Error::Scanner(Box::new(e)))?;
            self.dirty = false;
        }
        match &self.tree {
            Tree::Chain(c) => {
                let c = c.clone();
                self.run_chain(&c, f)
            }
            _ => self.run_range(f),
        }
    }

    fn run_range(&mut self, f: &mut Callback<'_>) -> Result<()> {
        let scan = &mut self.scan;
        scan.seek_entry(self.beg)?;
        while scan.next() && scan.entry() < self.end {
            scan.scan()?;
            let entry = scan.entry() + self.offset;
            self.entry.set(entry);
            f(&RCtx { entry })?;
        }
        match scan.err() {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    /// Reads each constituent's share of the range with a bounded reader of
    /// its own, sharing slots and entry numbering with this one.
    fn run_chain(&mut self, chain: &Chain, f: &mut Callback<'_>) -> Result<()> {
        if self.beg == self.end {
            return Ok(());
        }
        let rchain = RChain::new(chain, self.beg, self.end)?;
        for s in rchain.slices() {
            let tree = &chain.trees()[s.index];
            let opts = ReaderOptions::default().with_range(s.beg, s.end);
            let mut sub = Reader::new(tree, self.rvars.clone(), opts)?;
            sub.offset = self.offset + s.offset;
            sub.entry = self.entry.clone();
            let res = sub.run(f);
            sub.close();
            res?;
        }
        Ok(())
    }

    /// Declares a computed column over `names`, binding any column not read
    /// yet. The reader picks the new bindings up on its next pass.
    pub fn formula_func<T, F>(&mut self, names: &[&str], f: F) -> Result<Formula<T>>
    where
        T: Clone + 'static,
        F: Fn(&[Value]) -> T + 'static,
    {
        let mut slots = Vec::with_capacity(names.len());
        let mut added: Vec<ReadVar> = Vec::new();
        let mut missing = Vec::new();
        let mut all: Option<Vec<ReadVar>> = None;

        for &name in names {
            if let Some(rv) = self.rvars.iter().chain(&added).find(|rv| rv.matches(name)) {
                slots.push(rv.value.clone());
                continue;
            }
            let all = all.get_or_insert_with(|| new_read_vars(&self.tree));
            match all.iter().find(|rv| rv.matches(name)) {
                Some(rv) => {
                    slots.push(rv.value.clone());
                    added.push(rv.clone());
                }
                None => missing.push(name.to_string()),
            }
        }
        if !missing.is_empty() {
            return Err(Error::FormulaMissing { missing });
        }
        if !added.is_empty() {
            self.rvars.extend(added);
            self.dirty = true;
        }

        let names = names.iter().map(|n| n.to_string()).collect();
        Ok(Formula::new(names, slots, self.entry.clone(), f))
    }

    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.scan.close();
    }
}
