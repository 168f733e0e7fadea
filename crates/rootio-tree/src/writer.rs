use std::collections::HashMap;
use std::rc::Rc;

use log::{debug, warn};
use rootio_file::{Compression, File};
use serde::{Deserialize, Serialize};

use crate::branch::Branch;
use crate::leaf::Leaf;
use crate::shape::{parse_dims, Shape};
use crate::tree::{PlainTree, Tree};
use crate::value::{Slot, Value};
use crate::vars::WriteVar;
use crate::{Error, Result};

pub const DEFAULT_BASKET_SIZE: i32 = 32000;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriteOptions {
    /// Stamped on every branch; payloads are stored raw.
    pub compression: Compression,
    /// Pending bytes after which a branch flushes its basket.
    pub basket_size: i32,
    pub title: String,
}

impl Default for WriteOptions {
    fn default() -> Self {
        Self {
            compression: Compression::default(),
            basket_size: DEFAULT_BASKET_SIZE,
            title: String::new(),
        }
    }
}

impl WriteOptions {
    pub fn with_compression(mut self, compression: Compression) -> Self {
        self.compression = compression;
        self
    }

    pub fn with_basket_size(mut self, basket_size: i32) -> Self {
        self.basket_size = basket_size;
        self
    }

    pub fn with_title(mut self, title: &str) -> Self {
        self.title = title.to_string();
        self
    }
}

/// Streams entries from caller-owned slots into a new plain tree.
#[derive(Debug)]
pub struct Writer {
    name: String,
    title: String,
    branches: Vec<Branch>,
    slots: Vec<Slot>,
    /// For each slice column, the index of its count column.
    counts: Vec<Option<usize>>,
    entries: i64,
    /// Storage failure that left the branches out of step.
    err: Option<Error>,
}

impl Writer {
    pub fn new(file: &Rc<File>, name: &str, wvars: Vec<WriteVar>, opts: WriteOptions) -> Result<Self> {
        if opts.compression.is_enabled() {
            debug!(
                "tree {name:?}: compression {} is recorded, payloads are stored raw",
                opts.compression.settings()
            );
        }
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut branches = Vec::with_capacity(wvars.len());
        let mut slots: Vec<Slot> = Vec::with_capacity(wvars.len());
        let mut counts = Vec::with_capacity(wvars.len());

        for (i, wvar) in wvars.into_iter().enumerate() {
            let fail = |reason: String| Error::WriteBinding {
                index: i,
                name: wvar.name.clone(),
                reason,
            };
            let (bname, shape) = parse_dims(&wvar.name).map_err(|e| fail(e.to_string()))?;
            if index.contains_key(&bname) {
                return Err(fail(format!("duplicate branch name {bname:?}")));
            }

            let value = wvar.value.get();
            let shape = leaf_shape(&value, shape, wvar.count.as_deref()).map_err(fail)?;
            let count = match shape.count() {
                Some(cname) => {
                    let Some(&ci) = index.get(cname) else {
                        return Err(fail(format!(
                            "count {cname:?} must name an earlier write-var"
                        )));
                    };
                    let ok = slots[ci]
                        .with(|v: &Value| v.as_elems().is_none() && v.kind().is_integer());
                    if !ok {
                        return Err(fail(format!("count {cname:?} must be an integer scalar")));
                    }
                    Some(ci)
                }
                None => None,
            };

            let leaf = Leaf::new(&bname, value.kind(), shape).map_err(|e| fail(e.to_string()))?;
            let branch = Branch::new(
                &bname,
                name,
                vec![leaf],
                file.clone(),
                opts.basket_size,
                opts.compression,
            )?;
            index.insert(bname, i);
            branches.push(branch);
            slots.push(wvar.value);
            counts.push(count);
        }

        Ok(Self {
            name: name.to_string(),
            title: opts.title,
            branches,
            slots,
            counts,
            entries: 0,
            err: None,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn entries(&self) -> i64 {
        self.entries
    }

    pub fn branches(&self) -> &[Branch] {
        &self.branches
    }

    /// Appends one entry from the current slot contents. Returns the number of
    /// payload bytes added. Nothing is written when any slot is invalid.
    ///
    /// A storage failure past validation may leave some branches holding the
    /// entry and others not; the writer then refuses every later `write` and `close`
    /// with that first failure.
    pub fn write(&mut self) -> Result<usize> {
        if let Some(err) = &self.err {
            return Err(err.clone());
        }
        for ((branch, slot), count) in self.branches.iter().zip(&self.slots).zip(&self.counts) {
            let leaf = &branch.leaves()[0];
            slot.with(|v| leaf.check_value(v))?;
            if let Some(ci) = *count {
                let want = self.slots[ci].with(Value::as_i64);
                let got = slot.with(|v| v.as_elems().map(|e| e.len() as i64));
                if got != want {
                    return Err(Error::InvalidLeaf {
                        name: leaf.name().to_string(),
                        reason: format!(
                            "slice holds {} elements, count leaf {:?} says {}",
                            got.unwrap_or(0),
                            self.branches[ci].name(),
                            want.unwrap_or(0)
                        ),
                    });
                }
            }
        }

        let mut n = 0;
        for (branch, slot) in self.branches.iter_mut().zip(&self.slots) {
            match branch.write(std::slice::from_ref(slot)) {
                Ok(k) => n += k,
                Err(err) => {
                    warn!("tree {:?}: write of entry {} failed: {err}", self.name, self.entries);
                    self.err = Some(err.clone());
                    return Err(err);
                }
            }
        }
        self.entries += 1;
        Ok(n)
    }

    /// Flushes pending baskets and hands the tree over for reading.
    pub fn close(mut self) -> Result<Tree> {
        if let Some(err) = self.err {
            return Err(err);
        }
        for b in &mut self.branches {
            b.flush()?;
        }
        debug!("tree {:?}: closed with {} entries", self.name, self.entries);
        let branches = self.branches.into_iter().map(Rc::new).collect();
        Ok(Tree::Plain(Rc::new(PlainTree::new(
            &self.name,
            &self.title,
            self.entries,
            branches,
        ))))
    }
}

/// Leaf shape for a slot holding `value`, declared under a name with
/// suffix `shape`.
fn leaf_shape(value: &Value, shape: Shape, count: Option<&str>) -> std::result::Result<Shape, String> {
    match (value, shape) {
        (Value::Array(e), Shape::Scalar) => Ok(Shape::Fixed(vec![e.len()])),
        (Value::Array(e), Shape::Fixed(dims)) => {
            let n: usize = dims.iter().product();
            if n != e.len() {
                return Err(format!("array holds {} elements, dimensions say {n}", e.len()));
            }
            Ok(Shape::Fixed(dims))
        }
        (Value::Slice(_), Shape::Scalar | Shape::Dynamic { count: None }) => match count {
            Some(c) => Ok(Shape::Dynamic {
                count: Some(c.to_string()),
            }),
            None => Err("slice needs a count write-var".into()),
        },
        (Value::Slice(_), Shape::Dynamic { count: Some(c) }) => match count {
            Some(other) if other != c => Err(format!("conflicting counts {c:?} and {other:?}")),
            _ => Ok(Shape::Dynamic { count: Some(c) }),
        },
        (Value::Array(_), Shape::Dynamic { .. }) => {
            Err("fixed-size array under a variable-length name".into())
        }
        (Value::Slice(_), Shape::Fixed(_)) => Err("slice under a fixed-size name".into()),
        (_, Shape::Scalar) => Ok(Shape::Scalar),
        (v, _) => Err(format!("{v} value under a dimensioned name")),
    }
}
