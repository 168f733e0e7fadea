use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use rootio_bytes::RBuffer;
use rootio_file::{Compression, File};

use crate::basket::{Basket, BasketLayout, IoFeatures};
use crate::leaf::Leaf;
use crate::value::{Slot, Value};
use crate::{Error, Result};

/// Offset-table capacity for branches whose entries vary in size.
pub const DEFAULT_ENTRY_OFFSET_LEN: i32 = 1000;

/// Basket currently memory-resident for reading, with the global entry
/// window `[first, end)` it covers.
#[derive(Debug, Default)]
struct ReadState {
    basket: Option<Basket>,
    first: i64,
    end: i64,
}

/// The count leaf a variable-length branch takes its lengths from.
#[derive(Debug, Clone, Copy)]
pub struct CountSource<'a> {
    pub branch: &'a Branch,
    pub leaf: usize,
}

/// A named column backed by a sequence of baskets.
#[derive(Debug)]
pub struct Branch {
    name: String,
    title: String,
    tree: String,
    leaves: Rc<[Leaf]>,
    nevsize: i32,
    entry_offset_len: i32,
    basket_size: i32,
    compression: Compression,
    entries: i64,
    tot_bytes: i64,
    zip_bytes: i64,
    basket_bytes: Vec<i32>,
    /// First entry of each basket; one longer than the flushed basket list.
    basket_entry: Vec<i64>,
    basket_seek: Vec<i64>,
    file: Rc<File>,
    wbasket: Option<Basket>,
    read: RefCell<ReadState>,
}

impl Branch {
    /// New empty branch of tree `tree` carrying `leaves`.
    ///
    /// Several leaves share one entry only when all of them have a fixed
    /// size; their offsets inside the entry are assigned in order.
    pub fn new(
        name: &str,
        tree: &str,
        leaves: Vec<Leaf>,
        file: Rc<File>,
        basket_size: i32,
        compression: Compression,
    ) -> Result<Self> {
        if leaves.is_empty() {
            return Err(Error::InvalidLeaf {
                name: name.to_string(),
                reason: "branch without leaves".into(),
            });
        }
        let fixed: Option<Vec<usize>> = leaves.iter().map(Leaf::fixed_size).collect();
        let leaves: Vec<Leaf> = match &fixed {
            Some(sizes) => {
                let mut off = 0i64;
                leaves
                    .into_iter()
                    .zip(sizes)
                    .map(|(leaf, &n)| {
                        let leaf = leaf.with_offset(off);
                        off += n as i64;
                        leaf
                    })
                    .collect()
            }
            None if leaves.len() > 1 => {
                return Err(Error::InvalidLeaf {
                    name: name.to_string(),
                    reason: "variable-size leaves need a branch of their own".into(),
                })
            }
            None => leaves,
        };

        let title = leaves
            .iter()
            .map(|l| format!("{}/{}", l.title(), l.kind().type_code()))
            .collect::<Vec<_>>()
            .join(":");
        let (nevsize, entry_offset_len) = match fixed {
            Some(sizes) => (sizes.iter().sum::<usize>() as i32, 0),
            None => (0, DEFAULT_ENTRY_OFFSET_LEN),
        };

        Ok(Self {
            name: name.to_string(),
            title,
            tree: tree.to_string(),
            leaves: leaves.into(),
            nevsize,
            entry_offset_len,
            basket_size,
            compression,
            entries: 0,
            tot_bytes: 0,
            zip_bytes: 0,
            basket_bytes: Vec::new(),
            basket_entry: vec![0],
            basket_seek: Vec::new(),
            file,
            wbasket: None,
            read: RefCell::new(ReadState::default()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Leaf list, `name/T` per leaf joined by `:`.
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn tree_name(&self) -> &str {
        &self.tree
    }

    pub fn leaves(&self) -> &[Leaf] {
        &self.leaves
    }

    pub fn leaf(&self, name: &str) -> Option<(usize, &Leaf)> {
        self.leaves.iter().enumerate().find(|(_, l)| l.name() == name)
    }

    pub fn entries(&self) -> i64 {
        self.entries
    }

    pub fn entry_offset_len(&self) -> i32 {
        self.entry_offset_len
    }

    pub fn basket_size(&self) -> i32 {
        self.basket_size
    }

    pub fn compression(&self) -> Compression {
        self.compression
    }

    pub fn n_baskets(&self) -> usize {
        self.basket_seek.len()
    }

    pub fn tot_bytes(&self) -> i64 {
        self.tot_bytes
    }

    pub fn zip_bytes(&self) -> i64 {
        self.zip_bytes
    }

    fn new_basket(&self) -> Basket {
        Basket::new(
            &self.name,
            &self.tree,
            self.leaves.clone(),
            BasketLayout {
                bufsize: self.basket_size,
                nevsize: self.nevsize,
                entry_offset_len: self.entry_offset_len,
                iobits: IoFeatures::empty(),
            },
            self.file.is_big_file(),
        )
    }

    /// Appends one entry taken from `slots`, one per leaf. Returns the number
    /// of payload bytes added.
    pub(crate) fn write(&mut self, slots: &[Slot]) -> Result<usize> {
        for (leaf, slot) in self.leaves.iter().zip(slots) {
            slot.with(|v| leaf.check_value(v))?;
        }
        let mut basket = self.wbasket.take().unwrap_or_else(|| self.new_basket());
        let written = write_entry(&mut basket, &self.leaves, slots);
        let full = basket.pending_len() >= self.basket_size.max(0) as usize;
        self.wbasket = Some(basket);
        let n = written?;

        self.entries += 1;
        if full {
            self.flush()?;
        }
        Ok(n)
    }

    /// Writes the pending basket, if it holds any entry.
    pub(crate) fn flush(&mut self) -> Result<()> {
        let Some(mut basket) = self.wbasket.take() else {
            return Ok(());
        };
        if basket.nevbuf() == 0 {
            return Ok(());
        }
        let (tot, zip) = basket.write_file(&self.file)?;
        self.tot_bytes += tot;
        self.zip_bytes += zip;
        self.basket_bytes.push(basket.key().n_bytes());
        self.basket_seek.push(basket.key().seek_key());
        self.basket_entry.push(self.entries);
        Ok(())
    }

    fn setup_basket(&self, ib: usize) -> Result<Basket> {
        let n_bytes = self.basket_bytes[ib];
        let mut buf = vec![0u8; n_bytes.max(0) as usize];
        self.file.read_at(&mut buf, self.basket_seek[ib])?;

        let mut basket = Basket::decode(&mut RBuffer::new(&buf), self.leaves.clone())?;
        let key = basket.key();
        if key.is_compressed() {
            return Err(Error::Compressed {
                branch: self.name.clone(),
                obj_len: key.obj_len(),
                n_bytes: key.n_bytes(),
            });
        }
        if basket.is_header_only() {
            let key_len = (key.key_len().max(0) as usize).min(buf.len());
            basket.attach_payload(buf.split_off(key_len))?;
        }
        Ok(basket)
    }

    /// Makes the basket holding `entry` memory-resident.
    ///
    /// Baskets stored without their offset table need `counts` to rebuild it.
    pub fn load_entry(&self, entry: i64, counts: Option<CountSource<'_>>) -> Result<()> {
        {
            let st = self.read.borrow();
            if st.basket.is_some() && st.first <= entry && entry < st.end {
                return Ok(());
            }
        }
        let ib = self.basket_entry.partition_point(|&e| e <= entry);
        if entry < 0 || ib == 0 || ib > self.basket_seek.len() {
            return Err(Error::NoBasket {
                branch: self.name.clone(),
                entry,
            });
        }
        let ib = ib - 1;
        let first = self.basket_entry[ib];

        let mut basket = self.setup_basket(ib)?;
        let end = first + i64::from(basket.nevbuf());
        if basket.has_generated_offsets() && basket.offsets().is_empty() {
            if !basket.can_generate_offset_array() {
                return Err(Error::InvalidBasket {
                    branch: self.name.clone(),
                    reason: "offsets must be regenerated but the basket has no count leaf".into(),
                });
            }
            let src = counts.ok_or_else(|| Error::InvalidBasket {
                branch: self.name.clone(),
                reason: "offsets must be regenerated but no count branch was provided".into(),
            })?;
            let counts = (first..end)
                .map(|e| src.branch.peek_count(e, src.leaf))
                .collect::<Result<Vec<_>>>()?;
            basket.compute_entry_offsets(&counts);
        }

        debug!(
            "branch {:?}: loaded basket {ib} (entries [{first}, {end}))",
            self.name
        );
        *self.read.borrow_mut() = ReadState {
            basket: Some(basket),
            first,
            end,
        };
        Ok(())
    }

    /// Decodes leaf `ileaf` of global `entry`. `count` is the element count
    /// for variable-length leaves.
    pub fn read_leaf(
        &self,
        entry: i64,
        ileaf: usize,
        count: Option<i64>,
        counts: Option<CountSource<'_>>,
    ) -> Result<Value> {
        self.load_entry(entry, counts)?;
        let st = self.read.borrow();
        let basket = st.basket.as_ref().ok_or_else(|| Error::NoBasket {
            branch: self.name.clone(),
            entry,
        })?;
        basket.read_leaf(entry - st.first, &self.leaves[ileaf], count)
    }

    /// Integer value of count leaf `ileaf` at `entry`.
    pub fn peek_count(&self, entry: i64, ileaf: usize) -> Result<i64> {
        let v = self.read_leaf(entry, ileaf, None, None)?;
        v.as_i64().ok_or_else(|| Error::InvalidLeaf {
            name: self.leaves[ileaf].name().to_string(),
            reason: format!("count leaf holds a {v} value"),
        })
    }
}

fn write_entry(basket: &mut Basket, leaves: &[Leaf], slots: &[Slot]) -> Result<usize> {
    let start = basket.pos();
    let w = basket.buffer_mut()?;
    for (leaf, slot) in leaves.iter().zip(slots) {
        slot.with(|v| leaf.write_value(w, v))?;
    }
    let n = (w.pos() - start) as usize;
    basket.update(start as i32);
    Ok(n)
}
