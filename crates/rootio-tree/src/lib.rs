//! Columnar, entry-oriented trees stored in ROOT-compatible baskets.
//!
//! A [`Writer`] streams entries from caller-owned [`Slot`]s into branches,
//! one basket at a time. The resulting [`Tree`] (or a [`Tree::chain`] /
//! [`Tree::join`] of several) is read back with a [`Scanner`] or, more
//! conveniently, a [`Reader`]:
//!
//! ```no_run
//! use std::rc::Rc;
//! use rootio_file::File;
//! use rootio_tree::{ReadVar, Reader, ReaderOptions, Slot, WriteOptions, WriteVar, Writer};
//!
//! # fn main() -> rootio_tree::Result<()> {
//! let file = Rc::new(File::in_memory());
//! let x = Slot::new(0i32);
//! let mut w = Writer::new(&file, "t", vec![WriteVar::new("x", x.clone())], WriteOptions::default())?;
//! for i in 0..3 {
//!     x.set(i.into());
//!     w.write()?;
//! }
//! let tree = w.close()?;
//!
//! let out = Slot::new(0i32);
//! let mut r = Reader::new(&tree, vec![ReadVar::new("x", out.clone())], ReaderOptions::default())?;
//! r.read(|ctx| {
//!     println!("{}: {:?}", ctx.entry, out.value::<i32>());
//!     Ok::<(), rootio_tree::Error>(())
//! })?;
//! # Ok(())
//! # }
//! ```

pub mod basket;
pub mod branch;
pub mod chain;
pub mod error;
pub mod formula;
pub mod join;
pub mod leaf;
pub mod reader;
pub mod scanner;
pub mod shape;
pub mod tree;
pub mod value;
pub mod vars;
pub mod writer;

pub use basket::{Basket, BasketLayout, IoFeatures, BASKET_VERSION};
pub use branch::{Branch, CountSource};
pub use chain::{Chain, ChainSlice, RChain};
pub use error::{Error, Result};
pub use formula::Formula;
pub use join::Join;
pub use leaf::Leaf;
pub use reader::{RCtx, Reader, ReaderOptions};
pub use scanner::Scanner;
pub use shape::{parse_dims, Shape};
pub use tree::{LeafRef, PlainTree, Tree};
pub use value::{ElemKind, Elems, Scalar, Slot, Value};
pub use vars::{new_read_vars, ReadVar, WriteVar};
pub use writer::{WriteOptions, Writer, DEFAULT_BASKET_SIZE};
