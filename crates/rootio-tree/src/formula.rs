use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use crate::value::{Slot, Value};

/// A value computed from a fixed list of columns, evaluated at most once
/// per entry of the reader that created it.
pub struct Formula<T> {
    names: Vec<String>,
    slots: Vec<Slot>,
    entry: Rc<Cell<i64>>,
    cache: RefCell<Option<(i64, T)>>,
    func: Box<dyn Fn(&[Value]) -> T>,
}

impl<T: Clone> Formula<T> {
    pub(crate) fn new(
        names: Vec<String>,
        slots: Vec<Slot>,
        entry: Rc<Cell<i64>>,
        func: impl Fn(&[Value]) -> T + 'static,
    ) -> Self {
        Self {
            names,
            slots,
            entry,
            cache: RefCell::new(None),
            func: Box::new(func),
        }
    }

    /// Column names, in the order their values are handed to the function.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Result for the reader's current entry.
    pub fn eval(&self) -> T {
        let entry = self.entry.get();
        if let Some((at, v)) = &*self.cache.borrow() {
            if *at == entry {
                return v.clone();
            }
        }
        let args: Vec<Value> = self.slots.iter().map(Slot::get).collect();
        let v = (self.func)(&args);
        *self.cache.borrow_mut() = Some((entry, v.clone()));
        v
    }
}

impl<T> fmt::Debug for Formula<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Formula")
            .field("names", &self.names)
            .field("entry", &self.entry.get())
            .finish_non_exhaustive()
    }
}
