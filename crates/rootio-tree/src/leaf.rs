use rootio_bytes::{RBuffer, WBuffer};

use crate::shape::{parse_dims, Shape};
use crate::value::{ElemKind, Elems, Value};
use crate::{Error, Result};

/// Physical layout of one column inside a branch entry.
#[derive(Debug, Clone, PartialEq)]
pub struct Leaf {
    name: String,
    title: String,
    kind: ElemKind,
    shape: Shape,
    offset: i64,
}

impl Leaf {
    pub fn new(name: &str, kind: ElemKind, shape: Shape) -> Result<Self> {
        match &shape {
            Shape::Dynamic { count: None } => {
                return Err(invalid(name, "variable-length leaf without a count leaf"))
            }
            Shape::Fixed(_) | Shape::Dynamic { .. } if kind == ElemKind::Str => {
                return Err(invalid(name, "arrays of strings are not supported"))
            }
            _ => {}
        }
        Ok(Self {
            name: name.to_string(),
            title: shape.render(name),
            kind,
            shape,
            offset: 0,
        })
    }

    /// Leaf described by a ROOT-style title such as `px[N]` or `mat[2][3]`.
    pub fn from_title(title: &str, kind: ElemKind) -> Result<Self> {
        let (name, shape) = parse_dims(title)?;
        Self::new(&name, kind, shape)
    }

    /// Places the leaf `offset` bytes into each entry of its branch.
    pub fn with_offset(mut self, offset: i64) -> Self {
        self.offset = offset;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn kind(&self) -> ElemKind {
        self.kind
    }

    pub fn is_unsigned(&self) -> bool {
        self.kind.is_unsigned()
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Elements per entry for fixed shapes, 1 otherwise.
    pub fn len(&self) -> usize {
        self.shape.len()
    }

    /// Name of the leaf holding this leaf's per-entry length.
    pub fn count(&self) -> Option<&str> {
        self.shape.count()
    }

    pub fn offset(&self) -> i64 {
        self.offset
    }

    /// Encoded bytes per entry, when that does not depend on the entry.
    pub fn fixed_size(&self) -> Option<usize> {
        match self.shape {
            Shape::Dynamic { .. } => None,
            _ => self.kind.size().map(|n| n * self.len()),
        }
    }

    pub fn can_generate_offset_array(&self) -> bool {
        self.count().is_some()
    }

    /// Entry start offsets for `n` entries laid out back to back from `base`,
    /// entry `i` holding `counts[i]` elements.
    pub fn compute_offset_array(&self, base: i32, n: usize, counts: &[i64]) -> Vec<i32> {
        let elem = self.kind.size().unwrap_or(1) as i64;
        let mut off = i64::from(base);
        (0..n)
            .map(|i| {
                let o = off as i32;
                off += elem * counts.get(i).copied().unwrap_or(0);
                o
            })
            .collect()
    }

    /// Default value matching this leaf's layout.
    pub fn new_value(&self) -> Value {
        match &self.shape {
            Shape::Scalar => Value::zero(self.kind),
            Shape::Fixed(_) => Elems::zeros(self.kind, self.len())
                .map(Value::Array)
                .unwrap_or_else(|| Value::zero(self.kind)),
            Shape::Dynamic { .. } => Elems::zeros(self.kind, 0)
                .map(Value::Slice)
                .unwrap_or_else(|| Value::zero(self.kind)),
        }
    }

    /// Whether `v` has the layout this leaf reads and writes.
    pub fn accepts(&self, v: &Value) -> bool {
        match (&self.shape, v) {
            (Shape::Fixed(_), Value::Array(e)) => e.kind() == self.kind && e.len() == self.len(),
            (Shape::Dynamic { .. }, Value::Slice(e)) => e.kind() == self.kind,
            (Shape::Scalar, Value::Array(_) | Value::Slice(_)) => false,
            (Shape::Scalar, v) => v.kind() == self.kind,
            _ => false,
        }
    }

    /// Layout description matching [`Value`]'s `Display`.
    pub fn layout(&self) -> String {
        match &self.shape {
            Shape::Scalar => self.kind.name().to_string(),
            Shape::Fixed(_) => format!("[{}; {}]", self.kind.name(), self.len()),
            Shape::Dynamic { .. } => format!("[{}]", self.kind.name()),
        }
    }

    /// Decodes one entry. `count` is the already-loaded count-leaf value
    /// for variable-length leaves.
    pub fn read_value(&self, r: &mut RBuffer<'_>, count: Option<i64>) -> Result<Value> {
        let n = match &self.shape {
            Shape::Scalar => return Ok(Value::read_scalar(r, self.kind)?),
            Shape::Fixed(_) => self.len(),
            Shape::Dynamic { .. } => {
                let n = count.ok_or_else(|| invalid(&self.name, "count leaf was not loaded"))?;
                usize::try_from(n)
                    .map_err(|_| invalid(&self.name, format!("negative element count {n}")))?
            }
        };
        let elems = Elems::read(r, self.kind, n)
            .ok_or_else(|| invalid(&self.name, "arrays of strings are not supported"))??;
        Ok(match self.shape {
            Shape::Dynamic { .. } => Value::Slice(elems),
            _ => Value::Array(elems),
        })
    }

    pub fn check_value(&self, v: &Value) -> Result<()> {
        if self.accepts(v) {
            return Ok(());
        }
        Err(Error::ValueMismatch {
            leaf: self.name.clone(),
            got: v.to_string(),
            want: self.layout(),
        })
    }

    pub fn write_value(&self, w: &mut WBuffer, v: &Value) -> Result<()> {
        self.check_value(v)?;
        Ok(v.write(w)?)
    }
}

fn invalid(name: &str, reason: impl Into<String>) -> Error {
    Error::InvalidLeaf {
        name: name.to_string(),
        reason: reason.into(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn slice_leaf() -> Leaf {
        Leaf::from_title("SliI16[N]", ElemKind::I16).unwrap()
    }

    #[test]
    fn titles_and_sizes() {
        let arr = Leaf::from_title("ArrF64[2][3]", ElemKind::F64).unwrap();
        assert_eq!(arr.name(), "ArrF64");
        assert_eq!(arr.title(), "ArrF64[2][3]");
        assert_eq!(arr.fixed_size(), Some(48));
        assert!(!arr.can_generate_offset_array());

        let s = slice_leaf();
        assert_eq!(s.count(), Some("N"));
        assert_eq!(s.fixed_size(), None);
        assert!(s.can_generate_offset_array());

        let name = Leaf::new("three", ElemKind::Str, Shape::Scalar).unwrap();
        assert_eq!(name.fixed_size(), None);
    }

    #[test]
    fn invalid_layouts_are_rejected() {
        assert!(Leaf::new("x", ElemKind::I32, Shape::Dynamic { count: None }).is_err());
        assert!(Leaf::from_title("s[3]", ElemKind::Str).is_err());
    }

    #[test]
    fn offset_array_accumulates_counts() {
        let got = slice_leaf().compute_offset_array(70, 4, &[0, 3, 1, 2]);
        assert_eq!(got, vec![70, 70, 76, 78]);
        let short = slice_leaf().compute_offset_array(10, 3, &[1]);
        assert_eq!(short, vec![10, 12, 12]);
    }

    #[test]
    fn slices_read_their_count() {
        let leaf = slice_leaf();
        let v = Value::Slice(Elems::from(vec![1i16, -2, 3]));
        let mut w = WBuffer::with_offset(50);
        leaf.write_value(&mut w, &v).unwrap();
        assert_eq!(w.len(), 6);

        let mut r = RBuffer::with_offset(w.bytes(), 50);
        assert_eq!(leaf.read_value(&mut r, Some(3)).unwrap(), v);
        r.set_pos(50).unwrap();
        assert!(leaf.read_value(&mut r, None).is_err());
    }

    #[test]
    fn mismatched_values_are_reported() {
        let leaf = Leaf::new("one", ElemKind::I32, Shape::Scalar).unwrap();
        let err = leaf
            .write_value(&mut WBuffer::new(), &Value::F32(1.0))
            .unwrap_err();
        assert_eq!(err.to_string(), r#"leaf "one": got a f32 value, want i32"#);
        assert!(leaf.accepts(&leaf.new_value()));
        assert!(slice_leaf().accepts(&slice_leaf().new_value()));
    }
}
