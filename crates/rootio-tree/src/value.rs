//! Typed cells exchanged between callers and branches.
//!
//! [`Value`] is the closed set of shapes a leaf can produce or consume and
//! [`Slot`] is the caller-owned handle both scanners and writers go through.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use rootio_bytes::{RBuffer, WBuffer};
use serde::{Deserialize, Serialize};

/// Element type of a leaf.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemKind {
    Bool,
    I8,
    I16,
    I32,
    I64,
    U8,
    U16,
    U32,
    U64,
    F32,
    F64,
    Str,
}

impl ElemKind {
    /// Encoded size of one element; `None` for strings.
    pub fn size(self) -> Option<usize> {
        Some(match self {
            ElemKind::Bool | ElemKind::I8 | ElemKind::U8 => 1,
            ElemKind::I16 | ElemKind::U16 => 2,
            ElemKind::I32 | ElemKind::U32 | ElemKind::F32 => 4,
            ElemKind::I64 | ElemKind::U64 | ElemKind::F64 => 8,
            ElemKind::Str => return None,
        })
    }

    /// ROOT leaflist type code (`/I`, `/F`, ...).
    pub fn type_code(self) -> char {
        match self {
            ElemKind::Bool => 'O',
            ElemKind::I8 => 'B',
            ElemKind::I16 => 'S',
            ElemKind::I32 => 'I',
            ElemKind::I64 => 'L',
            ElemKind::U8 => 'b',
            ElemKind::U16 => 's',
            ElemKind::U32 => 'i',
            ElemKind::U64 => 'l',
            ElemKind::F32 => 'F',
            ElemKind::F64 => 'D',
            ElemKind::Str => 'C',
        }
    }

    pub fn from_type_code(code: char) -> Option<Self> {
        Some(match code {
            'O' => ElemKind::Bool,
            'B' => ElemKind::I8,
            'S' => ElemKind::I16,
            'I' => ElemKind::I32,
            'L' => ElemKind::I64,
            'b' => ElemKind::U8,
            's' => ElemKind::U16,
            'i' => ElemKind::U32,
            'l' => ElemKind::U64,
            'F' => ElemKind::F32,
            'D' => ElemKind::F64,
            'C' => ElemKind::Str,
            _ => return None,
        })
    }

    pub fn is_unsigned(self) -> bool {
        matches!(
            self,
            ElemKind::U8 | ElemKind::U16 | ElemKind::U32 | ElemKind::U64
        )
    }

    pub fn is_integer(self) -> bool {
        matches!(
            self,
            ElemKind::I8
                | ElemKind::I16
                | ElemKind::I32
                | ElemKind::I64
                | ElemKind::U8
                | ElemKind::U16
                | ElemKind::U32
                | ElemKind::U64
        )
    }

    pub fn name(self) -> &'static str {
        match self {
            ElemKind::Bool => "bool",
            ElemKind::I8 => "i8",
            ElemKind::I16 => "i16",
            ElemKind::I32 => "i32",
            ElemKind::I64 => "i64",
            ElemKind::U8 => "u8",
            ElemKind::U16 => "u16",
            ElemKind::U32 => "u32",
            ElemKind::U64 => "u64",
            ElemKind::F32 => "f32",
            ElemKind::F64 => "f64",
            ElemKind::Str => "string",
        }
    }
}

/// Fixed-width element types a leaf can carry.
pub trait Scalar: Copy + Sized {
    const KIND: ElemKind;

    fn read(r: &mut RBuffer<'_>) -> rootio_bytes::Result<Self>;
    fn write(self, w: &mut WBuffer);
    fn into_value(self) -> Value;
    fn from_value(v: &Value) -> Option<Self>;
    fn into_elems(v: Vec<Self>) -> Elems;
    fn from_elems(e: &Elems) -> Option<&[Self]>;
}

macro_rules! scalar {
    ($t:ty, $kind:ident, $read:ident, $write:ident) => {
        impl Scalar for $t {
            const KIND: ElemKind = ElemKind::$kind;

            fn read(r: &mut RBuffer<'_>) -> rootio_bytes::Result<Self> {
                r.$read()
            }

            fn write(self, w: &mut WBuffer) {
                w.$write(self)
            }

            fn into_value(self) -> Value {
                Value::$kind(self)
            }

            fn from_value(v: &Value) -> Option<Self> {
                match v {
                    Value::$kind(x) => Some(*x),
                    _ => None,
                }
            }

            fn into_elems(v: Vec<Self>) -> Elems {
                Elems::$kind(v)
            }

            fn from_elems(e: &Elems) -> Option<&[Self]> {
                match e {
                    Elems::$kind(v) => Some(v),
                    _ => None,
                }
            }
        }

        impl From<$t> for Value {
            fn from(v: $t) -> Self {
                Value::$kind(v)
            }
        }

        impl From<Vec<$t>> for Elems {
            fn from(v: Vec<$t>) -> Self {
                Elems::$kind(v)
            }
        }
    };
}

scalar!(bool, Bool, read_bool, write_bool);
scalar!(i8, I8, read_i8, write_i8);
scalar!(i16, I16, read_i16, write_i16);
scalar!(i32, I32, read_i32, write_i32);
scalar!(i64, I64, read_i64, write_i64);
scalar!(u8, U8, read_u8, write_u8);
scalar!(u16, U16, read_u16, write_u16);
scalar!(u32, U32, read_u32, write_u32);
scalar!(u64, U64, read_u64, write_u64);
scalar!(f32, F32, read_f32, write_f32);
scalar!(f64, F64, read_f64, write_f64);

/// Homogeneous run of fixed-width elements.
#[derive(Debug, Clone, PartialEq)]
pub enum Elems {
    Bool(Vec<bool>),
    I8(Vec<i8>),
    I16(Vec<i16>),
    I32(Vec<i32>),
    I64(Vec<i64>),
    U8(Vec<u8>),
    U16(Vec<u16>),
    U32(Vec<u32>),
    U64(Vec<u64>),
    F32(Vec<f32>),
    F64(Vec<f64>),
}

macro_rules! each_elems {
    ($e:expr, $v:ident => $body:expr) => {
        match $e {
            Elems::Bool($v) => $body,
            Elems::I8($v) => $body,
            Elems::I16($v) => $body,
            Elems::I32($v) => $body,
            Elems::I64($v) => $body,
            Elems::U8($v) => $body,
            Elems::U16($v) => $body,
            Elems::U32($v) => $body,
            Elems::U64($v) => $body,
            Elems::F32($v) => $body,
            Elems::F64($v) => $body,
        }
    };
}

fn read_vec<T: Scalar>(r: &mut RBuffer<'_>, n: usize) -> rootio_bytes::Result<Elems> {
    let v = (0..n).map(|_| T::read(r)).collect::<Result<Vec<_>, _>>()?;
    Ok(T::into_elems(v))
}

impl Elems {
    /// `n` default elements of `kind`; `None` for strings.
    pub fn zeros(kind: ElemKind, n: usize) -> Option<Self> {
        Some(match kind {
            ElemKind::Bool => Elems::Bool(vec![false; n]),
            ElemKind::I8 => Elems::I8(vec![0; n]),
            ElemKind::I16 => Elems::I16(vec![0; n]),
            ElemKind::I32 => Elems::I32(vec![0; n]),
            ElemKind::I64 => Elems::I64(vec![0; n]),
            ElemKind::U8 => Elems::U8(vec![0; n]),
            ElemKind::U16 => Elems::U16(vec![0; n]),
            ElemKind::U32 => Elems::U32(vec![0; n]),
            ElemKind::U64 => Elems::U64(vec![0; n]),
            ElemKind::F32 => Elems::F32(vec![0.0; n]),
            ElemKind::F64 => Elems::F64(vec![0.0; n]),
            ElemKind::Str => return None,
        })
    }

    /// Decodes `n` elements of `kind`; `None` for strings.
    pub fn read(
        r: &mut RBuffer<'_>,
        kind: ElemKind,
        n: usize,
    ) -> Option<rootio_bytes::Result<Self>> {
        Some(match kind {
            ElemKind::Bool => read_vec::<bool>(r, n),
            ElemKind::I8 => read_vec::<i8>(r, n),
            ElemKind::I16 => read_vec::<i16>(r, n),
            ElemKind::I32 => read_vec::<i32>(r, n),
            ElemKind::I64 => read_vec::<i64>(r, n),
            ElemKind::U8 => read_vec::<u8>(r, n),
            ElemKind::U16 => read_vec::<u16>(r, n),
            ElemKind::U32 => read_vec::<u32>(r, n),
            ElemKind::U64 => read_vec::<u64>(r, n),
            ElemKind::F32 => read_vec::<f32>(r, n),
            ElemKind::F64 => read_vec::<f64>(r, n),
            ElemKind::Str => return None,
        })
    }

    pub fn write(&self, w: &mut WBuffer) {
        each_elems!(self, v => v.iter().for_each(|x| x.write(w)))
    }

    pub fn kind(&self) -> ElemKind {
        match self {
            Elems::Bool(_) => ElemKind::Bool,
            Elems::I8(_) => ElemKind::I8,
            Elems::I16(_) => ElemKind::I16,
            Elems::I32(_) => ElemKind::I32,
            Elems::I64(_) => ElemKind::I64,
            Elems::U8(_) => ElemKind::U8,
            Elems::U16(_) => ElemKind::U16,
            Elems::U32(_) => ElemKind::U32,
            Elems::U64(_) => ElemKind::U64,
            Elems::F32(_) => ElemKind::F32,
            Elems::F64(_) => ElemKind::F64,
        }
    }

    pub fn len(&self) -> usize {
        each_elems!(self, v => v.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn get(&self, i: usize) -> Option<Value> {
        each_elems!(self, v => v.get(i).map(|x| x.into_value()))
    }

    pub fn as_slice<T: Scalar>(&self) -> Option<&[T]> {
        T::from_elems(self)
    }
}

/// One decoded entry of one leaf.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Bool(bool),
    I8(i8),
    I16(i16),
    I32(i32),
    I64(i64),
    U8(u8),
    U16(u16),
    U32(u32),
    U64(u64),
    F32(f32),
    F64(f64),
    Str(String),
    /// Fixed-shape array, flattened row-major.
    Array(Elems),
    /// Variable-length array whose length comes from a count leaf.
    Slice(Elems),
}

impl Value {
    pub fn zero(kind: ElemKind) -> Self {
        match kind {
            ElemKind::Bool => Value::Bool(false),
            ElemKind::I8 => Value::I8(0),
            ElemKind::I16 => Value::I16(0),
            ElemKind::I32 => Value::I32(0),
            ElemKind::I64 => Value::I64(0),
            ElemKind::U8 => Value::U8(0),
            ElemKind::U16 => Value::U16(0),
            ElemKind::U32 => Value::U32(0),
            ElemKind::U64 => Value::U64(0),
            ElemKind::F32 => Value::F32(0.0),
            ElemKind::F64 => Value::F64(0.0),
            ElemKind::Str => Value::Str(String::new()),
        }
    }

    pub(crate) fn read_scalar(r: &mut RBuffer<'_>, kind: ElemKind) -> rootio_bytes::Result<Self> {
        Ok(match kind {
            ElemKind::Bool => Value::Bool(r.read_bool()?),
            ElemKind::I8 => Value::I8(r.read_i8()?),
            ElemKind::I16 => Value::I16(r.read_i16()?),
            ElemKind::I32 => Value::I32(r.read_i32()?),
            ElemKind::I64 => Value::I64(r.read_i64()?),
            ElemKind::U8 => Value::U8(r.read_u8()?),
            ElemKind::U16 => Value::U16(r.read_u16()?),
            ElemKind::U32 => Value::U32(r.read_u32()?),
            ElemKind::U64 => Value::U64(r.read_u64()?),
            ElemKind::F32 => Value::F32(r.read_f32()?),
            ElemKind::F64 => Value::F64(r.read_f64()?),
            ElemKind::Str => Value::Str(r.read_string()?),
        })
    }

    pub(crate) fn write(&self, w: &mut WBuffer) -> rootio_bytes::Result<()> {
        match self {
            Value::Bool(v) => w.write_bool(*v),
            Value::I8(v) => w.write_i8(*v),
            Value::I16(v) => w.write_i16(*v),
            Value::I32(v) => w.write_i32(*v),
            Value::I64(v) => w.write_i64(*v),
            Value::U8(v) => w.write_u8(*v),
            Value::U16(v) => w.write_u16(*v),
            Value::U32(v) => w.write_u32(*v),
            Value::U64(v) => w.write_u64(*v),
            Value::F32(v) => w.write_f32(*v),
            Value::F64(v) => w.write_f64(*v),
            Value::Str(s) => w.write_string(s)?,
            Value::Array(e) | Value::Slice(e) => e.write(w),
        }
        Ok(())
    }

    /// Element kind, looking through arrays and slices.
    pub fn kind(&self) -> ElemKind {
        match self {
            Value::Bool(_) => ElemKind::Bool,
            Value::I8(_) => ElemKind::I8,
            Value::I16(_) => ElemKind::I16,
            Value::I32(_) => ElemKind::I32,
            Value::I64(_) => ElemKind::I64,
            Value::U8(_) => ElemKind::U8,
            Value::U16(_) => ElemKind::U16,
            Value::U32(_) => ElemKind::U32,
            Value::U64(_) => ElemKind::U64,
            Value::F32(_) => ElemKind::F32,
            Value::F64(_) => ElemKind::F64,
            Value::Str(_) => ElemKind::Str,
            Value::Array(e) | Value::Slice(e) => e.kind(),
        }
    }

    pub fn get<T: Scalar>(&self) -> Option<T> {
        T::from_value(self)
    }

    /// Integer (or boolean) payload widened to `i64`.
    pub fn as_i64(&self) -> Option<i64> {
        Some(match *self {
            Value::Bool(v) => i64::from(v),
            Value::I8(v) => i64::from(v),
            Value::I16(v) => i64::from(v),
            Value::I32(v) => i64::from(v),
            Value::I64(v) => v,
            Value::U8(v) => i64::from(v),
            Value::U16(v) => i64::from(v),
            Value::U32(v) => i64::from(v),
            Value::U64(v) => i64::try_from(v).ok()?,
            _ => return None,
        })
    }

    /// Numeric payload widened to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match *self {
            Value::F32(v) => Some(f64::from(v)),
            Value::F64(v) => Some(v),
            Value::U64(v) => Some(v as f64),
            Value::I64(v) => Some(v as f64),
            _ => self.as_i64().map(|v| v as f64),
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_elems(&self) -> Option<&Elems> {
        match self {
            Value::Array(e) | Value::Slice(e) => Some(e),
            _ => None,
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Str(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Str(s)
    }
}

impl fmt::Display for Value {
    /// Layout description used in mismatch errors: `i32`, `[f32; 3]`, `[f64]`.
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Array(e) => write!(f, "[{}; {}]", e.kind().name(), e.len()),
            Value::Slice(e) => write!(f, "[{}]", e.kind().name()),
            v => f.write_str(v.kind().name()),
        }
    }
}

/// Shared handle on a caller-owned [`Value`].
///
/// Cloning a slot clones the handle, not the value: a scanner that overwrites
/// its slots on every entry is observed by every clone.
#[derive(Debug, Clone)]
pub struct Slot(Rc<RefCell<Value>>);

impl Slot {
    pub fn new(v: impl Into<Value>) -> Self {
        Self(Rc::new(RefCell::new(v.into())))
    }

    pub fn get(&self) -> Value {
        self.0.borrow().clone()
    }

    pub fn set(&self, v: Value) {
        *self.0.borrow_mut() = v;
    }

    pub fn with<R>(&self, f: impl FnOnce(&Value) -> R) -> R {
        f(&self.0.borrow())
    }

    /// Scalar content, if the slot currently holds a `T`.
    pub fn value<T: Scalar>(&self) -> Option<T> {
        self.with(|v| v.get::<T>())
    }

    pub fn ptr_eq(&self, other: &Slot) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl From<Value> for Slot {
    fn from(v: Value) -> Self {
        Slot::new(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn type_codes_roundtrip() {
        for kind in [
            ElemKind::Bool,
            ElemKind::I8,
            ElemKind::I16,
            ElemKind::I32,
            ElemKind::I64,
            ElemKind::U8,
            ElemKind::U16,
            ElemKind::U32,
            ElemKind::U64,
            ElemKind::F32,
            ElemKind::F64,
            ElemKind::Str,
        ] {
            assert_eq!(ElemKind::from_type_code(kind.type_code()), Some(kind));
        }
        assert_eq!(ElemKind::from_type_code('X'), None);
    }

    #[test]
    fn elems_read_back_what_they_write() {
        let e = Elems::from(vec![1.5f32, -2.0, 3.25]);
        let mut w = WBuffer::new();
        e.write(&mut w);
        assert_eq!(w.len(), 12);

        let got = Elems::read(&mut RBuffer::new(w.bytes()), ElemKind::F32, 3)
            .unwrap()
            .unwrap();
        assert_eq!(got, e);
        assert_eq!(got.as_slice::<f32>(), Some(&[1.5f32, -2.0, 3.25][..]));
        assert_eq!(got.get(2), Some(Value::F32(3.25)));
        assert!(Elems::read(&mut RBuffer::new(&[]), ElemKind::Str, 0).is_none());
    }

    #[test]
    fn widening_accessors() {
        assert_eq!(Value::U16(7).as_i64(), Some(7));
        assert_eq!(Value::U64(u64::MAX).as_i64(), None);
        assert_eq!(Value::F32(0.5).as_f64(), Some(0.5));
        assert_eq!(Value::from("uno").as_str(), Some("uno"));
        assert_eq!(Value::Str("x".into()).as_i64(), None);
    }

    #[test]
    fn display_describes_layout() {
        assert_eq!(Value::I32(1).to_string(), "i32");
        assert_eq!(Value::Array(Elems::zeros(ElemKind::F64, 4).unwrap()).to_string(), "[f64; 4]");
        assert_eq!(Value::Slice(Elems::from(vec![1u8])).to_string(), "[u8]");
    }

    #[test]
    fn slot_clones_share_storage() {
        let a = Slot::new(1i32);
        let b = a.clone();
        b.set(Value::I32(42));
        assert_eq!(a.value::<i32>(), Some(42));
        assert_eq!(a.value::<f64>(), None);
        assert!(a.ptr_eq(&b));
    }
}
