//! Native value kinds shared by the fragment store and the managers.

use crate::{
    archive::{InArchive, OutArchive, Writable},
    error::{Error, Result},
};
use derive_more::Display;
use std::fmt::Debug;

/// The local vertex index type.
pub type Lid = usize;

/// The worker id type.
pub type WorkerId = usize;

/// The kind of a column stored in a fragment.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataKind {
    Empty,
    Int32,
    Int64,
    Float32,
    Float64,
}

impl DataKind {
    /// Returns the fixed width of one element in bytes.
    pub fn width(self) -> usize {
        match self {
            DataKind::Empty => 0,
            DataKind::Int32 | DataKind::Float32 => 4,
            DataKind::Int64 | DataKind::Float64 => 8,
        }
    }

    /// Returns the numeric kind, or `None` for kinds the managers cannot bind.
    pub fn num_kind(self) -> Option<NumKind> {
        match self {
            DataKind::Empty => None,
            DataKind::Int32 => Some(NumKind::Int32),
            DataKind::Int64 => Some(NumKind::Int64),
            DataKind::Float32 => Some(NumKind::Float32),
            DataKind::Float64 => Some(NumKind::Float64),
        }
    }

    pub(crate) fn tag(self) -> u64 {
        match self {
            DataKind::Empty => 0,
            DataKind::Int32 => 1,
            DataKind::Int64 => 2,
            DataKind::Float32 => 3,
            DataKind::Float64 => 4,
        }
    }

    pub(crate) fn from_tag(tag: u64) -> Result<Self> {
        match tag {
            0 => Ok(DataKind::Empty),
            1 => Ok(DataKind::Int32),
            2 => Ok(DataKind::Int64),
            3 => Ok(DataKind::Float32),
            4 => Ok(DataKind::Float64),
            _ => Err(Error::UnknownKind(tag)),
        }
    }
}

impl std::str::FromStr for DataKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "empty" => Ok(DataKind::Empty),
            "i32" => Ok(DataKind::Int32),
            "i64" => Ok(DataKind::Int64),
            "f32" => Ok(DataKind::Float32),
            "f64" => Ok(DataKind::Float64),
            _ => Err(format!("invalid data kind `{}`", s)),
        }
    }
}

/// The closed set of numeric kinds the managers support.
#[derive(Debug, Display, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NumKind {
    Int32,
    Int64,
    Float32,
    Float64,
}

impl From<NumKind> for DataKind {
    fn from(kind: NumKind) -> Self {
        match kind {
            NumKind::Int32 => DataKind::Int32,
            NumKind::Int64 => DataKind::Int64,
            NumKind::Float32 => DataKind::Float32,
            NumKind::Float64 => DataKind::Float64,
        }
    }
}

/// One value read from a fragment column.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Scalar {
    Empty,
    Int32(i32),
    Int64(i64),
    Float32(f32),
    Float64(f64),
}

impl Scalar {
    pub fn kind(&self) -> DataKind {
        match self {
            Scalar::Empty => DataKind::Empty,
            Scalar::Int32(_) => DataKind::Int32,
            Scalar::Int64(_) => DataKind::Int64,
            Scalar::Float32(_) => DataKind::Float32,
            Scalar::Float64(_) => DataKind::Float64,
        }
    }

    /// Reads one value of `kind` from native memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `kind.width()` bytes.
    pub(crate) unsafe fn read_raw(kind: DataKind, ptr: *const u8) -> Scalar {
        match kind {
            DataKind::Empty => Scalar::Empty,
            DataKind::Int32 => Scalar::Int32(std::ptr::read_unaligned(ptr as *const i32)),
            DataKind::Int64 => Scalar::Int64(std::ptr::read_unaligned(ptr as *const i64)),
            DataKind::Float32 => Scalar::Float32(std::ptr::read_unaligned(ptr as *const f32)),
            DataKind::Float64 => Scalar::Float64(std::ptr::read_unaligned(ptr as *const f64)),
        }
    }

    /// Returns the little-endian native representation.
    pub(crate) fn to_le_bytes(self) -> Vec<u8> {
        match self {
            Scalar::Empty => vec![],
            Scalar::Int32(v) => v.to_le_bytes().to_vec(),
            Scalar::Int64(v) => v.to_le_bytes().to_vec(),
            Scalar::Float32(v) => v.to_le_bytes().to_vec(),
            Scalar::Float64(v) => v.to_le_bytes().to_vec(),
        }
    }

    /// Writes the value with the fixed-width encoder of its kind.
    pub fn encode(&self, out: &mut OutArchive) {
        match self {
            Scalar::Empty => (),
            Scalar::Int32(v) => out.write(v),
            Scalar::Int64(v) => out.write(v),
            Scalar::Float32(v) => out.write(v),
            Scalar::Float64(v) => out.write(v),
        }
    }

    /// Parses a textual value as `kind`.
    pub fn parse(kind: DataKind, s: &str) -> std::result::Result<Scalar, String> {
        let err = |e: &dyn std::fmt::Display| format!("cannot parse `{}` as {}: {}", s, kind, e);
        match kind {
            DataKind::Empty => Ok(Scalar::Empty),
            DataKind::Int32 => s.parse().map(Scalar::Int32).map_err(|e| err(&e)),
            DataKind::Int64 => s.parse().map(Scalar::Int64).map_err(|e| err(&e)),
            DataKind::Float32 => s.parse().map(Scalar::Float32).map_err(|e| err(&e)),
            DataKind::Float64 => s.parse().map(Scalar::Float64).map_err(|e| err(&e)),
        }
    }
}

mod private {
    pub trait Sealed {}
}

/// A Rust type bound to one of the four supported numeric kinds.
///
/// The trait is sealed: `i32`, `i64`, `f32` and `f64` are the only
/// implementors, so matching on [`NumKind`] is exhaustive.
pub trait NativeScalar:
    Writable + Copy + PartialOrd + Debug + Send + Sync + 'static + private::Sealed
{
    const KIND: NumKind;
    const ZERO: Self;
    const LOWEST: Self;
    const HIGHEST: Self;

    fn add(self, other: Self) -> Self;

    fn from_scalar(scalar: Scalar) -> Option<Self>;

    fn into_scalar(self) -> Scalar;

    /// Reads one value from native memory.
    ///
    /// # Safety
    ///
    /// `ptr` must be valid for reads of `size_of::<Self>()` bytes.
    unsafe fn read_raw(ptr: *const u8) -> Self {
        std::ptr::read_unaligned(ptr as *const Self)
    }
}

macro_rules! impl_native_int {
    ($t:ty, $kind:ident) => {
        impl private::Sealed for $t {}

        impl NativeScalar for $t {
            const KIND: NumKind = NumKind::$kind;
            const ZERO: Self = 0;
            const LOWEST: Self = <$t>::MIN;
            const HIGHEST: Self = <$t>::MAX;

            fn add(self, other: Self) -> Self {
                self.wrapping_add(other)
            }

            fn from_scalar(scalar: Scalar) -> Option<Self> {
                match scalar {
                    Scalar::$kind(v) => Some(v),
                    _ => None,
                }
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$kind(self)
            }
        }
    };
}

macro_rules! impl_native_float {
    ($t:ty, $kind:ident) => {
        impl private::Sealed for $t {}

        impl NativeScalar for $t {
            const KIND: NumKind = NumKind::$kind;
            const ZERO: Self = 0.0;
            const LOWEST: Self = <$t>::NEG_INFINITY;
            const HIGHEST: Self = <$t>::INFINITY;

            fn add(self, other: Self) -> Self {
                self + other
            }

            fn from_scalar(scalar: Scalar) -> Option<Self> {
                match scalar {
                    Scalar::$kind(v) => Some(v),
                    _ => None,
                }
            }

            fn into_scalar(self) -> Scalar {
                Scalar::$kind(self)
            }
        }
    };
}

impl_native_int!(i32, Int32);
impl_native_int!(i64, Int64);
impl_native_float!(f32, Float32);
impl_native_float!(f64, Float64);

/// Fails with [`Error::TypeMismatch`] unless `found` is the kind of `T`.
pub(crate) fn check_kind<T: NativeScalar>(column: &'static str, found: DataKind) -> Result<()> {
    if found == DataKind::from(T::KIND) {
        Ok(())
    } else {
        Err(Error::TypeMismatch {
            column,
            expected: T::KIND,
            found,
        })
    }
}

/// Converts a scalar read from `column` into `T`.
pub(crate) fn expect_scalar<T: NativeScalar>(column: &'static str, scalar: Scalar) -> Result<T> {
    T::from_scalar(scalar).ok_or(Error::TypeMismatch {
        column,
        expected: T::KIND,
        found: scalar.kind(),
    })
}

/// Panics unless `lid` lies in `[0, vertex_num)`.
#[inline]
pub(crate) fn check_lid(lid: Lid, vertex_num: usize) {
    if lid >= vertex_num {
        panic!("lid {} out of range [0, {})", lid, vertex_num);
    }
}

/// Decodes exactly `count` fixed-width values of `T` from `input`.
pub(crate) fn decode_column<T: NativeScalar>(input: &mut InArchive, count: usize) -> Result<Vec<T>> {
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        values.push(input.read::<T>()?);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_tags() {
        for kind in [
            DataKind::Empty,
            DataKind::Int32,
            DataKind::Int64,
            DataKind::Float32,
            DataKind::Float64,
        ] {
            assert_eq!(DataKind::from_tag(kind.tag()).unwrap(), kind);
        }
        assert!(matches!(DataKind::from_tag(9), Err(Error::UnknownKind(9))));
    }

    #[test]
    fn test_check_kind() {
        assert!(check_kind::<i64>("oid", DataKind::Int64).is_ok());
        assert!(matches!(
            check_kind::<i64>("oid", DataKind::Int32),
            Err(Error::TypeMismatch {
                column: "oid",
                expected: NumKind::Int64,
                found: DataKind::Int32
            })
        ));
        assert!(check_kind::<f32>("vdata", DataKind::Empty).is_err());
    }

    #[test]
    fn test_scalar_conversions() {
        assert_eq!(i32::from_scalar(Scalar::Int32(-3)), Some(-3));
        assert_eq!(i32::from_scalar(Scalar::Int64(-3)), None);
        assert_eq!(2.5f64.into_scalar(), Scalar::Float64(2.5));
        assert_eq!(Scalar::parse(DataKind::Float32, "1.5"), Ok(Scalar::Float32(1.5)));
        assert!(Scalar::parse(DataKind::Int32, "x").is_err());
    }

    #[test]
    #[should_panic(expected = "lid 4 out of range [0, 4)")]
    fn test_check_lid() {
        check_lid(4, 4);
    }
}
