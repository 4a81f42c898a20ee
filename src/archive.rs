//! Byte streams used to drain fragment columns and to ship aggregator values.
//!
//! Every value type owns its encoding through [`Writable`]; the archives only
//! delimit values. Numbers use a fixed-width little-endian layout, strings and
//! byte vectors carry a `u64` length prefix.

use crate::error::{Error, Result};

/// A value that knows how to write itself to and read itself from an archive.
pub trait Writable: Sized {
    fn write(&self, out: &mut OutArchive);

    fn read(input: &mut InArchive) -> Result<Self>;
}

/// A growable output stream.
#[derive(Debug, Default, Clone)]
pub struct OutArchive {
    buffer: Vec<u8>,
}

impl OutArchive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Empties the archive, keeping its allocation for the next round.
    pub fn clear(&mut self) {
        self.buffer.clear();
    }

    pub fn write_bytes(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    pub fn write<T: Writable>(&mut self, value: &T) {
        value.write(self);
    }

    pub fn as_slice(&self) -> &[u8] {
        &self.buffer
    }

    pub fn into_vec(self) -> Vec<u8> {
        self.buffer
    }

    pub fn reader(&self) -> InArchive<'_> {
        InArchive::new(&self.buffer)
    }
}

/// A cursor reading values back from a byte slice.
#[derive(Debug, Clone)]
pub struct InArchive<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> InArchive<'a> {
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    pub fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    pub fn read_bytes(&mut self, count: usize) -> Result<&'a [u8]> {
        if count > self.remaining() {
            return Err(Error::UnexpectedEof {
                needed: count,
                remaining: self.remaining(),
            });
        }
        let bytes = &self.bytes[self.pos..self.pos + count];
        self.pos += count;
        Ok(bytes)
    }

    pub fn read<T: Writable>(&mut self) -> Result<T> {
        T::read(self)
    }

    /// Fails unless every byte has been consumed.
    pub fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Corrupted(format!(
                "{} trailing bytes after value",
                self.remaining()
            )))
        }
    }
}

/// Encodes a single value into a fresh byte vector.
pub fn to_bytes<T: Writable>(value: &T) -> Vec<u8> {
    let mut out = OutArchive::new();
    out.write(value);
    out.into_vec()
}

/// Decodes exactly one value from `bytes`.
pub fn from_bytes<T: Writable>(bytes: &[u8]) -> Result<T> {
    let mut input = InArchive::new(bytes);
    let value = input.read()?;
    input.finish()?;
    Ok(value)
}

macro_rules! impl_writable_le {
    ($($t:ty),*) => {
        $(
            impl Writable for $t {
                fn write(&self, out: &mut OutArchive) {
                    out.write_bytes(&self.to_le_bytes());
                }

                fn read(input: &mut InArchive) -> Result<Self> {
                    let mut raw = [0u8; std::mem::size_of::<$t>()];
                    raw.copy_from_slice(input.read_bytes(std::mem::size_of::<$t>())?);
                    Ok(<$t>::from_le_bytes(raw))
                }
            }
        )*
    };
}

impl_writable_le!(i8, u8, i16, u16, i32, u32, i64, u64, f32, f64);

impl Writable for usize {
    fn write(&self, out: &mut OutArchive) {
        (*self as u64).write(out);
    }

    fn read(input: &mut InArchive) -> Result<Self> {
        let value = u64::read(input)?;
        usize::try_from(value).map_err(|_| Error::Corrupted(format!("length {} overflows", value)))
    }
}

impl Writable for bool {
    fn write(&self, out: &mut OutArchive) {
        out.write_bytes(&[*self as u8]);
    }

    fn read(input: &mut InArchive) -> Result<Self> {
        match input.read_bytes(1)?[0] {
            0 => Ok(false),
            1 => Ok(true),
            b => Err(Error::Corrupted(format!("invalid bool byte {}", b))),
        }
    }
}

impl Writable for String {
    fn write(&self, out: &mut OutArchive) {
        self.len().write(out);
        out.write_bytes(self.as_bytes());
    }

    fn read(input: &mut InArchive) -> Result<Self> {
        let len = usize::read(input)?;
        String::from_utf8(input.read_bytes(len)?.to_vec())
            .map_err(|e| Error::Corrupted(e.to_string()))
    }
}

impl<T: Writable> Writable for Vec<T> {
    fn write(&self, out: &mut OutArchive) {
        self.len().write(out);
        for item in self {
            item.write(out);
        }
    }

    fn read(input: &mut InArchive) -> Result<Self> {
        let len = usize::read(input)?;
        let mut items = Vec::with_capacity(len.min(input.remaining()));
        for _ in 0..len {
            items.push(T::read(input)?);
        }
        Ok(items)
    }
}
