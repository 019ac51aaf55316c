//! Canonical per-stage state keys.
//!
//! A [`ShaderUid`] pairs a stage's decoded state fields with the canonical
//! byte sequence they serialize to. Equality, ordering and hashing look at
//! the bytes only, so two uids are interchangeable exactly when every
//! significant byte matches. The encoding is explicit (little-endian, flags
//! packed into declared bit positions, unused bits required to be zero)
//! and never depends on the in-memory layout of the field structs.

pub mod geometry;
pub mod pixel;
pub mod vertex;

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use smallvec::SmallVec;

use crate::driver::ShaderStage;

pub use geometry::GeometryUidData;
pub use pixel::PixelUidData;
pub use vertex::VertexUidData;

pub type PixelShaderUid = ShaderUid<PixelUidData>;
pub type VertexShaderUid = ShaderUid<VertexUidData>;
pub type GeometryShaderUid = ShaderUid<GeometryUidData>;

/// Inline storage for encoded uids; every family fits without spilling.
pub type UidBytes = SmallVec<[u8; 16]>;

/// Field set of one stage family.
///
/// `read` must be the exact inverse of `write` and must reject any byte
/// sequence `write` could not have produced.
pub trait UidData: Clone + fmt::Debug + Send + Sync + 'static {
    /// Stage family this data describes.
    const STAGE: ShaderStage;

    fn write(&self, w: &mut UidWriter);

    fn read(r: &mut UidReader<'_>) -> Option<Self>;
}

// ─── ShaderUid ───────────────────────────────────────────────────────────────

/// Byte-comparable state key for one shader stage.
#[derive(Clone)]
pub struct ShaderUid<T: UidData> {
    data: T,
    bytes: UidBytes,
}

impl<T: UidData> ShaderUid<T> {
    #[must_use]
    pub fn new(data: T) -> Self {
        let mut writer = UidWriter::new();
        data.write(&mut writer);
        Self {
            data,
            bytes: writer.finish(),
        }
    }

    /// Decodes a uid from its canonical bytes.
    ///
    /// Returns `None` for truncated input, trailing bytes, or any encoding
    /// that does not re-encode to the same bytes.
    #[must_use]
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        let mut reader = UidReader::new(bytes);
        let data = T::read(&mut reader)?;
        if !reader.is_empty() {
            return None;
        }
        let uid = Self::new(data);
        (uid.bytes.as_slice() == bytes).then_some(uid)
    }

    #[inline]
    #[must_use]
    pub fn data(&self) -> &T {
        &self.data
    }

    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Number of significant bytes compared and hashed.
    #[inline]
    #[must_use]
    pub fn num_values(&self) -> usize {
        self.bytes.len()
    }
}

impl<T: UidData> PartialEq for ShaderUid<T> {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl<T: UidData> Eq for ShaderUid<T> {}

impl<T: UidData> PartialOrd for ShaderUid<T> {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl<T: UidData> Ord for ShaderUid<T> {
    fn cmp(&self, other: &Self) -> Ordering {
        self.bytes.as_slice().cmp(other.bytes.as_slice())
    }
}

impl<T: UidData> Hash for ShaderUid<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.bytes.as_slice().hash(state);
    }
}

impl<T: UidData> fmt::Debug for ShaderUid<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ShaderUid")
            .field("stage", &T::STAGE)
            .field("data", &self.data)
            .field("bytes", &self.bytes.as_slice())
            .finish()
    }
}

// ─── Codec ───────────────────────────────────────────────────────────────────

/// Little-endian writer for uid fields.
#[derive(Debug, Default)]
pub struct UidWriter {
    bytes: UidBytes,
}

impl UidWriter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, value: u8) {
        self.bytes.push(value);
    }

    pub fn u16(&mut self, value: u16) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    pub fn u32(&mut self, value: u32) {
        self.bytes.extend_from_slice(&value.to_le_bytes());
    }

    /// Packs up to eight flags into one byte, `flags[i]` at bit `i`.
    pub fn flags(&mut self, flags: &[bool]) {
        debug_assert!(flags.len() <= 8);
        let packed = flags
            .iter()
            .enumerate()
            .fold(0u8, |acc, (bit, &set)| acc | (u8::from(set) << bit));
        self.u8(packed);
    }

    #[must_use]
    pub fn finish(self) -> UidBytes {
        self.bytes
    }
}

/// Reader matching [`UidWriter`].
#[derive(Debug)]
pub struct UidReader<'a> {
    bytes: &'a [u8],
}

impl<'a> UidReader<'a> {
    #[must_use]
    pub fn new(bytes: &'a [u8]) -> Self {
        Self { bytes }
    }

    fn take<const N: usize>(&mut self) -> Option<[u8; N]> {
        let bytes: &'a [u8] = self.bytes;
        let (head, tail) = bytes.split_first_chunk::<N>()?;
        self.bytes = tail;
        Some(*head)
    }

    pub fn u8(&mut self) -> Option<u8> {
        self.take::<1>().map(|[b]| b)
    }

    pub fn u16(&mut self) -> Option<u16> {
        self.take::<2>().map(u16::from_le_bytes)
    }

    pub fn u32(&mut self) -> Option<u32> {
        self.take::<4>().map(u32::from_le_bytes)
    }

    /// Unpacks `N` flags written by [`UidWriter::flags`]. Fails if any bit at
    /// or above `N` is set.
    pub fn flags<const N: usize>(&mut self) -> Option<[bool; N]> {
        let packed = self.u8()?;
        if N < 8 && packed >> N != 0 {
            return None;
        }
        Some(std::array::from_fn(|bit| packed & (1 << bit) != 0))
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
