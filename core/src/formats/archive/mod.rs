//! Compiled proxy container (.mhpxy)
//!
//! A flat, self-describing table of named typed arrays behind a small
//! uncompressed header. Entries are split into sections, each compressed as
//! its own LZ4 block, so a reader can stop after the first one.
//!
//! # File Structure
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │ Header (12 bytes, uncompressed)              │
//! │ ├─ magic: [u8; 4] = "MHPX"                   │
//! │ ├─ version: u32                              │
//! │ └─ section_count: u32                        │
//! ├──────────────────────────────────────────────┤
//! │ Section (repeated section_count times)       │
//! │ ├─ block_len: u32                            │
//! │ └─ LZ4 block (size-prepended)                │
//! │    ├─ entry_count: u32                       │
//! │    └─ entries                                │
//! │       ├─ key_len: u8, key: [u8; key_len]     │
//! │       ├─ dtype: u8                           │
//! │       ├─ count: u32                          │
//! │       └─ data: [dtype; count]                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! All integers and floats are little-endian.

mod reader;
mod writer;

use std::collections::BTreeMap;
use std::io;

pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

/// Errors from reading or writing a container.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("not a compiled proxy (bad magic)")]
    BadMagic,

    #[error("unsupported container version {found} (expected {expected})")]
    UnsupportedVersion { found: u32, expected: u32 },

    #[error("container truncated")]
    Truncated,

    #[error("payload decompression failed: {0}")]
    Decompress(String),

    #[error("missing key `{0}`")]
    MissingKey(String),

    #[error("key `{key}` holds {found}, expected {expected}")]
    WrongType {
        key: String,
        expected: &'static str,
        found: &'static str,
    },

    #[error(transparent)]
    Io(#[from] io::Error),
}

/// Element type tag stored with each entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DType {
    U8 = 0,
    I32 = 1,
    U32 = 2,
    F32 = 3,
    Bool = 4,
}

impl DType {
    pub fn from_u8(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => DType::U8,
            1 => DType::I32,
            2 => DType::U32,
            3 => DType::F32,
            4 => DType::Bool,
            _ => return None,
        })
    }

    /// Encoded size of one element in bytes.
    pub fn size(self) -> usize {
        match self {
            DType::U8 | DType::Bool => 1,
            DType::I32 | DType::U32 | DType::F32 => 4,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            DType::U8 => "u8",
            DType::I32 => "i32",
            DType::U32 => "u32",
            DType::F32 => "f32",
            DType::Bool => "bool",
        }
    }
}

/// One typed array.
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    U8(Vec<u8>),
    I32(Vec<i32>),
    U32(Vec<u32>),
    F32(Vec<f32>),
    Bool(Vec<bool>),
}

impl ArrayData {
    pub fn dtype(&self) -> DType {
        match self {
            ArrayData::U8(_) => DType::U8,
            ArrayData::I32(_) => DType::I32,
            ArrayData::U32(_) => DType::U32,
            ArrayData::F32(_) => DType::F32,
            ArrayData::Bool(_) => DType::Bool,
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::U8(v) => v.len(),
            ArrayData::I32(v) => v.len(),
            ArrayData::U32(v) => v.len(),
            ArrayData::F32(v) => v.len(),
            ArrayData::Bool(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl From<&str> for ArrayData {
    fn from(s: &str) -> Self {
        ArrayData::U8(s.as_bytes().to_vec())
    }
}

/// Named arrays of one container, in key order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Archive {
    entries: BTreeMap<String, ArrayData>,
}

macro_rules! typed_getter {
    ($name:ident, $opt:ident, $variant:ident, $ty:ty) => {
        /// Required array of this element type.
        pub fn $name(&self, key: &str) -> Result<&[$ty], ArchiveError> {
            self.$opt(key)?
                .ok_or_else(|| ArchiveError::MissingKey(key.to_string()))
        }

        /// Optional array of this element type. A present key with another
        /// type is still an error.
        pub fn $opt(&self, key: &str) -> Result<Option<&[$ty]>, ArchiveError> {
            match self.entries.get(key) {
                None => Ok(None),
                Some(ArrayData::$variant(v)) => Ok(Some(v.as_slice())),
                Some(other) => Err(ArchiveError::WrongType {
                    key: key.to_string(),
                    expected: DType::$variant.name(),
                    found: other.dtype().name(),
                }),
            }
        }
    };
}

impl Archive {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, data: impl Into<ArrayData>) {
        self.entries.insert(key.into(), data.into());
    }

    pub fn get(&self, key: &str) -> Option<&ArrayData> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &ArrayData)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Move every entry of `other` into this archive, replacing equal keys.
    pub fn merge(&mut self, other: Archive) {
        self.entries.extend(other.entries);
    }

    /// Move the entries named in `keys` into a new archive.
    pub fn split_off_keys(&mut self, keys: &[&str]) -> Archive {
        let mut split = Archive::new();
        for key in keys {
            if let Some((key, data)) = self.entries.remove_entry(*key) {
                split.entries.insert(key, data);
            }
        }
        split
    }

    typed_getter!(u8s, opt_u8s, U8, u8);
    typed_getter!(i32s, opt_i32s, I32, i32);
    typed_getter!(u32s, opt_u32s, U32, u32);
    typed_getter!(f32s, opt_f32s, F32, f32);
    typed_getter!(bools, opt_bools, Bool, bool);

    /// Optional UTF-8 string stored as a byte array.
    pub fn opt_str(&self, key: &str) -> Result<Option<&str>, ArchiveError> {
        match self.opt_u8s(key)? {
            None => Ok(None),
            Some(bytes) => std::str::from_utf8(bytes)
                .map(Some)
                .map_err(|_| ArchiveError::WrongType {
                    key: key.to_string(),
                    expected: "utf-8 string",
                    found: "u8",
                }),
        }
    }

    pub fn str(&self, key: &str) -> Result<&str, ArchiveError> {
        self.opt_str(key)?
            .ok_or_else(|| ArchiveError::MissingKey(key.to_string()))
    }

    /// First element of a required scalar stored as a one-element array.
    pub fn i32_scalar(&self, key: &str) -> Result<i32, ArchiveError> {
        self.i32s(key)?.first().copied().ok_or(ArchiveError::Truncated)
    }
}

macro_rules! impl_from_vec {
    ($variant:ident, $ty:ty) => {
        impl From<Vec<$ty>> for ArrayData {
            fn from(v: Vec<$ty>) -> Self {
                ArrayData::$variant(v)
            }
        }
    };
}

impl_from_vec!(U8, u8);
impl_from_vec!(I32, i32);
impl_from_vec!(U32, u32);
impl_from_vec!(F32, f32);
impl_from_vec!(Bool, bool);

/// Encode an archive to bytes.
pub fn to_bytes(archive: &Archive) -> Result<Vec<u8>, ArchiveError> {
    let mut out = Vec::new();
    ArchiveWriter::new(&mut out).write_archive(archive)?;
    Ok(out)
}

/// Decode an archive from bytes.
pub fn from_bytes(bytes: &[u8]) -> Result<Archive, ArchiveError> {
    ArchiveReader::new(bytes).read_archive()
}
