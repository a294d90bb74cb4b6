//! Compiled proxy container reader

use super::{Archive, ArchiveError, ArrayData, DType};
use byteorder::{LittleEndian, ReadBytesExt};
use lz4_flex::decompress_size_prepended;
use mhproxy_shared::PROXY_FORMAT;
use mhproxy_shared::fs::MAX_CACHE_BYTES;
use std::io::{self, Cursor, Read};

/// Upper bound on the LZ4 block expansion ratio.
const MAX_LZ4_RATIO: u64 = 255;

/// Reader for the compiled proxy container
pub struct ArchiveReader<R: Read> {
    reader: R,
}

fn eof_as_truncated(e: io::Error) -> ArchiveError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        ArchiveError::Truncated
    } else {
        ArchiveError::Io(e)
    }
}

impl<R: Read> ArchiveReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read and validate the header, then decode every section into one
    /// archive.
    pub fn read_archive(&mut self) -> Result<Archive, ArchiveError> {
        let sections = self.read_header()?;
        let mut archive = Archive::new();
        for _ in 0..sections {
            archive.merge(self.read_section()?);
        }
        Ok(archive)
    }

    /// Read the header and the first section only. Bytes of later sections
    /// are never read from the underlying reader.
    pub fn read_first_section(&mut self) -> Result<Archive, ArchiveError> {
        match self.read_header()? {
            0 => Ok(Archive::new()),
            _ => self.read_section(),
        }
    }

    /// Validate magic and version; returns the section count.
    fn read_header(&mut self) -> Result<u32, ArchiveError> {
        let mut magic = [0u8; 4];
        self.reader
            .read_exact(&mut magic)
            .map_err(eof_as_truncated)?;
        if &magic != PROXY_FORMAT.magic {
            return Err(ArchiveError::BadMagic);
        }

        let version = self
            .reader
            .read_u32::<LittleEndian>()
            .map_err(eof_as_truncated)?;
        if version != PROXY_FORMAT.version {
            return Err(ArchiveError::UnsupportedVersion {
                found: version,
                expected: PROXY_FORMAT.version,
            });
        }

        self.reader
            .read_u32::<LittleEndian>()
            .map_err(eof_as_truncated)
    }

    fn read_section(&mut self) -> Result<Archive, ArchiveError> {
        let len = self
            .reader
            .read_u32::<LittleEndian>()
            .map_err(eof_as_truncated)? as u64;
        if len > MAX_CACHE_BYTES {
            return Err(ArchiveError::Decompress(format!(
                "section of {len} compressed bytes"
            )));
        }

        let mut compressed = Vec::new();
        self.reader.by_ref().take(len).read_to_end(&mut compressed)?;
        if compressed.len() as u64 != len {
            return Err(ArchiveError::Truncated);
        }
        check_declared_size(&compressed)?;
        let payload = decompress_size_prepended(&compressed)
            .map_err(|e| ArchiveError::Decompress(e.to_string()))?;

        read_entries(&payload)
    }
}

/// Reject size prefixes no LZ4 block of this length can expand to, before
/// the decompressor allocates for them.
fn check_declared_size(compressed: &[u8]) -> Result<(), ArchiveError> {
    let declared = (&compressed[..])
        .read_u32::<LittleEndian>()
        .map_err(eof_as_truncated)? as u64;
    let ceiling = (compressed.len() as u64 * MAX_LZ4_RATIO).min(MAX_CACHE_BYTES);
    if declared > ceiling {
        return Err(ArchiveError::Decompress(format!(
            "declared payload of {declared} bytes from {} compressed bytes",
            compressed.len()
        )));
    }
    Ok(())
}

fn read_entries(payload: &[u8]) -> Result<Archive, ArchiveError> {
    let mut cursor = Cursor::new(payload);
    let count = cursor
        .read_u32::<LittleEndian>()
        .map_err(eof_as_truncated)?;

    let mut archive = Archive::new();
    for _ in 0..count {
        let key_len = cursor.read_u8().map_err(eof_as_truncated)? as usize;
        let mut key = vec![0u8; key_len];
        cursor.read_exact(&mut key).map_err(eof_as_truncated)?;
        let key = String::from_utf8(key).map_err(|e| {
            ArchiveError::Io(io::Error::new(io::ErrorKind::InvalidData, e))
        })?;

        let tag = cursor.read_u8().map_err(eof_as_truncated)?;
        let dtype = DType::from_u8(tag).ok_or_else(|| {
            ArchiveError::Io(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unknown element type {tag} for key `{key}`"),
            ))
        })?;
        let len = cursor
            .read_u32::<LittleEndian>()
            .map_err(eof_as_truncated)? as usize;

        // Refuse to allocate more than the payload can hold
        let remaining = payload.len() - cursor.position() as usize;
        if len.saturating_mul(dtype.size()) > remaining {
            return Err(ArchiveError::Truncated);
        }

        let data = read_array(&mut cursor, dtype, len).map_err(eof_as_truncated)?;
        archive.insert(key, data);
    }
    Ok(archive)
}

fn read_array(cursor: &mut Cursor<&[u8]>, dtype: DType, len: usize) -> io::Result<ArrayData> {
    Ok(match dtype {
        DType::U8 => {
            let mut v = vec![0u8; len];
            cursor.read_exact(&mut v)?;
            ArrayData::U8(v)
        }
        DType::Bool => {
            let mut v = vec![0u8; len];
            cursor.read_exact(&mut v)?;
            ArrayData::Bool(v.into_iter().map(|b| b != 0).collect())
        }
        DType::I32 => {
            let mut v = vec![0i32; len];
            cursor.read_i32_into::<LittleEndian>(&mut v)?;
            ArrayData::I32(v)
        }
        DType::U32 => {
            let mut v = vec![0u32; len];
            cursor.read_u32_into::<LittleEndian>(&mut v)?;
            ArrayData::U32(v)
        }
        DType::F32 => {
            let mut v = vec![0f32; len];
            cursor.read_f32_into::<LittleEndian>(&mut v)?;
            ArrayData::F32(v)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use byteorder::WriteBytesExt;
    use lz4_flex::compress_prepend_size;

    fn header(sections: u32) -> Vec<u8> {
        let mut bytes = PROXY_FORMAT.magic.to_vec();
        bytes.write_u32::<LittleEndian>(PROXY_FORMAT.version).unwrap();
        bytes.write_u32::<LittleEndian>(sections).unwrap();
        bytes
    }

    fn push_section(bytes: &mut Vec<u8>, block: &[u8]) {
        bytes.write_u32::<LittleEndian>(block.len() as u32).unwrap();
        bytes.extend_from_slice(block);
    }

    fn container(payload: &[u8]) -> Vec<u8> {
        let mut bytes = header(1);
        push_section(&mut bytes, &compress_prepend_size(payload));
        bytes
    }

    fn one_entry(key: &str, value: u8) -> Vec<u8> {
        let mut payload = Vec::new();
        payload.write_u32::<LittleEndian>(1).unwrap();
        payload.write_u8(key.len() as u8).unwrap();
        payload.extend_from_slice(key.as_bytes());
        payload.write_u8(DType::U8 as u8).unwrap();
        payload.write_u32::<LittleEndian>(1).unwrap();
        payload.push(value);
        payload
    }

    #[test]
    fn test_oversized_count_is_truncated() {
        let mut payload = Vec::new();
        payload.write_u32::<LittleEndian>(1).unwrap();
        payload.write_u8(1).unwrap();
        payload.push(b'a');
        payload.write_u8(DType::F32 as u8).unwrap();
        payload.write_u32::<LittleEndian>(u32::MAX).unwrap();

        let result = ArchiveReader::new(container(&payload).as_slice()).read_archive();
        assert!(matches!(result, Err(ArchiveError::Truncated)));
    }

    #[test]
    fn test_unknown_dtype_rejected() {
        let mut payload = Vec::new();
        payload.write_u32::<LittleEndian>(1).unwrap();
        payload.write_u8(1).unwrap();
        payload.push(b'a');
        payload.write_u8(42).unwrap();
        payload.write_u32::<LittleEndian>(0).unwrap();

        let result = ArchiveReader::new(container(&payload).as_slice()).read_archive();
        assert!(matches!(result, Err(ArchiveError::Io(_))));
    }

    #[test]
    fn test_implausible_size_prefix() {
        let mut bytes = header(1);
        push_section(&mut bytes, b"garbage");

        let result = ArchiveReader::new(bytes.as_slice()).read_archive();
        assert!(matches!(result, Err(ArchiveError::Decompress(_))));
    }

    #[test]
    fn test_missing_entries_is_truncated() {
        let mut payload = Vec::new();
        payload.write_u32::<LittleEndian>(3).unwrap();

        let result = ArchiveReader::new(container(&payload).as_slice()).read_archive();
        assert!(matches!(result, Err(ArchiveError::Truncated)));
    }

    #[test]
    fn test_section_shorter_than_declared_is_truncated() {
        let mut bytes = header(1);
        bytes.write_u32::<LittleEndian>(64).unwrap();
        bytes.extend_from_slice(&[0u8; 10]);

        let result = ArchiveReader::new(bytes.as_slice()).read_archive();
        assert!(matches!(result, Err(ArchiveError::Truncated)));
    }

    #[test]
    fn test_sections_merge_into_one_archive() {
        let mut bytes = header(2);
        push_section(&mut bytes, &compress_prepend_size(&one_entry("a", 1)));
        push_section(&mut bytes, &compress_prepend_size(&one_entry("b", 2)));

        let archive = ArchiveReader::new(bytes.as_slice()).read_archive().unwrap();
        assert_eq!(archive.u8s("a").unwrap(), &[1]);
        assert_eq!(archive.u8s("b").unwrap(), &[2]);
    }

    #[test]
    fn test_first_section_ignores_later_bytes() {
        let mut bytes = header(2);
        push_section(&mut bytes, &compress_prepend_size(&one_entry("uuid", 7)));
        // A second section that would fail to decode
        push_section(&mut bytes, b"not lz4 at all");

        let first = ArchiveReader::new(bytes.as_slice())
            .read_first_section()
            .unwrap();
        assert_eq!(first.u8s("uuid").unwrap(), &[7]);
        assert_eq!(first.len(), 1);

        assert!(ArchiveReader::new(bytes.as_slice()).read_archive().is_err());
    }

    #[test]
    fn test_first_section_stops_reading() {
        let mut bytes = header(2);
        push_section(&mut bytes, &compress_prepend_size(&one_entry("uuid", 7)));
        let first_len = bytes.len();
        push_section(&mut bytes, &compress_prepend_size(&one_entry("weights", 1)));

        let mut cursor = Cursor::new(bytes.as_slice());
        ArchiveReader::new(&mut cursor).read_first_section().unwrap();
        assert_eq!(cursor.position() as usize, first_len);
    }
}
