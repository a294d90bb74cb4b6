//! Compiled proxy container writer

use super::{Archive, ArchiveError, ArrayData};
use byteorder::{LittleEndian, WriteBytesExt};
use lz4_flex::compress_prepend_size;
use mhproxy_shared::PROXY_FORMAT;
use std::io::{self, Write};

/// Writer for the compiled proxy container
pub struct ArchiveWriter<W: Write> {
    writer: W,
}

impl<W: Write> ArchiveWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write header and a single compressed section.
    pub fn write_archive(&mut self, archive: &Archive) -> Result<(), ArchiveError> {
        self.write_sections(&[archive])
    }

    /// Write header and one compressed section per archive, in order.
    pub fn write_sections(&mut self, sections: &[&Archive]) -> Result<(), ArchiveError> {
        let count = u32::try_from(sections.len())
            .map_err(|_| invalid("too many sections".to_string()))?;

        self.writer.write_all(PROXY_FORMAT.magic)?;
        self.writer.write_u32::<LittleEndian>(PROXY_FORMAT.version)?;
        self.writer.write_u32::<LittleEndian>(count)?;
        for section in sections {
            let block = compress_prepend_size(&encode_entries(section)?);
            let len = u32::try_from(block.len())
                .map_err(|_| invalid("section too large".to_string()))?;
            self.writer.write_u32::<LittleEndian>(len)?;
            self.writer.write_all(&block)?;
        }
        self.writer.flush()?;
        Ok(())
    }
}

fn invalid(msg: String) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidInput, msg)
}

fn encode_entries(archive: &Archive) -> io::Result<Vec<u8>> {
    let mut buf = Vec::new();
    buf.write_u32::<LittleEndian>(archive.len() as u32)?;

    for (key, data) in archive.iter() {
        let key_len = u8::try_from(key.len())
            .map_err(|_| invalid(format!("key `{key}` longer than 255 bytes")))?;
        let len = u32::try_from(data.len())
            .map_err(|_| invalid(format!("array `{key}` too large")))?;

        buf.write_u8(key_len)?;
        buf.write_all(key.as_bytes())?;
        buf.write_u8(data.dtype() as u8)?;
        buf.write_u32::<LittleEndian>(len)?;

        match data {
            ArrayData::U8(v) => buf.write_all(v)?,
            ArrayData::Bool(v) => buf.extend(v.iter().map(|&b| b as u8)),
            ArrayData::I32(v) => {
                for &x in v {
                    buf.write_i32::<LittleEndian>(x)?;
                }
            }
            ArrayData::U32(v) => {
                for &x in v {
                    buf.write_u32::<LittleEndian>(x)?;
                }
            }
            ArrayData::F32(v) => {
                for &x in v {
                    buf.write_f32::<LittleEndian>(x)?;
                }
            }
        }
    }
    Ok(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_layout() {
        let mut out = Vec::new();
        ArchiveWriter::new(&mut out)
            .write_archive(&Archive::new())
            .unwrap();
        assert_eq!(&out[0..4], b"MHPX");
        assert_eq!(&out[4..8], &PROXY_FORMAT.version.to_le_bytes());
        // one section
        assert_eq!(&out[8..12], &1u32.to_le_bytes());
        let block_len = u32::from_le_bytes([out[12], out[13], out[14], out[15]]) as usize;
        assert_eq!(out.len(), 16 + block_len);
        // size prefix of the 4-byte entry count payload
        assert_eq!(&out[16..20], &4u32.to_le_bytes());
    }

    #[test]
    fn test_sections_written_in_order() {
        let mut head = Archive::new();
        head.insert("uuid", "abc");
        let mut body = Archive::new();
        body.insert("weights", vec![1.0f32; 64]);

        let mut out = Vec::new();
        ArchiveWriter::new(&mut out)
            .write_sections(&[&head, &body])
            .unwrap();
        assert_eq!(&out[8..12], &2u32.to_le_bytes());

        let first = crate::formats::archive::ArchiveReader::new(out.as_slice())
            .read_first_section()
            .unwrap();
        assert!(first.contains("uuid"));
        assert!(!first.contains("weights"));
    }

    #[test]
    fn test_rejects_long_key() {
        let mut archive = Archive::new();
        archive.insert("k".repeat(300), vec![1u8]);
        let mut out = Vec::new();
        assert!(ArchiveWriter::new(&mut out).write_archive(&archive).is_err());
    }
}
