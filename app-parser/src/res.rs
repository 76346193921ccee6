//! Primitives shared by the binary XML and resource table decoders.
//!
//! Both formats are a tree of little endian chunks, each starting with a
//! `ResChunk_header`. Readers here work on borrowed byte buffers and report
//! structural problems as [std::io::Error] so callers can wrap them once.

use byteorder::{LittleEndian, ReadBytesExt};
use log::trace;
use std::io::{self, Cursor, ErrorKind, Read};

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[repr(u16)]
pub enum ChunkType {
    Null = 0x0000,
    StringPool = 0x0001,
    Table = 0x0002,
    Xml = 0x0003,
    XmlStartNamespace = 0x0100,
    XmlEndNamespace = 0x0101,
    XmlStartElement = 0x0102,
    XmlEndElement = 0x0103,
    XmlCdata = 0x0104,
    XmlResourceMap = 0x0180,
    TablePackage = 0x0200,
    TableType = 0x0201,
    TableTypeSpec = 0x0202,
    TableLibrary = 0x0203,
}

impl ChunkType {
    pub fn from_u16(ty: u16) -> Option<Self> {
        Some(match ty {
            0x0000 => ChunkType::Null,
            0x0001 => ChunkType::StringPool,
            0x0002 => ChunkType::Table,
            0x0003 => ChunkType::Xml,
            0x0100 => ChunkType::XmlStartNamespace,
            0x0101 => ChunkType::XmlEndNamespace,
            0x0102 => ChunkType::XmlStartElement,
            0x0103 => ChunkType::XmlEndElement,
            0x0104 => ChunkType::XmlCdata,
            0x0180 => ChunkType::XmlResourceMap,
            0x0200 => ChunkType::TablePackage,
            0x0201 => ChunkType::TableType,
            0x0202 => ChunkType::TableTypeSpec,
            0x0203 => ChunkType::TableLibrary,
            _ => return None,
        })
    }
}

pub(crate) fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(ErrorKind::InvalidData, msg.into())
}

/// Cursor positioned at `pos` inside `data`
pub(crate) fn cursor_at(data: &[u8], pos: usize) -> Cursor<&[u8]> {
    let mut r = Cursor::new(data);
    r.set_position(pos as u64);
    r
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ChunkHeader {
    /// Raw chunk type, see [ChunkType]
    pub ty: u16,
    /// Size of the chunk header, the body starts at `start + header_size`
    pub header_size: u16,
    /// Total size of the chunk including header and children
    pub size: u32,
    /// Offset of the chunk inside the buffer it was read from
    pub start: usize,
}

impl ChunkHeader {
    pub const SIZE: usize = 8;

    /// Read and bounds-check the chunk header at `pos`
    pub fn read(data: &[u8], pos: usize) -> io::Result<Self> {
        let mut r = cursor_at(data, pos);
        let ty = r.read_u16::<LittleEndian>()?;
        let header_size = r.read_u16::<LittleEndian>()?;
        let size = r.read_u32::<LittleEndian>()?;
        if (header_size as usize) < Self::SIZE || size < header_size as u32 {
            return Err(invalid(format!(
                "chunk 0x{:04x} at {} has bad sizes header={} size={}",
                ty, pos, header_size, size
            )));
        }
        let end = pos
            .checked_add(size as usize)
            .ok_or_else(|| invalid("chunk size overflow"))?;
        if end > data.len() {
            return Err(invalid(format!(
                "chunk 0x{:04x} at {} truncated: needs {} bytes, {} available",
                ty,
                pos,
                size,
                data.len() - pos
            )));
        }
        Ok(ChunkHeader {
            ty,
            header_size,
            size,
            start: pos,
        })
    }

    pub fn chunk_type(&self) -> Option<ChunkType> {
        ChunkType::from_u16(self.ty)
    }

    pub fn body(&self) -> usize {
        self.start + self.header_size as usize
    }

    pub fn end(&self) -> usize {
        self.start + self.size as usize
    }

    /// Headers of the chunks laid out back to back in `[from, self.end())`
    pub fn children(&self, data: &[u8], from: usize) -> io::Result<Vec<ChunkHeader>> {
        let mut pos = from;
        let mut ret = vec![];
        while pos + Self::SIZE <= self.end() {
            let child = ChunkHeader::read(data, pos)?;
            if child.end() > self.end() {
                return Err(invalid(format!(
                    "chunk 0x{:04x} at {} overruns its parent",
                    child.ty, pos
                )));
            }
            pos = child.end();
            ret.push(child);
        }
        Ok(ret)
    }
}

/// Decoded `ResStringPool`
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct StringPool {
    pub strings: Vec<String>,
}

impl StringPool {
    pub const UTF8_FLAG: u32 = 1 << 8;

    pub fn parse(data: &[u8], header: &ChunkHeader) -> io::Result<Self> {
        let mut r = cursor_at(data, header.start + ChunkHeader::SIZE);
        let string_count = r.read_u32::<LittleEndian>()? as usize;
        let _style_count = r.read_u32::<LittleEndian>()?;
        let flags = r.read_u32::<LittleEndian>()?;
        let strings_start = r.read_u32::<LittleEndian>()? as usize;
        let _styles_start = r.read_u32::<LittleEndian>()?;

        let end = header.end();
        if string_count > (end - header.start) / 4 {
            return Err(invalid(format!("string pool claims {} strings", string_count)));
        }

        r.set_position(header.body() as u64);
        let mut offsets = Vec::with_capacity(string_count);
        for _ in 0..string_count {
            offsets.push(r.read_u32::<LittleEndian>()? as usize);
        }

        let base = header.start + strings_start;
        let utf8 = flags & Self::UTF8_FLAG != 0;
        let mut strings = Vec::with_capacity(string_count);
        for offset in offsets {
            let pos = base + offset;
            if pos >= end {
                return Err(invalid(format!("string offset {} outside pool", offset)));
            }
            let pool = &data[..end];
            let s = if utf8 {
                read_utf8(pool, pos)?
            } else {
                read_utf16(pool, pos)?
            };
            strings.push(s);
        }
        trace!("string pool: {} strings, utf8={}", strings.len(), utf8);
        Ok(StringPool { strings })
    }

    pub fn get(&self, idx: u32) -> Option<&str> {
        self.strings.get(idx as usize).map(|s| s.as_str())
    }

    /// Lookup for signed indexes as stored in XML nodes, `-1` means none
    pub fn get_i32(&self, idx: i32) -> Option<&str> {
        if idx < 0 {
            None
        } else {
            self.get(idx as u32)
        }
    }
}

fn read_utf8_len(r: &mut Cursor<&[u8]>) -> io::Result<usize> {
    let first = r.read_u8()? as usize;
    if first & 0x80 != 0 {
        let second = r.read_u8()? as usize;
        Ok(((first & 0x7f) << 8) | second)
    } else {
        Ok(first)
    }
}

fn read_utf8(data: &[u8], pos: usize) -> io::Result<String> {
    let mut r = cursor_at(data, pos);
    let _chars = read_utf8_len(&mut r)?;
    let len = read_utf8_len(&mut r)?;
    let mut buf = vec![0; len];
    r.read_exact(&mut buf)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

fn read_utf16(data: &[u8], pos: usize) -> io::Result<String> {
    let mut r = cursor_at(data, pos);
    let first = r.read_u16::<LittleEndian>()? as usize;
    let len = if first & 0x8000 != 0 {
        let second = r.read_u16::<LittleEndian>()? as usize;
        ((first & 0x7fff) << 16) | second
    } else {
        first
    };
    if len > data.len() {
        return Err(invalid(format!("utf-16 string length {} too large", len)));
    }
    let mut units = Vec::with_capacity(len);
    for _ in 0..len {
        units.push(r.read_u16::<LittleEndian>()?);
    }
    Ok(String::from_utf16_lossy(&units))
}

pub const TYPE_NULL: u8 = 0x00;
pub const TYPE_REFERENCE: u8 = 0x01;
pub const TYPE_ATTRIBUTE: u8 = 0x02;
pub const TYPE_STRING: u8 = 0x03;
pub const TYPE_FLOAT: u8 = 0x04;
pub const TYPE_DIMENSION: u8 = 0x05;
pub const TYPE_FRACTION: u8 = 0x06;
pub const TYPE_INT_DEC: u8 = 0x10;
pub const TYPE_INT_HEX: u8 = 0x11;
pub const TYPE_INT_BOOLEAN: u8 = 0x12;
pub const TYPE_FIRST_COLOR: u8 = 0x1c;
pub const TYPE_LAST_COLOR: u8 = 0x1f;

/// `Res_value`: a typed 32 bit payload
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct ResValue {
    pub data_type: u8,
    pub data: u32,
}

impl ResValue {
    pub const SIZE: usize = 8;

    pub fn read(r: &mut impl Read) -> io::Result<Self> {
        let _size = r.read_u16::<LittleEndian>()?;
        let _res0 = r.read_u8()?;
        let data_type = r.read_u8()?;
        let data = r.read_u32::<LittleEndian>()?;
        Ok(ResValue { data_type, data })
    }

    pub fn is_reference(&self) -> bool {
        self.data_type == TYPE_REFERENCE
    }

    pub fn is_string(&self) -> bool {
        self.data_type == TYPE_STRING
    }

    /// Render the value the way `aapt dump xmltree` style tools print it
    pub fn to_text(&self, strings: &StringPool) -> String {
        match self.data_type {
            TYPE_NULL => String::new(),
            TYPE_REFERENCE => format!("@0x{:08X}", self.data),
            TYPE_ATTRIBUTE => format!("?0x{:08X}", self.data),
            TYPE_STRING => strings.get(self.data).unwrap_or_default().to_string(),
            TYPE_FLOAT => f32::from_bits(self.data).to_string(),
            TYPE_INT_DEC => (self.data as i32).to_string(),
            TYPE_INT_HEX => format!("0x{:x}", self.data),
            TYPE_INT_BOOLEAN => (self.data != 0).to_string(),
            TYPE_FIRST_COLOR..=TYPE_LAST_COLOR => format!("#{:08x}", self.data),
            _ => format!("0x{:08x}", self.data),
        }
    }
}
