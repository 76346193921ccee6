//! Reverts Apple's "CgBI" PNG optimization.
//!
//! Xcode rewrites bundled PNGs: a private `CgBI` chunk is inserted before
//! `IHDR`, the image data is a raw deflate stream without zlib framing,
//! pixels are stored BGRA and colors are premultiplied by alpha. Standard
//! decoders reject the result, so the stream is rebuilt before decoding.

use crate::error::{Error, Result};
use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use flate2::read::DeflateDecoder;
use flate2::write::ZlibEncoder;
use flate2::{Compression, Crc};
use image::{DynamicImage, ImageFormat};
use log::{debug, trace};
use std::io::{Cursor, Read, Write};

pub const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];

const CGBI: &[u8; 4] = b"CgBI";
const IHDR: &[u8; 4] = b"IHDR";
const IDAT: &[u8; 4] = b"IDAT";

struct PngChunk<'a> {
    ty: [u8; 4],
    data: &'a [u8],
}

struct Header {
    width: usize,
    height: usize,
    /// bytes per pixel
    bpp: usize,
    /// bytes per unfiltered row
    stride: usize,
    /// size of the inflated image data, one filter byte per row
    raw_len: usize,
}

fn malformed(msg: impl std::fmt::Display) -> Error {
    Error::malformed("png", msg)
}

fn read_chunks(data: &[u8]) -> Result<Vec<PngChunk<'_>>> {
    if !data.starts_with(&PNG_SIGNATURE) {
        return Err(malformed("missing png signature"));
    }
    let mut chunks = vec![];
    let mut r = Cursor::new(data);
    r.set_position(PNG_SIGNATURE.len() as u64);
    while (r.position() as usize) < data.len() {
        let len = r.read_u32::<BigEndian>().map_err(malformed)? as usize;
        let mut ty = [0u8; 4];
        r.read_exact(&mut ty).map_err(malformed)?;
        let start = r.position() as usize;
        let end = start
            .checked_add(len)
            .filter(|e| *e + 4 <= data.len())
            .ok_or_else(|| malformed(format!("chunk {} truncated", String::from_utf8_lossy(&ty))))?;
        chunks.push(PngChunk {
            ty,
            data: &data[start..end],
        });
        // skip the crc, it is recomputed on output
        r.set_position((end + 4) as u64);
        if &ty == b"IEND" {
            break;
        }
    }
    Ok(chunks)
}

#[cfg(test)]
fn is_cgbi(data: &[u8]) -> bool {
    read_chunks(data)
        .map(|c| c.iter().any(|c| &c.ty == CGBI))
        .unwrap_or(false)
}

fn parse_header(data: &[u8]) -> Result<Header> {
    let mut r = Cursor::new(data);
    let width = r.read_u32::<BigEndian>().map_err(malformed)? as usize;
    let height = r.read_u32::<BigEndian>().map_err(malformed)? as usize;
    let bit_depth = r.read_u8().map_err(malformed)?;
    let color_type = r.read_u8().map_err(malformed)?;
    let _compression = r.read_u8().map_err(malformed)?;
    let _filter = r.read_u8().map_err(malformed)?;
    let interlace = r.read_u8().map_err(malformed)?;

    let bpp = match color_type {
        2 => 3,
        6 => 4,
        _ => return Err(malformed(format!("unsupported color type {}", color_type))),
    };
    if bit_depth != 8 {
        return Err(malformed(format!("unsupported bit depth {}", bit_depth)));
    }
    if interlace != 0 {
        return Err(malformed("interlaced CgBI images are not supported"));
    }
    if width == 0 || height == 0 {
        return Err(malformed(format!("empty image {}x{}", width, height)));
    }
    let (stride, raw_len) = width
        .checked_mul(bpp)
        .and_then(|stride| Some((stride, stride.checked_add(1)?.checked_mul(height)?)))
        .ok_or_else(|| malformed(format!("image {}x{} too large", width, height)))?;
    Ok(Header {
        width,
        height,
        bpp,
        stride,
        raw_len,
    })
}

fn paeth(a: u8, b: u8, c: u8) -> u8 {
    let p = a as i16 + b as i16 - c as i16;
    let pa = (p - a as i16).abs();
    let pb = (p - b as i16).abs();
    let pc = (p - c as i16).abs();
    if pa <= pb && pa <= pc {
        a
    } else if pb <= pc {
        b
    } else {
        c
    }
}

/// Undo per-scanline filtering, returning tightly packed rows
fn unfilter(raw: &[u8], h: &Header) -> Result<Vec<u8>> {
    let stride = h.stride;
    let expected = h.raw_len;
    if raw.len() < expected {
        return Err(malformed(format!(
            "image data too short: {} < {}",
            raw.len(),
            expected
        )));
    }
    let mut out = vec![0u8; h.height * stride];
    for y in 0..h.height {
        let line = &raw[y * (stride + 1)..(y + 1) * (stride + 1)];
        let filter = line[0];
        let line = &line[1..];
        let (done, rest) = out.split_at_mut(y * stride);
        let prev = if y > 0 {
            Some(&done[(y - 1) * stride..])
        } else {
            None
        };
        let cur = &mut rest[..stride];
        for x in 0..stride {
            let a = if x >= h.bpp { cur[x - h.bpp] } else { 0 };
            let b = prev.map(|p| p[x]).unwrap_or(0);
            let c = match prev {
                Some(p) if x >= h.bpp => p[x - h.bpp],
                _ => 0,
            };
            cur[x] = match filter {
                0 => line[x],
                1 => line[x].wrapping_add(a),
                2 => line[x].wrapping_add(b),
                3 => line[x].wrapping_add(((a as u16 + b as u16) / 2) as u8),
                4 => line[x].wrapping_add(paeth(a, b, c)),
                f => return Err(malformed(format!("unknown filter {} on row {}", f, y))),
            };
        }
    }
    Ok(out)
}

/// BGR(A) premultiplied to RGB(A) straight alpha, in place
fn restore_pixels(pixels: &mut [u8], bpp: usize) {
    for px in pixels.chunks_exact_mut(bpp) {
        px.swap(0, 2);
        if bpp == 4 {
            let a = px[3] as u32;
            if a > 0 && a < 255 {
                for c in &mut px[..3] {
                    *c = ((*c as u32 * 255 + a / 2) / a).min(255) as u8;
                }
            }
        }
    }
}

fn write_chunk(out: &mut Vec<u8>, ty: &[u8; 4], data: &[u8]) -> Result<()> {
    let mut crc = Crc::new();
    crc.update(ty);
    crc.update(data);
    out.write_u32::<BigEndian>(data.len() as u32)?;
    out.write_all(ty)?;
    out.write_all(data)?;
    out.write_u32::<BigEndian>(crc.sum())?;
    Ok(())
}

/// Rebuild a standard PNG out of a CgBI one. Anything else passes through
/// untouched.
pub fn revert_optimization(data: &[u8]) -> Result<Vec<u8>> {
    let chunks = read_chunks(data)?;
    if !chunks.iter().any(|c| &c.ty == CGBI) {
        trace!("not a CgBI png");
        return Ok(data.to_vec());
    }

    let ihdr = chunks
        .iter()
        .find(|c| &c.ty == IHDR)
        .ok_or_else(|| malformed("missing IHDR"))?;
    let header = parse_header(ihdr.data)?;

    let compressed: Vec<u8> = chunks
        .iter()
        .filter(|c| &c.ty == IDAT)
        .flat_map(|c| c.data.iter().copied())
        .collect();
    // sized by what actually inflates, never by the header
    let mut raw = Vec::new();
    DeflateDecoder::new(compressed.as_slice())
        .take(header.raw_len as u64)
        .read_to_end(&mut raw)
        .map_err(malformed)?;

    let mut pixels = unfilter(&raw, &header)?;
    restore_pixels(&mut pixels, header.bpp);

    let mut enc = ZlibEncoder::new(Vec::with_capacity(raw.len()), Compression::default());
    for row in pixels.chunks_exact(header.stride) {
        enc.write_all(&[0])?;
        enc.write_all(row)?;
    }
    let idat = enc.finish()?;

    let mut out = Vec::with_capacity(idat.len() + 1024);
    out.extend_from_slice(&PNG_SIGNATURE);
    let mut idat_written = false;
    for chunk in &chunks {
        match &chunk.ty {
            CGBI => {}
            IDAT => {
                if !idat_written {
                    write_chunk(&mut out, IDAT, &idat)?;
                    idat_written = true;
                }
            }
            ty => write_chunk(&mut out, ty, chunk.data)?,
        }
    }
    debug!(
        "reverted CgBI png {}x{}, {} -> {} bytes",
        header.width,
        header.height,
        data.len(),
        out.len()
    );
    Ok(out)
}

/// Revert the optimization if present and decode the PNG
pub fn decode_icon(data: &[u8]) -> Result<DynamicImage> {
    let png = revert_optimization(data)?;
    Ok(image::load_from_memory_with_format(&png, ImageFormat::Png)?)
}
