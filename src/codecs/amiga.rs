//! Amiga bitmap font codec (spec.md §4.8): Amiga fonts ship as a hunk
//! executable (the classic AmigaOS relocatable object format) embedding a
//! `DiskFontHeader`/`TextFont` structure pair, which in turn points at a
//! single strike bitmap plus per-glyph offset/width/spacing/kerning
//! tables.

use crate::error::{bad_structure, Error, Result};
use crate::font::{Font, FontProperties, Spacing};
use crate::glyph::Glyph;
use crate::raster::{Align, Raster};

const HUNK_HEADER: u32 = 0x3f3;
const HUNK_CODE: u32 = 0x3e9;
const HUNK_DATA: u32 = 0x3ea;
const DISKFONT_FILE_ID: u16 = 0x0f00;
const FPF_PROPORTIONAL: u8 = 0x02;
const FPF_ROM_FONT: u8 = 0x01;

fn read_u32_be(data: &[u8], offset: usize) -> Option<u32> {
    data.get(offset..offset + 4).map(|b| u32::from_be_bytes(b.try_into().unwrap()))
}

fn read_u16_be(data: &[u8], offset: usize) -> Option<u16> {
    data.get(offset..offset + 2).map(|b| u16::from_be_bytes(b.try_into().unwrap()))
}

/// Load the first CODE/DATA hunk's payload out of a hunk executable,
/// skipping the HUNK_HEADER preamble. Relocation hunks (`HUNK_RELOC32`)
/// are not applied: Amiga font files are self-contained single-hunk
/// objects in practice, so their internal pointers already read
/// correctly as hunk-relative offsets once the code/data payload is
/// isolated.
fn first_hunk_payload(data: &[u8]) -> Result<Vec<u8>> {
    let mut pos = 0;
    let header_type = read_u32_be(data, pos).ok_or_else(|| bad_structure!("amiga: truncated hunk file"))?;
    if header_type != HUNK_HEADER {
        return Err(Error::UnknownFormat);
    }
    pos += 4;
    // resident library name list: sequence of (len, name longwords) until a zero length
    loop {
        let len = read_u32_be(data, pos).ok_or_else(|| bad_structure!("amiga: truncated header name list"))?;
        pos += 4;
        if len == 0 {
            break;
        }
        pos += len as usize * 4;
    }
    let _table_size = read_u32_be(data, pos).ok_or_else(|| bad_structure!("amiga: truncated hunk table size"))?;
    pos += 4;
    let first_hunk = read_u32_be(data, pos).ok_or_else(|| bad_structure!("amiga: truncated first hunk index"))?;
    pos += 4;
    let last_hunk = read_u32_be(data, pos).ok_or_else(|| bad_structure!("amiga: truncated last hunk index"))?;
    pos += 4;
    let hunk_count = (last_hunk - first_hunk + 1) as usize;
    pos += hunk_count * 4; // hunk size table, one longword per hunk

    loop {
        let hunk_type = read_u32_be(data, pos).ok_or_else(|| bad_structure!("amiga: truncated hunk stream"))? & 0x3fff_ffff;
        pos += 4;
        if hunk_type == HUNK_CODE || hunk_type == HUNK_DATA {
            let size_longs = read_u32_be(data, pos).ok_or_else(|| bad_structure!("amiga: truncated hunk size"))?;
            pos += 4;
            let byte_len = size_longs as usize * 4;
            let payload = data.get(pos..pos + byte_len).ok_or_else(|| bad_structure!("amiga: hunk payload out of range"))?;
            return Ok(payload.to_vec());
        }
        // any other hunk kind before the first code/data hunk: not a font file we know how to read.
        return Err(Error::UnsupportedFeature(format!("amiga: unexpected hunk type 0x{hunk_type:x} before CODE/DATA")));
    }
}

/// Locate the embedded `DiskFontHeader` by scanning for its `dfh_FileID`
/// marker 14 bytes after a plausible `Node` start (the marker sits right
/// after the 14-byte Exec `Node` header every AmigaOS list element
/// begins with).
fn find_diskfont_header(payload: &[u8]) -> Option<usize> {
    for pos in (0..payload.len().saturating_sub(16)).step_by(2) {
        if read_u16_be(payload, pos + 14) == Some(DISKFONT_FILE_ID) {
            return Some(pos);
        }
    }
    None
}

/// Decode an Amiga hunk-format bitmap font file.
pub fn load_font(data: &[u8]) -> Result<Font> {
    let payload = first_hunk_payload(data)?;
    let base = find_diskfont_header(&payload).ok_or_else(|| bad_structure!("amiga: no DiskFontHeader found in hunk payload"))?;
    let tf = base + 22; // TextFont starts after Node + dfh_FileID + dfh_Revision + dfh_Segment

    let y_size = read_u16_be(&payload, tf + 20).ok_or_else(|| bad_structure!("amiga: truncated tf_YSize"))?;
    let style = *payload.get(tf + 22).ok_or_else(|| bad_structure!("amiga: truncated tf_Style"))?;
    let flags = *payload.get(tf + 23).ok_or_else(|| bad_structure!("amiga: truncated tf_Flags"))?;
    let x_size = read_u16_be(&payload, tf + 24).ok_or_else(|| bad_structure!("amiga: truncated tf_XSize"))?;
    let baseline = read_u16_be(&payload, tf + 26).ok_or_else(|| bad_structure!("amiga: truncated tf_Baseline"))?;
    let lo_char = *payload.get(tf + 32).ok_or_else(|| bad_structure!("amiga: truncated tf_LoChar"))?;
    let hi_char = *payload.get(tf + 33).ok_or_else(|| bad_structure!("amiga: truncated tf_HiChar"))?;
    let char_data_off = read_u32_be(&payload, tf + 34).ok_or_else(|| bad_structure!("amiga: truncated tf_CharData"))? as usize;
    let modulo = read_u16_be(&payload, tf + 38).ok_or_else(|| bad_structure!("amiga: truncated tf_Modulo"))? as usize;
    let char_loc_off = read_u32_be(&payload, tf + 40).ok_or_else(|| bad_structure!("amiga: truncated tf_CharLoc"))? as usize;
    let char_space_off = read_u32_be(&payload, tf + 44).ok_or_else(|| bad_structure!("amiga: truncated tf_CharSpace"))? as usize;
    let char_kern_off = read_u32_be(&payload, tf + 48).ok_or_else(|| bad_structure!("amiga: truncated tf_CharKern"))? as usize;

    let height = y_size as usize;
    let strike = payload
        .get(char_data_off..char_data_off + modulo * height)
        .ok_or_else(|| bad_structure!("amiga: char data out of range"))?;
    let strike_raster = Raster::from_bytes(strike, modulo * 8, height, modulo, Align::Left);

    let num_chars = hi_char as usize - lo_char as usize + 2; // +1 for the trailing sentinel loc entry, +1 default glyph
    let mut glyphs = Vec::with_capacity(num_chars.saturating_sub(1));
    for i in 0..num_chars.saturating_sub(1) {
        let loc_pos = char_loc_off + i * 4;
        let bit_offset = read_u16_be(&payload, loc_pos).ok_or_else(|| bad_structure!("amiga: truncated tf_CharLoc entry"))? as usize;
        let width = read_u16_be(&payload, loc_pos + 2).ok_or_else(|| bad_structure!("amiga: truncated tf_CharLoc entry"))? as usize;
        if width == 0 {
            continue;
        }
        let raster = strike_raster.crop(bit_offset, 0, strike_raster.width() - bit_offset - width, 0);

        let advance = if char_space_off != 0 {
            let pos = char_space_off + i * 2;
            read_u16_be(&payload, pos).map(|v| v as i16).unwrap_or(x_size as i16) as i32
        } else {
            x_size as i32
        };
        let left_bearing = if char_kern_off != 0 {
            let pos = char_kern_off + i * 2;
            read_u16_be(&payload, pos).map(|v| v as i16).unwrap_or(0) as i32
        } else {
            0
        };

        let codepoint = lo_char as u32 + i as u32;
        glyphs.push(
            Glyph::new(raster)
                .with_codepoint_u32(codepoint)
                .with_left_bearing(left_bearing)
                .with_right_bearing(advance - left_bearing - width as i32)
                .with_shift_up(height as i32 - baseline as i32 - 1),
        );
    }

    let mut props = FontProperties::default();
    props.ascent = Some(baseline as i32 + 1);
    props.descent = Some(height as i32 - baseline as i32 - 1);
    props.slant = Some(if style & 0x02 != 0 { "italic".to_string() } else { "roman".to_string() });
    props.weight = Some(if style & 0x01 != 0 { "bold".to_string() } else { "regular".to_string() });
    props.decoration = Some(if style & 0x04 != 0 { "underline".to_string() } else { "none".to_string() });
    props.spacing = Some(if flags & FPF_PROPORTIONAL != 0 { Spacing::Proportional } else { Spacing::Monospace });
    props.source_format = Some(if flags & FPF_ROM_FONT != 0 { "amiga-rom".to_string() } else { "amiga".to_string() });

    Ok(Font::new(glyphs, props))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_non_hunk_input() {
        assert!(matches!(load_font(b"not a hunk file"), Err(Error::UnknownFormat)));
    }

    #[test]
    fn finds_diskfont_header_marker() {
        let mut payload = vec![0u8; 40];
        payload[14] = 0x0f;
        payload[15] = 0x00;
        assert_eq!(find_diskfont_header(&payload), Some(0));
    }
}
