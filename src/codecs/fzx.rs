//! FZX codec (spec.md §4.9): a compact proportional bitmap font format
//! from the ZX Spectrum scene, designed for cheap rendering on Z80
//! hardware. Glyph rows are packed MSB-first per byte, one byte-column
//! strip at a time (i.e. glyph data is stored column-major within each
//! character, not row-major), and widths are variable per glyph with a
//! shared per-font cell height.

use crate::error::{bad_structure, Error, Result};
use crate::font::{Font, FontProperties, Spacing};
use crate::glyph::Glyph;
use crate::raster::Raster;

const HEADER_SIZE: usize = 9;

/// Decode an FZX font. Header: `height:u8`, `tracking:i8`, `baseline:u8`,
/// `first_char:u8`, `last_char:u8`, `bitmaps_ptr:u16`, `widths_ptr:u16`
/// little-endian pointers the in-memory loader uses, ignored by this
/// codec since the bitmap and width tables immediately follow the
/// 9-byte header in the on-disk layout. Each glyph's data is `height`
/// bytes tall and `ceildiv(width, 8)` bytes wide, stored column-major
/// (column 0's 8-pixel-tall byte strip, then column 1's, ...).
pub fn load_fzx(data: &[u8]) -> Result<Font> {
    if data.len() < HEADER_SIZE {
        return Err(Error::BadStructure("fzx: truncated header".into()));
    }
    let height = data[0] as usize;
    let tracking = data[1] as i8;
    let baseline = data[2];
    let first_char = data[3];
    let last_char = data[4];
    // bytes 5..9 are the in-memory bitmap/width pointers; unused on disk.

    let num_chars = last_char as usize - first_char as usize + 1;
    let widths_start = data.len() - num_chars;
    let widths = data
        .get(widths_start..)
        .ok_or_else(|| bad_structure!("fzx: width table out of range"))?;

    let rows_per_byte = 8usize;
    let rows = (height + rows_per_byte - 1) / rows_per_byte;

    let mut pos = HEADER_SIZE;
    let mut glyphs = Vec::with_capacity(num_chars);
    for (i, &raw_width) in widths.iter().enumerate() {
        let width = (raw_width & 0x7f) as usize;
        let bytes_needed = width * rows;
        let glyph_bytes = data
            .get(pos..pos + bytes_needed)
            .ok_or_else(|| bad_structure!("fzx: glyph bitmap out of range"))?;
        pos += bytes_needed;

        let mut bit_rows = vec![vec![false; width]; height];
        for col in 0..width {
            for row_byte in 0..rows {
                let byte = glyph_bytes[col * rows + row_byte];
                for bit in 0..8 {
                    let row = row_byte * 8 + bit;
                    if row >= height {
                        break;
                    }
                    bit_rows[row][col] = (byte >> (7 - bit)) & 1 != 0;
                }
            }
        }
        let raster = Raster::from_rows(bit_rows).unwrap_or_else(Raster::empty);
        let codepoint = first_char as u32 + i as u32;
        glyphs.push(
            Glyph::new(raster)
                .with_codepoint_u32(codepoint)
                .with_right_bearing(tracking as i32)
                .with_shift_up(height as i32 - baseline as i32),
        );
    }

    let mut props = FontProperties::default();
    props.ascent = Some(baseline as i32);
    props.descent = Some(height as i32 - baseline as i32);
    props.spacing = Some(Spacing::Proportional);
    props.source_format = Some("fzx".to_string());

    Ok(Font::new(glyphs, props))
}

/// Encode a font as FZX. All glyphs share the font's `raster_size()`
/// height; per-glyph width varies, capped to 7 bits per the format's
/// width-byte layout (its high bit is reserved, per spec.md §6 notes on
/// format-native field-width ceilings).
pub fn save_fzx(font: &Font) -> Result<Vec<u8>> {
    let glyphs = font.glyphs();
    if glyphs.is_empty() {
        return Err(Error::ConstraintViolated("fzx: font has no glyphs".into()));
    }
    let codepoints: Vec<u8> = glyphs
        .iter()
        .filter_map(|g| g.codepoint().and_then(|cp| cp.first().copied()))
        .collect();
    let first_char = *codepoints.iter().min().ok_or_else(|| Error::ConstraintViolated("fzx: no labelled glyphs".into()))?;
    let last_char = *codepoints.iter().max().unwrap();
    let height = font.raster_size().1;
    if height == 0 {
        return Err(Error::ConstraintViolated("fzx: font has zero height".into()));
    }
    let baseline = font.ascent().clamp(0, height as i32) as u8;
    let tracking = glyphs[0].right_bearing().clamp(-128, 127) as i8;

    let rows = (height + 7) / 8;
    let mut widths = Vec::new();
    let mut bitmap = Vec::new();
    for cp in first_char..=last_char {
        let glyph = font.get_by_codepoint(&[cp]);
        let raster = glyph.map(|g| g.raster().clone()).unwrap_or_else(|| Raster::blank(0, height));
        let width = raster.width().min(0x7f);
        widths.push(width as u8);
        for col in 0..width {
            for row_byte in 0..rows {
                let mut byte = 0u8;
                for bit in 0..8 {
                    let row = row_byte * 8 + bit;
                    if row < raster.height() && raster.get(col, row) {
                        byte |= 1 << (7 - bit);
                    }
                }
                bitmap.push(byte);
            }
        }
    }

    let mut out = Vec::with_capacity(HEADER_SIZE + bitmap.len() + widths.len());
    out.push(height as u8);
    out.push(tracking as u8);
    out.push(baseline);
    out.push(first_char);
    out.push(last_char);
    out.extend(0u16.to_le_bytes());
    out.extend(0u16.to_le_bytes());
    out.extend(bitmap);
    out.extend(widths);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_a_minimal_font() {
        let glyphs = vec![
            Glyph::new(Raster::blank(4, 8)).with_codepoint_u32(65),
            Glyph::new(Raster::blank(5, 8)).with_codepoint_u32(66),
        ];
        let mut props = FontProperties::default();
        props.ascent = Some(6);
        let font = Font::new(glyphs, props);
        let encoded = save_fzx(&font).unwrap();
        let decoded = load_fzx(&encoded).unwrap();
        assert_eq!(decoded.glyphs().len(), 2);
        assert_eq!(decoded.glyphs()[0].raster().width(), 4);
        assert_eq!(decoded.glyphs()[1].raster().width(), 5);
    }
}
