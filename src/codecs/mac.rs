//! Classic Mac OS bitmap font codec (spec.md §4.6): `NFNT`/`FONT`
//! resources (plain or RLE-compressed), read either from a raw resource
//! fork or from a `dfont` (data-fork resource) container, plus the Apple
//! IIgs font variant which shares the glyph-table shape but uses a
//! different resource wrapper.

use std::collections::BTreeMap;

use crate::bits::ceildiv;
use crate::decoder::Stream;
use crate::error::{bad_structure, Error, Result};
use crate::font::{Direction, Font, FontProperties};
use crate::glyph::Glyph;
use crate::raster::{Align, Raster};

const FONT_TYPE_NFNT: &str = "NFNT";
const FONT_TYPE_FONT: &str = "FONT";

#[derive(Debug)]
struct FontRecord {
    font_type: u16,
    first_char: u16,
    last_char: u16,
    row_words: u16,
    ascent: i16,
    descent: i16,
    leading: i16,
    bitmap_width: u16,
}

/// Decode a classic Mac bitmap font resource body (the bytes of one
/// `NFNT`/`FONT` resource, after resource-manager compression is already
/// removed by [`decompress_resource`] if needed).
pub fn load_nfnt(data: &[u8]) -> Result<Font> {
    let mut s = Stream::new(data);
    let font_type: u16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated fontType"))?;
    let first_char: u16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated firstChar"))?;
    let last_char: u16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated lastChar"))?;
    let _wid_max: u16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated widMax"))?;
    let _kern_max: i16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated kernMax"))?;
    let _n_descent: i16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated nDescent"))?;
    let font_rect_width: u16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated fRectWidth"))?;
    let font_rect_height: u16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated fRectHeight"))?;
    let _owt_loc: u16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated owTLoc"))?;
    let ascent: i16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated ascent"))?;
    let descent: i16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated descent"))?;
    let leading: i16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated leading"))?;
    let row_words: i16 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated rowWords"))?;

    let record = FontRecord {
        font_type,
        first_char,
        last_char,
        row_words: row_words as u16,
        ascent,
        descent,
        leading,
        bitmap_width: font_rect_width,
    };
    let _ = font_rect_height;

    let num_glyphs = record.last_char as usize - record.first_char as usize + 2; // + missing-glyph slot
    let strike_height = font_rect_height as usize;
    let strike_bytes = record.row_words as usize * 2;
    let strike_data = s
        .read_bytes(strike_bytes * strike_height)
        .ok_or_else(|| bad_structure!("mac: truncated bit image"))?;
    let strike = Raster::from_bytes(strike_data, strike_bytes * 8, strike_height, strike_bytes, Align::Left);

    let loc_table: Vec<u16> = (0..num_glyphs + 1)
        .map(|_| s.read_be::<u16>())
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| bad_structure!("mac: truncated location table"))?;
    let offset_width_table: Vec<(i8, u8)> = (0..num_glyphs)
        .map(|_| {
            let raw: u16 = s.read_be()?;
            Some(((raw >> 8) as i8, (raw & 0xff) as u8))
        })
        .collect::<Option<Vec<_>>>()
        .ok_or_else(|| bad_structure!("mac: truncated offset/width table"))?;

    let mut glyphs = Vec::with_capacity(num_glyphs);
    for i in 0..num_glyphs.saturating_sub(1) {
        let left = loc_table[i] as usize;
        let right = loc_table[i + 1] as usize;
        if right <= left {
            continue; // zero-width (undefined) glyph
        }
        let (offset, width) = offset_width_table[i];
        if width == 0xff {
            continue; // missing glyph marker
        }
        let raster = strike.crop(left, 0, strike.width() - right, 0);
        let codepoint = record.first_char as u32 + i as u32;
        glyphs.push(
            Glyph::new(raster)
                .with_codepoint_u32(codepoint)
                .with_left_bearing(offset as i32)
                .with_right_bearing((width as i32) - (right - left) as i32 - offset as i32)
                .with_shift_up(-(record.descent as i32)),
        );
    }

    let mut props = FontProperties::default();
    props.ascent = Some(record.ascent as i32);
    props.descent = Some(record.descent as i32);
    props.leading = Some(record.leading as i32);
    props.direction = Some(Direction::LeftToRight);
    props.encoding = Some("mac-roman".to_string());
    props.source_format = Some(format!("mac-{}", if record.font_type & 0x8000 != 0 { "nfnt" } else { "font" }));

    Ok(Font::new(glyphs, props))
}

/// Decompress a resource-manager-compressed `NFNT`/`FONT` body: classic
/// Mac OS stores some fonts with the bitmap data run-length encoded
/// (the high bit of `fontType`'s low byte marks this). Expansion walks a
/// byte at a time: a length byte `n` in `0..0x80` is a literal run of
/// `n+1` bytes copied verbatim; `0x80..=0xff` repeats the following byte
/// `257 - n` times.
pub fn decompress_resource(data: &[u8]) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(data.len() * 2);
    let mut i = 0;
    while i < data.len() {
        let n = data[i];
        i += 1;
        if n < 0x80 {
            let len = n as usize + 1;
            let end = (i + len).min(data.len());
            out.extend_from_slice(&data[i..end]);
            i = end;
        } else {
            let count = 257 - n as usize;
            let byte = *data.get(i).ok_or_else(|| bad_structure!("mac: truncated RLE repeat byte"))?;
            i += 1;
            out.extend(std::iter::repeat(byte).take(count));
        }
    }
    Ok(out)
}

/// A resource fork / `dfont` entry: a 4-byte type tag, a 16-bit resource
/// id, and the resource's raw bytes.
pub struct ResourceEntry {
    pub kind: [u8; 4],
    pub id: i16,
    pub data: Vec<u8>,
}

/// Parse a classic resource fork (or the data-fork-resident `dfont`
/// variant, which is byte-identical in layout, just stored in the data
/// fork instead of the resource fork).
pub fn parse_resource_fork(data: &[u8]) -> Result<Vec<ResourceEntry>> {
    let mut s = Stream::new(data);
    let data_offset: u32 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated resource header"))?;
    let map_offset: u32 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated resource header"))?;
    let _data_len: u32 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated resource header"))?;
    let _map_len: u32 = s.read_be().ok_or_else(|| bad_structure!("mac: truncated resource header"))?;
    let _ = data_offset;

    let map = data.get(map_offset as usize..).ok_or_else(|| bad_structure!("mac: resource map offset out of range"))?;
    let mut ms = Stream::new(map);
    ms.skip(24).ok_or_else(|| bad_structure!("mac: truncated resource map header"))?; // copy of header + next map handle + file ref num
    let _attrs: u16 = ms.read_be().ok_or_else(|| bad_structure!("mac: truncated map attrs"))?;
    let type_list_offset: u16 = ms.read_be().ok_or_else(|| bad_structure!("mac: truncated type list offset"))?;
    let name_list_offset: u16 = ms.read_be().ok_or_else(|| bad_structure!("mac: truncated name list offset"))?;

    let type_list = map.get(type_list_offset as usize..).ok_or_else(|| bad_structure!("mac: type list offset out of range"))?;
    let mut ts = Stream::new(type_list);
    let num_types: i16 = ts.read_be().ok_or_else(|| bad_structure!("mac: truncated type count"))?;

    let mut entries = Vec::new();
    for _ in 0..=num_types {
        let kind_bytes: &[u8] = ts.read_bytes(4).ok_or_else(|| bad_structure!("mac: truncated resource type"))?;
        let kind: [u8; 4] = kind_bytes.try_into().unwrap();
        let count_minus_one: i16 = ts.read_be().ok_or_else(|| bad_structure!("mac: truncated resource count"))?;
        let ref_list_offset: u16 = ts.read_be().ok_or_else(|| bad_structure!("mac: truncated ref list offset"))?;

        let ref_list = type_list
            .get(ref_list_offset as usize..)
            .ok_or_else(|| bad_structure!("mac: ref list offset out of range"))?;
        let mut rs = Stream::new(ref_list);
        for _ in 0..=count_minus_one {
            let id: i16 = rs.read_be().ok_or_else(|| bad_structure!("mac: truncated resource id"))?;
            let _name_offset: i16 = rs.read_be().ok_or_else(|| bad_structure!("mac: truncated name offset"))?;
            let packed_offset: u32 = rs.read_be().ok_or_else(|| bad_structure!("mac: truncated data offset"))?;
            rs.skip(4).ok_or_else(|| bad_structure!("mac: truncated handle field"))?;
            let entry_offset = data_offset as usize + (packed_offset & 0x00ff_ffff) as usize;
            let len_bytes: &[u8; 4] = data
                .get(entry_offset..entry_offset + 4)
                .and_then(|b| b.try_into().ok())
                .ok_or_else(|| bad_structure!("mac: resource data offset out of range"))?;
            let len = u32::from_be_bytes(*len_bytes) as usize;
            let body = data
                .get(entry_offset + 4..entry_offset + 4 + len)
                .ok_or_else(|| bad_structure!("mac: resource body out of range"))?;
            entries.push(ResourceEntry { kind, id, data: body.to_vec() });
        }
    }
    let _ = name_list_offset;
    Ok(entries)
}

/// Load every `NFNT`/`FONT` resource out of a resource fork / `dfont`
/// container (spec.md §4.6), decompressing RLE bodies where the
/// high bit of the low byte of `fontType` indicates compression.
pub fn load_dfont(data: &[u8]) -> Result<Vec<Font>> {
    let entries = parse_resource_fork(data)?;
    let mut fonts = Vec::new();
    for entry in entries {
        if &entry.kind != FONT_TYPE_NFNT.as_bytes() && &entry.kind != FONT_TYPE_FONT.as_bytes() {
            continue;
        }
        let font_type = u16::from_be_bytes([entry.data[0], entry.data[1]]);
        let body = if font_type & 0x0001 != 0 {
            decompress_resource(&entry.data[2..])?
        } else {
            entry.data.clone()
        };
        let mut full = entry.data[0..2].to_vec();
        full.extend(body);
        match load_nfnt(&full) {
            Ok(f) => fonts.push(f),
            Err(Error::BadStructure(msg)) => {
                log::warn!("mac: skipping malformed {}/{} resource: {msg}", String::from_utf8_lossy(&entry.kind), entry.id);
                continue;
            }
            Err(e) => return Err(e),
        }
    }
    if fonts.is_empty() {
        return Err(Error::BadStructure("mac: no NFNT/FONT resources found".into()));
    }
    Ok(fonts)
}

/// Pad or crop `raster` to exactly `height` rows, keeping its bottom
/// (baseline) edge fixed: short glyphs gain blank rows at the top, tall
/// ones lose rows off the top. Every glyph in an `NFNT` strike shares one
/// row band, so this is how [`save_nfnt`] reconciles per-glyph heights
/// with the format's single shared `fRectHeight`.
fn pad_to_height(raster: &Raster, height: usize) -> Raster {
    let h = raster.height();
    if h >= height {
        raster.crop(0, 0, 0, h - height)
    } else {
        raster.expand(0, 0, 0, height - h, false)
    }
}

/// Encode a classic Mac `NFNT` resource body (spec.md §4.6 "Encoder"):
/// reduce every glyph to its ink bounds, concatenate them horizontally
/// into one strike word-aligned by right-padding, and write the
/// location / offset-width tables `load_nfnt` reads back. Codepoints
/// outside `[first_char, last_char]` that have no glyph get the sentinel
/// `(0xFF, 0xFF)` "undefined" marker; a glyph tagged `"missing"` becomes
/// the trailing slot `load_nfnt` treats as the font's default glyph.
///
/// Lossy on round-trip: every glyph shares one ascent/descent/leading
/// triple (the format has no per-glyph vertical metrics), so a decoded
/// glyph's `shift_up` is always `-descent`, not the original per-glyph
/// value, unless every encoded glyph already agreed with that baseline.
pub fn save_nfnt(font: &Font) -> Result<Vec<u8>> {
    let mut by_codepoint: BTreeMap<u8, Glyph> = BTreeMap::new();
    for g in font.glyphs() {
        if g.tags().iter().any(|t| t == "missing") {
            continue;
        }
        if let Some(cp) = g.codepoint().map(|c| c.to_vec()).and_then(|c| crate::glyph::Label::Codepoint(c).as_codepoint_u32()) {
            if cp <= 0xff {
                by_codepoint.insert(cp as u8, g.reduce());
            }
        }
    }
    let first_char = *by_codepoint
        .keys()
        .next()
        .ok_or_else(|| Error::ConstraintViolated("mac: font has no single-byte-codepoint glyphs to encode".into()))?;
    let last_char = *by_codepoint.keys().next_back().unwrap();
    let missing_glyph = font.glyphs().iter().find(|g| g.tags().iter().any(|t| t == "missing")).map(|g| g.reduce());

    let strike_height = by_codepoint
        .values()
        .chain(missing_glyph.iter())
        .map(|g| g.raster().height())
        .max()
        .unwrap_or(0);

    let mut rasters = Vec::with_capacity((last_char as usize - first_char as usize) + 2);
    let mut offset_width: Vec<(i8, u8)> = Vec::with_capacity(rasters.capacity());
    let mut push_slot = |glyph: Option<&Glyph>, rasters: &mut Vec<Raster>, offset_width: &mut Vec<(i8, u8)>| -> Result<()> {
        match glyph {
            Some(g) => {
                let width = g.advance_width();
                let offset = g.left_bearing();
                if !(0..255).contains(&width) || !(-128..=127).contains(&offset) {
                    return Err(Error::ConstraintViolated(format!(
                        "mac: glyph advance {width} or offset {offset} does not fit a byte field"
                    )));
                }
                rasters.push(pad_to_height(g.raster(), strike_height));
                offset_width.push((offset as i8, width as u8));
            }
            None => {
                rasters.push(Raster::blank(0, strike_height));
                offset_width.push((0, 0xff));
            }
        }
        Ok(())
    };
    for cp in first_char..=last_char {
        push_slot(by_codepoint.get(&cp), &mut rasters, &mut offset_width)?;
    }
    push_slot(missing_glyph.as_ref(), &mut rasters, &mut offset_width)?;

    let strike = Raster::concat_horizontal(&rasters).unwrap_or_else(Raster::empty);
    let row_words = ceildiv(strike.width(), 16);
    let strike_bytes = row_words * 2;
    let strike_padded = strike.expand(0, 0, strike_bytes * 8 - strike.width(), 0, false);
    let strike_data = strike_padded.to_bytes(Align::Left, Some(strike_bytes));

    let mut loc_table = Vec::with_capacity(rasters.len() + 1);
    let mut x = 0u16;
    for r in &rasters {
        loc_table.push(x);
        x += r.width() as u16;
    }
    loc_table.push(x);

    let props = font.properties();
    let ascent = props.ascent.unwrap_or_else(|| font.ascent()) as i16;
    let descent = props.descent.unwrap_or_else(|| font.descent()) as i16;
    let leading = props.leading.unwrap_or(0) as i16;
    let wid_max = offset_width.iter().map(|&(_, w)| w).max().unwrap_or(0);

    let mut out = Vec::new();
    out.extend(0x9000u16.to_be_bytes()); // fontType: bit image only, no extra tables
    out.extend((first_char as u16).to_be_bytes());
    out.extend((last_char as u16).to_be_bytes());
    out.extend((wid_max as u16).to_be_bytes());
    out.extend(0i16.to_be_bytes()); // kernMax: not modelled, see module docs
    out.extend(0i16.to_be_bytes()); // nDescent (dfont high-word slot, unused here)
    out.extend((strike.width() as u16).to_be_bytes()); // fRectWidth
    out.extend((strike_height as u16).to_be_bytes()); // fRectHeight
    out.extend(0u16.to_be_bytes()); // owTLoc: width/offset table immediately follows location table
    out.extend(ascent.to_be_bytes());
    out.extend(descent.to_be_bytes());
    out.extend(leading.to_be_bytes());
    out.extend((row_words as i16).to_be_bytes());
    out.extend(strike_data);
    for loc in &loc_table {
        out.extend(loc.to_be_bytes());
    }
    for (offset, width) in &offset_width {
        let raw = ((*offset as u8 as u16) << 8) | *width as u16;
        out.extend(raw.to_be_bytes());
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rle_decompresses_literal_and_repeat_runs() {
        let packed = vec![0x01, 0xaa, 0xbb, 0xff, 0x00]; // literal run of 2, then repeat 0x00 2 times (257-255=2)
        let out = decompress_resource(&packed).unwrap();
        assert_eq!(out, vec![0xaa, 0xbb, 0x00, 0x00]);
    }

    #[test]
    fn rejects_truncated_header() {
        assert!(load_nfnt(&[0u8; 4]).is_err());
    }
}
