//! Windows FNT v1/v2/v3 codec (spec.md §4.4): the bitmap resource format
//! carried inside NE/PE/LX `.fon` containers (see [`crate::codecs::fon`])
//! and occasionally found as a bare `.fnt` file.
//!
//! Grounded on the header layout and charset/weight/style vocabularies of
//! `monobit.codecs.winfnt`: v1 glyph offsets are 16-bit and glyph bitmaps
//! are stored as one column-major strike per character; v2/v3 widen the
//! offset field to 32 bits and add aspect-ratio/colour-pointer fields.

use crate::bits::{bytes_to_bits, transpose_column_major, BitOrder};
use crate::decoder::{FromDataLe, Stream};
use crate::error::{bad_structure, Error, Result};
use crate::font::{Direction, Font, FontProperties, Spacing};
use crate::glyph::Glyph;
use crate::raster::{Align, Raster};

const DFVERSION_1: u16 = 0x0100;
const DFVERSION_2: u16 = 0x0200;
const DFVERSION_3: u16 = 0x0300;

/// Codepoints kept even with an all-blank strike, since an explicitly
/// defined blank NUL or space glyph is meaningful; every other all-blank
/// glyph is assumed to be an unused table slot.
const KEEP_EMPTY: [u32; 2] = [0x00, 0x20];

#[derive(Debug, Clone, Copy)]
struct Header {
    version: u16,
    points: u16,
    vert_res: u16,
    horiz_res: u16,
    ascent: u16,
    internal_leading: u16,
    external_leading: u16,
    italic: u8,
    underline: u8,
    strikeout: u8,
    weight: u16,
    charset: u8,
    pix_width: u16,
    pix_height: u16,
    pitch_and_family: u8,
    avg_width: u16,
    first_char: u8,
    last_char: u8,
    default_char: u8,
    break_char: u8,
    width_bytes: u16,
    bits_offset: u32,
    direction: u8,
}

fn read_fixed_string(bytes: &[u8]) -> String {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    String::from_utf8_lossy(&bytes[..end]).into_owned()
}

fn parse_header(s: &mut Stream) -> Result<Header> {
    let version: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated header"))?;
    if !matches!(version, DFVERSION_1 | DFVERSION_2 | DFVERSION_3) {
        return Err(Error::UnsupportedVersion(format!("dfVersion 0x{version:04x}")));
    }
    let _size: u32 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfSize"))?;
    s.skip(60).ok_or_else(|| bad_structure!("winfnt: truncated dfCopyright"))?; // dfCopyright
    let _type: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfType"))?;
    let points: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfPoints"))?;
    let vert_res: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfVertRes"))?;
    let horiz_res: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfHorizRes"))?;
    let ascent: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfAscent"))?;
    let internal_leading: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfInternalLeading"))?;
    let external_leading: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfExternalLeading"))?;
    let italic: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfItalic"))?;
    let underline: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfUnderline"))?;
    let strikeout: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfStrikeOut"))?;
    let weight: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfWeight"))?;
    let charset: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfCharSet"))?;
    let pix_width: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfPixWidth"))?;
    let pix_height: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfPixHeight"))?;
    let pitch_and_family: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfPitchAndFamily"))?;
    let avg_width: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfAvgWidth"))?;
    let _max_width: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfMaxWidth"))?;
    let first_char: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfFirstChar"))?;
    let last_char: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfLastChar"))?;
    let default_char: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfDefaultChar"))?;
    let break_char: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfBreakChar"))?;
    let width_bytes: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfWidthBytes"))?;
    let _device: u32 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfDevice"))?;
    let _face: u32 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfFace"))?;
    let _bits_pointer: u32 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfBitsPointer"))?;
    let bits_offset: u32 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfBitsOffset"))?;
    let _reserved: u8 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfReserved"))?;

    let mut direction = 0u8;
    if version != DFVERSION_1 {
        let _flags: u32 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfFlags"))?;
        let _a_space: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfAspace"))?;
        let _b_space: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfBspace"))?;
        let _c_space: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfCspace"))?;
        let _color_pointer: u32 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated dfColorPointer"))?;
        s.skip(16).ok_or_else(|| bad_structure!("winfnt: truncated dfReserved1"))?;
        if version == DFVERSION_3 {
            // v3 adds a dfPixWidthV3 / direction byte in some vendor variants;
            // kept at default (left-to-right) when absent.
            direction = 0;
        }
    }

    Ok(Header {
        version,
        points,
        vert_res,
        horiz_res,
        ascent,
        internal_leading,
        external_leading,
        italic,
        underline,
        strikeout,
        weight,
        charset,
        pix_width,
        pix_height,
        pitch_and_family,
        avg_width,
        first_char,
        last_char,
        default_char,
        break_char,
        width_bytes,
        bits_offset,
        direction,
    })
}

/// Windows FNT 1.0's character table is a single array of `n_chars + 1`
/// offsets (16-bit for v1) into the font's one shared bit-strike; a
/// glyph's width is the gap to the next offset, not a stored field.
/// Monospace (`dfPixWidth != 0`) v1 fonts have no table at all — every
/// glyph's offset is just `dfPixWidth * ordinal`.
fn v1_char_offsets(data: &[u8], header: &Header, table_offset: usize) -> Result<Vec<usize>> {
    let n_chars = header.last_char as usize - header.first_char as usize + 1;
    if header.pix_width != 0 {
        return Ok((0..=n_chars).map(|ord| header.pix_width as usize * ord).collect());
    }
    let mut s = Stream::new(data.get(table_offset..).unwrap_or(&[]));
    let mut offsets = Vec::with_capacity(n_chars + 1);
    for _ in 0..(n_chars + 1) {
        let offset: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated v1 char table offset"))?;
        offsets.push(offset as usize);
    }
    Ok(offsets)
}

/// Decode a Windows FNT 1.0 strike: `dfPixHeight` rows of `dfWidthBytes`
/// bytes, shared by every glyph, sliced into bit-columns
/// `[offset..offset+width)` per [`v1_char_offsets`].
fn glyphs_from_v1(data: &[u8], header: &Header, table_offset: usize) -> Result<Vec<Glyph>> {
    let offsets = v1_char_offsets(data, header, table_offset)?;
    let n_chars = header.last_char as usize - header.first_char as usize + 1;
    let width_bytes = header.width_bytes as usize;
    let height = header.pix_height as usize;
    let strike_start = header.bits_offset as usize;

    let mut strike_rows = Vec::with_capacity(height);
    for row in 0..height {
        let start = strike_start + row * width_bytes;
        let row_bytes = data.get(start..start + width_bytes).unwrap_or(&[]);
        let mut padded = vec![0u8; width_bytes];
        padded[..row_bytes.len()].copy_from_slice(row_bytes);
        strike_rows.push(bytes_to_bits(&padded, width_bytes * 8, 1, width_bytes, BitOrder::Msb).remove(0));
    }

    let mut glyphs = Vec::with_capacity(n_chars);
    for ord in 0..n_chars {
        let offset = offsets[ord];
        let width = offsets[ord + 1].saturating_sub(offset);
        if width == 0 {
            continue;
        }
        let rows: Vec<Vec<bool>> = strike_rows
            .iter()
            .map(|row| (offset..offset + width).map(|c| row.get(c).copied().unwrap_or(false)).collect())
            .collect();
        let raster = Raster::from_rows(rows).unwrap_or_else(Raster::empty);
        let codepoint = header.first_char as u32 + ord as u32;
        glyphs.push(Glyph::new(raster).with_codepoint_u32(codepoint).with_shift_up(header.ascent as i32 - header.pix_height as i32));
    }
    Ok(glyphs)
}

/// Decode a Windows FNT 2.0/3.0 character table: `n_chars` `(width:u16,
/// offset:u32)` entries, `offset` an absolute file position into a
/// column-major-per-glyph strike (not relative to `dfBitsOffset`).
fn glyphs_from_v2(data: &[u8], header: &Header, table_offset: usize) -> Result<Vec<Glyph>> {
    let n_chars = header.last_char as usize - header.first_char as usize + 1;
    let mut s = Stream::new(data.get(table_offset..).unwrap_or(&[]));
    let height = header.pix_height as usize;
    let mut glyphs = Vec::with_capacity(n_chars);
    for i in 0..n_chars {
        let width: u16 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated char table width"))?;
        let offset: u32 = s.read_le().ok_or_else(|| bad_structure!("winfnt: truncated char table offset"))?;
        let codepoint = header.first_char as u32 + i as u32;
        if width == 0 {
            continue;
        }
        let bytewidth = (width as usize + 7) / 8;
        let strike_bytes = bytewidth * height;
        let start = offset as usize;
        let glyph_bytes = data.get(start..start + strike_bytes).unwrap_or(&[]);
        let mut buf = vec![0u8; strike_bytes];
        buf[..glyph_bytes.len()].copy_from_slice(glyph_bytes);
        let row_major = transpose_column_major(&buf, bytewidth, height);
        let raster = Raster::from_bytes(&row_major, width as usize, height, bytewidth, Align::Left);
        // drop strikes with no ink unless the codepoint is a blank NUL/space
        // that's legitimately meant to be defined-but-empty.
        if !raster.has_ink() && !KEEP_EMPTY.contains(&codepoint) {
            continue;
        }
        glyphs.push(Glyph::new(raster).with_codepoint_u32(codepoint).with_shift_up(header.ascent as i32 - header.pix_height as i32));
    }
    Ok(glyphs)
}

fn weight_to_name(weight: u16) -> &'static str {
    if weight == 0 {
        return "regular";
    }
    let snapped = (weight.clamp(100, 900) + 50) / 100 * 100;
    match snapped {
        100 => "thin",
        200 => "extra-light",
        300 => "light",
        400 => "regular",
        500 => "medium",
        600 => "semi-bold",
        700 => "bold",
        800 => "extra-bold",
        900 => "heavy",
        _ => "regular",
    }
}

fn name_to_weight(name: &str) -> u16 {
    match name {
        "thin" => 100,
        "extra-light" => 200,
        "light" => 300,
        "regular" => 400,
        "medium" => 500,
        "semi-bold" => 600,
        "bold" => 700,
        "extra-bold" => 800,
        "heavy" => 900,
        _ => 400,
    }
}

/// Decode a Windows FNT resource (spec.md §4.4): the glyph bitmap data for
/// each character is stored as a column-major strike of `height` rows,
/// `ceildiv(width, 8)` bytes per row, which [`transpose_column_major`]
/// turns into the row-major layout [`Raster::from_bytes`] expects.
pub fn load_fnt(data: &[u8]) -> Result<Font> {
    let mut s = Stream::new(data);
    let header = parse_header(&mut s)?;
    let table_offset = s.get_offset();
    let glyphs = if header.version == DFVERSION_1 {
        glyphs_from_v1(data, &header, table_offset)?
    } else {
        glyphs_from_v2(data, &header, table_offset)?
    };

    let mut props = FontProperties::default();
    props.point_size = Some(header.points as i32);
    props.dpi = Some((header.horiz_res as i32, header.vert_res as i32));
    props.ascent = Some(header.ascent as i32);
    props.descent = Some(header.pix_height as i32 - header.ascent as i32);
    props.leading = Some(header.external_leading as i32);
    props.slant = Some(if header.italic != 0 { "italic".to_string() } else { "roman".to_string() });
    props.decoration = Some(
        match (header.underline != 0, header.strikeout != 0) {
            (true, true) => "underline strikethrough",
            (true, false) => "underline",
            (false, true) => "strikethrough",
            (false, false) => "none",
        }
        .to_string(),
    );
    props.weight = Some(weight_to_name(header.weight).to_string());
    props.setwidth = Some(if header.pitch_and_family & 0x01 != 0 { "proportional" } else { "fixed" }.to_string());
    props.encoding = Some({
        let name = crate::charmap::windows_charset_to_name(header.charset);
        if name.is_empty() {
            format!("windows-charset-0x{:02x}", header.charset)
        } else {
            name.to_string()
        }
    });
    props.average_advance = Some(header.avg_width as f64);
    props.direction = Some(if header.direction == 1 { Direction::RightToLeft } else { Direction::LeftToRight });
    props.spacing = Some(if header.pix_width != 0 { Spacing::CharacterCell } else { Spacing::Proportional });
    props.default_char = Some(crate::glyph::Label::codepoint(header.default_char as u32));
    props.word_boundary = Some(crate::glyph::Label::codepoint(header.break_char as u32));
    props.source_format = Some(format!("windows-fnt-v{}", header.version >> 8));

    Ok(Font::new(glyphs, props))
}

/// Encode a font as a Windows FNT v2 resource. v1 output is not offered on
/// the write side per spec.md §4.4 (the 16-bit offset field caps strike
/// size too tightly for contemporary inputs); v2 is accepted by every
/// Windows version v1 is.
pub fn save_fnt(font: &Font) -> Result<Vec<u8>> {
    let glyphs = font.glyphs();
    if glyphs.is_empty() {
        return Err(Error::ConstraintViolated("winfnt: font has no glyphs".into()));
    }
    let codepoints: Vec<u32> = glyphs.iter().filter_map(|g| g.codepoint().and_then(|_| {
        g.codepoint().map(|cp| cp.iter().fold(0u32, |acc, &b| (acc << 8) | b as u32))
    })).collect();
    if codepoints.iter().any(|&cp| cp > 0xff) {
        return Err(Error::ConstraintViolated("winfnt: codepoint exceeds 0xff, a FNT resource encodes one byte per glyph".into()));
    }
    let first_char = *codepoints.iter().min().ok_or_else(|| Error::ConstraintViolated("winfnt: no labelled glyphs".into()))? as u8;
    let last_char = *codepoints.iter().max().unwrap() as u8;

    let height = font.raster_size().1;
    let props = font.properties();

    let header_size = 148u32; // v2/v3 header length
    let entry_count = last_char as u32 - first_char as u32 + 2; // + terminal sentinel
    let table_size = entry_count * 6; // width:u16 + offset:u32
    let bits_offset = header_size + table_size;

    let mut strikes = Vec::new();
    let mut table: Vec<(u16, u32)> = Vec::new();
    let mut rel_offset = 0u32;
    for cp in first_char..=last_char {
        let glyph = font.get_by_codepoint(&[cp]);
        let (width, bytes) = match glyph {
            Some(g) => {
                let w = g.raster().width();
                let bw = (w + 7) / 8;
                let packed = g.raster().to_bytes(Align::Left, Some(bw));
                (w as u16, transpose_column_major(&packed, bw, height))
            }
            None => (0, Vec::new()),
        };
        table.push((width, bits_offset + rel_offset));
        rel_offset += bytes.len() as u32;
        strikes.extend(bytes);
    }
    table.push((0, bits_offset + rel_offset)); // terminal sentinel entry

    let mut out = Vec::new();
    out.extend(DFVERSION_2.to_le_bytes());
    let size_field_pos = out.len();
    out.extend(0u32.to_le_bytes()); // dfSize, patched below
    let copyright = props.copyright.clone().unwrap_or_default();
    let mut copyright_bytes = copyright.into_bytes();
    copyright_bytes.resize(60, 0);
    out.extend(copyright_bytes);
    out.extend(0u16.to_le_bytes()); // dfType
    out.extend((props.point_size.unwrap_or(height as i32) as u16).to_le_bytes());
    out.extend((props.dpi.map(|d| d.1).unwrap_or(96) as u16).to_le_bytes());
    out.extend((props.dpi.map(|d| d.0).unwrap_or(96) as u16).to_le_bytes());
    let ascent = font.ascent().max(0) as u16;
    out.extend(ascent.to_le_bytes());
    out.extend(0u16.to_le_bytes()); // dfInternalLeading
    out.extend((props.leading.unwrap_or(0) as u16).to_le_bytes());
    out.push(if props.slant.as_deref() == Some("italic") { 1 } else { 0 });
    let decoration = props.decoration.as_deref().unwrap_or("none");
    out.push(if decoration.contains("underline") { 1 } else { 0 });
    out.push(if decoration.contains("strikethrough") { 1 } else { 0 });
    out.extend(name_to_weight(props.weight.as_deref().unwrap_or("regular")).to_le_bytes());
    out.push(crate::charmap::windows_name_to_charset(props.encoding.as_deref().unwrap_or("")));
    let pix_width = if font.spacing() == Spacing::CharacterCell { font.raster_size().0 as u16 } else { 0 };
    out.extend(pix_width.to_le_bytes());
    out.extend((height as u16).to_le_bytes());
    out.push(if font.spacing() == Spacing::Proportional { 0x01 } else { 0x00 });
    out.extend((font.average_advance().round() as u16).to_le_bytes());
    let max_width = font.glyphs().iter().map(|g| g.raster().width()).max().unwrap_or(0) as u16;
    out.extend(max_width.to_le_bytes());
    out.push(first_char);
    out.push(last_char);
    out.push(props.default_char.as_ref().and_then(|l| l.as_codepoint_u32()).unwrap_or(0) as u8);
    out.push(props.word_boundary.as_ref().and_then(|l| l.as_codepoint_u32()).unwrap_or(0) as u8);
    out.extend(0u16.to_le_bytes()); // dfWidthBytes
    out.extend(0u32.to_le_bytes()); // dfDevice
    out.extend(0u32.to_le_bytes()); // dfFace
    out.extend(0u32.to_le_bytes()); // dfBitsPointer
    out.extend(bits_offset.to_le_bytes());
    out.push(0); // dfReserved
    out.extend(0u32.to_le_bytes()); // dfFlags
    out.extend(0u16.to_le_bytes()); // dfAspace
    out.extend(0u16.to_le_bytes()); // dfBspace
    out.extend(0u16.to_le_bytes()); // dfCspace
    out.extend(0u32.to_le_bytes()); // dfColorPointer
    out.extend(std::iter::repeat(0u8).take(16)); // dfReserved1

    for (width, off) in &table {
        out.extend(width.to_le_bytes());
        out.extend(off.to_le_bytes());
    }
    out.extend(strikes);

    let total_len = (out.len() as u32).to_le_bytes();
    out[size_field_pos..size_field_pos + 4].copy_from_slice(&total_len);

    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontProperties;

    // a raster with ink, not an all-blank square: an all-blank strike for a
    // non-NUL/space codepoint is now correctly dropped by the loader.
    fn square_glyph(cp: u32) -> Glyph {
        let mut rows = vec![vec![false; 8]; 8];
        rows[3][3] = true;
        Glyph::new(Raster::from_rows(rows).unwrap()).with_codepoint_u32(cp)
    }

    #[test]
    fn round_trips_a_minimal_character_cell_font() {
        let mut props = FontProperties::default();
        props.encoding = Some("windows-1252".to_string());
        let font = Font::new(vec![square_glyph(65), square_glyph(66)], props);
        let encoded = save_fnt(&font).unwrap();
        assert_eq!(&encoded[0..2], &DFVERSION_2.to_le_bytes());
        let decoded = load_fnt(&encoded).unwrap();
        assert_eq!(decoded.glyphs().len(), 2);
        assert_eq!(decoded.glyphs()[0].raster().width(), 8);
    }

    #[test]
    fn rejects_unknown_version() {
        let mut data = vec![0u8; 200];
        data[0] = 0xFF;
        data[1] = 0x09;
        assert!(load_fnt(&data).is_err());
    }

    #[test]
    fn weight_name_round_trips() {
        assert_eq!(weight_to_name(name_to_weight("bold")), "bold");
    }

    #[test]
    fn weight_900_maps_to_heavy_not_black() {
        assert_eq!(weight_to_name(900), "heavy");
    }

    #[test]
    fn weight_snaps_to_the_nearest_hundred() {
        assert_eq!(weight_to_name(750), "extra-bold");
        assert_eq!(weight_to_name(1000), "heavy");
        assert_eq!(weight_to_name(50), "thin");
    }

    #[test]
    fn save_rejects_a_codepoint_above_0xff() {
        let glyph = Glyph::new(Raster::blank(1, 1)).with_codepoint_u32(0x1234);
        let font = Font::new(vec![glyph], FontProperties::default());
        assert!(matches!(save_fnt(&font), Err(Error::ConstraintViolated(_))));
    }

    #[test]
    fn v2_drops_blank_strikes_except_nul_and_space() {
        // codepoint 0x41 ('A') has a strike but it's all zero bits; 0x20
        // (space) is all zero too but must survive as a real, empty glyph.
        let first_char = 0x20u8;
        let last_char = 0x41u8;
        let n_chars = last_char as usize - first_char as usize + 1;
        let header_size = 148usize;
        let table_size = (n_chars + 1) * 6;
        let bits_offset = header_size + table_size;

        let mut data = vec![0u8; header_size];
        data[0..2].copy_from_slice(&DFVERSION_2.to_le_bytes());
        data[88..90].copy_from_slice(&8u16.to_le_bytes()); // dfPixHeight
        data[95] = first_char;
        data[96] = last_char;

        let mut table = Vec::new();
        let mut strikes = Vec::new();
        for cp in first_char..=last_char {
            let width = 8u16;
            table.extend(width.to_le_bytes());
            table.extend(((bits_offset + strikes.len()) as u32).to_le_bytes());
            let _ = cp;
            strikes.extend([0u8; 8]); // all-blank 8x8 strike for every glyph
        }
        table.extend(0u16.to_le_bytes());
        table.extend(((bits_offset + strikes.len()) as u32).to_le_bytes());

        data.extend(table);
        data.extend(strikes);

        let font = load_fnt(&data).unwrap();
        assert!(font.get_by_codepoint(&[0x20]).is_some());
        assert!(font.get_by_codepoint(&[0x41]).is_none());
    }
}
