//! Small PC bitmap font formats (spec.md §6 magic table): `.PCR` printer
//! soft fonts, and the DOS `.COM`-wrapped REXXCOM Font Mania / PSFCOM
//! formats. All three are fixed-256-glyph, single-cell-size strikes with
//! a short header in front — a much smaller cousin of the Windows FNT
//! strike this crate already reads in `codecs/winfnt.rs`.

use crate::error::{bad_structure, Error, Result};
use crate::font::{Font, FontProperties, Spacing};
use crate::glyph::Glyph;
use crate::raster::{Align, Raster};

const PCR_MAGIC: &[u8; 3] = b"KPG";
const PCR_HEADER_SIZE: usize = 11;
const NUM_SLOTS: usize = 256;

/// Decode a `.PCR` printer soft font. Header layout (spec.md §8 scenario
/// 3): `"KPG"`, `major:u8`, `minor:u8`, `' '`, `grid:u8`, `width:u8`,
/// `reserved:u8`, `reserved:u8`, `height:u8`, followed by 256 fixed-size
/// glyph cells of `ceildiv(width, 8) * height` bytes each, row-major MSB
/// first, codepoints 0..255 in order.
pub fn load_pcr(data: &[u8]) -> Result<Font> {
    if data.len() < PCR_HEADER_SIZE || &data[0..3] != PCR_MAGIC {
        return Err(Error::UnknownFormat);
    }
    let major = data[3];
    let minor = data[4];
    if data[5] != b' ' {
        return Err(bad_structure!("pcr: expected space separator in header"));
    }
    let width = data[7] as usize;
    let height = data[10] as usize;
    if width == 0 || height == 0 {
        return Err(bad_structure!("pcr: zero cell dimension"));
    }

    let stride = (width + 7) / 8;
    let cell_bytes = stride * height;
    let strike = data
        .get(PCR_HEADER_SIZE..PCR_HEADER_SIZE + cell_bytes * NUM_SLOTS)
        .ok_or_else(|| bad_structure!("pcr: truncated glyph table"))?;

    let mut glyphs = Vec::with_capacity(NUM_SLOTS);
    for (codepoint, cell) in strike.chunks_exact(cell_bytes).enumerate() {
        let raster = Raster::from_bytes(cell, width, height, stride, Align::Left);
        glyphs.push(Glyph::new(raster).with_codepoint_u32(codepoint as u32));
    }

    let mut props = FontProperties::default();
    props.spacing = Some(Spacing::CharacterCell);
    props.revision = Some(format!("{major}.{minor}"));
    props.source_format = Some("pcr".to_string());
    Ok(Font::new(glyphs, props))
}

/// Encode a font to `.PCR`. Requires exactly 256 character-cell glyphs of
/// equal size; codepoints outside 0..255 are not representable.
pub fn save_pcr(font: &Font) -> Result<Vec<u8>> {
    if font.spacing() != Spacing::CharacterCell {
        return Err(Error::ConstraintViolated("pcr: font must be character-cell".into()));
    }
    let glyphs = font.glyphs();
    if glyphs.len() != NUM_SLOTS {
        return Err(Error::ConstraintViolated("pcr: font must have exactly 256 glyphs".into()));
    }
    let (width, height) = font.raster_size();
    if width == 0 || width > 255 || height == 0 || height > 255 {
        return Err(Error::ConstraintViolated("pcr: cell dimensions must fit in a byte".into()));
    }
    let stride = (width + 7) / 8;

    let mut out = Vec::with_capacity(PCR_HEADER_SIZE + stride * height * NUM_SLOTS);
    out.extend(PCR_MAGIC);
    out.push(1);
    out.push(2);
    out.push(b' ');
    out.push(1);
    out.push(width as u8);
    out.push(0);
    out.push(0);
    out.push(height as u8);

    for codepoint in 0..NUM_SLOTS {
        let raster = font
            .get_by_codepoint(&[codepoint as u8])
            .map(|g| g.raster().clone())
            .unwrap_or_else(|| Raster::blank(width, height));
        out.extend(raster.to_bytes(Align::Left, Some(stride)));
    }
    Ok(out)
}

/// Find the byte offset a DOS `jmp short` (`EB xx`) at `data[0..2]` lands
/// on: displacement `xx` is relative to the instruction *after* the jump,
/// i.e. `2 + xx`. REXXCOM Font Mania and PSFCOM both use this trick to
/// skip a loader stub and land directly on their font header.
fn jmp_short_target(data: &[u8]) -> Option<usize> {
    if data.len() < 2 || data[0] != 0xeb {
        return None;
    }
    Some(2 + data[1] as usize)
}

/// Decode a REXXCOM Font Mania `.COM` font (magic `EB 4D`/`EB 4E`): the
/// jump stub lands on a small header — `height:u8`, `width:u8`,
/// `first_char:u8`, `count:u8` — followed by `count` fixed-cell glyphs.
pub fn load_rexxcom(data: &[u8]) -> Result<Font> {
    if data.len() < 2 || data[0] != 0xeb || (data[1] != 0x4d && data[1] != 0x4e) {
        return Err(Error::UnknownFormat);
    }
    let header_off = jmp_short_target(data).ok_or_else(|| bad_structure!("rexxcom: bad jump stub"))?;
    let header = data
        .get(header_off..header_off + 4)
        .ok_or_else(|| bad_structure!("rexxcom: jump target out of range"))?;
    let height = header[0] as usize;
    let width = header[1] as usize;
    let first_char = header[2];
    let count = header[3] as usize;
    if height == 0 || width == 0 || count == 0 {
        return Err(bad_structure!("rexxcom: zero-sized font header"));
    }

    let stride = (width + 7) / 8;
    let cell_bytes = stride * height;
    let table = data
        .get(header_off + 4..header_off + 4 + cell_bytes * count)
        .ok_or_else(|| bad_structure!("rexxcom: truncated glyph table"))?;

    let mut glyphs = Vec::with_capacity(count);
    for (i, cell) in table.chunks_exact(cell_bytes).enumerate() {
        let raster = Raster::from_bytes(cell, width, height, stride, Align::Left);
        glyphs.push(Glyph::new(raster).with_codepoint_u32(first_char as u32 + i as u32));
    }

    let mut props = FontProperties::default();
    props.spacing = Some(Spacing::CharacterCell);
    props.source_format = Some("rexxcom-fontmania".to_string());
    Ok(Font::new(glyphs, props))
}

/// Decode a PSFCOM font (magic `EB 04 EB C3`): a four-byte double jump
/// stub wrapping a PC Screen Font v1 table — `mode:u8`, `charsize:u8`,
/// then 256 (or 512 if `mode & 0x01`) glyphs of `charsize` bytes, each
/// row one byte (8-pixel-wide glyphs, the PSF1 convention).
pub fn load_psfcom(data: &[u8]) -> Result<Font> {
    if data.get(0..4) != Some(&[0xeb, 0x04, 0xeb, 0xc3][..]) {
        return Err(Error::UnknownFormat);
    }
    let psf_off = 4;
    let mode = *data.get(psf_off).ok_or_else(|| bad_structure!("psfcom: truncated mode byte"))?;
    let charsize = *data.get(psf_off + 1).ok_or_else(|| bad_structure!("psfcom: truncated charsize byte"))? as usize;
    if charsize == 0 {
        return Err(bad_structure!("psfcom: zero charsize"));
    }
    let count = if mode & 0x01 != 0 { 512 } else { 256 };

    let table = data
        .get(psf_off + 2..psf_off + 2 + charsize * count)
        .ok_or_else(|| bad_structure!("psfcom: truncated glyph table"))?;

    let mut glyphs = Vec::with_capacity(count);
    for (codepoint, cell) in table.chunks_exact(charsize).enumerate() {
        let raster = Raster::from_bytes(cell, 8, charsize, 1, Align::Left);
        glyphs.push(Glyph::new(raster).with_codepoint_u32(codepoint as u32));
    }

    let mut props = FontProperties::default();
    props.spacing = Some(Spacing::CharacterCell);
    props.source_format = Some("psfcom".to_string());
    Ok(Font::new(glyphs, props))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_pcr() -> Vec<u8> {
        let glyphs: Vec<Glyph> = (0..NUM_SLOTS).map(|i| Glyph::new(Raster::blank(8, 8)).with_codepoint_u32(i as u32)).collect();
        let font = Font::new(glyphs, FontProperties::default());
        save_pcr(&font).unwrap()
    }

    #[test]
    fn round_trips_a_minimal_pcr_font() {
        let encoded = minimal_pcr();
        let decoded = load_pcr(&encoded).unwrap();
        assert_eq!(decoded.glyphs().len(), NUM_SLOTS);
        assert_eq!(decoded.spacing(), Spacing::CharacterCell);
    }

    #[test]
    fn rejects_bad_pcr_magic() {
        assert!(matches!(load_pcr(b"not a pcr file at all!!"), Err(Error::UnknownFormat)));
    }

    #[test]
    fn jmp_short_lands_on_the_documented_offset() {
        assert_eq!(jmp_short_target(&[0xeb, 0x4d]), Some(0x4f));
        assert_eq!(jmp_short_target(&[0xeb, 0x4e]), Some(0x50));
    }

    #[test]
    fn rejects_non_psfcom_input() {
        assert!(matches!(load_psfcom(b"EB00EB00"), Err(Error::UnknownFormat)));
    }
}
