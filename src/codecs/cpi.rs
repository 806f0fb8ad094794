//! DOS/OS2 CPI codepage font bundle codec (spec.md §4.7): one `.cpi` file
//! carries one or more code pages, each with one or more fixed-size raster
//! fonts. Three historical header dialects exist — plain `FONT` (MS-DOS
//! 3.3+), `FONT.NT` (Windows NT, wider fields), and `DRFONT` (DR-DOS,
//! fonts stored contiguously with an index table instead of individually
//! addressed) — this module reads all three and always writes plain
//! `FONT` on the way out, the dialect every consumer understands.

use crate::decoder::Stream;
use crate::error::{bad_structure, Error, Result};
use crate::font::{Font, FontProperties};
use crate::glyph::Glyph;
use crate::raster::{Align, Raster};

#[derive(Debug, Clone)]
pub struct CodePage {
    pub codepage: u16,
    pub fonts: Vec<Font>,
}

fn read_screen_font(s: &mut Stream, codepage: u16) -> Result<Font> {
    let height: u8 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated ScreenFontHeader.height"))?;
    let width: u8 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated ScreenFontHeader.width"))?;
    let _yaspect: u8 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated yAspect"))?;
    let _xaspect: u8 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated xAspect"))?;
    let num_chars: u16 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated numChars"))?;

    let bytewidth = ((width as usize) + 7) / 8;
    let stride = bytewidth.max(1);
    let mut glyphs = Vec::with_capacity(num_chars as usize);
    for i in 0..num_chars {
        let glyph_bytes = s
            .read_bytes(stride * height as usize)
            .ok_or_else(|| bad_structure!("cpi: truncated glyph bitmap"))?;
        let raster = Raster::from_bytes(glyph_bytes, width as usize, height as usize, stride, Align::Left);
        glyphs.push(Glyph::new(raster).with_codepoint_u32(i as u32));
    }

    let mut props = FontProperties::default();
    props.encoding = Some(crate::charmap::cpi_codepage_to_name(codepage));
    props.source_format = Some("cpi".to_string());
    Ok(Font::new(glyphs, props))
}

/// Decode the plain `FONT`/`FONT.NT` dialects, which both lay out
/// CodePageEntryHeader -> CodePageInfoHeader -> N x (ScreenFontHeader +
/// bitmap) identically; `FONT.NT`'s extra fields after `num_fonts` are
/// skipped since this crate has no use for the DBCS/glyph-count metadata.
fn load_font_dialect(data: &[u8], header_size: usize) -> Result<Vec<CodePage>> {
    let mut s = Stream::new(data);
    s.skip(8).ok_or_else(|| bad_structure!("cpi: truncated FontFileHeader id"))?; // id0 + "FONT   "
    s.skip(5).ok_or_else(|| bad_structure!("cpi: truncated FontFileHeader reserved"))?;
    let pnum: u16 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated pnum"))?;
    let _ptyp: u8 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated ptyp"))?;
    let fih_offset: u32 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated fih offset"))?;

    let mut pages = Vec::with_capacity(pnum as usize);
    let mut cpeh_offset = fih_offset as usize;
    for _ in 0..pnum {
        let mut cs = Stream::new(
            data.get(cpeh_offset..).ok_or_else(|| bad_structure!("cpi: CodePageEntryHeader offset out of range"))?,
        );
        let _cpeh_size: u16 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated cpeh_size"))?;
        let next_cpeh_offset: u32 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated next cpeh offset"))?;
        let _device_type: u16 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated device type"))?;
        cs.skip(8).ok_or_else(|| bad_structure!("cpi: truncated device name"))?;
        let codepage: u16 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated codepage"))?;
        cs.skip(6).ok_or_else(|| bad_structure!("cpi: truncated cpeh reserved"))?;
        let cpih_offset: u32 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated cpih offset"))?;

        let mut ps = Stream::new(
            data.get(cpih_offset as usize..).ok_or_else(|| bad_structure!("cpi: CodePageInfoHeader offset out of range"))?,
        );
        let _version: u16 = ps.read_le().ok_or_else(|| bad_structure!("cpi: truncated version"))?;
        let num_fonts: u16 = ps.read_le().ok_or_else(|| bad_structure!("cpi: truncated numFonts"))?;
        let _size: u16 = ps.read_le().ok_or_else(|| bad_structure!("cpi: truncated size"))?;

        let mut fonts = Vec::with_capacity(num_fonts as usize);
        for _ in 0..num_fonts {
            fonts.push(read_screen_font(&mut ps, codepage)?);
        }
        pages.push(CodePage { codepage, fonts });

        if next_cpeh_offset == 0xffff_ffff || next_cpeh_offset == 0 {
            break;
        }
        cpeh_offset = next_cpeh_offset as usize;
    }
    let _ = header_size;
    Ok(pages)
}

/// Decode the `DRFONT` dialect: fonts are stored contiguously right after
/// the CodePageInfoHeader's fixed region, addressed via a trailing offset
/// table (`fontOffsets`/`fontHeights`) rather than being walked in place.
fn load_drfont_dialect(data: &[u8]) -> Result<Vec<CodePage>> {
    let mut s = Stream::new(data);
    s.skip(8).ok_or_else(|| bad_structure!("cpi: truncated FontFileHeader id"))?;
    s.skip(5).ok_or_else(|| bad_structure!("cpi: truncated FontFileHeader reserved"))?;
    let pnum: u16 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated pnum"))?;
    let _ptyp: u8 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated ptyp"))?;
    let fih_offset: u32 = s.read_le().ok_or_else(|| bad_structure!("cpi: truncated fih offset"))?;

    let mut pages = Vec::new();
    let mut cpeh_offset = fih_offset as usize;
    for _ in 0..pnum {
        let mut cs = Stream::new(data.get(cpeh_offset..).ok_or_else(|| bad_structure!("cpi: drfont cpeh offset out of range"))?);
        let _cpeh_size: u16 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated cpeh_size"))?;
        let next_cpeh_offset: u32 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated next cpeh offset"))?;
        let _device_type: u16 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated device type"))?;
        cs.skip(8).ok_or_else(|| bad_structure!("cpi: truncated device name"))?;
        let codepage: u16 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated codepage"))?;
        cs.skip(6).ok_or_else(|| bad_structure!("cpi: truncated cpeh reserved"))?;
        let cpih_offset: u32 = cs.read_le().ok_or_else(|| bad_structure!("cpi: truncated cpih offset"))?;

        let mut ps = Stream::new(data.get(cpih_offset as usize..).ok_or_else(|| bad_structure!("cpi: drfont cpih offset out of range"))?);
        let _version: u16 = ps.read_le().ok_or_else(|| bad_structure!("cpi: truncated version"))?;
        let num_fonts_max = 8usize; // DRFONT fixes a table of up to 8 candidate heights
        let font_heights: Vec<u16> = (0..num_fonts_max)
            .map(|_| ps.read_le::<u16>())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| bad_structure!("cpi: truncated drfont height table"))?;
        let font_widths: Vec<u16> = (0..num_fonts_max)
            .map(|_| ps.read_le::<u16>())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| bad_structure!("cpi: truncated drfont width table"))?;
        let num_fonts_here: u16 = ps.read_le().ok_or_else(|| bad_structure!("cpi: truncated drfont numFonts"))?;
        let font_offsets: Vec<u32> = (0..num_fonts_max)
            .map(|_| ps.read_le::<u32>())
            .collect::<Option<Vec<_>>>()
            .ok_or_else(|| bad_structure!("cpi: truncated drfont offset table"))?;

        let mut fonts = Vec::with_capacity(num_fonts_here as usize);
        for i in 0..num_fonts_here as usize {
            let height = font_heights[i] as usize;
            let width = font_widths[i] as usize;
            let offset = font_offsets[i] as usize;
            let bytewidth = (width + 7) / 8;
            let bitmap = data.get(offset..).ok_or_else(|| bad_structure!("cpi: drfont font offset out of range"))?;
            let num_chars = 256usize;
            let bytes_needed = bytewidth.max(1) * height * num_chars;
            let bitmap = bitmap.get(..bytes_needed).ok_or_else(|| bad_structure!("cpi: drfont bitmap truncated"))?;
            let mut glyphs = Vec::with_capacity(num_chars);
            let cell_bytes = bytewidth.max(1) * height;
            for (ch, chunk) in bitmap.chunks(cell_bytes).enumerate() {
                let raster = Raster::from_bytes(chunk, width, height, bytewidth.max(1), Align::Left);
                glyphs.push(Glyph::new(raster).with_codepoint_u32(ch as u32));
            }
            let mut props = FontProperties::default();
            props.encoding = Some(crate::charmap::cpi_codepage_to_name(codepage));
            props.source_format = Some("cpi-drfont".to_string());
            fonts.push(Font::new(glyphs, props));
        }
        pages.push(CodePage { codepage, fonts });

        if next_cpeh_offset == 0xffff_ffff || next_cpeh_offset == 0 {
            break;
        }
        cpeh_offset = next_cpeh_offset as usize;
    }
    Ok(pages)
}

/// Decode a `.cpi`/`.cpx` bundle, dispatching on the `id` field that
/// distinguishes `FONT`, `FONT.NT`, and `DRFONT` (spec.md §6 magic table).
pub fn load_cpi(data: &[u8]) -> Result<Vec<CodePage>> {
    let id = data.get(0..8).ok_or_else(|| bad_structure!("cpi: truncated id field"))?;
    if id == b"\xffFONT   " {
        load_font_dialect(data, 8)
    } else if id == b"\xffFONT.NT" {
        load_font_dialect(data, 8)
    } else if id == b"\xffDRFONT " {
        load_drfont_dialect(data)
    } else {
        Err(Error::UnknownFormat)
    }
}

/// Encode a set of codepages to the plain `FONT` dialect.
pub fn save_cpi(pages: &[CodePage]) -> Result<Vec<u8>> {
    if pages.is_empty() {
        return Err(Error::ConstraintViolated("cpi: no code pages to write".into()));
    }
    let mut out = Vec::new();
    out.push(0xff);
    out.extend(b"FONT   ");
    out.extend(std::iter::repeat(0u8).take(5));
    out.extend((pages.len() as u16).to_le_bytes());
    out.push(1u8);
    let fih_offset = out.len() as u32 + 4;
    out.extend(fih_offset.to_le_bytes());

    let mut cpeh_bodies = Vec::new();
    for page in pages {
        let mut cpih = Vec::new();
        cpih.extend(1u16.to_le_bytes()); // version = FONT
        cpih.extend((page.fonts.len() as u16).to_le_bytes());
        cpih.extend(0u16.to_le_bytes()); // size, unused on read

        for font in &page.fonts {
            let (width, height) = font.raster_size();
            cpih.push(height as u8);
            cpih.push(width as u8);
            cpih.push(96); // yaspect
            cpih.push(96); // xaspect
            cpih.extend((font.glyphs().len() as u16).to_le_bytes());
            let bytewidth = (width + 7) / 8;
            for glyph in font.glyphs() {
                cpih.extend(glyph.raster().to_bytes(Align::Left, Some(bytewidth)));
            }
        }
        cpeh_bodies.push((page.codepage, cpih));
    }

    let mut cpeh_offset = fih_offset as usize;
    let mut cpih_offset = cpeh_offset + cpeh_bodies.len() * 32;
    let mut body = Vec::new();
    for (i, (codepage, cpih)) in cpeh_bodies.iter().enumerate() {
        let mut cpeh = Vec::new();
        cpeh.extend(28u16.to_le_bytes()); // cpeh_size
        let is_last = i + 1 == cpeh_bodies.len();
        let next = if is_last { 0xffff_ffffu32 } else { (cpeh_offset + 32) as u32 };
        cpeh.extend(next.to_le_bytes());
        cpeh.extend(1u16.to_le_bytes()); // device type = screen
        let mut device_name = b"EGA     ".to_vec();
        device_name.resize(8, 0);
        cpeh.extend(device_name);
        cpeh.extend(codepage.to_le_bytes());
        cpeh.extend(std::iter::repeat(0u8).take(6));
        cpeh.extend((cpih_offset as u32).to_le_bytes());
        body.extend(cpeh);
        cpeh_offset += 32;
        cpih_offset += cpih.len();
    }
    for (_, cpih) in &cpeh_bodies {
        body.extend(cpih);
    }

    out.extend(body);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Raster;

    fn one_page_font() -> CodePage {
        let glyphs: Vec<Glyph> = (0..4).map(|i| Glyph::new(Raster::blank(8, 8)).with_codepoint_u32(i)).collect();
        let font = Font::new(glyphs, FontProperties::default());
        CodePage { codepage: 437, fonts: vec![font] }
    }

    #[test]
    fn round_trips_a_single_codepage() {
        let pages = vec![one_page_font()];
        let encoded = save_cpi(&pages).unwrap();
        let decoded = load_cpi(&encoded).unwrap();
        assert_eq!(decoded.len(), 1);
        assert_eq!(decoded[0].codepage, 437);
        assert_eq!(decoded[0].fonts[0].glyphs().len(), 4);
    }

    #[test]
    fn rejects_unknown_id() {
        let data = vec![0u8; 32];
        assert!(matches!(load_cpi(&data), Err(Error::UnknownFormat)));
    }
}
