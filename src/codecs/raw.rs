//! Raw/strike codec (spec.md §4.3): a configurable-geometry bitmap strike
//! with no header at all, used both standalone and as the innermost
//! payload of several other formats (Windows FNT v1, Amiga, CPI, FZX).

use crate::bits::ceildiv;
use crate::error::{Error, Result};
use crate::font::{Font, FontProperties, Spacing};
use crate::glyph::Glyph;
use crate::raster::{Align, Raster};

#[derive(Debug, Clone, Copy)]
pub struct RawParams {
    pub cell: (usize, usize),
    pub offset: usize,
    pub padding: usize,
    /// `<= 0` means "all that fit".
    pub count: i64,
    /// `<= 0` means "derive from strike_bytes/width".
    pub strike_count: i64,
    /// `-1` means "derive from strike_count*width/8".
    pub strike_bytes: i64,
    pub align: Align,
    pub first_codepoint: u32,
}

impl Default for RawParams {
    fn default() -> Self {
        Self {
            cell: (8, 8),
            offset: 0,
            padding: 0,
            count: -1,
            strike_count: 1,
            strike_bytes: -1,
            align: Align::Left,
            first_codepoint: 0,
        }
    }
}

/// Decode a character-cell font from a raw bitmap strike (spec.md §4.3
/// algorithm steps 1-6).
pub fn load_binary(data: &[u8], params: &RawParams) -> Result<Font> {
    let data = data.get(params.offset..).unwrap_or(&[]);
    let (width, height) = params.cell;
    if width == 0 || height == 0 {
        return Err(Error::BadStructure("raw codec: zero-sized cell".into()));
    }

    let (strike_bytes, strike_count) = if params.strike_bytes <= 0 {
        if params.strike_count <= 0 {
            let derived = if height == 0 { 0 } else { data.len() / height };
            (derived, derived * 8 / width)
        } else {
            let sc = params.strike_count as usize;
            (ceildiv(sc * width, 8), sc)
        }
    } else {
        let sb = params.strike_bytes as usize;
        let sc = if params.strike_count <= 0 {
            (sb * 8) / width
        } else {
            params.strike_count as usize
        };
        (sb, sc)
    };
    if strike_count == 0 || strike_bytes == 0 {
        return Err(Error::BadStructure("raw codec: could not derive strike geometry".into()));
    }

    let row_bytes = strike_bytes * height + params.padding;
    let (count, nrows) = if params.count <= 0 {
        let nrows = ceildiv(data.len(), row_bytes.max(1));
        (nrows * strike_count, nrows)
    } else {
        let count = params.count as usize;
        (count, ceildiv(count, strike_count))
    };

    let mut padded = data[..data.len().min(nrows * row_bytes)].to_vec();
    padded.resize(nrows * row_bytes, 0);

    let mut glyphs = Vec::with_capacity(count);
    for row in 0..nrows {
        let row_data = &padded[row * row_bytes..row * row_bytes + strike_bytes * height];
        let strike = Raster::from_bytes(row_data, width * strike_count, height, strike_bytes, params.align);
        for cell in 0..strike_count {
            if glyphs.len() >= count {
                break;
            }
            let glyph_raster = strike.crop(cell * width, 0, strike.width() - (cell + 1) * width, 0);
            let codepoint = params.first_codepoint + glyphs.len() as u32;
            glyphs.push(Glyph::new(glyph_raster).with_codepoint_u32(codepoint));
        }
    }

    let mut props = FontProperties::default();
    props.spacing = Some(Spacing::CharacterCell);
    Ok(Font::new(glyphs, props))
}

/// Encode a character-cell font to a raw bitmap strike (spec.md §4.3,
/// P7 round-trip property). Fails if the font is not character-cell
/// spaced, since the format carries no per-glyph metrics.
pub fn save_bitmap(font: &Font, strike_count: usize, align: Align, padding: usize) -> Result<Vec<u8>> {
    if font.spacing() != Spacing::CharacterCell {
        return Err(Error::ConstraintViolated(
            "raw codec only supports character-cell fonts".into(),
        ));
    }
    let strike_count = strike_count.max(1);
    let mut out = Vec::new();
    for chunk in font.glyphs().chunks(strike_count) {
        let mut rasters: Vec<Raster> = chunk.iter().map(|g| g.raster().clone()).collect();
        if rasters.is_empty() {
            continue;
        }
        let height = rasters[0].height();
        let width = rasters[0].width();
        while rasters.len() < strike_count {
            rasters.push(Raster::blank(width, height));
        }
        let row_raster = Raster::concat_horizontal(&rasters)
            .ok_or_else(|| Error::BadStructure("raw codec: inconsistent glyph raster sizes".into()))?;
        out.extend(row_raster.to_bytes(align, None));
        out.extend(std::iter::repeat(0u8).take(padding));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_character_cell_font_left_align() {
        let data = vec![0b1111_0000u8, 0b1010_0000, 0b0000_1111, 0b0101_0000];
        let params = RawParams { cell: (4, 2), count: 2, strike_count: 1, ..Default::default() };
        let font = load_binary(&data, &params).unwrap();
        assert_eq!(font.glyphs().len(), 2);
        let encoded = save_bitmap(&font, 1, Align::Left, 0).unwrap();
        let font2 = load_binary(&encoded, &params).unwrap();
        assert_eq!(font.glyphs()[0].raster(), font2.glyphs()[0].raster());
        assert_eq!(font.glyphs()[1].raster(), font2.glyphs()[1].raster());
    }

    #[test]
    fn strike_count_greater_than_one_shares_byte_boundaries_in_bit_align() {
        // 2 cells of width 4 packed bit-aligned in one byte.
        let data = vec![0b1010_0101u8];
        let params = RawParams {
            cell: (4, 1),
            count: 2,
            strike_count: 2,
            align: Align::Bit,
            ..Default::default()
        };
        let font = load_binary(&data, &params).unwrap();
        assert_eq!(font.glyphs().len(), 2);
        assert_eq!(font.glyphs()[0].raster().width(), 4);
    }

    #[test]
    fn non_character_cell_font_rejected_on_encode() {
        let mut props = FontProperties::default();
        props.spacing = Some(Spacing::Proportional);
        let font = Font::new(vec![Glyph::new(Raster::blank(2, 2))], props);
        assert!(save_bitmap(&font, 1, Align::Left, 0).is_err());
    }
}
