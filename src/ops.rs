//! Operations composition (spec.md §4.10): a pipeline of `Font -> Font`
//! transforms applied between load and save. This layer is thin glue over
//! the [`crate::font::Font`]/[`crate::glyph::Glyph`] APIs — per spec.md,
//! "not further specified" beyond the handful of named transforms.

use crate::error::{Error, Result};
use crate::font::{Font, FontProperties};
use crate::glyph::{Glyph, Label};
use crate::raster::Raster;

/// A single `Font -> Font` transform. Boxed so a [`Pipeline`] can hold a
/// heterogeneous, ordered list of them.
pub type Operation = Box<dyn Fn(Font) -> Result<Font>>;

/// An ordered sequence of operations, applied left to right. `load`
/// produces a list of fonts; operations are broadcast across all of them
/// (spec.md §4.10).
#[derive(Default)]
pub struct Pipeline {
    operations: Vec<Operation>,
}

impl Pipeline {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(mut self, op: Operation) -> Self {
        self.operations.push(op);
        self
    }

    /// Run every operation, in declared order, over every font.
    pub fn apply(&self, fonts: Vec<Font>) -> Result<Vec<Font>> {
        fonts
            .into_iter()
            .map(|font| self.operations.iter().try_fold(font, |font, op| op(font)))
            .collect()
    }
}

fn rebuild(glyphs: Vec<Glyph>, properties: FontProperties, font: &Font) -> Font {
    Font::new(glyphs, properties).with_comments(font.comments().clone())
}

/// Mirror every glyph left-right.
pub fn mirror_horizontal(font: Font) -> Result<Font> {
    let properties = font.properties().clone();
    let glyphs: Vec<Glyph> = font
        .glyphs()
        .iter()
        .map(|g| {
            let raster = g.raster().mirror_horizontal();
            let advance = g.advance_width();
            g.clone()
                .with_raster(raster)
                .with_left_bearing(g.right_bearing())
                .with_right_bearing(advance - g.raster().width() as i32 - g.right_bearing())
        })
        .collect();
    Ok(rebuild(glyphs, properties, &font))
}

/// Mirror every glyph top-bottom.
pub fn mirror_vertical(font: Font) -> Result<Font> {
    let properties = font.properties().clone();
    let glyphs: Vec<Glyph> = font
        .glyphs()
        .iter()
        .map(|g| {
            let raster = g.raster().mirror_vertical();
            g.clone().with_raster(raster)
        })
        .collect();
    Ok(rebuild(glyphs, properties, &font))
}

/// Keep only glyphs whose codepoint label is in `keep`; drops everything
/// else (spec.md §4.10 "subsetting").
pub fn subset(keep: Vec<u8>) -> Operation {
    Box::new(move |font: Font| {
        let properties = font.properties().clone();
        let glyphs: Vec<Glyph> = font
            .glyphs()
            .iter()
            .filter(|g| {
                g.codepoint()
                    .and_then(|c| c.first().copied())
                    .map(|cp| keep.contains(&cp))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        if glyphs.is_empty() {
            return Err(Error::ConstraintViolated("subset: no glyphs survived the keep-list".into()));
        }
        Ok(rebuild(glyphs, properties, &font))
    })
}

/// Integer nearest-neighbour upscale of every glyph raster by `(x, y)`.
pub fn stretch(x: usize, y: usize) -> Operation {
    Box::new(move |font: Font| {
        if x == 0 || y == 0 {
            return Err(Error::ConstraintViolated("stretch: scale factors must be non-zero".into()));
        }
        let properties = font.properties().clone();
        let glyphs: Vec<Glyph> = font
            .glyphs()
            .iter()
            .map(|g| {
                let src = g.raster();
                let rows: Vec<Vec<bool>> = (0..src.height() * y)
                    .map(|row| {
                        let src_row = row / y;
                        (0..src.width() * x).map(|col| src.get(col / x, src_row)).collect()
                    })
                    .collect();
                let raster = Raster::from_rows(rows).unwrap_or_else(Raster::empty);
                g.clone()
                    .with_raster(raster)
                    .with_left_bearing(g.left_bearing() * x as i32)
                    .with_right_bearing(g.right_bearing() * x as i32)
                    .with_shift_up(g.shift_up() * y as i32)
            })
            .collect();
        Ok(rebuild(glyphs, properties, &font))
    })
}

/// Re-assign every glyph's `char` label from its codepoint under a new
/// encoding (spec.md §4.10 "re-encoding"); existing `char` labels are
/// replaced, codepoints are left untouched.
pub fn set_encoding(encoding: String) -> Operation {
    Box::new(move |font: Font| {
        let mut properties = font.properties().clone();
        properties.encoding = Some(encoding.clone());
        let glyphs: Vec<Glyph> = font
            .glyphs()
            .iter()
            .map(|g| match g.codepoint().and_then(|c| c.first().copied()) {
                Some(byte) => match crate::charmap::decode_byte(&encoding, byte) {
                    Some(ch) => g.clone().with_char(ch.to_string()),
                    None => g.clone(),
                },
                None => g.clone(),
            })
            .collect();
        Ok(rebuild(glyphs, properties, &font))
    })
}

/// Normalize every glyph label to its canonical parsed form by
/// round-tripping it through [`Label`]'s `Display`/`FromStr` grammar —
/// tags and chars get re-derived consistently, matching how `monobit`'s
/// `label()` helper is applied idempotently across operations.
pub fn normalize_labels(font: Font) -> Result<Font> {
    let properties = font.properties().clone();
    let glyphs: Vec<Glyph> = font
        .glyphs()
        .iter()
        .map(|g| {
            let mut glyph = g.clone();
            for tag in g.tags() {
                if let Ok(Label::Tag(normalized)) = tag.parse::<Label>() {
                    glyph = glyph.with_tag(normalized);
                }
            }
            glyph
        })
        .collect();
    Ok(rebuild(glyphs, properties, &font))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::FontProperties;

    fn sample_font() -> Font {
        let glyphs = vec![
            Glyph::new(Raster::from_rows(vec![vec![true, false], vec![false, false]]).unwrap()).with_codepoint_u32(65),
            Glyph::new(Raster::blank(2, 2)).with_codepoint_u32(66),
        ];
        Font::new(glyphs, FontProperties::default())
    }

    #[test]
    fn mirror_horizontal_flips_ink() {
        let font = sample_font();
        let mirrored = mirror_horizontal(font).unwrap();
        let g = mirrored.get_by_codepoint(&[65]).unwrap();
        assert!(g.raster().get(1, 0));
        assert!(!g.raster().get(0, 0));
    }

    #[test]
    fn subset_drops_unkept_glyphs() {
        let font = sample_font();
        let subsetted = subset(vec![65])(font).unwrap();
        assert_eq!(subsetted.glyphs().len(), 1);
        assert!(subsetted.get_by_codepoint(&[65]).is_some());
    }

    #[test]
    fn stretch_scales_raster_dimensions() {
        let font = sample_font();
        let stretched = stretch(2, 3)(font).unwrap();
        let g = stretched.get_by_codepoint(&[65]).unwrap();
        assert_eq!(g.raster().width(), 4);
        assert_eq!(g.raster().height(), 6);
    }

    #[test]
    fn pipeline_applies_operations_in_order() {
        let pipeline = Pipeline::new().push(Box::new(mirror_horizontal)).push(subset(vec![65]));
        let result = pipeline.apply(vec![sample_font()]).unwrap();
        assert_eq!(result.len(), 1);
        assert_eq!(result[0].glyphs().len(), 1);
    }
}
