//! An ordered collection of glyphs plus a property bag, per spec.md §3.
//!
//! Properties are split into two tiers: a dense struct of optional *set*
//! values (`FontProperties`) and a handful of *derived* values computed
//! from the glyphs (and cached once per `Font`, since a `Font` is
//! immutable once built — spec.md §3 "Property resolution").

use std::cell::OnceCell;
use std::collections::{BTreeMap, HashMap};

use crate::glyph::{Glyph, Label};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Spacing {
    Proportional,
    Monospace,
    CharacterCell,
    MultiCell,
}

impl Spacing {
    pub fn as_str(&self) -> &'static str {
        match self {
            Spacing::Proportional => "proportional",
            Spacing::Monospace => "monospace",
            Spacing::CharacterCell => "character-cell",
            Spacing::MultiCell => "multi-cell",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    LeftToRight,
    RightToLeft,
}

/// The "set" tier: properties a loader read straight out of the source
/// file, or a caller set explicitly. `extra` carries anything outside the
/// closed canonical set, including the `format-specific.*` escape hatch
/// spec.md §6/§7 uses for unmapped charsets.
#[derive(Debug, Clone, Default)]
pub struct FontProperties {
    pub family: Option<String>,
    pub name: Option<String>,
    pub foundry: Option<String>,
    pub copyright: Option<String>,
    pub notice: Option<String>,
    pub revision: Option<String>,
    pub style: Option<String>,
    pub point_size: Option<i32>,
    pub weight: Option<String>,
    pub slant: Option<String>,
    pub setwidth: Option<String>,
    pub decoration: Option<String>,
    pub device: Option<String>,
    pub pixel_aspect: Option<(i32, i32)>,
    pub dpi: Option<(i32, i32)>,
    pub spacing: Option<Spacing>,
    pub average_advance: Option<f64>,
    pub cap_advance: Option<i32>,
    pub x_height: Option<i32>,
    pub cap_height: Option<i32>,
    pub ascent: Option<i32>,
    pub descent: Option<i32>,
    pub direction: Option<Direction>,
    pub left_bearing: Option<i32>,
    pub shift_up: Option<i32>,
    pub right_bearing: Option<i32>,
    pub leading: Option<i32>,
    pub encoding: Option<String>,
    pub default_char: Option<Label>,
    pub word_boundary: Option<Label>,
    pub source_format: Option<String>,
    pub source_name: Option<String>,
    pub extra: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Default)]
struct Derived {
    spacing: Spacing2,
    raster_size: (usize, usize),
    bounding_box: (i32, i32),
    average_advance: f64,
    cap_advance: Option<i32>,
    x_height: Option<i32>,
    cap_height: Option<i32>,
    ascent: i32,
    descent: i32,
}

// OnceCell<Derived> needs Derived: Default for the unset placeholder only
// in tests; Spacing has no Default so wrap it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Spacing2(Spacing);
impl Default for Spacing2 {
    fn default() -> Self {
        Spacing2(Spacing::Proportional)
    }
}

/// An ordered sequence of glyphs plus resolved properties.
#[derive(Debug, Clone)]
pub struct Font {
    glyphs: Vec<Glyph>,
    properties: FontProperties,
    comments: BTreeMap<String, String>,
    by_tag: HashMap<String, usize>,
    by_codepoint: HashMap<Vec<u8>, usize>,
    by_char: HashMap<String, usize>,
    derived: OnceCell<Derived>,
}

impl Font {
    /// Build a font from glyphs and set properties, applying spec.md §3's
    /// invariants: synthetic codepoints when no glyph carries a label, and
    /// char-label synthesis from an `encoding` property.
    pub fn new(mut glyphs: Vec<Glyph>, properties: FontProperties) -> Self {
        let any_labelled = glyphs.iter().any(|g| g.codepoint().is_some() || g.char().is_some());
        if !any_labelled {
            glyphs = glyphs
                .into_iter()
                .enumerate()
                .map(|(i, g)| g.with_codepoint_u32(i as u32))
                .collect();
        }
        if let Some(encoding) = &properties.encoding {
            glyphs = glyphs
                .into_iter()
                .map(|g| {
                    if g.char().is_some() {
                        return g;
                    }
                    match g.codepoint().and_then(|cp| cp.first().copied()) {
                        Some(byte) => match crate::charmap::decode_byte(encoding, byte) {
                            Some(ch) => g.with_char(ch.to_string()),
                            None => g,
                        },
                        None => g,
                    }
                })
                .collect();
        }

        let mut by_tag = HashMap::new();
        let mut by_codepoint = HashMap::new();
        let mut by_char = HashMap::new();
        for (idx, g) in glyphs.iter().enumerate() {
            if let Some(cp) = g.codepoint() {
                by_codepoint.insert(cp.to_vec(), idx);
            }
            if let Some(c) = g.char() {
                by_char.insert(c.to_string(), idx);
            }
            for t in g.tags() {
                by_tag.insert(t.clone(), idx);
            }
        }

        Self {
            glyphs,
            properties,
            comments: BTreeMap::new(),
            by_tag,
            by_codepoint,
            by_char,
            derived: OnceCell::new(),
        }
    }

    pub fn with_comments(mut self, comments: BTreeMap<String, String>) -> Self {
        self.comments = comments;
        self
    }

    pub fn glyphs(&self) -> &[Glyph] {
        &self.glyphs
    }

    pub fn properties(&self) -> &FontProperties {
        &self.properties
    }

    pub fn comments(&self) -> &BTreeMap<String, String> {
        &self.comments
    }

    pub fn get_comment(&self, property: &str) -> Option<&str> {
        self.comments.get(property).map(String::as_str)
    }

    pub fn get_by_codepoint(&self, codepoint: &[u8]) -> Option<&Glyph> {
        self.by_codepoint.get(codepoint).map(|&i| &self.glyphs[i])
    }

    pub fn get_by_char(&self, ch: &str) -> Option<&Glyph> {
        self.by_char.get(ch).map(|&i| &self.glyphs[i])
    }

    pub fn get_by_tag(&self, tag: &str) -> Option<&Glyph> {
        self.by_tag.get(tag).map(|&i| &self.glyphs[i])
    }

    fn derived(&self) -> &Derived {
        self.derived.get_or_init(|| self.compute_derived())
    }

    fn compute_derived(&self) -> Derived {
        let glyphs = &self.glyphs;
        let spacing = self.properties.spacing.unwrap_or_else(|| derive_spacing(glyphs));

        let raster_size = glyphs.iter().fold((0usize, 0usize), |(w, h), g| {
            (w.max(g.raster().width()), h.max(g.raster().height()))
        });

        let mut min_x = i32::MAX;
        let mut max_x = i32::MIN;
        let mut min_y = i32::MAX;
        let mut max_y = i32::MIN;
        for g in glyphs {
            let (il, ib, ir, it) = g.ink_bounds();
            if ir <= il {
                continue; // no ink
            }
            let x0 = g.left_bearing() + il as i32;
            let x1 = g.left_bearing() + ir as i32;
            let y0 = g.shift_up() + ib as i32;
            let y1 = g.shift_up() + it as i32;
            min_x = min_x.min(x0);
            max_x = max_x.max(x1);
            min_y = min_y.min(y0);
            max_y = max_y.max(y1);
        }
        let bounding_box = if max_x >= min_x && max_y >= min_y {
            (max_x - min_x, max_y - min_y)
        } else {
            (0, 0)
        };

        let average_advance = if glyphs.is_empty() {
            0.0
        } else {
            glyphs.iter().map(|g| g.advance_width() as f64).sum::<f64>() / glyphs.len() as f64
        };

        let cap_advance = self.get_by_char("X").map(|g| g.advance_width());
        let x_height = self.get_by_char("x").map(|g| {
            let (_, b, _, t) = g.ink_bounds();
            (t - b) as i32
        });
        let cap_height = self.get_by_char("X").map(|g| {
            let (_, b, _, t) = g.ink_bounds();
            (t - b) as i32
        });

        let ascent = self.properties.ascent.unwrap_or_else(|| {
            glyphs
                .iter()
                .map(|g| g.shift_up() + g.raster().height() as i32)
                .max()
                .unwrap_or(0)
        });
        let descent = self.properties.descent.unwrap_or_else(|| {
            glyphs.iter().map(|g| (-g.shift_up()).max(0)).max().unwrap_or(0)
        });

        Derived {
            spacing: Spacing2(spacing),
            raster_size,
            bounding_box,
            average_advance,
            cap_advance,
            x_height,
            cap_height,
            ascent,
            descent,
        }
    }

    pub fn spacing(&self) -> Spacing {
        self.derived().spacing.0
    }

    pub fn raster_size(&self) -> (usize, usize) {
        self.derived().raster_size
    }

    pub fn bounding_box(&self) -> (i32, i32) {
        self.derived().bounding_box
    }

    pub fn average_advance(&self) -> f64 {
        self.derived().average_advance
    }

    pub fn cap_advance(&self) -> Option<i32> {
        self.derived().cap_advance
    }

    pub fn x_height(&self) -> Option<i32> {
        self.derived().x_height
    }

    pub fn cap_height(&self) -> Option<i32> {
        self.derived().cap_height
    }

    pub fn ascent(&self) -> i32 {
        self.derived().ascent
    }

    pub fn descent(&self) -> i32 {
        self.derived().descent
    }

    /// `ascent + descent`; invariant per spec.md §3.
    pub fn pixel_size(&self) -> i32 {
        self.ascent() + self.descent()
    }
}

fn derive_spacing(glyphs: &[Glyph]) -> Spacing {
    if glyphs.is_empty() {
        return Spacing::Proportional;
    }
    if glyphs.iter().any(|g| g.advance_width() < 0 || !g.kerning().is_empty()) {
        return Spacing::Proportional;
    }
    let advances: std::collections::BTreeSet<i32> = glyphs.iter().map(|g| g.advance_width()).collect();
    if advances.len() > 1 {
        return Spacing::Proportional;
    }
    let raster_sizes: std::collections::BTreeSet<(usize, usize)> =
        glyphs.iter().map(|g| (g.raster().width(), g.raster().height())).collect();
    if raster_sizes.len() == 1 {
        Spacing::CharacterCell
    } else {
        Spacing::Monospace
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::raster::Raster;

    fn glyph(w: usize, h: usize) -> Glyph {
        Glyph::new(Raster::blank(w, h))
    }

    #[test]
    fn synthesizes_codepoints_when_unlabelled() {
        let font = Font::new(vec![glyph(1, 1), glyph(1, 1)], FontProperties::default());
        assert_eq!(font.get_by_codepoint(&[0]).is_some(), true);
        assert_eq!(font.get_by_codepoint(&[1]).is_some(), true);
    }

    #[test]
    fn pixel_size_is_ascent_plus_descent() {
        let mut props = FontProperties::default();
        props.ascent = Some(10);
        props.descent = Some(3);
        let font = Font::new(vec![glyph(4, 4)], props);
        assert_eq!(font.pixel_size(), 13);
    }

    #[test]
    fn equal_advance_equal_raster_is_character_cell() {
        let glyphs = vec![glyph(8, 8), glyph(8, 8)];
        let font = Font::new(glyphs, FontProperties::default());
        assert_eq!(font.spacing(), Spacing::CharacterCell);
    }

    #[test]
    fn differing_advances_are_proportional() {
        let glyphs = vec![glyph(4, 8), glyph(8, 8)];
        let font = Font::new(glyphs, FontProperties::default());
        assert_eq!(font.spacing(), Spacing::Proportional);
    }
}
