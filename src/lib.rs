//! bitfont: a codec layer for converting bitmap/raster fonts between
//! legacy and contemporary container formats — Windows FNT/FON, AngelCode
//! BMFont, classic Mac NFNT/FONT/dfont, Amiga hunk disk fonts, DOS/OS2 CPI
//! codepage bundles, FZX, Daisy-Dot, and the small PCR/REXXCOM/PSFCOM
//! printer-font formats.
//!
//! The crate is organized the way `font_decoder` organizes a table-based
//! sfnt reader: one module per binary contract (`decoder`, `bits`), a
//! value-object model the codecs build towards (`raster`, `glyph`,
//! `font`), and one module per on-disk format under `codecs`. A
//! [`registry::Registry`] ties format identification to the right codec;
//! `ops` holds the `Font -> Font` transforms a caller can chain between
//! load and save.

pub mod bits;
pub mod charmap;
pub mod codecs;
pub mod decoder;
pub mod error;
pub mod font;
pub mod glyph;
pub mod ops;
pub mod raster;
pub mod registry;
pub mod streams;

pub use error::{Error, Result};
pub use font::Font;
pub use glyph::Glyph;
pub use raster::Raster;
pub use registry::Registry;
