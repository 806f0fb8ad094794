//! AngelCode BMFont codec (spec.md §4.5): a font descriptor (one of four
//! interchangeable serializations — binary, text, XML, JSON) describing a
//! set of glyph rectangles packed into one or more spritesheet images,
//! plus kerning pairs. Spritesheet channels can carry up to four distinct
//! glyph masks (one per RGBA channel); the encoder side packs new
//! spritesheets with the Blackpawn binary-tree packer.

use std::collections::BTreeMap;

use crate::error::{bad_structure, Error, Result};
use crate::font::{Font, FontProperties};
use crate::glyph::Glyph;
use crate::raster::Raster;

#[derive(Debug, Clone, Default)]
struct CharEntry {
    id: u32,
    x: u32,
    y: u32,
    width: u32,
    height: u32,
    xoffset: i32,
    yoffset: i32,
    xadvance: i32,
    page: u32,
    channel: u8,
}

#[derive(Debug, Clone, Default)]
struct Descriptor {
    face: Option<String>,
    size: Option<i32>,
    bold: bool,
    italic: bool,
    line_height: Option<i32>,
    base: Option<i32>,
    pages: Vec<String>,
    chars: Vec<CharEntry>,
    kernings: Vec<(u32, u32, i32)>,
}

/// Which of a pixel's four 8-bit channels carries a given char's glyph
/// mask, per the `chnl` field BMFont writes when channel-packing is used.
fn channel_mask(channel: u8) -> u8 {
    match channel {
        1 => 2, // blue
        2 => 1, // green
        4 => 0, // red
        8 => 3, // alpha
        _ => 3,
    }
}

fn extract_glyph_raster(image: &image::RgbaImage, entry: &CharEntry) -> Raster {
    let mut rows = Vec::with_capacity(entry.height as usize);
    let plane = if entry.channel == 15 { None } else { Some(channel_mask(entry.channel)) };
    for y in 0..entry.height {
        let mut row = Vec::with_capacity(entry.width as usize);
        for x in 0..entry.width {
            let px = image.get_pixel(entry.x + x, entry.y + y);
            let ink = match plane {
                Some(ch) => px.0[ch] > 127,
                None => px.0[3] > 127 || px.0[0..3].iter().any(|&c| c > 127),
            };
            row.push(ink);
        }
        rows.push(row);
    }
    Raster::from_rows(rows).unwrap_or_else(Raster::empty)
}

/// Decode a BMFont descriptor plus its already-decoded spritesheet
/// page images (caller reads pages via the `Container` abstraction and
/// decodes them with the `image` crate before calling this).
fn font_from_descriptor(desc: Descriptor, pages: &[image::RgbaImage]) -> Result<Font> {
    let mut glyphs = Vec::with_capacity(desc.chars.len());
    for entry in &desc.chars {
        let image = pages
            .get(entry.page as usize)
            .ok_or_else(|| bad_structure!("bmfont: char references unknown page {}", entry.page))?;
        let raster = extract_glyph_raster(image, entry);
        let base = desc.base.unwrap_or(0);
        let shift_up = base - entry.yoffset - entry.height as i32;
        glyphs.push(
            Glyph::new(raster)
                .with_codepoint_u32(entry.id)
                .with_left_bearing(entry.xoffset)
                .with_right_bearing(entry.xadvance - entry.xoffset - entry.width as i32)
                .with_shift_up(shift_up),
        );
    }

    let mut kerning_by_glyph: BTreeMap<u32, crate::glyph::KerningTable> = BTreeMap::new();
    for (first, second, amount) in &desc.kernings {
        kerning_by_glyph
            .entry(*first)
            .or_default()
            .insert(crate::glyph::Label::codepoint(*second), *amount);
    }
    let glyphs = glyphs
        .into_iter()
        .map(|g| {
            let cp = g.codepoint().and_then(|c| c.first().copied()).unwrap_or(0) as u32;
            match kerning_by_glyph.get(&cp) {
                Some(table) => g.with_kerning(table.clone()),
                None => g,
            }
        })
        .collect();

    let mut props = FontProperties::default();
    props.family = desc.face;
    props.point_size = desc.size;
    props.weight = Some(if desc.bold { "bold".to_string() } else { "regular".to_string() });
    props.slant = Some(if desc.italic { "italic".to_string() } else { "roman".to_string() });
    props.ascent = desc.base;
    props.descent = desc.line_height.zip(desc.base).map(|(lh, base)| lh - base);
    props.source_format = Some("bmfont".to_string());

    Ok(Font::new(glyphs, props))
}

/// Parse the text-descriptor variant (`.fnt` key=value lines). The
/// grammar is a sequence of `tag key=val key="quoted val" ...` lines.
pub fn parse_text_descriptor(text: &str) -> Result<Descriptor> {
    let mut desc = Descriptor::default();
    for line in text.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let mut tokens = tokenize_text_line(line);
        if tokens.is_empty() {
            continue;
        }
        let tag = tokens.remove(0);
        let attrs: BTreeMap<String, String> = tokens
            .into_iter()
            .filter_map(|t| t.split_once('=').map(|(k, v)| (k.to_string(), v.trim_matches('"').to_string())))
            .collect();
        match tag.as_str() {
            "info" => {
                desc.face = attrs.get("face").cloned();
                desc.size = attrs.get("size").and_then(|v| v.parse().ok());
                desc.bold = attrs.get("bold").map(|v| v == "1").unwrap_or(false);
                desc.italic = attrs.get("italic").map(|v| v == "1").unwrap_or(false);
            }
            "common" => {
                desc.line_height = attrs.get("lineHeight").and_then(|v| v.parse().ok());
                desc.base = attrs.get("base").and_then(|v| v.parse().ok());
            }
            "page" => {
                let id: usize = attrs.get("id").and_then(|v| v.parse().ok()).unwrap_or(desc.pages.len());
                if desc.pages.len() <= id {
                    desc.pages.resize(id + 1, String::new());
                }
                desc.pages[id] = attrs.get("file").cloned().unwrap_or_default();
            }
            "char" => {
                desc.chars.push(CharEntry {
                    id: attrs.get("id").and_then(|v| v.parse().ok()).unwrap_or(0),
                    x: attrs.get("x").and_then(|v| v.parse().ok()).unwrap_or(0),
                    y: attrs.get("y").and_then(|v| v.parse().ok()).unwrap_or(0),
                    width: attrs.get("width").and_then(|v| v.parse().ok()).unwrap_or(0),
                    height: attrs.get("height").and_then(|v| v.parse().ok()).unwrap_or(0),
                    xoffset: attrs.get("xoffset").and_then(|v| v.parse().ok()).unwrap_or(0),
                    yoffset: attrs.get("yoffset").and_then(|v| v.parse().ok()).unwrap_or(0),
                    xadvance: attrs.get("xadvance").and_then(|v| v.parse().ok()).unwrap_or(0),
                    page: attrs.get("page").and_then(|v| v.parse().ok()).unwrap_or(0),
                    channel: attrs.get("chnl").and_then(|v| v.parse().ok()).unwrap_or(15),
                });
            }
            "kerning" => {
                let first = attrs.get("first").and_then(|v| v.parse().ok()).unwrap_or(0);
                let second = attrs.get("second").and_then(|v| v.parse().ok()).unwrap_or(0);
                let amount = attrs.get("amount").and_then(|v| v.parse().ok()).unwrap_or(0);
                desc.kernings.push((first, second, amount));
            }
            _ => {}
        }
    }
    Ok(desc)
}

fn tokenize_text_line(line: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;
    for c in line.chars() {
        match c {
            '"' => {
                in_quotes = !in_quotes;
                current.push(c);
            }
            ' ' | '\t' if !in_quotes => {
                if !current.is_empty() {
                    tokens.push(std::mem::take(&mut current));
                }
            }
            _ => current.push(c),
        }
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// Parse the binary descriptor variant (magic `BMF\x03`, a sequence of
/// type-tagged, length-prefixed blocks).
pub fn parse_binary_descriptor(data: &[u8]) -> Result<Descriptor> {
    if data.get(0..3) != Some(b"BMF") {
        return Err(Error::UnknownFormat);
    }
    let mut desc = Descriptor::default();
    let mut offset = 4usize; // skip magic + version byte
    while offset + 5 <= data.len() {
        let block_type = data[offset];
        let block_len = u32::from_le_bytes(data[offset + 1..offset + 5].try_into().unwrap()) as usize;
        let block_start = offset + 5;
        let block = data
            .get(block_start..block_start + block_len)
            .ok_or_else(|| bad_structure!("bmfont: truncated binary block"))?;
        match block_type {
            1 => {
                desc.size = Some(i16::from_le_bytes(block[0..2].try_into().unwrap()) as i32);
                let flags = block[2];
                desc.bold = flags & 0x01 != 0;
                desc.italic = flags & 0x02 != 0;
                let name_start = 14;
                desc.face = Some(read_cstr(&block[name_start..]));
            }
            2 => {
                desc.line_height = Some(u16::from_le_bytes(block[0..2].try_into().unwrap()) as i32);
                desc.base = Some(u16::from_le_bytes(block[2..4].try_into().unwrap()) as i32);
            }
            3 => {
                for chunk in block.split(|&b| b == 0) {
                    if !chunk.is_empty() {
                        desc.pages.push(String::from_utf8_lossy(chunk).into_owned());
                    }
                }
            }
            4 => {
                for rec in block.chunks_exact(20) {
                    desc.chars.push(CharEntry {
                        id: u32::from_le_bytes(rec[0..4].try_into().unwrap()),
                        x: u16::from_le_bytes(rec[4..6].try_into().unwrap()) as u32,
                        y: u16::from_le_bytes(rec[6..8].try_into().unwrap()) as u32,
                        width: u16::from_le_bytes(rec[8..10].try_into().unwrap()) as u32,
                        height: u16::from_le_bytes(rec[10..12].try_into().unwrap()) as u32,
                        xoffset: i16::from_le_bytes(rec[12..14].try_into().unwrap()) as i32,
                        yoffset: i16::from_le_bytes(rec[14..16].try_into().unwrap()) as i32,
                        xadvance: i16::from_le_bytes(rec[16..18].try_into().unwrap()) as i32,
                        page: rec[18] as u32,
                        channel: rec[19],
                    });
                }
            }
            5 => {
                for rec in block.chunks_exact(10) {
                    let first = u32::from_le_bytes(rec[0..4].try_into().unwrap());
                    let second = u32::from_le_bytes(rec[4..8].try_into().unwrap());
                    let amount = i16::from_le_bytes(rec[8..10].try_into().unwrap()) as i32;
                    desc.kernings.push((first, second, amount));
                }
            }
            _ => {}
        }
        offset = block_start + block_len;
    }
    Ok(desc)
}

fn read_cstr(data: &[u8]) -> String {
    let end = data.iter().position(|&b| b == 0).unwrap_or(data.len());
    String::from_utf8_lossy(&data[..end]).into_owned()
}

/// Parse the JSON descriptor variant.
pub fn parse_json_descriptor(data: &[u8]) -> Result<Descriptor> {
    let value: serde_json::Value =
        serde_json::from_slice(data).map_err(|e| bad_structure!("bmfont: invalid json: {e}"))?;
    let mut desc = Descriptor::default();
    if let Some(info) = value.get("info") {
        desc.face = info.get("face").and_then(|v| v.as_str()).map(String::from);
        desc.size = info.get("size").and_then(|v| v.as_i64()).map(|v| v as i32);
        desc.bold = info.get("bold").and_then(|v| v.as_i64()).map(|v| v != 0).unwrap_or(false);
        desc.italic = info.get("italic").and_then(|v| v.as_i64()).map(|v| v != 0).unwrap_or(false);
    }
    if let Some(common) = value.get("common") {
        desc.line_height = common.get("lineHeight").and_then(|v| v.as_i64()).map(|v| v as i32);
        desc.base = common.get("base").and_then(|v| v.as_i64()).map(|v| v as i32);
    }
    if let Some(pages) = value.get("pages").and_then(|v| v.as_array()) {
        desc.pages = pages.iter().filter_map(|v| v.as_str().map(String::from)).collect();
    }
    if let Some(chars) = value.get("chars").and_then(|v| v.as_array()) {
        for c in chars {
            let get = |k: &str| c.get(k).and_then(|v| v.as_i64()).unwrap_or(0);
            desc.chars.push(CharEntry {
                id: get("id") as u32,
                x: get("x") as u32,
                y: get("y") as u32,
                width: get("width") as u32,
                height: get("height") as u32,
                xoffset: get("xoffset") as i32,
                yoffset: get("yoffset") as i32,
                xadvance: get("xadvance") as i32,
                page: get("page") as u32,
                channel: get("chnl") as u8,
            });
        }
    }
    if let Some(kernings) = value.get("kernings").and_then(|v| v.as_array()) {
        for k in kernings {
            let get = |key: &str| k.get(key).and_then(|v| v.as_i64()).unwrap_or(0);
            desc.kernings.push((get("first") as u32, get("second") as u32, get("amount") as i32));
        }
    }
    Ok(desc)
}

/// Parse the XML descriptor variant, a flat single-level-nested tag tree
/// equivalent to the text grammar. Hand-rolled: the descriptor's tag set
/// is closed and shallow, not worth a general XML dependency for.
pub fn parse_xml_descriptor(text: &str) -> Result<Descriptor> {
    let mut desc = Descriptor::default();
    let mut pos = 0;
    let bytes = text.as_bytes();
    while let Some(lt) = text[pos..].find('<') {
        let tag_start = pos + lt + 1;
        let tag_end = text[tag_start..]
            .find('>')
            .ok_or_else(|| bad_structure!("bmfont: unterminated xml tag"))?
            + tag_start;
        let tag_body = &text[tag_start..tag_end];
        let self_closed = tag_body.ends_with('/');
        let tag_body = tag_body.trim_end_matches('/').trim();
        if tag_body.starts_with('?') || tag_body.starts_with('!') {
            pos = tag_end + 1;
            continue;
        }
        let mut parts = tag_body.splitn(2, char::is_whitespace);
        let name = parts.next().unwrap_or("").to_string();
        let attr_str = parts.next().unwrap_or("");
        let attrs = parse_xml_attrs(attr_str);

        match name.as_str() {
            "info" => {
                desc.face = attrs.get("face").cloned();
                desc.size = attrs.get("size").and_then(|v| v.parse().ok());
                desc.bold = attrs.get("bold").map(|v| v == "1").unwrap_or(false);
                desc.italic = attrs.get("italic").map(|v| v == "1").unwrap_or(false);
            }
            "common" => {
                desc.line_height = attrs.get("lineHeight").and_then(|v| v.parse().ok());
                desc.base = attrs.get("base").and_then(|v| v.parse().ok());
            }
            "page" => {
                let id: usize = attrs.get("id").and_then(|v| v.parse().ok()).unwrap_or(desc.pages.len());
                if desc.pages.len() <= id {
                    desc.pages.resize(id + 1, String::new());
                }
                desc.pages[id] = attrs.get("file").cloned().unwrap_or_default();
            }
            "char" => desc.chars.push(CharEntry {
                id: attrs.get("id").and_then(|v| v.parse().ok()).unwrap_or(0),
                x: attrs.get("x").and_then(|v| v.parse().ok()).unwrap_or(0),
                y: attrs.get("y").and_then(|v| v.parse().ok()).unwrap_or(0),
                width: attrs.get("width").and_then(|v| v.parse().ok()).unwrap_or(0),
                height: attrs.get("height").and_then(|v| v.parse().ok()).unwrap_or(0),
                xoffset: attrs.get("xoffset").and_then(|v| v.parse().ok()).unwrap_or(0),
                yoffset: attrs.get("yoffset").and_then(|v| v.parse().ok()).unwrap_or(0),
                xadvance: attrs.get("xadvance").and_then(|v| v.parse().ok()).unwrap_or(0),
                page: attrs.get("page").and_then(|v| v.parse().ok()).unwrap_or(0),
                channel: attrs.get("chnl").and_then(|v| v.parse().ok()).unwrap_or(15),
            }),
            "kerning" => desc.kernings.push((
                attrs.get("first").and_then(|v| v.parse().ok()).unwrap_or(0),
                attrs.get("second").and_then(|v| v.parse().ok()).unwrap_or(0),
                attrs.get("amount").and_then(|v| v.parse().ok()).unwrap_or(0),
            )),
            _ => {}
        }
        let _ = self_closed;
        let _ = bytes;
        pos = tag_end + 1;
    }
    Ok(desc)
}

fn parse_xml_attrs(s: &str) -> BTreeMap<String, String> {
    let mut attrs = BTreeMap::new();
    let mut chars = s.char_indices().peekable();
    while let Some((i, c)) = chars.next() {
        if c.is_whitespace() {
            continue;
        }
        let key_start = i;
        let mut key_end = s.len();
        while let Some(&(j, c2)) = chars.peek() {
            if c2 == '=' {
                key_end = j;
                break;
            }
            chars.next();
        }
        chars.next(); // consume '='
        if let Some(&(qstart, '"')) = chars.peek() {
            chars.next();
            let mut val_end = qstart + 1;
            while let Some((j, c3)) = chars.next() {
                if c3 == '"' {
                    val_end = j;
                    break;
                }
            }
            attrs.insert(s[key_start..key_end].to_string(), s[qstart + 1..val_end].to_string());
        }
    }
    attrs
}

/// Decode a raw spritesheet PNG into an RGBA image for glyph extraction.
pub fn decode_page(data: &[u8]) -> Result<image::RgbaImage> {
    let img = image::load_from_memory(data).map_err(|e| bad_structure!("bmfont: invalid page image: {e}"))?;
    Ok(img.to_rgba8())
}

/// Assemble a font from a parsed descriptor and its decoded pages.
pub fn load(desc: Descriptor, pages: &[image::RgbaImage]) -> Result<Font> {
    font_from_descriptor(desc, pages)
}

// -- Blackpawn binary-tree spritesheet packer --

struct PackNode {
    rect: (u32, u32, u32, u32), // x, y, w, h
    used: bool,
    right: Option<Box<PackNode>>,
    down: Option<Box<PackNode>>,
}

impl PackNode {
    fn new(w: u32, h: u32) -> Self {
        Self { rect: (0, 0, w, h), used: false, right: None, down: None }
    }

    fn insert(&mut self, w: u32, h: u32) -> Option<(u32, u32)> {
        if self.right.is_some() || self.down.is_some() {
            if let Some(pos) = self.right.as_mut().and_then(|n| n.insert(w, h)) {
                return Some(pos);
            }
            return self.down.as_mut().and_then(|n| n.insert(w, h));
        }
        if self.used {
            return None;
        }
        let (x, y, rw, rh) = self.rect;
        if w > rw || h > rh {
            return None;
        }
        if w == rw && h == rh {
            self.used = true;
            return Some((x, y));
        }
        let (dw, dh) = (rw - w, rh - h);
        if dw > dh {
            self.right = Some(Box::new(PackNode { rect: (x + w, y, dw, h), used: false, right: None, down: None }));
            self.down = Some(Box::new(PackNode { rect: (x, y + h, rw, dh), used: false, right: None, down: None }));
        } else {
            self.right = Some(Box::new(PackNode { rect: (x + w, y, dw, rh), used: false, right: None, down: None }));
            self.down = Some(Box::new(PackNode { rect: (x, y + h, w, dh), used: false, right: None, down: None }));
        }
        self.used = true;
        self.right.as_mut().unwrap().insert(w, h)
    }
}

/// Pack rectangles (by index, width, height) into a sheet of the given
/// size using a Blackpawn-style binary tree; returns `None` for any
/// rectangle that did not fit.
pub fn pack_rectangles(sheet_size: (u32, u32), rects: &[(u32, u32)]) -> Vec<Option<(u32, u32)>> {
    let mut root = PackNode::new(sheet_size.0, sheet_size.1);
    rects.iter().map(|&(w, h)| root.insert(w, h)).collect()
}

// -- Encoder: reduce, pack, and serialize a descriptor + spritesheet(s) --

/// Channel bits assigned to successive glyphs in `packed` mode, in the
/// merge order spec.md §4.5 documents ("merge as RGBA in order {B,G,R,A}").
const PACKED_CHANNEL_BITS: [u8; 4] = [1, 2, 4, 8];

struct EncodeGlyph {
    id: u32,
    raster: Raster,
    xoffset: i32,
    yoffset: i32,
    xadvance: i32,
    kerning: Vec<(u32, i32)>,
}

/// The BMFont `id` a glyph encodes under: its codepoint label, or a
/// single-scalar char label. Multi-codepoint (grapheme-cluster) glyphs and
/// glyphs with neither label are warned and skipped, per spec.md §4.5.
fn glyph_id(g: &Glyph) -> Option<u32> {
    if let Some(cp) = g.codepoint() {
        return crate::glyph::Label::Codepoint(cp.to_vec()).as_codepoint_u32();
    }
    if let Some(ch) = g.char() {
        let mut chars = ch.chars();
        if let (Some(c), None) = (chars.next(), chars.next()) {
            return Some(c as u32);
        }
        log::warn!("bmfont: skipping multi-codepoint glyph {ch:?}, BMFont chars are single-codepoint");
        return None;
    }
    log::warn!("bmfont: skipping glyph with neither a codepoint nor a character label");
    None
}

fn kerning_pairs(kerning: &crate::glyph::KerningTable) -> Vec<(u32, i32)> {
    kerning
        .iter()
        .filter_map(|(label, amount)| match label {
            crate::glyph::Label::Codepoint(bytes) => {
                crate::glyph::Label::Codepoint(bytes.clone()).as_codepoint_u32().map(|cp| (cp, *amount))
            }
            crate::glyph::Label::Char(c) if c.chars().count() == 1 => c.chars().next().map(|c| (c as u32, *amount)),
            _ => None,
        })
        .collect()
}

/// Reduce every encodable glyph to its ink-cropped raster and BMFont
/// placement metrics. `xoffset`/`yoffset`/`xadvance` are the exact inverse
/// of [`font_from_descriptor`]'s extraction formulas, so decoding an
/// encoded font reproduces each glyph's reduced raster bit-for-bit.
fn prepare_glyphs(font: &Font) -> Vec<EncodeGlyph> {
    let base = font.ascent();
    font.glyphs()
        .iter()
        .filter_map(|g| {
            let id = glyph_id(g)?;
            let reduced = g.reduce();
            let height = reduced.raster().height() as i32;
            Some(EncodeGlyph {
                id,
                xoffset: reduced.left_bearing(),
                yoffset: base - reduced.shift_up() - height,
                xadvance: reduced.advance_width(),
                kerning: kerning_pairs(reduced.kerning()),
                raster: reduced.raster().clone(),
            })
        })
        .collect()
}

struct Page {
    packers: Vec<PackNode>,
    image: image::RgbaImage,
}

impl Page {
    fn new(size: (u32, u32), packed: bool) -> Self {
        let channels = if packed { 4 } else { 1 };
        Self {
            packers: (0..channels).map(|_| PackNode::new(size.0, size.1)).collect(),
            image: image::RgbaImage::from_pixel(size.0, size.1, image::Rgba([0, 0, 0, 0])),
        }
    }
}

/// Stamp a glyph's ink into one page's image, at the given channel: `15`
/// (unpacked) writes an opaque white pixel per ink bit on all four
/// channels; any single bit of `1`/`2`/`4`/`8` writes only that plane,
/// per spec.md §4.5's packed-mode channel disposition.
fn blit_glyph(image: &mut image::RgbaImage, raster: &Raster, x: u32, y: u32, chnl: u8) {
    let plane = if chnl == 15 { None } else { Some(channel_mask(chnl)) };
    for (ry, row) in raster.rows().iter().enumerate() {
        for (rx, &ink) in row.iter().enumerate() {
            if !ink {
                continue;
            }
            let px = image.get_pixel_mut(x + rx as u32, y + ry as u32);
            match plane {
                Some(ch) => px.0[ch] = 255,
                None => px.0 = [255, 255, 255, 255],
            }
        }
    }
}

fn write_text_descriptor(
    font: &Font,
    glyphs: &[EncodeGlyph],
    placements: &[(u32, u32, u32, u8, usize)],
    page_count: usize,
    page_size: (u32, u32),
    packed: bool,
) -> String {
    let props = font.properties();
    let face = props.family.clone().unwrap_or_default();
    let size = props.point_size.unwrap_or_else(|| font.pixel_size());
    let bold = i32::from(props.weight.as_deref() == Some("bold"));
    let italic = i32::from(props.slant.as_deref() == Some("italic"));
    let mut out = format!("info face=\"{face}\" size={size} bold={bold} italic={italic}\n");
    out.push_str(&format!(
        "common lineHeight={} base={} scaleW={} scaleH={} pages={page_count} packed={}\n",
        font.pixel_size(),
        font.ascent(),
        page_size.0,
        page_size.1,
        i32::from(packed)
    ));
    for page in 0..page_count {
        out.push_str(&format!("page id={page} file=\"page{page}.png\"\n"));
    }
    let mut placed_by_glyph: BTreeMap<usize, (u32, u32, u32, u8)> = BTreeMap::new();
    for &(x, y, page, chnl, gi) in placements {
        placed_by_glyph.insert(gi, (x, y, page, chnl));
    }
    for (gi, eg) in glyphs.iter().enumerate() {
        let (x, y, page, chnl) = placed_by_glyph.get(&gi).copied().unwrap_or((0, 0, 0, 15));
        out.push_str(&format!(
            "char id={} x={x} y={y} width={} height={} xoffset={} yoffset={} xadvance={} page={page} chnl={chnl}\n",
            eg.id,
            eg.raster.width(),
            eg.raster.height(),
            eg.xoffset,
            eg.yoffset,
            eg.xadvance,
        ));
    }
    for eg in glyphs {
        for &(second, amount) in &eg.kerning {
            out.push_str(&format!("kerning first={} second={second} amount={amount}\n", eg.id));
        }
    }
    out
}

/// A packed spritesheet: a text descriptor (in the grammar
/// [`parse_text_descriptor`] reads back) plus the page images it
/// references by `page{N}.png`.
pub struct EncodedSheet {
    pub descriptor: String,
    pub pages: Vec<image::RgbaImage>,
}

/// Encode a font as a BMFont spritesheet (spec.md §4.5 "Encoder"): reduce
/// every glyph to its ink bounds, pack the rasters into one or more
/// `page_size` pages with the Blackpawn packer, allocating a new page
/// whenever the current one overflows, and serialize a matching text
/// descriptor. `packed` selects 4-channel packing (each glyph placed
/// independently in R/G/B/A) over one glyph per pixel on all channels.
pub fn save(font: &Font, page_size: (u32, u32), packed: bool) -> Result<EncodedSheet> {
    let glyphs = prepare_glyphs(font);
    let mut pages = vec![Page::new(page_size, packed)];
    let mut placements = Vec::with_capacity(glyphs.len());

    for (gi, eg) in glyphs.iter().enumerate() {
        let (w, h) = (eg.raster.width() as u32, eg.raster.height() as u32);
        if w == 0 || h == 0 {
            placements.push((0, 0, 0u32, 15u8, gi));
            continue;
        }
        if w > page_size.0 || h > page_size.1 {
            return Err(Error::ConstraintViolated(format!(
                "bmfont: glyph {} ({w}x{h}) does not fit a {}x{} page",
                eg.id, page_size.0, page_size.1
            )));
        }
        loop {
            let page_idx = pages.len() - 1;
            let found = {
                let page = &mut pages[page_idx];
                page.packers.iter_mut().enumerate().find_map(|(ci, packer)| packer.insert(w, h).map(|(x, y)| (ci, x, y)))
            };
            match found {
                Some((ci, x, y)) => {
                    let chnl = if packed { PACKED_CHANNEL_BITS[ci] } else { 15 };
                    blit_glyph(&mut pages[page_idx].image, &eg.raster, x, y, chnl);
                    placements.push((x, y, page_idx as u32, chnl, gi));
                    break;
                }
                None => pages.push(Page::new(page_size, packed)),
            }
        }
    }

    let descriptor = write_text_descriptor(font, &glyphs, &placements, pages.len(), page_size, packed);
    Ok(EncodedSheet { descriptor, pages: pages.into_iter().map(|p| p.image).collect() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_text_descriptor_char_lines() {
        let text = "info face=\"Test\" size=12 bold=1\ncommon lineHeight=16 base=12\npage id=0 file=\"a.png\"\nchar id=65 x=0 y=0 width=8 height=8 xoffset=0 yoffset=0 xadvance=8 page=0 chnl=15\n";
        let desc = parse_text_descriptor(text).unwrap();
        assert_eq!(desc.face.as_deref(), Some("Test"));
        assert!(desc.bold);
        assert_eq!(desc.chars.len(), 1);
        assert_eq!(desc.chars[0].id, 65);
    }

    #[test]
    fn parses_minimal_xml_descriptor() {
        let xml = r#"<font><info face="T" size="10" bold="0" italic="0"/><common lineHeight="12" base="10"/><pages><page id="0" file="a.png"/></pages><chars><char id="65" x="0" y="0" width="4" height="4" xoffset="0" yoffset="0" xadvance="4" page="0" chnl="15"/></chars></font>"#;
        let desc = parse_xml_descriptor(xml).unwrap();
        assert_eq!(desc.face.as_deref(), Some("T"));
        assert_eq!(desc.chars.len(), 1);
    }

    #[test]
    fn parses_json_descriptor() {
        let json = r#"{"info":{"face":"J","size":10,"bold":0,"italic":0},"common":{"lineHeight":12,"base":10},"pages":["a.png"],"chars":[{"id":65,"x":0,"y":0,"width":4,"height":4,"xoffset":0,"yoffset":0,"xadvance":4,"page":0,"chnl":15}],"kernings":[]}"#;
        let desc = parse_json_descriptor(json.as_bytes()).unwrap();
        assert_eq!(desc.face.as_deref(), Some("J"));
        assert_eq!(desc.chars.len(), 1);
    }

    #[test]
    fn packer_places_non_overlapping_rectangles() {
        let placements = pack_rectangles((64, 64), &[(10, 10), (10, 10), (40, 40)]);
        assert!(placements.iter().all(|p| p.is_some()));
    }

    #[test]
    fn packer_reports_failure_when_sheet_too_small() {
        let placements = pack_rectangles((8, 8), &[(10, 10)]);
        assert_eq!(placements[0], None);
    }

    #[test]
    fn encode_then_decode_recovers_reduced_rasters() {
        let raster_a = Raster::from_rows(vec![
            vec![false, true, true, false],
            vec![false, true, false, false],
            vec![false, true, true, false],
        ])
        .unwrap();
        let raster_b = Raster::from_rows(vec![vec![true, true], vec![true, false]]).unwrap();
        let glyph_a = Glyph::new(raster_a).with_codepoint_u32(65).with_left_bearing(1).with_right_bearing(1);
        let glyph_b = Glyph::new(raster_b).with_codepoint_u32(66).with_right_bearing(2).with_shift_up(1);
        let font = Font::new(vec![glyph_a.clone(), glyph_b.clone()], FontProperties::default());

        let sheet = save(&font, (64, 64), false).unwrap();
        assert_eq!(sheet.pages.len(), 1);
        let desc = parse_text_descriptor(&sheet.descriptor).unwrap();
        let decoded = font_from_descriptor(desc, &sheet.pages).unwrap();

        let decoded_a = decoded.get_by_codepoint(&[65]).unwrap();
        let decoded_b = decoded.get_by_codepoint(&[66]).unwrap();
        assert_eq!(decoded_a.raster(), glyph_a.reduce().raster());
        assert_eq!(decoded_b.raster(), glyph_b.reduce().raster());
        assert_eq!(decoded_a.advance_width(), glyph_a.advance_width());
        assert_eq!(decoded_b.advance_width(), glyph_b.advance_width());
    }

    #[test]
    fn packed_mode_cycles_channel_bits_then_overflows_to_next_page() {
        let glyphs: Vec<Glyph> = (0..5u32)
            .map(|i| Glyph::new(Raster::from_rows(vec![vec![true; 4]; 4]).unwrap()).with_codepoint_u32(65 + i))
            .collect();
        let font = Font::new(glyphs, FontProperties::default());

        let sheet = save(&font, (4, 4), true).unwrap();
        assert_eq!(sheet.pages.len(), 2);
        let desc = parse_text_descriptor(&sheet.descriptor).unwrap();
        let channels: Vec<u8> = desc.chars.iter().map(|c| c.channel).collect();
        assert_eq!(channels, vec![1, 2, 4, 8, 1]);
        let pages: Vec<u32> = desc.chars.iter().map(|c| c.page).collect();
        assert_eq!(pages, vec![0, 0, 0, 0, 1]);
    }

    #[test]
    fn encoder_rejects_glyph_larger_than_page() {
        let glyph = Glyph::new(Raster::from_rows(vec![vec![true; 10]; 10]).unwrap()).with_codepoint_u32(65);
        let font = Font::new(vec![glyph], FontProperties::default());
        assert!(matches!(save(&font, (4, 4), false), Err(Error::ConstraintViolated(_))));
    }
}
