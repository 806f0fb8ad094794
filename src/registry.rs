//! Format registry (spec.md §4.2): two small tables — loaders and savers —
//! each holding a format's name, recognised suffixes, magic-byte
//! prefixes, and entry point. Dispatch is a linear scan; the set of
//! formats is small and closed, so this reads the registry as a plain
//! `Vec` rather than reaching for a `HashMap` or a `Box<dyn Trait>`
//! object registry the way a larger plugin surface might.

use crate::codecs::{amiga, bmfont, cpi, daisydot, fon, fzx, mac, pcr, raw, winfnt};
use crate::error::{Error, Result};
use crate::font::Font;

/// One loadable format: its identification rules plus an entry point that
/// always returns a `Vec<Font>` (single-font formats wrap their one
/// result; `multi` just documents whether more than one is expected in
/// practice).
pub struct LoaderEntry {
    pub name: &'static str,
    pub suffixes: &'static [&'static str],
    pub magics: &'static [&'static [u8]],
    pub multi: bool,
    pub load: fn(&[u8]) -> Result<Vec<Font>>,
}

/// One saveable format.
pub struct SaverEntry {
    pub name: &'static str,
    pub suffixes: &'static [&'static str],
    pub save: fn(&Font) -> Result<Vec<u8>>,
}

fn load_winfnt(data: &[u8]) -> Result<Vec<Font>> {
    Ok(vec![winfnt::load_fnt(data)?])
}

fn save_winfnt(font: &Font) -> Result<Vec<u8>> {
    winfnt::save_fnt(font)
}

fn load_fon(data: &[u8]) -> Result<Vec<Font>> {
    fon::load_fon(data)
}

// Descriptor-only dispatch: these entries parse the descriptor but have no
// access to a sibling container to pull spritesheet pages from, so they
// decode with zero pages (any `char` block then fails with a "references
// unknown page" `BadStructure`). The CLI layer, which owns the container,
// calls `bmfont::parse_*_descriptor` + `bmfont::decode_page` + `bmfont::load`
// directly with the real pages instead of going through the registry.

fn load_bmfont_binary(data: &[u8]) -> Result<Vec<Font>> {
    let desc = bmfont::parse_binary_descriptor(data)?;
    Ok(vec![bmfont::load(desc, &[])?])
}

fn load_bmfont_text(data: &[u8]) -> Result<Vec<Font>> {
    let text = std::str::from_utf8(data)?;
    let desc = bmfont::parse_text_descriptor(text)?;
    Ok(vec![bmfont::load(desc, &[])?])
}

fn load_bmfont_xml(data: &[u8]) -> Result<Vec<Font>> {
    let text = std::str::from_utf8(data)?;
    let desc = bmfont::parse_xml_descriptor(text)?;
    Ok(vec![bmfont::load(desc, &[])?])
}

fn load_bmfont_json(data: &[u8]) -> Result<Vec<Font>> {
    let desc = bmfont::parse_json_descriptor(data)?;
    Ok(vec![bmfont::load(desc, &[])?])
}

fn load_mac_dfont(data: &[u8]) -> Result<Vec<Font>> {
    mac::load_dfont(data)
}

fn load_cpi(data: &[u8]) -> Result<Vec<Font>> {
    let pages = cpi::load_cpi(data)?;
    Ok(pages.into_iter().flat_map(|p| p.fonts).collect())
}

fn load_amiga(data: &[u8]) -> Result<Vec<Font>> {
    Ok(vec![amiga::load_font(data)?])
}

fn load_fzx(data: &[u8]) -> Result<Vec<Font>> {
    Ok(vec![fzx::load_fzx(data)?])
}

fn save_fzx(font: &Font) -> Result<Vec<u8>> {
    fzx::save_fzx(font)
}

fn load_daisydot(data: &[u8]) -> Result<Vec<Font>> {
    Ok(vec![daisydot::load_font(data)?])
}

fn save_daisydot(font: &Font) -> Result<Vec<u8>> {
    daisydot::save_font(font)
}

fn load_pcr(data: &[u8]) -> Result<Vec<Font>> {
    Ok(vec![pcr::load_pcr(data)?])
}

fn save_pcr(font: &Font) -> Result<Vec<u8>> {
    pcr::save_pcr(font)
}

fn load_rexxcom(data: &[u8]) -> Result<Vec<Font>> {
    Ok(vec![pcr::load_rexxcom(data)?])
}

fn load_psfcom(data: &[u8]) -> Result<Vec<Font>> {
    Ok(vec![pcr::load_psfcom(data)?])
}

const BUILTIN_LOADERS: &[LoaderEntry] = &[
    LoaderEntry { name: "winfnt", suffixes: &["fnt"], magics: &[&[0x00, 0x01], &[0x00, 0x02], &[0x00, 0x03]], multi: false, load: load_winfnt },
    LoaderEntry { name: "fon", suffixes: &["fon", "exe", "dll"], magics: &[b"MZ"], multi: true, load: load_fon },
    LoaderEntry { name: "bmfont-binary", suffixes: &["fnt"], magics: &[b"BMF"], multi: false, load: load_bmfont_binary },
    LoaderEntry { name: "bmfont-xml", suffixes: &["xml"], magics: &[b"<"], multi: false, load: load_bmfont_xml },
    LoaderEntry { name: "bmfont-json", suffixes: &["json"], magics: &[b"{"], multi: false, load: load_bmfont_json },
    LoaderEntry { name: "bmfont-text", suffixes: &["fnt"], magics: &[b"i"], multi: false, load: load_bmfont_text },
    LoaderEntry { name: "mac-dfont", suffixes: &["dfont", "suit"], magics: &[], multi: true, load: load_mac_dfont },
    LoaderEntry { name: "cpi", suffixes: &["cpi", "cpx"], magics: &[b"\xffFONT   ", b"\xffFONT.NT", b"\xffDRFONT "], multi: true, load: load_cpi },
    LoaderEntry { name: "amiga", suffixes: &[], magics: &[&[0x00, 0x00, 0x03, 0xf3]], multi: false, load: load_amiga },
    LoaderEntry { name: "fzx", suffixes: &["fzx"], magics: &[], multi: false, load: load_fzx },
    LoaderEntry { name: "daisydot", suffixes: &[], magics: &[b"DAISY-DOT NLQ FONT\x9b", b"3\x9b"], multi: false, load: load_daisydot },
    LoaderEntry { name: "pcr", suffixes: &["pcr"], magics: &[b"KPG\x01\x02 \x01", b"KPG\x01\x01 \x01"], multi: false, load: load_pcr },
    LoaderEntry { name: "rexxcom", suffixes: &["com"], magics: &[&[0xeb, 0x4d], &[0xeb, 0x4e]], multi: false, load: load_rexxcom },
    LoaderEntry { name: "psfcom", suffixes: &["com"], magics: &[&[0xeb, 0x04, 0xeb, 0xc3]], multi: false, load: load_psfcom },
];

const BUILTIN_SAVERS: &[SaverEntry] = &[
    SaverEntry { name: "winfnt", suffixes: &["fnt"], save: save_winfnt },
    SaverEntry { name: "fzx", suffixes: &["fzx"], save: save_fzx },
    SaverEntry { name: "daisydot", suffixes: &[], save: save_daisydot },
    SaverEntry { name: "pcr", suffixes: &["pcr"], save: save_pcr },
];

/// The runtime-extensible registry: seeded with every built-in format, and
/// open to `register_loader`/`register_saver` so an embedding host can add
/// formats this crate doesn't know about, per spec.md §4.2.
pub struct Registry {
    loaders: Vec<LoaderEntry>,
    savers: Vec<SaverEntry>,
}

impl Default for Registry {
    fn default() -> Self {
        Self {
            loaders: BUILTIN_LOADERS.iter().map(clone_loader).collect(),
            savers: BUILTIN_SAVERS.iter().map(clone_saver).collect(),
        }
    }
}

fn clone_loader(e: &LoaderEntry) -> LoaderEntry {
    LoaderEntry { name: e.name, suffixes: e.suffixes, magics: e.magics, multi: e.multi, load: e.load }
}

fn clone_saver(e: &SaverEntry) -> SaverEntry {
    SaverEntry { name: e.name, suffixes: e.suffixes, save: e.save }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn loaders(&self) -> &[LoaderEntry] {
        &self.loaders
    }

    pub fn savers(&self) -> &[SaverEntry] {
        &self.savers
    }

    pub fn register_loader(&mut self, entry: LoaderEntry) {
        self.loaders.push(entry);
    }

    pub fn register_saver(&mut self, entry: SaverEntry) {
        self.savers.push(entry);
    }

    /// Find a loader whose magic bytes prefix-match `data` (spec.md §6,
    /// "prefix match at offset 0 unless stated"). Loaders with no magic
    /// bytes at all (the container/suffix-only formats) are skipped here;
    /// callers fall back to [`Registry::loader_by_suffix`] for those.
    pub fn identify(&self, data: &[u8]) -> Option<&LoaderEntry> {
        self.loaders.iter().find(|entry| {
            !entry.magics.is_empty() && entry.magics.iter().any(|magic| data.starts_with(magic))
        })
    }

    /// Find a loader by file suffix (case-insensitive, no leading dot),
    /// for formats [`Registry::identify`] cannot sniff from magic bytes
    /// alone (FZX, dfont/suit resource forks).
    pub fn loader_by_suffix(&self, suffix: &str) -> Option<&LoaderEntry> {
        let suffix = suffix.trim_start_matches('.');
        self.loaders.iter().find(|entry| entry.suffixes.iter().any(|s| s.eq_ignore_ascii_case(suffix)))
    }

    pub fn saver_by_name(&self, name: &str) -> Option<&SaverEntry> {
        self.savers.iter().find(|entry| entry.name == name)
    }

    pub fn saver_by_suffix(&self, suffix: &str) -> Option<&SaverEntry> {
        let suffix = suffix.trim_start_matches('.');
        self.savers.iter().find(|entry| entry.suffixes.iter().any(|s| s.eq_ignore_ascii_case(suffix)))
    }

    /// Load a font file, dispatching first on magic bytes and, failing
    /// that, on the supplied suffix hint.
    pub fn load(&self, data: &[u8], suffix_hint: Option<&str>) -> Result<Vec<Font>> {
        if let Some(entry) = self.identify(data) {
            return (entry.load)(data);
        }
        if let Some(suffix) = suffix_hint {
            if let Some(entry) = self.loader_by_suffix(suffix) {
                return (entry.load)(data);
            }
        }
        Err(Error::UnknownFormat)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identifies_windows_fnt_by_magic() {
        let registry = Registry::new();
        let entry = registry.identify(&[0x00, 0x02, 0, 0]).unwrap();
        assert_eq!(entry.name, "winfnt");
    }

    #[test]
    fn falls_back_to_suffix_for_magicless_formats() {
        let registry = Registry::new();
        let entry = registry.loader_by_suffix("FZX").unwrap();
        assert_eq!(entry.name, "fzx");
    }

    #[test]
    fn unrecognised_data_with_no_suffix_is_unknown_format() {
        let registry = Registry::new();
        assert!(matches!(registry.load(b"not a font", None), Err(Error::UnknownFormat)));
    }

    #[test]
    fn register_loader_extends_dispatch() {
        let mut registry = Registry::new();
        fn load_custom(_data: &[u8]) -> Result<Vec<Font>> {
            Err(Error::UnsupportedFeature("custom".into()))
        }
        registry.register_loader(LoaderEntry {
            name: "custom",
            suffixes: &["xyz"],
            magics: &[b"XYZ1"],
            multi: false,
            load: load_custom,
        });
        assert!(registry.identify(b"XYZ1...").is_some());
    }
}
