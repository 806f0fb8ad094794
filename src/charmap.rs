//! Canonical charmap names and the format-native charset id tables from
//! spec.md §6. The charmap *data* (the full 8-bit-to-Unicode tables) is an
//! out-of-scope external dependency per spec.md §1; what lives here is the
//! bidirectional id<->name maps plus a minimal decode path for the handful
//! of charmaps `encoding_rs` ships, enough to exercise round-trip tests.

use encoding_rs::Encoding;

/// A canonical charmap name, e.g. `"windows-1252"`, `"mac-roman"`,
/// `"cp437"`, `"unicode"`, `"zx-spectrum"`. Stored as a plain `String`
/// since the full set is an open, extensible namespace (spec.md treats
/// charmap tables as a pure data dependency, not a closed enum here).
pub type CharmapName = String;

/// Decode a byte using the named charmap to a `char`, when the crate has a
/// concrete mapping for it. Returns `None` for charmaps this crate doesn't
/// embed data for (the caller then keeps the raw codepoint as a
/// `format-specific.charset` property per spec.md §6).
pub fn decode_byte(charmap: &str, byte: u8) -> Option<char> {
    let encoding: &Encoding = match charmap {
        "windows-1252" => encoding_rs::WINDOWS_1252,
        "mac-roman" => encoding_rs::MACINTOSH,
        "iso8859-1" | "latin-1" => encoding_rs::WINDOWS_1252, // superset for 0x00-0x7f/0xa0-0xff
        "windows-932" => encoding_rs::SHIFT_JIS,
        "windows-1251" => encoding_rs::WINDOWS_1251,
        "windows-1250" => encoding_rs::WINDOWS_1250,
        "zx-spectrum" | "amstrad-cpm-plus" | "unicode" => {
            return if byte < 0x80 { Some(byte as char) } else { None };
        }
        _ => return None,
    };
    let (cow, _, had_errors) = encoding.decode(&[byte]);
    if had_errors {
        None
    } else {
        cow.chars().next()
    }
}

/// Windows `dfCharSet` -> canonical charmap name (spec.md §4.4). `0x01`
/// (DEFAULT) intentionally maps to no encoding (empty string) on decode;
/// see DESIGN.md Open Question (a) for the write-side asymmetry.
pub fn windows_charset_to_name(charset: u8) -> &'static str {
    match charset {
        0x00 => "windows-1252",
        0x01 => "",
        0x02 => "windows-symbol",
        0x4d => "mac-roman",
        0x80 => "windows-932",
        0x81 => "windows-949",
        0x82 => "windows-1361",
        0x86 => "windows-936",
        0x88 => "windows-950",
        0xa1 => "windows-1253",
        0xa2 => "windows-1254",
        0xa3 => "windows-1258",
        0xb1 => "windows-1255",
        0xb2 => "windows-1256",
        0xba => "windows-1257",
        0xcc => "windows-1251",
        0xde => "windows-874",
        0xee => "windows-1250",
        0xff => "",
        _ => "",
    }
}

/// Inverse of [`windows_charset_to_name`]; unmapped names fall back to
/// `0xFF` (OEM), matching the encoder fallback spec.md §7 documents for
/// `CharsetUnknown`.
pub fn windows_name_to_charset(name: &str) -> u8 {
    match name {
        "windows-1252" | "windows-ansi-2.0" | "latin-1" | "unicode" => 0x00,
        "windows-symbol" => 0x02,
        "mac-roman" => 0x4d,
        "windows-932" => 0x80,
        "windows-949" => 0x81,
        "windows-1361" => 0x82,
        "windows-936" => 0x86,
        "windows-950" => 0x88,
        "windows-1253" => 0xa1,
        "windows-1254" => 0xa2,
        "windows-1258" => 0xa3,
        "windows-1255" => 0xb1,
        "windows-1256" => 0xb2,
        "windows-1257" => 0xba,
        "windows-1251" => 0xcc,
        "windows-874" => 0xde,
        "windows-1250" => 0xee,
        other => {
            log::warn!("charmap: no windows charset id for {other:?}, falling back to OEM (0xFF)");
            0xff
        }
    }
}

/// CPI codepage number -> canonical charmap name, e.g. `cp437` -> `"cp437"`.
pub fn cpi_codepage_to_name(codepage: u16) -> String {
    format!("cp{codepage}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn windows_charset_round_trips_common_values() {
        for &(code, name) in &[(0x00u8, "windows-1252"), (0x4d, "mac-roman"), (0xcc, "windows-1251")] {
            assert_eq!(windows_charset_to_name(code), name);
            assert_eq!(windows_name_to_charset(name), code);
        }
    }

    #[test]
    fn unknown_name_falls_back_to_oem() {
        assert_eq!(windows_name_to_charset("totally-unknown"), 0xff);
    }

    #[test]
    fn decode_byte_handles_latin_range() {
        assert_eq!(decode_byte("windows-1252", b'A'), Some('A'));
    }
}
