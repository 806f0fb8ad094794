//! `.fon` container traversal (spec.md §4.4): a `.fon` file is an MZ
//! executable stub wrapping one of three 16/32-bit executable formats (NE,
//! PE, LX/LE), each of which carries its bitmap resources differently. This
//! module locates the `RT_FONT` resources in whichever of the three wraps
//! the input and hands each one's bytes to [`super::winfnt::load_fnt`].

use crate::decoder::Stream;
use crate::error::{bad_structure, Error, Result};
use crate::font::Font;

const RT_FONT_NE: u16 = 0x8008;
const RT_FONT_PE: u16 = 8;
/// LX/OS2 resource type for a font face, per `os2res.h`'s `OS2RES_FONTFACE`
/// — distinct from the Windows PE `RT_FONT` id above.
const OS2RES_FONTFACE: u16 = 7;
/// Object page-map entry flag values (`os2res.h`'s `LXOPMENTRY.flags`).
const OP32_VALID: u16 = 0x0000;
const OP32_ITERDATA: u16 = 0x0001;
const OP32_ITERDATA2: u16 = 0x0005;

/// Parse a `.fon`/`.exe` container and return every embedded `FONT`
/// resource decoded as a [`Font`], in resource-table order.
pub fn load_fon(data: &[u8]) -> Result<Vec<Font>> {
    if data.get(0..2) != Some(b"MZ") {
        return Err(Error::UnknownFormat);
    }
    let e_lfanew = u32::from_le_bytes(
        data.get(0x3c..0x40)
            .ok_or_else(|| bad_structure!("fon: truncated MZ stub"))?
            .try_into()
            .unwrap(),
    ) as usize;
    let signature = data.get(e_lfanew..e_lfanew + 4).ok_or_else(|| bad_structure!("fon: e_lfanew out of range"))?;

    if &signature[0..2] == b"NE" {
        load_ne(data, e_lfanew)
    } else if &signature[0..4] == b"PE\0\0" {
        load_pe(data, e_lfanew)
    } else if &signature[0..2] == b"LE" || &signature[0..2] == b"LX" {
        load_lx(data, e_lfanew)
    } else {
        Err(Error::UnknownFormat)
    }
}

fn load_ne(data: &[u8], header_start: usize) -> Result<Vec<Font>> {
    let header = data.get(header_start..).ok_or_else(|| bad_structure!("fon: NE header out of range"))?;
    let rsrctab_rel = u16::from_le_bytes(header[0x24..0x26].try_into().unwrap()) as usize;
    let rsrctab_start = header_start + rsrctab_rel;

    let mut s = Stream::new(data.get(rsrctab_start..).ok_or_else(|| bad_structure!("fon: NE rsrctab out of range"))?);
    let align_shift: u16 = s.read_le().ok_or_else(|| bad_structure!("fon: truncated rscAlignShift"))?;

    let mut fonts = Vec::new();
    loop {
        let type_id: u16 = s.read_le().ok_or_else(|| bad_structure!("fon: truncated TYPEINFO"))?;
        if type_id == 0 {
            break;
        }
        let count: u16 = s.read_le().ok_or_else(|| bad_structure!("fon: truncated rtResourceCount"))?;
        s.skip(4).ok_or_else(|| bad_structure!("fon: truncated rtReserved"))?;

        for _ in 0..count {
            let offset: u16 = s.read_le().ok_or_else(|| bad_structure!("fon: truncated rnOffset"))?;
            let length: u16 = s.read_le().ok_or_else(|| bad_structure!("fon: truncated rnLength"))?;
            s.skip(2).ok_or_else(|| bad_structure!("fon: truncated rnFlags"))?; // rnFlags
            s.skip(2).ok_or_else(|| bad_structure!("fon: truncated rnID"))?; // rnID
            s.skip(2).ok_or_else(|| bad_structure!("fon: truncated rnHandle"))?; // rnHandle
            s.skip(2).ok_or_else(|| bad_structure!("fon: truncated rnUsage"))?; // rnUsage

            if type_id == RT_FONT_NE {
                let start = (offset as usize) << align_shift;
                let len = (length as usize) << align_shift;
                let slice = data
                    .get(start..start + len)
                    .ok_or_else(|| bad_structure!("fon: FONT resource out of range"))?;
                fonts.push(super::winfnt::load_fnt(slice)?);
            }
        }
    }
    if fonts.is_empty() {
        return Err(Error::BadStructure("fon: no FONT resources in NE container".into()));
    }
    Ok(fonts)
}

fn load_pe(data: &[u8], header_start: usize) -> Result<Vec<Font>> {
    let opt_header_size = u16::from_le_bytes(
        data.get(header_start + 20..header_start + 22)
            .ok_or_else(|| bad_structure!("fon: truncated PE COFF header"))?
            .try_into()
            .unwrap(),
    ) as usize;
    let magic = u16::from_le_bytes(
        data.get(header_start + 24..header_start + 26)
            .ok_or_else(|| bad_structure!("fon: truncated PE optional header"))?
            .try_into()
            .unwrap(),
    );
    let is_pe32_plus = magic == 0x20b;
    let data_dir_offset = header_start + 24 + if is_pe32_plus { 112 } else { 96 };
    let resource_dir_rva = u32::from_le_bytes(
        data.get(data_dir_offset..data_dir_offset + 4)
            .ok_or_else(|| bad_structure!("fon: truncated data directory"))?
            .try_into()
            .unwrap(),
    );
    let _ = opt_header_size;
    if resource_dir_rva == 0 {
        return Err(Error::BadStructure("fon: PE image has no resource directory".into()));
    }

    // Locate the .rsrc section to translate RVA -> file offset.
    let num_sections = u16::from_le_bytes(
        data.get(header_start + 6..header_start + 8)
            .ok_or_else(|| bad_structure!("fon: truncated PE section count"))?
            .try_into()
            .unwrap(),
    );
    let sections_start = header_start + 24 + opt_header_size;
    let mut rsrc_file_offset = None;
    let mut rsrc_va = 0u32;
    for i in 0..num_sections as usize {
        let entry = data
            .get(sections_start + i * 40..sections_start + i * 40 + 40)
            .ok_or_else(|| bad_structure!("fon: truncated section header"))?;
        let virt_size = u32::from_le_bytes(entry[8..12].try_into().unwrap());
        let virt_addr = u32::from_le_bytes(entry[12..16].try_into().unwrap());
        let raw_ptr = u32::from_le_bytes(entry[20..24].try_into().unwrap());
        if resource_dir_rva >= virt_addr && resource_dir_rva < virt_addr + virt_size {
            rsrc_file_offset = Some(raw_ptr as usize + (resource_dir_rva - virt_addr) as usize);
            rsrc_va = virt_addr;
        }
    }
    let rsrc_start = rsrc_file_offset.ok_or_else(|| bad_structure!("fon: resource RVA maps to no section"))?;
    let rsrc_file_base = rsrc_start - (resource_dir_rva - rsrc_va) as usize;

    let mut fonts = Vec::new();
    // `rva_to_file` assumes the resource directory's own section covers its
    // data entries too, true for every FON-bearing PE image encountered in
    // practice (the whole resource tree lives in one `.rsrc` section).
    let rva_to_file = |rva: u32| -> usize { rsrc_file_base + (rva as usize).saturating_sub(resource_dir_rva as usize) };
    walk_pe_resource_type(data, rsrc_file_base, rsrc_file_base, rva_to_file, &mut fonts)?;
    if fonts.is_empty() {
        return Err(Error::BadStructure("fon: no FONT resources in PE container".into()));
    }
    Ok(fonts)
}

fn pe_dir_entry_count(data: &[u8], dir_offset: usize) -> Result<usize> {
    let named_count = u16::from_le_bytes(
        data.get(dir_offset + 12..dir_offset + 14)
            .ok_or_else(|| bad_structure!("fon: truncated resource directory"))?
            .try_into()
            .unwrap(),
    );
    let id_count = u16::from_le_bytes(
        data.get(dir_offset + 14..dir_offset + 16)
            .ok_or_else(|| bad_structure!("fon: truncated resource directory"))?
            .try_into()
            .unwrap(),
    );
    Ok(named_count as usize + id_count as usize)
}

fn walk_pe_resource_type(
    data: &[u8],
    dir_offset: usize,
    rsrc_base: usize,
    rva_to_file: impl Fn(u32) -> usize + Copy,
    out: &mut Vec<Font>,
) -> Result<()> {
    let entries_start = dir_offset + 16;
    for i in 0..pe_dir_entry_count(data, dir_offset)? {
        let entry = data
            .get(entries_start + i * 8..entries_start + i * 8 + 8)
            .ok_or_else(|| bad_structure!("fon: truncated directory entry"))?;
        let id = u32::from_le_bytes(entry[0..4].try_into().unwrap());
        let offset = u32::from_le_bytes(entry[4..8].try_into().unwrap());
        if id == RT_FONT_PE as u32 && offset & 0x8000_0000 != 0 {
            let sub_dir = rsrc_base + (offset & 0x7fff_ffff) as usize;
            walk_pe_font_names(data, sub_dir, rsrc_base, rva_to_file, out)?;
        }
    }
    Ok(())
}

fn walk_pe_font_names(
    data: &[u8],
    dir_offset: usize,
    rsrc_base: usize,
    rva_to_file: impl Fn(u32) -> usize + Copy,
    out: &mut Vec<Font>,
) -> Result<()> {
    let entries_start = dir_offset + 16;
    for i in 0..pe_dir_entry_count(data, dir_offset)? {
        let entry = &data[entries_start + i * 8..entries_start + i * 8 + 8];
        let offset = u32::from_le_bytes(entry[4..8].try_into().unwrap());
        if offset & 0x8000_0000 == 0 {
            continue;
        }
        let sub_dir = rsrc_base + (offset & 0x7fff_ffff) as usize;
        walk_pe_font_langs(data, sub_dir, rsrc_base, rva_to_file, out)?;
    }
    Ok(())
}

fn walk_pe_font_langs(
    data: &[u8],
    dir_offset: usize,
    rsrc_base: usize,
    rva_to_file: impl Fn(u32) -> usize + Copy,
    out: &mut Vec<Font>,
) -> Result<()> {
    let entries_start = dir_offset + 16;
    for i in 0..pe_dir_entry_count(data, dir_offset)? {
        let entry = &data[entries_start + i * 8..entries_start + i * 8 + 8];
        let offset = u32::from_le_bytes(entry[4..8].try_into().unwrap());
        if offset & 0x8000_0000 != 0 {
            continue; // another directory level; FON resources are flat by language, so this is unexpected but skipped rather than mis-parsed.
        }
        // data-entry offsets are relative to the resource section base, same as directory offsets.
        let leaf_offset = rsrc_base + offset as usize;
        let leaf_entry = data
            .get(leaf_offset..leaf_offset + 16)
            .ok_or_else(|| bad_structure!("fon: truncated resource data entry"))?;
        let data_rva = u32::from_le_bytes(leaf_entry[0..4].try_into().unwrap());
        let size = u32::from_le_bytes(leaf_entry[4..8].try_into().unwrap()) as usize;
        let payload_start = rva_to_file(data_rva);
        let payload = data
            .get(payload_start..payload_start + size)
            .ok_or_else(|| bad_structure!("fon: resource data out of range"))?;
        out.push(super::winfnt::load_fnt(payload)?);
    }
    Ok(())
}

/// Read one 32-bit LE field at `header_start + off` from `data`.
fn lx_u32(data: &[u8], header_start: usize, off: usize) -> Result<u32> {
    Ok(u32::from_le_bytes(
        data.get(header_start + off..header_start + off + 4)
            .ok_or_else(|| bad_structure!("fon: LX header out of range"))?
            .try_into()
            .unwrap(),
    ))
}

fn load_lx(data: &[u8], header_start: usize) -> Result<Vec<Font>> {
    // Field offsets below are from `os2res.h`'s `LXHEADER` (`e32_*` fields),
    // relative to the LX signature itself.
    let pageshift = lx_u32(data, header_start, 0x2c)?;
    let obj_tbl = lx_u32(data, header_start, 0x40)? as usize;
    let objmap = lx_u32(data, header_start, 0x48)? as usize;
    let rsrc_tbl = lx_u32(data, header_start, 0x50)? as usize;
    let rsrc_cnt = lx_u32(data, header_start, 0x54)? as usize;
    // Unlike the table offsets above, `datapage` is itself an absolute file
    // offset, not relative to the LX header (`gpifont.c`'s
    // `_lx_extract_resource` adds no header base to it).
    let datapage = u32::from_le_bytes(
        data.get(header_start + 0x80..header_start + 0x84)
            .ok_or_else(|| bad_structure!("fon: LX header out of range"))?
            .try_into()
            .unwrap(),
    ) as usize;

    let mut fonts = Vec::new();
    for i in 0..rsrc_cnt {
        let rte_off = header_start + rsrc_tbl + i * 14;
        let rte = data.get(rte_off..rte_off + 14).ok_or_else(|| bad_structure!("fon: truncated LX resource entry"))?;
        let type_id = u16::from_le_bytes(rte[0..2].try_into().unwrap());
        let cb = u32::from_le_bytes(rte[4..8].try_into().unwrap()) as usize;
        let object = u16::from_le_bytes(rte[8..10].try_into().unwrap());
        let rte_offset = u32::from_le_bytes(rte[10..14].try_into().unwrap()) as usize;

        if type_id != OS2RES_FONTFACE {
            continue;
        }

        // LXOTENTRY: size, base, flags, pagemap, mapsize, reserved (24 bytes).
        let obj_entry_off = header_start + obj_tbl + (object.saturating_sub(1) as usize) * 24;
        let obj = data
            .get(obj_entry_off..obj_entry_off + 24)
            .ok_or_else(|| bad_structure!("fon: LX object table out of range"))?;
        let obj_pagemap = u32::from_le_bytes(obj[12..16].try_into().unwrap()) as usize;
        let obj_mapsize = u32::from_le_bytes(obj[16..20].try_into().unwrap()) as usize;

        // Walk this object's page map, decompressing each page per its
        // own flags, and concatenate the results into one buffer.
        let mut object_buf = Vec::new();
        for p in 0..obj_mapsize {
            // LXOPMENTRY: dataoffset:u32, size:u16, flags:u16 (8 bytes).
            let pme_off = header_start + objmap + (obj_pagemap.saturating_sub(1) + p) * 8;
            let pme = data.get(pme_off..pme_off + 8).ok_or_else(|| bad_structure!("fon: LX page map out of range"))?;
            let page_dataoffset = u32::from_le_bytes(pme[0..4].try_into().unwrap()) as usize;
            let page_len = u16::from_le_bytes(pme[4..6].try_into().unwrap()) as usize;
            let page_flags = u16::from_le_bytes(pme[6..8].try_into().unwrap());

            let page_addr = datapage + (page_dataoffset << pageshift);
            let page_data = data
                .get(page_addr..page_addr + page_len)
                .ok_or_else(|| bad_structure!("fon: LX data page out of range"))?;

            match page_flags {
                OP32_ITERDATA => object_buf.extend(super::exepack::unpack1(page_data)?),
                OP32_ITERDATA2 => object_buf.extend(super::exepack::unpack2(page_data)?),
                OP32_VALID => object_buf.extend_from_slice(page_data),
                _ => {}
            }
        }

        let payload = object_buf
            .get(rte_offset..rte_offset + cb)
            .ok_or_else(|| bad_structure!("fon: LX resource offset out of range"))?;
        fonts.push(super::winfnt::load_fnt(payload)?);
    }
    if fonts.is_empty() {
        return Err(Error::BadStructure("fon: no FONT resources in LX container".into()));
    }
    Ok(fonts)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::font::{Font, FontProperties};
    use crate::glyph::Glyph;
    use crate::raster::Raster;

    fn minimal_fnt() -> Vec<u8> {
        let glyph = Glyph::new(Raster::blank(8, 8)).with_codepoint_u32(65);
        super::super::winfnt::save_fnt(&Font::new(vec![glyph], FontProperties::default())).unwrap()
    }

    /// Builds a minimal MZ+NE container with one `RT_FONT` resource, laid
    /// out the way a real `.fon`'s resource table packs entries: an
    /// align-shift word, one TYPEINFO block for `RT_FONT`, one NAMEINFO
    /// record pointing at the FNT payload, then a zero TYPEINFO terminator.
    fn build_ne_fon(fnt: &[u8]) -> Vec<u8> {
        let align_shift: u16 = 0;
        let mz_len = 0x40;
        let ne_header_len = 0x40;
        let rsrctab_rel = ne_header_len; // resource table right after the NE header
        let rsrctab_len = 2 + (2 + 2 + 4 + (2 + 2 + 2 + 2 + 2 + 2)) + 2;
        let payload_off = mz_len + ne_header_len + rsrctab_len;

        let mut mz = vec![0u8; mz_len];
        mz[0..2].copy_from_slice(b"MZ");
        let e_lfanew = mz.len() as u32;
        mz[0x3c..0x40].copy_from_slice(&e_lfanew.to_le_bytes());

        let mut ne = vec![0u8; ne_header_len];
        ne[0..2].copy_from_slice(b"NE");
        ne[0x24..0x26].copy_from_slice(&(rsrctab_rel as u16).to_le_bytes());

        let mut rsrctab = Vec::new();
        rsrctab.extend(align_shift.to_le_bytes());
        rsrctab.extend(RT_FONT_NE.to_le_bytes()); // rtTypeID
        rsrctab.extend(1u16.to_le_bytes()); // rtResourceCount
        rsrctab.extend([0u8; 4]); // rtReserved
        rsrctab.extend((payload_off as u16).to_le_bytes()); // rnOffset
        rsrctab.extend((fnt.len() as u16).to_le_bytes()); // rnLength
        rsrctab.extend([0u8; 2]); // rnFlags
        rsrctab.extend([0u8; 2]); // rnID
        rsrctab.extend([0u8; 2]); // rnHandle
        rsrctab.extend([0u8; 2]); // rnUsage
        rsrctab.extend(0u16.to_le_bytes()); // terminating TYPEINFO

        let mut out = mz;
        out.extend(ne);
        out.extend(rsrctab);
        out.extend(fnt);
        out
    }

    #[test]
    fn rejects_data_without_mz_magic() {
        assert!(matches!(load_fon(b"not an exe"), Err(Error::UnknownFormat)));
    }

    #[test]
    fn walks_ne_resource_table_to_its_font_resource() {
        let fnt = minimal_fnt();
        let container = build_ne_fon(&fnt);
        let fonts = load_fon(&container).unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].glyphs().len(), 1);
    }

    /// Builds a minimal LX header + one-object resource/page-map/object
    /// table chain, with a single `OP32_VALID` (uncompressed) data page
    /// holding the FNT resource, laid out per `os2res.h`'s field offsets.
    fn build_lx_container(fnt: &[u8]) -> Vec<u8> {
        const HEADER_LEN: usize = 0x84;
        let obj_tbl = HEADER_LEN;
        let objmap = obj_tbl + 24;
        let rsrc_tbl = objmap + 8;
        let rsrc_tbl_end = rsrc_tbl + 14;
        let datapage = rsrc_tbl_end; // data page right after the resource table

        let mut header = vec![0u8; HEADER_LEN];
        header[0x2c..0x30].copy_from_slice(&0u32.to_le_bytes()); // pageshift
        header[0x40..0x44].copy_from_slice(&(obj_tbl as u32).to_le_bytes());
        header[0x48..0x4c].copy_from_slice(&(objmap as u32).to_le_bytes());
        header[0x50..0x54].copy_from_slice(&(rsrc_tbl as u32).to_le_bytes());
        header[0x54..0x58].copy_from_slice(&1u32.to_le_bytes()); // rsrc_cnt
        header[0x80..0x84].copy_from_slice(&(datapage as u32).to_le_bytes());

        let mut object_entry = Vec::new();
        object_entry.extend(0u32.to_le_bytes()); // size
        object_entry.extend(0u32.to_le_bytes()); // base
        object_entry.extend(0u32.to_le_bytes()); // flags
        object_entry.extend(1u32.to_le_bytes()); // pagemap (1-based)
        object_entry.extend(1u32.to_le_bytes()); // mapsize
        object_entry.extend(0u32.to_le_bytes()); // reserved

        let mut page_entry = Vec::new();
        page_entry.extend(0u32.to_le_bytes()); // dataoffset
        page_entry.extend((fnt.len() as u16).to_le_bytes()); // size
        page_entry.extend(OP32_VALID.to_le_bytes()); // flags

        let mut resource_entry = Vec::new();
        resource_entry.extend(OS2RES_FONTFACE.to_le_bytes()); // type
        resource_entry.extend(0u16.to_le_bytes()); // name
        resource_entry.extend((fnt.len() as u32).to_le_bytes()); // cb
        resource_entry.extend(1u16.to_le_bytes()); // obj (1-based)
        resource_entry.extend(0u32.to_le_bytes()); // offset into the object

        let mut out = header;
        out.extend(object_entry);
        out.extend(page_entry);
        out.extend(resource_entry);
        out.extend(fnt);
        out
    }

    #[test]
    fn walks_lx_page_map_to_its_font_resource() {
        let fnt = minimal_fnt();
        let container = build_lx_container(&fnt);
        let fonts = load_lx(&container, 0).unwrap();
        assert_eq!(fonts.len(), 1);
        assert_eq!(fonts[0].glyphs().len(), 1);
    }

    #[test]
    fn lx_page_map_runs_iterdata2_pages_through_the_case_flag_unpacker() {
        // A one-byte-literal EXEPACK2 page (spec.md §8 scenario 6) followed
        // by a zero terminator decodes to a single byte; wrap it as this
        // object's only page and confirm `load_lx` feeds it through
        // `exepack::unpack2` rather than treating it as raw data.
        let compressed = vec![0x04, 0xff, 0x00, 0x00];
        let decompressed = super::super::exepack::unpack2(&compressed).unwrap();
        assert_eq!(decompressed, vec![0xff]);

        const HEADER_LEN: usize = 0x84;
        let obj_tbl = HEADER_LEN;
        let objmap = obj_tbl + 24;
        let rsrc_tbl = objmap + 8;
        let rsrc_tbl_end = rsrc_tbl + 14;
        let datapage = rsrc_tbl_end;

        let mut header = vec![0u8; HEADER_LEN];
        header[0x2c..0x30].copy_from_slice(&0u32.to_le_bytes());
        header[0x40..0x44].copy_from_slice(&(obj_tbl as u32).to_le_bytes());
        header[0x48..0x4c].copy_from_slice(&(objmap as u32).to_le_bytes());
        header[0x50..0x54].copy_from_slice(&(rsrc_tbl as u32).to_le_bytes());
        header[0x54..0x58].copy_from_slice(&1u32.to_le_bytes());
        header[0x80..0x84].copy_from_slice(&(datapage as u32).to_le_bytes());

        let mut object_entry = Vec::new();
        object_entry.extend(0u32.to_le_bytes());
        object_entry.extend(0u32.to_le_bytes());
        object_entry.extend(0u32.to_le_bytes());
        object_entry.extend(1u32.to_le_bytes());
        object_entry.extend(1u32.to_le_bytes());
        object_entry.extend(0u32.to_le_bytes());

        let mut page_entry = Vec::new();
        page_entry.extend(0u32.to_le_bytes());
        page_entry.extend((compressed.len() as u16).to_le_bytes());
        page_entry.extend(OP32_ITERDATA2.to_le_bytes());

        let mut resource_entry = Vec::new();
        resource_entry.extend(OS2RES_FONTFACE.to_le_bytes());
        resource_entry.extend(0u16.to_le_bytes());
        resource_entry.extend(1u32.to_le_bytes()); // cb: only the one decoded byte
        resource_entry.extend(1u16.to_le_bytes());
        resource_entry.extend(0u32.to_le_bytes());

        let mut out = header;
        out.extend(object_entry);
        out.extend(page_entry);
        out.extend(resource_entry);
        out.extend(compressed);

        // A single decoded byte cannot be a valid FNT header, so this
        // exercises the page-decompression path up to (and erroring
        // inside) `winfnt::load_fnt` rather than asserting a decoded font.
        assert!(matches!(load_lx(&out, 0), Err(Error::BadStructure(_))));
    }
}
