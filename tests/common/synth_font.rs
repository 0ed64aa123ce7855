//! A tiny TrueType font built in memory for tests.
//!
//! It carries only the tables the shaper and metrics code read (`cmap`,
//! `head`, `hhea`, `hmtx`, `maxp`). Printable ASCII and the Arabic block
//! U+0600..U+06FF are mapped; advances differ per code point so width
//! comparisons are meaningful.

const UNITS_PER_EM: u16 = 1000;
const ASCII: (u32, u32) = (0x20, 0x7E);
const ARABIC: (u32, u32) = (0x0600, 0x06FF);

fn advance_for(cp: u32) -> u16 {
    if cp == 0x20 {
        250
    } else {
        400 + (cp % 5) as u16 * 60
    }
}

fn push_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_i16(buf: &mut Vec<u8>, v: i16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn push_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn cmap_table() -> Vec<u8> {
    let ascii_first_gid: i32 = 1;
    let arabic_first_gid: i32 = ascii_first_gid + (ASCII.1 - ASCII.0 + 1) as i32;
    let segments: [(u16, u16, i16); 3] = [
        (
            ASCII.0 as u16,
            ASCII.1 as u16,
            (ascii_first_gid - ASCII.0 as i32) as i16,
        ),
        (
            ARABIC.0 as u16,
            ARABIC.1 as u16,
            (arabic_first_gid - ARABIC.0 as i32) as i16,
        ),
        (0xFFFF, 0xFFFF, 1),
    ];
    let seg_count = segments.len() as u16;

    let mut sub = Vec::new();
    push_u16(&mut sub, 4); // format
    push_u16(&mut sub, 16 + 8 * seg_count); // length
    push_u16(&mut sub, 0); // language
    push_u16(&mut sub, seg_count * 2);
    push_u16(&mut sub, 4); // searchRange
    push_u16(&mut sub, 1); // entrySelector
    push_u16(&mut sub, seg_count * 2 - 4); // rangeShift
    for (_, end, _) in &segments {
        push_u16(&mut sub, *end);
    }
    push_u16(&mut sub, 0); // reservedPad
    for (start, _, _) in &segments {
        push_u16(&mut sub, *start);
    }
    for (_, _, delta) in &segments {
        push_i16(&mut sub, *delta);
    }
    for _ in &segments {
        push_u16(&mut sub, 0); // idRangeOffset
    }

    let mut table = Vec::new();
    push_u16(&mut table, 0); // version
    push_u16(&mut table, 1); // numTables
    push_u16(&mut table, 3); // platform: Windows
    push_u16(&mut table, 1); // encoding: Unicode BMP
    push_u32(&mut table, 12);
    table.extend_from_slice(&sub);
    table
}

fn head_table() -> Vec<u8> {
    let mut t = Vec::new();
    push_u32(&mut t, 0x0001_0000);
    push_u32(&mut t, 0x0001_0000);
    push_u32(&mut t, 0); // checkSumAdjustment
    push_u32(&mut t, 0x5F0F_3CF5);
    push_u16(&mut t, 0x000B);
    push_u16(&mut t, UNITS_PER_EM);
    t.extend_from_slice(&0i64.to_be_bytes()); // created
    t.extend_from_slice(&0i64.to_be_bytes()); // modified
    push_i16(&mut t, 0);
    push_i16(&mut t, -200);
    push_i16(&mut t, 1000);
    push_i16(&mut t, 800);
    push_u16(&mut t, 0); // macStyle
    push_u16(&mut t, 8); // lowestRecPPEM
    push_i16(&mut t, 2); // fontDirectionHint
    push_i16(&mut t, 0); // indexToLocFormat
    push_i16(&mut t, 0); // glyphDataFormat
    t
}

fn hhea_table(num_metrics: u16) -> Vec<u8> {
    let mut t = Vec::new();
    push_u32(&mut t, 0x0001_0000);
    push_i16(&mut t, 800);
    push_i16(&mut t, -200);
    push_i16(&mut t, 0);
    push_u16(&mut t, 1000);
    push_i16(&mut t, 0);
    push_i16(&mut t, 0);
    push_i16(&mut t, 1000);
    push_i16(&mut t, 1); // caretSlopeRise
    push_i16(&mut t, 0);
    push_i16(&mut t, 0);
    for _ in 0..4 {
        push_i16(&mut t, 0);
    }
    push_i16(&mut t, 0); // metricDataFormat
    push_u16(&mut t, num_metrics);
    t
}

fn maxp_table(num_glyphs: u16) -> Vec<u8> {
    let mut t = Vec::new();
    push_u32(&mut t, 0x0000_5000);
    push_u16(&mut t, num_glyphs);
    t
}

fn hmtx_table() -> Vec<u8> {
    let mut t = Vec::new();
    push_u16(&mut t, 500); // .notdef
    push_i16(&mut t, 0);
    for (first, last) in [ASCII, ARABIC] {
        for cp in first..=last {
            push_u16(&mut t, advance_for(cp));
            push_i16(&mut t, 0);
        }
    }
    t
}

/// Build the font program.
pub fn synth_font() -> Vec<u8> {
    let num_glyphs = (1 + (ASCII.1 - ASCII.0 + 1) + (ARABIC.1 - ARABIC.0 + 1)) as u16;
    // Sorted by tag.
    let tables: Vec<(&[u8; 4], Vec<u8>)> = vec![
        (b"cmap", cmap_table()),
        (b"head", head_table()),
        (b"hhea", hhea_table(num_glyphs)),
        (b"hmtx", hmtx_table()),
        (b"maxp", maxp_table(num_glyphs)),
    ];

    let mut font = Vec::new();
    push_u32(&mut font, 0x0001_0000);
    push_u16(&mut font, tables.len() as u16);
    push_u16(&mut font, 64); // searchRange
    push_u16(&mut font, 2); // entrySelector
    push_u16(&mut font, tables.len() as u16 * 16 - 64); // rangeShift

    let mut offset = 12 + 16 * tables.len();
    let mut data = Vec::new();
    for (tag, body) in &tables {
        font.extend_from_slice(&tag[..]);
        push_u32(&mut font, 0); // checksum
        push_u32(&mut font, offset as u32);
        push_u32(&mut font, body.len() as u32);
        data.extend_from_slice(body);
        while data.len() % 4 != 0 {
            data.push(0);
        }
        offset = 12 + 16 * tables.len() + data.len();
    }
    font.extend_from_slice(&data);
    font
}
