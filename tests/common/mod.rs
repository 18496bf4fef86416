//! Writes small SAS transport (v5) and SAS7BDAT files for the integration tests.

#![allow(dead_code)]

use std::path::Path;

const RECORD_LEN: usize = 80;
const NAMESTR_LEN: usize = 140;

/// A variable in a generated test file.
pub struct XptVar {
    pub name: &'static str,
    pub label: &'static str,
    pub numeric: bool,
    pub width: usize,
}

impl XptVar {
    pub fn num(name: &'static str, label: &'static str) -> Self {
        Self {
            name,
            label,
            numeric: true,
            width: 8,
        }
    }

    pub fn char(name: &'static str, label: &'static str, width: usize) -> Self {
        Self {
            name,
            label,
            numeric: false,
            width,
        }
    }
}

#[derive(Clone)]
pub enum XptValue {
    Num(Option<f64>),
    Char(&'static str),
}

/// Encodes `value` as an 8-byte IBM/370 hexadecimal float.
pub fn f64_to_ibm(value: f64) -> [u8; 8] {
    if value == 0.0 {
        return [0; 8];
    }
    let sign = if value < 0.0 { 0x80u8 } else { 0 };
    let mut magnitude = value.abs();
    let mut exponent = 64i32;
    while magnitude >= 1.0 {
        magnitude /= 16.0;
        exponent += 1;
    }
    while magnitude < 1.0 / 16.0 {
        magnitude *= 16.0;
        exponent -= 1;
    }
    let mantissa = (magnitude * 2f64.powi(56)).round() as u64;
    let mut out = [0u8; 8];
    out[0] = sign | u8::try_from(exponent).expect("exponent in range");
    out[1..].copy_from_slice(&mantissa.to_be_bytes()[1..]);
    out
}

fn record(fields: &[(usize, &[u8])]) -> Vec<u8> {
    let mut rec = vec![b' '; RECORD_LEN];
    for (at, bytes) in fields {
        rec[*at..*at + bytes.len()].copy_from_slice(bytes);
    }
    rec
}

fn padded(text: &str, width: usize) -> Vec<u8> {
    let mut bytes = text.as_bytes().to_vec();
    assert!(bytes.len() <= width, "{text} does not fit in {width} bytes");
    bytes.resize(width, b' ');
    bytes
}

fn pad_to_record(out: &mut Vec<u8>) {
    let rem = out.len() % RECORD_LEN;
    if rem != 0 {
        out.resize(out.len() + RECORD_LEN - rem, b' ');
    }
}

fn namestr(var: &XptVar, varnum: usize, position: usize) -> Vec<u8> {
    let mut ns = vec![0u8; NAMESTR_LEN];
    let kind: i16 = if var.numeric { 1 } else { 2 };
    ns[0..2].copy_from_slice(&kind.to_be_bytes());
    ns[4..6].copy_from_slice(&(var.width as i16).to_be_bytes());
    ns[6..8].copy_from_slice(&(varnum as i16).to_be_bytes());
    ns[8..16].copy_from_slice(&padded(var.name, 8));
    ns[16..56].copy_from_slice(&padded(var.label, 40));
    ns[56..64].copy_from_slice(&padded("", 8));
    ns[72..80].copy_from_slice(&padded("", 8));
    ns[84..88].copy_from_slice(&(position as i32).to_be_bytes());
    ns
}

/// Builds a complete single-member transport file.
pub fn xpt_bytes(dataset: &str, label: &str, vars: &[XptVar], rows: &[Vec<XptValue>]) -> Vec<u8> {
    let stamp = b"13APR24:10:20:06";
    let mut out = Vec::new();

    out.extend(record(&[(
        0,
        b"HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!000000000000000000000000000000",
    )]));
    out.extend(record(&[(0, b"SAS     SAS     SASLIB  9.4     X64_10PR"), (64, stamp)]));
    out.extend(record(&[(0, stamp)]));
    out.extend(record(&[
        (
            0,
            b"HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!000000000000000001600000000",
        ),
        (74, b"0140"),
    ]));
    out.extend(record(&[(
        0,
        b"HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!000000000000000000000000000000",
    )]));
    out.extend(record(&[
        (0, b"SAS     "),
        (8, &padded(dataset, 8)),
        (16, b"SASDATA 9.4     X64_10PR"),
        (64, stamp),
    ]));
    out.extend(record(&[(0, stamp), (32, &padded(label, 40))]));

    let count = format!("{:04}", vars.len());
    out.extend(record(&[
        (
            0,
            b"HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!000000",
        ),
        (54, count.as_bytes()),
        (58, b"00000000000000000000"),
    ]));
    let mut position = 0;
    for (i, var) in vars.iter().enumerate() {
        out.extend(namestr(var, i + 1, position));
        position += var.width;
    }
    pad_to_record(&mut out);

    out.extend(record(&[(
        0,
        b"HEADER RECORD*******OBS     HEADER RECORD!!!!!!!000000000000000000000000000000",
    )]));
    for row in rows {
        for (var, value) in vars.iter().zip(row) {
            match value {
                XptValue::Num(Some(x)) => out.extend(&f64_to_ibm(*x)[..var.width]),
                XptValue::Num(None) => {
                    out.push(b'.');
                    out.extend(std::iter::repeat_n(0u8, var.width - 1));
                }
                XptValue::Char(text) => out.extend(padded(text, var.width)),
            }
        }
    }
    pad_to_record(&mut out);
    out
}

pub fn write_xpt(
    path: &Path,
    dataset: &str,
    label: &str,
    vars: &[XptVar],
    rows: &[Vec<XptValue>],
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, xpt_bytes(dataset, label, vars, rows))?;
    Ok(())
}

/// The 3-column, 2-row table used by most tests.
pub fn demographics() -> (Vec<XptVar>, Vec<Vec<XptValue>>) {
    let vars = vec![
        XptVar::char("USUBJID", "Unique Subject Identifier", 8),
        XptVar::char("SEX", "Sex", 1),
        XptVar::num("AGE", "Age"),
    ];
    let rows = vec![
        vec![
            XptValue::Char("01-001"),
            XptValue::Char("F"),
            XptValue::Num(Some(34.0)),
        ],
        vec![
            XptValue::Char("01-002"),
            XptValue::Char("M"),
            XptValue::Num(Some(51.5)),
        ],
    ];
    (vars, rows)
}

const SAS_MAGIC: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc2, 0xea, 0x81, 0x60,
    0xb3, 0x14, 0x11, 0xcf, 0xbd, 0x92, 0x08, 0x00, 0x09, 0xc7, 0x31, 0x8c, 0x18, 0x1f, 0x10, 0x11,
];
const SAS_HEADER_LEN: usize = 1024;
const SAS_PAGE_LEN: usize = 4096;
const SAS_PAGE_META: u16 = 0;
const SAS_PAGE_DATA: u16 = 256;
const SAS_PAGE_MIX: u16 = 512;

/// Where the rows of a generated SAS7BDAT file are stored.
#[derive(Debug, Clone, Copy)]
pub enum SasPages {
    /// One mix page holding every subheader followed by the rows
    Mix,
    /// A meta page with the subheaders, then a data page with the rows
    MetaThenData,
}

fn put(buf: &mut [u8], at: usize, bytes: &[u8]) {
    buf[at..at + bytes.len()].copy_from_slice(bytes);
}

/// Seconds since the SAS epoch (1960-01-01).
pub fn sas_seconds(stamp: &str) -> f64 {
    let at = chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").expect("timestamp");
    let epoch = chrono::NaiveDate::from_ymd_opt(1960, 1, 1)
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .expect("epoch");
    (at - epoch).num_seconds() as f64
}

/// Appends `text` to a column text block and returns its `(block, offset, len)` reference.
fn text_ref(block: &mut Vec<u8>, text: &str) -> [u8; 6] {
    let mut out = [0u8; 6];
    if !text.is_empty() {
        let offset = block.len() as u16;
        block.extend_from_slice(text.as_bytes());
        while block.len() % 4 != 0 {
            block.push(b' ');
        }
        out[2..4].copy_from_slice(&offset.to_le_bytes());
        out[4..6].copy_from_slice(&(text.len() as u16).to_le_bytes());
    }
    out
}

fn sas_subheader(signature: [u8; 8], len: usize) -> Vec<u8> {
    let mut sh = vec![0u8; len];
    put(&mut sh, 0, &signature);
    sh
}

fn sas_page(page_type: u16, block_count: usize, subheaders: &[Vec<u8>], rows: &[u8]) -> Vec<u8> {
    let mut page = vec![0u8; SAS_PAGE_LEN];
    put(&mut page, 32, &page_type.to_le_bytes());
    put(&mut page, 34, &(block_count as u16).to_le_bytes());
    put(&mut page, 36, &(subheaders.len() as u16).to_le_bytes());

    let pointers_end = 40 + 24 * subheaders.len();
    let first_row = pointers_end + pointers_end % 8;
    put(&mut page, first_row, rows);

    // Subheaders are packed from the end of the page towards the pointers.
    let mut end = SAS_PAGE_LEN;
    for (i, sh) in subheaders.iter().enumerate() {
        end -= sh.len();
        put(&mut page, end, sh);
        let pointer = 40 + 24 * i;
        put(&mut page, pointer, &(end as u64).to_le_bytes());
        put(&mut page, pointer + 8, &(sh.len() as u64).to_le_bytes());
    }
    assert!(first_row + rows.len() <= end, "test dataset does not fit on one page");
    page
}

/// Builds an uncompressed, 64-bit, little-endian SAS7BDAT file.
///
/// Numeric variables are stored first in each row, as SAS lays them out.
/// Numeric variables get the `BEST` format; character variables get none.
pub fn sas7bdat_bytes(
    dataset: &str,
    vars: &[XptVar],
    rows: &[Vec<XptValue>],
    pages: SasPages,
) -> Vec<u8> {
    let stamp = sas_seconds("2024-04-13 10:20:06");
    let mut header = vec![0u8; SAS_HEADER_LEN];
    put(&mut header, 0, &SAS_MAGIC);
    header[32] = b'3';
    header[35] = b'3';
    header[37] = 0x01;
    header[70] = 20;
    put(&mut header, 92, &padded(dataset, 64));
    put(&mut header, 168, &stamp.to_le_bytes());
    put(&mut header, 176, &stamp.to_le_bytes());
    put(&mut header, 200, &(SAS_HEADER_LEN as u32).to_le_bytes());
    put(&mut header, 204, &(SAS_PAGE_LEN as u32).to_le_bytes());

    let mut offsets = vec![0; vars.len()];
    let mut row_length = 0;
    for numeric in [true, false] {
        for (i, var) in vars.iter().enumerate().filter(|(_, v)| v.numeric == numeric) {
            offsets[i] = row_length;
            row_length += var.width;
        }
    }

    let mut row_bytes = Vec::with_capacity(rows.len() * row_length);
    for row in rows {
        let mut record = vec![0u8; row_length];
        for ((var, value), offset) in vars.iter().zip(row).zip(&offsets) {
            let bytes = match value {
                XptValue::Num(Some(x)) => x.to_le_bytes().to_vec(),
                XptValue::Num(None) => f64::NAN.to_le_bytes().to_vec(),
                XptValue::Char(text) => padded(text, var.width),
            };
            put(&mut record, *offset, &bytes);
        }
        row_bytes.extend(record);
    }

    let mix_rows = match pages {
        SasPages::Mix => rows.len(),
        SasPages::MetaThenData => 0,
    };
    let mut row_size = sas_subheader([0xF7, 0xF7, 0xF7, 0xF7, 0, 0, 0, 0], 128);
    put(&mut row_size, 40, &(row_length as u64).to_le_bytes());
    put(&mut row_size, 48, &(rows.len() as u64).to_le_bytes());
    put(&mut row_size, 120, &(mix_rows as u64).to_le_bytes());

    let mut column_size = sas_subheader([0xF6, 0xF6, 0xF6, 0xF6, 0, 0, 0, 0], 24);
    put(&mut column_size, 8, &(vars.len() as u64).to_le_bytes());

    // Offsets in the text block count from its 2-byte length field.
    let mut text = vec![0u8; 16];
    let mut names = sas_subheader([0xFF; 8], 28 + 8 * vars.len());
    let mut attributes =
        sas_subheader([0xFC, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 28 + 16 * vars.len());
    let mut formats = Vec::with_capacity(vars.len());
    for (i, var) in vars.iter().enumerate() {
        put(&mut names, 16 + 8 * i, &text_ref(&mut text, var.name));

        let at = 16 + 16 * i;
        put(&mut attributes, at, &(offsets[i] as u64).to_le_bytes());
        put(&mut attributes, at + 8, &(var.width as u32).to_le_bytes());
        attributes[at + 14] = if var.numeric { 1 } else { 2 };

        let format = if var.numeric { "BEST" } else { "" };
        let mut sh = sas_subheader([0xFE, 0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 64);
        put(&mut sh, 46, &text_ref(&mut text, format));
        put(&mut sh, 52, &text_ref(&mut text, var.label));
        formats.push(sh);
    }
    let text_len = text.len() as u16;
    put(&mut text, 0, &text_len.to_le_bytes());
    let mut column_text = sas_subheader([0xFD, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF], 8);
    column_text.extend(text);

    let mut subheaders = vec![row_size, column_size, column_text, names, attributes];
    subheaders.extend(formats);

    let mut out = header;
    match pages {
        SasPages::Mix => {
            out.extend(sas_page(SAS_PAGE_MIX, subheaders.len() + rows.len(), &subheaders, &row_bytes));
        }
        SasPages::MetaThenData => {
            out.extend(sas_page(SAS_PAGE_META, subheaders.len(), &subheaders, &[]));
            out.extend(sas_page(SAS_PAGE_DATA, rows.len(), &[], &row_bytes));
        }
    }
    out
}

pub fn write_sas7bdat(
    path: &Path,
    dataset: &str,
    vars: &[XptVar],
    rows: &[Vec<XptValue>],
    pages: SasPages,
) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, sas7bdat_bytes(dataset, vars, rows, pages))?;
    Ok(())
}

pub fn read_json(path: &Path) -> anyhow::Result<serde_json::Value> {
    Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?)
}
