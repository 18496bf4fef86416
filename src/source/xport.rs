//! SAS transport (XPORT) version 5 decoder.
//!
//! A transport file is a sequence of 80-byte records: a library header, a
//! member header with the dataset name and label, one 140-byte "namestr"
//! per variable, then the observations packed back to back and blank-padded
//! to the record boundary. Numbers are IBM/370 hexadecimal floats, possibly
//! truncated to fewer than 8 bytes.
//!
//! Only the first member of a library is decoded.

use super::{DecodedFile, DeclaredType, Decoder, SourceMetadata, VariableInfo, decode_text};
use crate::error::{ConvertError, Result, ResultExt as _};
use chrono::NaiveDateTime;
use polars::prelude::*;
use std::path::Path;

const RECORD_LEN: usize = 80;

const LIBRARY_HEADER: &[u8] = b"HEADER RECORD*******LIBRARY HEADER RECORD!!!!!!!";
const LIBRARY_V8_HEADER: &[u8] = b"HEADER RECORD*******LIBV8   HEADER RECORD!!!!!!!";
const MEMBER_HEADER: &[u8] = b"HEADER RECORD*******MEMBER  HEADER RECORD!!!!!!!";
const DESCRIPTOR_HEADER: &[u8] = b"HEADER RECORD*******DSCRPTR HEADER RECORD!!!!!!!";
const NAMESTR_HEADER: &[u8] = b"HEADER RECORD*******NAMESTR HEADER RECORD!!!!!!!";
const OBS_HEADER: &[u8] = b"HEADER RECORD*******OBS     HEADER RECORD!!!!!!!";

/// Header timestamps look like `13APR89:10:20:06`.
const HEADER_DATETIME_FORMAT: &str = "%d%b%y:%H:%M:%S";

/// Decoder for `.xpt` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct XportDecoder;

impl Decoder for XportDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedFile> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_xport(&bytes)
    }
}

/// One variable's layout inside an observation.
#[derive(Debug, Clone)]
struct Namestr {
    info: VariableInfo,
    offset: usize,
    width: usize,
}

/// Walks the file one 80-byte record at a time.
struct Records<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Records<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Self { bytes, pos: 0 }
    }

    fn next_record(&mut self, what: &str) -> Result<&'a [u8]> {
        self.take(RECORD_LEN, what)
    }

    fn expect_header(&mut self, prefix: &[u8], what: &str) -> Result<&'a [u8]> {
        let record = self.next_record(what)?;
        if !record.starts_with(prefix) {
            return Err(ConvertError::Decode(format!("Expected the {what}")));
        }
        Ok(record)
    }

    fn take(&mut self, len: usize, what: &str) -> Result<&'a [u8]> {
        let end = self.pos + len;
        let slice = self.bytes.get(self.pos..end).ok_or_else(|| {
            ConvertError::Decode(format!("Transport file is truncated in the {what}"))
        })?;
        self.pos = end;
        Ok(slice)
    }

    fn align(&mut self) {
        let rem = self.pos % RECORD_LEN;
        if rem != 0 {
            self.pos = (self.pos + RECORD_LEN - rem).min(self.bytes.len());
        }
    }

    fn rest(&self) -> &'a [u8] {
        &self.bytes[self.pos.min(self.bytes.len())..]
    }
}

/// Parses a complete transport file held in memory.
pub fn parse_xport(bytes: &[u8]) -> Result<DecodedFile> {
    let mut records = Records::new(bytes);

    let library = records.next_record("library header")?;
    if library.starts_with(LIBRARY_V8_HEADER) {
        return Err(ConvertError::Decode(
            "XPORT version 8 libraries are not supported".to_owned(),
        ));
    }
    if !library.starts_with(LIBRARY_HEADER) {
        return Err(ConvertError::Decode(
            "Not a SAS transport file (missing library header)".to_owned(),
        ));
    }
    // Library creation and modification records.
    records.next_record("library header")?;
    records.next_record("library header")?;

    let member = records.expect_header(MEMBER_HEADER, "member header")?;
    let namestr_len = match ascii_number(&member[74..78]) {
        Some(136) => 136,
        _ => 140,
    };
    records.expect_header(DESCRIPTOR_HEADER, "descriptor header")?;

    let descriptor = records.next_record("member descriptor")?;
    let table_name = decode_text(&descriptor[8..16], "dataset name")?;
    let created = parse_header_datetime(&descriptor[64..80]);

    let descriptor = records.next_record("member descriptor")?;
    let modified = parse_header_datetime(&descriptor[0..16]);
    let file_label = Some(decode_text(&descriptor[32..72], "dataset label")?)
        .filter(|label| !label.is_empty());

    let header = records.expect_header(NAMESTR_HEADER, "namestr header")?;
    let variable_count = ascii_number(&header[54..58]).ok_or_else(|| {
        ConvertError::Decode("Namestr header has no variable count".to_owned())
    })?;

    let mut namestrs = Vec::with_capacity(variable_count);
    for _ in 0..variable_count {
        let raw = records.take(namestr_len, "namestr records")?;
        namestrs.push(parse_namestr(raw)?);
    }
    records.align();
    records.expect_header(OBS_HEADER, "observation header")?;

    let data = member_data(records.rest());
    let table = read_observations(data, &namestrs)?;
    tracing::debug!(
        table = %table_name,
        variables = namestrs.len(),
        rows = table.height(),
        "Decoded transport member"
    );

    Ok(DecodedFile {
        table,
        metadata: SourceMetadata {
            table_name,
            file_label,
            row_count: None,
            created,
            modified,
            variables: namestrs.into_iter().map(|n| n.info).collect(),
        },
    })
}

fn parse_namestr(raw: &[u8]) -> Result<Namestr> {
    let declared_type = match be_i16(raw, 0) {
        1 => DeclaredType::Numeric,
        2 => DeclaredType::Character,
        other => {
            return Err(ConvertError::Decode(format!(
                "Unknown variable type {other} in namestr record"
            )));
        }
    };
    let width = usize::try_from(be_i16(raw, 4))
        .map_err(|_| ConvertError::Decode("Negative variable length".to_owned()))?;
    let offset = usize::try_from(be_i32(raw, 84))
        .map_err(|_| ConvertError::Decode("Negative variable position".to_owned()))?;
    if declared_type == DeclaredType::Numeric && !(2..=8).contains(&width) {
        return Err(ConvertError::Decode(format!(
            "Numeric variable has invalid length {width}"
        )));
    }

    let mut info = VariableInfo::new(decode_text(&raw[8..16], "variable name")?, declared_type);
    info.label = Some(decode_text(&raw[16..56], "variable label")?);
    info.length = u32::try_from(width).ok();
    info.format = format_string(
        &decode_text(&raw[56..64], "variable format")?,
        be_i16(raw, 64),
        be_i16(raw, 66),
    );

    Ok(Namestr {
        info,
        offset,
        width,
    })
}

/// Renders `name`, width and decimals as a SAS format such as `DATE9.` or `8.2`.
fn format_string(name: &str, width: i16, decimals: i16) -> Option<String> {
    if name.is_empty() && width <= 0 {
        return None;
    }
    let mut format = name.to_owned();
    if width > 0 {
        format.push_str(&width.to_string());
    }
    format.push('.');
    if decimals > 0 {
        format.push_str(&decimals.to_string());
    }
    Some(format)
}

/// Cuts the observation bytes off at the next member header, if any.
fn member_data(rest: &[u8]) -> &[u8] {
    let next_member = rest
        .chunks(RECORD_LEN)
        .position(|record| record.starts_with(MEMBER_HEADER));
    match next_member {
        Some(index) => {
            tracing::debug!("Transport library has more than one member; reading the first");
            &rest[..index * RECORD_LEN]
        }
        None => rest,
    }
}

fn read_observations(data: &[u8], namestrs: &[Namestr]) -> Result<DataFrame> {
    let row_len = namestrs
        .iter()
        .map(|n| n.offset + n.width)
        .max()
        .unwrap_or(0);

    let row_count = if row_len == 0 {
        0
    } else {
        let mut count = data.len() / row_len;
        // Blank padding after the last observation can hold whole "rows" when
        // rows are shorter than a record.
        let padding_start = data.len().saturating_sub(RECORD_LEN);
        while count > 0 {
            let start = (count - 1) * row_len;
            let row = &data[start..start + row_len];
            if start >= padding_start && row.iter().all(|b| *b == b' ') {
                count -= 1;
            } else {
                break;
            }
        }
        count
    };

    let mut columns = Vec::with_capacity(namestrs.len());
    for namestr in namestrs {
        let cells = (0..row_count).map(|row| {
            let start = row * row_len + namestr.offset;
            &data[start..start + namestr.width]
        });
        let name = namestr.info.name.as_str();
        let series = match namestr.info.declared_type {
            Some(DeclaredType::Character) => {
                let values = cells
                    .map(|cell| decode_text(cell, "character value").map(Some))
                    .collect::<Result<Vec<Option<String>>>>()
                    .with_context(|| format!("Column {name}"))?;
                Series::new(name.into(), values)
            }
            _ => {
                let values: Vec<Option<f64>> = cells.map(read_ibm_number).collect();
                Series::new(name.into(), values)
            }
        };
        columns.push(Column::from(series));
    }

    DataFrame::new(columns).map_err(ConvertError::from)
}

/// Reads a possibly truncated IBM float; SAS missing values (`.`, `._`, `.A`-`.Z`) are `None`.
fn read_ibm_number(bytes: &[u8]) -> Option<f64> {
    let first = *bytes.first()?;
    let is_missing_marker = first == b'.' || first == b'_' || first.is_ascii_uppercase();
    if is_missing_marker && bytes[1..].iter().all(|b| *b == 0) {
        return None;
    }
    Some(ibm_to_f64(bytes))
}

/// Converts an IBM/370 hexadecimal float (big-endian, 2-8 bytes) to an IEEE double.
pub(crate) fn ibm_to_f64(bytes: &[u8]) -> f64 {
    let mut buf = [0u8; 8];
    let len = bytes.len().min(8);
    buf[..len].copy_from_slice(&bytes[..len]);

    let mantissa = buf[1..]
        .iter()
        .fold(0u64, |acc, b| (acc << 8) | u64::from(*b));
    if mantissa == 0 {
        return 0.0;
    }
    let sign = if buf[0] & 0x80 == 0 { 1.0 } else { -1.0 };
    let exponent = i32::from(buf[0] & 0x7f) - 64;
    // value = 0.mantissa (56 bits) * 16^exponent
    sign * (mantissa as f64) * 2f64.powi(4 * exponent - 56)
}

fn parse_header_datetime(raw: &[u8]) -> Option<NaiveDateTime> {
    let text = std::str::from_utf8(raw).ok()?.trim();
    NaiveDateTime::parse_from_str(text, HEADER_DATETIME_FORMAT).ok()
}

fn ascii_number(raw: &[u8]) -> Option<usize> {
    std::str::from_utf8(raw).ok()?.trim().parse().ok()
}

fn be_i16(raw: &[u8], at: usize) -> i16 {
    i16::from_be_bytes([raw[at], raw[at + 1]])
}

fn be_i32(raw: &[u8], at: usize) -> i32 {
    i32::from_be_bytes([raw[at], raw[at + 1], raw[at + 2], raw[at + 3]])
}
