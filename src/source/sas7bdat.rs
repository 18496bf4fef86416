//! SAS7BDAT decoder.
//!
//! The file is a fixed header followed by fixed-size pages. Metadata lives in
//! typed "subheaders" on meta and mix pages; rows live on data pages, at the
//! tail of mix pages, or (for compressed files) in data subheaders on meta
//! pages. Both 32/64-bit layouts and both byte orders are handled, as are
//! RLE (`SASYZCRL`) and RDC (`SASYZCR2`) compressed rows.
//!
//! Decoding runs in two passes: the first walks every page collecting column
//! metadata and the location of each row, the second decodes the rows once
//! the column layout is known.

use super::{
    DecodedFile, DeclaredType, Decoder, SourceMetadata, VariableInfo, decode_text, sas_datetime,
};
use crate::error::{ConvertError, Result, ResultExt as _};
use polars::prelude::*;
use std::path::Path;

const MAGIC: [u8; 32] = [
    0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0x00, 0xc2, 0xea, 0x81, 0x60,
    0xb3, 0x14, 0x11, 0xcf, 0xbd, 0x92, 0x08, 0x00, 0x09, 0xc7, 0x31, 0x8c, 0x18, 0x1f, 0x10, 0x11,
];

/// Size of the fixed part of the header that precedes the variable-length rest.
const MIN_HEADER_LEN: usize = 288;

const PAGE_TYPE_MASK: u64 = 0xF000 | 0x0700;
const PAGE_META: u64 = 0;
const PAGE_DATA: u64 = 256;
const PAGE_MIX: u64 = 512;
const PAGE_AMD: u64 = 1024;
const PAGE_METC: u64 = 16384;

/// Offset of the subheader pointer table from the end of the page bit offset.
const SUBHEADER_POINTERS_OFFSET: usize = 8;
const TRUNCATED_SUBHEADER: u64 = 1;
const COMPRESSED_SUBHEADER: u64 = 4;
const COMPRESSED_SUBHEADER_TYPE: u64 = 1;

const RLE_LITERAL: &[u8] = b"SASYZCRL";
const RDC_LITERAL: &[u8] = b"SASYZCR2";

/// Decoder for `.sas7bdat` files.
#[derive(Debug, Clone, Copy, Default)]
pub struct Sas7bdatDecoder;

impl Decoder for Sas7bdatDecoder {
    fn decode(&self, path: &Path) -> Result<DecodedFile> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        parse_sas7bdat(&bytes)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Compression {
    None,
    Rle,
    Rdc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Subheader {
    RowSize,
    ColumnSize,
    Counts,
    ColumnText,
    ColumnName,
    ColumnAttributes,
    FormatAndLabel,
    ColumnList,
}

/// Identifies a subheader by its signature (4 bytes on 32-bit files, 8 on 64-bit).
fn subheader_kind(signature: &[u8]) -> Option<Subheader> {
    let kind = match signature {
        [0xF7, 0xF7, 0xF7, 0xF7]
        | [0x00, 0x00, 0x00, 0x00, 0xF7, 0xF7, 0xF7, 0xF7]
        | [0xF7, 0xF7, 0xF7, 0xF7, 0x00, 0x00, 0x00, 0x00]
        | [0xF7, 0xF7, 0xF7, 0xF7, 0xFF, 0xFF, 0xFB, 0xFE] => Subheader::RowSize,
        [0xF6, 0xF6, 0xF6, 0xF6]
        | [0x00, 0x00, 0x00, 0x00, 0xF6, 0xF6, 0xF6, 0xF6]
        | [0xF6, 0xF6, 0xF6, 0xF6, 0x00, 0x00, 0x00, 0x00]
        | [0xF6, 0xF6, 0xF6, 0xF6, 0xFF, 0xFF, 0xFB, 0xFE] => Subheader::ColumnSize,
        [0x00, 0xFC, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFC, 0x00]
        | [0x00, 0xFC, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC, 0x00] => Subheader::Counts,
        [0xFD, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFD]
        | [0xFD, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFD] => Subheader::ColumnText,
        [0xFF, 0xFF, 0xFF, 0xFF] | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF] => {
            Subheader::ColumnName
        }
        [0xFC, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFC]
        | [0xFC, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFC] => Subheader::ColumnAttributes,
        [0xFE, 0xFB, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFB, 0xFE]
        | [0xFE, 0xFB, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFB, 0xFE] => Subheader::FormatAndLabel,
        [0xFE, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFE]
        | [0xFE, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF]
        | [0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFF, 0xFE] => Subheader::ColumnList,
        _ => return None,
    };
    Some(kind)
}

/// Endian-aware bounds-checked reads over the whole file.
#[derive(Clone, Copy)]
struct Bytes<'a> {
    data: &'a [u8],
    little_endian: bool,
}

impl<'a> Bytes<'a> {
    fn slice(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        self.data
            .get(offset..offset + len)
            .ok_or_else(|| ConvertError::Decode("SAS7BDAT file is truncated".to_owned()))
    }

    fn uint(&self, offset: usize, width: usize) -> Result<u64> {
        let raw = self.slice(offset, width)?;
        let mut buf = [0u8; 8];
        if self.little_endian {
            buf[..width].copy_from_slice(raw);
            Ok(u64::from_le_bytes(buf))
        } else {
            buf[8 - width..].copy_from_slice(raw);
            Ok(u64::from_be_bytes(buf))
        }
    }

    fn usize(&self, offset: usize, width: usize) -> Result<usize> {
        usize::try_from(self.uint(offset, width)?)
            .map_err(|_| ConvertError::Decode("Offset does not fit in memory".to_owned()))
    }

    /// Reads a double stored in `raw.len()` bytes; truncated doubles keep their high-order bytes.
    fn float(&self, raw: &[u8]) -> f64 {
        let mut buf = [0u8; 8];
        let len = raw.len().min(8);
        if self.little_endian {
            buf[8 - len..].copy_from_slice(&raw[..len]);
            f64::from_le_bytes(buf)
        } else {
            buf[..len].copy_from_slice(&raw[..len]);
            f64::from_be_bytes(buf)
        }
    }
}

/// Word size dependent layout constants.
#[derive(Debug, Clone, Copy)]
struct Layout {
    is_u64: bool,
    int_len: usize,
    page_bit_offset: usize,
    subheader_pointer_len: usize,
}

impl Layout {
    fn new(is_u64: bool) -> Self {
        if is_u64 {
            Self {
                is_u64,
                int_len: 8,
                page_bit_offset: 32,
                subheader_pointer_len: 24,
            }
        } else {
            Self {
                is_u64,
                int_len: 4,
                page_bit_offset: 16,
                subheader_pointer_len: 12,
            }
        }
    }
}

#[derive(Debug, Clone)]
struct ColumnLayout {
    offset: usize,
    width: usize,
    numeric: bool,
}

/// Where one row's bytes live in the file.
#[derive(Debug, Clone, Copy)]
struct RowLocation {
    start: usize,
    len: usize,
}

/// State accumulated while walking the pages.
#[derive(Debug)]
struct Parser {
    layout: Layout,
    compression: Compression,
    row_length: usize,
    row_count: usize,
    mix_page_row_count: usize,
    column_count: Option<usize>,
    text_blocks: Vec<Vec<u8>>,
    names: Vec<String>,
    columns: Vec<ColumnLayout>,
    formats: Vec<(String, String)>,
    rows: Vec<RowLocation>,
}

/// Parses a complete SAS7BDAT file held in memory.
pub fn parse_sas7bdat(data: &[u8]) -> Result<DecodedFile> {
    if data.len() < MIN_HEADER_LEN || data[..MAGIC.len()] != MAGIC {
        return Err(ConvertError::Decode(
            "Not a SAS7BDAT file (magic number mismatch)".to_owned(),
        ));
    }

    let layout = Layout::new(data[32] == b'3');
    let align = if data[35] == b'3' { 4 } else { 0 };
    let bytes = Bytes {
        data,
        little_endian: data[37] == 0x01,
    };

    let table_name = decode_text(bytes.slice(92, 64)?, "dataset name")?;
    let created = sas_datetime(bytes.float(bytes.slice(164 + align, 8)?));
    let modified = sas_datetime(bytes.float(bytes.slice(172 + align, 8)?));
    let header_len = bytes.usize(196 + align, 4)?;
    let page_len = bytes.usize(200 + align, 4)?;
    tracing::debug!(
        encoding = data[70],
        is_u64 = layout.is_u64,
        little_endian = bytes.little_endian,
        header_len,
        page_len,
        "Read SAS7BDAT header"
    );
    if header_len < MIN_HEADER_LEN || header_len > data.len() || page_len == 0 {
        return Err(ConvertError::Decode(
            "SAS7BDAT header has invalid header or page length".to_owned(),
        ));
    }

    let mut parser = Parser {
        layout,
        compression: Compression::None,
        row_length: 0,
        row_count: 0,
        mix_page_row_count: 0,
        column_count: None,
        text_blocks: Vec::new(),
        names: Vec::new(),
        columns: Vec::new(),
        formats: Vec::new(),
        rows: Vec::new(),
    };

    let mut page_start = header_len;
    while page_start + page_len <= data.len() {
        parser.read_page(bytes, page_start, page_len)?;
        page_start += page_len;
    }
    if page_start < data.len() {
        tracing::warn!(
            trailing_bytes = data.len() - page_start,
            "SAS7BDAT file ends with a partial page"
        );
    }

    let declared_rows = parser.row_count;
    let (table, variables) = parser.finish(bytes)?;
    Ok(DecodedFile {
        table,
        metadata: SourceMetadata {
            table_name,
            file_label: None,
            row_count: Some(declared_rows as u64),
            created,
            modified,
            variables,
        },
    })
}

impl Parser {
    fn read_page(&mut self, bytes: Bytes<'_>, page_start: usize, page_len: usize) -> Result<()> {
        let bit_offset = self.layout.page_bit_offset;
        let page_type = bytes.uint(page_start + bit_offset, 2)? & PAGE_TYPE_MASK;
        let block_count = bytes.usize(page_start + bit_offset + 2, 2)?;
        let subheader_count = bytes.usize(page_start + bit_offset + 4, 2)?;

        if matches!(page_type, PAGE_META | PAGE_METC | PAGE_MIX | PAGE_AMD) {
            self.read_subheaders(bytes, page_start, subheader_count)?;
        }

        let remaining = self.row_count.saturating_sub(self.rows.len());
        if remaining == 0 {
            return Ok(());
        }
        match page_type {
            PAGE_MIX => {
                let pointers_end = bit_offset
                    + SUBHEADER_POINTERS_OFFSET
                    + subheader_count * self.layout.subheader_pointer_len;
                let first_row = pointers_end + pointers_end % 8;
                let count = self.mix_page_row_count.min(remaining);
                self.push_page_rows(page_start, page_len, first_row, count)
            }
            PAGE_DATA => {
                let first_row = bit_offset + SUBHEADER_POINTERS_OFFSET;
                self.push_page_rows(page_start, page_len, first_row, block_count.min(remaining))
            }
            _ => Ok(()),
        }
    }

    fn push_page_rows(
        &mut self,
        page_start: usize,
        page_len: usize,
        first_row: usize,
        count: usize,
    ) -> Result<()> {
        if self.row_length == 0 {
            return Err(ConvertError::Decode(
                "Row data found before the row size subheader".to_owned(),
            ));
        }
        if first_row + count * self.row_length > page_len {
            return Err(ConvertError::Decode(
                "Page declares more rows than it can hold".to_owned(),
            ));
        }
        self.rows.extend((0..count).map(|i| RowLocation {
            start: page_start + first_row + i * self.row_length,
            len: self.row_length,
        }));
        Ok(())
    }

    fn read_subheaders(
        &mut self,
        bytes: Bytes<'_>,
        page_start: usize,
        subheader_count: usize,
    ) -> Result<()> {
        let int_len = self.layout.int_len;
        let pointers = page_start + self.layout.page_bit_offset + SUBHEADER_POINTERS_OFFSET;

        for i in 0..subheader_count {
            let pointer = pointers + i * self.layout.subheader_pointer_len;
            let offset = bytes.usize(pointer, int_len)?;
            let len = bytes.usize(pointer + int_len, int_len)?;
            let compression = bytes.uint(pointer + 2 * int_len, 1)?;
            let subheader_type = bytes.uint(pointer + 2 * int_len + 1, 1)?;
            if len == 0 || compression == TRUNCATED_SUBHEADER {
                continue;
            }

            let start = page_start + offset;
            let signature = bytes.slice(start, int_len)?;
            match subheader_kind(signature) {
                Some(Subheader::RowSize) => self.read_row_size(bytes, start)?,
                Some(Subheader::ColumnSize) => {
                    self.column_count = Some(bytes.usize(start + int_len, int_len)?);
                }
                Some(Subheader::ColumnText) => self.read_column_text(bytes, start)?,
                Some(Subheader::ColumnName) => self.read_column_names(bytes, start, len)?,
                Some(Subheader::ColumnAttributes) => {
                    self.read_column_attributes(bytes, start, len)?;
                }
                Some(Subheader::FormatAndLabel) => self.read_format_and_label(bytes, start)?,
                Some(Subheader::Counts | Subheader::ColumnList) => {}
                None => {
                    let is_data = self.compression != Compression::None
                        && (compression == COMPRESSED_SUBHEADER || compression == 0)
                        && subheader_type == COMPRESSED_SUBHEADER_TYPE;
                    if !is_data {
                        return Err(ConvertError::Decode(format!(
                            "Unknown subheader signature {signature:02x?}"
                        )));
                    }
                    if self.rows.len() < self.row_count {
                        self.rows.push(RowLocation { start, len });
                    }
                }
            }
        }
        Ok(())
    }

    fn read_row_size(&mut self, bytes: Bytes<'_>, start: usize) -> Result<()> {
        let int_len = self.layout.int_len;
        self.row_length = bytes.usize(start + 5 * int_len, int_len)?;
        self.row_count = bytes.usize(start + 6 * int_len, int_len)?;
        self.mix_page_row_count = bytes.usize(start + 15 * int_len, int_len)?;
        Ok(())
    }

    fn read_column_text(&mut self, bytes: Bytes<'_>, start: usize) -> Result<()> {
        let block_start = start + self.layout.int_len;
        let block_len = bytes.usize(block_start, 2)?;
        let block = bytes.slice(block_start, block_len)?.to_vec();

        if self.text_blocks.is_empty() {
            self.compression = if contains(&block, RLE_LITERAL) {
                Compression::Rle
            } else if contains(&block, RDC_LITERAL) {
                Compression::Rdc
            } else {
                Compression::None
            };
        }
        self.text_blocks.push(block);
        Ok(())
    }

    fn read_column_names(&mut self, bytes: Bytes<'_>, start: usize, len: usize) -> Result<()> {
        let int_len = self.layout.int_len;
        let base = start + int_len;
        let count = len.saturating_sub(2 * int_len + 12) / 8;
        for i in 0..count {
            let pointer = base + 8 * (i + 1);
            let block = bytes.usize(pointer, 2)?;
            let text_offset = bytes.usize(pointer + 2, 2)?;
            let text_len = bytes.usize(pointer + 4, 2)?;
            let name = self.text(block, text_offset, text_len, "column name")?;
            self.names.push(name);
        }
        Ok(())
    }

    fn read_column_attributes(&mut self, bytes: Bytes<'_>, start: usize, len: usize) -> Result<()> {
        let int_len = self.layout.int_len;
        let stride = int_len + 8;
        let count = len.saturating_sub(2 * int_len + 12) / stride;
        for i in 0..count {
            let offset = bytes.usize(start + int_len + 8 + i * stride, int_len)?;
            let width = bytes.usize(start + 2 * int_len + 8 + i * stride, 4)?;
            let column_type = bytes.uint(start + 2 * int_len + 14 + i * stride, 1)?;
            self.columns.push(ColumnLayout {
                offset,
                width,
                numeric: column_type == 1,
            });
        }
        Ok(())
    }

    fn read_format_and_label(&mut self, bytes: Bytes<'_>, start: usize) -> Result<()> {
        let base = start + 3 * self.layout.int_len;
        let last_block = self.text_blocks.len().saturating_sub(1);

        let format_block = bytes.usize(base + 22, 2)?.min(last_block);
        let format_offset = bytes.usize(base + 24, 2)?;
        let format_len = bytes.usize(base + 26, 2)?;
        let label_block = bytes.usize(base + 28, 2)?.min(last_block);
        let label_offset = bytes.usize(base + 30, 2)?;
        let label_len = bytes.usize(base + 32, 2)?;

        let format = self.text(format_block, format_offset, format_len, "column format")?;
        let label = self.text(label_block, label_offset, label_len, "column label")?;
        self.formats.push((format, label));
        Ok(())
    }

    fn text(&self, block: usize, offset: usize, len: usize, what: &str) -> Result<String> {
        if len == 0 {
            return Ok(String::new());
        }
        let raw = self
            .text_blocks
            .get(block)
            .and_then(|b| b.get(offset..offset + len))
            .ok_or_else(|| ConvertError::Decode(format!("The {what} points outside the text blocks")))?;
        decode_text(raw, what)
    }

    fn finish(self, bytes: Bytes<'_>) -> Result<(DataFrame, Vec<VariableInfo>)> {
        let column_count = self.column_count.unwrap_or(self.names.len());
        if self.names.len() < column_count || self.columns.len() < column_count {
            return Err(ConvertError::Decode(format!(
                "Expected {column_count} columns but found {} names and {} attributes",
                self.names.len(),
                self.columns.len()
            )));
        }
        if self.rows.len() < self.row_count {
            tracing::warn!(
                declared = self.row_count,
                found = self.rows.len(),
                "SAS7BDAT file holds fewer rows than its header declares"
            );
        }

        let rows = self
            .rows
            .iter()
            .map(|location| self.row_bytes(bytes, *location))
            .collect::<Result<Vec<_>>>()?;

        let mut series = Vec::with_capacity(column_count);
        let mut variables = Vec::with_capacity(column_count);
        for (index, (name, column)) in self.names.iter().zip(&self.columns).take(column_count).enumerate()
        {
            let end = column.offset + column.width;
            if end > self.row_length {
                return Err(ConvertError::Decode(format!(
                    "Column {name} lies outside the row"
                )));
            }
            let cells = rows.iter().map(|row| &row[column.offset..end]);

            let declared_type = if column.numeric {
                let values: Vec<Option<f64>> = cells
                    .map(|cell| Some(bytes.float(cell)).filter(|v| !v.is_nan()))
                    .collect();
                series.push(Column::from(Series::new(name.as_str().into(), values)));
                DeclaredType::Numeric
            } else {
                let values = cells
                    .map(|cell| decode_text(cell, "character value").map(Some))
                    .collect::<Result<Vec<Option<String>>>>()
                    .with_context(|| format!("Column {name}"))?;
                series.push(Column::from(Series::new(name.as_str().into(), values)));
                DeclaredType::Character
            };

            let mut info = VariableInfo::new(name.clone(), declared_type);
            info.length = u32::try_from(column.width).ok();
            if let Some((format, label)) = self.formats.get(index) {
                info.format = Some(format.clone());
                info.label = Some(label.clone());
            }
            variables.push(info);
        }

        let table = DataFrame::new(series)?;
        Ok((table, variables))
    }

    fn row_bytes(&self, bytes: Bytes<'_>, location: RowLocation) -> Result<Vec<u8>> {
        let raw = bytes.slice(location.start, location.len)?;
        if location.len < self.row_length {
            return match self.compression {
                Compression::Rle => rle_decompress(raw, self.row_length),
                Compression::Rdc => rdc_decompress(raw, self.row_length),
                Compression::None => Err(ConvertError::Decode(
                    "Row is shorter than the declared row length".to_owned(),
                )),
            };
        }
        Ok(raw[..self.row_length].to_vec())
    }
}

fn contains(haystack: &[u8], needle: &[u8]) -> bool {
    haystack.windows(needle.len()).any(|window| window == needle)
}

fn corrupt(what: &str) -> ConvertError {
    ConvertError::Decode(format!("Corrupt compressed row: {what}"))
}

/// Expands a `SASYZCRL` run-length encoded row.
fn rle_decompress(input: &[u8], row_length: usize) -> Result<Vec<u8>> {
    let mut out = Vec::with_capacity(row_length);
    let mut pos = 0;
    let byte_at = |pos: usize| input.get(pos).copied().ok_or_else(|| corrupt("input ended early"));

    while pos < input.len() {
        let control = input[pos] & 0xF0;
        let low = usize::from(input[pos] & 0x0F);
        pos += 1;

        let (literal, fill, count) = match control {
            0x00 => {
                let n = usize::from(byte_at(pos)?) + 64 + low * 256;
                pos += 1;
                (true, 0, n)
            }
            0x40 => {
                let n = usize::from(byte_at(pos)?) + 18 + low * 256;
                let value = byte_at(pos + 1)?;
                pos += 2;
                (false, value, n)
            }
            0x60 => {
                let n = low * 256 + usize::from(byte_at(pos)?) + 17;
                pos += 1;
                (false, b' ', n)
            }
            0x70 => {
                let n = low * 256 + usize::from(byte_at(pos)?) + 17;
                pos += 1;
                (false, 0, n)
            }
            0x80 => (true, 0, low + 1),
            0x90 => (true, 0, low + 17),
            0xA0 => (true, 0, low + 33),
            0xB0 => (true, 0, low + 49),
            0xC0 => {
                let value = byte_at(pos)?;
                pos += 1;
                (false, value, low + 3)
            }
            0xD0 => (false, b'@', low + 2),
            0xE0 => (false, b' ', low + 2),
            0xF0 => (false, 0, low + 2),
            other => return Err(corrupt(&format!("unknown control byte {other:#04x}"))),
        };

        if literal {
            let chunk = input
                .get(pos..pos + count)
                .ok_or_else(|| corrupt("literal runs past the input"))?;
            out.extend_from_slice(chunk);
            pos += count;
        } else {
            out.resize(out.len() + count, fill);
        }
        if out.len() > row_length {
            return Err(corrupt("output exceeds the row length"));
        }
    }

    if out.len() != row_length {
        return Err(corrupt("output is shorter than the row length"));
    }
    Ok(out)
}

/// Expands a `SASYZCR2` (Ross Data Compression) row.
fn rdc_decompress(input: &[u8], row_length: usize) -> Result<Vec<u8>> {
    let mut out: Vec<u8> = Vec::with_capacity(row_length);
    let mut pos = 0;
    let mut ctrl_bits: u16 = 0;
    let mut ctrl_mask: u16 = 0;
    let byte_at = |pos: usize| input.get(pos).copied().ok_or_else(|| corrupt("input ended early"));

    while pos < input.len() {
        ctrl_mask >>= 1;
        if ctrl_mask == 0 {
            ctrl_bits = u16::from_be_bytes([byte_at(pos)?, byte_at(pos + 1)?]);
            pos += 2;
            ctrl_mask = 0x8000;
        }

        if ctrl_bits & ctrl_mask == 0 {
            out.push(byte_at(pos)?);
            pos += 1;
            continue;
        }

        let cmd = usize::from((byte_at(pos)? >> 4) & 0x0F);
        let cnt = usize::from(byte_at(pos)? & 0x0F);
        pos += 1;

        match cmd {
            // short run
            0 => {
                let value = byte_at(pos)?;
                pos += 1;
                out.resize(out.len() + cnt + 3, value);
            }
            // long run
            1 => {
                let n = cnt + (usize::from(byte_at(pos)?) << 4) + 19;
                let value = byte_at(pos + 1)?;
                pos += 2;
                out.resize(out.len() + n, value);
            }
            // long pattern
            2 => {
                let offset = cnt + 3 + (usize::from(byte_at(pos)?) << 4);
                let n = usize::from(byte_at(pos + 1)?) + 16;
                pos += 2;
                copy_back(&mut out, offset, n)?;
            }
            // short pattern, cmd is the length
            _ => {
                let offset = cnt + 3 + (usize::from(byte_at(pos)?) << 4);
                pos += 1;
                copy_back(&mut out, offset, cmd)?;
            }
        }
        if out.len() > row_length {
            return Err(corrupt("output exceeds the row length"));
        }
    }

    if out.len() != row_length {
        return Err(corrupt("output is shorter than the row length"));
    }
    Ok(out)
}

/// Appends `len` bytes copied from `offset` bytes back in the output.
fn copy_back(out: &mut Vec<u8>, offset: usize, len: usize) -> Result<()> {
    let start = out
        .len()
        .checked_sub(offset)
        .ok_or_else(|| corrupt("back reference before the start of the row"))?;
    for k in 0..len {
        let byte = out[start + k];
        out.push(byte);
    }
    Ok(())
}
