//! Microsoft Office Binary Interchange File Format (BIFF8)
//! Record reader for the Workbook stream of Excel 97-2003 (.xls) files.
//! A logical record is one header record plus any CONTINUE records that follow it.

use crate::error::DrillLedgerError;
use crate::helpers::bytes::LittleEndian;
use encoding_rs::UTF_16LE;
use thiserror::Error;

const CONTINUE: u16 = 60;
const RECORD_HEADER_SIZE: usize = 4;

/// Errors specific to BIFF8 format parsing
#[derive(Error, Debug)]
pub enum Biff8Error {
    #[error("Fewer than {0} bytes remaining in record")]
    NoEnoughDataError(usize),

    #[error("Record pointer '{0}' is outside the workbook stream")]
    PointerError(usize),
}

/// Sequential reader over BIFF8 records.
pub(crate) struct Biff8Reader {
    stream: Vec<u8>,
    /// Offset of the next record header
    cursor: usize,
    /// Body segments (start, end) of the current record and its CONTINUE records
    segments: Vec<(usize, usize)>,
    /// Segment currently being read
    segment: usize,
    /// Read position inside the current segment
    position: usize,
}

impl Biff8Reader {
    pub(crate) fn new(stream: Vec<u8>) -> Biff8Reader {
        Biff8Reader {
            stream,
            cursor: 0,
            segments: Vec::new(),
            segment: 0,
            position: 0,
        }
    }

    /// Advances to the next record and returns its type, or None at the end of the stream.
    pub(crate) fn next(&mut self) -> Result<Option<u16>, DrillLedgerError> {
        let Some((kind, body)) = self.header_at(self.cursor) else {
            return Ok(None);
        };
        self.segments.clear();
        self.segments.push(body);
        self.cursor = body.1;
        while let Some((CONTINUE, body)) = self.header_at(self.cursor) {
            self.segments.push(body);
            self.cursor = body.1;
        }
        self.segment = 0;
        self.position = 0;
        Ok(Some(kind))
    }

    /// Moves to an absolute stream offset (a BoundSheet8 substream pointer).
    pub(crate) fn goto(&mut self, pointer: usize) -> Result<(), DrillLedgerError> {
        if pointer >= self.stream.len() {
            Err(Biff8Error::PointerError(pointer))?
        }
        self.cursor = pointer;
        self.segments.clear();
        Ok(())
    }

    /// Record type and body bounds of the header at `offset`; truncated bodies are clamped.
    fn header_at(&self, offset: usize) -> Option<(u16, (usize, usize))> {
        let kind = self.stream.u16_at(offset)?;
        let size = self.stream.u16_at(offset + 2)? as usize;
        let start = offset + RECORD_HEADER_SIZE;
        let end = (start + size).min(self.stream.len());
        if start > self.stream.len() {
            return None;
        }
        Some((kind, (start, end)))
    }

    /// Takes up to `length` bytes from the current segment without crossing into the next one.
    fn take(&mut self, length: usize) -> &[u8] {
        while let Some((start, end)) = self.segments.get(self.segment).copied() {
            let lower = start + self.position;
            if lower >= end {
                self.segment += 1;
                self.position = 0;
                continue;
            }
            let upper = end.min(lower.saturating_add(length));
            self.position += upper - lower;
            return &self.stream[lower..upper];
        }
        &[]
    }

    /// True when the current segment is used up and a CONTINUE segment follows.
    fn at_segment_end(&self) -> bool {
        match self.segments.get(self.segment) {
            Some((start, end)) => start + self.position >= *end && self.segment + 1 < self.segments.len(),
            None => false,
        }
    }

    /// Takes exactly `length` bytes, allowing the read to span CONTINUE boundaries.
    fn take_exact(&mut self, length: usize) -> Result<Vec<u8>, DrillLedgerError> {
        let mut bytes = Vec::with_capacity(length);
        while bytes.len() < length {
            let chunk = self.take(length - bytes.len());
            if chunk.is_empty() {
                Err(Biff8Error::NoEnoughDataError(length))?
            }
            bytes.extend_from_slice(chunk);
        }
        Ok(bytes)
    }

    pub(crate) fn skip(&mut self, length: usize) -> Result<(), DrillLedgerError> {
        self.take_exact(length).map(|_| ())
    }

    pub(crate) fn read_u8(&mut self) -> Result<u8, DrillLedgerError> {
        Ok(self.take_exact(1)?[0])
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, DrillLedgerError> {
        Ok(self.take_exact(2)?.u16_at(0).ok_or(Biff8Error::NoEnoughDataError(2))?)
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, DrillLedgerError> {
        Ok(self.take_exact(4)?.u32_at(0).ok_or(Biff8Error::NoEnoughDataError(4))?)
    }

    pub(crate) fn read_usize(&mut self) -> Result<usize, DrillLedgerError> {
        self.read_u32().map(|value| value as usize)
    }

    pub(crate) fn read_u64(&mut self) -> Result<u64, DrillLedgerError> {
        Ok(self.take_exact(8)?.u64_at(0).ok_or(Biff8Error::NoEnoughDataError(8))?)
    }

    pub(crate) fn read_f64(&mut self) -> Result<f64, DrillLedgerError> {
        Ok(self.take_exact(8)?.f64_at(0).ok_or(Biff8Error::NoEnoughDataError(8))?)
    }

    /// Body size of the current record, CONTINUE segments excluded.
    pub(crate) fn record_size(&self) -> usize {
        self.segments.first().map(|(start, end)| end - start).unwrap_or(0)
    }

    /// Reads an RK value: a 30-bit integer or the high 30 bits of a double, optionally divided by 100.
    pub(crate) fn read_rk_number(&mut self) -> Result<f64, DrillLedgerError> {
        Ok(decode_rk(self.read_u32()?))
    }

    /// ShortXLUnicodeString: 1-byte character count
    pub(crate) fn read_short_xl_unicode_string(&mut self) -> Result<String, DrillLedgerError> {
        let chars = self.read_u8()? as usize;
        self.read_characters(chars, false)
    }

    /// XLUnicodeString: 2-byte character count
    pub(crate) fn read_xl_unicode_string(&mut self) -> Result<String, DrillLedgerError> {
        let chars = self.read_u16()? as usize;
        self.read_characters(chars, false)
    }

    /// XLUnicodeRichExtendedString as stored in the shared string table
    pub(crate) fn read_xl_unicode_rich_extended_string(&mut self) -> Result<String, DrillLedgerError> {
        let chars = self.read_u16()? as usize;
        self.read_characters(chars, true)
    }

    /// Reads `chars` characters. When the character data crosses a CONTINUE boundary the
    /// continuation restarts with a fresh option byte that may switch between compressed
    /// (Latin-1) and UTF-16 encoding.
    fn read_characters(&mut self, chars: usize, is_extended: bool) -> Result<String, DrillLedgerError> {
        let flags = self.read_u8()?;
        let runs = if is_extended && flags & 0x08 != 0 { self.read_u16()? as usize } else { 0 };
        let phonetic = if is_extended && flags & 0x04 != 0 { self.read_usize()? } else { 0 };

        let mut text = String::with_capacity(chars);
        let mut is_wide = flags & 0x01 != 0;
        let mut remaining = chars;
        while remaining > 0 {
            if self.at_segment_end() {
                is_wide = self.read_u8()? & 0x01 != 0;
            }
            let width = if is_wide { 2 } else { 1 };
            let chunk = self.take(remaining * width).to_vec();
            if chunk.is_empty() {
                Err(Biff8Error::NoEnoughDataError(remaining * width))?
            }
            if is_wide {
                let (decoded, _, _) = UTF_16LE.decode(&chunk);
                text.push_str(&decoded);
            } else {
                text.extend(chunk.iter().map(|byte| char::from(*byte)));
            }
            remaining = remaining.saturating_sub(chunk.len() / width);
        }

        // Formatting runs (4 bytes each) and phonetic data are not needed
        self.skip(4 * runs)?;
        self.skip(phonetic)?;
        Ok(text)
    }
}

/// Decodes an RkNumber.
pub(crate) fn decode_rk(value: u32) -> f64 {
    let is_divided = value & 0x01 != 0;
    let is_integer = value & 0x02 != 0;
    let number = if is_integer {
        ((value as i32) >> 2) as f64
    } else {
        f64::from_bits(((value & 0xFFFF_FFFC) as u64) << 32)
    };
    if is_divided {
        number / 100.0
    } else {
        number
    }
}

#[macro_export]
macro_rules! match_biff8_record {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(kind) = $reader.next()? {
            match kind {
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(kind: u16, body: &[u8]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&kind.to_le_bytes());
        bytes.extend_from_slice(&(body.len() as u16).to_le_bytes());
        bytes.extend_from_slice(body);
        bytes
    }

    #[test]
    fn decodes_rk_integers_and_doubles() {
        assert_eq!(decode_rk((42 << 2) | 0x02), 42.0);
        assert_eq!(decode_rk((8500 << 2) | 0x03), 85.0);
        let bits = (1.5f64.to_bits() >> 32) as u32;
        assert_eq!(decode_rk(bits), 1.5);
    }

    #[test]
    fn reads_records_in_sequence() {
        let mut stream = record(0x0809, &[0, 6]);
        stream.extend(record(0x0203, &[1, 0, 2, 0]));
        let mut reader = Biff8Reader::new(stream);
        assert_eq!(reader.next().unwrap(), Some(0x0809));
        assert_eq!(reader.next().unwrap(), Some(0x0203));
        assert_eq!(reader.record_size(), 4);
        assert_eq!(reader.read_u16().unwrap(), 1);
        assert_eq!(reader.read_u16().unwrap(), 2);
        assert!(reader.read_u8().is_err());
        assert_eq!(reader.next().unwrap(), None);
    }

    #[test]
    fn strings_continue_across_records() {
        // "ABCD" split over a CONTINUE; the continuation switches to UTF-16
        let mut stream = record(0x0204, &[4, 0, 0x00, b'A', b'B']);
        stream.extend(record(CONTINUE, &[0x01, b'C', 0, b'D', 0]));
        let mut reader = Biff8Reader::new(stream);
        reader.next().unwrap();
        assert_eq!(reader.read_xl_unicode_string().unwrap(), "ABCD");
    }

    #[test]
    fn goto_rejects_pointers_past_the_end() {
        let mut reader = Biff8Reader::new(record(0x000A, &[]));
        assert!(reader.goto(100).is_err());
        assert!(reader.goto(0).is_ok());
        assert_eq!(reader.next().unwrap(), Some(0x000A));
    }
}
