//! XML utilities for SpreadsheetML parts.
//! Wraps the quick-xml reader with a reusable buffer and adds helpers for attributes,
//! character references and for emitting elements through the quick-xml writer.

use crate::error::DrillLedgerError;
use quick_xml::escape::resolve_xml_entity;
use quick_xml::events::BytesEnd;
use quick_xml::events::BytesRef;
use quick_xml::events::BytesStart;
use quick_xml::events::BytesText;
use quick_xml::events::Event;
use quick_xml::Reader;
use quick_xml::Writer;
use std::borrow::Cow;
use std::io::BufRead;
use std::io::Write;
use thiserror::Error;

/// Errors specific to XML parsing operations
#[derive(Error, Debug)]
pub enum XmlError {
    #[error("Parse entity '{0}' failed")]
    ParseEntityError(String),
}

/// XML reader wrapper configured for SpreadsheetML parts
pub(crate) struct XmlReader<R: BufRead> {
    reader: Reader<R>,
    buffer: Vec<u8>,
}

impl<R: BufRead> XmlReader<R> {
    /// Creates a reader that reports `<a/>` as a start/end pair and keeps whitespace text intact.
    pub(crate) fn new(buf_reader: R) -> XmlReader<R> {
        let mut reader = Reader::from_reader(buf_reader);
        let config = reader.config_mut();
        config.check_comments = false;
        config.check_end_names = false;
        config.expand_empty_elements = true;
        config.trim_text(false);

        XmlReader {
            reader,
            buffer: Vec::with_capacity(1024),
        }
    }

    /// Reads the next XML event, or None at the end of the document
    pub(crate) fn next(&'_ mut self) -> Result<Option<Event<'_>>, DrillLedgerError> {
        self.buffer.clear();
        match self.reader.read_event_into(&mut self.buffer)? {
            Event::Eof => Ok(None),
            event => Ok(Some(event)),
        }
    }
}

/// Helper trait for start tags providing attribute access
pub(crate) trait XmlNodeHelper<'a> {
    /// Gets the unescaped value of an attribute by name
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, DrillLedgerError>;
}

impl<'a> XmlNodeHelper<'a> for BytesStart<'a> {
    fn get_attribute_value(&'a self, name: &str) -> Result<Option<Cow<'a, str>>, DrillLedgerError> {
        match self.try_get_attribute(name)? {
            Some(attribute) => Ok(Some(attribute.unescape_value()?)),
            None => Ok(None),
        }
    }
}

/// Helper trait for building text content from XML events
pub(crate) trait XmlTextContextHelper {
    /// Appends the character or entity denoted by a general reference event
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), DrillLedgerError>;
}

impl XmlTextContextHelper for String {
    fn push_bytes_ref(&mut self, bytes: &BytesRef) -> Result<(), DrillLedgerError> {
        let raw = bytes.xml_content()?;
        if let Some(number) = raw.strip_prefix('#') {
            let code = match number.strip_prefix('x') {
                Some(hex) => u32::from_str_radix(hex, 16)?,
                None => number.parse::<u32>()?,
            };
            if let Some(character) = char::from_u32(code) {
                self.push(character);
            }
        } else if let Some(entity) = resolve_xml_entity(&raw) {
            self.push_str(entity);
        } else {
            Err(XmlError::ParseEntityError(raw.to_string()))?;
        }
        Ok(())
    }
}

/// Convenience methods for emitting SpreadsheetML through a quick-xml writer
pub(crate) trait XmlWriterHelper {
    /// Writes `<name attr="..">`
    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), DrillLedgerError>;

    /// Writes `</name>`
    fn close(&mut self, name: &str) -> Result<(), DrillLedgerError>;

    /// Writes `<name attr=".."/>`
    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), DrillLedgerError>;

    /// Writes `<name>escaped text</name>`
    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<(), DrillLedgerError>;
}

impl<W: Write> XmlWriterHelper for Writer<W> {
    fn open(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), DrillLedgerError> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write_event(Event::Start(start))?;
        Ok(())
    }

    fn close(&mut self, name: &str) -> Result<(), DrillLedgerError> {
        self.write_event(Event::End(BytesEnd::new(name)))?;
        Ok(())
    }

    fn empty(&mut self, name: &str, attributes: &[(&str, &str)]) -> Result<(), DrillLedgerError> {
        let start = BytesStart::new(name).with_attributes(attributes.iter().copied());
        self.write_event(Event::Empty(start))?;
        Ok(())
    }

    fn text_element(&mut self, name: &str, attributes: &[(&str, &str)], text: &str) -> Result<(), DrillLedgerError> {
        self.open(name, attributes)?;
        self.write_event(Event::Text(BytesText::new(text)))?;
        self.close(name)
    }
}

#[macro_export]
macro_rules! match_xml_events {
    ($reader:expr => { $($arms:tt)* }) => {
        while let Some(result) = $reader.next()? {
            match result {
                Event::Eof => break,
                $($arms)*
                _ => (),
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::match_xml_events;
    use quick_xml::name::QName;

    #[test]
    fn reads_attributes_and_references() -> Result<(), DrillLedgerError> {
        let xml = r#"<root><c r="B3" t="s"><v>1&amp;2&#65;</v></c></root>"#;
        let mut reader = XmlReader::new(xml.as_bytes());
        let mut reference = None;
        let mut text = String::new();
        let mut in_value = false;
        match_xml_events!(reader => {
            Event::Start(event) if event.name() == QName(b"c") => {
                reference = event.get_attribute_value("r").unwrap().map(|r| r.to_string());
            }
            Event::Start(event) if event.name() == QName(b"v") => in_value = true,
            Event::End(event) if event.name() == QName(b"v") => in_value = false,
            Event::Text(event) if in_value => text.push_str(&event.xml_content().unwrap()),
            Event::GeneralRef(event) if in_value => text.push_bytes_ref(&event).unwrap(),
        });
        assert_eq!(reference.as_deref(), Some("B3"));
        assert_eq!(text, "1&2A");
        Ok(())
    }

    #[test]
    fn expands_empty_elements() {
        let mut reader = XmlReader::new("<a/>".as_bytes());
        assert!(matches!(reader.next().unwrap(), Some(Event::Start(_))));
        assert!(matches!(reader.next().unwrap(), Some(Event::End(_))));
        assert!(reader.next().unwrap().is_none());
    }

    #[test]
    fn writes_escaped_elements() {
        let mut writer = Writer::new(Vec::new());
        writer.open("row", &[("r", "2")]).unwrap();
        writer.text_element("t", &[], "a<b").unwrap();
        writer.empty("c", &[("r", "A2")]).unwrap();
        writer.close("row").unwrap();
        let xml = String::from_utf8(writer.into_inner()).unwrap();
        assert_eq!(xml, r#"<row r="2"><t>a&lt;b</t><c r="A2"/></row>"#);
    }
}
