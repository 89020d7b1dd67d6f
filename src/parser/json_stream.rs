//! Incremental scanner over a single top-level JSON array.
//!
//! Both export formats are one giant `[ ... ]` at the root. Parsing the
//! whole thing with `serde_json::from_reader` would require materializing
//! every conversation simultaneously; this scanner instead walks the byte
//! stream once, tracking bracket/brace depth and string-escape state, and
//! hands back the raw bytes of exactly one array element at a time. The
//! caller deserializes that slice on its own (`serde_json::from_slice`).

use std::io::{self, Read};
use std::iter::Peekable;

use crate::error::Error;

enum ReaderState {
    Start,
    Ready,
    Done,
}

pub(crate) struct JsonArrayReader<R: Read> {
    bytes: Peekable<io::Bytes<R>>,
    state: ReaderState,
}

impl<R: Read> JsonArrayReader<R> {
    pub fn new(reader: R) -> Self {
        Self {
            bytes: reader.bytes().peekable(),
            state: ReaderState::Start,
        }
    }

    fn next_byte(&mut self) -> io::Result<Option<u8>> {
        self.bytes.next().transpose()
    }

    fn peek_byte(&mut self) -> io::Result<Option<u8>> {
        match self.bytes.peek() {
            Some(Ok(b)) => Ok(Some(*b)),
            Some(Err(_)) => Err(self.bytes.next().unwrap().unwrap_err()),
            None => Ok(None),
        }
    }

    fn skip_ws(&mut self) -> io::Result<Option<u8>> {
        loop {
            match self.next_byte()? {
                Some(b) if b.is_ascii_whitespace() => continue,
                other => return Ok(other),
            }
        }
    }

    fn fail(reason: impl Into<String>) -> Error {
        Error::ParseError {
            path: std::path::PathBuf::new(),
            reason: reason.into(),
        }
    }

    /// Returns the raw bytes of the next top-level array element, or `None`
    /// once the closing `]` has been consumed.
    pub fn next_element(&mut self) -> Result<Option<Vec<u8>>, Error> {
        if matches!(self.state, ReaderState::Done) {
            return Ok(None);
        }

        if matches!(self.state, ReaderState::Start) {
            match self.skip_ws()? {
                Some(b'[') => {}
                Some(other) => {
                    return Err(Self::fail(format!(
                        "expected top-level JSON array, found '{}'",
                        other as char
                    )))
                }
                None => return Err(Self::fail("empty file")),
            }
            self.state = ReaderState::Ready;
        } else {
            match self.skip_ws()? {
                Some(b',') => {}
                Some(b']') => {
                    self.state = ReaderState::Done;
                    return Ok(None);
                }
                Some(other) => {
                    return Err(Self::fail(format!(
                        "expected ',' or ']', found '{}'",
                        other as char
                    )))
                }
                None => return Err(Self::fail("unexpected end of file inside array")),
            }
        }

        match self.skip_ws()? {
            Some(b']') => {
                // empty array, or a trailing comma before the close
                self.state = ReaderState::Done;
                Ok(None)
            }
            Some(first) => {
                let mut buf = Vec::new();
                self.read_value(first, &mut buf)?;
                Ok(Some(buf))
            }
            None => Err(Self::fail("unexpected end of file inside array")),
        }
    }

    fn read_value(&mut self, first: u8, buf: &mut Vec<u8>) -> Result<(), Error> {
        buf.push(first);
        match first {
            b'{' | b'[' => self.read_bracketed(buf),
            b'"' => self.read_string_body(buf),
            b't' => self.read_literal_tail(b"rue", buf),
            b'f' => self.read_literal_tail(b"alse", buf),
            b'n' => self.read_literal_tail(b"ull", buf),
            b'-' | b'0'..=b'9' => self.read_number_tail(buf),
            other => Err(Self::fail(format!(
                "unexpected byte '{}' at start of value",
                other as char
            ))),
        }
    }

    fn read_bracketed(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        let mut depth = 1i32;
        loop {
            let b = self
                .next_byte()?
                .ok_or_else(|| Self::fail("unexpected end of file"))?;
            buf.push(b);
            match b {
                b'"' => self.read_string_body(buf)?,
                b'{' | b'[' => depth += 1,
                b'}' | b']' => {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(());
                    }
                }
                _ => {}
            }
        }
    }

    fn read_string_body(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        loop {
            let b = self
                .next_byte()?
                .ok_or_else(|| Self::fail("unexpected end of file in string"))?;
            buf.push(b);
            match b {
                b'\\' => {
                    let esc = self
                        .next_byte()?
                        .ok_or_else(|| Self::fail("unexpected end of file in string escape"))?;
                    buf.push(esc);
                }
                b'"' => return Ok(()),
                _ => {}
            }
        }
    }

    fn read_literal_tail(&mut self, rest: &[u8], buf: &mut Vec<u8>) -> Result<(), Error> {
        for &expected in rest {
            let b = self
                .next_byte()?
                .ok_or_else(|| Self::fail("unexpected end of file in literal"))?;
            if b != expected {
                return Err(Self::fail("malformed literal"));
            }
            buf.push(b);
        }
        Ok(())
    }

    fn read_number_tail(&mut self, buf: &mut Vec<u8>) -> Result<(), Error> {
        loop {
            match self.peek_byte()? {
                Some(b @ (b'0'..=b'9' | b'.' | b'e' | b'E' | b'+' | b'-')) => {
                    buf.push(b);
                    self.next_byte()?;
                }
                _ => return Ok(()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn elements(json: &str) -> Vec<String> {
        let mut reader = JsonArrayReader::new(json.as_bytes());
        let mut out = Vec::new();
        while let Some(bytes) = reader.next_element().unwrap() {
            out.push(String::from_utf8(bytes).unwrap());
        }
        out
    }

    #[test]
    fn empty_array_yields_nothing() {
        assert!(elements("[]").is_empty());
        assert!(elements("  [  ]  ").is_empty());
    }

    #[test]
    fn single_object_element() {
        let got = elements(r#"[{"a":1}]"#);
        assert_eq!(got, vec![r#"{"a":1}"#]);
    }

    #[test]
    fn multiple_elements_preserve_order() {
        let got = elements(r#"[1, "two", {"three":3}, [4,5]]"#);
        assert_eq!(got, vec!["1", "\"two\"", r#"{"three":3}"#, "[4,5]"]);
    }

    #[test]
    fn nested_brackets_and_strings_do_not_confuse_depth() {
        let got = elements(r#"[{"a": "]}", "b": [1,2,{"c":3}]}]"#);
        assert_eq!(got.len(), 1);
        assert_eq!(got[0], r#"{"a": "]}", "b": [1,2,{"c":3}]}"#);
    }

    #[test]
    fn escaped_quotes_inside_strings_are_not_boundaries() {
        let got = elements(r#"["a \"quoted\" word"]"#);
        assert_eq!(got, vec![r#""a \"quoted\" word""#]);
    }

    #[test]
    fn not_an_array_is_a_parse_error() {
        let mut reader = JsonArrayReader::new(r#"{"a":1}"#.as_bytes());
        assert!(reader.next_element().is_err());
    }

    #[test]
    fn truncated_file_is_a_parse_error() {
        let mut reader = JsonArrayReader::new(r#"[{"a":1"#.as_bytes());
        assert!(reader.next_element().is_err());
    }
}
