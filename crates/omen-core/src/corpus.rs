//! Streaming reader for newline-delimited password lists.

use std::io::{self, BufRead};

use crate::encoding::Encoding;

/// Yields one decoded password per line without loading the corpus.
///
/// Lines that do not decode in the declared encoding are skipped and
/// counted; they are never fatal. Trailing `\r\n` / `\n` are stripped, as is
/// a UTF-8 byte-order mark on the first line.
pub struct CorpusReader<R> {
    reader: R,
    encoding: Encoding,
    buf: Vec<u8>,
    lines: u64,
    encoding_errors: u64,
}

impl<R: BufRead> CorpusReader<R> {
    pub fn new(reader: R, encoding: Encoding) -> Self {
        Self {
            reader,
            encoding,
            buf: Vec::with_capacity(256),
            lines: 0,
            encoding_errors: 0,
        }
    }

    pub fn lines_read(&self) -> u64 {
        self.lines
    }

    pub fn encoding_errors(&self) -> u64 {
        self.encoding_errors
    }

    pub fn next_password(&mut self) -> io::Result<Option<String>> {
        loop {
            self.buf.clear();
            if self.reader.read_until(b'\n', &mut self.buf)? == 0 {
                return Ok(None);
            }
            self.lines += 1;

            let mut line: &[u8] = &self.buf;
            if let Some(rest) = line.strip_suffix(b"\n") {
                line = rest;
            }
            if let Some(rest) = line.strip_suffix(b"\r") {
                line = rest;
            }
            if self.lines == 1
                && self.encoding == Encoding::Utf8
                && let Some(rest) = line.strip_prefix(b"\xef\xbb\xbf")
            {
                line = rest;
            }

            match self.encoding.decode(line) {
                Some(password) => return Ok(Some(password)),
                None => self.encoding_errors += 1,
            }
        }
    }
}

impl<R: BufRead> Iterator for CorpusReader<R> {
    type Item = io::Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_password().transpose()
    }
}
