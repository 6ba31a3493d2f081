//! Line splitting for the console
//!
//! stdin is registered edge-triggered, so each readiness event must drain
//! it until `WouldBlock`. Bytes are kept until a newline arrives and each
//! line is decoded whole, so a multibyte character split across two reads
//! survives intact.

use std::io::{self, Read};

/// Lines read in one drain of the console
#[derive(Debug, Default, PartialEq, Eq)]
pub struct ConsoleInput {
    pub lines: Vec<String>,
    /// End of input was reached
    pub closed: bool,
}

#[derive(Debug, Default)]
pub struct LineReader {
    pending: Vec<u8>,
}

impl LineReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Read until `src` would block or ends, returning every complete line
    ///
    /// On end of input a trailing line without a newline is returned too.
    pub fn drain<R: Read>(&mut self, src: &mut R) -> io::Result<ConsoleInput> {
        let mut buf = [0u8; 1024];
        let mut input = ConsoleInput::default();

        loop {
            match src.read(&mut buf) {
                Ok(0) => {
                    input.closed = true;
                    break;
                }
                Ok(n) => self.pending.extend_from_slice(&buf[..n]),
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => return Err(e),
            }
        }

        while let Some(pos) = self.pending.iter().position(|&b| b == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=pos).collect();
            input.lines.push(decode(&line));
        }
        if input.closed && !self.pending.is_empty() {
            let rest = std::mem::take(&mut self.pending);
            input.lines.push(decode(&rest));
        }
        Ok(input)
    }

    /// Bytes held back waiting for a newline
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

fn decode(line: &[u8]) -> String {
    String::from_utf8_lossy(line).trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;

    /// Hands out scripted chunks, then blocks or ends
    struct Chunks {
        chunks: VecDeque<Vec<u8>>,
        eof: bool,
    }

    impl Chunks {
        fn new(chunks: &[&[u8]], eof: bool) -> Self {
            Self {
                chunks: chunks.iter().map(|c| c.to_vec()).collect(),
                eof,
            }
        }
    }

    impl Read for Chunks {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            match self.chunks.pop_front() {
                Some(chunk) => {
                    buf[..chunk.len()].copy_from_slice(&chunk);
                    Ok(chunk.len())
                }
                None if self.eof => Ok(0),
                None => Err(io::ErrorKind::WouldBlock.into()),
            }
        }
    }

    #[test]
    fn test_reads_every_chunk_before_blocking() {
        let mut reader = LineReader::new();
        let mut src = Chunks::new(&[b"rate 1", b".5\nskip\n", b"status\n"], false);

        let input = reader.drain(&mut src).unwrap();
        assert_eq!(input.lines, vec!["rate 1.5", "skip", "status"]);
        assert!(!input.closed);
    }

    #[test]
    fn test_multibyte_char_split_across_reads() {
        let mut reader = LineReader::new();
        // "é" is 0xC3 0xA9
        let mut src = Chunks::new(&[b"filter add caf\xC3"], false);
        let input = reader.drain(&mut src).unwrap();
        assert!(input.lines.is_empty());
        assert_eq!(reader.pending(), 15);

        let mut src = Chunks::new(&[b"\xA9\n"], false);
        let input = reader.drain(&mut src).unwrap();
        assert_eq!(input.lines, vec!["filter add café"]);
        assert_eq!(reader.pending(), 0);
    }

    #[test]
    fn test_end_of_input_flushes_partial_line() {
        let mut reader = LineReader::new();
        let mut src = Chunks::new(&[b"help\r\nquit"], true);

        let input = reader.drain(&mut src).unwrap();
        assert_eq!(input.lines, vec!["help", "quit"]);
        assert!(input.closed);
    }

    #[test]
    fn test_invalid_bytes_are_replaced() {
        let mut reader = LineReader::new();
        let mut src = Chunks::new(&[b"voice \xff\n"], false);
        let input = reader.drain(&mut src).unwrap();
        assert_eq!(input.lines, vec!["voice \u{FFFD}"]);
    }
}
