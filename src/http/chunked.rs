//! Incremental decoder for chunked transfer coding.
//!
//! The decoder does not de-frame: it reports how many input bytes belong to
//! the body (size lines, data, CRLFs and trailer) so the caller can keep the
//! framed bytes. State survives across calls, so a chunk may arrive split
//! over any number of reads.

use super::parser::ParseError;

/// Longest chunk-size or trailer line accepted.
const MAX_LINE_LEN: usize = 4096;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    /// Reading a chunk-size line.
    Size,
    /// Inside chunk data.
    Data { remaining: u64 },
    /// Expecting the CR after chunk data.
    DataCr,
    /// Expecting the LF after chunk data.
    DataLf,
    /// After the last chunk, reading trailer lines until an empty one.
    Trailer,
    Done,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkedDecoder {
    phase: Phase,
    /// Partial line carried over from the previous call.
    line: Vec<u8>,
}

impl Default for ChunkedDecoder {
    fn default() -> Self {
        Self::new()
    }
}

impl ChunkedDecoder {
    pub fn new() -> Self {
        Self {
            phase: Phase::Size,
            line: Vec::new(),
        }
    }

    /// The terminating chunk and trailer have been seen.
    pub fn is_done(&self) -> bool {
        self.phase == Phase::Done
    }

    /// Bytes still expected for the current chunk's data, if inside one.
    #[cfg(test)]
    fn chunk_remaining(&self) -> Option<u64> {
        match self.phase {
            Phase::Data { remaining } => Some(remaining),
            _ => None,
        }
    }

    /// Advance over `input`, returning how many bytes belong to the body.
    /// Stops early once the body is complete.
    pub fn decode(&mut self, input: &[u8]) -> Result<usize, ParseError> {
        let mut pos = 0;

        while pos < input.len() && self.phase != Phase::Done {
            match self.phase {
                Phase::Size => {
                    let Some(line) = self.read_line(input, &mut pos)? else {
                        break;
                    };
                    let size = parse_chunk_size(&line)?;
                    self.phase = if size == 0 {
                        Phase::Trailer
                    } else {
                        Phase::Data { remaining: size }
                    };
                }
                Phase::Data { remaining } => {
                    let available = (input.len() - pos) as u64;
                    let take = remaining.min(available);
                    pos += take as usize;
                    self.phase = if take == remaining {
                        Phase::DataCr
                    } else {
                        Phase::Data {
                            remaining: remaining - take,
                        }
                    };
                }
                Phase::DataCr => {
                    if input[pos] != b'\r' {
                        return Err(ParseError::Malformed("missing CRLF after chunk data"));
                    }
                    pos += 1;
                    self.phase = Phase::DataLf;
                }
                Phase::DataLf => {
                    if input[pos] != b'\n' {
                        return Err(ParseError::Malformed("missing CRLF after chunk data"));
                    }
                    pos += 1;
                    self.phase = Phase::Size;
                }
                Phase::Trailer => {
                    let Some(line) = self.read_line(input, &mut pos)? else {
                        break;
                    };
                    if line.is_empty() {
                        self.phase = Phase::Done;
                    }
                }
                Phase::Done => break,
            }
        }

        Ok(pos)
    }

    /// Complete a CRLF-terminated line, combining carried-over bytes with
    /// `input`. Returns `None` (and carries the fragment) if the line is not
    /// finished yet.
    fn read_line(&mut self, input: &[u8], pos: &mut usize) -> Result<Option<Vec<u8>>, ParseError> {
        let rest = &input[*pos..];
        match memchr::memchr(b'\n', rest) {
            Some(idx) => {
                self.line.extend_from_slice(&rest[..idx]);
                *pos += idx + 1;
                let mut line = std::mem::take(&mut self.line);
                if line.pop() != Some(b'\r') {
                    return Err(ParseError::Malformed("chunk line not terminated by CRLF"));
                }
                Ok(Some(line))
            }
            None => {
                self.line.extend_from_slice(rest);
                *pos = input.len();
                if self.line.len() > MAX_LINE_LEN {
                    return Err(ParseError::Malformed("chunk line too long"));
                }
                Ok(None)
            }
        }
    }
}

/// Parse the hexadecimal size token of a chunk-size line, ignoring any
/// chunk extensions.
pub fn parse_chunk_size(line: &[u8]) -> Result<u64, ParseError> {
    let token = line.split(|b| *b == b';').next().unwrap_or_default();
    let token = std::str::from_utf8(token)
        .map_err(|_| ParseError::Malformed("chunk size is not ASCII"))?
        .trim();
    if token.is_empty() {
        return Err(ParseError::Malformed("empty chunk size"));
    }
    u64::from_str_radix(token, 16).map_err(|_| ParseError::Malformed("invalid chunk size"))
}
