//! Body framing state carried between parse calls.

use super::chunked::ChunkedDecoder;
use super::parser::ParseError;

/// How much of the current message body is still outstanding.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum BodyState {
    /// No body, or the body has been fully seen.
    #[default]
    Complete,
    /// Content-Length framing with `remaining` bytes still expected.
    Fixed { remaining: u64 },
    /// Chunked framing in progress.
    Chunked(ChunkedDecoder),
}

impl BodyState {
    pub fn is_complete(&self) -> bool {
        matches!(self, BodyState::Complete)
    }

    pub fn is_chunked(&self) -> bool {
        matches!(self, BodyState::Chunked(_))
    }

    /// Consume the body bytes found at the start of `input` into `body`.
    ///
    /// `body` is replaced, not appended to: it holds only the bytes delivered
    /// by this call. Bytes past the end of the body are ignored.
    pub fn advance(&mut self, input: &[u8], body: &mut Vec<u8>) -> Result<(), ParseError> {
        body.clear();

        let take = match self {
            BodyState::Complete => 0,
            BodyState::Fixed { remaining } => {
                let take = (*remaining).min(input.len() as u64) as usize;
                *remaining -= take as u64;
                take
            }
            BodyState::Chunked(decoder) => decoder.decode(input)?,
        };

        body.try_reserve_exact(take)
            .map_err(|_| ParseError::OutOfMemory)?;
        body.extend_from_slice(&input[..take]);

        let finished = match self {
            BodyState::Complete => true,
            BodyState::Fixed { remaining } => *remaining == 0,
            BodyState::Chunked(decoder) => decoder.is_done(),
        };
        if finished {
            *self = BodyState::Complete;
        }
        Ok(())
    }
}
