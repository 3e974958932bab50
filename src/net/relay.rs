//! Verbatim byte forwarding.
//!
//! # Responsibilities
//! - Write a whole buffer to a destination, resuming after partial writes
//! - Retry transient conditions (interrupted, would-block) in place
//!
//! # Design Decisions
//! - Stateless: no buffering beyond the caller's slice
//! - Generic over `AsyncWrite` so any socket half or test sink can be used

use std::io;

use tokio::io::{AsyncWrite, AsyncWriteExt};

/// Send all of `buf` to `dest`.
///
/// A write reporting zero bytes fails with `WriteZero`; interrupted and
/// would-block errors are retried without losing progress.
pub async fn forward<W>(dest: &mut W, buf: &[u8]) -> io::Result<()>
where
    W: AsyncWrite + Unpin + ?Sized,
{
    let mut sent = 0;
    while sent < buf.len() {
        match dest.write(&buf[sent..]).await {
            Ok(0) => {
                return Err(io::Error::new(
                    io::ErrorKind::WriteZero,
                    "destination accepted zero bytes",
                ));
            }
            Ok(n) => sent += n,
            Err(e) if is_transient(&e) => {
                tokio::task::yield_now().await;
            }
            Err(e) => return Err(e),
        }
    }
    dest.flush().await
}

fn is_transient(e: &io::Error) -> bool {
    matches!(e.kind(), io::ErrorKind::Interrupted | io::ErrorKind::WouldBlock)
}
