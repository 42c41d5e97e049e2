use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::protocol::{LINE_TERMINATOR, encode_limits_query};
use crate::Result;

/// Longest inbound line kept, terminator included. Longer lines are skipped.
const MAX_LINE_LEN: u64 = 4096;

/// Write side of an open gateway session.
///
/// Closing cancels the token shared with the matching [`LineReader`], which
/// makes the receive task drop the read half and release the socket.
pub(crate) struct Connection {
    writer: Option<OwnedWriteHalf>,
    cancel: CancellationToken,
}

/// Read side of an open gateway session, owned by the receive task.
pub(crate) struct LineReader {
    reader: BufReader<OwnedReadHalf>,
    cancel: CancellationToken,
}

/// Open a TCP session and send the limits query before handing it over, so the
/// limits cache starts repopulating as soon as the link is usable.
pub(crate) async fn open(
    host: &str,
    port: u16,
    connect_timeout: Duration,
) -> Result<(Connection, LineReader)> {
    debug!(host, port, "connecting to IntesisBox");
    let stream = tokio::time::timeout(connect_timeout, TcpStream::connect((host, port))).await??;
    stream.set_nodelay(true)?;

    let (read_half, write_half) = stream.into_split();
    let cancel = CancellationToken::new();
    let mut connection = Connection {
        writer: Some(write_half),
        cancel: cancel.clone(),
    };
    connection.send_line(&encode_limits_query()).await?;

    let reader = LineReader {
        reader: BufReader::new(read_half),
        cancel,
    };
    Ok((connection, reader))
}

impl Connection {
    pub async fn send_line(&mut self, text: &str) -> Result<()> {
        let writer = self.writer.as_mut().ok_or(crate::Error::NotConnected)?;
        trace!(line = %text, "tx");
        writer.write_all(text.as_bytes()).await?;
        writer.write_all(LINE_TERMINATOR.as_bytes()).await?;
        writer.flush().await?;
        Ok(())
    }

    /// Idempotent.
    pub fn close(&mut self) {
        self.cancel.cancel();
        if self.writer.take().is_some() {
            debug!("connection closed");
        }
    }
}

impl Drop for Connection {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

impl LineReader {
    /// `Ok(None)` on EOF. The CR/LF terminator is stripped; invalid UTF-8 is
    /// replaced so that it fails decoding instead of the transport. Lines over
    /// [`MAX_LINE_LEN`] bytes are discarded up to their terminator.
    pub async fn read_line(&mut self) -> Result<Option<String>> {
        let mut buf = Vec::new();
        loop {
            buf.clear();
            let n = (&mut self.reader)
                .take(MAX_LINE_LEN)
                .read_until(b'\n', &mut buf)
                .await?;
            if n == 0 {
                return Ok(None);
            }
            if buf.ends_with(b"\n") || (n as u64) < MAX_LINE_LEN {
                break;
            }
            warn!(limit = MAX_LINE_LEN, "discarding oversized line");
            if !self.skip_line().await? {
                return Ok(None);
            }
        }
        let line = String::from_utf8_lossy(&buf);
        Ok(Some(line.trim_end_matches(['\r', '\n']).to_string()))
    }

    /// Drop input up to and including the next newline. `false` on EOF.
    async fn skip_line(&mut self) -> Result<bool> {
        loop {
            let chunk = self.reader.fill_buf().await?;
            if chunk.is_empty() {
                return Ok(false);
            }
            match chunk.iter().position(|&b| b == b'\n') {
                Some(i) => {
                    self.reader.consume(i + 1);
                    return Ok(true);
                }
                None => {
                    let len = chunk.len();
                    self.reader.consume(len);
                }
            }
        }
    }

    pub fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn session() -> (Connection, LineReader, TcpStream) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        let (opened, accepted) = tokio::join!(
            open("127.0.0.1", port, Duration::from_secs(2)),
            listener.accept()
        );
        let (connection, reader) = opened.unwrap();
        (connection, reader, accepted.unwrap().0)
    }

    #[tokio::test]
    async fn reads_crlf_lines() {
        let (_connection, mut reader, mut peer) = session().await;
        peer.write_all(b"ACK\r\nCHN,1:ONOFF,ON\r\n").await.unwrap();

        assert_eq!(reader.read_line().await.unwrap().as_deref(), Some("ACK"));
        assert_eq!(
            reader.read_line().await.unwrap().as_deref(),
            Some("CHN,1:ONOFF,ON")
        );
        drop(peer);
        assert_eq!(reader.read_line().await.unwrap(), None);
    }

    #[tokio::test]
    async fn oversized_line_is_skipped() {
        let (_connection, mut reader, mut peer) = session().await;
        let long = "A".repeat(3 * MAX_LINE_LEN as usize);
        peer.write_all(long.as_bytes()).await.unwrap();
        peer.write_all(b"\r\nCHN,1:MODE,HEAT\r\n").await.unwrap();

        assert_eq!(
            reader.read_line().await.unwrap().as_deref(),
            Some("CHN,1:MODE,HEAT")
        );
    }

    #[tokio::test]
    async fn open_sends_limits_query_and_close_is_idempotent() {
        let (mut connection, _reader, peer) = session().await;
        let mut peer = BufReader::new(peer);
        let mut line = String::new();
        peer.read_line(&mut line).await.unwrap();
        assert_eq!(line, "LIMITS:*\r\n");

        connection.close();
        connection.close();
        assert!(matches!(
            connection.send_line("GET,1:ONOFF").await,
            Err(crate::Error::NotConnected)
        ));
        assert!(connection.cancel.is_cancelled());
    }
}
