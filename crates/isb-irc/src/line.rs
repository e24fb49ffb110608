//! Line I/O adapters
//!
//! Two loops per client socket, one per direction. Neither knows anything
//! about the protocol: the reader hands each received line to `on_line`, the
//! writer drains a mailbox of already-rendered lines onto the socket. Both
//! report how they ended through `on_terminate` (`None` on a clean end).

use isb_core::Mailbox;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Read lines until EOF or an I/O error.
///
/// Bytes that are not UTF-8 are replaced, never fatal. The line ending
/// (`\n` or `\r\n`) is stripped.
pub async fn read_lines<R, L, T>(mut reader: R, mut on_line: L, on_terminate: T)
where
    R: AsyncBufRead + Unpin,
    L: FnMut(String),
    T: FnOnce(Option<std::io::Error>),
{
    let mut buf = Vec::new();
    let err = loop {
        buf.clear();
        match reader.read_until(b'\n', &mut buf).await {
            Ok(0) => break None,
            Ok(_) => {
                if buf.last() == Some(&b'\n') {
                    buf.pop();
                    if buf.last() == Some(&b'\r') {
                        buf.pop();
                    }
                }
                on_line(String::from_utf8_lossy(&buf).into_owned());
            }
            Err(e) => break Some(e),
        }
    };
    on_terminate(err);
}

/// Write every line taken from `lines`, CRLF-terminated, until the mailbox
/// closes or the socket fails.
pub async fn write_lines<W, T>(mut writer: W, mut lines: Mailbox<String>, on_terminate: T)
where
    W: AsyncWrite + Unpin,
    T: FnOnce(Option<std::io::Error>),
{
    let mut err = None;
    while let Some(line) = lines.take().await {
        if let Err(e) = write_line(&mut writer, &line).await {
            err = Some(e);
            break;
        }
        debug!("Wrote: {}", line);
    }
    if err.is_none() {
        let _ = writer.shutdown().await;
    }
    on_terminate(err);
}

async fn write_line<W: AsyncWrite + Unpin>(writer: &mut W, line: &str) -> std::io::Result<()> {
    writer.write_all(line.as_bytes()).await?;
    writer.write_all(b"\r\n").await?;
    writer.flush().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use isb_core::mailbox;
    use tokio::io::{AsyncReadExt, BufReader};

    #[tokio::test]
    async fn test_read_lines_until_eof() {
        let input: &[u8] = b"NICK alice\r\nPING\nPRIVMSG root :hi\r\n";
        let mut seen = Vec::new();
        let mut ended = None;

        read_lines(BufReader::new(input), |line| seen.push(line), |err| ended = Some(err.is_none())).await;

        assert_eq!(seen, vec!["NICK alice", "PING", "PRIVMSG root :hi"]);
        assert_eq!(ended, Some(true));
    }

    #[tokio::test]
    async fn test_read_lines_survives_latin1() {
        let input: &[u8] = b"PRIVMSG root :caf\xe9\r\nPING\r\nQUIT";
        let mut seen = Vec::new();
        let mut ended = None;

        read_lines(BufReader::new(input), |line| seen.push(line), |err| ended = Some(err.is_none())).await;

        assert_eq!(seen, vec!["PRIVMSG root :caf\u{fffd}", "PING", "QUIT"]);
        assert_eq!(ended, Some(true));
    }

    #[tokio::test]
    async fn test_write_lines_until_closed() {
        let (client, mut server) = tokio::io::duplex(1024);
        let (tx, rx) = mailbox::channel();

        tx.put("PING".to_string());
        tx.put(":root PRIVMSG alice :hi".to_string());
        tx.close();

        let mut clean = false;
        write_lines(client, rx, |err| clean = err.is_none()).await;
        assert!(clean);

        let mut written = String::new();
        server.read_to_string(&mut written).await.unwrap();
        assert_eq!(written, "PING\r\n:root PRIVMSG alice :hi\r\n");
    }

    #[tokio::test]
    async fn test_write_lines_reports_broken_socket() {
        let (client, server) = tokio::io::duplex(64);
        drop(server);
        let (tx, rx) = mailbox::channel();
        tx.put("PING".to_string());

        let mut failed = false;
        write_lines(client, rx, |err| failed = err.is_some()).await;
        assert!(failed);
    }
}
