//! Line-delimited transport for the MCP server.
//!
//! - Messages are UTF-8 encoded JSON-RPC, one per line
//! - Messages must not contain embedded newlines
//! - stdin receives messages from the client, stdout carries replies
//! - stderr is left to logging

use std::io;

use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};

/// A newline-delimited JSON transport over any async reader and writer.
pub struct Transport<R, W> {
    reader: R,
    writer: W,
}

/// The transport used in production.
pub type StdioTransport = Transport<BufReader<tokio::io::Stdin>, tokio::io::Stdout>;

impl StdioTransport {
    /// Creates a transport over the process's stdin and stdout.
    #[must_use]
    pub fn stdio() -> Self {
        Self::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
    }
}

impl<R, W> Transport<R, W>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    /// Creates a transport over the given streams.
    pub const fn new(reader: R, writer: W) -> Self {
        Self { reader, writer }
    }

    /// Reads the next message line, without its line terminator.
    ///
    /// Returns `None` once the input is closed.
    ///
    /// # Errors
    ///
    /// Returns an error if reading fails.
    pub async fn read_line(&mut self) -> io::Result<Option<String>> {
        let mut line = String::new();
        if self.reader.read_line(&mut line).await? == 0 {
            return Ok(None);
        }
        let trimmed = line.trim_end_matches(['\n', '\r']).len();
        line.truncate(trimmed);
        Ok(Some(line))
    }

    /// Serialises `message` and writes it as one line.
    ///
    /// # Errors
    ///
    /// Returns an error if serialisation or writing fails.
    pub async fn write_message<T: Serialize>(&mut self, message: &T) -> io::Result<()> {
        let json = serde_json::to_string(message)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        self.write_line(&json).await
    }

    /// Writes an already serialised message.
    ///
    /// # Errors
    ///
    /// Returns an error if writing fails.
    pub async fn write_line(&mut self, json: &str) -> io::Result<()> {
        debug_assert!(
            !json.contains('\n'),
            "JSON message must not contain embedded newlines"
        );

        self.writer.write_all(json.as_bytes()).await?;
        self.writer.write_all(b"\n").await?;
        self.writer.flush().await
    }

    /// Consumes the transport and returns its streams.
    pub fn into_inner(self) -> (R, W) {
        (self.reader, self.writer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::{JsonRpcResponse, RequestId};

    #[tokio::test]
    async fn reads_lines_without_terminators() {
        let input: &[u8] = b"{\"a\":1}\r\n\n{\"b\":2}";
        let mut transport = Transport::new(input, Vec::new());
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("{\"a\":1}"));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some(""));
        assert_eq!(transport.read_line().await.unwrap().as_deref(), Some("{\"b\":2}"));
        assert!(transport.read_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn writes_one_message_per_line() {
        let mut transport = Transport::new(&b""[..], Vec::new());
        let response = JsonRpcResponse::success(
            RequestId::Number(1),
            serde_json::json!({ "text": "line one\nline two" }),
        );
        transport.write_message(&response).await.unwrap();
        transport.write_line("{}").await.unwrap();

        let written = String::from_utf8(transport.writer).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].contains(r#""id":1"#));
        assert!(lines[0].contains(r"line one\nline two"));
    }
}
