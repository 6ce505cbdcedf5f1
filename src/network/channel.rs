//! Transport Channel
//!
//! A message-framed, ordered connection over one TCP stream. Each frame is
//! a single serialized value, a bare string or an ordered list of strings,
//! written as one JSON value per line, so every `send` arrives as exactly
//! one discrete message on the other end. The protocol layer assigns
//! meaning positionally; nothing here tags message types.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::tcp::{OwnedReadHalf, OwnedWriteHalf};
use tokio::net::{TcpStream, ToSocketAddrs};

/// One framed value on the wire.
///
/// JSON string escaping guarantees a serialized frame never contains a raw
/// newline, so line framing is unambiguous.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    /// A bare string value.
    Text(String),
    /// An ordered list of strings.
    List(Vec<String>),
}

impl Frame {
    /// The string payload, if this is a text frame.
    pub fn into_text(self) -> Option<String> {
        match self {
            Frame::Text(s) => Some(s),
            Frame::List(_) => None,
        }
    }

    /// The list payload, if this is a list frame.
    pub fn into_list(self) -> Option<Vec<String>> {
        match self {
            Frame::List(items) => Some(items),
            Frame::Text(_) => None,
        }
    }
}

/// Faults on a transport channel.
#[derive(Debug, thiserror::Error)]
pub enum ChannelError {
    /// Underlying socket I/O failed.
    #[error("channel I/O fault: {0}")]
    Io(#[from] std::io::Error),

    /// The peer closed the stream.
    #[error("peer closed the channel")]
    Closed,

    /// No frame arrived before the deadline.
    #[error("deadline expired waiting for a frame")]
    Deadline,

    /// The peer sent bytes that do not decode as a frame.
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// Receiving half of a channel.
pub struct FrameReader {
    inner: BufReader<OwnedReadHalf>,
}

impl FrameReader {
    /// Block until one full frame arrives.
    pub async fn recv(&mut self) -> Result<Frame, ChannelError> {
        let mut line = String::new();
        let n = self.inner.read_line(&mut line).await?;
        if n == 0 {
            return Err(ChannelError::Closed);
        }
        Ok(serde_json::from_str(line.trim_end())?)
    }

    /// Block for one frame, up to `deadline`. Expiry is reported as
    /// [`ChannelError::Deadline`]; callers treat it like any other fault.
    pub async fn recv_deadline(&mut self, deadline: Duration) -> Result<Frame, ChannelError> {
        tokio::time::timeout(deadline, self.recv())
            .await
            .map_err(|_| ChannelError::Deadline)?
    }

    /// Consume frames that are already available without waiting for more.
    ///
    /// Returns how many frames were discarded, or the fault that interrupted
    /// the drain. A closed stream surfaces here even when the peer went
    /// quiet, which is what lets the accept loop notice dead players.
    pub async fn drain(&mut self) -> Result<usize, ChannelError> {
        let mut drained = 0;
        loop {
            match tokio::time::timeout(Duration::from_millis(5), self.recv()).await {
                Ok(Ok(_)) => drained += 1,
                Ok(Err(e)) => return Err(e),
                Err(_) => return Ok(drained),
            }
        }
    }
}

/// Sending half of a channel.
pub struct FrameWriter {
    inner: OwnedWriteHalf,
}

impl FrameWriter {
    /// Write one frame and flush it.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        let mut buf = serde_json::to_vec(frame)?;
        buf.push(b'\n');
        self.inner.write_all(&buf).await?;
        self.inner.flush().await?;
        Ok(())
    }

    /// Send a bare string frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), ChannelError> {
        self.send(&Frame::Text(text.to_string())).await
    }

    /// Send a string-list frame.
    pub async fn send_list(&mut self, items: &[String]) -> Result<(), ChannelError> {
        self.send(&Frame::List(items.to_vec())).await
    }
}

/// Both halves of one framed connection.
pub struct Channel {
    reader: FrameReader,
    writer: FrameWriter,
}

impl Channel {
    /// Wrap an accepted stream.
    pub fn from_stream(stream: TcpStream) -> Self {
        let (read, write) = stream.into_split();
        Self {
            reader: FrameReader {
                inner: BufReader::new(read),
            },
            writer: FrameWriter { inner: write },
        }
    }

    /// Connect to a listening peer, bounded by `timeout`.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        timeout: Duration,
    ) -> Result<Self, ChannelError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ChannelError::Deadline)??;
        Ok(Self::from_stream(stream))
    }

    /// Split into independently owned halves.
    pub fn split(self) -> (FrameReader, FrameWriter) {
        (self.reader, self.writer)
    }

    /// Block until one full frame arrives.
    pub async fn recv(&mut self) -> Result<Frame, ChannelError> {
        self.reader.recv().await
    }

    /// Block for one frame, up to `deadline`.
    pub async fn recv_deadline(&mut self, deadline: Duration) -> Result<Frame, ChannelError> {
        self.reader.recv_deadline(deadline).await
    }

    /// Write one frame and flush it.
    pub async fn send(&mut self, frame: &Frame) -> Result<(), ChannelError> {
        self.writer.send(frame).await
    }

    /// Send a bare string frame.
    pub async fn send_text(&mut self, text: &str) -> Result<(), ChannelError> {
        self.writer.send_text(text).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::net::TcpListener;

    async fn pair() -> (Channel, Channel) {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let connect = tokio::spawn(async move {
            Channel::connect(addr, Duration::from_secs(1)).await.unwrap()
        });
        let (accepted, _) = listener.accept().await.unwrap();
        let server = Channel::from_stream(accepted);
        (server, connect.await.unwrap())
    }

    #[tokio::test]
    async fn text_and_list_frames_round_trip() {
        let (mut server, mut client) = pair().await;

        client.send_text("ready").await.unwrap();
        assert_eq!(server.recv().await.unwrap(), Frame::Text("ready".into()));

        let roster = vec!["alice".to_string(), "bob".to_string()];
        server.send(&Frame::List(roster.clone())).await.unwrap();
        assert_eq!(client.recv().await.unwrap(), Frame::List(roster));
    }

    #[tokio::test]
    async fn each_send_is_one_discrete_message() {
        let (mut server, mut client) = pair().await;

        client.send_text("rock").await.unwrap();
        client.send_text("with\nnewline").await.unwrap();
        client.send_text("paper").await.unwrap();

        assert_eq!(server.recv().await.unwrap(), Frame::Text("rock".into()));
        assert_eq!(
            server.recv().await.unwrap(),
            Frame::Text("with\nnewline".into())
        );
        assert_eq!(server.recv().await.unwrap(), Frame::Text("paper".into()));
    }

    #[tokio::test]
    async fn recv_deadline_expires() {
        let (mut server, _client) = pair().await;
        let err = server
            .recv_deadline(Duration::from_millis(50))
            .await
            .unwrap_err();
        assert!(matches!(err, ChannelError::Deadline));
    }

    #[tokio::test]
    async fn closed_peer_is_reported() {
        let (mut server, client) = pair().await;
        drop(client);
        let err = server.recv().await.unwrap_err();
        assert!(matches!(err, ChannelError::Closed));
    }

    #[tokio::test]
    async fn drain_consumes_buffered_frames_only() {
        let (server, mut client) = pair().await;
        let (mut reader, _writer) = server.split();

        client.send_text("doki").await.unwrap();
        client.send_text("doki").await.unwrap();
        // Give the frames time to land in the receive buffer.
        tokio::time::sleep(Duration::from_millis(50)).await;

        assert_eq!(reader.drain().await.unwrap(), 2);
        assert_eq!(reader.drain().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn drain_surfaces_a_closed_peer() {
        let (server, client) = pair().await;
        let (mut reader, _writer) = server.split();
        drop(client);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(matches!(reader.drain().await, Err(ChannelError::Closed)));
    }

    #[tokio::test]
    async fn malformed_bytes_are_rejected() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let client = tokio::spawn(async move {
            let mut stream = TcpStream::connect(addr).await.unwrap();
            tokio::io::AsyncWriteExt::write_all(&mut stream, b"not json\n")
                .await
                .unwrap();
            stream
        });
        let (accepted, _) = listener.accept().await.unwrap();
        let mut server = Channel::from_stream(accepted);
        let _keep_alive = client.await.unwrap();
        assert!(matches!(
            server.recv().await,
            Err(ChannelError::Malformed(_))
        ));
    }
}
