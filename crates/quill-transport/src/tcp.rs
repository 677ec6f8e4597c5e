//! Frame-oriented wrapper over a TCP stream.

use std::net::SocketAddr;
use std::time::Duration;

use quill_msg::{
    REQUEST_FRAME_LEN, RESPONSE_FRAME_LEN, RequestFrame, ResponseFrame,
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;

use crate::{Result, TransportError};

/// Chunk size for raw payload transfer after a bulk READ response.
pub const RAW_CHUNK_SIZE: usize = 4096;

/// A TCP connection speaking the quill frame protocol.
///
/// Every receive re-computes the checksum and validates the magic; a
/// mismatch surfaces as an error whose [`TransportError::is_disconnect`]
/// is true, and the caller is expected to drop the connection.
#[derive(Debug)]
pub struct FrameStream {
    stream: TcpStream,
}

impl FrameStream {
    pub fn new(stream: TcpStream) -> Self {
        FrameStream { stream }
    }

    /// Connects to `addr`, bounded by `timeout`.
    pub async fn connect(addr: SocketAddr, timeout: Duration) -> Result<Self> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| TransportError::ConnectTimeout(addr))??;
        Ok(FrameStream { stream })
    }

    pub fn peer_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.peer_addr()?)
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.stream.local_addr()?)
    }

    pub async fn send_request(&mut self, frame: &RequestFrame) -> Result<()> {
        let bytes = frame.encode()?;
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    pub async fn recv_request(&mut self) -> Result<RequestFrame> {
        let mut buf = [0u8; REQUEST_FRAME_LEN];
        self.stream.read_exact(&mut buf).await?;
        Ok(RequestFrame::decode(&buf)?)
    }

    pub async fn send_response(&mut self, frame: &ResponseFrame) -> Result<()> {
        let bytes = frame.encode()?;
        self.stream.write_all(&bytes).await?;
        Ok(())
    }

    pub async fn recv_response(&mut self) -> Result<ResponseFrame> {
        let mut buf = [0u8; RESPONSE_FRAME_LEN];
        self.stream.read_exact(&mut buf).await?;
        Ok(ResponseFrame::decode(&buf)?)
    }

    /// Sends an unframed payload in [`RAW_CHUNK_SIZE`] chunks.
    pub async fn send_raw(&mut self, bytes: &[u8]) -> Result<()> {
        for chunk in bytes.chunks(RAW_CHUNK_SIZE) {
            self.stream.write_all(chunk).await?;
        }
        Ok(())
    }

    /// Reads an unframed payload until the peer closes its write side.
    pub async fn recv_raw_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        self.stream.read_to_end(&mut out).await?;
        Ok(out)
    }

    /// Half-closes the write side, signalling end of payload.
    pub async fn shutdown(&mut self) -> Result<()> {
        self.stream.shutdown().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quill_msg::{Command, Status, checksum};
    use tokio::net::TcpListener;

    #[tokio::test]
    async fn frames_cross_a_socket() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = FrameStream::new(stream);
            let request = stream.recv_request().await.unwrap();
            assert_eq!(request.command, Command::Info);
            assert_eq!(request.username.as_str(), "alice");
            stream
                .send_response(&ResponseFrame::ok("owner=alice").unwrap())
                .await
                .unwrap();
        });

        let mut client = FrameStream::connect(addr, Duration::from_secs(5))
            .await
            .unwrap();
        client
            .send_request(&RequestFrame::new(Command::Info, "alice", "a.txt").unwrap())
            .await
            .unwrap();
        let response = client.recv_response().await.unwrap();
        assert!(response.status.is_ok());
        assert_eq!(response.data.as_str(), "owner=alice");
        server.await.unwrap();
    }

    #[tokio::test]
    async fn corrupted_frame_reads_as_disconnect_worthy() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let server = tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut bytes = ResponseFrame::error(Status::Internal, "x").encode().unwrap();
            bytes[10] ^= 0x01; // corrupt one byte, keep the stale checksum
            stream.write_all(&bytes).await.unwrap();
        });

        let mut client = FrameStream::connect(addr, Duration::from_secs(5))
            .await
            .unwrap();
        let err = client.recv_response().await.unwrap_err();
        assert!(err.is_disconnect());
        server.await.unwrap();
    }

    #[tokio::test]
    async fn raw_payload_round_trip() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let payload: Vec<u8> = (0..u8::MAX).cycle().take(3 * RAW_CHUNK_SIZE + 17).collect();
        let expected = payload.clone();

        let server = tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            let mut stream = FrameStream::new(stream);
            stream.send_raw(&payload).await.unwrap();
            stream.shutdown().await.unwrap();
        });

        let mut client = FrameStream::connect(addr, Duration::from_secs(5))
            .await
            .unwrap();
        let received = client.recv_raw_to_end().await.unwrap();
        assert_eq!(received, expected);
        server.await.unwrap();
    }

    #[test]
    fn checksum_stride_folding() {
        // 32-bit strides, little endian, zero-extended tail
        assert_eq!(checksum(&[1, 0, 0, 0, 2, 0, 0, 0]), 3);
        assert_eq!(checksum(&[1, 0, 0, 0, 2]), 3);
    }
}
