//! Source RCON framing.
//!
//! Every frame is `size:i32le` followed by `size` bytes of
//! `id:i32le, type:i32le, body, 0x00, 0x00`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use super::error::RconError;

pub const SERVERDATA_AUTH: i32 = 3;
pub const SERVERDATA_AUTH_RESPONSE: i32 = 2;
pub const SERVERDATA_EXECCOMMAND: i32 = 2;
pub const SERVERDATA_RESPONSE_VALUE: i32 = 0;

/// id + type + two terminating NULs.
const MIN_FRAME: usize = 10;
const MAX_FRAME: usize = 1024 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub id: i32,
    pub kind: i32,
    pub body: String,
}

impl Packet {
    pub fn new(id: i32, kind: i32, body: impl Into<String>) -> Self {
        Self {
            id,
            kind,
            body: body.into(),
        }
    }

    /// Encode including the leading size field. Bodies that do not fit in
    /// one frame are [`RconError::TooLarge`].
    pub fn encode(&self) -> Result<Vec<u8>, RconError> {
        let body = self.body.as_bytes();
        let size = MIN_FRAME + body.len();
        let size = i32::try_from(size)
            .ok()
            .filter(|_| size <= MAX_FRAME)
            .ok_or(RconError::TooLarge(body.len()))?;

        let mut buf = Vec::with_capacity(4 + body.len() + MIN_FRAME);
        buf.extend_from_slice(&size.to_le_bytes());
        buf.extend_from_slice(&self.id.to_le_bytes());
        buf.extend_from_slice(&self.kind.to_le_bytes());
        buf.extend_from_slice(body);
        buf.extend_from_slice(&[0, 0]);
        Ok(buf)
    }

    /// Decode a frame body (everything after the size field).
    pub fn decode(frame: &[u8]) -> Result<Self, RconError> {
        if frame.len() < MIN_FRAME {
            return Err(RconError::Protocol(format!(
                "frame of {} bytes is shorter than the header",
                frame.len()
            )));
        }
        let id = i32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]);
        let kind = i32::from_le_bytes([frame[4], frame[5], frame[6], frame[7]]);
        let body = &frame[8..frame.len() - 2];
        // Some servers pad the body with its own NUL before the terminator.
        let body = body.strip_suffix(&[0]).unwrap_or(body);
        Ok(Self {
            id,
            kind,
            body: String::from_utf8_lossy(body).into_owned(),
        })
    }

    pub async fn write_to<W: AsyncWrite + Unpin>(&self, writer: &mut W) -> Result<(), RconError> {
        writer.write_all(&self.encode()?).await?;
        writer.flush().await?;
        Ok(())
    }

    pub async fn read_from<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Self, RconError> {
        let size = reader.read_i32_le().await?;
        let size = usize::try_from(size)
            .ok()
            .filter(|s| (MIN_FRAME..=MAX_FRAME).contains(s))
            .ok_or_else(|| RconError::Protocol(format!("invalid frame size {size}")))?;
        let mut frame = vec![0u8; size];
        reader.read_exact(&mut frame).await?;
        Self::decode(&frame)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn exec_command_wire_layout() {
        let bytes = Packet::new(7, SERVERDATA_EXECCOMMAND, "/time").encode().unwrap();
        assert_eq!(&bytes[0..4], &15i32.to_le_bytes());
        assert_eq!(&bytes[4..8], &7i32.to_le_bytes());
        assert_eq!(&bytes[8..12], &2i32.to_le_bytes());
        assert_eq!(&bytes[12..17], b"/time");
        assert_eq!(&bytes[17..], &[0, 0]);
    }

    #[tokio::test]
    async fn read_back_what_was_written() {
        let mut buf = Vec::new();
        let sent = Packet::new(-1, SERVERDATA_AUTH_RESPONSE, "");
        sent.write_to(&mut buf).await.unwrap();
        let got = Packet::read_from(&mut buf.as_slice()).await.unwrap();
        assert_eq!(got, sent);
    }

    #[test]
    fn extra_body_nul_is_tolerated() {
        let mut frame = Vec::new();
        frame.extend_from_slice(&3i32.to_le_bytes());
        frame.extend_from_slice(&0i32.to_le_bytes());
        frame.extend_from_slice(b"ok\0\0\0");
        let packet = Packet::decode(&frame).unwrap();
        assert_eq!(packet.body, "ok");
        assert_eq!(packet.id, 3);
    }

    #[tokio::test]
    async fn oversized_and_undersized_frames_are_rejected() {
        for size in [4i32, -1, 2 * 1024 * 1024] {
            let bytes = size.to_le_bytes();
            let err = Packet::read_from(&mut bytes.as_slice()).await.unwrap_err();
            assert!(matches!(err, RconError::Protocol(_)), "size {size}: {err}");
        }
    }

    #[tokio::test]
    async fn oversized_body_is_rejected_before_writing() {
        let mut buf = Vec::new();
        let body = "x".repeat(MAX_FRAME);
        let err = Packet::new(1, SERVERDATA_EXECCOMMAND, body)
            .write_to(&mut buf)
            .await
            .unwrap_err();
        assert!(matches!(err, RconError::TooLarge(n) if n == MAX_FRAME));
        assert!(err.is_rejected());
        assert!(buf.is_empty());
    }

    #[tokio::test]
    async fn truncated_stream_is_an_io_error() {
        let mut bytes = Packet::new(1, SERVERDATA_RESPONSE_VALUE, "hello")
            .encode()
            .unwrap();
        bytes.truncate(9);
        let err = Packet::read_from(&mut bytes.as_slice()).await.unwrap_err();
        assert!(matches!(err, RconError::Io(_)));
    }
}
