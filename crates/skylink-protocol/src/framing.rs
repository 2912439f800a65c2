//! Length-prefixed multipart framing for stream transports.
//!
//! Every message is a 4-byte big-endian body length followed by the body.
//! The body holds a frame count and then each frame with its own length:
//!
//! ```text
//! +---------------+--------------+---------------+---------+-----
//! | length (4 BE) | count (4 BE) | frame len (4) | frame 0 | ...
//! +---------------+--------------+---------------+---------+-----
//! ```

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::MAX_MESSAGE_SIZE;
use crate::error::{ProtocolError, ProtocolResult};
use crate::frames::FrameSet;

/// Encode a frame set with its length prefix, ready for transmission.
pub fn encode_message(frames: &FrameSet) -> ProtocolResult<Vec<u8>> {
    let body_len = 4 + frames.iter().map(|frame| 4 + frame.len()).sum::<usize>();
    if body_len > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge {
            size: u32::try_from(body_len).unwrap_or(u32::MAX),
            max: MAX_MESSAGE_SIZE,
        });
    }

    let mut buffer = Vec::with_capacity(4 + body_len);
    buffer.extend_from_slice(&(body_len as u32).to_be_bytes());
    buffer.extend_from_slice(&(frames.len() as u32).to_be_bytes());
    for frame in frames.iter() {
        buffer.extend_from_slice(&(frame.len() as u32).to_be_bytes());
        buffer.extend_from_slice(frame.as_bytes());
    }
    Ok(buffer)
}

/// Decode a complete message (length prefix and body).
pub fn decode_message(data: &[u8]) -> ProtocolResult<FrameSet> {
    let len = read_u32(data, 0)? as usize;

    if len > MAX_MESSAGE_SIZE as usize {
        return Err(ProtocolError::MessageTooLarge {
            size: len as u32,
            max: MAX_MESSAGE_SIZE,
        });
    }
    if len == 0 {
        return Err(ProtocolError::EmptyMessage);
    }
    if data.len() < 4 + len {
        return Err(ProtocolError::IncompleteMessage {
            expected: 4 + len,
            received: data.len(),
        });
    }

    decode_body(&data[4..4 + len])
}

fn decode_body(body: &[u8]) -> ProtocolResult<FrameSet> {
    let count = read_u32(body, 0)? as usize;
    let mut offset = 4;
    let mut frames = FrameSet::new();

    for index in 0..count {
        let len = read_u32(body, offset)? as usize;
        offset += 4;

        let end = offset + len;
        let bytes = body.get(offset..end).ok_or(ProtocolError::IncompleteMessage {
            expected: end,
            received: body.len(),
        })?;
        let frame =
            std::str::from_utf8(bytes).map_err(|_| ProtocolError::InvalidUtf8 { index })?;
        frames.push_back(frame);
        offset = end;
    }

    if offset != body.len() {
        return Err(ProtocolError::TrailingBytes(body.len() - offset));
    }

    Ok(frames)
}

fn read_u32(data: &[u8], offset: usize) -> ProtocolResult<u32> {
    data.get(offset..offset + 4)
        .and_then(|bytes| <[u8; 4]>::try_from(bytes).ok())
        .map(u32::from_be_bytes)
        .ok_or(ProtocolError::IncompleteMessage {
            expected: offset + 4,
            received: data.len(),
        })
}

/// Reads framed messages from an async byte stream.
pub struct FrameReader<R> {
    reader: R,
}

impl<R: AsyncRead + Unpin> FrameReader<R> {
    pub fn new(reader: R) -> Self {
        Self { reader }
    }

    /// Read a single message.
    ///
    /// Returns `Ok(None)` on a clean EOF before any byte of the next message.
    pub async fn read_message(&mut self) -> ProtocolResult<Option<FrameSet>> {
        let mut len_buf = [0u8; 4];
        match self.reader.read_exact(&mut len_buf).await {
            Ok(_) => {}
            Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e.into()),
        }

        let len = u32::from_be_bytes(len_buf) as usize;

        if len > MAX_MESSAGE_SIZE as usize {
            return Err(ProtocolError::MessageTooLarge {
                size: len as u32,
                max: MAX_MESSAGE_SIZE,
            });
        }
        if len == 0 {
            return Err(ProtocolError::EmptyMessage);
        }

        let mut body = vec![0u8; len];
        self.reader.read_exact(&mut body).await?;
        decode_body(&body).map(Some)
    }

    pub fn get_ref(&self) -> &R {
        &self.reader
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

/// Writes framed messages to an async byte stream.
pub struct FrameWriter<W> {
    writer: W,
}

impl<W: AsyncWrite + Unpin> FrameWriter<W> {
    pub fn new(writer: W) -> Self {
        Self { writer }
    }

    /// Write and flush a single message.
    pub async fn write_message(&mut self, frames: &FrameSet) -> ProtocolResult<()> {
        let data = encode_message(frames)?;
        self.writer.write_all(&data).await?;
        self.writer.flush().await?;
        Ok(())
    }

    /// Shut down the write half of the stream.
    pub async fn shutdown(&mut self) -> ProtocolResult<()> {
        self.writer.shutdown().await?;
        Ok(())
    }

    pub fn get_ref(&self) -> &W {
        &self.writer
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}
