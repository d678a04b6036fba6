//! Length-delimited protobuf framing over any byte stream

use std::time::Duration;

use bytes::Bytes;
use futures_util::{SinkExt, StreamExt};
use prost::Message;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite, LengthDelimitedCodec};

use crate::error::{DaemonError, Result};

/// Largest accepted frame body
pub const MAX_FRAME_LENGTH: usize = 64 * 1024;

fn length_codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec()
}

pub fn frame_reader<R: AsyncRead>(reader: R) -> FramedRead<R, LengthDelimitedCodec> {
    FramedRead::new(reader, length_codec())
}

pub fn frame_writer<W: AsyncWrite>(writer: W) -> FramedWrite<W, LengthDelimitedCodec> {
    FramedWrite::new(writer, length_codec())
}

/// Read and decode the next frame, `None` once the peer has finished.
///
/// Cancel safe: dropping the future before it completes loses no data.
pub async fn next_frame<M, R>(
    frames: &mut FramedRead<R, LengthDelimitedCodec>,
) -> Result<Option<M>>
where
    M: Message + Default,
    R: AsyncRead + Unpin,
{
    match frames.next().await {
        None => Ok(None),
        Some(Err(e)) => Err(DaemonError::Stream(format!("Failed to read frame: {}", e))),
        Some(Ok(body)) => Ok(Some(M::decode(body)?)),
    }
}

/// [`next_frame`], failing with [`DaemonError::Timeout`] if nothing arrives
/// within `idle_timeout`
pub async fn read_frame<M, R>(
    frames: &mut FramedRead<R, LengthDelimitedCodec>,
    idle_timeout: Duration,
) -> Result<Option<M>>
where
    M: Message + Default,
    R: AsyncRead + Unpin,
{
    tokio::time::timeout(idle_timeout, next_frame(frames))
        .await
        .map_err(|_| DaemonError::Timeout)?
}

/// Encode and send one frame
pub async fn write_frame<M, W>(frames: &mut FramedWrite<W, LengthDelimitedCodec>, message: &M) -> Result<()>
where
    M: Message,
    W: AsyncWrite + Unpin,
{
    frames
        .send(Bytes::from(message.encode_to_vec()))
        .await
        .map_err(|e| DaemonError::Stream(format!("Failed to write frame: {}", e)))
}

/// Flush and shut down the write direction
pub async fn finish<W>(frames: &mut FramedWrite<W, LengthDelimitedCodec>) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    SinkExt::<Bytes>::close(frames)
        .await
        .map_err(|e| DaemonError::Stream(format!("Failed to close stream: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stream::types::MaxUpdateFrame;
    use tokio::io::AsyncWriteExt;

    #[tokio::test]
    async fn test_frames_then_end_of_stream() {
        let (near, far) = tokio::io::duplex(1024);
        let mut writer = frame_writer(near);
        let mut reader = frame_reader(far);

        write_frame(&mut writer, &MaxUpdateFrame { num: 5 }).await.unwrap();
        write_frame(&mut writer, &MaxUpdateFrame { num: 0 }).await.unwrap();
        finish(&mut writer).await.unwrap();

        let timeout = Duration::from_secs(5);
        let first: Option<MaxUpdateFrame> = read_frame(&mut reader, timeout).await.unwrap();
        let second: Option<MaxUpdateFrame> = read_frame(&mut reader, timeout).await.unwrap();
        let end: Option<MaxUpdateFrame> = read_frame(&mut reader, timeout).await.unwrap();

        assert_eq!(first, Some(MaxUpdateFrame { num: 5 }));
        // A zero value encodes to an empty body
        assert_eq!(second, Some(MaxUpdateFrame { num: 0 }));
        assert_eq!(end, None);
    }

    #[tokio::test]
    async fn test_idle_peer_times_out() {
        let (_near, far) = tokio::io::duplex(1024);
        let mut reader = frame_reader(far);

        let result: Result<Option<MaxUpdateFrame>> =
            read_frame(&mut reader, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(DaemonError::Timeout)));
    }

    #[tokio::test]
    async fn test_interrupted_read_keeps_partial_frame() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = frame_reader(far);

        let body = MaxUpdateFrame { num: 42 }.encode_to_vec();
        let mut wire = (body.len() as u32).to_be_bytes().to_vec();
        wire.extend_from_slice(&body);
        let (head, tail) = wire.split_at(3);

        near.write_all(head).await.unwrap();
        let result: Result<Option<MaxUpdateFrame>> =
            read_frame(&mut reader, Duration::from_millis(50)).await;
        assert!(matches!(result, Err(DaemonError::Timeout)));

        near.write_all(tail).await.unwrap();
        let frame: Option<MaxUpdateFrame> = next_frame(&mut reader).await.unwrap();
        assert_eq!(frame, Some(MaxUpdateFrame { num: 42 }));
    }

    #[tokio::test]
    async fn test_oversized_frame_rejected() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = frame_reader(far);

        let length = (MAX_FRAME_LENGTH as u32 + 1).to_be_bytes();
        near.write_all(&length).await.unwrap();

        let result: Result<Option<MaxUpdateFrame>> =
            read_frame(&mut reader, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(DaemonError::Stream(_))));
    }

    #[tokio::test]
    async fn test_garbage_body_is_serialization_error() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = frame_reader(far);

        // Length 1, then a lone key byte with no value
        near.write_all(&[0, 0, 0, 1, 0x08]).await.unwrap();

        let result: Result<Option<MaxUpdateFrame>> =
            read_frame(&mut reader, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(DaemonError::Serialization(_))));
    }

    #[tokio::test]
    async fn test_truncated_frame_is_stream_error() {
        let (mut near, far) = tokio::io::duplex(1024);
        let mut reader = frame_reader(far);

        near.write_all(&[0, 0, 0, 10, 1, 2]).await.unwrap();
        near.shutdown().await.unwrap();

        let result: Result<Option<MaxUpdateFrame>> =
            read_frame(&mut reader, Duration::from_secs(5)).await;
        assert!(matches!(result, Err(DaemonError::Stream(_))));
    }
}
