//! TCP protocol between the detector host and the coach server.

use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio_util::codec::{Framed, LengthDelimitedCodec};

use crate::diagnosis::{PostureReport, View};
use crate::exercise::ExerciseKind;
use crate::pose::Keypoint;
use crate::session::LiveState;

/// Largest accepted frame: 33 keypoints plus one JPEG
const MAX_FRAME_LENGTH: usize = 8 * 1024 * 1024;

/// Detector host → coach server
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ClientMessage {
    StartSession { mode: ExerciseKind },
    Frame {
        timestamp_ms: f64,
        keypoints: Vec<Keypoint>,
        jpeg: Option<Vec<u8>>,
    },
    SetMode { mode: ExerciseKind },
    Reset,
    Diagnose { view: View },
    StopSession,
}

/// Coach server → detector host
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub enum ServerMessage {
    SessionStarted { mode: ExerciseKind },
    State(LiveState),
    Diagnosis(PostureReport),
    Error { message: String },
}

impl ServerMessage {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

// --- TCP codec helpers ---

pub type MessageStream<S = TcpStream> = Framed<S, LengthDelimitedCodec>;

/// Wrap a byte stream with length-delimited framing.
pub fn message_stream<S: AsyncRead + AsyncWrite>(stream: S) -> MessageStream<S> {
    let codec = LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LENGTH)
        .new_codec();
    Framed::new(stream, codec)
}

/// Send a serializable message (bincode + length prefix).
pub async fn send_message<S, T>(stream: &mut MessageStream<S>, msg: &T) -> anyhow::Result<()>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: Serialize,
{
    let data = bincode::serialize(msg)?;
    stream.send(Bytes::from(data)).await?;
    Ok(())
}

/// Receive and deserialize a message. `Ok(None)` on a clean close.
pub async fn recv_message<S, T>(stream: &mut MessageStream<S>) -> anyhow::Result<Option<T>>
where
    S: AsyncRead + AsyncWrite + Unpin,
    T: DeserializeOwned,
{
    match stream.next().await {
        Some(Ok(bytes)) => Ok(Some(bincode::deserialize(&bytes)?)),
        Some(Err(e)) => Err(e.into()),
        None => Ok(None),
    }
}
