//! Wire protocol for daemon communication
//!
//! Each message is a MessagePack document preceded by its length as a
//! 4-byte big-endian integer.

use crate::{gate::GateStatus, ExecutionResult, Result, SandboxError};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

/// Frames larger than this are rejected
pub const MAX_FRAME_LEN: usize = 16 * 1024 * 1024;

/// Request to execute code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteRequest {
    /// Python source to run as `main.py`
    pub code: String,
}

/// Response from execution
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecuteResponse {
    /// Whether the harness ran the submission. A submission that crashed or
    /// timed out still counts as success here.
    pub success: bool,
    /// Execution result (if success)
    pub result: Option<ExecutionResult>,
    /// Harness fault (if !success)
    pub error: Option<String>,
}

impl ExecuteResponse {
    #[must_use]
    pub const fn ok(result: ExecutionResult) -> Self {
        Self {
            success: true,
            result: Some(result),
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            result: None,
            error: Some(error.into()),
        }
    }
}

/// Request types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Request {
    Execute(ExecuteRequest),
    /// Gate occupancy
    Status,
    Ping,
}

/// Response types
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Response {
    Execute(ExecuteResponse),
    Status(GateStatus),
    Pong,
    Error { message: String },
}

/// Encode a message to msgpack. Structs are written as maps so that
/// internally tagged enums can be decoded again.
pub fn encode<T: Serialize>(msg: &T) -> Result<Vec<u8>> {
    rmp_serde::to_vec_named(msg).map_err(|e| SandboxError::Protocol(format!("encode: {e}")))
}

/// Decode a message from msgpack
pub fn decode<T: DeserializeOwned>(data: &[u8]) -> Result<T> {
    rmp_serde::from_slice(data).map_err(|e| SandboxError::Protocol(format!("decode: {e}")))
}

/// Write one length-prefixed frame
pub async fn write_frame<W, T>(writer: &mut W, msg: &T) -> Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let body = encode(msg)?;
    if body.len() > MAX_FRAME_LEN {
        return Err(SandboxError::Protocol(format!(
            "frame of {} bytes exceeds {MAX_FRAME_LEN}",
            body.len()
        )));
    }
    let len = u32::try_from(body.len())
        .map_err(|_| SandboxError::Protocol("frame length overflow".into()))?;

    writer.write_all(&len.to_be_bytes()).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Read one length-prefixed frame. `Ok(None)` means the peer closed the
/// connection cleanly between frames.
pub async fn read_frame<R, T>(reader: &mut R) -> Result<Option<T>>
where
    R: AsyncRead + Unpin,
    T: DeserializeOwned,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_be_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        return Err(SandboxError::Protocol(format!(
            "frame of {len} bytes exceeds {MAX_FRAME_LEN}"
        )));
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    decode(&body).map(Some)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[tokio::test]
    async fn frames_round_trip_over_a_pipe() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let request = Request::Execute(ExecuteRequest {
            code: "print('hi')".into(),
        });
        write_frame(&mut client, &request).await.unwrap();
        write_frame(&mut client, &Request::Ping).await.unwrap();
        drop(client);

        let first: Option<Request> = read_frame(&mut server).await.unwrap();
        let second: Option<Request> = read_frame(&mut server).await.unwrap();
        let end: Option<Request> = read_frame(&mut server).await.unwrap();
        assert_eq!(first, Some(request));
        assert_eq!(second, Some(Request::Ping));
        assert_eq!(end, None);
    }

    #[test]
    fn execute_response_carries_result_fields() {
        let response = Response::Execute(ExecuteResponse::ok(ExecutionResult::timed_out(
            Duration::from_secs(1),
        )));
        let decoded: Response = decode(&encode(&response).unwrap()).unwrap();

        let Response::Execute(ExecuteResponse {
            success: true,
            result: Some(result),
            error: None,
        }) = decoded
        else {
            panic!("unexpected response: {decoded:?}");
        };
        assert!(result.timed_out);
        assert_eq!(result.stderr, crate::result::TIMEOUT_MESSAGE);
    }

    #[test]
    fn status_is_encoded_as_tagged_map() {
        let status = GateStatus {
            capacity: 1,
            in_flight: 1,
            waiting: 2,
            completed: 7,
        };
        let bytes = encode(&Response::Status(status)).unwrap();
        let value: serde_json::Value = rmp_serde::from_slice(&bytes).unwrap();
        assert_eq!(value["type"], "Status");
        assert_eq!(value["waiting"], 2);
    }

    #[tokio::test]
    async fn oversized_frame_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);
        let len = u32::try_from(MAX_FRAME_LEN + 1).unwrap();
        client.write_all(&len.to_be_bytes()).await.unwrap();

        let err = read_frame::<_, Request>(&mut server).await.unwrap_err();
        assert!(matches!(err, SandboxError::Protocol(_)));
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        let err = decode::<Request>(&[0xc1, 0x00]).unwrap_err();
        assert!(matches!(err, SandboxError::Protocol(_)));
    }
}
