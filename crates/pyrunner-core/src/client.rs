//! Client for the execution daemon

use crate::{
    gate::GateStatus,
    protocol::{self, ExecuteRequest, Request, Response},
    ExecutionResult, Result, SandboxError,
};
use std::path::Path;
use tokio::net::UnixStream;

/// One connection to the daemon. Requests on a connection are answered in
/// order.
#[derive(Debug)]
pub struct Client {
    stream: UnixStream,
}

impl Client {
    pub async fn connect(socket: impl AsRef<Path>) -> Result<Self> {
        let socket = socket.as_ref();
        let stream = UnixStream::connect(socket).await.map_err(|e| {
            SandboxError::Protocol(format!("cannot connect to {}: {e}", socket.display()))
        })?;
        Ok(Self { stream })
    }

    /// Run `code` on the daemon. Harness faults reported by the daemon come
    /// back as [`SandboxError::Execution`].
    pub async fn execute(&mut self, code: impl Into<String>) -> Result<ExecutionResult> {
        let request = Request::Execute(ExecuteRequest { code: code.into() });
        match self.call(&request).await? {
            Response::Execute(response) => match (response.success, response.result) {
                (true, Some(result)) => Ok(result),
                _ => Err(SandboxError::Execution(
                    response
                        .error
                        .unwrap_or_else(|| "daemon returned no result".into()),
                )),
            },
            other => Err(unexpected(&other)),
        }
    }

    pub async fn status(&mut self) -> Result<GateStatus> {
        match self.call(&Request::Status).await? {
            Response::Status(status) => Ok(status),
            other => Err(unexpected(&other)),
        }
    }

    pub async fn ping(&mut self) -> Result<()> {
        match self.call(&Request::Ping).await? {
            Response::Pong => Ok(()),
            other => Err(unexpected(&other)),
        }
    }

    async fn call(&mut self, request: &Request) -> Result<Response> {
        protocol::write_frame(&mut self.stream, request).await?;
        match protocol::read_frame(&mut self.stream).await? {
            Some(Response::Error { message }) => Err(SandboxError::Protocol(message)),
            Some(response) => Ok(response),
            None => Err(SandboxError::Protocol("daemon closed the connection".into())),
        }
    }
}

fn unexpected(response: &Response) -> SandboxError {
    SandboxError::Protocol(format!("unexpected response: {response:?}"))
}
