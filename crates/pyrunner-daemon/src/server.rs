//! Unix socket server

use pyrunner_core::{
    protocol::{self, ExecuteResponse, Request, Response},
    GatedExecutor, SandboxError,
};
use std::future::Future;
use tokio::net::{UnixListener, UnixStream};

/// Accept connections until `shutdown` resolves. Every connection is served
/// on its own task; executions from all of them share one gate.
pub async fn run(
    listener: UnixListener,
    executor: GatedExecutor,
    shutdown: impl Future<Output = ()>,
) -> std::io::Result<()> {
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            () = &mut shutdown => {
                tracing::info!("shutdown requested, no longer accepting connections");
                return Ok(());
            }
            accepted = listener.accept() => {
                let (stream, _) = accepted?;
                let executor = executor.clone();

                tokio::spawn(async move {
                    if let Err(e) = handle_connection(stream, executor).await {
                        tracing::error!(error = %e, "connection error");
                    }
                });
            }
        }
    }
}

/// Handle a single client connection
async fn handle_connection(
    mut stream: UnixStream,
    executor: GatedExecutor,
) -> Result<(), SandboxError> {
    loop {
        let request: Request = match protocol::read_frame(&mut stream).await {
            Ok(Some(request)) => request,
            Ok(None) => break,
            Err(SandboxError::Protocol(message)) => {
                tracing::warn!(%message, "malformed request");
                let response = Response::Error { message };
                protocol::write_frame(&mut stream, &response).await?;
                break;
            }
            Err(e) => return Err(e),
        };

        let response = handle_request(request, &executor).await;
        protocol::write_frame(&mut stream, &response).await?;
    }

    Ok(())
}

/// Handle a single request
async fn handle_request(request: Request, executor: &GatedExecutor) -> Response {
    match request {
        Request::Execute(req) => {
            tracing::debug!(code_len = req.code.len(), "execute request");
            match executor.execute(req.code).await {
                Ok(result) => Response::Execute(ExecuteResponse::ok(result)),
                Err(e) => {
                    tracing::error!(error = %e, "execution fault");
                    Response::Execute(ExecuteResponse::failed(e.to_string()))
                }
            }
        }
        Request::Status => Response::Status(executor.status()),
        Request::Ping => Response::Pong,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pyrunner_core::{Client, SandboxConfig, SandboxExecutor};
    use tokio::io::AsyncWriteExt;
    use tokio::sync::oneshot;

    struct Harness {
        _dir: tempfile::TempDir,
        socket: std::path::PathBuf,
        stop: oneshot::Sender<()>,
        server: tokio::task::JoinHandle<std::io::Result<()>>,
    }

    fn start(python: &str) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let socket = dir.path().join("pyrunner.sock");
        let workdirs = dir.path().join("runs");

        let config = SandboxConfig::builder()
            .python_path(python)
            .workdir_root(&workdirs)
            .build();
        let executor = GatedExecutor::new(SandboxExecutor::new(config).unwrap(), 1);
        let listener = UnixListener::bind(&socket).unwrap();

        let (stop, stopped) = oneshot::channel::<()>();
        let server = tokio::spawn(run(listener, executor, async {
            let _ = stopped.await;
        }));

        Harness {
            _dir: dir,
            socket,
            stop,
            server,
        }
    }

    #[tokio::test]
    async fn ping_and_status() {
        let harness = start("/usr/bin/python3");
        let mut client = Client::connect(&harness.socket).await.unwrap();

        client.ping().await.unwrap();
        let status = client.status().await.unwrap();
        assert_eq!(status.capacity, 1);
        assert_eq!(status.in_flight, 0);

        harness.stop.send(()).unwrap();
        harness.server.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn execute_round_trip() {
        let Some(python) = ["/usr/bin/python3", "/usr/local/bin/python3"]
            .into_iter()
            .find(|p| std::path::Path::new(p).exists())
        else {
            return;
        };
        let harness = start(python);
        let mut client = Client::connect(&harness.socket).await.unwrap();

        let result = client.execute("print(6 * 7)").await.unwrap();
        assert_eq!(result.stdout, "42\n");
        assert_eq!(result.exit_code, Some(0));
        assert!(!result.timed_out);

        assert_eq!(client.status().await.unwrap().completed, 1);
        harness.stop.send(()).unwrap();
    }

    #[tokio::test]
    async fn missing_interpreter_is_still_a_result() {
        let harness = start("/nonexistent/python3");
        let mut client = Client::connect(&harness.socket).await.unwrap();

        let result = client.execute("print(1)").await.unwrap();
        assert!(result.stderr.contains("failed to start"));
        harness.stop.send(()).unwrap();
    }

    #[tokio::test]
    async fn garbage_gets_an_error_response() {
        let harness = start("/usr/bin/python3");
        let mut stream = UnixStream::connect(&harness.socket).await.unwrap();

        stream.write_all(&2u32.to_be_bytes()).await.unwrap();
        stream.write_all(&[0xc1, 0x00]).await.unwrap();

        let response: Option<Response> = protocol::read_frame(&mut stream).await.unwrap();
        assert!(matches!(response, Some(Response::Error { .. })));
        harness.stop.send(()).unwrap();
    }
}
