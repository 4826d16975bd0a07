use std::os::fd::{AsRawFd, FromRawFd};

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use nix::unistd::{dup, dup2};
use serde_json::json;
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{FramedRead, FramedWrite};

use crate::rpc::{ContentLengthCodec, FunctionRpcServer};
use crate::schema::v1::{RunFunctionRequest, RunFunctionResponse};

/// A composition function: one request in, one response out.
///
/// Logical failures belong in the response (see [`crate::response::fatal`]).
/// An `Err` is reported to the caller as a transport-level error instead.
#[async_trait]
pub trait CompositionFunction {
    async fn run_function(&self, request: RunFunctionRequest) -> Result<RunFunctionResponse>;
}

/// Serve `function` on the process' stdio until the input is closed.
///
/// Anything the function prints to stdout ends up on stderr, so it cannot
/// corrupt the protocol stream.
pub async fn run_main(function: impl CompositionFunction + Send + Sync + 'static) {
    let pipe = {
        let pipe = init_stdio().unwrap_or_exit();
        pipe_fds_to_files(pipe)
    };

    serve(function, pipe.in_, pipe.out)
        .await
        .with_context(|| "Could not serve requests")
        .unwrap_or_exit();
}

/// Serve `function` on a pair of streams carrying `Content-Length` framed
/// JSON-RPC messages. Returns when `input` reaches end of file.
pub async fn serve<F, R, W>(function: F, input: R, output: W) -> Result<()>
where
    F: CompositionFunction + Send + Sync + 'static,
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let module = function.into_rpc();
    let mut reader = FramedRead::new(input, ContentLengthCodec::default());
    let mut writer = FramedWrite::new(output, ContentLengthCodec::default());

    while let Some(message) = reader.next().await {
        let message = message.with_context(|| "Could not read request message")?;
        let response = match module.raw_json_request(&message, 1).await {
            Ok((response, _subscriptions)) => response.to_string(),
            Err(e) => {
                tracing::warn!("could not parse request message: {}", e);
                parse_error_response()
            }
        };
        writer
            .send(response)
            .await
            .with_context(|| "Could not write response message")?;
    }
    tracing::debug!("input closed, shutting down");
    Ok(())
}

fn parse_error_response() -> String {
    json!({
        "jsonrpc": "2.0",
        "id": null,
        "error": { "code": -32700, "message": "Parse error" }
    })
    .to_string()
}

/// A pair of `T` values: one for input and one for output.
struct InOut<T> {
    in_: T,
    out: T,
}

/// A file descriptor
type Fd = i32;

/// Configure the standard input/output streams for the process.
/// This returns the communication channels with the caller, and reconfigures
/// the stdio file descriptors as follows:
///
/// ```text
/// 0: /dev/null
/// 1: stderr
/// 2: stderr
/// ```
fn init_stdio() -> Result<InOut<Fd>> {
    let r = InOut {
        in_: dup(0).with_context(|| "dup(0)")?,
        out: dup(1).with_context(|| "dup(1)")?,
    };

    // 0: dev/null
    {
        let dev_null =
            std::fs::File::open("/dev/null").with_context(|| "Could not open /dev/null")?;
        dup2(dev_null.as_raw_fd(), 0).with_context(|| "Could not dup2(/dev/null, 0)")?;
    }

    // 1: stderr
    dup2(2, 1).with_context(|| "Could not dup2(2, 1)")?;

    // 2: stderr is left as is

    Ok(r)
}

fn pipe_fds_to_files(pipe: InOut<Fd>) -> InOut<tokio::fs::File> {
    // SAFETY: both descriptors were just created by dup() and are owned by nothing else.
    unsafe {
        InOut {
            in_: tokio::fs::File::from_std(std::fs::File::from_raw_fd(pipe.in_)),
            out: tokio::fs::File::from_std(std::fs::File::from_raw_fd(pipe.out)),
        }
    }
}

trait MainError<T> {
    type V;
    fn unwrap_or_exit(self) -> Self::V;
}
impl<T> MainError<Result<T>> for Result<T> {
    type V = T;
    fn unwrap_or_exit(self) -> T {
        match self {
            Ok(v) => v,
            Err(e) => {
                eprintln!("Error: {:?}", e);
                std::process::exit(1);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::response::{self, DEFAULT_TTL};
    use serde_json::Value;
    use tokio::io::{duplex, split};

    struct Passthrough;

    #[async_trait]
    impl CompositionFunction for Passthrough {
        async fn run_function(&self, request: RunFunctionRequest) -> Result<RunFunctionResponse> {
            Ok(response::to(&request, DEFAULT_TTL))
        }
    }

    struct Broken;

    #[async_trait]
    impl CompositionFunction for Broken {
        async fn run_function(&self, _request: RunFunctionRequest) -> Result<RunFunctionResponse> {
            anyhow::bail!("out of order")
        }
    }

    /// Send `messages` to a server running `function`, and collect its replies.
    async fn exchange<F>(function: F, messages: Vec<String>) -> Vec<Value>
    where
        F: CompositionFunction + Send + Sync + 'static,
    {
        let (client, server) = duplex(64 * 1024);
        let (server_in, server_out) = split(server);
        let (client_in, client_out) = split(client);

        let client = async move {
            let mut writer = FramedWrite::new(client_out, ContentLengthCodec::default());
            let mut reader = FramedRead::new(client_in, ContentLengthCodec::default());
            let mut replies = Vec::new();
            for m in messages {
                writer.send(m).await.unwrap();
                let reply = reader.next().await.unwrap().unwrap();
                replies.push(serde_json::from_str(&reply).unwrap());
            }
            writer.close().await.unwrap();
            replies
        };

        let (served, replies) = tokio::join!(serve(function, server_in, server_out), client);
        served.unwrap();
        replies
    }

    #[tokio::test]
    async fn serves_requests_in_order() {
        let request = |tag: &str| {
            json!({
                "jsonrpc": "2.0",
                "id": tag,
                "method": "function_run",
                "params": { "request": { "meta": { "tag": tag } } }
            })
            .to_string()
        };
        let replies = exchange(Passthrough, vec![request("one"), request("two")]).await;

        assert_eq!(replies.len(), 2);
        assert_eq!(replies[0]["id"], json!("one"));
        assert_eq!(
            replies[0]["result"],
            json!({ "meta": { "tag": "one", "ttl": "60s" } })
        );
        assert_eq!(replies[1]["result"]["meta"]["tag"], json!("two"));
    }

    #[tokio::test]
    async fn function_errors_become_internal_errors() {
        let request = json!({
            "jsonrpc": "2.0",
            "id": 1,
            "method": "function_run",
            "params": [{}]
        })
        .to_string();
        let replies = exchange(Broken, vec![request]).await;

        assert_eq!(replies[0]["error"]["code"], json!(-32603));
        assert_eq!(replies[0]["error"]["data"], json!("out of order"));
    }

    #[tokio::test]
    async fn garbage_gets_a_parse_error() {
        let replies = exchange(Passthrough, vec!["{not json".to_string()]).await;
        assert_eq!(replies[0]["error"]["code"], json!(-32700));
    }
}
