use anyhow::{Context, Result};
use jsonrpsee::async_client::{Client, ClientBuilder};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::process;
use vellum_function::rpc::{ContentLengthReceiver, ContentLengthSender};

pub(crate) fn build_rpc_client<W, R>(input: W, output: R) -> Client
where
    W: AsyncWrite + Unpin + Send + 'static,
    R: AsyncRead + Unpin + Send + 'static,
{
    let sender = ContentLengthSender::new(input);
    let receiver = ContentLengthReceiver::new(output);

    ClientBuilder::new().build_with_tokio(sender, receiver)
}

pub(crate) fn build_rpc_client_from_child(process: &mut process::Child) -> Result<Client> {
    let stdin = process
        .stdin
        .take()
        .context("function process has no stdin pipe")?;
    let stdout = process
        .stdout
        .take()
        .context("function process has no stdout pipe")?;
    Ok(build_rpc_client(stdin, stdout))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use async_trait::async_trait;
    use jsonrpsee::core::ClientError;
    use serde_json::json;
    use vellum_function::framework::{serve, CompositionFunction};
    use vellum_function::response::{self, DEFAULT_TTL};
    use vellum_function::rpc::FunctionRpcClient;
    use vellum_function::schema::v1::{RunFunctionRequest, RunFunctionResponse};

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
            bail!("out of order")
        }
    }

    /// Call `function` once through a client connected over an in-memory pipe.
    async fn call<F>(function: F, request: RunFunctionRequest) -> Result<RunFunctionResponse, ClientError>
    where
        F: CompositionFunction + Send + Sync + 'static,
    {
        let (client_end, server_end) = tokio::io::duplex(64 * 1024);
        let (server_in, server_out) = tokio::io::split(server_end);
        let (client_in, client_out) = tokio::io::split(client_end);
        let client = build_rpc_client(client_out, client_in);

        tokio::select! {
            served = serve(function, server_in, server_out) => {
                panic!("server stopped before replying: {:?}", served)
            }
            reply = client.run(request) => reply,
        }
    }

    #[tokio::test]
    async fn call_returns_the_response() {
        let request: RunFunctionRequest = serde_json::from_value(json!({
            "meta": { "tag": "t" },
            "desired": { "resources": { "a": { "resource": { "apiVersion": "v1", "kind": "ConfigMap" } } } }
        }))
        .unwrap();
        let rsp = call(Passthrough, request.clone()).await.unwrap();

        assert_eq!(rsp.meta.tag, "t");
        assert_eq!(rsp.meta.ttl, Some(DEFAULT_TTL));
        assert_eq!(rsp.desired, request.desired);
        assert!(!rsp.is_fatal());
    }

    #[tokio::test]
    async fn function_errors_reach_the_caller() {
        let err = call(Broken, RunFunctionRequest::default())
            .await
            .unwrap_err();
        match err {
            ClientError::Call(e) => {
                assert_eq!(e.code(), -32603);
                assert_eq!(e.data().map(|d| d.get()), Some("\"out of order\""));
            }
            other => panic!("expected a call error, got {:?}", other),
        }
    }
}
