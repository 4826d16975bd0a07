//! The JSON-RPC binding of a [`CompositionFunction`], and the message framing
//! used on the function's stdio.

use std::io;

use async_trait::async_trait;
use bytes::{Buf, BufMut, BytesMut};
use futures_util::{SinkExt, StreamExt};
use jsonrpsee::{
    core::{
        client::{ReceivedMessage, TransportReceiverT, TransportSenderT},
        RpcResult,
    },
    proc_macros::rpc,
    types::{ErrorCode, ErrorObject, ErrorObjectOwned},
};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio_util::codec::{Decoder, Encoder, FramedRead, FramedWrite};

use crate::{framework::CompositionFunction, schema::v1};

#[rpc(client, server, namespace = "function")]
pub trait FunctionRpc {
    /// Run the function once. Served as `function_run`.
    #[method(name = "run")]
    async fn run(&self, request: v1::RunFunctionRequest) -> RpcResult<v1::RunFunctionResponse>;
}

#[async_trait]
impl<T> FunctionRpcServer for T
where
    T: CompositionFunction + Send + Sync + 'static,
{
    async fn run(&self, request: v1::RunFunctionRequest) -> RpcResult<v1::RunFunctionResponse> {
        self.run_function(request).await.map_err(handle_error)
    }
}

fn handle_error(error: anyhow::Error) -> ErrorObjectOwned {
    tracing::error!("function failed: {:?}", error);
    ErrorObject::owned(
        ErrorCode::InternalError.code(),
        "Composition function encountered an error",
        Some(format!("{:#}", error)),
    )
}

/// The sending half of a JSON-RPC client connection over a byte stream,
/// typically the stdin of a function process.
pub struct ContentLengthSender<W> {
    inner: FramedWrite<W, ContentLengthCodec>,
}

impl<W: AsyncWrite> ContentLengthSender<W> {
    pub fn new(writer: W) -> Self {
        ContentLengthSender {
            inner: FramedWrite::new(writer, ContentLengthCodec::default()),
        }
    }
}

impl<W> TransportSenderT for ContentLengthSender<W>
where
    W: AsyncWrite + Unpin + Send + 'static,
{
    type Error = io::Error;

    async fn send(&mut self, msg: String) -> Result<(), io::Error> {
        self.inner.send(msg).await
    }

    async fn close(&mut self) -> Result<(), io::Error> {
        self.inner.close().await
    }
}

/// The receiving half of a JSON-RPC client connection over a byte stream,
/// typically the stdout of a function process.
pub struct ContentLengthReceiver<R> {
    inner: FramedRead<R, ContentLengthCodec>,
}

impl<R: AsyncRead> ContentLengthReceiver<R> {
    pub fn new(reader: R) -> Self {
        ContentLengthReceiver {
            inner: FramedRead::new(reader, ContentLengthCodec::default()),
        }
    }
}

impl<R> TransportReceiverT for ContentLengthReceiver<R>
where
    R: AsyncRead + Unpin + Send + 'static,
{
    type Error = io::Error;

    async fn receive(&mut self) -> Result<ReceivedMessage, io::Error> {
        match self.inner.next().await {
            Some(message) => message.map(ReceivedMessage::Text),
            None => Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "connection closed by the other side",
            )),
        }
    }
}

/// Headers larger than this are rejected rather than buffered indefinitely.
const MAX_HEADER_LEN: usize = 8 * 1024;

/// Largest accepted `Content-Length`.
const MAX_BODY_LEN: usize = 64 * 1024 * 1024;

const HEADER_END: &[u8] = b"\r\n\r\n";

/// Frames messages as `Content-Length: N\r\n\r\n` followed by N bytes of body.
///
/// Header names are case-insensitive; headers other than `Content-Length`
/// are ignored.
#[derive(Debug, Default, Clone, Copy)]
pub struct ContentLengthCodec {
    /// Body length of the frame whose header has already been consumed.
    pending: Option<usize>,
}

impl Decoder for ContentLengthCodec {
    type Item = String;
    type Error = io::Error;

    fn decode(&mut self, src: &mut BytesMut) -> Result<Option<String>, io::Error> {
        let len = match self.pending {
            Some(len) => len,
            None => {
                let Some(end) = src.windows(HEADER_END.len()).position(|w| w == HEADER_END)
                else {
                    if src.len() > MAX_HEADER_LEN {
                        return Err(invalid_data("message header too long"));
                    }
                    return Ok(None);
                };
                let len = parse_header(&src[..end])?;
                src.advance(end + HEADER_END.len());
                self.pending = Some(len);
                len
            }
        };

        if src.len() < len {
            src.reserve(len - src.len());
            return Ok(None);
        }
        self.pending = None;
        let body = src.split_to(len);
        String::from_utf8(body.to_vec())
            .map(Some)
            .map_err(|_| invalid_data("message body is not valid UTF-8"))
    }
}

impl Encoder<String> for ContentLengthCodec {
    type Error = io::Error;

    fn encode(&mut self, item: String, dst: &mut BytesMut) -> Result<(), io::Error> {
        let header = format!("Content-Length: {}\r\n\r\n", item.len());
        dst.reserve(header.len() + item.len());
        dst.put_slice(header.as_bytes());
        dst.put_slice(item.as_bytes());
        Ok(())
    }
}

fn parse_header(header: &[u8]) -> Result<usize, io::Error> {
    let header =
        std::str::from_utf8(header).map_err(|_| invalid_data("message header is not UTF-8"))?;
    let mut len = None;
    for line in header.split("\r\n") {
        let (name, value) = line
            .split_once(':')
            .ok_or_else(|| invalid_data(format!("malformed header line: {:?}", line)))?;
        if name.trim().eq_ignore_ascii_case("content-length") {
            let n = value
                .trim()
                .parse::<usize>()
                .map_err(|e| invalid_data(format!("invalid Content-Length {:?}: {}", value, e)))?;
            if n > MAX_BODY_LEN {
                return Err(invalid_data(format!(
                    "Content-Length {} exceeds the limit of {} bytes",
                    n, MAX_BODY_LEN
                )));
            }
            len = Some(n);
        }
    }
    len.ok_or_else(|| invalid_data("message header has no Content-Length"))
}

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}
