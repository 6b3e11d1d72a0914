//! Newline-delimited JSON over TCP.
//!
//! Every call opens its own connection and writes one request line. Unary
//! calls read one reply line; streams read one reply line per item until
//! the server closes the connection.

use std::marker::PhantomData;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines};
use tokio::net::TcpStream;

use crate::error::{ClientError, ClientResult, RpcError, RpcResult};
use crate::model::{CreateRunRequest, ResultEvent, RunId, RunInfo, StatisticsSnapshot};
use crate::rpc::{BoxPushStream, PingerRpc, PushStream};

const DIAL_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum Request {
    CreateRun(CreateRunRequest),
    StopRun { run_id: RunId },
    GetRunInfo { run_id: RunId },
    ListRuns,
    StreamResults { run_id: RunId },
    StreamStatistics { run_id: RunId },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCode {
    Cancelled,
    NotFound,
    InvalidArgument,
    Unavailable,
    Internal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Failure {
    pub code: FailureCode,
    pub message: String,
}

impl From<Failure> for RpcError {
    fn from(failure: Failure) -> Self {
        match failure.code {
            FailureCode::Cancelled => RpcError::Cancelled,
            FailureCode::NotFound => RpcError::NotFound(failure.message),
            FailureCode::InvalidArgument => RpcError::InvalidArgument(failure.message),
            FailureCode::Unavailable => RpcError::Unavailable(failure.message),
            FailureCode::Internal => RpcError::Remote(failure.message),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Reply<T> {
    Ok(T),
    Error(Failure),
}

impl<T> Reply<T> {
    fn into_result(self) -> RpcResult<T> {
        match self {
            Reply::Ok(value) => Ok(value),
            Reply::Error(failure) => Err(failure.into()),
        }
    }
}

fn decode<T: DeserializeOwned>(line: &str) -> RpcResult<T> {
    serde_json::from_str::<Reply<T>>(line)
        .map_err(|e| RpcError::Protocol(format!("bad reply: {e}")))?
        .into_result()
}

/// Stateless client; clones share nothing but the server address.
#[derive(Debug, Clone)]
pub struct JsonLineClient {
    address: String,
}

impl JsonLineClient {
    /// Checks that the server accepts connections before the session starts.
    pub async fn connect(address: impl Into<String>) -> ClientResult<Self> {
        let address = address.into();
        let dial = TcpStream::connect(address.as_str());
        match tokio::time::timeout(Duration::from_secs(DIAL_TIMEOUT_SECS), dial).await {
            Ok(Ok(_)) => Ok(Self { address }),
            Ok(Err(e)) => Err(ClientError::setup(format!("can not reach {address}: {e}"))),
            Err(_) => Err(ClientError::setup(format!("timed out dialing {address}"))),
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    async fn open(&self, request: &Request) -> RpcResult<Lines<BufReader<TcpStream>>> {
        let mut stream = TcpStream::connect(self.address.as_str()).await?;
        let mut line = serde_json::to_string(request)
            .map_err(|e| RpcError::Protocol(format!("can not encode request: {e}")))?;
        line.push('\n');
        stream.write_all(line.as_bytes()).await?;
        stream.flush().await?;
        Ok(BufReader::new(stream).lines())
    }

    async fn call<T: DeserializeOwned>(&self, request: Request) -> RpcResult<T> {
        let mut lines = self.open(&request).await?;
        match lines.next_line().await? {
            Some(line) => decode(&line),
            None => Err(RpcError::Protocol(
                "connection closed before reply".to_string(),
            )),
        }
    }

    async fn subscribe<T>(&self, request: Request) -> RpcResult<BoxPushStream<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        let lines = self.open(&request).await?;
        Ok(Box::new(JsonLineStream {
            lines,
            _item: PhantomData,
        }))
    }
}

struct JsonLineStream<T> {
    lines: Lines<BufReader<TcpStream>>,
    _item: PhantomData<fn() -> T>,
}

#[async_trait]
impl<T> PushStream<T> for JsonLineStream<T>
where
    T: DeserializeOwned + Send + 'static,
{
    async fn next_item(&mut self) -> RpcResult<Option<T>> {
        match self.lines.next_line().await? {
            Some(line) => decode(&line).map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl PingerRpc for JsonLineClient {
    async fn create_run(&self, request: CreateRunRequest) -> RpcResult<RunId> {
        self.call(Request::CreateRun(request)).await
    }

    async fn stop_run(&self, run_id: RunId) -> RpcResult<()> {
        self.call(Request::StopRun { run_id }).await
    }

    async fn get_run_info(&self, run_id: RunId) -> RpcResult<RunInfo> {
        self.call(Request::GetRunInfo { run_id }).await
    }

    async fn list_runs(&self) -> RpcResult<Vec<RunInfo>> {
        self.call(Request::ListRuns).await
    }

    async fn stream_results(&self, run_id: RunId) -> RpcResult<BoxPushStream<ResultEvent>> {
        self.subscribe(Request::StreamResults { run_id }).await
    }

    async fn stream_statistics(
        &self,
        run_id: RunId,
    ) -> RpcResult<BoxPushStream<StatisticsSnapshot>> {
        self.subscribe(Request::StreamStatistics { run_id }).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_are_tagged_by_method() {
        let json = serde_json::to_string(&Request::GetRunInfo { run_id: 3 }).expect("encode");
        assert_eq!(json, r#"{"method":"get_run_info","run_id":3}"#);
        let json = serde_json::to_string(&Request::ListRuns).expect("encode");
        assert_eq!(json, r#"{"method":"list_runs"}"#);
    }

    #[test]
    fn error_replies_map_to_rpc_errors() {
        let err = decode::<RunInfo>(r#"{"error":{"code":"not_found","message":"pinger 3"}}"#)
            .unwrap_err();
        assert_eq!(err, RpcError::NotFound("pinger 3".to_string()));
        let err = decode::<()>(r#"{"error":{"code":"cancelled","message":""}}"#).unwrap_err();
        assert!(err.is_cancelled());
    }

    #[test]
    fn garbage_is_a_protocol_error() {
        assert!(matches!(decode::<u32>("not json"), Err(RpcError::Protocol(_))));
    }

    #[test]
    fn unit_reply_decodes() {
        decode::<()>(r#"{"ok":null}"#).expect("unit reply");
        assert_eq!(decode::<u32>(r#"{"ok":17}"#), Ok(17));
    }
}
