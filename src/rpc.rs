use async_trait::async_trait;

use crate::error::RpcResult;
use crate::model::{CreateRunRequest, ResultEvent, RunId, RunInfo, StatisticsSnapshot};

/// One server-push stream. `Ok(None)` marks the normal end of the stream.
#[async_trait]
pub trait PushStream<T>: Send {
    async fn next_item(&mut self) -> RpcResult<Option<T>>;
}

pub type BoxPushStream<T> = Box<dyn PushStream<T>>;

/// Methods of the remote pinger service. Implementations must tolerate
/// concurrent calls from independent tasks.
#[async_trait]
pub trait PingerRpc: Send + Sync {
    async fn create_run(&self, request: CreateRunRequest) -> RpcResult<RunId>;

    async fn stop_run(&self, run_id: RunId) -> RpcResult<()>;

    /// Fails with `RpcError::NotFound` once the run has stopped or expired.
    async fn get_run_info(&self, run_id: RunId) -> RpcResult<RunInfo>;

    async fn list_runs(&self) -> RpcResult<Vec<RunInfo>>;

    /// The server closes the stream when the run expires.
    async fn stream_results(&self, run_id: RunId) -> RpcResult<BoxPushStream<ResultEvent>>;

    async fn stream_statistics(
        &self,
        run_id: RunId,
    ) -> RpcResult<BoxPushStream<StatisticsSnapshot>>;
}
