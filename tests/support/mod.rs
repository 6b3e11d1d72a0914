#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::io;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll};
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncWrite, ReadBuf};
use tokio::sync::watch;

use pinger_client::model::{
    CreateRunRequest, ResultEvent, RunId, RunInfo, StatisticsSnapshot, TargetInfo,
};
use pinger_client::{BoxPushStream, PingerRpc, PushStream, RpcError, RpcResult, SessionSettings};

pub const START_NANOS: i64 = 1_700_000_000_000_000_000;

/// Yields its items, then either ends or stays open until dropped.
pub struct ScriptedStream<T> {
    items: VecDeque<T>,
    hold_open: bool,
}

impl<T> ScriptedStream<T> {
    pub fn new(items: Vec<T>, hold_open: bool) -> Self {
        Self {
            items: items.into(),
            hold_open,
        }
    }

    pub fn boxed(items: Vec<T>, hold_open: bool) -> BoxPushStream<T>
    where
        T: Send + 'static,
    {
        Box::new(Self::new(items, hold_open))
    }
}

#[async_trait]
impl<T: Send + 'static> PushStream<T> for ScriptedStream<T> {
    async fn next_item(&mut self) -> RpcResult<Option<T>> {
        if let Some(item) = self.items.pop_front() {
            return Ok(Some(item));
        }
        if self.hold_open {
            std::future::pending::<()>().await;
        }
        Ok(None)
    }
}

/// Fails on the first receive.
pub struct FailingStream(pub RpcError);

#[async_trait]
impl<T: Send + 'static> PushStream<T> for FailingStream {
    async fn next_item(&mut self) -> RpcResult<Option<T>> {
        Err(self.0.clone())
    }
}

#[derive(Default)]
struct FakeState {
    runs: BTreeMap<RunId, RunInfo>,
    next_id: RunId,
    created: Vec<CreateRunRequest>,
    stopped: Vec<RunId>,
    results: HashMap<RunId, Vec<ResultEvent>>,
    statistics: HashMap<RunId, Vec<StatisticsSnapshot>>,
}

/// In-memory pinger service. Streams without a script stay open forever.
pub struct FakePinger {
    state: Mutex<FakeState>,
    opened: watch::Sender<usize>,
}

impl FakePinger {
    pub fn new() -> Arc<Self> {
        let (opened, _) = watch::channel(0);
        Arc::new(Self {
            state: Mutex::new(FakeState {
                next_id: 1,
                ..FakeState::default()
            }),
            opened,
        })
    }

    fn state(&self) -> MutexGuard<'_, FakeState> {
        self.state.lock().expect("fake state")
    }

    pub fn add_run(&self, id: RunId, description: &str, start: i64) -> RunInfo {
        let info = RunInfo {
            id,
            description: description.to_string(),
            targets: vec![
                target(1, "10.0.0.1", "gateway"),
                target(2, "10.0.0.2", ""),
            ],
            interval_millisec: 1000,
            timeout_millisec: 1000,
            statistics_counts_num: 10,
            statistics_interval_sec: 1,
            start_unix_nanosec: start,
            expire_unix_nanosec: start + 3_600_000_000_000,
        };
        let mut state = self.state();
        state.runs.insert(id, info.clone());
        state.next_id = state.next_id.max(id + 1);
        info
    }

    /// The result stream of `run` yields `events` and then closes.
    pub fn script_results(&self, run: RunId, events: Vec<ResultEvent>) {
        self.state().results.insert(run, events);
    }

    pub fn script_statistics(&self, run: RunId, snapshots: Vec<StatisticsSnapshot>) {
        self.state().statistics.insert(run, snapshots);
    }

    pub fn created(&self) -> Vec<CreateRunRequest> {
        self.state().created.clone()
    }

    pub fn stopped(&self) -> Vec<RunId> {
        self.state().stopped.clone()
    }

    pub fn streams_opened(&self) -> usize {
        *self.opened.borrow()
    }

    pub async fn wait_for_streams(&self, count: usize) {
        let mut rx = self.opened.subscribe();
        tokio::time::timeout(Duration::from_secs(5), rx.wait_for(|n| *n >= count))
            .await
            .expect("streams opened in time")
            .expect("fake alive");
    }

    fn lookup(&self, run_id: RunId) -> RpcResult<RunInfo> {
        self.state()
            .runs
            .get(&run_id)
            .cloned()
            .ok_or_else(|| RpcError::NotFound(format!("pinger {run_id}")))
    }
}

pub fn target(id: u32, address: &str, comment: &str) -> TargetInfo {
    TargetInfo {
        id,
        requested: address.to_string(),
        resolved: address.to_string(),
        comment: comment.to_string(),
    }
}

#[async_trait]
impl PingerRpc for FakePinger {
    async fn create_run(&self, request: CreateRunRequest) -> RpcResult<RunId> {
        let mut state = self.state();
        let id = state.next_id;
        state.next_id += 1;
        let targets = request
            .targets
            .iter()
            .zip(1..)
            .map(|(t, n)| target(n, &t.address, &t.comment))
            .collect();
        state.runs.insert(
            id,
            RunInfo {
                id,
                description: request.description.clone(),
                targets,
                interval_millisec: request.interval_millisec,
                timeout_millisec: request.timeout_millisec,
                statistics_counts_num: request.statistics_counts_num,
                statistics_interval_sec: request.statistics_interval_sec,
                start_unix_nanosec: START_NANOS,
                expire_unix_nanosec: START_NANOS
                    + request.stop_pinger_sec as i64 * 1_000_000_000,
            },
        );
        state.created.push(request);
        Ok(id)
    }

    async fn stop_run(&self, run_id: RunId) -> RpcResult<()> {
        let mut state = self.state();
        match state.runs.remove(&run_id) {
            Some(_) => {
                state.stopped.push(run_id);
                Ok(())
            }
            None => Err(RpcError::NotFound(format!("pinger {run_id}"))),
        }
    }

    async fn get_run_info(&self, run_id: RunId) -> RpcResult<RunInfo> {
        self.lookup(run_id)
    }

    async fn list_runs(&self) -> RpcResult<Vec<RunInfo>> {
        Ok(self.state().runs.values().cloned().collect())
    }

    async fn stream_results(&self, run_id: RunId) -> RpcResult<BoxPushStream<ResultEvent>> {
        self.lookup(run_id)?;
        let script = self.state().results.get(&run_id).cloned();
        self.opened.send_modify(|n| *n += 1);
        Ok(match script {
            Some(events) => ScriptedStream::boxed(events, false),
            None => ScriptedStream::boxed(Vec::new(), true),
        })
    }

    async fn stream_statistics(
        &self,
        run_id: RunId,
    ) -> RpcResult<BoxPushStream<StatisticsSnapshot>> {
        self.lookup(run_id)?;
        let script = self.state().statistics.get(&run_id).cloned();
        self.opened.send_modify(|n| *n += 1);
        Ok(match script {
            Some(snapshots) => ScriptedStream::boxed(snapshots, false),
            None => ScriptedStream::boxed(Vec::new(), true),
        })
    }
}

/// An `AsyncWrite` whose bytes stay readable after the writer is gone.
#[derive(Clone, Default)]
pub struct SharedBuffer(Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().expect("buffer").clone()).expect("utf8 output")
    }
}

impl AsyncWrite for SharedBuffer {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        self.0.lock().expect("buffer").extend_from_slice(buf);
        Poll::Ready(Ok(buf.len()))
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Ready(Ok(()))
    }
}

pub fn settings() -> SessionSettings {
    let mut settings = SessionSettings::new("127.0.0.1:5555");
    settings.listen_for_signals = false;
    settings.shutdown_deadline = Duration::from_secs(2);
    settings
}

pub fn scratch_dir(name: &str) -> std::path::PathBuf {
    let dir = std::env::temp_dir().join(format!("pinger-client-{name}-{}", std::process::id()));
    let _ = std::fs::remove_dir_all(&dir);
    std::fs::create_dir_all(&dir).expect("scratch dir");
    dir
}

/// A destination that never accepts a byte, like a terminal paused with XOFF.
pub struct StalledOutput;

impl AsyncWrite for StalledOutput {
    fn poll_write(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        Poll::Pending
    }

    fn poll_flush(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }

    fn poll_shutdown(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        Poll::Pending
    }
}

/// Input whose first read fails.
pub struct BrokenInput;

impl AsyncRead for BrokenInput {
    fn poll_read(
        self: Pin<&mut Self>,
        _cx: &mut Context<'_>,
        _buf: &mut ReadBuf<'_>,
    ) -> Poll<io::Result<()>> {
        Poll::Ready(Err(io::Error::other("terminal gone")))
    }
}
