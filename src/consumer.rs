//! Drains one server-push stream into an output sink.
//!
//! Result and statistics streams share the same loop and differ only in the
//! `Decorator` that turns an item into display lines. The consumer's token is
//! the only cancellation source it watches; callers derive it from whichever
//! tokens should be able to end the stream.

use std::future::Future;

use crate::cancel::CancelToken;
use crate::error::{ClientResult, RpcResult};
use crate::model::{ResultEvent, StatisticsSnapshot};
use crate::output::{DisplayItem, OutputSink};
use crate::registry::TargetRegistry;
use crate::render;
use crate::rpc::BoxPushStream;
use crate::statistics::StatisticsEvaluator;

pub trait Decorator<T>: Send + Sync {
    fn decorate(&self, item: &T) -> ClientResult<Vec<DisplayItem>>;
}

pub struct ResultDecorator {
    registry: TargetRegistry,
}

impl ResultDecorator {
    pub fn new(registry: TargetRegistry) -> Self {
        Self { registry }
    }
}

impl Decorator<ResultEvent> for ResultDecorator {
    fn decorate(&self, item: &ResultEvent) -> ClientResult<Vec<DisplayItem>> {
        Ok(vec![render::result_line(item, &self.registry)])
    }
}

pub struct StatisticsDecorator {
    evaluator: StatisticsEvaluator,
}

impl StatisticsDecorator {
    pub fn new(evaluator: StatisticsEvaluator) -> Self {
        Self { evaluator }
    }
}

impl Decorator<StatisticsSnapshot> for StatisticsDecorator {
    fn decorate(&self, item: &StatisticsSnapshot) -> ClientResult<Vec<DisplayItem>> {
        let now = render::format_now();
        let mut lines = Vec::with_capacity(item.counts.len() + 1);
        lines.push(DisplayItem::line(""));
        for count in &item.counts {
            lines.push(self.evaluator.line(count.target_id, count.count, &now)?);
        }
        Ok(lines)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamEnd {
    /// The server closed the stream.
    Completed,
    Cancelled,
    Failed(String),
}

pub struct StreamConsumer<D> {
    decorator: D,
    cancel: CancelToken,
    sink: OutputSink,
}

impl<D> StreamConsumer<D> {
    pub fn new(decorator: D, cancel: CancelToken, sink: OutputSink) -> Self {
        Self {
            decorator,
            cancel,
            sink,
        }
    }

    /// Opens the stream with `open` (racing the token) and drives it.
    pub async fn open_and_drive<T, F>(&self, open: F) -> StreamEnd
    where
        D: Decorator<T>,
        T: Send,
        F: Future<Output = RpcResult<BoxPushStream<T>>>,
    {
        match self.cancel.run(open).await {
            Ok(stream) => self.drive(stream).await,
            Err(e) if e.is_cancelled() => StreamEnd::Cancelled,
            Err(e) => {
                log::error!("\"{e}\"");
                StreamEnd::Failed(e.to_string())
            }
        }
    }

    /// Receives until the stream ends, fails or the token is cancelled.
    /// Receive errors are logged, never written to the sink.
    pub async fn drive<T>(&self, mut stream: BoxPushStream<T>) -> StreamEnd
    where
        D: Decorator<T>,
        T: Send,
    {
        loop {
            let item = match self.cancel.run(stream.next_item()).await {
                Ok(Some(item)) => item,
                Ok(None) => {
                    log::debug!("stream closed by server");
                    return StreamEnd::Completed;
                }
                Err(e) if e.is_cancelled() => {
                    log::debug!("stream cancelled");
                    return StreamEnd::Cancelled;
                }
                Err(e) => {
                    log::error!("\"{e}\"");
                    return StreamEnd::Failed(e.to_string());
                }
            };

            let lines = match self.decorator.decorate(&item) {
                Ok(lines) => lines,
                Err(e) => {
                    log::error!("\"{e}\"");
                    return StreamEnd::Failed(e.to_string());
                }
            };
            for line in lines {
                tokio::select! {
                    biased;
                    _ = self.cancel.cancelled() => return StreamEnd::Cancelled,
                    _ = self.sink.emit(line) => {}
                }
            }
        }
    }
}
