//! Ordered output for many concurrent producers.
//!
//! Producers hold cheap `OutputSink` clones and push `DisplayItem`s into a
//! bounded queue. Exactly one `SinkWriter` owns the destination and writes
//! items in acceptance order.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;

use crate::cancel::CancelToken;
use crate::style::Style;

pub const OUTPUT_QUEUE_CAPACITY: usize = 200;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DisplayItem {
    pub text: String,
    pub style: Style,
    pub no_break: bool,
}

impl DisplayItem {
    pub fn line(text: impl Into<String>) -> Self {
        Self::styled(text, Style::Plain)
    }

    pub fn styled(text: impl Into<String>, style: Style) -> Self {
        Self {
            text: text.into(),
            style,
            no_break: false,
        }
    }

    /// Text printed without a trailing line break, e.g. a prompt.
    pub fn inline(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            style: Style::Plain,
            no_break: true,
        }
    }
}

#[derive(Clone, Debug)]
pub struct OutputSink {
    tx: mpsc::Sender<DisplayItem>,
    cancel: CancelToken,
}

pub struct SinkWriter {
    rx: mpsc::Receiver<DisplayItem>,
}

/// Creates a sink handle and the writer that must be run to drain it. The
/// handle stops waiting for queue room once `cancel` fires.
pub fn channel(capacity: usize, cancel: CancelToken) -> (OutputSink, SinkWriter) {
    let (tx, rx) = mpsc::channel(capacity);
    (OutputSink { tx, cancel }, SinkWriter { rx })
}

impl OutputSink {
    /// A handle on the same queue whose waits end when `cancel` fires.
    pub fn bound_to(&self, cancel: CancelToken) -> OutputSink {
        OutputSink {
            tx: self.tx.clone(),
            cancel,
        }
    }

    /// Queues one item, waiting while the queue is full. Items sent after
    /// the writer stopped or the handle's token fired are dropped.
    pub async fn emit(&self, item: DisplayItem) {
        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => log::debug!("output cancelled, item dropped"),
            sent = self.tx.send(item) => {
                if sent.is_err() {
                    log::debug!("output writer stopped, item dropped");
                }
            }
        }
    }

    /// Queues `item` only if there is room right now.
    pub fn try_emit(&self, item: DisplayItem) -> bool {
        self.tx.try_send(item).is_ok()
    }

    pub async fn line(&self, text: impl Into<String>) {
        self.emit(DisplayItem::line(text)).await;
    }

    pub async fn styled(&self, text: impl Into<String>, style: Style) {
        self.emit(DisplayItem::styled(text, style)).await;
    }

    pub async fn inline(&self, text: impl Into<String>) {
        self.emit(DisplayItem::inline(text)).await;
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

impl SinkWriter {
    /// Writes items until every sink handle is dropped or `cancel` fires.
    /// A write still pending at cancellation is abandoned; whatever is
    /// already queued is then written without watching the token, so the
    /// caller bounds that phase with its own deadline. Returns the
    /// destination so callers can inspect or reuse it.
    pub async fn run<W>(
        mut self,
        mut dest: W,
        color: bool,
        cancel: CancelToken,
    ) -> std::io::Result<W>
    where
        W: AsyncWrite + Unpin,
    {
        loop {
            let item = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                item = self.rx.recv() => item,
            };
            let Some(item) = item else {
                dest.flush().await?;
                return Ok(dest);
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    log::debug!("output write abandoned");
                    break;
                }
                written = write_item(&mut dest, &item, color) => written?,
            }
        }

        self.rx.close();
        while let Ok(item) = self.rx.try_recv() {
            write_item(&mut dest, &item, color).await?;
        }
        dest.flush().await?;
        Ok(dest)
    }
}

async fn write_item<W>(dest: &mut W, item: &DisplayItem, color: bool) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    let mut text = item.style.paint(&item.text, color);
    if !item.no_break {
        text.push('\n');
    }
    dest.write_all(text.as_bytes()).await?;
    dest.flush().await
}
