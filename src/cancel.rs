//! Cooperative cancellation for the session's tasks.
//!
//! `CancelToken` forms a tree: cancelling a token cancels every token derived
//! from it, never its parent. `TaskGroup` is the join barrier the session
//! waits on during shutdown, and `InterruptRouter` decides whether an
//! interrupt aborts the foreground command or the whole session.

use std::future::Future;
use std::sync::{Arc, Mutex, Weak};

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::error::{RpcError, RpcResult};

struct TokenNode {
    cancelled: watch::Sender<bool>,
    children: Mutex<Vec<Weak<TokenNode>>>,
}

impl TokenNode {
    fn new() -> Arc<Self> {
        let (cancelled, _) = watch::channel(false);
        Arc::new(Self {
            cancelled,
            children: Mutex::new(Vec::new()),
        })
    }

    fn cancel(&self) {
        if self.cancelled.send_replace(true) {
            return;
        }
        let children = match self.children.lock() {
            Ok(mut children) => std::mem::take(&mut *children),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        };
        for child in children.iter().filter_map(Weak::upgrade) {
            child.cancel();
        }
    }
}

#[derive(Clone)]
pub struct CancelToken {
    node: Arc<TokenNode>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CancelToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CancelToken")
            .field("cancelled", &self.is_cancelled())
            .finish()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        Self {
            node: TokenNode::new(),
        }
    }

    /// Derives a token that is cancelled together with `self` but can also
    /// be cancelled on its own.
    pub fn child(&self) -> CancelToken {
        let child = TokenNode::new();
        {
            let mut children = match self.node.children.lock() {
                Ok(children) => children,
                Err(poisoned) => poisoned.into_inner(),
            };
            children.retain(|weak| weak.strong_count() > 0);
            children.push(Arc::downgrade(&child));
        }
        // The parent may have been cancelled before the child was registered.
        if self.is_cancelled() {
            child.cancel();
        }
        CancelToken { node: child }
    }

    pub fn cancel(&self) {
        self.node.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        *self.node.cancelled.borrow()
    }

    pub async fn cancelled(&self) {
        let mut rx = self.node.cancelled.subscribe();
        // The sender lives in `self.node`, so this only returns once cancelled.
        let _ = rx.wait_for(|cancelled| *cancelled).await;
    }

    /// Races `fut` against this token. A cancelled call reports
    /// `RpcError::Cancelled`.
    pub async fn run<F, T>(&self, fut: F) -> RpcResult<T>
    where
        F: Future<Output = RpcResult<T>>,
    {
        tokio::select! {
            biased;
            _ = self.cancelled() => Err(RpcError::Cancelled),
            result = fut => result,
        }
    }
}

struct TaskGuard {
    active: Arc<watch::Sender<usize>>,
}

impl Drop for TaskGuard {
    fn drop(&mut self) {
        self.active.send_modify(|active| *active -= 1);
    }
}

/// Counts live tasks so shutdown can wait for all of them.
#[derive(Clone)]
pub struct TaskGroup {
    active: Arc<watch::Sender<usize>>,
}

impl Default for TaskGroup {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGroup {
    pub fn new() -> Self {
        let (active, _) = watch::channel(0);
        Self {
            active: Arc::new(active),
        }
    }

    pub fn spawn<F>(&self, fut: F) -> JoinHandle<F::Output>
    where
        F: Future + Send + 'static,
        F::Output: Send + 'static,
    {
        self.active.send_modify(|active| *active += 1);
        let guard = TaskGuard {
            active: Arc::clone(&self.active),
        };
        tokio::spawn(async move {
            let _guard = guard;
            fut.await
        })
    }

    pub fn active(&self) -> usize {
        *self.active.borrow()
    }

    pub async fn wait_idle(&self) {
        let mut rx = self.active.subscribe();
        let _ = rx.wait_for(|active| *active == 0).await;
    }
}

/// Routes interrupts either to the command currently in the foreground or,
/// when there is none, to the session root.
#[derive(Clone)]
pub struct InterruptRouter {
    root: CancelToken,
    foreground: Arc<Mutex<Option<CancelToken>>>,
}

impl InterruptRouter {
    pub fn new(root: CancelToken) -> Self {
        Self {
            root,
            foreground: Arc::new(Mutex::new(None)),
        }
    }

    /// Registers a foreground command. Its token is a child of the root, so
    /// it also ends when the session ends. The registration is dropped with
    /// the returned guard.
    pub fn begin_foreground(&self) -> ForegroundGuard {
        let token = self.root.child();
        *self.slot() = Some(token.clone());
        ForegroundGuard {
            router: self.clone(),
            token,
        }
    }

    pub fn interrupt(&self) {
        let foreground = self.slot().take();
        match foreground {
            Some(token) => {
                log::debug!("interrupt: abort foreground command");
                token.cancel();
            }
            None => {
                log::debug!("interrupt: stop session");
                self.root.cancel();
            }
        }
    }

    fn slot(&self) -> std::sync::MutexGuard<'_, Option<CancelToken>> {
        match self.foreground.lock() {
            Ok(slot) => slot,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

pub struct ForegroundGuard {
    router: InterruptRouter,
    token: CancelToken,
}

impl ForegroundGuard {
    pub fn token(&self) -> &CancelToken {
        &self.token
    }
}

impl Drop for ForegroundGuard {
    fn drop(&mut self) {
        let mut slot = self.router.slot();
        let ours = slot
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(&current.node, &self.token.node));
        if ours {
            *slot = None;
        }
    }
}
