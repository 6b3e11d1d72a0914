//! The session orchestrator.
//!
//! A session moves `Running -> Draining -> Terminated`. It owns the root
//! cancellation token, the task groups the shutdown waits on, the interrupt
//! router and the terminal output sink. Interactive sessions read commands
//! from a line source; batch sessions execute one command and then wait for
//! whatever it left running.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite};
use tokio::sync::{mpsc, watch};

use crate::cancel::{CancelToken, InterruptRouter, TaskGroup};
use crate::config::ClientConfig;
use crate::dispatcher::{self, Command, CommandContext, InputMode, Verb};
use crate::output::{self, DisplayItem, OUTPUT_QUEUE_CAPACITY};
use crate::render::ListStyle;
use crate::rpc::PingerRpc;
use crate::target_list::parse_target_line;

pub const SHUTDOWN_DEADLINE: Duration = Duration::from_secs(15);
const INPUT_QUEUE_CAPACITY: usize = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Running,
    Draining,
    Terminated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    /// Every task finished before the deadline.
    Clean,
    /// The deadline passed with tasks still running.
    Forced,
}

#[derive(Debug, Clone)]
pub struct SessionSettings {
    /// Shown in the interactive prompt.
    pub server_label: String,
    pub shutdown_deadline: Duration,
    pub color: bool,
    /// Install the Ctrl-C listener. Tests drive interrupts by hand.
    pub listen_for_signals: bool,
}

impl SessionSettings {
    pub fn new(server_label: impl Into<String>) -> Self {
        Self {
            server_label: server_label.into(),
            shutdown_deadline: SHUTDOWN_DEADLINE,
            color: false,
            listen_for_signals: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Quit,
}

pub struct Session {
    ctx: CommandContext,
    settings: SessionSettings,
    services: TaskGroup,
    interrupts: InterruptRouter,
    state: watch::Sender<SessionState>,
}

impl Session {
    /// Starts the output writer on `dest`; must be called inside a runtime.
    pub fn new<W>(
        rpc: Arc<dyn PingerRpc>,
        config: ClientConfig,
        settings: SessionSettings,
        dest: W,
    ) -> Self
    where
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let root = CancelToken::new();
        let services = TaskGroup::new();
        let (sink, writer) = output::channel(OUTPUT_QUEUE_CAPACITY, root.clone());

        let writer_token = root.clone();
        let color = settings.color;
        services.spawn(async move {
            if let Err(e) = writer.run(dest, color, writer_token).await {
                log::error!("output: {e}");
            }
        });

        let (state, _) = watch::channel(SessionState::Running);
        Self {
            ctx: CommandContext {
                rpc,
                config: Arc::new(config),
                sink,
                tasks: TaskGroup::new(),
                root: root.clone(),
            },
            settings,
            services,
            interrupts: InterruptRouter::new(root),
            state,
        }
    }

    /// Handle for delivering interrupts as the OS listener would.
    pub fn interrupt_handle(&self) -> InterruptRouter {
        self.interrupts.clone()
    }

    pub fn state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    pub async fn run_interactive<R>(self, input: R) -> Termination
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        self.spawn_signal_listener();
        let lines = self.spawn_line_reader(input);
        self.interactive(lines).await;
        self.drain().await
    }

    pub async fn run_batch(self, args: &[String]) -> Termination {
        self.spawn_signal_listener();
        let words: Vec<&str> = args.iter().map(String::as_str).collect();
        let command = dispatcher::parse_command(&words, InputMode::Batch);
        let cancel = self.ctx.root.child();
        self.execute_batch(command, &cancel).await;

        // Loggers and streams spawned by the command keep the session
        // alive until they end or an interrupt arrives.
        tokio::select! {
            _ = self.ctx.root.cancelled() => {}
            _ = self.ctx.tasks.wait_idle() => {}
        }
        self.drain().await
    }

    fn spawn_signal_listener(&self) {
        if !self.settings.listen_for_signals {
            return;
        }
        let router = self.interrupts.clone();
        let cancel = self.ctx.root.clone();
        let sink = self.ctx.sink.clone();
        self.services.spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    received = tokio::signal::ctrl_c() => {
                        if let Err(e) = received {
                            log::warn!("can not listen for interrupts: {e}");
                            break;
                        }
                        log::debug!("request stop, SIGINT");
                        router.interrupt();
                        // Never wait here: the next interrupt must get through.
                        sink.try_emit(DisplayItem::line(""));
                    }
                }
            }
        });
    }

    fn spawn_line_reader<R>(&self, input: R) -> mpsc::Receiver<String>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let (tx, rx) = mpsc::channel(INPUT_QUEUE_CAPACITY);
        let cancel = self.ctx.root.clone();
        self.services.spawn(async move {
            let mut lines = input.lines();
            log::debug!("start line reader");
            loop {
                let next = tokio::select! {
                    _ = cancel.cancelled() => break,
                    next = lines.next_line() => next,
                };
                let line = match next {
                    Ok(Some(line)) => line,
                    Ok(None) => {
                        log::debug!("input closed");
                        break;
                    }
                    Err(e) => {
                        log::error!("input: {e}");
                        break;
                    }
                };
                let line = line.trim_matches(|c: char| c == ' ' || c == '\t').to_string();
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    sent = tx.send(line) => if sent.is_err() { break },
                }
            }
            log::debug!("finish line reader");
        });
        rx
    }

    async fn interactive(&self, mut lines: mpsc::Receiver<String>) {
        log::debug!("start interactive");
        let prompt = format!("\n{}> ", self.settings.server_label);
        loop {
            self.ctx.sink.inline(prompt.as_str()).await;
            let line = tokio::select! {
                biased;
                _ = self.ctx.root.cancelled() => {
                    log::debug!("stop interactive, session cancelled");
                    break;
                }
                line = lines.recv() => match line {
                    Some(line) => line,
                    None => {
                        log::debug!("stop interactive, input closed");
                        break;
                    }
                },
            };
            let words: Vec<&str> = line.split_whitespace().collect();
            let command = dispatcher::parse_command(&words, InputMode::Interactive);
            if self.execute_interactive(command, &mut lines).await == Flow::Quit {
                break;
            }
        }
        log::debug!("finish interactive");
    }

    async fn execute_interactive(
        &self,
        command: Command,
        lines: &mut mpsc::Receiver<String>,
    ) -> Flow {
        let foreground = self.interrupts.begin_foreground();
        let cancel = foreground.token();
        let ctx = &self.ctx.scoped(cancel);

        match command {
            Command::Empty => log::debug!("input empty"),
            Command::Start {
                list_file,
                description,
            } => {
                ctx.sink.line("[start]").await;
                let (description, targets) = match list_file {
                    Some(path) => {
                        let Some(list) = ctx.load_target_list(&path).await else {
                            return Flow::Continue;
                        };
                        let description =
                            description.unwrap_or_else(|| path.display().to_string());
                        (description, list.targets)
                    }
                    None => {
                        let Some(description) = ask(ctx, "Description? ", lines, cancel).await
                        else {
                            return Flow::Continue;
                        };
                        let mut targets = Vec::new();
                        loop {
                            let Some(line) =
                                ask(ctx, "target [IP Comment]? ", lines, cancel).await
                            else {
                                return Flow::Continue;
                            };
                            if line.is_empty() {
                                break;
                            }
                            match parse_target_line(&line) {
                                Some(target) => targets.push(target),
                                None => ctx.sink.line(format!("skip \"{line}\"")).await,
                            }
                        }
                        (description, targets)
                    }
                };
                ctx.start(cancel, description, targets).await;
            }
            Command::Stop { run } => {
                ctx.sink.line("[stop]").await;
                if let Some(run) = ask_run_id(ctx, run, lines, cancel).await {
                    ctx.stop(cancel, &run).await;
                }
            }
            Command::List(style) => {
                ctx.sink.line(dispatcher::list_header(style)).await;
                ctx.list(cancel, style.unwrap_or(ListStyle::Long)).await;
            }
            Command::Info { run } => {
                ctx.sink.line("[info]").await;
                if let Some(run) = ask_run_id(ctx, run, lines, cancel).await {
                    ctx.info(cancel, &run).await;
                }
            }
            Command::Result { run } => {
                ctx.sink.line("[result]").await;
                if let Some(run) = ask_run_id(ctx, run, lines, cancel).await {
                    if let Some(consumer) = ctx.result(cancel, &run).await {
                        wait_foreground(consumer).await;
                    }
                }
            }
            Command::Count { run } => {
                ctx.sink.line("[count]").await;
                if let Some(run) = ask_run_id(ctx, run, lines, cancel).await {
                    if let Some(consumer) = ctx.count(cancel, &run).await {
                        wait_foreground(consumer).await;
                    }
                }
            }
            Command::Help => {
                ctx.sink.line(Verb::Help.header()).await;
                ctx.sink
                    .line(dispatcher::help_text(InputMode::Interactive))
                    .await;
            }
            Command::Quit(verb) => {
                ctx.sink.line(verb.header()).await;
                return Flow::Quit;
            }
            Command::Ambiguous { token, candidates } => {
                ctx.sink
                    .line(dispatcher::ambiguous_text(&token, &candidates))
                    .await;
            }
            Command::Unknown(token) => ctx.sink.line(dispatcher::unknown_text(&token)).await,
        }
        Flow::Continue
    }

    async fn execute_batch(&self, command: Command, cancel: &CancelToken) {
        let ctx = &self.ctx;
        const MISSING_RUN_ID: &str = "Please enter \"pingerID\"";

        match command {
            Command::Empty | Command::Quit(_) => {}
            Command::Start {
                list_file,
                description,
            } => {
                ctx.sink.line("[start]").await;
                let Some(path) = list_file else {
                    ctx.sink.line("Please enter \"target list path\"").await;
                    return;
                };
                let Some(list) = ctx.load_target_list(&path).await else {
                    return;
                };
                let description = description.unwrap_or_else(|| path.display().to_string());
                ctx.start(cancel, description, list.targets).await;
            }
            Command::Stop { run } => {
                ctx.sink.line("[stop]").await;
                match run {
                    Some(run) => ctx.stop(cancel, &run).await,
                    None => ctx.sink.line(MISSING_RUN_ID).await,
                }
            }
            Command::List(style) => {
                ctx.sink.line(dispatcher::list_header(style)).await;
                ctx.list(cancel, style.unwrap_or(ListStyle::Summary)).await;
            }
            Command::Info { run } => {
                ctx.sink.line("[info]").await;
                match run {
                    Some(run) => ctx.info(cancel, &run).await,
                    None => ctx.sink.line(MISSING_RUN_ID).await,
                }
            }
            // Stream consumers run in the background; `run_batch` waits for them.
            Command::Result { run } => {
                ctx.sink.line("[result]").await;
                match run {
                    Some(run) => {
                        ctx.result(cancel, &run).await;
                    }
                    None => ctx.sink.line(MISSING_RUN_ID).await,
                }
            }
            Command::Count { run } => {
                ctx.sink.line("[count]").await;
                match run {
                    Some(run) => {
                        ctx.count(cancel, &run).await;
                    }
                    None => ctx.sink.line(MISSING_RUN_ID).await,
                }
            }
            Command::Help => ctx.sink.line(dispatcher::help_text(InputMode::Batch)).await,
            Command::Ambiguous { token, candidates } => {
                ctx.sink
                    .line(dispatcher::ambiguous_text(&token, &candidates))
                    .await;
            }
            Command::Unknown(token) => ctx.sink.line(dispatcher::unknown_text(&token)).await,
        }
    }

    /// Cancels everything and waits for all tasks, at most until the
    /// shutdown deadline.
    async fn drain(self) -> Termination {
        self.state.send_replace(SessionState::Draining);
        self.ctx.root.cancel();

        let deadline = self.settings.shutdown_deadline;
        log::info!("waiting for termination ({}sec)", deadline.as_secs());
        let all_tasks = async {
            self.ctx.tasks.wait_idle().await;
            self.services.wait_idle().await;
        };
        let termination = match tokio::time::timeout(deadline, all_tasks).await {
            Ok(()) => {
                log::info!("terminated successfully");
                Termination::Clean
            }
            Err(_) => {
                log::warn!(
                    "forced termination, {} task(s) still running",
                    self.ctx.tasks.active() + self.services.active()
                );
                Termination::Forced
            }
        };
        self.state.send_replace(SessionState::Terminated);
        termination
    }
}

/// Prints `question` and waits for one line, unless `cancel` fires or the
/// input closes first.
async fn ask(
    ctx: &CommandContext,
    question: &str,
    lines: &mut mpsc::Receiver<String>,
    cancel: &CancelToken,
) -> Option<String> {
    ctx.sink.inline(question).await;
    tokio::select! {
        biased;
        _ = cancel.cancelled() => None,
        line = lines.recv() => line,
    }
}

async fn ask_run_id(
    ctx: &CommandContext,
    given: Option<String>,
    lines: &mut mpsc::Receiver<String>,
    cancel: &CancelToken,
) -> Option<String> {
    if given.is_some() {
        return given;
    }
    ctx.list(cancel, ListStyle::Summary).await;
    ask(ctx, "PingerID? ", lines, cancel).await
}

async fn wait_foreground(consumer: tokio::task::JoinHandle<crate::consumer::StreamEnd>) {
    match consumer.await {
        Ok(end) => log::debug!("foreground stream ended: {end:?}"),
        Err(e) => log::error!("stream consumer failed: {e}"),
    }
}
