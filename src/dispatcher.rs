//! Command parsing and the handlers behind each command.
//!
//! A command word may be abbreviated to any prefix that names exactly one
//! command. Handlers report user mistakes on the output sink and RPC
//! failures in the log; neither ends the session.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Local;
use tokio::fs::OpenOptions;
use tokio::task::JoinHandle;

use crate::cancel::{CancelToken, TaskGroup};
use crate::config::ClientConfig;
use crate::consumer::{ResultDecorator, StatisticsDecorator, StreamConsumer, StreamEnd};
use crate::error::RpcError;
use crate::model::{CreateRunRequest, NewTarget, RunId, RunInfo};
use crate::output::{self, DisplayItem, OUTPUT_QUEUE_CAPACITY, OutputSink};
use crate::registry::TargetRegistry;
use crate::render::{self, ListStyle};
use crate::rpc::PingerRpc;
use crate::statistics::StatisticsEvaluator;
use crate::target_list::TargetList;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verb {
    Start,
    Stop,
    List,
    Info,
    Result,
    Count,
    Help,
    Quit,
    Exit,
}

const VERBS: [Verb; 9] = [
    Verb::Start,
    Verb::Stop,
    Verb::List,
    Verb::Info,
    Verb::Result,
    Verb::Count,
    Verb::Help,
    Verb::Quit,
    Verb::Exit,
];

impl Verb {
    pub fn name(self) -> &'static str {
        match self {
            Verb::Start => "start",
            Verb::Stop => "stop",
            Verb::List => "list",
            Verb::Info => "info",
            Verb::Result => "result",
            Verb::Count => "count",
            Verb::Help => "help",
            Verb::Quit => "quit",
            Verb::Exit => "exit",
        }
    }

    pub fn header(self) -> String {
        format!("[{}]", self.name())
    }

    fn interactive_only(self) -> bool {
        matches!(self, Verb::Quit | Verb::Exit)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputMode {
    Interactive,
    Batch,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum VerbMatch {
    Found(Verb),
    Ambiguous(Vec<&'static str>),
    Unknown,
}

/// Case-sensitive prefix match against the command words available in
/// `mode`.
pub fn match_verb(token: &str, mode: InputMode) -> VerbMatch {
    if token.is_empty() {
        return VerbMatch::Unknown;
    }
    if token == "?" && mode == InputMode::Interactive {
        return VerbMatch::Found(Verb::Help);
    }
    let candidates: Vec<Verb> = VERBS
        .iter()
        .copied()
        .filter(|verb| mode == InputMode::Interactive || !verb.interactive_only())
        .filter(|verb| verb.name().starts_with(token))
        .collect();
    match candidates.as_slice() {
        [] => VerbMatch::Unknown,
        [verb] => VerbMatch::Found(*verb),
        many => VerbMatch::Ambiguous(many.iter().map(|verb| verb.name()).collect()),
    }
}

fn match_list_style(token: &str) -> ListStyle {
    if !token.is_empty() && "long".starts_with(token) {
        ListStyle::Long
    } else if !token.is_empty() && "short".starts_with(token) {
        ListStyle::Short
    } else {
        ListStyle::Summary
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Start {
        list_file: Option<PathBuf>,
        description: Option<String>,
    },
    Stop {
        run: Option<String>,
    },
    /// `None` when no sub-selector was given.
    List(Option<ListStyle>),
    Info {
        run: Option<String>,
    },
    Result {
        run: Option<String>,
    },
    Count {
        run: Option<String>,
    },
    Help,
    Quit(Verb),
    Ambiguous {
        token: String,
        candidates: Vec<&'static str>,
    },
    Unknown(String),
}

pub fn parse_command(words: &[&str], mode: InputMode) -> Command {
    let Some((&first, args)) = words.split_first() else {
        return Command::Empty;
    };
    let arg = |n: usize| args.get(n).map(|s| s.to_string());
    match match_verb(first, mode) {
        VerbMatch::Found(verb) => match verb {
            Verb::Start => Command::Start {
                list_file: arg(0).map(PathBuf::from),
                description: arg(1),
            },
            Verb::Stop => Command::Stop { run: arg(0) },
            Verb::List => Command::List(args.first().map(|s| match_list_style(s))),
            Verb::Info => Command::Info { run: arg(0) },
            Verb::Result => Command::Result { run: arg(0) },
            Verb::Count => Command::Count { run: arg(0) },
            Verb::Help => Command::Help,
            Verb::Quit | Verb::Exit => Command::Quit(verb),
        },
        VerbMatch::Ambiguous(candidates) => Command::Ambiguous {
            token: first.to_string(),
            candidates,
        },
        VerbMatch::Unknown => Command::Unknown(first.to_string()),
    }
}

pub fn list_header(style: Option<ListStyle>) -> &'static str {
    match style {
        None | Some(ListStyle::Summary) => "[list]",
        Some(ListStyle::Long) => "[list long]",
        Some(ListStyle::Short) => "[list short]",
    }
}

pub fn help_text(mode: InputMode) -> &'static str {
    match mode {
        InputMode::Interactive => {
            "start  : start pinger\n\
             stop   : stop pinger\n\
             \n\
             list   : show pinger list\n\
             info   : show pinger info\n\
             result : show ping result\n\
             count  : show ping statistics\n\
             \n\
             quit   : exit client\n\
             exit   : exit client\n\
             \n\
             help   : (this) show help"
        }
        InputMode::Batch => {
            "[help]\n\
             start \"{target list path}\"                 : start pinger\n\
             start \"{target list path}\" \"{description}\" : start pinger\n\
             stop \"{pingerID}\"                          : stop pinger\n\
             \n\
             list       : show pinger list summary\n\
             list long  : show pinger list verbose\n\
             list short : show pinger id list\n\
             \n\
             info \"{pingerID}\"     : show pinger info\n\
             result \"{pingerID}\"   : show ping result\n\
             count \"{pingerID}\"    : show ping statistics\n\
             \n\
             help     : (this) show help"
        }
    }
}

pub fn ambiguous_text(token: &str, candidates: &[&str]) -> String {
    let mut text = format!("ambiguous command \"{token}\"\n");
    for candidate in candidates {
        text.push_str(&format!("\n{candidate}"));
    }
    text
}

pub fn unknown_text(token: &str) -> String {
    format!("unknown command \"{token}\"\n\nhelp : show commands")
}

/// Everything a handler needs. Cheap to clone; all parts are shared.
#[derive(Clone)]
pub struct CommandContext {
    pub rpc: Arc<dyn PingerRpc>,
    pub config: Arc<ClientConfig>,
    pub sink: OutputSink,
    /// Stream consumers and run loggers; the session waits for these on
    /// shutdown.
    pub tasks: TaskGroup,
    /// Session-wide token. Background work derives from it directly so an
    /// aborted foreground command leaves it running.
    pub root: CancelToken,
}

fn report_rpc_error(error: &RpcError) {
    if error.is_cancelled() {
        log::debug!("request cancelled");
    } else {
        log::error!("\"{error}\"");
    }
}

impl CommandContext {
    /// A copy whose terminal output stops waiting once `cancel` fires, so an
    /// aborted command never hangs on a full output queue.
    pub fn scoped(&self, cancel: &CancelToken) -> CommandContext {
        CommandContext {
            sink: self.sink.bound_to(cancel.clone()),
            ..self.clone()
        }
    }

    pub async fn parse_run_id(&self, raw: &str) -> Option<RunId> {
        match raw.trim().parse::<RunId>() {
            Ok(id) => Some(id),
            Err(_) => {
                log::error!("parse error : \"{raw}\"");
                self.sink
                    .line(format!("\"pingerID\" must be a number, got \"{raw}\""))
                    .await;
                None
            }
        }
    }

    pub async fn load_target_list(&self, path: &Path) -> Option<TargetList> {
        match TargetList::load(path).await {
            Ok(list) => Some(list),
            Err(e) => {
                log::error!("target list {e}");
                self.sink
                    .line(format!("can not open [{}]", path.display()))
                    .await;
                None
            }
        }
    }

    pub async fn start(
        &self,
        cancel: &CancelToken,
        description: String,
        targets: Vec<NewTarget>,
    ) {
        let config = &self.config;
        let request = CreateRunRequest {
            description,
            targets,
            stop_pinger_sec: config.stop_pinger_sec,
            interval_millisec: config.interval_millisec,
            timeout_millisec: config.timeout_millisec,
            statistics_counts_num: config.statistics_counts_num,
            statistics_interval_sec: config.statistics_interval_sec,
        };
        let id = match cancel.run(self.rpc.create_run(request)).await {
            Ok(id) => id,
            Err(e) => return report_rpc_error(&e),
        };
        self.sink.line(format!("start ID: {id}")).await;

        let info = match cancel.run(self.rpc.get_run_info(id)).await {
            Ok(info) => info,
            Err(e) => return report_rpc_error(&e),
        };
        self.sink.line(render::info_block(&info)).await;

        if let Some(dir) = &config.count_log_output_path {
            self.spawn_run_logger(dir, info).await;
        }
    }

    /// Streams the run's results into a timestamped file under `dir` until
    /// the run ends or the session stops.
    pub async fn spawn_run_logger(&self, dir: &Path, info: RunInfo) {
        let id = info.id;
        let file_name = format!(
            "{}_id{}.log",
            Local::now().format(render::LOG_FILE_TIMESTAMP_FORMAT),
            id
        );
        let path = dir.join(file_name);
        let file = match OpenOptions::new().create(true).append(true).open(&path).await {
            Ok(file) => file,
            Err(e) => {
                log::error!("logfile {}: {e}", path.display());
                self.sink
                    .line(format!("can not open log file [{}]", path.display()))
                    .await;
                return;
            }
        };

        let token = self.root.child();
        let (file_sink, writer) = output::channel(OUTPUT_QUEUE_CAPACITY, token.clone());
        file_sink.line(render::info_block(&info)).await;
        let consumer = StreamConsumer::new(
            ResultDecorator::new(TargetRegistry::new(&info.targets)),
            token.clone(),
            file_sink,
        );

        let rpc = Arc::clone(&self.rpc);
        let consumer_token = token.clone();
        self.tasks.spawn(async move {
            let end = consumer.open_and_drive(rpc.stream_results(id)).await;
            log::debug!("id {id} log stream ended: {end:?}");
            drop(consumer);
            consumer_token.cancel();
        });

        // Outlives the command that started it.
        let terminal = self.sink.bound_to(self.root.clone());
        let stop_path = path.clone();
        self.tasks.spawn(async move {
            if let Err(e) = writer.run(file, false, token.clone()).await {
                log::error!("logfile {}: {e}", stop_path.display());
            }
            token.cancel();
            log::info!("id {id} logging stop : {}", stop_path.display());
            terminal
                .line(format!("id {id} logging stop : {}", stop_path.display()))
                .await;
        });

        log::info!("id {id} logging start : {}", path.display());
        self.sink
            .line(format!("id {id} logging start : {}", path.display()))
            .await;
    }

    pub async fn stop(&self, cancel: &CancelToken, raw_id: &str) {
        let Some(id) = self.parse_run_id(raw_id).await else {
            return;
        };
        match cancel.run(self.rpc.stop_run(id)).await {
            Ok(()) => self.sink.line(format!("stop ID: {id}")).await,
            Err(e) => report_rpc_error(&e),
        }
    }

    pub async fn list(&self, cancel: &CancelToken, style: ListStyle) {
        let mut runs = match cancel.run(self.rpc.list_runs()).await {
            Ok(runs) => runs,
            Err(e) => return report_rpc_error(&e),
        };
        render::sort_by_start(&mut runs);
        self.sink
            .emit(DisplayItem::inline(render::run_list(&runs, style)))
            .await;
    }

    pub async fn info(&self, cancel: &CancelToken, raw_id: &str) {
        if let Some(info) = self.fetch_info(cancel, raw_id).await {
            self.sink.line(render::info_block(&info)).await;
        }
    }

    async fn fetch_info(&self, cancel: &CancelToken, raw_id: &str) -> Option<RunInfo> {
        let id = self.parse_run_id(raw_id).await?;
        match cancel.run(self.rpc.get_run_info(id)).await {
            Ok(info) => Some(info),
            Err(e) => {
                report_rpc_error(&e);
                None
            }
        }
    }

    /// Prints the run's info block and spawns a result consumer whose token
    /// derives from `cancel`. The caller decides whether to wait for it.
    pub async fn result(
        &self,
        cancel: &CancelToken,
        raw_id: &str,
    ) -> Option<JoinHandle<StreamEnd>> {
        let info = self.fetch_info(cancel, raw_id).await?;
        self.sink.line(render::info_block(&info)).await;

        let consumer = StreamConsumer::new(
            ResultDecorator::new(TargetRegistry::new(&info.targets)),
            cancel.child(),
            self.sink.clone(),
        );
        let rpc = Arc::clone(&self.rpc);
        let id = info.id;
        Some(
            self.tasks
                .spawn(async move { consumer.open_and_drive(rpc.stream_results(id)).await }),
        )
    }

    /// Like [`CommandContext::result`] for the statistics stream.
    pub async fn count(
        &self,
        cancel: &CancelToken,
        raw_id: &str,
    ) -> Option<JoinHandle<StreamEnd>> {
        let info = self.fetch_info(cancel, raw_id).await?;
        self.sink.line(render::info_block(&info)).await;

        let evaluator = match StatisticsEvaluator::new(
            info.statistics_counts_num,
            self.config.count_rate_threshold,
            TargetRegistry::new(&info.targets),
        ) {
            Ok(evaluator) => evaluator,
            Err(e) => {
                log::error!("{e}");
                return None;
            }
        };
        let consumer = StreamConsumer::new(
            StatisticsDecorator::new(evaluator),
            cancel.child(),
            self.sink.clone(),
        );
        let rpc = Arc::clone(&self.rpc);
        let id = info.id;
        Some(
            self.tasks
                .spawn(async move { consumer.open_and_drive(rpc.stream_statistics(id)).await }),
        )
    }
}
