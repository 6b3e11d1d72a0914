use chrono::{DateTime, Local};

use crate::model::{ResultEvent, RunInfo, UnixNanos};
use crate::output::DisplayItem;
use crate::registry::TargetRegistry;
use crate::style::Style;

pub const TIMESTAMP_FORMAT: &str = "%Y/%m/%d %H:%M:%S%.3f";
pub const LOG_FILE_TIMESTAMP_FORMAT: &str = "%Y%m%d_%H%M%S";

const RULE: &str = "================================================================";
const THIN_RULE: &str = "----------------------------------------------------------------";
const TARGET_INDENT: &str = "                        ";

pub fn format_instant(nanos: UnixNanos) -> String {
    DateTime::from_timestamp_nanos(nanos)
        .with_timezone(&Local)
        .format(TIMESTAMP_FORMAT)
        .to_string()
}

pub fn format_now() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

pub fn info_block(info: &RunInfo) -> String {
    let mut lines = vec![
        RULE.to_string(),
        format!("Description           : {}", info.description),
        "Targets               :".to_string(),
    ];
    for target in &info.targets {
        lines.push(format!("{TARGET_INDENT}IP     : {}", target.requested));
        lines.push(format!("{TARGET_INDENT}BinIP  : {}", target.resolved));
        lines.push(format!("{TARGET_INDENT}Comment: {}", target.comment));
        lines.push(format!("{TARGET_INDENT}----------------------------------------"));
    }
    lines.push(format!("IntervalMillisec      : {}", info.interval_millisec));
    lines.push(format!("TimeoutMillisec       : {}", info.timeout_millisec));
    lines.push(format!("StatisticsCountsNum   : {}", info.statistics_counts_num));
    lines.push(format!("StatisticsIntervalSec : {}", info.statistics_interval_sec));
    lines.push(format!(
        "StartUnixNanosec      : {}",
        format_instant(info.start_unix_nanosec)
    ));
    lines.push(format!(
        "ExpireUnixNanosec     : {}",
        format_instant(info.expire_unix_nanosec)
    ));
    lines.push(RULE.to_string());
    lines.join("\n")
}

/// Oldest run first; runs started at the same instant keep server order.
pub fn sort_by_start(runs: &mut [RunInfo]) {
    runs.sort_by_key(|run| run.start_unix_nanosec);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListStyle {
    Summary,
    Long,
    Short,
}

/// Renders an already sorted run list. The result ends with a line break.
pub fn run_list(runs: &[RunInfo], style: ListStyle) -> String {
    let mut out = String::new();
    match style {
        ListStyle::Summary => {
            out.push_str(RULE);
            out.push('\n');
            out.push_str("running Pingers (start order)\n");
            out.push_str(THIN_RULE);
            out.push('\n');
            out.push_str("PingerID : Description\n");
            for run in runs {
                out.push_str(&format!("{} : {}\n", run.id, run.description));
            }
            out.push_str(RULE);
            out.push('\n');
        }
        ListStyle::Long => {
            out.push_str(RULE);
            out.push('\n');
            for run in runs {
                out.push_str(&format!("PingerID          : {}\n", run.id));
                out.push_str(&format!("Description       : {}\n", run.description));
                out.push_str(&format!(
                    "StartUnixNanosec  : {}\n",
                    format_instant(run.start_unix_nanosec)
                ));
                out.push_str(&format!(
                    "ExpireUnixNanosec : {}\n",
                    format_instant(run.expire_unix_nanosec)
                ));
                out.push_str(RULE);
                out.push('\n');
            }
        }
        ListStyle::Short => {
            for run in runs {
                out.push_str(&format!("{}\n", run.id));
            }
        }
    }
    out
}

fn rtt_millis(send: UnixNanos, receive: UnixNanos) -> f64 {
    receive.saturating_sub(send) as f64 / 1_000_000.0
}

pub fn result_line(event: &ResultEvent, registry: &TargetRegistry) -> DisplayItem {
    let id = event.target_id();
    let address = registry.address(id);
    let comment = registry.comment(id);
    match event {
        ResultEvent::Received {
            sequence,
            send_unix_nanosec,
            receive_unix_nanosec,
            ..
        } => DisplayItem::styled(
            format!(
                "R O - {} - {:>15} - {:05} - {:7.2}ms - {}",
                format_instant(*receive_unix_nanosec),
                address,
                sequence,
                rtt_millis(*send_unix_nanosec, *receive_unix_nanosec),
                comment
            ),
            Style::Success,
        ),
        ResultEvent::ReceivedAfterTimeout {
            sequence,
            send_unix_nanosec,
            receive_unix_nanosec,
            ..
        } => DisplayItem::styled(
            format!(
                "R ? - {} - {:>15} - {:05} - {:7.2}ms after Timeout - {}",
                format_instant(*receive_unix_nanosec),
                address,
                sequence,
                rtt_millis(*send_unix_nanosec, *receive_unix_nanosec),
                comment
            ),
            Style::Warning,
        ),
        ResultEvent::TtlExceeded {
            sequence,
            receive_unix_nanosec,
            peer,
            ..
        } => DisplayItem::styled(
            format!(
                "R X - {} - {:>15} - {:05} - TTL Exceeded from {} - {}",
                format_instant(*receive_unix_nanosec),
                address,
                sequence,
                peer,
                comment
            ),
            Style::Failure,
        ),
        ResultEvent::Timeout {
            sequence,
            receive_unix_nanosec,
            ..
        } => DisplayItem::styled(
            format!(
                "R X - {} - {:>15} - {:05} - Timeout!! - {}",
                format_instant(*receive_unix_nanosec),
                address,
                sequence,
                comment
            ),
            Style::Failure,
        ),
    }
}
