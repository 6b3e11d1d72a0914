use std::path::Path;

use crate::error::{ClientError, ClientResult};
use crate::model::NewTarget;

fn is_separator(c: char) -> bool {
    c == '#' || c == ' ' || c == '\t'
}

/// Parses `address[ \t#]comment`. Returns `None` for blank lines and lines
/// that hold only a comment.
pub fn parse_target_line(line: &str) -> Option<NewTarget> {
    let line = line.trim_matches(|c: char| c == ' ' || c == '\t');
    let split = line.find(is_separator).unwrap_or(line.len());
    let (address, rest) = line.split_at(split);
    if address.is_empty() {
        return None;
    }
    Some(NewTarget::new(address, rest.trim_start_matches(is_separator)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SkippedLine {
    pub line_number: usize,
    pub content: String,
    pub reason: &'static str,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TargetList {
    pub targets: Vec<NewTarget>,
    pub skipped: Vec<SkippedLine>,
}

impl TargetList {
    pub fn parse(content: &str) -> Self {
        let mut list = TargetList::default();
        for (index, raw) in content.lines().enumerate() {
            let line = raw.trim_matches(|c: char| c == ' ' || c == '\t');
            if line.is_empty() {
                list.skipped.push(SkippedLine {
                    line_number: index + 1,
                    content: line.to_string(),
                    reason: "empty",
                });
                continue;
            }
            match parse_target_line(line) {
                Some(target) => list.targets.push(target),
                None => list.skipped.push(SkippedLine {
                    line_number: index + 1,
                    content: line.to_string(),
                    reason: "comment or format error",
                }),
            }
        }
        list
    }

    /// Reads and parses a list file, logging every skipped line.
    pub async fn load(path: &Path) -> ClientResult<Self> {
        let content = tokio::fs::read_to_string(path).await.map_err(|e| {
            ClientError::config(format!("can not open [{}]: {e}", path.display()))
        })?;
        let list = Self::parse(&content);
        for skipped in &list.skipped {
            log::info!(
                "[{}] line {:3} skip, {} \"{}\"",
                path.display(),
                skipped.line_number,
                skipped.reason,
                skipped.content
            );
        }
        Ok(list)
    }

    pub fn render(&self) -> String {
        self.targets
            .iter()
            .map(|t| format!("{}\t{}\n", t.address, t.comment))
            .collect()
    }
}
