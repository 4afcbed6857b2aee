//! Grouping of line matches into contiguous hunks for decorated rendering.

use crate::api::{EventContentMatch, EventLineMatch, Hunk, Location, Range};

/// Splits line-ordered matches into maximal runs of consecutive line numbers.
pub fn group_line_matches(matches: &[EventLineMatch]) -> Vec<&[EventLineMatch]> {
    let mut groups = Vec::new();
    let mut start = 0;
    for i in 1..matches.len() {
        if matches[i - 1].line_number.checked_add(1) != Some(matches[i].line_number) {
            groups.push(&matches[start..i]);
            start = i;
        }
    }
    if start < matches.len() {
        groups.push(&matches[start..]);
    }
    groups
}

/// Builds a hunk spanning `group`, converting each `(offset, length)`
/// segment into a range on its own line.
pub fn to_hunk(group: &[EventLineMatch], content: String) -> Hunk {
    let line_start = group.first().map(|m| m.line_number).unwrap_or(0);
    let matches = group
        .iter()
        .flat_map(|m| {
            m.offset_and_lengths.iter().map(move |[offset, length]| Range {
                start: Location::line_column(m.line_number, *offset),
                end: Location::line_column(m.line_number, offset + length),
            })
        })
        .collect();

    Hunk {
        line_start,
        line_count: group.len() as i32,
        content,
        matches,
    }
}

/// Renders the content of a hunk. Syntax highlighting lives behind this
/// trait; the crate ships only [`PlaintextDecorator`].
pub trait HunkDecorator: Send + Sync {
    fn render(&self, file: &EventContentMatch, group: &[EventLineMatch]) -> String;
}

/// Joins the matched lines of the group.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlaintextDecorator;

impl HunkDecorator for PlaintextDecorator {
    fn render(&self, _file: &EventContentMatch, group: &[EventLineMatch]) -> String {
        group
            .iter()
            .map(|m| m.line.as_str())
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// All hunks of a content match, rendered with `decorator`.
pub fn decorate(file: &EventContentMatch, decorator: &dyn HunkDecorator) -> Vec<Hunk> {
    let mut lines = file.resolved_line_matches();
    lines.sort_by_key(|m| m.line_number);
    group_line_matches(&lines)
        .into_iter()
        .map(|group| to_hunk(group, decorator.render(file, group)))
        .collect()
}
