//! Diff backend adapter built on the `similar` crate.
//!
//! Turns an (old, new) text pair into the flat classified line sequence the
//! aligner consumes. Consecutive removal/insertion runs are interleaved and
//! flagged as pairs so the aligner can show them as single modified rows,
//! and paired lines carry byte-level inline change spans computed from a
//! character diff of the pair.

use itertools::Itertools;
use similar::{ChangeTag, TextDiff};
use smallvec::SmallVec;

use crate::core::diff_align::{DiffLine, DiffLineKind, InlineSpan, InlineSpans};

/// Compute the classified line sequence between two text versions.
///
/// Output ordering matches the underlying diff: unchanged runs as-is, change
/// runs interleaved as removed/added pairs first (flagged `paired`), then any
/// unpaired leftovers from the longer run.
pub fn diff_lines(old: &str, new: &str) -> Vec<DiffLine> {
    let diff = TextDiff::from_lines(old, new);

    // Materialize once so runs can be grouped without re-walking the diff.
    let changes: Vec<(ChangeTag, String, Option<usize>, Option<usize>)> = diff
        .iter_all_changes()
        .map(|change| {
            let text = change
                .value()
                .trim_end_matches('\n')
                .trim_end_matches('\r')
                .to_string();
            (
                change.tag(),
                text,
                change.old_index().map(|i| i + 1),
                change.new_index().map(|i| i + 1),
            )
        })
        .collect();

    let mut lines = Vec::with_capacity(changes.len());
    let mut pending_removed: Vec<(String, usize)> = Vec::new();

    for (tag, group) in &changes.iter().chunk_by(|entry| entry.0) {
        match tag {
            ChangeTag::Equal => {
                flush_unpaired(&mut lines, &mut pending_removed);
                for (_, text, old_line, new_line) in group {
                    lines.push(DiffLine {
                        kind: DiffLineKind::Unchanged,
                        content: text.clone(),
                        old_line: *old_line,
                        new_line: *new_line,
                        paired: false,
                        inline: None,
                    });
                }
            }
            ChangeTag::Delete => {
                flush_unpaired(&mut lines, &mut pending_removed);
                pending_removed = group
                    .map(|(_, text, old_line, _)| (text.clone(), old_line.unwrap_or(0)))
                    .collect();
            }
            ChangeTag::Insert => {
                let added: Vec<(String, usize)> = group
                    .map(|(_, text, _, new_line)| (text.clone(), new_line.unwrap_or(0)))
                    .collect();
                emit_change_run(&mut lines, std::mem::take(&mut pending_removed), added);
            }
        }
    }
    flush_unpaired(&mut lines, &mut pending_removed);

    lines
}

/// Emit a removal run followed by an insertion run, pairing them line-wise.
fn emit_change_run(
    lines: &mut Vec<DiffLine>,
    removed: Vec<(String, usize)>,
    added: Vec<(String, usize)>,
) {
    let paired = removed.len().min(added.len());

    for i in 0..paired {
        let (old_text, old_line) = &removed[i];
        let (new_text, new_line) = &added[i];
        let (old_spans, new_spans) = inline_spans(old_text, new_text);

        lines.push(DiffLine {
            kind: DiffLineKind::Removed,
            content: old_text.clone(),
            old_line: Some(*old_line),
            new_line: None,
            paired: true,
            inline: non_empty(old_spans),
        });
        lines.push(DiffLine {
            kind: DiffLineKind::Added,
            content: new_text.clone(),
            old_line: None,
            new_line: Some(*new_line),
            paired: false,
            inline: non_empty(new_spans),
        });
    }

    for (text, old_line) in removed.into_iter().skip(paired) {
        lines.push(DiffLine::removed(text, old_line, false));
    }
    for (text, new_line) in added.into_iter().skip(paired) {
        lines.push(DiffLine::added(text, new_line));
    }
}

fn flush_unpaired(lines: &mut Vec<DiffLine>, pending: &mut Vec<(String, usize)>) {
    for (text, old_line) in pending.drain(..) {
        lines.push(DiffLine::removed(text, old_line, false));
    }
}

fn non_empty(spans: InlineSpans) -> Option<InlineSpans> {
    if spans.is_empty() { None } else { Some(spans) }
}

/// Character-level diff of a paired line, reduced to changed byte ranges on
/// each side. Adjacent ranges are merged.
fn inline_spans(old: &str, new: &str) -> (InlineSpans, InlineSpans) {
    let diff = TextDiff::from_chars(old, new);
    let mut old_spans: InlineSpans = SmallVec::new();
    let mut new_spans: InlineSpans = SmallVec::new();
    let mut old_pos = 0usize;
    let mut new_pos = 0usize;

    for change in diff.iter_all_changes() {
        let len = change.value().len();
        match change.tag() {
            ChangeTag::Equal => {
                old_pos += len;
                new_pos += len;
            }
            ChangeTag::Delete => {
                push_span(&mut old_spans, old_pos, old_pos + len);
                old_pos += len;
            }
            ChangeTag::Insert => {
                push_span(&mut new_spans, new_pos, new_pos + len);
                new_pos += len;
            }
        }
    }

    (old_spans, new_spans)
}

fn push_span(spans: &mut InlineSpans, start: usize, end: usize) {
    if let Some(last) = spans.last_mut()
        && last.end == start
    {
        last.end = end;
        return;
    }
    spans.push(InlineSpan { start, end });
}
