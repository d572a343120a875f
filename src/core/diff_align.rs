//! Side-by-side alignment of classified diff lines.
//!
//! Takes the flat line sequence produced by the diff backend and projects it
//! onto two row columns (current file on the left, proposed content on the
//! right) so a reviewer can read both versions in lockstep. Rows that exist
//! on only one side are balanced with placeholder rows on the other, so both
//! columns always have the same height.
//!
//! The scan is a single O(n) left-to-right pass with no backtracking.

use smallvec::SmallVec;

/// Classification of a single diff line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffLineKind {
    /// Present in both versions.
    Unchanged,
    /// Present only in the proposed version.
    Added,
    /// Present only in the current version.
    Removed,
    /// A single logical change already merged by the diff backend.
    Modified,
}

/// Byte range of an intra-line change, relative to the line's content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InlineSpan {
    pub start: usize,
    pub end: usize,
}

/// Inline spans are few per line; keep them off the heap in the common case.
pub type InlineSpans = SmallVec<[InlineSpan; 4]>;

/// One classified line from the diff backend. Immutable once produced.
#[derive(Debug, Clone, PartialEq)]
pub struct DiffLine {
    pub kind: DiffLineKind,
    pub content: String,
    /// 1-based line number in the current file, if the line exists there.
    pub old_line: Option<usize>,
    /// 1-based line number in the proposed content, if the line exists there.
    pub new_line: Option<usize>,
    /// Set on a `Removed` line whose replacement immediately follows as `Added`.
    pub paired: bool,
    pub inline: Option<InlineSpans>,
}

impl DiffLine {
    pub fn unchanged(content: impl Into<String>, old_line: usize, new_line: usize) -> Self {
        Self {
            kind: DiffLineKind::Unchanged,
            content: content.into(),
            old_line: Some(old_line),
            new_line: Some(new_line),
            paired: false,
            inline: None,
        }
    }

    pub fn added(content: impl Into<String>, new_line: usize) -> Self {
        Self {
            kind: DiffLineKind::Added,
            content: content.into(),
            old_line: None,
            new_line: Some(new_line),
            paired: false,
            inline: None,
        }
    }

    pub fn removed(content: impl Into<String>, old_line: usize, paired: bool) -> Self {
        Self {
            kind: DiffLineKind::Removed,
            content: content.into(),
            old_line: Some(old_line),
            new_line: None,
            paired,
            inline: None,
        }
    }
}

/// One display row on a single side of the aligned view.
#[derive(Debug, Clone, PartialEq)]
pub enum DiffRow {
    Line {
        content: String,
        /// Line number on this row's own side.
        line_no: Option<usize>,
        kind: DiffLineKind,
        inline: Option<InlineSpans>,
    },
    /// Blank row inserted purely to keep the two columns the same height.
    Placeholder,
}

impl DiffRow {
    pub fn is_placeholder(&self) -> bool {
        matches!(self, DiffRow::Placeholder)
    }

    fn from_line(line: &DiffLine, line_no: Option<usize>) -> Self {
        DiffRow::Line {
            content: line.content.clone(),
            line_no,
            kind: line.kind,
            inline: line.inline.clone(),
        }
    }
}

/// Aligned output for one hunk: two columns of equal height.
#[derive(Debug, Clone, PartialEq)]
pub struct AlignedHunk {
    pub original: Vec<DiffRow>,
    pub proposed: Vec<DiffRow>,
}

impl AlignedHunk {
    pub fn row_count(&self) -> usize {
        debug_assert_eq!(self.original.len(), self.proposed.len());
        self.original.len()
    }
}

/// Align a flat hunk into two equal-height row columns.
///
/// Rules, in priority order:
/// - `Unchanged` lands on both sides.
/// - `Removed` with the pairing flag, immediately followed by `Added`, forms
///   one modified row pair; both input lines are consumed.
/// - `Removed` or `Added` on their own get a placeholder on the other side.
/// - `Modified` lands only on the side(s) that carry a line number; a silent
///   side receives nothing for that input line.
///
/// A trailing padding pass balances the columns, so the function is total:
/// any well-formed input (including a pairing flag not followed by `Added`,
/// which falls through to the unpaired rule) yields equal-length output.
pub fn align(lines: &[DiffLine]) -> AlignedHunk {
    let mut original = Vec::with_capacity(lines.len());
    let mut proposed = Vec::with_capacity(lines.len());

    let mut i = 0;
    while i < lines.len() {
        let line = &lines[i];
        match line.kind {
            DiffLineKind::Unchanged => {
                original.push(DiffRow::from_line(line, line.old_line));
                proposed.push(DiffRow::from_line(line, line.new_line));
                i += 1;
            }
            DiffLineKind::Removed => {
                let partner = lines
                    .get(i + 1)
                    .filter(|next| line.paired && next.kind == DiffLineKind::Added);
                match partner {
                    Some(next) => {
                        // One logical modification shown as a single row pair.
                        original.push(DiffRow::from_line(line, line.old_line));
                        proposed.push(DiffRow::from_line(next, next.new_line));
                        i += 2;
                    }
                    None => {
                        original.push(DiffRow::from_line(line, line.old_line));
                        proposed.push(DiffRow::Placeholder);
                        i += 1;
                    }
                }
            }
            DiffLineKind::Added => {
                original.push(DiffRow::Placeholder);
                proposed.push(DiffRow::from_line(line, line.new_line));
                i += 1;
            }
            DiffLineKind::Modified => {
                // Pre-merged change: each side renders only if it has a line
                // number; the silent side gets no placeholder here.
                if line.old_line.is_some() {
                    original.push(DiffRow::from_line(line, line.old_line));
                }
                if line.new_line.is_some() {
                    proposed.push(DiffRow::from_line(line, line.new_line));
                }
                i += 1;
            }
        }
    }

    // Balance the columns.
    while original.len() < proposed.len() {
        original.push(DiffRow::Placeholder);
    }
    while proposed.len() < original.len() {
        proposed.push(DiffRow::Placeholder);
    }

    AlignedHunk { original, proposed }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn modified(
        content: &str,
        old_line: Option<usize>,
        new_line: Option<usize>,
    ) -> DiffLine {
        DiffLine {
            kind: DiffLineKind::Modified,
            content: content.to_string(),
            old_line,
            new_line,
            paired: false,
            inline: None,
        }
    }

    fn contents(rows: &[DiffRow]) -> Vec<Option<&str>> {
        rows.iter()
            .map(|r| match r {
                DiffRow::Line { content, .. } => Some(content.as_str()),
                DiffRow::Placeholder => None,
            })
            .collect()
    }

    #[test]
    fn paired_removal_and_addition_form_one_row() {
        let lines = vec![
            DiffLine::removed("old text", 1, true),
            DiffLine::added("new text", 1),
        ];
        let hunk = align(&lines);

        assert_eq!(hunk.row_count(), 1);
        assert_eq!(contents(&hunk.original), vec![Some("old text")]);
        assert_eq!(contents(&hunk.proposed), vec![Some("new text")]);
    }

    #[test]
    fn unpaired_removal_gets_placeholder() {
        let lines = vec![DiffLine::removed("gone", 3, false)];
        let hunk = align(&lines);

        assert_eq!(contents(&hunk.original), vec![Some("gone")]);
        assert!(hunk.proposed[0].is_placeholder());
    }

    #[test]
    fn lone_addition_gets_placeholder() {
        let lines = vec![DiffLine::added("fresh", 7)];
        let hunk = align(&lines);

        assert!(hunk.original[0].is_placeholder());
        assert_eq!(contents(&hunk.proposed), vec![Some("fresh")]);
    }

    #[test]
    fn pairing_flag_without_following_addition_falls_through() {
        // Malformed input: the flag promises a partner that never arrives.
        let lines = vec![
            DiffLine::removed("orphan", 1, true),
            DiffLine::unchanged("ctx", 2, 1),
        ];
        let hunk = align(&lines);

        assert_eq!(hunk.row_count(), 2);
        assert_eq!(contents(&hunk.original), vec![Some("orphan"), Some("ctx")]);
        assert_eq!(contents(&hunk.proposed), vec![None, Some("ctx")]);
    }

    #[test]
    fn mixed_hunk_aligns_in_order() {
        let lines = vec![
            DiffLine::unchanged("x", 1, 1),
            DiffLine::removed("y", 2, true),
            DiffLine::added("z", 2),
            DiffLine::unchanged("w", 3, 3),
        ];
        let hunk = align(&lines);

        assert_eq!(
            contents(&hunk.original),
            vec![Some("x"), Some("y"), Some("w")]
        );
        assert_eq!(
            contents(&hunk.proposed),
            vec![Some("x"), Some("z"), Some("w")]
        );
    }

    #[test]
    fn one_sided_modified_line_adds_nothing_to_silent_side() {
        // A Modified line with only an old line number contributes a row to
        // the original side only; the proposed side is balanced by the final
        // padding pass, not by a per-line placeholder.
        let lines = vec![
            modified("left only", Some(1), None),
            DiffLine::unchanged("ctx", 2, 1),
        ];
        let hunk = align(&lines);

        assert_eq!(hunk.original.len(), hunk.proposed.len());
        assert_eq!(
            contents(&hunk.original),
            vec![Some("left only"), Some("ctx")]
        );
        // Context stays row-aligned with itself; the pad lands at the end.
        assert_eq!(contents(&hunk.proposed), vec![Some("ctx"), None]);
    }

    #[test]
    fn two_sided_modified_line_lands_on_both_sides() {
        let lines = vec![modified("both", Some(4), Some(6))];
        let hunk = align(&lines);

        assert_eq!(contents(&hunk.original), vec![Some("both")]);
        assert_eq!(contents(&hunk.proposed), vec![Some("both")]);
    }

    #[test]
    fn columns_always_have_equal_height() {
        let lines = vec![
            DiffLine::added("a", 1),
            DiffLine::added("b", 2),
            modified("m", Some(1), None),
            DiffLine::removed("r", 2, false),
            DiffLine::unchanged("u", 3, 3),
        ];
        let hunk = align(&lines);
        assert_eq!(hunk.original.len(), hunk.proposed.len());
    }

    #[test]
    fn empty_input_yields_empty_columns() {
        let hunk = align(&[]);
        assert_eq!(hunk.row_count(), 0);
    }

    #[test]
    fn row_line_numbers_follow_their_side() {
        let lines = vec![DiffLine::unchanged("same", 10, 20)];
        let hunk = align(&lines);

        match (&hunk.original[0], &hunk.proposed[0]) {
            (
                DiffRow::Line { line_no: o, .. },
                DiffRow::Line { line_no: p, .. },
            ) => {
                assert_eq!(*o, Some(10));
                assert_eq!(*p, Some(20));
            }
            _ => panic!("expected real rows on both sides"),
        }
    }
}
