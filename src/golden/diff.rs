//! Line diff for fixture mismatches.

use console::style;

/// Unchanged lines shown around every change.
const CONTEXT: usize = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change<'a> {
    Same(&'a str),
    Removed(&'a str),
    Added(&'a str),
}

impl Change<'_> {
    fn is_change(&self) -> bool {
        !matches!(self, Change::Same(_))
    }
}

/// Longest-common-subsequence diff of two texts, line by line.
pub fn diff_lines<'a>(expected: &'a str, actual: &'a str) -> Vec<Change<'a>> {
    let old: Vec<_> = expected.lines().collect();
    let new: Vec<_> = actual.lines().collect();

    // lcs[i][j] is the LCS length of old[i..] and new[j..]
    let mut lcs = vec![vec![0usize; new.len() + 1]; old.len() + 1];
    for i in (0..old.len()).rev() {
        for j in (0..new.len()).rev() {
            lcs[i][j] = if old[i] == new[j] {
                lcs[i + 1][j + 1] + 1
            } else {
                lcs[i + 1][j].max(lcs[i][j + 1])
            };
        }
    }

    let mut changes = Vec::with_capacity(old.len().max(new.len()));
    let (mut i, mut j) = (0, 0);

    while i < old.len() && j < new.len() {
        if old[i] == new[j] {
            changes.push(Change::Same(old[i]));
            i += 1;
            j += 1;
        } else if lcs[i + 1][j] >= lcs[i][j + 1] {
            changes.push(Change::Removed(old[i]));
            i += 1;
        } else {
            changes.push(Change::Added(new[j]));
            j += 1;
        }
    }

    changes.extend(old[i..].iter().map(|&line| Change::Removed(line)));
    changes.extend(new[j..].iter().map(|&line| Change::Added(line)));
    changes
}

/// Renders the diff of `expected` against `actual`, colored when the
/// terminal supports it.
pub fn render(expected: &str, actual: &str) -> String {
    render_with(expected, actual, console::colors_enabled())
}

pub(crate) fn render_with(expected: &str, actual: &str, color: bool) -> String {
    let changes = diff_lines(expected, actual);
    let mut out = String::new();

    if !changes.iter().any(Change::is_change) {
        out.push_str("(texts differ only in line endings or trailing newlines)\n");
        return out;
    }

    out.push_str("--- expected\n+++ actual\n");

    let visible = |index: usize| {
        let lo = index.saturating_sub(CONTEXT);
        let hi = (index + CONTEXT + 1).min(changes.len());
        changes[lo..hi].iter().any(Change::is_change)
    };

    let mut skipped = false;
    for (index, change) in changes.iter().enumerate() {
        if !visible(index) {
            skipped = true;
            continue;
        }

        if skipped {
            out.push_str(&paint("@@ ... @@", Paint::Cyan, color));
            out.push('\n');
            skipped = false;
        }

        let line = match change {
            Change::Same(line) => format!(" {line}"),
            Change::Removed(line) => paint(&format!("-{line}"), Paint::Red, color),
            Change::Added(line) => paint(&format!("+{line}"), Paint::Green, color),
        };
        out.push_str(&line);
        out.push('\n');
    }

    out
}

enum Paint {
    Red,
    Green,
    Cyan,
}

fn paint(text: &str, paint: Paint, color: bool) -> String {
    if !color {
        return text.to_string();
    }

    let styled = match paint {
        Paint::Red => style(text).red(),
        Paint::Green => style(text).green(),
        Paint::Cyan => style(text).cyan(),
    };

    styled.force_styling(true).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_diff_lines() {
        let changes = diff_lines("a\nb\nc\n", "a\nx\nc\nd\n");

        assert_eq!(
            changes,
            [
                Change::Same("a"),
                Change::Removed("b"),
                Change::Added("x"),
                Change::Same("c"),
                Change::Added("d"),
            ]
        );
    }

    #[test]
    fn test_diff_identical() {
        assert!(diff_lines("a\nb\n", "a\nb\n").iter().all(|c| !c.is_change()));
    }

    #[test]
    fn test_render_plain_with_context() {
        let expected: String = (0..20).map(|i| format!("line {i}\n")).collect();
        let actual = expected.replace("line 10\n", "line ten\n");

        let out = render_with(&expected, &actual, false);

        assert!(out.starts_with("--- expected\n+++ actual\n@@ ... @@\n line 7\n"));
        assert!(out.contains("-line 10\n+line ten\n"));
        assert!(out.ends_with(" line 12\n line 13\n"));
        assert!(!out.contains("line 0\n"));
    }

    #[test]
    fn test_render_trailing_newline_only() {
        let out = render_with("a\n", "a", false);
        assert!(out.contains("trailing newlines"));
    }
}
