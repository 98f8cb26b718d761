//! Three-way text merge
//!
//! Reconciles two divergent edits (local, remote) of a shared ancestor
//! (base). The edit scripts base->local and base->remote are computed
//! independently, turned into context-anchored hunks, and both applied onto
//! the base with a patch algorithm tolerant of approximate matching: a hunk
//! that no longer sits at its expected offset is relocated to the closest
//! occurrence of its context, and when surrounding context was itself
//! touched by the other side the anchor is progressively shortened until it
//! matches. Hunks that cannot be placed at all are dropped, so the merge
//! always yields *some* text and never fails — truly overlapping edits to
//! the same region may silently pick one side.

use dissimilar::{diff, Chunk};

/// How many characters of surrounding unchanged text anchor each hunk.
const CONTEXT_CHARS: usize = 16;

/// One replacement extracted from an edit script: at roughly `offset` in
/// the source, `deleted` becomes `inserted`, anchored by the unchanged
/// `before`/`after` context around it.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Hunk {
    offset: usize,
    before: String,
    deleted: String,
    inserted: String,
    after: String,
}

/// Pure three-way text merge over single text blobs.
#[derive(Debug, Clone, Copy)]
pub struct MergeEngine {
    context: usize,
}

impl MergeEngine {
    pub const fn new() -> Self {
        Self {
            context: CONTEXT_CHARS,
        }
    }

    /// Merge `local` and `remote`, both derived from `base`.
    ///
    /// Identities: `merge(b, b, b) == b`, `merge(b, l, b) == l`,
    /// `merge(b, b, r) == r`. Identical edits made on both sides apply
    /// once. Conflicting edits resolve best-effort rather than erroring.
    pub fn merge(&self, base: &str, local: &str, remote: &str) -> String {
        let local_hunks = self.hunks(base, local);
        let mut remote_hunks = self.hunks(base, remote);
        // The same edit arriving from both sides must not double-apply.
        remote_hunks.retain(|hunk| !local_hunks.contains(hunk));

        let merged = apply(base, &local_hunks, self.context);
        apply(&merged, &remote_hunks, self.context)
    }

    /// Convert the edit script `source -> target` into context-anchored
    /// hunks.
    fn hunks(&self, source: &str, target: &str) -> Vec<Hunk> {
        let chunks = diff(source, target);
        let mut hunks = Vec::new();
        let mut pos = 0usize;
        let mut index = 0usize;

        while index < chunks.len() {
            if let Chunk::Equal(text) = chunks[index] {
                pos += text.len();
                index += 1;
                continue;
            }

            let start = pos;
            let mut deleted = String::new();
            let mut inserted = String::new();
            while index < chunks.len() {
                match chunks[index] {
                    Chunk::Delete(text) => {
                        deleted.push_str(text);
                        pos += text.len();
                    }
                    Chunk::Insert(text) => inserted.push_str(text),
                    Chunk::Equal(_) => break,
                }
                index += 1;
            }

            hunks.push(Hunk {
                offset: start,
                before: tail_chars(&source[..start], self.context).to_string(),
                deleted,
                inserted,
                after: head_chars(&source[pos..], self.context).to_string(),
            });
        }

        hunks
    }
}

impl Default for MergeEngine {
    fn default() -> Self {
        Self::new()
    }
}

/// Apply hunks in order, tracking how earlier replacements shift the
/// expected offsets of later ones.
fn apply(text: &str, hunks: &[Hunk], context: usize) -> String {
    let mut out = text.to_string();
    let mut delta = 0isize;

    for hunk in hunks {
        delta = apply_hunk(&mut out, hunk, delta, context);
    }

    out
}

/// Apply a single hunk, shortening its context anchors until they match.
/// Returns the offset shift the next hunk must account for.
fn apply_hunk(out: &mut String, hunk: &Hunk, delta: isize, context: usize) -> isize {
    let mut anchor = context;
    loop {
        let before = tail_chars(&hunk.before, anchor);
        let after = head_chars(&hunk.after, anchor);
        let find = format!("{before}{}{after}", hunk.deleted);
        let expected = shift_offset(out, hunk.offset - before.len(), delta);

        if find.is_empty() {
            // Nothing left to anchor on: a pure insertion into (near-)empty
            // surroundings lands at its expected position.
            let at = floor_char_boundary(out, expected);
            out.insert_str(at, &hunk.inserted);
            return delta + hunk.inserted.len() as isize;
        }

        if let Some(at) = locate(out, &find, expected) {
            let replace = format!("{before}{}{after}", hunk.inserted);
            out.replace_range(at..at + find.len(), &replace);
            return (at + replace.len()) as isize
                - (hunk.offset - before.len() + find.len()) as isize;
        }

        if anchor == 0 {
            // Context gone and the deleted text itself is nowhere to be
            // found; drop the hunk rather than corrupt the text.
            tracing::debug!("merge hunk dropped, context not found");
            return delta;
        }
        anchor /= 2;
    }
}

/// Find `needle` in `haystack`, preferring the expected offset, otherwise
/// the occurrence closest to it.
fn locate(haystack: &str, needle: &str, expected: usize) -> Option<usize> {
    if haystack
        .get(expected..)
        .is_some_and(|tail| tail.starts_with(needle))
    {
        return Some(expected);
    }

    haystack
        .match_indices(needle)
        .map(|(at, _)| at)
        .min_by_key(|at| at.abs_diff(expected))
}

fn shift_offset(text: &str, offset: usize, delta: isize) -> usize {
    let shifted = offset as isize + delta;
    usize::try_from(shifted.max(0)).unwrap_or(0).min(text.len())
}

fn floor_char_boundary(text: &str, mut at: usize) -> usize {
    while at > 0 && !text.is_char_boundary(at) {
        at -= 1;
    }
    at
}

/// Last `n` characters of `s`, on a char boundary.
fn tail_chars(s: &str, n: usize) -> &str {
    let start = s
        .char_indices()
        .rev()
        .take(n)
        .last()
        .map_or(s.len(), |(index, _)| index);
    &s[start..]
}

/// First `n` characters of `s`, on a char boundary.
fn head_chars(s: &str, n: usize) -> &str {
    let end = s.char_indices().nth(n).map_or(s.len(), |(index, _)| index);
    &s[..end]
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn merge_identities() {
        let engine = MergeEngine::new();
        let base = "This is the main\ninitial text.\nMainly used for adding tests.\n";
        let local = "This is the main\nedited text.\nMainly used for adding tests.\n";
        let remote = "This is the main\ninitial text.\nMainly used for writing tests.\n";

        assert_eq!(engine.merge(base, base, base), base);
        assert_eq!(engine.merge(base, local, base), local);
        assert_eq!(engine.merge(base, base, remote), remote);
    }

    #[test]
    fn adds_a_line_at_each_end() {
        let engine = MergeEngine::new();
        let base = "initial line";
        let local = "added first line\ninitial line";
        let remote = "initial line\nadded last line";

        assert_eq!(
            engine.merge(base, local, remote),
            "added first line\ninitial line\nadded last line"
        );
    }

    #[test]
    fn combines_two_disjoint_modifications() {
        let engine = MergeEngine::new();
        let base = "_2020_01_02_\nshopping\ncleaning\nlong walk\n";
        let local = "_2020_01_02_\nshopping done\ncleaning\nlong walk\n";
        let remote = "_2020_01_02_\nshopping\ncleaning\nlong walk in the park\n";

        assert_eq!(
            engine.merge(base, local, remote),
            "_2020_01_02_\nshopping done\ncleaning\nlong walk in the park\n"
        );
    }

    #[test]
    fn identical_edits_apply_once() {
        let engine = MergeEngine::new();
        let base = "initial line";
        let both = "added first line\ninitial line";

        assert_eq!(engine.merge(base, both, both), both);
    }

    #[test]
    fn starts_from_an_empty_base() {
        let engine = MergeEngine::new();
        let merged = engine.merge("", "local note", "");
        assert_eq!(merged, "local note");
    }

    #[test]
    fn unrelated_edits_still_produce_text() {
        let engine = MergeEngine::new();
        // True conflict: both sides rewrote the same characters. The result
        // is best-effort but must not panic or error.
        let merged = engine.merge("abcd", "ebgd", "ibkd");
        assert!(!merged.is_empty());
    }

    #[test]
    fn adjacent_edits_shorten_the_anchor_instead_of_dropping() {
        let engine = MergeEngine::new();
        // The local insertion sits inside the remote hunk's 16-char anchor;
        // the anchor has to shrink for the remote edit to land.
        let base = "メモの本文です\nsecond line\n";
        let local = "メモの本文です(更新)\nsecond line\n";
        let remote = "メモの本文です\nsecond line edited\n";

        let merged = engine.merge(base, local, remote);
        assert!(merged.contains("(更新)"));
        assert!(merged.contains("second line edited"));
    }
}
