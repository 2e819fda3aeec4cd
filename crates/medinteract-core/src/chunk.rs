//! Recursive, overlapping text chunker.
//!
//! Splits page text into [`Chunk`]s of at most `chunk_size` characters.
//! Break points are chosen from a priority list of separators so that
//! chunks end on paragraph, line, sentence, or word boundaries whenever
//! possible, and on raw characters only as a last resort.
//!
//! # Algorithm
//!
//! 1. Reserve `chunk_overlap` characters of every chunk for context carried
//!    over from the previous one, leaving a budget of
//!    `chunk_size - chunk_overlap` for new text.
//! 2. Recursively split the text into contiguous segments no longer than
//!    the budget: split on the highest-priority separator present, greedily
//!    merge neighbouring pieces back together while they fit, and recurse
//!    with the next separator into any piece that is still too long.
//!    Separators stay attached to the piece they terminate, so segments
//!    tile the text exactly.
//! 3. Extend each segment backwards by up to `chunk_overlap` characters
//!    (never past the start of the previous chunk), snapping forward to a
//!    word boundary when that keeps at least half of the overlap.
//! 4. Trim whitespace and drop empty results.
//!
//! Lengths are counted in `char`s, never bytes.
//!
//! # Example
//!
//! ```rust
//! use medinteract_core::chunk::chunk_text;
//!
//! let chunks = chunk_text("ref.pdf", 0, "Warfarin.\n\nAspirin.", 1000, 200);
//! assert_eq!(chunks.len(), 1);
//! assert_eq!(chunks[0].page, 0);
//! ```

use std::ops::Range;

use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::models::{Chunk, Document};

/// Separators in priority order. The empty separator means "any character".
pub const SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " ", ""];

/// Chunk every document, preserving document order.
pub fn chunk_documents(docs: &[Document], chunk_size: usize, chunk_overlap: usize) -> Vec<Chunk> {
    docs.iter()
        .flat_map(|d| chunk_text(&d.source, d.page, &d.text, chunk_size, chunk_overlap))
        .collect()
}

/// Split one page of text into overlapping chunks.
///
/// Returns an empty vector for empty or whitespace-only text. An overlap
/// that is not smaller than `chunk_size` is clamped to `chunk_size - 1`.
pub fn chunk_text(
    source: &str,
    page: u32,
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Vec<Chunk> {
    if text.trim().is_empty() || chunk_size == 0 {
        return Vec::new();
    }

    let overlap = chunk_overlap.min(chunk_size - 1);
    let budget = chunk_size - overlap;

    let mut segments = Vec::new();
    split_segments(text, 0..text.len(), SEPARATORS, budget, &mut segments);

    let mut chunks = Vec::new();
    let mut prev_start = 0usize;
    for (i, seg) in segments.iter().enumerate() {
        let start = if i == 0 || overlap == 0 {
            seg.start
        } else {
            let allowance = chunk_size - char_len(&text[seg.clone()]);
            overlap_start(text, prev_start, seg.start, overlap, allowance)
        };
        prev_start = start;

        let piece = text[start..seg.end].trim();
        if piece.is_empty() {
            continue;
        }
        let index = chunks.len() as i64;
        chunks.push(make_chunk(source, page, index, piece));
    }

    chunks
}

/// Recursively split `text[range]` into contiguous byte ranges of at most
/// `budget` characters each.
fn split_segments(
    text: &str,
    range: Range<usize>,
    separators: &[&str],
    budget: usize,
    out: &mut Vec<Range<usize>>,
) {
    let slice = &text[range.clone()];
    if char_len(slice) <= budget {
        out.push(range);
        return;
    }

    let Some(pos) = separators
        .iter()
        .position(|sep| !sep.is_empty() && slice.contains(sep))
    else {
        hard_split(text, range, budget, out);
        return;
    };
    let sep = separators[pos];
    let finer = &separators[pos + 1..];

    let mut current: Option<(Range<usize>, usize)> = None;
    for piece in pieces(slice, sep, range.start) {
        let len = char_len(&text[piece.clone()]);

        if len > budget {
            if let Some((r, _)) = current.take() {
                out.push(r);
            }
            split_segments(text, piece, finer, budget, out);
            continue;
        }

        current = match current.take() {
            Some((r, cur_len)) if cur_len + len <= budget => Some((r.start..piece.end, cur_len + len)),
            Some((r, _)) => {
                out.push(r);
                Some((piece, len))
            }
            None => Some((piece, len)),
        };
    }
    if let Some((r, _)) = current {
        out.push(r);
    }
}

/// Split `slice` after every occurrence of `sep`, keeping the separator on
/// the piece it terminates. Returned ranges are offset by `base`.
fn pieces(slice: &str, sep: &str, base: usize) -> Vec<Range<usize>> {
    let mut out = Vec::new();
    let mut start = 0;
    for (idx, m) in slice.match_indices(sep) {
        let end = idx + m.len();
        out.push(base + start..base + end);
        start = end;
    }
    if start < slice.len() {
        out.push(base + start..base + slice.len());
    }
    out
}

/// Split on raw characters into ranges of exactly `budget` chars (the last
/// one may be shorter).
fn hard_split(text: &str, range: Range<usize>, budget: usize, out: &mut Vec<Range<usize>>) {
    let slice = &text[range.clone()];
    let mut start = range.start;
    let mut count = 0;
    for (idx, _) in slice.char_indices() {
        if count == budget {
            out.push(start..range.start + idx);
            start = range.start + idx;
            count = 0;
        }
        count += 1;
    }
    if start < range.end {
        out.push(start..range.end);
    }
}

/// Byte offset at which a chunk starting at `seg_start` should begin so it
/// repeats up to `overlap` non-whitespace characters of the preceding text.
///
/// Whitespace in the window is skipped when counting, but the whole window
/// never exceeds `allowance` characters, so the chunk stays within its
/// limit. Overlap is therefore empty only when a whitespace run longer than
/// `allowance` separates the two segments.
fn overlap_start(
    text: &str,
    floor: usize,
    seg_start: usize,
    overlap: usize,
    allowance: usize,
) -> usize {
    let mut back = seg_start;
    let mut taken = 0;
    let mut kept = 0;
    for (idx, c) in text[floor..seg_start].char_indices().rev() {
        if kept == overlap || taken == allowance {
            break;
        }
        back = floor + idx;
        taken += 1;
        if !c.is_whitespace() {
            kept += 1;
        }
    }

    let window = &text[back..seg_start];
    let min_keep = (overlap / 2).max(1);
    if let Some(ws) = window.find(char::is_whitespace) {
        let after = &window[ws..];
        let snapped = back + ws + (after.len() - after.trim_start().len());
        if snapped < seg_start && visible_len(&text[snapped..seg_start]) >= min_keep {
            return snapped;
        }
    }
    back
}

fn visible_len(s: &str) -> usize {
    s.chars().filter(|c| !c.is_whitespace()).count()
}

fn char_len(s: &str) -> usize {
    s.chars().count()
}

fn make_chunk(source: &str, page: u32, index: i64, text: &str) -> Chunk {
    let hash = content_hash(source, page, text);
    let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, hash.as_bytes()).to_string();

    Chunk {
        id,
        source: source.to_string(),
        page,
        chunk_index: index,
        text: text.to_string(),
        hash,
    }
}

/// SHA-256 over a chunk's provenance and text, hex encoded.
pub fn content_hash(source: &str, page: u32, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(source.as_bytes());
    hasher.update([0u8]);
    hasher.update(page.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
