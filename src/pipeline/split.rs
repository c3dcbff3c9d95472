//! Block splitting: cut raw text into contiguous, indexed blocks.
//!
//! The cut point is purely arithmetic. Blocks are measured in characters
//! (Unicode scalar values), so a cut never lands inside a UTF-8 sequence,
//! but it may land mid-word or mid-line: this is a bulk background pass,
//! not layout pagination.

use crate::error::PagingError;
use std::num::NonZeroUsize;

/// A contiguous slice of the source text; the unit of parallel work.
///
/// Immutable once created. The index is the sole ordering key used when
/// the aggregator reassembles pages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    index: usize,
    text: String,
}

impl Block {
    pub fn new(index: usize, text: impl Into<String>) -> Self {
        Self {
            index,
            text: text.into(),
        }
    }

    /// Position of this block in document order, starting at 0.
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    /// Length in characters, not bytes.
    pub fn char_len(&self) -> usize {
        self.text.chars().count()
    }
}

/// Iterator over consecutive windows of at most `size` characters.
///
/// Shared by the splitter and the page slicer so both stages cut text the
/// same way.
#[derive(Debug, Clone)]
pub struct CharWindows<'a> {
    rest: &'a str,
    size: usize,
}

impl<'a> Iterator for CharWindows<'a> {
    type Item = &'a str;

    fn next(&mut self) -> Option<&'a str> {
        if self.rest.is_empty() {
            return None;
        }
        let end = self
            .rest
            .char_indices()
            .nth(self.size)
            .map(|(byte, _)| byte)
            .unwrap_or(self.rest.len());
        let (head, tail) = self.rest.split_at(end);
        self.rest = tail;
        Some(head)
    }
}

/// Window `text` into slices of `size` characters; the last may be shorter.
pub fn char_windows(text: &str, size: NonZeroUsize) -> CharWindows<'_> {
    CharWindows {
        rest: text,
        size: size.get(),
    }
}

/// Split `text` into `ceil(len / block_size)` blocks, indexed `0..n` in
/// document order.
///
/// # Errors
/// [`PagingError::InvalidArgument`] when `block_size` is zero.
pub fn split_blocks(text: &str, block_size: usize) -> Result<Vec<Block>, PagingError> {
    let size = NonZeroUsize::new(block_size)
        .ok_or_else(|| PagingError::InvalidArgument("block_size must be ≥ 1".into()))?;
    Ok(char_windows(text, size)
        .enumerate()
        .map(|(index, chunk)| Block::new(index, chunk))
        .collect())
}

/// The block that contains character `offset`, e.g. a reader's current
/// position, for use as the priority block.
///
/// Returns `None` for a zero `block_size`. The result is not checked
/// against the block count; an index past the end means "no priority".
pub fn block_index_for_offset(offset: usize, block_size: usize) -> Option<usize> {
    (block_size > 0).then(|| offset / block_size)
}
