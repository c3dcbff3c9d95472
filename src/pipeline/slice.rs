//! Page slicing: cut one block's text into fixed-length pages.
//!
//! Same arithmetic windowing as [`super::split`], applied at page
//! granularity. No layout awareness: a page is at most `chars_per_page`
//! characters, nothing more.
//!
//! [`PageSlicer`] is the seam the scheduler calls on its worker threads.
//! [`CharWindowSlicer`] is the default; hosts may plug in their own (a
//! sentence-aware slicer, or a failing one in tests).

use super::split::{char_windows, Block};
use crate::cancel::CancelToken;
use crate::error::{BlockError, PagingError};
use std::num::NonZeroUsize;

/// Paginate `text` into pages of at most `chars_per_page` characters.
///
/// Empty text yields an empty page list; callers must treat a block with no
/// pages as a success.
///
/// # Errors
/// [`PagingError::InvalidArgument`] when `chars_per_page` is zero.
pub fn paginate(text: &str, chars_per_page: usize) -> Result<Vec<String>, PagingError> {
    let size = NonZeroUsize::new(chars_per_page)
        .ok_or_else(|| PagingError::InvalidArgument("chars_per_page must be ≥ 1".into()))?;
    Ok(char_windows(text, size).map(str::to_owned).collect())
}

/// Turns one block into its pages. Called on a worker thread.
///
/// Implementations must be `Send + Sync` since a single slicer is shared by
/// every worker. Long-running implementations should poll `cancel` and
/// return [`BlockError::Cancelled`] once it fires.
pub trait PageSlicer: Send + Sync {
    fn slice(
        &self,
        block: &Block,
        chars_per_page: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, BlockError>;
}

/// Fixed character-count windows, checking for cancellation between pages.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharWindowSlicer;

impl PageSlicer for CharWindowSlicer {
    fn slice(
        &self,
        block: &Block,
        chars_per_page: usize,
        cancel: &CancelToken,
    ) -> Result<Vec<String>, BlockError> {
        let size = NonZeroUsize::new(chars_per_page).ok_or_else(|| BlockError::SliceFailed {
            block: block.index(),
            detail: "chars_per_page must be ≥ 1".into(),
        })?;

        let mut pages = Vec::with_capacity(block.text().len() / size.get() + 1);
        for page in char_windows(block.text(), size) {
            if cancel.is_cancelled() {
                return Err(BlockError::Cancelled {
                    block: block.index(),
                });
            }
            pages.push(page.to_owned());
        }
        Ok(pages)
    }
}
