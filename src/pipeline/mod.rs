//! Pure pipeline stages for block pagination.
//!
//! Each submodule implements exactly one step and carries no hidden state,
//! so each is independently testable and the scheduler in
//! [`crate::paginator`] only wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! text ──▶ split ──▶ slice (per block, on a worker) ──▶ store ──▶ aggregate
//!          (blocks)   (pages)                           (slots)   (index order)
//! ```
//!
//! 1. [`split`]: cut raw text into indexed, fixed-size blocks
//! 2. [`slice`]: cut one block into fixed-length pages; the only stage
//!    that runs on the worker pool
//! 3. [`store`]: write-once slot per block, read in index order after the
//!    completion barrier

pub mod slice;
pub mod split;
pub mod store;
