//! Record Index
//!
//! Sorted views over the record references of a source file, and the
//! fixed-width index file format they are stored in.

mod sorted_index;

pub use sorted_index::{SortedIndex, ENTRY_SIZE};
