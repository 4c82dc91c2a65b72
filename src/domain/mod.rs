//! Domain Layer
//!
//! The traits the erasure-coding core is written against. The core never
//! touches files directly; it reads and writes through these ports.
//!
//! - **Ports** (`ports.rs`) - block stores, block sinks and record indexes

pub mod ports;

pub use ports::{read_padded, BlockSink, BlockStore, RecordIndex, RecordRef};
