//! Infrastructure Adapters
//!
//! Implementations of the block ports in [`crate::domain::ports`].
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                        Domain Layer                              │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │                    Ports (Traits)                           │ │
//! │  │        BlockStore │ BlockSink │ RecordIndex                 │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//!                               │
//!                               ▼
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                     Adapters (This Module)                       │
//! │  ┌────────────────────────────────────────────────────────────┐ │
//! │  │        FileBlockStore │ MemoryBlockStore                    │ │
//! │  └────────────────────────────────────────────────────────────┘ │
//! └─────────────────────────────────────────────────────────────────┘
//! ```

mod file_store;
mod memory;

pub use file_store::{
    create_shard_files, index_file_name, manifest_file_name, open_shard_files,
    remove_shard_files, shard_file_name, source_file_name, FileBlockStore,
};
pub use memory::MemoryBlockStore;
