#![cfg_attr(test, allow(clippy::disallowed_methods, clippy::expect_used, clippy::unwrap_used))]
// Life of an index population:
// 1. Store scan threads add entries
//     - Each thread encodes its entries as keys into its own block storage
//     - Full blocks are sorted and spilled to disk
// 2. Concurrent store updates are logged to an update storage
// 3. Scan completed:
//     - Each block storage is merged down to one sorted block
//     - All blocks stream through a tree of mergers into the index tree
//     - The update log is replayed against the tree
//     - Unique indexes get their duplicate values resolved
// 4. Updates from then on go straight to the tree
//
// System components:
//  - Key encoding and ordering (key, values)
//  - Temporary on-disk storages (storage)
//  - Stream merging (merge)
//  - Population driver (populator)

pub mod config;
pub mod key;
pub mod merge;
pub mod populator;
pub mod storage;
#[cfg(test)]
mod testing;
pub mod update;
pub mod values;

pub use config::PopulationConfig;
pub use key::{GenericKey, GenericLayout};
pub use merge::IndexSample;
pub use populator::{BlockBasedIndexPopulator, PopulatingUpdater, PopulationError};
pub use update::IndexEntryUpdate;
pub use values::Value;
