//! Store configuration.
//!
//! Describes the volume fleet a [`crate::FileBlockStore`] is created
//! from and reopened with. The same value must be used for both; the
//! meta-volume cross-checks volume count and capacities at open.
//!
//! ```ignore
//! let config = StoreConfig {
//!     meta_path: "./data/meta.tdm".into(),
//!     volumes: vec![
//!         VolumeSpec { path: "./data/vol0.tdm".into(), capacity: 4096 },
//!         VolumeSpec { path: "./data/vol1.tdm".into(), capacity: 4096 },
//!     ],
//!     cache_bits: Some(10), // 1024 cache slots
//! };
//! FileBlockStore::create(&config).await?;
//! let store = FileBlockStore::open(&config).await?;
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One volume in the fleet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VolumeSpec {
    /// Path of the volume file.
    pub path: PathBuf,

    /// Capacity in blocks.
    pub capacity: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Path of the meta-volume file.
    pub meta_path: PathBuf,

    /// The volume fleet, in rotation order.
    pub volumes: Vec<VolumeSpec>,

    /// Attach a read cache of `2^bits` slots.
    #[serde(default)]
    pub cache_bits: Option<u32>,
}
