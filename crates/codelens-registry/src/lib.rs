//! In-memory entity registry for name-based code search.
//!
//! The registry holds one immutable [`RegistrySnapshot`] at a time: primary
//! collections plus every derived index (exact, prefix, suffix, compound,
//! phonetic, abbreviation, BK-trees and tries). `refresh` rebuilds a complete
//! snapshot from an [`EntitySource`] and installs it with a single swap.

pub mod error;
pub mod registry;
pub mod scoring;
pub mod snapshot;
pub mod source;

pub use error::{RegistryError, Result};
pub use registry::{spawn_refresh_loop, EntityRegistry, RefreshReport, RefreshStatus};
pub use snapshot::{RegistrySnapshot, RegistryStats};
pub use source::{EntitySource, InMemorySource, JsonSnapshotSource};
