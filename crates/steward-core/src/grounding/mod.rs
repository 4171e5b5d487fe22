//! Grounding pack assembly: identity, knowledge hits, workspace snapshot,
//! and short-term memory in one bounded, hashed, budget-checked bundle.

pub mod builder;
pub mod identity;
pub mod pack;
pub mod snapshot;

pub use builder::{GroundingBuilder, GroundingConfig};
pub use identity::{FileIdentityProvider, IdentityLoad, IdentityProvider, StaticIdentityProvider};
pub use pack::{
    content_hash, Diagnostics, GroundingPack, KbRetrieved, PackTrace, RecommendedAction,
    SectionPack, SkippedSource,
};
pub use snapshot::{unwrap_payload, SnapshotCounts, WorkspaceSnapshot};
