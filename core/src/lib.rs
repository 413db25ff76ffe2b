pub mod archive;
pub mod collab;
pub mod error;
pub mod handle;
pub mod interceptor;
pub mod resource;
pub mod rewrite;
pub mod sandbox;

#[cfg(not(target_arch = "wasm32"))]
pub mod remote;

#[cfg(feature = "wasm")]
pub mod blob;

pub use archive::{
    fetch_archive, ArchiveEntry, BundleArchive, BundleSource, EntryBlob, MemoryBundleSource,
    ENTRY_POINT,
};
#[cfg(not(target_arch = "wasm32"))]
pub use archive::HttpBundleSource;
#[cfg(not(target_arch = "wasm32"))]
pub use remote::{HttpGameCatalog, HttpPlayNotifier};
pub use collab::{
    GameCatalog, GameRecord, LogPlayNotifier, PlayNotifier, StaticGameCatalog, VecPlayNotifier,
};
pub use error::LoadError;
pub use handle::{HandleArena, HandleMinter, LocalHandle, MemoryHandleStore, StoredBlob};
pub use interceptor::{inject, interceptor_markup, table_data, TABLE_ELEMENT_ID};
pub use resource::{repair_double_extension, ContentKind, ResourceEntry, ResourceTable};
pub use rewrite::{rewrite_references, Rewritten};
pub use sandbox::{
    mount_game, LoadOutcome, LoadTask, LoadTicket, PlayState, PlaySession, PlayerProps,
    SandboxHost, SANDBOX_POLICY,
};

#[cfg(test)]
mod tests;
