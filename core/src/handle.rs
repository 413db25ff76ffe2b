use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use crate::error::LoadError;
use crate::resource::ContentKind;

/// Ephemeral reference to bytes owned by a sandbox session.
///
/// The string form is what ends up in the rewritten document, so it must
/// be directly loadable by the sandboxed frame (an object URL in the
/// browser, an absolute URL on the local server).
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LocalHandle(String);

impl LocalHandle {
    pub fn new(url: impl Into<String>) -> Self {
        Self(url.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub trait HandleMinter: Send + Sync {
    /// Makes `bytes` loadable under a fresh handle inside `scope`.
    fn mint(&self, scope: &str, bytes: Vec<u8>, kind: ContentKind) -> Result<LocalHandle, String>;

    /// Revoking an unknown or already revoked handle is a no-op.
    fn revoke(&self, handle: &LocalHandle);
}

/// Handles minted for one load, released together.
///
/// Dropping the arena revokes everything it still holds, so a load that
/// is superseded or fails halfway never leaks live handles.
pub struct HandleArena {
    minter: Arc<dyn HandleMinter>,
    scope: String,
    live: Vec<LocalHandle>,
}

impl HandleArena {
    pub fn new(minter: Arc<dyn HandleMinter>, scope: impl Into<String>) -> Self {
        Self {
            minter,
            scope: scope.into(),
            live: Vec::new(),
        }
    }

    pub fn scope(&self) -> &str {
        &self.scope
    }

    pub fn mint(&mut self, bytes: Vec<u8>, kind: ContentKind) -> Result<LocalHandle, LoadError> {
        let handle = self
            .minter
            .mint(&self.scope, bytes, kind)
            .map_err(|e| LoadError::internal(format!("handle mint failed: {}", e)))?;
        self.live.push(handle.clone());
        Ok(handle)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    pub fn release_all(&mut self) {
        if self.live.is_empty() {
            return;
        }
        log::debug!("releasing {} handles in scope {}", self.live.len(), self.scope);
        for handle in self.live.drain(..) {
            self.minter.revoke(&handle);
        }
    }
}

impl Drop for HandleArena {
    fn drop(&mut self) {
        self.release_all();
    }
}

impl fmt::Debug for HandleArena {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HandleArena")
            .field("scope", &self.scope)
            .field("live", &self.live.len())
            .finish()
    }
}

#[derive(Clone, Debug)]
pub struct StoredBlob {
    pub kind: ContentKind,
    pub bytes: Arc<Vec<u8>>,
}

/// In-process handle store backing the local sandbox server.
///
/// Handles look like `{prefix}/{scope}/{n}`; the server answers
/// `GET {prefix}/...` with [`MemoryHandleStore::get`].
pub struct MemoryHandleStore {
    prefix: String,
    next: AtomicU64,
    blobs: RwLock<HashMap<String, StoredBlob>>,
}

impl MemoryHandleStore {
    pub fn new(prefix: impl Into<String>) -> Self {
        let prefix = prefix.into();
        Self {
            prefix: prefix.trim_end_matches('/').to_string(),
            next: AtomicU64::new(0),
            blobs: RwLock::new(HashMap::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn get(&self, handle: &str) -> Option<StoredBlob> {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs.get(handle).cloned()
    }

    pub fn len(&self) -> usize {
        let blobs = self.blobs.read().unwrap_or_else(|e| e.into_inner());
        blobs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HandleMinter for MemoryHandleStore {
    fn mint(&self, scope: &str, bytes: Vec<u8>, kind: ContentKind) -> Result<LocalHandle, String> {
        let n = self.next.fetch_add(1, Ordering::Relaxed);
        let url = format!("{}/{}/{}", self.prefix, scope, n);
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.insert(
            url.clone(),
            StoredBlob {
                kind,
                bytes: Arc::new(bytes),
            },
        );
        Ok(LocalHandle(url))
    }

    fn revoke(&self, handle: &LocalHandle) {
        let mut blobs = self.blobs.write().unwrap_or_else(|e| e.into_inner());
        blobs.remove(handle.as_str());
    }
}
