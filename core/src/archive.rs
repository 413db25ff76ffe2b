use std::collections::HashMap;
use std::io::{Cursor, Read};

use sha2::{Digest, Sha256};
use zip::ZipArchive;

use crate::error::LoadError;
use crate::resource::ContentKind;

/// Canonical entry point, looked up case-sensitively at the archive root.
pub const ENTRY_POINT: &str = "index.html";

pub trait BundleSource: Send + Sync {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError>;
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub index: usize,
    pub path: String,
    pub is_dir: bool,
    pub size: u64,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EntryBlob {
    pub kind: ContentKind,
    pub bytes: Vec<u8>,
}

/// A fetched bundle with its central directory read.
///
/// Entry contents stay compressed until one of the `read_*` calls asks
/// for them.
pub struct BundleArchive {
    archive: ZipArchive<Cursor<Vec<u8>>>,
    entries: Vec<ArchiveEntry>,
    sha256: String,
    bundle_len: u64,
}

impl BundleArchive {
    pub fn open(bytes: Vec<u8>) -> Result<Self, LoadError> {
        let sha256 = sha256_prefixed(&bytes);
        let bundle_len = bytes.len() as u64;
        let mut archive = ZipArchive::new(Cursor::new(bytes))
            .map_err(|e| LoadError::ArchiveFormat(e.to_string()))?;
        let mut entries = Vec::with_capacity(archive.len());
        for index in 0..archive.len() {
            let file = archive
                .by_index(index)
                .map_err(|e| LoadError::ArchiveFormat(format!("entry #{}: {}", index, e)))?;
            entries.push(ArchiveEntry {
                index,
                path: file.name().to_string(),
                is_dir: file.is_dir(),
                size: file.size(),
            });
        }
        Ok(Self {
            archive,
            entries,
            sha256,
            bundle_len,
        })
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn files(&self) -> impl Iterator<Item = &ArchiveEntry> {
        self.entries.iter().filter(|entry| !entry.is_dir)
    }

    pub fn find(&self, path: &str) -> Option<&ArchiveEntry> {
        self.entries
            .iter()
            .find(|entry| !entry.is_dir && entry.path == path)
    }

    pub fn entry_point(&self) -> Result<&ArchiveEntry, LoadError> {
        self.find(ENTRY_POINT).ok_or(LoadError::MissingEntryPoint)
    }

    /// `sha256:<hex>` of the raw bundle bytes.
    pub fn sha256(&self) -> &str {
        &self.sha256
    }

    pub fn read_bytes(&mut self, index: usize) -> Result<Vec<u8>, LoadError> {
        let mut file = self
            .archive
            .by_index(index)
            .map_err(|e| LoadError::ArchiveFormat(format!("entry #{}: {}", index, e)))?;
        // Declared sizes come from the archive and are not trusted for
        // allocation.
        let declared = file.size();
        let mut bytes = Vec::with_capacity(declared.min(self.bundle_len) as usize);
        let read = (&mut file)
            .take(declared.saturating_add(1))
            .read_to_end(&mut bytes);
        read.map_err(|e| LoadError::ArchiveFormat(format!("{}: {}", file.name(), e)))?;
        if bytes.len() as u64 != declared {
            return Err(LoadError::ArchiveFormat(format!(
                "{}: declares {} bytes, holds {}",
                file.name(),
                declared,
                bytes.len()
            )));
        }
        Ok(bytes)
    }

    pub fn read_text(&mut self, index: usize) -> Result<String, LoadError> {
        let bytes = self.read_bytes(index)?;
        String::from_utf8(bytes).map_err(|_| {
            let path = self
                .entries
                .get(index)
                .map(|entry| entry.path.as_str())
                .unwrap_or("?");
            LoadError::ArchiveFormat(format!("{} is not UTF-8 text", path))
        })
    }

    pub fn read_blob(&mut self, index: usize) -> Result<EntryBlob, LoadError> {
        let kind = match self.entries.get(index) {
            Some(entry) => ContentKind::from_path(&entry.path),
            None => {
                return Err(LoadError::ArchiveFormat(format!(
                    "entry #{} out of range",
                    index
                )))
            }
        };
        let bytes = self.read_bytes(index)?;
        Ok(EntryBlob { kind, bytes })
    }
}

pub fn fetch_archive(source: &dyn BundleSource, url: &str) -> Result<BundleArchive, LoadError> {
    let bytes = source.fetch(url)?;
    log::debug!("fetched {} bytes from {}", bytes.len(), url);
    BundleArchive::open(bytes)
}

fn sha256_prefixed(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Bundles held in memory, keyed by URL.
#[derive(Default)]
pub struct MemoryBundleSource {
    bundles: HashMap<String, Vec<u8>>,
}

impl MemoryBundleSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, url: impl Into<String>, bytes: Vec<u8>) {
        self.bundles.insert(url.into(), bytes);
    }
}

impl BundleSource for MemoryBundleSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.bundles
            .get(url)
            .cloned()
            .ok_or_else(|| LoadError::fetch_status(404, url))
    }
}

#[cfg(not(target_arch = "wasm32"))]
pub use http::HttpBundleSource;

#[cfg(not(target_arch = "wasm32"))]
mod http {
    use std::fs;
    use std::io::Read;
    use std::path::PathBuf;
    use std::time::Duration;

    use super::BundleSource;
    use crate::error::LoadError;

    enum Location {
        Http(String),
        Local(PathBuf),
    }

    /// Fetches bundles over `http(s)://`, or from disk for `file://` URLs
    /// and plain paths.
    pub struct HttpBundleSource {
        agent: ureq::Agent,
    }

    impl HttpBundleSource {
        pub fn new(timeout: Duration) -> Self {
            Self {
                agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            }
        }
    }

    impl Default for HttpBundleSource {
        fn default() -> Self {
            Self::new(Duration::from_secs(60))
        }
    }

    impl BundleSource for HttpBundleSource {
        fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
            match resolve_location(url)? {
                Location::Http(url) => fetch_http(&self.agent, &url),
                Location::Local(path) => fs::read(&path)
                    .map_err(|e| LoadError::fetch(format!("{}: {}", path.display(), e))),
            }
        }
    }

    fn resolve_location(url: &str) -> Result<Location, LoadError> {
        if let Some(raw) = url.strip_prefix("file://") {
            return Ok(Location::Local(PathBuf::from(normalize_file_url_path(raw))));
        }
        if let Some((scheme, _)) = url.split_once("://") {
            if scheme.eq_ignore_ascii_case("http") || scheme.eq_ignore_ascii_case("https") {
                return Ok(Location::Http(url.to_string()));
            }
            return Err(LoadError::fetch(format!("unsupported scheme in {}", url)));
        }
        Ok(Location::Local(PathBuf::from(url)))
    }

    // file:///C:/x arrives as "/C:/x"
    fn normalize_file_url_path(raw: &str) -> &str {
        let bytes = raw.as_bytes();
        if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' {
            &raw[1..]
        } else {
            raw
        }
    }

    fn fetch_http(agent: &ureq::Agent, url: &str) -> Result<Vec<u8>, LoadError> {
        let response = match agent.get(url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(status, _)) => {
                return Err(LoadError::fetch_status(status, url))
            }
            Err(err) => return Err(LoadError::fetch(format!("{} {}", url, err))),
        };
        let mut bytes = Vec::new();
        response
            .into_reader()
            .read_to_end(&mut bytes)
            .map_err(|e| LoadError::fetch(format!("{} {}", url, e)))?;
        Ok(bytes)
    }

}
