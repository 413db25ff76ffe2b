use std::collections::{BTreeMap, HashMap};

use serde::Serialize;

use crate::archive::{BundleArchive, ENTRY_POINT};
use crate::error::LoadError;
use crate::handle::{HandleArena, LocalHandle};

/// Extensions whose doubled form (`x.png.png`) is repaired at lookup time.
pub const REPAIRABLE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "mp3", "wav", "ogg"];

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentKind {
    Script,
    WasmModule,
    Document,
    Stylesheet,
    Png,
    Jpeg,
    Binary,
}

impl ContentKind {
    pub fn from_path(path: &str) -> Self {
        let ext = match path.rsplit_once('.') {
            Some((_, ext)) if !ext.contains('/') => ext.to_ascii_lowercase(),
            _ => return ContentKind::Binary,
        };
        match ext.as_str() {
            "js" => ContentKind::Script,
            "wasm" => ContentKind::WasmModule,
            "html" => ContentKind::Document,
            "css" => ContentKind::Stylesheet,
            "png" => ContentKind::Png,
            "jpg" | "jpeg" => ContentKind::Jpeg,
            _ => ContentKind::Binary,
        }
    }

    pub fn mime(self) -> &'static str {
        match self {
            ContentKind::Script => "text/javascript",
            ContentKind::WasmModule => "application/wasm",
            ContentKind::Document => "text/html",
            ContentKind::Stylesheet => "text/css",
            ContentKind::Png => "image/png",
            ContentKind::Jpeg => "image/jpeg",
            ContentKind::Binary => "application/octet-stream",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResourceEntry {
    pub path: String,
    pub kind: ContentKind,
    pub handle: LocalHandle,
    pub size: usize,
}

/// Archive path -> local handle for one load. Read-only once built.
#[derive(Clone, Debug, Default)]
pub struct ResourceTable {
    entries: BTreeMap<String, ResourceEntry>,
    // basename (and repaired basename) -> (found only after repair, key)
    by_basename: HashMap<String, Vec<(bool, String)>>,
}

impl ResourceTable {
    /// Decodes every file entry up front and mints a handle for each.
    pub fn build(archive: &mut BundleArchive, arena: &mut HandleArena) -> Result<Self, LoadError> {
        Self::build_with(archive, arena, || Ok(()))
    }

    /// Like [`ResourceTable::build`], calling `checkpoint` before each
    /// entry is decoded so an outdated load can bail out early.
    pub fn build_with<F>(
        archive: &mut BundleArchive,
        arena: &mut HandleArena,
        mut checkpoint: F,
    ) -> Result<Self, LoadError>
    where
        F: FnMut() -> Result<(), LoadError>,
    {
        let files = archive.files().cloned().collect::<Vec<_>>();
        let mut entries = Vec::with_capacity(files.len());
        for file in files {
            checkpoint()?;
            let blob = archive.read_blob(file.index)?;
            let size = blob.bytes.len();
            let handle = arena.mint(blob.bytes, blob.kind)?;
            entries.push(ResourceEntry {
                path: file.path,
                kind: blob.kind,
                handle,
                size,
            });
        }
        Ok(Self::from_entries(entries))
    }

    pub fn from_entries(entries: impl IntoIterator<Item = ResourceEntry>) -> Self {
        let mut table = Self::default();
        for entry in entries {
            table.entries.insert(entry.path.clone(), entry);
        }
        for key in table.entries.keys() {
            let name = basename(key);
            table
                .by_basename
                .entry(name.to_string())
                .or_default()
                .push((false, key.clone()));
            if let Some(repaired) = repair_double_extension(name) {
                table
                    .by_basename
                    .entry(repaired)
                    .or_default()
                    .push((true, key.clone()));
            }
        }
        for keys in table.by_basename.values_mut() {
            keys.sort();
        }
        table
    }

    pub fn get(&self, path: &str) -> Option<&ResourceEntry> {
        self.entries.get(path)
    }

    pub fn entry_point(&self) -> Option<&ResourceEntry> {
        self.entries.get(ENTRY_POINT)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &ResourceEntry> {
        self.entries.values()
    }

    /// Path -> handle, ordered by path. This is what the interceptor embeds.
    pub fn handle_map(&self) -> BTreeMap<&str, &str> {
        self.entries
            .iter()
            .map(|(path, entry)| (path.as_str(), entry.handle.as_str()))
            .collect()
    }

    /// Longest key `k` such that `value` ends with `/k`.
    pub fn suffix_of(&self, value: &str) -> Option<&ResourceEntry> {
        self.entries
            .iter()
            .filter(|(key, _)| {
                value.len() > key.len()
                    && value.ends_with(key.as_str())
                    && value.as_bytes()[value.len() - key.len() - 1] == b'/'
            })
            .max_by_key(|(key, _)| key.len())
            .map(|(_, entry)| entry)
    }

    /// Runtime lookup for a request issued by game code. Most specific
    /// rule first; `None` means the request goes out untouched.
    ///
    /// The injected interceptor script runs the same chain in the frame.
    pub fn resolve_request(&self, request: &str) -> Option<&ResourceEntry> {
        if let Some(entry) = self.entries.get(request) {
            return Some(entry);
        }
        let path = strip_query(request);
        let relative = path.trim_start_matches("./").trim_start_matches('/');
        if let Some(entry) = self.entries.get(relative) {
            return Some(entry);
        }
        let name = basename(path);
        if name.is_empty() {
            return None;
        }
        if let Some(entry) = self.entries.get(name) {
            return Some(entry);
        }
        let repaired = repair_double_extension(name);
        if let Some(fixed) = repaired.as_deref() {
            if let Some(entry) = self.entries.get(fixed) {
                return Some(entry);
            }
        }
        self.nested_named(name)
            .or_else(|| repaired.as_deref().and_then(|fixed| self.nested_named(fixed)))
    }

    fn nested_named(&self, name: &str) -> Option<&ResourceEntry> {
        let keys = self.by_basename.get(name)?;
        keys.iter()
            .find(|(_, key)| key.contains('/'))
            .and_then(|(_, key)| self.entries.get(key))
    }
}

fn strip_query(request: &str) -> &str {
    let end = request.find(['?', '#']).unwrap_or(request.len());
    &request[..end]
}

fn basename(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// `coin.png.png` -> `coin.png` for the image/audio extensions only.
pub fn repair_double_extension(name: &str) -> Option<String> {
    let (stem, ext) = name.rsplit_once('.')?;
    let lower = ext.to_ascii_lowercase();
    if !REPAIRABLE_EXTENSIONS.contains(&lower.as_str()) {
        return None;
    }
    let (_, inner) = stem.rsplit_once('.')?;
    if inner.eq_ignore_ascii_case(ext) {
        Some(stem.to_string())
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::table_of;

    #[test]
    fn kinds_follow_the_extension_table() {
        assert_eq!(ContentKind::from_path("a/b/main.js").mime(), "text/javascript");
        assert_eq!(ContentKind::from_path("game.wasm").mime(), "application/wasm");
        assert_eq!(ContentKind::from_path("index.html").mime(), "text/html");
        assert_eq!(ContentKind::from_path("style.css").mime(), "text/css");
        assert_eq!(ContentKind::from_path("hero.PNG").mime(), "image/png");
        assert_eq!(ContentKind::from_path("bg.jpeg"), ContentKind::Jpeg);
        assert_eq!(ContentKind::from_path("bg.jpg"), ContentKind::Jpeg);
        assert_eq!(ContentKind::from_path("music.ogg").mime(), "application/octet-stream");
        assert_eq!(ContentKind::from_path("dir.v2/LICENSE"), ContentKind::Binary);
    }

    #[test]
    fn double_extension_repair_only_for_media() {
        assert_eq!(repair_double_extension("coin.png.png").as_deref(), Some("coin.png"));
        assert_eq!(repair_double_extension("hit.wav.wav").as_deref(), Some("hit.wav"));
        assert_eq!(repair_double_extension("coin.png"), None);
        assert_eq!(repair_double_extension("main.js.js"), None);
        assert_eq!(repair_double_extension("coin.jpg.png"), None);
    }

    #[test]
    fn exact_match_wins_over_basename() {
        let table = table_of(&["logo.png", "ui/logo.png"]);
        assert_eq!(table.resolve_request("ui/logo.png").map(|e| e.path.as_str()), Some("ui/logo.png"));
        assert_eq!(table.resolve_request("logo.png").map(|e| e.path.as_str()), Some("logo.png"));
    }

    #[test]
    fn basename_match_strips_directories_and_query() {
        let table = table_of(&["data.json"]);
        let hit = table.resolve_request("levels/../data.json?v=3").expect("basename");
        assert_eq!(hit.path, "data.json");
    }

    #[test]
    fn relative_prefixes_are_exact_after_normalizing() {
        let table = table_of(&["assets/x.png", "other/x.png"]);
        assert_eq!(
            table.resolve_request("./assets/x.png").map(|e| e.path.as_str()),
            Some("assets/x.png")
        );
        assert_eq!(
            table.resolve_request("/other/x.png").map(|e| e.path.as_str()),
            Some("other/x.png")
        );
    }

    #[test]
    fn repaired_request_hits_root_key() {
        let table = table_of(&["coin.png"]);
        let hit = table.resolve_request("sprites/coin.png.png").expect("repair");
        assert_eq!(hit.path, "coin.png");
    }

    #[test]
    fn repaired_key_is_found_by_suffix() {
        let table = table_of(&["images/coin.png.png", "index.html"]);
        let hit = table.resolve_request("assets/coin.png").expect("suffix");
        assert_eq!(hit.path, "images/coin.png.png");
    }

    #[test]
    fn literal_basename_beats_repaired_one() {
        let table = table_of(&["a/coin.png.png", "b/coin.png"]);
        let hit = table.resolve_request("x/coin.png").expect("suffix");
        assert_eq!(hit.path, "b/coin.png");
    }

    #[test]
    fn external_urls_miss() {
        let table = table_of(&["index.html", "js/app.js"]);
        assert!(table
            .resolve_request("https://external.example.com/analytics.js")
            .is_none());
        assert!(table.resolve_request("https://cdn.example.com/").is_none());
    }

    #[test]
    fn suffix_of_requires_separator_and_prefers_longest() {
        let table = table_of(&["x.png", "assets/x.png"]);
        assert_eq!(table.suffix_of("./assets/x.png").map(|e| e.path.as_str()), Some("assets/x.png"));
        assert_eq!(table.suffix_of("/x.png").map(|e| e.path.as_str()), Some("x.png"));
        assert!(table.suffix_of("myassets/x.pngx").is_none());
        assert!(table.suffix_of("prefix-x.png").is_none());
    }
}
