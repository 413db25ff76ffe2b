use std::sync::Mutex;

use serde::{Deserialize, Serialize};

/// What the host needs to know about a game. Extra fields are only used
/// by the surrounding page.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct GameRecord {
    #[serde(default)]
    pub slug: String,
    pub title: String,
    #[serde(rename = "blob_url", alias = "bundle_url")]
    pub bundle_url: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub author_name: Option<String>,
    #[serde(default)]
    pub plays: u64,
    #[serde(default)]
    pub views: u64,
}

impl GameRecord {
    pub fn new(slug: impl Into<String>, title: impl Into<String>, bundle_url: impl Into<String>) -> Self {
        Self {
            slug: slug.into(),
            title: title.into(),
            bundle_url: bundle_url.into(),
            description: None,
            author_name: None,
            plays: 0,
            views: 0,
        }
    }
}

pub trait GameCatalog: Send + Sync {
    /// `Ok(None)` when no game has this slug.
    fn lookup(&self, slug: &str) -> Result<Option<GameRecord>, String>;
}

/// Catalog of exactly one game, for serving a bundle without a backend.
pub struct StaticGameCatalog {
    record: GameRecord,
}

impl StaticGameCatalog {
    pub fn new(record: GameRecord) -> Self {
        Self { record }
    }
}

impl GameCatalog for StaticGameCatalog {
    fn lookup(&self, slug: &str) -> Result<Option<GameRecord>, String> {
        if slug == self.record.slug {
            Ok(Some(self.record.clone()))
        } else {
            Ok(None)
        }
    }
}

/// Fire-and-forget play counter. Errors are logged by the caller and
/// never reach the player.
pub trait PlayNotifier: Send + Sync {
    fn notify_play(&self, slug: &str) -> Result<(), String>;
}

pub struct LogPlayNotifier;

impl PlayNotifier for LogPlayNotifier {
    fn notify_play(&self, slug: &str) -> Result<(), String> {
        log::info!("play counted slug={}", slug);
        Ok(())
    }
}

#[derive(Default)]
pub struct VecPlayNotifier {
    calls: Mutex<Vec<String>>,
    fail: bool,
}

impl VecPlayNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records calls but reports every one as failed.
    pub fn failing() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            fail: true,
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl PlayNotifier for VecPlayNotifier {
    fn notify_play(&self, slug: &str) -> Result<(), String> {
        self.calls
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(slug.to_string());
        if self.fail {
            Err(format!("play counter unavailable for {}", slug))
        } else {
            Ok(())
        }
    }
}
