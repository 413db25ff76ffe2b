use thiserror::Error;

/// Everything that can stop a bundle from reaching the `ready` state.
///
/// A runtime request that matches nothing in the resource table is not
/// represented here: it falls through to the original request.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum LoadError {
    #[error("Failed to download game ({detail})")]
    Fetch { detail: String, status: Option<u16> },

    #[error("Game bundle is not a valid archive: {0}")]
    ArchiveFormat(String),

    #[error("No index.html found in game ZIP")]
    MissingEntryPoint,

    #[error("Game not found: {0}")]
    GameNotFound(String),

    #[error("{0}")]
    Internal(String),

    /// A newer load started before this one settled. Never shown to the user.
    #[error("load superseded by a newer request")]
    Superseded,
}

impl LoadError {
    pub fn fetch(detail: impl Into<String>) -> Self {
        LoadError::Fetch {
            detail: detail.into(),
            status: None,
        }
    }

    pub fn fetch_status(status: u16, url: &str) -> Self {
        LoadError::Fetch {
            detail: format!("HTTP {} from {}", status, url),
            status: Some(status),
        }
    }

    pub fn internal(detail: impl Into<String>) -> Self {
        LoadError::Internal(detail.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            LoadError::Fetch { .. } => "E_PLAY_FETCH",
            LoadError::ArchiveFormat(_) => "E_PLAY_ARCHIVE",
            LoadError::MissingEntryPoint => "E_PLAY_ENTRY_MISSING",
            LoadError::GameNotFound(_) => "E_PLAY_NOT_FOUND",
            LoadError::Internal(_) => "E_PLAY_INTERNAL",
            LoadError::Superseded => "E_PLAY_SUPERSEDED",
        }
    }

    /// Short line shown above the message in the error panel.
    pub fn headline(&self) -> &'static str {
        match self {
            LoadError::GameNotFound(_) => "Game not found",
            _ => "Failed to load game",
        }
    }
}
