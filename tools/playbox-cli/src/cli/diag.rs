use playbox_core::LoadError;

/// `CODE detail hint=.. fix=..`; empty or absent fields are left out.
pub fn build_diag(code: &str, detail: &str, hint: Option<String>, fix: Option<String>) -> String {
    [("hint", hint), ("fix", fix)]
        .into_iter()
        .filter_map(|(label, value)| value.filter(|v| !v.is_empty()).map(|v| (label, v)))
        .fold(format!("{} {}", code, detail), |mut out, (label, value)| {
            out.push_str(&format!(" {}={}", label, value));
            out
        })
}

/// Formats a load failure with its stable code and, where one helps,
/// a fix for whoever packaged the bundle.
pub fn load_diag(err: &LoadError, bundle_url: Option<&str>) -> String {
    let fix = match err {
        LoadError::MissingEntryPoint => {
            Some("place index.html at the archive root, not inside a folder".to_string())
        }
        LoadError::ArchiveFormat(_) => Some("re-export the bundle as a .zip".to_string()),
        _ => None,
    };
    build_diag(
        err.code(),
        &err.to_string(),
        bundle_url.map(|url| format!("bundle={}", url)),
        fix,
    )
}
