use std::sync::Arc;

use playbox_core::{
    rewrite_references, BundleArchive, HandleArena, LoadError, MemoryHandleStore, ResourceTable,
};

use super::diag::load_diag;
use super::open_bundle;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct CheckReport {
    pub files: usize,
    pub resolved: usize,
    /// Static references only the session path fallback can answer.
    pub fallback: Vec<String>,
    pub unresolved: Vec<String>,
}

/// Runs the load pipeline up to the rewrite against throwaway handles.
pub fn check_archive(archive: &mut BundleArchive) -> Result<CheckReport, LoadError> {
    let entry_index = archive.entry_point()?.index;
    let store = Arc::new(MemoryHandleStore::new("check:"));
    let mut arena = HandleArena::new(store, "check");
    let table = ResourceTable::build(archive, &mut arena)?;
    let text = archive.read_text(entry_index)?;
    let rewritten = rewrite_references(&text, &table);
    let (fallback, unresolved): (Vec<String>, Vec<String>) = rewritten
        .unresolved
        .into_iter()
        .partition(|reference| table.resolve_request(reference).is_some());
    Ok(CheckReport {
        files: table.len(),
        resolved: rewritten.replaced,
        fallback,
        unresolved,
    })
}

pub fn run_check(bundle_url: &str) -> Result<(), String> {
    let mut archive = open_bundle(bundle_url)?;
    println!("bundle_url={}", bundle_url);
    println!("bundle_sha256={}", archive.sha256());
    let report = check_archive(&mut archive).map_err(|err| load_diag(&err, Some(bundle_url)))?;
    println!("bundle_files={}", report.files);
    println!("refs_resolved={}", report.resolved);
    for reference in &report.fallback {
        println!("ref_fallback={}", reference);
    }
    for reference in &report.unresolved {
        log::warn!("reference matches nothing in the bundle: {}", reference);
        println!("ref_unresolved={}", reference);
    }
    println!("check=ok");
    Ok(())
}
