pub mod check;
pub mod config;
pub mod diag;
pub mod http;
pub mod inspect;
pub mod page;
pub mod serve;

use playbox_core::{fetch_archive, BundleArchive, HttpBundleSource};

use diag::load_diag;

/// Fetches and opens a bundle for the one-shot commands.
pub(crate) fn open_bundle(bundle_url: &str) -> Result<BundleArchive, String> {
    let source = HttpBundleSource::default();
    fetch_archive(&source, bundle_url).map_err(|err| load_diag(&err, Some(bundle_url)))
}
