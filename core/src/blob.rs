//! Object-URL handles for running the host inside a browser page.

use js_sys::{Array, Uint8Array};
use web_sys::{Blob, BlobPropertyBag, Url};

use crate::handle::{HandleMinter, LocalHandle};
use crate::resource::ContentKind;

/// Mints `blob:` URLs through `URL.createObjectURL`. The scope is not
/// part of the URL; the arena tracks ownership.
pub struct BlobUrlMinter;

impl HandleMinter for BlobUrlMinter {
    fn mint(&self, _scope: &str, bytes: Vec<u8>, kind: ContentKind) -> Result<LocalHandle, String> {
        let data = Uint8Array::from(bytes.as_slice());
        let parts = Array::new();
        parts.push(&data.buffer());
        let options = BlobPropertyBag::new();
        options.set_type(kind.mime());
        let blob = Blob::new_with_u8_array_sequence_and_options(&parts, &options)
            .map_err(|e| format!("Blob: {:?}", e))?;
        let url = Url::create_object_url_with_blob(&blob)
            .map_err(|e| format!("URL.createObjectURL: {:?}", e))?;
        Ok(LocalHandle::new(url))
    }

    fn revoke(&self, handle: &LocalHandle) {
        let _ = Url::revoke_object_url(handle.as_str());
    }
}
