use std::sync::{Arc, Barrier};
use std::thread;

use crate::archive::{BundleSource, MemoryBundleSource};
use crate::collab::VecPlayNotifier;
use crate::error::LoadError;
use crate::sandbox::{PlayState, PlayerProps, SandboxHost};

use super::fixtures::{game_zip, memory_store, zip_bytes};

const FIRST: &str = "https://cdn.example.com/first.zip";
const SECOND: &str = "https://cdn.example.com/second.zip";

fn two_games() -> MemoryBundleSource {
    let mut source = MemoryBundleSource::new();
    source.insert(FIRST, game_zip());
    source.insert(
        SECOND,
        zip_bytes(&[("index.html", b"<html><head></head><body>second</body></html>".as_slice())]),
    );
    source
}

/// Parks every fetch until the test lets it through.
struct GatedSource {
    inner: MemoryBundleSource,
    entered: Arc<Barrier>,
    release: Arc<Barrier>,
}

impl BundleSource for GatedSource {
    fn fetch(&self, url: &str) -> Result<Vec<u8>, LoadError> {
        self.entered.wait();
        self.release.wait();
        self.inner.fetch(url)
    }
}

#[test]
fn stale_result_is_discarded_after_url_change() {
    let store = memory_store();
    let notifier = Arc::new(VecPlayNotifier::new());
    let mut host = SandboxHost::new(
        PlayerProps::new(FIRST, "First", "first"),
        store.clone(),
        notifier.clone(),
    );
    let source = two_games();

    let first = host.begin_load();
    let second = host
        .set_props(PlayerProps::new(SECOND, "Second", "second"))
        .expect("url change starts a load");
    assert!(!first.ticket().is_current());

    let second_outcome = second.run(&source);
    assert!(host.settle(second_outcome));
    let first_outcome = first.run(&source);
    assert!(!host.settle(first_outcome));

    assert_eq!(host.state(), &PlayState::Ready);
    let session = host.session().expect("session");
    assert!(session.document().contains("second"));
    assert_eq!(store.len(), session.live_handles());
    assert_eq!(notifier.calls(), vec!["second".to_string()]);
}

#[test]
fn stale_failure_cannot_overwrite_a_pending_load() {
    let mut host = SandboxHost::new(
        PlayerProps::new("https://cdn.example.com/missing.zip", "Gone", "gone"),
        memory_store(),
        Arc::new(VecPlayNotifier::new()),
    );
    let source = two_games();

    let stale = host.begin_load();
    let fresh = host
        .set_props(PlayerProps::new(SECOND, "Second", "second"))
        .expect("load");

    assert!(!host.settle(stale.run(&source)));
    assert_eq!(host.state(), &PlayState::Loading);

    assert!(host.settle(fresh.run(&source)));
    assert_eq!(host.state(), &PlayState::Ready);
}

#[test]
fn superseded_load_stops_at_the_next_checkpoint() {
    let store = memory_store();
    let entered = Arc::new(Barrier::new(2));
    let release = Arc::new(Barrier::new(2));
    let source = Arc::new(GatedSource {
        inner: two_games(),
        entered: entered.clone(),
        release: release.clone(),
    });
    let mut host = SandboxHost::new(
        PlayerProps::new(FIRST, "First", "first"),
        store.clone(),
        Arc::new(VecPlayNotifier::new()),
    );

    let task = host.begin_load();
    let worker_source = source.clone();
    let worker = thread::spawn(move || task.run(worker_source.as_ref()));

    entered.wait();
    let _newer = host.set_props(PlayerProps::new(SECOND, "Second", "second"));
    release.wait();
    let outcome = worker.join().expect("worker");

    assert_eq!(outcome.result().err(), Some(&LoadError::Superseded));
    assert!(!host.settle(outcome));
    assert!(store.is_empty());
}
