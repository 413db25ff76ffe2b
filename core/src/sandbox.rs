use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
#[cfg(not(target_arch = "wasm32"))]
use std::time::{SystemTime, UNIX_EPOCH};

use crate::archive::{fetch_archive, BundleSource};
use crate::collab::{GameCatalog, GameRecord, PlayNotifier};
use crate::error::LoadError;
use crate::handle::{HandleArena, HandleMinter, LocalHandle};
use crate::interceptor::{inject, interceptor_markup};
use crate::resource::{ContentKind, ResourceTable};
use crate::rewrite::rewrite_references;

/// Frame policy: scripts run, but the frame gets an opaque origin and
/// no access to the hosting page's cookies, storage or DOM.
pub const SANDBOX_POLICY: &str = "allow-scripts";

static MOUNT_SEQ: AtomicU64 = AtomicU64::new(0);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PlayerProps {
    pub bundle_url: String,
    pub title: String,
    pub slug: String,
}

impl PlayerProps {
    pub fn new(bundle_url: impl Into<String>, title: impl Into<String>, slug: impl Into<String>) -> Self {
        Self {
            bundle_url: bundle_url.into(),
            title: title.into(),
            slug: slug.into(),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PlayState {
    Idle,
    Loading,
    Ready,
    Error(LoadError),
}

impl PlayState {
    pub fn name(&self) -> &'static str {
        match self {
            PlayState::Idle => "idle",
            PlayState::Loading => "loading",
            PlayState::Ready => "ready",
            PlayState::Error(_) => "error",
        }
    }
}

/// Identifies one dispatched load. Outdated as soon as the host starts
/// another load or goes away.
#[derive(Clone, Debug)]
pub struct LoadTicket {
    generation: u64,
    current: Arc<AtomicU64>,
    url: String,
}

impl LoadTicket {
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn is_current(&self) -> bool {
        self.current.load(Ordering::SeqCst) == self.generation
    }

    pub fn checkpoint(&self) -> Result<(), LoadError> {
        if self.is_current() {
            Ok(())
        } else {
            Err(LoadError::Superseded)
        }
    }
}

/// Everything one successful load produced. Dropping it revokes every
/// handle, the document's included.
#[derive(Debug)]
pub struct PlaySession {
    table: ResourceTable,
    document: String,
    document_handle: LocalHandle,
    replaced: usize,
    arena: HandleArena,
}

impl PlaySession {
    pub fn table(&self) -> &ResourceTable {
        &self.table
    }

    pub fn document(&self) -> &str {
        &self.document
    }

    /// Navigation target for the sandboxed frame.
    pub fn document_handle(&self) -> &LocalHandle {
        &self.document_handle
    }

    pub fn replaced(&self) -> usize {
        self.replaced
    }

    pub fn live_handles(&self) -> usize {
        self.arena.len()
    }
}

/// The fetch -> decode -> rewrite -> commit sequence for one ticket.
/// Runs without touching the host, so it can live on another thread.
pub struct LoadTask {
    ticket: LoadTicket,
    minter: Arc<dyn HandleMinter>,
    scope: String,
}

impl LoadTask {
    pub fn ticket(&self) -> &LoadTicket {
        &self.ticket
    }

    pub fn run(self, source: &dyn BundleSource) -> LoadOutcome {
        let LoadTask {
            ticket,
            minter,
            scope,
        } = self;
        let result = panic::catch_unwind(AssertUnwindSafe(|| {
            prepare_session(source, &ticket, minter, scope)
        }))
        .unwrap_or_else(|payload| Err(LoadError::internal(panic_message(payload.as_ref()))));
        LoadOutcome { ticket, result }
    }
}

pub struct LoadOutcome {
    ticket: LoadTicket,
    result: Result<PlaySession, LoadError>,
}

impl LoadOutcome {
    pub fn ticket(&self) -> &LoadTicket {
        &self.ticket
    }

    pub fn result(&self) -> Result<&PlaySession, &LoadError> {
        self.result.as_ref()
    }
}

fn prepare_session(
    source: &dyn BundleSource,
    ticket: &LoadTicket,
    minter: Arc<dyn HandleMinter>,
    scope: String,
) -> Result<PlaySession, LoadError> {
    ticket.checkpoint()?;
    let mut archive = fetch_archive(source, ticket.url())?;
    ticket.checkpoint()?;
    let entry_index = archive.entry_point()?.index;

    let mut arena = HandleArena::new(minter, scope);
    let table = ResourceTable::build_with(&mut archive, &mut arena, || ticket.checkpoint())?;
    let text = archive.read_text(entry_index)?;
    ticket.checkpoint()?;

    let rewritten = rewrite_references(&text, &table);
    let markup = interceptor_markup(&table)?;
    let document = inject(&rewritten.document, &markup);
    ticket.checkpoint()?;

    let document_handle = arena.mint(document.clone().into_bytes(), ContentKind::Document)?;
    Ok(PlaySession {
        table,
        document,
        document_handle,
        replaced: rewritten.replaced,
        arena,
    })
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(text) = payload.downcast_ref::<&str>() {
        (*text).to_string()
    } else if let Some(text) = payload.downcast_ref::<String>() {
        text.clone()
    } else {
        "unexpected failure while preparing the game".to_string()
    }
}

/// One mounted player: props in, state and the live session out.
pub struct SandboxHost {
    props: PlayerProps,
    state: PlayState,
    generation: Arc<AtomicU64>,
    session: Option<PlaySession>,
    play_counted: bool,
    mount_id: String,
    minter: Arc<dyn HandleMinter>,
    notifier: Arc<dyn PlayNotifier>,
}

impl SandboxHost {
    pub fn new(
        props: PlayerProps,
        minter: Arc<dyn HandleMinter>,
        notifier: Arc<dyn PlayNotifier>,
    ) -> Self {
        let mount_id = new_mount_id(&props.bundle_url);
        Self {
            props,
            state: PlayState::Idle,
            generation: Arc::new(AtomicU64::new(0)),
            session: None,
            play_counted: false,
            mount_id,
            minter,
            notifier,
        }
    }

    pub fn mount_id(&self) -> &str {
        &self.mount_id
    }

    pub fn props(&self) -> &PlayerProps {
        &self.props
    }

    pub fn state(&self) -> &PlayState {
        &self.state
    }

    pub fn session(&self) -> Option<&PlaySession> {
        self.session.as_ref()
    }

    pub fn play_counted(&self) -> bool {
        self.play_counted
    }

    /// Starts a load of the current bundle URL, superseding any load in
    /// flight and discarding the previous session.
    pub fn begin_load(&mut self) -> LoadTask {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        self.session = None;
        self.state = PlayState::Loading;
        log::info!(
            "mount={} state=loading generation={} url={}",
            self.mount_id,
            generation,
            self.props.bundle_url
        );
        LoadTask {
            ticket: LoadTicket {
                generation,
                current: self.generation.clone(),
                url: self.props.bundle_url.clone(),
            },
            minter: self.minter.clone(),
            scope: format!("{}-{}", self.mount_id, generation),
        }
    }

    /// New props; only a changed bundle URL starts a new load.
    pub fn set_props(&mut self, props: PlayerProps) -> Option<LoadTask> {
        let url_changed = props.bundle_url != self.props.bundle_url;
        self.props = props;
        if url_changed || self.state == PlayState::Idle {
            Some(self.begin_load())
        } else {
            None
        }
    }

    pub fn reload(&mut self) -> LoadTask {
        self.begin_load()
    }

    /// Commits a finished load if it is still the latest one. Returns
    /// whether the state changed.
    pub fn settle(&mut self, outcome: LoadOutcome) -> bool {
        let LoadOutcome { ticket, result } = outcome;
        if !ticket.is_current() {
            log::debug!(
                "mount={} discarding generation={} url={}",
                self.mount_id,
                ticket.generation,
                ticket.url
            );
            return false;
        }
        match result {
            Ok(session) => {
                log::info!(
                    "mount={} state=ready entries={} replaced={}",
                    self.mount_id,
                    session.table.len(),
                    session.replaced
                );
                self.session = Some(session);
                self.state = PlayState::Ready;
                self.count_play();
                true
            }
            Err(LoadError::Superseded) => false,
            Err(err) => {
                log::warn!("mount={} state=error code={} {}", self.mount_id, err.code(), err);
                self.state = PlayState::Error(err);
                true
            }
        }
    }

    /// Runs a whole load on the calling thread.
    pub fn load(&mut self, source: &dyn BundleSource) -> &PlayState {
        let task = self.begin_load();
        let outcome = task.run(source);
        self.settle(outcome);
        &self.state
    }

    /// Puts the host in the error state without loading anything.
    pub fn fail(&mut self, err: LoadError) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        self.session = None;
        log::warn!("mount={} state=error code={} {}", self.mount_id, err.code(), err);
        self.state = PlayState::Error(err);
    }

    /// Releases every handle and forgets any load in flight.
    pub fn unmount(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(session) = self.session.take() {
            log::info!(
                "mount={} unmounted, releasing {} handles",
                self.mount_id,
                session.live_handles()
            );
        }
        self.state = PlayState::Idle;
    }

    /// Text for the panel that replaces the frame while it is not ready.
    pub fn status_text(&self) -> Option<String> {
        match &self.state {
            PlayState::Idle | PlayState::Ready => None,
            PlayState::Loading => Some(format!("Loading {}...", self.props.title)),
            PlayState::Error(err) => Some(format!("{}: {}", err.headline(), err)),
        }
    }

    fn count_play(&mut self) {
        if self.play_counted {
            return;
        }
        self.play_counted = true;
        if let Err(err) = self.notifier.notify_play(&self.props.slug) {
            log::warn!("Failed to track play slug={} {}", self.props.slug, err);
        }
    }
}

impl Drop for SandboxHost {
    fn drop(&mut self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

/// Looks the slug up and mounts a host for it. A missing game yields a
/// host already in the error state and no record.
pub fn mount_game(
    catalog: &dyn GameCatalog,
    slug: &str,
    minter: Arc<dyn HandleMinter>,
    notifier: Arc<dyn PlayNotifier>,
) -> (SandboxHost, Option<GameRecord>) {
    let failure = match catalog.lookup(slug) {
        Ok(Some(record)) => {
            let props = PlayerProps::new(record.bundle_url.clone(), record.title.clone(), slug);
            return (SandboxHost::new(props, minter, notifier), Some(record));
        }
        Ok(None) => LoadError::GameNotFound(slug.to_string()),
        Err(detail) => LoadError::fetch(detail),
    };
    let mut host = SandboxHost::new(PlayerProps::new("", slug, slug), minter, notifier);
    host.fail(failure);
    (host, None)
}

fn new_mount_id(seed: &str) -> String {
    let seq = MOUNT_SEQ.fetch_add(1, Ordering::Relaxed);
    mount_id_from(seed, seq, clock_nanos())
}

fn mount_id_from(seed: &str, seq: u64, nanos: u128) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(seed.as_bytes());
    hasher.update(&seq.to_le_bytes());
    hasher.update(&nanos.to_le_bytes());
    hasher.finalize().to_hex()[..12].to_string()
}

#[cfg(not(target_arch = "wasm32"))]
fn clock_nanos() -> u128 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos())
        .unwrap_or_default()
}

// std::time panics on wasm32-unknown-unknown.
#[cfg(all(target_arch = "wasm32", feature = "wasm"))]
fn clock_nanos() -> u128 {
    (js_sys::Date::now().max(0.0) * 1_000_000.0) as u128
}

#[cfg(all(target_arch = "wasm32", not(feature = "wasm")))]
fn clock_nanos() -> u128 {
    0
}
