use std::collections::{HashMap, VecDeque};
use std::net::{TcpListener, TcpStream};
use std::sync::{Arc, Mutex, MutexGuard};
use std::thread;

use playbox_core::{
    mount_game, BundleSource, ContentKind, GameCatalog, GameRecord, HttpBundleSource,
    HttpGameCatalog, HttpPlayNotifier, LoadError, LoadTask, LogPlayNotifier, MemoryHandleStore,
    PlayNotifier, PlayState, SandboxHost, StaticGameCatalog, ENTRY_POINT, SANDBOX_POLICY,
};

use super::config::{ServeConfig, ServeFlags};
use super::diag::build_diag;
use super::http::{read_request, Request, Response};
use super::page;

/// Path under which handle contents are served.
const HANDLE_ROUTE: &str = "/h";

type SharedHost = Arc<Mutex<SandboxHost>>;

#[derive(Default)]
struct Sessions {
    order: VecDeque<String>,
    hosts: HashMap<String, SharedHost>,
}

/// Local sandbox server state: one host per open player page.
pub struct Server {
    store: Arc<MemoryHandleStore>,
    public_base: String,
    catalog: Arc<dyn GameCatalog>,
    notifier: Arc<dyn PlayNotifier>,
    source: Arc<dyn BundleSource>,
    sessions: Mutex<Sessions>,
    max_sessions: usize,
}

impl Server {
    pub fn new(
        public_base: &str,
        max_sessions: usize,
        catalog: Arc<dyn GameCatalog>,
        notifier: Arc<dyn PlayNotifier>,
        source: Arc<dyn BundleSource>,
    ) -> Self {
        let public_base = public_base.trim_end_matches('/').to_string();
        Self {
            store: Arc::new(MemoryHandleStore::new(format!("{}{}", public_base, HANDLE_ROUTE))),
            public_base,
            catalog,
            notifier,
            source,
            sessions: Mutex::new(Sessions::default()),
            max_sessions: max_sessions.max(1),
        }
    }

    pub fn store(&self) -> &MemoryHandleStore {
        &self.store
    }

    pub fn session_count(&self) -> usize {
        lock(&self.sessions).hosts.len()
    }

    pub fn route(self: &Arc<Self>, request: &Request) -> Response {
        if request.method == "OPTIONS" {
            return Response::empty("204 No Content");
        }
        let path = request.path.as_str();
        let segments: Vec<&str> = path.trim_start_matches('/').splitn(3, '/').collect();
        match (request.method.as_str(), segments.as_slice()) {
            ("GET", [""]) => Response::text("200 OK", "playbox"),
            ("GET", ["play", slug]) if !slug.is_empty() => self.open_session(slug, false),
            ("GET", ["embed", slug]) if !slug.is_empty() => self.open_session(slug, true),
            ("GET", ["s", id]) => Response::empty("303 See Other").with_header("Location", format!("/s/{}/", id)),
            ("GET", ["s", id, rest]) => self.serve_session(id, rest),
            ("POST", ["s", id, "reload"]) => self.reload(id),
            ("POST", ["s", id, "close"]) => self.close(id),
            ("GET", ["h", ..]) => self.serve_handle(path),
            ("GET", _) | ("POST", _) => Response::text("404 Not Found", "not found"),
            _ => Response::empty("405 Method Not Allowed"),
        }
    }

    fn open_session(self: &Arc<Self>, slug: &str, embed: bool) -> Response {
        let (host, record) = mount_game(
            self.catalog.as_ref(),
            slug,
            self.store.clone(),
            self.notifier.clone(),
        );
        let record = match record {
            Some(record) => record,
            None => return mount_failure(host.state()),
        };
        let (id, shared) = self.register(host);
        let task = lock(&shared).begin_load();
        self.spawn_load(&shared, task);
        let body = if embed {
            page::embed_page(&record.title, &id)
        } else {
            page::play_page(&record, &id)
        };
        Response::html("200 OK", body)
    }

    fn register(&self, host: SandboxHost) -> (String, SharedHost) {
        let id = host.mount_id().to_string();
        let shared = Arc::new(Mutex::new(host));
        let evicted = {
            let mut sessions = lock(&self.sessions);
            sessions.hosts.insert(id.clone(), shared.clone());
            sessions.order.push_back(id.clone());
            let mut evicted = Vec::new();
            while sessions.order.len() > self.max_sessions {
                if let Some(oldest) = sessions.order.pop_front() {
                    if let Some(host) = sessions.hosts.remove(&oldest) {
                        evicted.push((oldest, host));
                    }
                }
            }
            evicted
        };
        for (oldest, host) in evicted {
            log::info!("session={} evicted, cap={}", oldest, self.max_sessions);
            lock(&host).unmount();
        }
        (id, shared)
    }

    fn spawn_load(&self, host: &SharedHost, task: LoadTask) {
        let worker_host = host.clone();
        let source = self.source.clone();
        let spawned = thread::Builder::new()
            .name("bundle-load".to_string())
            .spawn(move || {
                let outcome = task.run(source.as_ref());
                lock(&worker_host).settle(outcome);
            });
        if let Err(err) = spawned {
            lock(host).fail(LoadError::internal(format!("load thread: {}", err)));
        }
    }

    fn session(&self, id: &str) -> Option<SharedHost> {
        lock(&self.sessions).hosts.get(id).cloned()
    }

    fn serve_session(&self, id: &str, rest: &str) -> Response {
        let Some(shared) = self.session(id) else {
            return Response::html("404 Not Found", page::status_panel("Session closed", false));
        };
        let host = lock(&shared);
        let is_document = rest.is_empty() || rest == ENTRY_POINT;
        match (host.state(), host.session()) {
            (PlayState::Ready, Some(session)) => {
                if is_document {
                    return document_response(session.document().as_bytes().to_vec());
                }
                match session.table().resolve_request(rest) {
                    Some(entry) => self.blob_response(entry.handle.as_str()),
                    None => Response::text("404 Not Found", "not in bundle"),
                }
            }
            (PlayState::Loading, _) if is_document => {
                let text = host.status_text().unwrap_or_default();
                Response::html("200 OK", page::status_panel(&text, true))
            }
            (PlayState::Loading, _) => Response::text("503 Service Unavailable", "loading"),
            (PlayState::Error(_), _) => {
                let text = host.status_text().unwrap_or_default();
                Response::html("200 OK", page::status_panel(&text, false))
            }
            _ => Response::html("410 Gone", page::status_panel("Session closed", false)),
        }
    }

    fn serve_handle(&self, path: &str) -> Response {
        let key = format!("{}{}", self.public_base, path);
        self.blob_response(&key)
    }

    fn blob_response(&self, handle: &str) -> Response {
        match self.store.get(handle) {
            Some(blob) if blob.kind == ContentKind::Document => document_response(blob.bytes.to_vec()),
            Some(blob) => Response::new("200 OK", blob.kind.mime(), blob.bytes.to_vec()),
            None => Response::text("404 Not Found", "handle revoked"),
        }
    }

    fn reload(&self, id: &str) -> Response {
        let Some(shared) = self.session(id) else {
            return Response::text("404 Not Found", "no such session");
        };
        let task = lock(&shared).reload();
        self.spawn_load(&shared, task);
        Response::text("202 Accepted", "reloading")
    }

    fn close(&self, id: &str) -> Response {
        let removed = {
            let mut sessions = lock(&self.sessions);
            sessions.order.retain(|existing| existing != id);
            sessions.hosts.remove(id)
        };
        match removed {
            Some(host) => {
                lock(&host).unmount();
                Response::empty("204 No Content")
            }
            None => Response::text("404 Not Found", "no such session"),
        }
    }
}

fn document_response(bytes: Vec<u8>) -> Response {
    Response::new("200 OK", "text/html; charset=utf-8", bytes)
        .with_header("Content-Security-Policy", format!("sandbox {}", SANDBOX_POLICY))
}

fn mount_failure(state: &PlayState) -> Response {
    match state {
        PlayState::Error(err @ LoadError::GameNotFound(_)) => Response::html(
            "404 Not Found",
            page::error_page(err.headline(), &err.to_string()),
        ),
        PlayState::Error(err) => Response::html(
            "502 Bad Gateway",
            page::error_page(err.headline(), &err.to_string()),
        ),
        _ => Response::text("500 Internal Server Error", "mount failed"),
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|e| e.into_inner())
}

fn handle_connection(server: &Arc<Server>, stream: &mut TcpStream) -> Result<(), String> {
    let Some(request) = read_request(stream)? else {
        return Ok(());
    };
    let response = server.route(&request);
    log::debug!("{} {} -> {}", request.method, request.path, response.status());
    response.write_to(stream)
}

pub fn bind(listen: &str) -> Result<TcpListener, String> {
    TcpListener::bind(listen).map_err(|e| {
        build_diag(
            "E_PLAYBOX_BIND",
            &format!("{} {}", listen, e),
            None,
            Some("pass --listen or set PLAYBOX_LISTEN".to_string()),
        )
    })
}

/// Accept loop; one thread per connection.
pub fn run_server(server: Arc<Server>, listener: TcpListener) -> Result<(), String> {
    for stream in listener.incoming() {
        match stream {
            Ok(mut stream) => {
                let server = server.clone();
                thread::spawn(move || {
                    if let Err(err) = handle_connection(&server, &mut stream) {
                        log::debug!("connection dropped: {}", err);
                    }
                });
            }
            Err(err) => log::warn!("accept failed: {}", err),
        }
    }
    Ok(())
}

fn listen_url(listener: &TcpListener, listen: &str) -> String {
    match listener.local_addr() {
        Ok(addr) => format!("http://{}", addr),
        Err(_) => format!("http://{}", listen),
    }
}

pub fn run_serve(flags: ServeFlags) -> Result<(), String> {
    let config = ServeConfig::from_flags(flags)?;
    let api_base = config.api_base.clone().ok_or_else(|| {
        build_diag(
            "E_PLAYBOX_CONFIG",
            "catalog API base missing",
            None,
            Some("pass --api-base or set PLAYBOX_API_BASE".to_string()),
        )
    })?;
    let catalog = Arc::new(HttpGameCatalog::new(&api_base));
    let notifier = Arc::new(HttpPlayNotifier::new(&api_base));
    let listener = bind(&config.listen)?;
    let server = Arc::new(Server::new(
        &config.public_base,
        config.max_sessions,
        catalog,
        notifier,
        Arc::new(HttpBundleSource::default()),
    ));
    println!("playbox_listen={}", listen_url(&listener, &config.listen));
    println!("playbox_api_base={}", api_base);
    println!("playbox_max_sessions={}", config.max_sessions);
    run_server(server, listener)
}

pub fn run_play(bundle_url: &str, title: Option<String>, slug: &str, flags: ServeFlags) -> Result<(), String> {
    let config = ServeConfig::from_flags(flags)?;
    let title = title.unwrap_or_else(|| slug.to_string());
    let record = GameRecord::new(slug, title, bundle_url);
    let listener = bind(&config.listen)?;
    let base = listen_url(&listener, &config.listen);
    let server = Arc::new(Server::new(
        &config.public_base,
        config.max_sessions,
        Arc::new(StaticGameCatalog::new(record)),
        Arc::new(LogPlayNotifier),
        Arc::new(HttpBundleSource::default()),
    ));
    println!("playbox_listen={}", base);
    println!("playbox_play_url={}/play/{}", base, slug);
    run_server(server, listener)
}
