use std::thread;
use std::time::Duration;

use serde::Deserialize;
use serde_json::json;

use crate::collab::{GameCatalog, GameRecord, PlayNotifier};

#[derive(Deserialize)]
struct GameEnvelope {
    game: GameRecord,
}

/// `GET {api_base}/api/games/{slug}` -> `{"game": {...}}`.
pub struct HttpGameCatalog {
    api_base: String,
    agent: ureq::Agent,
}

impl HttpGameCatalog {
    pub fn new(api_base: &str) -> Self {
        Self {
            api_base: api_base.trim_end_matches('/').to_string(),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(15))
                .build(),
        }
    }
}

impl GameCatalog for HttpGameCatalog {
    fn lookup(&self, slug: &str) -> Result<Option<GameRecord>, String> {
        let url = format!("{}/api/games/{}", self.api_base, encode_segment(slug));
        let response = match self.agent.get(&url).call() {
            Ok(response) => response,
            Err(ureq::Error::Status(404, _)) => return Ok(None),
            Err(err) => return Err(format!("game lookup {} {}", url, err)),
        };
        let text = response
            .into_string()
            .map_err(|e| format!("game lookup {} {}", url, e))?;
        let envelope: GameEnvelope =
            serde_json::from_str(&text).map_err(|e| format!("game lookup {} {}", url, e))?;
        let mut record = envelope.game;
        if record.slug.is_empty() {
            record.slug = slug.to_string();
        }
        Ok(Some(record))
    }
}

/// `POST {api_base}/api/increment-play` with `{"slug": ...}` on a
/// background thread; the caller never waits for the counter.
pub struct HttpPlayNotifier {
    endpoint: String,
    agent: ureq::Agent,
}

impl HttpPlayNotifier {
    pub fn new(api_base: &str) -> Self {
        Self {
            endpoint: format!("{}/api/increment-play", api_base.trim_end_matches('/')),
            agent: ureq::AgentBuilder::new()
                .timeout(Duration::from_secs(10))
                .build(),
        }
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

impl PlayNotifier for HttpPlayNotifier {
    fn notify_play(&self, slug: &str) -> Result<(), String> {
        let agent = self.agent.clone();
        let endpoint = self.endpoint.clone();
        let slug = slug.to_string();
        thread::Builder::new()
            .name("play-counter".to_string())
            .spawn(move || {
                let body = json!({ "slug": slug }).to_string();
                let sent = agent
                    .post(&endpoint)
                    .set("Content-Type", "application/json")
                    .send_string(&body);
                if let Err(err) = sent {
                    log::warn!("Failed to track play slug={} {}", slug, err);
                }
            })
            .map(|_| ())
            .map_err(|e| e.to_string())
    }
}

fn encode_segment(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for byte in text.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(byte as char)
            }
            other => out.push_str(&format!("%{:02X}", other)),
        }
    }
    out
}
