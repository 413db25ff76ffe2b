//! HTML around the sandboxed frame: the host page, the embed page and the
//! status panel shown in place of a game that is not ready.

use playbox_core::{GameRecord, SANDBOX_POLICY};

const PAGE_STYLE: &str = "body{margin:0;font-family:system-ui,sans-serif;background:#111;color:#eee}\
main{max-width:960px;margin:0 auto;padding:24px}\
.frame{width:100%;aspect-ratio:16/9;border:0;background:#000;display:block}\
.meta{color:#aaa;font-size:14px}\
.panel{display:flex;align-items:center;justify-content:center;height:100vh;text-align:center}\
.panel p{margin:4px 0}";

pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

fn frame(session: &str, title: &str) -> String {
    format!(
        "<iframe class=\"frame\" src=\"/s/{id}/\" title=\"{title}\" sandbox=\"{policy}\" allow=\"autoplay; fullscreen\"></iframe>\n\
<script>addEventListener(\"pagehide\",function(){{navigator.sendBeacon(\"/s/{id}/close\")}});</script>",
        id = escape_html(session),
        title = escape_html(title),
        policy = SANDBOX_POLICY,
    )
}

fn document(title: &str, body: &str) -> String {
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\"><title>{}</title><style>{}</style></head>\n<body>{}</body></html>\n",
        escape_html(title),
        PAGE_STYLE,
        body
    )
}

/// Full player page: game details above the frame.
pub fn play_page(record: &GameRecord, session: &str) -> String {
    let mut body = String::from("<main>\n");
    body.push_str(&format!("<h1>{}</h1>\n", escape_html(&record.title)));
    let mut meta = Vec::new();
    if let Some(author) = record.author_name.as_deref().filter(|a| !a.is_empty()) {
        meta.push(format!("by {}", escape_html(author)));
    }
    meta.push(format!("{} plays", record.plays));
    body.push_str(&format!("<p class=\"meta\">{}</p>\n", meta.join(" &middot; ")));
    body.push_str(&frame(session, &record.title));
    if let Some(description) = record.description.as_deref().filter(|d| !d.is_empty()) {
        body.push_str(&format!("\n<p>{}</p>", escape_html(description)));
    }
    body.push_str(&format!(
        "\n<button onclick=\"fetch('/s/{id}/reload',{{method:'POST'}}).then(function(){{document.querySelector('.frame').src='/s/{id}/'}})\">Restart</button>\n</main>",
        id = escape_html(session)
    ));
    document(&record.title, &body)
}

/// Frame only, for third-party pages.
pub fn embed_page(title: &str, session: &str) -> String {
    document(
        title,
        &format!("<style>.frame{{aspect-ratio:auto;height:100vh}}</style>{}", frame(session, title)),
    )
}

/// Panel rendered inside the frame. A loading panel refreshes itself
/// until the document is ready.
pub fn status_panel(message: &str, refresh: bool) -> String {
    let refresh_tag = if refresh {
        "<meta http-equiv=\"refresh\" content=\"1\">"
    } else {
        ""
    };
    let mut lines = message.splitn(2, ": ");
    let headline = lines.next().unwrap_or_default();
    let detail = lines
        .next()
        .map(|d| format!("<p class=\"meta\">{}</p>", escape_html(d)))
        .unwrap_or_default();
    format!(
        "<!doctype html>\n<html><head><meta charset=\"utf-8\">{}<style>{}</style></head>\n<body><div class=\"panel\"><div><p>{}</p>{}</div></div></body></html>\n",
        refresh_tag,
        PAGE_STYLE,
        escape_html(headline),
        detail
    )
}

/// Whole-page error, used when there is no game to mount.
pub fn error_page(headline: &str, detail: &str) -> String {
    document(
        headline,
        &format!(
            "<main><h1>{}</h1><p class=\"meta\">{}</p></main>",
            escape_html(headline),
            escape_html(detail)
        ),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn escapes_markup_characters() {
        assert_eq!(
            escape_html(r#"<b>"Tom" & 'Jerry'</b>"#),
            "&lt;b&gt;&quot;Tom&quot; &amp; &#39;Jerry&#39;&lt;/b&gt;"
        );
    }

    #[test]
    fn play_page_shows_details_and_sandboxed_frame() {
        let mut record = GameRecord::new("coin-run", "Coin <Run>", "https://cdn/coin.zip");
        record.author_name = Some("mina".to_string());
        record.description = Some("Jump & collect".to_string());
        record.plays = 42;
        let html = play_page(&record, "abc123");
        assert!(html.contains("<h1>Coin &lt;Run&gt;</h1>"));
        assert!(html.contains("by mina &middot; 42 plays"));
        assert!(html.contains("src=\"/s/abc123/\""));
        assert!(html.contains("sandbox=\"allow-scripts\""));
        assert!(html.contains("Jump &amp; collect"));
        assert!(!html.contains("allow-same-origin"));
    }

    #[test]
    fn play_page_skips_missing_author() {
        let record = GameRecord::new("coin-run", "Coin Run", "https://cdn/coin.zip");
        let html = play_page(&record, "abc123");
        assert!(html.contains("<p class=\"meta\">0 plays</p>"));
    }

    #[test]
    fn loading_panel_refreshes_and_error_panel_does_not() {
        let loading = status_panel("Loading Coin Run...", true);
        assert!(loading.contains("http-equiv=\"refresh\""));
        assert!(loading.contains("<p>Loading Coin Run...</p>"));

        let failed = status_panel("Failed to load game: No index.html found in game ZIP", false);
        assert!(!failed.contains("refresh"));
        assert!(failed.contains("<p>Failed to load game</p>"));
        assert!(failed.contains("No index.html found in game ZIP"));
    }
}
