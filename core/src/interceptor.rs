use std::sync::OnceLock;

use regex::Regex;

use crate::error::LoadError;
use crate::resource::ResourceTable;

pub const TABLE_ELEMENT_ID: &str = "playbox-resource-table";

// Runs before any game script. Resolution order must stay in step with
// ResourceTable::resolve_request.
const INTERCEPTOR_JS: &str = r##"(function () {
  var originalFetch = window.fetch;
  var originalOpen = XMLHttpRequest.prototype.open;
  var dataNode = document.getElementById("playbox-resource-table");
  var table = JSON.parse(dataNode ? dataNode.textContent : "{}");
  var doubled = /\.(png|jpg|jpeg|gif|mp3|wav|ogg)\.(png|jpg|jpeg|gif|mp3|wav|ogg)$/i;
  var byName = Object.create(null);

  function owns(map, key) {
    return Object.prototype.hasOwnProperty.call(map, key);
  }

  function has(key) {
    return owns(table, key);
  }

  function repair(name) {
    var m = doubled.exec(name);
    if (m && m[1].toLowerCase() === m[2].toLowerCase()) {
      return name.slice(0, name.length - m[2].length - 1);
    }
    return null;
  }

  function remember(name, key, repaired) {
    if (!owns(byName, name)) byName[name] = [];
    byName[name].push([repaired ? 1 : 0, key]);
  }

  Object.keys(table).sort().forEach(function (key) {
    var name = key.split("/").pop();
    remember(name, key, false);
    var fixed = repair(name);
    if (fixed) remember(fixed, key, true);
  });
  Object.keys(byName).forEach(function (name) {
    byName[name].sort(function (a, b) {
      if (a[0] !== b[0]) return a[0] - b[0];
      return a[1] < b[1] ? -1 : a[1] > b[1] ? 1 : 0;
    });
  });

  function nested(name) {
    var keys = owns(byName, name) ? byName[name] : [];
    for (var i = 0; i < keys.length; i++) {
      if (keys[i][1].indexOf("/") >= 0) return table[keys[i][1]];
    }
    return null;
  }

  function resolve(request) {
    if (has(request)) return table[request];
    var cut = request.search(/[?#]/);
    var path = cut >= 0 ? request.slice(0, cut) : request;
    var relative = path.replace(/^(\.\/)+/, "").replace(/^\/+/, "");
    if (has(relative)) return table[relative];
    var name = path.split("/").pop();
    if (!name) return null;
    if (has(name)) return table[name];
    var fixed = repair(name);
    if (fixed && has(fixed)) return table[fixed];
    return nested(name) || (fixed ? nested(fixed) : null);
  }

  function isRequest(input) {
    return typeof Request !== "undefined" && input instanceof Request;
  }

  function requestText(input) {
    if (typeof input === "string") return input;
    if (isRequest(input)) return input.url;
    return String(input);
  }

  window.fetch = function (input) {
    var args = Array.prototype.slice.call(arguments);
    var handle = resolve(requestText(input));
    if (handle) args[0] = isRequest(input) ? new Request(handle, input) : handle;
    return originalFetch.apply(window, args);
  };

  XMLHttpRequest.prototype.open = function (method, url) {
    var args = Array.prototype.slice.call(arguments);
    var handle = resolve(requestText(url));
    if (handle) args[1] = handle;
    return originalOpen.apply(this, args);
  };
})();"##;

/// Serializes path -> handle as JSON that is safe inside a `<script>`
/// element whatever the archive paths contain.
pub fn table_data(table: &ResourceTable) -> Result<String, LoadError> {
    let json = serde_json::to_string(&table.handle_map())
        .map_err(|e| LoadError::internal(format!("resource table encode failed: {}", e)))?;
    let mut out = String::with_capacity(json.len());
    for ch in json.chars() {
        match ch {
            '<' => out.push_str("\\u003c"),
            '>' => out.push_str("\\u003e"),
            '&' => out.push_str("\\u0026"),
            '\u{2028}' => out.push_str("\\u2028"),
            '\u{2029}' => out.push_str("\\u2029"),
            other => out.push(other),
        }
    }
    Ok(out)
}

pub fn interceptor_markup(table: &ResourceTable) -> Result<String, LoadError> {
    let data = table_data(table)?;
    Ok(format!(
        "<script type=\"application/json\" id=\"{}\">{}</script><script>{}</script>",
        TABLE_ELEMENT_ID, data, INTERCEPTOR_JS
    ))
}

fn head_open() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)<head(?:\s[^>]*)?>").unwrap_or_else(|e| panic!("head pattern: {}", e))
    })
}

fn html_open() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"(?i)<html(?:\s[^>]*)?>").unwrap_or_else(|e| panic!("html pattern: {}", e))
    })
}

/// Inserts `markup` right after the opening `<head>`; documents without
/// one get it after `<html>`, or at the very start.
pub fn inject(document: &str, markup: &str) -> String {
    let at = head_open()
        .find(document)
        .or_else(|| html_open().find(document))
        .map(|m| m.end())
        .unwrap_or(0);
    let mut out = String::with_capacity(document.len() + markup.len());
    out.push_str(&document[..at]);
    out.push_str(markup);
    out.push_str(&document[at..]);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::fixtures::table_of;
    use boa_engine::{Context, Source};
    use serde_json::Value;

    // Just enough of a page for the interceptor: every outgoing request
    // lands in `sent`.
    const PAGE_STUBS: &str = r#"
var window = globalThis;
var sent = [];
function Request(url, init) {
  this.url = String(url);
  this.method = (init && init.method) || "GET";
}
window.fetch = function (input, init) {
  var wrapped = input instanceof Request;
  sent.push({
    via: "fetch",
    url: wrapped ? input.url : String(input),
    method: wrapped ? input.method : (init && init.method) || "GET",
    args: arguments.length
  });
  return "response";
};
function XMLHttpRequest() {}
XMLHttpRequest.prototype.open = function (method, url, async) {
  sent.push({ via: "xhr", url: String(url), method: method, args: arguments.length, async: async });
};
"#;

    /// Runs the markup the way a frame would, then `calls`; returns what
    /// reached the network layer.
    fn run_in_page(table: &ResourceTable, calls: &str) -> Vec<Value> {
        let markup = interceptor_markup(table).expect("markup");
        let data_start = markup.find('>').expect("data open") + 1;
        let data_end = markup.find("</script>").expect("data close");
        let script_start = markup.find("<script>").expect("script open") + "<script>".len();
        let script_end = markup.rfind("</script>").expect("script close");
        let document = format!(
            "var document = {{ getElementById: function (id) {{ return id === {} ? {{ textContent: {} }} : null; }} }};",
            serde_json::to_string(TABLE_ELEMENT_ID).expect("id"),
            serde_json::to_string(&markup[data_start..data_end]).expect("data"),
        );
        let mut context = Context::default();
        for code in [PAGE_STUBS, document.as_str(), &markup[script_start..script_end], calls] {
            context
                .eval(Source::from_bytes(code.as_bytes()))
                .unwrap_or_else(|err| panic!("script failed: {}", err));
        }
        let sent = context
            .eval(Source::from_bytes("JSON.stringify(sent)".as_bytes()))
            .expect("sent");
        let text = sent
            .to_string(&mut context)
            .expect("stringify")
            .to_std_string()
            .expect("utf16");
        serde_json::from_str(&text).expect("sent json")
    }

    fn game_table() -> ResourceTable {
        table_of(&["index.html", "images/coin.png.png", "js/app.js", "levels/one.json"])
    }

    #[test]
    fn page_fetch_and_xhr_go_to_handles() {
        let sent = run_in_page(
            &game_table(),
            r#"
fetch("assets/coin.png");
fetch("./js/app.js", { method: "POST" });
new XMLHttpRequest().open("GET", "levels/one.json?v=3", false);
"#,
        );
        assert_eq!(sent.len(), 3);
        assert_eq!(sent[0]["url"], "blob:test/1");
        assert_eq!(sent[1]["url"], "blob:test/2");
        assert_eq!(sent[1]["method"], "POST");
        assert_eq!(sent[1]["args"], 2);
        assert_eq!(sent[2]["via"], "xhr");
        assert_eq!(sent[2]["url"], "blob:test/3");
        assert_eq!(sent[2]["args"], 3);
        assert_eq!(sent[2]["async"], false);
    }

    #[test]
    fn unmatched_requests_leave_the_page_unchanged() {
        let sent = run_in_page(
            &game_table(),
            r#"
fetch("https://external.example.com/analytics.js");
fetch("https://api.example.com/constructor");
fetch("https://api.example.com/hasOwnProperty?x=1");
new XMLHttpRequest().open("GET", "/__proto__");
"#,
        );
        let urls: Vec<&str> = sent.iter().filter_map(|s| s["url"].as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://external.example.com/analytics.js",
                "https://api.example.com/constructor",
                "https://api.example.com/hasOwnProperty?x=1",
                "/__proto__",
            ]
        );
        assert_eq!(sent[0]["args"], 1);
    }

    #[test]
    fn prototype_named_files_still_get_wrapped() {
        let table = table_of(&["data/constructor", "data/toString.png.png", "js/app.js"]);
        let sent = run_in_page(
            &table,
            r#"
fetch("constructor");
fetch("assets/toString.png");
fetch("js/app.js");
"#,
        );
        let urls: Vec<&str> = sent.iter().filter_map(|s| s["url"].as_str()).collect();
        assert_eq!(urls, vec!["blob:test/0", "blob:test/1", "blob:test/2"]);
    }

    #[test]
    fn request_objects_keep_their_method() {
        let sent = run_in_page(
            &game_table(),
            r#"
fetch(new Request("levels/one.json", { method: "PUT" }));
fetch(new Request("https://external.example.com/beacon", { method: "POST" }));
"#,
        );
        assert_eq!(sent[0]["url"], "blob:test/3");
        assert_eq!(sent[0]["method"], "PUT");
        assert_eq!(sent[1]["url"], "https://external.example.com/beacon");
        assert_eq!(sent[1]["method"], "POST");
    }

    #[test]
    fn page_resolution_matches_resolve_request() {
        let table = table_of(&[
            "index.html",
            "coin.png",
            "images/coin.png.png",
            "sfx/jump.wav.wav",
            "levels/one.json",
            "deep/levels/one.json",
        ]);
        let requests = [
            "coin.png",
            "/coin.png",
            "assets/jump.wav",
            "levels/one.json#start",
            "./deep/levels/one.json",
            "other/one.json",
            "images/missing.gif",
            "https://cdn.example.com/",
        ];
        let calls: String = requests
            .iter()
            .map(|r| format!("fetch({});\n", serde_json::to_string(r).expect("request")))
            .collect();
        let sent = run_in_page(&table, &calls);
        for (request, seen) in requests.iter().zip(&sent) {
            let expected = table
                .resolve_request(request)
                .map(|entry| entry.handle.as_str())
                .unwrap_or(*request);
            assert_eq!(seen["url"], expected, "request {}", request);
        }
    }

    #[test]
    fn markup_goes_right_after_head_open() {
        let doc = "<!doctype html><html><HEAD data-x=\"1\"><script src=\"game.js\"></script></HEAD></html>";
        let out = inject(doc, "<!--x-->");
        assert_eq!(
            out,
            "<!doctype html><html><HEAD data-x=\"1\"><!--x--><script src=\"game.js\"></script></HEAD></html>"
        );
    }

    #[test]
    fn header_tag_is_not_mistaken_for_head() {
        let doc = "<html><body><header>hi</header></body></html>";
        assert_eq!(inject(doc, "<!--x-->"), "<html><!--x--><body><header>hi</header></body></html>");
    }

    #[test]
    fn bare_fragment_gets_markup_prepended() {
        assert_eq!(inject("<canvas></canvas>", "<!--x-->"), "<!--x--><canvas></canvas>");
    }

    #[test]
    fn hostile_paths_cannot_close_the_data_element() {
        let table = table_of(&["</script><script>alert(1)</script>.png", "a\"b.js", "x&y\u{2028}.js"]);
        let markup = interceptor_markup(&table).expect("markup");
        let data_start = markup.find('>').expect("open tag") + 1;
        let data_end = markup.find("</script>").expect("close tag");
        let data = &markup[data_start..data_end];
        assert!(!data.contains('<'));
        assert!(!data.contains('\u{2028}'));
        let decoded: serde_json::Value = serde_json::from_str(data).expect("valid json");
        assert!(decoded.get("</script><script>alert(1)</script>.png").is_some());
        assert!(decoded.get("a\"b.js").is_some());
    }

    #[test]
    fn script_is_the_same_for_every_table() {
        let first = interceptor_markup(&table_of(&["a.js"])).expect("markup");
        let second = interceptor_markup(&table_of(&["b/c.png", "d.css"])).expect("markup");
        let script = |m: &str| m[m.find("<script>").expect("script")..].to_string();
        assert_eq!(script(&first), script(&second));
        assert!(first.contains(TABLE_ELEMENT_ID));
    }
}
