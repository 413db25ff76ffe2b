use serde::Serialize;
use time::format_description::well_known::Rfc3339;
use time::OffsetDateTime;

use playbox_core::{BundleArchive, ContentKind, ENTRY_POINT};

use super::open_bundle;

#[derive(Debug, Serialize)]
pub struct InspectReport {
    pub bundle_url: String,
    pub bundle_sha256: String,
    pub inspected_at: String,
    pub entry_point: Option<String>,
    pub entries: Vec<EntryReport>,
}

#[derive(Debug, Serialize)]
pub struct EntryReport {
    pub path: String,
    pub is_dir: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<ContentKind>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime: Option<&'static str>,
    pub size: u64,
}

pub fn build_report(bundle_url: &str, archive: &BundleArchive, inspected_at: String) -> InspectReport {
    let entries = archive
        .entries()
        .iter()
        .map(|entry| {
            let kind = (!entry.is_dir).then(|| ContentKind::from_path(&entry.path));
            EntryReport {
                path: entry.path.clone(),
                is_dir: entry.is_dir,
                kind,
                mime: kind.map(ContentKind::mime),
                size: entry.size,
            }
        })
        .collect();
    InspectReport {
        bundle_url: bundle_url.to_string(),
        bundle_sha256: archive.sha256().to_string(),
        inspected_at,
        entry_point: archive.entry_point().ok().map(|_| ENTRY_POINT.to_string()),
        entries,
    }
}

pub fn render_lines(report: &InspectReport) -> Vec<String> {
    let mut lines = vec![
        format!("bundle_url={}", report.bundle_url),
        format!("bundle_sha256={}", report.bundle_sha256),
        format!("bundle_entries={}", report.entries.len()),
        format!(
            "entry_point={}",
            report.entry_point.as_deref().unwrap_or("missing")
        ),
    ];
    for entry in &report.entries {
        if entry.is_dir {
            lines.push(format!("dir path={}", entry.path));
        } else {
            lines.push(format!(
                "file path={} mime={} size={}",
                entry.path,
                entry.mime.unwrap_or("application/octet-stream"),
                entry.size
            ));
        }
    }
    lines
}

pub fn run_inspect(bundle_url: &str, json: bool) -> Result<(), String> {
    let archive = open_bundle(bundle_url)?;
    let inspected_at = OffsetDateTime::now_utc()
        .format(&Rfc3339)
        .map_err(|e| e.to_string())?;
    let report = build_report(bundle_url, &archive, inspected_at);
    if json {
        let text = serde_json::to_string_pretty(&report).map_err(|e| e.to_string())?;
        println!("{}", text);
    } else {
        for line in render_lines(&report) {
            println!("{}", line);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::fixtures::{game_zip, zip_bytes};

    #[test]
    fn report_lists_files_and_directories() {
        let archive = BundleArchive::open(game_zip()).expect("archive");
        let report = build_report("coin.zip", &archive, "2026-01-01T00:00:00Z".to_string());
        assert_eq!(report.entry_point.as_deref(), Some("index.html"));
        let lines = render_lines(&report);
        assert_eq!(lines[0], "bundle_url=coin.zip");
        assert!(lines[1].starts_with("bundle_sha256=sha256:"));
        assert!(lines.contains(&"dir path=css/".to_string()));
        assert!(lines.contains(&"file path=css/style.css mime=text/css size=14".to_string()));
        assert!(lines.contains(&"file path=images/coin.png.png mime=image/png size=9".to_string()));
    }

    #[test]
    fn report_flags_missing_entry_point() {
        let archive = BundleArchive::open(zip_bytes(&[("game/index.html", b"<html></html>".as_slice())]))
            .expect("archive");
        let report = build_report("nested.zip", &archive, String::new());
        assert!(render_lines(&report).contains(&"entry_point=missing".to_string()));
    }

    #[test]
    fn json_report_uses_snake_case_kinds() {
        let archive = BundleArchive::open(game_zip()).expect("archive");
        let report = build_report("coin.zip", &archive, String::new());
        let value = serde_json::to_value(&report).expect("json");
        let game = value["entries"]
            .as_array()
            .expect("entries")
            .iter()
            .find(|e| e["path"] == "js/game.js")
            .expect("script entry");
        assert_eq!(game["kind"], "script");
        assert_eq!(game["mime"], "text/javascript");
        assert!(value["entries"][1].get("kind").is_none());
    }
}
