use std::fmt::Write as _;
use std::fs::File;
use std::path::Path;

use anyhow::{Context, Result};

use crate::types::ScanState;

const URL_WIDTH: usize = 60;

/// One-line progress indicator, e.g. `[scanning]  42%  Running XSS...  (3 vulns, 12 urls, open)`.
pub fn status_line(state: &ScanState) -> String {
    format!(
        "[{}] {:>3}%  {}  ({} vulns, {} urls, {})",
        state.phase.as_str(),
        state.progress,
        state.current_action,
        state.vuln_count,
        state.discovered_urls.len(),
        state.connection_status.as_str(),
    )
}

/// Multi-section plain-text summary of a scan view.
pub fn summary(state: &ScanState) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "Scan status : {}", state.current_action);
    let _ = writeln!(out, "  phase      : {}", state.phase.as_str());
    let _ = writeln!(out, "  progress   : {}%", state.progress);
    let _ = writeln!(out, "  vulns      : {}", state.vuln_count);
    let _ = writeln!(out, "  connection : {}", state.connection_status.as_str());
    let _ = writeln!(out, "  finished   : {}", state.finished);

    let recon = &state.reconnaissance;
    if !recon.open_ports.is_empty() {
        let service_w = recon
            .open_ports
            .iter()
            .map(|p| p.service.len())
            .max()
            .unwrap_or(0)
            .max("service".len());
        let _ = writeln!(out, "\nOpen ports: {}", recon.open_ports.len());
        let _ = writeln!(out, "{:>5}  {:<service_w$}  state", "port", "service");
        let _ = writeln!(out, "{:-<5}  {:-<service_w$}  -----", "", "");
        for p in &recon.open_ports {
            let _ = writeln!(out, "{:>5}  {:<service_w$}  {}", p.port, p.service, p.state);
        }
    }
    if let Some(tech) = &recon.technologies {
        let _ = writeln!(out, "\nTechnologies:");
        for (k, v) in tech {
            let shown = v.as_str().map(str::to_owned).unwrap_or_else(|| v.to_string());
            let _ = writeln!(out, "  {k:<10} {shown}");
        }
    }
    list_section(&mut out, "Subdomains", recon.subdomains.iter().map(String::as_str));
    list_section(&mut out, "Directories", recon.directories.iter().map(String::as_str));
    list_section(&mut out, "Discovered URLs", state.discovered_urls.iter());
    list_section(
        &mut out,
        "Active payloads",
        state.active_payloads.iter().map(String::as_str),
    );
    out
}

fn list_section<'a>(out: &mut String, title: &str, items: impl Iterator<Item = &'a str>) {
    let items: Vec<&str> = items.collect();
    if items.is_empty() {
        return;
    }
    let _ = writeln!(out, "\n{title}: {}", items.len());
    for item in items {
        let _ = writeln!(out, "  - {}", truncate(item, URL_WIDTH));
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut cut: String = s.chars().take(max.saturating_sub(3)).collect();
    cut.push_str("...");
    cut
}

/// Write the state as pretty JSON.
pub fn write_state_json(path: &Path, state: &ScanState) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("failed to create output file: {}", path.display()))?;
    serde_json::to_writer_pretty(file, state)
        .with_context(|| format!("failed to write scan state to {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::ScanEvent;

    fn sample() -> ScanState {
        let mut s = ScanState::new();
        for msg in [
            r#"{"action":"Port Scanning","progress":7,"phase":"reconnaissance","port_found":{"port":443,"service":"https"}}"#,
            r#"{"technologies":{"server":"Nginx"}}"#,
            r#"{"url_found":"/login"}"#,
        ] {
            s.apply(&ScanEvent::from_text(msg).unwrap());
        }
        s
    }

    #[test]
    fn status_line_mentions_phase_and_progress() {
        let line = status_line(&sample());
        assert!(line.starts_with("[reconnaissance]   7%  Port Scanning"));
        assert!(line.contains("1 urls"));
    }

    #[test]
    fn summary_lists_findings() {
        let text = summary(&sample());
        assert!(text.contains("Open ports: 1"));
        assert!(text.contains("  443  https"));
        assert!(text.contains("server     Nginx"));
        assert!(text.contains("  - /login"));
        assert!(!text.contains("Subdomains"));
    }

    #[test]
    fn state_json_round_trips_through_a_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        write_state_json(&path, &sample()).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let v: serde_json::Value = serde_json::from_str(&text).unwrap();
        assert_eq!(v["currentAction"], "Port Scanning");
        assert_eq!(v["connectionStatus"], "connecting");
        assert_eq!(v["discoveredUrls"], serde_json::json!(["/login"]));
        assert_eq!(v["reconnaissance"]["openPorts"][0]["port"], 443);
        assert_eq!(v["activePayloads"], serde_json::json!([]));
    }

    #[test]
    fn writing_into_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope").join("state.json");
        let err = write_state_json(&path, &sample()).unwrap_err();
        assert!(err.to_string().contains("failed to create output file"));
    }

    #[test]
    fn long_entries_are_truncated() {
        let long = "x".repeat(100);
        let t = truncate(&long, 10);
        assert_eq!(t, "xxxxxxx...");
    }
}
