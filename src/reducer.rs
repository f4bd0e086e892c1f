//! Folding of decoded events into [`ScanState`].
//!
//! Pure: no I/O, no clock, no failure path. Each recognized field of an event
//! is applied independently, and all of them land in one step.
use crate::event::ScanEvent;
use crate::types::{ScanState, COMPLETED_ACTION};

/// Returns the state after applying `event`.
pub fn reduce(mut state: ScanState, event: &ScanEvent) -> ScanState {
    state.apply(event);
    state
}

/// Format one line for the active-payloads view.
pub fn format_payload(scanner: Option<&str>, payload: &str) -> String {
    format!("[{}] Testing: {}", scanner.unwrap_or("unknown"), payload)
}

impl ScanState {
    /// Apply `event` in place. Returns `true` if this event finished the scan,
    /// i.e. it is the first `Completed` action seen.
    pub fn apply(&mut self, event: &ScanEvent) -> bool {
        if let Some(action) = &event.action {
            self.current_action.clone_from(action);
        }
        if let Some(line) = &event.log {
            self.log_lines.push(line.clone());
        }
        if let Some(progress) = event.progress {
            self.progress = progress;
        }
        if let Some(phase) = event.phase {
            self.phase = phase;
        }
        if let Some(count) = event.vuln_count {
            self.vuln_count = count;
        }

        let recon = &mut self.reconnaissance;
        if let Some(port) = &event.port_found {
            recon.open_ports.push(port.clone());
        }
        if let Some(sub) = &event.subdomain_found {
            recon.subdomains.push(sub.clone());
        }
        if let Some(dir) = &event.directory_found {
            recon.directories.push(dir.clone());
        }
        if let Some(tech) = &event.technologies {
            recon.technologies = Some(tech.clone());
        }

        if let Some(url) = &event.url_found {
            self.discovered_urls.insert(url);
        }
        if let Some(batch) = &event.discovered_urls {
            self.discovered_urls.extend(batch.iter().map(String::as_str));
        }

        if let Some(payload) = &event.payload {
            self.active_payloads
                .push(format_payload(event.scanner.as_deref(), payload));
        }

        let completes = event.action.as_deref() == Some(COMPLETED_ACTION);
        if completes && !self.finished {
            self.finished = true;
            return true;
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Phase, INITIAL_ACTION};

    fn ev(json: &str) -> ScanEvent {
        ScanEvent::from_text(json).unwrap()
    }

    #[test]
    fn empty_event_changes_nothing() {
        let before = ScanState::new();
        let after = reduce(before.clone(), &ScanEvent::default());
        assert_eq!(before, after);
    }

    #[test]
    fn several_fields_apply_together() {
        let s = reduce(
            ScanState::new(),
            &ev(r#"{"action":"Scanning","log":"go","progress":30,"phase":"scanning","vuln_count":2}"#),
        );
        assert_eq!(s.current_action, "Scanning");
        assert_eq!(s.log_lines, vec!["go"]);
        assert_eq!(s.progress, 30);
        assert_eq!(s.phase, Phase::Scanning);
        assert_eq!(s.vuln_count, 2);
    }

    #[test]
    fn progress_may_go_down() {
        let s = reduce(ScanState::new(), &ev(r#"{"progress":40}"#));
        let s = reduce(s, &ev(r#"{"progress":5}"#));
        assert_eq!(s.progress, 5);
    }

    #[test]
    fn phase_only_moves_on_explicit_field() {
        let s = reduce(ScanState::new(), &ev(r#"{"phase":"reporting"}"#));
        let s = reduce(s, &ev(r#"{"action":"Reconnaissance"}"#));
        assert_eq!(s.phase, Phase::Reporting);
    }

    #[test]
    fn technologies_are_replaced_wholesale() {
        let s = reduce(
            ScanState::new(),
            &ev(r#"{"technologies":{"server":"Nginx","backend":"Django"}}"#),
        );
        let s = reduce(s, &ev(r#"{"technologies":{"server":"Apache"}}"#));
        let tech = s.reconnaissance.technologies.unwrap();
        assert_eq!(tech.len(), 1);
        assert_eq!(tech["server"], "Apache");
    }

    #[test]
    fn payload_without_scanner_is_labelled_unknown() {
        let s = reduce(ScanState::new(), &ev(r#"{"payload":"<script>"}"#));
        assert_eq!(
            s.active_payloads.iter().collect::<Vec<_>>(),
            vec!["[unknown] Testing: <script>"]
        );
    }

    #[test]
    fn completion_is_reported_once() {
        let mut s = ScanState::new();
        assert!(!s.apply(&ev(r#"{"action":"Reporting"}"#)));
        assert!(s.apply(&ev(r#"{"action":"Completed","progress":100}"#)));
        assert!(!s.apply(&ev(r#"{"action":"Completed"}"#)));
        assert!(s.finished);
    }

    #[test]
    fn failed_action_does_not_finish() {
        let mut s = ScanState::new();
        assert!(!s.apply(&ev(r#"{"action":"Failed","progress":0}"#)));
        assert!(!s.finished);
        assert_ne!(s.current_action, INITIAL_ACTION);
    }
}
