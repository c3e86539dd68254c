use std::time::{SystemTime, UNIX_EPOCH};

const COMPLETION_LINES: &[&str] = &[
    "Fresh version, hot off the press.",
    "Another one for the changelog.",
    "Version bumped. Ship it.",
    "The release train is leaving the station.",
    "Semver says hello.",
    "Nice bump. Reviewers have been notified.",
];

/// One line from the completion pool, picked uniformly.
pub fn completion_line() -> &'static str {
    pick(COMPLETION_LINES, seed())
}

fn pick(lines: &'static [&'static str], seed: u64) -> &'static str {
    if lines.is_empty() {
        return "";
    }
    let index = (seed % lines.len() as u64) as usize;
    lines[index]
}

fn seed() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| u64::from(elapsed.subsec_nanos()) ^ elapsed.as_secs())
        .unwrap_or_default()
}
