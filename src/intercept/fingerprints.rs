//! Known internal calls the agent runtime makes for its own bookkeeping.
//!
//! Each entry pairs a system-prompt marker with the reply to send back. To
//! recognise a new call, append an entry; matching code does not change.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Fingerprint {
    /// Log-friendly name.
    pub name: &'static str,
    /// Exact substring of the system prompt that identifies the call.
    pub marker: &'static str,
    /// Text returned in place of a model answer.
    pub reply: &'static str,
}

/// Checked in order; the first marker found wins.
pub const FINGERPRINTS: &[Fingerprint] = &[
    Fingerprint {
        name: "bash-command-prefix",
        marker: "Your task is to process Bash commands",
        reply: "none",
    },
    Fingerprint {
        name: "bash-file-paths",
        marker: "Extract any file paths that this command reads or modifies",
        reply: "<filepaths>\n</filepaths>",
    },
];

/// First registry entry whose marker occurs in `system_text`.
pub fn find<'r>(registry: &'r [Fingerprint], system_text: &str) -> Option<&'r Fingerprint> {
    registry.iter().find(|fp| system_text.contains(fp.marker))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_registry_names_and_markers_are_unique() {
        for (i, a) in FINGERPRINTS.iter().enumerate() {
            assert!(!a.marker.is_empty());
            for b in &FINGERPRINTS[i + 1..] {
                assert_ne!(a.name, b.name);
                assert!(!a.marker.contains(b.marker) && !b.marker.contains(a.marker));
            }
        }
    }

    #[test]
    fn test_find_requires_exact_marker() {
        let hit = find(
            FINGERPRINTS,
            "Your task is to process Bash commands that an AI coding agent wants to run.",
        );
        assert_eq!(hit.map(|fp| fp.name), Some("bash-command-prefix"));
        assert_eq!(hit.map(|fp| fp.reply), Some("none"));

        assert!(find(FINGERPRINTS, "your task is to process bash commands").is_none());
        assert!(find(FINGERPRINTS, "You are an interactive CLI tool").is_none());
        assert!(find(&[], "Your task is to process Bash commands").is_none());
    }
}
