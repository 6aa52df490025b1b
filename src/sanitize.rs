//! Cleanup helpers for the strings the CLAI server hands to the UI.

const ACTIVE_TICK: &str = "☑";
const ACTIVE_PREFIX: &str = "☑\x1b[32m ";
const ANSI_GREEN: &str = "\x1b[32m";
const ANSI_RESET: &str = "\x1b[0m";
const INACTIVE_BOX: &str = "◻";
const INSTALLED: &str = "(Installed)";
const NOT_INSTALLED: &str = "(Not Installed)";

/// Strips the tick glyph and colour codes from a skill row.
/// Returns the bare label and whether the skill is the active one.
pub fn clear_skill_label(label: &str) -> (String, bool) {
    let active = label.contains(ACTIVE_TICK);
    let cleaned = label
        .replace(ACTIVE_PREFIX, "")
        .replace(ANSI_RESET, "")
        .replace(INACTIVE_BOX, "")
        .replace(ACTIVE_TICK, "")
        .replace(ANSI_GREEN, "");
    (cleaned.trim().to_string(), active)
}

/// Splits the install marker off a cleaned label: `("nlc2cmd", true)`.
pub fn extract_skill_name(label: &str) -> (String, bool) {
    let installed = label.contains(INSTALLED);
    let name = label.replace(INSTALLED, "").replace(NOT_INSTALLED, "");
    (name.trim().to_string(), installed)
}

/// Drops every char outside the Basic Multilingual Plane.
///
/// Skill descriptions are full of emoji the bundled fonts cannot draw; they
/// would show up as tofu boxes, so they are filtered before display.
pub fn remove_non_bmp(description: Option<&str>) -> String {
    match description {
        None => String::new(),
        Some(text) => text.chars().filter(|c| (*c as u32) <= 0xFFFF).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_clear_active_label() {
        assert_eq!(clear_skill_label("☑\x1b[32m foo\x1b[0m"), ("foo".to_string(), true));
    }

    #[test]
    fn test_clear_inactive_label() {
        let (name, active) = clear_skill_label("◻ nlc2cmd (Installed)");
        assert_eq!(name, "nlc2cmd (Installed)");
        assert!(!active);
    }

    #[test]
    fn test_tick_never_survives_cleaning() {
        for label in ["☑ odd", "x☑y", "☑\x1b[32mtight\x1b[0m", "  ☑\x1b[32m man page explorer (Installed)\x1b[0m  "] {
            let (name, active) = clear_skill_label(label);
            assert!(active, "{label:?}");
            assert!(!name.contains('☑'), "{name:?}");
            assert!(!name.contains('\x1b'), "{name:?}");
        }
    }

    #[test]
    fn test_extract_installed() {
        assert_eq!(extract_skill_name("gpt3 (Installed)"), ("gpt3".to_string(), true));
        assert_eq!(extract_skill_name("tellina (Not Installed)"), ("tellina".to_string(), false));
    }

    #[test]
    fn test_extract_without_marker_is_trimmed_input() {
        for label in ["  plain  ", "howdoi", "", "\tspaced name "] {
            let (name, installed) = extract_skill_name(label);
            assert!(!installed);
            assert_eq!(name, label.trim());
        }
    }

    #[test]
    fn test_remove_non_bmp_none_is_empty() {
        assert_eq!(remove_non_bmp(None), "");
    }

    #[test]
    fn test_remove_non_bmp_keeps_ascii_order() {
        let input = "a\u{1F600}b\u{1F680}c d";
        assert_eq!(remove_non_bmp(Some(input)), "abc d");
    }

    #[test]
    fn test_remove_non_bmp_keeps_bmp_symbols() {
        let input = "Try ☑ and é, ✨ too";
        assert_eq!(remove_non_bmp(Some(input)), input);
    }

    #[test]
    fn test_remove_non_bmp_idempotent() {
        let once = remove_non_bmp(Some("🤖 use `tar -xzf` 📦 to unpack"));
        assert_eq!(remove_non_bmp(Some(&once)), once);
        assert_eq!(once, " use `tar -xzf`  to unpack");
    }
}
