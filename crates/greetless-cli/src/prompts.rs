//! The presentation/confirmation layer: one function per question shape.
//! Every prompt defaults in the safer direction: non-destructive
//! "continue" prompts default to yes, anything authorizing sudo or removal
//! defaults to no, and the one irreversible action takes a typed phrase,
//! not a keystroke.

use anyhow::{Context, Result};
use dialoguer::theme::ColorfulTheme;
use dialoguer::{Confirm, Input, Select};

pub fn confirm(prompt: &str, default_yes: bool) -> Result<bool> {
    Confirm::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default_yes)
        .interact()
        .context("confirmation prompt failed (a terminal is required)")
}

pub fn input_with_default(prompt: &str, default: &str) -> Result<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .default(default.to_string())
        .interact_text()
        .context("input prompt failed (a terminal is required)")
}

/// Identifier-keyed selection: the operator picks a label, the caller gets
/// the stable key back. Filtered or de-duplicated menus cannot produce
/// off-by-one picks this way.
pub fn select_keyed(prompt: &str, entries: &[(String, String)], default_key: &str) -> Result<String> {
    let labels: Vec<&str> = entries.iter().map(|(_, label)| label.as_str()).collect();
    let default_index = entries
        .iter()
        .position(|(key, _)| key == default_key)
        .unwrap_or(0);

    let picked = Select::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .items(&labels)
        .default(default_index)
        .interact()
        .context("selection prompt failed (a terminal is required)")?;

    Ok(entries[picked].0.clone())
}

/// Raw typed input for the critical gate. Empty input is allowed through so
/// the caller can treat a blank line as an abort, never as assent.
pub fn typed_phrase(prompt: &str) -> Result<String> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty(true)
        .interact_text()
        .context("confirmation prompt failed (a terminal is required)")
}

pub fn pause(prompt: &str) -> Result<()> {
    Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(format!("{prompt} (press Enter)"))
        .allow_empty(true)
        .interact_text()
        .context("prompt failed (a terminal is required)")?;
    Ok(())
}

/// The critical gate accepts only the exact literal word. "Yes", "y",
/// leading whitespace and a blank line all abort.
pub fn critical_phrase_accepted(input: &str) -> bool {
    input == "yes"
}

#[cfg(test)]
mod tests {
    use super::critical_phrase_accepted;

    #[test]
    fn only_the_exact_literal_passes_the_critical_gate() {
        assert!(critical_phrase_accepted("yes"));
        for rejected in ["Yes", "y", "YES", "", " yes", "yes ", "yes\n", "no"] {
            assert!(
                !critical_phrase_accepted(rejected),
                "{rejected:?} must not pass the critical gate"
            );
        }
    }
}
