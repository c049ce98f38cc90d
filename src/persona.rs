//! Persona (instruction block) loading.
//!
//! The persona is the fixed text placed in front of every prompt. It is
//! resolved once at startup from, in order of precedence:
//!
//! 1. `persona.prompt` — inline text in the config file.
//! 2. `persona.prompt_file` — path to a text/markdown file.
//! 3. The built-in Pongal 2026 persona ([`PONGAL_2026_PERSONA`]).

use crate::config::PersonaConfig;
use crate::error::{BotError, Result};
use tracing::info;

/// Built-in persona for the Pongal Celebrations 2026 food desk, compiled into
/// the binary from `persona/pongal-2026.md`.
///
/// It carries the event details and the full 16-item menu with the faculty
/// in charge of each dish.
pub const PONGAL_2026_PERSONA: &str = include_str!("../persona/pongal-2026.md");

/// Resolve the persona text for the given config.
///
/// # Errors
///
/// Returns an error if `prompt_file` is set but cannot be read, or if the
/// resolved persona is blank.
pub fn load_persona(config: &PersonaConfig) -> Result<String> {
    let persona = if let Some(ref inline) = config.prompt {
        info!("using inline persona ({} chars)", inline.len());
        inline.clone()
    } else if let Some(ref path) = config.prompt_file {
        let text = std::fs::read_to_string(path).map_err(|e| {
            BotError::Config(format!("cannot read persona file {}: {e}", path.display()))
        })?;
        info!("loaded persona from {}", path.display());
        text
    } else {
        PONGAL_2026_PERSONA.to_owned()
    };

    if persona.trim().is_empty() {
        return Err(BotError::Config("persona text is empty".to_owned()));
    }
    Ok(persona)
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

    use super::*;
    use std::io::Write;

    #[test]
    fn builtin_persona_mentions_menu_and_event() {
        assert!(PONGAL_2026_PERSONA.contains("Pongal Celebrations 2026"));
        assert!(PONGAL_2026_PERSONA.contains("COMPLETE FOOD MENU (16 items)"));
        assert!(PONGAL_2026_PERSONA.contains("Ven Pongal"));
    }

    #[test]
    fn default_config_uses_builtin() {
        let persona = load_persona(&PersonaConfig::default()).unwrap();
        assert_eq!(persona, PONGAL_2026_PERSONA);
    }

    #[test]
    fn inline_prompt_wins_over_file() {
        let config = PersonaConfig {
            prompt: Some("You are a Diwali sweets guide.".to_owned()),
            prompt_file: Some("/nonexistent/persona.md".into()),
            ..PersonaConfig::default()
        };
        assert_eq!(load_persona(&config).unwrap(), "You are a Diwali sweets guide.");
    }

    #[test]
    fn prompt_file_is_read() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "You are an Onam sadhya guide.").unwrap();
        let config = PersonaConfig {
            prompt_file: Some(file.path().to_path_buf()),
            ..PersonaConfig::default()
        };
        assert_eq!(load_persona(&config).unwrap(), "You are an Onam sadhya guide.\n");
    }

    #[test]
    fn missing_prompt_file_is_config_error() {
        let config = PersonaConfig {
            prompt_file: Some("/nonexistent/persona.md".into()),
            ..PersonaConfig::default()
        };
        assert!(matches!(load_persona(&config), Err(BotError::Config(_))));
    }

    #[test]
    fn blank_inline_prompt_rejected() {
        let config = PersonaConfig {
            prompt: Some("   \n".to_owned()),
            ..PersonaConfig::default()
        };
        assert!(load_persona(&config).is_err());
    }
}
