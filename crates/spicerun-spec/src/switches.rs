//! Extra command-line switches handed to a backend for one run.
//!
//! Switches are appended to the backend's own arguments (`-ascii`, `-log`,
//! `--define=gain=2`). Each one is a single flag token; a flag that takes a
//! value must carry it after `=`.

use thiserror::Error;

/// A rejected run switch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SwitchError {
    #[error("run switch must not be empty")]
    Empty,

    #[error("run switch '{0}' must start with '-'")]
    NotAFlag(String),

    #[error("run switch '{0}' contains whitespace or a control character")]
    BadCharacter(String),
}

/// Checks that every switch is a single `-flag` token.
pub fn validate_switches<S: AsRef<str>>(switches: &[S]) -> Result<(), SwitchError> {
    for switch in switches {
        let switch = switch.as_ref();
        if switch.is_empty() {
            return Err(SwitchError::Empty);
        }
        if switch.chars().any(|c| c.is_whitespace() || c.is_control()) {
            return Err(SwitchError::BadCharacter(switch.to_string()));
        }
        if !switch.starts_with('-') || switch.trim_start_matches('-').is_empty() {
            return Err(SwitchError::NotAFlag(switch.to_string()));
        }
    }
    Ok(())
}
