use std::io::IsTerminal;

const ANSI_FAILURE: &str = "\x1b[41m\x1b[37m";
const ANSI_SUCCESS: &str = "\x1b[42m\x1b[37m";
const ANSI_WARNING: &str = "\x1b[43m\x1b[37m";
const ANSI_PLAIN: &str = "\x1b[49m\x1b[39m";
/// Restores default colours and attributes when the process exits.
pub const ANSI_RESET_ALL: &str = "\x1b[49m\x1b[39m\x1b[0m";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Style {
    #[default]
    Plain,
    Success,
    Warning,
    Failure,
}

impl Style {
    pub fn ansi_prefix(self) -> &'static str {
        match self {
            Style::Plain => ANSI_PLAIN,
            Style::Success => ANSI_SUCCESS,
            Style::Warning => ANSI_WARNING,
            Style::Failure => ANSI_FAILURE,
        }
    }

    pub fn ansi_suffix(self) -> &'static str {
        ANSI_PLAIN
    }

    pub fn from_pass(passed: bool) -> Self {
        if passed { Style::Success } else { Style::Failure }
    }

    /// Wraps `text` in escape codes when `enabled`, otherwise returns it as is.
    pub fn paint(self, text: &str, enabled: bool) -> String {
        if enabled {
            format!("{}{}{}", self.ansi_prefix(), text, self.ansi_suffix())
        } else {
            text.to_string()
        }
    }
}

/// Colour is only emitted to an interactive terminal on platforms that
/// understand ANSI sequences.
pub fn color_supported(no_color: bool) -> bool {
    !no_color && !cfg!(target_os = "windows") && std::io::stdout().is_terminal()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paint_disabled_is_identity() {
        assert_eq!(Style::Failure.paint("R X", false), "R X");
    }

    #[test]
    fn paint_wraps_and_resets() {
        assert_eq!(
            Style::Success.paint("ok", true),
            "\x1b[42m\x1b[37mok\x1b[49m\x1b[39m"
        );
    }

    #[test]
    fn pass_maps_to_success_and_failure() {
        assert_eq!(Style::from_pass(true), Style::Success);
        assert_eq!(Style::from_pass(false), Style::Failure);
    }

    #[test]
    fn no_color_flag_always_disables() {
        assert!(!color_supported(true));
    }
}
