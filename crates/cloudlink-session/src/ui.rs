//! User-facing collaborators: dialogs and message localization.
//!
//! The session never renders anything itself. It asks a [`Dialog`] to show
//! alerts and confirmations, with text produced by a [`Localizer`].

use std::future::Future;

/// Message keys the session looks up.
pub mod keys {
    /// Shown while the connection is down.
    pub const DISCONNECTED: &str = "disconnectedDialog";
    /// Temporary ban. Parameters: `date`, `reason`.
    pub const TEMP_BAN: &str = "tempBan";
    /// Permanent ban. Parameters: `reason`.
    pub const PERM_BAN: &str = "permBan";
    /// Automatic re-login failed; asks whether to keep the stored login.
    pub const LOGIN_FAIL: &str = "loginFail";
}

/// How an alert may be dismissed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AlertKind {
    /// Stays up until the session closes it.
    Blocking,
    /// The user may dismiss it.
    Dismissible,
}

/// Presents alerts and confirmations to the user.
pub trait Dialog: Send + Sync + 'static {
    /// Shows an alert, replacing any alert already shown.
    fn alert(&self, message: &str, kind: AlertKind);

    /// Closes the current alert, if any.
    fn close_alert(&self);

    /// Asks a yes/no question.
    fn confirm(&self, message: &str) -> impl Future<Output = bool> + Send;
}

/// Turns a message key and named parameters into display text.
pub trait Localizer: Send + Sync + 'static {
    /// Looks up `key` and substitutes `{name}` placeholders from `params`.
    fn t(&self, key: &str, params: &[(&str, &str)]) -> String;
}

/// Built-in English messages. Unknown keys are returned as-is.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnglishLocalizer;

impl EnglishLocalizer {
    fn template(key: &str) -> Option<&'static str> {
        let template = match key {
            keys::DISCONNECTED => "Disconnected from the server. Reconnecting...",
            keys::TEMP_BAN => "You are banned until {date}. Reason: {reason}",
            keys::PERM_BAN => "You are permanently banned. Reason: {reason}",
            keys::LOGIN_FAIL => {
                "Could not log you back in. Keep your saved login and try again?"
            }
            _ => return None,
        };
        Some(template)
    }
}

impl Localizer for EnglishLocalizer {
    fn t(&self, key: &str, params: &[(&str, &str)]) -> String {
        let Some(template) = Self::template(key) else {
            return key.to_string();
        };
        params
            .iter()
            .fold(template.to_string(), |text, (name, value)| {
                text.replace(&format!("{{{name}}}"), value)
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_t_substitutes_named_params() {
        let text = EnglishLocalizer.t(
            keys::TEMP_BAN,
            &[("date", "Tue, 1 Jul 2025 10:00:00 +0000"), ("reason", "spam")],
        );

        assert_eq!(
            text,
            "You are banned until Tue, 1 Jul 2025 10:00:00 +0000. Reason: spam"
        );
    }

    #[test]
    fn test_t_unknown_key_returns_key() {
        assert_eq!(EnglishLocalizer.t("nope", &[]), "nope");
    }

    #[test]
    fn test_t_missing_param_leaves_placeholder() {
        let text = EnglishLocalizer.t(keys::PERM_BAN, &[]);
        assert!(text.contains("{reason}"));
    }

    #[test]
    fn test_every_session_key_has_a_message() {
        for key in [
            keys::DISCONNECTED,
            keys::TEMP_BAN,
            keys::PERM_BAN,
            keys::LOGIN_FAIL,
        ] {
            assert_ne!(EnglishLocalizer.t(key, &[]), key);
        }
    }
}
