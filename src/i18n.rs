//! Sign-in page messages in English and German.

use once_cell::sync::Lazy;
use serde_json::{json, Value};

pub const AVAILABLE_LOCALES: &[&str] = &["en", "de"];
pub const DEFAULT_LOCALE: &str = "de";

static MESSAGES: Lazy<Value> = Lazy::new(|| {
    json!({
        "en": {
            "auth": {
                "welcomeBack": "Welcome Back",
                "signInToContinue": "Sign in to continue to your account",
                "connecting": "Connecting...",
                "authenticating": "Authenticating...",
                "redirecting": "Redirecting...",
                "azureAdDescription": "We're securely connecting you to Azure Active Directory. This will only take a moment.",
                "signIn": "Sign in with Microsoft"
            }
        },
        "de": {
            "auth": {
                "welcomeBack": "Willkommen zurück",
                "signInToContinue": "Melden Sie sich an, um zu Ihrem Konto zu gelangen",
                "connecting": "Verbinden...",
                "authenticating": "Authentifizieren...",
                "redirecting": "Weiterleiten...",
                "azureAdDescription": "Wir verbinden Sie sicher mit Azure Active Directory. Das dauert nur einen Moment.",
                "signIn": "Mit Microsoft anmelden"
            }
        }
    })
});

/// Look up a dotted key such as `auth.welcomeBack`.
///
/// Returns the key itself when the locale or the key is unknown.
pub fn t(key: &str, locale: &str) -> String {
    let Some(messages) = MESSAGES.get(locale) else {
        tracing::warn!(locale = %locale, "Locale not found in messages");
        return key.to_string();
    };

    tracing::trace!(key = %key, locale = %locale, "Translating");

    key.split('.')
        .try_fold(messages, |node, part| node.get(part))
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| key.to_string())
}

pub fn is_available(locale: &str) -> bool {
    AVAILABLE_LOCALES.contains(&locale)
}

/// Translator bound to one locale.
#[derive(Debug, Clone)]
pub struct Translator {
    locale: String,
}

impl Default for Translator {
    fn default() -> Self {
        Self::new(DEFAULT_LOCALE)
    }
}

impl Translator {
    pub fn new(locale: impl Into<String>) -> Self {
        Self {
            locale: locale.into(),
        }
    }

    pub fn locale(&self) -> &str {
        &self.locale
    }

    pub fn t(&self, key: &str) -> String {
        t(key, &self.locale)
    }
}

/// Pick the page locale: explicit `?locale=`, then `Accept-Language`, then
/// the configured default.
pub fn negotiate_locale(
    requested: Option<&str>,
    accept_language: Option<&str>,
    default_locale: &str,
) -> String {
    if let Some(locale) = requested.map(str::trim).filter(|l| is_available(l)) {
        return locale.to_string();
    }

    let from_header = accept_language.and_then(|header| {
        let mut ranges: Vec<(String, f32)> = header
            .split(',')
            .filter_map(|range| {
                let mut pieces = range.trim().split(';');
                let tag = pieces.next()?.trim();
                let quality = pieces
                    .find_map(|p| p.trim().strip_prefix("q="))
                    .and_then(|q| q.parse::<f32>().ok())
                    .unwrap_or(1.0);
                let primary = tag.split('-').next()?.to_ascii_lowercase();
                Some((primary, quality))
            })
            .filter(|(_, quality)| *quality > 0.0)
            .collect();
        // Stable sort keeps header order among equal weights
        ranges.sort_by(|a, b| b.1.total_cmp(&a.1));
        ranges
            .into_iter()
            .map(|(primary, _)| primary)
            .find(|primary| is_available(primary))
    });

    from_header.unwrap_or_else(|| default_locale.to_string())
}
