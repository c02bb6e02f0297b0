//! Identifier sanitizing.
//!
//! Table, column and filter-key names come from tenant configuration and from
//! payload keys, so none of them can be trusted. Values are always bound as
//! parameters, but identifiers have to be embedded in statement text. Every
//! identifier therefore passes [`sanitize`] first, and the statement builders
//! only accept the resulting [`SafeIdentifier`].
//!
//! Names are checked against an allow-list (`[A-Za-z_][A-Za-z0-9_]*`) and the
//! engine's length limit. Rejected names are never rewritten or truncated.

use std::fmt;
use std::sync::LazyLock;

use regex::Regex;

use crate::core::EngineKind;
use crate::error::{RejectedIdentifierError, RejectionReason};

static IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is a valid regex")
});

/// An identifier that is safe to embed in a statement for one engine.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SafeIdentifier {
    name: String,
    engine: EngineKind,
}

impl SafeIdentifier {
    /// The identifier as given.
    pub fn as_str(&self) -> &str {
        &self.name
    }

    /// The engine the identifier was checked for.
    pub fn engine(&self) -> EngineKind {
        self.engine
    }

    /// The identifier wrapped in the engine's quote characters.
    pub fn quoted(&self) -> String {
        match self.engine.dialect().quote {
            Some(q) => format!("{q}{}{q}", self.name),
            None => self.name.clone(),
        }
    }
}

impl fmt::Display for SafeIdentifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}

/// Checks that `name` can be embedded safely in a statement for `engine`.
///
/// # Examples
///
/// ```
/// use formgate_persistence::schema::sanitize;
/// use formgate_persistence::EngineKind;
///
/// let table = sanitize("signups", EngineKind::MySql).unwrap();
/// assert_eq!(table.quoted(), "`signups`");
///
/// assert!(sanitize("users; DROP TABLE users", EngineKind::Postgres).is_err());
/// assert!(sanitize("", EngineKind::Sqlite).is_err());
/// ```
pub fn sanitize(name: &str, engine: EngineKind) -> Result<SafeIdentifier, RejectedIdentifierError> {
    let reject = |reason| RejectedIdentifierError {
        name: name.to_string(),
        engine,
        reason,
    };

    if name.is_empty() {
        return Err(reject(RejectionReason::Empty));
    }

    if let Some(q) = engine.dialect().quote
        && name.contains(q)
    {
        return Err(reject(RejectionReason::QuoteCharacter(q)));
    }

    if !IDENTIFIER.is_match(name) {
        let reason = match name.chars().find(|c| !(c.is_ascii_alphanumeric() || *c == '_')) {
            Some(c) => RejectionReason::IllegalCharacter(c),
            None => RejectionReason::IllegalStart,
        };
        return Err(reject(reason));
    }

    let max = engine.dialect().max_identifier_len;
    if name.len() > max {
        return Err(reject(RejectionReason::TooLong { max }));
    }

    Ok(SafeIdentifier {
        name: name.to_string(),
        engine,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_names() {
        for name in ["users", "_private", "Signup2024", "first_name"] {
            for engine in EngineKind::ALL {
                assert!(sanitize(name, engine).is_ok(), "{name} for {engine}");
            }
        }
    }

    #[test]
    fn test_quoting_per_engine() {
        assert_eq!(
            sanitize("users", EngineKind::Postgres).unwrap().quoted(),
            "\"users\""
        );
        assert_eq!(sanitize("users", EngineKind::MySql).unwrap().quoted(), "`users`");
        assert_eq!(
            sanitize("users", EngineKind::Sqlite).unwrap().quoted(),
            "\"users\""
        );
        assert_eq!(sanitize("users", EngineKind::MongoDb).unwrap().quoted(), "users");
    }

    #[test]
    fn test_rejects_empty() {
        let err = sanitize("", EngineKind::Postgres).unwrap_err();
        assert_eq!(err.reason, RejectionReason::Empty);
    }

    #[test]
    fn test_rejects_quote_characters() {
        let err = sanitize("users\"--", EngineKind::Postgres).unwrap_err();
        assert_eq!(err.reason, RejectionReason::QuoteCharacter('"'));

        let err = sanitize("users`--", EngineKind::MySql).unwrap_err();
        assert_eq!(err.reason, RejectionReason::QuoteCharacter('`'));

        // Not the MySQL quote, but still outside the allow-list
        let err = sanitize("users\"", EngineKind::MySql).unwrap_err();
        assert_eq!(err.reason, RejectionReason::IllegalCharacter('"'));
    }

    #[test]
    fn test_rejects_metacharacters() {
        for name in [
            "users; DROP TABLE users",
            "a b",
            "name'",
            "x--",
            "email)",
            "$where",
            "profile.name",
            "naïve",
        ] {
            for engine in EngineKind::ALL {
                assert!(sanitize(name, engine).is_err(), "{name} for {engine}");
            }
        }
    }

    #[test]
    fn test_rejects_leading_digit() {
        let err = sanitize("1users", EngineKind::Sqlite).unwrap_err();
        assert_eq!(err.reason, RejectionReason::IllegalStart);
    }

    #[test]
    fn test_rejects_too_long_without_truncating() {
        let name = "a".repeat(64);
        let err = sanitize(&name, EngineKind::Postgres).unwrap_err();
        assert_eq!(err.reason, RejectionReason::TooLong { max: 63 });
        assert_eq!(err.name, name);

        assert!(sanitize(&name, EngineKind::MySql).is_ok());
    }
}
