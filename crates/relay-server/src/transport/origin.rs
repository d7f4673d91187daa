//! Origin allow-list for WebSocket upgrades.

use relay_core::{RelayError, RelayResult};

/// Wildcard entry that admits any origin, including a missing one.
pub const ANY_ORIGIN: &str = "*";

/// Which declared origins may open a session.
#[derive(Debug, Clone)]
pub struct OriginPolicy {
    allowed: Vec<String>,
    any: bool,
}

impl OriginPolicy {
    pub fn new<I, S>(allowed: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut any = false;
        let mut list = Vec::new();
        for origin in allowed {
            let origin = origin.as_ref().trim();
            if origin == ANY_ORIGIN {
                any = true;
            } else if !origin.is_empty() {
                list.push(normalize(origin));
            }
        }
        Self { allowed: list, any }
    }

    /// Check the value of an `Origin` header (absent = `None`).
    pub fn check(&self, origin: Option<&str>) -> RelayResult<()> {
        if self.any {
            return Ok(());
        }
        match origin {
            Some(o) if self.allowed.contains(&normalize(o)) => Ok(()),
            Some(o) => Err(RelayError::OriginRejected(o.to_string())),
            None => Err(RelayError::OriginRejected("missing Origin header".into())),
        }
    }

    /// The allow-list as configured, for startup logs.
    pub fn describe(&self) -> String {
        if self.any {
            ANY_ORIGIN.to_string()
        } else {
            self.allowed.join(", ")
        }
    }
}

// Scheme and host are case-insensitive; a trailing slash is not significant.
fn normalize(origin: &str) -> String {
    origin.trim().trim_end_matches('/').to_ascii_lowercase()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_allowed() {
        let policy = OriginPolicy::new(["http://localhost:3000"]);
        assert!(policy.check(Some("http://localhost:3000")).is_ok());
        assert!(policy.check(Some("HTTP://LOCALHOST:3000/")).is_ok());
    }

    #[test]
    fn other_origins_rejected() {
        let policy = OriginPolicy::new(["http://localhost:3000"]);
        assert!(matches!(
            policy.check(Some("http://localhost:3001")),
            Err(RelayError::OriginRejected(_))
        ));
        assert!(policy.check(Some("https://evil.example")).is_err());
    }

    #[test]
    fn missing_origin_rejected() {
        let policy = OriginPolicy::new(["http://localhost:3000"]);
        assert!(policy.check(None).is_err());
    }

    #[test]
    fn wildcard_admits_everything() {
        let policy = OriginPolicy::new(["*"]);
        assert!(policy.check(None).is_ok());
        assert!(policy.check(Some("https://anything.example")).is_ok());
        assert_eq!(policy.describe(), "*");
    }

    #[test]
    fn multiple_entries() {
        let policy = OriginPolicy::new(["https://a.example", " https://b.example ", ""]);
        assert!(policy.check(Some("https://b.example")).is_ok());
        assert_eq!(policy.describe(), "https://a.example, https://b.example");
    }
}
