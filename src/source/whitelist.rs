//! Sender whitelist applied by mail sources before items reach the monitor.

/// Immutable set of accepted sender patterns.
///
/// - Empty policy → whitelist disabled, every sender accepted
/// - `*` → allow all
/// - `@domain.com` or `domain.com` → domain match
/// - `user@domain.com` → exact address match
///
/// All comparisons are case-insensitive.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WhitelistPolicy {
    patterns: Vec<String>,
}

impl WhitelistPolicy {
    pub fn new<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            patterns: patterns
                .into_iter()
                .map(|p| p.into().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    /// Parse a comma-separated pattern list.
    pub fn parse(list: &str) -> Self {
        Self::new(list.split(','))
    }

    /// Whitelist with no patterns: nothing is filtered.
    pub fn is_disabled(&self) -> bool {
        self.patterns.is_empty()
    }

    pub fn patterns(&self) -> &[String] {
        &self.patterns
    }

    /// Check a bare sender address against the policy.
    pub fn allows(&self, sender: &str) -> bool {
        if self.is_disabled() {
            return true;
        }
        let sender = sender.trim().to_lowercase();
        self.patterns.iter().any(|p| {
            if p == "*" {
                true
            } else if p.starts_with('@') {
                sender.ends_with(p.as_str())
            } else if p.contains('@') {
                *p == sender
            } else {
                sender.ends_with(&format!("@{p}"))
            }
        })
    }
}

impl std::fmt::Display for WhitelistPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_disabled() {
            write!(f, "disabled (everyone)")
        } else {
            write!(f, "{}", self.patterns.join(", "))
        }
    }
}
