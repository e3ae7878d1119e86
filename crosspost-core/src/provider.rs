//! The provider catalog (spec.md §4.2). Not exhaustive by contract — new
//! providers are added here and picked up by the registry, the governor,
//! and the Store's column mapping in lock-step.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Provider {
    Instagram,
    Facebook,
    Tiktok,
    Youtube,
    Pinterest,
    Threads,
    X,
}

impl Provider {
    pub const ALL: &'static [Provider] = &[
        Provider::Instagram,
        Provider::Facebook,
        Provider::Tiktok,
        Provider::Youtube,
        Provider::Pinterest,
        Provider::Threads,
        Provider::X,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Provider::Instagram => "instagram",
            Provider::Facebook => "facebook",
            Provider::Tiktok => "tiktok",
            Provider::Youtube => "youtube",
            Provider::Pinterest => "pinterest",
            Provider::Threads => "threads",
            Provider::X => "x",
        }
    }

    /// The `UserSetting.key` this provider's OAuth blob is stored under
    /// (spec.md §3: "keys like `instagram_oauth`, `facebook_oauth`, ...").
    pub fn oauth_setting_key(&self) -> String {
        format!("{}_oauth", self.as_str())
    }

    /// Whether this provider accepts a publish with no caption at all
    /// (spec.md §4.4 media/caption validation rules).
    pub fn allows_captionless(&self) -> bool {
        matches!(self, Provider::Instagram | Provider::Pinterest)
    }

    /// Whether this provider requires at least one media item to publish.
    pub fn requires_media(&self) -> bool {
        !matches!(self, Provider::Facebook | Provider::Threads | Provider::X)
    }

    /// Whether this provider requires a video specifically (images alone
    /// are not sufficient).
    pub fn requires_video(&self) -> bool {
        matches!(self, Provider::Youtube | Provider::Tiktok)
    }

    /// Whether a single publish request to this provider can fan out into
    /// multiple sub-addressable targets (spec.md §4.2, e.g. Facebook pages).
    pub fn supports_fanout(&self) -> bool {
        matches!(self, Provider::Facebook)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Provider {
    type Err = UnknownProvider;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Provider::ALL
            .iter()
            .copied()
            .find(|p| p.as_str() == s)
            .ok_or_else(|| UnknownProvider(s.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnknownProvider(pub String);

impl fmt::Display for UnknownProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "unknown provider: {}", self.0)
    }
}

impl std::error::Error for UnknownProvider {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trips_through_str() {
        for p in Provider::ALL {
            assert_eq!(Provider::from_str(p.as_str()).unwrap(), *p);
        }
    }

    #[test]
    fn rejects_unknown_provider() {
        assert!(Provider::from_str("myspace").is_err());
    }

    #[test]
    fn media_rules_match_spec_examples() {
        assert!(Provider::Instagram.requires_media());
        assert!(Provider::Youtube.requires_video());
        assert!(Provider::Tiktok.requires_video());
        assert!(!Provider::Facebook.requires_media());
        assert!(!Provider::Threads.requires_media());
        assert!(Provider::Facebook.supports_fanout());
        assert!(!Provider::Instagram.supports_fanout());
    }
}
