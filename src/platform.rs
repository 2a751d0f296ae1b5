//! Social platform identification for official profile links.

use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::Serialize;
use tracing::warn;

use crate::normalize::{host_in_domain, NormalizedUrl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Linkedin,
    X,
    Facebook,
    Instagram,
    Youtube,
    Telegram,
    Discord,
    Tiktok,
    Pinterest,
    Medium,
    Reddit,
    Whatsapp,
    Github,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Linkedin => "linkedin",
            Platform::X => "x",
            Platform::Facebook => "facebook",
            Platform::Instagram => "instagram",
            Platform::Youtube => "youtube",
            Platform::Telegram => "telegram",
            Platform::Discord => "discord",
            Platform::Tiktok => "tiktok",
            Platform::Pinterest => "pinterest",
            Platform::Medium => "medium",
            Platform::Reddit => "reddit",
            Platform::Whatsapp => "whatsapp",
            Platform::Github => "github",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Domain to platform. Longest match wins, so order here is irrelevant.
const PLATFORM_DOMAINS: &[(&str, Platform)] = &[
    ("linkedin.com", Platform::Linkedin),
    ("twitter.com", Platform::X),
    ("x.com", Platform::X),
    ("facebook.com", Platform::Facebook),
    ("fb.com", Platform::Facebook),
    ("instagram.com", Platform::Instagram),
    ("instagr.am", Platform::Instagram),
    ("youtube.com", Platform::Youtube),
    ("youtu.be", Platform::Youtube),
    ("t.me", Platform::Telegram),
    ("telegram.me", Platform::Telegram),
    ("discord.com", Platform::Discord),
    ("discord.gg", Platform::Discord),
    ("tiktok.com", Platform::Tiktok),
    ("pinterest.com", Platform::Pinterest),
    ("medium.com", Platform::Medium),
    ("reddit.com", Platform::Reddit),
    ("wa.me", Platform::Whatsapp),
    ("whatsapp.com", Platform::Whatsapp),
    ("github.com", Platform::Github),
];

/// Trailing path segments that are views of a profile rather than the profile.
const SECONDARY_VIEWS: &[&str] = &[
    "posts", "jobs", "videos", "about", "mycompany", "reviews", "photos", "featured",
];

fn lookup(host: &str) -> Option<(&'static str, Platform)> {
    PLATFORM_DOMAINS
        .iter()
        .filter(|(domain, _)| host_in_domain(host, domain))
        .max_by_key(|(domain, _)| domain.len())
        .copied()
}

pub fn identify(url: &NormalizedUrl) -> Option<Platform> {
    lookup(url.host()).map(|(_, p)| p)
}

/// Canonical profile URL: platform apex host (`twitter.com` becomes `x.com`),
/// no query, no secondary view suffix, lowercased. `None` for non-platform hosts.
pub fn canonical_profile_url(url: &NormalizedUrl) -> Option<String> {
    let (domain, platform) = lookup(url.host())?;

    // Identity lives in the query on these two.
    if platform == Platform::Whatsapp {
        return Some(url.as_str().to_string());
    }
    if platform == Platform::Facebook && url.path().contains("profile.php") {
        let id = url.query().and_then(|q| {
            url::form_urlencoded::parse(q.as_bytes())
                .find(|(k, _)| k == "id")
                .map(|(_, v)| v.into_owned())
        });
        let out = match id {
            Some(id) => format!("https://{}{}?id={}", domain, url.path(), id),
            None => url.as_str().to_string(),
        };
        return Some(out.to_lowercase());
    }

    let host = if platform == Platform::X { "x.com" } else { domain };

    let mut segments: Vec<String> = url
        .path()
        .split('/')
        .filter(|s| !s.is_empty())
        .map(str::to_lowercase)
        .collect();
    if segments.len() > 1
        && segments
            .last()
            .is_some_and(|last| SECONDARY_VIEWS.contains(&last.as_str()))
    {
        segments.pop();
    }
    if platform == Platform::Youtube && segments.len() > 1 && segments[0] == "c" {
        segments.remove(0);
        segments[0] = format!("@{}", segments[0]);
    }

    Some(if segments.is_empty() {
        format!("https://{}", host)
    } else {
        format!("https://{}/{}", host, segments.join("/"))
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SocialProfile {
    pub platform: Platform,
    pub url: String,
}

/// Canonicalize, identify and dedupe profile links, keeping first-seen order.
/// More than one profile on a platform is kept but logged.
pub fn select_profiles<'a>(slug: &str, urls: impl IntoIterator<Item = &'a NormalizedUrl>) -> Vec<SocialProfile> {
    let mut seen = HashSet::new();
    let mut profiles = Vec::new();
    for url in urls {
        let (Some(platform), Some(canonical)) = (identify(url), canonical_profile_url(url)) else {
            continue;
        };
        if seen.insert(canonical.clone()) {
            profiles.push(SocialProfile {
                platform,
                url: canonical,
            });
        }
    }

    let mut per_platform: BTreeMap<Platform, usize> = BTreeMap::new();
    for p in &profiles {
        *per_platform.entry(p.platform).or_default() += 1;
    }
    for (platform, count) in per_platform.into_iter().filter(|(_, c)| *c > 1) {
        warn!(slug = %slug, platform = %platform, count, "multiple official profiles on one platform");
    }
    profiles
}

// ── Tests ──
