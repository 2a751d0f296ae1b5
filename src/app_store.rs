//! App store listing selection: one canonical listing per store.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::normalize::{self, NormalizedUrl};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AppStore {
    GooglePlay,
    AppleStore,
}

impl AppStore {
    pub fn as_str(&self) -> &'static str {
        match self {
            AppStore::GooglePlay => "google_play",
            AppStore::AppleStore => "apple_store",
        }
    }

    fn of(url: &NormalizedUrl) -> Option<AppStore> {
        if url.host_matches("play.google.com") {
            Some(AppStore::GooglePlay)
        } else if url.host_matches("apps.apple.com") || url.host_matches("itunes.apple.com") {
            Some(AppStore::AppleStore)
        } else {
            None
        }
    }
}

impl fmt::Display for AppStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

/// Query parameters that redirectors and deep-link services use to carry
/// the destination URL.
const NESTED_URL_PARAMS: &[&str] = &[
    "url", "af_web_dp", "af_dp", "redirect", "redirect_macos", "redirect_windows", "link",
    "android_url", "ios_url",
];

/// Generic authenticator apps sites link to for 2FA setup, never the
/// organization's own app.
const GENERIC_APP_IDS: &[&str] = &[
    "com.google.android.apps.authenticator2",
    "388497605",
    "com.authy.authy",
    "494168017",
];

static PLAY_PACKAGE_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_]+(?:\.[A-Za-z0-9_]+)+$").unwrap());
static APPLE_ID_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"id(\d+)").unwrap());

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StoreLink {
    pub url: String,
    pub store: AppStore,
}

/// One listing seen in the input, already in canonical form.
#[derive(Debug, Clone)]
struct Candidate {
    store: AppStore,
    app_id: String,
    url: String,
    /// Lower is preferred: English/US first, unspecified last.
    lang_score: u8,
}

fn query_param(url: &NormalizedUrl, key: &str) -> Option<String> {
    let q = url.query()?;
    url::form_urlencoded::parse(q.as_bytes())
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

/// Store URLs carried in well-known redirect parameters of `url`.
pub fn nested_store_urls(url: &NormalizedUrl) -> Vec<NormalizedUrl> {
    let Some(q) = url.query() else {
        return Vec::new();
    };
    let mut seen = HashSet::new();
    url::form_urlencoded::parse(q.as_bytes())
        .filter(|(k, _)| NESTED_URL_PARAMS.contains(&&**k))
        .filter_map(|(_, v)| normalize::normalize(&v).ok())
        .filter(|n| AppStore::of(n).is_some())
        .filter(|n| seen.insert(n.as_str().to_string()))
        .collect()
}

fn google_lang_score(hl: &str, gl: &str) -> u8 {
    if hl.contains("en") {
        if gl.contains("us") {
            0
        } else {
            1
        }
    } else if hl.contains("es") {
        2
    } else if !hl.is_empty() {
        3
    } else {
        4
    }
}

fn apple_lang_score(country: Option<&str>, l: &str) -> u8 {
    match country {
        Some("us") => 0,
        _ if l.contains("en") => 0,
        Some("gb" | "uk" | "en") => 1,
        Some(c) if c.contains("es") => 2,
        _ if l.contains("es") => 2,
        Some(_) => 3,
        None => 4,
    }
}

fn google_candidate(url: &NormalizedUrl) -> Option<Candidate> {
    if !url.path().starts_with("/store/apps/details") {
        return None;
    }
    let id = query_param(url, "id").filter(|id| PLAY_PACKAGE_RE.is_match(id))?;
    let hl = query_param(url, "hl").unwrap_or_default().to_lowercase();
    let gl = query_param(url, "gl").unwrap_or_default();

    let mut canonical = format!(
        "https://play.google.com/store/apps/details?id={}&hl={}",
        id,
        if hl.is_empty() { "en" } else { hl.as_str() }
    );
    if !gl.is_empty() {
        canonical.push_str("&gl=");
        canonical.push_str(&gl);
    }
    Some(Candidate {
        store: AppStore::GooglePlay,
        lang_score: google_lang_score(&hl, &gl.to_lowercase()),
        app_id: id,
        url: canonical,
    })
}

fn apple_candidate(url: &NormalizedUrl) -> Option<Candidate> {
    let id = APPLE_ID_RE
        .captures(url.path())
        .or_else(|| url.query().and_then(|q| APPLE_ID_RE.captures(q)))?
        .get(1)?
        .as_str()
        .to_string();

    let parts: Vec<&str> = url.path().split('/').filter(|s| !s.is_empty()).collect();
    let country = parts
        .first()
        .filter(|p| p.len() == 2)
        .map(|p| p.to_lowercase());
    let name = parts
        .iter()
        .position(|p| *p == "app")
        .and_then(|i| parts.get(i + 1))
        .filter(|p| !p.starts_with("id"));

    let cc = country.as_deref().unwrap_or("us");
    let canonical = match name {
        Some(name) => format!("https://apps.apple.com/{}/app/{}/id{}", cc, name, id),
        None => format!("https://apps.apple.com/{}/app/id{}", cc, id),
    };
    let l = query_param(url, "l").unwrap_or_default().to_lowercase();
    Some(Candidate {
        store: AppStore::AppleStore,
        lang_score: apple_lang_score(country.as_deref(), &l),
        app_id: id,
        url: canonical,
    })
}

fn candidate(url: &NormalizedUrl) -> Option<Candidate> {
    let c = match AppStore::of(url)? {
        AppStore::GooglePlay => google_candidate(url)?,
        AppStore::AppleStore => apple_candidate(url)?,
    };
    if GENERIC_APP_IDS.contains(&c.app_id.as_str()) {
        debug!(url = %url, "skipping generic app listing");
        return None;
    }
    Some(c)
}

/// Pick at most one listing per store, Google Play first. Links whose query
/// carries a store URL contribute that URL instead of themselves. Within a
/// store the first app seen wins; among its listings the best language score
/// wins, ties keeping the earliest.
pub fn select_store_links<'a>(urls: impl IntoIterator<Item = &'a NormalizedUrl>) -> Vec<StoreLink> {
    let mut order: Vec<(AppStore, String)> = Vec::new();
    let mut best: HashMap<(AppStore, String), Candidate> = HashMap::new();

    for url in urls {
        let nested = nested_store_urls(url);
        let resolved: Vec<&NormalizedUrl> = if nested.is_empty() {
            vec![url]
        } else {
            nested.iter().collect()
        };
        for c in resolved.into_iter().filter_map(candidate) {
            let key = (c.store, c.app_id.clone());
            match best.get_mut(&key) {
                Some(current) => {
                    if c.lang_score < current.lang_score {
                        *current = c;
                    }
                }
                None => {
                    order.push(key.clone());
                    best.insert(key, c);
                }
            }
        }
    }

    [AppStore::GooglePlay, AppStore::AppleStore]
        .into_iter()
        .filter_map(|store| {
            let key = order.iter().find(|(s, _)| *s == store)?;
            best.get(key).map(|c| StoreLink {
                url: c.url.clone(),
                store,
            })
        })
        .collect()
}

// ── Tests ──
