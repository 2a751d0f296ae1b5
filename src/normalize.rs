use std::fmt;
use std::net::IpAddr;
use std::sync::LazyLock;

use regex::Regex;
use url::form_urlencoded;
use url::Url;

use crate::error::{CuratorError, Result};

/// Schemes that never point at a navigable web page.
const NON_WEB_SCHEMES: &[&str] = &[
    "mailto:", "tel:", "sms:", "javascript:", "data:", "blob:", "about:", "file:", "ftp:",
];

/// Query parameters dropped during normalization. A trailing `*` matches by prefix.
pub const DEFAULT_TRACKING_PARAMS: &[&str] = &[
    "utm_*", "fbclid", "gclid", "dclid", "msclkid", "mc_cid", "mc_eid", "igshid", "_ga", "_gl",
    "ref", "ref_src", "si",
];

/// Second-level labels that sit under a two-letter country code (`co.uk`, `gob.cl`).
const PUBLIC_SECOND_LEVEL: &[&str] = &["co", "com", "net", "org", "gob", "gov", "edu", "ac", "mil", "nom"];

/// File extensions that make a bare token a relative path rather than a host.
const PAGE_EXTENSIONS: &[&str] = &["html", "htm", "php", "asp", "aspx", "jsp", "cfm"];

static DEFAULT_NORMALIZER: LazyLock<Normalizer> = LazyLock::new(Normalizer::default);

/// Canonical form of a web URL. Two raw URLs that point at the same page
/// normalize to the same value.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NormalizedUrl {
    url: String,
    host: String,
    domain: String,
    path: String,
    query: Option<String>,
}

impl NormalizedUrl {
    pub fn as_str(&self) -> &str {
        &self.url
    }

    /// Lower-cased host without a leading `www.`.
    pub fn host(&self) -> &str {
        &self.host
    }

    /// Registrable domain (`blog.companyx.co.uk` -> `companyx.co.uk`).
    pub fn domain(&self) -> &str {
        &self.domain
    }

    /// Path without trailing slashes; empty for the site root.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn query(&self) -> Option<&str> {
        self.query.as_deref()
    }

    /// The URL with its query removed.
    pub fn without_query(&self) -> &str {
        match self.url.find('?') {
            Some(idx) => &self.url[..idx],
            None => &self.url,
        }
    }

    /// Lower-cased `host/path?query`, the form domain patterns are matched against.
    pub fn host_and_path(&self) -> String {
        let mut s = format!("{}{}", self.host, self.path.to_lowercase());
        if let Some(q) = &self.query {
            s.push('?');
            s.push_str(&q.to_lowercase());
        }
        s
    }

    /// Lower-cased extension of the last path segment, if any.
    pub fn extension(&self) -> Option<String> {
        let last = self.path.rsplit('/').next()?;
        let (stem, ext) = last.rsplit_once('.')?;
        if stem.is_empty() || ext.is_empty() {
            return None;
        }
        Some(ext.to_lowercase())
    }

    /// True when `host` is `domain` or one of its subdomains.
    pub fn host_matches(&self, domain: &str) -> bool {
        host_in_domain(&self.host, domain)
    }
}

impl fmt::Display for NormalizedUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

#[derive(Debug, Clone)]
pub struct Normalizer {
    tracking_params: Vec<String>,
}

impl Default for Normalizer {
    fn default() -> Self {
        Normalizer {
            tracking_params: DEFAULT_TRACKING_PARAMS.iter().map(|s| s.to_string()).collect(),
        }
    }
}

impl Normalizer {
    /// Default tracking parameters plus `extra`.
    pub fn with_extra_tracking_params(extra: &[String]) -> Self {
        let mut n = Normalizer::default();
        for p in extra {
            let p = p.trim().to_lowercase();
            if !p.is_empty() && !n.tracking_params.contains(&p) {
                n.tracking_params.push(p);
            }
        }
        n
    }

    pub fn normalize(&self, raw: &str) -> Result<NormalizedUrl> {
        self.normalize_with_base(raw, None)
    }

    /// Normalize `raw`, resolving relative references against `base`
    /// (the page the link was discovered on).
    pub fn normalize_with_base(&self, raw: &str, base: Option<&NormalizedUrl>) -> Result<NormalizedUrl> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CuratorError::invalid_url(raw, "empty"));
        }
        if trimmed.starts_with('#') {
            return Err(CuratorError::invalid_url(raw, "fragment-only reference"));
        }
        let lower = trimmed.to_ascii_lowercase();
        if NON_WEB_SCHEMES.iter().any(|s| lower.starts_with(s)) {
            return Err(CuratorError::invalid_url(raw, "non-web scheme"));
        }

        let parsed = if trimmed.starts_with("//") {
            parse(raw, &format!("https:{}", trimmed))?
        } else if lower.starts_with("http://") || lower.starts_with("https://") {
            parse(raw, trimmed)?
        } else if has_scheme(&lower) {
            return Err(CuratorError::invalid_url(raw, "unsupported scheme"));
        } else if is_relative(trimmed) {
            let base = base.ok_or_else(|| CuratorError::invalid_url(raw, "relative reference without base"))?;
            let base = parse(raw, base.as_str())?;
            base.join(trimmed)
                .map_err(|e| CuratorError::invalid_url(raw, e.to_string()))?
        } else {
            parse(raw, &format!("https://{}", trimmed))?
        };

        self.canonicalize(raw, &parsed)
    }

    fn canonicalize(&self, raw: &str, url: &Url) -> Result<NormalizedUrl> {
        if !matches!(url.scheme(), "http" | "https") {
            return Err(CuratorError::invalid_url(raw, "unsupported scheme"));
        }
        let host = url
            .host_str()
            .map(|h| h.trim_end_matches('.').to_lowercase())
            .filter(|h| !h.is_empty())
            .ok_or_else(|| CuratorError::invalid_url(raw, "missing host"))?;
        let host = strip_www(&host).to_string();
        if host.is_empty() {
            return Err(CuratorError::invalid_url(raw, "missing host"));
        }

        // http and https collapse to https, so both default ports go.
        let port = url
            .port()
            .filter(|p| *p != 80 && *p != 443)
            .map(|p| format!(":{}", p))
            .unwrap_or_default();

        let path = url.path().trim_end_matches('/').to_string();

        let kept: Vec<(String, String)> = url
            .query_pairs()
            .filter(|(k, _)| !self.is_tracking(k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();
        let query = if kept.is_empty() {
            None
        } else {
            let mut ser = form_urlencoded::Serializer::new(String::new());
            for (k, v) in &kept {
                ser.append_pair(k, v);
            }
            Some(ser.finish())
        };

        let mut out = format!("https://{}{}{}", host, port, path);
        if let Some(q) = &query {
            out.push('?');
            out.push_str(q);
        }

        Ok(NormalizedUrl {
            url: out,
            domain: registrable_domain(&host),
            host,
            path,
            query,
        })
    }

    fn is_tracking(&self, key: &str) -> bool {
        let key = key.to_lowercase();
        self.tracking_params.iter().any(|p| match p.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == *p,
        })
    }
}

/// Normalize with the default tracking-parameter set.
pub fn normalize(raw: &str) -> Result<NormalizedUrl> {
    DEFAULT_NORMALIZER.normalize(raw)
}

pub fn normalize_with_base(raw: &str, base: Option<&NormalizedUrl>) -> Result<NormalizedUrl> {
    DEFAULT_NORMALIZER.normalize_with_base(raw, base)
}

/// Reduce a domain-ish input (`https://www.CompanyX.com/about`, `companyx.com`)
/// to its lower-cased host without `www.`. Falls back to the trimmed input.
pub fn normalize_host(input: &str) -> String {
    match normalize(input) {
        Ok(n) => n.host,
        Err(_) => strip_www(&input.trim().to_lowercase()).to_string(),
    }
}

/// Drop every leading `www.` label, stopping before the host would become a
/// bare label (`www.com` stays as is).
fn strip_www(host: &str) -> &str {
    let mut host = host;
    while let Some(rest) = host.strip_prefix("www.") {
        if !rest.contains('.') {
            break;
        }
        host = rest;
    }
    host
}

/// Registrable domain of a host. IP literals map to themselves.
pub fn registrable_domain(host: &str) -> String {
    if host.starts_with('[') || host.parse::<IpAddr>().is_ok() {
        return host.to_string();
    }
    let labels: Vec<&str> = host.split('.').filter(|l| !l.is_empty()).collect();
    let n = labels.len();
    if n <= 2 {
        return labels.join(".");
    }
    let take = if labels[n - 1].len() == 2 && PUBLIC_SECOND_LEVEL.contains(&labels[n - 2]) {
        3
    } else {
        2
    };
    labels[n - take..].join(".")
}

/// `host` equals `domain` or is a subdomain of it.
pub fn host_in_domain(host: &str, domain: &str) -> bool {
    let domain = domain.trim_start_matches('.');
    !domain.is_empty()
        && (host == domain || (host.len() > domain.len() && host.ends_with(domain) && host[..host.len() - domain.len()].ends_with('.')))
}

fn parse(raw: &str, candidate: &str) -> Result<Url> {
    Url::parse(candidate).map_err(|e| CuratorError::invalid_url(raw, e.to_string()))
}

/// `scheme:` prefix that is not a `host:port` pair.
static SCHEME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-z][a-z0-9+.\-]*:(?:\D|$)").unwrap());

fn has_scheme(lower: &str) -> bool {
    SCHEME_RE.is_match(lower)
}

fn is_relative(s: &str) -> bool {
    if s.starts_with('/') || s.starts_with("./") || s.starts_with("../") || s.starts_with('?') {
        return true;
    }
    let first = s.split(['/', '?', '#']).next().unwrap_or("");
    if first.contains(':') {
        // host:port
        return false;
    }
    match first.rsplit_once('.') {
        None => true,
        Some((name, tld)) => {
            name.is_empty()
                || tld.is_empty()
                || !tld.chars().all(|c| c.is_ascii_alphabetic())
                || PAGE_EXTENSIONS.contains(&tld.to_ascii_lowercase().as_str())
        }
    }
}

// ── Tests ──
