//! Domain and path pattern lists shared by the role rules and the noise filter.
//!
//! An entry is `domain` or `domain/path-prefix`. A domain matches itself and its
//! subdomains; a path prefix must start the URL path. Entries ending in `.`
//! (`cdn.`) are host-label hints and match any host with a label of that name.

use serde::Deserialize;

use crate::normalize::NormalizedUrl;

// ── Social ──

const SOCIAL_PROFILE_PATTERNS: &[&str] = &[
    "linkedin.com/company/", "linkedin.com/in/",
    "instagram.com/", "youtube.com/@", "youtube.com/c/", "youtube.com/channel/",
    "twitter.com/", "x.com/",
    "facebook.com/", "fb.com/",
    "tiktok.com/@",
    "github.com/",
    "medium.com/@",
    "pinterest.com/",
    "spotify.com/",
    "telegram.me/", "t.me/",
    "discord.gg/", "discord.com/",
    "wa.me/", "whatsapp.com/",
    "threads.net/", "farcaster.xyz/", "notion.site/",
];

const SOCIAL_PLATFORMS: &[&str] = &[
    "linkedin.com", "instagram.com", "youtube.com", "twitter.com", "x.com",
    "facebook.com", "fb.com", "tiktok.com", "github.com", "medium.com",
    "pinterest.com", "spotify.com", "telegram.me", "t.me", "discord.gg",
    "discord.com", "wa.me", "whatsapp.com", "threads.net", "farcaster.xyz",
    "notion.site",
];

const SOCIAL_CONTENT_MARKERS: &[&str] = &[
    "/post/", "/posts/", "/video/", "/watch", "/status/", "/p/", "/reel/",
    "/photo/", "/album/", "/story/",
];

// ── Stores, regulators, news, directories ──

const STORE_HOSTS: &[&str] = &[
    "play.google.com",
    "apps.apple.com",
    "itunes.apple.com",
    "microsoft.com/store",
    "apps.microsoft.com",
    "galaxy.store",
    "appgallery.huawei.com",
];

const REGULATOR_HOSTS: &[&str] = &[
    "register.fca.org.uk", "fca.org.uk",
    "sec.gov", "finra.org",
    "cftc.gov", "fincen.gov",
    "cnmv.es", "cmf.cl",
    "consob.it", "amf-france.org",
    "bafin.de", "fsma.be",
    "fsra.ae", "dfsa.ae", "sca.gov.ae",
    "vara.ae", "ecsp.com",
    "sii.cl",
];

const REGULATOR_PROFILE_INDICATORS: &[&str] = &["firm", "register", "company", "entity", "license"];

const NEWS_HOSTS: &[&str] = &[
    "bbc.com", "cnn.com", "reuters.com", "bloomberg.com",
    "forbes.com", "techcrunch.com", "businessinsider.com",
    "wsj.com", "nytimes.com", "theguardian.com",
    "emol.com", "latercera.com", "elmostrador.cl",
    "df.cl", "t13.cl", "nexnews.cl", "fintechile.org",
    "energiesmedia.com", "chocale.cl", "axios.com",
    "pauta.cl", "theclinic.cl",
];

const DIRECTORY_HOSTS: &[&str] = &[
    "crunchbase.com", "trustpilot.com", "thecrowdspace.com",
    "producthunt.com", "g2.com", "capterra.com", "airbnb.cl",
];

// ── Web resources ──

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "svg", "webp", "ico", "bmp", "tiff", "avif"];
const VIDEO_EXTENSIONS: &[&str] = &["mp4", "webm", "avi", "mov", "mkv", "ogv"];
const ASSET_EXTENSIONS: &[&str] = &[
    "css", "js", "mjs", "map", "woff", "woff2", "ttf", "otf", "eot", "mp3", "wav", "m4a", "ogg",
];
const DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "doc", "docx", "xls", "xlsx", "ppt", "pptx", "txt", "csv", "zip", "rar", "7z",
];
const RESOURCE_PATHS: &[&str] = &[
    "/assets/", "/static/", "/images/", "/image/", "/img/", "/css/", "/js/", "/fonts/",
    "/wp-content/", "/media/", "/scripts/", "/script/",
];
const CDN_HOSTS: &[&str] = &[
    "cdn.", "static.", "assets.", "media.",
    "intercomcdn.com", "digitaloceanspaces.com", "lh3.googleusercontent.com",
];

const ANALYTICS_HOSTS: &[&str] = &[
    "google-analytics.com", "googletagmanager.com", "doubleclick.net",
    "googlesyndication.com", "hotjar.com", "segment.io", "fullstory.com",
    "mixpanel.com", "facebook.com/tr", "connect.facebook.net", "framer.com",
    "framer.app", "fonts.gstatic.com",
];
const FRAMEWORK_PATHS: &[&str] = &["/_next/", "%2f_next%2f"];
const MANIFEST_HINTS: &[&str] = &["manifest.json", ".webmanifest", "/api/manifest-gen"];

const IGNORED_HOSTS: &[&str] = &["intercom.com", "googleapis.com"];

/// Extra entries appended to the built-in lists, typically from configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct DomainOverrides {
    pub social_platforms: Vec<String>,
    pub stores: Vec<String>,
    pub regulators: Vec<String>,
    pub news: Vec<String>,
    pub directories: Vec<String>,
    pub cdn_hosts: Vec<String>,
    pub analytics_hosts: Vec<String>,
    pub ignored: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct DomainLists {
    pub social_profiles: Vec<String>,
    pub social_platforms: Vec<String>,
    pub social_content_markers: Vec<String>,
    pub stores: Vec<String>,
    pub regulators: Vec<String>,
    pub regulator_profile_indicators: Vec<String>,
    pub news: Vec<String>,
    pub directories: Vec<String>,
    pub image_extensions: Vec<String>,
    pub video_extensions: Vec<String>,
    pub asset_extensions: Vec<String>,
    pub document_extensions: Vec<String>,
    pub resource_paths: Vec<String>,
    pub cdn_hosts: Vec<String>,
    pub analytics_hosts: Vec<String>,
    pub framework_paths: Vec<String>,
    pub manifest_hints: Vec<String>,
    pub ignored: Vec<String>,
}

fn owned(list: &[&str]) -> Vec<String> {
    list.iter().map(|s| s.to_string()).collect()
}

impl Default for DomainLists {
    fn default() -> Self {
        DomainLists {
            social_profiles: owned(SOCIAL_PROFILE_PATTERNS),
            social_platforms: owned(SOCIAL_PLATFORMS),
            social_content_markers: owned(SOCIAL_CONTENT_MARKERS),
            stores: owned(STORE_HOSTS),
            regulators: owned(REGULATOR_HOSTS),
            regulator_profile_indicators: owned(REGULATOR_PROFILE_INDICATORS),
            news: owned(NEWS_HOSTS),
            directories: owned(DIRECTORY_HOSTS),
            image_extensions: owned(IMAGE_EXTENSIONS),
            video_extensions: owned(VIDEO_EXTENSIONS),
            asset_extensions: owned(ASSET_EXTENSIONS),
            document_extensions: owned(DOCUMENT_EXTENSIONS),
            resource_paths: owned(RESOURCE_PATHS),
            cdn_hosts: owned(CDN_HOSTS),
            analytics_hosts: owned(ANALYTICS_HOSTS),
            framework_paths: owned(FRAMEWORK_PATHS),
            manifest_hints: owned(MANIFEST_HINTS),
            ignored: owned(IGNORED_HOSTS),
        }
    }
}

impl DomainLists {
    pub fn with_overrides(overrides: &DomainOverrides) -> Self {
        let mut lists = DomainLists::default();
        let pairs: [(&mut Vec<String>, &Vec<String>); 8] = [
            (&mut lists.social_platforms, &overrides.social_platforms),
            (&mut lists.stores, &overrides.stores),
            (&mut lists.regulators, &overrides.regulators),
            (&mut lists.news, &overrides.news),
            (&mut lists.directories, &overrides.directories),
            (&mut lists.cdn_hosts, &overrides.cdn_hosts),
            (&mut lists.analytics_hosts, &overrides.analytics_hosts),
            (&mut lists.ignored, &overrides.ignored),
        ];
        for (target, extra) in pairs {
            for e in extra {
                let e = e.trim().to_lowercase();
                if !e.is_empty() && !target.contains(&e) {
                    target.push(e);
                }
            }
        }
        lists
    }

    // ── Membership tests ──

    pub fn is_social_platform(&self, url: &NormalizedUrl) -> bool {
        any_entry(url, &self.social_platforms)
    }

    /// A profile-shaped social URL: platform plus profile path prefix and a non-empty handle.
    pub fn is_social_profile_pattern(&self, url: &NormalizedUrl) -> bool {
        let path = url.path().to_lowercase();
        self.social_profiles.iter().any(|entry| {
            let (domain, prefix) = split_entry(entry);
            let prefix = if prefix.is_empty() { "/" } else { prefix };
            url.host_matches(domain) && path.len() > prefix.len() && path.starts_with(prefix)
        })
    }

    pub fn has_content_marker(&self, url: &NormalizedUrl) -> bool {
        let path = url.path().to_lowercase();
        self.social_content_markers
            .iter()
            .any(|m| path.contains(m.as_str()) || path.ends_with(m.trim_end_matches('/')))
    }

    pub fn is_store(&self, url: &NormalizedUrl) -> bool {
        any_entry(url, &self.stores)
    }

    pub fn is_regulator(&self, url: &NormalizedUrl) -> bool {
        any_entry(url, &self.regulators)
    }

    pub fn has_regulator_profile_indicator(&self, url: &NormalizedUrl) -> bool {
        let hp = url.host_and_path();
        self.regulator_profile_indicators.iter().any(|i| hp.contains(i.as_str()))
    }

    pub fn is_news(&self, url: &NormalizedUrl) -> bool {
        any_entry(url, &self.news)
    }

    pub fn is_directory(&self, url: &NormalizedUrl) -> bool {
        any_entry(url, &self.directories)
    }

    pub fn is_ignored(&self, url: &NormalizedUrl) -> bool {
        any_entry(url, &self.ignored)
    }

    pub fn is_analytics(&self, url: &NormalizedUrl) -> bool {
        any_entry(url, &self.analytics_hosts)
    }

    pub fn is_cdn_host(&self, url: &NormalizedUrl) -> bool {
        any_entry(url, &self.cdn_hosts)
    }

    pub fn is_document(&self, url: &NormalizedUrl) -> bool {
        has_extension(url, &self.document_extensions)
    }

    pub fn is_media_file(&self, url: &NormalizedUrl) -> bool {
        has_extension(url, &self.image_extensions) || has_extension(url, &self.video_extensions)
    }

    pub fn is_resource_path(&self, url: &NormalizedUrl) -> bool {
        let path = format!("{}/", url.path().to_lowercase());
        self.resource_paths.iter().any(|p| path.contains(p.as_str()))
    }

    /// Images, video, scripts, stylesheets and fonts, by extension or location.
    pub fn is_static_resource(&self, url: &NormalizedUrl) -> bool {
        self.is_media_file(url)
            || has_extension(url, &self.asset_extensions)
            || self.is_resource_path(url)
            || self.is_cdn_host(url)
    }

    pub fn is_framework_internal(&self, url: &NormalizedUrl) -> bool {
        let hp = url.host_and_path();
        self.framework_paths.iter().any(|p| hp.contains(p.as_str()))
    }

    pub fn is_manifest(&self, url: &NormalizedUrl) -> bool {
        let path = url.path().to_lowercase();
        self.manifest_hints.iter().any(|h| path.contains(h.as_str()))
    }
}

/// Split `domain/path` into (`domain`, `/path`).
fn split_entry(entry: &str) -> (&str, &str) {
    match entry.find('/') {
        Some(idx) => (&entry[..idx], &entry[idx..]),
        None => (entry, ""),
    }
}

fn entry_matches(url: &NormalizedUrl, entry: &str) -> bool {
    if let Some(label) = entry.strip_suffix('.') {
        return url.host().split('.').any(|l| l == label) && url.host() != entry.trim_end_matches('.');
    }
    let (domain, prefix) = split_entry(entry);
    url.host_matches(domain) && (prefix.is_empty() || url.path().to_lowercase().starts_with(prefix))
}

fn any_entry(url: &NormalizedUrl, entries: &[String]) -> bool {
    entries.iter().any(|e| entry_matches(url, e))
}

fn has_extension(url: &NormalizedUrl, exts: &[String]) -> bool {
    url.extension().is_some_and(|e| exts.iter().any(|x| *x == e))
}


// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn url(s: &str) -> NormalizedUrl {
        normalize(s).unwrap()
    }

    #[test]
    fn domain_entries_respect_label_boundaries() {
        let lists = DomainLists::default();
        assert!(lists.is_social_platform(&url("https://x.com/companyx")));
        assert!(lists.is_social_platform(&url("https://mobile.twitter.com/companyx")));
        assert!(!lists.is_social_platform(&url("https://netflix.com/browse")));
        assert!(lists.is_news(&url("https://www.reuters.com/tech/companyx")));
    }

    #[test]
    fn path_entries_need_matching_prefix() {
        let lists = DomainLists::default();
        assert!(lists.is_store(&url("https://www.microsoft.com/store/apps/9N")));
        assert!(!lists.is_store(&url("https://www.microsoft.com/en-us/windows")));
        assert!(lists.is_store(&url("https://itunes.apple.com/us/app/acme/id555")));
        assert!(lists.is_social_profile_pattern(&url("https://www.linkedin.com/company/companyx/")));
        assert!(!lists.is_social_profile_pattern(&url("https://www.linkedin.com/feed")));
        assert!(!lists.is_social_profile_pattern(&url("https://facebook.com/")));
    }

    #[test]
    fn label_hints_match_whole_labels() {
        let lists = DomainLists::default();
        assert!(lists.is_cdn_host(&url("https://cdn.companyx.com/logo")));
        assert!(lists.is_cdn_host(&url("https://eu.media.companyx.com/a")));
        assert!(!lists.is_cdn_host(&url("https://socialmedia.com/a")));
    }

    #[test]
    fn resources_and_documents() {
        let lists = DomainLists::default();
        assert!(lists.is_static_resource(&url("https://companyx.com/logo.svg")));
        assert!(lists.is_static_resource(&url("https://companyx.com/assets/app")));
        assert!(lists.is_document(&url("https://companyx.com/terms.pdf")));
        assert!(!lists.is_static_resource(&url("https://companyx.com/about")));
        assert!(lists.is_framework_internal(&url("https://companyx.com/_next/image?url=x")));
        assert!(lists.is_manifest(&url("https://companyx.com/site.webmanifest")));
    }

    #[test]
    fn overrides_extend_lists() {
        let overrides = DomainOverrides {
            news: vec!["Diario.example".into()],
            ..Default::default()
        };
        let lists = DomainLists::with_overrides(&overrides);
        assert!(lists.is_news(&url("https://diario.example/nota")));
        assert!(lists.is_news(&url("https://bbc.com/news")));
        assert!(lists.is_ignored(&url("https://api.googleapis.com/x")));
    }
}
