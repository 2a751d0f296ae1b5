//! Link categories and noise detection.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

use serde::Serialize;

use crate::classifier::OrgContext;
use crate::domains::DomainLists;
use crate::normalize::NormalizedUrl;

/// Coarse bucket for a link, checked in declaration order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkCategory {
    Root,
    AppStore,
    Social,
    Multimedia,
    News,
    Property,
    Legal,
    Ignored,
    Miscellaneous,
}

impl LinkCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkCategory::Root => "root",
            LinkCategory::AppStore => "app_store",
            LinkCategory::Social => "social",
            LinkCategory::Multimedia => "multimedia",
            LinkCategory::News => "news",
            LinkCategory::Property => "property",
            LinkCategory::Legal => "legal",
            LinkCategory::Ignored => "ignored",
            LinkCategory::Miscellaneous => "miscellaneous",
        }
    }
}

impl fmt::Display for LinkCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum NoiseReason {
    IgnoredHost,
    Multimedia,
    Analytics,
    FrameworkInternal,
    Manifest,
    StaticResource,
    AvatarCdn,
    MapDeepLink,
    /// Same URL minus its query string is also in the pass.
    QueryVariant,
}

impl NoiseReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            NoiseReason::IgnoredHost => "ignored_host",
            NoiseReason::Multimedia => "multimedia",
            NoiseReason::Analytics => "analytics",
            NoiseReason::FrameworkInternal => "framework_internal",
            NoiseReason::Manifest => "manifest",
            NoiseReason::StaticResource => "static_resource",
            NoiseReason::AvatarCdn => "avatar_cdn",
            NoiseReason::MapDeepLink => "map_deep_link",
            NoiseReason::QueryVariant => "query_variant",
        }
    }
}

impl fmt::Display for NoiseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Retain,
    Prune(NoiseReason),
}

const AVATAR_HOSTS: &[&str] = &[
    "lh3.googleusercontent.com",
    "gravatar.com",
    "avatars.githubusercontent.com",
    "ui-avatars.com",
];

const MAP_DEEP_LINK_MARKERS: &[&str] = &["/contrib/", "/reviews"];

#[derive(Debug, Clone)]
pub struct DomainFilter {
    lists: Arc<DomainLists>,
}

impl DomainFilter {
    pub fn new(lists: Arc<DomainLists>) -> Self {
        DomainFilter { lists }
    }

    pub fn categorize(&self, url: &NormalizedUrl, ctx: &OrgContext) -> LinkCategory {
        let l = &self.lists;
        let youtube = url.host_matches("youtube.com");
        if ctx.owns(url) {
            LinkCategory::Root
        } else if l.is_store(url) {
            LinkCategory::AppStore
        } else if (youtube && url.path().starts_with("/@")) || l.is_social_platform(url) {
            LinkCategory::Social
        } else if (youtube && url.path().starts_with("/watch")) || l.is_cdn_host(url) {
            LinkCategory::Multimedia
        } else if l.is_news(url) {
            LinkCategory::News
        } else if l.is_directory(url) {
            LinkCategory::Property
        } else if l.is_regulator(url) {
            LinkCategory::Legal
        } else if l.is_ignored(url) {
            LinkCategory::Ignored
        } else {
            LinkCategory::Miscellaneous
        }
    }

    /// Non-navigational resources: trackers, build output, assets.
    pub fn web_utility(&self, url: &NormalizedUrl) -> Option<NoiseReason> {
        let l = &self.lists;
        let hp = url.host_and_path();
        if AVATAR_HOSTS.iter().any(|h| url.host_matches(h)) {
            Some(NoiseReason::AvatarCdn)
        } else if hp.contains("google.com/maps") && MAP_DEEP_LINK_MARKERS.iter().any(|m| hp.contains(m)) {
            Some(NoiseReason::MapDeepLink)
        } else if l.is_framework_internal(url) {
            Some(NoiseReason::FrameworkInternal)
        } else if l.is_manifest(url) {
            Some(NoiseReason::Manifest)
        } else if l.is_analytics(url) {
            Some(NoiseReason::Analytics)
        } else if l.is_media_file(url) || l.is_resource_path(url) || self.is_asset(url) {
            Some(NoiseReason::StaticResource)
        } else {
            None
        }
    }

    fn is_asset(&self, url: &NormalizedUrl) -> bool {
        url.extension()
            .is_some_and(|e| self.lists.asset_extensions.iter().any(|x| *x == e))
    }

    /// Verdict for one link on its own; query variants need [`DomainFilter::screen`].
    pub fn verdict(&self, url: &NormalizedUrl, ctx: &OrgContext) -> Verdict {
        match self.categorize(url, ctx) {
            LinkCategory::Ignored => return Verdict::Prune(NoiseReason::IgnoredHost),
            LinkCategory::Multimedia => return Verdict::Prune(NoiseReason::Multimedia),
            _ => {}
        }
        match self.web_utility(url) {
            Some(reason) => Verdict::Prune(reason),
            None => Verdict::Retain,
        }
    }

    /// Verdicts for a whole pass, index-aligned with `urls`.
    pub fn screen(&self, urls: &[NormalizedUrl], ctx: &OrgContext) -> Vec<Verdict> {
        let bases: HashSet<&str> = urls
            .iter()
            .filter(|u| u.query().is_none())
            .map(NormalizedUrl::as_str)
            .collect();
        urls.iter()
            .map(|u| match self.verdict(u, ctx) {
                Verdict::Retain if u.query().is_some() && bases.contains(u.without_query()) => {
                    Verdict::Prune(NoiseReason::QueryVariant)
                }
                v => v,
            })
            .collect()
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normalize::normalize;

    fn filter() -> DomainFilter {
        DomainFilter::new(Arc::new(DomainLists::default()))
    }

    fn ctx() -> OrgContext {
        OrgContext::new("reity.cl")
    }

    fn cat(raw: &str) -> LinkCategory {
        filter().categorize(&normalize(raw).unwrap(), &ctx())
    }

    fn verdict(raw: &str) -> Verdict {
        filter().verdict(&normalize(raw).unwrap(), &ctx())
    }

    #[test]
    fn categories_in_order() {
        assert_eq!(cat("https://app.reity.cl/login"), LinkCategory::Root);
        assert_eq!(cat("https://play.google.com/store/apps/details?id=cl.reity"), LinkCategory::AppStore);
        assert_eq!(cat("https://www.youtube.com/@reity"), LinkCategory::Social);
        assert_eq!(cat("https://www.instagram.com/reity.cl"), LinkCategory::Social);
        assert_eq!(cat("https://reity.intercomcdn.com/x"), LinkCategory::Multimedia);
        assert_eq!(cat("https://www.df.cl/empresas/nota"), LinkCategory::News);
        assert_eq!(cat("https://www.airbnb.cl/rooms/1"), LinkCategory::Property);
        assert_eq!(cat("https://www.cmf.cl/portal"), LinkCategory::Legal);
        assert_eq!(cat("https://widget.intercom.com/x"), LinkCategory::Ignored);
        assert_eq!(cat("https://example.org/anything"), LinkCategory::Miscellaneous);
    }

    #[test]
    fn noise() {
        assert_eq!(verdict("https://widget.intercom.com/x"), Verdict::Prune(NoiseReason::IgnoredHost));
        assert_eq!(verdict("https://cdn.example.net/a"), Verdict::Prune(NoiseReason::Multimedia));
        assert_eq!(verdict("https://www.googletagmanager.com/gtm.js?id=1"), Verdict::Prune(NoiseReason::Analytics));
        assert_eq!(verdict("https://reity.cl/_next/static/chunk.js"), Verdict::Prune(NoiseReason::FrameworkInternal));
        assert_eq!(verdict("https://reity.cl/site.webmanifest"), Verdict::Prune(NoiseReason::Manifest));
        assert_eq!(verdict("https://reity.cl/logo.png"), Verdict::Prune(NoiseReason::StaticResource));
        assert_eq!(verdict("https://reity.cl/wp-content/uploads/x"), Verdict::Prune(NoiseReason::StaticResource));
        assert_eq!(verdict("https://secure.gravatar.com/avatar/abc"), Verdict::Prune(NoiseReason::AvatarCdn));
        assert_eq!(verdict("https://lh3.googleusercontent.com/a/photo"), Verdict::Prune(NoiseReason::Multimedia));
        assert_eq!(verdict("https://www.google.com/maps/place/x/reviews"), Verdict::Prune(NoiseReason::MapDeepLink));
    }

    #[test]
    fn navigation_is_kept() {
        for raw in [
            "https://reity.cl/regulacion",
            "https://www.linkedin.com/company/reity",
            "https://example.org/reports/2023.pdf",
            "https://www.google.com/maps/place/reity",
            "https://reity.cl/manifesto",
        ] {
            assert_eq!(verdict(raw), Verdict::Retain, "{}", raw);
        }
    }

    #[test]
    fn query_variants_need_their_base() {
        let urls: Vec<NormalizedUrl> = ["https://reity.cl/about", "https://reity.cl/about?lang=en", "https://reity.cl/blog?page=2"]
            .iter()
            .map(|u| normalize(u).unwrap())
            .collect();
        let v = filter().screen(&urls, &ctx());
        assert_eq!(v, vec![Verdict::Retain, Verdict::Prune(NoiseReason::QueryVariant), Verdict::Retain]);
    }
}
