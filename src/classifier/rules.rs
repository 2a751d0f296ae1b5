use std::sync::Arc;

use crate::domains::DomainLists;
use crate::model::Role;
use crate::normalize::NormalizedUrl;

use super::{OrgContext, RuleUnit};

/// Rank of the built-in rule for `role`: 100 for `official_site`, then steps of
/// 100 following the role order. Custom units can slot between them.
pub const fn default_rank(role: Role) -> u32 {
    (role as u32 + 1) * 100
}

/// Branded profile-shaped URL on a social platform.
fn official_social(lists: &DomainLists, url: &NormalizedUrl, ctx: &OrgContext) -> bool {
    lists.is_social_profile_pattern(url) && ctx.brand_in_path(url)
}

fn generic_social(lists: &DomainLists, url: &NormalizedUrl, ctx: &OrgContext) -> bool {
    lists.is_social_platform(url) && !official_social(lists, url, ctx)
}

type ListPredicate = fn(&DomainLists, &NormalizedUrl, &OrgContext) -> bool;

fn list_rule(lists: &Arc<DomainLists>, name: &str, role: Role, pred: ListPredicate) -> RuleUnit {
    let lists = Arc::clone(lists);
    RuleUnit::new(name, role, default_rank(role), move |u, ctx| pred(&lists, u, ctx))
}

/// Built-in rules, one per role except `unclassified`.
pub fn default_rules(lists: Arc<DomainLists>) -> Vec<RuleUnit> {
    let rule = |name: &str, role: Role, pred: ListPredicate| list_rule(&lists, name, role, pred);

    vec![
        rule("official-site", Role::OfficialSite, |_, u, ctx| ctx.owns(u)),
        rule("official-social-profile", Role::OfficialSocialProfile, |l, u, ctx| {
            official_social(l, u, ctx) && !l.has_content_marker(u)
        }),
        rule("official-social-content", Role::OfficialSocialContent, |l, u, ctx| {
            official_social(l, u, ctx) && l.has_content_marker(u)
        }),
        rule("social-profile", Role::SocialProfile, |l, u, ctx| {
            generic_social(l, u, ctx) && !l.has_content_marker(u)
        }),
        rule("social-content", Role::SocialContent, |l, u, ctx| {
            generic_social(l, u, ctx) && l.has_content_marker(u)
        }),
        rule("store-listing", Role::StoreListing, |l, u, _| l.is_store(u)),
        rule("regulator-profile", Role::RegulatorProfile, |l, u, _| {
            l.is_regulator(u) && l.has_regulator_profile_indicator(u)
        }),
        rule("regulator-reference", Role::RegulatorReference, |l, u, _| {
            l.is_regulator(u) && !l.has_regulator_profile_indicator(u)
        }),
        rule("news-site", Role::NewsSite, |l, u, _| l.is_news(u)),
        rule("third-party", Role::ThirdParty, |l, u, ctx| {
            (l.is_directory(u) || ctx.mentions_brand(u)) && !l.is_static_resource(u) && !l.is_document(u)
        }),
        rule("web-utilities", Role::WebUtilities, |l, u, _| l.is_static_resource(u)),
        rule("documents", Role::Documents, |l, u, _| l.is_document(u)),
    ]
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classifier::RoleRegistry;
    use crate::normalize::normalize;

    fn classify(raw: &str) -> Role {
        let reg = RoleRegistry::with_defaults(Arc::new(DomainLists::default()));
        reg.classify(&normalize(raw).unwrap(), &OrgContext::new("companyx.com"))
    }

    #[test]
    fn ranks_follow_role_order() {
        assert_eq!(default_rank(Role::OfficialSite), 100);
        assert_eq!(default_rank(Role::Documents), 1200);
        let rules = default_rules(Arc::new(DomainLists::default()));
        assert_eq!(rules.len(), Role::ALL.len() - 1);
        assert!(rules.windows(2).all(|w| w[0].priority() < w[1].priority()));
        assert!(rules.iter().all(|r| r.role() != Role::Unclassified));
    }

    #[test]
    fn social_split() {
        assert_eq!(classify("https://www.linkedin.com/company/companyx/"), Role::OfficialSocialProfile);
        assert_eq!(classify("https://www.instagram.com/companyx/p/Cx12/"), Role::OfficialSocialContent);
        assert_eq!(classify("https://x.com/companyx/status/1790"), Role::OfficialSocialContent);
        assert_eq!(classify("https://www.linkedin.com/in/jane-doe"), Role::SocialProfile);
        assert_eq!(classify("https://www.youtube.com/watch?v=abc"), Role::SocialContent);
        assert_eq!(classify("https://twitter.com/someone_else"), Role::SocialProfile);
    }

    #[test]
    fn stores_regulators_news() {
        assert_eq!(classify("https://play.google.com/store/apps/details?id=com.companyx"), Role::StoreListing);
        assert_eq!(classify("https://apps.apple.com/cl/app/companyx/id123"), Role::StoreListing);
        assert_eq!(classify("https://register.fca.org.uk/s/firm?id=001"), Role::RegulatorProfile);
        assert_eq!(classify("https://www.cmf.cl/portal/entidad/companyx-license"), Role::RegulatorProfile);
        assert_eq!(classify("https://www.sec.gov/rules-regulations"), Role::RegulatorReference);
        assert_eq!(classify("https://www.reuters.com/markets/"), Role::NewsSite);
    }

    #[test]
    fn third_party_and_resources() {
        assert_eq!(classify("https://www.crunchbase.com/organization/acme"), Role::ThirdParty);
        assert_eq!(classify("https://random-blog.net/review-companyx"), Role::ThirdParty);
        assert_eq!(classify("https://random-blog.net/companyx-logo.png"), Role::WebUtilities);
        assert_eq!(classify("https://cdn.jsdelivr.net/npm/lib"), Role::WebUtilities);
        assert_eq!(classify("https://example.org/reports/2023.pdf"), Role::Documents);
        assert_eq!(classify("https://random-blog.net/companyx-report.pdf"), Role::Documents);
        assert_eq!(classify("https://example.org/about"), Role::Unclassified);
    }
}
