use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::normalize::{self, NormalizedUrl};

// ── Roles ──

/// Semantic role of a URL relative to the organization that links to it.
/// Declaration order is priority order; `Unclassified` is always last.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    OfficialSite,
    OfficialSocialProfile,
    OfficialSocialContent,
    SocialProfile,
    SocialContent,
    StoreListing,
    RegulatorProfile,
    RegulatorReference,
    NewsSite,
    ThirdParty,
    WebUtilities,
    Documents,
    Unclassified,
}

impl Role {
    pub const ALL: [Role; 13] = [
        Role::OfficialSite,
        Role::OfficialSocialProfile,
        Role::OfficialSocialContent,
        Role::SocialProfile,
        Role::SocialContent,
        Role::StoreListing,
        Role::RegulatorProfile,
        Role::RegulatorReference,
        Role::NewsSite,
        Role::ThirdParty,
        Role::WebUtilities,
        Role::Documents,
        Role::Unclassified,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Role::OfficialSite => "official_site",
            Role::OfficialSocialProfile => "official_social_profile",
            Role::OfficialSocialContent => "official_social_content",
            Role::SocialProfile => "social_profile",
            Role::SocialContent => "social_content",
            Role::StoreListing => "store_listing",
            Role::RegulatorProfile => "regulator_profile",
            Role::RegulatorReference => "regulator_reference",
            Role::NewsSite => "news_site",
            Role::ThirdParty => "third_party",
            Role::WebUtilities => "web_utilities",
            Role::Documents => "documents",
            Role::Unclassified => "unclassified",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase().replace('-', "_");
        Role::ALL
            .into_iter()
            .find(|r| r.as_str() == s)
            .ok_or_else(|| format!("unknown role: {}", s))
    }
}

// ── Data sources ──

/// Structural region of the page a link was found in, or a text artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    Head,
    Header,
    #[default]
    Main,
    Footer,
    Text,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Head => "head",
            SourceKind::Header => "header",
            SourceKind::Main => "main",
            SourceKind::Footer => "footer",
            SourceKind::Text => "text",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.pad(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DataSource {
    pub url: String,
    pub normalized_url: String,
    pub role: Option<Role>,
    pub kind: SourceKind,
    #[serde(default)]
    pub texts: Vec<String>,
    pub classified_at: Option<DateTime<Utc>>,
}

impl DataSource {
    pub fn new(url: impl Into<String>, normalized: &NormalizedUrl, kind: SourceKind) -> Self {
        DataSource {
            url: url.into(),
            normalized_url: normalized.as_str().to_string(),
            role: None,
            kind,
            texts: Vec::new(),
            classified_at: None,
        }
    }

    /// Role and timestamp always change together.
    pub fn assign_role(&mut self, role: Role, at: DateTime<Utc>) {
        self.role = Some(role);
        self.classified_at = Some(at);
    }

    pub fn clear_role(&mut self) -> bool {
        let had = self.role.is_some();
        self.role = None;
        self.classified_at = None;
        had
    }

    /// Append fragments not already present, keeping discovery order.
    pub fn merge_texts<'a>(&mut self, texts: impl IntoIterator<Item = &'a String>) {
        for t in texts {
            if !self.texts.contains(t) {
                self.texts.push(t.clone());
            }
        }
    }
}

// ── Organizations ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Organization {
    pub slug: String,
    #[serde(default)]
    pub name: String,
    pub primary_domain: String,
    #[serde(default)]
    pub data_sources: Vec<DataSource>,
}

impl Organization {
    pub fn new(identity: Identity) -> Self {
        Organization {
            slug: identity.slug,
            name: identity.name,
            primary_domain: identity.primary_domain,
            data_sources: Vec::new(),
        }
    }

    pub fn find(&self, normalized_url: &str) -> Option<&DataSource> {
        self.data_sources.iter().find(|d| d.normalized_url == normalized_url)
    }

    pub fn find_mut(&mut self, normalized_url: &str) -> Option<&mut DataSource> {
        self.data_sources.iter_mut().find(|d| d.normalized_url == normalized_url)
    }

    /// Insert or merge by normalized URL. Returns true when a new entry was added.
    /// An unchanged role keeps its original timestamp.
    pub fn upsert(&mut self, source: DataSource) -> bool {
        match self.find_mut(&source.normalized_url) {
            Some(existing) => {
                existing.merge_texts(&source.texts);
                if source.role.is_some() && source.role != existing.role {
                    existing.role = source.role;
                    existing.classified_at = source.classified_at;
                }
                false
            }
            None => {
                self.data_sources.push(source);
                true
            }
        }
    }

    pub fn remove(&mut self, normalized_url: &str) -> bool {
        let before = self.data_sources.len();
        self.data_sources.retain(|d| d.normalized_url != normalized_url);
        self.data_sources.len() != before
    }
}

/// Slug, display name and primary domain of an organization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub slug: String,
    pub name: String,
    pub primary_domain: String,
}

impl Identity {
    /// Fill the gaps from whatever is known:
    /// `ejemplo.es/ruta` gives slug `ejemplo`, name `Ejemplo`, domain `ejemplo.es`;
    /// `blog.ejemplo.es` reduces to `ejemplo.es`.
    pub fn derive(
        slug: Option<&str>,
        name: Option<&str>,
        primary_domain: Option<&str>,
        url: Option<&str>,
    ) -> Option<Identity> {
        let source = primary_domain
            .filter(|s| !s.trim().is_empty())
            .or(url.filter(|s| !s.trim().is_empty()))?;
        let domain = match normalize::normalize(source) {
            Ok(n) => n.domain().to_string(),
            Err(_) => normalize::normalize_host(source),
        };
        if domain.is_empty() {
            return None;
        }

        let slug = match slug.map(str::trim).filter(|s| !s.is_empty()) {
            Some(s) => s.to_lowercase().replace([' ', '_'], "-"),
            None => domain.split('.').next().unwrap_or(&domain).to_lowercase(),
        };

        let name = match name.map(str::trim).filter(|s| !s.is_empty()) {
            Some(n) => n.to_string(),
            None => title_case(&slug),
        };

        Some(Identity {
            slug,
            name,
            primary_domain: domain,
        })
    }
}

fn title_case(slug: &str) -> String {
    slug.split(['-', '_'])
        .filter(|w| !w.is_empty())
        .map(|w| {
            let mut chars = w.chars();
            match chars.next() {
                Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ──
