//! Folds one organization's extracted links into its persisted record.
//!
//! Each link goes `raw -> normalized -> classified -> retained | pruned`.
//! Links that fail to normalize are reported and dropped; they never fail the
//! organization. Retained links are merged into the stored document and any
//! stored data source pruned in this pass is removed.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use chrono::Utc;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::app_store::{self, StoreLink};
use crate::applier::RoleApplier;
use crate::classifier::OrgContext;
use crate::error::{CuratorError, Result};
use crate::model::{DataSource, Identity, Organization, Role, SourceKind};
use crate::normalize::{self, NormalizedUrl};
use crate::platform::{self, SocialProfile};

use super::filter::{DomainFilter, NoiseReason, Verdict};

// ── Input ──

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RawLink {
    pub url: String,
    #[serde(default)]
    pub kind: SourceKind,
    #[serde(default)]
    pub text: Option<String>,
}

impl RawLink {
    pub fn new(url: impl Into<String>, kind: SourceKind) -> Self {
        RawLink {
            url: url.into(),
            kind,
            text: None,
        }
    }

    pub fn with_text(mut self, text: impl Into<String>) -> Self {
        self.text = Some(text.into());
        self
    }
}

/// Everything extracted for one organization in one acquisition run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OrganizationLinks {
    pub slug: Option<String>,
    pub name: Option<String>,
    pub primary_domain: Option<String>,
    pub links: Vec<RawLink>,
}

impl OrganizationLinks {
    fn label(&self) -> String {
        self.slug
            .clone()
            .or_else(|| self.primary_domain.clone())
            .unwrap_or_else(|| "<unnamed>".to_string())
    }
}

// ── Output ──

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Skipped {
    pub url: String,
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Pruned {
    pub normalized_url: String,
    pub reason: NoiseReason,
}

/// The persisted record viewed by kind and by role.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CuratedModel {
    pub slug: String,
    pub name: String,
    pub primary_domain: String,
    pub by_kind: BTreeMap<SourceKind, Vec<String>>,
    /// Keyed by role name, or `unset` for unclassified-yet entries.
    pub by_role: BTreeMap<String, Vec<String>>,
    pub social_profiles: Vec<SocialProfile>,
    /// At most one listing per app store.
    pub store_links: Vec<StoreLink>,
}

impl CuratedModel {
    pub fn from_organization(org: &Organization) -> Self {
        let mut by_kind: BTreeMap<SourceKind, Vec<String>> = BTreeMap::new();
        let mut by_role: BTreeMap<String, Vec<String>> = BTreeMap::new();
        let mut official = Vec::new();
        let mut all = Vec::new();

        for ds in &org.data_sources {
            by_kind.entry(ds.kind).or_default().push(ds.normalized_url.clone());
            let key = ds.role.map_or("unset", |r| r.as_str());
            by_role.entry(key.to_string()).or_default().push(ds.normalized_url.clone());
            let Ok(url) = normalize::normalize(&ds.normalized_url) else {
                continue;
            };
            if ds.role == Some(Role::OfficialSocialProfile) {
                official.push(url.clone());
            }
            all.push(url);
        }

        CuratedModel {
            slug: org.slug.clone(),
            name: org.name.clone(),
            primary_domain: org.primary_domain.clone(),
            by_kind,
            by_role,
            social_profiles: platform::select_profiles(&org.slug, &official),
            store_links: app_store::select_store_links(&all),
        }
    }

    pub fn urls_with_role(&self, role: Role) -> &[String] {
        self.by_role.get(role.as_str()).map(Vec::as_slice).unwrap_or(&[])
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CurationReport {
    pub slug: String,
    pub created: bool,
    /// Distinct normalized URLs kept in this pass.
    pub retained: usize,
    /// Of those, how many were new to the stored record.
    pub added: usize,
    pub pruned: Vec<Pruned>,
    /// Stored data sources dropped because this pass pruned them.
    pub removed: usize,
    pub skipped_invalid: Vec<Skipped>,
    pub model: CuratedModel,
}

#[derive(Debug)]
pub struct BatchFailure {
    pub organization: String,
    pub error: CuratorError,
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub succeeded: Vec<CurationReport>,
    pub skipped_invalid: usize,
    pub failed: Vec<BatchFailure>,
}

impl BatchReport {
    pub fn merge(&mut self, other: BatchReport) {
        self.succeeded.extend(other.succeeded);
        self.skipped_invalid += other.skipped_invalid;
        self.failed.extend(other.failed);
    }
}

// ── Curator ──

/// Result of the pure stage: classified, deduplicated, screened.
struct Prepared {
    identity: Identity,
    retained: Vec<DataSource>,
    pruned: Vec<Pruned>,
    skipped: Vec<Skipped>,
}

pub struct Curator {
    applier: Arc<RoleApplier>,
    filter: DomainFilter,
}

impl Curator {
    pub fn new(applier: Arc<RoleApplier>, filter: DomainFilter) -> Self {
        Curator { applier, filter }
    }

    pub fn curate(&self, input: &OrganizationLinks) -> Result<CurationReport> {
        let prepared = self.prepare(input)?;
        self.persist(prepared)
    }

    /// Curate many organizations. Normalization, classification and
    /// screening run in parallel; writes go through the per-slug locks.
    /// One organization failing does not affect the others.
    pub fn curate_batch(&self, inputs: &[OrganizationLinks]) -> BatchReport {
        let prepared: Vec<(String, Result<Prepared>)> = inputs
            .par_iter()
            .map(|input| (input.label(), self.prepare(input)))
            .collect();

        let mut report = BatchReport::default();
        for (label, prepared) in prepared {
            match prepared.and_then(|p| self.persist(p)) {
                Ok(r) => {
                    report.skipped_invalid += r.skipped_invalid.len();
                    report.succeeded.push(r);
                }
                Err(e) => {
                    warn!(organization = %label, error = %e, "curation failed");
                    report.failed.push(BatchFailure {
                        organization: label,
                        error: e,
                    });
                }
            }
        }
        report
    }

    /// The curated view of an already persisted organization.
    pub fn model(&self, slug: &str) -> Result<CuratedModel> {
        let org = self
            .applier
            .store()
            .load(slug)?
            .ok_or_else(|| CuratorError::OrganizationNotFound {
                slug: slug.to_string(),
            })?;
        Ok(CuratedModel::from_organization(&org.value))
    }

    fn resolve_identity(&self, input: &OrganizationLinks) -> Result<Identity> {
        let first_valid = input
            .links
            .iter()
            .map(|l| l.url.as_str())
            .find(|u| normalize::normalize(u).is_ok());
        let derived = Identity::derive(
            input.slug.as_deref(),
            input.name.as_deref(),
            input.primary_domain.as_deref(),
            first_valid,
        );

        let slug = match (&derived, input.slug.as_deref()) {
            (Some(id), _) => id.slug.clone(),
            (None, Some(s)) => s.to_string(),
            (None, None) => {
                return Err(CuratorError::invalid_url(
                    input.label(),
                    "no primary domain and no usable link",
                ))
            }
        };

        // A stored record keeps its identity.
        if let Some(stored) = self.applier.store().load(&slug)? {
            let org = stored.value;
            return Ok(Identity {
                slug: org.slug,
                name: org.name,
                primary_domain: org.primary_domain,
            });
        }
        derived.ok_or_else(|| CuratorError::invalid_url(slug, "no primary domain and no usable link"))
    }

    fn prepare(&self, input: &OrganizationLinks) -> Result<Prepared> {
        let identity = self.resolve_identity(input)?;
        let ctx = OrgContext::new(&identity.primary_domain);
        let normalizer = self.applier.registry().normalizer();
        let base = normalizer.normalize(&identity.primary_domain).ok();

        let mut urls: Vec<NormalizedUrl> = Vec::new();
        let mut sources: Vec<DataSource> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut skipped = Vec::new();

        for link in &input.links {
            let url = match normalizer.normalize_with_base(&link.url, base.as_ref()) {
                Ok(u) => u,
                Err(e) => {
                    debug!(slug = %identity.slug, url = %link.url, error = %e, "skipping link");
                    skipped.push(Skipped {
                        url: link.url.clone(),
                        reason: e.to_string(),
                    });
                    continue;
                }
            };
            let text: Vec<String> = link
                .text
                .as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
                .into_iter()
                .collect();

            match index.get(url.as_str()) {
                Some(&i) => sources[i].merge_texts(&text),
                None => {
                    let mut ds = DataSource::new(link.url.clone(), &url, link.kind);
                    ds.merge_texts(&text);
                    index.insert(url.as_str().to_string(), sources.len());
                    sources.push(ds);
                    urls.push(url);
                }
            }
        }

        let verdicts = self.filter.screen(&urls, &ctx);
        let now = Utc::now();
        let mut retained = Vec::new();
        let mut pruned = Vec::new();
        for ((url, mut ds), verdict) in urls.iter().zip(sources).zip(verdicts) {
            match verdict {
                Verdict::Retain => {
                    ds.assign_role(self.applier.registry().classify(url, &ctx), now);
                    retained.push(ds);
                }
                Verdict::Prune(reason) => pruned.push(Pruned {
                    normalized_url: ds.normalized_url,
                    reason,
                }),
            }
        }

        Ok(Prepared {
            identity,
            retained,
            pruned,
            skipped,
        })
    }

    fn persist(&self, prepared: Prepared) -> Result<CurationReport> {
        let Prepared {
            identity,
            retained,
            pruned,
            skipped,
        } = prepared;
        let slug = identity.slug.clone();

        let created = match self.applier.store().create(&Organization::new(identity)) {
            Ok(_) => true,
            Err(CuratorError::PersistenceConflict { .. }) => false,
            Err(e) => return Err(e),
        };

        let (added, removed, model) = self.applier.mutate(&slug, |org| {
            let before = org.clone();
            let added = retained.iter().filter(|ds| org.upsert((*ds).clone())).count();
            let removed = pruned.iter().filter(|p| org.remove(&p.normalized_url)).count();
            let dirty = *org != before;
            ((added, removed, CuratedModel::from_organization(org)), dirty)
        })?;

        info!(
            slug = %slug,
            created,
            retained = retained.len(),
            added,
            pruned = pruned.len(),
            removed,
            skipped = skipped.len(),
            "curated organization"
        );

        Ok(CurationReport {
            slug,
            created,
            retained: retained.len(),
            added,
            pruned,
            removed,
            skipped_invalid: skipped,
            model,
        })
    }
}

// ── Tests ──
