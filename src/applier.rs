//! Applies the role classifier to an organization's persisted data sources.
//!
//! Every mutation is a read-modify-replace of the whole organization document
//! under a per-slug lock. A revision mismatch on replace is retried once with
//! a fresh read before it is surfaced.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};

use chrono::Utc;
use tracing::{debug, info, warn};

use crate::classifier::{OrgContext, RoleRegistry};
use crate::error::{CuratorError, Result};
use crate::model::{DataSource, Organization, Role};
use crate::store::{OrganizationStore, Versioned};

/// One data source and the role the last pass gave it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Assignment {
    pub url: String,
    pub normalized_url: String,
    pub role: Role,
}

#[derive(Debug, Clone, Default)]
pub struct ClassificationOutcome {
    /// Data sources evaluated, filtered or not.
    pub processed: usize,
    /// Data sources whose stored role actually changed.
    pub changed: usize,
    pub assignments: Vec<Assignment>,
    pub counts: BTreeMap<Role, usize>,
    /// Stored keys that no longer normalize; their role was left as is.
    pub unreadable: Vec<String>,
}

impl ClassificationOutcome {
    pub fn role_of(&self, normalized_url: &str) -> Option<Role> {
        self.assignments
            .iter()
            .find(|a| a.normalized_url == normalized_url)
            .map(|a| a.role)
    }
}

/// Per-role counts for one organization.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoleCounts {
    pub by_role: BTreeMap<Role, usize>,
    pub unset: usize,
}

pub struct RoleApplier {
    store: Arc<dyn OrganizationStore>,
    registry: Arc<RoleRegistry>,
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RoleApplier {
    pub fn new(store: Arc<dyn OrganizationStore>, registry: Arc<RoleRegistry>) -> Self {
        RoleApplier {
            store,
            registry,
            locks: Mutex::new(HashMap::new()),
        }
    }

    pub fn registry(&self) -> &RoleRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Arc<dyn OrganizationStore> {
        &self.store
    }

    // ── Writes ──

    /// Classify every data source of `slug`. With `target_roles`, only entries
    /// whose new role is in the set are written and returned; the rest keep
    /// whatever they had.
    pub fn classify_company_datasources(
        &self,
        slug: &str,
        target_roles: Option<&[Role]>,
    ) -> Result<ClassificationOutcome> {
        let outcome = self.mutate(slug, |org| {
            let ctx = OrgContext::new(&org.primary_domain);
            let now = Utc::now();
            let mut outcome = ClassificationOutcome::default();

            for ds in org.data_sources.iter_mut() {
                outcome.processed += 1;
                let role = match self.classify_source(ds, &ctx) {
                    Ok(role) => role,
                    Err(e) => {
                        warn!(slug = %slug, url = %ds.normalized_url, error = %e, "stored url no longer normalizes");
                        outcome.unreadable.push(ds.normalized_url.clone());
                        continue;
                    }
                };
                if target_roles.is_some_and(|targets| !targets.contains(&role)) {
                    continue;
                }
                if ds.role != Some(role) {
                    ds.assign_role(role, now);
                    outcome.changed += 1;
                }
                *outcome.counts.entry(role).or_default() += 1;
                outcome.assignments.push(Assignment {
                    url: ds.url.clone(),
                    normalized_url: ds.normalized_url.clone(),
                    role,
                });
            }

            let dirty = outcome.changed > 0;
            (outcome, dirty)
        })?;

        info!(
            slug = %slug,
            processed = outcome.processed,
            returned = outcome.assignments.len(),
            changed = outcome.changed,
            unreadable = outcome.unreadable.len(),
            "classified data sources"
        );
        Ok(outcome)
    }

    pub fn classify_single_datasource(&self, slug: &str, url: &str) -> Result<Role> {
        let key = self.registry.normalizer().normalize(url)?;
        let role = self.mutate(slug, |org| {
            let ctx = OrgContext::new(&org.primary_domain);
            let Some(ds) = org.find_mut(key.as_str()) else {
                return (Err(not_found(slug, url)), false);
            };
            let role = match self.classify_source(ds, &ctx) {
                Ok(role) => role,
                Err(e) => return (Err(e), false),
            };
            let dirty = ds.role != Some(role);
            if dirty {
                ds.assign_role(role, Utc::now());
            }
            (Ok(role), dirty)
        })??;
        debug!(slug = %slug, url = %key, role = %role, "classified data source");
        Ok(role)
    }

    /// Unset every role, or with `target_roles` only the roles in that set.
    /// Running it twice is the same as running it once.
    pub fn clear_all_company_roles(&self, slug: &str, target_roles: Option<&[Role]>) -> Result<usize> {
        let cleared = self.mutate(slug, |org| {
            let cleared = org
                .data_sources
                .iter_mut()
                .filter(|ds| match (target_roles, ds.role) {
                    (None, _) => true,
                    (Some(targets), Some(role)) => targets.contains(&role),
                    (Some(_), None) => false,
                })
                .map(DataSource::clear_role)
                .filter(|had| *had)
                .count();
            (cleared, cleared > 0)
        })?;
        info!(slug = %slug, cleared, "cleared roles");
        Ok(cleared)
    }

    pub fn clear_single_datasource_role(&self, slug: &str, url: &str) -> Result<bool> {
        let key = self.registry.normalizer().normalize(url)?;
        self.mutate(slug, |org| match org.find_mut(key.as_str()) {
            Some(ds) => {
                let had = ds.clear_role();
                (Ok(had), had)
            }
            None => (Err(not_found(slug, url)), false),
        })?
    }

    // ── Reads ──

    /// Data sources currently holding `role`, in stored order. Empty when
    /// nothing matches, including after a clear.
    pub fn get_datasources_by_role(&self, slug: &str, role: Role) -> Result<Vec<DataSource>> {
        let org = self.load(slug)?.value;
        Ok(org
            .data_sources
            .into_iter()
            .filter(|ds| ds.role == Some(role))
            .collect())
    }

    pub fn list_datasources(&self, slug: &str) -> Result<Vec<DataSource>> {
        Ok(self.load(slug)?.value.data_sources)
    }

    pub fn role_counts(&self, slug: &str) -> Result<RoleCounts> {
        let org = self.load(slug)?.value;
        let mut counts = RoleCounts::default();
        for ds in &org.data_sources {
            match ds.role {
                Some(role) => *counts.by_role.entry(role).or_default() += 1,
                None => counts.unset += 1,
            }
        }
        Ok(counts)
    }

    // ── Internals ──

    fn classify_source(&self, ds: &DataSource, ctx: &OrgContext) -> Result<Role> {
        // Stored keys were normalized on the way in; re-normalizing picks up
        // tracking-param changes from configuration.
        let url = self.registry.normalizer().normalize(&ds.normalized_url)?;
        Ok(self.registry.classify(&url, ctx))
    }

    fn load(&self, slug: &str) -> Result<Versioned<Organization>> {
        self.store
            .load(slug)?
            .ok_or_else(|| CuratorError::OrganizationNotFound {
                slug: slug.to_string(),
            })
    }

    fn slug_lock(&self, slug: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        Arc::clone(locks.entry(slug.to_string()).or_default())
    }

    /// Drop the map entry once no other caller holds or waits on it.
    fn release_lock(&self, slug: &str, lock: Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(|e| e.into_inner());
        // One reference in the map, one here.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(slug);
        }
    }

    /// Run `f` against a fresh copy of the organization and replace the stored
    /// document when `f` reports a change. `f` may run twice if another writer
    /// got in between.
    pub(crate) fn mutate<T>(
        &self,
        slug: &str,
        mut f: impl FnMut(&mut Organization) -> (T, bool),
    ) -> Result<T> {
        let lock = self.slug_lock(slug);
        let result = {
            let _guard = lock.lock().unwrap_or_else(|e| e.into_inner());
            self.mutate_locked(slug, &mut f)
        };
        self.release_lock(slug, lock);
        result
    }

    fn mutate_locked<T>(
        &self,
        slug: &str,
        f: &mut impl FnMut(&mut Organization) -> (T, bool),
    ) -> Result<T> {
        let mut retried = false;
        loop {
            let Versioned {
                value: mut org,
                revision,
            } = self.load(slug)?;
            let (out, dirty) = f(&mut org);
            if !dirty {
                return Ok(out);
            }
            match self.store.replace(&org, revision) {
                Ok(_) => return Ok(out),
                Err(CuratorError::PersistenceConflict { .. }) if !retried => {
                    warn!(slug = %slug, revision, "revision moved underneath us, retrying");
                    retried = true;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn not_found(slug: &str, url: &str) -> CuratorError {
    CuratorError::DataSourceNotFound {
        slug: slug.to_string(),
        url: url.to_string(),
    }
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domains::DomainLists;
    use crate::model::{Identity, SourceKind};
    use crate::normalize::normalize;
    use crate::store::SqliteStore;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const LINKS: &[&str] = &[
        "https://www.companyx.com/about",
        "https://facebook.com/CompanyX",
        "https://random-blog.net/review-companyx",
        "https://novel-domain.io/page",
        "https://www.reuters.com/markets/companyx-deal",
    ];

    fn seeded_org() -> Organization {
        let id = Identity::derive(Some("companyx"), Some("Company X"), Some("companyx.com"), None).unwrap();
        let mut org = Organization::new(id);
        for raw in LINKS {
            org.upsert(DataSource::new(*raw, &normalize(raw).unwrap(), SourceKind::Main));
        }
        org
    }

    fn applier_with(store: Arc<dyn OrganizationStore>) -> RoleApplier {
        let registry = RoleRegistry::with_defaults(Arc::new(DomainLists::default()));
        RoleApplier::new(store, Arc::new(registry))
    }

    fn applier() -> RoleApplier {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create(&seeded_org()).unwrap();
        applier_with(Arc::new(store))
    }

    #[test]
    fn classifies_and_persists_everything() {
        let a = applier();
        let out = a.classify_company_datasources("companyx", None).unwrap();
        assert_eq!(out.processed, 5);
        assert_eq!(out.assignments.len(), 5);
        assert_eq!(out.role_of("https://companyx.com/about"), Some(Role::OfficialSite));
        assert_eq!(out.role_of("https://facebook.com/CompanyX"), Some(Role::OfficialSocialProfile));
        assert_eq!(out.role_of("https://random-blog.net/review-companyx"), Some(Role::ThirdParty));
        assert_eq!(out.role_of("https://novel-domain.io/page"), Some(Role::Unclassified));
        assert_eq!(out.counts.get(&Role::NewsSite), Some(&1));

        let stored = a.list_datasources("companyx").unwrap();
        assert!(stored.iter().all(|ds| ds.role.is_some() && ds.classified_at.is_some()));
    }

    #[test]
    fn bulk_classification_is_idempotent() {
        let a = applier();
        a.classify_company_datasources("companyx", None).unwrap();
        let first = a.list_datasources("companyx").unwrap();
        let again = a.classify_company_datasources("companyx", None).unwrap();
        assert_eq!(again.changed, 0);
        assert_eq!(a.list_datasources("companyx").unwrap(), first);
    }

    #[test]
    fn target_roles_filter_output_and_writes() {
        let a = applier();
        let out = a
            .classify_company_datasources("companyx", Some(&[Role::OfficialSite, Role::NewsSite]))
            .unwrap();
        assert_eq!(out.processed, 5);
        let roles: Vec<Role> = out.assignments.iter().map(|x| x.role).collect();
        assert_eq!(roles, vec![Role::OfficialSite, Role::NewsSite]);

        let counts = a.role_counts("companyx").unwrap();
        assert_eq!(counts.unset, 3);
        assert_eq!(counts.by_role.get(&Role::OfficialSite), Some(&1));
    }

    #[test]
    fn single_classify_and_missing_url() {
        let a = applier();
        let role = a
            .classify_single_datasource("companyx", "http://companyx.com/about/?utm_source=x")
            .unwrap();
        assert_eq!(role, Role::OfficialSite);
        assert_eq!(a.role_counts("companyx").unwrap().unset, 4);

        let err = a.classify_single_datasource("companyx", "https://nowhere.example").unwrap_err();
        assert!(matches!(err, CuratorError::DataSourceNotFound { .. }));
        let err = a.classify_single_datasource("ghost", "https://companyx.com").unwrap_err();
        assert!(matches!(err, CuratorError::OrganizationNotFound { .. }));
    }

    #[test]
    fn clear_single_leaves_siblings_alone() {
        let a = applier();
        a.classify_company_datasources("companyx", None).unwrap();
        let before = a.list_datasources("companyx").unwrap();

        assert!(a.clear_single_datasource_role("companyx", "https://facebook.com/CompanyX").unwrap());
        let after = a.list_datasources("companyx").unwrap();
        for (b, x) in before.iter().zip(&after) {
            if x.normalized_url == "https://facebook.com/CompanyX" {
                assert!(x.role.is_none() && x.classified_at.is_none());
            } else {
                assert_eq!(b, x);
            }
        }

        let err = a.clear_single_datasource_role("companyx", "https://absent.example").unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn clear_all_is_idempotent_and_empties_role_queries() {
        let a = applier();
        a.classify_company_datasources("companyx", None).unwrap();
        assert_eq!(a.get_datasources_by_role("companyx", Role::NewsSite).unwrap().len(), 1);

        assert_eq!(a.clear_all_company_roles("companyx", None).unwrap(), 5);
        assert_eq!(a.clear_all_company_roles("companyx", None).unwrap(), 0);
        assert!(a.get_datasources_by_role("companyx", Role::NewsSite).unwrap().is_empty());
        assert!(a.get_datasources_by_role("companyx", Role::Unclassified).unwrap().is_empty());
        assert_eq!(a.role_counts("companyx").unwrap().unset, 5);
    }

    #[test]
    fn unknown_slug_is_not_found() {
        let a = applier();
        assert!(a.get_datasources_by_role("ghost", Role::NewsSite).unwrap_err().is_not_found());
        assert!(a.clear_all_company_roles("ghost", None).unwrap_err().is_not_found());
        assert!(a.locks.lock().unwrap().is_empty());
    }

    #[test]
    fn clear_with_targets_keeps_other_roles_and_timestamps() {
        let a = applier();
        a.classify_company_datasources("companyx", None).unwrap();
        let before = a.list_datasources("companyx").unwrap();

        let n = a
            .clear_all_company_roles("companyx", Some(&[Role::NewsSite, Role::ThirdParty]))
            .unwrap();
        assert_eq!(n, 2);
        let after = a.list_datasources("companyx").unwrap();
        for (b, x) in before.iter().zip(&after) {
            if matches!(b.role, Some(Role::NewsSite | Role::ThirdParty)) {
                assert!(x.role.is_none() && x.classified_at.is_none());
            } else {
                assert_eq!(b, x);
            }
        }
        assert_eq!(a.clear_all_company_roles("companyx", Some(&[Role::NewsSite])).unwrap(), 0);
    }

    #[test]
    fn stacked_www_still_addresses_the_stored_entry() {
        let a = applier();
        let role = a
            .classify_single_datasource("companyx", "http://www.www.companyx.com/about/")
            .unwrap();
        assert_eq!(role, Role::OfficialSite);
        assert!(a.clear_single_datasource_role("companyx", "https://www.www.companyx.com/about").unwrap());
    }

    #[test]
    fn operations_stay_inside_their_organization() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create(&seeded_org()).unwrap();
        let id = Identity::derive(Some("acme"), None, Some("acme.io"), None).unwrap();
        let mut other = Organization::new(id);
        for raw in ["https://acme.io", "https://facebook.com/CompanyX", "https://www.reuters.com/markets/companyx-deal"] {
            other.upsert(DataSource::new(raw, &normalize(raw).unwrap(), SourceKind::Main));
        }
        store.create(&other).unwrap();
        let store: Arc<dyn OrganizationStore> = Arc::new(store);
        let a = applier_with(Arc::clone(&store));
        let untouched = store.load("acme").unwrap().unwrap();

        a.classify_company_datasources("companyx", None).unwrap();
        a.classify_single_datasource("companyx", "https://facebook.com/CompanyX").unwrap();
        a.clear_single_datasource_role("companyx", "https://facebook.com/CompanyX").unwrap();
        a.clear_all_company_roles("companyx", None).unwrap();

        let after = store.load("acme").unwrap().unwrap();
        assert_eq!(after.value, untouched.value);
        assert_eq!(after.revision, untouched.revision);
        assert!(after.value.data_sources.iter().all(|ds| ds.role.is_none()));
    }

    #[test]
    fn unreadable_stored_key_keeps_its_role() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut org = seeded_org();
        let stamp = Utc::now();
        org.data_sources.push(DataSource {
            url: "mailto:press@companyx.com".into(),
            normalized_url: "mailto:press@companyx.com".into(),
            role: Some(Role::Documents),
            kind: SourceKind::Footer,
            texts: Vec::new(),
            classified_at: Some(stamp),
        });
        store.create(&org).unwrap();
        let a = applier_with(Arc::new(store));

        let out = a.classify_company_datasources("companyx", None).unwrap();
        assert_eq!(out.processed, 6);
        assert_eq!(out.assignments.len(), 5);
        assert_eq!(out.unreadable, vec!["mailto:press@companyx.com".to_string()]);
        assert_eq!(out.role_of("mailto:press@companyx.com"), None);

        let stored = a.list_datasources("companyx").unwrap();
        let kept = stored.iter().find(|ds| ds.url.starts_with("mailto:")).unwrap();
        assert_eq!(kept.role, Some(Role::Documents));
        assert_eq!(kept.classified_at, Some(stamp));
    }

    /// Fails the first `conflicts` replaces with a conflict, after bumping the
    /// stored revision the way a competing writer would.
    struct Contended {
        inner: SqliteStore,
        conflicts: AtomicUsize,
    }

    impl OrganizationStore for Contended {
        fn load(&self, slug: &str) -> Result<Option<Versioned<Organization>>> {
            self.inner.load(slug)
        }
        fn create(&self, org: &Organization) -> Result<i64> {
            self.inner.create(org)
        }
        fn replace(&self, org: &Organization, expected: i64) -> Result<i64> {
            if self.conflicts.load(Ordering::SeqCst) > 0 {
                self.conflicts.fetch_sub(1, Ordering::SeqCst);
                let current = self.inner.load(&org.slug)?.unwrap();
                self.inner.replace(&current.value, current.revision)?;
                return Err(CuratorError::PersistenceConflict {
                    slug: org.slug.clone(),
                    expected,
                });
            }
            self.inner.replace(org, expected)
        }
        fn slugs(&self) -> Result<Vec<String>> {
            self.inner.slugs()
        }
    }

    fn contended(conflicts: usize) -> RoleApplier {
        let inner = SqliteStore::open_in_memory().unwrap();
        inner.create(&seeded_org()).unwrap();
        applier_with(Arc::new(Contended {
            inner,
            conflicts: AtomicUsize::new(conflicts),
        }))
    }

    #[test]
    fn one_conflict_is_retried() {
        let a = contended(1);
        let out = a.classify_company_datasources("companyx", None).unwrap();
        assert_eq!(out.assignments.len(), 5);
        assert_eq!(a.role_counts("companyx").unwrap().unset, 0);
    }

    #[test]
    fn second_conflict_surfaces() {
        let a = contended(2);
        let err = a.classify_company_datasources("companyx", None).unwrap_err();
        assert!(matches!(err, CuratorError::PersistenceConflict { .. }));
        assert_eq!(a.role_counts("companyx").unwrap().unset, 5);
    }

    #[test]
    fn parallel_writers_on_one_org_serialize() {
        let a = Arc::new(applier());
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let a = Arc::clone(&a);
                std::thread::spawn(move || {
                    if i % 2 == 0 {
                        a.classify_company_datasources("companyx", None).map(|_| ())
                    } else {
                        a.clear_all_company_roles("companyx", None).map(|_| ())
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap().unwrap();
        }
        let stored = a.list_datasources("companyx").unwrap();
        assert!(stored.iter().all(|ds| ds.role.is_some() == ds.classified_at.is_some()));
        assert!(a.locks.lock().unwrap().is_empty());
    }
}
