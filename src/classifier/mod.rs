//! Ordered rule registry and the role classifier built on it.
//!
//! A [`RuleUnit`] pairs a predicate with the role it assigns and an explicit
//! priority rank. [`RoleRegistry::classify`] walks the units in ascending rank
//! (ties keep registration order) and returns the first match, falling back to
//! [`Role::Unclassified`]. Predicates are independent of each other, so a new
//! rule is added by registering another unit; nothing existing changes.

pub mod rules;

use std::fmt;
use std::sync::Arc;

use crate::domains::DomainLists;
use crate::error::Result;
use crate::model::Role;
use crate::normalize::{self, registrable_domain, NormalizedUrl, Normalizer};

pub use rules::default_rank;

pub type Predicate = dyn Fn(&NormalizedUrl, &OrgContext) -> bool + Send + Sync;

/// One classification rule.
#[derive(Clone)]
pub struct RuleUnit {
    name: String,
    role: Role,
    priority: u32,
    predicate: Arc<Predicate>,
}

impl RuleUnit {
    pub fn new<F>(name: impl Into<String>, role: Role, priority: u32, predicate: F) -> Self
    where
        F: Fn(&NormalizedUrl, &OrgContext) -> bool + Send + Sync + 'static,
    {
        RuleUnit {
            name: name.into(),
            role,
            priority,
            predicate: Arc::new(predicate),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn priority(&self) -> u32 {
        self.priority
    }

    pub fn matches(&self, url: &NormalizedUrl, ctx: &OrgContext) -> bool {
        (self.predicate)(url, ctx)
    }
}

impl fmt::Debug for RuleUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RuleUnit")
            .field("name", &self.name)
            .field("role", &self.role)
            .field("priority", &self.priority)
            .finish()
    }
}

/// What the classifier knows about the organization that owns a URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrgContext {
    primary_domain: String,
    brand: Option<String>,
}

impl OrgContext {
    /// Accepts a bare domain or a URL; `www.` and paths are dropped.
    pub fn new(primary_domain: &str) -> Self {
        let host = normalize::normalize_host(primary_domain);
        let brand = registrable_domain(&host)
            .split('.')
            .next()
            .map(str::to_lowercase)
            .filter(|b| b.len() > 2);
        OrgContext {
            primary_domain: host,
            brand,
        }
    }

    pub fn primary_domain(&self) -> &str {
        &self.primary_domain
    }

    /// First label of the registrable domain, when long enough to be distinctive.
    pub fn brand(&self) -> Option<&str> {
        self.brand.as_deref()
    }

    pub fn owns(&self, url: &NormalizedUrl) -> bool {
        url.host_matches(&self.primary_domain)
    }

    pub fn brand_in_path(&self, url: &NormalizedUrl) -> bool {
        self.brand
            .as_deref()
            .is_some_and(|b| url.path().to_lowercase().contains(b))
    }

    pub fn mentions_brand(&self, url: &NormalizedUrl) -> bool {
        self.brand
            .as_deref()
            .is_some_and(|b| url.host_and_path().contains(b))
    }
}

#[derive(Debug, Clone, Default)]
pub struct RoleRegistry {
    rules: Vec<RuleUnit>,
    normalizer: Normalizer,
}

impl RoleRegistry {
    /// A registry with no rules: everything is `unclassified`.
    pub fn empty() -> Self {
        RoleRegistry::default()
    }

    pub fn with_defaults(lists: Arc<DomainLists>) -> Self {
        let mut registry = RoleRegistry::empty();
        for unit in rules::default_rules(lists) {
            registry.register(unit);
        }
        registry
    }

    pub fn with_normalizer(mut self, normalizer: Normalizer) -> Self {
        self.normalizer = normalizer;
        self
    }

    /// Add a unit after every existing unit of equal or lower rank.
    pub fn register(&mut self, unit: RuleUnit) {
        let idx = self.rules.partition_point(|r| r.priority <= unit.priority);
        self.rules.insert(idx, unit);
    }

    /// Units in evaluation order.
    pub fn rules(&self) -> &[RuleUnit] {
        &self.rules
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    /// The closed role enumeration in priority order.
    pub fn available_roles(&self) -> &'static [Role] {
        &Role::ALL
    }

    /// Total: every normalized URL gets exactly one role. A panicking
    /// predicate is a bug in that rule and is left to propagate.
    pub fn classify(&self, url: &NormalizedUrl, ctx: &OrgContext) -> Role {
        self.matching_rule(url, ctx)
            .map(RuleUnit::role)
            .unwrap_or(Role::Unclassified)
    }

    /// The first unit whose predicate holds, if any.
    pub fn matching_rule(&self, url: &NormalizedUrl, ctx: &OrgContext) -> Option<&RuleUnit> {
        self.rules.iter().find(|r| r.matches(url, ctx))
    }

    /// Normalize then classify.
    pub fn classify_raw(&self, raw: &str, ctx: &OrgContext) -> Result<Role> {
        let url = self.normalizer.normalize(raw)?;
        Ok(self.classify(&url, ctx))
    }
}

// ── Tests ──
