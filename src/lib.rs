//! Role classification and curation of the links discovered for an organization.
//!
//! Links are normalized ([`normalize`]), given a semantic role by an ordered
//! rule registry ([`classifier`]), screened for noise and folded into one
//! persisted document per organization ([`curate`]). [`applier`] re-runs,
//! queries and clears roles on what has been persisted.

pub mod app_store;
pub mod applier;
pub mod classifier;
pub mod curate;
pub mod domains;
pub mod error;
pub mod model;
pub mod normalize;
pub mod platform;
pub mod settings;
pub mod store;

pub use applier::{ClassificationOutcome, RoleApplier, RoleCounts};
pub use classifier::{OrgContext, RoleRegistry, RuleUnit};
pub use curate::{BatchReport, CuratedModel, Curator, OrganizationLinks, RawLink};
pub use error::{CuratorError, Result};
pub use model::{DataSource, Organization, Role, SourceKind};
pub use normalize::{NormalizedUrl, Normalizer};
pub use settings::Settings;
pub use store::{OrganizationStore, SqliteStore};
