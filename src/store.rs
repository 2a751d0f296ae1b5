//! Organization documents in SQLite.
//!
//! Each organization is one row holding the whole JSON document plus a
//! revision counter. Writers replace the document only if the revision they
//! read is still current, so a classification pass lands all-or-nothing.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{CuratorError, Result};
use crate::model::Organization;

pub const DEFAULT_DB_PATH: &str = "data/curator.sqlite";

/// A stored value and the revision it was read at.
#[derive(Debug, Clone)]
pub struct Versioned<T> {
    pub value: T,
    pub revision: i64,
}

pub trait OrganizationStore: Send + Sync {
    fn load(&self, slug: &str) -> Result<Option<Versioned<Organization>>>;

    /// Insert a new organization at revision 1. Fails with
    /// `PersistenceConflict` if the slug already exists.
    fn create(&self, org: &Organization) -> Result<i64>;

    /// Replace the whole document if it is still at `expected_revision`.
    /// Returns the new revision.
    fn replace(&self, org: &Organization, expected_revision: i64) -> Result<i64>;

    fn slugs(&self) -> Result<Vec<String>>;
}

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA busy_timeout=5000;")?;
        Self::with_connection(conn)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self> {
        init_schema(&conn)?;
        Ok(SqliteStore {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        // A panic while holding the lock cannot leave a half-applied statement behind.
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    pub fn stats(&self) -> Result<Stats> {
        let conn = self.conn();
        let organizations: usize =
            conn.query_row("SELECT COUNT(*) FROM organizations", [], |r| r.get(0))?;
        let data_sources: usize = conn.query_row(
            "SELECT COALESCE(SUM(json_array_length(document, '$.dataSources')), 0) FROM organizations",
            [],
            |r| r.get(0),
        )?;

        let mut stmt = conn.prepare(
            "SELECT COALESCE(json_extract(ds.value, '$.role'), 'unset') AS role, COUNT(*)
             FROM organizations o, json_each(o.document, '$.dataSources') ds
             GROUP BY role
             ORDER BY role",
        )?;
        let by_role = stmt
            .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, usize>(1)?)))?
            .collect::<Result<BTreeMap<_, _>, _>>()?;

        Ok(Stats {
            organizations,
            data_sources,
            by_role,
        })
    }
}

fn init_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS organizations (
            slug           TEXT PRIMARY KEY,
            primary_domain TEXT NOT NULL,
            document       TEXT NOT NULL,
            revision       INTEGER NOT NULL DEFAULT 1,
            created_at     TEXT NOT NULL DEFAULT (datetime('now')),
            updated_at     TEXT NOT NULL DEFAULT (datetime('now'))
        );
        CREATE INDEX IF NOT EXISTS idx_org_domain ON organizations(primary_domain);
        ",
    )?;
    Ok(())
}

impl OrganizationStore for SqliteStore {
    fn load(&self, slug: &str) -> Result<Option<Versioned<Organization>>> {
        let conn = self.conn();
        let row: Option<(String, i64)> = conn
            .query_row(
                "SELECT document, revision FROM organizations WHERE slug = ?1",
                params![slug],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;
        match row {
            Some((doc, revision)) => Ok(Some(Versioned {
                value: serde_json::from_str(&doc)?,
                revision,
            })),
            None => Ok(None),
        }
    }

    fn create(&self, org: &Organization) -> Result<i64> {
        let doc = serde_json::to_string(org)?;
        let conn = self.conn();
        let inserted = conn.execute(
            "INSERT OR IGNORE INTO organizations (slug, primary_domain, document, revision)
             VALUES (?1, ?2, ?3, 1)",
            params![org.slug, org.primary_domain, doc],
        )?;
        if inserted == 0 {
            return Err(CuratorError::PersistenceConflict {
                slug: org.slug.clone(),
                expected: 0,
            });
        }
        Ok(1)
    }

    fn replace(&self, org: &Organization, expected_revision: i64) -> Result<i64> {
        let doc = serde_json::to_string(org)?;
        let conn = self.conn();
        let updated = conn.execute(
            "UPDATE organizations
             SET document = ?1, primary_domain = ?2, revision = revision + 1,
                 updated_at = datetime('now')
             WHERE slug = ?3 AND revision = ?4",
            params![doc, org.primary_domain, org.slug, expected_revision],
        )?;
        if updated == 1 {
            return Ok(expected_revision + 1);
        }

        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM organizations WHERE slug = ?1)",
            params![org.slug],
            |r| r.get(0),
        )?;
        if exists {
            Err(CuratorError::PersistenceConflict {
                slug: org.slug.clone(),
                expected: expected_revision,
            })
        } else {
            Err(CuratorError::OrganizationNotFound {
                slug: org.slug.clone(),
            })
        }
    }

    fn slugs(&self) -> Result<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare("SELECT slug FROM organizations ORDER BY slug")?;
        let rows = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(rows)
    }
}

// ── Stats ──

pub struct Stats {
    pub organizations: usize,
    pub data_sources: usize,
    /// Role name (or `unset`) to count.
    pub by_role: BTreeMap<String, usize>,
}

// ── Tests ──

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DataSource, Identity, Role, SourceKind};
    use crate::normalize::normalize;

    fn org(slug: &str) -> Organization {
        let mut org = Organization::new(Identity::derive(Some(slug), None, Some("companyx.com"), None).unwrap());
        for (raw, role) in [("https://companyx.com", Some(Role::OfficialSite)), ("https://bbc.com/a", None)] {
            let mut ds = DataSource::new(raw, &normalize(raw).unwrap(), SourceKind::Main);
            if let Some(r) = role {
                ds.assign_role(r, chrono::Utc::now());
            }
            org.upsert(ds);
        }
        org
    }

    #[test]
    fn create_then_load() {
        let store = SqliteStore::open_in_memory().unwrap();
        let o = org("companyx");
        assert_eq!(store.create(&o).unwrap(), 1);
        let loaded = store.load("companyx").unwrap().unwrap();
        assert_eq!(loaded.revision, 1);
        assert_eq!(loaded.value, o);
        assert!(store.load("missing").unwrap().is_none());
    }

    #[test]
    fn duplicate_create_conflicts() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create(&org("companyx")).unwrap();
        let err = store.create(&org("companyx")).unwrap_err();
        assert!(matches!(err, CuratorError::PersistenceConflict { .. }));
    }

    #[test]
    fn stale_revision_is_rejected() {
        let store = SqliteStore::open_in_memory().unwrap();
        let mut o = org("companyx");
        store.create(&o).unwrap();
        o.name = "Renamed".into();
        assert_eq!(store.replace(&o, 1).unwrap(), 2);
        let err = store.replace(&o, 1).unwrap_err();
        assert!(matches!(err, CuratorError::PersistenceConflict { expected: 1, .. }));
        assert_eq!(store.load("companyx").unwrap().unwrap().value.name, "Renamed");
    }

    #[test]
    fn replace_unknown_is_not_found() {
        let store = SqliteStore::open_in_memory().unwrap();
        let err = store.replace(&org("ghost"), 1).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn stats_count_roles() {
        let store = SqliteStore::open_in_memory().unwrap();
        store.create(&org("a")).unwrap();
        store.create(&org("b")).unwrap();
        let s = store.stats().unwrap();
        assert_eq!(s.organizations, 2);
        assert_eq!(s.data_sources, 4);
        assert_eq!(s.by_role.get("official_site"), Some(&2));
        assert_eq!(s.by_role.get("unset"), Some(&2));
        assert_eq!(store.slugs().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curator.sqlite");
        {
            let store = SqliteStore::open(&path).unwrap();
            store.create(&org("companyx")).unwrap();
        }
        let store = SqliteStore::open(&path).unwrap();
        assert_eq!(store.load("companyx").unwrap().unwrap().value.data_sources.len(), 2);
    }
}
