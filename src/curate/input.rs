//! JSON Lines batch input.
//!
//! One `{"slug", "primaryDomain"?, "name"?, "url", "kind"?, "text"?}` object
//! per line. Lines are grouped into one [`OrganizationLinks`] per slug, in the
//! order slugs are first seen.

use std::collections::HashMap;
use std::io::BufRead;

use serde::Deserialize;
use tracing::warn;

use crate::error::Result;
use crate::model::SourceKind;

use super::curator::{OrganizationLinks, RawLink};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkRecord {
    slug: String,
    #[serde(default)]
    primary_domain: Option<String>,
    #[serde(default)]
    name: Option<String>,
    url: String,
    #[serde(default)]
    kind: SourceKind,
    #[serde(default)]
    text: Option<String>,
}

/// A line that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineError {
    pub line: usize,
    pub error: String,
}

pub struct ParsedBatch {
    pub organizations: Vec<OrganizationLinks>,
    pub bad_lines: Vec<LineError>,
}

/// Read a whole batch. Lines that are not UTF-8 or not a valid record are
/// collected in `bad_lines`; only a failing reader aborts.
pub fn read_jsonl(mut reader: impl BufRead) -> Result<ParsedBatch> {
    let mut organizations: Vec<OrganizationLinks> = Vec::new();
    let mut by_slug: HashMap<String, usize> = HashMap::new();
    let mut bad_lines = Vec::new();
    let mut buf = Vec::new();
    let mut line_no = 0;

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        line_no += 1;

        let parsed = std::str::from_utf8(&buf)
            .map_err(|e| e.to_string())
            .map(str::trim)
            .and_then(|line| {
                if line.is_empty() || line.starts_with("//") {
                    Ok(None)
                } else {
                    serde_json::from_str::<LinkRecord>(line)
                        .map(Some)
                        .map_err(|e| e.to_string())
                }
            });
        let rec = match parsed {
            Ok(Some(r)) => r,
            Ok(None) => continue,
            Err(error) => {
                warn!(line = line_no, error = %error, "unreadable batch line");
                bad_lines.push(LineError {
                    line: line_no,
                    error,
                });
                continue;
            }
        };

        let idx = *by_slug.entry(rec.slug.clone()).or_insert_with(|| {
            organizations.push(OrganizationLinks {
                slug: Some(rec.slug.clone()),
                ..Default::default()
            });
            organizations.len() - 1
        });
        let org = &mut organizations[idx];
        // First non-empty value wins.
        if org.primary_domain.is_none() {
            org.primary_domain = rec.primary_domain.filter(|d| !d.trim().is_empty());
        }
        if org.name.is_none() {
            org.name = rec.name.filter(|n| !n.trim().is_empty());
        }
        org.links.push(RawLink {
            url: rec.url,
            kind: rec.kind,
            text: rec.text,
        });
    }

    Ok(ParsedBatch {
        organizations,
        bad_lines,
    })
}

// ── Tests ──
