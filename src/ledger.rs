//! Durable seen-announcement ledger backed by SQLite.
//!
//! One scope per batch id. The stored set only ever grows; losing it risks a
//! duplicate notification, never a missed one, so reads degrade to an empty
//! set instead of failing the caller.
use anyhow::Result;
use sqlx::SqlitePool;
use std::collections::HashSet;
use tracing::warn;

use crate::model::Announcement;

pub type Pool = SqlitePool;

pub async fn init_pool(database_url: &str) -> Result<Pool> {
    let normalized = prepare_sqlite_url(database_url);
    let pool = SqlitePool::connect(&normalized).await?;
    // WAL keeps a crash mid-commit from touching previously committed state.
    sqlx::query("PRAGMA journal_mode=WAL;").execute(&pool).await?;
    sqlx::query("PRAGMA synchronous=FULL;").execute(&pool).await?;
    Ok(pool)
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the
/// parent directory exists. Leaves in-memory URLs untouched.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || url.starts_with("sqlite::memory") {
        return url.to_string();
    }

    let rest = url["sqlite:".len()..].trim_start_matches("//");
    let (path_part, query_part) = match rest.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (rest, None),
    };
    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded = match path_part.strip_prefix("~/") {
        Some(tail) => match std::env::var("HOME") {
            Ok(home) => format!("{}/{}", home.trim_end_matches('/'), tail),
            Err(_) => path_part.to_string(),
        },
        None => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = format!("sqlite://{}", expanded);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Read the persisted id set for a scope. Missing or unreadable storage
/// yields an empty set with a warning.
pub async fn load(pool: &Pool, scope: &str) -> HashSet<String> {
    let rows: Result<Vec<String>, sqlx::Error> =
        sqlx::query_scalar("SELECT announcement_id FROM seen_ids WHERE scope = ?")
            .bind(scope)
            .fetch_all(pool)
            .await;
    match rows {
        Ok(ids) => ids.into_iter().collect(),
        Err(err) => {
            warn!(?err, scope, "could not read seen-id ledger; treating as empty");
            HashSet::new()
        }
    }
}

/// Subsequence of `fetched` whose ids are not yet known, fetched order
/// preserved.
pub fn diff(fetched: &[Announcement], known: &HashSet<String>) -> Vec<Announcement> {
    fetched
        .iter()
        .filter(|ann| !known.contains(&ann.id))
        .cloned()
        .collect()
}

/// Record ids under a scope in one transaction. Existing rows are left
/// untouched, so the stored set grows monotonically.
pub async fn commit<'a, I>(pool: &Pool, scope: &str, ids: I) -> Result<()>
where
    I: IntoIterator<Item = &'a String>,
{
    let mut tx = pool.begin().await?;
    for id in ids {
        sqlx::query("INSERT OR IGNORE INTO seen_ids (scope, announcement_id) VALUES (?, ?)")
            .bind(scope)
            .bind(id)
            .execute(&mut *tx)
            .await?;
    }
    tx.commit().await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ann(id: &str) -> Announcement {
        Announcement {
            id: id.to_string(),
            text: String::new(),
            schedule_time: None,
            attachment: None,
        }
    }

    #[test]
    fn diff_of_empty_known_is_identity() {
        let fetched = vec![ann("a3"), ann("a1"), ann("a2")];
        let known = HashSet::new();
        let fresh = diff(&fetched, &known);
        assert_eq!(fresh, fetched);
    }

    #[test]
    fn diff_never_returns_known_ids() {
        let fetched = vec![ann("a1"), ann("a2"), ann("a3")];
        let known: HashSet<String> = ["a2".to_string()].into_iter().collect();
        let fresh = diff(&fetched, &known);
        assert_eq!(
            fresh.iter().map(|a| a.id.as_str()).collect::<Vec<_>>(),
            vec!["a1", "a3"]
        );
        assert!(fresh.iter().all(|a| !known.contains(&a.id)));
    }

    #[test]
    fn memory_urls_pass_through() {
        assert_eq!(prepare_sqlite_url("sqlite::memory:"), "sqlite::memory:");
        assert_eq!(
            prepare_sqlite_url("sqlite::memory:?cache=shared"),
            "sqlite::memory:?cache=shared"
        );
    }
}
