use scylla::client::session::Session;
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};

pub struct MigrationTool {
    keyspace: String,
    schema_path: PathBuf,
}

/// Numbered version directories under `schema_path`, ascending.
pub fn version_dirs(schema_path: &Path) -> Result<Vec<i32>> {
    let mut versions: Vec<i32> = fs::read_dir(schema_path)
        .map_err(|e| {
            AppError::Config(format!("Unable to read schema directory {}: {}", schema_path.display(), e))
        })?
        .filter_map(|entry| {
            let path = entry.ok()?.path();
            if !path.is_dir() {
                return None;
            }
            path.file_name()?.to_string_lossy().parse::<i32>().ok()
        })
        .collect();
    versions.sort_unstable();
    Ok(versions)
}

/// Splits a CQL script into statements. `--` comment lines are dropped and
/// `{}` is replaced by the keyspace.
pub fn cql_statements(contents: &str, keyspace: &str) -> Vec<String> {
    let without_comments: String = contents
        .lines()
        .filter(|line| !line.trim_start().starts_with("--"))
        .collect::<Vec<_>>()
        .join("\n");

    without_comments
        .split(';')
        .map(|s| s.trim().replace("{}", keyspace))
        .filter(|s| !s.is_empty())
        .collect()
}

impl MigrationTool {
    pub fn new(keyspace: String, schema_path: PathBuf) -> Self {
        tracing::debug!("Migration tool for keyspace {}", keyspace);
        Self {
            keyspace,
            schema_path,
        }
    }

    // The version table lives in the keyspace, so the keyspace has to exist first.
    async fn ensure_migration_table(&self, session: &Session) -> Result<()> {
        let create_keyspace = format!(
            "CREATE KEYSPACE IF NOT EXISTS {} WITH replication = {{'class': 'SimpleStrategy', 'replication_factor': 1}}",
            self.keyspace
        );
        session
            .query_unpaged(create_keyspace, ())
            .await
            .map_err(|e| AppError::Internal(format!("Unable to create keyspace {}: {}", self.keyspace, e)))?;

        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {}.schema_version (
                version int,
                applied_at timestamp,
                db int primary key
            )",
            self.keyspace
        );
        session
            .query_unpaged(create_table, ())
            .await
            .map_err(|e| AppError::Internal(format!("Unable to create schema_version table: {}", e)))?;

        Ok(())
    }

    async fn get_current_version(&self, session: &Session) -> Result<i32> {
        let select = format!("SELECT version FROM {}.schema_version LIMIT 1", self.keyspace);
        let rows = session.query_unpaged(select, ()).await?.into_rows_result()?;

        match rows.rows::<(i32,)>()?.next().transpose()? {
            Some((version,)) => Ok(version),
            None => Ok(0),
        }
    }

    async fn set_version(&self, session: &Session, version: i32) -> Result<()> {
        let cql = format!(
            "INSERT INTO {}.schema_version (version, applied_at, db) VALUES (?, toTimestamp(now()), 0)",
            self.keyspace
        );
        session
            .query_unpaged(cql, (version,))
            .await
            .map_err(|e| AppError::Internal(format!("Failed to record schema version {}: {}", version, e)))?;
        Ok(())
    }

    async fn execute_cql_file(&self, session: &Session, file_path: &Path) -> Result<()> {
        let contents = fs::read_to_string(file_path)
            .map_err(|e| AppError::Config(format!("Failed to read {}: {}", file_path.display(), e)))?;

        for stmt in cql_statements(&contents, &self.keyspace) {
            tracing::debug!("Applying CQL: {}", stmt);
            session
                .query_unpaged(stmt.clone(), ())
                .await
                .map_err(|e| AppError::Internal(format!("Error executing CQL `{}`: {}", stmt, e)))?;
        }
        Ok(())
    }

    /// Applies every version directory above the recorded version, up to
    /// `target_version`. A fresh database gets `init_schema.cql`; later
    /// versions get their `update_schema.cql`.
    pub async fn migrate_to_version(&self, session: &Session, target_version: i32) -> Result<()> {
        self.ensure_migration_table(session).await?;

        let mut current_version = self.get_current_version(session).await?;
        tracing::info!("Current schema version is {}", current_version);

        for v in version_dirs(&self.schema_path)? {
            if v <= current_version || v > target_version {
                continue;
            }
            let version_path = self.schema_path.join(v.to_string());
            let script = if current_version == 0 {
                version_path.join("init_schema.cql")
            } else {
                version_path.join("update_schema.cql")
            };

            if script.exists() {
                tracing::info!("Upgrading schema {} -> {} with {}", current_version, v, script.display());
                self.execute_cql_file(session, &script).await?;
            } else {
                tracing::warn!("No migration script for version {}; skipping", v);
            }

            self.set_version(session, v).await?;
            current_version = v;
        }

        if current_version < target_version {
            tracing::warn!(
                "Target schema version {} requested but only {} is available",
                target_version,
                current_version
            );
        } else {
            tracing::info!("Schema is at version {}", current_version);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_replace_keyspace_and_skip_comments() {
        let script = "-- tables; for admins\nCREATE TABLE {}.admin (id uuid PRIMARY KEY);\n\n  \nCREATE TABLE {}.gym (id uuid PRIMARY KEY);\n";
        let stmts = cql_statements(script, "flexfit");
        assert_eq!(
            stmts,
            vec![
                "CREATE TABLE flexfit.admin (id uuid PRIMARY KEY)".to_string(),
                "CREATE TABLE flexfit.gym (id uuid PRIMARY KEY)".to_string(),
            ]
        );
    }

    #[test]
    fn version_dirs_are_numeric_and_sorted() {
        let root = std::env::temp_dir().join(format!("flexfit-schema-{}", uuid::Uuid::new_v4()));
        for dir in ["10", "2", "notes", "1"] {
            fs::create_dir_all(root.join(dir)).unwrap();
        }
        fs::write(root.join("3"), "not a directory").unwrap();

        assert_eq!(version_dirs(&root).unwrap(), vec![1, 2, 10]);
        fs::remove_dir_all(&root).unwrap();
    }

    #[test]
    fn shipped_schema_has_an_initial_version() {
        let schema = Path::new(env!("CARGO_MANIFEST_DIR")).join("schema");
        let versions = version_dirs(&schema).unwrap();
        assert_eq!(versions.first(), Some(&1));
        let init = fs::read_to_string(schema.join("1").join("init_schema.cql")).unwrap();
        let stmts = cql_statements(&init, "flexfit");
        assert!(stmts.iter().any(|s| s.contains("flexfit.fee_based_cut")));
        assert!(stmts.iter().all(|s| !s.contains("{}")));
    }
}
