//! Migration Manager - file system operations for migrations
//!
//! Handles creating, loading, and parsing `.cql` migration files.

use chrono::{DateTime, NaiveDateTime, Utc};
use std::fs;
use std::path::Path;

use super::definitions::{Migration, MigrationConfig};
use crate::error::{DriverError, DriverResult};

/// Extension of migration files
pub const MIGRATION_EXTENSION: &str = "cql";

/// Migration manager for creating and loading migrations
#[derive(Debug, Clone, Default)]
pub struct MigrationManager {
    config: MigrationConfig,
}

impl MigrationManager {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: MigrationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    /// Create a new migration file and return its file name
    pub fn create_migration(&self, description: &str) -> DriverResult<String> {
        self.create_migration_at(description, Utc::now())
    }

    pub fn create_migration_at(&self, description: &str, now: DateTime<Utc>) -> DriverResult<String> {
        let slug = slugify(description);
        if slug.is_empty() {
            return Err(DriverError::Migration(format!(
                "'{}' is not a usable migration name",
                description
            )));
        }

        fs::create_dir_all(&self.config.migrations_dir).map_err(|e| {
            DriverError::Migration(format!("Failed to create migrations directory: {}", e))
        })?;

        let name = format!("{}-{}", now.format("%Y%m%d%H%M%S"), slug);
        let filename = format!("{}.{}", name, MIGRATION_EXTENSION);
        let template = format!(
            "-- Migration: {}\n\
             -- Created: {}\n\n\
             -- Up migration\n\n\n\
             -- Down migration\n\n",
            description,
            now.format("%Y-%m-%d %H:%M:%S UTC")
        );

        fs::write(self.config.migrations_dir.join(&filename), template).map_err(|e| {
            DriverError::Migration(format!("Failed to write migration file: {}", e))
        })?;

        Ok(filename)
    }

    /// Load all migration files, sorted by name
    pub fn load_migrations(&self) -> DriverResult<Vec<Migration>> {
        if !self.config.migrations_dir.exists() {
            return Ok(Vec::new());
        }

        let entries = fs::read_dir(&self.config.migrations_dir).map_err(|e| {
            DriverError::Migration(format!("Failed to read migrations directory: {}", e))
        })?;

        let mut migrations = Vec::new();
        for entry in entries {
            let path = entry
                .map_err(|e| DriverError::Migration(format!("Failed to read directory entry: {}", e)))?
                .path();
            if path.extension().map_or(false, |ext| ext == MIGRATION_EXTENSION) {
                migrations.push(self.parse_migration_file(&path)?);
            }
        }

        migrations.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(migrations)
    }

    fn parse_migration_file(&self, path: &Path) -> DriverResult<Migration> {
        let content = fs::read_to_string(path)?;
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .ok_or_else(|| DriverError::Migration(format!("Invalid migration filename: {}", path.display())))?;

        let (timestamp, description) = split_name(name).ok_or_else(|| {
            DriverError::Migration(format!(
                "Migration filename must follow format: <timestamp>-<name>, got '{}'",
                name
            ))
        })?;
        let (up_cql, down_cql) = parse_migration_content(&content);

        Ok(Migration {
            name: name.to_string(),
            description: description.replace(['-', '_'], " "),
            up_cql,
            down_cql,
            created_at: parse_timestamp_prefix(timestamp),
        })
    }
}

/// Split `<digits><sep><rest>` into its timestamp and description
fn split_name(name: &str) -> Option<(&str, &str)> {
    let digits = name.chars().take_while(|c| c.is_ascii_digit()).count();
    if digits == 0 {
        return None;
    }
    let (timestamp, rest) = name.split_at(digits);
    let description = rest.strip_prefix('-').or_else(|| rest.strip_prefix('_'))?;
    if description.is_empty() {
        return None;
    }
    Some((timestamp, description))
}

fn parse_timestamp_prefix(timestamp: &str) -> Option<DateTime<Utc>> {
    let padded = match timestamp.len() {
        14 => timestamp.to_string(),
        8 => format!("{}000000", timestamp),
        _ => return None,
    };
    NaiveDateTime::parse_from_str(&padded, "%Y%m%d%H%M%S")
        .ok()
        .map(|naive| naive.and_utc())
}

fn slugify(description: &str) -> String {
    description
        .trim()
        .to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Extract the up and down sections; comment lines are dropped.
///
/// A section starts at a comment holding only its marker, `-- Up migration`
/// or the short `-- up` (likewise for down).
fn parse_migration_content(content: &str) -> (String, Option<String>) {
    let mut up = Vec::new();
    let mut down = Vec::new();
    let mut section = "";
    let mut has_down = false;

    for line in content.lines() {
        let trimmed = line.trim();
        let lowered = trimmed.to_lowercase();

        if lowered.starts_with("--") {
            let marker = lowered
                .trim_start_matches('-')
                .trim()
                .trim_end_matches(':')
                .split_whitespace()
                .collect::<Vec<_>>()
                .join(" ");
            match marker.as_str() {
                "up" | "up migration" => section = "up",
                "down" | "down migration" => {
                    section = "down";
                    has_down = true;
                }
                _ => {}
            }
            continue;
        }
        if trimmed.is_empty() {
            continue;
        }

        match section {
            "up" => up.push(line),
            "down" => down.push(line),
            _ => {}
        }
    }

    let down = has_down.then(|| down.join("\n").trim().to_string());
    (up.join("\n").trim().to_string(), down)
}

/// Split a CQL script on `;` outside string literals
pub fn split_statements(cql: &str) -> Vec<String> {
    let mut statements = Vec::new();
    let mut current = String::new();
    let mut in_quotes = false;

    for ch in cql.chars() {
        match ch {
            '\'' => {
                in_quotes = !in_quotes;
                current.push(ch);
            }
            ';' if !in_quotes => {
                if !current.trim().is_empty() {
                    statements.push(current.trim().to_string());
                }
                current.clear();
            }
            _ => current.push(ch),
        }
    }
    if !current.trim().is_empty() {
        statements.push(current.trim().to_string());
    }
    statements
}
