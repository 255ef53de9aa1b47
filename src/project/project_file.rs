//! Parser for JSON query project files
//!
//! ```json
//! {
//!   "dialect": "pg",
//!   "entities": [{ "name": "User", "table": "users", "properties": [{ "name": "id", "id": true }] }],
//!   "queries": [
//!     { "name": "byName", "query": "SELECT u FROM User u WHERE u.name = :name" },
//!     { "name": "findByName", "method": "findByName", "entity": "User", "parameters": ["name"] }
//!   ]
//! }
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::dialect::DatabaseDialect;
use crate::error::ProjectError;
use crate::model::EntityDeclaration;

/// One repository query to convert
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QuerySource {
    /// `@Query` text in JPQL/HQL
    Jpql { name: String, query: String },
    /// Derived query named by a repository method
    Method {
        name: String,
        method: String,
        entity: String,
        #[serde(default)]
        parameters: Vec<String>,
    },
}

impl QuerySource {
    pub fn name(&self) -> &str {
        match self {
            QuerySource::Jpql { name, .. } | QuerySource::Method { name, .. } => name,
        }
    }

    /// Query text or method name
    pub fn text(&self) -> &str {
        match self {
            QuerySource::Jpql { query, .. } => query,
            QuerySource::Method { method, .. } => method,
        }
    }
}

/// A parsed query project
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryProject {
    /// Project name (defaults to the file stem)
    #[serde(default)]
    pub name: String,
    /// Dialect short name (`oracle`, `postgresql`, `pg`)
    #[serde(default)]
    pub dialect: Option<String>,
    /// JDBC URL the dialect is sniffed from when `dialect` is absent
    #[serde(default)]
    pub jdbc_url: Option<String>,
    #[serde(default)]
    pub entities: Vec<EntityDeclaration>,
    #[serde(default)]
    pub queries: Vec<QuerySource>,
    /// Directory containing the project file
    #[serde(skip)]
    pub project_dir: PathBuf,
}

impl QueryProject {
    /// Target dialect from `dialect`, else from `jdbcUrl`.
    pub fn target_dialect(&self) -> Result<DatabaseDialect, ProjectError> {
        if let Some(name) = &self.dialect {
            return DatabaseDialect::from_name(name)
                .ok_or_else(|| ProjectError::UnknownDialect { name: name.clone() });
        }
        if let Some(url) = &self.jdbc_url {
            return DatabaseDialect::from_jdbc_url(url)
                .ok_or_else(|| ProjectError::UnknownDialect { name: url.clone() });
        }
        Err(ProjectError::InvalidProjectFormat {
            message: "project declares neither 'dialect' nor 'jdbcUrl'".to_string(),
        })
    }
}

/// Read and parse a project file.
pub fn parse_project(path: &Path) -> Result<QueryProject, ProjectError> {
    let content = std::fs::read_to_string(path).map_err(|e| ProjectError::ProjectReadError {
        path: path.to_path_buf(),
        source: e,
    })?;
    parse_project_str(&content, path)
}

/// Parse project JSON that was read from `path`.
pub fn parse_project_str(content: &str, path: &Path) -> Result<QueryProject, ProjectError> {
    let mut project: QueryProject =
        serde_json::from_str(content).map_err(|e| ProjectError::ProjectParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

    project.project_dir = path.parent().unwrap_or(Path::new(".")).to_path_buf();
    if project.name.is_empty() {
        project.name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("queries")
            .to_string();
    }

    let mut seen = HashSet::new();
    for query in &project.queries {
        if query.name().trim().is_empty() {
            return Err(ProjectError::InvalidProjectFormat {
                message: "query without a name".to_string(),
            });
        }
        if !seen.insert(query.name()) {
            return Err(ProjectError::InvalidProjectFormat {
                message: format!("duplicate query name '{}'", query.name()),
            });
        }
    }

    Ok(project)
}
