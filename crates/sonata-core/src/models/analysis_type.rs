use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use validator::Validate;

const DEFAULT_PAGE_LIMIT: i64 = 20;

/// A versioned schema registration. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisType {
    pub name: String,
    pub version: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub schema: Option<Value>,
    pub created_at: DateTime<Utc>,
}

impl AnalysisType {
    pub fn key(&self) -> AnalysisTypeKey {
        AnalysisTypeKey {
            name: self.name.clone(),
            version: self.version,
        }
    }
}

#[cfg(feature = "sqlx")]
impl sqlx::FromRow<'_, sqlx::postgres::PgRow> for AnalysisType {
    fn from_row(row: &sqlx::postgres::PgRow) -> Result<Self, sqlx::Error> {
        use sqlx::Row;
        Ok(AnalysisType {
            name: row.try_get("name")?,
            version: row.try_get("version")?,
            schema: row.try_get("schema")?,
            created_at: row.try_get("created_at")?,
        })
    }
}

/// Fully qualified `(name, version)`; the reply of a registration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AnalysisTypeKey {
    pub name: String,
    pub version: i32,
}

impl Display for AnalysisTypeKey {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        write!(f, "{}:{}", self.name, self.version)
    }
}

/// How a payload names its analysis type: a bare name means the latest version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum AnalysisTypeRef {
    Latest(String),
    Exact {
        name: String,
        #[serde(default)]
        version: Option<i32>,
    },
}

impl AnalysisTypeRef {
    pub fn name(&self) -> &str {
        match self {
            AnalysisTypeRef::Latest(name) => name,
            AnalysisTypeRef::Exact { name, .. } => name,
        }
    }

    pub fn version(&self) -> Option<i32> {
        match self {
            AnalysisTypeRef::Latest(_) => None,
            AnalysisTypeRef::Exact { version, .. } => *version,
        }
    }
}

impl Display for AnalysisTypeRef {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self.version() {
            Some(version) => write!(f, "{}:{}", self.name(), version),
            None => write!(f, "{}:latest", self.name()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisTypeSortOrder {
    Name,
    Version,
}

impl FromStr for AnalysisTypeSortOrder {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "name" => Ok(AnalysisTypeSortOrder::Name),
            "version" => Ok(AnalysisTypeSortOrder::Version),
            _ => Err(anyhow::anyhow!("Invalid sort order: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    #[default]
    Desc,
}

impl FromStr for SortDirection {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "asc" => Ok(SortDirection::Asc),
            "desc" => Ok(SortDirection::Desc),
            _ => Err(anyhow::anyhow!("Invalid sort direction: {}", s)),
        }
    }
}

/// Filter for listing analysis types. Empty `names`/`versions` match everything.
#[derive(Debug, Clone, PartialEq, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct AnalysisTypeQuery {
    #[serde(default)]
    pub names: Vec<String>,
    #[serde(default)]
    pub versions: Vec<i32>,
    #[serde(default)]
    pub sort_orders: Vec<AnalysisTypeSortOrder>,
    #[serde(default)]
    pub sort_direction: SortDirection,
    #[serde(default)]
    #[validate(range(min = 0, message = "Offset must be zero or greater"))]
    pub offset: i64,
    #[serde(default = "default_limit")]
    #[validate(range(min = 1, max = 1000, message = "Limit must be between 1 and 1000"))]
    pub limit: i64,
    #[serde(default)]
    pub hide_schema: bool,
    #[serde(default)]
    pub unrendered_only: bool,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_LIMIT
}

impl Default for AnalysisTypeQuery {
    fn default() -> Self {
        Self {
            names: Vec::new(),
            versions: Vec::new(),
            sort_orders: Vec::new(),
            sort_direction: SortDirection::default(),
            offset: 0,
            limit: DEFAULT_PAGE_LIMIT,
            hide_schema: false,
            unrendered_only: false,
        }
    }
}

impl AnalysisTypeQuery {
    /// Sort keys to apply; version alone when none were requested.
    pub fn effective_sort_orders(&self) -> Vec<AnalysisTypeSortOrder> {
        if self.sort_orders.is_empty() {
            vec![AnalysisTypeSortOrder::Version]
        } else {
            self.sort_orders.clone()
        }
    }
}

/// One page of a listing plus the total number of matches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub offset: i64,
    pub limit: i64,
    pub count: i64,
}
