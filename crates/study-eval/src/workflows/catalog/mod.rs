//! Read-only reference tables (exam and lecture timetables, course catalog)
//! consulted by the scoring stages.

mod parser;
mod query;

pub use parser::Table;

use std::collections::HashMap;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// The four fixed datasets a query can address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Dataset {
    Exams,
    Lectures,
    CourseDescription,
    CourseMasterlist,
}

impl Dataset {
    pub const fn ordered() -> [Self; 4] {
        [
            Self::Exams,
            Self::Lectures,
            Self::CourseDescription,
            Self::CourseMasterlist,
        ]
    }

    pub const fn file_name(self) -> &'static str {
        match self {
            Self::Exams => "exams.csv",
            Self::Lectures => "lectures.csv",
            Self::CourseDescription => "course_description.csv",
            Self::CourseMasterlist => "course_masterlist.csv",
        }
    }

    pub const fn label(self) -> &'static str {
        match self {
            Self::Exams => "exams",
            Self::Lectures => "lectures",
            Self::CourseDescription => "course_description",
            Self::CourseMasterlist => "course_masterlist",
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("failed to read reference table {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid CSV in {dataset:?} reference table: {source}")]
    Csv {
        dataset: Dataset,
        #[source]
        source: csv::Error,
    },
}

/// Result of a reference query. Failures are values, never errors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    Rows {
        columns: Vec<String>,
        rows: Vec<Vec<String>>,
    },
    Failed(String),
}

impl QueryOutcome {
    pub fn rows(&self) -> &[Vec<String>] {
        match self {
            QueryOutcome::Rows { rows, .. } => rows,
            QueryOutcome::Failed(_) => &[],
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, QueryOutcome::Failed(_))
    }

    /// Value of `column` in `row` of a successful outcome.
    pub fn value<'a>(&'a self, row: &'a [String], column: &str) -> Option<&'a str> {
        match self {
            QueryOutcome::Rows { columns, .. } => columns
                .iter()
                .position(|name| name.eq_ignore_ascii_case(column))
                .and_then(|index| row.get(index))
                .map(String::as_str),
            QueryOutcome::Failed(_) => None,
        }
    }
}

impl fmt::Display for QueryOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QueryOutcome::Failed(message) => write!(f, "{message}"),
            QueryOutcome::Rows { rows, .. } if rows.is_empty() => write!(f, "Empty result"),
            QueryOutcome::Rows { columns, rows } => {
                writeln!(f, "{}", columns.join(" | "))?;
                for (position, row) in rows.iter().enumerate() {
                    if position > 0 {
                        writeln!(f)?;
                    }
                    write!(f, "{}", row.join(" | "))?;
                }
                Ok(())
            }
        }
    }
}

/// Immutable set of reference tables, shared across requests.
#[derive(Debug, Clone, Default)]
pub struct ReferenceCatalog {
    tables: HashMap<Dataset, Table>,
}

impl ReferenceCatalog {
    pub fn from_dir<P: AsRef<Path>>(dir: P) -> Result<Self, CatalogError> {
        let dir = dir.as_ref();
        let mut catalog = Self::default();
        for dataset in Dataset::ordered() {
            let path = dir.join(dataset.file_name());
            let file = std::fs::File::open(&path).map_err(|source| CatalogError::Io {
                path: path.clone(),
                source,
            })?;
            catalog.load(dataset, file)?;
        }
        Ok(catalog)
    }

    pub fn with_table<R: Read>(mut self, dataset: Dataset, reader: R) -> Result<Self, CatalogError> {
        self.load(dataset, reader)?;
        Ok(self)
    }

    fn load<R: Read>(&mut self, dataset: Dataset, reader: R) -> Result<(), CatalogError> {
        let table =
            parser::parse_table(reader).map_err(|source| CatalogError::Csv { dataset, source })?;
        tracing::debug!(dataset = dataset.label(), rows = table.len(), "reference table loaded");
        self.tables.insert(dataset, table);
        Ok(())
    }

    pub fn table(&self, dataset: Dataset) -> Option<&Table> {
        self.tables.get(&dataset)
    }

    pub fn query(&self, dataset: Dataset, expression: &str) -> QueryOutcome {
        let Some(table) = self.tables.get(&dataset) else {
            return QueryOutcome::Failed(format!(
                "Error executing query: {} table is not loaded",
                dataset.label()
            ));
        };

        match query::filter(table, expression) {
            Ok(rows) => QueryOutcome::Rows {
                columns: table.columns.clone(),
                rows,
            },
            Err(message) => QueryOutcome::Failed(format!("Error executing query: {message}")),
        }
    }
}
