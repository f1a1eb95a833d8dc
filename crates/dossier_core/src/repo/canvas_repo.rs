//! Canvas row repository contracts and SQLite implementation.
//!
//! # Responsibility
//! - Provide point query / insert / update over the row-per-project canvas
//!   table used as the remote store.
//! - Keep SQL and blob encoding inside the persistence boundary.
//!
//! # Invariants
//! - At most one row exists per `project_id`; a second insert is reported as
//!   `RepoError::Conflict`, never silently merged.
//! - Read paths reject undecodable blobs instead of masking them.

use crate::db::DbError;
use crate::model::canvas::CanvasSnapshot;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::sync::Mutex;

pub type RepoResult<T> = Result<T, RepoError>;

/// Repository error for canvas and local-store persistence.
#[derive(Debug)]
pub enum RepoError {
    Db(DbError),
    /// A row for this project already exists.
    Conflict(String),
    NotFound(String),
    InvalidData(String),
    /// Backend cannot be reached (transport failure, poisoned handle, ...).
    Unavailable(String),
}

impl Display for RepoError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Db(err) => write!(f, "{err}"),
            Self::Conflict(project_id) => {
                write!(f, "canvas row already exists for project {project_id}")
            }
            Self::NotFound(project_id) => write!(f, "canvas row not found for project {project_id}"),
            Self::InvalidData(message) => write!(f, "invalid persisted canvas data: {message}"),
            Self::Unavailable(message) => write!(f, "canvas store unavailable: {message}"),
        }
    }
}

impl Error for RepoError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Db(err) => Some(err),
            _ => None,
        }
    }
}

impl From<DbError> for RepoError {
    fn from(value: DbError) -> Self {
        Self::Db(value)
    }
}

impl From<rusqlite::Error> for RepoError {
    fn from(value: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(value))
    }
}

impl From<serde_json::Error> for RepoError {
    fn from(value: serde_json::Error) -> Self {
        Self::InvalidData(value.to_string())
    }
}

/// One stored canvas row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanvasRow {
    pub row_id: i64,
    pub project_id: String,
    pub owner_id: Option<String>,
    pub snapshot: CanvasSnapshot,
}

/// Remote row-per-project canvas store.
///
/// Implementations must be shareable across the save worker thread.
pub trait CanvasRepository: Send + Sync {
    /// Point query by project id.
    fn find_canvas(&self, project_id: &str) -> RepoResult<Option<CanvasRow>>;
    /// Inserts a new row. Returns `Conflict` when one already exists.
    fn insert_canvas(
        &self,
        project_id: &str,
        owner_id: Option<&str>,
        snapshot: &CanvasSnapshot,
    ) -> RepoResult<()>;
    /// Replaces the blob of an existing row. Returns `NotFound` otherwise.
    fn update_canvas(&self, project_id: &str, snapshot: &CanvasSnapshot) -> RepoResult<()>;
}

/// SQLite-backed canvas repository.
pub struct SqliteCanvasRepository {
    conn: Mutex<Connection>,
}

impl SqliteCanvasRepository {
    /// Wraps a migrated connection (see [`crate::db::open_db`]).
    pub fn new(conn: Connection) -> Self {
        Self {
            conn: Mutex::new(conn),
        }
    }

    fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> RepoResult<T>) -> RepoResult<T> {
        let conn = self
            .conn
            .lock()
            .map_err(|_| RepoError::Unavailable("canvas connection lock poisoned".to_string()))?;
        f(&conn)
    }
}

impl CanvasRepository for SqliteCanvasRepository {
    fn find_canvas(&self, project_id: &str) -> RepoResult<Option<CanvasRow>> {
        self.with_conn(|conn| {
            let row = conn
                .query_row(
                    "SELECT id, project_id, owner_id, canvas
                     FROM project_canvases
                     WHERE project_id = ?1;",
                    [project_id],
                    |row| {
                        Ok((
                            row.get::<_, i64>("id")?,
                            row.get::<_, String>("project_id")?,
                            row.get::<_, Option<String>>("owner_id")?,
                            row.get::<_, Option<String>>("canvas")?,
                        ))
                    },
                )
                .optional()?;

            let Some((row_id, project_id, owner_id, canvas)) = row else {
                return Ok(None);
            };
            let snapshot = match canvas {
                Some(raw) => CanvasSnapshot::from_json(&raw).map_err(|err| {
                    RepoError::InvalidData(format!(
                        "project_canvases.canvas for project {project_id}: {err}"
                    ))
                })?,
                None => CanvasSnapshot::default(),
            };

            Ok(Some(CanvasRow {
                row_id,
                project_id,
                owner_id,
                snapshot,
            }))
        })
    }

    fn insert_canvas(
        &self,
        project_id: &str,
        owner_id: Option<&str>,
        snapshot: &CanvasSnapshot,
    ) -> RepoResult<()> {
        let blob = snapshot.to_json()?;
        self.with_conn(|conn| {
            let result = conn.execute(
                "INSERT INTO project_canvases (project_id, owner_id, canvas)
                 VALUES (?1, ?2, ?3);",
                params![project_id, owner_id, blob],
            );
            match result {
                Ok(_) => Ok(()),
                Err(err) if is_constraint_violation(&err) => {
                    Err(RepoError::Conflict(project_id.to_string()))
                }
                Err(err) => Err(err.into()),
            }
        })
    }

    fn update_canvas(&self, project_id: &str, snapshot: &CanvasSnapshot) -> RepoResult<()> {
        let blob = snapshot.to_json()?;
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE project_canvases
                 SET
                    canvas = ?2,
                    updated_at = (strftime('%s', 'now') * 1000)
                 WHERE project_id = ?1;",
                params![project_id, blob],
            )?;
            if changed == 0 {
                return Err(RepoError::NotFound(project_id.to_string()));
            }
            Ok(())
        })
    }
}

fn is_constraint_violation(err: &rusqlite::Error) -> bool {
    matches!(
        err,
        rusqlite::Error::SqliteFailure(failure, _) if failure.code == ErrorCode::ConstraintViolation
    )
}

#[cfg(test)]
mod tests {
    use super::{CanvasRepository, RepoError, SqliteCanvasRepository};
    use crate::db::open_db_in_memory;
    use crate::model::canvas::{CanvasItem, CanvasSnapshot};

    fn repo() -> SqliteCanvasRepository {
        SqliteCanvasRepository::new(open_db_in_memory().unwrap())
    }

    #[test]
    fn insert_then_find_roundtrip() {
        let repo = repo();
        let snapshot = CanvasSnapshot::new(vec![CanvasItem::resolved("m1")]);
        repo.insert_canvas("p1", Some("u1"), &snapshot).unwrap();

        let row = repo.find_canvas("p1").unwrap().unwrap();
        assert_eq!(row.project_id, "p1");
        assert_eq!(row.owner_id.as_deref(), Some("u1"));
        assert_eq!(row.snapshot, snapshot);
        assert!(repo.find_canvas("p2").unwrap().is_none());
    }

    #[test]
    fn second_insert_reports_conflict() {
        let repo = repo();
        repo.insert_canvas("p1", None, &CanvasSnapshot::default())
            .unwrap();
        let err = repo
            .insert_canvas("p1", None, &CanvasSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, RepoError::Conflict(ref id) if id == "p1"));
    }

    #[test]
    fn update_missing_row_reports_not_found() {
        let repo = repo();
        let err = repo
            .update_canvas("ghost", &CanvasSnapshot::default())
            .unwrap_err();
        assert!(matches!(err, RepoError::NotFound(_)));
    }
}
