use std::path::{Path, PathBuf};
use std::sync::{mpsc, Arc};
use std::thread::{self, JoinHandle};

use anyhow::{anyhow, Context, Result};
use log::{error, info, warn};
use rusqlite::Connection;
use tokio::sync::oneshot;

use super::migrations::run_migrations;

const STORAGE_THREAD: &str = "palmprint-db";

type Job = Box<dyn FnOnce(&mut Connection) + Send>;

/// Handle to the embeddings database.
///
/// The connection is opened and migrated on the calling thread, then moved
/// onto a single storage thread that runs queued jobs in order. Clones share
/// that thread; it drains its queue and exits when the last clone is dropped.
#[derive(Clone)]
pub struct Database {
    storage: Arc<Storage>,
}

struct Storage {
    path: PathBuf,
    jobs: Option<mpsc::Sender<Job>>,
    thread: Option<JoinHandle<()>>,
}

impl Drop for Storage {
    fn drop(&mut self) {
        // Closing the queue ends the thread's receive loop.
        self.jobs.take();
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("Storage thread for {} panicked", self.path.display());
            }
        }
    }
}

fn open_connection(path: &Path) -> Result<Connection> {
    let mut conn = Connection::open(path)
        .with_context(|| format!("failed to open embeddings database {}", path.display()))?;

    if let Err(err) = conn.pragma_update(None, "journal_mode", "WAL") {
        warn!("WAL journal unavailable for {}: {err}", path.display());
    }

    run_migrations(&mut conn).context("failed to migrate embeddings schema")?;
    Ok(conn)
}

impl Database {
    pub fn new(path: PathBuf) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }

        let mut conn = open_connection(&path)?;
        let (jobs, queue) = mpsc::channel::<Job>();
        let thread = thread::Builder::new()
            .name(STORAGE_THREAD.into())
            .spawn(move || {
                for job in queue {
                    job(&mut conn);
                }
            })
            .context("failed to spawn storage thread")?;

        info!("Embeddings database ready at {}", path.display());

        Ok(Self {
            storage: Arc::new(Storage {
                path,
                jobs: Some(jobs),
                thread: Some(thread),
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.storage.path
    }

    /// Runs `job` on the storage thread and waits for its result.
    pub(crate) async fn execute<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let jobs = self
            .storage
            .jobs
            .as_ref()
            .ok_or_else(|| anyhow!("storage thread already stopped"))?;

        let (reply, response) = oneshot::channel();
        jobs.send(Box::new(move |conn| {
            // The caller may have given up waiting; the job still ran.
            let _ = reply.send(job(conn));
        }))
        .map_err(|_| anyhow!("storage thread for {} has exited", self.path().display()))?;

        response
            .await
            .map_err(|_| anyhow!("storage thread dropped the request"))?
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    #[tokio::test]
    async fn jobs_run_on_the_storage_thread() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("palmprint.sqlite3")).unwrap();

        let name = db
            .execute(|_| Ok(thread::current().name().map(str::to_string)))
            .await
            .unwrap();
        assert_eq!(name.as_deref(), Some(STORAGE_THREAD));

        let clone = db.clone();
        let tables: i64 = clone
            .execute(|conn| {
                Ok(conn.query_row(
                    "SELECT COUNT(*) FROM sqlite_master WHERE name = 'embeddings'",
                    [],
                    |row| row.get(0),
                )?)
            })
            .await
            .unwrap();
        assert_eq!(tables, 1);
    }

    #[tokio::test]
    async fn job_errors_reach_the_caller() {
        let dir = TempDir::new().unwrap();
        let db = Database::new(dir.path().join("palmprint.sqlite3")).unwrap();

        let result: Result<()> = db.execute(|_| Err(anyhow!("constraint failed"))).await;
        assert!(result.unwrap_err().to_string().contains("constraint failed"));

        // the thread keeps serving after a failed job
        assert!(db.execute(|_| Ok(())).await.is_ok());
    }

    #[test]
    fn creates_missing_parent_directories() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("palmprint.sqlite3");
        let db = Database::new(path.clone()).unwrap();
        assert_eq!(db.path(), path.as_path());
        assert!(path.exists());
    }
}
