//! Single-writer actor owning the SQLite connection.
//!
//! SQLite allows one writer at a time; funneling every job through a
//! dedicated task with its own connection serializes writes without
//! busy-loop retries. Reads go through the same handle, which keeps the
//! crate to exactly one connection.

use std::any::Any;

use rusqlite::{Connection, TransactionBehavior};
use tokio::sync::{mpsc, oneshot};

use fundsnap_core::errors::{DatabaseError, Result};

// A job is a closure run against the actor's connection inside an
// immediate transaction. Box<dyn Any + Send> erases the return type so
// one channel serves every job shape.
type Job<T> = Box<dyn FnOnce(&Connection) -> Result<T> + Send + 'static>;

/// Handle for sending jobs to the writer actor. Cheap to clone.
#[derive(Clone)]
pub struct WriteHandle {
    #[allow(clippy::type_complexity)]
    tx: mpsc::Sender<(
        Job<Box<dyn Any + Send + 'static>>,
        oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>,
    )>,
}

impl WriteHandle {
    /// Executes a database job on the actor's connection and returns its
    /// result. The job runs inside an immediate transaction; an `Err`
    /// rolls the transaction back.
    pub async fn exec<F, T>(&self, job: F) -> Result<T>
    where
        F: FnOnce(&Connection) -> Result<T> + Send + 'static,
        T: Send + 'static + Any,
    {
        let (ret_tx, ret_rx) = oneshot::channel();

        self.tx
            .send((
                Box::new(move |c| job(c).map(|v| Box::new(v) as Box<dyn Any + Send>)),
                ret_tx,
            ))
            .await
            .expect("Writer actor's receiving channel was closed, indicating the actor stopped.");

        ret_rx
            .await
            .expect("Writer actor dropped the reply sender without sending a result.")
            .map(|boxed: Box<dyn Any + Send + 'static>| {
                *boxed
                    .downcast::<T>()
                    .unwrap_or_else(|_| panic!("Failed to downcast writer actor result."))
            })
    }
}

/// Spawns the background task that owns `conn` and processes jobs
/// serially. The actor terminates when the last `WriteHandle` is dropped.
pub fn spawn_writer(mut conn: Connection) -> WriteHandle {
    let (tx, mut rx) = mpsc::channel::<(
        Job<Box<dyn Any + Send + 'static>>,
        oneshot::Sender<Result<Box<dyn Any + Send + 'static>>>,
    )>(1024);

    tokio::spawn(async move {
        while let Some((job, reply_tx)) = rx.recv().await {
            let result = run_job(&mut conn, job);
            // Ignore error if the requester has gone away.
            let _ = reply_tx.send(result);
        }
    });

    WriteHandle { tx }
}

fn run_job(
    conn: &mut Connection,
    job: Job<Box<dyn Any + Send + 'static>>,
) -> Result<Box<dyn Any + Send + 'static>> {
    let tx = conn
        .transaction_with_behavior(TransactionBehavior::Immediate)
        .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
    let value = job(&tx)?;
    tx.commit()
        .map_err(|e| DatabaseError::TransactionFailed(e.to_string()))?;
    Ok(value)
}
