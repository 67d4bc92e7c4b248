//! Append-only audit trail of `/track` requests.
//!
//! Each record is the request's query parameters encoded as one JSON object
//! per line. A single writer task owns the file; [`AuditSink::append`] only
//! enqueues the encoded line, so records land in the order handlers call it
//! and concurrent callers never interleave partial lines.

use std::{
    io,
    path::{Path, PathBuf},
};

use serde::{Serialize, Serializer, ser::SerializeMap};
use thiserror::Error;
use tokio::{
    fs::{File, OpenOptions},
    io::AsyncWriteExt,
    sync::{mpsc, oneshot},
};
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum AuditError {
    #[error("failed to open audit file {}", path.display())]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("failed to write audit file: {0}")]
    Write(#[from] io::Error),

    #[error("failed to encode audit record: {0}")]
    Encode(#[from] serde_json::Error),

    #[error("audit sink is closed")]
    Closed,
}

/// Query parameters of one track request, in the order they arrived.
///
/// A key that appears more than once is written as an array of its values.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuditRecord {
    fields: Vec<(String, Vec<String>)>,
}

impl AuditRecord {
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let mut fields: Vec<(String, Vec<String>)> = Vec::new();
        for (key, value) in pairs {
            let key = key.into();
            match fields.iter_mut().find(|(existing, _)| *existing == key) {
                Some((_, values)) => values.push(value.into()),
                None => fields.push((key, vec![value.into()])),
            }
        }
        Self { fields }
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// JSON encoding terminated by a newline.
    pub fn to_line(&self) -> Result<String, AuditError> {
        let mut line = serde_json::to_string(self)?;
        line.push('\n');
        Ok(line)
    }
}

impl Serialize for AuditRecord {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (key, values) in &self.fields {
            match values.as_slice() {
                [single] => map.serialize_entry(key, single)?,
                many => map.serialize_entry(key, many)?,
            }
        }
        map.end()
    }
}

enum SinkCommand {
    Append(String),
    Close(oneshot::Sender<Result<(), AuditError>>),
}

pub struct AuditSink {
    path: PathBuf,
    commands: mpsc::UnboundedSender<SinkCommand>,
}

impl AuditSink {
    /// Opens `path` for appending, creating it if needed, and starts the writer task.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, AuditError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await
            .map_err(|source| AuditError::Open {
                path: path.clone(),
                source,
            })?;

        let (commands, queue) = mpsc::unbounded_channel();
        tokio::spawn(run_writer(file, queue));
        debug!(path = %path.display(), "audit sink opened");

        Ok(Self { path, commands })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Queues `record` for writing. Never waits on the file.
    pub fn append(&self, record: &AuditRecord) -> Result<(), AuditError> {
        let line = record.to_line()?;
        self.commands
            .send(SinkCommand::Append(line))
            .map_err(|_| AuditError::Closed)
    }

    /// Writes out everything queued so far, syncs, and closes the file.
    ///
    /// Closing an already closed sink succeeds without doing anything.
    pub async fn close(&self) -> Result<(), AuditError> {
        let (reply, done) = oneshot::channel();
        if self.commands.send(SinkCommand::Close(reply)).is_err() {
            return Ok(());
        }
        done.await.unwrap_or(Ok(()))
    }
}

async fn run_writer(mut file: File, mut queue: mpsc::UnboundedReceiver<SinkCommand>) {
    while let Some(command) = queue.recv().await {
        match command {
            SinkCommand::Append(line) => {
                if let Err(err) = write_line(&mut file, &line).await {
                    warn!(error = %err, "failed to write audit record");
                }
            }
            SinkCommand::Close(reply) => {
                queue.close();
                let _ = reply.send(finish(&mut file).await);
                return;
            }
        }
    }

    // Every sender is gone without an explicit close.
    if let Err(err) = finish(&mut file).await {
        warn!(error = %err, "failed to flush audit file");
    }
}

async fn write_line(file: &mut File, line: &str) -> io::Result<()> {
    file.write_all(line.as_bytes()).await?;
    file.flush().await
}

async fn finish(file: &mut File) -> Result<(), AuditError> {
    file.flush().await?;
    file.sync_all().await?;
    Ok(())
}
