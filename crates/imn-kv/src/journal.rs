use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::KvError;

/// One replayable journal record. TTLs are stored as absolute expiry
/// timestamps so replay after downtime still honors them.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub(crate) enum JournalRecord {
    Set {
        key: String,
        value: Vec<u8>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        expires_at: Option<i64>,
    },
    Delete {
        key: String,
    },
    ZAdd {
        set: String,
        member: String,
        score: i64,
    },
    ZRem {
        set: String,
        member: String,
    },
    LPush {
        list: String,
        value: Vec<u8>,
    },
}

/// Append-only on-disk journal.
///
/// Records are JSON lines, flushed per batch. A partially written trailing
/// line (crash mid-append) is tolerated on replay and dropped by the next
/// compaction.
pub(crate) struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
}

impl Journal {
    /// Read every record currently in the journal at `path`.
    pub fn replay(path: &Path) -> Result<Vec<JournalRecord>, KvError> {
        let mut records = Vec::new();
        match File::open(path) {
            Ok(file) => {
                for line in BufReader::new(file).lines() {
                    let line = line?;
                    if line.trim().is_empty() {
                        continue;
                    }
                    match serde_json::from_str::<JournalRecord>(&line) {
                        Ok(record) => records.push(record),
                        Err(e) => {
                            // Torn tail write; everything before it is intact.
                            tracing::warn!(error = %e, "dropping unparsable journal tail");
                            break;
                        }
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(e.into()),
        }
        Ok(records)
    }

    /// Replace the journal contents with `records` and open it for append.
    pub fn compact(path: &Path, records: &[JournalRecord]) -> Result<Self, KvError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let tmp = path.with_extension("compact");
        {
            let file = File::create(&tmp)?;
            let mut writer = BufWriter::new(file);
            for record in records {
                serde_json::to_writer(&mut writer, record)
                    .map_err(|e| KvError::Io(e.to_string()))?;
                writer.write_all(b"\n")?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        std::fs::rename(&tmp, path)?;

        let file = OpenOptions::new().append(true).open(path)?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
        })
    }

    /// Append records for one applied batch and flush them together.
    pub fn append(&mut self, records: &[JournalRecord]) -> Result<(), KvError> {
        for record in records {
            serde_json::to_writer(&mut self.writer, record)
                .map_err(|e| KvError::Io(e.to_string()))?;
            self.writer.write_all(b"\n")?;
        }
        self.writer.flush()?;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
