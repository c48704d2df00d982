//! Append-only queue journal.
//!
//! One JSON record per line. A `publish` record is written before a
//! message becomes visible; a `settle` record is written when it is acked,
//! rejected or cancelled. On open the journal is replayed, every message
//! without a `settle` record is returned for redelivery, and the file is
//! compacted down to exactly those messages. A running broker rewrites the
//! file the same way once enough settle records accumulate.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use crate::queue::broker::Topic;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Record {
    Publish {
        topic: Topic,
        seq: u64,
        key: String,
        /// Hex-encoded payload bytes.
        payload: String,
    },
    Settle {
        topic: Topic,
        seq: u64,
    },
}

/// A message recovered from the journal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recovered {
    pub topic: Topic,
    pub seq: u64,
    pub key: String,
    pub payload: Vec<u8>,
}

pub struct Journal {
    path: PathBuf,
    writer: BufWriter<File>,
    fsync: bool,
    /// Settle records appended since the file was last compacted.
    settled: usize,
    syncs: u64,
}

impl Journal {
    /// Open (or create) the journal, returning unsettled messages in
    /// publish order.
    pub fn open(path: impl AsRef<Path>, fsync: bool) -> io::Result<(Self, Vec<Recovered>)> {
        let path = path.as_ref().to_path_buf();
        let recovered = if path.exists() {
            Self::replay(&path)?
        } else {
            Vec::new()
        };

        Self::compact(&path, &recovered)?;

        let file = Self::append_handle(&path)?;
        tracing::info!(
            path = %path.display(),
            recovered = recovered.len(),
            "Queue journal opened"
        );

        Ok((
            Self {
                path,
                writer: BufWriter::new(file),
                fsync,
                settled: 0,
                syncs: 0,
            },
            recovered,
        ))
    }

    fn append_handle(path: &Path) -> io::Result<File> {
        OpenOptions::new().create(true).append(true).open(path)
    }

    fn replay(path: &Path) -> io::Result<Vec<Recovered>> {
        let reader = BufReader::new(File::open(path)?);
        let mut pending: BTreeMap<u64, Recovered> = BTreeMap::new();

        for (line_no, line) in reader.lines().enumerate() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            let record: Record = match serde_json::from_str(&line) {
                Ok(record) => record,
                Err(e) => {
                    // Usually a torn final write after a crash.
                    tracing::warn!(line = line_no + 1, error = %e, "Skipping corrupt journal record");
                    continue;
                }
            };
            match record {
                Record::Publish {
                    topic,
                    seq,
                    key,
                    payload,
                } => match alloy::hex::decode(&payload) {
                    Ok(payload) => {
                        pending.insert(
                            seq,
                            Recovered {
                                topic,
                                seq,
                                key,
                                payload,
                            },
                        );
                    }
                    Err(e) => {
                        tracing::warn!(seq, error = %e, "Skipping journal record with bad payload");
                    }
                },
                Record::Settle { seq, .. } => {
                    pending.remove(&seq);
                }
            }
        }

        Ok(pending.into_values().collect())
    }

    fn compact(path: &Path, live: &[Recovered]) -> io::Result<()> {
        let tmp = path.with_extension("compacting");
        {
            let mut writer = BufWriter::new(File::create(&tmp)?);
            for msg in live {
                write_record(
                    &mut writer,
                    &Record::Publish {
                        topic: msg.topic,
                        seq: msg.seq,
                        key: msg.key.clone(),
                        payload: alloy::hex::encode(&msg.payload),
                    },
                )?;
            }
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        fs::rename(&tmp, path)
    }

    /// Append a record and flush it to the OS.
    ///
    /// Publish records are also synced to disk when `fsync` is set. Settle
    /// records never are: losing one only causes a redelivery.
    pub fn append(&mut self, record: &Record) -> io::Result<()> {
        write_record(&mut self.writer, record)?;
        self.writer.flush()?;
        match record {
            Record::Publish { .. } if self.fsync => {
                self.writer.get_ref().sync_data()?;
                self.syncs += 1;
            }
            Record::Publish { .. } => {}
            Record::Settle { .. } => self.settled += 1,
        }
        Ok(())
    }

    /// Disk syncs performed by `append`.
    pub fn syncs(&self) -> u64 {
        self.syncs
    }

    pub fn settled_since_compaction(&self) -> usize {
        self.settled
    }

    /// Replace the file with publish records for `live` only.
    ///
    /// The caller must hold off every other append until this returns.
    pub fn rewrite(&mut self, live: &[Recovered]) -> io::Result<()> {
        self.writer.flush()?;
        Self::compact(&self.path, live)?;
        self.writer = BufWriter::new(Self::append_handle(&self.path)?);
        self.settled = 0;
        Ok(())
    }
}

fn write_record(writer: &mut impl Write, record: &Record) -> io::Result<()> {
    serde_json::to_writer(&mut *writer, record)?;
    writer.write_all(b"\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn publish(seq: u64, key: &str) -> Record {
        Record::Publish {
            topic: Topic::ChainReads,
            seq,
            key: key.to_string(),
            payload: alloy::hex::encode(key.as_bytes()),
        }
    }

    #[test]
    fn test_replay_returns_only_unsettled() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        {
            let (mut journal, recovered) = Journal::open(&path, false).unwrap();
            assert!(recovered.is_empty());
            journal.append(&publish(1, "a")).unwrap();
            journal.append(&publish(2, "b")).unwrap();
            journal.append(&publish(3, "c")).unwrap();
            journal
                .append(&Record::Settle {
                    topic: Topic::ChainReads,
                    seq: 2,
                })
                .unwrap();
        }

        let (_journal, recovered) = Journal::open(&path, false).unwrap();
        let keys: Vec<_> = recovered.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["a", "c"]);
        assert_eq!(recovered[0].payload, b"a");
    }

    #[test]
    fn test_open_compacts_settled_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        {
            let (mut journal, _) = Journal::open(&path, true).unwrap();
            journal.append(&publish(1, "a")).unwrap();
            journal
                .append(&Record::Settle {
                    topic: Topic::ChainReads,
                    seq: 1,
                })
                .unwrap();
            journal.append(&publish(2, "b")).unwrap();
        }

        drop(Journal::open(&path, false).unwrap());
        let contents = fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), 1);
        assert!(contents.contains("\"seq\":2"));
    }

    #[test]
    fn test_only_publish_records_are_synced() {
        let dir = tempfile::tempdir().unwrap();
        let (mut journal, _) = Journal::open(dir.path().join("queue.journal"), true).unwrap();

        journal.append(&publish(1, "a")).unwrap();
        assert_eq!(journal.syncs(), 1);
        journal
            .append(&Record::Settle {
                topic: Topic::ChainReads,
                seq: 1,
            })
            .unwrap();
        assert_eq!(journal.syncs(), 1);
        assert_eq!(journal.settled_since_compaction(), 1);
    }

    #[test]
    fn test_torn_line_is_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.journal");
        let mut body = serde_json::to_string(&publish(7, "kept")).unwrap();
        body.push_str("\n{\"op\":\"publish\",\"topic\":");
        fs::write(&path, body).unwrap();

        let (_journal, recovered) = Journal::open(&path, false).unwrap();
        assert_eq!(recovered.len(), 1);
        assert_eq!(recovered[0].seq, 7);
    }

    #[test]
    fn test_rewrite_keeps_live_and_resets_counter() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.journal");

        let (mut journal, _) = Journal::open(&path, false).unwrap();
        journal.append(&publish(1, "a")).unwrap();
        journal.append(&publish(2, "b")).unwrap();
        journal
            .append(&Record::Settle {
                topic: Topic::ChainReads,
                seq: 1,
            })
            .unwrap();
        assert_eq!(journal.settled_since_compaction(), 1);

        let live = vec![Recovered {
            topic: Topic::ChainReads,
            seq: 2,
            key: "b".to_string(),
            payload: b"b".to_vec(),
        }];
        journal.rewrite(&live).unwrap();
        assert_eq!(journal.settled_since_compaction(), 0);

        journal.append(&publish(3, "c")).unwrap();
        drop(journal);

        let (_journal, recovered) = Journal::open(&path, false).unwrap();
        let keys: Vec<_> = recovered.iter().map(|m| m.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "c"]);
    }
}
