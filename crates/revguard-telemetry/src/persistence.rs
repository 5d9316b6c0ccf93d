//! Audit log persistence
//!
//! Chained events are appended as JSON lines. Opening an existing file
//! resumes its chain, so a restarted service keeps extending one
//! verifiable history. A torn final line left by an interrupted write is
//! cut off on open.

use crate::audit::{verify_chain, verify_chain_from, AuditEvent, AuditTrail};
use revguard_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

/// Recent events an in-memory log keeps for verification
pub const MEMORY_WINDOW: usize = 10_000;

/// Append-only audit log, in memory or backed by a JSONL file.
///
/// A file-backed log keeps only the chain head in memory; the file is
/// the history. An in-memory log keeps a bounded window of recent
/// events.
pub struct AuditLog {
    trail: AuditTrail,
    file: Option<LogFile>,
}

struct LogFile {
    path: PathBuf,
    file: File,
    /// Bytes taken by complete, chained lines
    len: u64,
    /// Set when a failed append could not be rolled back
    poisoned: bool,
}

impl LogFile {
    fn write_line(&mut self, event: &AuditEvent) -> Result<()> {
        if self.poisoned {
            return Err(Error::audit(format!(
                "{}: refusing to append after an unrecovered write failure",
                self.path.display()
            )));
        }

        let mut line = serde_json::to_vec(event)?;
        line.push(b'\n');

        if let Err(e) = self.file.write_all(&line) {
            // Cut off whatever part of the line reached the file
            if let Err(rollback) = self.file.set_len(self.len) {
                error!(
                    path = %self.path.display(),
                    error = %rollback,
                    "Failed to roll back partial audit write, audit log poisoned"
                );
                self.poisoned = true;
            }
            return Err(Error::io_at(&self.path, e));
        }

        self.len += line.len() as u64;
        Ok(())
    }
}

impl AuditLog {
    /// Audit log that only keeps events in memory
    pub fn in_memory() -> Self {
        Self {
            trail: AuditTrail::bounded(MEMORY_WINDOW),
            file: None,
        }
    }

    /// Open (or create) a file-backed audit log, resuming its chain
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| Error::io_at(parent, e))?;
        }

        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(Error::io_at(&path, e)),
        };
        let recovered = recover(&path, &bytes)?;

        if !recovered.events.is_empty() {
            if !verify_chain(&recovered.events) {
                warn!(path = %path.display(), "Existing audit chain failed verification");
            }
            info!(
                path = %path.display(),
                events = recovered.events.len(),
                "Resuming audit log"
            );
        }

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| Error::io_at(&path, e))?;

        let mut len = recovered.len;
        if len < bytes.len() as u64 {
            warn!(
                path = %path.display(),
                discarded_bytes = bytes.len() as u64 - len,
                "Truncating torn audit record"
            );
            file.set_len(len).map_err(|e| Error::io_at(&path, e))?;
        }
        if recovered.missing_newline {
            file.write_all(b"\n").map_err(|e| Error::io_at(&path, e))?;
            len += 1;
        }

        let head = recovered.events.last().and_then(|e| e.hash.clone());

        Ok(Self {
            trail: AuditTrail::resume(head),
            file: Some(LogFile {
                path,
                file,
                len,
                poisoned: false,
            }),
        })
    }

    /// Chain an event and persist it; returns the stored event.
    ///
    /// On error nothing is recorded and the chain head is unchanged.
    pub fn append(&mut self, event: AuditEvent) -> Result<AuditEvent> {
        // Chain on a scratch trail so a failed write leaves the head untouched
        let mut staged = AuditTrail::resume(self.trail.head().map(str::to_string));
        let event = staged.chain_event(event);

        let stored = match self.file.as_mut() {
            Some(log) => {
                log.write_line(&event)?;
                self.trail = staged;
                event
            }
            None => self.trail.add_event(event).clone(),
        };

        debug!(
            audit_id = %stored.audit_id,
            event_type = %stored.event_type,
            "Appended audit event"
        );
        Ok(stored)
    }

    /// Force written events to disk
    pub fn flush(&mut self) -> Result<()> {
        if let Some(log) = self.file.as_mut() {
            log.file
                .sync_data()
                .map_err(|e| Error::io_at(&log.path, e))?;
        }
        Ok(())
    }

    /// Events kept in memory; always empty for a file-backed log
    pub fn events(&self) -> &[AuditEvent] {
        self.trail.events()
    }

    /// Hash of the most recent event, including resumed history
    pub fn head(&self) -> Option<&str> {
        self.trail.head()
    }

    /// Backing file, if any
    pub fn path(&self) -> Option<&Path> {
        self.file.as_ref().map(|log| log.path.as_path())
    }

    /// Capture what needs verifying, so the check itself can run
    /// without holding the log
    pub fn checkpoint(&self) -> AuditCheckpoint {
        match &self.file {
            Some(log) => AuditCheckpoint::File {
                path: log.path.clone(),
                len: log.len,
            },
            None => AuditCheckpoint::Memory {
                anchor: self.trail.anchor().map(str::to_string),
                events: self.trail.events().to_vec(),
            },
        }
    }
}

/// Snapshot of an audit log taken for verification
#[derive(Debug, Clone)]
pub enum AuditCheckpoint {
    /// Window of an in-memory log and the hash it continues from
    Memory {
        anchor: Option<String>,
        events: Vec<AuditEvent>,
    },

    /// The first `len` bytes of a log file
    File { path: PathBuf, len: u64 },
}

impl AuditCheckpoint {
    /// Verify the captured chain
    pub fn verify(self) -> Result<ChainReport> {
        let (events, valid) = match self {
            Self::Memory { anchor, events } => {
                let valid = verify_chain_from(anchor.as_deref(), &events);
                (events.len(), valid)
            }
            Self::File { path, len } => {
                let file = File::open(&path).map_err(|e| Error::io_at(&path, e))?;
                let events = read_events(&path, BufReader::new(file.take(len)))?;
                (events.len(), verify_events(&events))
            }
        };

        Ok(ChainReport { events, valid })
    }
}

/// Outcome of verifying an audit chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainReport {
    pub events: usize,
    pub valid: bool,
}

/// Complete events of a log file and the bytes they span
struct Recovered {
    events: Vec<AuditEvent>,
    len: u64,
    missing_newline: bool,
}

/// Parse a log file, dropping a torn final line.
///
/// A malformed line followed by further records is not a torn write and
/// fails the whole read.
fn recover(path: &Path, bytes: &[u8]) -> Result<Recovered> {
    let mut events = Vec::new();
    let mut offset = 0;
    let mut line_number = 0;

    while offset < bytes.len() {
        line_number += 1;
        let (end, next) = match bytes[offset..].iter().position(|&b| b == b'\n') {
            Some(i) => (offset + i, offset + i + 1),
            None => (bytes.len(), bytes.len()),
        };
        let line = &bytes[offset..end];

        if !is_blank(line) {
            match serde_json::from_slice::<AuditEvent>(line) {
                Ok(event) => events.push(event),
                Err(e) if is_blank(&bytes[next..]) => {
                    warn!(
                        path = %path.display(),
                        line = line_number,
                        error = %e,
                        "Discarding torn audit record"
                    );
                    return Ok(Recovered {
                        events,
                        len: offset as u64,
                        missing_newline: false,
                    });
                }
                Err(e) => return Err(malformed(path, line_number, e)),
            }
        }

        offset = next;
    }

    Ok(Recovered {
        events,
        len: bytes.len() as u64,
        missing_newline: bytes.last().is_some_and(|&b| b != b'\n'),
    })
}

fn is_blank(bytes: &[u8]) -> bool {
    bytes.iter().all(u8::is_ascii_whitespace)
}

fn malformed(path: &Path, line_number: usize, err: serde_json::Error) -> Error {
    Error::audit(format!(
        "{}:{}: malformed audit event: {}",
        path.display(),
        line_number,
        err
    ))
}

/// Read every event from a JSONL audit file
pub fn read_file(path: impl AsRef<Path>) -> Result<Vec<AuditEvent>> {
    let path = path.as_ref();
    let file = File::open(path).map_err(|e| Error::io_at(path, e))?;
    read_events(path, BufReader::new(file))
}

fn read_events(path: &Path, reader: impl BufRead) -> Result<Vec<AuditEvent>> {
    let mut events = Vec::new();

    for (index, line) in reader.lines().enumerate() {
        let line = line.map_err(|e| Error::io_at(path, e))?;
        if line.trim().is_empty() {
            continue;
        }

        let event = serde_json::from_str::<AuditEvent>(&line)
            .map_err(|e| malformed(path, index + 1, e))?;
        events.push(event);
    }

    Ok(events)
}

/// Verify a full chain read back from storage
pub fn verify_events(events: &[AuditEvent]) -> bool {
    verify_chain(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audit::EventType;
    use revguard_core::Decision;

    #[test]
    fn test_in_memory_log() {
        let mut log = AuditLog::in_memory();

        let stored = log
            .append(AuditEvent::new(EventType::PolicyDecision).with_decision(Decision::Allow))
            .unwrap();

        assert!(stored.hash.is_some());
        assert_eq!(log.head(), stored.hash.as_deref());
        assert_eq!(log.events().len(), 1);
        assert!(log.path().is_none());

        let report = log.checkpoint().verify().unwrap();
        assert_eq!(report, ChainReport { events: 1, valid: true });
    }

    #[test]
    fn test_in_memory_log_is_bounded() {
        let mut log = AuditLog::in_memory();
        for _ in 0..(MEMORY_WINDOW * 2 + 1) {
            log.append(AuditEvent::new(EventType::Analysis)).unwrap();
        }

        assert!(log.events().len() < MEMORY_WINDOW * 2);
        assert!(log.checkpoint().verify().unwrap().valid);
    }

    #[test]
    fn test_read_file_rejects_garbage() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        std::fs::write(&path, "{not json}\n").unwrap();

        let err = read_file(&path).unwrap_err();
        assert!(err.to_string().contains("audit.jsonl:1"));
    }

    #[test]
    fn test_recover_drops_only_a_torn_tail() {
        let path = Path::new("audit.jsonl");
        let mut trail = AuditTrail::new();
        let event = trail.chain_event(AuditEvent::new(EventType::PolicyDecision));
        let good = format!("{}\n", serde_json::to_string(&event).unwrap());

        let torn = format!("{}{{\"audit_id\":\"audit-", good);
        let recovered = recover(path, torn.as_bytes()).unwrap();
        assert_eq!(recovered.events.len(), 1);
        assert_eq!(recovered.len, good.len() as u64);

        let corrupt_middle = format!("{{oops}}\n{}", good);
        assert!(recover(path, corrupt_middle.as_bytes()).is_err());
    }

    #[cfg(target_os = "linux")]
    #[test]
    fn test_unrecoverable_write_failure_poisons_log() {
        // Writes fail with ENOSPC and the device cannot be truncated
        let Ok(file) = OpenOptions::new().write(true).open("/dev/full") else {
            return;
        };
        let mut log = AuditLog {
            trail: AuditTrail::new(),
            file: Some(LogFile {
                path: PathBuf::from("/dev/full"),
                file,
                len: 0,
                poisoned: false,
            }),
        };

        assert!(log.append(AuditEvent::new(EventType::PolicyDecision)).is_err());
        assert!(log.head().is_none());

        let err = log
            .append(AuditEvent::new(EventType::PolicyDecision))
            .unwrap_err();
        assert!(err.to_string().contains("refusing to append"));
    }
}
