// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.


//! Journal-backed document collection
//!
//! Documents live in memory, ordered by their time field. When opened on a
//! directory every write is also appended to `<name>.log`:
//!
//! ```text
//! +------+---------+-------------------------------------------+
//! | MLOG | version | entry | entry | entry | ...               |
//! +------+---------+-------------------------------------------+
//!   entry = type:u8 | len:u32 | json {id, document} | crc32:u32
//! ```
//!
//! Replaying the log on open rebuilds the collection. A later entry with the
//! same id supersedes earlier ones, so replacements and updates are plain
//! appends. A CRC mismatch or undecodable entry aborts the open; a torn
//! entry at the very end (crash mid-append) is cut off with a warning.

use crate::document::{Document, DocumentCollection, Filter, FindOptions, SortOrder};
use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::{BTreeMap, BTreeSet};
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Write};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, error, info, warn};

const JOURNAL_MAGIC: &[u8; 4] = b"MLOG";
const JOURNAL_VERSION: u32 = 1;
const HEADER_LEN: u64 = 8;
const ENTRY_TYPE_PUT: u8 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct JournalEntry {
    id: u64,
    document: Document,
}

/// Append target of a journal.
trait JournalFile: Write + Send + Sync {
    fn truncate(&mut self, len: u64) -> std::io::Result<()>;
    fn sync(&mut self) -> std::io::Result<()>;
}

impl JournalFile for File {
    fn truncate(&mut self, len: u64) -> std::io::Result<()> {
        self.set_len(len)
    }

    fn sync(&mut self) -> std::io::Result<()> {
        self.sync_all()
    }
}

struct Journal {
    path: PathBuf,
    file: Box<dyn JournalFile>,
    /// Length of the file up to the last entry that was fully written.
    committed_len: u64,
    /// Set when a failed append could not be rolled back.
    poisoned: bool,
}

impl Journal {
    /// Write one entry. On failure the file is cut back to the last committed
    /// entry, so a write reported as failed never comes back on replay.
    fn append(&mut self, entry: &JournalEntry) -> StorageResult<()> {
        if self.poisoned {
            return Err(StorageError::Connectivity {
                store: self.path.display().to_string(),
                reason: "journal rejected writes after a failed rollback".to_string(),
            });
        }

        let frame = encode_frame(entry)?;
        match self.file.write_all(&frame).and_then(|_| self.file.flush()) {
            Ok(()) => {
                self.committed_len += frame.len() as u64;
                Ok(())
            }
            Err(e) => {
                match self.file.truncate(self.committed_len) {
                    Ok(()) => warn!(
                        path = %self.path.display(),
                        error = %e,
                        "Journal append failed, rolled back"
                    ),
                    Err(rollback) => {
                        self.poisoned = true;
                        error!(
                            path = %self.path.display(),
                            error = %e,
                            rollback_error = %rollback,
                            "Journal append failed and could not be rolled back"
                        );
                    }
                }
                Err(e.into())
            }
        }
    }
}

/// `type | len | data | crc` for one entry.
fn encode_frame(entry: &JournalEntry) -> StorageResult<Vec<u8>> {
    let data = serde_json::to_vec(entry)?;
    let crc = crc32fast::hash(&data);
    let mut frame = Vec::with_capacity(1 + 4 + data.len() + 4);
    frame.push(ENTRY_TYPE_PUT);
    frame.extend_from_slice(&(data.len() as u32).to_le_bytes());
    frame.extend_from_slice(&data);
    frame.extend_from_slice(&crc.to_le_bytes());
    Ok(frame)
}

pub struct JournalCollection {
    name: String,
    time_field: String,
    documents: BTreeMap<u64, Document>,
    time_index: BTreeSet<(DateTime<Utc>, u64)>,
    next_id: u64,
    journal: Option<Journal>,
}

impl JournalCollection {
    /// Collection that lives only as long as the process.
    pub fn in_memory(name: impl Into<String>, time_field: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            time_field: time_field.into(),
            documents: BTreeMap::new(),
            time_index: BTreeSet::new(),
            next_id: 0,
            journal: None,
        }
    }

    /// Open or create `<dir>/<name>.log` and replay it.
    pub fn open(
        dir: impl AsRef<Path>,
        name: impl Into<String>,
        time_field: impl Into<String>,
    ) -> StorageResult<Self> {
        let mut collection = Self::in_memory(name, time_field);
        let dir = dir.as_ref();
        let path = dir.join(format!("{}.log", collection.name));

        std::fs::create_dir_all(dir).map_err(|e| StorageError::Connectivity {
            store: dir.display().to_string(),
            reason: e.to_string(),
        })?;

        if path.exists() {
            collection.replay(&path)?;
        } else {
            let mut file = File::create(&path)?;
            file.write_all(JOURNAL_MAGIC)?;
            file.write_all(&JOURNAL_VERSION.to_le_bytes())?;
            file.sync_all()?;
        }

        let file = OpenOptions::new()
            .append(true)
            .open(&path)
            .map_err(|e| StorageError::Connectivity {
                store: path.display().to_string(),
                reason: e.to_string(),
            })?;
        let committed_len = file.metadata()?.len();
        info!(
            collection = %collection.name,
            documents = collection.documents.len(),
            path = %path.display(),
            "Opened journal collection"
        );
        collection.journal = Some(Journal {
            path,
            file: Box::new(file),
            committed_len,
            poisoned: false,
        });
        Ok(collection)
    }

    pub fn path(&self) -> Option<&Path> {
        self.journal.as_ref().map(|j| j.path.as_path())
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    fn replay(&mut self, path: &Path) -> StorageResult<()> {
        let mut reader = BufReader::new(File::open(path)?);

        let mut magic = [0u8; 4];
        let mut version_bytes = [0u8; 4];
        reader
            .read_exact(&mut magic)
            .and_then(|_| reader.read_exact(&mut version_bytes))
            .map_err(|e| StorageError::decode(&self.name, format!("journal header: {e}")))?;
        if &magic != JOURNAL_MAGIC {
            return Err(StorageError::decode(&self.name, "bad journal magic"));
        }
        let version = u32::from_le_bytes(version_bytes);
        if version != JOURNAL_VERSION {
            return Err(StorageError::decode(
                &self.name,
                format!("journal version {version}, expected {JOURNAL_VERSION}"),
            ));
        }

        let file_len = std::fs::metadata(path)?.len();
        let mut valid_len = HEADER_LEN;
        let mut entries = 0usize;
        loop {
            let mut entry_type = [0u8; 1];
            match reader.read_exact(&mut entry_type) {
                Ok(()) => {}
                Err(e) if e.kind() == ErrorKind::UnexpectedEof => break,
                Err(e) => return Err(e.into()),
            }
            // Bytes left after the type byte and the length prefix.
            let remaining = file_len.saturating_sub(valid_len + 1 + 4);
            let Some(data) = read_frame(&mut reader, remaining, &self.name)? else {
                break;
            };

            if entry_type[0] != ENTRY_TYPE_PUT {
                return Err(StorageError::decode(
                    &self.name,
                    format!("unknown journal entry type {}", entry_type[0]),
                ));
            }
            let entry: JournalEntry = serde_json::from_slice(&data)
                .map_err(|e| StorageError::decode(&self.name, e))?;
            self.apply(entry.id, entry.document)?;
            self.next_id = self.next_id.max(entry.id + 1);

            valid_len += 1 + 4 + data.len() as u64 + 4;
            entries += 1;
        }

        if file_len > valid_len {
            warn!(
                collection = %self.name,
                torn_bytes = file_len - valid_len,
                "Truncating torn entry at end of journal"
            );
            OpenOptions::new().write(true).open(path)?.set_len(valid_len)?;
        }
        debug!(collection = %self.name, entries, "Replayed journal");
        Ok(())
    }

    fn time_key(&self, document: &Document) -> StorageResult<DateTime<Utc>> {
        let raw = document
            .get(&self.time_field)
            .and_then(Value::as_str)
            .ok_or_else(|| {
                StorageError::decode(&self.name, format!("missing time field {}", self.time_field))
            })?;
        DateTime::parse_from_rfc3339(raw)
            .map(|t| t.with_timezone(&Utc))
            .map_err(|e| StorageError::decode(&self.name, format!("{}: {e}", self.time_field)))
    }

    /// Install `document` under `id` in memory.
    fn apply(&mut self, id: u64, document: Document) -> StorageResult<()> {
        let key = self.time_key(&document)?;
        if let Some(previous) = self.documents.get(&id) {
            let previous_key = self.time_key(previous)?;
            self.time_index.remove(&(previous_key, id));
        }
        self.time_index.insert((key, id));
        self.documents.insert(id, document);
        Ok(())
    }

    /// Journal first, then memory. A failed append is rolled back on disk and
    /// never reaches memory.
    fn put(&mut self, id: u64, document: Document) -> StorageResult<()> {
        self.time_key(&document)?;
        if let Some(journal) = self.journal.as_mut() {
            let entry = JournalEntry { id, document };
            journal.append(&entry)?;
            return self.apply(id, entry.document);
        }
        self.apply(id, document)
    }

    /// Ids matching `filter`, ordered by time.
    fn matching_ids(&self, filter: &Filter, sort: SortOrder) -> Vec<u64> {
        let ordered: Box<dyn Iterator<Item = &(DateTime<Utc>, u64)>> = match filter {
            Filter::Time(range) if range.is_empty() => return Vec::new(),
            Filter::Time(range) => {
                let lower = match range.lower {
                    Bound::Included(t) => Bound::Included((t, u64::MIN)),
                    Bound::Excluded(t) => Bound::Excluded((t, u64::MAX)),
                    Bound::Unbounded => Bound::Unbounded,
                };
                let upper = match range.upper {
                    Bound::Included(t) => Bound::Included((t, u64::MAX)),
                    Bound::Excluded(t) => Bound::Excluded((t, u64::MIN)),
                    Bound::Unbounded => Bound::Unbounded,
                };
                let range = self.time_index.range((lower, upper));
                match sort {
                    SortOrder::Ascending => Box::new(range),
                    SortOrder::Descending => Box::new(range.rev()),
                }
            }
            Filter::All | Filter::Field { .. } => match sort {
                SortOrder::Ascending => Box::new(self.time_index.iter()),
                SortOrder::Descending => Box::new(self.time_index.iter().rev()),
            },
        };

        ordered
            .map(|(_, id)| *id)
            .filter(|id| match filter {
                Filter::Field { name, value } => self
                    .documents
                    .get(id)
                    .and_then(|doc| doc.get(name))
                    .is_some_and(|v| v == value),
                _ => true,
            })
            .collect()
    }
}

/// Read `len | data | crc` after the type byte. `None` means the frame was
/// cut short by the end of the file. A length running past the `remaining`
/// bytes is treated the same way, before anything is allocated for it.
fn read_frame(
    reader: &mut impl Read,
    remaining: u64,
    collection: &str,
) -> StorageResult<Option<Vec<u8>>> {
    let mut len_bytes = [0u8; 4];
    if reader.read_exact(&mut len_bytes).is_err() {
        return Ok(None);
    }
    let len = u64::from(u32::from_le_bytes(len_bytes));
    if len + 4 > remaining {
        return Ok(None);
    }
    let mut data = vec![0u8; len as usize];
    if reader.read_exact(&mut data).is_err() {
        return Ok(None);
    }
    let mut crc_bytes = [0u8; 4];
    if reader.read_exact(&mut crc_bytes).is_err() {
        return Ok(None);
    }
    let stored = u32::from_le_bytes(crc_bytes);
    let computed = crc32fast::hash(&data);
    if stored != computed {
        return Err(StorageError::decode(
            collection,
            format!("CRC mismatch: stored {stored:#010x}, computed {computed:#010x}"),
        ));
    }
    Ok(Some(data))
}

impl DocumentCollection for JournalCollection {
    fn name(&self) -> &str {
        &self.name
    }

    fn count(&self, filter: &Filter) -> StorageResult<u64> {
        let count = match filter {
            Filter::All => self.documents.len(),
            _ => self.matching_ids(filter, SortOrder::Ascending).len(),
        };
        Ok(count as u64)
    }

    fn find(&self, filter: &Filter, options: &FindOptions) -> StorageResult<Vec<Document>> {
        let ids = self.matching_ids(filter, options.sort);
        let limit = options.limit.unwrap_or(usize::MAX);
        Ok(ids
            .into_iter()
            .take(limit)
            .filter_map(|id| self.documents.get(&id).cloned())
            .collect())
    }

    fn insert_one(&mut self, document: Document) -> StorageResult<()> {
        let id = self.next_id;
        self.put(id, document)?;
        self.next_id += 1;
        Ok(())
    }

    fn find_one_and_replace(
        &mut self,
        filter: &Filter,
        document: Document,
        upsert: bool,
    ) -> StorageResult<Option<Document>> {
        match self.matching_ids(filter, SortOrder::Ascending).first().copied() {
            Some(id) => {
                let previous = self.documents.get(&id).cloned();
                self.put(id, document)?;
                Ok(previous)
            }
            None if upsert => {
                self.insert_one(document)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    fn find_one_and_update(
        &mut self,
        filter: &Filter,
        patch: &Map<String, Value>,
    ) -> StorageResult<Option<Document>> {
        let Some(id) = self.matching_ids(filter, SortOrder::Ascending).first().copied() else {
            return Ok(None);
        };
        let Some(mut updated) = self.documents.get(&id).cloned() else {
            return Ok(None);
        };
        if let Some(fields) = updated.as_object_mut() {
            for (key, value) in patch {
                fields.insert(key.clone(), value.clone());
            }
        }
        self.put(id, updated.clone())?;
        Ok(Some(updated))
    }

    fn flush(&mut self) -> StorageResult<()> {
        if let Some(journal) = self.journal.as_mut() {
            journal.file.flush()?;
            journal.file.sync()?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::TimeRange;
    use chrono::{Duration, TimeZone};
    use parking_lot::Mutex;
    use proptest::prelude::*;
    use serde_json::json;
    use std::sync::Arc;
    use tempfile::TempDir;

    fn t(hour: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, hour, 0, 0).unwrap()
    }

    fn doc(hour: u32, value: i64) -> Document {
        json!({ "time": t(hour).to_rfc3339(), "value": value })
    }

    #[test]
    fn test_range_queries_and_sort() {
        let mut collection = JournalCollection::in_memory("hourly", "time");
        for hour in [3, 1, 2, 5] {
            collection.insert_one(doc(hour, i64::from(hour))).unwrap();
        }

        let range = Filter::Time(TimeRange::new(&t(1), &t(3), false, true));
        assert_eq!(collection.count(&range).unwrap(), 2);

        let found = collection.find(&range, &FindOptions::default()).unwrap();
        assert_eq!(found[0]["value"], 2);
        assert_eq!(found[1]["value"], 3);

        let newest = collection
            .find(&Filter::All, &FindOptions::descending().limit(1))
            .unwrap();
        assert_eq!(newest[0]["value"], 5);
    }

    #[test]
    fn test_replace_with_upsert() {
        let mut collection = JournalCollection::in_memory("hourly", "time");
        let exact = Filter::exact_time(&t(4));

        let first = collection.find_one_and_replace(&exact, doc(4, 10), true).unwrap();
        assert!(first.is_none());

        let second = collection.find_one_and_replace(&exact, doc(4, 11), true).unwrap();
        assert_eq!(second.unwrap()["value"], 10);
        assert_eq!(collection.count(&exact).unwrap(), 1);

        let missing = Filter::exact_time(&t(9));
        assert!(collection
            .find_one_and_replace(&missing, doc(9, 1), false)
            .unwrap()
            .is_none());
        assert_eq!(collection.count(&missing).unwrap(), 0);
    }

    #[test]
    fn test_update_by_field() {
        let mut collection = JournalCollection::in_memory("alerts", "time");
        collection
            .insert_one(json!({ "time": t(1).to_rfc3339(), "id": 7, "flag": false }))
            .unwrap();

        let mut patch = Map::new();
        patch.insert("flag".to_string(), json!(true));
        let updated = collection
            .find_one_and_update(&Filter::field("id", 7), &patch)
            .unwrap()
            .unwrap();
        assert_eq!(updated["flag"], true);
        assert!(collection
            .find_one_and_update(&Filter::field("id", 8), &patch)
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_document_without_time_is_rejected() {
        let mut collection = JournalCollection::in_memory("raw", "time");
        let err = collection.insert_one(json!({ "value": 1 })).unwrap_err();
        assert!(matches!(err, StorageError::Decode { .. }));
        assert!(collection.is_empty());
    }

    #[test]
    fn test_journal_replay_keeps_latest_version() {
        let dir = TempDir::new().unwrap();
        {
            let mut collection = JournalCollection::open(dir.path(), "hourly", "time").unwrap();
            collection.insert_one(doc(1, 1)).unwrap();
            collection.insert_one(doc(2, 2)).unwrap();
            collection
                .find_one_and_replace(&Filter::exact_time(&t(1)), doc(1, 100), true)
                .unwrap();
            collection.flush().unwrap();
        }

        let reopened = JournalCollection::open(dir.path(), "hourly", "time").unwrap();
        assert_eq!(reopened.len(), 2);
        let found = reopened
            .find(&Filter::exact_time(&t(1)), &FindOptions::default())
            .unwrap();
        assert_eq!(found[0]["value"], 100);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let dir = TempDir::new().unwrap();
        {
            let mut collection = JournalCollection::open(dir.path(), "raw", "time").unwrap();
            collection.insert_one(doc(1, 1)).unwrap();
        }
        let path = dir.path().join("raw.log");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[ENTRY_TYPE_PUT, 200, 0]).unwrap();
        drop(file);

        let mut reopened = JournalCollection::open(dir.path(), "raw", "time").unwrap();
        assert_eq!(reopened.len(), 1);
        reopened.insert_one(doc(2, 2)).unwrap();
        drop(reopened);

        let again = JournalCollection::open(dir.path(), "raw", "time").unwrap();
        assert_eq!(again.len(), 2);
    }

    #[test]
    fn test_corrupt_entry_fails_open() {
        let dir = TempDir::new().unwrap();
        {
            let mut collection = JournalCollection::open(dir.path(), "raw", "time").unwrap();
            collection.insert_one(doc(1, 1)).unwrap();
        }
        let path = dir.path().join("raw.log");
        let mut bytes = std::fs::read(&path).unwrap();
        let middle = HEADER_LEN as usize + 10;
        bytes[middle] ^= 0xff;
        std::fs::write(&path, bytes).unwrap();

        let err = JournalCollection::open(dir.path(), "raw", "time").err().unwrap();
        assert!(matches!(err, StorageError::Decode { .. }));
    }

    #[test]
    fn test_times_with_same_instant_keep_insertion_order() {
        let mut collection = JournalCollection::in_memory("alerts", "time");
        collection.insert_one(doc(1, 1)).unwrap();
        collection.insert_one(doc(1, 2)).unwrap();
        collection
            .insert_one(json!({ "time": (t(1) + Duration::seconds(1)).to_rfc3339(), "value": 3 }))
            .unwrap();

        let found = collection.find(&Filter::All, &FindOptions::default()).unwrap();
        let values: Vec<_> = found.iter().map(|d| d["value"].as_i64().unwrap()).collect();
        assert_eq!(values, vec![1, 2, 3]);
    }

    #[test]
    fn test_oversized_length_prefix_is_cut_without_allocating() {
        let dir = TempDir::new().unwrap();
        {
            let mut collection = JournalCollection::open(dir.path(), "raw", "time").unwrap();
            collection.insert_one(doc(1, 1)).unwrap();
        }
        let path = dir.path().join("raw.log");
        let mut file = OpenOptions::new().append(true).open(&path).unwrap();
        file.write_all(&[ENTRY_TYPE_PUT, 0xff, 0xff, 0xff, 0xff, 1, 2, 3]).unwrap();
        drop(file);
        let good_len = std::fs::metadata(&path).unwrap().len() - 8;

        let reopened = JournalCollection::open(dir.path(), "raw", "time").unwrap();
        assert_eq!(reopened.len(), 1);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), good_len);
    }

    /// In-memory journal file that starts failing once it holds `limit` bytes.
    #[derive(Clone, Default)]
    struct LimitedFile {
        bytes: Arc<Mutex<Vec<u8>>>,
        limit: Arc<Mutex<Option<usize>>>,
    }

    impl Write for LimitedFile {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            let mut bytes = self.bytes.lock();
            let room = match *self.limit.lock() {
                Some(limit) => limit.saturating_sub(bytes.len()),
                None => buf.len(),
            };
            if room == 0 {
                return Err(std::io::Error::new(ErrorKind::Other, "no space left on device"));
            }
            let n = room.min(buf.len());
            bytes.extend_from_slice(&buf[..n]);
            Ok(n)
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    impl JournalFile for LimitedFile {
        fn truncate(&mut self, len: u64) -> std::io::Result<()> {
            self.bytes.lock().truncate(len as usize);
            Ok(())
        }

        fn sync(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_failed_append_is_rolled_back() {
        let file = LimitedFile::default();
        {
            let mut bytes = file.bytes.lock();
            bytes.extend_from_slice(JOURNAL_MAGIC);
            bytes.extend_from_slice(&JOURNAL_VERSION.to_le_bytes());
        }
        let mut collection = JournalCollection::in_memory("hourly", "time");
        collection.journal = Some(Journal {
            path: PathBuf::from("hourly.log"),
            file: Box::new(file.clone()),
            committed_len: HEADER_LEN,
            poisoned: false,
        });

        collection.insert_one(doc(1, 1)).unwrap();
        let committed = file.bytes.lock().len();

        // Room for part of the next frame only.
        *file.limit.lock() = Some(committed + 10);
        let exact = Filter::exact_time(&t(1));
        assert!(collection.find_one_and_replace(&exact, doc(1, 99), true).is_err());
        assert!(collection.insert_one(doc(2, 2)).is_err());
        assert_eq!(file.bytes.lock().len(), committed);
        assert_eq!(collection.len(), 1);

        *file.limit.lock() = None;
        collection.insert_one(doc(3, 3)).unwrap();

        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("hourly.log"), file.bytes.lock().as_slice()).unwrap();
        let reopened = JournalCollection::open(dir.path(), "hourly", "time").unwrap();
        assert_eq!(reopened.len(), 2);
        let first = reopened.find(&exact, &FindOptions::default()).unwrap();
        assert_eq!(first[0]["value"], 1);
        assert_eq!(reopened.count(&Filter::exact_time(&t(2))).unwrap(), 0);
    }

    #[test]
    fn test_journal_rejects_writes_after_failed_rollback() {
        struct BrokenFile;

        impl Write for BrokenFile {
            fn write(&mut self, _: &[u8]) -> std::io::Result<usize> {
                Err(std::io::Error::new(ErrorKind::Other, "device gone"))
            }

            fn flush(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        impl JournalFile for BrokenFile {
            fn truncate(&mut self, _: u64) -> std::io::Result<()> {
                Err(std::io::Error::new(ErrorKind::Other, "device gone"))
            }

            fn sync(&mut self) -> std::io::Result<()> {
                Ok(())
            }
        }

        let mut collection = JournalCollection::in_memory("raw", "time");
        collection.journal = Some(Journal {
            path: PathBuf::from("raw.log"),
            file: Box::new(BrokenFile),
            committed_len: HEADER_LEN,
            poisoned: false,
        });

        assert!(matches!(collection.insert_one(doc(1, 1)), Err(StorageError::Io(_))));
        assert!(matches!(
            collection.insert_one(doc(2, 2)),
            Err(StorageError::Connectivity { .. })
        ));
        assert!(collection.is_empty());
    }

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 6, 10, 0, 0, 0).unwrap()
    }

    proptest! {
        #[test]
        fn prop_time_range_matches_linear_scan(
            minutes in prop::collection::vec(0i64..120, 0..40),
            lower in 0i64..120,
            width in 0i64..60,
            lower_inclusive in any::<bool>(),
            upper_inclusive in any::<bool>(),
        ) {
            let mut collection = JournalCollection::in_memory("raw", "time");
            for (i, m) in minutes.iter().enumerate() {
                let time = base() + Duration::minutes(*m);
                collection
                    .insert_one(json!({ "time": time.to_rfc3339(), "value": i }))
                    .unwrap();
            }

            let range = TimeRange::new(
                &(base() + Duration::minutes(lower)),
                &(base() + Duration::minutes(lower + width)),
                lower_inclusive,
                upper_inclusive,
            );
            let indexed = collection.matching_ids(&Filter::Time(range.clone()), SortOrder::Ascending);

            let mut scanned: Vec<(DateTime<Utc>, u64)> = collection
                .documents
                .iter()
                .map(|(id, doc)| (collection.time_key(doc).unwrap(), *id))
                .filter(|(time, _)| range.contains(time))
                .collect();
            scanned.sort();
            let scanned: Vec<u64> = scanned.into_iter().map(|(_, id)| id).collect();

            prop_assert_eq!(indexed, scanned);
        }
    }
}
