// Persistence of reviews.
//
// The scheduler never sees a store; the service loads a review, runs the
// scheduler on it and writes the whole review back. Every update carries
// the version it was read at, so two writers racing on the same review
// cannot silently overwrite each other.

use std::fs::{self, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::{Result, ReviewError};
use crate::review::Review;

pub trait ReviewStore {
    fn get_all(&self) -> Result<Vec<Review>>;

    fn get(&self, id: &str) -> Result<Review>;

    fn insert(&mut self, review: Review) -> Result<Review>;

    /// Inserts all of `reviews` or none of them.
    fn insert_many(&mut self, reviews: Vec<Review>) -> Result<Vec<Review>>;

    /// Replaces the stored review. `review.version` must match the stored
    /// version; the stored copy gets `version + 1`.
    fn update_by_id(&mut self, id: &str, review: Review) -> Result<Review>;

    fn delete_by_id(&mut self, id: &str) -> Result<()>;
}

impl<S: ReviewStore + ?Sized> ReviewStore for Box<S> {
    fn get_all(&self) -> Result<Vec<Review>> {
        (**self).get_all()
    }

    fn get(&self, id: &str) -> Result<Review> {
        (**self).get(id)
    }

    fn insert(&mut self, review: Review) -> Result<Review> {
        (**self).insert(review)
    }

    fn insert_many(&mut self, reviews: Vec<Review>) -> Result<Vec<Review>> {
        (**self).insert_many(reviews)
    }

    fn update_by_id(&mut self, id: &str, review: Review) -> Result<Review> {
        (**self).update_by_id(id, review)
    }

    fn delete_by_id(&mut self, id: &str) -> Result<()> {
        (**self).delete_by_id(id)
    }
}

/// Shared bookkeeping for the two stores: an ordered list of reviews.
#[derive(Debug, Default)]
struct Records(Vec<Review>);

impl Records {
    fn position(&self, id: &str) -> Result<usize> {
        self.0
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| ReviewError::ReviewNotFound(id.to_string()))
    }

    fn get(&self, id: &str) -> Result<Review> {
        self.position(id).map(|i| self.0[i].clone())
    }

    fn insert_many(&mut self, reviews: Vec<Review>) -> Result<Vec<Review>> {
        for (i, review) in reviews.iter().enumerate() {
            let repeated = reviews[..i].iter().any(|r| r.id == review.id);
            if repeated || self.0.iter().any(|r| r.id == review.id) {
                return Err(ReviewError::DuplicateReview(review.id.clone()));
            }
        }
        self.0.extend(reviews.iter().cloned());
        Ok(reviews)
    }

    fn update(&mut self, id: &str, mut review: Review) -> Result<Review> {
        let i = self.position(id)?;
        let stored = &self.0[i];
        if review.id != id {
            return Err(ReviewError::InvalidReview(format!(
                "cannot change id {} to {}",
                id, review.id
            )));
        }
        if review.version != stored.version {
            return Err(ReviewError::VersionConflict {
                id: id.to_string(),
                expected: review.version,
                found: stored.version,
            });
        }
        review.version += 1;
        self.0[i] = review.clone();
        Ok(review)
    }

    fn delete(&mut self, id: &str) -> Result<()> {
        let i = self.position(id)?;
        self.0.remove(i);
        Ok(())
    }
}

/// Keeps reviews in memory only.
#[derive(Debug, Default)]
pub struct MemoryStore {
    records: Records,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl ReviewStore for MemoryStore {
    fn get_all(&self) -> Result<Vec<Review>> {
        Ok(self.records.0.clone())
    }

    fn get(&self, id: &str) -> Result<Review> {
        self.records.get(id)
    }

    fn insert(&mut self, review: Review) -> Result<Review> {
        let mut inserted = self.records.insert_many(vec![review])?;
        Ok(inserted.remove(0))
    }

    fn insert_many(&mut self, reviews: Vec<Review>) -> Result<Vec<Review>> {
        self.records.insert_many(reviews)
    }

    fn update_by_id(&mut self, id: &str, review: Review) -> Result<Review> {
        self.records.update(id, review)
    }

    fn delete_by_id(&mut self, id: &str) -> Result<()> {
        self.records.delete(id)
    }
}

const LOCK_ATTEMPTS: u32 = 50;
const LOCK_RETRY: Duration = Duration::from_millis(20);

/// Exclusive right to rewrite the data file, held as a sibling `.lock`
/// file created with `create_new`. Removed on drop.
struct WriteLock {
    path: PathBuf,
}

impl WriteLock {
    fn acquire(path: PathBuf) -> Result<Self> {
        for _ in 0..LOCK_ATTEMPTS {
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(_) => return Ok(WriteLock { path }),
                Err(e) if e.kind() == io::ErrorKind::AlreadyExists => thread::sleep(LOCK_RETRY),
                Err(e) => return Err(e.into()),
            }
        }
        Err(ReviewError::StoreLocked(path))
    }
}

impl Drop for WriteLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release store lock");
        }
    }
}

/// Stores all reviews as one JSON array in a file.
///
/// Nothing is cached: every call reads the file, so several handles (a
/// running server and CLI invocations) can share it. Mutations hold the
/// write lock across read, check and write, and replace the file through
/// a sibling temp file and a rename.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    /// Opens the store, failing early if the existing file is unreadable.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let store = JsonFileStore {
            path: path.as_ref().to_path_buf(),
        };
        let reviews = store.load()?;
        info!(path = %store.path.display(), reviews = reviews.0.len(), "opened review store");
        Ok(store)
    }

    fn load(&self) -> Result<Records> {
        let content = match fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Records::default()),
            Err(e) => return Err(e.into()),
        };
        if content.trim().is_empty() {
            return Ok(Records::default());
        }
        Ok(Records(serde_json::from_str(&content)?))
    }

    /// Runs `change` on the current file contents under the write lock and
    /// saves the result. Nothing is written if `change` fails.
    fn modify<T>(&self, change: impl FnOnce(&mut Records) -> Result<T>) -> Result<T> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent)?;
        }
        let _lock = WriteLock::acquire(self.path.with_extension("json.lock"))?;
        let mut records = self.load()?;
        let out = change(&mut records)?;
        self.persist(&records.0)?;
        Ok(out)
    }

    fn persist(&self, reviews: &[Review]) -> Result<()> {
        let tmp = self.path.with_extension("json.tmp");
        {
            let mut file = fs::File::create(&tmp)?;
            serde_json::to_writer_pretty(&mut file, reviews)?;
            file.write_all(b"\n")?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &self.path)?;
        debug!(path = %self.path.display(), reviews = reviews.len(), "saved review store");
        Ok(())
    }
}

impl ReviewStore for JsonFileStore {
    fn get_all(&self) -> Result<Vec<Review>> {
        Ok(self.load()?.0)
    }

    fn get(&self, id: &str) -> Result<Review> {
        self.load()?.get(id)
    }

    fn insert(&mut self, review: Review) -> Result<Review> {
        let mut inserted = self.insert_many(vec![review])?;
        Ok(inserted.remove(0))
    }

    fn insert_many(&mut self, reviews: Vec<Review>) -> Result<Vec<Review>> {
        self.modify(|records| records.insert_many(reviews))
    }

    fn update_by_id(&mut self, id: &str, review: Review) -> Result<Review> {
        self.modify(|records| records.update(id, review))
    }

    fn delete_by_id(&mut self, id: &str) -> Result<()> {
        self.modify(|records| records.delete(id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::review::{NewReview, Priority};
    use chrono::{TimeZone, Utc};

    fn review(topic: &str) -> Review {
        Review::create(
            NewReview {
                subject_id: "chem".into(),
                topic: topic.into(),
                priority: Priority::Medium,
                suggestion: None,
                general_notes: None,
            },
            Utc.with_ymd_and_hms(2026, 1, 1, 0, 0, 0).unwrap(),
        )
        .unwrap()
    }

    fn exercise(store: &mut dyn ReviewStore) {
        let a = store.insert(review("Stoichiometry")).unwrap();
        let b = store.insert(review("Redox")).unwrap();
        assert!(matches!(
            store.insert(a.clone()),
            Err(ReviewError::DuplicateReview(_))
        ));

        let mut edited = a.clone();
        edited.topic = "Stoichiometry II".into();
        let saved = store.update_by_id(&a.id, edited.clone()).unwrap();
        assert_eq!(saved.version, 1);
        assert_eq!(store.get(&a.id).unwrap().topic, "Stoichiometry II");

        // stale copy read before the first update
        assert!(matches!(
            store.update_by_id(&a.id, edited),
            Err(ReviewError::VersionConflict {
                expected: 0,
                found: 1,
                ..
            })
        ));
        assert!(matches!(
            store.update_by_id("nope", a.clone()),
            Err(ReviewError::ReviewNotFound(_))
        ));

        store.delete_by_id(&b.id).unwrap();
        assert!(matches!(store.get(&b.id), Err(ReviewError::ReviewNotFound(_))));
        assert_eq!(store.get_all().unwrap().len(), 1);
    }

    #[test]
    fn memory_store_contract() {
        exercise(&mut MemoryStore::new());
    }

    #[test]
    fn file_store_contract() {
        let dir = tempfile::tempdir().unwrap();
        exercise(&mut JsonFileStore::open(dir.path().join("reviews.json")).unwrap());
    }

    #[test]
    fn file_store_persists_across_opens() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("reviews.json");
        let id = {
            let mut store = JsonFileStore::open(&path).unwrap();
            store.insert(review("Kinetics")).unwrap().id
        };
        let store = JsonFileStore::open(&path).unwrap();
        let loaded = store.get(&id).unwrap();
        assert_eq!(loaded.topic, "Kinetics");
        assert!(!path.with_extension("json.tmp").exists());
        assert!(!path.with_extension("json.lock").exists());
    }

    #[test]
    fn file_store_handles_see_each_others_writes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.json");
        let mut left = JsonFileStore::open(&path).unwrap();
        let mut right = JsonFileStore::open(&path).unwrap();

        let a = left.insert(review("Acids")).unwrap();
        let b = right.insert(review("Bases")).unwrap();
        assert_eq!(left.get_all().unwrap().len(), 2);

        let read_left = left.get(&a.id).unwrap();
        let read_right = right.get(&a.id).unwrap();
        left.update_by_id(&a.id, read_left).unwrap();
        assert!(matches!(
            right.update_by_id(&a.id, read_right),
            Err(ReviewError::VersionConflict {
                expected: 0,
                found: 1,
                ..
            })
        ));

        right.delete_by_id(&b.id).unwrap();
        let on_disk = JsonFileStore::open(&path).unwrap().get_all().unwrap();
        assert_eq!(on_disk.len(), 1);
        assert_eq!(on_disk[0].version, 1);
    }

    #[test]
    fn file_store_waits_for_lock_then_gives_up() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.json");
        let lock = path.with_extension("json.lock");
        let mut store = JsonFileStore::open(&path).unwrap();
        std::fs::write(&lock, "").unwrap();

        assert!(matches!(
            store.insert(review("Salts")),
            Err(ReviewError::StoreLocked(_))
        ));
        assert!(!path.exists());

        std::fs::remove_file(&lock).unwrap();
        store.insert(review("Salts")).unwrap();
        assert!(!lock.exists());
    }

    #[test]
    fn insert_many_is_all_or_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = JsonFileStore::open(dir.path().join("reviews.json")).unwrap();
        let existing = store.insert(review("Bonds")).unwrap();

        let batch = vec![review("Ions"), existing.clone()];
        assert!(matches!(
            store.insert_many(batch),
            Err(ReviewError::DuplicateReview(_))
        ));
        assert_eq!(store.get_all().unwrap().len(), 1);

        let added = store.insert_many(vec![review("Ions"), review("Orbitals")]).unwrap();
        assert_eq!(added.len(), 2);
        assert_eq!(store.get_all().unwrap().len(), 3);
    }

    #[test]
    fn file_store_treats_empty_file_as_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.json");
        std::fs::write(&path, "").unwrap();
        assert!(JsonFileStore::open(&path).unwrap().get_all().unwrap().is_empty());
    }

    #[test]
    fn file_store_rejects_malformed_cycles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("reviews.json");
        let mut json = serde_json::to_value(vec![review("Gases")]).unwrap();
        json[0]["cycles"].as_array_mut().unwrap().pop();
        std::fs::write(&path, json.to_string()).unwrap();
        assert!(matches!(
            JsonFileStore::open(&path),
            Err(ReviewError::Json(_))
        ));
    }
}
