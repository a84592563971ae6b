//! File-backed storage for users, sessions, experiments, and GOOD
//! submissions.
//!
//! Layout under the store root:
//!
//! ```text
//! users/<id>.json          user records
//! sessions/<token>         token -> user id
//! experiments/<id>.json    experiment records
//! index/by-slug/<slug>     slug -> experiment id, claims uniqueness
//! data/<experiment>/<user>.json   GOOD submissions
//! ```

use std::{
    fs,
    io::ErrorKind,
    path::{Path, PathBuf},
    time::{SystemTime, UNIX_EPOCH},
};

use anyhow::{bail, Context, Result};
use rand::RngCore;
use serde_json::to_writer;

use crate::model::{Experiment, ExperimentInfo, GoodData, GoodSubmission, User};
use crate::validate::CreateRequest;

/// Persistent store rooted at `root`. Cheap to clone; every handle shares the
/// same directory tree and the store itself keeps no in-process state.
#[derive(Clone)]
pub struct Store {
    root: PathBuf,
}

impl Store {
    /// Create a new store rooted at `root`.
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Ensure the on-disk directory structure exists.
    pub fn init(&self) -> Result<()> {
        let dirs = ["users", "sessions", "experiments", "index/by-slug", "data"];
        for d in dirs {
            fs::create_dir_all(self.root.join(d))?;
        }
        Ok(())
    }

    fn user_path(&self, id: &str) -> PathBuf {
        self.root.join("users").join(format!("{id}.json"))
    }

    /// Write a user record, replacing any existing record with the same id.
    pub fn put_user(&self, user: &User) -> Result<()> {
        if user.id.is_empty() || user.id.contains(['/', '\\']) {
            bail!("invalid user id: {:?}", user.id);
        }
        write_json(&self.user_path(&user.id), user)
    }

    /// Look up a user by id.
    pub fn user(&self, id: &str) -> Result<Option<User>> {
        if id.contains(['/', '\\']) {
            return Ok(None);
        }
        read_json(&self.user_path(id))
    }

    /// All user records, sorted by id.
    pub fn users(&self) -> Result<Vec<User>> {
        let mut users: Vec<User> = vec![];
        for entry in fs::read_dir(self.root.join("users"))? {
            let entry = entry?;
            let data = fs::read_to_string(entry.path())?;
            users.push(serde_json::from_str(&data)?);
        }
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    /// Mint a session token for an existing user.
    pub fn create_session(&self, user_id: &str) -> Result<String> {
        if self.user(user_id)?.is_none() {
            bail!("no such user: {user_id}");
        }
        let mut buf = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut buf);
        let token = hex::encode(buf);
        fs::write(self.root.join("sessions").join(&token), user_id)?;
        Ok(token)
    }

    /// Resolve a session token to its user, if the session exists.
    pub fn session_user(&self, token: &str) -> Result<Option<User>> {
        // tokens are hex; anything else cannot name a session file
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(None);
        }
        let path = self.root.join("sessions").join(token);
        if !path.exists() {
            return Ok(None);
        }
        let id = fs::read_to_string(path)?;
        self.user(id.trim())
    }

    /// Remove a session. Returns whether the token named one.
    pub fn revoke_session(&self, token: &str) -> Result<bool> {
        if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
            return Ok(false);
        }
        let path = self.root.join("sessions").join(token);
        if !path.exists() {
            return Ok(false);
        }
        fs::remove_file(path)?;
        Ok(true)
    }

    fn experiment_path(&self, id: u64) -> PathBuf {
        self.root.join("experiments").join(format!("{id}.json"))
    }

    /// Next experiment id: one past the highest id on disk.
    fn next_experiment_id(&self) -> Result<u64> {
        let mut max = 0;
        for entry in fs::read_dir(self.root.join("experiments"))? {
            let entry = entry?;
            if let Some(stem) = entry.path().file_stem().and_then(|s| s.to_str()) {
                if let Ok(id) = stem.parse::<u64>() {
                    max = max.max(id);
                }
            }
        }
        Ok(max + 1)
    }

    /// Claim the next free experiment id with an exclusive create of its
    /// record path, so racing creations cannot assign the same id. The
    /// claimed file stays empty until the record is persisted over it.
    fn claim_experiment_id(&self) -> Result<u64> {
        let mut id = self.next_experiment_id()?;
        loop {
            match fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(self.experiment_path(id))
            {
                Ok(_) => return Ok(id),
                Err(err) if err.kind() == ErrorKind::AlreadyExists => id += 1,
                Err(err) => return Err(err).context("claiming experiment id"),
            }
        }
    }

    /// Create an experiment from a validated request.
    ///
    /// Returns `None` when the slug is already in use. Both the slug and the
    /// record id are claimed through exclusive creates before the record is
    /// written, so concurrent requests can neither share a slug nor clobber
    /// each other's records. New experiments start neither public nor active.
    pub fn create_experiment(
        &self,
        req: &CreateRequest,
        creator: &str,
    ) -> Result<Option<Experiment>> {
        if self.user(creator)?.is_none() {
            bail!("no such user: {creator}");
        }
        let slug_path = self.root.join("index/by-slug").join(&req.slug);
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&slug_path)
        {
            Ok(_) => {}
            Err(err) if err.kind() == ErrorKind::AlreadyExists => return Ok(None),
            Err(err) => return Err(err).context("claiming slug"),
        }
        let id = match self.claim_experiment_id() {
            Ok(id) => id,
            Err(err) => {
                // release the slug so it isn't leaked on a failed claim
                let _ = fs::remove_file(&slug_path);
                return Err(err);
            }
        };
        let experiment = Experiment {
            id,
            name: req.name.clone(),
            slug: req.slug.clone(),
            character: req.character.clone(),
            template: req.template.clone(),
            public: false,
            active: false,
            created_at: unix_now(),
            creator_id: creator.to_string(),
        };
        if let Err(err) = write_json(&self.experiment_path(id), &experiment) {
            // release both claims on a failed write
            let _ = fs::remove_file(&slug_path);
            let _ = fs::remove_file(self.experiment_path(id));
            return Err(err);
        }
        fs::write(&slug_path, experiment.id.to_string())?;
        Ok(Some(experiment))
    }

    /// Look up an experiment by id.
    pub fn experiment(&self, id: u64) -> Result<Option<Experiment>> {
        read_json(&self.experiment_path(id))
    }

    /// Count of GOOD submissions attached to an experiment.
    pub fn data_count(&self, id: u64) -> usize {
        fs::read_dir(self.root.join("data").join(id.to_string()))
            .map(|entries| entries.filter_map(|e| e.ok()).count())
            .unwrap_or(0)
    }

    /// Every experiment, sorted by id, joined with its creator and submission
    /// count. Experiments whose creator record is missing are skipped.
    pub fn experiments(&self) -> Result<Vec<ExperimentInfo>> {
        let mut list = vec![];
        for entry in walkdir::WalkDir::new(self.root.join("experiments")) {
            let entry = entry?;
            if !entry.file_type().is_file() {
                continue;
            }
            let data = fs::read_to_string(entry.path())?;
            if data.is_empty() {
                // id claimed by an in-flight creation; record not yet written
                continue;
            }
            let experiment: Experiment = serde_json::from_str(&data)?;
            let Some(creator) = self.user(&experiment.creator_id)? else {
                continue;
            };
            let data_count = self.data_count(experiment.id);
            list.push(ExperimentInfo {
                experiment,
                creator,
                data_count,
            });
        }
        list.sort_by_key(|info| info.experiment.id);
        Ok(list)
    }

    /// Store a GOOD submission and link it to the submitting user.
    ///
    /// One submission per user per experiment; resubmitting replaces the
    /// previous payload. Submissions start unverified and stay that way; the
    /// verify and process stages are not implemented.
    pub fn ingest_good(
        &self,
        experiment: u64,
        user_id: &str,
        data: GoodData,
    ) -> Result<GoodSubmission> {
        if data.format != "GOOD" {
            bail!("not a GOOD payload: format {:?}", data.format);
        }
        if self.experiment(experiment)?.is_none() {
            bail!("no such experiment: {experiment}");
        }
        let Some(mut user) = self.user(user_id)? else {
            bail!("no such user: {user_id}");
        };
        let submission = GoodSubmission {
            id: format!("{experiment}-{user_id}"),
            user: user_id.to_string(),
            experiment,
            verified: false,
            created_at: unix_now(),
            data,
        };
        let dir = self.root.join("data").join(experiment.to_string());
        fs::create_dir_all(&dir)?;
        write_json(&dir.join(format!("{user_id}.json")), &submission)?;
        user.good_id = Some(submission.id.clone());
        self.put_user(&user)?;
        Ok(submission)
    }
}

/// Current Unix timestamp in seconds.
fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

/// Write a JSON record atomically via a temp file in the target directory.
fn write_json<T: serde::Serialize>(path: &Path, value: &T) -> Result<()> {
    let parent = path
        .parent()
        .map(|p| p.to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."));
    fs::create_dir_all(&parent)?;
    let tmp = tempfile::NamedTempFile::new_in(&parent)?;
    to_writer(&tmp, value)?;
    tmp.persist(path)?;
    Ok(())
}

/// Read a JSON record, returning `None` when the file does not exist or is
/// an empty id claim whose record has not been written yet.
fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<Option<T>> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    if data.is_empty() {
        return Ok(None);
    }
    Ok(Some(serde_json::from_str(&data)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn store(dir: &TempDir) -> Store {
        let store = Store::new(dir.path().to_path_buf());
        store.init().unwrap();
        store
    }

    fn sample_user(id: &str, admin: bool) -> User {
        User {
            id: id.into(),
            username: format!("user-{id}"),
            tag: "1234".into(),
            avatar: String::new(),
            admin,
            good_id: None,
        }
    }

    fn sample_request(slug: &str) -> CreateRequest {
        CreateRequest {
            name: "Test".into(),
            slug: slug.into(),
            character: "Rosaria".into(),
            template: json!({"source": "Genshin Optimizer"}),
        }
    }

    fn sample_good() -> GoodData {
        GoodData {
            format: "GOOD".into(),
            version: 2,
            source: "Genshin Optimizer".into(),
            artifacts: vec![json!({"setKey": "GladiatorsFinale", "slotKey": "plume"})],
            characters: None,
            weapons: None,
        }
    }

    #[test]
    fn user_roundtrip() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        let user = sample_user("100", true);
        store.put_user(&user).unwrap();
        assert_eq!(store.user("100").unwrap(), Some(user));
        assert_eq!(store.user("999").unwrap(), None);
    }

    #[test]
    fn users_sorted_by_id() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("200", false)).unwrap();
        store.put_user(&sample_user("100", true)).unwrap();
        let users = store.users().unwrap();
        assert_eq!(users.len(), 2);
        assert_eq!(users[0].id, "100");
        assert_eq!(users[1].id, "200");
    }

    #[test]
    fn rejects_bad_user_ids() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.put_user(&sample_user("", false)).is_err());
        assert!(store.put_user(&sample_user("../escape", false)).is_err());
        assert_eq!(store.user("../escape").unwrap(), None);
    }

    #[test]
    fn session_lifecycle() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("100", false)).unwrap();
        let token = store.create_session("100").unwrap();
        assert_eq!(token.len(), 64);
        let user = store.session_user(&token).unwrap().unwrap();
        assert_eq!(user.id, "100");
        assert!(store.revoke_session(&token).unwrap());
        assert_eq!(store.session_user(&token).unwrap(), None);
        assert!(!store.revoke_session(&token).unwrap());
    }

    #[test]
    fn session_requires_existing_user() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.create_session("ghost").is_err());
    }

    #[test]
    fn bogus_tokens_resolve_to_none() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.session_user("").unwrap(), None);
        assert_eq!(store.session_user("not-hex").unwrap(), None);
        assert_eq!(store.session_user("../../users/100.json").unwrap(), None);
        assert_eq!(store.session_user(&"ab".repeat(32)).unwrap(), None);
    }

    #[test]
    fn create_experiment_assigns_sequential_ids() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("100", true)).unwrap();
        let first = store
            .create_experiment(&sample_request("one"), "100")
            .unwrap()
            .unwrap();
        let second = store
            .create_experiment(&sample_request("two"), "100")
            .unwrap()
            .unwrap();
        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert!(!first.public);
        assert!(!first.active);
        assert_eq!(first.creator_id, "100");
    }

    #[test]
    fn duplicate_slug_is_refused() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("100", true)).unwrap();
        assert!(store
            .create_experiment(&sample_request("taken"), "100")
            .unwrap()
            .is_some());
        assert!(store
            .create_experiment(&sample_request("taken"), "100")
            .unwrap()
            .is_none());
        // exactly one record exists
        assert_eq!(store.experiments().unwrap().len(), 1);
    }

    #[test]
    fn concurrent_creations_keep_every_record() {
        use std::sync::{Arc, Barrier};
        use std::thread;

        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("100", true)).unwrap();

        // distinct slugs so only the id assignment can collide
        let barrier = Arc::new(Barrier::new(8));
        let mut handles = vec![];
        for i in 0..8 {
            let store = store.clone();
            let barrier = Arc::clone(&barrier);
            handles.push(thread::spawn(move || {
                barrier.wait();
                store
                    .create_experiment(&sample_request(&format!("slug-{i}")), "100")
                    .unwrap()
                    .unwrap()
            }));
        }
        let created: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        let mut ids: Vec<_> = created.iter().map(|e| e.id).collect();
        ids.sort_unstable();
        ids.dedup();
        assert_eq!(ids.len(), 8, "every creation got a distinct id");
        // every record that was acknowledged survives on disk
        assert_eq!(store.experiments().unwrap().len(), 8);
    }

    #[test]
    fn create_experiment_requires_existing_creator() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert!(store.create_experiment(&sample_request("x"), "ghost").is_err());
    }

    #[test]
    fn experiments_join_creator_and_count() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("100", true)).unwrap();
        store.put_user(&sample_user("200", false)).unwrap();
        store
            .create_experiment(&sample_request("test-1"), "100")
            .unwrap()
            .unwrap();
        store.ingest_good(1, "200", sample_good()).unwrap();
        let list = store.experiments().unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].experiment.slug, "test-1");
        assert_eq!(list[0].creator.id, "100");
        assert_eq!(list[0].data_count, 1);
    }

    #[test]
    fn ingest_good_links_user_and_replaces() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("100", true)).unwrap();
        store.put_user(&sample_user("200", false)).unwrap();
        store
            .create_experiment(&sample_request("test-1"), "100")
            .unwrap()
            .unwrap();
        let submission = store.ingest_good(1, "200", sample_good()).unwrap();
        assert_eq!(submission.id, "1-200");
        assert!(!submission.verified);
        let user = store.user("200").unwrap().unwrap();
        assert_eq!(user.good_id.as_deref(), Some("1-200"));
        // resubmission replaces rather than duplicating
        store.ingest_good(1, "200", sample_good()).unwrap();
        assert_eq!(store.data_count(1), 1);
    }

    #[test]
    fn ingest_rejects_wrong_format() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("100", true)).unwrap();
        store
            .create_experiment(&sample_request("test-1"), "100")
            .unwrap()
            .unwrap();
        let mut bad = sample_good();
        bad.format = "NOTGOOD".into();
        assert!(store.ingest_good(1, "100", bad).is_err());
    }

    #[test]
    fn ingest_rejects_missing_experiment_or_user() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        store.put_user(&sample_user("100", true)).unwrap();
        assert!(store.ingest_good(7, "100", sample_good()).is_err());
        store
            .create_experiment(&sample_request("test-1"), "100")
            .unwrap()
            .unwrap();
        assert!(store.ingest_good(1, "ghost", sample_good()).is_err());
    }

    #[test]
    fn data_count_zero_without_submissions() {
        let dir = TempDir::new().unwrap();
        let store = store(&dir);
        assert_eq!(store.data_count(42), 0);
    }
}
