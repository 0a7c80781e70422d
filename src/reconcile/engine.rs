//! The reconciliation state machine.
//!
//! [`Reconciler::step`] performs one bounded slice of work and returns, so the
//! engine can be driven from any loop. States advance
//! `Init → Prep → ProcessFilenames → Process → Finish`:
//!
//! - **Init** opens a write batch on the database and, for destructive modes,
//!   on a new database that replaces it at Finish.
//! - **Prep** starts the candidate source for the mode.
//! - **ProcessFilenames** classifies up to `filename_batch` candidates per tick
//!   while the job queue has room, then processes one job.
//! - **Process** drains the queue one job per tick.
//! - **Finish** commits, swaps databases if needed and reports the counters.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use sqlx::{Sqlite, SqliteConnection, SqlitePool, Transaction};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use super::counters::{Counter, Counters};
use super::mode::{Mode, Source};
use super::protocol::{ControlMessage, ProgressMessage};
use super::queue::{Job, JobQueue};
use crate::config::Config;
use crate::db;
use crate::error::{Error, Result, ResultExt};
use crate::itunes::ItunesSource;
use crate::metadata::{LoftyTags, TagReader, TagWriter, WriteFlags};
use crate::model::{Song, TagKey};
use crate::organizer::{self, OrgPath, Platform, Sanitizer, path_to_uri};
use crate::reference::ReferenceData;
use crate::scanner::{Candidate, Classifier, DbSource, FsSource, SkipReason};

/// Records fetched per database page.
const DB_PAGE_SIZE: u32 = 200;

/// Where and how a run operates.
#[derive(Debug, Clone)]
pub struct ReconcileOptions {
    pub mode: Mode,
    pub music_dir: PathBuf,
    pub database_path: PathBuf,
    /// Scan this directory instead of the music directory.
    pub scan_dir: Option<PathBuf>,
    pub platform: Platform,
}

/// External services the engine reads and writes through.
#[derive(Clone)]
pub struct Collaborators {
    pub reader: Arc<dyn TagReader>,
    pub writer: Arc<dyn TagWriter>,
    pub itunes: Arc<dyn ItunesSource>,
}

impl Collaborators {
    /// Tag access through lofty.
    pub fn lofty(itunes: Arc<dyn ItunesSource>) -> Self {
        let tags = Arc::new(LoftyTags);
        Self {
            reader: tags.clone(),
            writer: tags,
            itunes,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Init,
    Prep,
    ProcessFilenames,
    Process,
    Finish,
    Done,
}

/// Result of one [`Reconciler::step`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Continue,
    Done,
}

/// One database held in a single write transaction for the whole run.
struct DbBatch {
    pool: SqlitePool,
    tx: Transaction<'static, Sqlite>,
    path: PathBuf,
}

impl DbBatch {
    async fn open(path: &Path) -> Result<Self> {
        let pool = db::init_db(path)
            .await
            .with_context(format!("opening database {}", path.display()))?;
        let tx = pool.begin().await?;
        Ok(Self {
            pool,
            tx,
            path: path.to_path_buf(),
        })
    }

    async fn commit(self) -> Result<()> {
        self.tx
            .commit()
            .await
            .with_context(format!("committing {}", self.path.display()))?;
        self.pool.close().await;
        Ok(())
    }

    /// Roll back, close and delete the database file.
    async fn discard(self) -> Result<()> {
        self.tx.rollback().await?;
        self.pool.close().await;
        remove_if_exists(&self.path)
    }
}

fn conn(batch: &mut Option<DbBatch>) -> Result<&mut SqliteConnection> {
    batch
        .as_mut()
        .map(|b| &mut *b.tx)
        .ok_or(Error::Database(sqlx::Error::PoolClosed))
}

fn remove_if_exists(path: &Path) -> Result<()> {
    match std::fs::remove_file(path) {
        Err(e) if e.kind() != std::io::ErrorKind::NotFound => {
            Err(Error::Io(e).context(format!("removing {}", path.display())))
        }
        _ => Ok(()),
    }
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

/// `path` relative to `root`, `/`-separated.
fn relative_to(path: &Path, root: &Path) -> String {
    match path.strip_prefix(root) {
        Ok(relative) => path_to_uri(relative),
        Err(_) => path_to_uri(path),
    }
}

/// A generated path is unusable when its file name has no stem.
fn is_usable(relative: &str) -> bool {
    relative
        .rsplit('/')
        .next()
        .is_some_and(|name| !name.is_empty() && !name.starts_with('.'))
}

enum CandidateSource {
    Fs(FsSource),
    Db(DbSource),
}

impl CandidateSource {
    fn total(&self) -> usize {
        match self {
            CandidateSource::Fs(fs) => fs.total(),
            CandidateSource::Db(db) => db.total(),
        }
    }
}

/// Keeps the song database in step with the files on disk.
pub struct Reconciler {
    mode: Mode,
    music_dir: PathBuf,
    database_path: PathBuf,
    scan_dir: Option<PathBuf>,
    root: PathBuf,
    auto_organize: bool,
    filename_batch: usize,
    org: OrgPath,
    bypass_org: Option<OrgPath>,
    refs: ReferenceData,
    classifier: Classifier,
    collaborators: Collaborators,
    progress: mpsc::UnboundedSender<ProgressMessage>,

    state: RunState,
    counters: Counters,
    queue: JobQueue,
    primary: Option<DbBatch>,
    target: Option<DbBatch>,
    source: Option<CandidateSource>,
    total: usize,
    /// Location of the last record copied by compact.
    last_key: Option<String>,
    /// Next id for records compact adds.
    next_id: Option<i64>,
    reported: f64,
    stopped: bool,
}

impl Reconciler {
    /// Compile the templates and classification rules for a run.
    pub fn new(
        options: ReconcileOptions,
        config: &Config,
        collaborators: Collaborators,
        progress: mpsc::UnboundedSender<ProgressMessage>,
    ) -> Result<Self> {
        let sanitizer = Sanitizer::new(options.platform);
        let org = OrgPath::compile_with(&config.library.org_path, sanitizer)?;
        let bypass_org = match &config.library.bypass_org_path {
            Some(template) if org.has_bypass() => Some(OrgPath::compile_with(template, sanitizer)?),
            _ => None,
        };
        let classifier = Classifier::new(&config.library, &options.music_dir, options.platform)?;

        Ok(Self {
            mode: options.mode,
            root: options.music_dir.clone(),
            music_dir: options.music_dir,
            database_path: options.database_path,
            scan_dir: options.scan_dir,
            auto_organize: config.library.auto_organize,
            filename_batch: config.reconcile.filename_batch.max(1),
            org,
            bypass_org,
            refs: config.reference.clone(),
            classifier,
            collaborators,
            progress,
            state: RunState::Init,
            counters: Counters::new(),
            queue: JobQueue::new(config.reconcile.queue_limit),
            primary: None,
            target: None,
            source: None,
            total: 0,
            last_key: None,
            next_id: None,
            reported: 0.0,
            stopped: false,
        })
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    pub fn counters(&self) -> &Counters {
        &self.counters
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    /// React to a message from the managing process.
    pub fn handle_control(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Handshake => debug!(target: "reconcile", "Handshake"),
            ControlMessage::ExitRequest | ControlMessage::StopRequest => self.request_stop(),
        }
    }

    /// Stop enumerating. Jobs already queued are still processed.
    pub fn request_stop(&mut self) {
        if self.stopped {
            return;
        }
        info!(target: "reconcile", queued = self.queue.len(), "Stop requested");
        self.stopped = true;
        self.queue.close();
        self.source = None;
    }

    /// Do one slice of work.
    ///
    /// # Errors
    ///
    /// Fails when a database cannot be opened, read, committed or swapped into
    /// place. The failure is reported on the progress channel first and the
    /// run is over.
    pub async fn step(&mut self) -> Result<Step> {
        let result = match self.state {
            RunState::Init => self.init().await,
            RunState::Prep => self.prep().await,
            RunState::ProcessFilenames => self.process_filenames().await,
            RunState::Process => {
                self.process().await;
                Ok(())
            }
            RunState::Finish => self.finish().await,
            RunState::Done => return Ok(Step::Done),
        };

        if let Err(e) = result {
            warn!(target: "reconcile", error = %e, "Reconciliation failed");
            self.send(ProgressMessage::Status(format!("Failed: {e}")));
            self.send(ProgressMessage::Finish);
            self.state = RunState::Done;
            return Err(e);
        }

        Ok(match self.state {
            RunState::Done => Step::Done,
            _ => Step::Continue,
        })
    }

    fn send(&self, message: ProgressMessage) {
        if self.progress.send(message).is_err() {
            debug!(target: "reconcile", "Progress receiver closed");
        }
    }

    fn new_database_path(&self) -> PathBuf {
        with_suffix(&self.database_path, ".new")
    }

    async fn init(&mut self) -> Result<()> {
        info!(
            target: "reconcile",
            mode = %self.mode,
            music_dir = %self.music_dir.display(),
            database = %self.database_path.display(),
            "Starting reconciliation"
        );

        if self.mode.is_destructive() {
            let new_path = self.new_database_path();
            remove_if_exists(&new_path)?;
            remove_if_exists(&with_suffix(&new_path, "-journal"))?;
            self.target = Some(DbBatch::open(&new_path).await?);
        }
        self.primary = Some(DbBatch::open(&self.database_path).await?);

        self.state = RunState::Prep;
        Ok(())
    }

    async fn prep(&mut self) -> Result<()> {
        self.root = self.scan_dir.clone().unwrap_or_else(|| self.music_dir.clone());

        if matches!(self.mode, Mode::Compact { .. }) {
            self.next_id = Some(db::max_song_id(conn(&mut self.primary)?).await? + 1);
        }

        if !self.stopped {
            let source = match self.mode.source() {
                Source::Filesystem => CandidateSource::Fs(FsSource::walk(self.root.clone()).await?),
                Source::Database(order) => CandidateSource::Db(
                    DbSource::open(conn(&mut self.primary)?, order, DB_PAGE_SIZE).await?,
                ),
            };
            self.total = source.total();
            self.source = Some(source);
        }

        info!(
            target: "reconcile",
            root = %self.root.display(),
            total = self.total,
            "Prepared candidates"
        );
        self.send(ProgressMessage::Progress(0.0));
        self.state = RunState::ProcessFilenames;
        Ok(())
    }

    async fn process_filenames(&mut self) -> Result<()> {
        let mut pulled = 0;
        while pulled < self.filename_batch && self.queue.has_room() {
            let Some(candidate) = self.next_candidate().await? else {
                self.source = None;
                break;
            };
            pulled += 1;
            self.classify(candidate).await?;
        }

        if self.source.is_none() {
            debug!(target: "reconcile", found = self.counters.get(Counter::Found), "Candidates exhausted");
            self.state = RunState::Process;
        }

        self.process_one().await;
        self.report_progress();
        Ok(())
    }

    async fn next_candidate(&mut self) -> Result<Option<Candidate>> {
        match self.source.as_mut() {
            None => Ok(None),
            Some(CandidateSource::Fs(fs)) => Ok(fs.next(&self.music_dir)),
            Some(CandidateSource::Db(source)) => {
                source.next(conn(&mut self.primary)?, &self.music_dir).await
            }
        }
    }

    /// Settle a candidate now or queue it.
    async fn classify(&mut self, candidate: Candidate) -> Result<()> {
        let Candidate {
            full_path,
            key,
            record,
        } = candidate;
        self.counters.incr(Counter::Found);
        let from_filesystem = record.is_none();

        if let Some(reason) = self.classifier.skip_reason(&full_path, from_filesystem) {
            debug!(target: "reconcile", path = %full_path.display(), ?reason, "Skipping");
            self.counters.skip(match reason {
                SkipReason::NonAudio => Counter::SkipNonAudio,
                SkipReason::OriginalBackup => Counter::SkipOrigBackup,
                SkipReason::MarkedDeleted => Counter::SkipDeleted,
                SkipReason::LegacyDir => Counter::SkipLegacyDir,
            });
            return Ok(());
        }

        if !from_filesystem && !full_path.exists() {
            debug!(target: "reconcile", path = %full_path.display(), "File missing");
            self.counters.skip(Counter::Missing);
            return Ok(());
        }

        let existing = match (self.mode, record) {
            (Mode::Rebuild, _) => None,
            (_, Some(record)) => Some(record),
            (_, None) => db::get_song_by_uri(conn(&mut self.primary)?, &key).await?,
        };

        if let Some(song) = &existing {
            self.counters.incr(Counter::AlreadyInDb);
            match self.mode {
                Mode::CheckNew => {
                    self.counters.incr(Counter::Processed);
                    return Ok(());
                }
                Mode::Compact { .. } => {
                    let song = song.clone();
                    self.copy_record(song).await;
                    return Ok(());
                }
                _ => {}
            }
        }

        if self.classifier.is_bad_filename(&full_path) {
            warn!(target: "reconcile", path = %full_path.display(), "Bad filename");
            self.counters.skip(Counter::BadFilename);
            return Ok(());
        }

        let job = Job {
            relative_path: relative_to(&full_path, &self.root),
            full_path,
            db_key: key,
            existing,
        };
        if self.queue.push(job) {
            self.counters.incr(Counter::Queued);
            self.counters
                .record_max(Counter::QueueHighWater, self.queue.high_water() as u64);
        }
        Ok(())
    }

    /// Copy a stored record into the new database, dropping consecutive
    /// duplicates.
    async fn copy_record(&mut self, song: Song) {
        if self.last_key.as_deref() == Some(song.uri.as_str()) {
            debug!(target: "reconcile", uri = %song.uri, id = ?song.id, "Dropping duplicate record");
            self.counters.incr(Counter::Processed);
            return;
        }
        self.last_key = Some(song.uri.clone());

        let result = match self.target.as_mut() {
            Some(target) => db::insert_song(&mut target.tx, &song).await,
            None => Err(sqlx::Error::PoolClosed),
        };
        if let Err(e) = result {
            warn!(target: "reconcile", uri = %song.uri, error = %e, "Failed to copy record");
            self.counters.incr(Counter::Bad);
        }
        self.counters.incr(Counter::Processed);
    }

    async fn process(&mut self) {
        if self.queue.is_empty() {
            let found = self.counters.get(Counter::Found);
            if !self.stopped && self.counters.settled() < found {
                warn!(
                    target: "reconcile",
                    found,
                    settled = self.counters.settled(),
                    "Candidates left unsettled"
                );
            }
            self.state = RunState::Finish;
            return;
        }
        self.process_one().await;
        self.report_progress();
    }

    async fn process_one(&mut self) {
        let Some(job) = self.queue.pop() else {
            return;
        };
        match self.mode {
            Mode::WriteTags => self.write_tags(job),
            Mode::UpdateFromItunes => self.update_from_itunes(job).await,
            Mode::Reorganize => self.reorganize(job).await,
            Mode::Rebuild | Mode::CheckNew | Mode::Compact { .. } | Mode::UpdateFromTags => {
                self.update_from_file(job).await
            }
        }
    }

    /// Read the file's tags into its record.
    async fn update_from_file(&mut self, job: Job) {
        let parsed = match self.collaborators.reader.parse_tags(&job.full_path) {
            Ok(parsed) if !parsed.is_empty() => parsed,
            Ok(_) => {
                debug!(target: "reconcile", path = %job.full_path.display(), "No audio data");
                self.counters.skip(Counter::NoTags);
                return;
            }
            Err(e) => {
                warn!(target: "reconcile", path = %job.full_path.display(), error = %e, "Failed to read tags");
                self.counters.skip(Counter::NoTags);
                return;
            }
        };

        let existing = match self.mode {
            Mode::Rebuild => None,
            _ => job.existing.as_ref(),
        };
        let mut song = match existing {
            Some(existing) => Song {
                uri: job.db_key.clone(),
                ..existing.clone()
            },
            None => Song::new(job.db_key.clone()),
        };
        song.tags = parsed.tags;
        self.fill_derived(&mut song, &job.relative_path);

        if self.auto_organize && self.mode.allows_autorename() {
            let bypass = self.bypass_value(&job.relative_path);
            self.rename(&mut song, &job.full_path, bypass.as_deref(), false);
        }

        if existing != Some(&song) {
            self.store(song, existing.is_some()).await;
        }
        self.counters.incr(Counter::Processed);
    }

    /// Fill fields the tags left empty: dance from genre, the default dance
    /// level, then anything the template can read from the path.
    fn fill_derived(&mut self, song: &mut Song, relative: &str) {
        if song.get(TagKey::Dance).is_none() {
            let dance = song
                .get(TagKey::Genre)
                .and_then(|genre| self.refs.genre_to_dance(genre))
                .map(str::to_string);
            if let Some(dance) = dance {
                song.set(TagKey::Dance, dance);
            }
        }

        if song.get(TagKey::DanceLevel).is_none() && !self.refs.default_dance_level().is_empty() {
            song.set(TagKey::DanceLevel, self.refs.default_dance_level());
        }

        let org = self.bypass_org.as_mut().unwrap_or(&mut self.org);
        for key in org.tag_keys() {
            if song.get(key).is_none()
                && let Some(value) = org.extract(relative, key)
            {
                song.set(key, value);
            }
        }
    }

    fn bypass_value(&mut self, relative: &str) -> Option<String> {
        if !self.org.has_bypass() {
            return None;
        }
        self.bypass_org
            .as_mut()
            .unwrap_or(&mut self.org)
            .extract_bypass(relative)
    }

    /// Move the file to its organized location and point the record at it.
    fn rename(&mut self, song: &mut Song, full_path: &Path, bypass: Option<&str>, force: bool) {
        if song.prevent_rename && !force {
            return;
        }

        let relative = self.org.generate(song, bypass, &self.refs);
        if !is_usable(&relative) {
            warn!(target: "reconcile", uri = %song.uri, "Generated an empty path");
            self.counters.incr(Counter::Bad);
            return;
        }
        if relative == song.uri {
            return;
        }

        match organizer::organize_file(full_path, &self.music_dir, &relative) {
            Ok(dest) => {
                debug!(target: "organizer", from = %song.uri, to = %dest.display(), "Renamed");
                song.uri = relative;
                self.counters.incr(Counter::Renamed);
            }
            Err(e) => {
                warn!(target: "organizer", uri = %song.uri, error = %e, "Rename failed");
                self.counters.incr(Counter::RenameFailed);
            }
        }
    }

    /// Write a record to the run's target database.
    async fn store(&mut self, mut song: Song, existed: bool) {
        let result = match (self.target.as_mut(), self.primary.as_mut()) {
            (Some(target), _) => {
                if song.id.is_none()
                    && let Some(next) = self.next_id.as_mut()
                {
                    song.id = Some(*next);
                    *next += 1;
                }
                db::insert_song(&mut target.tx, &song)
                    .await
                    .map(db::Saved::Inserted)
            }
            (None, Some(primary)) => db::save_song(&mut primary.tx, &song).await,
            (None, None) => Err(sqlx::Error::PoolClosed),
        };

        match result {
            Ok(_) if existed => self.counters.incr(Counter::Updated),
            Ok(_) => self.counters.incr(Counter::New),
            Err(e) => {
                warn!(target: "db", uri = %song.uri, error = %e, "Failed to store song");
                self.counters.incr(Counter::Bad);
            }
        }
    }

    /// Make the file's tags match its database record.
    fn write_tags(&mut self, job: Job) {
        let Some(song) = job.existing else {
            self.counters.incr(Counter::Processed);
            return;
        };

        let parsed = match self.collaborators.reader.parse_tags(&job.full_path) {
            Ok(parsed) => parsed,
            Err(e) => {
                warn!(target: "reconcile", path = %job.full_path.display(), error = %e, "Failed to read tags");
                self.counters.skip(Counter::NoTags);
                return;
            }
        };

        let flags = if parsed.needs_rewrite {
            WriteFlags::FULL_REWRITE
        } else {
            WriteFlags::empty()
        };
        match self
            .collaborators
            .writer
            .write_tags(&job.full_path, &song.tags, &parsed.tags, flags)
        {
            Ok(0) => {}
            Ok(fields) => {
                debug!(target: "reconcile", path = %job.full_path.display(), fields, "Wrote tags");
                self.counters.incr(Counter::WrittenTags);
            }
            Err(e) => {
                warn!(target: "reconcile", path = %job.full_path.display(), error = %e, "Failed to write tags");
                self.counters.incr(Counter::Bad);
            }
        }
        self.counters.incr(Counter::Processed);
    }

    /// Copy imported iTunes fields into the record.
    async fn update_from_itunes(&mut self, job: Job) {
        let Some(existing) = job.existing else {
            self.counters.incr(Counter::Processed);
            return;
        };

        let name = job
            .full_path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let itunes = &self.collaborators.itunes;
        let Some(fields) = itunes.fields_by_filename(&name) else {
            debug!(target: "reconcile", name = %name, "Not in iTunes");
            self.counters.incr(Counter::Processed);
            return;
        };

        let mut song = existing.clone();
        for (key, value) in fields {
            if !value.is_empty() && itunes.import_enabled(key) && song.get(key) != Some(value.as_str())
            {
                song.set(key, value);
            }
        }

        if song != existing {
            self.store(song, true).await;
        }
        self.counters.incr(Counter::Processed);
    }

    /// Move the file to where the template puts it, even if the record asks
    /// not to be renamed.
    async fn reorganize(&mut self, job: Job) {
        let Some(existing) = job.existing else {
            self.counters.incr(Counter::Processed);
            return;
        };

        let mut song = existing.clone();
        let bypass = self.bypass_value(&job.relative_path);
        self.rename(&mut song, &job.full_path, bypass.as_deref(), true);

        if song != existing {
            self.store(song, true).await;
        }
        self.counters.incr(Counter::Processed);
    }

    fn report_progress(&mut self) {
        if self.total == 0 {
            return;
        }
        let fraction = (self.counters.settled() as f64 / self.total as f64).min(1.0);
        if fraction - self.reported >= 0.01 {
            self.reported = fraction;
            self.send(ProgressMessage::Progress(fraction));
        }
    }

    async fn finish(&mut self) -> Result<()> {
        self.source = None;

        let target = self.target.take();
        let discarded = target.is_some() && self.stopped;
        let replace = target.is_some() && !self.stopped;
        match target {
            Some(target) if replace => target.commit().await?,
            // A stopped destructive run never saw every record
            Some(target) => target.discard().await?,
            None => {}
        }
        if let Some(primary) = self.primary.take() {
            primary.commit().await?;
        }
        if replace {
            std::fs::rename(self.new_database_path(), &self.database_path)
                .with_context(format!("replacing {}", self.database_path.display()))?;
        }

        self.counters
            .record_max(Counter::QueueHighWater, self.queue.high_water() as u64);
        info!(
            target: "reconcile",
            mode = %self.mode,
            found = self.counters.get(Counter::Found),
            processed = self.counters.get(Counter::Processed),
            skipped = self.counters.get(Counter::Skipped),
            new = self.counters.get(Counter::New),
            updated = self.counters.get(Counter::Updated),
            stopped = self.stopped,
            "Reconciliation finished"
        );

        for line in self.counters.summary() {
            self.send(ProgressMessage::Status(line));
        }
        if discarded {
            self.send(ProgressMessage::Status(
                "Stopped by user, database unchanged".to_string(),
            ));
        } else if self.stopped {
            self.send(ProgressMessage::Status("Stopped by user".to_string()));
        } else {
            self.send(ProgressMessage::Progress(1.0));
            self.send(ProgressMessage::Status("Complete".to_string()));
        }
        self.send(ProgressMessage::Finish);

        self.state = RunState::Done;
        Ok(())
    }
}
