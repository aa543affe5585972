//! Drives the source fallback chain over a bounded worker pool.
//!
//! A pass runs in two phases, artists first and then songs, so that songs
//! can inherit the genres their artist just received. Each entity that still
//! needs enrichment becomes one task; tasks share a semaphore sized to the
//! configured worker count, are bounded by a per-task timeout, and the whole
//! pass is bounded by a batch deadline. Whatever a task merged before it was
//! stopped is kept.

use super::merge::{merge_artist, merge_song};
use super::report::{EnrichmentReport, TaskOutcome};
use super::EnrichmentError;
use crate::config::{EnrichmentSettings, FallbackPolicy};
use crate::models::{Artist, Song, SourceKind, UserMusicData};
use crate::sources::{ArtistInfo, MetadataSource, SongInfo, SourceError};
use crate::store::MetadataStore;
use futures::future::BoxFuture;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// An entity the source chain knows how to look up and merge into.
trait Enrichable: Clone + PartialEq + Send + Sync + 'static {
    type Info: Send + 'static;

    fn describe(&self) -> String;

    fn needs_enrichment(&self) -> bool;

    fn source_id(&self, kind: SourceKind) -> Option<String>;

    fn info_is_empty(info: &Self::Info) -> bool;

    fn merge(&mut self, kind: SourceKind, info: &Self::Info) -> bool;

    fn by_id<'a>(
        source: &'a dyn MetadataSource,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<Self::Info>, SourceError>>;

    fn by_name<'a>(
        &'a self,
        source: &'a dyn MetadataSource,
    ) -> BoxFuture<'a, Result<Option<Self::Info>, SourceError>>;
}

impl Enrichable for Artist {
    type Info = ArtistInfo;

    fn describe(&self) -> String {
        self.name.clone()
    }

    fn needs_enrichment(&self) -> bool {
        Artist::needs_enrichment(self)
    }

    fn source_id(&self, kind: SourceKind) -> Option<String> {
        self.ids.get(kind).map(str::to_string)
    }

    fn info_is_empty(info: &ArtistInfo) -> bool {
        info.is_empty()
    }

    fn merge(&mut self, kind: SourceKind, info: &ArtistInfo) -> bool {
        merge_artist(self, kind, info)
    }

    fn by_id<'a>(
        source: &'a dyn MetadataSource,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<ArtistInfo>, SourceError>> {
        source.artist_by_id(id)
    }

    fn by_name<'a>(
        &'a self,
        source: &'a dyn MetadataSource,
    ) -> BoxFuture<'a, Result<Option<ArtistInfo>, SourceError>> {
        source.artist_by_name(&self.name)
    }
}

impl Enrichable for Song {
    type Info = SongInfo;

    fn describe(&self) -> String {
        format!("{} - {}", self.artist_name, self.title)
    }

    fn needs_enrichment(&self) -> bool {
        Song::needs_enrichment(self)
    }

    fn source_id(&self, kind: SourceKind) -> Option<String> {
        self.ids.get(kind).map(str::to_string)
    }

    fn info_is_empty(info: &SongInfo) -> bool {
        info.is_empty()
    }

    fn merge(&mut self, kind: SourceKind, info: &SongInfo) -> bool {
        merge_song(self, kind, info)
    }

    fn by_id<'a>(
        source: &'a dyn MetadataSource,
        id: &'a str,
    ) -> BoxFuture<'a, Result<Option<SongInfo>, SourceError>> {
        source.song_by_id(id)
    }

    fn by_name<'a>(
        &'a self,
        source: &'a dyn MetadataSource,
    ) -> BoxFuture<'a, Result<Option<SongInfo>, SourceError>> {
        source.song_by_name(&self.title, &self.artist_name)
    }
}

/// Primary source plus the fallbacks consulted after it, in order.
#[derive(Clone)]
struct SourceChain {
    primary: Arc<dyn MetadataSource>,
    fallbacks: Vec<Arc<dyn MetadataSource>>,
    policy: FallbackPolicy,
}

impl SourceChain {
    /// Run the chain against one entity. Returns whether any source failed.
    async fn run<E: Enrichable>(&self, slot: &Mutex<E>) -> bool {
        let snapshot = slot.lock().unwrap().clone();
        let mut had_failure = false;

        let primary_id = snapshot.source_id(self.primary.kind());
        let by_id = primary_id.is_some();
        let result = match &primary_id {
            Some(id) => E::by_id(self.primary.as_ref(), id).await,
            None => snapshot.by_name(self.primary.as_ref()).await,
        };
        let primary_hit = absorb(slot, self.primary.as_ref(), result, &mut had_failure);

        if by_id && !primary_hit && self.policy == FallbackPolicy::RequirePrimaryHit {
            debug!(
                entity = %snapshot.describe(),
                "Primary had nothing for a known id, skipping fallbacks"
            );
            return had_failure;
        }

        for source in &self.fallbacks {
            let own_id = {
                let entity = slot.lock().unwrap();
                if !entity.needs_enrichment() {
                    break;
                }
                entity.source_id(source.kind())
            };
            let result = match &own_id {
                Some(id) => E::by_id(source.as_ref(), id).await,
                None => snapshot.by_name(source.as_ref()).await,
            };
            absorb(slot, source.as_ref(), result, &mut had_failure);
        }
        had_failure
    }
}

/// Merge one source's answer. Returns whether the source had a usable match.
fn absorb<E: Enrichable>(
    slot: &Mutex<E>,
    source: &dyn MetadataSource,
    result: Result<Option<E::Info>, SourceError>,
    had_failure: &mut bool,
) -> bool {
    match result {
        Ok(Some(info)) if !E::info_is_empty(&info) => {
            let mut entity = slot.lock().unwrap();
            let changed = entity.merge(source.kind(), &info);
            debug!(
                entity = %entity.describe(),
                source = source.name(),
                changed,
                "Merged source answer"
            );
            true
        }
        Ok(_) => {
            debug!(source = source.name(), "No match");
            false
        }
        Err(e) => {
            let entity = slot.lock().unwrap().describe();
            warn!(entity = %entity, source = source.name(), "Lookup failed: {}", e);
            *had_failure = true;
            false
        }
    }
}

fn settle<E: Enrichable>(slot: &Mutex<E>, before: &E, had_failure: bool) -> TaskOutcome {
    let after = slot.lock().unwrap();
    TaskOutcome::classify(*after != *before, after.needs_enrichment(), had_failure)
}

/// Everything a spawned task needs, detached from the coordinator's lifetime.
#[derive(Clone)]
struct TaskContext {
    chain: SourceChain,
    permits: Arc<Semaphore>,
    task_timeout: Duration,
    shutdown: CancellationToken,
    abort: CancellationToken,
}

impl TaskContext {
    async fn run<E: Enrichable>(self, slot: Arc<Mutex<E>>) -> TaskOutcome {
        let _permit = tokio::select! {
            biased;
            _ = self.shutdown.cancelled() => return TaskOutcome::Cancelled,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return TaskOutcome::Cancelled,
            },
        };

        let before = slot.lock().unwrap().clone();
        let lookups = tokio::time::timeout(self.task_timeout, self.chain.run(&slot));
        tokio::select! {
            biased;
            _ = self.abort.cancelled() => TaskOutcome::Cancelled,
            result = lookups => match result {
                Ok(had_failure) => settle(&slot, &before, had_failure),
                Err(_) => {
                    warn!(
                        entity = %before.describe(),
                        "Enrichment timed out after {:?}, keeping partial result",
                        self.task_timeout
                    );
                    TaskOutcome::TimedOut
                }
            },
        }
    }
}

pub struct EnrichmentCoordinator {
    context: TaskContext,
    store: Arc<dyn MetadataStore>,
    settings: EnrichmentSettings,
    tracker: TaskTracker,
}

impl EnrichmentCoordinator {
    pub fn new(
        primary: Arc<dyn MetadataSource>,
        fallbacks: Vec<Arc<dyn MetadataSource>>,
        store: Arc<dyn MetadataStore>,
        settings: EnrichmentSettings,
    ) -> Self {
        let workers = settings.workers.max(1);
        info!(
            "Enrichment coordinator: primary {}, fallbacks [{}], {} workers",
            primary.name(),
            fallbacks
                .iter()
                .map(|s| s.name())
                .collect::<Vec<_>>()
                .join(", "),
            workers
        );
        Self {
            context: TaskContext {
                chain: SourceChain {
                    primary,
                    fallbacks,
                    policy: settings.fallback_policy,
                },
                permits: Arc::new(Semaphore::new(workers)),
                task_timeout: settings.task_timeout,
                shutdown: CancellationToken::new(),
                abort: CancellationToken::new(),
            },
            store,
            settings,
            tracker: TaskTracker::new(),
        }
    }

    pub fn settings(&self) -> &EnrichmentSettings {
        &self.settings
    }

    pub fn is_shutting_down(&self) -> bool {
        self.context.shutdown.is_cancelled()
    }

    /// Enrich every artist and song in `data` that needs it, in place.
    ///
    /// Stored metadata is consulted first. Only the entities this pass
    /// changed are handed to the store; failing to store them is the only
    /// error returned.
    pub async fn enrich(
        &self,
        data: &mut UserMusicData,
    ) -> Result<EnrichmentReport, EnrichmentError> {
        if self.is_shutting_down() {
            return Err(EnrichmentError::ShuttingDown);
        }
        let started = std::time::Instant::now();
        let deadline = Instant::now() + self.settings.batch_deadline;

        if let Err(e) = self.store.fetch_complete(data) {
            warn!("Could not read stored metadata, using sources only: {:#}", e);
        }
        let before = data.clone();

        let mut report = EnrichmentReport::default();
        self.run_phase(&mut data.artists, deadline, &mut report)
            .await;
        let inherited = data.inherit_artist_genres();
        if inherited > 0 {
            debug!("{} songs inherited their artist's genres", inherited);
        }
        self.run_phase(&mut data.songs, deadline, &mut report).await;

        let changed_artists: Vec<Artist> = data
            .artists
            .iter()
            .zip(&before.artists)
            .filter(|(after, before)| after != before)
            .map(|(after, _)| after.clone())
            .collect();
        let changed_songs: Vec<Song> = data
            .songs
            .iter()
            .zip(&before.songs)
            .filter(|(after, before)| after != before)
            .map(|(after, _)| after.clone())
            .collect();

        if !changed_artists.is_empty() || !changed_songs.is_empty() {
            self.store
                .upsert_enriched(&changed_artists, &changed_songs)
                .map_err(EnrichmentError::Persistence)?;
        }
        report.persisted_artists = changed_artists.len();
        report.persisted_songs = changed_songs.len();
        report.elapsed_ms = started.elapsed().as_millis() as u64;

        info!("Enrichment pass: {}", report);
        Ok(report)
    }

    /// Run the source chain for one artist, outside any batch.
    pub async fn enrich_single_artist(
        &self,
        artist: &mut Artist,
    ) -> Result<TaskOutcome, EnrichmentError> {
        self.enrich_single(artist).await
    }

    /// Run the source chain for one song, outside any batch.
    pub async fn enrich_single_song(
        &self,
        song: &mut Song,
    ) -> Result<TaskOutcome, EnrichmentError> {
        self.enrich_single(song).await
    }

    async fn enrich_single<E: Enrichable>(
        &self,
        entity: &mut E,
    ) -> Result<TaskOutcome, EnrichmentError> {
        if self.is_shutting_down() {
            return Err(EnrichmentError::ShuttingDown);
        }
        if !entity.needs_enrichment() {
            return Ok(TaskOutcome::Unchanged);
        }
        let slot = Arc::new(Mutex::new(entity.clone()));
        let outcome = self
            .tracker
            .track_future(self.context.clone().run(slot.clone()))
            .await;
        *entity = slot.lock().unwrap().clone();
        Ok(outcome)
    }

    async fn run_phase<E: Enrichable>(
        &self,
        entities: &mut [E],
        deadline: Instant,
        report: &mut EnrichmentReport,
    ) {
        report.examined += entities.len();

        let mut slots: Vec<(usize, Arc<Mutex<E>>)> = Vec::new();
        for (index, entity) in entities.iter().enumerate() {
            if entity.needs_enrichment() {
                slots.push((index, Arc::new(Mutex::new(entity.clone()))));
            } else {
                report.skipped_complete += 1;
            }
        }
        if slots.is_empty() {
            return;
        }
        debug!("Dispatching {} enrichment tasks", slots.len());

        let mut settled = vec![false; slots.len()];
        let mut tasks = JoinSet::new();
        for (position, (_, slot)) in slots.iter().enumerate() {
            let task = self.context.clone().run(slot.clone());
            tasks.spawn(self.tracker.track_future(async move { (position, task.await) }));
        }

        let mut deadline_hit = false;
        loop {
            match tokio::time::timeout_at(deadline, tasks.join_next()).await {
                Ok(Some(Ok((position, outcome)))) => {
                    settled[position] = true;
                    report.record(outcome);
                }
                Ok(Some(Err(e))) => {
                    warn!("Enrichment task did not complete: {}", e);
                }
                Ok(None) => break,
                Err(_) => {
                    warn!(
                        "Batch deadline reached with {} tasks still running, abandoning them",
                        tasks.len()
                    );
                    tasks.abort_all();
                    deadline_hit = true;
                    break;
                }
            }
        }

        // Abandoned at the deadline, or panicked.
        let unsettled = settled.iter().filter(|done| !**done).count();
        for _ in 0..unsettled {
            report.record(if deadline_hit {
                TaskOutcome::TimedOut
            } else {
                TaskOutcome::Failed
            });
        }

        for (index, slot) in slots {
            entities[index] = slot.lock().unwrap().clone();
        }
    }

    /// Stop accepting work and wind down in-flight tasks.
    ///
    /// Tasks still waiting for a worker are cancelled right away. Running
    /// tasks get `grace` to finish, after which they are cancelled too.
    pub async fn shutdown(&self, grace: Duration) {
        info!("Shutting down enrichment coordinator");
        self.context.shutdown.cancel();
        self.tracker.close();

        if tokio::time::timeout(grace, self.tracker.wait()).await.is_err() {
            warn!(
                "{} enrichment tasks still running after {:?}, cancelling them",
                self.tracker.len(),
                grace
            );
            self.context.abort.cancel();
            if tokio::time::timeout(Duration::from_secs(1), self.tracker.wait())
                .await
                .is_err()
            {
                warn!("Enrichment tasks did not stop in time");
            }
        }
        info!("Enrichment coordinator shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryMetadataStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Answers every artist lookup with a fixed record.
    struct FixedSource {
        kind: SourceKind,
        answer: Option<ArtistInfo>,
        fail: bool,
        calls: AtomicUsize,
    }

    impl FixedSource {
        fn new(kind: SourceKind, answer: Option<ArtistInfo>) -> Arc<Self> {
            Arc::new(Self {
                kind,
                answer,
                fail: false,
                calls: AtomicUsize::new(0),
            })
        }

        fn failing(kind: SourceKind) -> Arc<Self> {
            Arc::new(Self {
                kind,
                answer: None,
                fail: true,
                calls: AtomicUsize::new(0),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn answer(&self) -> Result<Option<ArtistInfo>, SourceError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(SourceError::Connection("refused".into()));
            }
            Ok(self.answer.clone())
        }
    }

    #[async_trait]
    impl MetadataSource for FixedSource {
        fn kind(&self) -> SourceKind {
            self.kind
        }

        async fn artist_by_id(&self, _id: &str) -> Result<Option<ArtistInfo>, SourceError> {
            self.answer()
        }

        async fn artist_by_name(&self, _name: &str) -> Result<Option<ArtistInfo>, SourceError> {
            self.answer()
        }

        async fn song_by_id(&self, _id: &str) -> Result<Option<SongInfo>, SourceError> {
            Ok(None)
        }

        async fn song_by_name(
            &self,
            _title: &str,
            _artist: &str,
        ) -> Result<Option<SongInfo>, SourceError> {
            Ok(None)
        }
    }

    fn coordinator(
        primary: Arc<FixedSource>,
        fallbacks: Vec<Arc<FixedSource>>,
        policy: FallbackPolicy,
    ) -> EnrichmentCoordinator {
        let settings = EnrichmentSettings {
            fallback_policy: policy,
            ..Default::default()
        };
        EnrichmentCoordinator::new(
            primary,
            fallbacks
                .into_iter()
                .map(|s| s as Arc<dyn MetadataSource>)
                .collect(),
            Arc::new(InMemoryMetadataStore::new()),
            settings,
        )
    }

    fn full_answer() -> ArtistInfo {
        ArtistInfo {
            genres: vec!["shoegaze".into()],
            image_url: Some("https://img/slowdive.jpg".into()),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_by_id_miss_with_legacy_gate_skips_fallbacks() {
        let primary = FixedSource::new(SourceKind::Spotify, None);
        let secondary = FixedSource::new(SourceKind::MusicBrainz, Some(full_answer()));
        let coordinator = coordinator(
            primary.clone(),
            vec![secondary.clone()],
            FallbackPolicy::RequirePrimaryHit,
        );

        let mut artist = Artist::new("Slowdive").with_spotify_id("stale-id");
        let outcome = coordinator.enrich_single_artist(&mut artist).await.unwrap();

        assert_eq!(outcome, TaskOutcome::Unchanged);
        assert_eq!(primary.calls(), 1);
        assert_eq!(secondary.calls(), 0);
    }

    #[tokio::test]
    async fn test_by_id_miss_falls_back_by_default() {
        let primary = FixedSource::new(SourceKind::Spotify, None);
        let secondary = FixedSource::new(SourceKind::MusicBrainz, Some(full_answer()));
        let coordinator =
            coordinator(primary.clone(), vec![secondary.clone()], FallbackPolicy::Always);

        let mut artist = Artist::new("Slowdive").with_spotify_id("stale-id");
        let outcome = coordinator.enrich_single_artist(&mut artist).await.unwrap();

        assert_eq!(outcome, TaskOutcome::Completed);
        assert_eq!(secondary.calls(), 1);
        assert_eq!(artist.genres, vec!["shoegaze"]);
    }

    #[tokio::test]
    async fn test_failures_are_reported_not_raised() {
        let primary = FixedSource::failing(SourceKind::Spotify);
        let secondary = FixedSource::failing(SourceKind::MusicBrainz);
        let coordinator =
            coordinator(primary.clone(), vec![secondary.clone()], FallbackPolicy::Always);

        let mut data = UserMusicData::new(vec![Artist::new("Ride")], vec![]);
        let report = coordinator.enrich(&mut data).await.unwrap();

        assert_eq!(report.failed, 1);
        assert_eq!(report.persisted(), 0);
        assert_eq!(data.artists[0], Artist::new("Ride"));
    }

    #[tokio::test]
    async fn test_enrich_after_shutdown_is_rejected() {
        let primary = FixedSource::new(SourceKind::Spotify, Some(full_answer()));
        let coordinator = coordinator(primary.clone(), vec![], FallbackPolicy::Always);
        coordinator.shutdown(Duration::from_millis(50)).await;

        let mut data = UserMusicData::new(vec![Artist::new("Lush")], vec![]);
        assert!(matches!(
            coordinator.enrich(&mut data).await,
            Err(EnrichmentError::ShuttingDown)
        ));
        assert_eq!(primary.calls(), 0);
    }
}
