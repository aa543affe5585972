use super::ranking::{hybrid, personalized, Preferences, Selection};
use super::RecommendationMode;
use crate::cache::normalize_key;
use crate::config::RecommendationSettings;
use crate::filter::genres::genre_key;
use crate::filter::{CatalogSnapshot, FilterEngine};
use crate::models::{Song, UserMusicData};
use rand::seq::SliceRandom;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct CacheKey {
    user_id: String,
    mode: RecommendationMode,
    max_results: usize,
}

struct CachedList {
    computed_at: Instant,
    songs: Vec<Song>,
}

pub struct RecommendationEngine {
    filter: Arc<FilterEngine>,
    settings: RecommendationSettings,
    cache: Mutex<HashMap<CacheKey, CachedList>>,
    computations: AtomicUsize,
}

impl RecommendationEngine {
    pub fn new(filter: Arc<FilterEngine>, settings: RecommendationSettings) -> Self {
        Self {
            filter,
            settings,
            cache: Mutex::new(HashMap::new()),
            computations: AtomicUsize::new(0),
        }
    }

    pub fn filter_engine(&self) -> &Arc<FilterEngine> {
        &self.filter
    }

    /// How many lists were computed rather than served from the cache.
    pub fn computations(&self) -> usize {
        self.computations.load(Ordering::SeqCst)
    }

    /// Ranked songs for a listening history.
    ///
    /// An empty history yields the trending list.
    pub fn recommend(&self, history: &[Song], max_results: usize) -> Vec<Song> {
        self.compute(history, max_results, RecommendationMode::Personalized)
    }

    /// The most popular songs, ties in catalog order.
    pub fn trending(&self, max_results: usize) -> Vec<Song> {
        self.filter.top_songs(max_results)
    }

    pub fn hybrid(&self, history: &[Song], max_results: usize) -> Vec<Song> {
        self.compute(history, max_results, RecommendationMode::Hybrid)
    }

    pub fn recommend_with_mode(
        &self,
        history: &[Song],
        max_results: usize,
        mode: RecommendationMode,
    ) -> Vec<Song> {
        self.compute(history, max_results, mode)
    }

    /// Like [`recommend_with_mode`](Self::recommend_with_mode), but served
    /// from the per-user cache while the previous list is fresh.
    pub fn recommend_for_user(
        &self,
        user_id: &str,
        history: &[Song],
        max_results: usize,
        mode: RecommendationMode,
    ) -> Vec<Song> {
        let key = CacheKey {
            user_id: user_id.to_string(),
            mode,
            max_results,
        };
        {
            let cache = self.cache.lock().unwrap();
            if let Some(cached) = cache.get(&key) {
                if cached.computed_at.elapsed() < self.settings.cache_ttl {
                    debug!(user = user_id, %mode, "Serving cached recommendations");
                    return cached.songs.clone();
                }
            }
        }

        let songs = self.compute(history, max_results, mode);
        let mut cache = self.cache.lock().unwrap();
        let ttl = self.settings.cache_ttl;
        cache.retain(|_, cached| cached.computed_at.elapsed() < ttl);
        cache.insert(
            key,
            CachedList {
                computed_at: Instant::now(),
                songs: songs.clone(),
            },
        );
        songs
    }

    /// Recommendations whose title or artist contains `mood`.
    pub fn by_mood(&self, history: &[Song], mood: &str, max_results: usize) -> Vec<Song> {
        let mood = mood.trim().to_lowercase();
        let catalog = self.filter.snapshot();
        let ranked = self.rank(&catalog, history, catalog.len(), RecommendationMode::Personalized);
        ranked
            .into_iter()
            .filter(|song| {
                song.title.to_lowercase().contains(&mood)
                    || song.artist_name.to_lowercase().contains(&mood)
            })
            .take(max_results)
            .collect()
    }

    /// Mostly regular recommendations, topped up with songs from the
    /// discovery pool.
    pub fn surprise(&self, history: &[Song], max_results: usize) -> Vec<Song> {
        self.compute(history, max_results, RecommendationMode::Surprise)
    }

    /// Personalized list from explicit preferences instead of a history.
    pub fn recommend_from_preferences(
        &self,
        genres: &[String],
        artists: &[String],
        max_results: usize,
    ) -> Vec<Song> {
        self.computations.fetch_add(1, Ordering::SeqCst);
        let preferences = Preferences {
            genres: genres.iter().map(|g| genre_key(g)).collect(),
            artists: artists.iter().map(|a| normalize_key(a)).collect(),
        };
        let catalog = self.filter.snapshot();
        if preferences.is_empty() {
            return catalog.top_songs(max_results);
        }
        personalized(&catalog, &preferences, max_results)
    }

    pub fn invalidate_user(&self, user_id: &str) {
        self.cache
            .lock()
            .unwrap()
            .retain(|key, _| key.user_id != user_id);
    }

    pub fn clear_cache(&self) {
        self.cache.lock().unwrap().clear();
    }

    /// Swap in a new catalog. Cached lists refer to the old one and are
    /// dropped.
    pub fn replace_catalog(&self, data: &UserMusicData) {
        self.filter.replace_catalog(data);
        self.clear_cache();
    }

    fn compute(&self, history: &[Song], max_results: usize, mode: RecommendationMode) -> Vec<Song> {
        self.computations.fetch_add(1, Ordering::SeqCst);
        let catalog = self.filter.snapshot();
        let songs = self.rank(&catalog, history, max_results, mode);
        debug!(
            %mode,
            history = history.len(),
            results = songs.len(),
            "Computed recommendations"
        );
        songs
    }

    fn rank(
        &self,
        catalog: &CatalogSnapshot,
        history: &[Song],
        max_results: usize,
        mode: RecommendationMode,
    ) -> Vec<Song> {
        if history.is_empty() {
            return catalog.top_songs(max_results);
        }
        let preferences = Preferences::from_history(history, catalog);
        match mode {
            RecommendationMode::Personalized => personalized(catalog, &preferences, max_results),
            RecommendationMode::Hybrid => hybrid(catalog, &preferences, max_results),
            RecommendationMode::Surprise => {
                self.mix_in_discoveries(catalog, &preferences, max_results)
            }
        }
    }

    fn mix_in_discoveries(
        &self,
        catalog: &CatalogSnapshot,
        preferences: &Preferences,
        max_results: usize,
    ) -> Vec<Song> {
        let ratio = self.settings.surprise_ratio.clamp(0.0, 1.0);
        let regular = (max_results as f64 * ratio).floor() as usize;

        let mut selection = Selection::new(max_results);
        selection.extend(personalized(catalog, preferences, regular));

        let mut pool: Vec<Song> = catalog
            .songs_by_genre(&self.settings.discovery_genre)
            .into_iter()
            .filter(|song| !selection.contains(song))
            .collect();
        if pool.is_empty() {
            pool = catalog
                .songs()
                .iter()
                .filter(|song| !selection.contains(song))
                .cloned()
                .collect();
        }
        pool.shuffle(&mut rand::rng());
        selection.extend(pool);
        selection.into_songs()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn song(title: &str, artist: &str, popularity: u8, genres: &[&str]) -> Song {
        let mut song = Song::new(title, artist);
        song.popularity = popularity;
        song.genres = genres.iter().map(|g| g.to_string()).collect();
        song
    }

    fn engine(settings: RecommendationSettings) -> RecommendationEngine {
        let songs = vec![
            song("Midnight City", "M83", 70, &["synth pop"]),
            song("Digital Love", "Daft Punk", 75, &["house"]),
            song("Strobe", "deadmau5", 65, &["house"]),
            song("Nightcall", "Kavinsky", 60, &["synthwave", "discovery"]),
            song("Windowlicker", "Aphex Twin", 40, &["idm", "discovery"]),
            song("Around the World", "Daft Punk", 80, &["house"]),
        ];
        RecommendationEngine::new(Arc::new(FilterEngine::from_songs(songs)), settings)
    }

    fn titles(songs: &[Song]) -> Vec<&str> {
        songs.iter().map(|s| s.title.as_str()).collect()
    }

    #[test]
    fn test_empty_history_is_trending() {
        let engine = engine(RecommendationSettings::default());
        let songs = engine.recommend(&[], 3);
        assert_eq!(
            titles(&songs),
            vec!["Around the World", "Digital Love", "Midnight City"]
        );
        assert_eq!(titles(&engine.trending(3)), titles(&songs));
    }

    #[test]
    fn test_history_drives_ranking() {
        let engine = engine(RecommendationSettings::default());
        let history = vec![song("One More Time", "Daft Punk", 0, &["house"])];
        let songs = engine.recommend(&history, 10);
        assert_eq!(
            titles(&songs),
            vec!["Digital Love", "Strobe", "Around the World"]
        );
    }

    #[test]
    fn test_hybrid_fills_with_trending() {
        let engine = engine(RecommendationSettings::default());
        let history = vec![song("Reality", "Kavinsky", 0, &["synthwave"])];
        let songs = engine.hybrid(&history, 4);
        assert_eq!(
            titles(&songs),
            vec!["Nightcall", "Around the World", "Digital Love", "Midnight City"]
        );
    }

    #[test]
    fn test_user_cache_within_ttl() {
        let engine = engine(RecommendationSettings::default());
        let history = vec![song("Strobe", "deadmau5", 65, &["house"])];

        let mode = RecommendationMode::Personalized;
        let first = engine.recommend_for_user("ana", &history, 2, mode);
        let second = engine.recommend_for_user("ana", &history, 2, mode);
        assert_eq!(first, second);
        assert_eq!(engine.computations(), 1);

        engine.recommend_for_user("ana", &history, 2, RecommendationMode::Hybrid);
        assert_eq!(engine.computations(), 2);

        engine.invalidate_user("ana");
        engine.recommend_for_user("ana", &history, 2, RecommendationMode::Personalized);
        assert_eq!(engine.computations(), 3);
    }

    #[test]
    fn test_user_cache_expires() {
        let engine = engine(RecommendationSettings {
            cache_ttl: Duration::from_millis(20),
            ..Default::default()
        });
        engine.recommend_for_user("bo", &[], 2, RecommendationMode::Personalized);
        std::thread::sleep(Duration::from_millis(40));
        engine.recommend_for_user("bo", &[], 2, RecommendationMode::Personalized);
        assert_eq!(engine.computations(), 2);
    }

    #[test]
    fn test_expired_lists_are_purged() {
        let engine = engine(RecommendationSettings {
            cache_ttl: Duration::from_millis(20),
            ..Default::default()
        });
        for user in ["ana", "bo", "cy"] {
            engine.recommend_for_user(user, &[], 2, RecommendationMode::Personalized);
        }
        assert_eq!(engine.cache.lock().unwrap().len(), 3);

        std::thread::sleep(Duration::from_millis(40));
        engine.recommend_for_user("dee", &[], 2, RecommendationMode::Hybrid);

        let cache = engine.cache.lock().unwrap();
        assert_eq!(cache.len(), 1);
        assert!(cache.keys().all(|key| key.user_id == "dee"));
    }

    #[test]
    fn test_mood_substring() {
        let engine = engine(RecommendationSettings::default());
        let songs = engine.by_mood(&[], "NIGHT", 5);
        assert_eq!(titles(&songs), vec!["Midnight City", "Nightcall"]);
    }

    #[test]
    fn test_surprise_mixes_discovery_pool() {
        let engine = engine(RecommendationSettings::default());
        let history = vec![song("Da Funk", "Daft Punk", 0, &["house"])];

        let songs = engine.surprise(&history, 5);
        assert_eq!(songs.len(), 5);
        assert_eq!(
            titles(&songs[..3]),
            vec!["Digital Love", "Strobe", "Around the World"]
        );
        let tail: Vec<&str> = titles(&songs[3..]);
        assert!(tail.contains(&"Nightcall"));
        assert!(tail.contains(&"Windowlicker"));
    }

    #[test]
    fn test_replace_catalog_clears_cache() {
        let engine = engine(RecommendationSettings::default());
        engine.recommend_for_user("cy", &[], 1, RecommendationMode::Personalized);
        let solo = song("Solo", "Frank Ocean", 90, &[]);
        engine.replace_catalog(&UserMusicData::new(vec![], vec![solo]));

        let songs = engine.recommend_for_user("cy", &[], 1, RecommendationMode::Personalized);
        assert_eq!(titles(&songs), vec!["Solo"]);
        assert_eq!(engine.computations(), 2);
    }

    #[test]
    fn test_recommend_from_preferences() {
        let engine = engine(RecommendationSettings::default());
        let songs = engine.recommend_from_preferences(
            &["Synth-Pop".to_string()],
            &["Kavinsky".to_string()],
            5,
        );
        assert_eq!(titles(&songs), vec!["Midnight City", "Nightcall"]);
    }
}
