//! Fill-only merging of partial records into library entities.
//!
//! A field is only written while it is empty. Values already present, including
//! identifiers and genre lists, are never replaced, so merging is monotonic and
//! sources consulted first win.

use crate::models::{Artist, SourceKind, Song};
use crate::sources::{ArtistInfo, SongInfo};

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map(|v| v.trim().is_empty()).unwrap_or(true)
}

fn fill_text(target: &mut Option<String>, value: &Option<String>) -> bool {
    if !is_blank(target) || is_blank(value) {
        return false;
    }
    *target = value.as_ref().map(|v| v.trim().to_string());
    true
}

fn fill_number<N: Copy + Default + PartialEq>(target: &mut N, value: Option<N>) -> bool {
    match value {
        Some(v) if *target == N::default() && v != N::default() => {
            *target = v;
            true
        }
        _ => false,
    }
}

/// Take `genres` when `target` has none, dropping blanks and duplicates.
fn fill_genres(target: &mut Vec<String>, genres: &[String]) -> bool {
    if !target.is_empty() {
        return false;
    }
    let mut seen = std::collections::HashSet::new();
    for genre in genres {
        let genre = genre.trim();
        if !genre.is_empty() && seen.insert(genre.to_lowercase()) {
            target.push(genre.to_string());
        }
    }
    !target.is_empty()
}

/// Merge a source's answer into an artist. Returns whether anything changed.
pub fn merge_artist(artist: &mut Artist, source: SourceKind, info: &ArtistInfo) -> bool {
    let mut changed = false;
    if let Some(id) = &info.id {
        changed |= artist.ids.set_if_absent(source, id);
    }
    changed |= fill_genres(&mut artist.genres, &info.genres);
    changed |= fill_number(&mut artist.popularity, info.popularity.map(|p| p.min(100)));
    changed |= fill_text(&mut artist.image_url, &info.image_url);
    changed |= fill_text(&mut artist.link, &info.link);
    changed
}

/// Merge a source's answer into a song. Returns whether anything changed.
pub fn merge_song(song: &mut Song, source: SourceKind, info: &SongInfo) -> bool {
    let mut changed = false;
    if let Some(id) = &info.id {
        changed |= song.ids.set_if_absent(source, id);
    }
    changed |= fill_text(&mut song.album, &info.album);
    changed |= fill_number(&mut song.duration_ms, info.duration_ms);
    if song.release_date.is_none() && info.release_date.is_some() {
        song.release_date = info.release_date;
        changed = true;
    }
    changed |= fill_number(&mut song.popularity, info.popularity.map(|p| p.min(100)));
    changed |= fill_text(&mut song.preview_url, &info.preview_url);
    changed |= fill_text(&mut song.image_url, &info.image_url);
    changed |= fill_text(&mut song.link, &info.link);
    changed |= fill_genres(&mut song.genres, &info.genres);
    changed
}

/// Fill an artist from a previously stored copy of itself.
pub fn fill_artist_from(artist: &mut Artist, stored: &Artist) -> bool {
    let mut changed = artist.ids.fill_from(&stored.ids);
    changed |= fill_genres(&mut artist.genres, &stored.genres);
    changed |= fill_number(&mut artist.popularity, Some(stored.popularity));
    changed |= fill_text(&mut artist.image_url, &stored.image_url);
    changed |= fill_text(&mut artist.link, &stored.link);
    changed
}

/// Fill a song from a previously stored copy of itself.
pub fn fill_song_from(song: &mut Song, stored: &Song) -> bool {
    let mut changed = song.ids.fill_from(&stored.ids);
    changed |= fill_text(&mut song.album, &stored.album);
    changed |= fill_number(&mut song.duration_ms, Some(stored.duration_ms));
    if song.release_date.is_none() && stored.release_date.is_some() {
        song.release_date = stored.release_date;
        changed = true;
    }
    changed |= fill_number(&mut song.popularity, Some(stored.popularity));
    changed |= fill_text(&mut song.preview_url, &stored.preview_url);
    changed |= fill_text(&mut song.image_url, &stored.image_url);
    changed |= fill_text(&mut song.link, &stored.link);
    changed |= fill_genres(&mut song.genres, &stored.genres);
    changed
}
