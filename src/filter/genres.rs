//! Genre normalization and the fixed synonym table used for
//! similarity-expanded genre filters.

/// Groups of genres considered similar. The first entry names the group.
const SYNONYM_GROUPS: &[&[&str]] = &[
    &["hip hop", "rap", "r&b", "trap"],
    &["rock", "alternative", "indie rock", "hard rock"],
    &["metal", "heavy metal"],
    &["pop", "dance pop", "synth pop", "indie pop"],
    &["electronic", "edm", "house", "techno", "dubstep"],
    &["jazz", "smooth jazz", "swing", "bebop"],
    &["classical", "baroque", "instrumental"],
];

/// Comparable form of a genre tag: lowercase, `-` and `_` read as spaces,
/// runs of whitespace collapsed.
pub fn genre_key(raw: &str) -> String {
    raw.to_lowercase()
        .replace(['-', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// The genre itself plus every genre sharing a synonym group with it.
pub fn expand_genre(raw: &str) -> Vec<String> {
    let key = genre_key(raw);
    let mut expanded = vec![key.clone()];
    for group in SYNONYM_GROUPS {
        if group.contains(&key.as_str()) {
            for genre in group.iter() {
                if !expanded.iter().any(|g| g == genre) {
                    expanded.push(genre.to_string());
                }
            }
        }
    }
    expanded
}
