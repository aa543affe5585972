//! Common test infrastructure
//!
//! Tests should only import from this module, not from internal submodules.

#![allow(dead_code)]

mod fake_source;
mod fixtures;
mod mock_http;

pub use fake_source::FakeSource;
pub use fixtures::*;
pub use mock_http::{
    MockState, MockUpstream, CHER_MBID, LASTFM_API_KEY, RADIOHEAD_MBID, RADIOHEAD_SPOTIFY_ID,
};
