//! Tolerant pattern extraction over AllAnime payloads.
//!
//! The episode `sourceUrls` field and the embed pages both carry JSON that is
//! frequently nested inside strings (with `\"` and `\/` escapes) or cut
//! short, so nothing here goes through a JSON parser. Every pattern accepts
//! both the plain and the escaped form of a key/value pair.

use lazy_static::lazy_static;
use regex::Regex;
use tracing::debug;
use url::Url;

use super::ALLANIME_BASE_URL;
use super::decoder::decode_fragment;
use crate::types::{EpisodeSource, ProviderCandidate};

/// A JSON string value in plain or escaped form. Only `\/` and `\uXXXX`
/// escapes are admitted inside the value; anything else ends it.
const ESCAPED_VALUE: &str = r#"((?:[^"\\]|\\+/|\\+u[0-9a-fA-F]{4})*)"#;

lazy_static! {
    static ref PROVIDER_RE: Regex =
        Regex::new(r#"sourceUrl":"--([^"]*)".*?sourceName":"([^"]*)""#)
            .expect("provider pattern is valid");
    static ref MP4_LINK_RE: Regex = Regex::new(&format!(
        r#"link\\*":\\*"{ESCAPED_VALUE}\\*"[^\n]*?resolutionStr\\*":\\*"([^"\\]*)\\*""#
    ))
    .expect("mp4 link pattern is valid");
    static ref HLS_LINK_RE: Regex = Regex::new(&format!(
        r#"hls\\*",\\*"url\\*":\\*"{ESCAPED_VALUE}\\*"[^\n]*?hardsub_lang\\*":\\*"en-US\\*""#
    ))
    .expect("hls link pattern is valid");
}

/// Pulls every `--`-encoded provider path out of a raw sources response, in
/// order of appearance.
pub fn extract_providers(raw: &str) -> Vec<ProviderCandidate> {
    PROVIDER_RE
        .captures_iter(raw)
        .map(|caps| {
            let decoded = decode_fragment(&caps[1]);
            let candidate = ProviderCandidate {
                provider_name: caps[2].to_string(),
                embed_url: normalize_embed_url(&decoded),
            };
            debug!(
                provider = %candidate.provider_name,
                "candidate {}",
                candidate.embed_url
            );
            candidate
        })
        .collect()
}

/// Absolute URLs pass through; relative paths are joined to the catalog
/// host with exactly one separating slash.
pub fn normalize_embed_url(fragment: &str) -> String {
    let lower = fragment.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        return fragment.to_string();
    }
    let cleaned = if fragment.starts_with("--") {
        fragment.trim_start_matches('-')
    } else {
        fragment
    };
    format!("{ALLANIME_BASE_URL}/{}", cleaned.trim_start_matches('/'))
}

/// Scans an embed page body for MP4 links with resolution labels, then for
/// English hard-subbed HLS playlists.
pub fn extract_embed_sources(body: &str) -> Vec<EpisodeSource> {
    let mut sources = Vec::new();

    for caps in MP4_LINK_RE.captures_iter(body) {
        let url = unescape_url(&caps[1]);
        if is_playable_url(&url) {
            sources.push(EpisodeSource::mp4(&caps[2], url));
        } else {
            debug!("skipping mp4 link with unusable scheme: {url}");
        }
    }

    for caps in HLS_LINK_RE.captures_iter(body) {
        let url = unescape_url(&caps[1]);
        if is_playable_url(&url) {
            sources.push(EpisodeSource::hls(url));
        } else {
            debug!("skipping hls link with unusable scheme: {url}");
        }
    }

    sources
}

pub fn is_playable_url(url: &str) -> bool {
    Url::parse(url)
        .map(|parsed| parsed.scheme() == "https" && parsed.host().is_some())
        .unwrap_or(false)
}

/// Strips the backslash runs of `\/` escapes and resolves `\uXXXX`.
fn unescape_url(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(idx) = rest.find('\\') {
        out.push_str(&rest[..idx]);
        let tail = rest[idx..].trim_start_matches('\\');
        let code_point = tail
            .strip_prefix('u')
            .and_then(|hex| hex.get(..4))
            .and_then(|hex| u32::from_str_radix(hex, 16).ok())
            .and_then(char::from_u32);
        match code_point {
            Some(ch) => {
                out.push(ch);
                rest = &tail[5..];
            }
            None => rest = tail,
        }
    }
    out.push_str(rest);
    out
}
