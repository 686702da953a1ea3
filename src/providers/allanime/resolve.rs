use std::cmp::Reverse;
use std::collections::HashSet;
use std::time::Duration;

use futures::future::join_all;
use lazy_static::lazy_static;
use regex::Regex;
use tracing::{debug, info, warn};

use super::ALLANIME_REFERER;
use super::extract::{extract_embed_sources, is_playable_url};
use crate::transport::{Body, Request, Transport, TransportError};
use crate::types::{EpisodeSource, ProviderCandidate};

/// Host serving direct MP4 files; a candidate on it needs no embed fetch.
const DIRECT_MP4_HOST: &str = "tools.fast4speed.rsvp";
const EMBED_TIMEOUT: Duration = Duration::from_secs(8);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

lazy_static! {
    static ref RESOLUTION_RE: Regex =
        Regex::new(r"[0-9]{3,4}").expect("resolution pattern is valid");
}

#[derive(Debug, Clone, Copy)]
pub struct ResolveOptions {
    pub probe_direct: bool,
}

impl Default for ResolveOptions {
    fn default() -> Self {
        Self { probe_direct: true }
    }
}

pub async fn resolve_candidates<T: Transport>(
    transport: &T,
    candidates: Vec<ProviderCandidate>,
    options: ResolveOptions,
) -> Vec<EpisodeSource> {
    if candidates.is_empty() {
        info!("no provider candidates in sources payload");
        return Vec::new();
    }

    let mut remaining = candidates;
    if let Some(pos) = remaining.iter().position(is_direct_candidate) {
        let direct = remaining.remove(pos);
        let url = repair_direct_url(&direct.embed_url);
        if is_playable_url(&url) {
            info!(provider = %direct.provider_name, "direct source found, skipping embed fetches");
            if options.probe_direct {
                probe_direct(transport, &url).await;
            }
            return rank_sources(vec![EpisodeSource::mp4(direct.provider_name, url)]);
        }
        warn!(provider = %direct.provider_name, "direct source has unusable url: {url}");
    }

    let fetches = remaining
        .iter()
        .map(|candidate| fetch_embed_sources(transport, candidate));
    let outcomes = join_all(fetches).await;

    let mut sources = Vec::new();
    for (candidate, outcome) in remaining.iter().zip(outcomes) {
        match outcome {
            Ok(found) => {
                debug!(
                    provider = %candidate.provider_name,
                    "extracted {} sources",
                    found.len()
                );
                sources.extend(found);
            }
            Err(err) => warn!(provider = %candidate.provider_name, "embed fetch failed: {err}"),
        }
    }

    let ranked = rank_sources(sources);
    info!("resolved {} sources", ranked.len());
    ranked
}

fn is_direct_candidate(candidate: &ProviderCandidate) -> bool {
    candidate
        .embed_url
        .to_ascii_lowercase()
        .contains(DIRECT_MP4_HOST)
}

/// The direct host is served with a doubled slash after its authority.
fn repair_direct_url(url: &str) -> String {
    url.replacen(
        "https://tools.fast4speed.rsvp//",
        "https://tools.fast4speed.rsvp/",
        1,
    )
}

async fn probe_direct<T: Transport>(transport: &T, url: &str) {
    let request = Request::head(url)
        .header("Referer", ALLANIME_REFERER)
        .timeout(PROBE_TIMEOUT);
    match transport.request(request).await {
        Ok(Body::Response(meta)) => info!(status = meta.status.as_u16(), "probe {url}"),
        Ok(_) => debug!("probe {url} returned a body"),
        Err(err) => warn!("probe {url} failed: {err}"),
    }
}

async fn fetch_embed_sources<T: Transport>(
    transport: &T,
    candidate: &ProviderCandidate,
) -> Result<Vec<EpisodeSource>, TransportError> {
    debug!(provider = %candidate.provider_name, "fetch embed {}", candidate.embed_url);
    let request = Request::get(&candidate.embed_url)
        .header("Referer", ALLANIME_REFERER)
        .timeout(EMBED_TIMEOUT);
    let body = transport
        .request(request)
        .await?
        .into_text(&candidate.embed_url)?;
    Ok(extract_embed_sources(&body))
}

/// Drops repeated URLs (first occurrence wins) and orders by the resolution
/// parsed from each label, highest first. Equal ranks keep their order.
pub fn rank_sources(sources: Vec<EpisodeSource>) -> Vec<EpisodeSource> {
    let mut seen = HashSet::new();
    let mut unique: Vec<EpisodeSource> = sources
        .into_iter()
        .filter(|source| seen.insert(source.url.clone()))
        .collect();
    unique.sort_by_key(|source| Reverse(label_rank(&source.label)));
    unique
}

/// First run of three or four digits in the label, or 0.
pub fn label_rank(label: &str) -> u32 {
    RESOLUTION_RE
        .find(label)
        .and_then(|m| m.as_str().parse().ok())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use reqwest::{Method, StatusCode};

    use super::*;
    use crate::transport::mock::{MockReply, MockTransport, header};
    use crate::types::SourceKind;

    fn candidate(name: &str, url: &str) -> ProviderCandidate {
        ProviderCandidate {
            provider_name: name.to_string(),
            embed_url: url.to_string(),
        }
    }

    const CLOCK_1080: &str =
        r#"{"links":[{"link":"https://cdn.test/ep1-1080.mp4","resolutionStr":"1080p"}]}"#;

    #[tokio::test]
    async fn direct_host_short_circuits_fan_out() {
        let transport = MockTransport::new().route(
            "https://tools.fast4speed.rsvp/",
            MockReply::Status(StatusCode::OK),
        );
        let candidates = vec![
            candidate("Default", "https://allanime.day/apivtwo/clock.json?id=1"),
            candidate("Yt-mp4", "https://tools.fast4speed.rsvp//media9/videos/abc/sub/1"),
            candidate("S-mp4", "https://allanime.day/apivtwo/clock.json?id=2"),
        ];

        let sources = resolve_candidates(&transport, candidates, ResolveOptions::default()).await;

        assert_eq!(
            sources,
            vec![EpisodeSource::mp4(
                "Yt-mp4",
                "https://tools.fast4speed.rsvp/media9/videos/abc/sub/1"
            )]
        );
        assert_eq!(transport.count(Method::GET), 0);
        assert_eq!(transport.count(Method::HEAD), 1);
        let probe = &transport.requests()[0];
        assert_eq!(
            probe.url,
            "https://tools.fast4speed.rsvp/media9/videos/abc/sub/1"
        );
        assert_eq!(header(probe, "Referer"), Some(ALLANIME_REFERER));
        assert_eq!(probe.timeout, PROBE_TIMEOUT);
    }

    #[tokio::test]
    async fn failed_probe_still_returns_direct_source() {
        let transport =
            MockTransport::new().route("https://tools.fast4speed.rsvp/", MockReply::Timeout);
        let candidates = vec![candidate(
            "Yt-mp4",
            "https://tools.fast4speed.rsvp//media9/videos/abc/dub/3",
        )];

        let sources = resolve_candidates(&transport, candidates, ResolveOptions::default()).await;

        assert_eq!(sources.len(), 1);
        assert_eq!(sources[0].kind, SourceKind::Mp4);
        assert!(sources[0].requires_referer);
    }

    #[tokio::test]
    async fn probe_can_be_disabled() {
        let transport = MockTransport::new();
        let candidates = vec![candidate(
            "Yt-mp4",
            "https://tools.fast4speed.rsvp//media9/videos/abc/sub/1",
        )];
        let options = ResolveOptions {
            probe_direct: false,
        };

        let sources = resolve_candidates(&transport, candidates, options).await;

        assert_eq!(sources.len(), 1);
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn fan_out_survives_failing_providers() {
        let transport = MockTransport::new()
            .route("https://a.test/", MockReply::Timeout)
            .route(
                "https://b.test/",
                MockReply::Status(StatusCode::INTERNAL_SERVER_ERROR),
            )
            .text("https://allanime.day/apivtwo/clock.json?id=ok", CLOCK_1080);
        let candidates = vec![
            candidate("Sak", "https://a.test/embed"),
            candidate("Kir", "https://b.test/embed"),
            candidate("Default", "https://allanime.day/apivtwo/clock.json?id=ok"),
            candidate("Mp4", "https://c.test/missing"),
        ];

        let sources = resolve_candidates(&transport, candidates, ResolveOptions::default()).await;

        assert_eq!(
            sources,
            vec![EpisodeSource::mp4("1080p", "https://cdn.test/ep1-1080.mp4")]
        );
        assert_eq!(transport.count(Method::GET), 4);
        assert!(
            transport
                .requests()
                .iter()
                .all(|request| header(request, "Referer") == Some(ALLANIME_REFERER)
                    && request.timeout == EMBED_TIMEOUT)
        );
    }

    #[tokio::test]
    async fn all_failures_yield_empty_list() {
        let transport = MockTransport::new().route("https://a.test/", MockReply::Timeout);
        let candidates = vec![
            candidate("Sak", "https://a.test/embed"),
            candidate("Kir", "https://b.test/embed"),
        ];

        let sources = resolve_candidates(&transport, candidates, ResolveOptions::default()).await;

        assert!(sources.is_empty());
    }

    #[tokio::test]
    async fn no_candidates_issue_no_requests() {
        let transport = MockTransport::new();
        let sources = resolve_candidates(&transport, Vec::new(), ResolveOptions::default()).await;
        assert!(sources.is_empty());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn merged_sources_are_deduplicated_and_ranked() {
        let clock_a = r#"{"links":[{"link":"https://cdn.test/480.mp4","resolutionStr":"480p"},{"link":"https://cdn.test/1080.mp4","resolutionStr":"1080p"}]}"#;
        let clock_b = r#"{"links":[{"link":"https://cdn.test/1080.mp4","resolutionStr":"1080p"},{"hls","url":"https://hls.test/en.m3u8","hardsub_lang":"en-US"}]}"#;
        let transport = MockTransport::new()
            .text("https://allanime.day/a", clock_a)
            .text("https://allanime.day/b", clock_b);
        let candidates = vec![
            candidate("Default", "https://allanime.day/a"),
            candidate("S-mp4", "https://allanime.day/b"),
        ];

        let sources = resolve_candidates(&transport, candidates, ResolveOptions::default()).await;
        let urls: Vec<&str> = sources.iter().map(|s| s.url.as_str()).collect();

        assert_eq!(
            urls,
            vec![
                "https://cdn.test/1080.mp4",
                "https://cdn.test/480.mp4",
                "https://hls.test/en.m3u8",
            ]
        );
    }

    #[test]
    fn label_rank_reads_first_digit_run() {
        assert_eq!(label_rank("1080p"), 1080);
        assert_eq!(label_rank("720p"), 720);
        assert_eq!(label_rank("Mp4 2160p"), 2160);
        assert_eq!(label_rank("HLS"), 0);
        assert_eq!(label_rank("Yt-mp4"), 0);
        assert_eq!(label_rank("10800"), 1080);
    }

    #[test]
    fn ranking_is_stable_and_idempotent() {
        let sources = vec![
            EpisodeSource::hls("https://hls.test/1.m3u8"),
            EpisodeSource::mp4("360p", "https://cdn.test/360.mp4"),
            EpisodeSource::mp4("auto", "https://cdn.test/auto.mp4"),
            EpisodeSource::mp4("1080p", "https://cdn.test/1080.mp4"),
            EpisodeSource::mp4("1080p", "https://cdn.test/1080.mp4"),
            EpisodeSource::mp4("1080p", "https://mirror.test/1080.mp4"),
        ];

        let ranked = rank_sources(sources);
        let urls: Vec<&str> = ranked.iter().map(|s| s.url.as_str()).collect();
        assert_eq!(
            urls,
            vec![
                "https://cdn.test/1080.mp4",
                "https://mirror.test/1080.mp4",
                "https://cdn.test/360.mp4",
                "https://hls.test/1.m3u8",
                "https://cdn.test/auto.mp4",
            ]
        );
        assert_eq!(rank_sources(ranked.clone()), ranked);
    }
}
