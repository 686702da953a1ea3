use std::io::{self, Write};
use std::path::PathBuf;

use anyhow::{Context, Result, bail};
use chrono::Utc;
use clap::Parser;
use dialoguer::{FuzzySelect, Select, theme::ColorfulTheme};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use animesrc::config::{Settings, config_path};
use animesrc::providers::mal::{
    DEFAULT_RANKING_LIMIT, DEFAULT_SEASONAL_LIMIT, MalAnimeDetails, MalClient, MalList, MalNode,
    MalRankingItem, MalSeasonalItem, RankingType, current_season,
};
use animesrc::{
    ALLANIME_REFERER, AllAnimeClient, AnimeProvider, EpisodeOrder, EpisodeSource, Translation,
};

#[derive(Debug, Parser)]
#[command(
    name = "animesrc",
    about = "Resolve playable episode sources from AllAnime.",
    version
)]
struct Cli {
    #[arg(long)]
    dub: bool,

    #[arg(short = 'e', long, value_name = "EPISODE")]
    episode: Option<String>,

    /// List episodes newest first.
    #[arg(long)]
    desc: bool,

    /// Print resolved sources as JSON.
    #[arg(long)]
    json: bool,

    /// Skip the HEAD probe on direct MP4 sources.
    #[arg(long)]
    no_probe: bool,

    /// Stop after listing episodes.
    #[arg(long)]
    episodes: bool,

    /// Browse the MyAnimeList ranking of the given type.
    #[arg(long, value_name = "TYPE", conflicts_with_all = ["seasonal", "info"])]
    ranking: Option<RankingType>,

    /// Browse the current MyAnimeList season.
    #[arg(long, conflicts_with = "info")]
    seasonal: bool,

    /// Show MyAnimeList details for an anime id.
    #[arg(long, value_name = "MAL_ID")]
    info: Option<u64>,

    #[arg(long)]
    show_config: bool,

    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    #[arg(value_name = "QUERY")]
    query: Vec<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let result = run().await;
    if let Err(err) = &result {
        eprintln!("error: {err:?}");
    }
    result
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    let path = match &cli.config {
        Some(path) => path.clone(),
        None => config_path()?,
    };
    let settings = Settings::load(&path)?;
    init_tracing(&settings);
    debug!("loaded settings from {}", path.display());

    if cli.show_config {
        print!("{}", settings.to_toml()?);
        return Ok(());
    }

    if cli.ranking.is_some() || cli.seasonal || cli.info.is_some() {
        let mal = MalClient::new(settings.mal.clone())?;
        return run_mal_flow(&cli, &mal).await;
    }

    let translation = if cli.dub {
        Translation::Dub
    } else {
        settings.translation
    };
    let client =
        AllAnimeClient::new()?.probe_direct_sources(settings.probe_direct_sources && !cli.no_probe);
    run_anime_flow(&cli, &client, translation).await
}

fn init_tracing(settings: &Settings) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&settings.log_filter));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn run_anime_flow(
    cli: &Cli,
    client: &impl AnimeProvider,
    translation: Translation,
) -> Result<()> {
    if cli.query.is_empty() {
        println!("No query provided. Use `animesrc <name>` or `animesrc --ranking all`.");
        return Ok(());
    }

    let query = cli.query.join(" ");
    let shows = client.search_shows(&query, translation).await?;
    if shows.is_empty() {
        bail!("No results for \"{}\" ({})", query, translation.label());
    }

    let options: Vec<String> = shows
        .iter()
        .map(|s| format!("{} [{}]", s.name, s.episode_count_label))
        .collect();
    let selection = FuzzySelect::with_theme(&theme())
        .with_prompt("Select a show (Esc to cancel)")
        .items(&options)
        .default(0)
        .interact_opt()?;
    let Some(idx) = selection else {
        println!("Cancelled.");
        return Ok(());
    };
    let show = &shows[idx];

    let episodes = EpisodeOrder::from_descending(cli.desc)
        .apply(client.list_episodes(&show.id, translation).await?);
    if episodes.is_empty() {
        bail!(
            "No {} episodes available for {}",
            translation.label(),
            show.name
        );
    }

    if cli.episodes {
        println!(
            "{} {} episodes for {}:",
            episodes.len(),
            translation.label(),
            show.name
        );
        for episode in &episodes {
            println!("  {episode}");
        }
        return Ok(());
    }

    let chosen = match &cli.episode {
        Some(ep) if episodes.contains(ep) => ep.clone(),
        other => {
            if let Some(ep) = other {
                eprintln!(
                    "Episode '{}' does not exist for '{}'. Showing episode list.",
                    ep, show.name
                );
            }
            let selection = Select::with_theme(&theme())
                .with_prompt("Episode (Enter to select, Esc to cancel)")
                .items(&episodes)
                .default(0)
                .interact_opt()?;
            let Some(i) = selection else {
                println!("Cancelled.");
                return Ok(());
            };
            episodes[i].clone()
        }
    };

    eprintln!("Resolving sources for episode {chosen}...");
    let sources = client
        .resolve_sources(&show.id, translation, &chosen)
        .await?;
    if sources.is_empty() {
        eprintln!(
            "No sources currently available for {} episode {chosen} ({}). Try again later.",
            show.name,
            translation.label()
        );
    }
    write_sources(&mut io::stdout().lock(), &sources, cli.json)
}

/// Stdout carries only the sources, so `--json` output can be piped.
fn write_sources(out: &mut impl Write, sources: &[EpisodeSource], json: bool) -> Result<()> {
    if json {
        let encoded = serde_json::to_string_pretty(sources).context("failed to encode sources")?;
        writeln!(out, "{encoded}")?;
        return Ok(());
    }
    for source in sources {
        writeln!(out, "{}", source.display_label())?;
        if source.requires_referer {
            writeln!(out, "  Referer: {ALLANIME_REFERER}")?;
        }
        writeln!(out, "  {}", source.url)?;
    }
    Ok(())
}

async fn run_mal_flow(cli: &Cli, mal: &MalClient) -> Result<()> {
    if let Some(id) = cli.info {
        let details = mal.anime_details(id).await?;
        print_details(&details);
        return Ok(());
    }

    if let Some(ranking_type) = cli.ranking {
        let page = mal.anime_ranking(ranking_type, DEFAULT_RANKING_LIMIT).await?;
        return browse(mal, page, |item: &MalRankingItem| {
            (format!("#{} {}", item.ranking.rank, node_line(&item.node)), item.node.id)
        })
        .await;
    }

    let (year, season) = current_season(Utc::now());
    println!("Season: {season} {year}");
    let page = mal
        .seasonal_anime(year, season, DEFAULT_SEASONAL_LIMIT)
        .await?;
    browse(mal, page, |item: &MalSeasonalItem| {
        (node_line(&item.node), item.node.id)
    })
    .await
}

/// Pages through a MAL list; picking an entry prints its details.
async fn browse<T, F>(mal: &MalClient, mut page: MalList<T>, describe: F) -> Result<()>
where
    T: serde::de::DeserializeOwned,
    F: Fn(&T) -> (String, u64),
{
    loop {
        let (mut options, ids): (Vec<String>, Vec<u64>) = page.data.iter().map(&describe).unzip();
        let next = page.next_page().map(str::to_string);
        if next.is_some() {
            options.push(String::from("Next page ->"));
        }
        if options.is_empty() {
            println!("Nothing to show.");
            return Ok(());
        }

        let selection = Select::with_theme(&theme())
            .with_prompt("Select an anime (Esc to exit)")
            .items(&options)
            .default(0)
            .interact_opt()?;
        let Some(idx) = selection else {
            return Ok(());
        };

        match (ids.get(idx), next) {
            (Some(id), _) => print_details(&mal.anime_details(*id).await?),
            (None, Some(url)) => page = mal.get_absolute(&url).await?,
            (None, None) => return Ok(()),
        }
    }
}

fn node_line(node: &MalNode) -> String {
    let media = node.media_type.as_deref().unwrap_or("?");
    match node.mean {
        Some(mean) => format!("{} ({media}, {mean:.2})", node.title),
        None => format!("{} ({media})", node.title),
    }
}

fn print_details(details: &MalAnimeDetails) {
    let node = &details.node;
    println!("{} [MAL {}]", node.title, node.id);
    if let Some(media) = &node.media_type {
        println!("  Type: {media}");
    }
    if let Some(status) = &details.status {
        println!("  Status: {status}");
    }
    if let Some(episodes) = details.num_episodes.filter(|n| *n > 0) {
        println!("  Episodes: {episodes}");
    }
    if let Some(mean) = node.mean {
        println!("  Score: {mean:.2}");
    }
    if let Some(rank) = details.rank {
        println!("  Rank: #{rank}");
    }
    if let Some(popularity) = details.popularity {
        println!("  Popularity: #{popularity}");
    }
    match (&details.start_date, &details.end_date) {
        (Some(start), Some(end)) => println!("  Aired: {start} to {end}"),
        (Some(start), None) => println!("  Aired: {start}"),
        _ => {}
    }
    if let Some(broadcast) = &details.broadcast {
        if let (Some(day), Some(time)) = (&broadcast.day_of_week, &broadcast.start_time) {
            println!("  Broadcast: {day} {time} (JST)");
        }
    }
    if !details.genres.is_empty() {
        let genres: Vec<&str> = details.genres.iter().map(|g| g.name.as_str()).collect();
        println!("  Genres: {}", genres.join(", "));
    }
    if let Some(synopsis) = &details.synopsis {
        println!();
        println!("{synopsis}");
    }
}

fn theme() -> ColorfulTheme {
    ColorfulTheme::default()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_sources() -> Vec<EpisodeSource> {
        vec![
            EpisodeSource::mp4("1080p", "https://cdn.test/1080.mp4"),
            EpisodeSource::hls("https://hls.test/en.m3u8"),
        ]
    }

    #[test]
    fn json_output_is_a_single_document() {
        let mut out = Vec::new();
        write_sources(&mut out, &sample_sources(), true).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(parsed[0]["url"], "https://cdn.test/1080.mp4");
        assert_eq!(parsed[0]["kind"], "mp4");
        assert_eq!(parsed[1]["label"], "HLS");
    }

    #[test]
    fn empty_json_output_is_an_empty_array() {
        let mut out = Vec::new();
        write_sources(&mut out, &[], true).unwrap();
        assert_eq!(String::from_utf8(out).unwrap().trim(), "[]");
    }

    #[test]
    fn plain_output_lists_referer_per_source() {
        let mut out = Vec::new();
        write_sources(&mut out, &sample_sources(), false).unwrap();
        let text = String::from_utf8(out).unwrap();

        assert!(text.starts_with("1080p (MP4)\n  Referer: https://allmanga.to\n"));
        assert!(text.contains("HLS (HLS)\n"));
        assert_eq!(text.matches("Referer:").count(), 2);
    }
}
