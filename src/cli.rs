use std::io::{BufRead, Write};
use std::sync::Arc;

use clap::Parser;
use tracing::info;

use crate::config::{CatalogConfig, ResolveOptions};
use crate::musicbrainz::MusicBrainzClient;
use crate::resolver::Resolver;
use crate::spotify::{SpotifyClient, SpotifyConfig};
use crate::types::{EntityKind, MatchResult, ReferenceQuery, ResolutionFailed, SecondaryId};

#[derive(Parser)]
#[command(name = "mbresolve")]
enum Cli {
    /// Resolve one free-text reference to a canonical MusicBrainz id
    Resolve(ResolveArgs),
    /// Resolve a batch of references read as JSON lines
    Batch(BatchArgs),
}

#[derive(clap::Args)]
struct ResolveArgs {
    /// Title of the entity to resolve
    title: String,
    /// Entity kind: artist, release-group, release/album, recording/song, label
    #[arg(long, default_value = "recording")]
    kind: String,
    /// Owning artist name
    #[arg(long)]
    artist: Option<String>,
    /// Owning artist MBID (makes ownership verification mandatory)
    #[arg(long)]
    artist_id: Option<String>,
    /// Title of the album the match should belong to
    #[arg(long)]
    album: Option<String>,
    /// Release group MBID of the preferred album
    #[arg(long)]
    album_id: Option<String>,
    /// Previously stored MBID to reuse
    #[arg(long)]
    existing_id: Option<String>,
    /// ISRC for direct recording lookup
    #[arg(long)]
    isrc: Option<String>,
    /// UPC/EAN barcode for direct release lookup
    #[arg(long)]
    barcode: Option<String>,
    /// open.spotify.com URL to crosswalk through
    #[arg(long)]
    url: Option<String>,
    #[command(flatten)]
    options: OptionArgs,
}

#[derive(clap::Args)]
struct BatchArgs {
    /// Input file of JSON-line queries, or "-" for stdin
    #[arg(long, default_value = "-")]
    input: String,
    /// Concurrent resolutions
    #[arg(long, default_value = "3")]
    workers: usize,
    #[command(flatten)]
    options: OptionArgs,
}

#[derive(clap::Args)]
struct OptionArgs {
    /// Re-verify ownership even when an existing id resolves
    #[arg(long)]
    reverify: bool,
    /// Max release groups the hierarchical walk may inspect
    #[arg(long, default_value = "20")]
    walk_budget: usize,
    /// Override the per-kind search page size
    #[arg(long)]
    limit: Option<u32>,
}

#[derive(serde::Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
enum Outcome {
    Resolved(MatchResult),
    Failed(ResolutionFailed),
}

impl From<Result<MatchResult, ResolutionFailed>> for Outcome {
    fn from(result: Result<MatchResult, ResolutionFailed>) -> Self {
        match result {
            Ok(m) => Self::Resolved(m),
            Err(f) => Self::Failed(f),
        }
    }
}

pub async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    match cli {
        Cli::Resolve(args) => resolve_one(args).await,
        Cli::Batch(args) => resolve_batch(args).await,
    }
}

fn build_resolver(options: &OptionArgs, workers: usize) -> Result<Resolver, Box<dyn std::error::Error>> {
    let catalog = Arc::new(MusicBrainzClient::new(CatalogConfig::default())?);
    let opts = ResolveOptions {
        reverify_existing: options.reverify,
        walk_budget: options.walk_budget,
        search_limit: options.limit,
        workers,
    };
    let mut resolver = Resolver::new(catalog, opts);
    if let Some(spotify_cfg) = SpotifyConfig::from_env() {
        resolver = resolver.with_spotify(SpotifyClient::new(spotify_cfg)?);
    } else {
        info!("no Spotify credentials in environment, URL crosswalk disabled");
    }
    Ok(resolver)
}

async fn resolve_one(args: ResolveArgs) -> Result<(), Box<dyn std::error::Error>> {
    let kind = EntityKind::from_str(&args.kind)
        .ok_or_else(|| format!("unknown entity kind: {}", args.kind))?;
    let mut query = ReferenceQuery::new(args.title, kind);
    query.hints.owner_name = args.artist;
    query.hints.owner_id = args.artist_id;
    query.hints.container_title = args.album;
    query.hints.container_id = args.album_id;
    query.hints.existing_id = args.existing_id;
    query.hints.secondary_id = match (args.isrc, args.barcode) {
        (Some(isrc), _) => Some(SecondaryId::Isrc(isrc)),
        (None, Some(barcode)) => Some(SecondaryId::Barcode(barcode)),
        (None, None) => None,
    };
    query.hints.external_url = args.url;

    let resolver = build_resolver(&args.options, 1)?;
    let result = resolver.resolve(&query).await;
    let failed = result.is_err();
    println!("{}", serde_json::to_string_pretty(&Outcome::from(result))?);
    if failed {
        std::process::exit(1);
    }
    Ok(())
}

async fn resolve_batch(args: BatchArgs) -> Result<(), Box<dyn std::error::Error>> {
    let queries = read_queries(&args.input)?;
    info!(count = queries.len(), "resolving batch");
    let resolver = build_resolver(&args.options, args.workers)?;
    let results = resolver.resolve_many(queries).await;

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    let mut failures = 0usize;
    for result in results {
        if result.is_err() {
            failures += 1;
        }
        serde_json::to_writer(&mut out, &Outcome::from(result))?;
        out.write_all(b"\n")?;
    }
    info!(failures, "batch finished");
    Ok(())
}

/// One JSON query object per line; blank lines are skipped.
fn read_queries(input: &str) -> Result<Vec<ReferenceQuery>, Box<dyn std::error::Error>> {
    let reader: Box<dyn BufRead> = if input == "-" {
        Box::new(std::io::stdin().lock())
    } else {
        Box::new(std::io::BufReader::new(std::fs::File::open(input)?))
    };
    let mut queries = Vec::new();
    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        queries.push(serde_json::from_str(&line)?);
    }
    Ok(queries)
}
