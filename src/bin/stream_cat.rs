use std::path::PathBuf;
use std::time::Duration;

use search_stream::aggregation::{aggregate_search, AggregationMode, SearchAggregator};
use search_stream::api::StreamEvent;
use search_stream::wire::read_frames;
use search_stream::{SearchClient, SearchParams, StreamConfig, WireError};
use tokio::io::AsyncRead;

enum Source {
    Stdin,
    File(PathBuf),
    Url(String),
}

#[tokio::main]
async fn main() {
    search_stream::init_tracing();
    if let Err(error) = run().await {
        eprintln!("stream-cat failed: {error}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let config = StreamConfig::from_env().map_err(|e| e.to_string())?;
    let mut source = Source::Stdin;
    let mut query: Option<String> = None;
    let mut token = std::env::var("SEARCH_STREAM_TOKEN").ok();
    let mut aggregate: Option<AggregationMode> = None;
    let mut capacity = config.aggregation_capacity;
    let mut timeout = config.aggregation_timeout();
    let mut batch_delay: Option<Duration> = None;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = |flag: &str| {
            args.next()
                .ok_or_else(|| format!("{flag} requires a value"))
        };
        match arg.as_str() {
            "--help" | "-h" => {
                print_help();
                return Ok(());
            }
            "--url" => source = Source::Url(value("--url")?),
            "--query" | "-q" => query = Some(value("--query")?),
            "--token" => token = Some(value("--token")?),
            "--aggregate" => aggregate = Some(value("--aggregate")?.parse()?),
            "--capacity" => capacity = parse_positive(&value("--capacity")?, "--capacity")?,
            "--timeout-ms" => {
                timeout = Duration::from_millis(
                    parse_positive(&value("--timeout-ms")?, "--timeout-ms")? as u64,
                )
            }
            "--batch-ms" => {
                batch_delay = Some(Duration::from_millis(
                    parse_positive(&value("--batch-ms")?, "--batch-ms")? as u64,
                ))
            }
            "-" => source = Source::Stdin,
            other if other.starts_with('-') => {
                return Err(format!("unknown flag '{other}', see --help"));
            }
            path => source = Source::File(PathBuf::from(path)),
        }
    }

    match source {
        Source::Url(base_url) => {
            let query = query.ok_or_else(|| "--url requires --query".to_string())?;
            let client = SearchClient::new(base_url, token).map_err(|e| e.to_string())?;
            let params = SearchParams::new(query);
            if let Some(mode) = aggregate {
                let result = aggregate_search(&client, &params, mode, capacity, timeout)
                    .await
                    .map_err(|e| e.to_string())?;
                return print_json(&result);
            }
            if let Some(delay) = batch_delay {
                let mut updates = client.stream_batched(params, delay);
                while let Some(update) = updates.recv().await {
                    println!(
                        "update: {} matches, progress={:?}, done={}",
                        update.matches.len(),
                        update.progress.map(|p| p.match_count),
                        update.done
                    );
                    if let Some(error) = update.error {
                        return Err(error.message);
                    }
                }
                return Ok(());
            }
            let mut failed = None;
            client
                .stream(&params, |event| {
                    if let Err(e) = print_event(&event) {
                        failed.get_or_insert(e);
                    }
                })
                .await
                .map_err(|e| e.to_string())?;
            failed.map_or(Ok(()), Err)
        }
        Source::File(path) => {
            let file = tokio::fs::File::open(&path)
                .await
                .map_err(|e| format!("failed to open {}: {e}", path.display()))?;
            decode(file, aggregate, capacity).await
        }
        Source::Stdin => decode(tokio::io::stdin(), aggregate, capacity).await,
    }
}

async fn decode<R: AsyncRead + Unpin>(
    reader: R,
    aggregate: Option<AggregationMode>,
    capacity: usize,
) -> Result<(), String> {
    let mut aggregator = aggregate.map(|mode| SearchAggregator::new(mode, capacity));
    let saw_done = read_frames(reader, |frame| {
        let event = StreamEvent::from_frame(&frame)?;
        match aggregator.as_mut() {
            Some(aggregator) => aggregator.handle(event),
            None => print_event(&event).map_err(WireError::malformed)?,
        }
        Ok(())
    })
    .await
    .map_err(|e| e.to_string())?;

    if !saw_done {
        eprintln!("warning: input ended before the done event");
    }
    if let Some(aggregator) = aggregator {
        print_json(&aggregator.finish(None))?;
    }
    Ok(())
}

fn print_event(event: &StreamEvent) -> Result<(), String> {
    let data = match event {
        StreamEvent::Progress(p) => serde_json::to_string(p),
        StreamEvent::Matches(m) => serde_json::to_string(m),
        StreamEvent::Filters(f) => serde_json::to_string(f),
        StreamEvent::Alert(a) => serde_json::to_string(a),
        StreamEvent::Error(e) => serde_json::to_string(e),
        StreamEvent::Done => Ok("{}".to_string()),
    }
    .map_err(|e| e.to_string())?;
    println!("{}: {data}", event.name());
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<(), String> {
    let rendered = serde_json::to_string_pretty(value).map_err(|e| e.to_string())?;
    println!("{rendered}");
    Ok(())
}

fn parse_positive(raw: &str, flag: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(value) if value > 0 => Ok(value),
        _ => Err(format!("{flag} expects a positive integer, got '{raw}'")),
    }
}

fn print_help() {
    println!(
        "stream-cat: decode a search event stream\n\n\
Usage:\n  stream-cat [FILE|-] [--aggregate MODE] [--capacity N]\n  stream-cat --url BASE --query Q [--token T] [--aggregate MODE] [--timeout-ms N] [--batch-ms N]\n\n\
Options:\n\
  --url BASE        Fetch BASE/search/stream instead of reading a file or stdin\n\
  --query, -q Q     Search query (required with --url)\n\
  --token T         Access token (default: $SEARCH_STREAM_TOKEN)\n\
  --aggregate MODE  Group matches by repo, path or author and print the top groups\n\
  --capacity N      Groups tracked by --aggregate (default: $SEARCH_STREAM_AGGREGATION_CAPACITY or 30)\n\
  --timeout-ms N    Aggregation deadline (default: 60000)\n\
  --batch-ms N      Debounce events from --url into N ms windows\n\
  -h, --help        Show this help"
    );
}
