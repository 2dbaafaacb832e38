//! Debug script to run a stream lookup against the live sites
//!
//! ```text
//! cargo run --example debug_streams -- 603 movie
//! RUST_LOG=streamscout_core=debug cargo run --example debug_streams -- 1399 tv 1 1 vixsrc
//! ```

use streamscout_core::StreamScraper;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("streamscout_core=info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let id = args.first().map(String::as_str).unwrap_or("603");
    let media_type = args.get(1).map(String::as_str).unwrap_or("movie");
    let season = args.get(2).and_then(|s| s.parse().ok());
    let episode = args.get(3).and_then(|s| s.parse().ok());
    let provider = args.get(4);

    let scraper = StreamScraper::new()?;
    println!("Providers: {}", scraper.providers().join(", "));
    println!("Looking up {media_type} {id} (season {season:?}, episode {episode:?})...\n");

    let streams = match provider {
        Some(provider) => {
            scraper
                .provider_streams(provider, id, media_type, season, episode)
                .await
        }
        None => scraper.get_streams(id, media_type, season, episode).await,
    };

    if streams.is_empty() {
        println!("No streams found");
        return Ok(());
    }

    for (i, stream) in streams.iter().enumerate() {
        println!("{:>3}. {} [{}] {}", i + 1, stream.name, stream.quality, stream.size);
        println!("     {}", stream.title);
        println!("     {}", stream.url);
        for (name, value) in &stream.headers {
            println!("     {name}: {value}");
        }
        for subtitle in &stream.subtitles {
            println!("     subtitle {}: {}", subtitle.language, subtitle.url);
        }
    }

    Ok(())
}
