mod cli;

use anyhow::{Context, Result};
use clap::Parser;
use cli::{Cli, Commands};
use serde::Serialize;
use std::path::Path;
use std::sync::Arc;
use tokio::fs::File;
use warp_media::mp4::{Atom, HandlerType};
use warp_media::{Fragment, InitInfo, Sample};
use warp_player::config::{self, PlayerConfig};
use warp_player::protocol::{read_message, Message, StreamReader};
use warp_player::track::Segment;

#[derive(Serialize)]
struct Report {
    message: Message,
    #[serde(skip_serializing_if = "Option::is_none")]
    init: Option<InitSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    atoms: Vec<AtomSummary>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    samples: Vec<Sample>,
}

#[derive(Serialize)]
struct InitSummary {
    timescale: u32,
    codecs: String,
    tracks: Vec<TrackSummary>,
}

#[derive(Serialize)]
struct TrackSummary {
    id: u32,
    handler: String,
    timescale: u32,
    codec: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    sample_rate: Option<u32>,
    channels: Option<u16>,
}

#[derive(Serialize)]
struct AtomSummary {
    kind: String,
    size: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    fragment_samples: Option<usize>,
}

impl From<&InitInfo> for InitSummary {
    fn from(info: &InitInfo) -> Self {
        Self {
            timescale: info.timescale,
            codecs: info.codecs(),
            tracks: info
                .tracks
                .iter()
                .map(|t| TrackSummary {
                    id: t.track_id,
                    handler: handler_name(t.handler_type),
                    timescale: t.timescale,
                    codec: t.codec_string(),
                    width: t.width,
                    height: t.height,
                    sample_rate: t.sample_rate,
                    channels: t.channels,
                })
                .collect(),
        }
    }
}

fn handler_name(handler: HandlerType) -> String {
    match handler {
        HandlerType::Video => "video".to_string(),
        HandlerType::Audio => "audio".to_string(),
        HandlerType::Hint => "hint".to_string(),
        HandlerType::Meta => "meta".to_string(),
        HandlerType::Text => "text".to_string(),
        HandlerType::Unknown(code) => String::from_utf8_lossy(&code).into_owned(),
    }
}

async fn open_stream(path: &Path, config: &PlayerConfig) -> Result<(Message, StreamReader<File>)> {
    let file = File::open(path)
        .await
        .with_context(|| format!("Failed to open stream file: {:?}", path))?;
    let mut reader = StreamReader::new(file);

    let message = read_message(&mut reader, config.protocol.max_header_size)
        .await
        .with_context(|| format!("Failed to decode frame in {:?}", path))?
        .with_context(|| format!("Stream file is empty: {:?}", path))?;

    Ok((message, reader))
}

async fn read_init(reader: &mut StreamReader<File>, config: &PlayerConfig) -> Result<InitInfo> {
    let mut data = Vec::new();
    while let Some(chunk) = reader.read_chunk(config.protocol.read_chunk_size).await? {
        data.extend_from_slice(&chunk);
    }

    InitInfo::parse(&data)?.context("Init stream ended before a complete moov")
}

async fn inspect(
    file: &Path,
    init_path: Option<&Path>,
    json: bool,
    config: &PlayerConfig,
) -> Result<()> {
    let (message, mut reader) = open_stream(file, config).await?;
    tracing::debug!(?message, "Decoded frame header");

    let mut report = Report {
        message: message.clone(),
        init: None,
        atoms: Vec::new(),
        samples: Vec::new(),
    };

    match &message {
        Message::Init(_) => {
            let info = read_init(&mut reader, config).await?;
            report.init = Some(InitSummary::from(&info));
        }
        Message::Segment(msg) => {
            // Samples can only be resolved against the init the segment names.
            let mut segment = match init_path {
                Some(path) => {
                    let (init_message, mut init_reader) = open_stream(path, config).await?;
                    match init_message {
                        Message::Init(init) if init.id == msg.init => {}
                        other => anyhow::bail!(
                            "{:?} is not the init stream for init {} (found {:?})",
                            path,
                            msg.init,
                            other
                        ),
                    }
                    let info = read_init(&mut init_reader, config).await?;
                    Some(Segment::new(msg.init, Arc::new(info), msg.timestamp))
                }
                None => None,
            };

            while !reader.done().await? {
                let atom = reader.read_atom(config.protocol.max_atom_size).await?;
                let header = Atom::peek(&atom)?.context("Truncated atom")?;

                let fragment_samples = if header.atom_type == warp_media::AtomType::MOOF {
                    Some(Fragment::parse(&atom)?.sample_count())
                } else {
                    None
                };

                report.atoms.push(AtomSummary {
                    kind: header.atom_type.to_string(),
                    size: atom.len(),
                    fragment_samples,
                });

                if let Some(segment) = segment.as_mut() {
                    segment.push(atom)?;
                    report.samples.extend(segment.take_samples()?);
                }
            }
        }
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }

    Ok(())
}

fn print_report(report: &Report) {
    match &report.message {
        Message::Init(msg) => println!("Init: id {}", msg.id),
        Message::Segment(msg) => println!(
            "Segment: init {}, timestamp {} ms",
            msg.init, msg.timestamp
        ),
    }

    if let Some(ref init) = report.init {
        println!("Timescale: {}", init.timescale);
        println!("Codecs: {}", init.codecs);
        println!("\nTracks: {}", init.tracks.len());
        for track in &init.tracks {
            print!(
                "  [{}] {} {}",
                track.id,
                track.handler,
                track.codec.as_deref().unwrap_or("unknown")
            );
            if let (Some(w), Some(h)) = (track.width, track.height) {
                print!(" {}x{}", w, h);
            }
            if let Some(rate) = track.sample_rate {
                print!(" {} Hz", rate);
            }
            if let Some(channels) = track.channels {
                print!(" {}ch", channels);
            }
            println!(" (timescale {})", track.timescale);
        }
    }

    if !report.atoms.is_empty() {
        println!("\nAtoms: {}", report.atoms.len());
        for atom in &report.atoms {
            print!("  {} {} bytes", atom.kind, atom.size);
            if let Some(count) = atom.fragment_samples {
                print!(", {} samples", count);
            }
            println!();
        }
    }

    if !report.samples.is_empty() {
        let keyframes = report.samples.iter().filter(|s| s.is_keyframe).count();
        println!(
            "\nSamples: {} ({} keyframes)",
            report.samples.len(),
            keyframes
        );
        for sample in &report.samples {
            println!(
                "  track {} pts {:.3}s dts {:.3}s {} bytes{}",
                sample.track_id,
                sample.pts_secs(),
                sample.dts_secs(),
                sample.data.len(),
                if sample.is_keyframe { " [key]" } else { "" }
            );
        }
    }
}

fn validate_config(path: Option<&Path>) -> Result<()> {
    match path {
        Some(p) => {
            println!("Validating config: {:?}", p);
            let config = config::load_config(p)?;
            println!("✓ Configuration is valid");
            print_config(&config);
        }
        None => {
            println!("No config file specified, using defaults");
            print_config(&PlayerConfig::default());
        }
    }

    Ok(())
}

fn print_config(config: &PlayerConfig) {
    println!("  Max header size: {} bytes", config.protocol.max_header_size);
    println!("  Max atom size: {} bytes", config.protocol.max_atom_size);
    println!("  Read chunk size: {} bytes", config.protocol.read_chunk_size);
    println!("  Tick interval: {} ms", config.playback.tick_interval_ms);
    println!("  Stream backlog: {}", config.session.stream_backlog);
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Respect RUST_LOG env var if set, otherwise use defaults based on verbose flag
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| {
        if cli.verbose {
            "warp_player=trace,warp_media=trace".to_string()
        } else {
            "warp_player=info,warp_media=info".to_string()
        }
    });

    tracing_subscriber::fmt()
        .with_env_filter(&env_filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Inspect { file, init, json } => {
            let config = config::load_config_or_default(cli.config.as_deref())?;
            let rt = tokio::runtime::Runtime::new()?;
            rt.block_on(inspect(&file, init.as_deref(), json, &config))
        }
        Commands::Validate {
            config: config_path,
        } => {
            let path = config_path.or(cli.config);
            validate_config(path.as_deref())
        }
    }
}
