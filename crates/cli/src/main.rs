use std::path::PathBuf;
use std::time::{Duration, Instant};

use anyhow::{bail, Result};
use clap::{Parser, Subcommand};
use tracing::info;

use fdv_player::{
    HeadlessPresentation, OutOfRangeMode, Player, PlayerConfig, PlayerEvent, SourceDescriptor,
};

#[derive(Parser)]
#[command(name = "fdv-cli")]
#[command(about = "Headless volumetric sequence playback and inspection")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Open a sequence and print its capability metadata
    Probe {
        /// Sequence path
        path: PathBuf,

        /// Print metadata as JSON
        #[arg(long)]
        json: bool,
    },

    /// Play a sequence headless and report playback statistics
    Play {
        /// Sequence path
        path: PathBuf,

        /// How long to play before stopping
        #[arg(long, default_value = "5")]
        seconds: u64,

        /// First active frame
        #[arg(long, default_value = "0")]
        first: i32,

        /// Last active frame (-1 = end of sequence)
        #[arg(long, default_value = "-1")]
        last: i32,

        /// Behavior at the range boundary (loop, reverse, stop, hide)
        #[arg(long, default_value = "loop")]
        mode: String,

        /// Request per-vertex normals from the decoder
        #[arg(long)]
        normals: bool,
    },

    /// Decode a single frame without playing
    Preview {
        /// Sequence path
        path: PathBuf,

        /// Frame to decode
        #[arg(long, default_value = "0")]
        frame: i32,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::fmt().with_max_level(level).init();

    match cli.command {
        Commands::Probe { path, json } => probe_command(path, json),
        Commands::Play {
            path,
            seconds,
            first,
            last,
            mode,
            normals,
        } => play_command(path, seconds, first, last, &mode, normals),
        Commands::Preview { path, frame } => preview_command(path, frame),
    }
}

fn parse_mode(mode: &str) -> Result<OutOfRangeMode> {
    Ok(match mode {
        "loop" => OutOfRangeMode::Loop,
        "reverse" => OutOfRangeMode::Reverse,
        "stop" => OutOfRangeMode::Stop,
        "hide" => OutOfRangeMode::Hide,
        other => bail!("unknown out-of-range mode '{other}' (loop, reverse, stop, hide)"),
    })
}

fn file_source(path: PathBuf, active_range: (i32, i32)) -> SourceDescriptor {
    SourceDescriptor::Files { path, active_range }
}

fn probe_command(path: PathBuf, json: bool) -> Result<()> {
    let mut player = Player::new(
        PlayerConfig {
            source: Some(file_source(path, (0, -1))),
            auto_play: false,
            ..PlayerConfig::default()
        },
        Box::new(HeadlessPresentation::default()),
    );
    player.initialize()?;
    let info = player
        .session_info()
        .ok_or_else(|| anyhow::anyhow!("no session after initialize"))?;

    if json {
        println!("{}", serde_json::to_string_pretty(&info)?);
    } else {
        println!("backend:        {}", backend_name());
        println!("frames:         {}", info.frame_count);
        println!("frame rate:     {:.2} fps", info.frame_rate);
        println!("texture:        {0}x{0} {1:?}", info.texture_size, info.texture_encoding);
        println!("max vertices:   {}", info.max_vertices);
        println!("max triangles:  {}", info.max_triangles);
    }
    player.uninitialize();
    Ok(())
}

fn play_command(
    path: PathBuf,
    seconds: u64,
    first: i32,
    last: i32,
    mode: &str,
    normals: bool,
) -> Result<()> {
    let mut player = Player::new(
        PlayerConfig {
            source: Some(file_source(path, (first, last))),
            out_of_range_mode: parse_mode(mode)?,
            compute_normals: normals,
            diagnostics: true,
            ..PlayerConfig::default()
        },
        Box::new(HeadlessPresentation::default()),
    );
    player.initialize()?;
    info!(
        frames = player.active_frame_count(),
        rate = player.frame_rate(),
        "playing"
    );

    let deadline = Instant::now() + Duration::from_secs(seconds);
    let mut out_of_range = 0u32;
    while Instant::now() < deadline && player.is_playing() {
        player.update();
        for event in player.events().try_iter() {
            if event == PlayerEvent::OutOfRange {
                out_of_range += 1;
            }
        }
        std::thread::sleep(Duration::from_millis(4));
    }
    player.play(false);
    player.update();

    let stats = player.stats();
    println!("final frame:        {}", player.current_frame());
    println!("frames delivered:   {}", stats.delivered_frames);
    println!("frames presented:   {}", stats.presented_frames);
    println!("decode rate:        {:.1} fps", stats.decode_fps);
    println!("update rate:        {:.1} fps", stats.update_fps);
    println!("range crossings:    {out_of_range}");
    player.uninitialize();
    Ok(())
}

fn preview_command(path: PathBuf, frame: i32) -> Result<()> {
    let mut player = Player::new(
        PlayerConfig {
            source: Some(file_source(path, (0, -1))),
            preview_frame: frame,
            ..PlayerConfig::default()
        },
        Box::new(HeadlessPresentation::default()),
    );
    player.preview()?;
    println!(
        "decoded frame {frame} of {} ({})",
        player.frame_count(),
        backend_name()
    );
    Ok(())
}

fn backend_name() -> &'static str {
    if fdv_bridge::is_native_backend() {
        "native decoder"
    } else {
        "stub decoder"
    }
}
