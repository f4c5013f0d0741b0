use clap::{Parser, Subcommand};
use lan_recorder::catalog::debug_info_for_path;
use lan_recorder::config::ServerConfig;
use lan_recorder::convert::{ConversionPipeline, UploadOutcome, UploadRequest};
use lan_recorder::decode::Transcoder;
use lan_recorder::quality::QualityTier;
use lan_recorder::status::StatusTracker;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(author, version, about = "Record audio from browsers on the local network and store it as WAV")]
struct Args {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run the recorder web server
    Serve {
        /// Path to config file (TOML format)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Port to listen on (overrides config file)
        #[arg(short, long)]
        port: Option<u16>,

        /// Address to bind (overrides config file)
        #[arg(short, long)]
        bind: Option<String>,

        /// Directory holding recordings (overrides config file)
        #[arg(short, long)]
        recordings_dir: Option<PathBuf>,

        /// Store uploads as received instead of converting them
        #[arg(long)]
        no_transcode: bool,
    },
    /// Print format, duration and header diagnostics for a file
    Inspect {
        /// File to inspect
        file: PathBuf,
    },
    /// Convert a local audio file into the recordings directory
    Convert {
        /// Source audio file
        input: PathBuf,

        /// Quality tier to convert to
        #[arg(short, long, value_enum, default_value = "high")]
        quality: QualityTier,

        /// Directory to write the recording into
        #[arg(short, long, default_value = "recordings")]
        output_dir: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    match args.command {
        Command::Serve {
            config,
            port,
            bind,
            recordings_dir,
            no_transcode,
        } => {
            let mut server_config = match config {
                Some(path) => ServerConfig::load(&path)?,
                None => ServerConfig::default(),
            };
            if let Some(port) = port {
                server_config.port = port;
            }
            if let Some(bind) = bind {
                server_config.bind = bind;
            }
            if let Some(dir) = recordings_dir {
                server_config.recordings_dir = dir;
            }
            if no_transcode {
                server_config.transcode = false;
            }
            lan_recorder::serve::serve(server_config)
        }
        Command::Inspect { file } => inspect(file),
        Command::Convert {
            input,
            quality,
            output_dir,
        } => convert(input, quality, output_dir),
    }
}

fn inspect(file: PathBuf) -> Result<(), Box<dyn std::error::Error>> {
    let info = debug_info_for_path(&file, Transcoder::Enabled)
        .map_err(|e| format!("Failed to inspect '{}': {}", file.display(), e))?;
    println!("{}", serde_json::to_string_pretty(&info)?);
    Ok(())
}

fn convert(
    input: PathBuf,
    quality: QualityTier,
    output_dir: PathBuf,
) -> Result<(), Box<dyn std::error::Error>> {
    let data = std::fs::read(&input)
        .map_err(|e| format!("Failed to read input file '{}': {}", input.display(), e))?;

    let mut request = UploadRequest::new(data, quality.as_str());
    request.file_name = input
        .file_name()
        .map(|name| name.to_string_lossy().into_owned());

    let pipeline = ConversionPipeline::new(output_dir.clone(), Transcoder::Enabled);
    let status = StatusTracker::new();
    let outcome = pipeline.process(&request, &status)?;

    println!("{}", serde_json::to_string_pretty(&outcome)?);
    if let UploadOutcome::StoredRaw { warning, .. } = &outcome {
        let snapshot = status.snapshot();
        eprintln!(
            "Warning: {} ({})",
            warning,
            snapshot.last_errors.file_conversion.unwrap_or_default()
        );
    }
    println!("Saved to {}", output_dir.join(outcome.filename()).display());
    Ok(())
}
