use clap::{Parser, Subcommand};
use video_panorama::synthetic::{panning_frames, panning_world, write_sequence};

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a synthetic panning sequence as png frames
    Generate {
        /// Output directory
        #[arg(short, long)]
        output: String,

        /// Number of frames to generate
        #[arg(short, long, default_value = "10")]
        num_frames: usize,

        /// Horizontal shift between frames in pixels
        #[arg(short, long, default_value = "40")]
        shift: u32,

        /// Frame width
        #[arg(long, default_value = "320")]
        width: u32,

        /// Frame height
        #[arg(long, default_value = "240")]
        height: u32,

        /// Texture seed
        #[arg(long, default_value = "7")]
        seed: u64,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    match args.command {
        Commands::Generate {
            output,
            num_frames,
            shift,
            width,
            height,
            seed,
        } => {
            let world = panning_world(num_frames, shift, width, height, seed);
            let frames = panning_frames(&world, num_frames, shift, width, height, 30.0);
            let paths = write_sequence(&frames, &output)?;
            log::info!("wrote {} frames to {}", paths.len(), output);
        }
    }

    Ok(())
}
