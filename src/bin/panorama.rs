use clap::Parser;
use std::path::PathBuf;
use std::time::Instant;
use video_panorama::io::{object_from_json, save_panorama, write_report};
use video_panorama::visualization::draw_placements;
use video_panorama::{CancelToken, MotionModel, StitchConfig, stitch_video};

#[derive(Parser)]
#[command(version, about, author)]
struct PanoramaCli {
    /// video file, gif, or folder of png/jpg frames
    path: PathBuf,

    /// stitch config json, fields not given keep their defaults
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// output panorama image
    #[arg(short, long, default_value = "panorama.png")]
    output: PathBuf,

    /// also write the panorama with placement rectangles drawn on it
    #[arg(long)]
    overlay: Option<PathBuf>,

    /// also write a text report of the run
    #[arg(long)]
    report: Option<PathBuf>,

    #[arg(long)]
    max_frames: Option<usize>,

    #[arg(long)]
    focal_length: Option<f64>,

    #[arg(long)]
    min_match_num: Option<usize>,

    #[arg(long)]
    max_match_num: Option<usize>,

    #[arg(long)]
    resize_factor: Option<f64>,

    #[arg(long)]
    max_canvas_area: Option<u64>,

    /// fit rotation and scale as well as translation
    #[arg(long, default_value_t = false)]
    similarity: bool,

    #[arg(long, default_value_t = false)]
    progress: bool,
}

impl PanoramaCli {
    fn stitch_config(&self) -> video_panorama::Result<StitchConfig> {
        let mut config: StitchConfig = match &self.config {
            Some(path) => object_from_json(path)?,
            None => StitchConfig::default(),
        };
        if let Some(v) = self.max_frames {
            config.max_frames = v;
        }
        if let Some(v) = self.focal_length {
            config.focal_length = v;
        }
        if let Some(v) = self.min_match_num {
            config.min_match_num = v;
        }
        if let Some(v) = self.max_match_num {
            config.max_match_num = v;
        }
        if let Some(v) = self.resize_factor {
            config.resize_factor = v;
        }
        if let Some(v) = self.max_canvas_area {
            config.max_canvas_area = v;
        }
        if self.similarity {
            config.motion_model = MotionModel::Similarity;
        }
        config.show_progress |= self.progress;
        Ok(config)
    }
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = PanoramaCli::parse();
    let config = cli.stitch_config()?;
    log::debug!("{:?}", config);

    let now = Instant::now();
    let output = stitch_video(&cli.path, &config, &CancelToken::new())?;
    log::info!(
        "stitching {} frames took {:.3} sec",
        output.summary.frames,
        now.elapsed().as_secs_f64()
    );

    let placements = save_panorama(&output.panorama, &cli.output)?;
    println!(
        "{}x{} panorama at {}, placements at {}, {:.3} fps",
        output.panorama.width(),
        output.panorama.height(),
        cli.output.display(),
        placements.display(),
        output.frame_rate
    );
    if let Some(path) = &cli.overlay {
        draw_placements(&output.panorama).save(path)?;
    }
    if let Some(path) = &cli.report {
        write_report(path, &output)?;
    }
    Ok(())
}
