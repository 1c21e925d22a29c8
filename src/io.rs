use std::io::Write;
use std::path::{Path, PathBuf};

use serde::{Serialize, de::DeserializeOwned};

use crate::compositor::Panorama;
use crate::error::Result;
use crate::pipeline::StitchOutput;

/// Serializes an object to a JSON file.
pub fn object_to_json<T: Serialize>(output_path: impl AsRef<Path>, object: &T) -> Result<()> {
    let j = serde_json::to_string_pretty(object)?;
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(j.as_bytes())?;
    Ok(())
}

/// Deserializes an object from a JSON file.
pub fn object_from_json<T: DeserializeOwned>(file_path: impl AsRef<Path>) -> Result<T> {
    let contents = std::fs::read_to_string(file_path)?;
    Ok(serde_json::from_str(&contents)?)
}

/// `<dir>/<stem>.placements.json` next to an image path.
pub fn placements_path(image_path: &Path) -> PathBuf {
    let stem = image_path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("panorama");
    image_path.with_file_name(format!("{}.placements.json", stem))
}

/// Writes the panorama image (format from the extension) and its placement index.
///
/// Returns the path of the placement file.
pub fn save_panorama(panorama: &Panorama, image_path: impl AsRef<Path>) -> Result<PathBuf> {
    let image_path = image_path.as_ref();
    if let Some(dir) = image_path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)?;
    }
    panorama.image.save(image_path)?;
    let json_path = placements_path(image_path);
    object_to_json(&json_path, &panorama.placements)?;
    log::info!(
        "saved {}x{} panorama to {}",
        panorama.width(),
        panorama.height(),
        image_path.display()
    );
    Ok(json_path)
}

/// Writes a short human-readable run report.
pub fn write_report(output_path: impl AsRef<Path>, output: &StitchOutput) -> Result<()> {
    let mut s = String::new();
    s += format!(
        "panorama: {}x{} px, {} channels\n",
        output.panorama.width(),
        output.panorama.height(),
        output.panorama.channels()
    )
    .as_str();
    s += format!("frame rate: {:.3} fps\n", output.frame_rate).as_str();
    s += format!(
        "frames: {} (aligned {}, estimated {}, skipped {})\n\n",
        output.summary.frames,
        output.summary.aligned,
        output.summary.estimated,
        output.summary.skipped
    )
    .as_str();
    for p in output.panorama.placements.iter() {
        s += format!(
            "frame {:>4} t={:>8.3}s  x={:>6} y={:>6} {}x{}  {:?}\n",
            p.frame_index, p.timestamp, p.rect.x, p.rect.y, p.rect.width, p.rect.height, p.status
        )
        .as_str();
    }
    let mut file = std::fs::File::create(output_path)?;
    file.write_all(s.as_bytes())?;
    Ok(())
}
