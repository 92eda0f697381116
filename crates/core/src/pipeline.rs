//! Full-image generation: decode → downscale → tile → predict → stitch.
//!
//! Everything a run needs travels in an explicit [`BuildRequest`];
//! nothing persists across images, so consecutive runs with different
//! sizes cannot contaminate each other.

use std::fs;
use std::path::{Path, PathBuf};

use rand::Rng;
use tracing::info;

use crate::codec;
use crate::downscale::shrink_pair_to_fit;
use crate::error::{Error, Result};
use crate::predictor::Predictor;
use crate::stitch::{rebuild_full, rebuild_windowed};
use crate::tiling::split_image;
use crate::types::{byte_to_unit, unit_to_byte, ByteImage};

/// Per-run settings for one full-image generation.
#[derive(Clone, Debug)]
pub struct BuildRequest {
    pub rgb_dir: PathBuf,
    pub normal_dir: PathBuf,
    /// Where the generated map and diagnostic snapshots land.
    pub work_dir: PathBuf,
    pub window_size: usize,
    pub shift: usize,
    pub max_dimension: usize,
}

/// Drives one extraction → prediction → reconstruction pass over a
/// source image and writes the result plus diagnostics.
pub struct NormalMapBuilder<'a> {
    request: BuildRequest,
    predictor: &'a mut dyn Predictor,
}

/// Pick a random file name from a directory of source images.
fn select_random_image<R: Rng>(dir: &Path, rng: &mut R) -> Result<String> {
    let entries = fs::read_dir(dir).map_err(|source| Error::io(dir, source))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::io(dir, source))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();

    if names.is_empty() {
        return Err(Error::InvalidParameter {
            name: "rgb_dir".to_string(),
            reason: format!("no source images in {}", dir.display()),
        });
    }
    Ok(names[rng.random_range(0..names.len())].clone())
}

impl<'a> NormalMapBuilder<'a> {
    pub fn new(request: BuildRequest, predictor: &'a mut dyn Predictor) -> Self {
        Self { request, predictor }
    }

    /// Generate a normal map for one randomly selected source image and
    /// write `built_<W>.png` together with the input and expected
    /// snapshots into the work directory. Returns the output path.
    pub fn generate<R: Rng>(&mut self, rng: &mut R) -> Result<PathBuf> {
        info!("generating full normal map");

        let name = select_random_image(&self.request.rgb_dir, rng)?;
        info!(image = %name, "selected source image");

        let rgb = codec::decode(&self.request.rgb_dir.join(&name))?;
        let expected = codec::decode(&self.request.normal_dir.join(&name))?;
        let (rgb, expected) = shrink_pair_to_fit(rgb, expected, self.request.max_dimension);

        let built = self.build_from(&rgb)?;

        let w = self.request.window_size;
        fs::create_dir_all(&self.request.work_dir)
            .map_err(|source| Error::io(&self.request.work_dir, source))?;

        let built_path = self.request.work_dir.join(format!("built_{w}.png"));
        codec::encode(&built_path, &built)?;
        codec::encode(
            &self.request.work_dir.join(format!("input_rgb_{w}.png")),
            &rgb,
        )?;
        codec::encode(
            &self.request.work_dir.join(format!("expected_full_{w}.png")),
            &expected,
        )?;

        info!(path = %built_path.display(), "normal map generation finished");
        Ok(built_path)
    }

    /// Run the predict-and-stitch pass appropriate for the configured
    /// shift: a disjoint grid when shift equals the window size, banded
    /// overwrite stitching otherwise.
    pub fn build_from(&mut self, image: &ByteImage) -> Result<ByteImage> {
        let window = self.request.window_size;
        let shift = self.request.shift;
        let image_size = image.dim().0;

        let unit = if shift == window {
            let unit_input = byte_to_unit(image.view());
            let tiles = split_image(unit_input.view(), shift, window, 0, 0)?;
            let requested = tiles.dim().0;

            let predicted = self.predictor.predict(tiles.view())?;
            if predicted.dim().0 != requested {
                return Err(Error::Predictor {
                    expected: requested,
                    actual: predicted.dim().0,
                });
            }
            rebuild_full(predicted.view(), image_size, window)?
        } else {
            rebuild_windowed(image, self.predictor, shift, window)?
        };

        Ok(unit_to_byte(unit.view()))
    }
}
