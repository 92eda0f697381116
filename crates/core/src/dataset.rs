//! Dataset preparation: directory layout, tile export, train/test
//! split, and random tile-pair sampling.
//!
//! The on-disk scheme pairs RGB and normal images by file name:
//!
//! ```text
//! <dataset>/training/{rgb,normal}/   exported tile pairs
//! <dataset>/testing/{rgb,normal}/    held-out tile pairs
//! <dataset>/result_<W>/              generation output
//! ```
//!
//! Tile files are named `"{image_index:02}_{tile_index:05}.png"`. The
//! engine never depends on this naming beyond receiving correctly
//! paired batches.

use std::fs;
use std::path::{Path, PathBuf};

use ndarray::Axis;
use rand::Rng;
use tracing::{debug, error, info};

use crate::codec;
use crate::error::{Error, Result};
use crate::tiling::{split_image, validate_exact_tiling};
use crate::types::{byte_to_unit, UnitImage};

/// Which half of the prepared dataset a consumer reads from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Split {
    Training,
    Testing,
}

impl Split {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Training => "training",
            Self::Testing => "testing",
        }
    }
}

/// Which side of an image pair a tile belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TileKind {
    Rgb,
    Normal,
}

impl TileKind {
    fn dir_name(self) -> &'static str {
        match self {
            Self::Rgb => "rgb",
            Self::Normal => "normal",
        }
    }
}

/// File name for one exported tile.
pub fn tile_file_name(image_index: usize, tile_index: usize) -> String {
    format!("{image_index:02}_{tile_index:05}.png")
}

/// Keep only names present in both listings. Returns `(paired, dropped)`
/// with `paired` in the RGB listing's order.
pub fn match_pairs(rgb: &[String], normal: &[String]) -> (Vec<String>, Vec<String>) {
    let mut paired = Vec::new();
    let mut dropped = Vec::new();

    for name in rgb {
        if normal.contains(name) {
            paired.push(name.clone());
        } else {
            dropped.push(name.clone());
        }
    }
    for name in normal {
        if !rgb.contains(name) {
            dropped.push(name.clone());
        }
    }

    (paired, dropped)
}

/// Sorted listing of the regular files directly inside `dir`.
fn list_files(dir: &Path) -> Result<Vec<String>> {
    let entries = fs::read_dir(dir).map_err(|source| Error::io(dir, source))?;

    let mut names = Vec::new();
    for entry in entries {
        let entry = entry.map_err(|source| Error::io(dir, source))?;
        if entry.path().is_file() {
            names.push(entry.file_name().to_string_lossy().into_owned());
        }
    }
    names.sort();
    Ok(names)
}

/// Directory scheme for one dataset, owned per run.
#[derive(Clone, Debug)]
pub struct DatasetLayout {
    pub rgb_dir: PathBuf,
    pub normal_dir: PathBuf,
    pub dataset_dir: PathBuf,
}

impl DatasetLayout {
    pub fn new(rgb_dir: PathBuf, normal_dir: PathBuf, dataset_dir: PathBuf) -> Self {
        Self {
            rgb_dir,
            normal_dir,
            dataset_dir,
        }
    }

    pub fn split_dir(&self, split: Split) -> PathBuf {
        self.dataset_dir.join(split.dir_name())
    }

    pub fn tiles_dir(&self, split: Split, kind: TileKind) -> PathBuf {
        self.split_dir(split).join(kind.dir_name())
    }

    pub fn result_dir(&self, window_size: usize) -> PathBuf {
        self.dataset_dir.join(format!("result_{window_size}"))
    }

    /// Create every directory the scheme needs, including the raw input
    /// folders when they are missing.
    pub fn ensure_directories(&self, window_size: usize) -> Result<()> {
        let dirs = [
            self.rgb_dir.clone(),
            self.normal_dir.clone(),
            self.tiles_dir(Split::Training, TileKind::Rgb),
            self.tiles_dir(Split::Training, TileKind::Normal),
            self.tiles_dir(Split::Testing, TileKind::Rgb),
            self.tiles_dir(Split::Testing, TileKind::Normal),
            self.result_dir(window_size),
        ];
        for dir in dirs {
            if !dir.exists() {
                debug!(dir = %dir.display(), "creating missing folder");
                fs::create_dir_all(&dir).map_err(|source| Error::io(dir, source))?;
            }
        }
        Ok(())
    }

    /// Delete every file inside the four tile folders.
    pub fn clear_tiles(&self) -> Result<()> {
        debug!("clearing existing tile data");
        for split in [Split::Training, Split::Testing] {
            for kind in [TileKind::Rgb, TileKind::Normal] {
                let dir = self.tiles_dir(split, kind);
                if !dir.exists() {
                    continue;
                }
                for name in list_files(&dir)? {
                    let path = dir.join(name);
                    fs::remove_file(&path).map_err(|source| Error::io(path, source))?;
                }
            }
        }
        Ok(())
    }

    /// Strict tiling export for one source image: decode, require the
    /// window to divide both dimensions, split, and write every tile
    /// into the training folder for `kind`. Returns the tile count.
    pub fn export_image_tiles(
        &self,
        source: &Path,
        kind: TileKind,
        image_index: usize,
        window_size: usize,
        window_step: usize,
    ) -> Result<usize> {
        let image = codec::decode(source)?;
        let (rows, cols, _) = image.dim();
        validate_exact_tiling(rows, cols, window_size)?;

        let tiles = split_image(image.view(), window_step, window_size, 0, 0)?;
        let out_dir = self.tiles_dir(Split::Training, kind);
        for (tile_index, tile) in tiles.axis_iter(Axis(0)).enumerate() {
            let path = out_dir.join(tile_file_name(image_index, tile_index));
            codec::encode(&path, &tile.to_owned())?;
        }
        Ok(tiles.dim().0)
    }

    /// Tile every paired RGB/normal image into the training set.
    ///
    /// A failure on one image aborts only that image: it is logged and
    /// the loop continues with the next pair.
    pub fn process_images(
        &self,
        window_size: usize,
        window_step: usize,
        erase_existing: bool,
    ) -> Result<()> {
        self.ensure_directories(window_size)?;
        if erase_existing {
            self.clear_tiles()?;
        }

        let rgb_files = list_files(&self.rgb_dir)?;
        let normal_files = list_files(&self.normal_dir)?;
        let (paired, dropped) = match_pairs(&rgb_files, &normal_files);
        for name in &dropped {
            error!(file = %name, "no RGB/normal partner found; skipping");
        }

        info!(
            images = paired.len(),
            window_size, window_step, "beginning image processing"
        );
        for (index, name) in paired.iter().enumerate() {
            let image_index = index + 1;
            if let Err(e) = self.export_image_tiles(
                &self.rgb_dir.join(name),
                TileKind::Rgb,
                image_index,
                window_size,
                window_step,
            ) {
                error!(file = %name, error = %e, "failed to tile RGB image");
                continue;
            }
            if let Err(e) = self.export_image_tiles(
                &self.normal_dir.join(name),
                TileKind::Normal,
                image_index,
                window_size,
                window_step,
            ) {
                error!(file = %name, error = %e, "failed to tile normal image");
            }
        }
        info!("image processing done");
        Ok(())
    }

    /// Move `floor(n * fraction)` tile pairs from training to testing.
    /// Returns how many pairs moved.
    pub fn create_testing_set(&self, fraction: f64) -> Result<usize> {
        let rgb_train = self.tiles_dir(Split::Training, TileKind::Rgb);
        let normal_train = self.tiles_dir(Split::Training, TileKind::Normal);
        let rgb_test = self.tiles_dir(Split::Testing, TileKind::Rgb);
        let normal_test = self.tiles_dir(Split::Testing, TileKind::Normal);

        let rgb_tiles = list_files(&rgb_train)?;
        let normal_tiles = list_files(&normal_train)?;
        if rgb_tiles.len() != normal_tiles.len() {
            return Err(Error::shape(format!(
                "RGB and normal tile counts do not match: {} vs {}",
                rgb_tiles.len(),
                normal_tiles.len()
            )));
        }

        let moves = (rgb_tiles.len() as f64 * fraction).floor() as usize;
        if moves == 0 {
            return Ok(0);
        }

        for dir in [&rgb_test, &normal_test] {
            fs::create_dir_all(dir).map_err(|source| Error::io(dir, source))?;
        }

        for name in rgb_tiles.iter().take(moves) {
            let from = rgb_train.join(name);
            fs::rename(&from, rgb_test.join(name)).map_err(|source| Error::io(from, source))?;
        }
        for name in normal_tiles.iter().take(moves) {
            let from = normal_train.join(name);
            fs::rename(&from, normal_test.join(name)).map_err(|source| Error::io(from, source))?;
        }

        info!(moved = moves, "testing set created");
        Ok(moves)
    }
}

/// Pick `count` names from `files` at random.
///
/// With `allow_duplicates` the draw is with replacement (one historical
/// revision of the pipeline allowed repeats); without it, a partial
/// shuffle yields distinct names and asking for more than exist is an
/// error rather than a hang.
fn select_samples<R: Rng>(
    files: &[String],
    count: usize,
    allow_duplicates: bool,
    rng: &mut R,
) -> Result<Vec<String>> {
    if files.is_empty() {
        return Err(Error::InvalidParameter {
            name: "count".to_string(),
            reason: "no tiles available to sample from".to_string(),
        });
    }

    if allow_duplicates {
        return Ok((0..count)
            .map(|_| files[rng.random_range(0..files.len())].clone())
            .collect());
    }

    if count > files.len() {
        return Err(Error::InvalidParameter {
            name: "count".to_string(),
            reason: format!(
                "requested {count} unique samples but only {} tiles exist",
                files.len()
            ),
        });
    }

    let mut pool: Vec<String> = files.to_vec();
    for i in 0..count {
        let j = rng.random_range(i..pool.len());
        pool.swap(i, j);
    }
    pool.truncate(count);
    Ok(pool)
}

/// One loaded batch of aligned RGB/normal tile pairs, unit range.
pub struct SampleSet {
    pub rgb: Vec<UnitImage>,
    pub normal: Vec<UnitImage>,
}

impl SampleSet {
    /// Sample `count` tile pairs from a split and load them normalized
    /// to [0, 1]. The duplicate policy is an explicit caller decision,
    /// never inferred.
    pub fn load<R: Rng>(
        layout: &DatasetLayout,
        split: Split,
        count: usize,
        allow_duplicate_samples: bool,
        rng: &mut R,
    ) -> Result<Self> {
        let rgb_dir = layout.tiles_dir(split, TileKind::Rgb);
        let normal_dir = layout.tiles_dir(split, TileKind::Normal);

        let files = list_files(&rgb_dir)?;
        let selected = select_samples(&files, count, allow_duplicate_samples, rng)?;
        info!(count = selected.len(), split = ?split, "loading dataset samples");

        let mut rgb = Vec::with_capacity(selected.len());
        let mut normal = Vec::with_capacity(selected.len());
        for name in &selected {
            let rgb_image = codec::decode(&rgb_dir.join(name))?;
            let normal_image = codec::decode(&normal_dir.join(name))?;
            rgb.push(byte_to_unit(rgb_image.view()));
            normal.push(byte_to_unit(normal_image.view()));
        }

        debug!("dataset loaded");
        Ok(Self { rgb, normal })
    }

    pub fn len(&self) -> usize {
        self.rgb.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rgb.is_empty()
    }
}
