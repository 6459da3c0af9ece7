//! Image catalog and poem metadata
//!
//! The catalog is built once at startup from the images directory and is
//! immutable afterwards. Image files are named `{poem_title}_{kind}.jpg` or
//! `.png`, where kind identifies the generator that produced the image.
//! Poem metadata (author, content, curated distractor titles) comes from a
//! `poems.toml` file in the root folder.

use crate::{Error, Result};
use rand::seq::SliceRandom;
use serde::Deserialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Generator kinds recognized in image filenames
pub const VALID_KINDS: [&str; 4] = ["gpt", "mj", "nano", "seedream"];

/// One catalog entry: an image file paired with its owning poem
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Path relative to the images directory, used as the image identifier
    pub path: String,
    pub poem_title: String,
    /// Generator kind parsed from the filename (gpt, mj, nano, seedream)
    pub kind: String,
}

/// Poem metadata from poems.toml
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PoemInfo {
    pub title: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub content: String,
    /// Curated similar titles, preferred as phase-1 distractors
    #[serde(default)]
    pub similar_titles: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct PoemsFile {
    #[serde(default)]
    poems: Vec<PoemInfo>,
}

/// Immutable image catalog plus poem metadata
#[derive(Debug, Clone)]
pub struct ImageCatalog {
    entries: Vec<CatalogEntry>,
    poems: HashMap<String, PoemInfo>,
    titles: HashSet<String>,
}

impl ImageCatalog {
    /// Build the catalog by scanning `images_dir` and loading `poems_path`.
    ///
    /// An empty catalog is a startup-fatal error: the service must not run
    /// without images to hand out.
    pub fn load(images_dir: &Path, poems_path: &Path) -> Result<Self> {
        if !images_dir.is_dir() {
            return Err(Error::Catalog(format!(
                "Image directory not found: {}",
                images_dir.display()
            )));
        }

        let mut entries = Vec::new();
        for entry in WalkDir::new(images_dir)
            .min_depth(1)
            .max_depth(1)
            .into_iter()
            .filter_map(|e| e.ok())
        {
            if !entry.file_type().is_file() {
                continue;
            }
            let file_name = entry.file_name().to_string_lossy().to_string();
            match parse_image_name(&file_name) {
                Some((poem_title, kind)) => {
                    entries.push(CatalogEntry {
                        path: file_name,
                        poem_title,
                        kind,
                    });
                }
                None => {
                    debug!("Skipping non-catalog file: {}", file_name);
                }
            }
        }

        if entries.is_empty() {
            return Err(Error::Catalog(format!(
                "No valid images found in {} (expected {{poem_title}}_{{kind}}.jpg|png)",
                images_dir.display()
            )));
        }

        let poems = load_poems(poems_path)?;
        let titles: HashSet<String> = entries.iter().map(|e| e.poem_title.clone()).collect();

        for title in &titles {
            if !poems.contains_key(title) {
                warn!("No poem metadata for title '{}'", title);
            }
        }

        info!(
            "Built catalog with {} images across {} poem titles",
            entries.len(),
            titles.len()
        );

        Ok(Self {
            entries,
            poems,
            titles,
        })
    }

    /// All image entries
    pub fn entries(&self) -> &[CatalogEntry] {
        &self.entries
    }

    /// Number of images
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Distinct poem titles present in the catalog
    pub fn titles(&self) -> &HashSet<String> {
        &self.titles
    }

    /// Poem metadata for a title, if available
    pub fn poem(&self, title: &str) -> Option<&PoemInfo> {
        self.poems.get(title)
    }

    /// Pick `count` distractor titles for a phase-1 round.
    ///
    /// Curated similar titles (that exist in the catalog) are used first;
    /// the remainder is filled with random catalog titles. Errors if the
    /// catalog doesn't hold enough distinct titles.
    pub fn distractors(&self, target_title: &str, count: usize) -> Result<Vec<String>> {
        let mut picked: Vec<String> = self
            .poems
            .get(target_title)
            .map(|info| {
                info.similar_titles
                    .iter()
                    .filter(|t| self.titles.contains(*t) && t.as_str() != target_title)
                    .take(count)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();

        if picked.len() < count {
            let mut remaining: Vec<&String> = self
                .titles
                .iter()
                .filter(|t| t.as_str() != target_title && !picked.contains(*t))
                .collect();

            if picked.len() + remaining.len() < count {
                return Err(Error::Catalog(format!(
                    "Not enough poems for distractors: need {}, have {}",
                    count,
                    picked.len() + remaining.len()
                )));
            }

            let mut rng = rand::thread_rng();
            remaining.shuffle(&mut rng);
            picked.extend(
                remaining
                    .into_iter()
                    .take(count - picked.len())
                    .cloned(),
            );
        }

        picked.truncate(count);
        Ok(picked)
    }
}

/// Parse `{poem_title}_{kind}.jpg|png` into (title, kind)
fn parse_image_name(file_name: &str) -> Option<(String, String)> {
    let stem = file_name
        .strip_suffix(".jpg")
        .or_else(|| file_name.strip_suffix(".png"))?;

    let (title, kind) = stem.rsplit_once('_')?;
    if title.is_empty() || !VALID_KINDS.contains(&kind) {
        return None;
    }

    Some((title.to_string(), kind.to_string()))
}

fn load_poems(poems_path: &Path) -> Result<HashMap<String, PoemInfo>> {
    if !poems_path.exists() {
        warn!(
            "Poem metadata file not found: {} (serving titles only)",
            poems_path.display()
        );
        return Ok(HashMap::new());
    }

    let content = std::fs::read_to_string(poems_path)?;
    let file: PoemsFile = toml::from_str(&content)
        .map_err(|e| Error::Catalog(format!("Failed to parse {}: {}", poems_path.display(), e)))?;

    Ok(file
        .poems
        .into_iter()
        .map(|p| (p.title.clone(), p))
        .collect())
}
