use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Detail pages already fetched, one `{image_id}.html` file each.
///
/// Re-running the metadata stage reads from here instead of hitting the site
/// again. Only pages that passed validation are stored.
#[derive(Debug, Clone)]
pub struct HtmlCache {
    dir: PathBuf,
}

impl HtmlCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, image_id: &str) -> PathBuf {
        self.dir.join(format!("{image_id}.html"))
    }

    /// The cached page for `image_id`, if one exists and is readable.
    pub fn get(&self, image_id: &str) -> Option<String> {
        let path = self.path_for(image_id);
        match fs::read_to_string(&path) {
            Ok(html) => {
                tracing::debug!(path = %path.display(), bytes = html.len(), "Cache hit");
                Some(html)
            }
            Err(_) => None,
        }
    }

    pub fn put(&self, image_id: &str, html: &str) -> Result<PathBuf> {
        fs::create_dir_all(&self.dir)
            .with_context(|| format!("Failed to create cache dir {}", self.dir.display()))?;
        let path = self.path_for(image_id);
        fs::write(&path, html).with_context(|| format!("Failed to write {}", path.display()))?;
        tracing::debug!(path = %path.display(), bytes = html.len(), "Cached raw HTML");
        Ok(path)
    }
}
