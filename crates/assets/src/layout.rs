//! On-disk layout of the asset cache, and the public paths handed back to
//! the site builder.
//!
//! ```text
//! <assets root>/<cache dir>/img-cache/<filename>     cached images
//! <assets root>/<cache dir>/file-cache/<filename>    cached files
//! <public prefix>/<cache dir>/<kind dir>/<filename>  path written on the record
//! ```

use crate::error::Result;
use crate::path::{to_slash, validate};
use std::fmt;
use std::path::{Path, PathBuf};

pub const DEFAULT_ASSETS_ROOT: &str = "./src/assets";
pub const DEFAULT_CACHE_DIR: &str = "static/.cache-directus";
pub const DEFAULT_PUBLIC_PREFIX: &str = "~/assets";

/// The two kinds of binary asset a record can embed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AssetKind {
    Image,
    File,
}
impl AssetKind {
    /// Cache subdirectory holding this kind of asset.
    pub fn dir_name(self) -> &'static str {
        match self {
            Self::Image => "img-cache",
            Self::File => "file-cache",
        }
    }

    /// Path segment of the remote endpoint serving this kind of asset.
    pub fn endpoint(self) -> &'static str {
        match self {
            Self::Image => "assets",
            Self::File => "files",
        }
    }

    /// Attribute written onto the descriptor once the asset is cached.
    pub fn attribute(self) -> &'static str {
        match self {
            Self::Image => "gridsome_image",
            Self::File => "gridsome_link",
        }
    }
}
impl fmt::Display for AssetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Image => f.write_str("image"),
            Self::File => f.write_str("file"),
        }
    }
}

/// Where cached assets live, and how their paths are published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheLayout {
    assets_root: PathBuf,
    cache_dir: PathBuf,
    public_prefix: String,
}
impl CacheLayout {
    /// # Arguments
    /// * `assets_root` - Directory the site builder serves assets from
    /// * `cache_dir` - Cache directory, relative to `assets_root`
    /// * `public_prefix` - Prefix replacing `assets_root` in published paths
    ///
    /// # Errors
    ///
    /// Returns an error if `cache_dir` is absolute or escapes `assets_root`.
    pub fn new(
        assets_root: impl Into<PathBuf>,
        cache_dir: impl AsRef<Path>,
        public_prefix: impl Into<String>,
    ) -> Result<Self> {
        Ok(Self {
            assets_root: assets_root.into(),
            cache_dir: validate(cache_dir)?,
            public_prefix: public_prefix.into().trim_end_matches('/').to_string(),
        })
    }

    /// Shared top-level cache directory.
    pub fn cache_root(&self) -> PathBuf {
        self.assets_root.join(&self.cache_dir)
    }

    pub fn dir(&self, kind: AssetKind) -> PathBuf {
        self.cache_root().join(kind.dir_name())
    }

    /// Published path of a cached asset, rooted at the public prefix.
    pub fn public_path(&self, kind: AssetKind, filename: &Path) -> String {
        format!("{}/{}/{}/{}", self.public_prefix, to_slash(&self.cache_dir), kind.dir_name(), to_slash(filename))
    }
}
impl Default for CacheLayout {
    fn default() -> Self {
        Self {
            assets_root: PathBuf::from(DEFAULT_ASSETS_ROOT),
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
            public_prefix: DEFAULT_PUBLIC_PREFIX.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_layout() {
        let layout = CacheLayout::default();
        assert_eq!(layout.cache_root(), Path::new("./src/assets/static/.cache-directus"));
        assert_eq!(layout.dir(AssetKind::Image), Path::new("./src/assets/static/.cache-directus/img-cache"));
        assert_eq!(layout.dir(AssetKind::File), Path::new("./src/assets/static/.cache-directus/file-cache"));
        assert_eq!(
            layout.public_path(AssetKind::Image, Path::new("photo.jpg")),
            "~/assets/static/.cache-directus/img-cache/photo.jpg"
        );
    }

    #[test]
    fn test_custom_layout() {
        let layout = CacheLayout::new("/srv/site/assets", "cache", "/assets/").unwrap();
        assert_eq!(layout.dir(AssetKind::File), Path::new("/srv/site/assets/cache/file-cache"));
        assert_eq!(layout.public_path(AssetKind::File, Path::new("a.pdf")), "/assets/cache/file-cache/a.pdf");
        assert!(CacheLayout::new("/srv", "../cache", "~").is_err());
    }
}
