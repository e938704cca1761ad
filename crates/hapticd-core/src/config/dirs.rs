use directories::ProjectDirs;
use std::path::PathBuf;

/// Hub directories following the XDG base directory layout
#[derive(Debug, Clone)]
pub struct Directories {
    /// Config directory (~/.config/hapticd)
    pub config: PathBuf,

    /// Cache directory (~/.cache/hapticd)
    pub cache: PathBuf,

    /// Config file path
    pub config_file: PathBuf,
}

impl Directories {
    /// Standard XDG paths, or `None` when no home directory can be found.
    #[must_use]
    pub fn new() -> Option<Self> {
        let project = ProjectDirs::from("", "", "hapticd")?;
        let config = project.config_dir().to_path_buf();

        Some(Self {
            config_file: config.join("config.json"),
            config,
            cache: project.cache_dir().to_path_buf(),
        })
    }

    #[must_use]
    pub fn with_base(base: PathBuf) -> Self {
        Self {
            config_file: base.join("config.json"),
            config: base.clone(),
            cache: base,
        }
    }

    /// Ensure all directories exist.
    ///
    /// # Errors
    ///
    /// Returns an error if any directory cannot be created.
    pub fn ensure_exists(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.config)?;
        std::fs::create_dir_all(&self.cache)?;
        Ok(())
    }
}
