//! CLI Tooling
//!
//! Command-line interface: mounting plus offline playlist and library
//! maintenance against the same metadata store.

use crate::config::{ConfigLoader, MulifsConfig};
use crate::error::{ApiError, FsError};
use crate::fuse::path::VirtualPath;
use crate::ingest::LibraryIngestor;
use crate::library::Library;
use crate::types::{BucketPath, Container, DirEntry};
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::{Arc, OnceLock};
use tracing::info;

/// Music library filesystem
#[derive(Parser, Debug)]
#[command(name = "mulifs")]
#[command(about = "Mount a music library as playlists and artist/album directories")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Backing library root (overrides library.root)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Metadata store directory (overrides library.store_path)
    #[arg(long, global = true)]
    pub store: Option<PathBuf>,

    /// Configuration file layered over the global config
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Shorthand for --log-level debug
    #[arg(long, default_value = "false")]
    pub verbose: bool,

    /// Log level (trace, debug, info, warn, error, off)
    #[arg(long)]
    pub log_level: Option<String>,

    /// Log format (json, text)
    #[arg(long)]
    pub log_format: Option<String>,

    /// Log output (stdout, stderr, file, file+stderr, both)
    #[arg(long)]
    pub log_output: Option<String>,

    /// Log file path (if output includes "file")
    #[arg(long)]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Mount the library and serve it until unmounted
    Mount {
        /// Mountpoint (overrides mount.mountpoint)
        mountpoint: Option<PathBuf>,
        /// Allow other users to access the mount
        #[arg(long)]
        allow_other: bool,
    },
    /// Manage playlists
    Playlist {
        #[command(subcommand)]
        command: PlaylistCommands,
    },
    /// List artists, or the albums of one artist
    Artists {
        artist: Option<String>,
    },
    /// Print the real location of a mount-relative entry, e.g. `playlists/mix/track1`
    Resolve {
        path: String,
    },
    /// Move a file into the library as if it had been dropped
    Ingest {
        file: PathBuf,
    },
    /// Print the effective configuration
    Config,
}

#[derive(Subcommand, Debug)]
pub enum PlaylistCommands {
    /// Create a playlist (names are normalized)
    Create { name: String },
    /// Register a file in a playlist under the given entry name
    Add {
        playlist: String,
        song: String,
        path: PathBuf,
    },
    /// List playlists
    List,
    /// List the entries of a playlist with their resolved paths
    Songs { playlist: String },
}

impl Cli {
    /// Apply command-line overrides to a loaded configuration.
    pub fn apply_overrides(&self, config: &mut MulifsConfig) {
        if let Some(root) = &self.root {
            config.library.root = Some(root.clone());
        }
        if let Some(store) = &self.store {
            config.library.store_path = Some(store.clone());
        }
        if let Commands::Mount {
            mountpoint,
            allow_other,
        } = &self.command
        {
            if let Some(mountpoint) = mountpoint {
                config.mount.mountpoint = Some(mountpoint.clone());
            }
            config.mount.allow_other |= *allow_other;
        }

        let logging = &mut config.logging;
        if self.verbose {
            logging.level = "debug".to_string();
        }
        if let Some(level) = &self.log_level {
            logging.level = level.clone();
        }
        if let Some(format) = &self.log_format {
            logging.format = format.clone();
        }
        if let Some(output) = &self.log_output {
            logging.output = output.clone();
        }
        if let Some(file) = &self.log_file {
            logging.file = Some(file.clone());
        }
    }
}

/// CLI context: effective configuration plus the library, opened on first use.
pub struct CliContext {
    config: MulifsConfig,
    library: OnceLock<Arc<Library>>,
}

impl CliContext {
    /// Load configuration and apply the command-line overrides.
    pub fn new(cli: &Cli) -> Result<Self, ApiError> {
        let mut config = ConfigLoader::load(cli.config.as_deref())?;
        cli.apply_overrides(&mut config);
        Ok(Self::from_config(config))
    }

    pub fn from_config(config: MulifsConfig) -> Self {
        Self {
            config,
            library: OnceLock::new(),
        }
    }

    pub fn config(&self) -> &MulifsConfig {
        &self.config
    }

    fn library(&self) -> Result<Arc<Library>, ApiError> {
        if let Some(library) = self.library.get() {
            return Ok(library.clone());
        }
        let (root, store_path) = self.config.library.resolve_paths()?;
        let library = Library::builder(store_path, root).build();
        Ok(self.library.get_or_init(|| library).clone())
    }

    /// Execute a CLI command
    pub fn execute(&self, command: &Commands) -> Result<String, ApiError> {
        match command {
            // Mount arguments are folded into the config by `Cli::apply_overrides`.
            Commands::Mount { .. } => self.handle_mount(),
            Commands::Playlist { command } => self.handle_playlist_command(command),
            Commands::Artists { artist } => self.handle_artists(artist.as_deref()),
            Commands::Resolve { path } => self.handle_resolve(path),
            Commands::Ingest { file } => self.handle_ingest(file),
            Commands::Config => self.config.to_toml(),
        }
    }

    fn handle_mount(&self) -> Result<String, ApiError> {
        let mountpoint = self.config.mount.mountpoint.clone().ok_or_else(|| {
            ApiError::ConfigError("No mountpoint given (argument or mount.mountpoint)".to_string())
        })?;
        let library = self.library()?;
        crate::fuse::mount(library, &mountpoint, &self.config.mount)?;
        Ok(format!("Unmounted {}", mountpoint.display()))
    }

    fn handle_playlist_command(&self, command: &PlaylistCommands) -> Result<String, ApiError> {
        let library = self.library()?;
        match command {
            PlaylistCommands::Create { name } => {
                let created = library.playlists().create_playlist(name)?;
                Ok(format!("Created playlist {}", created))
            }
            PlaylistCommands::Add {
                playlist,
                song,
                path,
            } => {
                let container = Container::Playlist(playlist.clone());
                if !library.container_exists(&container)? {
                    return Err(FsError::NotFound(format!("{}", container)).into());
                }
                let real = dunce::canonicalize(path)
                    .map_err(|e| FsError::from_open(path, e))?;
                library.playlists().add_to_playlist(playlist, song, &real)?;
                Ok(format!("Added {} to {} ({})", song, playlist, real.display()))
            }
            PlaylistCommands::List => Ok(names(&library.listing().list_playlists()?)),
            PlaylistCommands::Songs { playlist } => {
                let container = Container::Playlist(playlist.clone());
                let lines: Vec<String> = library
                    .listing()
                    .list_entries(&container)?
                    .into_iter()
                    .map(|entry| match library.resolver().resolve(&container, &entry.name) {
                        Ok(path) => format!("{}\t{}", entry.name, path.display()),
                        Err(err) => format!("{}\t({})", entry.name, err),
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
        }
    }

    fn handle_artists(&self, artist: Option<&str>) -> Result<String, ApiError> {
        let library = self.library()?;
        let parent = match artist {
            Some(artist) => Container::Artist(artist.to_string()).bucket(),
            None => BucketPath::artists(),
        };
        Ok(names(&library.listing().list_containers(&parent)?))
    }

    fn handle_resolve(&self, path: &str) -> Result<String, ApiError> {
        let library = self.library()?;
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let Some(VirtualPath::Entry { container, name }) = VirtualPath::parse(&segments) else {
            return Err(FsError::NotFound(format!("{} is not a library entry", path)).into());
        };
        let resolved = library.resolver().resolve(&container, &name)?;
        Ok(resolved.display().to_string())
    }

    fn handle_ingest(&self, file: &Path) -> Result<String, ApiError> {
        let library = self.library()?;
        let ingestor = LibraryIngestor::new(
            library.store().clone(),
            library.root().to_path_buf(),
            library.tag_rewriter().clone(),
        );
        let outcome = ingestor.ingest_file(file)?;
        info!(path = %outcome.path.display(), "ingested from command line");
        Ok(format!(
            "Ingested {} as {} in {}",
            file.display(),
            outcome.entry,
            outcome.container
        ))
    }
}

fn names(entries: &[DirEntry]) -> String {
    entries
        .iter()
        .map(|entry| entry.name.as_str())
        .collect::<Vec<_>>()
        .join("\n")
}
