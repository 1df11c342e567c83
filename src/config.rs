use clap::Parser;
use std::{
    net::SocketAddr,
    path::{Path, PathBuf},
};
use thiserror::Error;

// --- Command line ---
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// The root directory to serve files from
    #[arg(short, long, value_name = "DIR", default_value = ".")]
    pub root_dir: PathBuf,

    /// The network address to bind to
    #[arg(short, long, value_name = "ADDR", default_value = "127.0.0.1:3000")]
    pub bind_addr: SocketAddr,

    /// Shared password guarding every page (empty disables the login)
    #[arg(short, long, env = "DIRSERVE_PASSWORD", default_value = "", hide_env_values = true)]
    pub password: String,

    /// Directory for temporary zip artifacts (defaults to the OS temp dir)
    #[arg(long, value_name = "DIR")]
    pub temp_dir: Option<PathBuf>,
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to resolve root directory '{}': {source}", path.display())]
    Root {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("root path '{}' is not a directory", .0.display())]
    NotADirectory(PathBuf),

    #[error("temp directory '{}' is not a directory", .0.display())]
    TempDir(PathBuf),
}

/// Process-wide configuration. Built once at startup and only read afterwards.
#[derive(Debug, Clone)]
pub struct App {
    /// Canonical, absolute root of the served tree.
    pub root_path: PathBuf,
    pub password: String,
    pub temp_dir: Option<PathBuf>,
}

impl App {
    pub fn new(root: &Path, password: impl Into<String>) -> Result<Self, ConfigError> {
        let root_path = root.canonicalize().map_err(|source| ConfigError::Root {
            path: root.to_path_buf(),
            source,
        })?;
        if !root_path.is_dir() {
            return Err(ConfigError::NotADirectory(root_path));
        }
        Ok(Self {
            root_path,
            password: password.into(),
            temp_dir: None,
        })
    }

    pub fn from_args(args: &Args) -> Result<Self, ConfigError> {
        let mut app = Self::new(&args.root_dir, args.password.clone())?;
        if let Some(dir) = &args.temp_dir {
            if !dir.is_dir() {
                return Err(ConfigError::TempDir(dir.clone()));
            }
            app.temp_dir = Some(dir.clone());
        }
        Ok(app)
    }

    pub fn password_required(&self) -> bool {
        !self.password.is_empty()
    }
}
