//! External command used for element-backed playback.
//!
//! When the built-in decoder rejects a clip, the encoded bytes are written
//! to a temporary file and handed to a system player.

use crate::config::AudioConfig;
use std::path::{Path, PathBuf};
use std::process::Stdio;

/// Players probed on `PATH`, in preference order, with their quiet flags.
const KNOWN_PLAYERS: &[(&str, &[&str])] = &[
    ("ffplay", &["-nodisp", "-autoexit", "-loglevel", "quiet"]),
    ("afplay", &[]),
    ("mpg123", &["-q"]),
    ("paplay", &[]),
    ("aplay", &["-q"]),
];

/// A resolved external audio player.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExternalPlayer {
    program: PathBuf,
    args: Vec<String>,
}

impl ExternalPlayer {
    /// Resolve the configured player, or the first known player on `PATH`.
    ///
    /// Returns `None` when fallback playback is disabled or nothing is found.
    pub fn discover(config: &AudioConfig) -> Option<Self> {
        if !config.fallback_player {
            return None;
        }
        if let Some(cmd) = config.fallback_command.as_deref() {
            let player = Self::from_command_line(cmd);
            if player.is_none() {
                tracing::warn!(command = %cmd, "configured fallback player not found");
            }
            return player;
        }
        KNOWN_PLAYERS.iter().find_map(|(name, args)| {
            let program = which::which(name).ok()?;
            Some(Self {
                program,
                args: args.iter().map(|a| (*a).to_owned()).collect(),
            })
        })
    }

    /// A player at an already-resolved path.
    pub fn new(program: PathBuf, args: Vec<String>) -> Self {
        Self { program, args }
    }

    /// Parse `program arg1 arg2` and resolve the program on `PATH`.
    pub fn from_command_line(cmd: &str) -> Option<Self> {
        let mut parts = cmd.split_whitespace();
        let program = which::which(parts.next()?).ok()?;
        Some(Self {
            program,
            args: parts.map(str::to_owned).collect(),
        })
    }

    /// Resolved program path.
    pub fn program(&self) -> &Path {
        &self.program
    }

    /// Extra arguments placed before the file path.
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Build the command that plays `file`. The child dies with its handle.
    pub(crate) fn command(&self, file: &Path) -> tokio::process::Command {
        let mut command = tokio::process::Command::new(&self.program);
        command
            .args(&self.args)
            .arg(file)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);
        command
    }
}
