use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::process::Command;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum ToolType {
    YtDlp,
    Ffmpeg,
}

impl ToolType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "yt-dlp",
            ToolType::Ffmpeg => "ffmpeg",
        }
    }

    fn version_arg(&self) -> &'static str {
        match self {
            ToolType::YtDlp => "--version",
            ToolType::Ffmpeg => "-version", // ffmpeg takes a single dash
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInfo {
    pub name: String,
    pub tool_type: ToolType,
    pub version: Option<String>,
    pub path: Option<String>,
    pub is_available: bool,
}

/// Resolves external binaries, honouring explicit overrides
#[derive(Debug, Clone, Default)]
pub struct ToolLocator {
    ytdlp_override: Option<PathBuf>,
    ffmpeg_override: Option<PathBuf>,
}

impl ToolLocator {
    pub fn new(ytdlp_override: Option<PathBuf>, ffmpeg_override: Option<PathBuf>) -> Self {
        Self {
            ytdlp_override,
            ffmpeg_override,
        }
    }

    fn explicit(&self, tool: ToolType) -> Option<&PathBuf> {
        match tool {
            ToolType::YtDlp => self.ytdlp_override.as_ref(),
            ToolType::Ffmpeg => self.ffmpeg_override.as_ref(),
        }
    }

    /// Path to execute for `tool`. A missing binary surfaces as a spawn error
    /// when a job runs, not at startup.
    pub fn resolve(&self, tool: ToolType) -> PathBuf {
        self.locate(tool)
            .or_else(|| self.explicit(tool).cloned())
            .unwrap_or_else(|| PathBuf::from(tool.as_str()))
    }

    pub fn locate(&self, tool: ToolType) -> Option<PathBuf> {
        if let Some(path) = self.explicit(tool) {
            if path.exists() {
                return Some(path.clone());
            }
            // Might be a bare name to look up on PATH
            if let Ok(found) = which::which(path) {
                return Some(found);
            }
            warn!("Configured {} path {} not found", tool.as_str(), path.display());
            return None;
        }

        let binary_name = tool.as_str();

        // 1. Try common paths first
        let common_paths = [
            format!("/opt/homebrew/bin/{}", binary_name),
            format!("/usr/local/bin/{}", binary_name),
            format!("/usr/bin/{}", binary_name),
        ];
        for path in common_paths {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Some(path);
            }
        }

        // 2. Try PATH
        which::which(binary_name).ok()
    }

    pub fn get_tool_info(&self, tool: ToolType) -> ToolInfo {
        let path = self.locate(tool);
        let version = path.as_deref().and_then(|p| get_version(p, tool));

        ToolInfo {
            name: tool.as_str().to_string(),
            tool_type: tool,
            version,
            is_available: path.is_some(),
            path: path.map(|p| p.to_string_lossy().into_owned()),
        }
    }

    pub fn get_all_tools(&self) -> Vec<ToolInfo> {
        vec![
            self.get_tool_info(ToolType::YtDlp),
            self.get_tool_info(ToolType::Ffmpeg),
        ]
    }

    /// Logs what was found at startup. Returns false if anything is missing.
    pub fn report(&self) -> bool {
        let mut all_found = true;
        for info in self.get_all_tools() {
            match (&info.path, &info.version) {
                (Some(path), version) => info!(
                    tool = %info.name,
                    path = %path,
                    version = version.as_deref().unwrap_or("unknown"),
                    "tool found"
                ),
                (None, _) => {
                    all_found = false;
                    warn!(tool = %info.name, "tool not found; downloads needing it will fail");
                }
            }
        }
        all_found
    }
}

fn get_version(path: &Path, tool: ToolType) -> Option<String> {
    match Command::new(path).arg(tool.version_arg()).output() {
        Ok(output) if output.status.success() => {
            let out = String::from_utf8_lossy(&output.stdout);
            // ffmpeg prints a banner; the first line carries the version
            out.lines().next().map(|line| line.trim().to_string())
        }
        Ok(output) => {
            debug!("{} {} exited with {}", path.display(), tool.version_arg(), output.status);
            None
        }
        Err(e) => {
            debug!("Failed to run {}: {}", path.display(), e);
            None
        }
    }
}
