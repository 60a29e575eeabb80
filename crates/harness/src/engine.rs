//! Browser engine selection and discovery.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A browser engine the harness can drive over the DevTools protocol.
///
/// Chromium is the fully supported engine. Firefox is driven through its
/// (subset) CDP bridge. WebKit has no native CDP endpoint; it is only
/// available through an explicitly configured CDP-speaking shim binary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Engine {
    Chromium,
    Firefox,
    Webkit,
}

impl Engine {
    pub const ALL: [Engine; 3] = [Engine::Chromium, Engine::Firefox, Engine::Webkit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Engine::Chromium => "chromium",
            Engine::Firefox => "firefox",
            Engine::Webkit => "webkit",
        }
    }

    /// Environment variable that overrides binary discovery for this engine.
    pub fn env_override(&self) -> &'static str {
        match self {
            Engine::Chromium => "XSSBENCH_CHROMIUM",
            Engine::Firefox => "XSSBENCH_FIREFOX",
            Engine::Webkit => "XSSBENCH_WEBKIT",
        }
    }

    fn binary_candidates(&self) -> &'static [&'static str] {
        match self {
            Engine::Chromium => &[
                "chromium",
                "chromium-browser",
                "google-chrome",
                "google-chrome-stable",
                "chrome",
                "headless_shell",
            ],
            Engine::Firefox => &["firefox", "firefox-esr"],
            // No standard system binary speaks CDP for WebKit.
            Engine::Webkit => &[],
        }
    }

    /// Find a binary for this engine: env override first, then `PATH`.
    pub fn locate(&self) -> Option<PathBuf> {
        if let Some(path) = std::env::var_os(self.env_override()) {
            let path = PathBuf::from(path);
            if path.is_file() {
                return Some(path);
            }
            tracing::warn!(
                engine = self.as_str(),
                path = %path.display(),
                "engine override does not point at a file"
            );
            return None;
        }
        let path_var = std::env::var_os("PATH")?;
        for dir in std::env::split_paths(&path_var) {
            for candidate in self.binary_candidates() {
                let full = dir.join(candidate);
                if full.is_file() {
                    return Some(full);
                }
            }
        }
        None
    }

    pub fn is_available(&self) -> bool {
        self.locate().is_some()
    }

    /// Command-line arguments for a headless launch with an ephemeral
    /// profile and an OS-assigned DevTools port.
    pub fn launch_args(&self, profile_dir: &Path) -> Vec<String> {
        let profile = profile_dir.display().to_string();
        match self {
            Engine::Chromium => vec![
                "--headless=new".into(),
                "--remote-debugging-port=0".into(),
                format!("--user-data-dir={profile}"),
                "--no-first-run".into(),
                "--no-default-browser-check".into(),
                "--disable-gpu".into(),
                "--disable-dev-shm-usage".into(),
                "--disable-extensions".into(),
                "--mute-audio".into(),
                "about:blank".into(),
            ],
            Engine::Firefox => vec![
                "--headless".into(),
                "--remote-debugging-port=0".into(),
                "--no-remote".into(),
                "--profile".into(),
                profile,
                "about:blank".into(),
            ],
            Engine::Webkit => vec![
                "--headless".into(),
                "--remote-debugging-port=0".into(),
                format!("--user-data-dir={profile}"),
            ],
        }
    }
}

impl fmt::Display for Engine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Engine {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Engine::ALL
            .iter()
            .copied()
            .find(|e| e.as_str() == s)
            .ok_or_else(|| format!("unknown browser engine {s:?}; expected chromium, firefox or webkit"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn engine_names_round_trip() {
        for engine in Engine::ALL {
            assert_eq!(engine.as_str().parse::<Engine>().unwrap(), engine);
        }
        assert!("safari".parse::<Engine>().is_err());
    }

    #[test]
    fn chromium_launch_args_use_ephemeral_port_and_profile() {
        let args = Engine::Chromium.launch_args(Path::new("/tmp/profile"));
        assert!(args.iter().any(|a| a == "--remote-debugging-port=0"));
        assert!(args.iter().any(|a| a == "--user-data-dir=/tmp/profile"));
        assert!(args.iter().any(|a| a.starts_with("--headless")));
    }
}
