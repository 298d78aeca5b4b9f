//! Stack detection output consumed by the strategy engine.

use serde::{Deserialize, Serialize};

/// Language tag used to select an ecosystem adapter.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Node,
    Python,
    Go,
    Jvm,
    Ruby,
    Rust,
    Cpp,
    #[default]
    #[serde(other)]
    Unknown,
}

impl std::fmt::Display for Language {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Language::Node => "node",
            Language::Python => "python",
            Language::Go => "go",
            Language::Jvm => "jvm",
            Language::Ruby => "ruby",
            Language::Rust => "rust",
            Language::Cpp => "cpp",
            Language::Unknown => "unknown",
        };
        f.write_str(s)
    }
}

/// What the detection collaborator learned about a repository.
///
/// Immutable once produced. Command fields are full shell command lines;
/// `None` means the repository has no such step.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct DetectionResult {
    #[serde(default)]
    pub language: Language,

    /// Package manager name, e.g. "npm", "pnpm", "poetry", "cargo".
    #[serde(default)]
    pub package_manager: Option<String>,

    #[serde(default)]
    pub install_cmd: Option<String>,
    #[serde(default)]
    pub build_cmd: Option<String>,
    #[serde(default)]
    pub typecheck_cmd: Option<String>,
    #[serde(default)]
    pub test_cmd: Option<String>,
    #[serde(default)]
    pub bench_cmd: Option<String>,

    /// Test/bench framework, e.g. "jest", "pytest".
    #[serde(default)]
    pub framework: Option<String>,

    /// Detector confidence in [0, 1].
    #[serde(default)]
    pub confidence: f32,

    /// Files or markers that led to this detection.
    #[serde(default)]
    pub evidence: Vec<String>,
}

impl DetectionResult {
    /// Whether the package manager matches `name` (case-insensitive).
    pub fn uses(&self, name: &str) -> bool {
        self.package_manager
            .as_deref()
            .is_some_and(|pm| pm.eq_ignore_ascii_case(name))
    }
}
