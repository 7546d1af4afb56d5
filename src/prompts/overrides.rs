use anyhow::{Context, Result};
use glob::glob;
use std::collections::HashMap;
use std::path::Path;
use tracing::{debug, info, warn};

/// Which instruction text a prompt file replaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PromptKind {
    Image,
    Symptom,
    FollowUp,
}

impl PromptKind {
    pub const ALL: [PromptKind; 3] = [PromptKind::Image, PromptKind::Symptom, PromptKind::FollowUp];

    /// File name (without `.md`) that overrides this prompt.
    pub fn file_stem(self) -> &'static str {
        match self {
            PromptKind::Image => "image",
            PromptKind::Symptom => "symptom",
            PromptKind::FollowUp => "follow_up",
        }
    }

    fn from_file_stem(stem: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|k| k.file_stem() == stem)
    }
}

/// Prompt texts read from `image.md`, `symptom.md` and `follow_up.md` in a directory.
#[derive(Debug, Default)]
pub struct PromptOverrides {
    prompts: HashMap<PromptKind, String>,
}

impl PromptOverrides {
    /// A missing directory yields no overrides. Unknown and blank files are skipped.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut overrides = Self::default();

        if !dir.exists() {
            warn!("Prompt directory not found: {}", dir.display());
            return Ok(overrides);
        }

        let pattern = dir.join("*.md");
        let pattern_str = pattern
            .to_str()
            .ok_or_else(|| anyhow::anyhow!("Invalid prompt directory: {}", dir.display()))?;

        for path in glob(pattern_str)?.filter_map(|entry| entry.ok()) {
            let Some(kind) = path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(PromptKind::from_file_stem)
            else {
                debug!("Skipping unrelated prompt file {}", path.display());
                continue;
            };

            let content = std::fs::read_to_string(&path)
                .with_context(|| format!("Failed to read {}", path.display()))?;
            let content = content.trim();
            if content.is_empty() {
                warn!("Ignoring empty prompt file: {}", path.display());
                continue;
            }

            info!("Loaded {} prompt from {}", kind.file_stem(), path.display());
            overrides.prompts.insert(kind, content.to_string());
        }

        Ok(overrides)
    }

    pub fn get(&self, kind: PromptKind) -> Option<&str> {
        self.prompts.get(&kind).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.prompts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prompts.is_empty()
    }
}
