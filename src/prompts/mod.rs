//! Persona texts sent ahead of user input.

mod overrides;

pub use overrides::{PromptKind, PromptOverrides};

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::{info, warn};

use crate::config::PromptsConfig;

pub const IMAGE_ANALYSIS_PERSONA: &str = "You are a medical practitioner and an expert in analyzing medical-related images working for a very reputed hospital. You will be provided with images and you need to identify the anomalies, any disease or health issues. You need to generate the result in a detailed manner. Write all the findings, next steps, recommendations, etc. You only need to respond if the image is related to a human body and health issues. You must answer but also write a disclaimer saying that \"Consult with a Doctor before making any decisions\".

Remember, if certain aspects are not clear from the image, it's okay to state 'Unable to determine based on the provided image.'

Now analyze the image and answer the above questions in the same structured manner defined above.";

pub const SYMPTOM_ANALYSIS_PERSONA: &str = "You are a medical AI assistant. A user has described their symptoms. Analyze these symptoms and provide possible causes, recommendations for next steps, and any relevant health advice. Remember to include a disclaimer stating 'This is not a substitute for professional medical advice. Please consult with a healthcare provider for an accurate diagnosis and treatment plan.'";

pub const FOLLOW_UP_INSTRUCTION: &str = "You are a medical AI assistant. Answer the user's query based on the previous analysis and your medical knowledge. Always include a disclaimer about consulting a real doctor.";

/// The three instruction texts in effect for a running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptSet {
    pub image: String,
    pub symptom: String,
    pub follow_up: String,
}

impl Default for PromptSet {
    fn default() -> Self {
        Self {
            image: IMAGE_ANALYSIS_PERSONA.to_string(),
            symptom: SYMPTOM_ANALYSIS_PERSONA.to_string(),
            follow_up: FOLLOW_UP_INSTRUCTION.to_string(),
        }
    }
}

impl PromptSet {
    /// Built-ins, overridden by the prompt directory, overridden by inline config.
    pub fn from_config(config: &PromptsConfig) -> Result<Self> {
        let mut set = Self::default();

        if let Some(dir) = &config.dir {
            let dir = PathBuf::from(shellexpand::tilde(dir).to_string());
            let overrides = PromptOverrides::load(&dir)
                .with_context(|| format!("Failed to load prompts from {}", dir.display()))?;
            if overrides.is_empty() {
                warn!("No prompt overrides found in {}", dir.display());
            } else {
                info!("Using {} prompt override(s) from {}", overrides.len(), dir.display());
            }
            set.apply(
                overrides.get(PromptKind::Image),
                overrides.get(PromptKind::Symptom),
                overrides.get(PromptKind::FollowUp),
            );
        }

        set.apply(
            config.image.as_deref(),
            config.symptom.as_deref(),
            config.follow_up.as_deref(),
        );

        Ok(set)
    }

    fn apply(&mut self, image: Option<&str>, symptom: Option<&str>, follow_up: Option<&str>) {
        let pick = |slot: &mut String, value: Option<&str>| {
            if let Some(v) = value.map(str::trim).filter(|v| !v.is_empty()) {
                *slot = v.to_string();
            }
        };
        pick(&mut self.image, image);
        pick(&mut self.symptom, symptom);
        pick(&mut self.follow_up, follow_up);
    }
}

/// Single user message for symptom analysis.
pub fn symptom_message(persona: &str, description: &str) -> String {
    format!("{}\n\nUser symptoms: {}", persona, description)
}

/// User message for a follow-up question, embedding the prior analysis.
pub fn follow_up_message(context: &str, query: &str) -> String {
    format!("Previous analysis: {}\n\nUser query: {}", context, query)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_personas_carry_disclaimers() {
        assert!(IMAGE_ANALYSIS_PERSONA.contains("Consult with a Doctor before making any decisions"));
        assert!(IMAGE_ANALYSIS_PERSONA.contains("Unable to determine based on the provided image."));
        assert!(SYMPTOM_ANALYSIS_PERSONA
            .contains("This is not a substitute for professional medical advice."));
        assert!(FOLLOW_UP_INSTRUCTION.contains("disclaimer"));
    }

    #[test]
    fn test_message_builders() {
        assert_eq!(
            symptom_message("P", "cough for a week"),
            "P\n\nUser symptoms: cough for a week"
        );
        assert_eq!(
            follow_up_message("Finding: mild inflammation", "What specialist should I see?"),
            "Previous analysis: Finding: mild inflammation\n\nUser query: What specialist should I see?"
        );
    }

    #[test]
    fn test_inline_overrides_win_over_dir() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("image.md"), "dir image").unwrap();
        std::fs::write(dir.path().join("symptom.md"), "dir symptom").unwrap();

        let config = PromptsConfig {
            dir: Some(dir.path().to_string_lossy().to_string()),
            image: None,
            symptom: Some("inline symptom".to_string()),
            follow_up: Some("   ".to_string()),
        };
        let set = PromptSet::from_config(&config).unwrap();

        assert_eq!(set.image, "dir image");
        assert_eq!(set.symptom, "inline symptom");
        // Blank override is ignored
        assert_eq!(set.follow_up, FOLLOW_UP_INSTRUCTION);
    }

    #[test]
    fn test_default_config_uses_builtins() {
        let set = PromptSet::from_config(&PromptsConfig::default()).unwrap();
        assert_eq!(set, PromptSet::default());
    }
}
