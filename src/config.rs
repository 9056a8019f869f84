//! Loading agent configuration (exam profile + prompts) from TOML.
//!
//! See `AgentConfig` and `Prompts` for expected schema. Every section is
//! optional; missing keys fall back to the NEET defaults below.

use serde::Deserialize;
use tracing::{error, info};

#[derive(Clone, Debug, Deserialize, Default, PartialEq)]
pub struct AgentConfig {
  #[serde(default)]
  pub exam: ExamProfile,
  #[serde(default)]
  pub prompts: Prompts,
}

/// The exam whose difficulty the generated questions should match.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct ExamProfile {
  pub name: String,
  pub description: String,
}

impl Default for ExamProfile {
  fn default() -> Self {
    Self {
      name: "NEET".into(),
      description: "National Eligibility cum Entrance Test".into(),
    }
  }
}

/// Prompt templates for the three prompt-service operations.
///
/// Placeholders: `{exam}`, `{exam_description}`, `{count}`, `{extracted_text}`,
/// `{question}`, `{choices}`.
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default)]
pub struct Prompts {
  // Text extraction (vision)
  pub extract_system: String,
  pub extract_user: String,
  // Question generation
  pub generate_system: String,
  pub generate_user_template: String,
  // Difficulty assessment
  pub assess_system: String,
  pub assess_user_template: String,
}

impl Default for Prompts {
  fn default() -> Self {
    Self {
      extract_system: "You transcribe printed book pages. Output ONLY the text found in the image, preserving paragraphs. If there is no legible text, output nothing.".into(),
      extract_user: "Extract the text from this image.".into(),
      generate_system: "You are an expert in creating {exam} ({exam_description}) level questions. Respond ONLY with strict JSON.".into(),
      generate_user_template: "Based on the provided text, generate {count} multiple-choice questions with 4 options each.\nThe questions should be relevant to the {exam} exam syllabus and of appropriate difficulty level.\nEnsure that only one option is correct for each question.\nReturn JSON: {\"questions\": [{\"question\": string, \"options\": [string, string, string, string], \"correctAnswerIndex\": 0-3}]} with exactly {count} items.\n\nExtracted Text: {extracted_text}".into(),
      assess_system: "You are an expert educator specializing in {exam} exam preparation. Reply as compact JSON.".into(),
      assess_user_template: "Assess whether the given question aligns with the {exam} exam difficulty level, based on the extracted text from the book page.\n\nExtracted Text: {extracted_text}\n\nQuestion: {question}\nChoices:\n{choices}\n\nReturn JSON {\"meetsTargetDifficulty\": boolean, \"reasoning\": string}. Explain your reasoning briefly.".into(),
    }
  }
}

/// Parse a TOML document into `AgentConfig`.
pub fn parse_agent_config(s: &str) -> Result<AgentConfig, toml::de::Error> {
  toml::from_str::<AgentConfig>(s)
}

/// Attempt to load `AgentConfig` from AGENT_CONFIG_PATH. On any parsing/IO error, returns None.
pub fn load_agent_config_from_env() -> Option<AgentConfig> {
  let path = std::env::var("AGENT_CONFIG_PATH").ok()?;
  match std::fs::read_to_string(&path) {
    Ok(s) => match parse_agent_config(&s) {
      Ok(cfg) => {
        info!(target: "scantest_backend", %path, exam = %cfg.exam.name, "Loaded agent config (TOML)");
        Some(cfg)
      }
      Err(e) => {
        error!(target: "scantest_backend", %path, error = %e, "Failed to parse TOML config");
        None
      }
    },
    Err(e) => {
      error!(target: "scantest_backend", %path, error = %e, "Failed to read TOML config file");
      None
    }
  }
}
