use std::collections::{BTreeMap, BTreeSet};

use chrono::Utc;
use serde::Deserialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::llm_client::LlmClient;
use crate::screening::models::{OutputLanguage, ResumeExtraction, TextQuality};
use crate::screening::prompts::{build_prompt, PromptKind, PromptValues};
use crate::screening::schema::{clean_list, present, validate_confidence};
use crate::screening::text_extract::ExtractedText;
use crate::screening::validator::looks_like_resume;
use crate::screening::ScreeningError;

const RESUME_CONFIDENCE_FIELDS: &[&str] =
    &["name", "email", "phone", "skills", "experience", "education"];

/// Average confidence below which a parsed resume is logged for attention.
const LOW_AVERAGE_CONFIDENCE: f64 = 70.0;

#[derive(Debug, Deserialize)]
struct RawResume {
    name: Option<String>,
    email: Option<String>,
    phone: Option<String>,
    #[serde(default)]
    skills: Vec<String>,
    experience: Option<String>,
    education: Option<String>,
    summary: Option<String>,
    confidence: BTreeMap<String, f64>,
}

fn language_instruction(language: OutputLanguage) -> &'static str {
    match language {
        OutputLanguage::English => {
            "Write every extracted value in ENGLISH. Translate values written in other \
            languages and transliterate names into Latin script. Keep JSON keys in English."
        }
        OutputLanguage::Arabic => {
            "Write every extracted value in ARABIC. Translate values written in other \
            languages; keep email addresses, phone numbers and technology names as written. \
            Keep JSON keys in English."
        }
    }
}

fn contains_arabic_script(text: &str) -> bool {
    text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

/// Parses one resume into a structured extraction.
///
/// The keyword filter runs first; documents that do not look like a CV are
/// rejected without a model call.
pub async fn parse_resume(
    resume_id: Uuid,
    file_name: &str,
    extracted: &ExtractedText,
    language: OutputLanguage,
    llm: &LlmClient,
) -> Result<ResumeExtraction, ScreeningError> {
    let check = looks_like_resume(&extracted.text);
    if !check.is_resume {
        info!("Rejected {file_name}: {}", check.reason);
        return Err(ScreeningError::NotAResume(check.reason));
    }
    if extracted.quality == TextQuality::Sparse {
        warn!("{file_name} has a sparse text layer; extraction may be incomplete");
    }

    let prompt = build_prompt(
        PromptKind::Resume,
        &PromptValues::from([
            ("resume_text", extracted.text.clone()),
            ("output_language", language_instruction(language).to_string()),
        ]),
    )?;

    let raw: RawResume = llm.call_json(&prompt, PromptKind::Resume.system()).await?;
    let confidence = validate_confidence(&raw.confidence, RESUME_CONFIDENCE_FIELDS)?;

    let resume = ResumeExtraction {
        resume_id,
        file_name: file_name.to_string(),
        name: present(raw.name),
        email: present(raw.email),
        phone: present(raw.phone),
        skills: clean_list(raw.skills).into_iter().collect::<BTreeSet<_>>(),
        experience: present(raw.experience),
        education: present(raw.education),
        summary: present(raw.summary),
        confidence,
        output_language: language,
        text_quality: extracted.quality,
        parsed_at: Utc::now(),
    };

    let average = resume
        .confidence
        .values()
        .map(|&v| f64::from(v))
        .sum::<f64>()
        / resume.confidence.len().max(1) as f64;
    if average < LOW_AVERAGE_CONFIDENCE {
        warn!("Low average extraction confidence for {file_name}: {average:.0}");
    }

    if language == OutputLanguage::English {
        if let Some(name) = resume.name.as_deref().filter(|n| contains_arabic_script(n)) {
            warn!("English output requested but name is still in Arabic script: {name}");
        }
    }

    info!(
        "Parsed resume {} ({}): {} skills",
        resume_id,
        resume.display_name(),
        resume.skills.len()
    );

    Ok(resume)
}
