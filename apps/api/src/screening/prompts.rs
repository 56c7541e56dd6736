// All LLM prompt templates for the screening module, plus the builder that
// renders them. Reuses cross-cutting fragments from llm_client::prompts.

use std::collections::HashMap;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use thiserror::Error;

use crate::llm_client::prompts::{
    CONFIDENCE_SCALE, GENDER_NEUTRAL_INSTRUCTION, JSON_ONLY_SYSTEM, NO_FABRICATION_INSTRUCTION,
};

static PLACEHOLDER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptKind {
    Resume,
    JobRequirements,
    Match,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PromptError {
    #[error("missing prompt value '{key}' for {kind:?} prompt")]
    MissingValue { kind: PromptKind, key: &'static str },
}

/// Named runtime values substituted into a template.
pub type PromptValues = HashMap<&'static str, String>;

impl PromptKind {
    pub fn required_values(self) -> &'static [&'static str] {
        match self {
            PromptKind::Resume => &["resume_text", "output_language"],
            PromptKind::JobRequirements => &["job_description"],
            PromptKind::Match => &[
                "required_skills",
                "total_skills",
                "experience_requirement",
                "education_requirement",
                "resume_json",
            ],
        }
    }

    pub fn system(self) -> &'static str {
        match self {
            PromptKind::Resume => RESUME_SYSTEM.as_str(),
            PromptKind::JobRequirements => REQUIREMENTS_SYSTEM.as_str(),
            PromptKind::Match => MATCH_SYSTEM.as_str(),
        }
    }

    fn template(self) -> &'static str {
        match self {
            PromptKind::Resume => RESUME_PROMPT_TEMPLATE,
            PromptKind::JobRequirements => REQUIREMENTS_PROMPT_TEMPLATE,
            PromptKind::Match => MATCH_PROMPT_TEMPLATE,
        }
    }
}

fn fragment(key: &str) -> Option<&'static str> {
    match key {
        "no_fabrication" => Some(NO_FABRICATION_INSTRUCTION),
        "confidence_scale" => Some(CONFIDENCE_SCALE),
        "gender_neutral" => Some(GENDER_NEUTRAL_INSTRUCTION),
        _ => None,
    }
}

/// Renders the template for `kind` in a single pass.
///
/// Every value in `kind.required_values()` must be present. Substituted
/// text is never re-scanned, so braces inside resume or job text are
/// left alone; unknown `{name}` tokens stay literal.
pub fn build_prompt(kind: PromptKind, values: &PromptValues) -> Result<String, PromptError> {
    for key in kind.required_values() {
        if !values.contains_key(key) {
            return Err(PromptError::MissingValue { kind, key });
        }
    }

    let rendered = PLACEHOLDER_RE.replace_all(kind.template(), |caps: &Captures<'_>| {
        let key = &caps[1];
        if let Some(text) = fragment(key) {
            return text.to_string();
        }
        if kind.required_values().iter().any(|required| *required == key) {
            if let Some(value) = values.get(key) {
                return value.clone();
            }
        }
        caps[0].to_string()
    });

    Ok(rendered.into_owned())
}

pub static RESUME_SYSTEM: Lazy<String> = Lazy::new(|| {
    format!(
        "You are a professional multilingual resume parser. \
        You NEVER hallucinate or invent information. \
        You can read resumes in any language. \
        Be tolerant of text-extraction noise but ONLY extract information that is actually present. \
        When uncertain, use low confidence scores. {JSON_ONLY_SYSTEM}"
    )
});

pub static REQUIREMENTS_SYSTEM: Lazy<String> = Lazy::new(|| {
    format!(
        "You are an HR analyst who extracts job requirements comprehensively and accurately. \
        The same extracted list is reused for every candidate, so be exhaustive. {JSON_ONLY_SYSTEM}"
    )
});

pub static MATCH_SYSTEM: Lazy<String> = Lazy::new(|| {
    format!(
        "You are an HR analyst who provides DETAILED, SPECIFIC matching results. \
        ALWAYS state the candidate's exact years of experience and specific education \
        (or \"not mentioned\"). NEVER use the candidate's name in the overall explanation. \
        SHOW the exact score calculation. Use the EXACT requirements provided; do not modify them. \
        {JSON_ONLY_SYSTEM}"
    )
});

/// Resume extraction prompt. Replace: {output_language}, {resume_text}
pub const RESUME_PROMPT_TEMPLATE: &str = r#"You are an expert resume parser with multilingual capabilities.

OUTPUT LANGUAGE:
{output_language}

{no_fabrication}

STEP-BY-STEP PROCESS:
Step 1: Read the entire resume carefully
Step 2: Identify clear sections (contact, skills, experience, education)
Step 3: Extract ONLY explicitly mentioned information
Step 4: Translate/transliterate into the output language
Step 5: Verify each extracted field against the source text
Step 6: Assign confidence scores

Return a JSON object with this EXACT schema (use null for anything not mentioned):
{
  "name": "candidate's full name - ONLY if clearly stated",
  "email": "email address - ONLY if present",
  "phone": "phone number - ONLY if present",
  "skills": ["technical and soft skills - ONLY skills explicitly mentioned"],
  "experience": "work experience summary - ONLY if mentioned",
  "education": "educational qualifications - ONLY if mentioned",
  "summary": "brief professional summary (2-3 sentences) based on actual content",
  "confidence": {
    "name": 0,
    "email": 0,
    "phone": 0,
    "skills": 0,
    "experience": 0,
    "education": 0
  }
}

{confidence_scale}

If you cannot find a field with confidence above 60, leave it null.

RESUME TEXT:
{resume_text}"#;

/// Job requirements extraction prompt. Replace: {job_description}
pub const REQUIREMENTS_PROMPT_TEMPLATE: &str = r#"You are an expert HR analyst. Extract the EXACT requirements from this job description.

{no_fabrication}

Return a JSON object with this EXACT schema:
{
  "required_skills": ["ALL required technical and soft skills"],
  "experience_requirement": "years and type of experience required (e.g. '2+ years mobile development')",
  "education_requirement": "degree and field required (e.g. 'Bachelor in Computer Science')",
  "confidence": {
    "required_skills": 0,
    "experience_requirement": 0,
    "education_requirement": 0
  }
}

CRITICAL RULES:
1. Extract ALL skills mentioned in the job description
2. Include both technical skills AND soft skills (teamwork, problem-solving)
3. Translate to English if the job description is in another language
4. If the experience or education requirement is not stated, use "Not specified"
5. This exact list will be used for ALL candidates

{confidence_scale}

JOB DESCRIPTION:
{job_description}"#;

/// Candidate matching prompt.
/// Replace: {required_skills}, {total_skills}, {experience_requirement},
///          {education_requirement}, {resume_json}
pub const MATCH_PROMPT_TEMPLATE: &str = r#"You are an expert HR analyst performing candidate evaluation.

{gender_neutral}

{no_fabrication}

You are given PRE-EXTRACTED job requirements. Use EXACTLY these requirements.
DO NOT extract requirements again. DO NOT add or remove skills from the list.

JOB REQUIREMENTS (USE EXACTLY AS PROVIDED):
Required Skills: {required_skills}
Experience Required: {experience_requirement}
Education Required: {education_requirement}

CANDIDATE RESUME:
{resume_json}

MATCHING INSTRUCTIONS:

Step 1: COMPARE SKILLS
- Go through each skill in the required skills list ({total_skills} skills total)
- Check whether the candidate has this skill (exact or clearly equivalent)
- Count matches and misses; extra skills the job does not ask for earn nothing

Step 2: COMPARE EXPERIENCE
- State the candidate's EXACT years of relevant experience from the resume
- Compare with the required experience
- Start with "Meets requirements:" or "Does not meet:" consistently with the comparison

Step 3: COMPARE EDUCATION
- State what the candidate HAS (or "not mentioned")
- Compare with the required education

Step 4: CALCULATE SCORE (SHOW EXACT MATH)
- Skills: (matched / {total_skills}) * 40 = X points
- Experience: Y points (0-35)
- Education: Z points (0-25)
- TOTAL: X + Y + Z = FINAL SCORE

SCORING DETAILS:
Skills Points (0-40): (matched_skills / {total_skills}) * 40
Experience Points (0-35):
- Exceeds requirements = 35
- Meets exactly or exceeds slightly = 30-32
- Somewhat below = 18-25
- Far below or no experience = 0-17
Education Points (0-25):
- Meets or exceeds = 25
- Close (e.g. Diploma for Bachelor's) = 15-18
- Not mentioned = 0

Return a JSON object with this EXACT schema:
{
  "total_required_skills": {total_skills},
  "match_score": 0,
  "matched_skills": ["skills from the required list that the candidate has"],
  "missing_skills": ["skills from the required list that the candidate lacks"],
  "experience_match": "'Meets requirements: Has ...' or 'Does not meet: Has ...'",
  "education_match": "'Meets requirements: Has ...', 'Acceptable education: Has ...' or 'Does not meet: ...'",
  "overall_explanation": "Starts with 'This candidate...'; never uses the candidate's name",
  "score_breakdown": {
    "skills_points": 0,
    "experience_points": 0,
    "education_points": 0,
    "calculation": "skills_points + experience_points + education_points = match_score"
  },
  "confidence": {
    "skills": 0,
    "experience": 0,
    "education": 0
  }
}

CRITICAL RULES:
1. total_required_skills MUST be {total_skills}
2. matched_skills + missing_skills MUST cover all {total_skills} required skills
3. match_score MUST equal skills_points + experience_points + education_points

{confidence_scale}"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn match_values() -> PromptValues {
        PromptValues::from([
            ("required_skills", "[\"Python\", \"SQL\"]".to_string()),
            ("total_skills", "2".to_string()),
            ("experience_requirement", "3+ years".to_string()),
            ("education_requirement", "Bachelor's".to_string()),
            ("resume_json", "{\"skills\": [\"Python\"]}".to_string()),
        ])
    }

    #[test]
    fn test_missing_value_is_configuration_error() {
        let mut values = match_values();
        values.remove("resume_json");
        let err = build_prompt(PromptKind::Match, &values).unwrap_err();
        assert_eq!(
            err,
            PromptError::MissingValue {
                kind: PromptKind::Match,
                key: "resume_json"
            }
        );
    }

    #[test]
    fn test_match_prompt_has_steps_shape_and_rules() {
        let prompt = build_prompt(PromptKind::Match, &match_values()).unwrap();
        let skills = prompt.find("Step 1: COMPARE SKILLS").unwrap();
        let experience = prompt.find("Step 2: COMPARE EXPERIENCE").unwrap();
        let education = prompt.find("Step 3: COMPARE EDUCATION").unwrap();
        let score = prompt.find("Step 4: CALCULATE SCORE").unwrap();
        assert!(skills < experience && experience < education && education < score);

        assert!(prompt.contains("\"score_breakdown\""));
        assert!(prompt.contains("\"confidence\""));
        assert!(prompt.contains("DO NOT infer"));
        assert!(prompt.contains("\"total_required_skills\": 2"));
        assert!(prompt.contains("Required Skills: [\"Python\", \"SQL\"]"));
        assert!(!prompt.contains("{total_skills}"));
        assert!(!prompt.contains("{no_fabrication}"));
    }

    #[test]
    fn test_substituted_text_is_not_rescanned() {
        let values = PromptValues::from([(
            "job_description",
            "Use {resume_text} templating and {braces}".to_string(),
        )]);
        let prompt = build_prompt(PromptKind::JobRequirements, &values).unwrap();
        assert!(prompt.contains("Use {resume_text} templating and {braces}"));
    }

    #[test]
    fn test_every_kind_asks_for_confidence() {
        let resume = build_prompt(
            PromptKind::Resume,
            &PromptValues::from([
                ("resume_text", "Jane".to_string()),
                ("output_language", "English".to_string()),
            ]),
        )
        .unwrap();
        let requirements = build_prompt(
            PromptKind::JobRequirements,
            &PromptValues::from([("job_description", "Rust dev".to_string())]),
        )
        .unwrap();

        for prompt in [resume, requirements] {
            assert!(prompt.contains("\"confidence\""));
            assert!(prompt.contains("CONFIDENCE SCORING"));
            assert!(prompt.contains("ONLY use information that is EXPLICITLY stated"));
        }
    }

    #[test]
    fn test_system_prompts_demand_json() {
        for kind in [PromptKind::Resume, PromptKind::JobRequirements, PromptKind::Match] {
            assert!(kind.system().contains("valid JSON only"));
        }
    }
}
