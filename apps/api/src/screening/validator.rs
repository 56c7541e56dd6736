//! CV filter: a keyword heuristic that rejects non-resume uploads before
//! any model call is spent on them.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

/// Documents shorter than this (after trimming) are never resumes.
pub const MIN_RESUME_CHARS: usize = 100;
/// Keyword hits needed to accept a document outright.
const MIN_KEYWORD_HITS: usize = 3;

static ARABIC_DIACRITICS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\u{064B}-\u{065F}\u{0670}]").unwrap());
static WHITESPACE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());

const ENGLISH_KEYWORDS: &[&str] = &[
    // Section headers
    "experience",
    "education",
    "skills",
    "work experience",
    "employment",
    "qualifications",
    "profile",
    "summary",
    "objective",
    "career",
    "professional experience",
    "work history",
    "academic background",
    "certifications",
    "certificates",
    "training",
    "projects",
    "achievements",
    "accomplishments",
    "references",
    // Contact
    "email",
    "phone",
    "mobile",
    "address",
    "linkedin",
    "portfolio",
    "contact",
    "website",
    // Common phrases
    "years of experience",
    "worked at",
    "worked as",
    "responsible for",
    "degree in",
    "bachelor",
    "master",
    "diploma",
    "graduated",
    "university",
    "college",
    "institute",
    "resume",
    "curriculum vitae",
    "developer",
    "engineer",
    "manager",
    "analyst",
    "designer",
    "specialist",
    "coordinator",
];

const ARABIC_KEYWORDS: &[&str] = &[
    // Sections
    "خبرة",
    "خبرات",
    "الخبرة",
    "الخبرات",
    "تعليم",
    "التعليم",
    "مؤهل",
    "مؤهلات",
    "المؤهلات",
    "مهارة",
    "مهارات",
    "المهارات",
    "شهادة",
    "شهادات",
    "دورات",
    "مشاريع",
    "انجازات",
    // Education
    "بكالوريوس",
    "ماجستير",
    "دبلوم",
    "دكتوراه",
    "جامعة",
    "كلية",
    "معهد",
    "تخرج",
    // Work
    "وظيفة",
    "شركة",
    "مؤسسة",
    "مطور",
    "مهندس",
    "محلل",
    "مصمم",
    "مدير",
    // Contact
    "هاتف",
    "جوال",
    "بريد",
    "الكتروني",
    "عنوان",
    // Other
    "سيرة",
    "ذاتية",
    "معلومات",
    "شخصية",
    "ملخص",
    "لغات",
];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResumeCheck {
    pub is_resume: bool,
    pub reason: String,
    pub english_hits: usize,
    pub arabic_hits: usize,
}

/// Strips Arabic diacritics (tashkeel) and collapses whitespace.
pub fn normalize_arabic(text: &str) -> String {
    let stripped = ARABIC_DIACRITICS_RE.replace_all(text, "");
    WHITESPACE_RE.replace_all(&stripped, " ").into_owned()
}

fn contains_arabic(text: &str) -> bool {
    text.chars().any(|c| ('\u{0600}'..='\u{06FF}').contains(&c))
}

/// Decides whether `text` looks like a resume.
///
/// ACCEPT conditions:
/// - at least 3 English or Arabic CV keywords, or
/// - Arabic text with at least one Arabic keyword (accepted with a warning)
///
/// REJECT conditions:
/// - fewer than 100 characters
/// - too few keywords otherwise
pub fn looks_like_resume(text: &str) -> ResumeCheck {
    let trimmed = text.trim();
    let length = trimmed.chars().count();
    if length < MIN_RESUME_CHARS {
        return ResumeCheck {
            is_resume: false,
            reason: format!("Document too short ({length} characters, need {MIN_RESUME_CHARS})"),
            english_hits: 0,
            arabic_hits: 0,
        };
    }

    let lower = trimmed.to_lowercase();
    let english_hits = ENGLISH_KEYWORDS
        .iter()
        .filter(|&&keyword| lower.contains(keyword))
        .count();

    let normalized = normalize_arabic(trimmed);
    let arabic_hits = ARABIC_KEYWORDS
        .iter()
        .filter(|&&keyword| normalized.contains(keyword))
        .count();

    let total = english_hits + arabic_hits;

    if total >= MIN_KEYWORD_HITS {
        let reason = if arabic_hits > 0 {
            format!(
                "Valid Arabic CV detected ({arabic_hits} Arabic keywords, {english_hits} English keywords)"
            )
        } else {
            format!("Valid CV detected ({total} keywords found)")
        };
        return ResumeCheck {
            is_resume: true,
            reason,
            english_hits,
            arabic_hits,
        };
    }

    if arabic_hits > 0 && contains_arabic(trimmed) {
        return ResumeCheck {
            is_resume: true,
            reason: format!(
                "Arabic CV detected with {arabic_hits} keywords (accepted with warning)"
            ),
            english_hits,
            arabic_hits,
        };
    }

    ResumeCheck {
        is_resume: false,
        reason: format!(
            "Does not appear to be a CV (only {total} CV keywords found). \
            Please upload a document with sections like Skills, Experience, Education."
        ),
        english_hits,
        arabic_hits,
    }
}
