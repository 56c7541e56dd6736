// Shared prompt fragments.
// Each module that needs LLM calls defines its own prompts.rs alongside it;
// this file only holds the cross-cutting pieces they splice in.

/// Tail appended to every system prompt.
pub const JSON_ONLY_SYSTEM: &str = "You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Anti-hallucination rules spliced into every extraction and matching prompt.
pub const NO_FABRICATION_INSTRUCTION: &str = "\
ANTI-HALLUCINATION RULES - CRITICAL:
1. ONLY use information that is EXPLICITLY stated in the provided text
2. If something is not mentioned, leave it empty or say \"Not mentioned\"
3. DO NOT infer, assume, or generate information that is not present
4. DO NOT add generic skills or qualifications that are not written down
5. The text may come from a PDF conversion and contain noise: be tolerant of it, never invent around it";

/// How the model should assign its 0-100 confidence values.
pub const CONFIDENCE_SCALE: &str = "\
CONFIDENCE SCORING (integer 0-100 for every attribute):
- 100: clearly and explicitly stated
- 80-99: present but needs minor interpretation
- 60-79: partially present or needs translation
- 40-59: only inferable from context (use cautiously)
- 0-39: uncertain or missing";

/// Merit-only evaluation rule for candidate comparison.
pub const GENDER_NEUTRAL_INSTRUCTION: &str = "\
GENDER-NEUTRAL EVALUATION REQUIREMENT:
Evaluate the candidate based solely on qualifications, experience, and skills. \
Ignore any indicators of gender, such as names, pronouns, or gendered language. \
Do not make assumptions about career gaps, job preferences, or capabilities. \
Apply identical standards to all candidates.";
