//! Default prompt templates and cross-cutting prompt fragments for the
//! workflow engine. The prompt store may serve customized templates; these
//! are the built-ins with the same named placeholders.

/// Appended to every generation prompt — enforces JSON-only output.
pub const JSON_ONLY_GUARD: &str = "\
    You MUST respond with valid JSON only. \
    Do NOT include any text outside the JSON object. \
    Do NOT use markdown code fences. \
    Do NOT include explanations or apologies.";

/// Appended to every generation prompt — the grounding contract.
pub const GROUNDING_GUARD: &str = "\
    CRITICAL: Every employer, skill, project, date, and achievement you output \
    must come from the profile items provided. Do NOT infer, interpolate, or \
    invent details. If the profile does not support a claim, omit it entirely.";

/// JSON schema fragment the resume prompts instruct the model to emit.
pub const RESUME_FORMAT_CONTRACT: &str = r#"{
  "professionalSummary": "string",
  "experience": [
    {
      "company": "string",
      "role": "string",
      "location": "string",
      "startDate": "YYYY-MM",
      "endDate": "YYYY-MM or null if current",
      "highlights": ["string"],
      "technologies": ["string"]
    }
  ],
  "education": [
    {
      "institution": "string",
      "degree": "string",
      "field": "string",
      "startDate": "string",
      "endDate": "string",
      "details": ["string"]
    }
  ],
  "projects": [
    {
      "name": "string",
      "description": "string",
      "url": "string",
      "technologies": ["string"],
      "highlights": ["string"]
    }
  ],
  "skills": [
    { "category": "string", "items": ["string"] }
  ]
}"#;

/// JSON schema fragment the cover-letter prompts instruct the model to emit.
pub const COVER_LETTER_FORMAT_CONTRACT: &str = r#"{
  "greeting": "string",
  "bodyParagraphs": ["string"],
  "closing": "string",
  "signature": "string"
}"#;

/// Default resume generation template.
/// Replace: {role}, {company}, {job_context}, {personal_json},
///          {items_json}, {preferences}, {grounding_guard},
///          {format_contract}, {json_guard}
pub const DEFAULT_RESUME_TEMPLATE: &str = r#"You are an expert resume writer producing a tailored one-page resume.

{grounding_guard}

TARGET ROLE: {role} at {company}
{job_context}

CANDIDATE IDENTITY:
{personal_json}

AUTHORITATIVE PROFILE ITEMS (the ONLY permitted source of facts):
{items_json}

CANDIDATE PREFERENCES: {preferences}

Select the most relevant experience, emphasize what matches the target
role, and keep the resume to a single page.

Return a JSON object with this EXACT schema:
{format_contract}

{json_guard}"#;

/// Default cover letter generation template.
/// Replace: same placeholders as the resume template.
pub const DEFAULT_COVER_LETTER_TEMPLATE: &str = r#"You are an expert cover letter writer producing a tailored, specific letter.

{grounding_guard}

TARGET ROLE: {role} at {company}
{job_context}

CANDIDATE IDENTITY:
{personal_json}

AUTHORITATIVE PROFILE ITEMS (the ONLY permitted source of facts):
{items_json}

CANDIDATE PREFERENCES: {preferences}

Write 3-4 concise paragraphs connecting the candidate's actual experience
to this specific role and company. No generic filler.

Return a JSON object with this EXACT schema:
{format_contract}

{json_guard}"#;

/// Regeneration template used when a reviewer rejects a draft.
/// Replace: {doc_type}, {feedback}, {draft_json}, {format_contract},
///          {json_guard}
pub const REVISION_PROMPT_TEMPLATE: &str = r#"A human reviewer rejected the {doc_type} draft below.

REVIEWER FEEDBACK (address ALL of it):
{feedback}

CURRENT DRAFT:
{draft_json}

Revise the draft to address the feedback. Keep every fact grounded in the
draft's existing content — do NOT introduce new employers, skills, or
projects.

Return a JSON object with this EXACT schema:
{format_contract}

{json_guard}"#;
