//! Trim prompt for the single automatic refit round.

use anyhow::{Context, Result};

use crate::fit::{FitEstimate, TrimBudgets};
use crate::models::content::ResumeContent;

/// Refit prompt template.
/// Replace: {draft_json}, {overflow_lines}, {max_experiences},
///          {max_bullets_per_experience}, {max_summary_words},
///          {max_skill_categories}, {max_projects}, {max_bullets_per_project}
pub const TRIM_PROMPT_TEMPLATE: &str = r#"The resume below overflows a single-page layout by an estimated {overflow_lines} lines.

TRIM it. Do NOT rewrite it.
- Keep the wording of everything you retain EXACTLY as it is.
- Remove the least relevant bullets and entries until the budgets below hold.
- Do not add, rephrase, merge, or invent anything.

HARD BUDGETS:
- at most {max_experiences} experience entries
- at most {max_bullets_per_experience} bullets per experience entry
- professional summary at most {max_summary_words} words
- at most {max_skill_categories} skill categories
- at most {max_projects} projects
- at most {max_bullets_per_project} bullets per project

Respond with valid JSON only, in the same schema as the resume below.
Do NOT use markdown code fences. Do NOT include any text outside the JSON object.

RESUME TO TRIM:
{draft_json}"#;

/// Builds the "trim, do not rewrite" prompt carrying the first attempt
/// verbatim, the measured overflow, and the hard numeric budgets.
pub fn build_trim_prompt(
    draft: &ResumeContent,
    estimate: &FitEstimate,
    budgets: &TrimBudgets,
) -> Result<String> {
    let draft_json =
        serde_json::to_string_pretty(draft).context("serializing draft for trim prompt")?;

    Ok(TRIM_PROMPT_TEMPLATE
        .replace("{overflow_lines}", &format!("{:.1}", estimate.overflow_lines))
        .replace("{max_experiences}", &budgets.max_experiences.to_string())
        .replace(
            "{max_bullets_per_experience}",
            &budgets.max_bullets_per_experience.to_string(),
        )
        .replace("{max_summary_words}", &budgets.max_summary_words.to_string())
        .replace(
            "{max_skill_categories}",
            &budgets.max_skill_categories.to_string(),
        )
        .replace("{max_projects}", &budgets.max_projects.to_string())
        .replace(
            "{max_bullets_per_project}",
            &budgets.max_bullets_per_project.to_string(),
        )
        .replace("{draft_json}", &draft_json))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::ExperienceEntry;

    #[test]
    fn test_trim_prompt_carries_draft_and_budgets() {
        let draft = ResumeContent {
            professional_summary: "Distributed-systems engineer.".to_string(),
            experience: vec![ExperienceEntry {
                company: "Acme Corp".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let estimate = FitEstimate {
            fits: false,
            main_lines: 52.0,
            sidebar_lines: 20.0,
            overflow_lines: 6.0,
        };

        let prompt = build_trim_prompt(&draft, &estimate, &TrimBudgets::default()).unwrap();
        assert!(prompt.contains("6.0 lines"));
        assert!(prompt.contains("Acme Corp"), "draft must appear verbatim");
        assert!(prompt.contains("at most 4 experience entries"));
        assert!(prompt.contains("at most 60 words") || prompt.contains("most 60 words"));
        assert!(!prompt.contains("{draft_json}"), "all placeholders filled");
    }
}
