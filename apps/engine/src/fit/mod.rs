//! Content-Fit Estimator — predicts, without running real layout, whether
//! a resume overflows the fixed single-page two-column template.
//!
//! The model costs structural elements in line units against independent
//! budgets for the main column and the sidebar. It is an intentional
//! approximation: good enough to trigger (at most) one trim round, cheap
//! enough to run on every generation.

use serde::{Deserialize, Serialize};

use crate::models::content::ResumeContent;

pub mod prompts;

pub use prompts::build_trim_prompt;

// ────────────────────────────────────────────────────────────────────────────
// Budgets
// ────────────────────────────────────────────────────────────────────────────

/// Line budgets and per-element costs for the two-column page.
///
/// Defaults assume US letter, 10pt body text: ~68 characters per main
/// column line, ~26 in the sidebar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageBudget {
    pub main_max_lines: f32,
    pub sidebar_max_lines: f32,
    pub main_chars_per_line: f32,
    pub sidebar_chars_per_line: f32,
    /// Name/title block at the top of the main column.
    pub header_lines: f32,
    /// Contact block at the top of the sidebar.
    pub contact_lines: f32,
    /// Blank-line cost between entries.
    pub entry_spacing: f32,
    /// Company/role/date header lines per experience or project entry.
    pub entry_header_lines: f32,
    /// Fixed cost per sidebar education entry.
    pub education_entry_lines: f32,
}

impl Default for PageBudget {
    fn default() -> Self {
        PageBudget {
            main_max_lines: 46.0,
            sidebar_max_lines: 44.0,
            main_chars_per_line: 68.0,
            sidebar_chars_per_line: 26.0,
            header_lines: 4.0,
            contact_lines: 6.0,
            entry_spacing: 1.0,
            entry_header_lines: 2.0,
            education_entry_lines: 3.0,
        }
    }
}

/// Hard numeric budgets carried into the trim prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrimBudgets {
    pub max_experiences: usize,
    pub max_bullets_per_experience: usize,
    pub max_summary_words: usize,
    pub max_skill_categories: usize,
    pub max_projects: usize,
    pub max_bullets_per_project: usize,
}

impl Default for TrimBudgets {
    fn default() -> Self {
        TrimBudgets {
            max_experiences: 4,
            max_bullets_per_experience: 4,
            max_summary_words: 60,
            max_skill_categories: 4,
            max_projects: 2,
            max_bullets_per_project: 2,
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Estimation
// ────────────────────────────────────────────────────────────────────────────

/// Result of one estimation pass. `overflow_lines` is the worse of the two
/// column deltas and is 0 when the content fits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FitEstimate {
    pub fits: bool,
    pub main_lines: f32,
    pub sidebar_lines: f32,
    pub overflow_lines: f32,
}

#[derive(Debug, Clone, Default)]
pub struct FitEstimator {
    budget: PageBudget,
}

impl FitEstimator {
    pub fn new(budget: PageBudget) -> Self {
        FitEstimator { budget }
    }

    pub fn estimate(&self, content: &ResumeContent) -> FitEstimate {
        let main_lines = self.main_column_lines(content);
        let sidebar_lines = self.sidebar_lines(content);

        let main_overflow = main_lines - self.budget.main_max_lines;
        let sidebar_overflow = sidebar_lines - self.budget.sidebar_max_lines;
        let overflow_lines = main_overflow.max(sidebar_overflow).max(0.0);

        FitEstimate {
            fits: overflow_lines <= 0.0,
            main_lines,
            sidebar_lines,
            overflow_lines,
        }
    }

    fn main_column_lines(&self, content: &ResumeContent) -> f32 {
        let budget = &self.budget;
        let mut lines = budget.header_lines;

        lines += wrapped_lines(&content.professional_summary, budget.main_chars_per_line);

        for entry in &content.experience {
            lines += budget.entry_header_lines;
            for highlight in &entry.highlights {
                lines += bullet_cost(highlight, budget.main_chars_per_line);
            }
            lines += budget.entry_spacing;
        }

        for project in &content.projects {
            lines += budget.entry_header_lines;
            lines += wrapped_lines(&project.description, budget.main_chars_per_line);
            for highlight in &project.highlights {
                lines += bullet_cost(highlight, budget.main_chars_per_line);
            }
            lines += budget.entry_spacing;
        }

        lines
    }

    fn sidebar_lines(&self, content: &ResumeContent) -> f32 {
        let budget = &self.budget;
        let mut lines = budget.contact_lines;

        for category in &content.skills {
            // Category label plus the wrapped, comma-joined item list.
            lines += 1.0;
            let joined = category.items.join(", ");
            lines += wrapped_lines(&joined, budget.sidebar_chars_per_line);
        }

        for _ in &content.education {
            lines += budget.education_entry_lines + budget.entry_spacing;
        }

        lines
    }
}

/// Whole wrapped lines for a block of text; empty text costs nothing.
fn wrapped_lines(text: &str, chars_per_line: f32) -> f32 {
    let len = text.trim().chars().count();
    if len == 0 {
        return 0.0;
    }
    (len as f32 / chars_per_line).ceil()
}

/// Fractional multi-line cost of one bullet: at least a full line, plus
/// the exact fraction it wraps into.
fn bullet_cost(text: &str, chars_per_line: f32) -> f32 {
    let len = text.trim().chars().count();
    if len == 0 {
        return 0.0;
    }
    (len as f32 / chars_per_line).max(1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::content::{EducationEntry, ExperienceEntry, SkillCategory};

    fn entry_with_bullets(count: usize, bullet: &str) -> ExperienceEntry {
        ExperienceEntry {
            company: "Acme".to_string(),
            role: "Engineer".to_string(),
            highlights: vec![bullet.to_string(); count],
            ..Default::default()
        }
    }

    #[test]
    fn test_modest_content_fits() {
        let content = ResumeContent {
            professional_summary: "Backend engineer focused on reliability.".to_string(),
            experience: vec![entry_with_bullets(3, "Shipped a resilient ingest service.")],
            skills: vec![SkillCategory {
                category: "Languages".to_string(),
                items: vec!["Rust".to_string(), "Go".to_string()],
            }],
            ..Default::default()
        };

        let estimate = FitEstimator::default().estimate(&content);
        assert!(estimate.fits, "estimate: {estimate:?}");
        assert_eq!(estimate.overflow_lines, 0.0);
    }

    #[test]
    fn test_oversized_content_overflows_main_column() {
        let long_bullet = "word ".repeat(60);
        let content = ResumeContent {
            experience: vec![
                entry_with_bullets(6, &long_bullet),
                entry_with_bullets(6, &long_bullet),
                entry_with_bullets(6, &long_bullet),
            ],
            ..Default::default()
        };

        let estimate = FitEstimator::default().estimate(&content);
        assert!(!estimate.fits);
        assert!(estimate.overflow_lines > 0.0);
        assert!(estimate.main_lines > estimate.sidebar_lines);
    }

    #[test]
    fn test_sidebar_overflow_drives_worse_delta() {
        let many_items: Vec<String> = (0..40).map(|i| format!("Skill{i}")).collect();
        let content = ResumeContent {
            skills: (0..12)
                .map(|i| SkillCategory {
                    category: format!("Category {i}"),
                    items: many_items.clone(),
                })
                .collect(),
            education: vec![EducationEntry::default(); 4],
            ..Default::default()
        };

        let estimate = FitEstimator::default().estimate(&content);
        assert!(!estimate.fits);
        assert!(estimate.sidebar_lines > estimate.main_lines);
        assert_eq!(
            estimate.overflow_lines,
            estimate.sidebar_lines - PageBudget::default().sidebar_max_lines
        );
    }

    #[test]
    fn test_bullet_cost_is_fractional_above_one_line() {
        assert_eq!(bullet_cost("short", 68.0), 1.0);
        let cost = bullet_cost(&"x".repeat(102), 68.0);
        assert!((cost - 1.5).abs() < 0.01, "cost was {cost}");
        assert_eq!(bullet_cost("", 68.0), 0.0);
    }

    #[test]
    fn test_empty_resume_costs_only_fixed_blocks() {
        let estimate = FitEstimator::default().estimate(&ResumeContent::default());
        let budget = PageBudget::default();
        assert_eq!(estimate.main_lines, budget.header_lines);
        assert_eq!(estimate.sidebar_lines, budget.contact_lines);
        assert!(estimate.fits);
    }
}
