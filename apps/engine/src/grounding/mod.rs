//! Content Grounding Filter — the last line of defense against invented
//! employers, skills and projects before a draft reaches a human.
//!
//! Resumes are hard-filtered against the authoritative content items: an
//! experience entry either matches an authoritative company or is dropped
//! entirely, with no partial trust. Defined fallbacks guarantee a required
//! section is never emitted empty while authoritative data exists. Cover
//! letters keep their creative latitude and are only scanned for suspect
//! terms, producing operator-facing warnings.

use std::collections::{HashMap, HashSet};

use serde::Serialize;
use tracing::warn;

use crate::models::content::{
    CoverLetterContent, EducationEntry, ExperienceEntry, ProjectEntry, ResumeContent,
    SkillCategory,
};
use crate::models::profile::{ContentItem, ContentItemKind};
use crate::models::request::TargetJob;

/// What the filter did, for step results and operator logs. Never fatal.
#[derive(Debug, Clone, Default, Serialize)]
pub struct GroundingReport {
    pub dropped_experience: Vec<String>,
    pub dropped_skills: Vec<String>,
    pub dropped_projects: Vec<String>,
    pub experience_fallback: bool,
    pub skills_fallback: Option<String>,
    pub enriched_education: usize,
}

/// Filters AI resume content down to claims traceable to the authoritative
/// items. Consumes the input; grounded content supersedes it.
pub fn ground_resume(content: ResumeContent, items: &[ContentItem]) -> (ResumeContent, GroundingReport) {
    let mut report = GroundingReport::default();

    let work_items = by_normalized_title(items, ContentItemKind::Work);
    let experience = ground_experience(content.experience, items, &work_items, &mut report);
    let skills = ground_skills(content.skills, items, &mut report);
    let projects = ground_projects(content.projects, items, &mut report);
    let education = enrich_education(content.education, items, &mut report);

    if !report.dropped_experience.is_empty() {
        warn!(
            dropped = ?report.dropped_experience,
            "grounding dropped experience entries with no authoritative match"
        );
    }
    if !report.dropped_skills.is_empty() {
        warn!(dropped = ?report.dropped_skills, "grounding dropped unverifiable skills");
    }

    (
        ResumeContent {
            professional_summary: content.professional_summary,
            experience,
            education,
            projects,
            skills,
        },
        report,
    )
}

// ────────────────────────────────────────────────────────────────────────────
// Experience
// ────────────────────────────────────────────────────────────────────────────

fn ground_experience(
    proposed: Vec<ExperienceEntry>,
    items: &[ContentItem],
    work_items: &HashMap<String, &ContentItem>,
    report: &mut GroundingReport,
) -> Vec<ExperienceEntry> {
    let mut grounded = Vec::new();

    for entry in proposed {
        match work_items.get(&normalize(&entry.company)) {
            None => report.dropped_experience.push(entry.company),
            Some(item) => grounded.push(merge_experience(entry, item, items)),
        }
    }

    // No partial trust also means no empty section: if every AI entry was
    // unverifiable, fall back to the full authoritative list.
    if grounded.is_empty() && !work_items.is_empty() {
        report.experience_fallback = true;
        grounded = items
            .iter()
            .filter(|item| item.kind == ContentItemKind::Work)
            .map(|item| authoritative_experience(item, items))
            .collect();
    }

    grounded
}

/// Merges one matched AI entry with its authoritative item. Role, location
/// and dates always come from the item when it has them — the AI only
/// fills authoritative gaps. Highlights are the exception: the AI's
/// tailored bullets are the product, so non-empty AI highlights win.
fn merge_experience(
    entry: ExperienceEntry,
    item: &ContentItem,
    items: &[ContentItem],
) -> ExperienceEntry {
    let highlights = if !entry.highlights.is_empty() {
        entry.highlights
    } else {
        authoritative_highlights(item, items)
    };

    let technologies = intersect_case_insensitive(&entry.technologies, &item.skills);

    ExperienceEntry {
        company: item.title.clone(),
        role: prefer_authoritative(&item.role, entry.role),
        location: prefer_authoritative(&item.location, entry.location),
        start_date: prefer_authoritative(&item.date_start, entry.start_date),
        end_date: authoritative_end_date(item, entry.end_date),
        highlights,
        technologies,
    }
}

fn authoritative_experience(item: &ContentItem, items: &[ContentItem]) -> ExperienceEntry {
    ExperienceEntry {
        company: item.title.clone(),
        role: item.role.clone(),
        location: item.location.clone(),
        start_date: item.date_start.clone(),
        end_date: authoritative_end_date(item, None),
        highlights: authoritative_highlights(item, items),
        technologies: item.skills.clone(),
    }
}

/// Highlight sub-items linked by parent, else description lines.
fn authoritative_highlights(item: &ContentItem, items: &[ContentItem]) -> Vec<String> {
    let children: Vec<String> = items
        .iter()
        .filter(|candidate| {
            candidate.kind == ContentItemKind::Highlight && candidate.parent_id == Some(item.id)
        })
        .map(|child| {
            if child.description.trim().is_empty() {
                child.title.clone()
            } else {
                child.description.clone()
            }
        })
        .filter(|text| !text.trim().is_empty())
        .collect();

    if !children.is_empty() {
        return children;
    }

    item.description
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .collect()
}

fn authoritative_end_date(item: &ContentItem, proposed: Option<String>) -> Option<String> {
    let date_end = item.date_end.trim();
    if date_end.is_empty() {
        proposed
    } else if date_end.eq_ignore_ascii_case("present") {
        None
    } else {
        Some(date_end.to_string())
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Skills
// ────────────────────────────────────────────────────────────────────────────

fn ground_skills(
    proposed: Vec<SkillCategory>,
    items: &[ContentItem],
    report: &mut GroundingReport,
) -> Vec<SkillCategory> {
    let vocabulary: HashSet<String> = items
        .iter()
        .flat_map(|item| item.skills.iter())
        .map(|skill| normalize(skill))
        .collect();
    let skills_free_text: String = items
        .iter()
        .filter(|item| item.kind == ContentItemKind::Skills)
        .flat_map(|item| [item.title.as_str(), item.description.as_str()])
        .collect::<Vec<_>>()
        .join("\n")
        .to_lowercase();

    let mut grounded: Vec<SkillCategory> = Vec::new();
    for category in proposed {
        let items_kept: Vec<String> = category
            .items
            .into_iter()
            .filter(|skill| {
                let lowered = normalize(skill);
                let verified = vocabulary.contains(&lowered)
                    || (!skills_free_text.is_empty() && skills_free_text.contains(&lowered));
                if !verified {
                    report.dropped_skills.push(skill.clone());
                }
                verified
            })
            .collect();

        if !items_kept.is_empty() {
            grounded.push(SkillCategory {
                category: category.category,
                items: items_kept,
            });
        }
    }

    if !grounded.is_empty() {
        return grounded;
    }

    // Rebuild from skills-tagged items.
    let rebuilt: Vec<SkillCategory> = items
        .iter()
        .filter(|item| item.kind == ContentItemKind::Skills && !item.skills.is_empty())
        .map(|item| SkillCategory {
            category: if item.title.trim().is_empty() {
                "Skills".to_string()
            } else {
                item.title.clone()
            },
            items: item.skills.clone(),
        })
        .collect();
    if !rebuilt.is_empty() {
        report.skills_fallback = Some("skills_items".to_string());
        return rebuilt;
    }

    // Last resort: flatten every authoritative skill into one category.
    let mut seen = HashSet::new();
    let flattened: Vec<String> = items
        .iter()
        .flat_map(|item| item.skills.iter())
        .filter(|skill| seen.insert(normalize(skill)))
        .cloned()
        .collect();
    if flattened.is_empty() {
        return Vec::new();
    }
    report.skills_fallback = Some("flattened".to_string());
    vec![SkillCategory {
        category: "Skills".to_string(),
        items: flattened,
    }]
}

// ────────────────────────────────────────────────────────────────────────────
// Projects and education
// ────────────────────────────────────────────────────────────────────────────

fn ground_projects(
    proposed: Vec<ProjectEntry>,
    items: &[ContentItem],
    report: &mut GroundingReport,
) -> Vec<ProjectEntry> {
    let project_items = by_normalized_title(items, ContentItemKind::Project);

    // No authoritative projects at all: nothing is verifiable, so the
    // section is forced empty regardless of what the AI produced.
    if project_items.is_empty() {
        for entry in &proposed {
            report.dropped_projects.push(entry.name.clone());
        }
        return Vec::new();
    }

    let mut grounded = Vec::new();
    for entry in proposed {
        match project_items.get(&normalize(&entry.name)) {
            None => report.dropped_projects.push(entry.name),
            Some(item) => grounded.push(ProjectEntry {
                name: item.title.clone(),
                description: prefer_proposed(entry.description, &item.description),
                url: prefer_proposed(entry.url, &item.website),
                technologies: entry.technologies,
                highlights: entry.highlights,
            }),
        }
    }
    grounded
}

/// Education is enriched, not filtered: a name match merges in the
/// authoritative institution, degree and dates; unmatched entries pass
/// through untouched.
fn enrich_education(
    proposed: Vec<EducationEntry>,
    items: &[ContentItem],
    report: &mut GroundingReport,
) -> Vec<EducationEntry> {
    let education_items = by_normalized_title(items, ContentItemKind::Education);

    proposed
        .into_iter()
        .map(|entry| match education_items.get(&normalize(&entry.institution)) {
            None => entry,
            Some(item) => {
                report.enriched_education += 1;
                EducationEntry {
                    institution: item.title.clone(),
                    degree: prefer_authoritative(&item.role, entry.degree),
                    field: entry.field,
                    start_date: prefer_authoritative(&item.date_start, entry.start_date),
                    end_date: prefer_authoritative(&item.date_end, entry.end_date),
                    details: entry.details,
                }
            }
        })
        .collect()
}

// ────────────────────────────────────────────────────────────────────────────
// Cover-letter scan
// ────────────────────────────────────────────────────────────────────────────

/// Openers and connective words that start sentences capitalized without
/// being claims about anything.
const SCAN_STOPWORDS: &[&str] = &[
    "i", "a", "an", "the", "my", "your", "our", "their", "this", "that", "these", "those", "dear",
    "hello", "hi", "sincerely", "regards", "best", "thank", "thanks", "hiring", "manager", "team",
    "as", "in", "on", "at", "with", "for", "and", "but", "while", "when", "after", "before",
    "having", "beyond", "from", "to", "it", "its", "over", "during", "additionally", "finally",
    "throughout", "please", "would", "what", "where", "working",
];

/// Heuristically scans a cover letter for company/technology-looking terms
/// absent from the authoritative vocabulary. Returns operator-facing
/// warnings; the letter is never rejected.
pub fn scan_cover_letter(
    content: &CoverLetterContent,
    items: &[ContentItem],
    job: &TargetJob,
) -> Vec<String> {
    let mut vocabulary: HashSet<String> = items
        .iter()
        .flat_map(|item| item.skills.iter().map(|skill| normalize(skill)))
        .collect();
    for item in items {
        for word in item.title.split_whitespace() {
            vocabulary.insert(normalize(word));
        }
        for word in item.role.split_whitespace() {
            vocabulary.insert(normalize(word));
        }
    }
    for source in [&job.company, &job.role] {
        for word in source.split_whitespace() {
            vocabulary.insert(normalize(&strip_punctuation(word)));
        }
    }

    let mut warnings = Vec::new();
    let mut flagged: HashSet<String> = HashSet::new();

    for paragraph in &content.body_paragraphs {
        let mut sentence_start = true;
        for token in paragraph.split_whitespace() {
            let word = strip_punctuation(token);
            let starts_sentence = sentence_start;
            sentence_start = token.ends_with(['.', '!', '?']);

            if word.len() < 3 {
                continue;
            }
            let suspicious = looks_like_term(&word, starts_sentence);
            if !suspicious {
                continue;
            }
            let lowered = normalize(&word);
            if SCAN_STOPWORDS.contains(&lowered.as_str()) || vocabulary.contains(&lowered) {
                continue;
            }
            if flagged.insert(lowered) {
                let warning = format!(
                    "cover letter mentions '{word}' which does not appear in the profile"
                );
                warn!(term = %word, "suspect cover letter term");
                warnings.push(warning);
            }
        }
    }

    warnings
}

/// A token looks like a company/technology term when it is capitalized
/// mid-sentence, mixed-case anywhere (PostgreSQL, gRPC), or letter+digit
/// (S3, EC2).
fn looks_like_term(word: &str, starts_sentence: bool) -> bool {
    let has_digit = word.chars().any(|c| c.is_ascii_digit());
    let has_alpha = word.chars().any(char::is_alphabetic);
    if has_digit && has_alpha {
        return true;
    }
    let mut chars = word.chars();
    let Some(first) = chars.next() else {
        return false;
    };
    let interior_upper = chars.any(char::is_uppercase);
    if interior_upper {
        return true;
    }
    first.is_uppercase() && !starts_sentence
}

// ────────────────────────────────────────────────────────────────────────────
// Shared helpers
// ────────────────────────────────────────────────────────────────────────────

fn by_normalized_title(
    items: &[ContentItem],
    kind: ContentItemKind,
) -> HashMap<String, &ContentItem> {
    items
        .iter()
        .filter(|item| item.kind == kind && !item.title.trim().is_empty())
        .map(|item| (normalize(&item.title), item))
        .collect()
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

fn strip_punctuation(token: &str) -> String {
    token
        .trim_matches(|c: char| !c.is_alphanumeric())
        .to_string()
}

fn prefer_authoritative(authoritative: &str, proposed: String) -> String {
    if authoritative.trim().is_empty() {
        proposed
    } else {
        authoritative.to_string()
    }
}

fn prefer_proposed(proposed: String, authoritative: &str) -> String {
    if proposed.trim().is_empty() {
        authoritative.to_string()
    } else {
        proposed
    }
}

/// Proposed values that case-insensitively match an authoritative one,
/// returned with the authoritative casing.
fn intersect_case_insensitive(proposed: &[String], authoritative: &[String]) -> Vec<String> {
    let authoritative_by_key: HashMap<String, &String> = authoritative
        .iter()
        .map(|value| (normalize(value), value))
        .collect();
    let mut seen = HashSet::new();
    proposed
        .iter()
        .filter_map(|value| authoritative_by_key.get(&normalize(value)).copied())
        .filter(|value| seen.insert(normalize(value)))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn work_item(company: &str, role: &str, start: &str, end: &str) -> ContentItem {
        let mut item = ContentItem::new(ContentItemKind::Work, company);
        item.role = role.to_string();
        item.location = "Lisbon".to_string();
        item.date_start = start.to_string();
        item.date_end = end.to_string();
        item.skills = vec!["Rust".to_string(), "PostgreSQL".to_string()];
        item
    }

    fn ai_experience(company: &str) -> ExperienceEntry {
        ExperienceEntry {
            company: company.to_string(),
            role: "Imagined Title".to_string(),
            location: String::new(),
            start_date: "1999".to_string(),
            end_date: Some("2001".to_string()),
            highlights: vec!["Did a thing".to_string()],
            technologies: vec!["rust".to_string(), "Kubernetes".to_string()],
        }
    }

    #[test]
    fn test_unknown_company_is_always_dropped() {
        let items = vec![work_item("Acme Corp", "Engineer", "2020", "")];
        let content = ResumeContent {
            experience: vec![ai_experience("Globex")],
            ..Default::default()
        };

        let (grounded, report) = ground_resume(content, &items);
        // Globex dropped; fallback kicks in with the authoritative list.
        assert_eq!(report.dropped_experience, vec!["Globex"]);
        assert!(report.experience_fallback);
        assert_eq!(grounded.experience.len(), 1);
        assert_eq!(grounded.experience[0].company, "Acme Corp");
    }

    #[test]
    fn test_matched_entry_keeps_authoritative_role_and_dates() {
        let items = vec![work_item("Acme Corp", "Staff Engineer", "2020-01", "2023-06")];
        let content = ResumeContent {
            experience: vec![ai_experience("acme corp")],
            ..Default::default()
        };

        let (grounded, report) = ground_resume(content, &items);
        let entry = &grounded.experience[0];
        assert_eq!(entry.company, "Acme Corp");
        assert_eq!(entry.role, "Staff Engineer", "AI role must not survive");
        assert_eq!(entry.start_date, "2020-01");
        assert_eq!(entry.end_date.as_deref(), Some("2023-06"));
        assert!(!report.experience_fallback);
    }

    #[test]
    fn test_ai_highlights_survive_when_non_empty() {
        let items = vec![work_item("Acme Corp", "Engineer", "2020", "")];
        let content = ResumeContent {
            experience: vec![ai_experience("Acme Corp")],
            ..Default::default()
        };
        let (grounded, _) = ground_resume(content, &items);
        assert_eq!(grounded.experience[0].highlights, vec!["Did a thing"]);
    }

    #[test]
    fn test_empty_ai_highlights_fall_back_to_highlight_children() {
        let mut parent = work_item("Acme Corp", "Engineer", "2020", "");
        let mut child = ContentItem::new(ContentItemKind::Highlight, "Shipped the pipeline");
        child.parent_id = Some(parent.id);
        child.description = "Shipped the ingestion pipeline".to_string();
        parent.description = "unused when children exist".to_string();

        let mut entry = ai_experience("Acme Corp");
        entry.highlights.clear();

        let content = ResumeContent {
            experience: vec![entry],
            ..Default::default()
        };
        let (grounded, _) = ground_resume(content, &[parent, child]);
        assert_eq!(
            grounded.experience[0].highlights,
            vec!["Shipped the ingestion pipeline"]
        );
    }

    #[test]
    fn test_technologies_restricted_to_authoritative_intersection() {
        let items = vec![work_item("Acme Corp", "Engineer", "2020", "")];
        let content = ResumeContent {
            experience: vec![ai_experience("Acme Corp")],
            ..Default::default()
        };
        let (grounded, _) = ground_resume(content, &items);
        // "rust" matches (authoritative casing restored); Kubernetes does not.
        assert_eq!(grounded.experience[0].technologies, vec!["Rust"]);
    }

    #[test]
    fn test_present_authoritative_end_date_maps_to_none() {
        let items = vec![work_item("Acme Corp", "Engineer", "2020", "Present")];
        let content = ResumeContent {
            experience: vec![ai_experience("Acme Corp")],
            ..Default::default()
        };
        let (grounded, _) = ground_resume(content, &items);
        assert!(grounded.experience[0].end_date.is_none());
    }

    #[test]
    fn test_skills_filtered_to_literal_membership() {
        let mut skills_item = ContentItem::new(ContentItemKind::Skills, "Languages");
        skills_item.skills = vec!["Rust".to_string(), "Go".to_string()];
        skills_item.description = "Also comfortable with Terraform".to_string();
        let items = vec![skills_item];

        let content = ResumeContent {
            skills: vec![SkillCategory {
                category: "Languages".to_string(),
                items: vec![
                    "rust".to_string(),
                    "terraform".to_string(),
                    "COBOL".to_string(),
                ],
            }],
            ..Default::default()
        };

        let (grounded, report) = ground_resume(content, &items);
        assert_eq!(grounded.skills.len(), 1);
        assert_eq!(grounded.skills[0].items, vec!["rust", "terraform"]);
        assert_eq!(report.dropped_skills, vec!["COBOL"]);
    }

    #[test]
    fn test_all_skills_dropped_rebuilds_from_skills_items() {
        let mut skills_item = ContentItem::new(ContentItemKind::Skills, "Backend");
        skills_item.skills = vec!["Rust".to_string()];
        let items = vec![skills_item];

        let content = ResumeContent {
            skills: vec![SkillCategory {
                category: "Invented".to_string(),
                items: vec!["Fortran".to_string()],
            }],
            ..Default::default()
        };

        let (grounded, report) = ground_resume(content, &items);
        assert_eq!(report.skills_fallback.as_deref(), Some("skills_items"));
        assert_eq!(grounded.skills[0].category, "Backend");
        assert_eq!(grounded.skills[0].items, vec!["Rust"]);
    }

    #[test]
    fn test_last_resort_flattens_all_authoritative_skills() {
        // Work item carries skills but there is no skills-tagged item.
        let items = vec![work_item("Acme Corp", "Engineer", "2020", "")];
        let content = ResumeContent {
            skills: vec![SkillCategory {
                category: "Invented".to_string(),
                items: vec!["Fortran".to_string()],
            }],
            ..Default::default()
        };

        let (grounded, report) = ground_resume(content, &items);
        assert_eq!(report.skills_fallback.as_deref(), Some("flattened"));
        assert_eq!(grounded.skills.len(), 1);
        assert_eq!(grounded.skills[0].category, "Skills");
        assert_eq!(grounded.skills[0].items, vec!["Rust", "PostgreSQL"]);
    }

    #[test]
    fn test_projects_forced_empty_without_project_items() {
        let items = vec![work_item("Acme Corp", "Engineer", "2020", "")];
        let content = ResumeContent {
            projects: vec![ProjectEntry {
                name: "Phantom".to_string(),
                ..Default::default()
            }],
            ..Default::default()
        };
        let (grounded, report) = ground_resume(content, &items);
        assert!(grounded.projects.is_empty());
        assert_eq!(report.dropped_projects, vec!["Phantom"]);
    }

    #[test]
    fn test_projects_require_title_match() {
        let mut project = ContentItem::new(ContentItemKind::Project, "Orrery");
        project.website = "https://example.com/orrery".to_string();
        let items = vec![project];

        let content = ResumeContent {
            projects: vec![
                ProjectEntry {
                    name: "orrery".to_string(),
                    ..Default::default()
                },
                ProjectEntry {
                    name: "Phantom".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };
        let (grounded, report) = ground_resume(content, &items);
        assert_eq!(grounded.projects.len(), 1);
        assert_eq!(grounded.projects[0].name, "Orrery");
        assert_eq!(grounded.projects[0].url, "https://example.com/orrery");
        assert_eq!(report.dropped_projects, vec!["Phantom"]);
    }

    #[test]
    fn test_education_enriched_on_name_match() {
        let mut school = ContentItem::new(ContentItemKind::Education, "MIT");
        school.role = "BSc Computer Science".to_string();
        school.date_start = "2012".to_string();
        school.date_end = "2016".to_string();
        let items = vec![school];

        let content = ResumeContent {
            education: vec![
                EducationEntry {
                    institution: "mit".to_string(),
                    degree: "Some Degree".to_string(),
                    ..Default::default()
                },
                EducationEntry {
                    institution: "Unknown U".to_string(),
                    degree: "MA".to_string(),
                    ..Default::default()
                },
            ],
            ..Default::default()
        };

        let (grounded, report) = ground_resume(content, &items);
        assert_eq!(report.enriched_education, 1);
        assert_eq!(grounded.education[0].institution, "MIT");
        assert_eq!(grounded.education[0].degree, "BSc Computer Science");
        assert_eq!(grounded.education[0].end_date, "2016");
        // Unmatched entries pass through untouched.
        assert_eq!(grounded.education[1].institution, "Unknown U");
        assert_eq!(grounded.education[1].degree, "MA");
    }

    #[test]
    fn test_cover_letter_scan_flags_unknown_terms_only() {
        let mut skills_item = ContentItem::new(ContentItemKind::Skills, "Backend");
        skills_item.skills = vec!["Rust".to_string()];
        let items = vec![skills_item, work_item("Acme Corp", "Engineer", "2020", "")];

        let job = TargetJob {
            role: "Platform Engineer".to_string(),
            company: "Initech".to_string(),
            ..Default::default()
        };

        let letter = CoverLetterContent {
            greeting: "Dear Hiring Manager,".to_string(),
            body_paragraphs: vec![
                "I have shipped Rust services at Acme Corp and would love to join Initech."
                    .to_string(),
                "My recent work used Hadoop extensively.".to_string(),
            ],
            closing: "Sincerely,".to_string(),
            signature: "Ada".to_string(),
        };

        let warnings = scan_cover_letter(&letter, &items, &job);
        assert_eq!(warnings.len(), 1, "warnings: {warnings:?}");
        assert!(warnings[0].contains("Hadoop"));
    }
}
