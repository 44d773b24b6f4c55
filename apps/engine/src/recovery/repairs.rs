//! Targeted, untyped repairs applied between parse and strict validation.
//!
//! Each repair normalizes one known model misbehavior onto the canonical
//! field layout. Repairs mutate the `serde_json::Value` in place and record
//! themselves at most once per recovery.

use serde_json::{Map, Value};

use super::RepairAction;

/// Alternate keys the model uses for experience fields, mapped onto the
/// canonical name. First present alternate wins; an existing canonical key
/// is never overwritten.
const EXPERIENCE_ALIASES: &[(&str, &[&str])] = &[
    ("company", &["companyName", "employer"]),
    ("role", &["title", "position"]),
    ("startDate", &["start", "from"]),
    ("endDate", &["end", "to"]),
    ("highlights", &["bullets", "achievements"]),
];

/// Fallback keys for the cover-letter body, tried in order.
const BODY_FALLBACK_KEYS: &[&str] = &["body", "content", "paragraphs"];

pub(super) fn repair_resume(value: &mut Value, repairs: &mut Vec<RepairAction>) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };

    map_summary_field(obj, repairs);
    repair_experience(obj, repairs);
    repair_skills(obj, repairs);
    scrub_string_arrays(obj);
}

pub(super) fn repair_cover_letter(value: &mut Value, repairs: &mut Vec<RepairAction>) {
    let Some(obj) = value.as_object_mut() else {
        return;
    };
    repair_body_paragraphs(obj, repairs);
}

fn record(repairs: &mut Vec<RepairAction>, action: RepairAction) {
    if !repairs.contains(&action) {
        repairs.push(action);
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Resume repairs
// ────────────────────────────────────────────────────────────────────────────

fn map_summary_field(obj: &mut Map<String, Value>, repairs: &mut Vec<RepairAction>) {
    if obj.contains_key("professionalSummary") {
        return;
    }
    if let Some(summary @ Value::String(_)) = obj.remove("summary") {
        obj.insert("professionalSummary".to_string(), summary);
        record(repairs, RepairAction::MappedSummaryField);
    }
}

fn repair_experience(obj: &mut Map<String, Value>, repairs: &mut Vec<RepairAction>) {
    let Some(Value::Array(entries)) = obj.get_mut("experience") else {
        return;
    };

    for entry in entries.iter_mut() {
        let Some(entry) = entry.as_object_mut() else {
            continue;
        };

        for (canonical, aliases) in EXPERIENCE_ALIASES {
            if entry.contains_key(*canonical) {
                continue;
            }
            for alias in *aliases {
                if let Some(found) = entry.remove(*alias) {
                    entry.insert((*canonical).to_string(), found);
                    record(repairs, RepairAction::MappedExperienceFields);
                    break;
                }
            }
        }

        // A lone highlight string becomes a one-element list.
        if let Some(highlight @ Value::String(_)) = entry.get("highlights").cloned() {
            entry.insert("highlights".to_string(), Value::Array(vec![highlight]));
        }

        if let Some(Value::String(end)) = entry.get("endDate") {
            if end.eq_ignore_ascii_case("present") {
                entry.insert("endDate".to_string(), Value::Null);
                record(repairs, RepairAction::CoercedPresentEndDate);
            }
        }
    }
}

fn repair_skills(obj: &mut Map<String, Value>, repairs: &mut Vec<RepairAction>) {
    let Some(skills) = obj.get("skills").cloned() else {
        return;
    };

    match skills {
        // Bare string list → one "Skills" category.
        Value::Array(items) if items.iter().all(Value::is_string) && !items.is_empty() => {
            obj.insert(
                "skills".to_string(),
                Value::Array(vec![serde_json::json!({
                    "category": "Skills",
                    "items": items,
                })]),
            );
            record(repairs, RepairAction::ExpandedSkillList);
        }

        // Array of category objects with alternate key names.
        Value::Array(categories) => {
            let mut normalized = Vec::new();
            let mut touched = false;
            for category in categories {
                match category {
                    Value::Object(mut map) => {
                        if !map.contains_key("category") {
                            if let Some(name) = map.remove("name") {
                                map.insert("category".to_string(), name);
                                touched = true;
                            }
                        }
                        if !map.contains_key("items") {
                            for alias in ["skills", "list"] {
                                if let Some(items) = map.remove(alias) {
                                    map.insert("items".to_string(), items);
                                    touched = true;
                                    break;
                                }
                            }
                        }
                        normalized.push(Value::Object(map));
                    }
                    // Stray strings inside a category array become their
                    // own single-item category.
                    Value::String(item) => {
                        touched = true;
                        normalized.push(serde_json::json!({
                            "category": "Skills",
                            "items": [item],
                        }));
                    }
                    _ => touched = true, // dropped
                }
            }
            obj.insert("skills".to_string(), Value::Array(normalized));
            if touched {
                record(repairs, RepairAction::NormalizedSkillCategories);
            }
        }

        // `{category: [items]}` map → one category per key.
        Value::Object(map) => {
            let categories: Vec<Value> = map
                .into_iter()
                .map(|(category, items)| {
                    serde_json::json!({
                        "category": category,
                        "items": match items {
                            Value::Array(list) => Value::Array(list),
                            Value::String(single) => Value::Array(vec![Value::String(single)]),
                            _ => Value::Array(vec![]),
                        },
                    })
                })
                .collect();
            obj.insert("skills".to_string(), Value::Array(categories));
            record(repairs, RepairAction::NormalizedSkillCategories);
        }

        _ => {}
    }
}

/// Drops non-string elements from every known string-array field so a
/// stray number cannot fail strict validation.
fn scrub_string_arrays(obj: &mut Map<String, Value>) {
    for section in ["experience", "projects", "skills", "education"] {
        let Some(Value::Array(entries)) = obj.get_mut(section) else {
            continue;
        };
        for entry in entries.iter_mut() {
            let Some(entry) = entry.as_object_mut() else {
                continue;
            };
            for field in ["highlights", "technologies", "items", "details"] {
                if let Some(Value::Array(values)) = entry.get_mut(field) {
                    values.retain(Value::is_string);
                }
            }
        }
    }
}

// ────────────────────────────────────────────────────────────────────────────
// Cover-letter repairs
// ────────────────────────────────────────────────────────────────────────────

fn repair_body_paragraphs(obj: &mut Map<String, Value>, repairs: &mut Vec<RepairAction>) {
    let source = if obj.contains_key("bodyParagraphs") {
        obj.get("bodyParagraphs").cloned()
    } else {
        BODY_FALLBACK_KEYS.iter().find_map(|key| {
            obj.remove(*key).map(|found| {
                record(repairs, RepairAction::UsedFallbackBodyKey);
                found
            })
        })
    };
    let Some(source) = source else {
        return;
    };

    let already_clean = matches!(
        &source,
        Value::Array(items) if items.iter().all(|item| {
            item.as_str().map(|s| !s.trim().is_empty() && s.trim() == s).unwrap_or(false)
        })
    );

    let paragraphs = normalize_paragraphs(&source);
    if !already_clean && !paragraphs.is_empty() {
        record(repairs, RepairAction::NormalizedBodyParagraphs);
    }
    obj.insert(
        "bodyParagraphs".to_string(),
        Value::Array(paragraphs.into_iter().map(Value::String).collect()),
    );
}

fn normalize_paragraphs(value: &Value) -> Vec<String> {
    match value {
        Value::String(text) => split_paragraphs(text),
        Value::Object(map) => paragraph_from_object(map).into_iter().collect(),
        Value::Array(items) => items
            .iter()
            .flat_map(|item| match item {
                Value::String(text) => {
                    let trimmed = text.trim();
                    if trimmed.is_empty() {
                        Vec::new()
                    } else {
                        vec![trimmed.to_string()]
                    }
                }
                Value::Object(map) => paragraph_from_object(map).into_iter().collect(),
                _ => Vec::new(),
            })
            .collect(),
        _ => Vec::new(),
    }
}

fn paragraph_from_object(map: &Map<String, Value>) -> Option<String> {
    for key in ["text", "content", "paragraph"] {
        if let Some(Value::String(text)) = map.get(key) {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                return Some(trimmed.to_string());
            }
        }
    }
    None
}

fn split_paragraphs(text: &str) -> Vec<String> {
    text.replace("\r\n", "\n")
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .map(str::to_string)
        .collect()
}
