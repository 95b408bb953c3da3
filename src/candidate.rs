//! Candidate data model, its lexical-store projection, and the filter types
//! that shape a hybrid search request.
//!
//! This module owns C5 (Document Projector) from the spec: `Candidate` is the
//! upstream, read-only shape; `LexicalDoc` is what gets written to the
//! lexical store; `to_semantic_text` is the model-input contract for the
//! embedding gate.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchServiceError};

/// A skill entry as returned by the upstream candidate API. Only `skill` is
/// part of the lexical/semantic contract; any other fields the upstream
/// sends are preserved for forward compatibility but otherwise ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Skill {
    pub skill: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Experience {
    #[serde(default)]
    pub position: String,
    #[serde(default)]
    pub company: String,
    #[serde(default)]
    pub responsibilities: String,
}

/// The upstream, source-of-truth candidate document (spec §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub telegram_id: i64,
    #[serde(default)]
    pub headline_role: Option<String>,
    #[serde(default)]
    pub experience_years: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub work_modes: Vec<String>,
    #[serde(default)]
    pub skills: Vec<Skill>,
    #[serde(default)]
    pub projects: Vec<Project>,
    #[serde(default)]
    pub experiences: Vec<Experience>,
    #[serde(default)]
    pub display_name: Option<String>,
}

/// The projection of a `Candidate` stored in the lexical store (spec §3).
///
/// Field set is closed by construction: only the fields named here ever
/// reach the lexical store, and `skills` is always lowercased and trimmed.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct LexicalDoc {
    pub id: String,
    pub telegram_id: i64,
    pub headline_role: Option<String>,
    pub experience_years: Option<f64>,
    pub location: Option<String>,
    pub work_modes: BTreeSet<String>,
    pub skills: BTreeSet<String>,
}

/// Maps raw candidates to their lexical and semantic-text projections.
///
/// Stateless by design: every method is a pure function of its input, so it
/// can be called from the incremental path (one candidate at a time) and
/// the full-reindex path (batched) without any shared mutable state.
pub struct DocumentProjector;

impl DocumentProjector {
    /// Project a candidate into its lexical-store document.
    ///
    /// Rejects candidates without an `id` — callers (the indexer, the
    /// consumer) must surface this as a validation error.
    pub fn to_lexical(candidate: &Candidate) -> Result<LexicalDoc> {
        if candidate.id.trim().is_empty() {
            return Err(SearchServiceError::validation(
                "candidate is missing an id",
            ));
        }

        let skills = candidate
            .skills
            .iter()
            .map(|s| s.skill.trim().to_lowercase())
            .filter(|s| !s.is_empty())
            .collect();

        let work_modes = candidate.work_modes.iter().cloned().collect();

        Ok(LexicalDoc {
            id: candidate.id.clone(),
            telegram_id: candidate.telegram_id,
            headline_role: candidate.headline_role.clone(),
            experience_years: candidate.experience_years,
            location: candidate.location.clone(),
            work_modes,
            skills,
        })
    }

    /// Build the embedding-input text for a candidate.
    ///
    /// The exact format is part of the model-input contract (spec §4.5):
    /// changing it silently invalidates every embedding already written and
    /// requires a full reindex. Empty segments are dropped; segments are
    /// joined with ". ".
    pub fn to_semantic_text(candidate: &Candidate) -> String {
        let mut segments = Vec::new();

        if let Some(role) = candidate.headline_role.as_ref().filter(|r| !r.trim().is_empty()) {
            segments.push(format!("Должность: {role}"));
        }

        if !candidate.skills.is_empty() {
            let skills = candidate
                .skills
                .iter()
                .map(|s| s.skill.trim())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
                .join(", ");
            if !skills.is_empty() {
                segments.push(format!("Навыки: {skills}"));
            }
        }

        if !candidate.projects.is_empty() {
            let projects = candidate
                .projects
                .iter()
                .filter(|p| !p.title.trim().is_empty() || !p.description.trim().is_empty())
                .map(|p| format!("{}: {}", p.title.trim(), p.description.trim()))
                .collect::<Vec<_>>()
                .join(". ");
            if !projects.is_empty() {
                segments.push(format!("Проекты: {projects}"));
            }
        }

        if !candidate.experiences.is_empty() {
            let experiences = candidate
                .experiences
                .iter()
                .filter(|e| !e.position.trim().is_empty() || !e.company.trim().is_empty())
                .map(|e| {
                    format!(
                        "{} в {}: {}",
                        e.position.trim(),
                        e.company.trim(),
                        e.responsibilities.trim()
                    )
                })
                .collect::<Vec<_>>()
                .join(". ");
            if !experiences.is_empty() {
                segments.push(format!("Опыт: {experiences}"));
            }
        }

        segments.join(". ")
    }
}

/// Normalized, validated search filters (spec §3).
///
/// Construction normalizes `must_skills`/`nice_skills` (trim, lowercase,
/// drop empties) and validates the experience range; this is the only place
/// that check happens, so a `SearchFilters` value is always well-formed.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub must_skills: Vec<String>,
    #[serde(default)]
    pub nice_skills: Vec<String>,
    #[serde(default)]
    pub experience_min: Option<f64>,
    #[serde(default)]
    pub experience_max: Option<f64>,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub work_modes: Vec<String>,
    #[serde(default)]
    pub exclude_ids: Vec<String>,
}

impl SearchFilters {
    /// Normalize and validate, matching the upstream `SearchFilters` Pydantic
    /// validators exactly: skills are trimmed + lowercased + empties dropped,
    /// and `experience_max < experience_min` is rejected.
    pub fn normalize(mut self) -> Result<Self> {
        self.must_skills = normalize_skills(&self.must_skills);
        self.nice_skills = normalize_skills(&self.nice_skills);

        if let Some(min) = self.experience_min {
            if min < 0.0 {
                return Err(SearchServiceError::validation(
                    "experience_min must be non-negative",
                ));
            }
        }
        if let Some(max) = self.experience_max {
            if max < 0.0 {
                return Err(SearchServiceError::validation(
                    "experience_max must be non-negative",
                ));
            }
        }
        if let (Some(min), Some(max)) = (self.experience_min, self.experience_max) {
            if min > max {
                return Err(SearchServiceError::validation(
                    "experience_min must be <= experience_max",
                ));
            }
        }

        Ok(self)
    }

    pub fn is_empty(&self) -> bool {
        self.role.is_none()
            && self.must_skills.is_empty()
            && self.nice_skills.is_empty()
            && self.experience_min.is_none()
            && self.experience_max.is_none()
            && self.location.is_none()
            && self.work_modes.is_empty()
            && self.exclude_ids.is_empty()
    }
}

fn normalize_skills(skills: &[String]) -> Vec<String> {
    skills
        .iter()
        .map(|s| s.trim().to_lowercase())
        .filter(|s| !s.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_candidate() -> Candidate {
        Candidate {
            id: "c-1".into(),
            telegram_id: 42,
            headline_role: Some("Backend Engineer".into()),
            experience_years: Some(3.5),
            location: Some("Remote".into()),
            work_modes: vec!["remote".into(), "hybrid".into()],
            skills: vec![
                Skill {
                    skill: "  Go  ".into(),
                    extra: Default::default(),
                },
                Skill {
                    skill: "Kafka".into(),
                    extra: Default::default(),
                },
            ],
            projects: vec![Project {
                title: "Payments".into(),
                description: "Rewrote the ledger".into(),
            }],
            experiences: vec![Experience {
                position: "SRE".into(),
                company: "Acme".into(),
                responsibilities: "on-call".into(),
            }],
            display_name: Some("Jamie".into()),
        }
    }

    #[test]
    fn to_lexical_lowercases_and_trims_skills() {
        let doc = DocumentProjector::to_lexical(&sample_candidate()).unwrap();
        assert!(doc.skills.contains("go"));
        assert!(doc.skills.contains("kafka"));
        assert_eq!(doc.id, "c-1");
        assert_eq!(doc.work_modes.len(), 2);
    }

    #[test]
    fn to_lexical_rejects_missing_id() {
        let mut candidate = sample_candidate();
        candidate.id = "  ".into();
        assert!(DocumentProjector::to_lexical(&candidate).is_err());
    }

    #[test]
    fn to_semantic_text_drops_empty_segments() {
        let mut candidate = sample_candidate();
        candidate.projects.clear();
        candidate.experiences.clear();
        let text = DocumentProjector::to_semantic_text(&candidate);
        assert!(text.contains("Должность: Backend Engineer"));
        assert!(text.contains("Навыки: Go, Kafka"));
        assert!(!text.contains("Проекты"));
        assert!(!text.contains("Опыт"));
    }

    #[test]
    fn to_semantic_text_is_empty_for_blank_candidate() {
        let candidate = Candidate {
            id: "c-2".into(),
            telegram_id: 1,
            headline_role: None,
            experience_years: None,
            location: None,
            work_modes: vec![],
            skills: vec![],
            projects: vec![],
            experiences: vec![],
            display_name: None,
        };
        assert_eq!(DocumentProjector::to_semantic_text(&candidate), "");
    }

    #[test]
    fn search_filters_normalizes_skill_casing() {
        let filters = SearchFilters {
            must_skills: vec!["  Rust ".into(), "".into()],
            ..Default::default()
        }
        .normalize()
        .unwrap();
        assert_eq!(filters.must_skills, vec!["rust".to_string()]);
    }

    #[test]
    fn search_filters_rejects_inverted_experience_range() {
        let filters = SearchFilters {
            experience_min: Some(5.0),
            experience_max: Some(2.0),
            ..Default::default()
        };
        assert!(filters.normalize().is_err());
    }
}
