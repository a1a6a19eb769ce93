//! Skill-based agent discovery.
//!
//! Scores catalog entries against a set of required skills and optional tags,
//! then ranks and truncates. Pure and safe to run in parallel over a snapshot.
//!
//! relevance = 0.6 * skill_match + 0.2 * tag_match + 0.2 * trust_boost

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::types::AgentDescriptor;

/// Default result limit when a request does not specify one.
pub const DEFAULT_MAX_RESULTS: u32 = 10;

/// Upper bound for any discovery result limit.
pub const MAX_RESULTS_LIMIT: u32 = 100;

const SKILL_WEIGHT: f64 = 0.6;
const TAG_WEIGHT: f64 = 0.2;
const TRUST_WEIGHT: f64 = 0.2;

/// Caller-correctable discovery input errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("at least one skill must be specified")]
    NoSkills,
    #[error("query cannot be empty")]
    BlankQuery,
    #[error("max_results must be between 1 and 100, got {0}")]
    MaxResultsOutOfRange(u32),
    #[error("invalid path: {0}")]
    InvalidPath(String),
}

/// A discovery request by skills.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkillQuery {
    pub skills: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: u32,
}

fn default_max_results() -> u32 {
    DEFAULT_MAX_RESULTS
}

/// A matching descriptor with its score.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredAgent<'a> {
    pub agent: &'a AgentDescriptor,
    /// Rounded to two decimals.
    pub relevance: f64,
    /// Required skills this agent matched, lowercased, in request order.
    pub matched_skills: Vec<String>,
}

/// Check a requested result limit against [1, MAX_RESULTS_LIMIT].
pub fn validate_max_results(max_results: u32) -> Result<usize, ValidationError> {
    if (1..=MAX_RESULTS_LIMIT).contains(&max_results) {
        Ok(max_results as usize)
    } else {
        Err(ValidationError::MaxResultsOutOfRange(max_results))
    }
}

/// Rank enabled descriptors by relevance to the query.
///
/// Descriptors that match none of the required skills are dropped whatever
/// their tags or trust. Ties keep catalog order.
pub fn discover<'a>(
    descriptors: &'a [AgentDescriptor],
    query: &SkillQuery,
) -> Result<Vec<ScoredAgent<'a>>, ValidationError> {
    let limit = validate_max_results(query.max_results)?;

    let required = lowercase_unique(&query.skills);
    if required.is_empty() {
        return Err(ValidationError::NoSkills);
    }
    let wanted_tags: HashSet<String> = query.tags.iter().map(|t| t.to_lowercase()).collect();

    let mut scored: Vec<ScoredAgent<'a>> = descriptors
        .iter()
        .filter(|d| d.enabled)
        .filter_map(|d| score_agent(d, &required, &wanted_tags))
        .collect();

    // Vec::sort_by is stable, which keeps catalog order among equal scores.
    scored.sort_by(|a, b| b.relevance.total_cmp(&a.relevance));
    scored.truncate(limit);

    Ok(scored)
}

/// Score one descriptor. Returns `None` when no required skill matches.
fn score_agent<'a>(
    agent: &'a AgentDescriptor,
    required: &[String],
    wanted_tags: &HashSet<String>,
) -> Option<ScoredAgent<'a>> {
    let skill_keys = agent.skill_keys();
    let matched_skills: Vec<String> = required
        .iter()
        .filter(|s| skill_keys.contains(*s))
        .cloned()
        .collect();

    if matched_skills.is_empty() {
        return None;
    }

    let skill_score = matched_skills.len() as f64 / required.len() as f64;

    let tag_score = if wanted_tags.is_empty() {
        0.0
    } else {
        let agent_tags = agent.tag_keys();
        let tag_matches = wanted_tags.intersection(&agent_tags).count();
        tag_matches as f64 / wanted_tags.len() as f64
    };

    let relevance = SKILL_WEIGHT * skill_score
        + TAG_WEIGHT * tag_score
        + TRUST_WEIGHT * agent.trust_level.boost();

    Some(ScoredAgent {
        agent,
        relevance: round2(relevance),
        matched_skills,
    })
}

/// Lowercase and dedupe, keeping first-seen order. Blank entries are skipped.
fn lowercase_unique(values: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    values
        .iter()
        .map(|v| v.trim().to_lowercase())
        .filter(|v| !v.is_empty())
        .filter(|v| seen.insert(v.clone()))
        .collect()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Skill, TrustLevel, Visibility};
    use chrono::Utc;

    fn make_skill(id: &str, name: &str) -> Skill {
        Skill {
            id: id.to_string(),
            name: name.to_string(),
            description: None,
            tags: Vec::new(),
        }
    }

    fn make_agent(path: &str, skills: &[&str], tags: &[&str], trust: TrustLevel) -> AgentDescriptor {
        AgentDescriptor {
            path: path.to_string(),
            name: path.trim_start_matches('/').to_string(),
            description: String::new(),
            url: format!("http://localhost{}", path),
            skills: skills.iter().map(|s| make_skill(s, &s.replace('_', " "))).collect(),
            tags: tags.iter().map(ToString::to_string).collect(),
            visibility: Visibility::Public,
            owner: "alice".to_string(),
            allowed_groups: Vec::new(),
            trust_level: trust,
            num_stars: 0,
            enabled: true,
            registered_at: Utc::now(),
        }
    }

    fn query(skills: &[&str], tags: &[&str], max_results: u32) -> SkillQuery {
        SkillQuery {
            skills: skills.iter().map(ToString::to_string).collect(),
            tags: tags.iter().map(ToString::to_string).collect(),
            max_results,
        }
    }

    fn assert_close(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() < 1e-9,
            "expected {expected}, got {actual}"
        );
    }

    #[test]
    fn rejects_empty_skills() {
        let agents = vec![make_agent("/a", &["book_flight"], &[], TrustLevel::Trusted)];

        let err = discover(&agents, &query(&[], &[], 10)).unwrap_err();
        assert_eq!(err, ValidationError::NoSkills);

        let err = discover(&agents, &query(&["  "], &[], 10)).unwrap_err();
        assert_eq!(err, ValidationError::NoSkills);
    }

    #[test]
    fn rejects_out_of_range_max_results() {
        let agents: Vec<AgentDescriptor> = Vec::new();

        assert_eq!(
            discover(&agents, &query(&["x"], &[], 0)).unwrap_err(),
            ValidationError::MaxResultsOutOfRange(0)
        );
        assert_eq!(
            discover(&agents, &query(&["x"], &[], 101)).unwrap_err(),
            ValidationError::MaxResultsOutOfRange(101)
        );
        assert!(discover(&agents, &query(&["x"], &[], 100)).is_ok());
    }

    #[test]
    fn verified_single_skill_scores_point_seven() {
        let agents = vec![make_agent(
            "/flights",
            &["book_flight", "cancel_booking"],
            &[],
            TrustLevel::Verified,
        )];

        let results = discover(&agents, &query(&["book_flight"], &[], 10)).unwrap();

        assert_eq!(results.len(), 1);
        assert_close(results[0].relevance, 0.70);
        assert_eq!(results[0].matched_skills, vec!["book_flight"]);
    }

    #[test]
    fn matches_skill_name_case_insensitively() {
        let agents = vec![make_agent("/flights", &["book_flight"], &[], TrustLevel::Unverified)];

        let results = discover(&agents, &query(&["BOOK FLIGHT"], &[], 10)).unwrap();

        assert_eq!(results.len(), 1);
        assert_close(results[0].relevance, 0.6);
    }

    #[test]
    fn drops_agents_without_skill_match_regardless_of_tags_and_trust() {
        let agents = vec![make_agent("/hotel", &["book_hotel"], &["travel"], TrustLevel::Trusted)];

        let results = discover(&agents, &query(&["book_flight"], &["travel"], 10)).unwrap();

        assert!(results.is_empty());
    }

    #[test]
    fn partial_skill_and_tag_matches_are_proportional() {
        let agents = vec![make_agent(
            "/travel",
            &["book_flight"],
            &["Travel", "budget"],
            TrustLevel::Community,
        )];

        let results = discover(
            &agents,
            &query(&["book_flight", "book_hotel"], &["travel", "luxury"], 10),
        )
        .unwrap();

        // 0.6 * 0.5 + 0.2 * 0.5 + 0.2 * 0.2 = 0.44
        assert_close(results[0].relevance, 0.44);
    }

    #[test]
    fn duplicate_required_skills_count_once() {
        let agents = vec![make_agent("/a", &["search"], &[], TrustLevel::Unverified)];

        let results = discover(&agents, &query(&["search", "SEARCH"], &[], 10)).unwrap();

        assert_close(results[0].relevance, 0.6);
    }

    #[test]
    fn disabled_agents_do_not_participate() {
        let mut disabled = make_agent("/off", &["search"], &[], TrustLevel::Trusted);
        disabled.enabled = false;
        let agents = vec![disabled, make_agent("/on", &["search"], &[], TrustLevel::Unverified)];

        let results = discover(&agents, &query(&["search"], &[], 10)).unwrap();

        assert_eq!(results.len(), 1);
        assert_eq!(results[0].agent.path, "/on");
    }

    #[test]
    fn ranks_descending_and_truncates_with_stable_ties() {
        let trust_cycle = [
            TrustLevel::Unverified,
            TrustLevel::Community,
            TrustLevel::Verified,
            TrustLevel::Trusted,
        ];
        let agents: Vec<AgentDescriptor> = (0..20)
            .map(|i| make_agent(&format!("/agent-{i:02}"), &["search"], &[], trust_cycle[i % 4]))
            .collect();

        let results = discover(&agents, &query(&["search"], &[], 5)).unwrap();

        assert_eq!(results.len(), 5);
        for pair in results.windows(2) {
            assert!(pair[0].relevance >= pair[1].relevance);
        }
        // Trusted agents are every fourth entry starting at index 3.
        let paths: Vec<&str> = results.iter().map(|r| r.agent.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["/agent-03", "/agent-07", "/agent-11", "/agent-15", "/agent-19"]
        );
    }

    #[test]
    fn equal_scores_keep_catalog_order() {
        let agents = vec![
            make_agent("/c", &["search"], &[], TrustLevel::Verified),
            make_agent("/a", &["search"], &[], TrustLevel::Verified),
            make_agent("/b", &["search"], &[], TrustLevel::Verified),
        ];

        let results = discover(&agents, &query(&["search"], &[], 10)).unwrap();

        let paths: Vec<&str> = results.iter().map(|r| r.agent.path.as_str()).collect();
        assert_eq!(paths, vec!["/c", "/a", "/b"]);
    }

    #[test]
    fn skill_query_defaults_max_results() {
        let q: SkillQuery = serde_json::from_str(r#"{"skills":["a"]}"#).unwrap();
        assert_eq!(q.max_results, DEFAULT_MAX_RESULTS);
        assert!(q.tags.is_empty());
    }
}
