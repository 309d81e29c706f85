use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::adaptive::types::DifficultyLevel;

pub const GENERAL_DOMAIN: &str = "general";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnowledgeDomain {
    pub name: String,
    pub subtopics: Vec<String>,
}

/// Static domain -> subtopic mapping plus difficulty exemplars. Built once and
/// shared read-only between components.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainTaxonomy {
    /// Declaration order is the matching order.
    domains: Vec<KnowledgeDomain>,
    exemplars: BTreeMap<DifficultyLevel, Vec<String>>,
}

impl Default for DomainTaxonomy {
    fn default() -> Self {
        Self::standard()
    }
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

impl DomainTaxonomy {
    pub fn standard() -> Self {
        let domains = [
            ("mathematics", &["algebra", "calculus", "statistics", "geometry"][..]),
            ("science", &["physics", "chemistry", "biology", "astronomy"][..]),
            ("humanities", &["history", "literature", "philosophy", "arts"][..]),
            ("languages", &["english", "spanish", "french", "german"][..]),
            (
                "technology",
                &["programming", "data_science", "web_development", "cybersecurity"][..],
            ),
        ]
        .iter()
        .map(|(name, subtopics)| KnowledgeDomain {
            name: name.to_string(),
            subtopics: strings(subtopics),
        })
        .collect();

        let mut exemplars = BTreeMap::new();
        exemplars.insert(
            DifficultyLevel::Beginner,
            strings(&[
                "basic_math",
                "general_science",
                "world_history",
                "english_basics",
                "computer_basics",
            ]),
        );
        exemplars.insert(
            DifficultyLevel::Intermediate,
            strings(&["algebra", "biology", "modern_history", "grammar", "programming"]),
        );
        exemplars.insert(
            DifficultyLevel::Advanced,
            strings(&["calculus", "physics", "philosophy", "literature", "data_science"]),
        );

        Self { domains, exemplars }
    }

    pub fn new(domains: Vec<KnowledgeDomain>) -> Self {
        Self {
            domains,
            exemplars: BTreeMap::new(),
        }
    }

    pub fn domains(&self) -> &[KnowledgeDomain] {
        &self.domains
    }

    /// Domain names in lexicographic order; the axis of similarity vectors.
    pub fn sorted_domain_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.domains.iter().map(|d| d.name.as_str()).collect();
        names.sort_unstable();
        names
    }

    pub fn subtopics(&self, domain: &str) -> &[String] {
        self.domains
            .iter()
            .find(|d| d.name == domain)
            .map(|d| d.subtopics.as_slice())
            .unwrap_or(&[])
    }

    pub fn exemplars(&self, level: DifficultyLevel) -> &[String] {
        self.exemplars
            .get(&level)
            .map(|v| v.as_slice())
            .unwrap_or(&[])
    }

    /// Exact match on a domain or subtopic name first, then substring match of
    /// any domain/subtopic name inside the topic. Falls back to "general".
    pub fn map_topic_to_domain(&self, topic: &str) -> String {
        let topic = topic.trim().to_lowercase();

        if let Some(domain) = self
            .domains
            .iter()
            .find(|d| d.name == topic || d.subtopics.iter().any(|s| *s == topic))
        {
            return domain.name.clone();
        }

        if !topic.is_empty() {
            if let Some(domain) = self.domains.iter().find(|d| {
                topic.contains(d.name.as_str())
                    || d.subtopics.iter().any(|s| topic.contains(s.as_str()))
            }) {
                return domain.name.clone();
            }
        }

        GENERAL_DOMAIN.to_string()
    }

    /// True when `topic` names the domain itself or one of its subtopics.
    pub fn names_domain(&self, topic: &str, domain: &str) -> bool {
        let topic = topic.trim().to_lowercase();
        topic == domain || self.subtopics(domain).iter().any(|s| *s == topic)
    }
}
