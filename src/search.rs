//! Ranked multi-field task search.
//!
//! Each task scores as a weighted sum over title, description, and tags.
//! Plain mode matches case-insensitive substrings; fuzzy mode adds
//! edit-distance similarity; regex mode compiles the query after a safety
//! check. When nothing clears the score threshold the engine hands back the
//! nearest candidates instead of an empty set.

use indexmap::IndexMap;
use regex::{Regex, RegexBuilder};

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::resolve::levenshtein;
use crate::task::Task;

/// Score contributed by a regex or exact-substring hit on a field
const STRONG_MATCH_SCORE: f64 = 1.0;

/// Floor for a substring hit in fuzzy mode
const SUBSTRING_SCORE: f64 = 0.9;

/// Which fields a search touches
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchField {
    Title,
    Description,
    Tags,
}

impl SearchField {
    pub const ALL: [SearchField; 3] = [
        SearchField::Title,
        SearchField::Description,
        SearchField::Tags,
    ];
}

/// Per-field weight overrides; unset fields fall back to config
#[derive(Debug, Clone, Copy, Default)]
pub struct FieldWeights {
    pub title: Option<f64>,
    pub description: Option<f64>,
    pub tags: Option<f64>,
}

/// Search behavior knobs
#[derive(Debug, Clone)]
pub struct SearchOptions {
    /// Fields to score; defaults to all three
    pub fields: Vec<SearchField>,
    pub fuzzy: bool,
    pub regex: bool,
    pub weights: FieldWeights,
    /// Override of the configured minimum score
    pub min_score: Option<f64>,
    pub limit: Option<usize>,
    pub include_archived: bool,
}

impl Default for SearchOptions {
    fn default() -> Self {
        Self {
            fields: SearchField::ALL.to_vec(),
            fuzzy: false,
            regex: false,
            weights: FieldWeights::default(),
            min_score: None,
            limit: None,
            include_archived: false,
        }
    }
}

/// One scored hit
#[derive(Debug, Clone)]
pub struct RankedMatch {
    pub task: Task,
    pub score: f64,
}

/// Search result: real matches, or nearest candidates when nothing cleared
/// the threshold
#[derive(Debug, Clone)]
pub enum SearchOutcome {
    Matches(Vec<RankedMatch>),
    Suggestions(Vec<RankedMatch>),
}

impl SearchOutcome {
    pub fn matches(&self) -> &[RankedMatch] {
        match self {
            SearchOutcome::Matches(m) | SearchOutcome::Suggestions(m) => m,
        }
    }

    pub fn is_suggestions(&self) -> bool {
        matches!(self, SearchOutcome::Suggestions(_))
    }
}

/// Multi-field search over the task map
#[derive(Debug, Clone)]
pub struct TaskSearchEngine {
    config: SearchConfig,
}

impl TaskSearchEngine {
    pub fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    pub fn search(
        &self,
        tasks: &IndexMap<String, Task>,
        query: &str,
        options: &SearchOptions,
    ) -> Result<SearchOutcome> {
        let query = query.trim();
        if query.is_empty() {
            return Err(Error::Validation("search query must not be empty".to_string()));
        }
        let total_weight: f64 = options
            .fields
            .iter()
            .map(|field| self.weight_for(*field, &options.weights))
            .sum();
        if options.fields.is_empty() || total_weight <= 0.0 {
            return Err(Error::Validation(
                "search needs at least one field with a positive weight".to_string(),
            ));
        }

        let pattern = if options.regex {
            Some(self.compile_pattern(query)?)
        } else {
            None
        };

        let threshold = options.min_score.unwrap_or(self.config.min_score);
        let mut scored = self.score_all(tasks, query, options, pattern.as_ref(), options.fuzzy);

        let mut matches: Vec<RankedMatch> = scored
            .iter()
            .filter(|m| m.score >= threshold)
            .cloned()
            .collect();

        if !matches.is_empty() {
            if let Some(limit) = options.limit {
                matches.truncate(limit);
            }
            return Ok(SearchOutcome::Matches(matches));
        }

        // Nothing cleared the bar: fall back to fuzzy scoring so the caller
        // gets the nearest candidates rather than an empty list.
        if pattern.is_some() || !options.fuzzy {
            scored = self.score_all(tasks, query, options, None, true);
        }
        scored.retain(|m| m.score > 0.0);
        scored.truncate(self.config.suggestion_count);
        Ok(SearchOutcome::Suggestions(scored))
    }

    fn score_all(
        &self,
        tasks: &IndexMap<String, Task>,
        query: &str,
        options: &SearchOptions,
        pattern: Option<&Regex>,
        fuzzy: bool,
    ) -> Vec<RankedMatch> {
        let mut scored: Vec<RankedMatch> = tasks
            .values()
            .filter(|task| options.include_archived || !task.archived)
            .map(|task| RankedMatch {
                score: self.score_task(task, query, options, pattern, fuzzy),
                task: task.clone(),
            })
            .collect();

        scored.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| b.task.updated_at.cmp(&a.task.updated_at))
        });
        scored
    }

    fn score_task(
        &self,
        task: &Task,
        query: &str,
        options: &SearchOptions,
        pattern: Option<&Regex>,
        fuzzy: bool,
    ) -> f64 {
        let mut total = 0.0;
        let mut weight_sum = 0.0;

        for field in &options.fields {
            let weight = self.weight_for(*field, &options.weights);
            if weight <= 0.0 {
                continue;
            }
            weight_sum += weight;

            let field_score = match field {
                SearchField::Title => score_text(&task.title, query, pattern, fuzzy),
                SearchField::Description => score_text(&task.description, query, pattern, fuzzy),
                SearchField::Tags => task
                    .tags
                    .iter()
                    .map(|tag| score_text(tag, query, pattern, fuzzy))
                    .fold(0.0, f64::max),
            };
            total += weight * field_score;
        }

        if weight_sum > 0.0 {
            total / weight_sum
        } else {
            0.0
        }
    }

    fn weight_for(&self, field: SearchField, overrides: &FieldWeights) -> f64 {
        match field {
            SearchField::Title => overrides.title.unwrap_or(self.config.title_weight),
            SearchField::Description => overrides
                .description
                .unwrap_or(self.config.description_weight),
            SearchField::Tags => overrides.tags.unwrap_or(self.config.tags_weight),
        }
    }

    /// Validate and compile a regex query: bounded length and no quantified
    /// groups that themselves contain quantifiers (the classic
    /// catastrophic-backtracking shape), then case-insensitive compile.
    fn compile_pattern(&self, query: &str) -> Result<Regex> {
        if query.len() > self.config.max_pattern_len {
            return Err(Error::Validation(format!(
                "regex pattern exceeds {} characters",
                self.config.max_pattern_len
            )));
        }
        if has_nested_quantifier(query) {
            return Err(Error::Validation(
                "regex pattern rejected: quantified group containing a quantifier".to_string(),
            ));
        }

        RegexBuilder::new(query)
            .case_insensitive(true)
            .build()
            .map_err(|err| Error::Validation(format!("invalid regex pattern: {err}")))
    }
}

fn score_text(text: &str, query: &str, pattern: Option<&Regex>, fuzzy: bool) -> f64 {
    if text.is_empty() {
        return 0.0;
    }

    if let Some(re) = pattern {
        return if re.is_match(text) { STRONG_MATCH_SCORE } else { 0.0 };
    }

    let text_lower = text.to_lowercase();
    let query_lower = query.to_lowercase();

    if !fuzzy {
        return if text_lower.contains(&query_lower) {
            STRONG_MATCH_SCORE
        } else {
            0.0
        };
    }

    let longest = text_lower.chars().count().max(query_lower.chars().count());
    let similarity = if longest == 0 {
        0.0
    } else {
        let dist = levenshtein(&query_lower, &text_lower) as f64;
        (1.0 - dist / longest as f64).clamp(0.0, 1.0)
    };

    if text_lower.contains(&query_lower) {
        similarity.max(SUBSTRING_SCORE)
    } else {
        similarity
    }
}

/// Reject patterns where a quantifier applies to a group whose body already
/// contains one, e.g. `(a+)+` or `(\w*)*`.
fn has_nested_quantifier(pattern: &str) -> bool {
    let mut stack: Vec<bool> = Vec::new();
    let mut chars = pattern.chars().peekable();

    while let Some(ch) = chars.next() {
        match ch {
            '\\' => {
                chars.next();
            }
            '[' => {
                // Quantifier characters inside a class are literals.
                while let Some(c) = chars.next() {
                    if c == '\\' {
                        chars.next();
                    } else if c == ']' {
                        break;
                    }
                }
            }
            '(' => stack.push(false),
            ')' => {
                let inner = stack.pop().unwrap_or(false);
                let quantified = matches!(chars.peek(), Some('*' | '+' | '?' | '{'));
                if quantified {
                    if inner {
                        return true;
                    }
                    if matches!(chars.peek(), Some('{')) {
                        for c in chars.by_ref() {
                            if c == '}' {
                                break;
                            }
                        }
                    } else {
                        chars.next();
                    }
                }
                if let Some(top) = stack.last_mut() {
                    *top = *top || inner || quantified;
                }
            }
            '*' | '+' => {
                if let Some(top) = stack.last_mut() {
                    *top = true;
                }
            }
            '{' => {
                if let Some(top) = stack.last_mut() {
                    *top = true;
                }
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                }
            }
            _ => {}
        }
    }

    false
}
