//! Naming rules for collections
//!
//! Collections are snake_case plurals (`flows`, `flow_runs`, `task_runs`).
//! Only the last underscore-separated word carries the plural.

use regex::Regex;
use std::sync::OnceLock;

/// Utility for snake_case collection and field names
pub struct Pluralizer;

impl Pluralizer {
    /// Whether a name is lower snake_case (`flow_runs`, `state`)
    pub fn is_snake_case(name: &str) -> bool {
        static SNAKE_REGEX: OnceLock<Regex> = OnceLock::new();
        let regex =
            SNAKE_REGEX.get_or_init(|| Regex::new(r"^[a-z][a-z0-9]*(_[a-z0-9]+)*$").unwrap());
        regex.is_match(name)
    }

    /// Singular form of a snake_case collection name
    ///
    /// ```
    /// use flowscope::core::pluralize::Pluralizer;
    ///
    /// assert_eq!(Pluralizer::singularize("flow_runs"), "flow_run");
    /// assert_eq!(Pluralizer::singularize("work_queues"), "work_queue");
    /// assert_eq!(Pluralizer::singularize("block_schemas"), "block_schema");
    /// assert_eq!(Pluralizer::singularize("policies"), "policy");
    /// ```
    pub fn singularize(name: &str) -> String {
        match name.rsplit_once('_') {
            Some((head, last)) => format!("{}_{}", head, Self::singularize_word(last)),
            None => Self::singularize_word(name),
        }
    }

    /// Whether the last word of a name already looks plural
    pub fn is_plural(name: &str) -> bool {
        Self::singularize(name) != name
    }

    /// Default foreign-key column pointing at a collection (`flows` → `flow_id`)
    pub fn foreign_key(collection: &str) -> String {
        format!("{}_id", Self::singularize(collection))
    }

    fn singularize_word(word: &str) -> String {
        match word {
            s if s.ends_with("ies") && s.len() > 3 => format!("{}y", &s[..s.len() - 3]),
            s if s.len() > 3
                && (s.ends_with("sses")
                    || s.ends_with("shes")
                    || s.ends_with("ches")
                    || s.ends_with("xes")
                    || s.ends_with("zes")) =>
            {
                s[..s.len() - 2].to_string()
            }
            s if s.ends_with("ss") => s.to_string(),
            s if s.ends_with('s') && s.len() > 1 => s[..s.len() - 1].to_string(),
            s => s.to_string(),
        }
    }
}
