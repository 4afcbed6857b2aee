//! Query refinement suggestions built from the results seen so far.

use std::collections::HashMap;

use crate::api::{EventFilter, EventMatch};
use crate::search::SearchEvent;

/// Filters of one kind reported per `filters` event.
const MAX_FILTERS_PER_KIND: usize = 25;

const KIND_REPO: &str = "repo";
const KIND_LANG: &str = "lang";
const KIND_UTILITY: &str = "utility";

const LANGUAGES: &[(&str, &str)] = &[
    ("c", "C"),
    ("cc", "C++"),
    ("cpp", "C++"),
    ("cs", "C#"),
    ("css", "CSS"),
    ("go", "Go"),
    ("h", "C"),
    ("hpp", "C++"),
    ("html", "HTML"),
    ("java", "Java"),
    ("js", "JavaScript"),
    ("json", "JSON"),
    ("jsx", "JavaScript"),
    ("kt", "Kotlin"),
    ("md", "Markdown"),
    ("php", "PHP"),
    ("py", "Python"),
    ("rb", "Ruby"),
    ("rs", "Rust"),
    ("scala", "Scala"),
    ("sh", "Shell"),
    ("sql", "SQL"),
    ("swift", "Swift"),
    ("toml", "TOML"),
    ("ts", "TypeScript"),
    ("tsx", "TypeScript"),
    ("yaml", "YAML"),
    ("yml", "YAML"),
];

/// Language name for a file path, from its extension.
pub fn language_for_path(path: &str) -> Option<&'static str> {
    let file = path.rsplit('/').next()?;
    let (_, ext) = file.rsplit_once('.')?;
    let ext = ext.to_ascii_lowercase();
    LANGUAGES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, name)| *name)
}

/// Escapes regex metacharacters so `name` matches literally.
fn regex_escape(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        if "\\.+*?()|[]{}^$".contains(c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

#[derive(Debug, Clone)]
struct Counted {
    label: String,
    count: usize,
}

#[derive(Debug, Default)]
pub struct FilterAggregator {
    repos: HashMap<String, Counted>,
    langs: HashMap<String, Counted>,
    excluded_forks: usize,
    excluded_archived: usize,
    limit_hit: bool,
    dirty: bool,
}

impl FilterAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    pub fn update(&mut self, event: &SearchEvent) {
        for m in &event.results {
            self.add_match(m);
        }
        let stats = &event.stats;
        if stats.excluded_forks > 0 || stats.excluded_archived > 0 || stats.is_limit_hit {
            self.excluded_forks += stats.excluded_forks;
            self.excluded_archived += stats.excluded_archived;
            self.limit_hit |= stats.is_limit_hit;
            self.dirty = true;
        }
    }

    fn add_match(&mut self, m: &EventMatch) {
        let count = m.result_count();
        let repo = m.repository();
        bump(
            &mut self.repos,
            format!("repo:^{}$", regex_escape(repo)),
            repo,
            count,
        );
        if let Some(lang) = m.path().and_then(language_for_path) {
            bump(
                &mut self.langs,
                format!("lang:{}", lang.to_ascii_lowercase()),
                lang,
                count,
            );
        }
        self.dirty = true;
    }

    /// Current suggestions: repo, then lang, then utility filters, each
    /// ordered by count descending then label ascending. Clears the dirty
    /// flag.
    pub fn compute(&mut self) -> Vec<EventFilter> {
        self.dirty = false;
        let mut out = Vec::new();
        out.extend(self.ranked(&self.repos, KIND_REPO));
        out.extend(self.ranked(&self.langs, KIND_LANG));

        for (value, count) in [
            ("fork:yes", self.excluded_forks),
            ("archived:yes", self.excluded_archived),
        ] {
            if count > 0 {
                out.push(EventFilter {
                    value: value.to_string(),
                    label: value.to_string(),
                    count,
                    limit_hit: self.limit_hit,
                    kind: KIND_UTILITY.to_string(),
                });
            }
        }
        out
    }

    fn ranked(&self, counts: &HashMap<String, Counted>, kind: &str) -> Vec<EventFilter> {
        let mut entries: Vec<(&String, &Counted)> = counts.iter().collect();
        entries.sort_by(|(_, a), (_, b)| b.count.cmp(&a.count).then_with(|| a.label.cmp(&b.label)));
        entries
            .into_iter()
            .take(MAX_FILTERS_PER_KIND)
            .map(|(value, counted)| EventFilter {
                value: value.clone(),
                label: counted.label.clone(),
                count: counted.count,
                limit_hit: self.limit_hit,
                kind: kind.to_string(),
            })
            .collect()
    }
}

fn bump(map: &mut HashMap<String, Counted>, value: String, label: &str, count: usize) {
    map.entry(value)
        .or_insert_with(|| Counted {
            label: label.to_string(),
            count: 0,
        })
        .count += count;
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::search::Stats;
    use crate::testing::path_match;

    #[test]
    fn repo_filters_escape_names() {
        assert_eq!(regex_escape("github.com/a-b/c"), "github\\.com/a-b/c");
    }

    #[test]
    fn languages_from_extensions() {
        assert_eq!(language_for_path("src/main.RS"), Some("Rust"));
        assert_eq!(language_for_path("cmd/app/main.go"), Some("Go"));
        assert_eq!(language_for_path("Makefile"), None);
        assert_eq!(language_for_path("dir.d/README"), None);
    }

    #[test]
    fn ranks_by_count_then_label() {
        let mut filters = FilterAggregator::new();
        filters.update(&SearchEvent::from_results(vec![
            path_match(2, "b", "x.go"),
            path_match(1, "a", "y.go"),
            path_match(3, "c", "z.rs"),
            path_match(3, "c", "w.rs"),
        ]));
        assert!(filters.is_dirty());

        let computed = filters.compute();
        assert!(!filters.is_dirty());
        let summary: Vec<(&str, &str, usize)> = computed
            .iter()
            .map(|f| (f.kind.as_str(), f.label.as_str(), f.count))
            .collect();
        assert_eq!(
            summary,
            vec![
                ("repo", "c", 2),
                ("repo", "a", 1),
                ("repo", "b", 1),
                ("lang", "Go", 2),
                ("lang", "Rust", 2),
            ]
        );
        assert_eq!(computed[0].value, "repo:^c$");
        assert_eq!(computed[3].value, "lang:go");
    }

    #[test]
    fn exclusions_become_utility_filters() {
        let mut filters = FilterAggregator::new();
        filters.update(&SearchEvent::from_stats(Stats {
            excluded_forks: 3,
            is_limit_hit: true,
            ..Default::default()
        }));
        let computed = filters.compute();
        assert_eq!(computed.len(), 1);
        assert_eq!(computed[0].value, "fork:yes");
        assert_eq!(computed[0].count, 3);
        assert!(computed[0].limit_hit);
    }

    #[test]
    fn caps_each_kind() {
        let mut filters = FilterAggregator::new();
        let results = (0..40).map(|i| path_match(i, &format!("r{i:02}"), "README")).collect();
        filters.update(&SearchEvent::from_results(results));
        assert_eq!(filters.compute().len(), MAX_FILTERS_PER_KIND);
    }
}
