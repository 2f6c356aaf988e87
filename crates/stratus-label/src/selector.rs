//! The label selector grammar.
//!
//! A selector is a comma-separated list of clauses, all of which must
//! hold (logical AND). Six clause forms exist:
//!
//! ```text
//! key=value        key in (v1,v2)       key exists
//! key!=value       key notin (v1,v2)    key !exists
//! ```
//!
//! An unrecognized clause makes the whole selector match nothing — it
//! fails closed, never errors and never skips the clause. This is the
//! only query language the engine defines; keep it exact.

use std::collections::BTreeMap;

/// One parsed selector clause.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Clause {
    Eq(String, String),
    Ne(String, String),
    In(String, Vec<String>),
    NotIn(String, Vec<String>),
    Exists(String),
    NotExists(String),
}

impl Clause {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Clause::Eq(k, v) => labels.get(k).is_some_and(|x| x == v),
            // Inequality and notin also match maps without the key.
            Clause::Ne(k, v) => labels.get(k) != Some(v),
            Clause::In(k, vs) => labels.get(k).is_some_and(|x| vs.iter().any(|v| v == x)),
            Clause::NotIn(k, vs) => !labels.get(k).is_some_and(|x| vs.iter().any(|v| v == x)),
            Clause::Exists(k) => labels.contains_key(k),
            Clause::NotExists(k) => !labels.contains_key(k),
        }
    }
}

/// Evaluate `selector` against a label map. An empty selector matches
/// everything; any unparseable clause makes the result `false`.
pub fn matches_label_selector(labels: &BTreeMap<String, String>, selector: &str) -> bool {
    if selector.trim().is_empty() {
        return true;
    }
    for raw in split_clauses(selector) {
        match parse_clause(raw.trim()) {
            Some(clause) => {
                if !clause.matches(labels) {
                    return false;
                }
            }
            // Fail closed on anything we don't recognize.
            None => return false,
        }
    }
    true
}

/// Split on commas that are not inside a `(...)` value list.
fn split_clauses(selector: &str) -> Vec<&str> {
    let mut clauses = Vec::new();
    let mut depth = 0usize;
    let mut start = 0usize;
    for (i, c) in selector.char_indices() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                clauses.push(&selector[start..i]);
                start = i + 1;
            }
            _ => {}
        }
    }
    clauses.push(&selector[start..]);
    clauses
}

fn parse_clause(clause: &str) -> Option<Clause> {
    if clause.is_empty() {
        return None;
    }

    if let Some(key) = clause.strip_suffix("!exists") {
        let key = key.trim();
        return (!key.is_empty() && is_bare_key(key)).then(|| Clause::NotExists(key.to_string()));
    }
    if let Some(key) = clause.strip_suffix("exists") {
        let key = key.trim();
        return (!key.is_empty() && is_bare_key(key)).then(|| Clause::Exists(key.to_string()));
    }

    if let Some((key, rest)) = split_keyword(clause, " notin ") {
        let values = parse_value_list(&rest)?;
        return Some(Clause::NotIn(key, values));
    }
    if let Some((key, rest)) = split_keyword(clause, " in ") {
        let values = parse_value_list(&rest)?;
        return Some(Clause::In(key, values));
    }

    if let Some((key, value)) = clause.split_once("!=") {
        let key = key.trim();
        if key.is_empty() || !is_bare_key(key) {
            return None;
        }
        return Some(Clause::Ne(key.to_string(), value.trim().to_string()));
    }
    if let Some((key, value)) = clause.split_once('=') {
        let key = key.trim();
        if key.is_empty() || !is_bare_key(key) {
            return None;
        }
        return Some(Clause::Eq(key.to_string(), value.trim().to_string()));
    }

    None
}

/// Keys must not contain operator characters or spaces; anything else
/// would make a clause ambiguous, so it fails the whole selector.
fn is_bare_key(key: &str) -> bool {
    !key.is_empty()
        && !key
            .chars()
            .any(|c| c.is_whitespace() || matches!(c, '=' | '!' | '(' | ')' | ','))
}

fn split_keyword(clause: &str, keyword: &str) -> Option<(String, String)> {
    let idx = clause.find(keyword)?;
    let key = clause[..idx].trim();
    if key.is_empty() || !is_bare_key(key) {
        return None;
    }
    Some((key.to_string(), clause[idx + keyword.len()..].trim().to_string()))
}

fn parse_value_list(rest: &str) -> Option<Vec<String>> {
    let inner = rest.strip_prefix('(')?.strip_suffix(')')?;
    Some(
        inner
            .split(',')
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labels(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn equality_and_inequality() {
        let l = labels(&[("env", "prod"), ("team", "core")]);
        assert!(matches_label_selector(&l, "env=prod"));
        assert!(!matches_label_selector(&l, "env=staging"));
        assert!(matches_label_selector(&l, "env!=staging"));
        assert!(!matches_label_selector(&l, "env!=prod"));
        // Inequality matches maps missing the key entirely.
        assert!(matches_label_selector(&l, "missing!=anything"));
    }

    #[test]
    fn in_and_notin() {
        let l = labels(&[("region", "us-east-1")]);
        assert!(matches_label_selector(&l, "region in (us-east-1, eu-west-1)"));
        assert!(!matches_label_selector(&l, "region in (ap-south-1)"));
        assert!(matches_label_selector(&l, "region notin (ap-south-1, eu-west-1)"));
        assert!(!matches_label_selector(&l, "region notin (us-east-1)"));
        assert!(matches_label_selector(&l, "missing notin (a,b)"));
        assert!(!matches_label_selector(&l, "missing in (a,b)"));
    }

    #[test]
    fn exists_forms() {
        let l = labels(&[("env", "prod")]);
        assert!(matches_label_selector(&l, "env exists"));
        assert!(!matches_label_selector(&l, "team exists"));
        assert!(matches_label_selector(&l, "team !exists"));
        assert!(!matches_label_selector(&l, "env !exists"));
    }

    #[test]
    fn conjunction_of_clauses() {
        let l = labels(&[("env", "prod"), ("team", "core"), ("tier", "web")]);
        assert!(matches_label_selector(
            &l,
            "env=prod, team in (core, infra), tier exists"
        ));
        assert!(!matches_label_selector(
            &l,
            "env=prod, team in (core, infra), tier=db"
        ));
    }

    #[test]
    fn selector_equals_independent_clause_conjunction() {
        let l = labels(&[("env", "prod"), ("tier", "web")]);
        let clauses = ["env=prod", "tier!=db", "env exists", "region !exists"];
        let combined = clauses.join(",");
        let independent = clauses.iter().all(|c| matches_label_selector(&l, c));
        assert_eq!(matches_label_selector(&l, &combined), independent);
    }

    #[test]
    fn unrecognized_clause_fails_closed() {
        let l = labels(&[("env", "prod")]);
        for bad in [
            "env>prod",
            "env",
            "=prod",
            "env in prod",      // missing parens
            "env notin",        // missing value list
            "env=prod, ???",    // one good clause, one garbage clause
            "a b=c",
        ] {
            assert!(!matches_label_selector(&l, bad), "{bad:?} must fail closed");
        }
    }

    #[test]
    fn empty_selector_matches_everything() {
        assert!(matches_label_selector(&labels(&[]), ""));
        assert!(matches_label_selector(&labels(&[("a", "b")]), "  "));
    }
}
