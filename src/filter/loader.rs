//! Rules file loading.
//!
//! One rule per line: `<field> <operator> <value...> <action>`. The value
//! may span several whitespace-separated tokens and may be wrapped in
//! double quotes. Blank lines and lines starting with `#` are ignored;
//! malformed lines are skipped with a warning.

use std::fs;
use std::path::Path;

use tracing::{debug, info, warn};

use super::rules::{ParseRuleError, Rule, RuleSet};

/// Load rules from `path`, falling back to [`RuleSet::defaults`] when the
/// file cannot be read.
pub fn load(path: &Path) -> RuleSet {
    match fs::read_to_string(path) {
        Ok(contents) => {
            let rules = parse_rules(&contents);
            info!(path = %path.display(), rules = rules.len(), "loaded rules file");
            rules
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "rules file unreadable, using defaults");
            RuleSet::defaults()
        }
    }
}

/// Parse every rule line of `contents`, in order.
pub fn parse_rules(contents: &str) -> RuleSet {
    contents
        .lines()
        .enumerate()
        .filter_map(|(idx, line)| {
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                return None;
            }
            match parse_line(line) {
                Ok(rule) => {
                    debug!(line = idx + 1, %rule, "loaded rule");
                    Some(rule)
                }
                Err(e) => {
                    warn!(line = idx + 1, error = %e, "skipping malformed rule");
                    None
                }
            }
        })
        .collect()
}

/// Parse a single, already trimmed, rule line.
pub fn parse_line(line: &str) -> Result<Rule, ParseRuleError> {
    let parts: Vec<&str> = line.split_whitespace().collect();
    let [field, operator, value @ .., action] = parts.as_slice() else {
        return Err(ParseRuleError::MissingTokens { found: parts.len() });
    };
    if value.is_empty() {
        return Err(ParseRuleError::MissingTokens { found: parts.len() });
    }

    let field = field.parse()?;
    let operator = operator.parse()?;
    let action = action.parse()?;

    let value = value.join(" ");
    let value = match value.strip_prefix('"').and_then(|v| v.strip_suffix('"')) {
        Some(unquoted) => unquoted.to_string(),
        None => value,
    };

    Ok(Rule::new(field, operator, value, action))
}
