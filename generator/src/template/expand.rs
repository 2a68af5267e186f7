//! Text substitution of dataset values into the template.
//!
//! Two passes run over every line, in this order:
//!
//! 1. **Extra rules** - `literal=>column` pairs given on the command line.
//!    Any occurrence of `literal` is replaced by the column value. Lets a
//!    template keep readable sample text ("Jane Doe") instead of tokens.
//! 2. **Tokens** - every `%VAR_<column>%` is replaced by the column value.
//!
//! Values are escaped for XML in both passes.

use std::cmp::Reverse;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::dataset::Entry;
use crate::error::{RuleError, RuleResult};

/// Separator between rules in the extra-vars string
const RULE_SEPARATOR: char = '|';

/// Separator between the literal and the column of one rule
const RULE_ARROW: &str = "=>";

/// A `literal=>column` replacement rule
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExtraRule {
    pub literal: String,
    pub column: String,
}

/// Ordered list of extra replacement rules
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExtraRules(Vec<ExtraRule>);

impl ExtraRules {
    /// Parse `literal1=>column1|literal2=>column2`. An empty string has no rules.
    pub fn parse(spec: &str) -> RuleResult<Self> {
        if spec.is_empty() {
            return Ok(Self::default());
        }

        let mut rules = Vec::new();
        for part in spec.split(RULE_SEPARATOR) {
            let halves: Vec<&str> = part.split(RULE_ARROW).collect();
            match halves.as_slice() {
                [literal, column] if !literal.is_empty() => rules.push(ExtraRule {
                    literal: literal.to_string(),
                    column: column.to_string(),
                }),
                _ => return Err(RuleError::MalformedRule(part.to_string())),
            }
        }
        Ok(Self(rules))
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ExtraRule> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromStr for ExtraRules {
    type Err = RuleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// Escape `&`, `<`, `>`, `"` and `'` for XML text and attribute values.
pub fn escape_markup(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            c => out.push(c),
        }
    }
    out
}

/// Build the `%VAR_<column>%` token for a column.
pub fn var_token(column: &str) -> String {
    format!("%VAR_{}%", column)
}

/// Apply the extra rules to one line.
///
/// A rule whose literal occurs in the line but whose column is missing from
/// the entry is a configuration error.
pub fn expand_extra_vars(line: &str, entry: &Entry, rules: &ExtraRules) -> RuleResult<String> {
    let mut line = line.to_string();
    for rule in rules.iter() {
        if !line.contains(&rule.literal) {
            continue;
        }
        let value = entry.get(&rule.column).ok_or_else(|| RuleError::UnknownColumn {
            literal: rule.literal.clone(),
            column: rule.column.clone(),
        })?;
        line = line.replace(&rule.literal, &escape_markup(value));
    }
    Ok(line)
}

/// Replace `%VAR_<column>%` tokens in one line.
///
/// Plain substring replacement: columns are visited longest name first, so a
/// token whose spelling contains a shorter token is replaced before the shorter
/// one can eat into it. Tokens of unknown columns are left as they are.
pub fn expand_vars(line: &str, entry: &Entry) -> String {
    if !line.contains('%') {
        return line.to_string();
    }

    let mut columns: Vec<(&str, &str)> = entry.iter().collect();
    columns.sort_by_key(|(column, _)| (Reverse(column.len()), *column));

    let mut line = line.to_string();
    for (column, value) in columns {
        let token = var_token(column);
        if line.contains(&token) {
            line = line.replace(&token, &escape_markup(value));
        }
    }
    line
}

/// Run both passes over a whole text, line by line.
pub fn expand(text: &str, entry: &Entry, rules: &ExtraRules) -> RuleResult<String> {
    let mut out = String::with_capacity(text.len());
    for line in text.split_inclusive('\n') {
        let line = expand_extra_vars(line, entry, rules)?;
        out.push_str(&expand_vars(&line, entry));
    }
    Ok(out)
}
