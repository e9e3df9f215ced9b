use std::collections::HashMap;

use crate::error::{Result, SqlBindError};
use crate::statement::ParamKey;

/// A template rewritten to PostgreSQL-style `$n` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSql {
    pub sql: String,
    /// The parameter bound to each `$n`, in order.
    pub parameters: Vec<ParamKey>,
}

/// Locates parameter placeholders in a SQL template.
pub trait TemplateParser: Send + Sync {
    fn parse(&self, template: &str) -> Result<ParsedSql>;
}

/// Recognizes `?` positional and `:name` named placeholders.
///
/// Quoted literals, quoted identifiers and `::` casts are left alone.
/// A name used twice maps to the same `$n`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ColonPrefixParser;

impl TemplateParser for ColonPrefixParser {
    fn parse(&self, template: &str) -> Result<ParsedSql> {
        let mut sql = String::with_capacity(template.len() + 8);
        let mut parameters = Vec::new();
        let mut named: HashMap<String, usize> = HashMap::new();
        let mut positional = 0usize;

        let chars: Vec<char> = template.chars().collect();
        let mut i = 0;
        while i < chars.len() {
            let c = chars[i];
            match c {
                '\'' | '"' => {
                    let end = chars[i + 1..]
                        .iter()
                        .position(|&ch| ch == c)
                        .map(|p| i + 1 + p)
                        .unwrap_or(chars.len() - 1);
                    sql.extend(&chars[i..=end]);
                    i = end + 1;
                }
                ':' if chars.get(i + 1) == Some(&':') => {
                    sql.push_str("::");
                    i += 2;
                }
                ':' if chars
                    .get(i + 1)
                    .is_some_and(|ch| ch.is_alphabetic() || *ch == '_') =>
                {
                    let start = i + 1;
                    let mut end = start;
                    while end < chars.len() && (chars[end].is_alphanumeric() || chars[end] == '_') {
                        end += 1;
                    }
                    let name: String = chars[start..end].iter().collect();
                    let slot = match named.get(&name) {
                        Some(slot) => *slot,
                        None => {
                            parameters.push(ParamKey::Name(name.clone()));
                            named.insert(name, parameters.len());
                            parameters.len()
                        }
                    };
                    sql.push('$');
                    sql.push_str(&slot.to_string());
                    i = end;
                }
                '?' => {
                    positional += 1;
                    parameters.push(ParamKey::Position(positional));
                    sql.push('$');
                    sql.push_str(&parameters.len().to_string());
                    i += 1;
                }
                _ => {
                    sql.push(c);
                    i += 1;
                }
            }
        }

        if positional > 0 && !named.is_empty() {
            return Err(SqlBindError::statement(
                template,
                "-",
                "cannot mix named and positional parameters",
            ));
        }

        Ok(ParsedSql { sql, parameters })
    }
}
