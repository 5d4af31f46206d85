//! SQL templates with positional argument slots.

use crate::error::SqlError;

use super::{Composite, Precedence, SqlFragment};

#[derive(Debug, Clone, PartialEq, Eq)]
enum TemplatePart {
    Text(String),
    Arg(usize),
}

/// A parsed SQL template such as `"{0} LIKE {1} ESCAPE '\'"`.
///
/// Each `{n}` token is an argument slot. Indices must be contiguous from zero;
/// a slot may appear more than once. `{{` and `}}` produce literal braces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Template {
    source: String,
    parts: Vec<TemplatePart>,
    arity: usize,
    precedence: Precedence,
    associative: bool,
}

impl Template {
    /// Parses a template.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::MalformedTemplate`] for an unclosed `{`, a stray
    /// `}`, a non-numeric index, or a gap in the slot indices.
    pub fn parse(text: &str, precedence: Precedence) -> Result<Self, SqlError> {
        let malformed = |position: usize, reason: &str| SqlError::MalformedTemplate {
            template: text.to_string(),
            position,
            reason: reason.to_string(),
        };

        let mut parts = Vec::new();
        let mut current = String::new();
        let mut max_index: Option<usize> = None;
        let mut seen = Vec::new();
        let bytes = text.as_bytes();
        let mut pos = 0;

        while pos < bytes.len() {
            match bytes[pos] {
                b'{' if bytes.get(pos + 1) == Some(&b'{') => {
                    current.push('{');
                    pos += 2;
                }
                b'}' if bytes.get(pos + 1) == Some(&b'}') => {
                    current.push('}');
                    pos += 2;
                }
                b'}' => return Err(malformed(pos, "unmatched '}'")),
                b'{' => {
                    let close = text[pos + 1..]
                        .find('}')
                        .map(|offset| pos + 1 + offset)
                        .ok_or_else(|| malformed(pos, "unclosed '{'"))?;
                    let digits = &text[pos + 1..close];
                    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                        return Err(malformed(pos, "argument index must be a number"));
                    }
                    let index: usize = digits
                        .parse()
                        .map_err(|_| malformed(pos, "argument index out of range"))?;
                    if !current.is_empty() {
                        parts.push(TemplatePart::Text(std::mem::take(&mut current)));
                    }
                    parts.push(TemplatePart::Arg(index));
                    if seen.len() <= index {
                        seen.resize(index + 1, false);
                    }
                    seen[index] = true;
                    max_index = Some(max_index.map_or(index, |m| m.max(index)));
                    pos = close + 1;
                }
                _ => {
                    // Copy a whole UTF-8 scalar, not just one byte.
                    let ch = text[pos..].chars().next().unwrap_or_default();
                    current.push(ch);
                    pos += ch.len_utf8();
                }
            }
        }
        if !current.is_empty() {
            parts.push(TemplatePart::Text(current));
        }

        if let Some(gap) = seen.iter().position(|used| !used) {
            return Err(malformed(0, &format!("argument {{{gap}}} is never used")));
        }

        Ok(Self {
            source: text.to_string(),
            parts,
            arity: max_index.map_or(0, |m| m + 1),
            precedence,
            associative: true,
        })
    }

    /// Marks the template as non-associative: an operand with equal
    /// precedence is parenthesized (`a - (b - c)`).
    #[must_use]
    pub const fn non_associative(mut self) -> Self {
        self.associative = false;
        self
    }

    /// Number of distinct argument slots.
    #[must_use]
    pub const fn arity(&self) -> usize {
        self.arity
    }

    /// The template's precedence.
    #[must_use]
    pub const fn precedence(&self) -> Precedence {
        self.precedence
    }

    /// The template source text.
    #[must_use]
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Binds arguments and returns one composite fragment.
    ///
    /// # Errors
    ///
    /// Returns [`SqlError::TemplateArity`] when the argument count differs
    /// from the number of slots.
    pub fn format(&self, args: Vec<SqlFragment>) -> Result<SqlFragment, SqlError> {
        if args.len() != self.arity {
            return Err(SqlError::TemplateArity {
                template: self.source.clone(),
                expected: self.arity,
                actual: args.len(),
            });
        }
        let children = self
            .parts
            .iter()
            .map(|part| match part {
                TemplatePart::Text(t) => SqlFragment::Text(t.clone()),
                TemplatePart::Arg(i) => args[*i].clone(),
            })
            .collect();
        Ok(SqlFragment::Composite(Composite {
            children,
            precedence: self.precedence,
            associative: self.associative,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fragment::StandardPrecedence;

    fn render(fragment: &SqlFragment) -> String {
        fragment.flatten(&StandardPrecedence).to_sql_text()
    }

    #[test]
    fn test_parse_and_format() {
        let t = Template::parse("{0} = {1}", Precedence::COMPARISON).unwrap();
        assert_eq!(t.arity(), 2);
        let f = t
            .format(vec![SqlFragment::text("a"), SqlFragment::text("b")])
            .unwrap();
        assert_eq!(render(&f), "a = b");
    }

    #[test]
    fn test_repeated_slot() {
        let t = Template::parse("CASE WHEN {0} IS NULL THEN 0 ELSE {0} END", Precedence::ATOM)
            .unwrap();
        assert_eq!(t.arity(), 1);
        let f = t.format(vec![SqlFragment::text("x")]).unwrap();
        assert_eq!(render(&f), "CASE WHEN x IS NULL THEN 0 ELSE x END");
    }

    #[test]
    fn test_escaped_braces() {
        let t = Template::parse("'{{' || {0} || '}}'", Precedence::ADDITIVE).unwrap();
        assert_eq!(t.arity(), 1);
        let f = t.format(vec![SqlFragment::text("x")]).unwrap();
        assert_eq!(render(&f), "'{' || x || '}'");
    }

    #[test]
    fn test_malformed_templates() {
        for text in ["{0", "a }", "{x}", "{}", "{0} {2}"] {
            let err = Template::parse(text, Precedence::ATOM).unwrap_err();
            assert!(
                matches!(err, SqlError::MalformedTemplate { .. }),
                "{text} -> {err:?}"
            );
        }
    }

    #[test]
    fn test_arity_mismatch() {
        let t = Template::parse("UPPER({0})", Precedence::ATOM).unwrap();
        let err = t.format(vec![]).unwrap_err();
        assert_eq!(
            err,
            SqlError::TemplateArity {
                template: String::from("UPPER({0})"),
                expected: 1,
                actual: 0,
            }
        );
    }
}
