//! SQL fragments and templates.
//!
//! Generated SQL is assembled from immutable fragments: literal text,
//! placeholders bound at execution time, and composites produced by
//! [`Template::format`]. Composites carry a precedence so that flattening can
//! insert parentheses only where the surrounding operator binds tighter.

mod statement;
mod template;

pub use statement::{BoundCommand, SqlStatement};
pub use template::Template;

use crate::value::Value;

/// Binding strength of a composite fragment. Higher binds tighter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Precedence(u8);

impl Precedence {
    /// Statements, clause lists and comma-separated lists.
    pub const LOWEST: Self = Self(0);
    /// `OR`
    pub const OR: Self = Self(10);
    /// `AND`
    pub const AND: Self = Self(20);
    /// Prefix `NOT`
    pub const NOT: Self = Self(30);
    /// Comparisons, `LIKE`, `IN`, `IS NULL`.
    pub const COMPARISON: Self = Self(40);
    /// `+`, `-`, `||`
    pub const ADDITIVE: Self = Self(50);
    /// `*`, `/`, `%`
    pub const MULTIPLICATIVE: Self = Self(60);
    /// Unary minus.
    pub const UNARY: Self = Self(70);
    /// Self-delimiting constructs: identifiers, literals, function calls,
    /// parenthesized sub-queries. Arguments of an atomic template are already
    /// enclosed by its text and never need extra parentheses.
    pub const ATOM: Self = Self(100);

    /// Creates a custom precedence level.
    #[must_use]
    pub const fn new(level: u8) -> Self {
        Self(level)
    }

    /// The numeric level.
    #[must_use]
    pub const fn level(self) -> u8 {
        self.0
    }
}

/// How a placeholder is filled in when a statement is bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PlaceHolderKind {
    /// Rendered as a parameter marker; the value travels separately.
    Parameter,
    /// Rendered inline as a literal (lists, when array parameters are not
    /// available).
    Value,
    /// Rendered inline as a quoted identifier.
    Column,
}

/// A rewrite applied to a parameter value before it is sent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueTransform {
    /// `value%`
    StartsWith,
    /// `%value`
    EndsWith,
    /// `%value%`
    Contains,
}

impl ValueTransform {
    /// Escape character used by the `LIKE ... ESCAPE` templates.
    pub const ESCAPE: char = '\\';

    /// Applies the transform. Non-text values pass through unchanged.
    ///
    /// `[` is escaped too: SQL Server reads it as the start of a character
    /// class.
    #[must_use]
    pub fn apply(self, value: &Value) -> Value {
        let Value::Text(text) = value else {
            return value.clone();
        };
        let mut escaped = String::with_capacity(text.len() + 2);
        for ch in text.chars() {
            if matches!(ch, '%' | '_' | '[' | Self::ESCAPE) {
                escaped.push(Self::ESCAPE);
            }
            escaped.push(ch);
        }
        Value::Text(match self {
            Self::StartsWith => format!("{escaped}%"),
            Self::EndsWith => format!("%{escaped}"),
            Self::Contains => format!("%{escaped}%"),
        })
    }
}

/// An indexed slot filled from the statement's argument list.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PlaceHolder {
    /// Index into the argument list.
    pub index: usize,
    /// How the argument is rendered.
    pub kind: PlaceHolderKind,
    /// Optional rewrite of the argument.
    pub transform: Option<ValueTransform>,
}

impl PlaceHolder {
    /// A plain parameter.
    #[must_use]
    pub const fn parameter(index: usize) -> Self {
        Self {
            index,
            kind: PlaceHolderKind::Parameter,
            transform: None,
        }
    }
}

/// A composite fragment: ordered children plus binding information.
#[derive(Debug, Clone, PartialEq)]
pub struct Composite {
    /// Child fragments in output order.
    pub children: Vec<SqlFragment>,
    /// Binding strength of the whole composite.
    pub precedence: Precedence,
    /// Whether an operand of equal precedence may be left bare.
    pub associative: bool,
}

/// An immutable piece of SQL.
#[derive(Debug, Clone, PartialEq)]
pub enum SqlFragment {
    /// Literal SQL text.
    Text(String),
    /// A slot bound at execution time.
    PlaceHolder(PlaceHolder),
    /// A template instance.
    Composite(Composite),
}

impl SqlFragment {
    /// Literal text.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self::Text(text.into())
    }

    /// A parameter placeholder.
    #[must_use]
    pub const fn param(index: usize) -> Self {
        Self::PlaceHolder(PlaceHolder::parameter(index))
    }

    /// Joins fragments with a separator into one composite.
    ///
    /// The composite gets `precedence`, so an operand binding looser than the
    /// separator is parenthesized.
    #[must_use]
    pub fn join(items: Vec<Self>, separator: &str, precedence: Precedence) -> Self {
        let mut children = Vec::with_capacity(items.len() * 2);
        for (i, item) in items.into_iter().enumerate() {
            if i > 0 {
                children.push(Self::text(separator));
            }
            children.push(item);
        }
        Self::Composite(Composite {
            children,
            precedence,
            associative: true,
        })
    }

    /// A comma-separated list.
    #[must_use]
    pub fn list(items: Vec<Self>) -> Self {
        Self::join(items, ", ", Precedence::LOWEST)
    }

    /// Precedence of this fragment as an operand.
    #[must_use]
    pub const fn precedence(&self) -> Precedence {
        match self {
            Self::Composite(c) => c.precedence,
            Self::Text(_) | Self::PlaceHolder(_) => Precedence::ATOM,
        }
    }

    /// Flattens the tree into text and placeholder parts.
    #[must_use]
    pub fn flatten(&self, handler: &dyn PrecedenceHandler) -> FlatSql {
        let mut out = FlatSql::default();
        self.flatten_into(None, handler, &mut out);
        out
    }

    fn flatten_into(
        &self,
        parent: Option<&Composite>,
        handler: &dyn PrecedenceHandler,
        out: &mut FlatSql,
    ) {
        match self {
            Self::Text(text) => out.push_text(text),
            Self::PlaceHolder(p) => out.parts.push(FlatPart::PlaceHolder(p.clone())),
            Self::Composite(c) => {
                let parens = parent.is_some_and(|p| handler.needs_parentheses(p, c));
                if parens {
                    out.push_text("(");
                }
                for child in &c.children {
                    child.flatten_into(Some(c), handler, out);
                }
                if parens {
                    out.push_text(")");
                }
            }
        }
    }
}

/// Decides where parentheses go when a composite is nested in another.
pub trait PrecedenceHandler: Send + Sync {
    /// Whether `child`, appearing inside `parent`, must be parenthesized.
    fn needs_parentheses(&self, parent: &Composite, child: &Composite) -> bool;
}

/// Standard SQL operator precedence.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardPrecedence;

impl PrecedenceHandler for StandardPrecedence {
    fn needs_parentheses(&self, parent: &Composite, child: &Composite) -> bool {
        if parent.precedence == Precedence::ATOM {
            return false;
        }
        child.precedence < parent.precedence
            || (child.precedence == parent.precedence && !parent.associative)
    }
}

/// One part of a flattened fragment tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlatPart {
    /// SQL text.
    Text(String),
    /// A placeholder to resolve at bind time.
    PlaceHolder(PlaceHolder),
}

/// A flattened fragment tree.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FlatSql {
    /// Parts in output order; adjacent text parts are merged.
    pub parts: Vec<FlatPart>,
}

impl FlatSql {
    fn push_text(&mut self, text: &str) {
        if text.is_empty() {
            return;
        }
        if let Some(FlatPart::Text(last)) = self.parts.last_mut() {
            last.push_str(text);
        } else {
            self.parts.push(FlatPart::Text(text.to_string()));
        }
    }

    /// Renders with `{n}` in place of each placeholder. Used for logging and
    /// tests; executable SQL comes from [`SqlStatement::bind`].
    #[must_use]
    pub fn to_sql_text(&self) -> String {
        let mut sql = String::new();
        for part in &self.parts {
            match part {
                FlatPart::Text(t) => sql.push_str(t),
                FlatPart::PlaceHolder(p) => {
                    sql.push('{');
                    sql.push_str(&p.index.to_string());
                    sql.push('}');
                }
            }
        }
        sql
    }
}
