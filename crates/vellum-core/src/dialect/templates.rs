//! Operator and function templates.

use crate::fragment::{Precedence, Template};

fn template(text: &str, precedence: Precedence) -> Template {
    Template::parse(text, precedence)
        .unwrap_or_else(|e| panic!("built-in template {text:?} is malformed: {e}"))
}

fn operator(text: &str, precedence: Precedence) -> Template {
    template(text, precedence).non_associative()
}

/// Templates used to render expressions for one dialect.
#[derive(Debug, Clone)]
#[allow(missing_docs)]
pub struct SqlTemplates {
    pub eq: Template,
    pub ne: Template,
    pub lt: Template,
    pub le: Template,
    pub gt: Template,
    pub ge: Template,
    pub and: Template,
    pub or: Template,
    pub not: Template,
    pub neg: Template,
    pub add: Template,
    pub sub: Template,
    pub mul: Template,
    pub div: Template,
    pub modulo: Template,
    pub concat: Template,
    pub is_null: Template,
    pub is_not_null: Template,
    pub in_list: Template,
    pub not_in_list: Template,
    pub like: Template,
    pub not_like: Template,
    pub lower: Template,
    pub upper: Template,
    pub length: Template,
    pub trim: Template,
    pub abs: Template,
    pub coalesce: Template,
    pub count_star: Template,
    pub count: Template,
    pub count_distinct: Template,
    pub sum: Template,
    pub avg: Template,
    pub min: Template,
    pub max: Template,
    pub exists: Template,
    pub subquery: Template,
    pub fake_order: Template,
    pub alias: Template,
    pub qualified: Template,
}

impl SqlTemplates {
    /// ANSI templates shared by most vendors.
    #[must_use]
    pub fn ansi() -> Self {
        use Precedence as P;
        Self {
            eq: operator("{0} = {1}", P::COMPARISON),
            ne: operator("{0} <> {1}", P::COMPARISON),
            lt: operator("{0} < {1}", P::COMPARISON),
            le: operator("{0} <= {1}", P::COMPARISON),
            gt: operator("{0} > {1}", P::COMPARISON),
            ge: operator("{0} >= {1}", P::COMPARISON),
            and: template("{0} AND {1}", P::AND),
            or: template("{0} OR {1}", P::OR),
            not: template("NOT {0}", P::NOT),
            neg: template("-{0}", P::UNARY),
            add: template("{0} + {1}", P::ADDITIVE),
            sub: operator("{0} - {1}", P::ADDITIVE),
            mul: template("{0} * {1}", P::MULTIPLICATIVE),
            div: operator("{0} / {1}", P::MULTIPLICATIVE),
            modulo: operator("{0} % {1}", P::MULTIPLICATIVE),
            concat: template("{0} || {1}", P::ADDITIVE),
            is_null: operator("{0} IS NULL", P::COMPARISON),
            is_not_null: operator("{0} IS NOT NULL", P::COMPARISON),
            in_list: operator("{0} IN {1}", P::COMPARISON),
            not_in_list: operator("{0} NOT IN {1}", P::COMPARISON),
            like: operator("{0} LIKE {1} ESCAPE '\\'", P::COMPARISON),
            not_like: operator("{0} NOT LIKE {1} ESCAPE '\\'", P::COMPARISON),
            lower: template("LOWER({0})", P::ATOM),
            upper: template("UPPER({0})", P::ATOM),
            length: template("LENGTH({0})", P::ATOM),
            trim: template("TRIM({0})", P::ATOM),
            abs: template("ABS({0})", P::ATOM),
            coalesce: template("COALESCE({0}, {1})", P::ATOM),
            count_star: template("COUNT(*)", P::ATOM),
            count: template("COUNT({0})", P::ATOM),
            count_distinct: template("COUNT(DISTINCT {0})", P::ATOM),
            sum: template("SUM({0})", P::ATOM),
            avg: template("AVG({0})", P::ATOM),
            min: template("MIN({0})", P::ATOM),
            max: template("MAX({0})", P::ATOM),
            exists: template("EXISTS ({0})", P::ATOM),
            subquery: template("({0})", P::ATOM),
            fake_order: template("(SELECT 1)", P::ATOM),
            alias: template("{0} AS {1}", P::LOWEST),
            qualified: template("{0}.{1}", P::ATOM),
        }
    }

    /// SQL Server overrides.
    #[must_use]
    pub fn mssql() -> Self {
        use Precedence as P;
        Self {
            concat: template("{0} + {1}", P::ADDITIVE),
            length: template("LEN({0})", P::ATOM),
            trim: template("LTRIM(RTRIM({0}))", P::ATOM),
            ..Self::ansi()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builtin_templates_parse() {
        let ansi = SqlTemplates::ansi();
        assert_eq!(ansi.like.arity(), 2);
        assert_eq!(ansi.count_star.arity(), 0);
        assert_eq!(ansi.coalesce.arity(), 2);
        let ms = SqlTemplates::mssql();
        assert_eq!(ms.length.source(), "LEN({0})");
        assert_eq!(ms.eq.source(), "{0} = {1}");
    }
}
