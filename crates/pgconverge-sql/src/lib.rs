//! SQL quoting helpers.
//!
//! Everything pgconverge sends to Postgres is built from these pieces:
//! identifiers are always quoted through [`Ident`], values always travel as
//! bound `$n` parameters. [`render_bound`] exists only to show a human what
//! was executed; its output is never sent to the database.

/// A PostgreSQL string literal wrapper.
///
/// Display writes the value escaped and quoted with single quotes.
///
/// # Example
/// ```
/// use pgconverge_sql::Lit;
/// assert_eq!(format!("{}", Lit("foo")), "'foo'");
/// assert_eq!(format!("{}", Lit("it's")), "'it''s'");
/// ```
pub struct Lit<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Lit<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "'")?;
        for c in self.0.as_ref().chars() {
            if c == '\'' {
                write!(f, "''")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "'")
    }
}

/// A PostgreSQL identifier wrapper.
///
/// Display writes the value escaped and quoted with double quotes.
///
/// # Example
/// ```
/// use pgconverge_sql::Ident;
/// assert_eq!(format!("{}", Ident("user")), "\"user\"");
/// assert_eq!(format!("{}", Ident("bla\"h")), "\"bla\"\"h\"");
/// ```
pub struct Ident<T: AsRef<str>>(pub T);

impl<T: AsRef<str>> std::fmt::Display for Ident<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "\"")?;
        for c in self.0.as_ref().chars() {
            if c == '"' {
                write!(f, "\"\"")?;
            } else {
                write!(f, "{}", c)?;
            }
        }
        write!(f, "\"")
    }
}

/// A schema-qualified relation name.
///
/// Display writes both parts quoted, separated by a dot.
///
/// # Example
/// ```
/// use pgconverge_sql::Qualified;
/// assert_eq!(format!("{}", Qualified("public", "config")), "\"public\".\"config\"");
/// ```
pub struct Qualified<S: AsRef<str>, N: AsRef<str>>(pub S, pub N);

impl<S: AsRef<str>, N: AsRef<str>> std::fmt::Display for Qualified<S, N> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", Ident(self.0.as_ref()), Ident(self.1.as_ref()))
    }
}

/// Escape a string literal for SQL.
pub fn escape_string(s: &str) -> String {
    format!("{}", Lit(s))
}

/// Quote a PostgreSQL identifier.
///
/// Always quotes identifiers to avoid issues with reserved keywords like
/// `user`, `order`, `table`, `group`, etc. Doubles any embedded quotes.
pub fn quote_ident(name: &str) -> String {
    format!("{}", Ident(name))
}

/// Keywords Postgres' `quote_identifier` always quotes (everything except the
/// unreserved category).
const QUOTED_KEYWORDS: &[&str] = &[
    // reserved
    "all", "analyse", "analyze", "and", "any", "array", "as", "asc", "asymmetric", "both",
    "case", "cast", "check", "collate", "column", "constraint", "create", "current_catalog",
    "current_date", "current_role", "current_time", "current_timestamp", "current_user",
    "default", "deferrable", "desc", "distinct", "do", "else", "end", "except", "false", "fetch",
    "for", "foreign", "from", "grant", "group", "having", "in", "initially", "intersect", "into",
    "lateral", "leading", "limit", "localtime", "localtimestamp", "not", "null", "offset", "on",
    "only", "or", "order", "placing", "primary", "references", "returning", "select",
    "session_user", "some", "symmetric", "system_user", "table", "then", "to", "trailing",
    "true", "union", "unique", "user", "using", "variadic", "when", "where", "window", "with",
    // column names
    "between", "bigint", "bit", "boolean", "char", "character", "coalesce", "dec", "decimal",
    "exists", "extract", "float", "greatest", "grouping", "inout", "int", "integer", "interval",
    "json", "json_array", "json_arrayagg", "json_exists", "json_object", "json_objectagg",
    "json_query", "json_scalar", "json_serialize", "json_table", "json_value", "least",
    "merge_action", "national", "nchar", "none", "normalize", "nullif", "numeric", "out",
    "overlay", "position", "precision", "real", "row", "setof", "smallint", "substring", "time",
    "timestamp", "treat", "trim", "values", "varchar", "xmlattributes", "xmlconcat",
    "xmlelement", "xmlexists", "xmlforest", "xmlnamespaces", "xmlparse", "xmlpi", "xmlroot",
    "xmlserialize", "xmltable",
    // type and function names
    "authorization", "binary", "collation", "concurrently", "cross", "current_schema", "freeze",
    "full", "ilike", "inner", "is", "isnull", "join", "left", "like", "natural", "notnull",
    "outer", "overlaps", "right", "similar", "tablesample", "verbose",
];

/// Quote an identifier only when Postgres would, the way catalog functions
/// such as `pg_get_constraintdef` print it.
///
/// # Example
/// ```
/// use pgconverge_sql::quote_ident_if_needed;
/// assert_eq!(quote_ident_if_needed("tenant_id"), "tenant_id");
/// assert_eq!(quote_ident_if_needed("TenantId"), "\"TenantId\"");
/// assert_eq!(quote_ident_if_needed("user"), "\"user\"");
/// ```
pub fn quote_ident_if_needed(name: &str) -> String {
    let mut chars = name.chars();
    let simple = match chars.next() {
        Some(first) => {
            (first.is_ascii_lowercase() || first == '_')
                && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$')
        }
        None => false,
    };
    if simple && !QUOTED_KEYWORDS.contains(&name) {
        name.to_string()
    } else {
        quote_ident(name)
    }
}

/// Quote a list of identifiers and join them with `, `.
///
/// # Example
/// ```
/// assert_eq!(pgconverge_sql::ident_list(&["id", "name"]), "\"id\", \"name\"");
/// ```
pub fn ident_list(names: &[impl AsRef<str>]) -> String {
    names
        .iter()
        .map(|n| quote_ident(n.as_ref()))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Name Postgres gives a primary key constraint created without an explicit name.
///
/// # Example
/// ```
/// assert_eq!(pgconverge_sql::pkey_constraint_name("config"), "config_pkey");
/// ```
pub fn pkey_constraint_name(table: &str) -> String {
    format!("{}_pkey", table)
}

/// Render `sql` with its `$n` placeholders replaced by quoted literals.
///
/// `None` renders as `NULL`. Placeholders inside quoted strings, quoted
/// identifiers and dollar-quoted bodies are left alone, as are placeholders
/// without a matching value.
pub fn render_bound(sql: &str, params: &[Option<&str>]) -> String {
    let mut out = String::with_capacity(sql.len());

    let mut in_single_quote = false;
    let mut in_double_quote = false;

    let mut chars = sql.chars().peekable();
    while let Some(ch) = chars.next() {
        if in_single_quote {
            out.push(ch);
            if ch == '\'' {
                // SQL escapes single quotes by doubling them: ''
                if let Some(next) = chars.next_if_eq(&'\'') {
                    out.push(next);
                } else {
                    in_single_quote = false;
                }
            }
            continue;
        }

        if in_double_quote {
            out.push(ch);
            if ch == '"' {
                if let Some(next) = chars.next_if_eq(&'"') {
                    out.push(next);
                } else {
                    in_double_quote = false;
                }
            }
            continue;
        }

        match ch {
            '\'' => {
                out.push(ch);
                in_single_quote = true;
            }
            '"' => {
                out.push(ch);
                in_double_quote = true;
            }
            '$' if !chars.peek().is_some_and(|c| c.is_ascii_digit()) => {
                let Some(tag) = dollar_quote_tag(chars.clone()) else {
                    out.push('$');
                    continue;
                };
                let delimiter = format!("${}$", tag);
                out.push_str(&delimiter);
                for _ in 0..=tag.chars().count() {
                    chars.next();
                }
                let mut body = String::new();
                for c in chars.by_ref() {
                    body.push(c);
                    if body.ends_with(&delimiter) {
                        break;
                    }
                }
                out.push_str(&body);
            }
            '$' => {
                let mut digits = String::new();
                while let Some(d) = chars.next_if(|c| c.is_ascii_digit()) {
                    digits.push(d);
                }
                let slot = digits
                    .parse::<usize>()
                    .ok()
                    .and_then(|n| n.checked_sub(1))
                    .and_then(|i| params.get(i));
                match slot {
                    Some(Some(value)) => out.push_str(&escape_string(value)),
                    Some(None) => out.push_str("NULL"),
                    None => {
                        out.push('$');
                        out.push_str(&digits);
                    }
                }
            }
            c => out.push(c),
        }
    }

    out
}

/// The tag of a dollar quote opening right after a `$`, if one does.
///
/// `$$` has the empty tag; `$fn$` has the tag `fn`.
fn dollar_quote_tag(rest: impl Iterator<Item = char>) -> Option<String> {
    let mut tag = String::new();
    for c in rest {
        match c {
            '$' => return Some(tag),
            c if c.is_ascii_alphabetic() || c == '_' => tag.push(c),
            c if c.is_ascii_digit() && !tag.is_empty() => tag.push(c),
            _ => return None,
        }
    }
    None
}
