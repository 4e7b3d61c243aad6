// warden-core/src/domain/dialect/rewrites.rs

// The idiom table. Each rewrite works in place on the token stream and reports what it did;
// anything it cannot express safely for the target is left untouched and noted.

use super::Dialect;
use super::tokens::{
    depth0_words, is_ws, matching_close, matching_open, next_sig, number, operand_end,
    operand_start, owning_select, prev_sig, primary_start, render_compact, space, split_arguments,
    trimmed, word, word_is, word_upper,
};
use super::translator::{IdiomKind, TranslationNote};
use sqlparser::tokenizer::Token;

#[derive(Debug, Default)]
pub struct RewriteOutcome {
    pub applied: bool,
    pub notes: Vec<TranslationNote>,
}

impl RewriteOutcome {
    fn gap(&mut self, idiom: IdiomKind, fragment: String, reason: impl Into<String>) {
        self.notes.push(TranslationNote::untranslated(idiom, fragment, reason));
    }

    fn approx(&mut self, idiom: IdiomKind, fragment: String, reason: impl Into<String>) {
        self.notes.push(TranslationNote::approximated(idiom, fragment, reason));
    }
}

// --- SMALL BUILDERS ---

fn is_number(token: &Token) -> bool {
    matches!(token, Token::Number(..))
}

fn fragment(tokens: &[Token], from: usize, to: usize) -> String {
    let to = to.min(tokens.len().saturating_sub(1));
    if from > to {
        return String::new();
    }
    render_compact(&tokens[from..=to])
}

/// `NAME(a, b, c)`
fn call(name: &str, args: Vec<Vec<Token>>) -> Vec<Token> {
    let mut out = vec![word(name), Token::LParen];
    for (n, arg) in args.into_iter().enumerate() {
        if n > 0 {
            out.push(Token::Comma);
            out.push(space());
        }
        out.extend(arg);
    }
    out.push(Token::RParen);
    out
}

/// `CASE WHEN <cond> THEN <then> [ELSE <otherwise>] END`
fn case_when(cond: &[Token], then: Vec<Token>, otherwise: Option<Vec<Token>>) -> Vec<Token> {
    let mut out = vec![word("CASE"), space(), word("WHEN"), space()];
    out.extend_from_slice(cond);
    out.extend([space(), word("THEN"), space()]);
    out.extend(then);
    if let Some(otherwise) = otherwise {
        out.extend([space(), word("ELSE"), space()]);
        out.extend(otherwise);
    }
    out.extend([space(), word("END")]);
    out
}

fn string_literal(token: &[Token]) -> Option<&str> {
    match token {
        [Token::SingleQuotedString(s)] => Some(s.as_str()),
        _ => None,
    }
}

/// Start of whitespace directly preceding `at`.
fn leading_ws_start(tokens: &[Token], at: usize) -> usize {
    let mut start = at;
    while start > 0 && is_ws(&tokens[start - 1]) {
        start -= 1;
    }
    start
}

/// First index of the query scope (statement or parenthesised subquery) containing `at`.
fn scope_start(tokens: &[Token], at: usize) -> usize {
    let mut cursor = at;
    while let Some(j) = prev_sig(tokens, cursor) {
        match tokens[j] {
            Token::RParen => match matching_open(tokens, j) {
                Some(open) => cursor = open,
                None => return j + 1,
            },
            Token::LParen => return j + 1,
            _ => cursor = j,
        }
    }
    0
}

/// Exclusive end of the query scope containing `at`.
fn scope_end(tokens: &[Token], at: usize) -> usize {
    let mut depth = 0usize;
    for (j, t) in tokens.iter().enumerate().skip(at) {
        match t {
            Token::LParen => depth += 1,
            Token::RParen if depth == 0 => return j,
            Token::RParen => depth -= 1,
            Token::SemiColon | Token::EOF if depth == 0 => return j,
            _ => {}
        }
    }
    tokens.len()
}

fn has_set_operation(words: &[(usize, String)]) -> bool {
    words
        .iter()
        .any(|(_, w)| matches!(w.as_str(), "UNION" | "EXCEPT" | "INTERSECT" | "MINUS"))
}

// --- IDENTIFIER QUOTING ---

pub fn identifier_quotes(tokens: &mut [Token], to: Dialect) -> RewriteOutcome {
    let mut out = RewriteOutcome::default();
    let target = to.identifier_quote();
    for token in tokens.iter_mut() {
        if let Token::Word(w) = token
            && let Some(current) = w.quote_style
            && current != target
        {
            let close = closing_quote(current);
            let raw = w.value.replace(&format!("{close}{close}"), &close.to_string());
            let target_close = closing_quote(target);
            w.value = raw.replace(target_close, &format!("{target_close}{target_close}"));
            w.quote_style = Some(target);
            out.applied = true;
        }
    }
    out
}

fn closing_quote(open: char) -> char {
    match open {
        '[' => ']',
        other => other,
    }
}

// --- FILTERED AGGREGATES ---

const FILTERABLE_AGGREGATES: &[&str] = &["COUNT", "SUM", "AVG", "MIN", "MAX"];

/// `AGG(x) FILTER (WHERE c)` -> `AGG(CASE WHEN c THEN x END)`, `COUNT(*)` -> `SUM(CASE ... 1 ELSE 0 END)`.
pub fn filtered_aggregates(tokens: &mut Vec<Token>) -> RewriteOutcome {
    let mut out = RewriteOutcome::default();
    let mut i = 0;
    while i < tokens.len() {
        if !word_is(&tokens[i], "FILTER") {
            i += 1;
            continue;
        }
        let Some((where_idx, filter_close)) = filter_clause(tokens, i) else {
            i += 1;
            continue;
        };
        let call_site = prev_sig(tokens, i)
            .filter(|&c| matches!(tokens[c], Token::RParen))
            .and_then(|close| matching_open(tokens, close).map(|open| (open, close)))
            .and_then(|(open, close)| prev_sig(tokens, open).map(|name| (name, open, close)));
        let Some((name, open, close)) = call_site else {
            out.gap(
                IdiomKind::FilteredAggregate,
                fragment(tokens, i, filter_close),
                "FILTER clause is not attached to an aggregate call",
            );
            i = filter_close + 1;
            continue;
        };

        let aggregate = word_upper(&tokens[name]).unwrap_or_default();
        if !FILTERABLE_AGGREGATES.contains(&aggregate.as_str()) {
            out.gap(
                IdiomKind::FilteredAggregate,
                fragment(tokens, name, filter_close),
                format!("no CASE form known for aggregate {}", aggregate),
            );
            i = filter_close + 1;
            continue;
        }

        let condition = trimmed(&tokens[where_idx + 1..filter_close]).to_vec();
        let args = trimmed(&tokens[open + 1..close]).to_vec();

        let replacement = if aggregate == "COUNT" && matches!(args.as_slice(), [Token::Mul]) {
            call(
                "SUM",
                vec![case_when(&condition, vec![number("1")], Some(vec![number("0")]))],
            )
        } else {
            let (distinct, value) = match args.first() {
                Some(first) if word_is(first, "DISTINCT") => (true, trimmed(&args[1..]).to_vec()),
                _ => (false, args),
            };
            let mut inner = Vec::new();
            if distinct {
                inner.extend([word("DISTINCT"), space()]);
            }
            inner.extend(case_when(&condition, value, None));
            let mut rebuilt = vec![tokens[name].clone(), Token::LParen];
            rebuilt.extend(inner);
            rebuilt.push(Token::RParen);
            rebuilt
        };

        let len = replacement.len();
        tokens.splice(name..=filter_close, replacement);
        out.applied = true;
        i = name + len;
    }
    out
}

/// `FILTER (WHERE ...)` starting at `at`: returns (WHERE index, closing paren index).
fn filter_clause(tokens: &[Token], at: usize) -> Option<(usize, usize)> {
    let open = next_sig(tokens, at).filter(|&p| matches!(tokens[p], Token::LParen))?;
    let where_idx = next_sig(tokens, open).filter(|&w| word_is(&tokens[w], "WHERE"))?;
    let close = matching_close(tokens, open)?;
    Some((where_idx, close))
}

// --- TYPE CASTS ---

/// Words that continue a multi-word type name (`double precision`, `timestamp with time zone`).
const TYPE_CONTINUATIONS: &[&str] = &["PRECISION", "VARYING", "WITH", "WITHOUT", "TIME", "ZONE"];

/// `expr::type` -> `CAST(expr AS type)` with the type mapped to the target's vocabulary.
pub fn double_colon_casts(tokens: &mut Vec<Token>, to: Dialect) -> RewriteOutcome {
    let mut out = RewriteOutcome::default();
    let mut i = 0;
    while i < tokens.len() {
        if !matches!(tokens[i], Token::DoubleColon) {
            i += 1;
            continue;
        }
        let operand = prev_sig(tokens, i).and_then(|end| primary_start(tokens, end).map(|s| (s, end)));
        let (Some((start, end)), Some((type_start, type_end))) = (operand, cast_type(tokens, i)) else {
            out.gap(
                IdiomKind::TypeCast,
                fragment(tokens, i.saturating_sub(2), i + 2),
                "could not delimit the cast operand or type",
            );
            i += 1;
            continue;
        };

        let type_name = render_compact(&tokens[type_start..=type_end]);
        let mut replacement = vec![word("CAST"), Token::LParen];
        replacement.extend_from_slice(&tokens[start..=end]);
        replacement.extend([space(), word("AS"), space(), word(&map_type(&type_name, to)), Token::RParen]);

        let len = replacement.len();
        tokens.splice(start..=type_end, replacement);
        out.applied = true;
        i = start + len;
    }
    out
}

fn cast_type(tokens: &[Token], colons: usize) -> Option<(usize, usize)> {
    let start = next_sig(tokens, colons).filter(|&t| matches!(tokens[t], Token::Word(_)))?;
    let mut end = start;
    while let Some(next) = next_sig(tokens, end) {
        match &tokens[next] {
            t if word_upper(t).is_some_and(|w| TYPE_CONTINUATIONS.contains(&w.as_str())) => end = next,
            Token::LParen => {
                end = matching_close(tokens, next)?;
                break;
            }
            _ => break,
        }
    }
    Some((start, end))
}

/// Maps a source type name (`text`, `numeric(10, 2)`, ...) to what the target understands inside `CAST`.
pub fn map_type(type_name: &str, to: Dialect) -> String {
    let upper = type_name.to_uppercase();
    let (base, args) = match upper.find('(') {
        Some(p) => (upper[..p].trim().to_string(), upper[p..].replace(' ', "")),
        None => (upper.trim().to_string(), String::new()),
    };
    let with_args = |name: &str| format!("{}{}", name, args);

    match to {
        Dialect::MsSql => match base.as_str() {
            "TEXT" | "VARCHAR" | "CHARACTER VARYING" | "STRING" if args.is_empty() => "NVARCHAR(MAX)".into(),
            "TEXT" | "VARCHAR" | "CHARACTER VARYING" | "STRING" => with_args("NVARCHAR"),
            "BOOLEAN" | "BOOL" => "BIT".into(),
            "TIMESTAMP" | "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" | "TIMESTAMP WITHOUT TIME ZONE" => {
                "DATETIME2".into()
            }
            "DOUBLE PRECISION" | "DOUBLE" | "FLOAT8" | "FLOAT4" | "REAL" => "FLOAT".into(),
            "INTEGER" | "INT" | "INT4" => "INT".into(),
            "INT8" | "BIGINT" => "BIGINT".into(),
            "NUMERIC" | "DECIMAL" => with_args("DECIMAL"),
            "UUID" => "UNIQUEIDENTIFIER".into(),
            _ => upper,
        },
        Dialect::MySql => match base.as_str() {
            "TEXT" | "VARCHAR" | "CHARACTER VARYING" | "STRING" => with_args("CHAR"),
            "UUID" => "CHAR(36)".into(),
            "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" | "SMALLINT" => "SIGNED".into(),
            "BOOLEAN" | "BOOL" => "UNSIGNED".into(),
            "NUMERIC" | "DECIMAL" => with_args("DECIMAL"),
            "TIMESTAMP" | "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" | "TIMESTAMP WITHOUT TIME ZONE" => {
                "DATETIME".into()
            }
            "DOUBLE PRECISION" | "DOUBLE" | "FLOAT8" | "FLOAT4" | "REAL" | "FLOAT" => "DOUBLE".into(),
            _ => upper,
        },
        Dialect::Sqlite => match base.as_str() {
            "TEXT" | "VARCHAR" | "CHARACTER VARYING" | "STRING" | "UUID" | "DATE" | "TIMESTAMP"
            | "TIMESTAMPTZ" | "TIMESTAMP WITH TIME ZONE" | "TIMESTAMP WITHOUT TIME ZONE" => "TEXT".into(),
            "INTEGER" | "INT" | "INT4" | "INT8" | "BIGINT" | "SMALLINT" | "BOOLEAN" | "BOOL" => {
                "INTEGER".into()
            }
            "NUMERIC" | "DECIMAL" => "NUMERIC".into(),
            "DOUBLE PRECISION" | "DOUBLE" | "FLOAT8" | "FLOAT4" | "REAL" | "FLOAT" => "REAL".into(),
            _ => upper,
        },
        _ => upper,
    }
}

// --- BOOLEAN LITERALS ---

/// `TRUE`/`FALSE` -> `1`/`0` for engines without boolean literals.
pub fn boolean_literals(tokens: &mut [Token]) -> RewriteOutcome {
    let mut out = RewriteOutcome::default();
    for i in 0..tokens.len() {
        let value = if word_is(&tokens[i], "TRUE") {
            "1"
        } else if word_is(&tokens[i], "FALSE") {
            "0"
        } else {
            continue;
        };
        let after_is = prev_sig(tokens, i).is_some_and(|p| {
            word_is(&tokens[p], "IS")
                || (word_is(&tokens[p], "NOT")
                    && prev_sig(tokens, p).is_some_and(|q| word_is(&tokens[q], "IS")))
        });
        if after_is {
            out.gap(
                IdiomKind::BooleanLiteral,
                fragment(tokens, i.saturating_sub(4), i),
                "IS TRUE/IS FALSE has no direct form; compare with = 1 instead",
            );
            continue;
        }
        tokens[i] = number(value);
        out.applied = true;
    }
    out
}

// --- STRING CONCATENATION ---

pub fn string_concatenation(tokens: &mut Vec<Token>, from: Dialect, to: Dialect) -> RewriteOutcome {
    let mut out = RewriteOutcome::default();
    if from == Dialect::MySql {
        pipes_to_or(tokens, &mut out);
    } else if !to.supports_concat_operator() {
        concat_operator_to_call(tokens, to, &mut out);
    }
    if !to.supports_concat_function() {
        concat_call_to_operator(tokens, from, &mut out);
    }
    out
}

/// MySQL `a || b` is `a OR b` unless PIPES_AS_CONCAT is set on the session.
fn pipes_to_or(tokens: &mut Vec<Token>, out: &mut RewriteOutcome) {
    let mut i = 0;
    while i < tokens.len() {
        if !matches!(tokens[i], Token::StringConcat) {
            i += 1;
            continue;
        }
        let original = fragment(tokens, i.saturating_sub(2), i + 2);
        let mut replacement = Vec::new();
        if i == 0 || !is_ws(&tokens[i - 1]) {
            replacement.push(space());
        }
        replacement.push(word("OR"));
        if tokens.get(i + 1).is_none_or(|t| !is_ws(t)) {
            replacement.push(space());
        }
        let len = replacement.len();
        tokens.splice(i..=i, replacement);
        out.applied = true;
        out.approx(
            IdiomKind::StringConcatenation,
            original,
            "MySQL || read as logical OR; sessions with PIPES_AS_CONCAT would concatenate instead",
        );
        i += len;
    }
}

/// `a || b || c` -> `CONCAT(a, b, c)`
fn concat_operator_to_call(tokens: &mut Vec<Token>, to: Dialect, out: &mut RewriteOutcome) {
    let mut i = 0;
    while i < tokens.len() {
        if !matches!(tokens[i], Token::StringConcat) {
            i += 1;
            continue;
        }
        let Some(start) = operand_start(tokens, i) else {
            out.gap(
                IdiomKind::StringConcatenation,
                fragment(tokens, i, i + 2),
                "left operand of || could not be delimited",
            );
            i += 1;
            continue;
        };

        let mut operands = vec![trimmed(&tokens[start..i]).to_vec()];
        let mut op = i;
        let mut end = i;
        while let Some(e) = operand_end(tokens, op) {
            operands.push(trimmed(&tokens[op + 1..=e]).to_vec());
            end = e;
            match next_sig(tokens, e) {
                Some(n) if matches!(tokens[n], Token::StringConcat) => op = n,
                _ => break,
            }
        }
        if end == i {
            out.gap(
                IdiomKind::StringConcatenation,
                fragment(tokens, start, i),
                "right operand of || could not be delimited",
            );
            i += 1;
            continue;
        }

        let original = fragment(tokens, start, end);
        let replacement = call("CONCAT", operands);
        let len = replacement.len();
        tokens.splice(start..=end, replacement);
        out.applied = true;
        if to == Dialect::MsSql {
            out.approx(
                IdiomKind::StringConcatenation,
                original,
                "CONCAT treats NULL arguments as empty strings where || yields NULL",
            );
        }
        i = start + len;
    }
}

/// `CONCAT(a, b)` -> `(a || b)`
fn concat_call_to_operator(tokens: &mut Vec<Token>, from: Dialect, out: &mut RewriteOutcome) {
    let mut i = 0;
    while i < tokens.len() {
        let open = next_sig(tokens, i).filter(|&p| matches!(tokens[p], Token::LParen));
        let (true, Some(open)) = (word_is(&tokens[i], "CONCAT"), open) else {
            i += 1;
            continue;
        };
        let Some(close) = matching_close(tokens, open) else {
            i += 1;
            continue;
        };
        let args = split_arguments(&tokens[open + 1..close]);
        if args.is_empty() {
            out.gap(IdiomKind::StringConcatenation, fragment(tokens, i, close), "CONCAT without arguments");
            i = close + 1;
            continue;
        }

        let original = fragment(tokens, i, close);
        let mut replacement = vec![Token::LParen];
        for (n, arg) in args.into_iter().enumerate() {
            if n > 0 {
                replacement.extend([space(), Token::StringConcat, space()]);
            }
            replacement.extend(arg);
        }
        replacement.push(Token::RParen);

        let len = replacement.len();
        tokens.splice(i..=close, replacement);
        out.applied = true;
        // MySQL and Snowflake CONCAT already return NULL on any NULL argument.
        if !matches!(from, Dialect::MySql | Dialect::Snowflake) {
            out.approx(
                IdiomKind::StringConcatenation,
                original,
                "|| yields NULL when an argument is NULL, CONCAT skipped it",
            );
        }
        i += len;
    }
}

// --- ROW LIMITS ---

struct LimitClause {
    start: usize,
    end: usize,
    count: Token,
    offset: Option<Token>,
}

pub fn row_limits(tokens: &mut Vec<Token>, to: Dialect) -> RewriteOutcome {
    let mut out = RewriteOutcome::default();
    if !to.supports_limit() {
        limit_to_top_or_fetch(tokens, &mut out);
    }
    if !to.supports_top() {
        top_to_limit(tokens, &mut out);
    }
    if !to.supports_fetch_first() {
        fetch_to_limit(tokens, &mut out);
    }
    out
}

fn parse_limit(tokens: &[Token], at: usize) -> Option<LimitClause> {
    let n = next_sig(tokens, at).filter(|&n| is_number(&tokens[n]))?;
    let mut clause = LimitClause {
        start: at,
        end: n,
        count: tokens[n].clone(),
        offset: None,
    };
    let after = next_sig(tokens, n);
    if let Some(comma) = after
        && matches!(tokens[comma], Token::Comma)
    {
        // MySQL: LIMIT offset, count
        let m = next_sig(tokens, comma).filter(|&m| is_number(&tokens[m]))?;
        clause.offset = Some(tokens[n].clone());
        clause.count = tokens[m].clone();
        clause.end = m;
    } else if let Some(o) = after
        && word_is(&tokens[o], "OFFSET")
    {
        let m = next_sig(tokens, o).filter(|&m| is_number(&tokens[m]))?;
        clause.offset = Some(tokens[m].clone());
        clause.end = m;
    } else if let Some(m) = prev_sig(tokens, at)
        && is_number(&tokens[m])
        && let Some(o) = prev_sig(tokens, m)
        && word_is(&tokens[o], "OFFSET")
    {
        clause.offset = Some(tokens[m].clone());
        clause.start = o;
    }
    Some(clause)
}

fn order_by_sentinel() -> Vec<Token> {
    vec![
        word("ORDER"),
        space(),
        word("BY"),
        space(),
        Token::LParen,
        word("SELECT"),
        space(),
        word("NULL"),
        Token::RParen,
        space(),
    ]
}

/// `ORDER BY (SELECT NULL)` ending right before `before`, as inserted for OFFSET/FETCH.
fn sentinel_order_by(tokens: &[Token], before: usize) -> Option<usize> {
    let close = prev_sig(tokens, before).filter(|&c| matches!(tokens[c], Token::RParen))?;
    let open = matching_open(tokens, close)?;
    if !render_compact(&tokens[open + 1..close]).eq_ignore_ascii_case("SELECT NULL") {
        return None;
    }
    let by = prev_sig(tokens, open).filter(|&b| word_is(&tokens[b], "BY"))?;
    prev_sig(tokens, by).filter(|&o| word_is(&tokens[o], "ORDER"))
}

/// `LIMIT n` -> `TOP n`; `LIMIT n OFFSET m` -> `OFFSET m ROWS FETCH NEXT n ROWS ONLY`.
fn limit_to_top_or_fetch(tokens: &mut Vec<Token>, out: &mut RewriteOutcome) {
    let mut i = 0;
    while i < tokens.len() {
        if !word_is(&tokens[i], "LIMIT") {
            i += 1;
            continue;
        }
        let Some(clause) = parse_limit(tokens, i) else {
            out.gap(IdiomKind::RowLimit, fragment(tokens, i, i + 2), "LIMIT argument is not a literal");
            i += 1;
            continue;
        };

        let scope = scope_start(tokens, clause.start);
        let words = depth0_words(tokens, scope, clause.start);
        let has_order = words.iter().any(|(_, w)| w == "ORDER");
        let select = owning_select(tokens, clause.start);

        match (clause.offset, select) {
            (None, Some(select)) if !has_set_operation(&words) => {
                let remove_from = leading_ws_start(tokens, clause.start);
                tokens.drain(remove_from..=clause.end);
                let mut at = select + 1;
                if let Some(n) = next_sig(tokens, select)
                    && (word_is(&tokens[n], "DISTINCT") || word_is(&tokens[n], "ALL"))
                {
                    at = n + 1;
                }
                tokens.splice(at..at, [space(), word("TOP"), space(), clause.count]);
                i = remove_from + 4;
            }
            (offset, _) => {
                let mut replacement = if has_order { vec![] } else { order_by_sentinel() };
                replacement.extend([
                    word("OFFSET"),
                    space(),
                    offset.unwrap_or_else(|| number("0")),
                    space(),
                    word("ROWS"),
                    space(),
                    word("FETCH"),
                    space(),
                    word("NEXT"),
                    space(),
                    clause.count,
                    space(),
                    word("ROWS"),
                    space(),
                    word("ONLY"),
                ]);
                let len = replacement.len();
                tokens.splice(clause.start..=clause.end, replacement);
                i = clause.start + len;
            }
        }
        out.applied = true;
    }
}

/// `SELECT TOP n ...` -> `SELECT ... LIMIT n`
fn top_to_limit(tokens: &mut Vec<Token>, out: &mut RewriteOutcome) {
    let mut i = 0;
    while i < tokens.len() {
        let after_select = prev_sig(tokens, i).is_some_and(|p| {
            word_is(&tokens[p], "SELECT") || word_is(&tokens[p], "DISTINCT") || word_is(&tokens[p], "ALL")
        });
        if !word_is(&tokens[i], "TOP") || !after_select {
            i += 1;
            continue;
        }

        let count = next_sig(tokens, i).and_then(|n| match &tokens[n] {
            Token::Number(..) => Some((tokens[n].clone(), n)),
            Token::LParen => {
                let close = matching_close(tokens, n)?;
                match trimmed(&tokens[n + 1..close]) {
                    [inner @ Token::Number(..)] => Some((inner.clone(), close)),
                    _ => None,
                }
            }
            _ => None,
        });
        let Some((count, end)) = count else {
            out.gap(IdiomKind::RowLimit, fragment(tokens, i, i + 2), "TOP argument is not a literal");
            i += 1;
            continue;
        };

        let follower = next_sig(tokens, end);
        let modifier = follower.is_some_and(|f| word_is(&tokens[f], "PERCENT") || word_is(&tokens[f], "WITH"));
        let scope = scope_start(tokens, i);
        let words = depth0_words(tokens, scope, scope_end(tokens, i));
        if modifier || has_set_operation(&words) {
            out.gap(
                IdiomKind::RowLimit,
                fragment(tokens, i, follower.unwrap_or(end)),
                "TOP PERCENT, WITH TIES and TOP over set operations have no LIMIT equivalent",
            );
            i = end + 1;
            continue;
        }

        tokens.drain(i..follower.unwrap_or(end + 1));
        let insert_at = leading_ws_start(tokens, scope_end(tokens, i));
        tokens.splice(insert_at..insert_at, [space(), word("LIMIT"), space(), count]);
        out.applied = true;
        i += 1;
    }
}

/// `[OFFSET m ROWS] FETCH NEXT n ROWS ONLY` -> `LIMIT n [OFFSET m]`
fn fetch_to_limit(tokens: &mut Vec<Token>, out: &mut RewriteOutcome) {
    let mut i = 0;
    while i < tokens.len() {
        if !word_is(&tokens[i], "FETCH") {
            i += 1;
            continue;
        }
        let parsed = next_sig(tokens, i)
            .filter(|&f| word_is(&tokens[f], "NEXT") || word_is(&tokens[f], "FIRST"))
            .and_then(|f| next_sig(tokens, f))
            .filter(|&n| is_number(&tokens[n]))
            .and_then(|n| {
                let rows = next_sig(tokens, n)
                    .filter(|&r| word_is(&tokens[r], "ROWS") || word_is(&tokens[r], "ROW"))?;
                let only = next_sig(tokens, rows).filter(|&o| word_is(&tokens[o], "ONLY"))?;
                Some((n, only))
            });
        let Some((n, only)) = parsed else {
            out.gap(IdiomKind::RowLimit, fragment(tokens, i, i + 5), "unsupported FETCH form");
            i += 1;
            continue;
        };

        let mut start = i;
        let mut offset = None;
        if let Some(rows) = prev_sig(tokens, i)
            && (word_is(&tokens[rows], "ROWS") || word_is(&tokens[rows], "ROW"))
            && let Some(m) = prev_sig(tokens, rows)
            && is_number(&tokens[m])
            && let Some(o) = prev_sig(tokens, m)
            && word_is(&tokens[o], "OFFSET")
        {
            start = o;
            offset = Some(tokens[m].clone());
        }
        if let Some(order) = sentinel_order_by(tokens, start) {
            start = order;
        }

        let mut replacement = vec![word("LIMIT"), space(), tokens[n].clone()];
        if let Some(offset) = offset {
            replacement.extend([space(), word("OFFSET"), space(), offset]);
        }
        let len = replacement.len();
        tokens.splice(start..=only, replacement);
        out.applied = true;
        i = start + len;
    }
}

// --- PATTERN MATCHING ---

struct PatternSite {
    start: usize,
    end: usize,
    subject: Vec<Token>,
    pattern: Vec<Token>,
    negated: bool,
    case_insensitive: bool,
    /// Snowflake REGEXP_LIKE and the DuckDB `~` operator must match the whole string.
    full_match: bool,
}

/// Normalises every regex predicate form and re-renders it for the target.
pub fn pattern_matches(tokens: &mut Vec<Token>, from: Dialect, to: Dialect) -> RewriteOutcome {
    let mut out = RewriteOutcome::default();
    if !to.supports_ilike() {
        ilike_to_like(tokens, &mut out);
    }
    let mut i = 0;
    while i < tokens.len() {
        let site = match pattern_site(tokens, i, from) {
            None => {
                i += 1;
                continue;
            }
            Some(Err(reason)) => {
                out.gap(IdiomKind::PatternMatch, fragment(tokens, i.saturating_sub(2), i + 2), reason);
                i += 1;
                continue;
            }
            Some(Ok(site)) => site,
        };

        let original = fragment(tokens, site.start, site.end);
        match render_pattern(&site, to) {
            Ok((replacement, approximation)) => {
                let len = replacement.len();
                tokens.splice(site.start..=site.end, replacement);
                out.applied = true;
                if let Some(reason) = approximation {
                    out.approx(IdiomKind::PatternMatch, original, reason);
                }
                i = site.start + len;
            }
            Err(reason) => {
                out.gap(IdiomKind::PatternMatch, original, reason);
                i = site.end + 1;
            }
        }
    }
    out
}

/// `a [NOT] ILIKE p` -> `LOWER(a) [NOT] LIKE LOWER(p)`
fn ilike_to_like(tokens: &mut Vec<Token>, out: &mut RewriteOutcome) {
    let mut i = 0;
    while i < tokens.len() {
        if !word_is(&tokens[i], "ILIKE") {
            i += 1;
            continue;
        }
        let not = prev_sig(tokens, i).filter(|&p| word_is(&tokens[p], "NOT"));
        let subject_end = not.unwrap_or(i);
        let Some((start, end)) = operand_start(tokens, subject_end).zip(operand_end(tokens, i)) else {
            out.gap(
                IdiomKind::PatternMatch,
                fragment(tokens, i.saturating_sub(2), i + 2),
                "ILIKE operands could not be delimited",
            );
            i += 1;
            continue;
        };

        let original = fragment(tokens, start, end);
        let mut replacement = call("LOWER", vec![trimmed(&tokens[start..subject_end]).to_vec()]);
        replacement.push(space());
        if not.is_some() {
            replacement.extend([word("NOT"), space()]);
        }
        replacement.extend([word("LIKE"), space()]);
        replacement.extend(call("LOWER", vec![trimmed(&tokens[i + 1..=end]).to_vec()]));

        let len = replacement.len();
        tokens.splice(start..=end, replacement);
        out.applied = true;
        out.approx(
            IdiomKind::PatternMatch,
            original,
            "ILIKE emulated with LOWER on both sides; case folding follows the target's LOWER",
        );
        i = start + len;
    }
}

fn pattern_site(tokens: &[Token], i: usize, from: Dialect) -> Option<Result<PatternSite, String>> {
    let token = &tokens[i];
    let operator = match token {
        Token::Tilde => Some((false, false)),
        Token::TildeAsterisk => Some((false, true)),
        Token::ExclamationMarkTilde => Some((true, false)),
        Token::ExclamationMarkTildeAsterisk => Some((true, true)),
        _ => None,
    };

    if let Some((negated, case_insensitive)) = operator {
        return Some(operator_site(tokens, i, i, negated, case_insensitive, from == Dialect::DuckDb));
    }

    if word_is(token, "REGEXP") || word_is(token, "RLIKE") {
        let not = prev_sig(tokens, i).filter(|&p| word_is(&tokens[p], "NOT"));
        // MySQL REGEXP follows the (case-insensitive) column collation.
        return Some(operator_site(
            tokens,
            not.unwrap_or(i),
            i,
            not.is_some(),
            from == Dialect::MySql,
            from == Dialect::Snowflake,
        ));
    }

    let name = word_upper(token)?;
    if name != "REGEXP_LIKE" && name != "REGEXP_MATCHES" {
        return None;
    }
    let open = next_sig(tokens, i).filter(|&p| matches!(tokens[p], Token::LParen))?;
    if name == "REGEXP_MATCHES" && from != Dialect::DuckDb {
        return Some(Err("regexp_matches returns a set of matches here, not a predicate".into()));
    }
    Some(call_site(tokens, i, open, from))
}

fn operator_site(
    tokens: &[Token],
    subject_end: usize,
    op: usize,
    negated: bool,
    case_insensitive: bool,
    full_match: bool,
) -> Result<PatternSite, String> {
    let start = operand_start(tokens, subject_end).ok_or("regex subject could not be delimited")?;
    let end = operand_end(tokens, op).ok_or("regex pattern could not be delimited")?;
    Ok(PatternSite {
        start,
        end,
        subject: trimmed(&tokens[start..subject_end]).to_vec(),
        pattern: trimmed(&tokens[op + 1..=end]).to_vec(),
        negated,
        case_insensitive,
        full_match,
    })
}

fn call_site(tokens: &[Token], name: usize, open: usize, from: Dialect) -> Result<PatternSite, String> {
    let close = matching_close(tokens, open).ok_or("unbalanced parentheses")?;
    let mut args = split_arguments(&tokens[open + 1..close]).into_iter();
    let (Some(subject), Some(pattern)) = (args.next(), args.next()) else {
        return Err("regex call needs a subject and a pattern".into());
    };
    let flags = args.next();
    let case_insensitive = match flags.as_deref().map(string_literal) {
        None => false,
        Some(Some(f)) => f.contains('i') && !f.contains('c'),
        Some(None) => return Err("regex flags are not a literal".into()),
    };
    let not = prev_sig(tokens, name).filter(|&p| word_is(&tokens[p], "NOT"));
    Ok(PatternSite {
        start: not.unwrap_or(name),
        end: close,
        subject,
        pattern,
        negated: not.is_some(),
        case_insensitive,
        full_match: from == Dialect::Snowflake,
    })
}

/// Rewrites a literal pattern's anchoring; non-literal patterns cannot be re-anchored safely.
fn reanchor(pattern: &[Token], prefix: &str, suffix: &str) -> Result<Vec<Token>, String> {
    let literal = string_literal(pattern).ok_or("pattern is not a literal, its anchoring cannot be changed")?;
    Ok(vec![Token::SingleQuotedString(format!("{prefix}{literal}{suffix}"))])
}

type Rendered = (Vec<Token>, Option<String>);

fn render_pattern(site: &PatternSite, to: Dialect) -> Result<Rendered, String> {
    let pattern = match (site.full_match, to == Dialect::Snowflake) {
        _ if to == Dialect::MsSql => site.pattern.clone(),
        (true, false) => reanchor(&site.pattern, "^(", ")$")?,
        (false, true) => reanchor(&site.pattern, ".*(", ").*")?,
        _ => site.pattern.clone(),
    };
    let not_prefix = |mut body: Vec<Token>| {
        if site.negated {
            body.splice(0..0, [word("NOT"), space()]);
        }
        body
    };
    let literal = |s: &str| vec![Token::SingleQuotedString(s.to_string())];

    let rendered = match to {
        Dialect::MsSql => return render_like(site),
        Dialect::Postgres => {
            let op = match (site.negated, site.case_insensitive) {
                (false, false) => Token::Tilde,
                (false, true) => Token::TildeAsterisk,
                (true, false) => Token::ExclamationMarkTilde,
                (true, true) => Token::ExclamationMarkTildeAsterisk,
            };
            let mut body = site.subject.clone();
            body.extend([space(), op, space()]);
            body.extend(pattern);
            (body, None)
        }
        Dialect::DuckDb => {
            let mut args = vec![site.subject.clone(), pattern];
            if site.case_insensitive {
                args.push(literal("i"));
            }
            (not_prefix(call("regexp_matches", args)), None)
        }
        Dialect::MySql => {
            let flags = if site.case_insensitive { "i" } else { "c" };
            (not_prefix(call("REGEXP_LIKE", vec![site.subject.clone(), pattern, literal(flags)])), None)
        }
        Dialect::Snowflake => {
            let flags = if site.case_insensitive { "is" } else { "s" };
            (not_prefix(call("REGEXP_LIKE", vec![site.subject.clone(), pattern, literal(flags)])), None)
        }
        Dialect::Sqlite => {
            if site.case_insensitive {
                return Err("SQLite REGEXP has no case-insensitive form".into());
            }
            let mut body = site.subject.clone();
            body.push(space());
            if site.negated {
                body.extend([word("NOT"), space()]);
            }
            body.extend([word("REGEXP"), space()]);
            body.extend(pattern);
            (body, Some("SQLite REGEXP needs a regexp() function registered on the connection".into()))
        }
    };
    Ok(rendered)
}

fn render_like(site: &PatternSite) -> Result<Rendered, String> {
    let literal = string_literal(&site.pattern).ok_or("no LIKE equivalent for a non-literal pattern")?;
    let anchored = if site.full_match { format!("^{literal}$") } else { literal.to_string() };
    let like = regex_to_like(&anchored).ok_or("no safe LIKE equivalent for this regular expression")?;

    let mut body = site.subject.clone();
    body.push(space());
    if site.negated {
        body.extend([word("NOT"), space()]);
    }
    body.extend([word("LIKE"), space(), Token::SingleQuotedString(like)]);
    Ok((body, Some("regex approximated with LIKE; case sensitivity follows the column collation".into())))
}

/// Converts a regex made only of literals, `.`, `.*` and anchors into a LIKE pattern.
pub fn regex_to_like(regex: &str) -> Option<String> {
    let mut body = regex;
    let anchored_start = body.starts_with('^');
    if anchored_start {
        body = &body[1..];
    }
    let anchored_end = body.ends_with('$') && !body.ends_with("\\$");
    if anchored_end {
        body = &body[..body.len() - 1];
    }

    let mut out = String::new();
    if !anchored_start {
        out.push('%');
    }
    let mut chars = body.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '.' if chars.peek() == Some(&'*') => {
                chars.next();
                out.push('%');
            }
            '.' => out.push('_'),
            '\\' => match chars.next() {
                Some(escaped) if ".$^()[]{}*+?|\\/-".contains(escaped) => push_like_literal(&mut out, escaped),
                _ => return None,
            },
            '*' | '+' | '?' | '(' | ')' | '[' | ']' | '{' | '}' | '|' | '^' | '$' => return None,
            other => push_like_literal(&mut out, other),
        }
    }
    if !anchored_end {
        out.push('%');
    }
    while out.contains("%%") {
        out = out.replace("%%", "%");
    }
    Some(out)
}

fn push_like_literal(out: &mut String, c: char) {
    match c {
        '%' => out.push_str("[%]"),
        '_' => out.push_str("[_]"),
        '[' => out.push_str("[[]"),
        other => out.push(other),
    }
}
