// warden-core/src/domain/dialect/tokens.rs

// Token-level helpers for the idiom rewrites. We only use the sqlparser *tokenizer*:
// rewrites work on the flat token stream so unknown syntax survives untouched.

use super::Dialect;
use sqlparser::tokenizer::{Token, Tokenizer, Whitespace};

/// Words that end an operand when walking outwards from a binary operator.
const BOUNDARY_WORDS: &[&str] = &[
    "SELECT", "FROM", "WHERE", "AND", "OR", "NOT", "AS", "THEN", "ELSE", "WHEN", "ON", "HAVING",
    "GROUP", "ORDER", "BY", "LIMIT", "OFFSET", "FETCH", "UNION", "EXCEPT", "INTERSECT", "IS", "IN",
    "LIKE", "ILIKE", "BETWEEN", "ASC", "DESC", "JOIN", "LEFT", "RIGHT", "INNER", "OUTER", "FULL",
    "CROSS", "SET", "VALUES", "RETURNING", "FILTER", "OVER", "REGEXP", "RLIKE", "DISTINCT", "TOP",
    "ESCAPE", "WITH",
];

pub fn tokenize(sql: &str, dialect: Dialect) -> Result<Vec<Token>, String> {
    let parser_dialect = dialect.parser_dialect();
    Tokenizer::new(parser_dialect.as_ref(), sql)
        .with_unescape(false)
        .tokenize()
        .map_err(|e| e.to_string())
}

pub fn render(tokens: &[Token]) -> String {
    tokens
        .iter()
        .filter(|t| !matches!(t, Token::EOF))
        .map(|t| t.to_string())
        .collect()
}

/// Renders a fragment on one line, for notes and logs.
pub fn render_compact(tokens: &[Token]) -> String {
    render(tokens).split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn word(value: &str) -> Token {
    Token::make_word(value, None)
}

pub fn space() -> Token {
    Token::Whitespace(Whitespace::Space)
}

pub fn number(value: impl Into<String>) -> Token {
    Token::Number(value.into(), false)
}

pub fn is_ws(token: &Token) -> bool {
    matches!(token, Token::Whitespace(_))
}

/// Unquoted word equal (case-insensitive) to `keyword`.
pub fn word_is(token: &Token, keyword: &str) -> bool {
    matches!(token, Token::Word(w) if w.quote_style.is_none() && w.value.eq_ignore_ascii_case(keyword))
}

pub fn word_upper(token: &Token) -> Option<String> {
    match token {
        Token::Word(w) if w.quote_style.is_none() => Some(w.value.to_uppercase()),
        _ => None,
    }
}

pub fn next_sig(tokens: &[Token], i: usize) -> Option<usize> {
    (i + 1..tokens.len()).find(|&j| !is_ws(&tokens[j]) && !matches!(tokens[j], Token::EOF))
}

pub fn prev_sig(tokens: &[Token], i: usize) -> Option<usize> {
    (0..i).rev().find(|&j| !is_ws(&tokens[j]))
}

pub fn matching_close(tokens: &[Token], open: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (j, t) in tokens.iter().enumerate().skip(open) {
        match t {
            Token::LParen => depth += 1,
            Token::RParen => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

pub fn matching_open(tokens: &[Token], close: usize) -> Option<usize> {
    let mut depth = 0usize;
    for j in (0..=close).rev() {
        match tokens[j] {
            Token::RParen => depth += 1,
            Token::LParen => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(j);
                }
            }
            _ => {}
        }
    }
    None
}

fn matching_case(tokens: &[Token], end: usize) -> Option<usize> {
    let mut depth = 0usize;
    for j in (0..=end).rev() {
        if word_is(&tokens[j], "END") {
            depth += 1;
        } else if word_is(&tokens[j], "CASE") {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(j);
            }
        }
    }
    None
}

fn matching_end(tokens: &[Token], case: usize) -> Option<usize> {
    let mut depth = 0usize;
    for (j, t) in tokens.iter().enumerate().skip(case) {
        if word_is(t, "CASE") {
            depth += 1;
        } else if word_is(t, "END") {
            depth = depth.checked_sub(1)?;
            if depth == 0 {
                return Some(j);
            }
        }
    }
    None
}

fn is_boundary(token: &Token) -> bool {
    match token {
        Token::Comma
        | Token::SemiColon
        | Token::LParen
        | Token::RParen
        | Token::Eq
        | Token::DoubleEq
        | Token::Neq
        | Token::Lt
        | Token::Gt
        | Token::LtEq
        | Token::GtEq
        | Token::Tilde
        | Token::TildeAsterisk
        | Token::ExclamationMarkTilde
        | Token::ExclamationMarkTildeAsterisk => true,
        Token::Word(w) if w.quote_style.is_none() => {
            BOUNDARY_WORDS.contains(&w.value.to_uppercase().as_str())
        }
        _ => false,
    }
}

/// First index of the operand ending right before the binary operator at `op`.
pub fn operand_start(tokens: &[Token], op: usize) -> Option<usize> {
    let mut cursor = op;
    let mut start = None;
    while let Some(j) = prev_sig(tokens, cursor) {
        let token = &tokens[j];
        if matches!(token, Token::RParen) {
            let open = matching_open(tokens, j)?;
            start = Some(open);
            cursor = open;
            continue;
        }
        if word_is(token, "END") {
            let case = matching_case(tokens, j)?;
            start = Some(case);
            cursor = case;
            continue;
        }
        if is_boundary(token) {
            break;
        }
        start = Some(j);
        cursor = j;
    }
    start
}

/// Last index of the operand starting right after the binary operator at `op`.
/// Stops before another `||` so concatenation chains can be split.
pub fn operand_end(tokens: &[Token], op: usize) -> Option<usize> {
    let mut cursor = op;
    let mut end = None;
    while let Some(j) = next_sig(tokens, cursor) {
        let token = &tokens[j];
        if matches!(token, Token::LParen) {
            let close = matching_close(tokens, j)?;
            end = Some(close);
            cursor = close;
            continue;
        }
        if word_is(token, "CASE") {
            let case_end = matching_end(tokens, j)?;
            end = Some(case_end);
            cursor = case_end;
            continue;
        }
        if is_boundary(token) || word_is(token, "END") || matches!(token, Token::StringConcat) {
            break;
        }
        end = Some(j);
        cursor = j;
    }
    end
}

/// Start of the primary expression (column, literal, call, parenthesised group) ending at `end`.
pub fn primary_start(tokens: &[Token], end: usize) -> Option<usize> {
    let mut start = match &tokens[end] {
        Token::RParen => {
            let open = matching_open(tokens, end)?;
            match prev_sig(tokens, open) {
                Some(name) if matches!(tokens[name], Token::Word(_)) && !is_boundary(&tokens[name]) => name,
                _ => open,
            }
        }
        _ => end,
    };
    // Compound identifiers: schema.table.column
    while let Some(dot) = prev_sig(tokens, start) {
        if !matches!(tokens[dot], Token::Period) {
            break;
        }
        match prev_sig(tokens, dot) {
            Some(part) if matches!(tokens[part], Token::Word(_)) => start = part,
            _ => break,
        }
    }
    Some(start)
}

/// Strips leading/trailing whitespace tokens of a slice.
pub fn trimmed(tokens: &[Token]) -> &[Token] {
    let start = tokens.iter().position(|t| !is_ws(t)).unwrap_or(tokens.len());
    let end = tokens.iter().rposition(|t| !is_ws(t)).map_or(start, |e| e + 1);
    &tokens[start..end.max(start)]
}

/// Splits the inside of a call on depth-0 commas.
pub fn split_arguments(tokens: &[Token]) -> Vec<Vec<Token>> {
    let mut args = Vec::new();
    let mut current = Vec::new();
    let mut depth = 0usize;
    for token in tokens {
        match token {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            Token::Comma if depth == 0 => {
                args.push(trimmed(&current).to_vec());
                current.clear();
                continue;
            }
            _ => {}
        }
        current.push(token.clone());
    }
    if !trimmed(&current).is_empty() || !args.is_empty() {
        args.push(trimmed(&current).to_vec());
    }
    args
}

/// Walks left at the same nesting depth to the `SELECT` owning the clause at `from`.
pub fn owning_select(tokens: &[Token], from: usize) -> Option<usize> {
    let mut cursor = from;
    while let Some(j) = prev_sig(tokens, cursor) {
        match &tokens[j] {
            Token::RParen => cursor = matching_open(tokens, j)?,
            Token::LParen => return None,
            t if word_is(t, "SELECT") => return Some(j),
            _ => cursor = j,
        }
    }
    None
}

/// Indices of depth-0 unquoted words in `from..to`.
pub fn depth0_words(tokens: &[Token], from: usize, to: usize) -> Vec<(usize, String)> {
    let mut depth = 0usize;
    let mut found = Vec::new();
    for (j, t) in tokens.iter().enumerate().take(to).skip(from) {
        match t {
            Token::LParen => depth += 1,
            Token::RParen => depth = depth.saturating_sub(1),
            _ if depth == 0 => {
                if let Some(upper) = word_upper(t) {
                    found.push((j, upper));
                }
            }
            _ => {}
        }
    }
    found
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_render_is_lossless() -> anyhow::Result<()> {
        let sql = "SELECT \"id\",  name -- comment\nFROM t WHERE x = 'a b'";
        let tokens = tokenize(sql, Dialect::Postgres).map_err(|e| anyhow::anyhow!(e))?;
        assert_eq!(render(&tokens), sql);
        Ok(())
    }

    #[test]
    fn test_operand_bounds_around_concat() -> anyhow::Result<()> {
        let tokens = tokenize("SELECT first_name || ' ' || upper(last_name) AS full FROM u", Dialect::Postgres)
            .map_err(|e| anyhow::anyhow!(e))?;
        let op = tokens.iter().position(|t| matches!(t, Token::StringConcat)).unwrap();
        let start = operand_start(&tokens, op).unwrap();
        assert_eq!(render(&tokens[start..op]).trim(), "first_name");
        let last_op = tokens.iter().rposition(|t| matches!(t, Token::StringConcat)).unwrap();
        let end = operand_end(&tokens, last_op).unwrap();
        assert_eq!(render(&tokens[last_op + 1..=end]).trim(), "upper(last_name)");
        Ok(())
    }

    #[test]
    fn test_split_arguments_respects_nesting() -> anyhow::Result<()> {
        let tokens = tokenize("a, f(b, c), 'x'", Dialect::Postgres).map_err(|e| anyhow::anyhow!(e))?;
        let args = split_arguments(&tokens);
        assert_eq!(args.len(), 3);
        assert_eq!(render(&args[1]), "f(b, c)");
        Ok(())
    }
}
