// warden-core/src/domain/dialect/translator.rs

use super::Dialect;
use super::rewrites;
use super::tokens::{self, next_sig, word_is};
use serde::{Deserialize, Serialize};
use sqlparser::tokenizer::Token;
use std::fmt;
use tracing::{debug, warn};

/// Families of dialect-specific syntax the translator knows how to rewrite.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IdiomKind {
    FilteredAggregate,
    IdentifierQuoting,
    StringConcatenation,
    RowLimit,
    TypeCast,
    BooleanLiteral,
    PatternMatch,
}

impl IdiomKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FilteredAggregate => "filtered_aggregate",
            Self::IdentifierQuoting => "identifier_quoting",
            Self::StringConcatenation => "string_concatenation",
            Self::RowLimit => "row_limit",
            Self::TypeCast => "type_cast",
            Self::BooleanLiteral => "boolean_literal",
            Self::PatternMatch => "pattern_match",
        }
    }
}

impl fmt::Display for IdiomKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteKind {
    /// Rewritten, but the target construct is not strictly equivalent.
    Approximated,
    /// Left as-is; the database will report it if it is really incompatible.
    Untranslated,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranslationNote {
    pub idiom: IdiomKind,
    pub kind: NoteKind,
    pub fragment: String,
    pub reason: String,
}

impl TranslationNote {
    pub fn untranslated(idiom: IdiomKind, fragment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            idiom,
            kind: NoteKind::Untranslated,
            fragment: fragment.into(),
            reason: reason.into(),
        }
    }

    pub fn approximated(idiom: IdiomKind, fragment: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            idiom,
            kind: NoteKind::Approximated,
            fragment: fragment.into(),
            reason: reason.into(),
        }
    }
}

impl fmt::Display for TranslationNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let kind = match self.kind {
            NoteKind::Approximated => "approximated",
            NoteKind::Untranslated => "untranslated",
        };
        write!(f, "[{} {}] {} ({})", kind, self.idiom, self.fragment, self.reason)
    }
}

/// Output of a translation: the SQL to run plus what happened to it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Translation {
    pub sql: String,
    pub source: Dialect,
    pub target: Dialect,
    pub applied: Vec<IdiomKind>,
    #[serde(default)]
    pub notes: Vec<TranslationNote>,
}

impl Translation {
    fn untouched(sql: &str, source: Dialect, target: Dialect) -> Self {
        Self {
            sql: sql.to_string(),
            source,
            target,
            applied: vec![],
            notes: vec![],
        }
    }

    pub fn was_rewritten(&self) -> bool {
        !self.applied.is_empty()
    }

    pub fn has_gaps(&self) -> bool {
        self.notes.iter().any(|n| n.kind == NoteKind::Untranslated)
    }
}

/// Pattern-based SQL rewriter between dialects.
///
/// Each `(source, target)` pair runs an ordered pipeline of token-level rewrites, but only
/// for the idioms the pre-check actually finds. Dialect-neutral SQL comes back byte-identical.
#[derive(Debug, Clone, Copy, Default)]
pub struct DialectTranslator;

impl DialectTranslator {
    pub fn new() -> Self {
        Self
    }

    /// `translate(sql, from, to) -> sql'`
    pub fn translate(&self, sql: &str, from: Dialect, to: Dialect) -> String {
        self.translate_with_report(sql, from, to).sql
    }

    /// Cheap pre-check: which source idioms would the target reject?
    pub fn detect_idioms(&self, sql: &str, from: Dialect, to: Dialect) -> Vec<IdiomKind> {
        if from == to {
            return vec![];
        }
        match tokens::tokenize(sql, from) {
            Ok(toks) => detect(&toks, from, to),
            Err(_) => vec![],
        }
    }

    pub fn translate_with_report(&self, sql: &str, from: Dialect, to: Dialect) -> Translation {
        if from == to {
            return Translation::untouched(sql, from, to);
        }

        let mut toks = match tokens::tokenize(sql, from) {
            Ok(t) => t,
            Err(e) => {
                warn!(source = %from, target = %to, error = %e, "untranslated idiom passed through (tokenizer)");
                let mut t = Translation::untouched(sql, from, to);
                t.notes.push(TranslationNote::untranslated(
                    IdiomKind::IdentifierQuoting,
                    sql.chars().take(60).collect::<String>(),
                    format!("query could not be tokenized: {}", e),
                ));
                return t;
            }
        };

        let idioms = detect(&toks, from, to);
        if idioms.is_empty() {
            debug!(source = %from, target = %to, "No dialect-specific idiom, query kept as-is");
            return Translation::untouched(sql, from, to);
        }

        let mut translation = Translation::untouched(sql, from, to);

        // Order matters: structural rewrites first, quoting last so copied fragments get requoted.
        for idiom in PIPELINE {
            if !idioms.contains(&idiom) {
                continue;
            }
            let outcome = match idiom {
                IdiomKind::FilteredAggregate => rewrites::filtered_aggregates(&mut toks),
                IdiomKind::TypeCast => rewrites::double_colon_casts(&mut toks, to),
                IdiomKind::BooleanLiteral => rewrites::boolean_literals(&mut toks),
                IdiomKind::StringConcatenation => rewrites::string_concatenation(&mut toks, from, to),
                IdiomKind::RowLimit => rewrites::row_limits(&mut toks, to),
                IdiomKind::PatternMatch => rewrites::pattern_matches(&mut toks, from, to),
                IdiomKind::IdentifierQuoting => rewrites::identifier_quotes(&mut toks, to),
            };
            if outcome.applied {
                translation.applied.push(idiom);
            }
            translation.notes.extend(outcome.notes);
        }

        for note in &translation.notes {
            match note.kind {
                NoteKind::Untranslated => warn!(
                    idiom = %note.idiom,
                    fragment = %note.fragment,
                    source = %from,
                    target = %to,
                    "untranslated idiom passed through: {}",
                    note.reason
                ),
                NoteKind::Approximated => debug!(idiom = %note.idiom, fragment = %note.fragment, "Approximated: {}", note.reason),
            }
        }

        translation.sql = tokens::render(&toks);
        translation
    }
}

const PIPELINE: [IdiomKind; 7] = [
    IdiomKind::FilteredAggregate,
    IdiomKind::TypeCast,
    IdiomKind::BooleanLiteral,
    IdiomKind::StringConcatenation,
    IdiomKind::RowLimit,
    IdiomKind::PatternMatch,
    IdiomKind::IdentifierQuoting,
];

fn detect(toks: &[Token], from: Dialect, to: Dialect) -> Vec<IdiomKind> {
    let mut found = Vec::new();
    let mut push = |kind: IdiomKind| {
        if !found.contains(&kind) {
            found.push(kind);
        }
    };
    let target_quote = to.identifier_quote();

    for (i, t) in toks.iter().enumerate() {
        match t {
            Token::Word(w) if w.quote_style.is_some_and(|q| q != target_quote) => {
                push(IdiomKind::IdentifierQuoting)
            }
            Token::DoubleColon if !to.supports_double_colon_cast() => push(IdiomKind::TypeCast),
            // MySQL reads || as logical OR.
            Token::StringConcat if from == Dialect::MySql || !to.supports_concat_operator() => {
                push(IdiomKind::StringConcatenation)
            }
            Token::Tilde
            | Token::TildeAsterisk
            | Token::ExclamationMarkTilde
            | Token::ExclamationMarkTildeAsterisk => push(IdiomKind::PatternMatch),
            _ if (word_is(t, "TRUE") || word_is(t, "FALSE")) && !to.supports_boolean_literals() => {
                push(IdiomKind::BooleanLiteral)
            }
            _ if word_is(t, "CONCAT") && !to.supports_concat_function() && is_call(toks, i) => {
                push(IdiomKind::StringConcatenation)
            }
            _ if word_is(t, "FILTER") && !to.supports_filter_clause() => {
                let opens_where = next_sig(toks, i)
                    .filter(|&p| matches!(toks[p], Token::LParen))
                    .and_then(|p| next_sig(toks, p))
                    .is_some_and(|w| word_is(&toks[w], "WHERE"));
                if opens_where {
                    push(IdiomKind::FilteredAggregate);
                }
            }
            _ if word_is(t, "LIMIT") && !to.supports_limit() => push(IdiomKind::RowLimit),
            _ if word_is(t, "TOP") && !to.supports_top() => push(IdiomKind::RowLimit),
            _ if word_is(t, "FETCH") && !to.supports_fetch_first() => push(IdiomKind::RowLimit),
            _ if word_is(t, "REGEXP") || word_is(t, "RLIKE") => push(IdiomKind::PatternMatch),
            _ if word_is(t, "ILIKE") && !to.supports_ilike() => push(IdiomKind::PatternMatch),
            _ if (word_is(t, "REGEXP_LIKE") || word_is(t, "REGEXP_MATCHES")) && is_call(toks, i) => {
                push(IdiomKind::PatternMatch)
            }
            _ => {}
        }
    }
    found
}

fn is_call(toks: &[Token], i: usize) -> bool {
    next_sig(toks, i).is_some_and(|p| matches!(toks[p], Token::LParen))
}
