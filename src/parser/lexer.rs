use std::fmt;

use logos::Logos;

use crate::error::ParseError;

#[derive(Logos, Debug, Clone, PartialEq)]
pub enum Token {
    #[regex(r"[ \t\r\f]+", logos::skip)]
    Whitespace,

    #[regex(r"#[^\n]*", logos::skip)]
    Comment,

    #[token("\n")]
    Newline,

    #[token("function")]
    Function,

    #[token("if")]
    If,

    #[token("else")]
    Else,

    #[token("while")]
    While,

    #[token("break")]
    Break,

    #[token("next")]
    Next,

    #[token("TRUE")]
    True,

    #[token("FALSE")]
    False,

    #[token("NULL")]
    Null,

    #[regex(r"[0-9]+(\.[0-9]+)?", |lex| lex.slice().parse::<f64>().ok())]
    Number(f64),

    #[regex(r#""([^"\\\n]|\\.)*""#, |lex| unescape(lex.slice()))]
    Str(String),

    #[regex(r"[A-Za-z_.][A-Za-z0-9_.]*", |lex| lex.slice().to_string())]
    Ident(String),

    #[token("<-")]
    Arrow,

    #[token("=")]
    Equals,

    #[token("==")]
    EqEq,

    #[token("!=")]
    NotEq,

    #[token("<")]
    Lt,

    #[token(">")]
    Gt,

    #[token("<=")]
    Le,

    #[token(">=")]
    Ge,

    #[token("&&")]
    AndAnd,

    #[token("||")]
    OrOr,

    #[token("!")]
    Bang,

    #[token("+")]
    Plus,

    #[token("-")]
    Minus,

    #[token("*")]
    Star,

    #[token("/")]
    Slash,

    #[token("(")]
    LParen,

    #[token(")")]
    RParen,

    #[token("{")]
    LBrace,

    #[token("}")]
    RBrace,

    #[token(",")]
    Comma,

    #[token(";")]
    Semicolon,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Token::Whitespace | Token::Comment => "",
            Token::Newline => "newline",
            Token::Function => "function",
            Token::If => "if",
            Token::Else => "else",
            Token::While => "while",
            Token::Break => "break",
            Token::Next => "next",
            Token::True => "TRUE",
            Token::False => "FALSE",
            Token::Null => "NULL",
            Token::Number(n) => return write!(f, "{}", n),
            Token::Str(s) => return write!(f, "\"{}\"", s),
            Token::Ident(name) => return write!(f, "{}", name),
            Token::Arrow => "<-",
            Token::Equals => "=",
            Token::EqEq => "==",
            Token::NotEq => "!=",
            Token::Lt => "<",
            Token::Gt => ">",
            Token::Le => "<=",
            Token::Ge => ">=",
            Token::AndAnd => "&&",
            Token::OrOr => "||",
            Token::Bang => "!",
            Token::Plus => "+",
            Token::Minus => "-",
            Token::Star => "*",
            Token::Slash => "/",
            Token::LParen => "(",
            Token::RParen => ")",
            Token::LBrace => "{",
            Token::RBrace => "}",
            Token::Comma => ",",
            Token::Semicolon => ";",
        };
        f.write_str(text)
    }
}

/// A token together with the 1-based line it starts on.
#[derive(Debug, Clone)]
pub struct Spanned {
    pub token: Token,
    pub line: u32,
}

fn unescape(slice: &str) -> Option<String> {
    let inner = &slice[1..slice.len() - 1];
    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            out.push(ch);
            continue;
        }
        match chars.next()? {
            'n' => out.push('\n'),
            't' => out.push('\t'),
            '\\' => out.push('\\'),
            '"' => out.push('"'),
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Some(out)
}

pub fn tokenize(text: &str) -> Result<Vec<Spanned>, ParseError> {
    let mut tokens = Vec::new();
    let mut lexer = Token::lexer(text);
    let mut line = 1u32;
    let mut cursor = 0usize;

    while let Some(result) = lexer.next() {
        let span = lexer.span();
        line += text[cursor..span.start].matches('\n').count() as u32;
        cursor = span.start;
        match result {
            Ok(token) => tokens.push(Spanned { token, line }),
            Err(()) => return Err(ParseError::InvalidToken { line }),
        }
    }

    Ok(tokens)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn kinds(text: &str) -> Vec<Token> {
        tokenize(text)
            .unwrap()
            .into_iter()
            .map(|s| s.token)
            .collect()
    }

    #[test]
    fn test_keywords_win_over_identifiers() {
        assert_eq!(
            kinds("function functional"),
            vec![Token::Function, Token::Ident("functional".into())]
        );
    }

    #[test]
    fn test_arrow_is_one_token() {
        assert_eq!(
            kinds("x <- 1"),
            vec![Token::Ident("x".into()), Token::Arrow, Token::Number(1.0)]
        );
    }

    #[test]
    fn test_lines_and_comments() {
        let tokens = tokenize("a # note\n\nb").unwrap();
        let lines: Vec<u32> = tokens.iter().map(|s| s.line).collect();
        assert_eq!(lines, vec![1, 1, 2, 3]);
    }

    #[test]
    fn test_string_escapes() {
        assert_eq!(
            kinds(r#""a\"b\n""#),
            vec![Token::Str("a\"b\n".into())]
        );
    }

    #[test]
    fn test_invalid_token_reports_line() {
        assert_eq!(
            tokenize("x\n@").unwrap_err(),
            ParseError::InvalidToken { line: 2 }
        );
    }
}
