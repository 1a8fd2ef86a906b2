//! Tokenizer for the expression language.

use crate::error::{EvalError, EvalResult};

/// A lexical token.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    Number(f64),
    Str(String),
    Ident(String),
    True,
    False,
    Null,
    Throw,

    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Assign,
    EqEq,
    NotEq,
    Lt,
    Gt,
    Le,
    Ge,

    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    /// Statement separator: newline or `;`.
    Separator,
}

/// Tokenize a block's source text.
pub fn tokenize(source: &str) -> EvalResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\r' => {
                chars.next();
            }
            '\n' | ';' => {
                chars.next();
                if !matches!(tokens.last(), None | Some(Token::Separator)) {
                    tokens.push(Token::Separator);
                }
            }
            '/' => {
                chars.next();
                if chars.peek() == Some(&'/') {
                    while let Some(&c) = chars.peek() {
                        if c == '\n' {
                            break;
                        }
                        chars.next();
                    }
                } else {
                    tokens.push(Token::Slash);
                }
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '%' => {
                chars.next();
                tokens.push(Token::Percent);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '[' => {
                chars.next();
                tokens.push(Token::LBracket);
            }
            ']' => {
                chars.next();
                tokens.push(Token::RBracket);
            }
            ',' => {
                chars.next();
                tokens.push(Token::Comma);
            }
            '=' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::EqEq);
                } else {
                    tokens.push(Token::Assign);
                }
            }
            '!' => {
                chars.next();
                if chars.next() == Some('=') {
                    tokens.push(Token::NotEq);
                } else {
                    return Err(EvalError::Parse("expected `=` after `!`".to_string()));
                }
            }
            '<' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Le);
                } else {
                    tokens.push(Token::Lt);
                }
            }
            '>' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::Ge);
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '"' | '\'' => {
                tokens.push(Token::Str(lex_string(&mut chars)?));
            }
            c if c.is_ascii_digit() => {
                tokens.push(Token::Number(lex_number(&mut chars)?));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(match ident.as_str() {
                    "true" => Token::True,
                    "false" => Token::False,
                    "null" => Token::Null,
                    "throw" => Token::Throw,
                    _ => Token::Ident(ident),
                });
            }
            other => {
                return Err(EvalError::Parse(format!("unexpected character `{other}`")));
            }
        }
    }

    while tokens.last() == Some(&Token::Separator) {
        tokens.pop();
    }
    Ok(tokens)
}

fn lex_string(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> EvalResult<String> {
    let quote = chars.next().unwrap_or('"');
    let mut out = String::new();
    loop {
        match chars.next() {
            Some(c) if c == quote => return Ok(out),
            Some('\\') => match chars.next() {
                Some('n') => out.push('\n'),
                Some('t') => out.push('\t'),
                Some('\\') => out.push('\\'),
                Some(c) if c == quote => out.push(c),
                Some(c) => {
                    return Err(EvalError::Parse(format!("unknown escape `\\{c}`")));
                }
                None => return Err(EvalError::Parse("unterminated string".to_string())),
            },
            Some(c) => out.push(c),
            None => return Err(EvalError::Parse("unterminated string".to_string())),
        }
    }
}

fn lex_number(chars: &mut std::iter::Peekable<std::str::Chars<'_>>) -> EvalResult<f64> {
    let mut text = String::new();
    let mut seen_dot = false;
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() {
            text.push(c);
            chars.next();
        } else if c == '.' && !seen_dot {
            seen_dot = true;
            text.push(c);
            chars.next();
        } else {
            break;
        }
    }
    text.parse()
        .map_err(|_| EvalError::Parse(format!("invalid number `{text}`")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_arithmetic_tokens() {
        let tokens = tokenize("1 + 2.5 * x").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Number(1.0),
                Token::Plus,
                Token::Number(2.5),
                Token::Star,
                Token::Ident("x".to_string()),
            ]
        );
    }

    #[test]
    fn test_strings_and_escapes() {
        let tokens = tokenize(r#""a\nb" 'c'"#).unwrap();
        assert_eq!(
            tokens,
            vec![Token::Str("a\nb".to_string()), Token::Str("c".to_string())]
        );
    }

    #[test]
    fn test_separators_collapse() {
        let tokens = tokenize("a\n\n;\nb").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Ident("a".to_string()),
                Token::Separator,
                Token::Ident("b".to_string()),
            ]
        );
    }

    #[test]
    fn test_comments_are_skipped() {
        let tokens = tokenize("1 // the answer\n+ 2").unwrap();
        assert_eq!(
            tokens,
            vec![
                Token::Number(1.0),
                Token::Separator,
                Token::Plus,
                Token::Number(2.0)
            ]
        );
    }

    #[test]
    fn test_unexpected_character() {
        assert!(matches!(tokenize("1 ~ 2"), Err(EvalError::Parse(_))));
    }
}
