//! Tokenizer for template expressions.

use super::ExprError;

#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Tok {
    Int(i64),
    Float(f64),
    Str(String),
    Ident(String),
    Op(&'static str),
    LParen,
    RParen,
    LBracket,
    RBracket,
    LBrace,
    RBrace,
    Comma,
    Colon,
    Dot,
    Pipe,
    Assign,
    Eof,
}

impl Tok {
    pub(crate) fn describe(&self) -> String {
        match self {
            Tok::Int(i) => i.to_string(),
            Tok::Float(f) => f.to_string(),
            Tok::Str(s) => format!("{s:?}"),
            Tok::Ident(name) => format!("`{name}`"),
            Tok::Op(op) => format!("`{op}`"),
            Tok::LParen => "`(`".into(),
            Tok::RParen => "`)`".into(),
            Tok::LBracket => "`[`".into(),
            Tok::RBracket => "`]`".into(),
            Tok::LBrace => "`{`".into(),
            Tok::RBrace => "`}`".into(),
            Tok::Comma => "`,`".into(),
            Tok::Colon => "`:`".into(),
            Tok::Dot => "`.`".into(),
            Tok::Pipe => "`|`".into(),
            Tok::Assign => "`=`".into(),
            Tok::Eof => "end of expression".into(),
        }
    }
}

/// A token and the char offset it starts at.
pub(crate) type Spanned = (Tok, usize);

const TWO_CHAR_OPS: &[&str] = &["==", "!=", "<=", ">=", "//"];

pub(crate) fn lex(source: &str) -> Result<Vec<Spanned>, ExprError> {
    let chars: Vec<char> = source.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '_') {
                i += 1;
            }
            let is_float = i + 1 < chars.len() && chars[i] == '.' && chars[i + 1].is_ascii_digit();
            if is_float {
                i += 1;
                while i < chars.len() && chars[i].is_ascii_digit() {
                    i += 1;
                }
            }
            let text: String = chars[start..i].iter().filter(|c| **c != '_').collect();
            let tok = if is_float {
                text.parse()
                    .map(Tok::Float)
                    .map_err(|_| ExprError::new(format!("invalid number `{text}`"), start))?
            } else {
                text.parse()
                    .map(Tok::Int)
                    .map_err(|_| ExprError::new(format!("integer `{text}` is too large"), start))?
            };
            tokens.push((tok, start));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            tokens.push((Tok::Ident(chars[start..i].iter().collect()), start));
            continue;
        }

        if c == '"' || c == '\'' {
            let (text, end) = lex_string(&chars, i)?;
            tokens.push((Tok::Str(text), start));
            i = end;
            continue;
        }

        let pair: String = chars[i..chars.len().min(i + 2)].iter().collect();
        if let Some(op) = TWO_CHAR_OPS.iter().find(|op| **op == pair) {
            tokens.push((Tok::Op(*op), start));
            i += 2;
            continue;
        }

        let tok = match c {
            '(' => Tok::LParen,
            ')' => Tok::RParen,
            '[' => Tok::LBracket,
            ']' => Tok::RBracket,
            '{' => Tok::LBrace,
            '}' => Tok::RBrace,
            ',' => Tok::Comma,
            ':' => Tok::Colon,
            '.' => Tok::Dot,
            '|' => Tok::Pipe,
            '=' => Tok::Assign,
            '+' => Tok::Op("+"),
            '-' => Tok::Op("-"),
            '*' => Tok::Op("*"),
            '/' => Tok::Op("/"),
            '%' => Tok::Op("%"),
            '~' => Tok::Op("~"),
            '<' => Tok::Op("<"),
            '>' => Tok::Op(">"),
            other => {
                return Err(ExprError::new(
                    format!("unexpected character {other:?}"),
                    start,
                ))
            }
        };
        tokens.push((tok, start));
        i += 1;
    }

    tokens.push((Tok::Eof, chars.len()));
    Ok(tokens)
}

/// Lexes a quoted string starting at `start`, returning its value and the
/// index just past the closing quote.
fn lex_string(chars: &[char], start: usize) -> Result<(String, usize), ExprError> {
    let quote = chars[start];
    let mut out = String::new();
    let mut i = start + 1;

    while i < chars.len() {
        match chars[i] {
            '\\' if i + 1 < chars.len() => {
                out.push(match chars[i + 1] {
                    'n' => '\n',
                    't' => '\t',
                    'r' => '\r',
                    '0' => '\0',
                    other => other,
                });
                i += 2;
            }
            c if c == quote => return Ok((out, i + 1)),
            c => {
                out.push(c);
                i += 1;
            }
        }
    }
    Err(ExprError::new("unterminated string literal", start))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn toks(source: &str) -> Vec<Tok> {
        lex(source).unwrap().into_iter().map(|(t, _)| t).collect()
    }

    #[test]
    fn numbers() {
        assert_eq!(
            toks("1 2.5 1_000"),
            vec![Tok::Int(1), Tok::Float(2.5), Tok::Int(1000), Tok::Eof]
        );
    }

    #[test]
    fn attribute_after_int_is_not_float() {
        assert_eq!(
            toks("items.0"),
            vec![
                Tok::Ident("items".into()),
                Tok::Dot,
                Tok::Int(0),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn strings_with_escapes() {
        assert_eq!(
            toks(r#"'it\'s' "a\nb""#),
            vec![Tok::Str("it's".into()), Tok::Str("a\nb".into()), Tok::Eof]
        );
    }

    #[test]
    fn operators() {
        assert_eq!(
            toks("a == b // c != d"),
            vec![
                Tok::Ident("a".into()),
                Tok::Op("=="),
                Tok::Ident("b".into()),
                Tok::Op("//"),
                Tok::Ident("c".into()),
                Tok::Op("!="),
                Tok::Ident("d".into()),
                Tok::Eof
            ]
        );
    }

    #[test]
    fn unterminated_string() {
        let err = lex("'abc").unwrap_err();
        assert_eq!(err.offset, 0);
    }

    #[test]
    fn unexpected_character() {
        assert!(lex("a $ b").is_err());
    }
}
