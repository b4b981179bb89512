// ============================================================================
// Criteria String Parser
// ============================================================================
//
// Converts a human-readable filter string (`FirstName = 'aa' and Surname =
// 'abc'`) into a Criteria tree. Values may be single-quoted or bare words.
// Unparenthesized AND/OR chains group right-associatively as encountered:
// `A and B and C` parses as `A AND (B AND C)`.
//
// ============================================================================

use super::{Criteria, Operator};
use crate::core::{OrmError, Result, Value};

#[derive(Debug, Clone, PartialEq)]
enum Token {
    OpenParen,
    CloseParen,
    And,
    Or,
    Op(Operator),
    Word(String),
    Quoted(String),
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let chars: Vec<char> = input.chars().collect();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push(Token::OpenParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::CloseParen);
                i += 1;
            }
            '\'' => {
                let mut literal = String::new();
                i += 1;
                loop {
                    if i >= chars.len() {
                        return Err(OrmError::Parse(format!(
                            "Unterminated quoted value in '{}'",
                            input
                        )));
                    }
                    // Doubled quote escapes a quote inside the literal.
                    if chars[i] == '\'' {
                        if i + 1 < chars.len() && chars[i + 1] == '\'' {
                            literal.push('\'');
                            i += 2;
                            continue;
                        }
                        i += 1;
                        break;
                    }
                    literal.push(chars[i]);
                    i += 1;
                }
                tokens.push(Token::Quoted(literal));
            }
            '=' => {
                tokens.push(Token::Op(Operator::Eq));
                i += 1;
            }
            '<' | '>' | '!' => {
                let mut symbol = String::from(c);
                if i + 1 < chars.len() && (chars[i + 1] == '=' || (c == '<' && chars[i + 1] == '>'))
                {
                    symbol.push(chars[i + 1]);
                    i += 1;
                }
                tokens.push(Token::Op(Operator::from_symbol(&symbol)?));
                i += 1;
            }
            _ => {
                let mut word = String::new();
                while i < chars.len()
                    && !chars[i].is_whitespace()
                    && !"()='<>!".contains(chars[i])
                {
                    word.push(chars[i]);
                    i += 1;
                }
                match word.to_ascii_uppercase().as_str() {
                    "AND" => tokens.push(Token::And),
                    "OR" => tokens.push(Token::Or),
                    "LIKE" => tokens.push(Token::Op(Operator::Like)),
                    _ => tokens.push(Token::Word(word)),
                }
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // expr := term ((AND | OR) expr)?
    //
    // Recursing on the tail is what makes chains right-associative.
    fn expr(&mut self) -> Result<Criteria> {
        let left = self.term()?;
        match self.peek() {
            Some(Token::And) => {
                self.pos += 1;
                let right = self.expr()?;
                Ok(left.and(right))
            }
            Some(Token::Or) => {
                self.pos += 1;
                let right = self.expr()?;
                Ok(left.or(right))
            }
            _ => Ok(left),
        }
    }

    // term := '(' expr ')' | leaf
    fn term(&mut self) -> Result<Criteria> {
        if self.peek() == Some(&Token::OpenParen) {
            self.pos += 1;
            let inner = self.expr()?;
            match self.next() {
                Some(Token::CloseParen) => Ok(inner),
                _ => Err(OrmError::Parse("Expected ')'".into())),
            }
        } else {
            self.leaf()
        }
    }

    // leaf := prop op value
    fn leaf(&mut self) -> Result<Criteria> {
        let prop = match self.next() {
            Some(Token::Word(w)) => w,
            other => {
                return Err(OrmError::Parse(format!(
                    "Expected a property name, found {:?}",
                    other
                )));
            }
        };
        let op = match self.next() {
            Some(Token::Op(op)) => op,
            other => {
                return Err(OrmError::Parse(format!(
                    "Expected an operator after '{}', found {:?}",
                    prop, other
                )));
            }
        };
        let value = match self.next() {
            Some(Token::Quoted(s)) => Value::Text(s),
            Some(Token::Word(w)) => {
                if w.eq_ignore_ascii_case("null") {
                    Value::Null
                } else {
                    Value::Text(w)
                }
            }
            other => {
                return Err(OrmError::Parse(format!(
                    "Expected a value after '{} {}', found {:?}",
                    prop,
                    op.symbol(),
                    other
                )));
            }
        };
        Ok(Criteria::Leaf { prop, op, value })
    }
}

pub fn parse(input: &str) -> Result<Criteria> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(OrmError::Parse("Empty criteria string".into()));
    }
    let mut parser = Parser { tokens, pos: 0 };
    let criteria = parser.expr()?;
    if parser.pos != parser.tokens.len() {
        return Err(OrmError::Parse(format!(
            "Unexpected trailing tokens in '{}'",
            input
        )));
    }
    Ok(criteria)
}
