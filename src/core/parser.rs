//! Tokenizer and operator-precedence parser for arithmetic expressions.
//!
//! Grammar, with the usual precedence and left associativity:
//!
//! ```text
//! expr   := term   (('+' | '-') term)*
//! term   := factor (('*' | '/') factor)*
//! factor := NUMBER | '(' expr ')'
//! ```
//!
//! Parsing runs over explicit operand and operator stacks, so nesting depth
//! is bounded by memory rather than the call stack. The parser only builds
//! structure; nothing is evaluated here.

use petgraph::stable_graph::NodeIndex;

use crate::core::task::Operator;
use crate::core::tree::{OperationTree, TreeBuilder};
use crate::error::ParseError;

type ParseResult<T> = std::result::Result<T, ParseError>;

#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Raw digits and dots; validated when the parser consumes it.
    Number(String),
    Op(Operator),
    LParen,
    RParen,
}

impl std::fmt::Display for Token {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Token::Number(n) => f.write_str(n),
            Token::Op(op) => write!(f, "{}", op),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

/// Split an expression into tokens.
///
/// Digits and `.` accumulate into number tokens; whitespace and the
/// characters `+ - * / ( )` end them.
pub fn tokenize(input: &str) -> ParseResult<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut number = String::new();

    for c in input.chars() {
        if c.is_ascii_digit() || c == '.' {
            number.push(c);
            continue;
        }
        if !number.is_empty() {
            tokens.push(Token::Number(std::mem::take(&mut number)));
        }
        match c {
            '(' => tokens.push(Token::LParen),
            ')' => tokens.push(Token::RParen),
            c if c.is_whitespace() => {}
            c => match Operator::from_char(c) {
                Some(op) => tokens.push(Token::Op(op)),
                None => return Err(ParseError::UnexpectedCharacter(c)),
            },
        }
    }
    if !number.is_empty() {
        tokens.push(Token::Number(number));
    }

    Ok(tokens)
}

/// Parse an expression string into an operation tree.
pub fn parse(input: &str) -> ParseResult<OperationTree> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ParseError::Empty);
    }

    let mut parser = Parser::default();
    let mut expect_operand = true;

    for (pos, token) in tokens.iter().enumerate() {
        if expect_operand {
            match token {
                Token::Number(text) => {
                    let value: f64 = text
                        .parse()
                        .map_err(|_| ParseError::InvalidNumber(text.clone()))?;
                    parser.operands.push(parser.builder.leaf(value));
                    expect_operand = false;
                }
                Token::LParen => parser.pending.push(Pending::Paren),
                token => return Err(ParseError::UnexpectedToken(token.to_string())),
            }
            continue;
        }

        match token {
            Token::Op(op) => {
                parser.reduce_while(|top| top.precedence() >= op.precedence())?;
                parser.pending.push(Pending::Op(*op));
                expect_operand = true;
            }
            Token::RParen => {
                parser.reduce_while(|_| true)?;
                if parser.pending.pop() != Some(Pending::Paren) {
                    return Err(trailing(&tokens[pos..]));
                }
            }
            _ if parser.pending.contains(&Pending::Paren) => {
                return Err(ParseError::UnclosedParenthesis);
            }
            _ => return Err(trailing(&tokens[pos..])),
        }
    }

    if expect_operand {
        return Err(ParseError::UnexpectedEnd);
    }
    parser.reduce_while(|_| true)?;
    if !parser.pending.is_empty() {
        return Err(ParseError::UnclosedParenthesis);
    }

    let root = parser.operands.pop().ok_or(ParseError::UnexpectedEnd)?;
    Ok(parser.builder.finish(root))
}

fn trailing(rest: &[Token]) -> ParseError {
    let rest: Vec<String> = rest.iter().map(Token::to_string).collect();
    ParseError::TrailingTokens(rest.join(" "))
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Pending {
    Op(Operator),
    Paren,
}

#[derive(Default)]
struct Parser {
    operands: Vec<NodeIndex>,
    pending: Vec<Pending>,
    builder: TreeBuilder,
}

impl Parser {
    /// Fold pending operators into tree nodes while `keep_going` accepts
    /// the operator on top. Stops at an open parenthesis.
    fn reduce_while(&mut self, keep_going: impl Fn(Operator) -> bool) -> ParseResult<()> {
        while let Some(&Pending::Op(op)) = self.pending.last() {
            if !keep_going(op) {
                break;
            }
            self.pending.pop();
            let right = self.operands.pop().ok_or(ParseError::UnexpectedEnd)?;
            let left = self.operands.pop().ok_or(ParseError::UnexpectedEnd)?;
            self.operands.push(self.builder.operation(op, left, right));
        }
        Ok(())
    }
}
