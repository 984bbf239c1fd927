//! Reader for the textual form of the LIR, as produced by a front end before
//! SSA construction.
//!
//! ```text
//! fn max(%a, %b) {
//! entry:
//!     br gt %a, %b, first, second
//! first:
//!     ret %a
//! second:
//!     ret %b
//! }
//! ```
//!
//! The first block of a function is its entry. Temporaries (`%name`) and
//! labels are numbered in order of appearance. `#` starts a comment.

use std::collections::BTreeMap;

use crate::{
    error::{CodegenError, ParseError, ParseErrorKind},
    middle::{
        cfg::{Block, Cfg},
        lir::{
            BinaryOperator, Condition, FunctionData, Instruction, Label, Operand, Temporary,
            Terminator, UnaryOperator,
        },
    },
};

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Identifier(String), // entry
    Temporary(String),  // %x
    Integer(i64),       // -1
    OpenParen,          // (
    CloseParen,         // )
    OpenBrace,          // {
    CloseBrace,         // }
    Comma,              // ,
    Colon,              // :
    Equals,             // =
}

impl core::fmt::Display for TokenKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenKind::Identifier(s) => write!(f, "{s}"),
            TokenKind::Temporary(s) => write!(f, "%{s}"),
            TokenKind::Integer(i) => write!(f, "{i}"),
            TokenKind::OpenParen => write!(f, "("),
            TokenKind::CloseParen => write!(f, ")"),
            TokenKind::OpenBrace => write!(f, "{{"),
            TokenKind::CloseBrace => write!(f, "}}"),
            TokenKind::Comma => write!(f, ","),
            TokenKind::Colon => write!(f, ":"),
            TokenKind::Equals => write!(f, "="),
        }
    }
}

#[derive(Debug)]
struct Line {
    number: usize,
    tokens: Vec<TokenKind>,
}

fn is_word_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '.'
}

fn tokenize(number: usize, text: &str) -> Result<Line, CodegenError> {
    let text = text.split('#').next().unwrap_or_default();
    let mut tokens = Vec::new();
    let mut chars = text.char_indices().peekable();

    while let Some((start, c)) = chars.next() {
        let kind = match c {
            c if c.is_whitespace() => continue,
            '(' => TokenKind::OpenParen,
            ')' => TokenKind::CloseParen,
            '{' => TokenKind::OpenBrace,
            '}' => TokenKind::CloseBrace,
            ',' => TokenKind::Comma,
            ':' => TokenKind::Colon,
            '=' => TokenKind::Equals,
            '"' => return Err(CodegenError::unsupported("string literal")),
            '%' => {
                let mut end = start + 1;
                while let Some((i, c)) = chars.peek().copied() {
                    if !is_word_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                if end == start + 1 {
                    return Err(error(number, "temporary name", "%"));
                }
                TokenKind::Temporary(text[start + 1..end].to_owned())
            }
            c if c == '-' || c.is_ascii_digit() => {
                let mut end = start + c.len_utf8();
                while let Some((i, c)) = chars.peek().copied() {
                    if !is_word_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                let literal = &text[start..end];
                if literal.contains('.') {
                    return Err(CodegenError::unsupported("float literal"));
                }
                let value = literal
                    .parse()
                    .map_err(|_| error(number, "integer literal", literal))?;
                TokenKind::Integer(value)
            }
            c if is_word_char(c) => {
                let mut end = start + c.len_utf8();
                while let Some((i, c)) = chars.peek().copied() {
                    if !is_word_char(c) {
                        break;
                    }
                    end = i + c.len_utf8();
                    chars.next();
                }
                TokenKind::Identifier(text[start..end].to_owned())
            }
            other => return Err(error(number, "token", &other.to_string())),
        };
        tokens.push(kind);
    }

    Ok(Line { number, tokens })
}

fn error(line: usize, expected: &'static str, found: &str) -> CodegenError {
    ParseError {
        line,
        kind: ParseErrorKind::Expected {
            expected,
            found: found.to_owned(),
        },
    }
    .into()
}

/// Walks the tokens of one line
struct Cursor<'a> {
    line: &'a Line,
    position: usize,
}

impl<'a> Cursor<'a> {
    fn new(line: &'a Line) -> Self {
        Self { line, position: 0 }
    }

    fn peek(&self) -> Option<&'a TokenKind> {
        self.line.tokens.get(self.position)
    }

    fn next(&mut self, expecting: &'static str) -> Result<&'a TokenKind, CodegenError> {
        let token = self
            .line
            .tokens
            .get(self.position)
            .ok_or_else(|| error(self.line.number, expecting, "end of line"))?;
        self.position += 1;
        Ok(token)
    }

    fn expect(&mut self, kind: TokenKind, expecting: &'static str) -> Result<(), CodegenError> {
        let token = self.next(expecting)?;
        if *token != kind {
            return Err(error(self.line.number, expecting, &token.to_string()));
        }
        Ok(())
    }

    fn identifier(&mut self, expecting: &'static str) -> Result<&'a str, CodegenError> {
        match self.next(expecting)? {
            TokenKind::Identifier(name) => Ok(name),
            other => Err(error(self.line.number, expecting, &other.to_string())),
        }
    }

    fn temporary_name(&mut self) -> Result<&'a str, CodegenError> {
        match self.next("temporary")? {
            TokenKind::Temporary(name) => Ok(name),
            other => Err(error(self.line.number, "temporary", &other.to_string())),
        }
    }

    fn integer(&mut self) -> Result<i64, CodegenError> {
        match self.next("integer")? {
            TokenKind::Integer(value) => Ok(*value),
            other => Err(error(self.line.number, "integer", &other.to_string())),
        }
    }

    fn finish(&self) -> Result<(), CodegenError> {
        match self.peek() {
            None => Ok(()),
            Some(token) => Err(error(self.line.number, "end of line", &token.to_string())),
        }
    }
}

struct FunctionParser<'a> {
    function: FunctionData,
    temporaries: BTreeMap<&'a str, Temporary>,
    labels: BTreeMap<&'a str, Label>,
}

impl<'a> FunctionParser<'a> {
    fn temporary(&mut self, name: &'a str) -> Temporary {
        if let Some(t) = self.temporaries.get(name) {
            return *t;
        }
        let t = self.function.fresh_temporary();
        self.temporaries.insert(name, t);
        t
    }

    fn label(&self, cursor: &mut Cursor<'a>) -> Result<Label, CodegenError> {
        let name = cursor.identifier("label")?;
        self.labels.get(name).copied().ok_or_else(|| {
            ParseError {
                line: cursor.line.number,
                kind: ParseErrorKind::UndefinedLabel(name.to_owned()),
            }
            .into()
        })
    }

    fn operand(&mut self, cursor: &mut Cursor<'a>) -> Result<Operand, CodegenError> {
        match cursor.next("operand")? {
            TokenKind::Temporary(name) => Ok(Operand::Temporary(self.temporary(name))),
            TokenKind::Integer(value) => Ok(Operand::Immediate(*value)),
            other => Err(error(cursor.line.number, "operand", &other.to_string())),
        }
    }

    fn condition(cursor: &mut Cursor<'a>) -> Result<Condition, CodegenError> {
        let name = cursor.identifier("condition")?;
        name.parse().map_err(|_| {
            ParseError {
                line: cursor.line.number,
                kind: ParseErrorKind::UnknownCondition(name.to_owned()),
            }
            .into()
        })
    }

    /// `%d = op ...`
    fn instruction(&mut self, cursor: &mut Cursor<'a>) -> Result<Instruction, CodegenError> {
        let destination = Operand::Temporary({
            let name = cursor.temporary_name()?;
            self.temporary(name)
        });
        cursor.expect(TokenKind::Equals, "`=`")?;
        let mnemonic = cursor.identifier("instruction")?;

        let instruction = match mnemonic {
            "li" => Instruction::LoadImmediate {
                destination,
                value: cursor.integer()?,
            },
            "mv" => Instruction::Move {
                destination,
                source: self.operand(cursor)?,
            },
            "call" => return Err(CodegenError::unsupported("function call")),
            _ => {
                if let Ok(operator) = mnemonic.parse::<UnaryOperator>() {
                    Instruction::UnaryOperation {
                        operator,
                        destination,
                        operand: self.operand(cursor)?,
                    }
                } else if let Ok(operator) = mnemonic.parse::<BinaryOperator>() {
                    let lhs = self.operand(cursor)?;
                    cursor.expect(TokenKind::Comma, "`,`")?;
                    let rhs = self.operand(cursor)?;
                    Instruction::BinaryOperation {
                        operator,
                        destination,
                        lhs,
                        rhs,
                    }
                } else {
                    return Err(ParseError {
                        line: cursor.line.number,
                        kind: ParseErrorKind::UnknownInstruction(mnemonic.to_owned()),
                    }
                    .into());
                }
            }
        };

        cursor.finish()?;
        Ok(instruction)
    }

    fn terminator(
        &mut self,
        mnemonic: &str,
        cursor: &mut Cursor<'a>,
    ) -> Result<Terminator, CodegenError> {
        let terminator = match mnemonic {
            "ret" => Terminator::Return {
                value: match cursor.peek() {
                    Some(_) => Some(self.operand(cursor)?),
                    None => None,
                },
            },
            "jmp" => Terminator::Jump {
                destination: self.label(cursor)?,
            },
            "br" => {
                let condition = Self::condition(cursor)?;
                let lhs = self.operand(cursor)?;
                cursor.expect(TokenKind::Comma, "`,`")?;
                let rhs = self.operand(cursor)?;
                cursor.expect(TokenKind::Comma, "`,`")?;
                let positive = self.label(cursor)?;
                cursor.expect(TokenKind::Comma, "`,`")?;
                let negative = self.label(cursor)?;
                Terminator::Branch {
                    condition,
                    lhs,
                    rhs,
                    positive,
                    negative,
                }
            }
            _ => unreachable!("only called for terminator mnemonics"),
        };

        cursor.finish()?;
        Ok(terminator)
    }
}

fn is_label_definition(line: &Line) -> Option<&str> {
    match line.tokens.as_slice() {
        [TokenKind::Identifier(name), TokenKind::Colon] => Some(name),
        _ => None,
    }
}

/// Parses `fn name(...) { ... }` starting at `lines[0]`. Returns the function
/// and the number of lines consumed.
fn parse_function_at(lines: &[Line]) -> Result<((Cfg, FunctionData), usize), CodegenError> {
    let header = &lines[0];
    let mut cursor = Cursor::new(header);
    if cursor.identifier("`fn`")? != "fn" {
        return Err(error(header.number, "`fn`", &header.tokens[0].to_string()));
    }
    let name = cursor.identifier("function name")?;

    let mut parser = FunctionParser {
        function: FunctionData::new(name),
        temporaries: BTreeMap::new(),
        labels: BTreeMap::new(),
    };

    cursor.expect(TokenKind::OpenParen, "`(`")?;
    if cursor.peek() != Some(&TokenKind::CloseParen) {
        loop {
            let parameter = cursor.temporary_name()?;
            let t = parser.temporary(parameter);
            parser.function.parameters.push(t);
            match cursor.next("`,` or `)`")? {
                TokenKind::Comma => continue,
                TokenKind::CloseParen => break,
                other => return Err(error(header.number, "`,` or `)`", &other.to_string())),
            }
        }
    } else {
        cursor.next("`)`")?;
    }
    cursor.expect(TokenKind::OpenBrace, "`{`")?;
    cursor.finish()?;

    let Some(body_length) = lines[1..]
        .iter()
        .position(|l| l.tokens == [TokenKind::CloseBrace])
    else {
        return Err(ParseError {
            line: lines.last().map_or(header.number, |l| l.number),
            kind: ParseErrorKind::UnexpectedEof,
        }
        .into());
    };
    let body = &lines[1..=body_length];

    // Labels may be referenced before they are defined
    for line in body {
        if let Some(name) = is_label_definition(line) {
            if parser.labels.contains_key(name) {
                return Err(ParseError {
                    line: line.number,
                    kind: ParseErrorKind::DuplicateLabel(name.to_owned()),
                }
                .into());
            }
            let label = parser.function.fresh_label();
            parser.labels.insert(name, label);
        }
    }

    let mut blocks = Vec::new();
    let mut current: Option<(Label, &str, Vec<Instruction>)> = None;

    for line in body {
        if let Some(name) = is_label_definition(line) {
            if let Some((_, open, _)) = current {
                return Err(ParseError {
                    line: line.number,
                    kind: ParseErrorKind::MissingTerminator(open.to_owned()),
                }
                .into());
            }
            current = Some((parser.labels[name], name, Vec::new()));
            continue;
        }

        let Some((label, _, instructions)) = current.as_mut() else {
            return Err(ParseError {
                line: line.number,
                kind: ParseErrorKind::OutsideBlock,
            }
            .into());
        };

        let mut cursor = Cursor::new(line);
        match cursor.peek() {
            Some(TokenKind::Identifier(mnemonic))
                if matches!(mnemonic.as_str(), "ret" | "jmp" | "br") =>
            {
                cursor.next("terminator")?;
                let terminator = parser.terminator(mnemonic, &mut cursor)?;
                blocks.push(Block::new(*label, std::mem::take(instructions), terminator));
                current = None;
            }
            _ => {
                let instruction = parser.instruction(&mut cursor)?;
                instructions.push(instruction);
            }
        }
    }

    if let Some((_, open, _)) = current {
        return Err(ParseError {
            line: lines[body_length + 1].number,
            kind: ParseErrorKind::MissingTerminator(open.to_owned()),
        }
        .into());
    }

    let Some(entry) = blocks.first().map(Block::label) else {
        return Err(error(header.number, "at least one block", "`}`"));
    };

    let mut cfg = Cfg::new(entry, parser.function.end_label());
    for block in blocks {
        cfg.add_block(block);
    }

    Ok(((cfg, parser.function), body_length + 2))
}

/// Parses every function of `source`
pub fn parse_module(source: &str) -> Result<Vec<(Cfg, FunctionData)>, CodegenError> {
    let lines = source
        .lines()
        .enumerate()
        .map(|(i, text)| tokenize(i + 1, text))
        .filter(|line| !matches!(line, Ok(line) if line.tokens.is_empty()))
        .collect::<Result<Vec<_>, _>>()?;

    let mut functions = Vec::new();
    let mut position = 0;
    while position < lines.len() {
        let (function, consumed) = parse_function_at(&lines[position..])?;
        functions.push(function);
        position += consumed;
    }

    Ok(functions)
}

/// Parses a source holding exactly one function
pub fn parse_function(source: &str) -> Result<(Cfg, FunctionData), CodegenError> {
    let mut functions = parse_module(source)?;
    match functions.len() {
        1 => Ok(functions.remove(0)),
        0 => Err(ParseError {
            line: 1,
            kind: ParseErrorKind::UnexpectedEof,
        }
        .into()),
        _ => Err(error(1, "a single function", "several")),
    }
}

#[cfg(test)]
mod tests {
    use indoc::indoc;

    use super::*;

    #[test]
    fn parses_blocks_and_parameters() {
        let (cfg, function) = parse_function(indoc! {"
            # absolute value
            fn abs(%x) {
            entry:
                br lt %x, 0, negative, done
            negative:
                %x = neg %x
                jmp done
            done:
                ret %x
            }
        "})
        .unwrap();

        assert_eq!(function.symbol_name, "abs");
        assert_eq!(function.parameters.len(), 1);
        assert_eq!(function.temporary_count(), 1);
        assert_eq!(cfg.len(), 3);
        assert_eq!(cfg.entry(), cfg.labels()[0]);
        assert_eq!(cfg.block(cfg.labels()[1]).instructions.len(), 1);
        cfg.verify();
    }

    #[test]
    fn several_functions() {
        let functions = parse_module(indoc! {"
            fn a() {
            entry:
                ret 1
            }

            fn b() {
            entry:
                ret 2
            }
        "})
        .unwrap();

        assert_eq!(functions.len(), 2);
        assert_eq!(functions[1].1.symbol_name, "b");
    }

    #[test]
    fn float_literals_are_unsupported() {
        let error = parse_function(indoc! {"
            fn f() {
            entry:
                %x = li 1.5
                ret %x
            }
        "})
        .unwrap_err();

        assert!(matches!(
            error,
            CodegenError::Unsupported { ref construct } if construct == "float literal"
        ));
    }

    #[test]
    fn calls_are_unsupported() {
        let error = parse_function(indoc! {"
            fn f() {
            entry:
                %x = call g
                ret %x
            }
        "})
        .unwrap_err();

        assert!(matches!(error, CodegenError::Unsupported { .. }));
    }

    #[test]
    fn missing_terminator() {
        let error = parse_function(indoc! {"
            fn f() {
            entry:
                %x = li 1
            next:
                ret %x
            }
        "})
        .unwrap_err();

        assert!(matches!(
            error,
            CodegenError::Parse(ParseError {
                line: 4,
                kind: ParseErrorKind::MissingTerminator(_)
            })
        ));
    }

    #[test]
    fn undefined_label() {
        let error = parse_function(indoc! {"
            fn f() {
            entry:
                jmp nowhere
            }
        "})
        .unwrap_err();

        assert!(matches!(
            error,
            CodegenError::Parse(ParseError {
                kind: ParseErrorKind::UndefinedLabel(_),
                ..
            })
        ));
    }
}
