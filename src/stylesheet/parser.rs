//! CSS parser producing a [`Stylesheet`] tree
//!
//! Tokenization is done by `cssparser`. Only the structure the sprite pipeline needs is
//! recovered: rules, at-rules (with or without a block), declarations and comments.
//! Selector, prelude and value text is sliced from the input verbatim.

use super::{Declaration, Location, NodeId, NodeKind, Stylesheet};
use cssparser::{
    parse_important, BasicParseErrorKind, Delimiter, ParseErrorKind, Parser, ParserInput,
    SourceLocation, Token,
};
use std::path::PathBuf;

type CssError<'i> = cssparser::ParseError<'i, ParseError>;

/// Error type for stylesheet parsing failures
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[non_exhaustive]
pub enum ParseError {
    /// A `{` block was never closed
    #[error("unclosed block starting at {0}")]
    UnclosedBlock(Location),
    /// A comment was never closed
    #[error("unclosed comment starting at {0}")]
    UnclosedComment(Location),
    /// A string broken by a newline
    #[error("unclosed string at {0}")]
    UnclosedString(Location),
    /// A `}` without a matching `{`
    #[error("unexpected '}}' at {0}")]
    UnexpectedClose(Location),
    /// Something that is neither a rule nor a `property: value` declaration
    #[error("invalid declaration `{text}` at {location}")]
    InvalidDeclaration { text: String, location: Location },
    /// Any other tokenizer failure
    #[error("{message} at {location}")]
    Syntax { message: String, location: Location },
}

impl From<SourceLocation> for Location {
    fn from(location: SourceLocation) -> Self {
        // cssparser lines are 0-based, columns 1-based
        Self { line: location.line as usize + 1, column: location.column as usize }
    }
}

impl From<CssError<'_>> for ParseError {
    fn from(error: CssError<'_>) -> Self {
        let location = Location::from(error.location);
        match error.kind {
            ParseErrorKind::Custom(error) => error,
            ParseErrorKind::Basic(BasicParseErrorKind::EndOfInput) => {
                ParseError::Syntax { message: "unexpected end of input".to_string(), location }
            }
            ParseErrorKind::Basic(BasicParseErrorKind::UnexpectedToken(token)) => {
                ParseError::Syntax { message: format!("unexpected token {:?}", token), location }
            }
            ParseErrorKind::Basic(other) => {
                ParseError::Syntax { message: format!("{:?}", other), location }
            }
        }
    }
}

fn custom<'i>(error: ParseError, location: SourceLocation) -> CssError<'i> {
    cssparser::ParseError { kind: ParseErrorKind::Custom(error), location }
}

/// Parse CSS text into a stylesheet.
///
/// # Arguments
///
/// * `input` - CSS source text
/// * `source` - Path of the file the text came from, if any
pub fn parse(input: &str, source: Option<PathBuf>) -> Result<Stylesheet, ParseError> {
    let mut sheet = Stylesheet::new(source);
    let mut css = ParserInput::new(input);
    let mut parser = Parser::new(&mut css);
    let root = sheet.root();
    parse_block(&mut parser, &mut sheet, root)?;
    Ok(sheet)
}

/// Drain the remaining tokens of a delimited parser, rejecting broken strings
fn consume_rest<'i>(parser: &mut Parser<'i, '_>) -> Result<(), CssError<'i>> {
    loop {
        let location = parser.current_source_location();
        match parser.next_including_whitespace_and_comments() {
            Ok(Token::BadString(_)) => {
                return Err(custom(ParseError::UnclosedString(location.into()), location));
            }
            Ok(_) => {}
            Err(_) => return Ok(()),
        }
    }
}

/// Parse the items of one block (or the whole sheet) into `parent`
fn parse_block<'i>(
    parser: &mut Parser<'i, '_>,
    sheet: &mut Stylesheet,
    parent: NodeId,
) -> Result<(), CssError<'i>> {
    let item_end = Delimiter::Semicolon | Delimiter::CurlyBracketBlock;
    loop {
        let state = parser.state();
        let start = parser.position();
        let location = parser.current_source_location();
        let token = match parser.next_including_whitespace_and_comments() {
            Ok(token) => token.clone(),
            Err(_) => return Ok(()),
        };

        match token {
            Token::WhiteSpace(_) | Token::Semicolon => {}
            Token::Comment(body) => {
                let raw = parser.slice_from(start);
                if raw.len() < 4 || !raw.ends_with("*/") {
                    return Err(custom(ParseError::UnclosedComment(location.into()), location));
                }
                let kind = NodeKind::Comment(body.to_string());
                let id = sheet.create_at(kind, Some(location.into()));
                sheet.append(parent, id);
            }
            Token::CloseCurlyBracket => {
                return Err(custom(ParseError::UnexpectedClose(location.into()), location));
            }
            Token::AtKeyword(name) => {
                let prelude = parser.position();
                parser.parse_until_before(item_end, |p| consume_rest(p))?;
                let params = parser.slice_from(prelude).trim().to_string();
                let block = parser.position();
                let has_block = matches!(parser.next(), Ok(&Token::CurlyBracketBlock));

                let kind = NodeKind::AtRule { name: name.to_string(), params, has_block };
                let id = sheet.create_at(kind, Some(location.into()));
                sheet.append(parent, id);
                if has_block {
                    parse_nested(parser, sheet, id, block, location)?;
                }
            }
            _ => {
                parser.reset(&state);
                parser.parse_until_before(item_end, |p| consume_rest(p))?;
                let text = parser.slice_from(start).trim_end().to_string();
                let block = parser.position();

                if matches!(parser.next(), Ok(&Token::CurlyBracketBlock)) {
                    let kind = NodeKind::Rule { selectors: split_selectors(&text) };
                    let id = sheet.create_at(kind, Some(location.into()));
                    sheet.append(parent, id);
                    parse_nested(parser, sheet, id, block, location)?;
                } else {
                    let Some(decl) = parse_declaration(&text) else {
                        let error =
                            ParseError::InvalidDeclaration { text, location: location.into() };
                        return Err(custom(error, location));
                    };
                    let id = sheet.create_at(NodeKind::Decl(decl), Some(location.into()));
                    sheet.append(parent, id);
                }
            }
        }
    }
}

/// Parse the `{ ... }` block the parser was just positioned on
fn parse_nested<'i>(
    parser: &mut Parser<'i, '_>,
    sheet: &mut Stylesheet,
    id: NodeId,
    block: cssparser::SourcePosition,
    location: SourceLocation,
) -> Result<(), CssError<'i>> {
    parser.parse_nested_block(|inner| parse_block(inner, sheet, id))?;
    // cssparser closes blocks at end of input; a missing brace is still an error here
    if !parser.slice_from(block).ends_with('}') {
        return Err(custom(ParseError::UnclosedBlock(location.into()), location));
    }
    Ok(())
}

/// `property: value [!important]`
fn parse_declaration(text: &str) -> Option<Declaration> {
    let mut css = ParserInput::new(text);
    let mut parser = Parser::new(&mut css);
    let result: Result<Declaration, CssError<'_>> = parser.parse_entirely(|p| {
        let prop = p.expect_ident()?.to_string();
        p.expect_colon()?;
        let start = p.position();
        p.parse_until_before(Delimiter::Bang, |v| consume_rest(v))?;
        let value = p.slice_from(start).trim().to_string();
        let important = p.try_parse(parse_important).is_ok();
        Ok(Declaration { prop, value, important })
    });
    result.ok()
}

/// Split a selector list on top-level commas.
///
/// Commas inside parentheses, attribute brackets and strings do not split.
pub fn split_selectors(text: &str) -> Vec<String> {
    let mut css = ParserInput::new(text);
    let mut parser = Parser::new(&mut css);
    let mut selectors = vec![];
    loop {
        let start = parser.position();
        let _: Result<(), CssError<'_>> = parser.parse_until_before(Delimiter::Comma, |p| {
            while p.next_including_whitespace_and_comments().is_ok() {}
            Ok(())
        });
        let selector = parser.slice_from(start).trim();
        if !selector.is_empty() {
            selectors.push(selector.to_string());
        }
        if parser.next().is_err() {
            return selectors;
        }
    }
}
