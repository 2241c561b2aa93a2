//! Declaration scanning - finds sprite directives and turns them into [`SpriteIntent`]s
//!
//! Two kinds of declarations are picked up, in document order:
//!
//! - `sprite-prop: el(icons/home) width height background [normal]`
//! - `background`/`background-image` declarations whose `url(...)` passes the url filter
//!   (only when a filter is configured); these request `background` and
//!   `background-position`.
//!
//! Aliases (`sprite-<alias>: el(x) [normal]`) are rewritten into `sprite-prop` first.

use crate::config::Predicate;
use crate::pipeline::SpriteError;
use crate::property::{BuiltinProperty, PropertyRegistry};
use crate::resolve::PathResolver;
use crate::stylesheet::{Declaration, Location, NodeId, NodeKind, Stylesheet};
use cssparser::{Parser, ParserInput, Token};
use std::collections::{BTreeMap, HashSet};
use std::path::PathBuf;

/// Property name of the canonical directive
pub const DIRECTIVE: &str = "sprite-prop";

/// Prefix shared by the directive and its aliases
pub const DIRECTIVE_PREFIX: &str = "sprite-";

/// Token requesting normal-density values
pub const NORMAL_FLAG: &str = "normal";

/// One matched declaration and what it asked for
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SpriteIntent {
    /// Element reference as written
    pub element: String,
    /// Requested properties, unique, in declaration order
    pub properties: Vec<String>,
    /// Explicit `normal` flag
    pub normal: bool,
    /// Resolved element file
    pub path: PathBuf,
    /// The declaration this intent came from
    pub node: NodeId,
    pub location: Option<Location>,
}

impl SpriteIntent {
    pub fn requests(&self, property: BuiltinProperty) -> bool {
        self.properties.iter().any(|p| p == property.name())
    }
}

/// Result of a scan
#[derive(Debug, Clone, Default)]
pub struct ScanResult {
    /// Intents in document order
    pub intents: Vec<SpriteIntent>,
    /// Distinct element files in order of first occurrence
    pub elements: Vec<PathBuf>,
}

impl ScanResult {
    pub fn is_empty(&self) -> bool {
        self.intents.is_empty()
    }
}

/// Parsed value of a directive
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DirectiveArgs {
    pub element: Option<String>,
    pub properties: Vec<String>,
    pub normal: bool,
}

impl DirectiveArgs {
    fn to_value(&self) -> String {
        let mut tokens = vec![];
        if let Some(element) = &self.element {
            tokens.push(format!("el({})", element));
        }
        tokens.extend(self.properties.iter().cloned());
        if self.normal {
            tokens.push(NORMAL_FLAG.to_string());
        }
        tokens.join(" ")
    }
}

/// Parse a directive value against the property table.
///
/// Unknown tokens are rejected. Repeated properties are kept once.
pub fn parse_directive(
    value: &str,
    registry: &PropertyRegistry,
    location: Option<Location>,
) -> Result<DirectiveArgs, SpriteError> {
    let mut args = DirectiveArgs::default();
    for token in directive_tokens(value) {
        match token {
            DirectiveToken::Element(element) => args.element = Some(element),
            DirectiveToken::Word(word) if word == NORMAL_FLAG => args.normal = true,
            DirectiveToken::Word(word) if registry.contains(&word) => {
                if !args.properties.contains(&word) {
                    args.properties.push(word);
                }
            }
            DirectiveToken::Word(word) => {
                return Err(SpriteError::UnknownToken { token: word, location });
            }
        }
    }
    Ok(args)
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum DirectiveToken {
    /// `el(x)`, `el("x")` or `el('x')` -> `x`
    Element(String),
    /// Anything else, as written
    Word(String),
}

type TokenError<'i> = cssparser::ParseError<'i, ()>;

fn directive_tokens(value: &str) -> Vec<DirectiveToken> {
    let mut css = ParserInput::new(value);
    let mut parser = Parser::new(&mut css);
    let mut tokens = vec![];
    loop {
        let start = parser.position();
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => return tokens,
        };
        let element = match token {
            Token::Function(name) if name.eq_ignore_ascii_case("el") => {
                let reference: Result<String, TokenError<'_>> =
                    parser.parse_nested_block(element_reference);
                reference.ok().filter(|r| !r.is_empty())
            }
            Token::Function(_)
            | Token::ParenthesisBlock
            | Token::SquareBracketBlock
            | Token::CurlyBracketBlock => {
                let _: Result<(), TokenError<'_>> = parser.parse_nested_block(|p| {
                    while p.next().is_ok() {}
                    Ok(())
                });
                None
            }
            _ => None,
        };
        tokens.push(match element {
            Some(element) => DirectiveToken::Element(element),
            None => DirectiveToken::Word(parser.slice_from(start).trim().to_string()),
        });
    }
}

/// Contents of `el(...)`: a single quoted string, or the raw text
fn element_reference<'i>(parser: &mut Parser<'i, '_>) -> Result<String, TokenError<'i>> {
    let quoted = parser.try_parse(|p| {
        let reference = p.expect_string_cloned()?;
        p.expect_exhausted()?;
        Ok::<_, cssparser::BasicParseError<'i>>(reference)
    });
    if let Ok(reference) = quoted {
        return Ok(reference.to_string());
    }

    let start = parser.position();
    while parser.next_including_whitespace().is_ok() {}
    Ok(parser.slice_from(start).trim().to_string())
}

/// First `url(...)` in a value (nested functions included), without quotes
pub fn extract_url(value: &str) -> Option<String> {
    let mut css = ParserInput::new(value);
    let mut parser = Parser::new(&mut css);
    find_url(&mut parser).ok().flatten()
}

fn find_url<'i>(parser: &mut Parser<'i, '_>) -> Result<Option<String>, TokenError<'i>> {
    loop {
        let token = match parser.next() {
            Ok(token) => token.clone(),
            Err(_) => return Ok(None),
        };
        let found = match token {
            Token::UnquotedUrl(url) => Some(url.trim().to_string()),
            Token::Function(name) if name.eq_ignore_ascii_case("url") => {
                let quoted: Result<String, TokenError<'i>> =
                    parser.parse_nested_block(|p| Ok(p.expect_string()?.trim().to_string()));
                quoted.ok()
            }
            Token::Function(_) | Token::ParenthesisBlock | Token::SquareBracketBlock => {
                parser.parse_nested_block(find_url)?
            }
            _ => None,
        };
        if let Some(url) = found.filter(|u| !u.is_empty()) {
            while parser.next().is_ok() {}
            return Ok(Some(url));
        }
    }
}

/// Walks a stylesheet and collects intents
pub struct Scanner<'a> {
    resolver: PathResolver,
    registry: &'a PropertyRegistry,
    url_filter: Option<&'a Predicate>,
}

impl<'a> Scanner<'a> {
    pub fn new(
        resolver: PathResolver,
        registry: &'a PropertyRegistry,
        url_filter: Option<&'a Predicate>,
    ) -> Self {
        Self { resolver, registry, url_filter }
    }

    fn resolve(&self, reference: &str, location: Option<Location>) -> Result<PathBuf, SpriteError> {
        self.resolver.resolve(reference).ok_or_else(|| SpriteError::ElementNotFound {
            reference: reference.to_string(),
            location,
        })
    }

    /// Rewrite every `sprite-<alias>` declaration into `sprite-prop`.
    ///
    /// Returns the number of declarations rewritten. Runs to completion before scanning.
    pub fn rewrite_aliases(
        &self,
        sheet: &mut Stylesheet,
        aliases: &BTreeMap<String, Vec<String>>,
    ) -> Result<usize, SpriteError> {
        if aliases.is_empty() {
            return Ok(0);
        }

        let alias_of = |decl: &Declaration| -> Option<String> {
            let name = decl.prop.strip_prefix(DIRECTIVE_PREFIX)?;
            aliases.contains_key(name).then(|| name.to_string())
        };
        let nodes = sheet.walk_decls(|d| d.prop != DIRECTIVE && alias_of(d).is_some());

        for &node in &nodes {
            let location = sheet.location(node);
            let Some(decl) = sheet.declaration(node) else {
                continue;
            };
            let Some(alias) = alias_of(decl) else {
                continue;
            };
            let args = parse_directive(&decl.value, self.registry, location)?;
            let element = args.element.clone().ok_or(SpriteError::MissingElement { location })?;
            self.resolve(&element, location)?;

            let rewritten = DirectiveArgs {
                properties: aliases.get(&alias).cloned().unwrap_or_default(),
                ..args
            };
            let replacement = sheet.create_at(
                NodeKind::Decl(Declaration::new(DIRECTIVE, rewritten.to_value())),
                location,
            );
            sheet.insert_after(node, replacement);
            sheet.remove(node);
            log::debug!("rewrote sprite-{} at {:?} to {}", alias, location, DIRECTIVE);
        }
        Ok(nodes.len())
    }

    /// Collect intents in document order.
    pub fn scan(&self, sheet: &Stylesheet) -> Result<ScanResult, SpriteError> {
        let nodes = sheet.walk_decls(|d| d.prop == DIRECTIVE || self.matches_url(d).is_some());

        let mut result = ScanResult::default();
        let mut seen = HashSet::new();
        for node in nodes {
            let location = sheet.location(node);
            let Some(decl) = sheet.declaration(node) else {
                continue;
            };

            let (element, properties, normal) = if decl.prop == DIRECTIVE {
                let args = parse_directive(&decl.value, self.registry, location)?;
                let element = args.element.ok_or(SpriteError::MissingElement { location })?;
                (element, args.properties, args.normal)
            } else {
                let Some(url) = self.matches_url(decl) else {
                    continue;
                };
                let properties = [BuiltinProperty::Background, BuiltinProperty::BackgroundPosition]
                    .iter()
                    .map(|p| p.name().to_string())
                    .collect();
                (url, properties, false)
            };

            let path = self.resolve(&element, location)?;
            if seen.insert(path.clone()) {
                result.elements.push(path.clone());
            }
            result.intents.push(SpriteIntent { element, properties, normal, path, node, location });
        }

        log::debug!(
            "found {} sprite intents over {} elements",
            result.intents.len(),
            result.elements.len()
        );
        Ok(result)
    }

    fn matches_url(&self, decl: &Declaration) -> Option<String> {
        let filter = self.url_filter?;
        if decl.prop != "background" && decl.prop != "background-image" {
            return None;
        }
        extract_url(&decl.value).filter(|url| filter.matches(url))
    }
}
