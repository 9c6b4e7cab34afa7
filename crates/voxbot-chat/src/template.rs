//! Response template parsing and rendering.
//!
//! Syntax:
//! - `{kind}` is replaced by the first extracted value of that entity kind.
//! - `[ ... ]` is an optional segment, dropped whole when any placeholder
//!   inside it has no value.
//!
//! Segments do not nest, and literal braces or brackets are not supported.
//! Text that must come back verbatim, such as FAQ answers, goes through
//! [`Template::literal`] instead of the parser.

use voxbot_core::types::{EntityKind, EntityMap};

/// Why a template could not be parsed.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TemplateError {
    #[error("unclosed placeholder starting at byte {0}")]
    UnclosedPlaceholder(usize),
    #[error("unexpected '{ch}' at byte {position}")]
    Unexpected { ch: char, position: usize },
    #[error("unclosed optional segment starting at byte {0}")]
    UnclosedSegment(usize),
    #[error("nested optional segment at byte {0}")]
    NestedSegment(usize),
    #[error("empty placeholder at byte {0}")]
    EmptyPlaceholder(usize),
}

#[derive(Debug, Clone, PartialEq)]
enum Piece {
    Text(String),
    Placeholder(EntityKind),
}

#[derive(Debug, Clone, PartialEq)]
enum Segment {
    Piece(Piece),
    Optional(Vec<Piece>),
}

/// A parsed response template.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    segments: Vec<Segment>,
    /// Rendered as written, without whitespace tidying.
    verbatim: bool,
}

/// Output of [`Template::render`].
#[derive(Debug, Clone, PartialEq)]
pub struct Rendered {
    /// Rendered text with whitespace collapsed.
    pub text: String,
    /// Placeholder kinds that had no value, in template order, no repeats.
    pub missing: Vec<EntityKind>,
}

impl Template {
    /// A template with no placeholders that renders `text` unchanged.
    pub fn literal(text: &str) -> Self {
        Self {
            segments: vec![Segment::Piece(Piece::Text(text.to_string()))],
            verbatim: true,
        }
    }

    pub fn parse(source: &str) -> Result<Self, TemplateError> {
        let mut segments = Vec::new();
        let mut optional: Option<(usize, Vec<Piece>)> = None;
        let mut text = String::new();
        let mut chars = source.char_indices();

        while let Some((pos, ch)) = chars.next() {
            match ch {
                '{' => {
                    let mut name = String::new();
                    let mut closed = false;
                    for (inner_pos, inner) in chars.by_ref() {
                        match inner {
                            '}' => {
                                closed = true;
                                break;
                            }
                            '{' | '[' | ']' => {
                                return Err(TemplateError::Unexpected {
                                    ch: inner,
                                    position: inner_pos,
                                })
                            }
                            c => name.push(c),
                        }
                    }
                    if !closed {
                        return Err(TemplateError::UnclosedPlaceholder(pos));
                    }
                    let name = name.trim();
                    if name.is_empty() {
                        return Err(TemplateError::EmptyPlaceholder(pos));
                    }
                    let placeholder = Piece::Placeholder(EntityKind::from(name));
                    flush_text(&mut text, &mut optional, &mut segments);
                    match optional {
                        Some((_, ref mut pieces)) => pieces.push(placeholder),
                        None => segments.push(Segment::Piece(placeholder)),
                    }
                }
                '[' => {
                    if optional.is_some() {
                        return Err(TemplateError::NestedSegment(pos));
                    }
                    flush_text(&mut text, &mut optional, &mut segments);
                    optional = Some((pos, Vec::new()));
                }
                ']' => {
                    if optional.is_none() {
                        return Err(TemplateError::Unexpected { ch, position: pos });
                    }
                    flush_text(&mut text, &mut optional, &mut segments);
                    if let Some((_, pieces)) = optional.take() {
                        segments.push(Segment::Optional(pieces));
                    }
                }
                '}' => return Err(TemplateError::Unexpected { ch, position: pos }),
                c => text.push(c),
            }
        }

        if let Some((start, _)) = optional {
            return Err(TemplateError::UnclosedSegment(start));
        }
        flush_text(&mut text, &mut optional, &mut segments);
        Ok(Self {
            segments,
            verbatim: false,
        })
    }

    /// Kinds referenced by this template, in order of first use.
    pub fn placeholders(&self) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        let mut note = |piece: &Piece| {
            if let Piece::Placeholder(kind) = piece {
                if !kinds.contains(kind) {
                    kinds.push(kind.clone());
                }
            }
        };
        for segment in &self.segments {
            match segment {
                Segment::Piece(piece) => note(piece),
                Segment::Optional(pieces) => pieces.iter().for_each(&mut note),
            }
        }
        kinds
    }

    /// Fill placeholders from `entities`.
    ///
    /// Unresolved placeholders outside a segment render as nothing; the
    /// caller decides what to ask for via [`Rendered::missing`].
    pub fn render(&self, entities: &EntityMap) -> Rendered {
        let mut out = String::new();
        let mut missing: Vec<EntityKind> = Vec::new();
        let mut note_missing = |kind: &EntityKind| {
            if !missing.contains(kind) {
                missing.push(kind.clone());
            }
        };

        for segment in &self.segments {
            match segment {
                Segment::Piece(Piece::Text(t)) => out.push_str(t),
                Segment::Piece(Piece::Placeholder(kind)) => match entities.first(kind) {
                    Some(value) => out.push_str(value),
                    None => note_missing(kind),
                },
                Segment::Optional(pieces) => {
                    let mut part = String::new();
                    let mut complete = true;
                    for piece in pieces {
                        match piece {
                            Piece::Text(t) => part.push_str(t),
                            Piece::Placeholder(kind) => match entities.first(kind) {
                                Some(value) => part.push_str(value),
                                None => {
                                    complete = false;
                                    note_missing(kind);
                                }
                            },
                        }
                    }
                    if complete {
                        out.push_str(&part);
                    }
                }
            }
        }

        let text = if self.verbatim { out } else { tidy(&out) };
        Rendered { text, missing }
    }
}

fn flush_text(
    text: &mut String,
    optional: &mut Option<(usize, Vec<Piece>)>,
    segments: &mut Vec<Segment>,
) {
    if text.is_empty() {
        return;
    }
    let piece = Piece::Text(std::mem::take(text));
    match optional {
        Some((_, pieces)) => pieces.push(piece),
        None => segments.push(Segment::Piece(piece)),
    }
}

/// Collapse runs of whitespace and drop spaces left before punctuation by
/// removed segments or empty placeholders.
fn tidy(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    let mut out = String::with_capacity(collapsed.len());
    for ch in collapsed.chars() {
        if matches!(ch, '.' | ',' | '!' | '?' | ';' | ':') && out.ends_with(' ') {
            out.pop();
        }
        out.push(ch);
    }
    out
}
