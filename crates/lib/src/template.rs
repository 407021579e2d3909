//! Placeholder parsing and substitution for action command templates.
//!
//! Action commands are declared once in the configuration and rendered per
//! target at execution time. Supported placeholders:
//!
//! - `{input}` - the first file prerequisite (the rule-matched input)
//! - `{inputs}` - all file prerequisites, space-joined
//! - `{output}` - the target's root-relative output path
//! - `{target}` - the target identifier
//!
//! Use `{{` and `}}` for literal braces (a lone `}` also passes through
//! unchanged). Unknown placeholders are rejected at graph-construction
//! time, never at execution time.

use thiserror::Error;

/// A parsed placeholder reference.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placeholder {
  Input,
  Inputs,
  Output,
  Target,
}

/// A segment of parsed template text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
  /// Literal text (no placeholders).
  Literal(String),
  /// A placeholder to be rendered.
  Placeholder(Placeholder),
}

/// Errors that can occur during template parsing.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TemplateError {
  #[error("unclosed placeholder at position {0}")]
  Unclosed(usize),

  #[error("unknown placeholder '{{{0}}}'")]
  Unknown(String),
}

/// Values a template is rendered against.
#[derive(Debug, Clone, Default)]
pub struct RenderContext {
  /// First file prerequisite, root-relative.
  pub input: String,
  /// All file prerequisites, root-relative.
  pub inputs: Vec<String>,
  /// Output path for real targets, root-relative.
  pub output: String,
  /// The target identifier.
  pub target: String,
}

/// Parse a command template into segments.
///
/// # Errors
///
/// Returns an error if a placeholder is unclosed or names an unknown value.
pub fn parse(input: &str) -> Result<Vec<Segment>, TemplateError> {
  let mut segments = Vec::new();
  let mut literal = String::new();
  let mut chars = input.char_indices().peekable();

  while let Some((pos, ch)) = chars.next() {
    if ch == '}' {
      // Escaped brace: }} -> }
      if let Some((_, '}')) = chars.peek() {
        chars.next();
      }
      literal.push('}');
      continue;
    }

    if ch != '{' {
      literal.push(ch);
      continue;
    }

    if let Some((_, '{')) = chars.peek() {
      // Escaped brace: {{ -> {
      chars.next();
      literal.push('{');
      continue;
    }

    let mut name = String::new();
    let mut found_close = false;

    for (_, c) in chars.by_ref() {
      if c == '}' {
        found_close = true;
        break;
      }
      name.push(c);
    }

    if !found_close {
      return Err(TemplateError::Unclosed(pos));
    }

    let placeholder = match name.as_str() {
      "input" => Placeholder::Input,
      "inputs" => Placeholder::Inputs,
      "output" => Placeholder::Output,
      "target" => Placeholder::Target,
      _ => return Err(TemplateError::Unknown(name)),
    };

    if !literal.is_empty() {
      segments.push(Segment::Literal(std::mem::take(&mut literal)));
    }
    segments.push(Segment::Placeholder(placeholder));
  }

  if !literal.is_empty() {
    segments.push(Segment::Literal(literal));
  }

  Ok(segments)
}

/// Return the placeholders a template references.
pub fn placeholders(segments: &[Segment]) -> Vec<Placeholder> {
  segments
    .iter()
    .filter_map(|s| match s {
      Segment::Placeholder(p) => Some(*p),
      Segment::Literal(_) => None,
    })
    .collect()
}

/// Render parsed segments against concrete values.
pub fn render(segments: &[Segment], ctx: &RenderContext) -> String {
  let mut result = String::new();

  for segment in segments {
    match segment {
      Segment::Literal(s) => result.push_str(s),
      Segment::Placeholder(p) => match p {
        Placeholder::Input => result.push_str(&ctx.input),
        Placeholder::Inputs => result.push_str(&ctx.inputs.join(" ")),
        Placeholder::Output => result.push_str(&ctx.output),
        Placeholder::Target => result.push_str(&ctx.target),
      },
    }
  }

  result
}

/// Parse and render in one step.
///
/// # Errors
///
/// Returns an error if parsing fails; rendering itself cannot fail.
pub fn substitute(input: &str, ctx: &RenderContext) -> Result<String, TemplateError> {
  Ok(render(&parse(input)?, ctx))
}
