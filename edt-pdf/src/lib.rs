use std::fmt::Write;

use anyhow::{anyhow, bail, Context};
use lopdf::content::Content;
use lopdf::{Document, Object};
use tracing::{debug, info};

/// Tokens whose baselines differ by less than this many points share a line.
const LINE_TOLERANCE: f32 = 3.0;

/// `TJ` adjustments beyond this many thousandths of an em are read as a gap.
const WORD_GAP: f32 = 200.0;

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
  pub page: u32,
  pub x: f32,
  pub y: f32,
  pub text: String,
}

/// Text of a document grouped into visual lines, top to bottom, left to right.
#[derive(Debug, Default)]
pub struct Layout {
  pub lines: Vec<Vec<Token>>,
}

impl Layout {
  pub fn is_empty(&self) -> bool {
    self.lines.is_empty()
  }

  /// One text line per visual line, every token written as `[x,y:token]`.
  pub fn annotated(&self) -> String {
    let mut out = String::new();
    for line in &self.lines {
      for (index, token) in line.iter().enumerate() {
        if index > 0 {
          out.push(' ');
        }
        let _ = write!(out, "[{:.0},{:.0}:{}]", token.x, token.y, token.text);
      }
      out.push('\n');
    }
    out
  }

  pub fn plain(&self) -> String {
    self
      .lines
      .iter()
      .map(|line| {
        line
          .iter()
          .map(|token| token.text.as_str())
          .collect::<Vec<_>>()
          .join(" ")
      })
      .collect::<Vec<_>>()
      .join("\n")
  }
}

/// Rebuilds the visual text layout of a PDF from its page content streams.
///
/// Only positioning and text showing operators are interpreted; fonts are
/// not loaded, so strings are decoded as UTF-16 when they carry a byte order
/// mark and as Latin-1 otherwise.
pub struct LayoutExtractor {
  tolerance: f32,
}

impl Default for LayoutExtractor {
  fn default() -> Self {
    Self::new()
  }
}

impl LayoutExtractor {
  pub fn new() -> Self {
    Self {
      tolerance: LINE_TOLERANCE,
    }
  }

  pub fn extract(&self, bytes: &[u8]) -> anyhow::Result<Layout> {
    let document = Document::load_mem(bytes).context("Unable to read pdf")?;
    if document.trailer.get(b"Encrypt").is_ok() {
      bail!("Encrypted pdf documents are not supported");
    }

    let mut layout = Layout::default();
    for (page, page_id) in document.get_pages() {
      let content = document
        .get_page_content(page_id)
        .with_context(|| format!("Unable to read content of page {}", page))?;
      let content = Content::decode(&content)
        .map_err(|err| anyhow!("Unable to decode content of page {}: {}", page, err))?;

      let tokens = read_tokens(page, &content);
      debug!("Found {} text tokens on page {}", tokens.len(), page);
      layout.lines.extend(self.group(tokens));
    }

    if layout.is_empty() {
      bail!("The pdf does not contain any text");
    }

    info!("Reconstructed {} lines of text", layout.lines.len());
    Ok(layout)
  }

  fn group(&self, mut tokens: Vec<Token>) -> Vec<Vec<Token>> {
    tokens.sort_by(|a, b| b.y.total_cmp(&a.y));

    let mut lines: Vec<Vec<Token>> = Vec::new();
    for token in tokens {
      match lines.last_mut() {
        Some(line) if (line[0].y - token.y).abs() <= self.tolerance => line.push(token),
        _ => lines.push(vec![token]),
      }
    }

    for line in &mut lines {
      line.sort_by(|a, b| a.x.total_cmp(&b.x));
    }
    lines
  }
}

#[derive(Default)]
struct TextCursor {
  x: f32,
  y: f32,
  line_x: f32,
  line_y: f32,
  leading: f32,
}

impl TextCursor {
  fn move_to(&mut self, x: f32, y: f32) {
    self.line_x = x;
    self.line_y = y;
    self.x = x;
    self.y = y;
  }

  fn next_line(&mut self) {
    self.move_to(self.line_x, self.line_y - self.leading);
  }
}

fn read_tokens(page: u32, content: &Content) -> Vec<Token> {
  let mut cursor = TextCursor::default();
  let mut tokens = Vec::new();

  for operation in &content.operations {
    let operands = &operation.operands;
    let shown = match operation.operator.as_str() {
      "BT" => {
        cursor = TextCursor {
          leading: cursor.leading,
          ..TextCursor::default()
        };
        None
      }
      "Tm" => {
        if let (Some(x), Some(y)) = (number(operands.get(4)), number(operands.get(5))) {
          cursor.move_to(x, y);
        }
        None
      }
      "Td" | "TD" => {
        if let (Some(tx), Some(ty)) = (number(operands.first()), number(operands.get(1))) {
          if operation.operator == "TD" {
            cursor.leading = -ty;
          }
          cursor.move_to(cursor.line_x + tx, cursor.line_y + ty);
        }
        None
      }
      "TL" => {
        if let Some(leading) = number(operands.first()) {
          cursor.leading = leading;
        }
        None
      }
      "T*" => {
        cursor.next_line();
        None
      }
      "Tj" => operands.first().and_then(string),
      "TJ" => operands.first().and_then(spaced),
      "'" => {
        cursor.next_line();
        operands.first().and_then(string)
      }
      "\"" => {
        cursor.next_line();
        operands.get(2).and_then(string)
      }
      _ => None,
    };

    if let Some(text) = shown {
      push(&mut tokens, page, &cursor, text);
    }
  }

  tokens
}

/// Consecutive strings at the same position belong to the same token.
fn push(tokens: &mut Vec<Token>, page: u32, cursor: &TextCursor, text: String) {
  if let Some(last) = tokens.last_mut() {
    if last.x == cursor.x && last.y == cursor.y {
      last.text.push_str(&text);
      last.text = last.text.trim().to_string();
      return;
    }
  }

  let text = text.trim();
  if text.is_empty() {
    return;
  }

  tokens.push(Token {
    page,
    x: cursor.x,
    y: cursor.y,
    text: text.to_string(),
  });
}

fn number(object: Option<&Object>) -> Option<f32> {
  match object? {
    Object::Integer(value) => Some(*value as f32),
    Object::Real(value) => Some(*value as f32),
    _ => None,
  }
}

fn string(object: &Object) -> Option<String> {
  match object {
    Object::String(bytes, _) => Some(decode(bytes)),
    _ => None,
  }
}

fn spaced(object: &Object) -> Option<String> {
  let parts = match object {
    Object::Array(parts) => parts,
    _ => return None,
  };

  let mut text = String::new();
  for part in parts {
    match part {
      Object::String(bytes, _) => text.push_str(&decode(bytes)),
      other => {
        if number(Some(other)).is_some_and(|gap| gap < -WORD_GAP) && !text.ends_with(' ') {
          text.push(' ');
        }
      }
    }
  }
  Some(text)
}

fn decode(bytes: &[u8]) -> String {
  match bytes {
    [0xfe, 0xff, rest @ ..] => {
      let units = rest
        .chunks_exact(2)
        .map(|pair| u16::from_be_bytes([pair[0], pair[1]]));
      char::decode_utf16(units)
        .map(|c| c.unwrap_or(char::REPLACEMENT_CHARACTER))
        .collect()
    }
    _ => bytes.iter().map(|&byte| byte as char).collect(),
  }
}

#[cfg(test)]
mod test {
  use lopdf::content::{Content, Operation};
  use lopdf::{dictionary, Document, Object, Stream};

  use crate::LayoutExtractor;

  fn at(x: i64, y: i64) -> Operation {
    Operation::new("Tm", vec![1.into(), 0.into(), 0.into(), 1.into(), x.into(), y.into()])
  }

  fn show(text: &str) -> Operation {
    Operation::new("Tj", vec![Object::string_literal(text)])
  }

  fn pdf(operations: Vec<Operation>) -> anyhow::Result<Vec<u8>> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
      "Type" => "Font",
      "Subtype" => "Type1",
      "BaseFont" => "Helvetica",
    });
    let resources_id = doc.add_object(dictionary! {
      "Font" => dictionary! { "F1" => font_id },
    });

    let content = Content { operations };
    let content_id = doc.add_object(Stream::new(dictionary! {}, content.encode()?));
    let page_id = doc.add_object(dictionary! {
      "Type" => "Page",
      "Parent" => pages_id,
      "Contents" => content_id,
    });
    doc.objects.insert(
      pages_id,
      Object::Dictionary(dictionary! {
        "Type" => "Pages",
        "Kids" => vec![page_id.into()],
        "Count" => 1,
        "Resources" => resources_id,
        "MediaBox" => vec![0.into(), 0.into(), 842.into(), 595.into()],
      }),
    );
    let catalog_id = doc.add_object(dictionary! {
      "Type" => "Catalog",
      "Pages" => pages_id,
    });
    doc.trailer.set("Root", catalog_id);

    let mut bytes = Vec::new();
    doc.save_to(&mut bytes)?;
    Ok(bytes)
  }

  #[test]
  fn rebuilds_rows() -> anyhow::Result<()> {
    let bytes = pdf(vec![
      Operation::new("BT", vec![]),
      Operation::new("Tf", vec!["F1".into(), 10.into()]),
      at(120, 500),
      show("Lundi"),
      at(220, 500),
      show("Mardi"),
      at(120, 470),
      show("Maths"),
      at(40, 470),
      show("8h00 - 9h00"),
      at(220, 468),
      Operation::new(
        "TJ",
        vec![Object::Array(vec![
          Object::string_literal("Salle"),
          Object::Integer(-400),
          Object::string_literal("B201"),
        ])],
      ),
      Operation::new("ET", vec![]),
    ])?;

    let layout = LayoutExtractor::new().extract(&bytes)?;

    assert_eq!(
      layout.annotated(),
      "[120,500:Lundi] [220,500:Mardi]\n[40,470:8h00 - 9h00] [120,470:Maths] [220,468:Salle B201]\n"
    );
    assert_eq!(layout.plain(), "Lundi Mardi\n8h00 - 9h00 Maths Salle B201");
    Ok(())
  }

  #[test]
  fn follows_relative_moves() -> anyhow::Result<()> {
    let bytes = pdf(vec![
      Operation::new("BT", vec![]),
      Operation::new("Tf", vec!["F1".into(), 10.into()]),
      Operation::new("TL", vec![20.into()]),
      Operation::new("Td", vec![50.into(), 400.into()]),
      show("Anglais"),
      Operation::new("T*", vec![]),
      show("Histoire"),
      Operation::new("Td", vec![100.into(), 0.into()]),
      show("A104"),
      Operation::new("ET", vec![]),
    ])?;

    let layout = LayoutExtractor::new().extract(&bytes)?;
    assert_eq!(layout.annotated(), "[50,400:Anglais]\n[50,380:Histoire] [150,380:A104]\n");
    Ok(())
  }

  #[test]
  fn empty_document_is_an_error() -> anyhow::Result<()> {
    let bytes = pdf(vec![])?;
    assert!(LayoutExtractor::new().extract(&bytes).is_err());
    Ok(())
  }

  #[test]
  fn garbage_is_an_error() {
    assert!(LayoutExtractor::new().extract(b"not a pdf").is_err());
  }
}
