use anyhow::bail;
use edt_pdf::LayoutExtractor;
use tracing::{info, warn};

pub use crate::openai::VisionClient;

pub mod openai;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
  Image,
  Pdf,
}

impl MediaKind {
  pub fn from_mime(mime: &str) -> Option<Self> {
    match essence(mime).as_str() {
      "application/pdf" => Some(Self::Pdf),
      image if image.starts_with("image/") && image.len() > "image/".len() => Some(Self::Image),
      _ => None,
    }
  }
}

/// `type/subtype` of a mime type, lowercased and without parameters.
pub(crate) fn essence(mime: &str) -> String {
  mime
    .split(';')
    .next()
    .unwrap_or_default()
    .trim()
    .to_ascii_lowercase()
}

/// Turns an uploaded image or pdf into text for the extraction pipeline.
///
/// Pdfs are first read locally. The reconstructed layout is handed to the
/// vision api when one is configured, or returned as plain text otherwise.
/// When the local read fails the whole document goes to the vision api.
pub struct Extractor {
  vision: Option<VisionClient>,
  layout: LayoutExtractor,
}

impl Extractor {
  pub fn new(vision: Option<VisionClient>) -> Self {
    Self {
      vision,
      layout: LayoutExtractor::new(),
    }
  }

  pub fn has_vision(&self) -> bool {
    self.vision.is_some()
  }

  pub async fn extract(&self, bytes: &[u8], mime: &str) -> anyhow::Result<String> {
    match MediaKind::from_mime(mime) {
      Some(MediaKind::Pdf) => self.extract_pdf(bytes, mime).await,
      Some(MediaKind::Image) => match &self.vision {
        Some(vision) => vision.transcribe(bytes, mime).await,
        None => bail!("Reading images requires a vision api"),
      },
      None => bail!("Unsupported media type {}", mime),
    }
  }

  async fn extract_pdf(&self, bytes: &[u8], mime: &str) -> anyhow::Result<String> {
    let layout = match self.layout.extract(bytes) {
      Ok(layout) => Some(layout),
      Err(err) => {
        warn!("Unable to read pdf layout, falling back to the vision api: {}", err);
        None
      }
    };

    let vision = match (&self.vision, layout) {
      (Some(vision), Some(layout)) => {
        match vision.transcribe_layout(&layout.annotated()).await {
          Ok(text) => return Ok(text),
          Err(err) => warn!("Vision api rejected the pdf layout: {}", err),
        }
        vision
      }
      (Some(vision), None) => vision,
      (None, Some(layout)) => {
        info!("No vision api configured, using the pdf text as is");
        return Ok(layout.plain());
      }
      (None, None) => bail!("The pdf contains no readable text and no vision api is configured"),
    };

    vision.transcribe(bytes, mime).await
  }
}
