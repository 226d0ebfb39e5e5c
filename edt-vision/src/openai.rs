use anyhow::{anyhow, bail};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{essence, MediaKind};

const PROMPT: &str = "Tu lis l'emploi du temps d'une classe de collège ou de lycée. \
Réponds uniquement avec un objet JSON de la forme \
{\"school\": string, \"year\": string, \"class\": string, \
\"days\": [string], \"timeSlots\": [\"8h00-9h00\"], \"subjects\": [string], \
\"schedule\": [{\"day\": string, \"timeSlot\": \"8h00\", \"subject\": string, \
\"room\": string, \"teacher\": string}]}. \
Omets les champs illisibles.";

const LAYOUT_PROMPT: &str = "Le texte suivant a été extrait d'un PDF. \
Chaque mot est noté [x,y:mot] avec sa position sur la page (y décroît vers le bas).";

/// Client for an OpenAI compatible chat completion endpoint.
pub struct VisionClient {
  client: Client,
  endpoint: Url,
  api_key: Option<String>,
  model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
  model: &'a str,
  messages: Vec<Message>,
  temperature: f32,
}

#[derive(Debug, Serialize)]
struct Message {
  role: &'static str,
  content: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Part {
  Text { text: String },
  ImageUrl { image_url: ImageUrl },
  File { file: FileData },
}

#[derive(Debug, Serialize)]
struct ImageUrl {
  url: String,
}

#[derive(Debug, Serialize)]
struct FileData {
  filename: String,
  file_data: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
  choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
  message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
  content: Option<String>,
}

impl ChatResponse {
  fn into_text(self) -> anyhow::Result<String> {
    let text = self
      .choices
      .into_iter()
      .next()
      .and_then(|choice| choice.message.content)
      .map(|content| content.trim().to_string())
      .unwrap_or_default();

    if text.is_empty() {
      bail!("The vision api returned no text");
    }
    Ok(text)
  }
}

fn data_url(bytes: &[u8], mime: &str) -> String {
  format!("data:{};base64,{}", essence(mime), STANDARD.encode(bytes))
}

fn file_part(bytes: &[u8], mime: &str) -> anyhow::Result<Part> {
  Ok(match MediaKind::from_mime(mime) {
    Some(MediaKind::Image) => Part::ImageUrl {
      image_url: ImageUrl {
        url: data_url(bytes, mime),
      },
    },
    Some(MediaKind::Pdf) => Part::File {
      file: FileData {
        filename: "emploi-du-temps.pdf".to_string(),
        file_data: data_url(bytes, mime),
      },
    },
    None => return Err(anyhow!("Unsupported media type {}", mime)),
  })
}

impl VisionClient {
  /// `endpoint` is the full chat completion url, e.g.
  /// `https://api.openai.com/v1/chat/completions`.
  pub fn new(endpoint: Url, api_key: Option<String>, model: String) -> Self {
    Self {
      client: Client::new(),
      endpoint,
      api_key,
      model,
    }
  }

  /// Transcribes an image or pdf into free text, usually JSON.
  pub async fn transcribe(&self, bytes: &[u8], mime: &str) -> anyhow::Result<String> {
    let parts = vec![
      Part::Text {
        text: PROMPT.to_string(),
      },
      file_part(bytes, mime)?,
    ];

    info!("Sending {} bytes of {} to the vision api", bytes.len(), mime);
    self.complete(parts).await
  }

  /// Transcribes `[x,y:token]` annotated text reconstructed from a pdf.
  pub async fn transcribe_layout(&self, layout: &str) -> anyhow::Result<String> {
    let parts = vec![Part::Text {
      text: format!("{}\n{}\n\n{}", PROMPT, LAYOUT_PROMPT, layout),
    }];

    info!("Sending {} characters of pdf layout to the vision api", layout.len());
    self.complete(parts).await
  }

  async fn complete(&self, content: Vec<Part>) -> anyhow::Result<String> {
    let request = ChatRequest {
      model: &self.model,
      messages: vec![Message {
        role: "user",
        content,
      }],
      temperature: 0.0,
    };

    let mut builder = self.client.post(self.endpoint.clone()).json(&request);
    if let Some(api_key) = &self.api_key {
      builder = builder.bearer_auth(api_key);
    }

    let response = builder
      .send()
      .await?
      .error_for_status()?
      .json::<ChatResponse>()
      .await?;

    let text = response.into_text()?;
    debug!("Vision api answered with {} characters", text.len());
    Ok(text)
  }
}
