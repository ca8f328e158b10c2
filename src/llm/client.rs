use crate::config::Config;
use async_openai::{
    config::OpenAIConfig,
    types::{
        ChatCompletionRequestMessage, ChatCompletionRequestMessageContentPartImageArgs,
        ChatCompletionRequestMessageContentPartTextArgs, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, ChatCompletionRequestUserMessageContentPart,
        CreateChatCompletionRequest, CreateChatCompletionRequestArgs, CreateSpeechRequestArgs,
        ImageUrlArgs, SpeechModel, Voice,
    },
    Client,
};
use futures::stream::BoxStream;
use futures::StreamExt;
use std::fmt;
use thiserror::Error;
use tracing::{debug, info};

const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
const XAI_API_BASE: &str = "https://api.x.ai/v1";
const PERPLEXITY_API_BASE: &str = "https://api.perplexity.ai";

const NO_RESPONSE: &str = "No response from LLM";

/// Text fragments of a streamed completion, in arrival order.
pub type FragmentStream = BoxStream<'static, anyhow::Result<String>>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    OpenAi,
    XAi,
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Provider::OpenAi => write!(f, "openai"),
            Provider::XAi => write!(f, "xai"),
        }
    }
}

#[derive(Debug, Error)]
pub enum LlmError {
    #[error("{0} is not configured: set {1}")]
    NotConfigured(&'static str, &'static str),
}

#[derive(Clone)]
struct Endpoint {
    client: Client<OpenAIConfig>,
    model: String,
}

impl Endpoint {
    fn new(api_base: &str, api_key: &str, model: &str) -> Self {
        let config = OpenAIConfig::new()
            .with_api_base(api_base)
            .with_api_key(api_key);
        Self {
            client: Client::with_config(config),
            model: model.to_string(),
        }
    }
}

/// Hosted model access shared by every command.
#[derive(Clone)]
pub struct LlmServices {
    openai: Endpoint,
    xai: Option<Endpoint>,
    search: Option<Endpoint>,
    system_prompt: String,
    tts_model: String,
    tts_voice: String,
}

impl LlmServices {
    pub fn new(config: &Config) -> Self {
        Self {
            openai: Endpoint::new(OPENAI_API_BASE, &config.openai_api_key, &config.openai_model),
            xai: config
                .xai_api_key
                .as_deref()
                .map(|key| Endpoint::new(XAI_API_BASE, key, &config.xai_model)),
            search: config
                .pplx_api_key
                .as_deref()
                .map(|key| Endpoint::new(PERPLEXITY_API_BASE, key, &config.search_model)),
            system_prompt: config.system_prompt.clone(),
            tts_model: config.tts_model.clone(),
            tts_voice: config.tts_voice.clone(),
        }
    }

    fn endpoint(&self, provider: Provider) -> Result<&Endpoint, LlmError> {
        match provider {
            Provider::OpenAi => Ok(&self.openai),
            Provider::XAi => self
                .xai
                .as_ref()
                .ok_or(LlmError::NotConfigured("xAI", "XAI_API_KEY")),
        }
    }

    /// Grok when it is configured, OpenAI otherwise.
    pub fn preferred_provider(&self) -> Provider {
        if self.xai.is_some() {
            Provider::XAi
        } else {
            Provider::OpenAi
        }
    }

    fn request(
        &self,
        model: &str,
        prompt: &str,
        images: &[String],
    ) -> anyhow::Result<CreateChatCompletionRequest> {
        let messages = build_messages(&self.system_prompt, prompt, images)?;
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .build()?;
        Ok(request)
    }

    /// One-shot reply from `provider`.
    pub async fn reply(
        &self,
        provider: Provider,
        prompt: &str,
        images: &[String],
    ) -> anyhow::Result<String> {
        let endpoint = self.endpoint(provider)?;
        let request = self.request(&endpoint.model, prompt, images)?;

        info!(%provider, model = %endpoint.model, images = images.len(), "Requesting completion");
        let response = endpoint.client.chat().create(request).await?;

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_else(|| NO_RESPONSE.to_string());

        Ok(content)
    }

    /// Streamed reply from `provider`; each item is one chunk's delta text.
    pub async fn reply_stream(
        &self,
        provider: Provider,
        prompt: &str,
        images: &[String],
    ) -> anyhow::Result<FragmentStream> {
        let endpoint = self.endpoint(provider)?;
        let request = self.request(&endpoint.model, prompt, images)?;

        info!(%provider, model = %endpoint.model, images = images.len(), "Opening completion stream");
        let stream = endpoint.client.chat().create_stream(request).await?;

        Ok(stream
            .map(|chunk| {
                let chunk = chunk?;
                Ok(chunk
                    .choices
                    .first()
                    .and_then(|choice| choice.delta.content.clone())
                    .unwrap_or_default())
            })
            .boxed())
    }

    /// Web search backed by an online Perplexity model.
    pub async fn search(&self, prompt: &str) -> anyhow::Result<String> {
        let endpoint = self
            .search
            .as_ref()
            .ok_or(LlmError::NotConfigured("Web search", "PERPLEXITY_API_KEY"))?;
        let request = self.request(&endpoint.model, prompt, &[])?;

        debug!(model = %endpoint.model, "Requesting web search");
        let response = endpoint.client.chat().create(request).await?;

        Ok(response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone())
            .unwrap_or_else(|| NO_RESPONSE.to_string()))
    }

    /// Text-to-speech; returns MP3 bytes.
    pub async fn speech(&self, text: &str) -> anyhow::Result<Vec<u8>> {
        let request = CreateSpeechRequestArgs::default()
            .input(text)
            .model(speech_model(&self.tts_model))
            .voice(speech_voice(&self.tts_voice))
            .build()?;

        debug!(model = %self.tts_model, chars = text.chars().count(), "Requesting speech");
        let response = self.openai.client.audio().speech(request).await?;
        Ok(response.bytes.to_vec())
    }
}

/// System prompt followed by the user turn, with images as extra content parts.
fn build_messages(
    system_prompt: &str,
    prompt: &str,
    images: &[String],
) -> anyhow::Result<Vec<ChatCompletionRequestMessage>> {
    let system: ChatCompletionRequestMessage = ChatCompletionRequestSystemMessageArgs::default()
        .content(system_prompt)
        .build()?
        .into();

    let user = if images.is_empty() {
        ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?
    } else {
        let mut parts: Vec<ChatCompletionRequestUserMessageContentPart> = vec![
            ChatCompletionRequestMessageContentPartTextArgs::default()
                .text(prompt)
                .build()?
                .into(),
        ];
        for url in images {
            parts.push(
                ChatCompletionRequestMessageContentPartImageArgs::default()
                    .image_url(ImageUrlArgs::default().url(url.as_str()).build()?)
                    .build()?
                    .into(),
            );
        }
        ChatCompletionRequestUserMessageArgs::default()
            .content(parts)
            .build()?
    };

    Ok(vec![system, user.into()])
}

fn speech_model(name: &str) -> SpeechModel {
    match name {
        "tts-1" => SpeechModel::Tts1,
        "tts-1-hd" => SpeechModel::Tts1Hd,
        other => SpeechModel::Other(other.to_string()),
    }
}

fn speech_voice(name: &str) -> Voice {
    match name.to_ascii_lowercase().as_str() {
        "echo" => Voice::Echo,
        "fable" => Voice::Fable,
        "onyx" => Voice::Onyx,
        "nova" => Voice::Nova,
        "shimmer" => Voice::Shimmer,
        _ => Voice::Alloy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_config;
    use async_openai::types::ChatCompletionRequestUserMessageContent;

    #[test]
    fn test_text_only_messages() {
        let messages = build_messages("sys", "hello", &[]).unwrap();
        assert_eq!(messages.len(), 2);
        match &messages[1] {
            ChatCompletionRequestMessage::User(user) => match &user.content {
                ChatCompletionRequestUserMessageContent::Text(text) => assert_eq!(text, "hello"),
                other => panic!("expected text content, got {:?}", other),
            },
            other => panic!("expected user message, got {:?}", other),
        }
    }

    #[test]
    fn test_image_messages_use_content_parts() {
        let images = vec![
            "https://cdn.example/a.png".to_string(),
            "data:image/png;base64,AAAA".to_string(),
        ];
        let messages = build_messages("sys", "describe", &images).unwrap();
        match &messages[1] {
            ChatCompletionRequestMessage::User(user) => match &user.content {
                ChatCompletionRequestUserMessageContent::Array(parts) => {
                    assert_eq!(parts.len(), 3)
                }
                other => panic!("expected content parts, got {:?}", other),
            },
            other => panic!("expected user message, got {:?}", other),
        }
    }

    #[test]
    fn test_unconfigured_provider_is_an_error() {
        let services = LlmServices::new(&test_config());
        assert!(services.endpoint(Provider::OpenAi).is_ok());
        assert_eq!(services.preferred_provider(), Provider::OpenAi);
        let err = services.endpoint(Provider::XAi).err().unwrap();
        assert!(err.to_string().contains("XAI_API_KEY"));
    }

    #[test]
    fn test_speech_options() {
        assert!(matches!(speech_model("tts-1-hd"), SpeechModel::Tts1Hd));
        assert!(matches!(speech_voice("NOVA"), Voice::Nova));
        assert!(matches!(speech_voice("unknown"), Voice::Alloy));
    }
}
