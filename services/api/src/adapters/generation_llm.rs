//! services/api/src/adapters/generation_llm.rs
//!
//! This module contains the adapter for the generative-language service.
//! It implements the `GenerationService` port from the `core` crate over the
//! OpenAI chat completions protocol, which Gemini also exposes.

use async_openai::{
    config::OpenAIConfig,
    error::OpenAIError,
    types::chat::{
        ChatCompletionRequestAssistantMessageArgs, ChatCompletionRequestMessage,
        ChatCompletionRequestSystemMessageArgs, ChatCompletionRequestUserMessageArgs,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use regex::Regex;
use talki_core::{
    domain::{Message, SenderType},
    ports::{GenerationService, PortError, PortResult},
};
use tracing::info;

const PHRASES_INSTRUCTIONS: &str = "You help English learners study reading material. Reply with a JSON array of strings and nothing else.";

const CONVERSATION_INSTRUCTIONS: &str = "You are a friendly English conversation partner. The user is practising conversation about a text they have read. Keep replies short, natural and encouraging, and ask a follow-up question when it helps the conversation continue.";

/// Few-shot prompt asking for ten phrases about the given text.
fn phrases_prompt(source_text: &str) -> String {
    [
        "Generate 10 useful English phrases related to {topic}, focusing on describing and discussing it. Include synonyms and related terms for {topic}.",
        "topic: climate change",
        "output: [\"The planet is experiencing an unprecedented rise in global temperatures.\", \"Human activities are the primary drivers of climate change.\", \"Rising sea levels threaten coastal communities around the world.\", \"Extreme weather events, such as hurricanes and heatwaves, are becoming more frequent and intense.\", \"Greenhouse gases, such as carbon dioxide and methane, trap heat in the atmosphere.\", \"Climate change poses a significant threat to biodiversity and ecosystems.\", \"Renewable energy sources, such as solar and wind power, are essential for mitigating climate change.\", \"Carbon emissions must be drastically reduced to limit global warming.\", \"Climate change is a complex and urgent issue that requires global cooperation.\", \"Sustainable practices, such as reducing consumption and improving energy efficiency, are crucial for addressing climate change.\"]",
        &format!("topic: {}", source_text),
        "output: ",
    ]
    .join("\n")
}

/// Parses the service's reply into a list of phrases.
///
/// Accepts a bare JSON array or one wrapped in a markdown code fence. Anything
/// that is not an array of strings is an error.
pub fn parse_phrase_list(raw: &str) -> PortResult<Vec<String>> {
    let fence = Regex::new(r"(?s)^\s*```[a-zA-Z]*\s*(.*?)\s*```\s*$")
        .map_err(|e| PortError::Unexpected(e.to_string()))?;
    let body = match fence.captures(raw) {
        Some(caps) => caps.get(1).map_or("", |m| m.as_str()),
        None => raw.trim(),
    };
    if body.is_empty() {
        return Err(PortError::Generation(
            "phrase generation returned an empty reply".to_string(),
        ));
    }

    let phrases: Vec<String> = serde_json::from_str(body).map_err(|e| {
        PortError::Generation(format!("phrase reply is not a JSON list of strings: {}", e))
    })?;

    Ok(phrases
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect())
}

fn build_error(e: OpenAIError) -> PortError {
    PortError::Generation(e.to_string())
}

/// Replays the stored history as chat completion turns. Only bot messages are
/// sent with the assistant role; user and system messages go as user turns.
pub fn conversation_turns(
    history: &[Message],
    content: &str,
) -> PortResult<Vec<ChatCompletionRequestMessage>> {
    let mut turns: Vec<ChatCompletionRequestMessage> = Vec::with_capacity(history.len() + 2);
    turns.push(
        ChatCompletionRequestSystemMessageArgs::default()
            .content(CONVERSATION_INSTRUCTIONS)
            .build()
            .map_err(build_error)?
            .into(),
    );

    for message in history {
        let turn: ChatCompletionRequestMessage = match message.sender {
            SenderType::Bot => ChatCompletionRequestAssistantMessageArgs::default()
                .content(message.content.as_str())
                .build()
                .map_err(build_error)?
                .into(),
            SenderType::User | SenderType::System => {
                ChatCompletionRequestUserMessageArgs::default()
                    .content(message.content.as_str())
                    .build()
                    .map_err(build_error)?
                    .into()
            }
        };
        turns.push(turn);
    }

    turns.push(
        ChatCompletionRequestUserMessageArgs::default()
            .content(content)
            .build()
            .map_err(build_error)?
            .into(),
    );
    Ok(turns)
}

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// An adapter that implements `GenerationService` using an OpenAI-compatible LLM.
#[derive(Clone)]
pub struct OpenAiGenerationAdapter {
    client: Client<OpenAIConfig>,
    phrase_model: String,
    chat_model: String,
}

impl OpenAiGenerationAdapter {
    /// Creates a new `OpenAiGenerationAdapter`.
    pub fn new(client: Client<OpenAIConfig>, phrase_model: String, chat_model: String) -> Self {
        Self {
            client,
            phrase_model,
            chat_model,
        }
    }

    /// Sends the turns and returns the text of the first choice.
    async fn complete(
        &self,
        model: &str,
        messages: Vec<ChatCompletionRequestMessage>,
    ) -> PortResult<String> {
        let request = CreateChatCompletionRequestArgs::default()
            .model(model)
            .messages(messages)
            .n(1)
            .build()
            .map_err(build_error)?;

        // Call the API and manually map the error if it occurs, which respects the orphan rule.
        let response = self
            .client
            .chat()
            .create(request)
            .await
            .map_err(build_error)?;

        let choice = response.choices.into_iter().next().ok_or_else(|| {
            PortError::Generation("generation service returned no candidates".to_string())
        })?;
        match choice.message.content {
            Some(content) if !content.trim().is_empty() => Ok(content),
            _ => Err(PortError::Generation(
                "generation service returned no text content".to_string(),
            )),
        }
    }
}

//=========================================================================================
// `GenerationService` Trait Implementation
//=========================================================================================

#[async_trait]
impl GenerationService for OpenAiGenerationAdapter {
    async fn generate_phrases(&self, source_text: &str) -> PortResult<Vec<String>> {
        info!("Generating phrases with {}", self.phrase_model);
        let messages = vec![
            ChatCompletionRequestSystemMessageArgs::default()
                .content(PHRASES_INSTRUCTIONS)
                .build()
                .map_err(build_error)?
                .into(),
            ChatCompletionRequestUserMessageArgs::default()
                .content(phrases_prompt(source_text))
                .build()
                .map_err(build_error)?
                .into(),
        ];

        let raw = self.complete(&self.phrase_model, messages).await?;
        parse_phrase_list(&raw)
    }

    async fn send_message(&self, history: &[Message], content: &str) -> PortResult<String> {
        let turns = conversation_turns(history, content)?;
        self.complete(&self.chat_model, turns).await
    }
}
