use std::{fs, path::Path};

use serde::Deserialize;
use tokenizers::Tokenizer;
use tracing::debug;

use crate::{
    error::LmError,
    model::{
        prompt::{ChatMessage, PromptStyle},
        source::ModelSource,
    },
};

const FALLBACK_EOS_TOKENS: [&str; 4] = ["</s>", "<|endoftext|>", "<|eot_id|>", "<|im_end|>"];

#[derive(Debug, Default, Deserialize)]
struct TokenizerConfigFile {
    chat_template: Option<ChatTemplateField>,
    eos_token: Option<TokenField>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ChatTemplateField {
    Single(String),
    Named(Vec<NamedTemplate>),
}

#[derive(Debug, Deserialize)]
struct NamedTemplate {
    name: String,
    template: String,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum TokenField {
    Plain(String),
    Added { content: String },
}

impl ChatTemplateField {
    fn default_template(&self) -> Option<&str> {
        match self {
            ChatTemplateField::Single(t) => Some(t.as_str()),
            ChatTemplateField::Named(list) => list
                .iter()
                .find(|t| t.name == "default")
                .or_else(|| list.first())
                .map(|t| t.template.as_str()),
        }
    }
}

impl TokenField {
    fn content(&self) -> &str {
        match self {
            TokenField::Plain(s) => s,
            TokenField::Added { content } => content,
        }
    }
}

/// Tokenizer plus the facts about it that generation needs.
pub struct TokenizerHandle {
    inner: Tokenizer,
    eos_token_id: Option<u32>,
    style: PromptStyle,
}

impl TokenizerHandle {
    pub fn new(inner: Tokenizer, eos_token: Option<&str>, chat_template: Option<&str>) -> Self {
        let eos_token_id = eos_token
            .and_then(|t| inner.token_to_id(t))
            .or_else(|| FALLBACK_EOS_TOKENS.iter().find_map(|t| inner.token_to_id(t)));
        Self {
            inner,
            eos_token_id,
            style: PromptStyle::from_template(chat_template),
        }
    }

    pub fn from_source(source: &ModelSource) -> Result<Self, LmError> {
        let inner = Tokenizer::from_file(source.tokenizer_path.as_path())
            .map_err(|e| LmError::Tokenizer(e.to_string()))?;
        let config = match &source.tokenizer_config_path {
            Some(path) => read_tokenizer_config(path)?,
            None => TokenizerConfigFile::default(),
        };

        let template = config
            .chat_template
            .as_ref()
            .and_then(ChatTemplateField::default_template);
        let handle = Self::new(
            inner,
            config.eos_token.as_ref().map(TokenField::content),
            template,
        );
        debug!(style = ?handle.style, eos = ?handle.eos_token_id, "tokenizer loaded");
        Ok(handle)
    }

    pub fn style(&self) -> PromptStyle {
        self.style
    }

    pub fn eos_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    /// Reuses eos as padding; many causal models ship without a pad token.
    pub fn pad_token_id(&self) -> Option<u32> {
        self.eos_token_id
    }

    pub fn format_prompt(&self, user_message: &str) -> String {
        self.style.format(user_message)
    }

    /// Renders a multi-turn conversation, or joins the contents for plain tokenizers.
    pub fn format_conversation(&self, messages: &[ChatMessage]) -> String {
        match self.style {
            PromptStyle::Chat(format) => format.render(messages, true),
            PromptStyle::Plain => messages
                .iter()
                .map(|m| m.content.as_str())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    pub fn encode(&self, text: &str) -> Result<Vec<u32>, LmError> {
        let encoding = self
            .inner
            .encode(text, true)
            .map_err(|e| LmError::Tokenizer(e.to_string()))?;
        Ok(encoding.get_ids().to_vec())
    }

    pub fn decode(&self, ids: &[u32]) -> Result<String, LmError> {
        self.inner
            .decode(ids, true)
            .map_err(|e| LmError::Tokenizer(e.to_string()))
    }
}

fn read_tokenizer_config(path: &Path) -> Result<TokenizerConfigFile, LmError> {
    let raw = fs::read_to_string(path)?;
    serde_json::from_str(&raw)
        .map_err(|e| LmError::Tokenizer(format!("invalid {}: {e}", path.display())))
}

#[cfg(test)]
pub(crate) mod tests {
    use std::str::FromStr;

    use super::*;
    use crate::model::prompt::ChatFormat;

    /// Word-level vocabulary: `</s>`=0, `<unk>`=1, then plain words.
    pub(crate) const TINY_TOKENIZER: &str = r#"{
        "version": "1.0",
        "truncation": null,
        "padding": null,
        "added_tokens": [
            {"id": 0, "content": "</s>", "single_word": false, "lstrip": false,
             "rstrip": false, "normalized": false, "special": true}
        ],
        "normalizer": null,
        "pre_tokenizer": {"type": "Whitespace"},
        "post_processor": null,
        "decoder": null,
        "model": {
            "type": "WordLevel",
            "vocab": {"</s>": 0, "<unk>": 1, "hello": 2, "world": 3, "rust": 4, "borrow": 5},
            "unk_token": "<unk>"
        }
    }"#;

    pub(crate) fn tiny_tokenizer(chat_template: Option<&str>) -> TokenizerHandle {
        let inner = Tokenizer::from_str(TINY_TOKENIZER).unwrap();
        TokenizerHandle::new(inner, None, chat_template)
    }

    #[test]
    fn eos_falls_back_to_known_tokens() {
        let tok = tiny_tokenizer(None);
        assert_eq!(tok.eos_token_id(), Some(0));
        assert_eq!(tok.pad_token_id(), tok.eos_token_id());
    }

    #[test]
    fn decode_skips_special_tokens() {
        let tok = tiny_tokenizer(None);
        let ids = tok.encode("hello world").unwrap();
        assert_eq!(ids, vec![2, 3]);
        let mut with_eos = ids.clone();
        with_eos.push(0);
        assert_eq!(tok.decode(&with_eos).unwrap(), "hello world");
    }

    #[test]
    fn config_file_selects_chat_style_and_eos() {
        let dir = tempfile::tempdir().unwrap();
        let tokenizer_path = dir.path().join("tokenizer.json");
        let config_path = dir.path().join("tokenizer_config.json");
        fs::write(&tokenizer_path, TINY_TOKENIZER).unwrap();
        fs::write(
            &config_path,
            r#"{"chat_template": "{% for m in messages %}<|im_start|>{{ m.role }}{% endfor %}",
                "eos_token": {"content": "</s>", "special": true}}"#,
        )
        .unwrap();

        let source = ModelSource {
            model_id: "tiny".into(),
            model_path: dir.path().join("model.ts"),
            tokenizer_path,
            tokenizer_config_path: Some(config_path),
        };
        let tok = TokenizerHandle::from_source(&source).unwrap();
        assert_eq!(tok.style(), PromptStyle::Chat(ChatFormat::ChatMl));
        assert_eq!(tok.eos_token_id(), Some(0));
    }

    #[test]
    fn named_templates_prefer_default() {
        let field: ChatTemplateField = serde_json::from_str(
            r#"[{"name": "tool_use", "template": "[INST]"},
                {"name": "default", "template": "<|user|>"}]"#,
        )
        .unwrap();
        assert_eq!(field.default_template(), Some("<|user|>"));
    }

    #[test]
    fn plain_conversation_joins_contents() {
        let tok = tiny_tokenizer(None);
        let text =
            tok.format_conversation(&[ChatMessage::system("be brief"), ChatMessage::user("hello")]);
        assert_eq!(text, "be brief\nhello");
    }
}
