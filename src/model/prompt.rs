//! Prompt formatting. Whether a tokenizer is chat-capable is decided once when
//! it is loaded; formatting never probes the tokenizer again.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    System,
    User,
    Assistant,
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }
}

/// Template families recognised from the markers in a `chat_template`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChatFormat {
    Zephyr,
    ChatMl,
    Llama3,
    Llama2,
    /// `User:` / `Assistant:` labels, used for templates we cannot classify.
    RoleLabels,
}

impl ChatFormat {
    pub fn detect(template: &str) -> Self {
        if template.contains("<|start_header_id|>") {
            ChatFormat::Llama3
        } else if template.contains("<|im_start|>") {
            ChatFormat::ChatMl
        } else if template.contains("<|user|>") || template.contains("<|system|>") {
            ChatFormat::Zephyr
        } else if template.contains("[INST]") {
            ChatFormat::Llama2
        } else {
            ChatFormat::RoleLabels
        }
    }

    pub fn render(self, messages: &[ChatMessage], add_generation_prompt: bool) -> String {
        let mut out = String::new();
        match self {
            ChatFormat::Zephyr => {
                for m in messages {
                    out.push_str(&format!("<|{}|>\n{}</s>\n", m.role, m.content));
                }
                if add_generation_prompt {
                    out.push_str("<|assistant|>\n");
                }
            }
            ChatFormat::ChatMl => {
                for m in messages {
                    out.push_str(&format!("<|im_start|>{}\n{}<|im_end|>\n", m.role, m.content));
                }
                if add_generation_prompt {
                    out.push_str("<|im_start|>assistant\n");
                }
            }
            ChatFormat::Llama3 => {
                out.push_str("<|begin_of_text|>");
                for m in messages {
                    out.push_str(&format!(
                        "<|start_header_id|>{}<|end_header_id|>\n\n{}<|eot_id|>",
                        m.role, m.content
                    ));
                }
                if add_generation_prompt {
                    out.push_str("<|start_header_id|>assistant<|end_header_id|>\n\n");
                }
            }
            ChatFormat::Llama2 => render_llama2(&mut out, messages),
            ChatFormat::RoleLabels => {
                for m in messages {
                    let label = match m.role {
                        Role::System => "System",
                        Role::User => "User",
                        Role::Assistant => "Assistant",
                    };
                    out.push_str(&format!("{label}: {}\n\n", m.content));
                }
                if add_generation_prompt {
                    out.push_str("Assistant: ");
                }
            }
        }
        out
    }
}

// [INST] blocks carry the cue themselves, so there is no separate generation prompt.
fn render_llama2(out: &mut String, messages: &[ChatMessage]) {
    let mut system: Option<&str> = None;
    for m in messages {
        match m.role {
            Role::System => system = Some(m.content.as_str()),
            Role::User => {
                let content = match system.take() {
                    Some(sys) => format!("<<SYS>>\n{sys}\n<</SYS>>\n\n{}", m.content),
                    None => m.content.clone(),
                };
                out.push_str(&format!("<s>[INST] {} [/INST]", content.trim()));
            }
            Role::Assistant => out.push_str(&format!(" {} </s>", m.content.trim())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PromptStyle {
    Plain,
    Chat(ChatFormat),
}

impl PromptStyle {
    pub fn from_template(template: Option<&str>) -> Self {
        match template {
            Some(t) if !t.trim().is_empty() => PromptStyle::Chat(ChatFormat::detect(t)),
            _ => PromptStyle::Plain,
        }
    }

    pub fn format(self, user_message: &str) -> String {
        match self {
            PromptStyle::Plain => user_message.to_string(),
            PromptStyle::Chat(format) => format.render(&[ChatMessage::user(user_message)], true),
        }
    }
}
