use regex::{Captures, Regex};
use std::sync::OnceLock;
use thiserror::Error;

const REQUIREMENTS_TEMPLATE: &str = r#"You are a helpful AI assistant specialized in analyzing software requirements documents.

RULES:
- Answer ONLY the question below using the provided context
- If not related to the requirements document, say: "I don't know. This question is not related to the requirements document."
- Cite requirement IDs when available
- Do NOT generate follow-up questions

Context:
{context}

Question: {question}

Answer:"#;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum PromptError {
    #[error("Template does not contain placeholder {{{0}}}")]
    MissingPlaceholder(String),

    #[error("No value supplied for prompt variable '{0}'")]
    MissingValue(String),
}

fn placeholder_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid placeholder regex"))
}

/// A prompt with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    template: String,
    input_variables: Vec<String>,
}

impl PromptTemplate {
    pub fn new(template: impl Into<String>, input_variables: &[&str]) -> Result<Self, PromptError> {
        let template = template.into();
        for name in input_variables {
            if !template.contains(&format!("{{{}}}", name)) {
                return Err(PromptError::MissingPlaceholder(name.to_string()));
            }
        }
        Ok(Self {
            template,
            input_variables: input_variables.iter().map(|s| s.to_string()).collect(),
        })
    }

    /// Prompt used for question answering over requirements documents
    pub fn requirements() -> Self {
        Self {
            template: REQUIREMENTS_TEMPLATE.to_string(),
            input_variables: vec!["context".to_string(), "question".to_string()],
        }
    }

    pub fn input_variables(&self) -> &[String] {
        &self.input_variables
    }

    pub fn template(&self) -> &str {
        &self.template
    }

    /// Substitutes in a single pass, so values containing `{...}` are left as-is.
    pub fn format(&self, values: &[(&str, &str)]) -> Result<String, PromptError> {
        let lookup = |name: &str| values.iter().find(|(k, _)| *k == name).map(|(_, v)| *v);

        for name in &self.input_variables {
            if lookup(name).is_none() {
                return Err(PromptError::MissingValue(name.clone()));
            }
        }

        let rendered = placeholder_regex().replace_all(&self.template, |caps: &Captures| {
            let name = &caps[1];
            match lookup(name) {
                Some(value) if self.input_variables.iter().any(|v| v == name) => value.to_string(),
                _ => caps[0].to_string(),
            }
        });
        Ok(rendered.into_owned())
    }
}
