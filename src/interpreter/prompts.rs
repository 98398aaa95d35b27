//! Prompt templates for the three generation requests.
//!
//! Templates use `{name}` placeholders and can be overridden from the
//! `[interpreter.prompts]` section of the configuration file.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::message::Force;

/// JSON key the classifier answers under.
pub const FORCE_KEY: &str = "Illocutionary Force";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptTemplates {
    /// Placeholders: `{sentence}`, `{forces}`.
    #[serde(default = "default_classify")]
    pub classify: String,
    /// Placeholders: `{sentence}`, `{nearest}`, `{force}`, `{examples}`.
    #[serde(default = "default_to_structured")]
    pub to_structured: String,
    /// Placeholders: `{sender}`, `{force}`, `{content}`.
    #[serde(default = "default_to_text")]
    pub to_text: String,
}

fn default_classify() -> String {
    "Classify the illocutionary force of the sentence written by a user to a team of agents.\n\
     - tell: the user states a fact or shares information\n\
     - achieve: the user asks the agent to do something\n\
     - askOne: the user asks for one piece of information\n\
     - askAll: the user asks for every piece of information of some kind\n\
     - askHow: the user asks how something is done\n\
     Allowed values: {forces}.\n\
     Answer with a JSON object with the single key \"Illocutionary Force\".\n\
     Sentence: {sentence}"
        .into()
}

fn default_to_structured() -> String {
    "Translate the sentence into a logic term. Terms are given as JSON records: \
     \"functor\" is the predicate name and \"arg0\", \"arg1\", ... are its arguments.\n\
     The closest term the agents know is {nearest} and the sentence is a {force}.\n\
     Other terms of the same shape: {examples}.\n\
     Keep the functor. Fill each argument with what the sentence says; atoms are \
     lower-case words, strings are quoted, numbers are plain numbers. Use null when the \
     sentence does not give a value.\n\
     Sentence: {sentence}"
        .into()
}

fn default_to_text() -> String {
    "You relay messages from software agents to a human in a chat. Agent {sender} sent a \
     {force} message with content {content}.\n\
     Write one short, natural English sentence telling the human what the agent said. \
     Do not mention the message format."
        .into()
}

impl Default for PromptTemplates {
    fn default() -> Self {
        Self {
            classify: default_classify(),
            to_structured: default_to_structured(),
            to_text: default_to_text(),
        }
    }
}

impl PromptTemplates {
    pub fn render_classify(&self, sentence: &str, forces: &[Force]) -> String {
        let names: Vec<&str> = forces.iter().map(|f| f.as_str()).collect();
        self.classify
            .replace("{forces}", &names.join(", "))
            .replace("{sentence}", sentence)
    }

    /// `hints` are appended one per line after the filled template.
    pub fn render_to_structured(
        &self,
        sentence: &str,
        nearest: &Value,
        force: Force,
        examples: &[Value],
        hints: &[String],
    ) -> String {
        let mut prompt = self
            .to_structured
            .replace("{nearest}", &nearest.to_string())
            .replace("{force}", force.as_str())
            .replace("{examples}", &Value::from(examples.to_vec()).to_string())
            .replace("{sentence}", sentence);
        for hint in hints {
            prompt.push('\n');
            prompt.push_str(hint);
        }
        prompt
    }

    pub fn render_to_text(&self, sender: &str, force: Force, content: &str) -> String {
        self.to_text
            .replace("{sender}", sender)
            .replace("{force}", force.as_str())
            .replace("{content}", content)
    }
}

/// Single-property object whose value is one of `forces`.
pub fn classify_schema(forces: &[Force]) -> Value {
    let names: Vec<&str> = forces.iter().map(|f| f.as_str()).collect();
    json!({
        "type": "object",
        "properties": {
            FORCE_KEY: { "type": "string", "enum": names },
        },
        "required": [FORCE_KEY],
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classify_prompt_and_schema() {
        let p = PromptTemplates::default();
        let forces = [Force::Tell, Force::AskHow];
        let prompt = p.render_classify("i ordered sushi", &forces);
        assert!(prompt.contains("Allowed values: tell, askHow."));
        assert!(prompt.ends_with("Sentence: i ordered sushi"));
        let schema = classify_schema(&forces);
        assert_eq!(
            schema["properties"][FORCE_KEY]["enum"],
            json!(["tell", "askHow"])
        );
        assert_eq!(schema["required"], json!([FORCE_KEY]));
    }

    #[test]
    fn structured_prompt_includes_records_and_hints() {
        let p = PromptTemplates::default();
        let nearest = json!({"functor": "order", "arg0": "pizza"});
        let prompt = p.render_to_structured(
            "I ordered sushi",
            &nearest,
            Force::Tell,
            &[nearest.clone()],
            &[" - arg0 should contain [Food]".to_string()],
        );
        assert!(prompt.contains(r#"{"arg0":"pizza","functor":"order"}"#));
        assert!(prompt.contains("is a tell"));
        assert!(prompt.contains(r#"shape: [{"arg0":"pizza","functor":"order"}]"#));
        assert!(prompt.ends_with("Sentence: I ordered sushi\n - arg0 should contain [Food]"));
    }

    #[test]
    fn templates_can_be_overridden_from_toml() {
        let p: PromptTemplates = toml::from_str("to_text = \"{sender}/{force}/{content}\"").unwrap();
        assert_eq!(p.render_to_text("bob", Force::AskOne, "price(X)"), "bob/askOne/price(X)");
        assert_eq!(p.classify, PromptTemplates::default().classify);
    }
}
