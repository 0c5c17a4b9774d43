// file: src/summary/prompt.rs
// description: grounded prompt templates for the generative service
// reference: placeholder substitution over a fixed template

use std::collections::HashMap;

pub const SYSTEM_PROMPT: &str = "You summarise blood bank search results. \
Use only facts that appear in the numbered records. Do not mention any city, \
hospital, person or blood group that is not in the records. \
Answer in at most three sentences.";

const DEFAULT_USER_TEMPLATE: &str = "Records:\n{context}\n\nQuestion: {query}\n\nSummary:";

pub struct PromptTemplate {
    template: String,
}

impl PromptTemplate {
    pub fn new() -> Self {
        Self {
            template: DEFAULT_USER_TEMPLATE.to_string(),
        }
    }

    pub fn with_custom_template(template: String) -> Self {
        Self { template }
    }

    pub fn render(&self, context: &str, query: &str) -> String {
        // Substitute query last so a `{context}` typed by the user stays literal
        self.template
            .replace("{context}", context)
            .replace("{query}", query)
    }

    pub fn render_with_map(&self, values: &HashMap<String, String>) -> String {
        let mut result = self.template.clone();

        for (key, value) in values {
            let placeholder = format!("{{{}}}", key);
            result = result.replace(&placeholder, value);
        }

        result
    }

    /// A usable template must place the record context somewhere.
    pub fn is_grounded(&self) -> bool {
        self.template.contains("{context}")
    }
}

impl Default for PromptTemplate {
    fn default() -> Self {
        Self::new()
    }
}
