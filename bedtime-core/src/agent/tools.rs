//! Tools the storyteller may call.

use crate::facts::{self, Fact};
use claude::{Tool, ToolResult};
use serde_json::{json, Value};

pub const FACT_TOOL: &str = "get_educational_fact";

/// Tool definitions offered to the storyteller.
pub struct FactTools;

impl FactTools {
    /// Get all tool definitions for the Claude API.
    pub fn all() -> Vec<Tool> {
        vec![Self::get_educational_fact()]
    }

    fn get_educational_fact() -> Tool {
        Tool {
            name: FACT_TOOL.to_string(),
            description: "Look up a short, accurate, child-friendly fact about a topic (space, planets, dinosaurs, animals, the ocean). Use this when the story mentions a real-world subject so any fact you weave in is correct.".to_string(),
            input_schema: json!({
                "type": "object",
                "properties": {
                    "topic": {
                        "type": "string",
                        "description": "The subject to look up (e.g., 'Mars', 't-rex', 'penguins', 'coral reef')"
                    }
                },
                "required": ["topic"]
            }),
        }
    }
}

/// Extract the topic from a fact tool call.
///
/// Unknown tools and missing topics come back as the error result to send
/// to the model.
pub fn parse_fact_call(name: &str, input: &Value) -> Result<String, ToolResult> {
    if name != FACT_TOOL {
        return Err(ToolResult::error(format!("Unknown tool: {name}")));
    }
    match input["topic"].as_str().map(str::trim) {
        Some(topic) if !topic.is_empty() => Ok(topic.to_string()),
        _ => Err(ToolResult::error("Missing required field 'topic'")),
    }
}

/// Text returned to the model for a looked-up topic.
pub fn format_fact_result(topic: &str, fact: Option<&Fact>) -> String {
    match fact {
        Some(fact) => format!("Fact about {}: {}", fact.key, fact.text),
        None => format!("No fact found for '{topic}'."),
    }
}

/// Prompt section listing facts found in the request ahead of time.
/// Keys in `verified` passed a fact check and are marked as such.
pub fn grounding_section(found: &[&Fact], verified: &[String]) -> Option<String> {
    if found.is_empty() {
        return None;
    }
    let mut out = String::from(
        "## Educational facts\n\nThese facts are accurate. Weave one or two into the story naturally:\n",
    );
    for fact in found {
        let mark = if verified.iter().any(|k| k == fact.key) {
            ", verified"
        } else {
            ""
        };
        out.push_str(&format!(
            "- {} ({}{}): {}\n",
            fact.key, fact.category, mark, fact.text
        ));
    }
    Some(out)
}

/// Look up a topic and build the tool result text.
pub(crate) fn answer(topic: &str) -> (Option<&'static Fact>, String) {
    let fact = facts::lookup(topic);
    (fact, format_fact_result(topic, fact))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_single_tool_declared() {
        let tools = FactTools::all();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "get_educational_fact");
        assert_eq!(tools[0].input_schema["required"][0], "topic");
    }

    #[test]
    fn test_parse_fact_call() {
        assert_eq!(
            parse_fact_call(FACT_TOOL, &json!({"topic": " Mars "})),
            Ok("Mars".to_string())
        );

        let err = parse_fact_call(FACT_TOOL, &json!({})).unwrap_err();
        assert!(err.is_error);

        let err = parse_fact_call("roll_dice", &json!({"topic": "mars"})).unwrap_err();
        assert!(err.content.contains("Unknown tool"));
    }

    #[test]
    fn test_answer_texts() {
        let (fact, text) = answer("the moon");
        assert_eq!(fact.map(|f| f.key), Some("moon"));
        assert!(text.starts_with("Fact about moon:"));

        let (fact, text) = answer("unicorns");
        assert!(fact.is_none());
        assert_eq!(text, "No fact found for 'unicorns'.");
    }

    #[test]
    fn test_grounding_section() {
        assert!(grounding_section(&[], &[]).is_none());
        let found = facts::detect_topics("penguins on the moon");
        let section = grounding_section(&found, &[]).unwrap();
        assert!(section.contains("- moon (space)"));
        assert!(section.contains("- penguins (animals)"));

        let section = grounding_section(&found, &["moon".to_string()]).unwrap();
        assert!(section.contains("- moon (space, verified)"));
        assert!(section.contains("- penguins (animals):"));
    }
}
