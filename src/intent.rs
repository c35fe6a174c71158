use rustc_hash::FxHashMap;

use crate::ast::IntentDef;
use crate::env::Environment;
use crate::value::Value;

/// `(utterance, intent catalogue, context) -> (intent, confidence, entities)`
/// — the IntentRecognizer collaborator contract from spec.md §6. The
/// engine never inspects `confidence`/`entities` itself; only scripts do,
/// via the special variables the engine writes before dispatch.
pub struct RecognizerContext<'a> {
    pub current_state: &'a str,
    pub globals: &'a Environment,
}

#[derive(Debug, Clone)]
pub struct IntentResult {
    pub intent: String,
    pub confidence: f64,
    pub entities: FxHashMap<String, String>,
}

impl IntentResult {
    pub fn unknown() -> Self {
        IntentResult {
            intent: "unknown".to_string(),
            confidence: 0.0,
            entities: FxHashMap::default(),
        }
    }
}

pub trait IntentRecognizer {
    fn recognize(&mut self, utterance: &str, intents: &[IntentDef], context: RecognizerContext) -> IntentResult;
}

/// The deterministic fallback recognizer from spec.md §1/§8: the first
/// intent whose first pattern is a substring of the utterance wins, with
/// confidence `1.0`; otherwise `"unknown"` at confidence `0.0`. This is
/// also what `--llm` currently downgrades to (SPEC_FULL.md §1/§6) since no
/// network-backed recognizer ships with this crate.
#[derive(Default)]
pub struct RuleBasedRecognizer;

impl IntentRecognizer for RuleBasedRecognizer {
    fn recognize(&mut self, utterance: &str, intents: &[IntentDef], _context: RecognizerContext) -> IntentResult {
        for intent in intents {
            if let Some(pattern) = intent.patterns.first() {
                if utterance.contains(pattern.as_str()) {
                    return IntentResult {
                        intent: intent.name.clone(),
                        confidence: 1.0,
                        entities: FxHashMap::default(),
                    };
                }
            }
        }
        IntentResult::unknown()
    }
}

/// Renders `_entities` into the list-of-pairs shape `Value::Index` knows
/// how to look up by key (see DESIGN.md's Open Question resolution).
pub fn entities_to_value(entities: &FxHashMap<String, String>) -> Value {
    Value::List(
        entities
            .iter()
            .map(|(k, v)| Value::List(vec![Value::Str(k.clone()), Value::Str(v.clone())]))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn intent(name: &str, patterns: &[&str]) -> IntentDef {
        IntentDef {
            name: name.to_string(),
            line: 1,
            patterns: patterns.iter().map(|s| s.to_string()).collect(),
            description: None,
            examples: vec![],
        }
    }

    #[test]
    fn matches_first_pattern_substring() {
        let mut recognizer = RuleBasedRecognizer;
        let intents = vec![intent("Hi", &["hi"])];
        let env = Environment::new();
        let result = recognizer.recognize(
            "hi there",
            &intents,
            RecognizerContext { current_state: "S", globals: &env },
        );
        assert_eq!(result.intent, "Hi");
        assert_eq!(result.confidence, 1.0);
    }

    #[test]
    fn falls_back_to_unknown() {
        let mut recognizer = RuleBasedRecognizer;
        let intents = vec![intent("Hi", &["hi"])];
        let env = Environment::new();
        let result = recognizer.recognize(
            "abc",
            &intents,
            RecognizerContext { current_state: "S", globals: &env },
        );
        assert_eq!(result.intent, "unknown");
        assert_eq!(result.confidence, 0.0);
    }
}
