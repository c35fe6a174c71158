use botscript::ast::IntentDef;
use botscript::engine::{DialogueSession, TurnOutcome};
use botscript::intent::{IntentRecognizer, IntentResult, RecognizerContext, RuleBasedRecognizer};
use botscript::io::BufferIoHandler;
use botscript::lexer::tokenize;
use botscript::parser::parse;
use rustc_hash::FxHashMap;

fn compile(src: &str) -> botscript::ast::Program {
    let (tokens, errors) = tokenize(src);
    assert!(errors.is_empty(), "lex errors: {errors:?}");
    let program = parse(tokens).expect("parse failed");
    program.validate().expect("validate failed");
    program
}

/// A recognizer that always reports a fixed confidence, used for scenario 4
/// where the transition guard — not the recognizer — is under test.
struct FixedConfidenceRecognizer {
    confidence: f64,
}

impl IntentRecognizer for FixedConfidenceRecognizer {
    fn recognize(&mut self, utterance: &str, intents: &[IntentDef], _context: RecognizerContext) -> IntentResult {
        for intent in intents {
            if let Some(pattern) = intent.patterns.first() {
                if utterance.contains(pattern.as_str()) {
                    return IntentResult {
                        intent: intent.name.clone(),
                        confidence: self.confidence,
                        entities: FxHashMap::default(),
                    };
                }
            }
        }
        IntentResult::unknown()
    }
}

#[test]
fn scenario_1_hello_bot_says_hello_then_bye_and_ends() {
    let program = compile(
        r#"bot "Hello" {
            intent Hi { patterns: ["hi"] }
            state S initial { on_enter { say "hello" } when Hi -> E }
            state E final { on_enter { say "bye" } }
        }"#,
    );
    let bot = &program.bots[0];
    let io = BufferIoHandler::default();
    let outputs = io.clone();
    let mut session = DialogueSession::start(bot, Box::new(RuleBasedRecognizer), Box::new(io)).unwrap();
    assert_eq!(outputs.outputs(), vec!["hello"]);

    let outcome = session.turn("hi");
    assert_eq!(outcome, TurnOutcome::Ended);
    assert_eq!(outputs.outputs(), vec!["hello", "bye"]);
}

#[test]
fn scenario_2_fallback_only_fires_when_the_block_exists() {
    let without_fallback = compile(
        r#"bot "Hello" {
            intent Hi { patterns: ["hi"] }
            state S initial { on_enter { say "hello" } when Hi -> E }
            state E final { on_enter { say "bye" } }
        }"#,
    );
    let bot = &without_fallback.bots[0];
    let io = BufferIoHandler::default();
    let outputs = io.clone();
    let mut session = DialogueSession::start(bot, Box::new(RuleBasedRecognizer), Box::new(io)).unwrap();
    let outcome = session.turn("abc");
    assert_eq!(outcome, TurnOutcome::Continuing);
    assert_eq!(outputs.outputs(), vec!["hello"]);

    let with_fallback = compile(
        r#"bot "Hello" {
            intent Hi { patterns: ["hi"] }
            state S initial {
                on_enter { say "hello" }
                when Hi -> E
                fallback { say "?" }
            }
            state E final { on_enter { say "bye" } }
        }"#,
    );
    let bot = &with_fallback.bots[0];
    let io = BufferIoHandler::default();
    let outputs = io.clone();
    let mut session = DialogueSession::start(bot, Box::new(RuleBasedRecognizer), Box::new(io)).unwrap();
    let outcome = session.turn("abc");
    assert_eq!(outcome, TurnOutcome::Continuing);
    assert_eq!(outputs.outputs(), vec!["hello", "?"]);
    assert_eq!(session.current_state(), "S");
}

#[test]
fn scenario_3_arithmetic_and_str_accumulate_across_self_transitions() {
    let program = compile(
        r#"bot "Counter" {
            intent Hi { patterns: ["hi"] }
            var n = 0
            state S initial {
                on_enter { set n = n + 1 say "n=" + str(n) }
                when Hi -> S
            }
        }"#,
    );
    let bot = &program.bots[0];
    let io = BufferIoHandler::default();
    let outputs = io.clone();
    let mut session = DialogueSession::start(bot, Box::new(RuleBasedRecognizer), Box::new(io)).unwrap();
    assert_eq!(outputs.outputs(), vec!["n=1"]);

    for _ in 0..3 {
        assert_eq!(session.turn("hi"), TurnOutcome::Continuing);
    }
    assert_eq!(outputs.outputs(), vec!["n=1", "n=2", "n=3", "n=4"]);
}

#[test]
fn scenario_4_short_circuit_guard_blocks_low_confidence_transition() {
    let program = compile(
        r#"bot "Guarded" {
            intent Hi { patterns: ["hi"] }
            state S initial { when Hi -> T if _confidence > 0.5 }
            state T final {}
        }"#,
    );
    let bot = &program.bots[0];
    let io = BufferIoHandler::default();
    let recognizer = Box::new(FixedConfidenceRecognizer { confidence: 0.3 });
    let mut session = DialogueSession::start(bot, recognizer, Box::new(io)).unwrap();

    let outcome = session.turn("hi");
    assert_eq!(outcome, TurnOutcome::Continuing);
    assert_eq!(session.current_state(), "S");
}

#[test]
fn scenario_5_for_over_list_emits_each_element_in_order() {
    let program = compile(
        r#"bot "Loop" {
            state S initial { on_enter { for x in [1, 2, 3] { say str(x) } } }
        }"#,
    );
    let bot = &program.bots[0];
    let io = BufferIoHandler::default();
    let outputs = io.clone();
    let _session = DialogueSession::start(bot, Box::new(RuleBasedRecognizer), Box::new(io)).unwrap();
    assert_eq!(outputs.outputs(), vec!["1", "2", "3"]);
}

#[test]
fn scenario_6_function_call_uses_default_argument_when_omitted() {
    let program = compile(
        r#"bot "Defaults" {
            var r = 0
            intent Go { patterns: ["go"] }
            func g(a, b = 10) { return a + b }
            state S initial { on_enter { set r = g(5) say str(r) } when Go -> S2 }
            state S2 final { on_enter { set r = g(5, 7) say str(r) } }
        }"#,
    );
    let bot = &program.bots[0];
    let io = BufferIoHandler::default();
    let outputs = io.clone();
    let mut session = DialogueSession::start(bot, Box::new(RuleBasedRecognizer), Box::new(io)).unwrap();
    assert_eq!(outputs.outputs(), vec!["15"]);

    let outcome = session.turn("go");
    assert_eq!(outcome, TurnOutcome::Ended);
    assert_eq!(outputs.outputs(), vec!["15", "12"]);
}
