use log::{debug, error, warn};

use crate::ast::BotDef;
use crate::env::Environment;
use crate::error::ScriptError;
use crate::intent::{entities_to_value, IntentRecognizer, RecognizerContext};
use crate::interpreter::{FlowSignal, Interpreter};
use crate::io::IOHandler;
use crate::value::Value;

/// A tail-recursive `goto` chain longer than this aborts the turn as a
/// runtime error (spec.md §4.5) — it almost certainly means two states
/// are bouncing each other forever.
const MAX_GOTO_CHAIN: usize = 64;

/// Why a turn ended, so the caller (CLI or test) can decide whether to
/// keep prompting.
#[derive(Debug, Clone, PartialEq)]
pub enum TurnOutcome {
    /// The session is still running, possibly in a different state.
    Continuing,
    /// A `final` state was entered; no further turns are accepted.
    Ended,
}

/// Drives one bot definition through its enter/turn/exit lifecycle
/// (spec.md §4.5). Owns the variable environment and the state machine's
/// current position; borrows its collaborators for the session's
/// lifetime.
pub struct DialogueSession<'a> {
    bot: &'a BotDef,
    env: Environment,
    current_state: String,
    recognizer: Box<dyn IntentRecognizer + 'a>,
    io: Box<dyn IOHandler + 'a>,
    ended: bool,
}

impl<'a> DialogueSession<'a> {
    /// Initializes globals in declaration order, enters the bot's unique
    /// initial state, and runs any `goto` chain that follows from its
    /// `on_enter` block. `bot` must already have passed
    /// [`crate::ast::Program::validate`].
    pub fn start(
        bot: &'a BotDef,
        recognizer: Box<dyn IntentRecognizer + 'a>,
        io: Box<dyn IOHandler + 'a>,
    ) -> Result<Self, ScriptError> {
        let mut session = DialogueSession {
            bot,
            env: Environment::new(),
            current_state: String::new(),
            recognizer,
            io,
            ended: false,
        };

        for var in &bot.variables {
            let value = match &var.init {
                Some(expr) => {
                    let mut interp = Interpreter {
                        bot,
                        io: session.io.as_mut(),
                        current_state: "",
                    };
                    interp.eval_expr(&mut session.env, expr)?
                }
                None => Value::Null,
            };
            session.env.define_global(&var.name, value);
        }

        let initial = bot
            .initial_state()
            .expect("Program::validate guarantees exactly one initial state");
        session.current_state = initial.name.clone();
        session.enter(&initial.name.clone())?;
        Ok(session)
    }

    pub fn current_state(&self) -> &str {
        &self.current_state
    }

    pub fn has_ended(&self) -> bool {
        self.ended
    }

    /// Runs `state`'s `on_enter` block, following any `goto` chain it
    /// produces without growing the Rust call stack (spec.md §4.5). Marks
    /// the session ended if the chain settles on a `final` state.
    fn enter(&mut self, state: &str) -> Result<(), ScriptError> {
        let mut state = state.to_string();
        for _ in 0..MAX_GOTO_CHAIN {
            self.current_state = state.clone();
            debug!("entering state '{state}'");
            let def = self
                .bot
                .state(&state)
                .expect("Program::validate guarantees transition targets exist");
            let signal = match &def.on_enter {
                Some(block) => self.run(|interp, env| interp.exec_block(env, block))?,
                None => FlowSignal::Normal,
            };
            match signal {
                FlowSignal::Goto(next) => {
                    state = next;
                    continue;
                }
                _ => {
                    if def.is_final {
                        self.ended = true;
                    }
                    return Ok(());
                }
            }
        }
        Err(ScriptError::runtime(
            def_line(self.bot, &state),
            format!("goto chain exceeded {MAX_GOTO_CHAIN} entries while entering states"),
        ))
    }

    /// Runs one user turn: recognizes `text`'s intent, runs `on_message`,
    /// evaluates transitions in declaration order (first truthy-or-absent
    /// guard wins), and falls back to `fallback` (or silently stays put)
    /// if none match. Per spec.md §4.4/§5, a `Runtime` error here aborts
    /// only this turn — the session's state and variables are preserved
    /// and the error is logged rather than propagated.
    pub fn turn(&mut self, text: &str) -> TurnOutcome {
        if self.ended {
            return TurnOutcome::Ended;
        }
        match self.turn_inner(text) {
            Ok(outcome) => outcome,
            Err(e) => {
                error!("{e}");
                self.io.debug(&e.to_string());
                TurnOutcome::Continuing
            }
        }
    }

    fn turn_inner(&mut self, text: &str) -> Result<TurnOutcome, ScriptError> {
        self.env.define_global("_user_input", Value::Str(text.to_string()));

        let result = self.recognizer.recognize(
            text,
            &self.bot.intents,
            RecognizerContext {
                current_state: &self.current_state,
                globals: &self.env,
            },
        );
        debug!(
            "recognizer: '{text}' -> intent '{}' (confidence {:.2})",
            result.intent, result.confidence
        );
        self.env.define_global("_intent", Value::Str(result.intent.clone()));
        self.env.define_global("_confidence", Value::Float(result.confidence));
        self.env.define_global("_entities", entities_to_value(&result.entities));

        let state_name = self.current_state.clone();
        let def = self
            .bot
            .state(&state_name)
            .expect("current_state always names a declared state");

        if let Some(block) = def.on_message.clone() {
            match self.run(|interp, env| interp.exec_block(env, &block))? {
                FlowSignal::Goto(next) => return self.enter_and_report(next),
                _ => {}
            }
        }

        let mut matched_target: Option<String> = None;
        for transition in &def.transitions {
            if transition.intent_name != result.intent {
                continue;
            }
            let guard_passes = match &transition.guard {
                Some(guard) => self
                    .run(|interp, env| interp.eval_expr(env, guard))?
                    .truthy(),
                None => true,
            };
            if guard_passes {
                matched_target = Some(transition.target_state.clone());
                break;
            }
        }

        match matched_target {
            Some(target) => self.settle(target),
            None => match def.fallback.clone() {
                Some(block) => {
                    if let FlowSignal::Goto(next) = self.run(|interp, env| interp.exec_block(env, &block))? {
                        self.enter_and_report(next)
                    } else {
                        Ok(TurnOutcome::Continuing)
                    }
                }
                None => Ok(TurnOutcome::Continuing),
            },
        }
    }

    /// Runs the current state's `on_exit` (whose own `goto` supersedes the
    /// pending transition, per spec.md §4.5) and then enters `target`
    /// unless `on_exit` redirected elsewhere. Only called on the
    /// transition-match path — spec.md §4.5's pseudocode pairs `exit(S)`
    /// with a found transition, not with every `Goto` source.
    fn settle(&mut self, target: String) -> Result<TurnOutcome, ScriptError> {
        let state_name = self.current_state.clone();
        let def = self
            .bot
            .state(&state_name)
            .expect("current_state always names a declared state");
        let redirected = match def.on_exit.clone() {
            Some(block) => match self.run(|interp, env| interp.exec_block(env, &block))? {
                FlowSignal::Goto(next) => Some(next),
                _ => None,
            },
            None => None,
        };
        debug!("state '{state_name}' -> '{target}'");
        self.enter(&redirected.unwrap_or(target))?;
        Ok(if self.ended { TurnOutcome::Ended } else { TurnOutcome::Continuing })
    }

    /// `Goto` raised from `on_message`/`fallback` is handled exactly "as in
    /// enter" (spec.md §4.5): it tail-calls `enter(T)` directly with no
    /// intervening `exit(S)`, unlike a matched transition's `settle`.
    fn enter_and_report(&mut self, target: String) -> Result<TurnOutcome, ScriptError> {
        debug!("goto '{target}' from on_message/fallback (no on_exit run)");
        self.enter(&target)?;
        Ok(if self.ended { TurnOutcome::Ended } else { TurnOutcome::Continuing })
    }

    fn run<T>(
        &mut self,
        f: impl FnOnce(&mut Interpreter, &mut Environment) -> Result<T, ScriptError>,
    ) -> Result<T, ScriptError> {
        let mut interp = Interpreter {
            bot: self.bot,
            io: self.io.as_mut(),
            current_state: &self.current_state,
        };
        f(&mut interp, &mut self.env)
    }
}

fn def_line(bot: &BotDef, state: &str) -> usize {
    bot.state(state).map(|s| s.line).unwrap_or(0)
}

/// Downgrades `--llm` to the rule-based recognizer (SPEC_FULL.md §1/§6):
/// no network-backed recognizer ships with this crate, so asking for one
/// is honored as a warning rather than a hard error.
pub fn warn_llm_unavailable() {
    warn!("--llm was requested but no LLM-backed recognizer is built into this crate; using the rule-based recognizer instead");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::RuleBasedRecognizer;
    use crate::io::BufferIoHandler;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn start(src: &str) -> crate::ast::Program {
        let (tokens, errors) = tokenize(src);
        assert!(errors.is_empty());
        let program = parse(tokens).expect("parse failed");
        program.validate().expect("validate failed");
        program
    }

    #[test]
    fn start_runs_on_enter_of_initial_state() {
        let program = start(r#"bot "B" { state S initial { on_enter { say "hello" } } }"#);
        let bot = &program.bots[0];
        let io = Box::new(BufferIoHandler::default());
        let recognizer = Box::new(RuleBasedRecognizer);
        let session = DialogueSession::start(bot, recognizer, io).unwrap();
        assert_eq!(session.current_state(), "S");
    }

    #[test]
    fn turn_follows_matching_transition() {
        let program = start(
            r#"bot "B" {
                intent Hi { patterns: ["hi"] }
                state S initial { when Hi -> T }
                state T final { on_enter { say "arrived" } }
            }"#,
        );
        let bot = &program.bots[0];
        let io = Box::new(BufferIoHandler::default());
        let recognizer = Box::new(RuleBasedRecognizer);
        let mut session = DialogueSession::start(bot, recognizer, io).unwrap();
        let outcome = session.turn("hi there");
        assert_eq!(outcome, TurnOutcome::Ended);
        assert!(session.has_ended());
    }

    #[test]
    fn turn_runs_fallback_when_nothing_matches() {
        let program = start(
            r#"bot "B" {
                intent Hi { patterns: ["hi"] }
                state S initial {
                    when Hi -> S
                    fallback { say "huh?" }
                }
            }"#,
        );
        let bot = &program.bots[0];
        let io = BufferIoHandler::default();
        let recognizer = Box::new(RuleBasedRecognizer);
        let mut session = DialogueSession::start(bot, recognizer, Box::new(io)).unwrap();
        let outcome = session.turn("gibberish");
        assert_eq!(outcome, TurnOutcome::Continuing);
    }

    #[test]
    fn guarded_transition_is_skipped_when_guard_is_false() {
        let program = start(
            r#"bot "B" {
                intent Hi { patterns: ["hi"] }
                var allow = false
                state S initial {
                    when Hi -> T if allow
                    fallback { say "no" }
                }
                state T final {}
            }"#,
        );
        let bot = &program.bots[0];
        let io = BufferIoHandler::default();
        let recognizer = Box::new(RuleBasedRecognizer);
        let mut session = DialogueSession::start(bot, recognizer, Box::new(io)).unwrap();
        let outcome = session.turn("hi");
        assert_eq!(outcome, TurnOutcome::Continuing);
        assert_eq!(session.current_state(), "S");
    }

    #[test]
    fn goto_from_on_message_does_not_run_on_exit() {
        let program = start(
            r#"bot "B" {
                state S initial {
                    on_exit { say "leaving" }
                    on_message { goto T }
                }
                state T final { on_enter { say "arrived" } }
            }"#,
        );
        let bot = &program.bots[0];
        let io = BufferIoHandler::default();
        let outputs = io.clone();
        let recognizer = Box::new(RuleBasedRecognizer);
        let mut session = DialogueSession::start(bot, recognizer, Box::new(io)).unwrap();
        let outcome = session.turn("anything");
        assert_eq!(outcome, TurnOutcome::Ended);
        assert_eq!(outputs.outputs(), vec!["arrived"], "on_exit must not run for a goto from on_message");
    }

    #[test]
    fn goto_from_fallback_does_not_run_on_exit() {
        let program = start(
            r#"bot "B" {
                intent Hi { patterns: ["hi"] }
                state S initial {
                    on_exit { say "leaving" }
                    when Hi -> S
                    fallback { goto T }
                }
                state T final { on_enter { say "arrived" } }
            }"#,
        );
        let bot = &program.bots[0];
        let io = BufferIoHandler::default();
        let outputs = io.clone();
        let recognizer = Box::new(RuleBasedRecognizer);
        let mut session = DialogueSession::start(bot, recognizer, Box::new(io)).unwrap();
        let outcome = session.turn("nothing matches");
        assert_eq!(outcome, TurnOutcome::Ended);
        assert_eq!(outputs.outputs(), vec!["arrived"], "on_exit must not run for a goto from fallback");
    }

    #[test]
    fn unconditional_self_goto_trips_the_state_entry_cap_exactly_once() {
        let program = start(
            r#"bot "B" {
                intent Go { patterns: ["go"] }
                state S initial { when Go -> L }
                state L { on_enter { goto L } }
            }"#,
        );
        let bot = &program.bots[0];
        let io = BufferIoHandler::default();
        let debug = io.clone();
        let recognizer = Box::new(RuleBasedRecognizer);
        let mut session = DialogueSession::start(bot, recognizer, Box::new(io)).unwrap();
        let outcome = session.turn("go");
        assert_eq!(outcome, TurnOutcome::Continuing);
        assert_eq!(debug.debug_log().len(), 1, "exactly one RuntimeError should be reported per turn");
    }

    #[test]
    fn runtime_error_during_turn_preserves_session_state() {
        let program = start(
            r#"bot "B" {
                intent Boom { patterns: ["boom"] }
                state S initial { when Boom -> S }
            }"#,
        );
        let bot = &program.bots[0];
        let io = BufferIoHandler::default();
        let recognizer = Box::new(RuleBasedRecognizer);
        let mut session = DialogueSession::start(bot, recognizer, Box::new(io)).unwrap();
        let outcome = session.turn("nothing matches this");
        assert_eq!(outcome, TurnOutcome::Continuing);
        assert_eq!(session.current_state(), "S");
    }
}
