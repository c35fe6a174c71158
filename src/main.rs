use std::fs;
use std::io::{self, BufRead, Write};
use std::process::exit;

use anyhow::{Context, Result};
use botscript::ast::Program;
use botscript::engine::{warn_llm_unavailable, DialogueSession, TurnOutcome};
use botscript::intent::RuleBasedRecognizer;
use botscript::io::StdIoHandler;
use botscript::lexer::tokenize;
use botscript::parser::parse;

struct Args {
    script_path: String,
    use_llm: bool,
    debug: bool,
}

fn parse_args() -> Result<Args, lexopt::Error> {
    use lexopt::prelude::*;

    let mut script_path = None;
    let mut use_llm = false;
    let mut debug = false;
    let mut parser = lexopt::Parser::from_env();

    while let Some(arg) = parser.next()? {
        match arg {
            Long("llm") => use_llm = true,
            Long("debug") => debug = true,
            Short('h') | Long("help") => {
                print_usage();
                exit(0);
            }
            Value(val) if script_path.is_none() => {
                script_path = Some(val.string()?);
            }
            _ => return Err(arg.unexpected()),
        }
    }

    Ok(Args {
        script_path: script_path.ok_or_else(|| lexopt::Error::MissingValue { option: Some("SCRIPT".into()) })?,
        use_llm,
        debug,
    })
}

fn print_usage() {
    eprintln!("Usage: botscript [--llm] [--debug] SCRIPT");
}

fn main() {
    env_logger::init();

    let args = match parse_args() {
        Ok(args) => args,
        Err(e) => {
            eprintln!("{e}");
            print_usage();
            exit(2);
        }
    };

    if let Err(e) = run(args) {
        eprintln!("error: {e:?}");
        exit(1);
    }
}

/// Everything past argument parsing that can fail for reasons other than a
/// malformed script (missing file, broken stdin): wrapped in `anyhow`'s
/// `Context` the way the teacher's CLI layer reports its own I/O failures.
fn run(args: Args) -> Result<()> {
    if args.use_llm {
        warn_llm_unavailable();
    }

    let source = fs::read_to_string(&args.script_path)
        .with_context(|| format!("could not read '{}'", args.script_path))?;

    let program = match compile(&source) {
        Ok(program) => program,
        Err(e) => {
            eprintln!("{}", e.render(&source));
            exit(1);
        }
    };

    let bot = program.bots.first().context("script defines no bot")?;

    let io = Box::new(StdIoHandler::new(args.debug));
    let recognizer = Box::new(RuleBasedRecognizer);
    let mut session = match DialogueSession::start(bot, recognizer, io) {
        Ok(session) => session,
        Err(e) => {
            eprintln!("{}", e.render(&source));
            exit(1);
        }
    };

    let stdin = io::stdin();
    while !session.has_ended() {
        print!("> ");
        io::stdout().flush().ok();
        let mut line = String::new();
        if stdin.lock().read_line(&mut line).unwrap_or(0) == 0 {
            break;
        }
        let line = line.trim_end_matches(['\n', '\r']);
        if session.turn(line) == TurnOutcome::Ended {
            break;
        }
    }
    Ok(())
}

fn compile(source: &str) -> Result<Program, botscript::error::ScriptError> {
    let (tokens, errors) = tokenize(source);
    if let Some(first) = errors.into_iter().next() {
        return Err(first);
    }
    let program = parse(tokens)?;
    program.validate()?;
    Ok(program)
}
