use std::cell::RefCell;
use std::collections::VecDeque;
use std::io::{self, BufRead, Write};
use std::rc::Rc;

/// The IOHandler collaborator contract from spec.md §6. The core treats
/// every call as an opaque synchronous operation (spec.md §5) — it does
/// not retry, time out, or buffer on the handler's behalf.
pub trait IOHandler {
    /// Emits a line to the user.
    fn output(&mut self, text: &str);

    /// Emits `prompt`, then returns one line of user input with its
    /// trailing newline stripped. `None` signals the input stream closed.
    fn input(&mut self, prompt: &str) -> Option<String>;

    /// Optional diagnostic channel; a no-op handler may simply drop this.
    fn debug(&mut self, text: &str);
}

/// The real terminal-backed handler used by the CLI binary.
pub struct StdIoHandler {
    debug_enabled: bool,
}

impl StdIoHandler {
    pub fn new(debug_enabled: bool) -> Self {
        StdIoHandler { debug_enabled }
    }
}

impl IOHandler for StdIoHandler {
    fn output(&mut self, text: &str) {
        println!("{text}");
    }

    fn input(&mut self, prompt: &str) -> Option<String> {
        print!("{prompt}");
        let _ = io::stdout().flush();
        let mut line = String::new();
        match io::stdin().lock().read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line.trim_end_matches(['\n', '\r']).to_string()),
            Err(_) => None,
        }
    }

    fn debug(&mut self, text: &str) {
        if self.debug_enabled {
            eprintln!("[debug] {text}");
        }
    }
}

#[derive(Default)]
struct BufferState {
    outputs: Vec<String>,
    debug_log: Vec<String>,
    inputs: VecDeque<String>,
}

/// A scripted handler for tests and for library consumers driving a
/// session programmatically: `say`/`print` output accumulates in
/// `outputs()`/`debug_log()`, and `ask` drains pre-seeded `inputs` in
/// order. Modeled on the teacher's `FileLoaderTrait`/`MockFileLoader`
/// split. Cloning shares the same underlying buffers (`Rc<RefCell<_>>`),
/// so a test can clone a handle before handing ownership of the other
/// clone to a [`crate::engine::DialogueSession`] and still read back
/// whatever was recorded.
#[derive(Clone, Default)]
pub struct BufferIoHandler {
    state: Rc<RefCell<BufferState>>,
}

impl BufferIoHandler {
    pub fn with_inputs(inputs: impl IntoIterator<Item = impl Into<String>>) -> Self {
        let handler = BufferIoHandler::default();
        handler.state.borrow_mut().inputs = inputs.into_iter().map(Into::into).collect();
        handler
    }

    pub fn outputs(&self) -> Vec<String> {
        self.state.borrow().outputs.clone()
    }

    pub fn debug_log(&self) -> Vec<String> {
        self.state.borrow().debug_log.clone()
    }
}

impl IOHandler for BufferIoHandler {
    fn output(&mut self, text: &str) {
        self.state.borrow_mut().outputs.push(text.to_string());
    }

    fn input(&mut self, _prompt: &str) -> Option<String> {
        self.state.borrow_mut().inputs.pop_front()
    }

    fn debug(&mut self, text: &str) {
        self.state.borrow_mut().debug_log.push(text.to_string());
    }
}
