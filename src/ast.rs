use rustc_hash::FxHashMap;

use crate::error::ScriptError;

/// A full program: an ordered sequence of bot definitions (spec.md §3).
#[derive(Debug, Clone)]
pub struct Program {
    pub bots: Vec<BotDef>,
}

impl Program {
    /// Cross-reference checks that need the whole bot in hand, run eagerly
    /// right after parsing rather than lazily at dispatch time (a stricter
    /// but compatible reading of spec.md §4.2): every `when` transition's
    /// intent and target state must be declared somewhere in the same bot.
    pub fn validate(&self) -> Result<(), ScriptError> {
        for bot in &self.bots {
            for state in &bot.states {
                for transition in &state.transitions {
                    if bot.intent(&transition.intent_name).is_none() {
                        return Err(ScriptError::semantic(
                            transition.line,
                            format!(
                                "transition in state '{}' refers to undeclared intent '{}'",
                                state.name, transition.intent_name
                            ),
                        ));
                    }
                    if bot.state(&transition.target_state).is_none() {
                        return Err(ScriptError::semantic(
                            transition.line,
                            format!(
                                "transition in state '{}' refers to undeclared state '{}'",
                                state.name, transition.target_state
                            ),
                        ));
                    }
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct BotDef {
    pub name: String,
    pub line: usize,
    pub intents: Vec<IntentDef>,
    pub states: Vec<StateDef>,
    pub variables: Vec<VariableDef>,
    pub functions: Vec<FunctionDef>,
    /// Name → index into the sibling `Vec` above, per spec.md §3 ("also
    /// indexed by name").
    pub intent_index: FxHashMap<String, usize>,
    pub state_index: FxHashMap<String, usize>,
    pub function_index: FxHashMap<String, usize>,
}

impl BotDef {
    pub fn intent(&self, name: &str) -> Option<&IntentDef> {
        self.intent_index.get(name).map(|&i| &self.intents[i])
    }

    pub fn state(&self, name: &str) -> Option<&StateDef> {
        self.state_index.get(name).map(|&i| &self.states[i])
    }

    pub fn function(&self, name: &str) -> Option<&FunctionDef> {
        self.function_index.get(name).map(|&i| &self.functions[i])
    }

    pub fn initial_state(&self) -> Option<&StateDef> {
        self.states.iter().find(|s| s.is_initial)
    }
}

#[derive(Debug, Clone)]
pub struct IntentDef {
    pub name: String,
    pub line: usize,
    pub patterns: Vec<String>,
    pub description: Option<String>,
    pub examples: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct StateDef {
    pub name: String,
    pub line: usize,
    pub is_initial: bool,
    pub is_final: bool,
    pub on_enter: Option<Block>,
    pub on_exit: Option<Block>,
    pub on_message: Option<Block>,
    pub transitions: Vec<Transition>,
    pub fallback: Option<Block>,
}

#[derive(Debug, Clone)]
pub struct Transition {
    pub line: usize,
    pub intent_name: String,
    pub target_state: String,
    pub guard: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct VariableDef {
    pub name: String,
    pub line: usize,
    pub init: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct Param {
    pub name: String,
    pub default: Option<Expr>,
}

#[derive(Debug, Clone)]
pub struct FunctionDef {
    pub name: String,
    pub line: usize,
    pub params: Vec<Param>,
    pub body: Block,
}

pub type Block = Vec<Stmt>;

#[derive(Debug, Clone)]
pub struct IfBranch {
    pub cond: Expr,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub enum Stmt {
    Say { expr: Expr, line: usize },
    Ask { prompt: Expr, target: String, line: usize },
    Set { name: String, expr: Expr, line: usize },
    Goto { state_name: String, line: usize },
    Call { expr: Expr, line: usize },
    Return { expr: Option<Expr>, line: usize },
    If { branches: Vec<IfBranch>, else_body: Option<Block>, line: usize },
    While { cond: Expr, body: Block, line: usize },
    For { var: String, iterable: Expr, body: Block, line: usize },
    ExprStatement { expr: Expr, line: usize },
}

impl Stmt {
    pub fn line(&self) -> usize {
        match self {
            Stmt::Say { line, .. }
            | Stmt::Ask { line, .. }
            | Stmt::Set { line, .. }
            | Stmt::Goto { line, .. }
            | Stmt::Call { line, .. }
            | Stmt::Return { line, .. }
            | Stmt::If { line, .. }
            | Stmt::While { line, .. }
            | Stmt::For { line, .. }
            | Stmt::ExprStatement { line, .. } => *line,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Eq,
    Ne,
    Lt,
    Gt,
    Le,
    Ge,
    And,
    Or,
}

#[derive(Debug, Clone, PartialEq)]
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

#[derive(Debug, Clone)]
pub enum Expr {
    Literal { value: Literal, line: usize },
    Identifier { name: String, line: usize },
    Binary { op: BinOp, left: Box<Expr>, right: Box<Expr>, line: usize },
    Unary { op: UnOp, inner: Box<Expr>, line: usize },
    Call { name: String, args: Vec<Expr>, line: usize },
    Index { target: Box<Expr>, key: Box<Expr>, line: usize },
    List { items: Vec<Expr>, line: usize },
    SpecialVar { name: String, line: usize },
}

impl Expr {
    pub fn line(&self) -> usize {
        match self {
            Expr::Literal { line, .. }
            | Expr::Identifier { line, .. }
            | Expr::Binary { line, .. }
            | Expr::Unary { line, .. }
            | Expr::Call { line, .. }
            | Expr::Index { line, .. }
            | Expr::List { line, .. }
            | Expr::SpecialVar { line, .. } => *line,
        }
    }
}
