use crate::ast::{BinOp, Block, Expr, IfBranch, Literal, Stmt, UnOp};
use crate::ast::BotDef;
use crate::builtins::{self, BuiltinCtx};
use crate::env::Environment;
use crate::error::ScriptError;
use crate::io::IOHandler;
use crate::value::Value;

/// Non-`Normal` signals unwind through every composite statement
/// (if/while/for/block) until a function call boundary catches `Return` or
/// the dialogue engine catches `Goto` (spec.md §4.4/§9).
#[derive(Debug, Clone)]
pub enum FlowSignal {
    Normal,
    Return(Value),
    Goto(String),
}

/// Walks the AST for one bot. Holds only borrows: the parsed bot
/// definition, the collaborator IOHandler, and the dialogue engine's
/// current state name (read by the `current_state()` built-in).
pub struct Interpreter<'a> {
    pub bot: &'a BotDef,
    pub io: &'a mut dyn IOHandler,
    pub current_state: &'a str,
}

impl<'a> Interpreter<'a> {
    pub fn exec_block(&mut self, env: &mut Environment, block: &Block) -> Result<FlowSignal, ScriptError> {
        for stmt in block {
            match self.exec_stmt(env, stmt)? {
                FlowSignal::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(FlowSignal::Normal)
    }

    fn exec_stmt(&mut self, env: &mut Environment, stmt: &Stmt) -> Result<FlowSignal, ScriptError> {
        match stmt {
            Stmt::Say { expr, .. } => {
                let value = self.eval_expr(env, expr)?;
                self.io.output(&value.to_display_string());
                Ok(FlowSignal::Normal)
            }
            Stmt::Ask { prompt, target, line } => {
                let value = self.eval_expr(env, prompt)?;
                let line_read = self
                    .io
                    .input(&value.to_display_string())
                    .ok_or_else(|| ScriptError::external(*line, "input stream closed"))?;
                env.assign(target, Value::Str(line_read));
                Ok(FlowSignal::Normal)
            }
            Stmt::Set { name, expr, .. } => {
                let value = self.eval_expr(env, expr)?;
                env.assign(name, value);
                Ok(FlowSignal::Normal)
            }
            Stmt::Goto { state_name, .. } => Ok(FlowSignal::Goto(state_name.clone())),
            Stmt::Call { expr, .. } => {
                self.eval_expr(env, expr)?;
                Ok(FlowSignal::Normal)
            }
            Stmt::Return { expr, .. } => {
                let value = match expr {
                    Some(e) => self.eval_expr(env, e)?,
                    None => Value::Null,
                };
                Ok(FlowSignal::Return(value))
            }
            Stmt::If { branches, else_body, .. } => self.exec_if(env, branches, else_body),
            Stmt::While { cond, body, .. } => self.exec_while(env, cond, body),
            Stmt::For { var, iterable, body, line } => self.exec_for(env, var, iterable, body, *line),
            Stmt::ExprStatement { expr, .. } => {
                self.eval_expr(env, expr)?;
                Ok(FlowSignal::Normal)
            }
        }
    }

    fn exec_if(
        &mut self,
        env: &mut Environment,
        branches: &[IfBranch],
        else_body: &Option<Block>,
    ) -> Result<FlowSignal, ScriptError> {
        for branch in branches {
            if self.eval_expr(env, &branch.cond)?.truthy() {
                return self.exec_block(env, &branch.body);
            }
        }
        match else_body {
            Some(body) => self.exec_block(env, body),
            None => Ok(FlowSignal::Normal),
        }
    }

    fn exec_while(&mut self, env: &mut Environment, cond: &Expr, body: &Block) -> Result<FlowSignal, ScriptError> {
        while self.eval_expr(env, cond)?.truthy() {
            match self.exec_block(env, body)? {
                FlowSignal::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(FlowSignal::Normal)
    }

    fn exec_for(
        &mut self,
        env: &mut Environment,
        var: &str,
        iterable: &Expr,
        body: &Block,
        line: usize,
    ) -> Result<FlowSignal, ScriptError> {
        let items: Vec<Value> = match self.eval_expr(env, iterable)? {
            Value::List(items) => items,
            Value::Str(s) => s.chars().map(|c| Value::Str(c.to_string())).collect(),
            other => {
                return Err(ScriptError::runtime(
                    line,
                    format!("cannot iterate over {}", other.type_name()),
                ))
            }
        };
        for item in items {
            env.define(var, item);
            match self.exec_block(env, body)? {
                FlowSignal::Normal => {}
                signal => return Ok(signal),
            }
        }
        Ok(FlowSignal::Normal)
    }

    pub fn eval_expr(&mut self, env: &mut Environment, expr: &Expr) -> Result<Value, ScriptError> {
        match expr {
            Expr::Literal { value, .. } => Ok(literal_value(value)),
            Expr::Identifier { name, line } | Expr::SpecialVar { name, line } => env.lookup(name, *line),
            Expr::List { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval_expr(env, item)?);
                }
                Ok(Value::List(values))
            }
            Expr::Unary { op, inner, line } => self.eval_unary(env, op, inner, *line),
            Expr::Binary { op, left, right, line } => self.eval_binary(env, op, left, right, *line),
            Expr::Index { target, key, line } => self.eval_index(env, target, key, *line),
            Expr::Call { name, args, line } => self.eval_call(env, name, args, *line),
        }
    }

    fn eval_unary(&mut self, env: &mut Environment, op: &UnOp, inner: &Expr, line: usize) -> Result<Value, ScriptError> {
        let value = self.eval_expr(env, inner)?;
        match op {
            UnOp::Not => Ok(Value::Bool(!value.truthy())),
            UnOp::Neg => match value {
                Value::Int(i) => Ok(Value::Int(-i)),
                Value::Float(f) => Ok(Value::Float(-f)),
                other => Err(ScriptError::runtime(line, format!("cannot negate {}", other.type_name()))),
            },
        }
    }

    fn eval_binary(
        &mut self,
        env: &mut Environment,
        op: &BinOp,
        left: &Expr,
        right: &Expr,
        line: usize,
    ) -> Result<Value, ScriptError> {
        // Short-circuit: the returned value is the last evaluated operand,
        // not a coerced boolean (spec.md §4.4/§8).
        if *op == BinOp::And {
            let l = self.eval_expr(env, left)?;
            return if !l.truthy() { Ok(l) } else { self.eval_expr(env, right) };
        }
        if *op == BinOp::Or {
            let l = self.eval_expr(env, left)?;
            return if l.truthy() { Ok(l) } else { self.eval_expr(env, right) };
        }

        let l = self.eval_expr(env, left)?;
        let r = self.eval_expr(env, right)?;
        match op {
            BinOp::Add => add(l, r, line),
            BinOp::Sub => arithmetic(l, r, line, "subtract", |a, b| a - b, |a, b| a - b),
            BinOp::Mul => arithmetic(l, r, line, "multiply", |a, b| a * b, |a, b| a * b),
            BinOp::Div => divide(l, r, line),
            BinOp::Mod => modulo(l, r, line),
            BinOp::Eq => Ok(Value::Bool(Value::values_equal(&l, &r))),
            BinOp::Ne => Ok(Value::Bool(!Value::values_equal(&l, &r))),
            BinOp::Lt => Ok(Value::Bool(Value::compare(&l, &r, line)?.is_lt())),
            BinOp::Gt => Ok(Value::Bool(Value::compare(&l, &r, line)?.is_gt())),
            BinOp::Le => Ok(Value::Bool(Value::compare(&l, &r, line)?.is_le())),
            BinOp::Ge => Ok(Value::Bool(Value::compare(&l, &r, line)?.is_ge())),
            BinOp::And | BinOp::Or => unreachable!("handled above with short-circuit"),
        }
    }

    fn eval_index(&mut self, env: &mut Environment, target: &Expr, key: &Expr, line: usize) -> Result<Value, ScriptError> {
        let target = self.eval_expr(env, target)?;
        let key = self.eval_expr(env, key)?;
        let Value::List(items) = target else {
            return Err(ScriptError::runtime(line, format!("cannot index into {}", target.type_name())));
        };
        match key {
            Value::Int(i) => {
                if i < 0 {
                    return Err(ScriptError::runtime(line, "negative list indices are not supported"));
                }
                items
                    .get(i as usize)
                    .cloned()
                    .ok_or_else(|| ScriptError::runtime(line, format!("list index {i} out of range")))
            }
            Value::Str(needle) => Ok(items
                .iter()
                .find_map(|item| match item {
                    Value::List(pair) if pair.len() == 2 => match &pair[0] {
                        Value::Str(k) if *k == needle => Some(pair[1].clone()),
                        _ => None,
                    },
                    _ => None,
                })
                .unwrap_or(Value::Null)),
            other => Err(ScriptError::runtime(line, format!("cannot index with {}", other.type_name()))),
        }
    }

    fn eval_call(&mut self, env: &mut Environment, name: &str, args: &[Expr], line: usize) -> Result<Value, ScriptError> {
        let mut values = Vec::with_capacity(args.len());
        for arg in args {
            values.push(self.eval_expr(env, arg)?);
        }

        if let Some(func) = self.bot.function(name) {
            if values.len() > func.params.len() {
                return Err(ScriptError::runtime(
                    line,
                    format!("{name}() takes at most {} argument(s), got {}", func.params.len(), values.len()),
                ));
            }
            env.push();
            for (i, param) in func.params.iter().enumerate() {
                let value = if let Some(v) = values.get(i) {
                    v.clone()
                } else if let Some(default) = &param.default {
                    self.eval_expr(env, default)?
                } else {
                    env.pop();
                    return Err(ScriptError::runtime(
                        line,
                        format!("{name}() missing required argument '{}'", param.name),
                    ));
                };
                env.define(&param.name, value);
            }
            let result = self.exec_block(env, &func.body);
            env.pop();
            return match result? {
                FlowSignal::Return(v) => Ok(v),
                _ => Ok(Value::Null),
            };
        }

        let mut ctx = BuiltinCtx { io: self.io, current_state: self.current_state };
        match builtins::call(name, values, line, &mut ctx) {
            Some(result) => result,
            None => Err(ScriptError::runtime(line, format!("unknown function '{name}'"))),
        }
    }
}

fn literal_value(lit: &Literal) -> Value {
    match lit {
        Literal::Null => Value::Null,
        Literal::Bool(b) => Value::Bool(*b),
        Literal::Int(i) => Value::Int(*i),
        Literal::Float(f) => Value::Float(*f),
        Literal::Str(s) => Value::Str(s.clone()),
    }
}

/// `+` is overloaded per spec.md §4.2: numeric addition when both sides
/// are numbers, string concatenation when either side is a string (the
/// other coerced with the `str(x)` rule). List concatenation is not
/// supported.
fn add(l: Value, r: Value, line: usize) -> Result<Value, ScriptError> {
    match (&l, &r) {
        (Value::List(_), _) | (_, Value::List(_)) => {
            Err(ScriptError::runtime(line, "list concatenation with '+' is not supported"))
        }
        (Value::Str(_), _) | (_, Value::Str(_)) => {
            Ok(Value::Str(format!("{}{}", l.to_display_string(), r.to_display_string())))
        }
        _ => arithmetic(l, r, line, "add", |a, b| a + b, |a, b| a + b),
    }
}

/// Shared promotion rule for `-`, `*`, `+` (numeric case): integer op
/// integer stays integer unless either operand is floating.
fn arithmetic(
    l: Value,
    r: Value,
    line: usize,
    verb: &str,
    int_op: impl Fn(i64, i64) -> i64,
    float_op: impl Fn(f64, f64) -> f64,
) -> Result<Value, ScriptError> {
    match (l, r) {
        (Value::Int(a), Value::Int(b)) => Ok(Value::Int(int_op(a, b))),
        (a, b) => {
            let (Some(x), Some(y)) = (as_f64(&a), as_f64(&b)) else {
                return Err(ScriptError::runtime(
                    line,
                    format!("cannot {verb} {} and {}", a.type_name(), b.type_name()),
                ));
            };
            Ok(Value::Float(float_op(x, y)))
        }
    }
}

fn divide(l: Value, r: Value, line: usize) -> Result<Value, ScriptError> {
    let (Some(x), Some(y)) = (as_f64(&l), as_f64(&r)) else {
        return Err(ScriptError::runtime(
            line,
            format!("cannot divide {} by {}", l.type_name(), r.type_name()),
        ));
    };
    if y == 0.0 {
        return Err(ScriptError::runtime(line, "division by zero"));
    }
    match (l, r) {
        (Value::Int(_), Value::Int(_)) if x % y == 0.0 => Ok(Value::Int((x / y) as i64)),
        _ => Ok(Value::Float(x / y)),
    }
}

fn modulo(l: Value, r: Value, line: usize) -> Result<Value, ScriptError> {
    let is_int = matches!((&l, &r), (Value::Int(_), Value::Int(_)));
    let (Some(x), Some(y)) = (as_f64(&l), as_f64(&r)) else {
        return Err(ScriptError::runtime(
            line,
            format!("cannot compute {} % {}", l.type_name(), r.type_name()),
        ));
    };
    if y == 0.0 {
        return Err(ScriptError::runtime(line, "division by zero"));
    }
    if is_int {
        Ok(Value::Int(x as i64 % y as i64))
    } else {
        Ok(Value::Float(x % y))
    }
}

fn as_f64(v: &Value) -> Option<f64> {
    match v {
        Value::Int(i) => Some(*i as f64),
        Value::Float(f) => Some(*f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::BufferIoHandler;
    use crate::lexer::tokenize;
    use crate::parser::parse;

    fn run(src: &str) -> (Vec<String>, Environment) {
        let (tokens, errors) = tokenize(src);
        assert!(errors.is_empty());
        let program = parse(tokens).expect("parse failed");
        let bot = &program.bots[0];
        let mut env = Environment::new();
        for v in &bot.variables {
            let value = match &v.init {
                Some(e) => {
                    let mut io = BufferIoHandler::default();
                    let mut interp = Interpreter { bot, io: &mut io, current_state: "S" };
                    interp.eval_expr(&mut env, e).unwrap()
                }
                None => Value::Null,
            };
            env.define(&v.name, value);
        }
        let mut io = BufferIoHandler::default();
        {
            let mut interp = Interpreter { bot, io: &mut io, current_state: "S" };
            let state = bot.initial_state().unwrap();
            interp.exec_block(&mut env, state.on_enter.as_ref().unwrap()).unwrap();
        }
        (io.outputs(), env)
    }

    #[test]
    fn short_circuit_and_skips_right_side() {
        let (outputs, _) = run(
            r#"bot "B" {
                func f() { call print("called") return true }
                state S initial { on_enter { if false and f() { say "unreachable" } else { say "ok" } } }
            }"#,
        );
        assert_eq!(outputs, vec!["ok"]);
    }

    #[test]
    fn short_circuit_or_skips_right_side() {
        let (outputs, _) = run(
            r#"bot "B" {
                func f() { return true }
                state S initial { on_enter { if true or f() { say "ok" } } }
            }"#,
        );
        assert_eq!(outputs, vec!["ok"]);
    }

    #[test]
    fn for_over_list_emits_each_item() {
        let (outputs, _) = run(
            r#"bot "B" { state S initial { on_enter { for x in [1,2,3] { say str(x) } } } }"#,
        );
        assert_eq!(outputs, vec!["1", "2", "3"]);
    }

    #[test]
    fn for_over_string_iterates_codepoints() {
        let (outputs, _) = run(r#"bot "B" { state S initial { on_enter { for c in "ab" { say c } } } }"#);
        assert_eq!(outputs, vec!["a", "b"]);
    }

    #[test]
    fn function_call_with_default_argument() {
        let (outputs, _) = run(
            r#"bot "B" {
                func g(a, b = 10) { return a + b }
                state S initial { on_enter { say str(g(5)) say str(g(5, 7)) } }
            }"#,
        );
        assert_eq!(outputs, vec!["15", "12"]);
    }

    #[test]
    fn set_outside_function_targets_globals() {
        let (_, env) = run(r#"bot "B" { var n = 0 state S initial { on_enter { set n = n + 1 } } }"#);
        assert!(matches!(env.lookup("n", 1), Ok(Value::Int(1))));
    }

    #[test]
    fn division_by_zero_is_a_runtime_error() {
        let src = r#"bot "B" { state S initial { on_enter { say 1 / 0 } } }"#;
        let (tokens, _) = tokenize(src);
        let program = parse(tokens).unwrap();
        let bot = &program.bots[0];
        let mut env = Environment::new();
        let mut io = BufferIoHandler::default();
        let mut interp = Interpreter { bot, io: &mut io, current_state: "S" };
        let result = interp.exec_block(&mut env, bot.initial_state().unwrap().on_enter.as_ref().unwrap());
        assert!(result.is_err());
    }

    #[test]
    fn string_plus_number_coerces_with_str_rule() {
        let (outputs, _) = run(r#"bot "B" { state S initial { on_enter { say "n=" + 4 } } }"#);
        assert_eq!(outputs, vec!["n=4"]);
    }

    #[test]
    fn indexing_entities_by_key() {
        let (outputs, _) = run(
            r#"bot "B" {
                state S initial { on_enter {
                    set e = [["city", "NYC"]]
                    say e["city"]
                } }
            }"#,
        );
        assert_eq!(outputs, vec!["NYC"]);
    }
}
