use rustc_hash::FxHashMap;

use crate::ast::*;
use crate::error::ScriptError;
use crate::token::{LitValue, Token, TokenKind};

/// Parses a token stream (as produced by [`crate::lexer::tokenize`]) into a
/// [`Program`]. Recursive descent with precedence climbing for
/// expressions, per spec.md §4.2. The first unexpected token is a fatal
/// `ScriptError` — there is no error recovery (spec.md §1 Non-goals).
pub fn parse(tokens: Vec<Token>) -> Result<Program, ScriptError> {
    let mut parser = Parser { pos: 0, tokens };
    parser.parse_program()
}

struct Parser {
    pos: usize,
    tokens: Vec<Token>,
}

type PResult<T> = Result<T, ScriptError>;

impl Parser {
    fn parse_program(&mut self) -> PResult<Program> {
        let mut bots = vec![];
        while !self.check(TokenKind::Eof) {
            bots.push(self.parse_bot()?);
        }
        Ok(Program { bots })
    }

    // ---- bot ----

    fn parse_bot(&mut self) -> PResult<BotDef> {
        let line = self.expect(TokenKind::Bot)?.line;
        let name_tok = self.expect(TokenKind::String)?;
        let name = string_value(&name_tok);
        self.expect(TokenKind::LBrace)?;

        let mut intents: Vec<IntentDef> = vec![];
        let mut states: Vec<StateDef> = vec![];
        let mut variables: Vec<VariableDef> = vec![];
        let mut functions: Vec<FunctionDef> = vec![];

        while !self.check(TokenKind::RBrace) {
            match self.peek().kind {
                TokenKind::Intent => {
                    let def = self.parse_intent()?;
                    if intents.iter().any(|i| i.name == def.name) {
                        return Err(ScriptError::parse(def.line, format!("duplicate intent '{}'", def.name)));
                    }
                    intents.push(def);
                }
                TokenKind::State => {
                    let def = self.parse_state()?;
                    if states.iter().any(|s| s.name == def.name) {
                        return Err(ScriptError::parse(def.line, format!("duplicate state '{}'", def.name)));
                    }
                    states.push(def);
                }
                TokenKind::Var => {
                    let def = self.parse_var_def()?;
                    if variables.iter().any(|v| v.name == def.name) {
                        return Err(ScriptError::parse(def.line, format!("duplicate variable '{}'", def.name)));
                    }
                    variables.push(def);
                }
                TokenKind::Func => {
                    let def = self.parse_func_def()?;
                    if functions.iter().any(|f| f.name == def.name) {
                        return Err(ScriptError::parse(def.line, format!("duplicate function '{}'", def.name)));
                    }
                    functions.push(def);
                }
                _ => return Err(self.unexpected("intent, state, var, or func")),
            }
        }
        self.expect(TokenKind::RBrace)?;

        if states.iter().filter(|s| s.is_initial).count() != 1 {
            return Err(ScriptError::parse(line, format!("bot '{name}' must mark exactly one state as initial")));
        }

        let intent_index = index_by_name(&intents, |i| &i.name);
        let state_index = index_by_name(&states, |s| &s.name);
        let function_index = index_by_name(&functions, |f| &f.name);

        Ok(BotDef {
            name,
            line,
            intents,
            states,
            variables,
            functions,
            intent_index,
            state_index,
            function_index,
        })
    }

    // ---- intent ----

    fn parse_intent(&mut self) -> PResult<IntentDef> {
        let line = self.expect(TokenKind::Intent)?.line;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LBrace)?;

        let mut patterns = None;
        let mut description = None;
        let mut examples = None;
        while !self.check(TokenKind::RBrace) {
            match self.peek().kind {
                TokenKind::Patterns => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    if patterns.is_some() {
                        return Err(ScriptError::parse(line, "duplicate 'patterns' attribute"));
                    }
                    patterns = Some(self.parse_string_list()?);
                }
                TokenKind::Description => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    if description.is_some() {
                        return Err(ScriptError::parse(line, "duplicate 'description' attribute"));
                    }
                    description = Some(string_value(&self.expect(TokenKind::String)?));
                }
                TokenKind::Examples => {
                    self.advance();
                    self.expect(TokenKind::Colon)?;
                    if examples.is_some() {
                        return Err(ScriptError::parse(line, "duplicate 'examples' attribute"));
                    }
                    examples = Some(self.parse_string_list()?);
                }
                _ => return Err(self.unexpected("patterns, description, or examples")),
            }
        }
        self.expect(TokenKind::RBrace)?;

        Ok(IntentDef {
            name,
            line,
            patterns: patterns.unwrap_or_default(),
            description,
            examples: examples.unwrap_or_default(),
        })
    }

    fn parse_string_list(&mut self) -> PResult<Vec<String>> {
        self.expect(TokenKind::LBracket)?;
        let mut items = vec![];
        if !self.check(TokenKind::RBracket) {
            loop {
                items.push(string_value(&self.expect(TokenKind::String)?));
                if self.consume(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RBracket)?;
        Ok(items)
    }

    // ---- state ----

    fn parse_state(&mut self) -> PResult<StateDef> {
        let line = self.expect(TokenKind::State)?.line;
        let name = self.expect_identifier()?;

        let mut is_initial = false;
        let mut is_final = false;
        loop {
            match self.peek().kind {
                TokenKind::Initial => {
                    if is_initial {
                        return Err(ScriptError::parse(line, "duplicate 'initial' modifier"));
                    }
                    is_initial = true;
                    self.advance();
                }
                TokenKind::Final => {
                    if is_final {
                        return Err(ScriptError::parse(line, "duplicate 'final' modifier"));
                    }
                    is_final = true;
                    self.advance();
                }
                _ => break,
            }
        }

        self.expect(TokenKind::LBrace)?;
        let mut on_enter = None;
        let mut on_exit = None;
        let mut on_message = None;
        let mut fallback = None;
        let mut transitions = vec![];

        while !self.check(TokenKind::RBrace) {
            match self.peek().kind {
                TokenKind::OnEnter => {
                    self.advance();
                    if on_enter.is_some() {
                        return Err(ScriptError::parse(line, "duplicate 'on_enter' block"));
                    }
                    on_enter = Some(self.parse_block()?);
                }
                TokenKind::OnExit => {
                    self.advance();
                    if on_exit.is_some() {
                        return Err(ScriptError::parse(line, "duplicate 'on_exit' block"));
                    }
                    on_exit = Some(self.parse_block()?);
                }
                TokenKind::OnMessage => {
                    self.advance();
                    if on_message.is_some() {
                        return Err(ScriptError::parse(line, "duplicate 'on_message' block"));
                    }
                    on_message = Some(self.parse_block()?);
                }
                TokenKind::Fallback => {
                    self.advance();
                    if fallback.is_some() {
                        return Err(ScriptError::parse(line, "duplicate 'fallback' block"));
                    }
                    fallback = Some(self.parse_block()?);
                }
                TokenKind::When => {
                    let t_line = self.advance().line;
                    let intent_name = self.expect_identifier()?;
                    self.expect(TokenKind::Arrow)?;
                    let target_state = self.expect_identifier()?;
                    let guard = if self.consume(TokenKind::If) {
                        Some(self.parse_expr()?)
                    } else {
                        None
                    };
                    transitions.push(Transition {
                        line: t_line,
                        intent_name,
                        target_state,
                        guard,
                    });
                }
                _ => return Err(self.unexpected("on_enter, on_exit, on_message, when, or fallback")),
            }
        }
        self.expect(TokenKind::RBrace)?;

        Ok(StateDef {
            name,
            line,
            is_initial,
            is_final,
            on_enter,
            on_exit,
            on_message,
            transitions,
            fallback,
        })
    }

    // ---- var / func ----

    fn parse_var_def(&mut self) -> PResult<VariableDef> {
        let line = self.expect(TokenKind::Var)?.line;
        let name = self.expect_identifier()?;
        let init = if self.consume(TokenKind::Eq) {
            Some(self.parse_expr()?)
        } else {
            None
        };
        Ok(VariableDef { name, line, init })
    }

    fn parse_func_def(&mut self) -> PResult<FunctionDef> {
        let line = self.expect(TokenKind::Func)?.line;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let mut params = vec![];
        if !self.check(TokenKind::RParen) {
            loop {
                let pname = self.expect_identifier()?;
                let default = if self.consume(TokenKind::Eq) {
                    Some(self.parse_expr()?)
                } else {
                    None
                };
                params.push(Param { name: pname, default });
                if self.consume(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        self.expect(TokenKind::RParen)?;
        let body = self.parse_block()?;
        Ok(FunctionDef { name, line, params, body })
    }

    // ---- statements ----

    fn parse_block(&mut self) -> PResult<Block> {
        self.expect(TokenKind::LBrace)?;
        let mut stmts = vec![];
        while !self.check(TokenKind::RBrace) {
            stmts.push(self.parse_stmt()?);
        }
        self.expect(TokenKind::RBrace)?;
        Ok(stmts)
    }

    fn parse_stmt(&mut self) -> PResult<Stmt> {
        match self.peek().kind {
            TokenKind::Say => {
                let line = self.advance().line;
                let expr = self.parse_expr()?;
                Ok(Stmt::Say { expr, line })
            }
            TokenKind::Ask => {
                let line = self.advance().line;
                let prompt = self.parse_expr()?;
                self.expect(TokenKind::Arrow)?;
                let target = self.expect_identifier()?;
                Ok(Stmt::Ask { prompt, target, line })
            }
            TokenKind::Set => {
                let line = self.advance().line;
                let name = self.expect_identifier()?;
                self.expect(TokenKind::Eq)?;
                let expr = self.parse_expr()?;
                Ok(Stmt::Set { name, expr, line })
            }
            TokenKind::Goto => {
                let line = self.advance().line;
                let state_name = self.expect_identifier()?;
                Ok(Stmt::Goto { state_name, line })
            }
            TokenKind::Call => {
                let line = self.advance().line;
                let expr = self.parse_call_expr()?;
                Ok(Stmt::Call { expr, line })
            }
            TokenKind::Return => {
                let line = self.advance().line;
                let expr = if self.starts_expr() { Some(self.parse_expr()?) } else { None };
                Ok(Stmt::Return { expr, line })
            }
            TokenKind::If => self.parse_if(),
            TokenKind::While => {
                let line = self.advance().line;
                let cond = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::While { cond, body, line })
            }
            TokenKind::For => {
                let line = self.advance().line;
                let var = self.expect_identifier()?;
                self.expect(TokenKind::In)?;
                let iterable = self.parse_expr()?;
                let body = self.parse_block()?;
                Ok(Stmt::For { var, iterable, body, line })
            }
            _ => {
                let line = self.peek().line;
                let expr = self.parse_expr()?;
                Ok(Stmt::ExprStatement { expr, line })
            }
        }
    }

    fn parse_if(&mut self) -> PResult<Stmt> {
        let line = self.expect(TokenKind::If)?.line;
        let mut branches = vec![IfBranch {
            cond: self.parse_expr()?,
            body: self.parse_block()?,
        }];
        while self.consume(TokenKind::Elif) {
            branches.push(IfBranch {
                cond: self.parse_expr()?,
                body: self.parse_block()?,
            });
        }
        let else_body = if self.consume(TokenKind::Else) {
            Some(self.parse_block()?)
        } else {
            None
        };
        Ok(Stmt::If { branches, else_body, line })
    }

    fn parse_call_expr(&mut self) -> PResult<Expr> {
        let line = self.peek().line;
        let name = self.expect_identifier()?;
        self.expect(TokenKind::LParen)?;
        let args = self.parse_args()?;
        self.expect(TokenKind::RParen)?;
        Ok(Expr::Call { name, args, line })
    }

    /// True if the current token can begin an expression — used to decide
    /// whether a bare `return` has a trailing value.
    fn starts_expr(&self) -> bool {
        !matches!(self.peek().kind, TokenKind::RBrace | TokenKind::Eof)
    }

    // ---- expressions: precedence climbing, low to high ----

    fn parse_expr(&mut self) -> PResult<Expr> {
        self.parse_or()
    }

    fn parse_or(&mut self) -> PResult<Expr> {
        let mut left = self.parse_and()?;
        while self.check(TokenKind::Or) {
            let line = self.advance().line;
            let right = self.parse_and()?;
            left = Expr::Binary { op: BinOp::Or, left: Box::new(left), right: Box::new(right), line };
        }
        Ok(left)
    }

    fn parse_and(&mut self) -> PResult<Expr> {
        let mut left = self.parse_equality()?;
        while self.check(TokenKind::And) {
            let line = self.advance().line;
            let right = self.parse_equality()?;
            left = Expr::Binary { op: BinOp::And, left: Box::new(left), right: Box::new(right), line };
        }
        Ok(left)
    }

    fn parse_equality(&mut self) -> PResult<Expr> {
        let mut left = self.parse_relational()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::EqEq => BinOp::Eq,
                TokenKind::BangEq => BinOp::Ne,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_relational()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line };
        }
        Ok(left)
    }

    fn parse_relational(&mut self) -> PResult<Expr> {
        let mut left = self.parse_additive()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Lt => BinOp::Lt,
                TokenKind::Gt => BinOp::Gt,
                TokenKind::LtEq => BinOp::Le,
                TokenKind::GtEq => BinOp::Ge,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_additive()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line };
        }
        Ok(left)
    }

    fn parse_additive(&mut self) -> PResult<Expr> {
        let mut left = self.parse_multiplicative()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Plus => BinOp::Add,
                TokenKind::Minus => BinOp::Sub,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_multiplicative()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line };
        }
        Ok(left)
    }

    fn parse_multiplicative(&mut self) -> PResult<Expr> {
        let mut left = self.parse_unary()?;
        loop {
            let op = match self.peek().kind {
                TokenKind::Star => BinOp::Mul,
                TokenKind::Slash => BinOp::Div,
                TokenKind::Percent => BinOp::Mod,
                _ => break,
            };
            let line = self.advance().line;
            let right = self.parse_unary()?;
            left = Expr::Binary { op, left: Box::new(left), right: Box::new(right), line };
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> PResult<Expr> {
        match self.peek().kind {
            TokenKind::Minus => {
                let line = self.advance().line;
                let inner = self.parse_unary()?;
                Ok(Expr::Unary { op: UnOp::Neg, inner: Box::new(inner), line })
            }
            TokenKind::Not => {
                let line = self.advance().line;
                let inner = self.parse_unary()?;
                Ok(Expr::Unary { op: UnOp::Not, inner: Box::new(inner), line })
            }
            _ => self.parse_postfix(),
        }
    }

    fn parse_postfix(&mut self) -> PResult<Expr> {
        let mut expr = self.parse_primary()?;
        while self.check(TokenKind::LBracket) {
            let line = self.advance().line;
            let key = self.parse_expr()?;
            self.expect(TokenKind::RBracket)?;
            expr = Expr::Index { target: Box::new(expr), key: Box::new(key), line };
        }
        Ok(expr)
    }

    fn parse_primary(&mut self) -> PResult<Expr> {
        let tok = self.peek().clone();
        match tok.kind {
            TokenKind::Integer => {
                self.advance();
                let n = match tok.value {
                    Some(LitValue::Int(n)) => n,
                    _ => unreachable!("lexer always attaches Int to Integer tokens"),
                };
                Ok(Expr::Literal { value: Literal::Int(n), line: tok.line })
            }
            TokenKind::Floating => {
                self.advance();
                let n = match tok.value {
                    Some(LitValue::Float(n)) => n,
                    _ => unreachable!("lexer always attaches Float to Floating tokens"),
                };
                Ok(Expr::Literal { value: Literal::Float(n), line: tok.line })
            }
            TokenKind::String => {
                self.advance();
                let s = string_value(&tok);
                Ok(Expr::Literal { value: Literal::Str(s), line: tok.line })
            }
            TokenKind::True => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Bool(true), line: tok.line })
            }
            TokenKind::False => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Bool(false), line: tok.line })
            }
            TokenKind::Null => {
                self.advance();
                Ok(Expr::Literal { value: Literal::Null, line: tok.line })
            }
            TokenKind::LBracket => {
                self.advance();
                let mut items = vec![];
                if !self.check(TokenKind::RBracket) {
                    loop {
                        items.push(self.parse_expr()?);
                        if self.consume(TokenKind::Comma) {
                            continue;
                        }
                        break;
                    }
                }
                self.expect(TokenKind::RBracket)?;
                Ok(Expr::List { items, line: tok.line })
            }
            TokenKind::LParen => {
                self.advance();
                let inner = self.parse_expr()?;
                self.expect(TokenKind::RParen)?;
                Ok(inner)
            }
            TokenKind::Identifier => {
                self.advance();
                let name = tok.lexeme.clone();
                if self.check(TokenKind::LParen) {
                    self.advance();
                    let args = self.parse_args()?;
                    self.expect(TokenKind::RParen)?;
                    Ok(Expr::Call { name, args, line: tok.line })
                } else if name.starts_with('_') {
                    Ok(Expr::SpecialVar { name, line: tok.line })
                } else {
                    Ok(Expr::Identifier { name, line: tok.line })
                }
            }
            _ => Err(self.unexpected("an expression")),
        }
    }

    fn parse_args(&mut self) -> PResult<Vec<Expr>> {
        let mut args = vec![];
        if !self.check(TokenKind::RParen) {
            loop {
                args.push(self.parse_expr()?);
                if self.consume(TokenKind::Comma) {
                    continue;
                }
                break;
            }
        }
        Ok(args)
    }

    // ---- token plumbing ----

    fn peek(&self) -> &Token {
        &self.tokens[self.pos]
    }

    fn advance(&mut self) -> Token {
        let tok = self.tokens[self.pos].clone();
        if self.pos + 1 < self.tokens.len() {
            self.pos += 1;
        }
        tok
    }

    fn check(&self, kind: TokenKind) -> bool {
        self.peek().kind == kind
    }

    fn consume(&mut self, kind: TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: TokenKind) -> PResult<Token> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("{kind:?}")))
        }
    }

    fn expect_identifier(&mut self) -> PResult<String> {
        if self.check(TokenKind::Identifier) {
            Ok(self.advance().lexeme)
        } else {
            Err(self.unexpected("an identifier"))
        }
    }

    fn unexpected(&self, wanted: &str) -> ScriptError {
        let tok = self.peek();
        ScriptError::parse(
            tok.line,
            format!("unexpected token {:?} ('{}'), expected {wanted}", tok.kind, tok.lexeme),
        )
    }
}

fn string_value(tok: &Token) -> String {
    match &tok.value {
        Some(LitValue::Str(s)) => s.clone(),
        _ => tok.lexeme.clone(),
    }
}

fn index_by_name<T>(items: &[T], name_of: impl Fn(&T) -> &String) -> FxHashMap<String, usize> {
    items
        .iter()
        .enumerate()
        .map(|(i, item)| (name_of(item).clone(), i))
        .collect()
}
