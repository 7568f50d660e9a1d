//! Recursive descent parser with precedence climbing for expressions.

use super::lexer::{Lexer, Token, TokenKind};
use super::{ParseError, ParserOptions};
use crate::ast::{
    ArrowBody, ArrowBodyKind, AssignOp, BinaryOp, Class, ClassMethod, ExportSpecifier, Expr,
    ExprKind, Function, ImportSpecifier, ObjectProp, Program, Span, Stmt, StmtKind, UnaryOp,
    UpdateOp, VarDeclarator, VarKind,
};

/// The parser.
pub struct Parser<'a> {
    lexer: Lexer<'a>,
    current: Token,
    prev_span: Span,
    options: ParserOptions,
    /// Nesting depth of function bodies; 0 means module top level.
    fn_depth: u32,
}

impl<'a> Parser<'a> {
    /// Create a new parser.
    #[must_use]
    pub fn new(source: &'a str, options: ParserOptions) -> Self {
        let mut lexer = Lexer::new(source);
        let current = lexer.next_token();
        Self {
            lexer,
            current,
            prev_span: Span::default(),
            options,
            fn_depth: 0,
        }
    }

    /// Parse the entire source into a program.
    pub fn parse(mut self) -> Result<Program, ParseError> {
        let mut body = Vec::new();
        while !self.is_eof() {
            body.push(self.parse_stmt()?);
        }
        Ok(Program::new(body))
    }

    // =========================================================================
    // Token handling
    // =========================================================================

    fn peek(&self) -> &TokenKind {
        &self.current.kind
    }

    /// The token after the current one.
    fn peek_second(&self) -> TokenKind {
        self.lexer.clone().next_token().kind
    }

    fn advance(&mut self) -> Token {
        self.prev_span = self.current.span;
        std::mem::replace(&mut self.current, self.lexer.next_token())
    }

    fn check(&self, kind: &TokenKind) -> bool {
        std::mem::discriminant(self.peek()) == std::mem::discriminant(kind)
    }

    fn eat(&mut self, kind: &TokenKind) -> bool {
        if self.check(kind) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect(&mut self, kind: &TokenKind) -> Result<Token, ParseError> {
        if self.check(kind) {
            Ok(self.advance())
        } else {
            Err(self.unexpected(&format!("expected {kind:?}")))
        }
    }

    fn is_eof(&self) -> bool {
        matches!(self.peek(), TokenKind::Eof)
    }

    fn is_ident(&self, word: &str) -> bool {
        matches!(self.peek(), TokenKind::Ident(w) if w == word)
    }

    fn eat_ident(&mut self, word: &str) -> bool {
        if self.is_ident(word) {
            self.advance();
            true
        } else {
            false
        }
    }

    fn expect_ident(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            TokenKind::Ident(name) => {
                let name = name.clone();
                self.advance();
                Ok(name)
            }
            _ => Err(self.unexpected("expected identifier")),
        }
    }

    fn expect_ident_word(&mut self, word: &str) -> Result<(), ParseError> {
        if self.eat_ident(word) {
            Ok(())
        } else {
            Err(self.unexpected(&format!("expected '{word}'")))
        }
    }

    fn expect_string(&mut self) -> Result<String, ParseError> {
        match self.peek() {
            TokenKind::Str(value) => {
                let value = value.clone();
                self.advance();
                Ok(value)
            }
            _ => Err(self.unexpected("expected string literal")),
        }
    }

    /// Automatic semicolon insertion: an explicit `;`, a closing brace, end of
    /// input, or a preceding line terminator all end a statement.
    fn expect_semicolon(&mut self) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Semicolon)
            || matches!(self.peek(), TokenKind::RBrace | TokenKind::Eof)
            || self.current.newline_before
        {
            Ok(())
        } else {
            Err(self.unexpected("expected ';'"))
        }
    }

    fn unexpected(&self, message: &str) -> ParseError {
        ParseError::new(
            format!("{message}, found {:?}", self.current.kind),
            self.current.span,
        )
    }

    fn save(&self) -> (Lexer<'a>, Token) {
        (self.lexer.clone(), self.current.clone())
    }

    fn restore(&mut self, state: (Lexer<'a>, Token)) {
        self.lexer = state.0;
        self.current = state.1;
    }

    // =========================================================================
    // Statements
    // =========================================================================

    fn parse_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        match self.peek().clone() {
            TokenKind::Ident(word) => match word.as_str() {
                // `import(` and `import.meta` are expressions.
                "import"
                    if !matches!(self.peek_second(), TokenKind::LParen | TokenKind::Dot) =>
                {
                    self.parse_import_decl()
                }
                "export" => self.parse_export_decl(),
                "var" | "let" | "const" => {
                    let stmt = self.parse_var_decl()?;
                    self.expect_semicolon()?;
                    Ok(stmt)
                }
                "function" => self.parse_function_decl(false),
                "async" if matches!(&self.peek_second(), TokenKind::Ident(w) if w == "function") => {
                    self.advance();
                    self.parse_function_decl(true)
                }
                "class" => self.parse_class_decl(),
                "return" => self.parse_return_stmt(),
                "if" => self.parse_if_stmt(),
                "while" => self.parse_while_stmt(),
                "for" => self.parse_for_stmt(),
                "throw" => {
                    self.advance();
                    let expr = self.parse_expr()?;
                    self.expect_semicolon()?;
                    Ok(Stmt::new(
                        StmtKind::Throw(Box::new(expr)),
                        start.merge(self.prev_span),
                    ))
                }
                _ => self.parse_expr_stmt(),
            },
            TokenKind::LBrace => self.parse_block_stmt(),
            TokenKind::Semicolon => {
                self.advance();
                Ok(Stmt::new(StmtKind::Empty, start))
            }
            _ => self.parse_expr_stmt(),
        }
    }

    fn parse_block_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.expect(&TokenKind::LBrace)?;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            body.push(self.parse_stmt()?);
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Stmt::new(StmtKind::Block(body), start.merge(self.prev_span)))
    }

    fn parse_var_decl(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        let kind = match self.expect_ident()?.as_str() {
            "var" => VarKind::Var,
            "let" => VarKind::Let,
            _ => VarKind::Const,
        };

        let mut decls = Vec::new();
        loop {
            let name = self.expect_ident()?;
            let init = if self.eat(&TokenKind::Eq) {
                Some(self.parse_assign_expr()?)
            } else {
                None
            };
            decls.push(VarDeclarator { name, init });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }

        Ok(Stmt::new(
            StmtKind::Var { kind, decls },
            start.merge(self.prev_span),
        ))
    }

    fn parse_function_decl(&mut self, is_async: bool) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.expect_ident_word("function")?;
        let is_generator = self.eat(&TokenKind::Star);
        let name = self.expect_ident()?;
        let function = self.parse_function_rest(is_async, is_generator)?;
        Ok(Stmt::new(
            StmtKind::Function {
                name,
                function: Box::new(function),
            },
            start.merge(self.prev_span),
        ))
    }

    fn parse_function_rest(
        &mut self,
        is_async: bool,
        is_generator: bool,
    ) -> Result<Function, ParseError> {
        let params = self.parse_params()?;
        let body = self.parse_function_body()?;
        Ok(Function {
            params,
            body,
            is_async,
            is_generator,
        })
    }

    fn parse_params(&mut self) -> Result<Vec<String>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut params = Vec::new();
        while !self.check(&TokenKind::RParen) {
            params.push(self.expect_ident()?);
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(params)
    }

    fn parse_function_body(&mut self) -> Result<Vec<Stmt>, ParseError> {
        self.expect(&TokenKind::LBrace)?;
        self.fn_depth += 1;
        let mut body = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            match self.parse_stmt() {
                Ok(stmt) => body.push(stmt),
                Err(err) => {
                    self.fn_depth -= 1;
                    return Err(err);
                }
            }
        }
        self.fn_depth -= 1;
        self.expect(&TokenKind::RBrace)?;
        Ok(body)
    }

    fn parse_class_decl(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.expect_ident_word("class")?;
        let name = self.expect_ident()?;
        let class = self.parse_class_rest()?;
        Ok(Stmt::new(
            StmtKind::Class {
                name,
                class: Box::new(class),
            },
            start.merge(self.prev_span),
        ))
    }

    fn parse_class_rest(&mut self) -> Result<Class, ParseError> {
        let super_class = if self.eat_ident("extends") {
            Some(Box::new(self.parse_unary_expr()?))
        } else {
            None
        };

        self.expect(&TokenKind::LBrace)?;
        let mut methods = Vec::new();
        while !self.check(&TokenKind::RBrace) && !self.is_eof() {
            if self.eat(&TokenKind::Semicolon) {
                continue;
            }
            let is_static = self.is_ident("static")
                && !matches!(self.peek_second(), TokenKind::LParen)
                && self.eat_ident("static");
            let is_async = self.is_ident("async")
                && !matches!(self.peek_second(), TokenKind::LParen)
                && self.eat_ident("async");
            let is_generator = self.eat(&TokenKind::Star);
            let name = self.expect_ident()?;
            let function = self.parse_function_rest(is_async, is_generator)?;
            methods.push(ClassMethod {
                name,
                function,
                is_static,
            });
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Class {
            super_class,
            methods,
        })
    }

    fn parse_return_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();
        let arg = if matches!(self.peek(), TokenKind::Semicolon | TokenKind::RBrace | TokenKind::Eof)
            || self.current.newline_before
        {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.expect_semicolon()?;
        Ok(Stmt::new(StmtKind::Return(arg), start.merge(self.prev_span)))
    }

    fn parse_if_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let consequent = self.parse_stmt()?;
        let alternate = if self.eat_ident("else") {
            Some(Box::new(self.parse_stmt()?))
        } else {
            None
        };
        Ok(Stmt::new(
            StmtKind::If {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate,
            },
            start.merge(self.prev_span),
        ))
    }

    fn parse_while_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();
        self.expect(&TokenKind::LParen)?;
        let test = self.parse_expr()?;
        self.expect(&TokenKind::RParen)?;
        let body = self.parse_stmt()?;
        Ok(Stmt::new(
            StmtKind::While {
                test: Box::new(test),
                body: Box::new(body),
            },
            start.merge(self.prev_span),
        ))
    }

    fn parse_for_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();
        self.expect(&TokenKind::LParen)?;

        let init = if self.check(&TokenKind::Semicolon) {
            None
        } else if self.is_ident("var") || self.is_ident("let") || self.is_ident("const") {
            Some(Box::new(self.parse_var_decl()?))
        } else {
            let expr = self.parse_expr()?;
            Some(Box::new(Stmt::new(
                StmtKind::Expr(Box::new(expr)),
                Span::default(),
            )))
        };
        self.expect(&TokenKind::Semicolon)?;

        let test = if self.check(&TokenKind::Semicolon) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.expect(&TokenKind::Semicolon)?;

        let update = if self.check(&TokenKind::RParen) {
            None
        } else {
            Some(Box::new(self.parse_expr()?))
        };
        self.expect(&TokenKind::RParen)?;

        let body = self.parse_stmt()?;
        Ok(Stmt::new(
            StmtKind::For {
                init,
                test,
                update,
                body: Box::new(body),
            },
            start.merge(self.prev_span),
        ))
    }

    fn parse_expr_stmt(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        let expr = self.parse_expr()?;
        self.expect_semicolon()?;
        Ok(Stmt::new(
            StmtKind::Expr(Box::new(expr)),
            start.merge(self.prev_span),
        ))
    }

    // =========================================================================
    // Imports and exports
    // =========================================================================

    fn parse_import_decl(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();

        // Bare side-effect import.
        if let TokenKind::Str(source) = self.peek() {
            let source = source.clone();
            self.advance();
            self.expect_semicolon()?;
            return Ok(Stmt::new(
                StmtKind::Import {
                    specifiers: Vec::new(),
                    source,
                },
                start.merge(self.prev_span),
            ));
        }

        let mut specifiers = Vec::new();
        if let TokenKind::Ident(_) = self.peek() {
            let local = self.expect_ident()?;
            specifiers.push(ImportSpecifier::Default { local });
            if self.eat(&TokenKind::Comma) {
                self.parse_non_default_import_specifiers(&mut specifiers)?;
            }
        } else {
            self.parse_non_default_import_specifiers(&mut specifiers)?;
        }

        self.expect_ident_word("from")?;
        let source = self.expect_string()?;
        self.expect_semicolon()?;
        Ok(Stmt::new(
            StmtKind::Import { specifiers, source },
            start.merge(self.prev_span),
        ))
    }

    fn parse_non_default_import_specifiers(
        &mut self,
        specifiers: &mut Vec<ImportSpecifier>,
    ) -> Result<(), ParseError> {
        if self.eat(&TokenKind::Star) {
            self.expect_ident_word("as")?;
            let local = self.expect_ident()?;
            specifiers.push(ImportSpecifier::Namespace { local });
            return Ok(());
        }

        self.expect(&TokenKind::LBrace)?;
        while !self.check(&TokenKind::RBrace) {
            let imported = self.expect_ident()?;
            let local = if self.eat_ident("as") {
                self.expect_ident()?
            } else {
                imported.clone()
            };
            specifiers.push(ImportSpecifier::Named { imported, local });
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(())
    }

    fn parse_export_decl(&mut self) -> Result<Stmt, ParseError> {
        let start = self.current.span;
        self.advance();

        if self.eat(&TokenKind::Star) {
            self.expect_ident_word("from")?;
            let source = self.expect_string()?;
            self.expect_semicolon()?;
            return Ok(Stmt::new(
                StmtKind::ExportAll { source },
                start.merge(self.prev_span),
            ));
        }

        if self.eat_ident("default") {
            let expr = self.parse_assign_expr()?;
            self.expect_semicolon()?;
            return Ok(Stmt::new(
                StmtKind::ExportDefault {
                    expr: Box::new(expr),
                },
                start.merge(self.prev_span),
            ));
        }

        if self.check(&TokenKind::LBrace) {
            self.advance();
            let mut specifiers = Vec::new();
            while !self.check(&TokenKind::RBrace) {
                let local = self.expect_ident()?;
                let exported = if self.eat_ident("as") {
                    self.expect_ident()?
                } else {
                    local.clone()
                };
                specifiers.push(ExportSpecifier { local, exported });
                if !self.eat(&TokenKind::Comma) {
                    break;
                }
            }
            self.expect(&TokenKind::RBrace)?;
            let source = if self.eat_ident("from") {
                Some(self.expect_string()?)
            } else {
                None
            };
            self.expect_semicolon()?;
            return Ok(Stmt::new(
                StmtKind::ExportNamed {
                    decl: None,
                    specifiers,
                    source,
                },
                start.merge(self.prev_span),
            ));
        }

        // `export <declaration>` forms.
        let decl = if self.is_ident("var") || self.is_ident("let") || self.is_ident("const") {
            let stmt = self.parse_var_decl()?;
            self.expect_semicolon()?;
            stmt
        } else if self.is_ident("function") {
            self.parse_function_decl(false)?
        } else if self.is_ident("async")
            && matches!(&self.peek_second(), TokenKind::Ident(w) if w == "function")
        {
            self.advance();
            self.parse_function_decl(true)?
        } else if self.is_ident("class") {
            self.parse_class_decl()?
        } else {
            return Err(self.unexpected("expected declaration after 'export'"));
        };

        Ok(Stmt::new(
            StmtKind::ExportNamed {
                decl: Some(Box::new(decl)),
                specifiers: Vec::new(),
                source: None,
            },
            start.merge(self.prev_span),
        ))
    }

    // =========================================================================
    // Expressions
    // =========================================================================

    fn parse_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;
        let first = self.parse_assign_expr()?;
        if !self.check(&TokenKind::Comma) {
            return Ok(first);
        }
        let mut exprs = vec![first];
        while self.eat(&TokenKind::Comma) {
            exprs.push(self.parse_assign_expr()?);
        }
        Ok(Expr::new(
            ExprKind::Sequence(exprs),
            start.merge(self.prev_span),
        ))
    }

    pub(crate) fn parse_assign_expr(&mut self) -> Result<Expr, ParseError> {
        if let Some(arrow) = self.try_parse_arrow()? {
            return Ok(arrow);
        }

        let start = self.current.span;
        let left = self.parse_conditional_expr()?;

        let op = match self.peek() {
            TokenKind::Eq => Some(AssignOp::Assign),
            TokenKind::PlusEq => Some(AssignOp::Add),
            TokenKind::MinusEq => Some(AssignOp::Sub),
            TokenKind::StarEq => Some(AssignOp::Mul),
            TokenKind::SlashEq => Some(AssignOp::Div),
            TokenKind::PercentEq => Some(AssignOp::Mod),
            _ => None,
        };

        if let Some(op) = op {
            if !matches!(left.kind, ExprKind::Ident(_) | ExprKind::Member { .. }) {
                return Err(self.unexpected("invalid assignment target"));
            }
            self.advance();
            let value = self.parse_assign_expr()?;
            return Ok(Expr::new(
                ExprKind::Assign {
                    op,
                    target: Box::new(left),
                    value: Box::new(value),
                },
                start.merge(self.prev_span),
            ));
        }

        Ok(left)
    }

    /// Detect and parse an arrow function, restoring the parser state when
    /// the lookahead does not pan out.
    fn try_parse_arrow(&mut self) -> Result<Option<Expr>, ParseError> {
        let start = self.current.span;

        // `x => ...`
        if matches!(self.peek(), TokenKind::Ident(w) if !is_reserved(w)) {
            if let TokenKind::Arrow = self.peek_second() {
                let param = self.expect_ident()?;
                self.advance();
                return Ok(Some(self.parse_arrow_body(vec![param], false, start)?));
            }
        }

        // `async x => ...` / `async (...) => ...`
        if self.is_ident("async") && !self.peek_second_has_newline() {
            let saved = self.save();
            self.advance();
            if matches!(self.peek(), TokenKind::Ident(w) if !is_reserved(w)) {
                if let TokenKind::Arrow = self.peek_second() {
                    let param = self.expect_ident()?;
                    self.advance();
                    return Ok(Some(self.parse_arrow_body(vec![param], true, start)?));
                }
            }
            if self.check(&TokenKind::LParen) {
                if let Some(params) = self.try_arrow_params() {
                    self.advance();
                    return Ok(Some(self.parse_arrow_body(params, true, start)?));
                }
            }
            self.restore(saved);
        }

        // `(...) => ...`
        if self.check(&TokenKind::LParen) {
            if let Some(params) = self.try_arrow_params() {
                self.advance();
                return Ok(Some(self.parse_arrow_body(params, false, start)?));
            }
        }

        Ok(None)
    }

    fn peek_second_has_newline(&self) -> bool {
        self.lexer.clone().next_token().newline_before
    }

    /// Attempt to read `( ident, ... )` followed by `=>`. On success the
    /// current token is the arrow; on failure the state is restored.
    fn try_arrow_params(&mut self) -> Option<Vec<String>> {
        let saved = self.save();
        self.advance();
        let mut params = Vec::new();
        loop {
            match self.peek() {
                TokenKind::RParen => {
                    self.advance();
                    break;
                }
                TokenKind::Ident(name) if !is_reserved(name) => {
                    params.push(name.clone());
                    self.advance();
                    if self.eat(&TokenKind::Comma) {
                        continue;
                    }
                    if self.check(&TokenKind::RParen) {
                        continue;
                    }
                    self.restore(saved);
                    return None;
                }
                _ => {
                    self.restore(saved);
                    return None;
                }
            }
        }
        if self.check(&TokenKind::Arrow) {
            Some(params)
        } else {
            self.restore(saved);
            None
        }
    }

    fn parse_arrow_body(
        &mut self,
        params: Vec<String>,
        is_async: bool,
        start: Span,
    ) -> Result<Expr, ParseError> {
        let body = if self.check(&TokenKind::LBrace) {
            ArrowBodyKind::Block(self.parse_function_body()?)
        } else {
            self.fn_depth += 1;
            let expr = self.parse_assign_expr();
            self.fn_depth -= 1;
            ArrowBodyKind::Expr(Box::new(expr?))
        };
        Ok(Expr::new(
            ExprKind::Arrow(Box::new(ArrowBody {
                params,
                body,
                is_async,
            })),
            start.merge(self.prev_span),
        ))
    }

    fn parse_conditional_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;
        let test = self.parse_binary_expr(0)?;
        if !self.eat(&TokenKind::Question) {
            return Ok(test);
        }
        let consequent = self.parse_assign_expr()?;
        self.expect(&TokenKind::Colon)?;
        let alternate = self.parse_assign_expr()?;
        Ok(Expr::new(
            ExprKind::Conditional {
                test: Box::new(test),
                consequent: Box::new(consequent),
                alternate: Box::new(alternate),
            },
            start.merge(self.prev_span),
        ))
    }

    fn parse_binary_expr(&mut self, min_prec: u8) -> Result<Expr, ParseError> {
        let start = self.current.span;
        let mut left = self.parse_unary_expr()?;

        while let Some((op, prec, right_assoc)) = self.peek_binary_op() {
            if prec < min_prec {
                break;
            }
            self.advance();
            let next_min = if right_assoc { prec } else { prec + 1 };
            let right = self.parse_binary_expr(next_min)?;
            left = Expr::new(
                ExprKind::Binary {
                    op,
                    left: Box::new(left),
                    right: Box::new(right),
                },
                start.merge(self.prev_span),
            );
        }

        Ok(left)
    }

    fn peek_binary_op(&self) -> Option<(BinaryOp, u8, bool)> {
        let entry = match self.peek() {
            TokenKind::PipePipe => (BinaryOp::Or, 1, false),
            TokenKind::QuestionQuestion => (BinaryOp::Nullish, 1, false),
            TokenKind::AmpAmp => (BinaryOp::And, 2, false),
            TokenKind::Pipe => (BinaryOp::BitOr, 3, false),
            TokenKind::Caret => (BinaryOp::BitXor, 4, false),
            TokenKind::Amp => (BinaryOp::BitAnd, 5, false),
            TokenKind::EqEq => (BinaryOp::EqEq, 6, false),
            TokenKind::NotEq => (BinaryOp::NotEq, 6, false),
            TokenKind::EqEqEq => (BinaryOp::StrictEq, 6, false),
            TokenKind::NotEqEq => (BinaryOp::StrictNotEq, 6, false),
            TokenKind::Lt => (BinaryOp::Lt, 7, false),
            TokenKind::Gt => (BinaryOp::Gt, 7, false),
            TokenKind::LtEq => (BinaryOp::Le, 7, false),
            TokenKind::GtEq => (BinaryOp::Ge, 7, false),
            TokenKind::Ident(w) if w == "in" => (BinaryOp::In, 7, false),
            TokenKind::Ident(w) if w == "instanceof" => (BinaryOp::InstanceOf, 7, false),
            TokenKind::Shl => (BinaryOp::Shl, 8, false),
            TokenKind::Shr => (BinaryOp::Shr, 8, false),
            TokenKind::UShr => (BinaryOp::UShr, 8, false),
            TokenKind::Plus => (BinaryOp::Add, 9, false),
            TokenKind::Minus => (BinaryOp::Sub, 9, false),
            TokenKind::Star => (BinaryOp::Mul, 10, false),
            TokenKind::Slash => (BinaryOp::Div, 10, false),
            TokenKind::Percent => (BinaryOp::Mod, 10, false),
            TokenKind::StarStar => (BinaryOp::Exp, 11, true),
            _ => return None,
        };
        Some(entry)
    }

    pub(crate) fn parse_unary_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;

        let unary = match self.peek() {
            TokenKind::Bang => Some(UnaryOp::Not),
            TokenKind::Minus => Some(UnaryOp::Neg),
            TokenKind::Plus => Some(UnaryOp::Pos),
            TokenKind::Tilde => Some(UnaryOp::BitNot),
            TokenKind::Ident(w) => match w.as_str() {
                "typeof" => Some(UnaryOp::TypeOf),
                "void" => Some(UnaryOp::Void),
                "delete" => Some(UnaryOp::Delete),
                _ => None,
            },
            _ => None,
        };
        if let Some(op) = unary {
            self.advance();
            let arg = self.parse_unary_expr()?;
            return Ok(Expr::new(
                ExprKind::Unary {
                    op,
                    arg: Box::new(arg),
                },
                start.merge(self.prev_span),
            ));
        }

        if self.is_ident("await") && !matches!(self.peek_second(), TokenKind::Arrow) {
            if self.fn_depth == 0 && !self.options.allow_top_level_await {
                return Err(ParseError::new(
                    "top-level await is not enabled",
                    self.current.span,
                ));
            }
            self.advance();
            let arg = self.parse_unary_expr()?;
            return Ok(Expr::new(
                ExprKind::Await(Box::new(arg)),
                start.merge(self.prev_span),
            ));
        }

        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus) {
            let op = if self.check(&TokenKind::PlusPlus) {
                UpdateOp::Inc
            } else {
                UpdateOp::Dec
            };
            self.advance();
            let arg = self.parse_unary_expr()?;
            return Ok(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: true,
                    arg: Box::new(arg),
                },
                start.merge(self.prev_span),
            ));
        }

        self.parse_postfix_expr()
    }

    fn parse_postfix_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;
        let expr = self.parse_left_hand_side_expr()?;
        if matches!(self.peek(), TokenKind::PlusPlus | TokenKind::MinusMinus)
            && !self.current.newline_before
        {
            let op = if self.check(&TokenKind::PlusPlus) {
                UpdateOp::Inc
            } else {
                UpdateOp::Dec
            };
            self.advance();
            return Ok(Expr::new(
                ExprKind::Update {
                    op,
                    prefix: false,
                    arg: Box::new(expr),
                },
                start.merge(self.prev_span),
            ));
        }
        Ok(expr)
    }

    fn parse_left_hand_side_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;

        if self.is_ident("new") {
            self.advance();
            let callee = self.parse_member_chain_only()?;
            let args = if self.check(&TokenKind::LParen) {
                self.parse_arguments()?
            } else {
                Vec::new()
            };
            let new_expr = Expr::new(
                ExprKind::New {
                    callee: Box::new(callee),
                    args,
                },
                start.merge(self.prev_span),
            );
            return self.parse_call_tail(new_expr, start);
        }

        let base = self.parse_primary_expr()?;
        self.parse_call_tail(base, start)
    }

    /// Member accesses only (for `new` callees).
    fn parse_member_chain_only(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;
        let mut expr = self.parse_primary_expr()?;
        loop {
            if self.eat(&TokenKind::Dot) {
                let name = self.expect_ident()?;
                let property = Expr::new(ExprKind::Ident(name), self.prev_span);
                expr = Expr::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                        computed: false,
                    },
                    start.merge(self.prev_span),
                );
            } else if self.eat(&TokenKind::LBracket) {
                let property = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                expr = Expr::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                        computed: true,
                    },
                    start.merge(self.prev_span),
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_call_tail(&mut self, mut expr: Expr, start: Span) -> Result<Expr, ParseError> {
        loop {
            if self.eat(&TokenKind::Dot) {
                let name = self.expect_ident()?;
                let property = Expr::new(ExprKind::Ident(name), self.prev_span);
                expr = Expr::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                        computed: false,
                    },
                    start.merge(self.prev_span),
                );
            } else if self.eat(&TokenKind::LBracket) {
                let property = self.parse_expr()?;
                self.expect(&TokenKind::RBracket)?;
                expr = Expr::new(
                    ExprKind::Member {
                        object: Box::new(expr),
                        property: Box::new(property),
                        computed: true,
                    },
                    start.merge(self.prev_span),
                );
            } else if self.check(&TokenKind::LParen) {
                let args = self.parse_arguments()?;
                expr = Expr::new(
                    ExprKind::Call {
                        callee: Box::new(expr),
                        args,
                    },
                    start.merge(self.prev_span),
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn parse_arguments(&mut self) -> Result<Vec<Expr>, ParseError> {
        self.expect(&TokenKind::LParen)?;
        let mut args = Vec::new();
        while !self.check(&TokenKind::RParen) {
            if self.check(&TokenKind::Ellipsis) {
                let start = self.current.span;
                self.advance();
                let inner = self.parse_assign_expr()?;
                args.push(Expr::new(
                    ExprKind::Spread(Box::new(inner)),
                    start.merge(self.prev_span),
                ));
            } else {
                args.push(self.parse_assign_expr()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RParen)?;
        Ok(args)
    }

    fn parse_primary_expr(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;
        match self.peek().clone() {
            TokenKind::Num(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Number(value), start))
            }
            TokenKind::Str(value) => {
                self.advance();
                Ok(Expr::new(ExprKind::Str(value), start))
            }
            TokenKind::TemplateChunk { text, tail } => {
                self.advance();
                self.parse_template(text, tail, start)
            }
            TokenKind::LParen => {
                self.advance();
                let expr = self.parse_expr()?;
                self.expect(&TokenKind::RParen)?;
                Ok(expr)
            }
            TokenKind::LBracket => self.parse_array_literal(),
            TokenKind::LBrace => self.parse_object_literal(),
            TokenKind::Ident(word) => match word.as_str() {
                "null" => {
                    self.advance();
                    Ok(Expr::new(ExprKind::Null, start))
                }
                "true" | "false" => {
                    self.advance();
                    Ok(Expr::new(ExprKind::Bool(word == "true"), start))
                }
                "this" => {
                    self.advance();
                    Ok(Expr::new(ExprKind::This, start))
                }
                "function" => {
                    self.advance();
                    self.parse_function_expr(false, start)
                }
                "async" if matches!(&self.peek_second(), TokenKind::Ident(w) if w == "function") =>
                {
                    self.advance();
                    self.advance();
                    self.parse_function_expr(true, start)
                }
                "class" => {
                    self.advance();
                    // Class expressions may be named; the name is not a
                    // module-scope binding so it is dropped here.
                    if matches!(self.peek(), TokenKind::Ident(w) if !is_reserved(w)) {
                        self.advance();
                    }
                    let class = self.parse_class_rest()?;
                    Ok(Expr::new(
                        ExprKind::Class(Box::new(class)),
                        start.merge(self.prev_span),
                    ))
                }
                "import" => {
                    self.advance();
                    if self.eat(&TokenKind::Dot) {
                        self.expect_ident_word("meta")?;
                        return Ok(Expr::new(ExprKind::ImportMeta, start.merge(self.prev_span)));
                    }
                    self.expect(&TokenKind::LParen)?;
                    let arg = self.parse_assign_expr()?;
                    self.eat(&TokenKind::Comma);
                    self.expect(&TokenKind::RParen)?;
                    Ok(Expr::new(
                        ExprKind::ImportCall(Box::new(arg)),
                        start.merge(self.prev_span),
                    ))
                }
                _ => {
                    self.advance();
                    Ok(Expr::new(ExprKind::Ident(word), start))
                }
            },
            _ => Err(self.unexpected("expected expression")),
        }
    }

    fn parse_function_expr(&mut self, is_async: bool, start: Span) -> Result<Expr, ParseError> {
        let is_generator = self.eat(&TokenKind::Star);
        let name = if matches!(self.peek(), TokenKind::Ident(w) if !is_reserved(w)) {
            Some(self.expect_ident()?)
        } else {
            None
        };
        let function = self.parse_function_rest(is_async, is_generator)?;
        Ok(Expr::new(
            ExprKind::Function {
                name,
                function: Box::new(function),
            },
            start.merge(self.prev_span),
        ))
    }

    fn parse_template(
        &mut self,
        first_text: String,
        first_tail: bool,
        start: Span,
    ) -> Result<Expr, ParseError> {
        if first_tail {
            return Ok(Expr::new(ExprKind::TemplateNoSub(first_text), start));
        }

        let mut quasis = vec![first_text];
        let mut exprs = Vec::new();
        loop {
            exprs.push(self.parse_expr()?);
            if !self.check(&TokenKind::RBrace) {
                return Err(self.unexpected("expected '}' in template literal"));
            }
            // Resume template scanning directly after the brace; normal
            // lexing would misread the template text.
            self.prev_span = self.current.span;
            let chunk = self.lexer.continue_template();
            self.current = self.lexer.next_token();
            match chunk.kind {
                TokenKind::TemplateChunk { text, tail } => {
                    quasis.push(text);
                    if tail {
                        break;
                    }
                }
                _ => return Err(self.unexpected("unterminated template literal")),
            }
        }
        Ok(Expr::new(
            ExprKind::Template { quasis, exprs },
            start.merge(self.prev_span),
        ))
    }

    fn parse_array_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;
        self.expect(&TokenKind::LBracket)?;
        let mut elements = Vec::new();
        while !self.check(&TokenKind::RBracket) {
            if self.check(&TokenKind::Ellipsis) {
                let spread_start = self.current.span;
                self.advance();
                let inner = self.parse_assign_expr()?;
                elements.push(Expr::new(
                    ExprKind::Spread(Box::new(inner)),
                    spread_start.merge(self.prev_span),
                ));
            } else {
                elements.push(self.parse_assign_expr()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBracket)?;
        Ok(Expr::new(
            ExprKind::Array(elements),
            start.merge(self.prev_span),
        ))
    }

    fn parse_object_literal(&mut self) -> Result<Expr, ParseError> {
        let start = self.current.span;
        self.expect(&TokenKind::LBrace)?;
        let mut props = Vec::new();
        while !self.check(&TokenKind::RBrace) {
            if self.check(&TokenKind::Ellipsis) {
                self.advance();
                let inner = self.parse_assign_expr()?;
                props.push(ObjectProp::Spread(Box::new(inner)));
            } else {
                props.push(self.parse_object_prop()?);
            }
            if !self.eat(&TokenKind::Comma) {
                break;
            }
        }
        self.expect(&TokenKind::RBrace)?;
        Ok(Expr::new(
            ExprKind::Object(props),
            start.merge(self.prev_span),
        ))
    }

    fn parse_object_prop(&mut self) -> Result<ObjectProp, ParseError> {
        // Computed key.
        if self.eat(&TokenKind::LBracket) {
            let key = self.parse_assign_expr()?;
            self.expect(&TokenKind::RBracket)?;
            self.expect(&TokenKind::Colon)?;
            let value = self.parse_assign_expr()?;
            return Ok(ObjectProp::KeyValue {
                key: Box::new(key),
                value: Box::new(value),
                computed: true,
            });
        }

        let key_span = self.current.span;
        let key_name = match self.peek() {
            TokenKind::Ident(name) => name.clone(),
            TokenKind::Str(value) => value.clone(),
            TokenKind::Num(value) => value.to_string(),
            _ => return Err(self.unexpected("expected property key")),
        };
        self.advance();

        if self.eat(&TokenKind::Colon) {
            let value = self.parse_assign_expr()?;
            return Ok(ObjectProp::KeyValue {
                key: Box::new(Expr::new(ExprKind::Str(key_name), key_span)),
                value: Box::new(value),
                computed: false,
            });
        }

        // Method shorthand.
        if self.check(&TokenKind::LParen) {
            let function = self.parse_function_rest(false, false)?;
            return Ok(ObjectProp::KeyValue {
                key: Box::new(Expr::new(ExprKind::Str(key_name), key_span)),
                value: Box::new(Expr::new(
                    ExprKind::Function {
                        name: None,
                        function: Box::new(function),
                    },
                    key_span.merge(self.prev_span),
                )),
                computed: false,
            });
        }

        Ok(ObjectProp::Shorthand(key_name))
    }
}

/// Words that cannot be arrow parameters or bare identifier references.
fn is_reserved(word: &str) -> bool {
    matches!(
        word,
        "var" | "let"
            | "const"
            | "function"
            | "class"
            | "return"
            | "if"
            | "else"
            | "while"
            | "for"
            | "throw"
            | "new"
            | "typeof"
            | "void"
            | "delete"
            | "in"
            | "instanceof"
            | "null"
            | "true"
            | "false"
            | "this"
            | "import"
            | "export"
            | "default"
            | "extends"
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::parse_module;

    fn parse_ok(source: &str) -> Program {
        parse_module(source, &ParserOptions::default()).expect("parse failed")
    }

    #[test]
    fn test_import_forms() {
        let program = parse_ok(
            "import a from \"./a\";\nimport * as ns from \"./b\";\nimport { x, y as z } from \"./c\";\nimport \"./side\";",
        );
        assert_eq!(program.body.len(), 4);
        match &program.body[2].kind {
            StmtKind::Import { specifiers, source } => {
                assert_eq!(source, "./c");
                assert_eq!(specifiers.len(), 2);
                assert_eq!(specifiers[1].local(), "z");
                assert_eq!(specifiers[1].imported(), "y");
            }
            other => panic!("expected import, got {other:?}"),
        }
        match &program.body[3].kind {
            StmtKind::Import { specifiers, .. } => assert!(specifiers.is_empty()),
            other => panic!("expected bare import, got {other:?}"),
        }
    }

    #[test]
    fn test_export_forms() {
        let program = parse_ok(
            "export const x = 1;\nexport function f() { return x; }\nexport { a as b };\nexport { c } from \"./d\";\nexport * from \"./e\";\nexport default f();",
        );
        assert_eq!(program.body.len(), 6);
        assert!(matches!(
            &program.body[0].kind,
            StmtKind::ExportNamed { decl: Some(_), .. }
        ));
        match &program.body[3].kind {
            StmtKind::ExportNamed { source, .. } => assert_eq!(source.as_deref(), Some("./d")),
            other => panic!("expected re-export, got {other:?}"),
        }
        assert!(matches!(&program.body[4].kind, StmtKind::ExportAll { source } if source == "./e"));
        assert!(matches!(&program.body[5].kind, StmtKind::ExportDefault { .. }));
    }

    #[test]
    fn test_dynamic_import_expression() {
        let program = parse_ok("const p = import(\"./lazy\");");
        match &program.body[0].kind {
            StmtKind::Var { decls, .. } => {
                let init = decls[0].init.as_ref().unwrap();
                assert!(matches!(&init.kind, ExprKind::ImportCall(_)));
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_import_meta() {
        let program = parse_ok("const u = import.meta;");
        match &program.body[0].kind {
            StmtKind::Var { decls, .. } => {
                assert!(matches!(
                    decls[0].init.as_ref().unwrap().kind,
                    ExprKind::ImportMeta
                ));
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_arrow_functions() {
        let program = parse_ok("const f = (a, b) => a + b;\nconst g = x => x;\nconst h = () => { return 1; };");
        assert_eq!(program.body.len(), 3);
        for stmt in &program.body {
            match &stmt.kind {
                StmtKind::Var { decls, .. } => {
                    assert!(matches!(
                        decls[0].init.as_ref().unwrap().kind,
                        ExprKind::Arrow(_)
                    ));
                }
                other => panic!("expected var decl, got {other:?}"),
            }
        }
    }

    #[test]
    fn test_parenthesized_expr_not_arrow() {
        let program = parse_ok("const x = (1 + 2) * 3;");
        match &program.body[0].kind {
            StmtKind::Var { decls, .. } => {
                assert!(matches!(
                    decls[0].init.as_ref().unwrap().kind,
                    ExprKind::Binary { op: BinaryOp::Mul, .. }
                ));
            }
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_precedence() {
        let program = parse_ok("const x = 1 + 2 * 3;");
        match &program.body[0].kind {
            StmtKind::Var { decls, .. } => match &decls[0].init.as_ref().unwrap().kind {
                ExprKind::Binary { op: BinaryOp::Add, right, .. } => {
                    assert!(matches!(right.kind, ExprKind::Binary { op: BinaryOp::Mul, .. }));
                }
                other => panic!("expected add, got {other:?}"),
            },
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_template_with_substitution() {
        let program = parse_ok("const s = `a${x}b${y}c`;");
        match &program.body[0].kind {
            StmtKind::Var { decls, .. } => match &decls[0].init.as_ref().unwrap().kind {
                ExprKind::Template { quasis, exprs } => {
                    assert_eq!(quasis, &vec!["a".to_string(), "b".to_string(), "c".to_string()]);
                    assert_eq!(exprs.len(), 2);
                }
                other => panic!("expected template, got {other:?}"),
            },
            other => panic!("expected var decl, got {other:?}"),
        }
    }

    #[test]
    fn test_class_with_methods() {
        let program = parse_ok("class Point extends Base { constructor(x) { this.x = x; } static of(x) { return new Point(x); } }");
        match &program.body[0].kind {
            StmtKind::Class { name, class } => {
                assert_eq!(name, "Point");
                assert!(class.super_class.is_some());
                assert_eq!(class.methods.len(), 2);
                assert!(class.methods[1].is_static);
            }
            other => panic!("expected class, got {other:?}"),
        }
    }

    #[test]
    fn test_top_level_await_gated() {
        let err = parse_module("await f();", &ParserOptions::default()).unwrap_err();
        assert!(err.message.contains("top-level await"));

        let options = ParserOptions { allow_top_level_await: true };
        assert!(parse_module("await f();", &options).is_ok());

        // Inside a function body, always allowed.
        assert!(parse_module("async function f() { await g(); }", &ParserOptions::default()).is_ok());
    }

    #[test]
    fn test_asi() {
        let program = parse_ok("const a = 1\nconst b = 2");
        assert_eq!(program.body.len(), 2);
    }

    #[test]
    fn test_control_flow() {
        let program = parse_ok(
            "if (a) { f(); } else g();\nwhile (x < 10) { x++; }\nfor (let i = 0; i < n; i++) { sum += i; }",
        );
        assert_eq!(program.body.len(), 3);
        assert!(matches!(&program.body[0].kind, StmtKind::If { .. }));
        assert!(matches!(&program.body[1].kind, StmtKind::While { .. }));
        assert!(matches!(&program.body[2].kind, StmtKind::For { .. }));
    }

    #[test]
    fn test_object_and_array_literals() {
        let program = parse_ok("const o = { a: 1, b, [k]: 2, m() { return 3; }, ...rest };\nconst arr = [1, ...xs, f()];");
        assert_eq!(program.body.len(), 2);
        match &program.body[0].kind {
            StmtKind::Var { decls, .. } => match &decls[0].init.as_ref().unwrap().kind {
                ExprKind::Object(props) => assert_eq!(props.len(), 5),
                other => panic!("expected object, got {other:?}"),
            },
            other => panic!("expected var decl, got {other:?}"),
        }
    }
}
