//! Text rendering of bound bodies
//!
//! The output is meant for tests and trace logs, not for round-tripping.

use crate::{Body, Callee, Expr, LocalDecl, Place, Stmt};
use cv_symbols::SymbolTable;
use cv_symbols::display::{display_member, display_ty};
use std::mem;

/// Renders a whole body: declarations first, then statements
#[must_use]
pub fn render(body: &Body, symbols: &SymbolTable) -> String {
    let mut printer = Printer {
        symbols,
        out: String::new(),
        indent: 0,
    };
    for (index, param) in body.params.iter().enumerate() {
        printer.decl("param", &format!("arg{index}"), param);
    }
    for (index, local) in body.locals.iter().enumerate() {
        printer.decl("local", &format!("_{index}"), local);
    }
    printer.stmts(&body.root);
    printer.out
}

/// Renders a single expression
#[must_use]
pub fn render_expr(expr: &Expr, symbols: &SymbolTable) -> String {
    let mut printer = Printer {
        symbols,
        out: String::new(),
        indent: 0,
    };
    printer.expr(expr);
    printer.out
}

struct Printer<'symbols> {
    symbols: &'symbols SymbolTable,
    out: String,
    indent: usize,
}

impl Printer<'_> {
    fn decl(&mut self, keyword: &str, slot: &str, decl: &LocalDecl) {
        let ty = display_ty(self.symbols, decl.ty);
        match decl.name {
            Some(name) => {
                let name = self.symbols.interner.resolve(name);
                self.line(&format!("{keyword} {slot} {name}: {ty}"));
            }
            None => self.line(&format!("{keyword} {slot}: {ty}")),
        }
    }

    fn line(&mut self, text: &str) {
        for _ in 0..self.indent {
            self.out.push_str("    ");
        }
        self.out.push_str(text);
        self.out.push('\n');
    }

    fn nested(&mut self, header: &str, stmts: &[Stmt]) {
        self.line(header);
        self.indent += 1;
        self.stmts(stmts);
        self.indent -= 1;
    }

    fn stmts(&mut self, stmts: &[Stmt]) {
        for stmt in stmts {
            self.stmt(stmt);
        }
    }

    fn stmt(&mut self, stmt: &Stmt) {
        match stmt {
            Stmt::Block(stmts) => {
                self.nested("{", stmts);
                self.line("}");
            }
            Stmt::Expr(expr) => {
                let text = self.text(|printer| printer.expr(expr));
                self.line(&format!("{text};"));
            }
            Stmt::Assign { place, value } => {
                let text = self.text(|printer| {
                    printer.place(place);
                    printer.out.push_str(" = ");
                    printer.expr(value);
                });
                self.line(&format!("{text};"));
            }
            Stmt::Label(label) => self.line(&format!("{label}:")),
            Stmt::Goto(label) => self.line(&format!("goto {label};")),
            Stmt::CondGoto {
                cond,
                jump_if,
                target,
            } => {
                let cond = self.text(|printer| printer.expr(cond));
                if *jump_if {
                    self.line(&format!("if {cond} goto {target};"));
                } else {
                    self.line(&format!("if !{cond} goto {target};"));
                }
            }
            Stmt::Switch {
                scrutinee,
                cases,
                default,
            } => {
                let mut text = self.text(|printer| printer.expr(scrutinee));
                text.insert_str(0, "switch ");
                text.push_str(" {");
                for (index, (value, target)) in cases.iter().enumerate() {
                    let separator = if index == 0 { " " } else { ", " };
                    text.push_str(&format!("{separator}{value} => {target}"));
                }
                if let Some(default) = default {
                    text.push_str(&format!(", _ => {default}"));
                }
                text.push_str(" }");
                self.line(&text);
            }
            Stmt::Return(None) => self.line("return;"),
            Stmt::Return(Some(value)) => {
                let value = self.text(|printer| printer.expr(value));
                self.line(&format!("return {value};"));
            }
            Stmt::Yield(value) => {
                let value = self.text(|printer| printer.expr(value));
                self.line(&format!("yield {value};"));
            }
            Stmt::YieldBreak => self.line("yield break;"),
            Stmt::Try(try_stmt) => {
                self.nested(&format!("try {{ // {}", try_stmt.id), &try_stmt.body);
                for catch in &try_stmt.catches {
                    let mut header = String::from("} catch");
                    if let Some(ty) = catch.exception_ty {
                        header.push_str(&format!(" {}", display_ty(self.symbols, ty)));
                    }
                    if let Some(local) = catch.local {
                        header.push_str(&format!(" {local}"));
                    }
                    header.push_str(" {");
                    self.nested(&header, &catch.body);
                }
                if let Some(finally) = &try_stmt.finally {
                    self.nested("} finally {", finally);
                }
                self.line("}");
            }
            Stmt::TryFault { body, fault } => {
                self.nested("try {", body);
                self.nested("} fault {", fault);
                self.line("}");
            }
            Stmt::Throw(value) => {
                let value = self.text(|printer| printer.expr(value));
                self.line(&format!("throw {value};"));
            }
            Stmt::Nop => self.line("nop;"),
        }
    }

    /// Renders into a scratch buffer and returns the text
    fn text(&mut self, render: impl FnOnce(&mut Self)) -> String {
        let saved = mem::take(&mut self.out);
        render(self);
        mem::replace(&mut self.out, saved)
    }

    fn exprs(&mut self, exprs: &[Expr]) {
        for (index, expr) in exprs.iter().enumerate() {
            if index > 0 {
                self.out.push_str(", ");
            }
            self.expr(expr);
        }
    }

    fn expr(&mut self, expr: &Expr) {
        match expr {
            Expr::Const(constant) => self.out.push_str(&constant.to_string()),
            Expr::Local(local) => self.out.push_str(&local.to_string()),
            Expr::Param(param) => self.out.push_str(&param.to_string()),
            Expr::MachineField(slot) => self.out.push_str(&slot.to_string()),
            Expr::Field { receiver, field } => {
                self.receiver(receiver.as_deref());
                self.out
                    .push_str(&display_member(self.symbols, *field).to_string());
            }
            Expr::Call {
                callee,
                receiver,
                args,
            } => {
                self.receiver(receiver.as_deref());
                match callee {
                    Callee::Method(method) => self
                        .out
                        .push_str(&display_member(self.symbols, *method).to_string()),
                    Callee::Synthesized(method) => self.out.push_str(&format!("this.{method}")),
                }
                self.out.push('(');
                self.exprs(args);
                self.out.push(')');
            }
            Expr::Binary { op, lhs, rhs } => {
                self.out.push('(');
                self.expr(lhs);
                self.out.push_str(&format!(" {op} "));
                self.expr(rhs);
                self.out.push(')');
            }
            Expr::Unary { op, operand } => {
                self.out.push_str(&op.to_string());
                self.expr(operand);
            }
            Expr::ArrayElement { array, indices, .. } => self.element(array, indices),
            Expr::AddressOf(place) => {
                self.out.push('&');
                self.place(place);
            }
            Expr::NewArray { array_ty, lengths } => {
                self.out
                    .push_str(&format!("new {}(", display_ty(self.symbols, *array_ty)));
                self.exprs(lengths);
                self.out.push(')');
            }
            Expr::TypeToken(ty) => self
                .out
                .push_str(&format!("typeof({})", display_ty(self.symbols, *ty))),
        }
    }

    fn receiver(&mut self, receiver: Option<&Expr>) {
        if let Some(receiver) = receiver {
            self.expr(receiver);
            self.out.push('.');
        }
    }

    fn element(&mut self, array: &Expr, indices: &[Expr]) {
        self.expr(array);
        self.out.push('[');
        self.exprs(indices);
        self.out.push(']');
    }

    fn place(&mut self, place: &Place) {
        match place {
            Place::Local(local) => self.out.push_str(&local.to_string()),
            Place::Param(param) => self.out.push_str(&param.to_string()),
            Place::MachineField(slot) => self.out.push_str(&slot.to_string()),
            Place::Field { receiver, field } => {
                self.receiver(receiver.as_deref());
                self.out
                    .push_str(&display_member(self.symbols, *field).to_string());
            }
            Place::ArrayElement { array, indices, .. } => self.element(array, indices),
        }
    }
}
