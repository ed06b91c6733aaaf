//! 编译产物的代码清单形式
//!
//! `t.b` 追加输出，`t.v`/`t.t` 转义或原样取值，`t.s`/`t.rs` 判定并迭代
//! section，`t.rp` 渲染 partial，`t.sub` 应用块覆盖，`t.fl` 取出结果。

use crate::compiler::expression::{Expr, Refinement};
use crate::compiler::program::{CompiledTemplate, Op, PartialTable, Program, Subs};
use std::fmt::{self, Display, Formatter, Write};

/// 转义字符串字面量，反斜杠必须最先处理
pub fn esc(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
        .replace('\r', "\\r")
}

impl Display for Expr {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(raw) => f.write_str(raw),
            Expr::String(s) => write!(f, "\"{}\"", esc(s)),
            Expr::Boolean(b) => write!(f, "{b}"),
            Expr::Array(items) => {
                f.write_char('[')?;
                list(f, items)?;
                f.write_char(']')
            }
            Expr::Object(pairs) => {
                f.write_char('{')?;
                for (i, pair) in pairs.iter().enumerate() {
                    if i > 0 {
                        f.write_char(',')?;
                    }
                    write!(f, "{}:{}", pair.key, pair.value)?;
                }
                f.write_char('}')
            }
            Expr::Global(name) => f.write_str(name),
            Expr::Reference(name) => {
                let method = if name.contains('.') { 'd' } else { 'f' };
                write!(f, "t.{method}(\"{}\",c,p,0)", esc(name))
            }
            Expr::Member { object, refinement } => {
                write!(f, "{object}")?;
                match refinement {
                    Refinement::Name(name) => write!(f, ".{name}"),
                    Refinement::Index(index) => write!(f, "[{index}]"),
                }
            }
            Expr::Prefix { op, operand } => write!(f, "{} {operand}", op.as_str()),
            Expr::Group(inner) => write!(f, "({inner})"),
            Expr::Conditional {
                test,
                consequent,
                alternate,
            } => write!(f, "{test}?{consequent}:{alternate}"),
            Expr::Infix { op, left, right } if op.is_keyword() => {
                write!(f, "{left} {} {right}", op.as_str())
            }
            Expr::Infix { op, left, right } => write!(f, "{left}{}{right}", op.as_str()),
            Expr::Invocation { callee, args } => {
                write!(f, "{callee}(")?;
                list(f, args)?;
                f.write_char(')')
            }
        }
    }
}

fn list(f: &mut Formatter<'_>, items: &[Expr]) -> fmt::Result {
    for (i, item) in items.iter().enumerate() {
        if i > 0 {
            f.write_char(',')?;
        }
        write!(f, "{item}")?;
    }
    Ok(())
}

fn ops(f: &mut Formatter<'_>, body: &[Op]) -> fmt::Result {
    for op in body {
        match op {
            Op::Text(text) => write!(f, "t.b(\"{}\");", esc(text))?,
            Op::Newline { last: true } => f.write_str("t.b(\"\\n\");")?,
            Op::Newline { last: false } => f.write_str("t.b(\"\\n\" + i);")?,
            Op::Escaped(expr) => write!(f, "t.b(t.v({expr}));")?,
            Op::Unescaped(expr) => write!(f, "t.b(t.t({expr}));")?,
            Op::Section(section) => {
                write!(
                    f,
                    "if(t.s({},c,p,0,{},{},\"{}\")){{t.rs(c,p,function(c,p,t){{",
                    section.test,
                    section.start,
                    section.end,
                    esc(&section.delimiters)
                )?;
                ops(f, &section.body)?;
                f.write_char('}')?;
                if let Some(alias) = &section.alias {
                    write!(f, ",\"{}\"", esc(alias))?;
                }
                f.write_str(");c.pop();}")?;
            }
            Op::Inverted { test, body } => {
                write!(f, "if(!t.s({test},c,p,1,0,0,\"\")){{")?;
                ops(f, body)?;
                f.write_str("};")?;
            }
            Op::Partial { symbol, indent } => {
                write!(f, "t.b(t.rp(\"{}\",c,p,\"{}\"));", esc(symbol), esc(indent))?
            }
            Op::Sub { name } => write!(f, "t.sub(\"{}\",c,p,i);", esc(name))?,
        }
    }
    Ok(())
}

/// 块覆盖程序的函数体
impl Display for Program {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        ops(f, &self.ops)
    }
}

fn subs(f: &mut Formatter<'_>, subs: &Subs) -> fmt::Result {
    f.write_str("{ ")?;
    for (i, (name, program)) in subs.iter().enumerate() {
        if i > 0 {
            f.write_char(',')?;
        }
        write!(f, "\"{}\": function(c,p,t,i) {{{program}}}", esc(name))?;
    }
    f.write_str(" }")
}

fn partials(f: &mut Formatter<'_>, table: &PartialTable, own_subs: &Subs) -> fmt::Result {
    f.write_str("partials: {")?;
    for (i, (symbol, partial)) in table.iter().enumerate() {
        if i > 0 {
            f.write_char(',')?;
        }
        write!(f, "\"{}\":{{name:\"{}\", ", esc(symbol), esc(&partial.name))?;
        partials(f, &partial.partials, &partial.subs)?;
        f.write_char('}')?;
    }
    f.write_str("}, subs: ")?;
    subs(f, own_subs)
}

impl Display for CompiledTemplate {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{{code: function (c,p,i) {{ var t=this;t.b(i=i||\"\");{}return t.fl(); }},",
            self.program
        )?;
        partials(f, &self.partials, &self.subs)?;
        f.write_char('}')
    }
}
