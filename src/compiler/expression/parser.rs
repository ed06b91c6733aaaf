use super::cursor::Cursor;
use super::literal;
use super::{Expr, InfixOp, PrefixOp, Refinement};
use crate::compiler::error::Result;
use regex::Regex;
use std::sync::LazyLock;

static DOT_REFINEMENT_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\.[a-zA-Z_$0-9]+").unwrap());

static ARRAY_MEMBER_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^\[(0|[1-9][0-9]*)\]").unwrap());

/// 宿主全局名：直接输出，不做数据模型查找
static GLOBALS_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:Array|Date|RegExp|decodeURIComponent|decodeURI|encodeURIComponent|encodeURI|isFinite|isNaN|parseFloat|parseInt|JSON|Math|NaN|undefined|null)$",
    )
    .unwrap()
});

/// 表达式之后可选的 `: alias` 循环变量别名
static ALIAS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^(?:\s*:\s*(\w+))?\s*$").unwrap());

/// 标签文本解析结果
#[derive(Debug, Clone, PartialEq)]
pub struct TagExpression {
    pub expr: Option<Expr>,
    /// 表达式实际消耗的源码长度
    pub consumed: usize,
    pub alias: Option<String>,
}

/// 解析标签内容：一个表达式，后面可以跟 `: alias`
pub fn parse_tag(text: &str) -> Result<TagExpression> {
    let mut c = Cursor::new(text);
    let expr = expression(&mut c)?;
    let consumed = c.pos;

    let Some(caps) = ALIAS_RE.captures(c.rest()) else {
        return Err(c.expected("the end of the expression or a ': alias' suffix"));
    };

    Ok(TagExpression {
        expr,
        consumed,
        alias: caps.get(1).map(|m| m.as_str().to_string()),
    })
}

/// 解析整段文本为单个表达式，要求完全消耗
pub fn parse(text: &str) -> Result<Expr> {
    let mut c = Cursor::new(text);
    let expr = expression(&mut c)?;
    c.skip_ws();
    match expr {
        Some(expr) if c.is_eof() => Ok(expr),
        _ => Err(c.expected("an expression")),
    }
}

pub fn expression(c: &mut Cursor) -> Result<Option<Expr>> {
    conditional(c)
}

/// `test ? consequent : alternate`，任何一段缺失都回退为 `test`
fn conditional(c: &mut Cursor) -> Result<Option<Expr>> {
    let Some(test) = binary(c, 0)? else {
        return Ok(None);
    };

    let start = c.pos;
    c.skip_ws();
    if !c.eat("?") {
        c.pos = start;
        return Ok(Some(test));
    }
    c.skip_ws();

    let Some(consequent) = expression(c)? else {
        c.pos = start;
        return Ok(Some(test));
    };

    c.skip_ws();
    if !c.eat(":") {
        c.pos = start;
        return Ok(Some(test));
    }
    c.skip_ws();

    let Some(alternate) = expression(c)? else {
        c.pos = start;
        return Ok(Some(test));
    };

    Ok(Some(Expr::Conditional {
        test: Box::new(test),
        consequent: Box::new(consequent),
        alternate: Box::new(alternate),
    }))
}

/// 第 `level` 层二元运算，循环折叠为左结合
fn binary(c: &mut Cursor, level: usize) -> Result<Option<Expr>> {
    let Some(ops) = InfixOp::LEVELS.get(level) else {
        return unary(c);
    };

    let Some(mut left) = binary(c, level + 1)? else {
        return Ok(None);
    };

    loop {
        let start = c.pos;
        c.skip_ws();

        let Some(op) = peek_infix(c).filter(|op| ops.contains(op)) else {
            c.pos = start;
            return Ok(Some(left));
        };
        c.advance(op.as_str().len());
        c.skip_ws();

        let Some(right) = binary(c, level + 1)? else {
            c.pos = start;
            return Ok(Some(left));
        };

        left = Expr::Infix {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
    }
}

/// 当前位置最长的二元运算符
fn peek_infix(c: &Cursor) -> Option<InfixOp> {
    InfixOp::BY_LENGTH.into_iter().find(|op| {
        let mut probe = c.clone();
        if op.is_keyword() {
            probe.eat_keyword(op.as_str())
        } else {
            probe.eat(op.as_str())
        }
    })
}

/// 前缀运算：操作数仍是一元表达式
fn unary(c: &mut Cursor) -> Result<Option<Expr>> {
    for op in PrefixOp::ALL {
        let matched = match op {
            PrefixOp::TypeOf => c.eat_keyword(op.as_str()),
            _ => c.eat(op.as_str()),
        };
        if !matched {
            continue;
        }

        c.skip_ws();
        let Some(operand) = unary(c)? else {
            return Err(c.expected("an expression"));
        };
        return Ok(Some(Expr::Prefix {
            op,
            operand: Box::new(operand),
        }));
    }
    member_or_invocation(c)
}

/// 基本表达式后面跟任意多个 `.name`、`[expr]`、`(args)`，迭代构建
fn member_or_invocation(c: &mut Cursor) -> Result<Option<Expr>> {
    let Some(mut expr) = primary(c)? else {
        return Ok(None);
    };

    loop {
        let current = c.pos;

        if let Some(refinement) = refinement(c)? {
            expr = Expr::Member {
                object: Box::new(expr),
                refinement,
            };
            continue;
        }

        if c.eat("(") {
            c.skip_ws();
            let args = expression_list(c)?;
            c.skip_ws();
            if !c.eat(")") {
                c.pos = current;
                break;
            }
            expr = Expr::Invocation {
                callee: Box::new(expr),
                args: args.unwrap_or_default(),
            };
            continue;
        }

        break;
    }

    Ok(Some(expr))
}

fn refinement(c: &mut Cursor) -> Result<Option<Refinement>> {
    let start = c.pos;
    c.skip_ws();

    if c.eat(".") {
        c.skip_ws();
        return match literal::name(c) {
            Some(name) => Ok(Some(Refinement::Name(name.to_string()))),
            None => Err(c.expected("a property name")),
        };
    }

    if c.eat("[") {
        c.skip_ws();
        let Some(index) = expression(c)? else {
            return Err(c.expected("an expression"));
        };
        c.skip_ws();
        if !c.eat("]") {
            return Err(c.expected("\"]\""));
        }
        return Ok(Some(Refinement::Index(Box::new(index))));
    }

    c.pos = start;
    Ok(None)
}

fn primary(c: &mut Cursor) -> Result<Option<Expr>> {
    if let Some(literal) = literal::literal(c)? {
        return Ok(Some(literal));
    }
    if let Some(reference) = reference(c) {
        return Ok(Some(reference));
    }
    bracketed(c)
}

fn bracketed(c: &mut Cursor) -> Result<Option<Expr>> {
    let start = c.pos;
    if !c.eat("(") {
        return Ok(None);
    }
    c.skip_ws();

    let Some(inner) = expression(c)? else {
        c.pos = start;
        return Ok(None);
    };

    c.skip_ws();
    if !c.eat(")") {
        c.pos = start;
        return Ok(None);
    }
    Ok(Some(Expr::Group(Box::new(inner))))
}

/// 数据模型引用
///
/// `../` 祖先跳转（可重复）或单个 `.` 隐式迭代器，后接名字与
/// `.name` / `[N]` 细化。后面紧跟 `(` 时，最后一个细化从引用中剥离并
/// 回退游标，让调用的接收者是所属对象。
fn reference(c: &mut Cursor) -> Option<Expr> {
    let mut prefix = String::new();
    while c.eat("../") {
        prefix.push_str("../");
    }
    if prefix.is_empty() && c.eat(".") {
        prefix.push('.');
    }

    let mut name = literal::name(c).unwrap_or_default();

    if prefix.is_empty() && GLOBALS_RE.is_match(name) {
        return Some(Expr::Global(name.to_string()));
    }

    // `this` 等价于隐式迭代器
    if prefix.is_empty() && name == "this" {
        name = ".";
    }

    let mut combo = format!("{prefix}{name}");
    if combo.is_empty() {
        return None;
    }

    // 每个细化之前的 (引用长度, 源码位置)
    let mut marks = Vec::new();
    loop {
        let mark = (combo.len(), c.pos);
        if let Some(dot) = c.eat_regex(&DOT_REFINEMENT_RE) {
            combo.push_str(dot);
        } else if let Some(index) = c.eat_regex(&ARRAY_MEMBER_RE) {
            combo.push('.');
            combo.push_str(index);
        } else {
            break;
        }
        marks.push(mark);
    }

    if c.rest().starts_with('(')
        && let Some(&(len, pos)) = marks.last()
    {
        combo.truncate(len);
        c.pos = pos;
    }

    Some(Expr::Reference(combo))
}

/// 逗号分隔的表达式列表；出现悬空逗号时整体回退
pub fn expression_list(c: &mut Cursor) -> Result<Option<Vec<Expr>>> {
    let start = c.pos;
    c.skip_ws();

    let Some(first) = expression(c)? else {
        c.pos = start;
        return Ok(None);
    };
    let mut items = vec![first];

    loop {
        let save = c.pos;
        c.skip_ws();
        if !c.eat(",") {
            c.pos = save;
            return Ok(Some(items));
        }
        c.skip_ws();
        match expression(c)? {
            Some(item) => items.push(item),
            None => {
                c.pos = start;
                return Ok(None);
            }
        }
    }
}
