use super::cursor::Cursor;
use super::parser::{expression, expression_list};
use super::{Expr, KeyValue, PropertyKey};
use crate::compiler::error::Result;
use regex::Regex;
use std::fmt::Write;
use std::sync::LazyLock;

static NUMBER_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"^(?:[+-]?)(?:(?:(?:0|[1-9][0-9]*)?\.[0-9]+)|(?:(?:0|[1-9][0-9]*)\.)|(?:0|[1-9][0-9]*))(?:[eE][+-]?[0-9]+)?",
    )
    .unwrap()
});

static NAME_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[a-zA-Z_$][a-zA-Z_$0-9]*").unwrap());

static IDENTIFIER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[a-zA-Z_$][a-zA-Z_$0-9]*$").unwrap());

pub fn name<'a>(c: &mut Cursor<'a>) -> Option<&'a str> {
    c.eat_regex(&NAME_RE)
}

/// 字面量：数字、布尔、字符串、对象、数组，按此顺序尝试
pub fn literal(c: &mut Cursor) -> Result<Option<Expr>> {
    if let Some(number) = number(c) {
        return Ok(Some(number));
    }
    if let Some(boolean) = boolean(c) {
        return Ok(Some(boolean));
    }
    if let Some(string) = string(c)? {
        return Ok(Some(Expr::String(string)));
    }
    if let Some(object) = object(c)? {
        return Ok(Some(object));
    }
    array(c)
}

pub fn number(c: &mut Cursor) -> Option<Expr> {
    c.eat_regex(&NUMBER_RE).map(|raw| Expr::Number(raw.to_string()))
}

fn boolean(c: &mut Cursor) -> Option<Expr> {
    if c.eat_keyword("true") {
        Some(Expr::Boolean(true))
    } else if c.eat_keyword("false") {
        Some(Expr::Boolean(false))
    } else {
        None
    }
}

/// 单引号或双引号字符串，返回解码后的值
///
/// 扫描到的内容先改写成 JSON 字符串字面量再交给 `serde_json` 解码，
/// 因此转义语义与 JSON 一致；`\x`、`\0`、续行等额外形式在改写时
/// 折算成 `\u` 转义。
pub fn string(c: &mut Cursor) -> Result<Option<String>> {
    let quote = match c.peek() {
        Some(q @ ('"' | '\'')) => q,
        _ => return Ok(None),
    };
    c.advance(1);

    let mut json = String::from("\"");
    loop {
        let rest = c.rest();
        let Some(ch) = rest.chars().next() else { break };
        match ch {
            q if q == quote => break,
            '\n' | '\r' | '\u{2028}' | '\u{2029}' => break,
            '\\' => {
                if !escape_sequence(c, &mut json)? {
                    break;
                }
            }
            other => {
                push_json_char(&mut json, other);
                c.advance(other.len_utf8());
            }
        }
    }

    if !c.eat(if quote == '"' { "\"" } else { "'" }) {
        return Err(c.expected(&format!("closing {quote}")));
    }
    json.push('"');

    match serde_json::from_str::<String>(&json) {
        Ok(value) => Ok(Some(value)),
        Err(_) => Err(c.expected("a valid string literal")),
    }
}

/// 处理一个以反斜杠开头的转义，返回 false 表示源码在反斜杠处结束
fn escape_sequence(c: &mut Cursor, json: &mut String) -> Result<bool> {
    let rest = &c.rest()[1..];
    let Some(next) = rest.chars().next() else {
        return Ok(false);
    };
    let after = &rest[next.len_utf8()..];
    match next {
        // 续行：折算为 \u 转义
        '\r' | '\n' | '\u{2028}' | '\u{2029}' => {
            let _ = write!(json, "\\u{:04x}", next as u32);
            let len = if next == '\r' && after.starts_with('\n') { 2 } else { next.len_utf8() };
            c.advance(1 + len);
        }
        '"' => {
            json.push_str("\\\"");
            c.advance(2);
        }
        '\'' => {
            json.push('\'');
            c.advance(2);
        }
        '\\' | 'b' | 'f' | 'n' | 'r' | 't' => {
            json.push('\\');
            json.push(next);
            c.advance(2);
        }
        '0' if !after.starts_with(|d: char| d.is_ascii_digit()) => {
            json.push_str("\\u0000");
            c.advance(2);
        }
        'x' if hex_digits(after, 2) => {
            json.push_str("\\u00");
            json.push_str(&after[..2]);
            c.advance(4);
        }
        'u' if hex_digits(after, 4) => {
            json.push_str("\\u");
            json.push_str(&after[..4]);
            c.advance(6);
        }
        'x' | 'u' | '0'..='9' => {
            c.advance(1);
            return Err(c.expected("a valid escape sequence"));
        }
        other => {
            push_json_char(json, other);
            c.advance(1 + other.len_utf8());
        }
    }
    Ok(true)
}

fn hex_digits(s: &str, n: usize) -> bool {
    s.len() >= n && s.as_bytes()[..n].iter().all(u8::is_ascii_hexdigit)
}

fn push_json_char(json: &mut String, ch: char) {
    match ch {
        '"' => json.push_str("\\\""),
        '\\' => json.push_str("\\\\"),
        c if (c as u32) < 0x20 => {
            let _ = write!(json, "\\u{:04x}", c as u32);
        }
        c => json.push(c),
    }
}

/// 对象键：字符串、数字或裸标识符
fn key(c: &mut Cursor) -> Result<Option<PropertyKey>> {
    if let Some(s) = string(c)? {
        return Ok(Some(if IDENTIFIER_RE.is_match(&s) {
            PropertyKey::Identifier(s)
        } else {
            PropertyKey::Quoted(s)
        }));
    }
    if let Some(Expr::Number(raw)) = number(c) {
        return Ok(Some(PropertyKey::Number(raw)));
    }
    Ok(name(c).map(|n| PropertyKey::Identifier(n.to_string())))
}

fn key_value(c: &mut Cursor) -> Result<Option<KeyValue>> {
    let start = c.pos;
    c.skip_ws();

    let Some(key) = key(c)? else {
        c.pos = start;
        return Ok(None);
    };

    c.skip_ws();
    if !c.eat(":") {
        c.pos = start;
        return Ok(None);
    }
    c.skip_ws();

    let Some(value) = expression(c)? else {
        c.pos = start;
        return Ok(None);
    };
    Ok(Some(KeyValue { key, value }))
}

fn key_values(c: &mut Cursor) -> Result<Option<Vec<KeyValue>>> {
    let start = c.pos;
    let Some(first) = key_value(c)? else {
        return Ok(None);
    };
    let mut pairs = vec![first];
    loop {
        let save = c.pos;
        c.skip_ws();
        if !c.eat(",") {
            c.pos = save;
            return Ok(Some(pairs));
        }
        match key_value(c)? {
            Some(pair) => pairs.push(pair),
            None => {
                c.pos = start;
                return Ok(None);
            }
        }
    }
}

fn object(c: &mut Cursor) -> Result<Option<Expr>> {
    let start = c.pos;
    c.skip_ws();
    if !c.eat("{") {
        c.pos = start;
        return Ok(None);
    }

    let pairs = key_values(c)?.unwrap_or_default();

    c.skip_ws();
    if !c.eat("}") {
        c.pos = start;
        return Ok(None);
    }
    Ok(Some(Expr::Object(pairs)))
}

fn array(c: &mut Cursor) -> Result<Option<Expr>> {
    let start = c.pos;
    c.skip_ws();
    if !c.eat("[") {
        c.pos = start;
        return Ok(None);
    }

    let items = expression_list(c)?.unwrap_or_default();

    c.skip_ws();
    if !c.eat("]") {
        c.pos = start;
        return Ok(None);
    }
    Ok(Some(Expr::Array(items)))
}
