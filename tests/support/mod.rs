//! 基于 `serde_json::Value` 的渲染运行时，仅供集成测试使用

#![allow(dead_code)]

use horseshoe::compiler::expression::{InfixOp, PrefixOp};
use horseshoe::compiler::program::{
    Callee, Key, Literal, Partial, PartialTable, SectionHead, Subs,
};
use horseshoe::compiler::{self, Compiled, CompiledTemplate, Options, Runtime};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Default)]
pub struct JsonRuntime {
    buf: String,
    /// 上下文栈，栈顶为当前上下文
    stack: Vec<Value>,
    /// partial 名 -> 源码
    sources: HashMap<String, String>,
    /// 父模板调用时带入的块覆盖及其 partial 表，外层优先
    overrides: Vec<(Subs, PartialTable)>,
    /// 正在渲染的模板，提供块的默认内容
    templates: Vec<Arc<CompiledTemplate>>,
    /// partial 实际编译的次数
    pub partial_compiles: usize,
}

impl JsonRuntime {
    pub fn new(data: Value) -> Self {
        Self {
            stack: vec![data],
            ..Self::default()
        }
    }

    pub fn with_partial(mut self, name: &str, source: &str) -> Self {
        self.sources.insert(name.to_string(), source.to_string());
        self
    }

    pub fn render(&mut self, template: &Arc<CompiledTemplate>) -> String {
        self.templates.push(template.clone());
        let out = template.render(self, "");
        self.templates.pop();
        out
    }

    fn load(&mut self, partial: &Partial) -> Option<Arc<CompiledTemplate>> {
        if let Some(bound) = partial.instance.get()
            && let Ok(template) = bound.downcast::<CompiledTemplate>()
        {
            return Some(template);
        }
        let source = self.sources.get(&partial.name)?.clone();
        let Ok(Compiled::Template(template)) = compiler::compile(&source, &Options::default())
        else {
            return None;
        };
        self.partial_compiles += 1;
        partial.instance.bind(template.clone());
        Some(template)
    }
}

/// 编译并渲染，编译失败时 panic
pub fn render(source: &str, data: Value) -> String {
    render_with(JsonRuntime::new(data), source)
}

pub fn render_with(mut runtime: JsonRuntime, source: &str) -> String {
    match compiler::compile(source, &Options::default()) {
        Ok(Compiled::Template(template)) => runtime.render(&template),
        Ok(Compiled::Serialized(_)) => panic!("unexpected serialized output"),
        Err(e) => panic!("compile failed: {e}"),
    }
}

fn path(mut value: Value, rest: &str) -> Value {
    for segment in rest.split('.').filter(|s| !s.is_empty()) {
        value = field(&value, segment);
    }
    value
}

fn field(value: &Value, name: &str) -> Value {
    match value {
        Value::Object(map) => map.get(name).cloned().unwrap_or(Value::Null),
        Value::Array(items) if name == "length" => Value::from(items.len()),
        Value::Array(items) => name
            .parse::<usize>()
            .ok()
            .and_then(|i| items.get(i).cloned())
            .unwrap_or(Value::Null),
        Value::String(s) if name == "length" => Value::from(s.chars().count()),
        _ => Value::Null,
    }
}

fn scoped(alias: Option<&str>, item: Value) -> Value {
    match alias {
        Some(alias) => {
            let mut map = Map::new();
            map.insert(alias.to_string(), item);
            Value::Object(map)
        }
        None => item,
    }
}

fn num(value: &Value) -> f64 {
    match value {
        Value::Null => 0.0,
        Value::Bool(b) => f64::from(u8::from(*b)),
        Value::Number(n) => n.as_f64().unwrap_or(f64::NAN),
        Value::String(s) if s.trim().is_empty() => 0.0,
        Value::String(s) => s.trim().parse().unwrap_or(f64::NAN),
        _ => f64::NAN,
    }
}

fn number(f: f64) -> Value {
    if f.is_finite() && f.fract() == 0.0 && f.abs() < 1e15 {
        Value::from(f as i64)
    } else {
        Value::from(f)
    }
}

fn text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(text).collect::<Vec<_>>().join(","),
        Value::Object(_) => "[object Object]".to_string(),
        other => other.to_string(),
    }
}

fn loose_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), _) | (_, Value::Number(_)) => num(a) == num(b),
        _ => a == b,
    }
}

fn compare(a: &Value, b: &Value) -> Option<std::cmp::Ordering> {
    match (a, b) {
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        _ => num(a).partial_cmp(&num(b)),
    }
}

impl Runtime for JsonRuntime {
    type Value = Value;

    fn write(&mut self, text: &str) {
        self.buf.push_str(text);
    }

    fn lookup(&mut self, name: &str, _dotted: bool) -> Value {
        let mut rest = name;
        let mut hops = 0;
        while let Some(r) = rest.strip_prefix("../") {
            hops += 1;
            rest = r;
        }
        let visible = &self.stack[..self.stack.len().saturating_sub(hops)];

        if let Some(r) = rest.strip_prefix('.') {
            let top = visible.last().cloned().unwrap_or(Value::Null);
            return path(top, r);
        }

        let (head, tail) = rest.split_once('.').unwrap_or((rest, ""));
        visible
            .iter()
            .rev()
            .find_map(|ctx| ctx.as_object().and_then(|map| map.get(head)))
            .map(|found| path(found.clone(), tail))
            .unwrap_or(Value::Null)
    }

    fn global(&mut self, _name: &str) -> Value {
        Value::Null
    }

    fn literal(&mut self, literal: Literal<'_>) -> Value {
        match literal {
            Literal::Number(raw) => raw
                .parse::<i64>()
                .map(Value::from)
                .or_else(|_| raw.parse::<f64>().map(number))
                .unwrap_or(Value::Null),
            Literal::String(s) => Value::String(s.to_string()),
            Literal::Boolean(b) => Value::Bool(b),
        }
    }

    fn array(&mut self, items: Vec<Value>) -> Value {
        Value::Array(items)
    }

    fn object(&mut self, entries: Vec<(String, Value)>) -> Value {
        Value::Object(entries.into_iter().collect())
    }

    fn member(&mut self, object: Value, key: Key<'_, Value>) -> Value {
        match key {
            Key::Name(name) => field(&object, name),
            Key::Value(value) => field(&object, &text(&value)),
        }
    }

    fn call(&mut self, callee: Callee<'_, Value>, args: Vec<Value>) -> Value {
        let Callee::Method { receiver, key } = callee else {
            return Value::Null;
        };
        let method = match &key {
            Key::Name(name) => name.to_string(),
            Key::Value(value) => text(value),
        };
        match (receiver, method.as_str()) {
            (Value::String(s), "toUpperCase") => Value::String(s.to_uppercase()),
            (Value::String(s), "trim") => Value::String(s.trim().to_string()),
            (Value::Array(items), "join") => {
                let sep = args.first().map_or(",".to_string(), text);
                Value::String(items.iter().map(text).collect::<Vec<_>>().join(&sep))
            }
            _ => Value::Null,
        }
    }

    fn prefix(&mut self, op: PrefixOp, operand: Value) -> Value {
        match op {
            PrefixOp::Not => Value::Bool(!self.truthy(&operand)),
            PrefixOp::Minus => number(-num(&operand)),
            PrefixOp::Plus => number(num(&operand)),
            PrefixOp::BitNot => Value::from(!(num(&operand) as i64)),
            PrefixOp::TypeOf => Value::from(match operand {
                Value::Null => "undefined",
                Value::Bool(_) => "boolean",
                Value::Number(_) => "number",
                Value::String(_) => "string",
                Value::Array(_) | Value::Object(_) => "object",
            }),
        }
    }

    fn infix(&mut self, op: InfixOp, left: Value, right: Value) -> Value {
        use std::cmp::Ordering::{Equal, Greater, Less};
        let (l, r) = (num(&left), num(&right));
        match op {
            InfixOp::Add if left.is_string() || right.is_string() => {
                Value::String(text(&left) + &text(&right))
            }
            InfixOp::Add => number(l + r),
            InfixOp::Sub => number(l - r),
            InfixOp::Mul => number(l * r),
            InfixOp::Div => number(l / r),
            InfixOp::Rem => number(l % r),
            InfixOp::Shl => Value::from((l as i64) << ((r as i64) & 31)),
            InfixOp::Shr | InfixOp::UShr => Value::from((l as i64) >> ((r as i64) & 31)),
            InfixOp::BitAnd => Value::from((l as i64) & (r as i64)),
            InfixOp::BitOr => Value::from((l as i64) | (r as i64)),
            InfixOp::BitXor => Value::from((l as i64) ^ (r as i64)),
            InfixOp::Eq => Value::Bool(loose_eq(&left, &right)),
            InfixOp::Ne => Value::Bool(!loose_eq(&left, &right)),
            InfixOp::StrictEq => Value::Bool(left == right),
            InfixOp::StrictNe => Value::Bool(left != right),
            InfixOp::Lt => Value::Bool(compare(&left, &right) == Some(Less)),
            InfixOp::Gt => Value::Bool(compare(&left, &right) == Some(Greater)),
            InfixOp::Le => Value::Bool(matches!(compare(&left, &right), Some(Less | Equal))),
            InfixOp::Ge => Value::Bool(matches!(compare(&left, &right), Some(Greater | Equal))),
            InfixOp::In => Value::Bool(
                right
                    .as_object()
                    .is_some_and(|map| map.contains_key(&text(&left))),
            ),
            InfixOp::InstanceOf => Value::Bool(false),
            // 短路运算符由解释器处理
            InfixOp::And | InfixOp::Or => Value::Null,
        }
    }

    fn truthy(&mut self, value: &Value) -> bool {
        match value {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => n.as_f64().is_some_and(|f| f != 0.0 && !f.is_nan()),
            Value::String(s) => !s.is_empty(),
            Value::Array(_) | Value::Object(_) => true,
        }
    }

    fn escape(&mut self, value: Value) -> String {
        text(&value)
            .replace('&', "&amp;")
            .replace('<', "&lt;")
            .replace('>', "&gt;")
            .replace('"', "&quot;")
            .replace('\'', "&#39;")
    }

    fn stringify(&mut self, value: Value) -> String {
        text(&value)
    }

    fn section(&mut self, value: Value, head: &SectionHead<'_>) -> bool {
        let render = match &value {
            Value::Array(items) => !items.is_empty(),
            other => self.truthy(other),
        };
        if render && !head.inverted {
            self.stack.push(value);
        }
        render
    }

    fn iterate(&mut self, alias: Option<&str>, body: &mut dyn FnMut(&mut Self)) {
        let Some(top) = self.stack.last().cloned() else {
            return;
        };
        match top {
            Value::Array(items) => {
                for item in items {
                    self.stack.push(scoped(alias, item));
                    body(self);
                    self.stack.pop();
                }
            }
            value if alias.is_some() => {
                self.stack.push(scoped(alias, value));
                body(self);
                self.stack.pop();
            }
            _ => body(self),
        }
    }

    fn pop_context(&mut self) {
        self.stack.pop();
    }

    fn partial(&mut self, _symbol: &str, partial: &Partial, indent: &str) -> String {
        let Some(template) = self.load(partial) else {
            return String::new();
        };

        self.overrides
            .push((partial.subs.clone(), partial.partials.clone()));
        self.templates.push(template.clone());
        let outer = std::mem::take(&mut self.buf);

        let out = template.render(self, indent);

        self.buf = outer;
        self.templates.pop();
        self.overrides.pop();
        out
    }

    fn sub(&mut self, name: &str, indent: &str) {
        let found = self
            .overrides
            .iter()
            .find_map(|(subs, table)| subs.get(name).map(|p| (p.clone(), table.clone())));
        if let Some((program, table)) = found {
            program.run(self, &table, indent);
            return;
        }

        if let Some(template) = self.templates.last().cloned()
            && let Some(program) = template.subs.get(name)
        {
            program.run(self, &template.partials, indent);
        }
    }

    fn flush(&mut self) -> String {
        std::mem::take(&mut self.buf)
    }
}
