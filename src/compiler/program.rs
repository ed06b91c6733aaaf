use crate::compiler::error::Result;
use crate::compiler::expression::{Expr, InfixOp, PrefixOp, Refinement};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex, PoisonError};

/// 符号 -> partial 调用点
pub type PartialTable = BTreeMap<String, Partial>;

/// 块名 -> 覆盖程序
pub type Subs = BTreeMap<String, Program>;

/// 可直接解释执行的指令序列
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Program {
    pub ops: Vec<Op>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Op {
    /// 原样输出
    Text(String),
    /// 换行；`last` 为 false 时随后输出当前缩进
    Newline { last: bool },
    Escaped(Expr),
    Unescaped(Expr),
    Section(Section),
    Inverted { test: Expr, body: Vec<Op> },
    Partial { symbol: String, indent: String },
    /// 应用具名块覆盖
    Sub { name: String },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Section {
    pub test: Expr,
    pub alias: Option<String>,
    /// 开启标签之后的位置
    pub start: usize,
    /// 关闭标签开始的位置
    pub end: usize,
    /// 生效中的 `"OPEN CLOSE"` 定界符
    pub delimiters: String,
    pub body: Vec<Op>,
}

/// 一个 partial / 父模板调用点
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Partial {
    /// 引用的模板名
    pub name: String,
    /// 父模板体内登记的 partial
    #[serde(default)]
    pub partials: PartialTable,
    /// 父模板体内声明的块覆盖
    #[serde(default)]
    pub subs: Subs,
    #[serde(skip)]
    pub instance: Instance,
}

impl Partial {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }
}

/// 运行时为 partial 绑定的实例，编译器只负责在复用时清空
#[derive(Default)]
pub struct Instance(Mutex<Option<Arc<dyn Any + Send + Sync>>>);

impl Instance {
    pub fn get(&self) -> Option<Arc<dyn Any + Send + Sync>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn bind(&self, instance: Arc<dyn Any + Send + Sync>) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = Some(instance);
    }

    pub fn clear(&self) {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).take();
    }

    pub fn is_bound(&self) -> bool {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).is_some()
    }
}

/// 克隆出的调用点从未绑定状态开始
impl Clone for Instance {
    fn clone(&self) -> Self {
        Self::default()
    }
}

/// 绑定状态不参与结构比较
impl PartialEq for Instance {
    fn eq(&self, _: &Self) -> bool {
        true
    }
}

impl fmt::Debug for Instance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("Instance").field(&self.is_bound()).finish()
    }
}

/// 编译产物：主程序、partial 表、顶层块默认内容与源码
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledTemplate {
    pub program: Program,
    pub partials: PartialTable,
    pub subs: Subs,
    pub text: String,
}

impl CompiledTemplate {
    /// 从文本序列化结果重建，不经过扫描与代码生成
    pub fn from_serialized(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn to_serialized(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// 清空所有 partial（含嵌套表）上的实例绑定
    pub fn reset_instances(&self) {
        fn reset(table: &PartialTable) {
            for partial in table.values() {
                partial.instance.clear();
                reset(&partial.partials);
            }
        }
        reset(&self.partials);
    }

    /// 以 `indent` 为初始缩进渲染主程序
    pub fn render<R: Runtime>(&self, runtime: &mut R, indent: &str) -> String {
        runtime.write(indent);
        self.program.run(runtime, &self.partials, indent);
        runtime.flush()
    }
}

/// 字面量的源码形式，由运行时决定如何构造值
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'a> {
    Number(&'a str),
    String(&'a str),
    Boolean(bool),
}

/// 成员访问的键
#[derive(Debug, Clone, PartialEq)]
pub enum Key<'a, V> {
    /// `.name`
    Name(&'a str),
    /// `[expr]` 求值后的结果
    Value(V),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Callee<'a, V> {
    Function(V),
    /// `receiver.key(...)`，调用时以 receiver 为上下文
    Method { receiver: V, key: Key<'a, V> },
}

/// section 判定所需的元数据
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SectionHead<'a> {
    pub inverted: bool,
    pub alias: Option<&'a str>,
    pub start: usize,
    pub end: usize,
    pub delimiters: &'a str,
}

/// 反转 section 不需要位置与定界符
const INVERTED: SectionHead<'static> = SectionHead {
    inverted: true,
    alias: None,
    start: 0,
    end: 0,
    delimiters: "",
};

/// 渲染运行时：编译产物在执行时调用的全部能力
///
/// 值的表示、查找、转义、section 迭代与 partial 解析都由实现方决定，
/// 解释器只负责按指令顺序调用。
pub trait Runtime: Sized {
    type Value;

    /// 追加到输出缓冲
    fn write(&mut self, text: &str);

    /// 按名字在上下文栈中查找；`dotted` 表示带 `.` 的路径
    fn lookup(&mut self, name: &str, dotted: bool) -> Self::Value;

    fn global(&mut self, name: &str) -> Self::Value;

    fn literal(&mut self, literal: Literal<'_>) -> Self::Value;

    fn array(&mut self, items: Vec<Self::Value>) -> Self::Value;

    fn object(&mut self, entries: Vec<(String, Self::Value)>) -> Self::Value;

    fn member(&mut self, object: Self::Value, key: Key<'_, Self::Value>) -> Self::Value;

    fn call(&mut self, callee: Callee<'_, Self::Value>, args: Vec<Self::Value>) -> Self::Value;

    fn prefix(&mut self, op: PrefixOp, operand: Self::Value) -> Self::Value;

    /// `&&` 与 `||` 由解释器短路处理，不会传到这里
    fn infix(&mut self, op: InfixOp, left: Self::Value, right: Self::Value) -> Self::Value;

    fn truthy(&mut self, value: &Self::Value) -> bool;

    /// 转义输出（`{{x}}`）
    fn escape(&mut self, value: Self::Value) -> String;

    /// 不转义输出（`{{{x}}}` / `{{&x}}`）
    fn stringify(&mut self, value: Self::Value) -> String;

    /// 判定 section 是否渲染；非反转且为真时把值压入上下文栈
    fn section(&mut self, value: Self::Value, head: &SectionHead<'_>) -> bool;

    /// 对栈顶值的每次迭代调用一次 `body`
    fn iterate(&mut self, alias: Option<&str>, body: &mut dyn FnMut(&mut Self));

    fn pop_context(&mut self);

    /// 解析并渲染符号对应的 partial
    fn partial(&mut self, symbol: &str, partial: &Partial, indent: &str) -> String;

    /// 应用具名块覆盖
    fn sub(&mut self, name: &str, indent: &str);

    /// 取出并清空输出缓冲
    fn flush(&mut self) -> String;
}

impl Program {
    pub fn new(ops: Vec<Op>) -> Self {
        Self { ops }
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// 在给定 partial 表上执行（主程序或块覆盖程序）
    pub fn run<R: Runtime>(&self, runtime: &mut R, partials: &PartialTable, indent: &str) {
        run_ops(&self.ops, runtime, partials, indent);
    }
}

fn run_ops<R: Runtime>(ops: &[Op], rt: &mut R, partials: &PartialTable, indent: &str) {
    for op in ops {
        match op {
            Op::Text(text) => rt.write(text),
            Op::Newline { last } => {
                rt.write("\n");
                if !last {
                    rt.write(indent);
                }
            }
            Op::Escaped(expr) => {
                let value = eval(expr, rt);
                let out = rt.escape(value);
                rt.write(&out);
            }
            Op::Unescaped(expr) => {
                let value = eval(expr, rt);
                let out = rt.stringify(value);
                rt.write(&out);
            }
            Op::Section(section) => {
                let value = eval(&section.test, rt);
                let head = SectionHead {
                    inverted: false,
                    alias: section.alias.as_deref(),
                    start: section.start,
                    end: section.end,
                    delimiters: &section.delimiters,
                };
                if rt.section(value, &head) {
                    rt.iterate(section.alias.as_deref(), &mut |rt: &mut R| {
                        run_ops(&section.body, rt, partials, indent)
                    });
                    rt.pop_context();
                }
            }
            Op::Inverted { test, body } => {
                let value = eval(test, rt);
                if !rt.section(value, &INVERTED) {
                    run_ops(body, rt, partials, indent);
                }
            }
            Op::Partial {
                symbol,
                indent: prefix,
            } => match partials.get(symbol) {
                Some(partial) => {
                    let out = rt.partial(symbol, partial, prefix);
                    rt.write(&out);
                }
                None => tracing::warn!(%symbol, "partial 表中不存在该符号，已跳过"),
            },
            Op::Sub { name } => rt.sub(name, indent),
        }
    }
}

/// 对表达式求值，值的语义全部委托给运行时
pub fn eval<R: Runtime>(expr: &Expr, rt: &mut R) -> R::Value {
    match expr {
        Expr::Number(raw) => rt.literal(Literal::Number(raw)),
        Expr::String(s) => rt.literal(Literal::String(s)),
        Expr::Boolean(b) => rt.literal(Literal::Boolean(*b)),
        Expr::Array(items) => {
            let values = items.iter().map(|item| eval(item, rt)).collect();
            rt.array(values)
        }
        Expr::Object(pairs) => {
            let entries = pairs
                .iter()
                .map(|pair| (pair.key.as_str().to_string(), eval(&pair.value, rt)))
                .collect();
            rt.object(entries)
        }
        Expr::Global(name) => rt.global(name),
        Expr::Reference(name) => rt.lookup(name, name.contains('.')),
        Expr::Member { object, refinement } => {
            let object = eval(object, rt);
            let key = key(refinement, rt);
            rt.member(object, key)
        }
        Expr::Prefix { op, operand } => {
            let operand = eval(operand, rt);
            rt.prefix(*op, operand)
        }
        Expr::Group(inner) => eval(inner, rt),
        Expr::Conditional {
            test,
            consequent,
            alternate,
        } => {
            let test = eval(test, rt);
            if rt.truthy(&test) {
                eval(consequent, rt)
            } else {
                eval(alternate, rt)
            }
        }
        Expr::Infix { op, left, right } => {
            let left = eval(left, rt);
            match op {
                InfixOp::And if !rt.truthy(&left) => left,
                InfixOp::Or if rt.truthy(&left) => left,
                InfixOp::And | InfixOp::Or => eval(right, rt),
                _ => {
                    let right = eval(right, rt);
                    rt.infix(*op, left, right)
                }
            }
        }
        Expr::Invocation { callee, args } => {
            let callee = match callee.as_ref() {
                Expr::Member { object, refinement } => {
                    let receiver = eval(object, rt);
                    let key = key(refinement, rt);
                    Callee::Method { receiver, key }
                }
                other => Callee::Function(eval(other, rt)),
            };
            let args = args.iter().map(|arg| eval(arg, rt)).collect();
            rt.call(callee, args)
        }
    }
}

fn key<'a, R: Runtime>(refinement: &'a Refinement, rt: &mut R) -> Key<'a, R::Value> {
    match refinement {
        Refinement::Name(name) => Key::Name(name),
        Refinement::Index(index) => Key::Value(eval(index, rt)),
    }
}
