pub mod cursor;
pub mod literal;
pub mod parser;

use serde::{Deserialize, Serialize};
use std::fmt;

pub use parser::{parse, parse_tag, TagExpression};

/// 标签内嵌表达式的语法树
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    /// 数字字面量，保留源码文本
    Number(String),
    /// 字符串字面量，已解码转义
    String(String),
    Boolean(bool),
    Array(Vec<Expr>),
    Object(Vec<KeyValue>),
    /// 宿主全局名（Math、JSON ...），不经过数据模型查找
    Global(String),
    /// 数据模型引用，可能带 `../` 祖先跳转与 `.name` 细化
    Reference(String),
    Member {
        object: Box<Expr>,
        refinement: Refinement,
    },
    Prefix {
        op: PrefixOp,
        operand: Box<Expr>,
    },
    /// 括号子表达式
    Group(Box<Expr>),
    Conditional {
        test: Box<Expr>,
        consequent: Box<Expr>,
        alternate: Box<Expr>,
    },
    Infix {
        op: InfixOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Invocation {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyValue {
    pub key: PropertyKey,
    pub value: Expr,
}

/// 对象字面量的键
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKey {
    Identifier(String),
    /// 不是合法标识符的字符串键
    Quoted(String),
    Number(String),
}

impl PropertyKey {
    /// 运行时使用的属性名
    pub fn as_str(&self) -> &str {
        match self {
            Self::Identifier(s) | Self::Quoted(s) | Self::Number(s) => s,
        }
    }
}

impl fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Identifier(s) | Self::Number(s) => f.write_str(s),
            Self::Quoted(s) => write!(f, "\"{}\"", s.replace('\\', "\\\\").replace('"', "\\\"")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refinement {
    /// `.name`
    Name(String),
    /// `[expr]`
    Index(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixOp {
    Not,
    BitNot,
    Plus,
    Minus,
    TypeOf,
}

impl PrefixOp {
    /// 按匹配顺序排列：关键字在前
    pub const ALL: [PrefixOp; 5] = [Self::TypeOf, Self::Minus, Self::Plus, Self::BitNot, Self::Not];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Not => "!",
            Self::BitNot => "~",
            Self::Plus => "+",
            Self::Minus => "-",
            Self::TypeOf => "typeof",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InfixOp {
    Mul,
    Div,
    Rem,
    Add,
    Sub,
    Shl,
    Shr,
    UShr,
    Lt,
    Le,
    Gt,
    Ge,
    In,
    InstanceOf,
    Eq,
    Ne,
    StrictEq,
    StrictNe,
    BitAnd,
    BitXor,
    BitOr,
    And,
    Or,
}

impl InfixOp {
    /// 最长匹配优先
    pub const BY_LENGTH: [InfixOp; 23] = [
        Self::InstanceOf,
        Self::UShr,
        Self::StrictEq,
        Self::StrictNe,
        Self::Shl,
        Self::Shr,
        Self::Le,
        Self::Ge,
        Self::Eq,
        Self::Ne,
        Self::And,
        Self::Or,
        Self::In,
        Self::Lt,
        Self::Gt,
        Self::BitAnd,
        Self::BitOr,
        Self::BitXor,
        Self::Add,
        Self::Sub,
        Self::Mul,
        Self::Div,
        Self::Rem,
    ];

    /// 优先级从低到高，每一层内左结合
    pub const LEVELS: [&'static [InfixOp]; 10] = [
        &[Self::Or],
        &[Self::And],
        &[Self::BitOr],
        &[Self::BitXor],
        &[Self::BitAnd],
        &[Self::Eq, Self::Ne, Self::StrictEq, Self::StrictNe],
        &[Self::Lt, Self::Le, Self::Gt, Self::Ge, Self::In, Self::InstanceOf],
        &[Self::Shl, Self::Shr, Self::UShr],
        &[Self::Add, Self::Sub],
        &[Self::Mul, Self::Div, Self::Rem],
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Mul => "*",
            Self::Div => "/",
            Self::Rem => "%",
            Self::Add => "+",
            Self::Sub => "-",
            Self::Shl => "<<",
            Self::Shr => ">>",
            Self::UShr => ">>>",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::In => "in",
            Self::InstanceOf => "instanceof",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::StrictEq => "===",
            Self::StrictNe => "!==",
            Self::BitAnd => "&",
            Self::BitXor => "^",
            Self::BitOr => "|",
            Self::And => "&&",
            Self::Or => "||",
        }
    }

    pub fn is_keyword(self) -> bool {
        matches!(self, Self::In | Self::InstanceOf)
    }
}
