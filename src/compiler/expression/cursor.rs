use crate::compiler::error::Error;
use regex::Regex;

/// 表达式源码上的回溯游标
///
/// 每个尝试性的产生式先记下 `pos`，匹配失败时恢复，只有在已经确定
/// 语法结构之后才会产生 [`Error::Syntax`]。
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    src: &'a str,
    pub pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(src: &'a str) -> Self {
        Self { src, pos: 0 }
    }

    pub fn source(&self) -> &'a str {
        self.src
    }

    pub fn rest(&self) -> &'a str {
        &self.src[self.pos..]
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn is_eof(&self) -> bool {
        self.pos >= self.src.len()
    }

    pub fn advance(&mut self, len: usize) {
        self.pos = (self.pos + len).min(self.src.len());
    }

    /// 匹配字面字符串
    pub fn eat(&mut self, s: &str) -> bool {
        if self.rest().starts_with(s) {
            self.pos += s.len();
            true
        } else {
            false
        }
    }

    /// 匹配关键字，要求其后不是标识符字符
    pub fn eat_keyword(&mut self, word: &str) -> bool {
        let rest = self.rest();
        if rest.starts_with(word) && !rest[word.len()..].starts_with(is_ident_char) {
            self.pos += word.len();
            true
        } else {
            false
        }
    }

    pub fn skip_ws(&mut self) {
        let rest = self.rest();
        self.pos += rest.len() - rest.trim_start().len();
    }

    /// 用锚定在开头的正则匹配，优先返回第一个捕获组
    pub fn eat_regex(&mut self, re: &Regex) -> Option<&'a str> {
        let rest = self.rest();
        let caps = re.captures(rest)?;
        let whole = caps.get(0)?;
        self.pos += whole.end();
        let matched = caps.get(1).unwrap_or(whole);
        Some(&rest[matched.start()..matched.end()])
    }

    /// 已确定语法结构后缺少期望内容时的错误
    pub fn expected(&self, thing: &str) -> Error {
        let remaining: String = self.rest().chars().take(40).collect();
        let ellipsis = if remaining.chars().count() == 40 { "..." } else { "" };
        Error::syntax_at(
            self.src,
            self.pos,
            format!("unexpected string \"{remaining}{ellipsis}\" (expected {thing})"),
        )
    }
}

pub fn is_ident_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || c == '_' || c == '$'
}
