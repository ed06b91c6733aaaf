use crate::compiler::error::{Error, Result};
use crate::compiler::expression::{self, Expr};
use serde::{Deserialize, Serialize};

/// 标签类型，声明顺序即排名
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TagKind {
    /// `#`
    Section,
    /// `^`
    Inverted,
    /// `<` 继承父模板
    Super,
    /// `@` 可覆盖的具名块
    Block,
    /// `/`
    Close,
    /// `%`
    Pragma,
    /// `>`
    Partial,
    /// `=`
    Delimiter,
    /// 无前缀的转义输出
    Variable,
    /// `{`
    Triple,
    /// `&`
    Ampersand,
    /// 标签之间的原始文本
    Text,
    Newline,
}

impl TagKind {
    pub fn from_sigil(c: char) -> Option<Self> {
        Some(match c {
            '#' => Self::Section,
            '^' => Self::Inverted,
            '<' => Self::Super,
            '@' => Self::Block,
            '/' => Self::Close,
            '%' => Self::Pragma,
            '>' => Self::Partial,
            '=' => Self::Delimiter,
            '{' => Self::Triple,
            '&' => Self::Ampersand,
            _ => return None,
        })
    }

    pub fn sigil(self) -> &'static str {
        match self {
            Self::Section => "#",
            Self::Inverted => "^",
            Self::Super => "<",
            Self::Block => "@",
            Self::Close => "/",
            Self::Pragma => "%",
            Self::Partial => ">",
            Self::Delimiter => "=",
            Self::Variable => "_v",
            Self::Triple => "{",
            Self::Ampersand => "&",
            Self::Text => "_t",
            Self::Newline => "\n",
        }
    }

    pub fn rank(self) -> u8 {
        self as u8 + 1
    }

    /// 排名低于变量输出的标签不产生内容，独占一行时该行可被消除
    pub fn is_insignificant(self) -> bool {
        self < Self::Variable
    }

    /// 排名不超过 `@` 的标签开启一个嵌套作用域
    pub fn opens_scope(self) -> bool {
        self <= Self::Block
    }

    /// 标签内容需要按表达式解析
    pub fn has_expression(self) -> bool {
        matches!(
            self,
            Self::Section | Self::Inverted | Self::Variable | Self::Triple | Self::Ampersand
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TagKind,
    /// 标签内容（已截断到表达式范围）或原始文本
    pub name: String,
    /// 标签：结束定界符之后的位置；关闭标签：开始定界符的位置
    pub offset: usize,
    pub otag: String,
    pub ctag: String,
    /// 独占一行的 partial 前面的缩进
    pub indent: Option<String>,
    pub expr: Option<Expr>,
    /// `{{#list : item}}` 中的 `item`
    pub alias: Option<String>,
}

impl Token {
    pub fn text(text: impl Into<String>) -> Self {
        Self::new(TagKind::Text, text.into(), 0)
    }

    pub fn newline() -> Self {
        Self::new(TagKind::Newline, String::new(), 0)
    }

    fn new(kind: TagKind, name: String, offset: usize) -> Self {
        Self {
            kind,
            name,
            offset,
            otag: String::new(),
            ctag: String::new(),
            indent: None,
            expr: None,
            alias: None,
        }
    }

    /// 解析表达式，并把 `name` 截断到表达式实际覆盖的文本
    pub fn parse_expression(&mut self) -> Result<()> {
        let parsed = expression::parse_tag(&self.name)?;
        self.name.truncate(parsed.consumed);
        self.expr = parsed.expr;
        self.alias = parsed.alias;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Text,
    TagType,
    Tag,
}

/// 解析 `"OPEN CLOSE"` 形式的定界符
pub fn parse_delimiters(spec: &str) -> Result<(String, String)> {
    let mut parts = spec.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some(open), Some(close), None) => Ok((open.to_string(), close.to_string())),
        _ => Err(Error::options(format!(
            "delimiters must be two whitespace separated markers, got {spec:?}"
        ))),
    }
}

/// 将模板源码扫描为扁平的 Token 序列
pub fn tokenize(text: &str, delimiters: Option<&str>) -> Result<Vec<Token>> {
    let (otag, ctag) = match delimiters {
        Some(spec) => parse_delimiters(spec)?,
        None => ("{{".to_string(), "}}".to_string()),
    };

    let mut scanner = Scanner {
        text,
        otag,
        ctag,
        state: State::Text,
        kind: TagKind::Variable,
        tag_start: 0,
        buf: String::new(),
        tokens: Vec::new(),
        seen_tag: false,
        line_start: 0,
    };
    scanner.run()?;

    tracing::trace!(tokens = scanner.tokens.len(), "模板扫描完成");
    Ok(scanner.tokens)
}

struct Scanner<'a> {
    text: &'a str,
    otag: String,
    ctag: String,
    state: State,
    kind: TagKind,
    /// 当前标签开始定界符的位置
    tag_start: usize,
    buf: String,
    tokens: Vec<Token>,
    seen_tag: bool,
    /// 当前行第一个 token 的下标
    line_start: usize,
}

impl Scanner<'_> {
    fn run(&mut self) -> Result<()> {
        let mut i = 0;
        while i < self.text.len() {
            let rest = &self.text[i..];
            match self.state {
                State::Text => {
                    if rest.starts_with(self.otag.as_str()) {
                        self.add_buf();
                        self.tag_start = i;
                        i += self.otag.len();
                        self.state = State::TagType;
                        continue;
                    }
                    let Some(ch) = rest.chars().next() else { break };
                    if ch == '\n' {
                        self.filter_line(self.seen_tag, false);
                    } else {
                        self.buf.push(ch);
                    }
                    i += ch.len_utf8();
                }
                State::TagType => {
                    let Some(ch) = rest.chars().next() else { break };
                    match TagKind::from_sigil(ch) {
                        Some(TagKind::Delimiter) => {
                            i = self.change_delimiters(i)?;
                            self.state = State::Text;
                        }
                        Some(kind) => {
                            self.kind = kind;
                            i += ch.len_utf8();
                            self.state = State::Tag;
                        }
                        None => {
                            self.kind = TagKind::Variable;
                            self.state = State::Tag;
                        }
                    }
                    self.seen_tag = true;
                }
                State::Tag => {
                    if rest.starts_with(self.ctag.as_str()) {
                        i = self.close_tag(i)?;
                        continue;
                    }
                    let Some(ch) = rest.chars().next() else { break };
                    self.buf.push(ch);
                    i += ch.len_utf8();
                }
            }
        }

        if self.state != State::Text {
            return Err(Error::syntax_at(
                self.text,
                self.tag_start,
                format!("unclosed tag, missing '{}'", self.ctag),
            ));
        }

        self.filter_line(self.seen_tag, true);
        Ok(())
    }

    fn add_buf(&mut self) {
        if !self.buf.is_empty() {
            let text = std::mem::take(&mut self.buf);
            self.tokens.push(Token::text(text));
        }
    }

    /// 当前行只有不产生内容的标签和空白文本
    fn line_is_whitespace(&self) -> bool {
        self.tokens[self.line_start..].iter().all(|token| {
            token.kind.is_insignificant()
                || (token.kind == TagKind::Text && token.name.chars().all(char::is_whitespace))
        })
    }

    /// 行尾处理：独占行删除空白文本，否则补一个换行 token
    fn filter_line(&mut self, have_seen_tag: bool, no_newline: bool) {
        self.add_buf();

        if have_seen_tag && self.line_is_whitespace() {
            let mut j = self.line_start;
            while j < self.tokens.len() {
                if self.tokens[j].kind != TagKind::Text {
                    j += 1;
                    continue;
                }
                let text = self.tokens.remove(j);
                if let Some(next) = self.tokens.get_mut(j)
                    && next.kind == TagKind::Partial
                {
                    next.indent = Some(text.name);
                }
            }
        } else if !no_newline {
            self.tokens.push(Token::newline());
        }

        self.seen_tag = false;
        self.line_start = self.tokens.len();
    }

    /// `{{=<% %>=}}`：`i` 指向 `=`，返回新定界符生效后的扫描位置
    fn change_delimiters(&mut self, i: usize) -> Result<usize> {
        let close = format!("={}", self.ctag);
        let body_start = i + 1;
        let Some(close_index) = self.text[body_start..].find(&close).map(|p| p + body_start) else {
            return Err(Error::syntax_at(
                self.text,
                self.tag_start,
                format!("unclosed delimiter change, missing '{close}'"),
            ));
        };

        let body = self.text[body_start..close_index].trim();
        let mut parts = body.split_whitespace();
        let (Some(otag), Some(ctag)) = (parts.next(), parts.last()) else {
            return Err(Error::syntax_at(
                self.text,
                body_start,
                "delimiter change needs an opening and a closing marker",
            ));
        };
        self.otag = otag.to_string();
        self.ctag = ctag.to_string();

        Ok(close_index + close.len())
    }

    /// `i` 指向结束定界符，产出 token 并返回继续扫描的位置
    fn close_tag(&mut self, i: usize) -> Result<usize> {
        let offset = if self.kind == TagKind::Close {
            self.tag_start
        } else {
            i + self.ctag.len()
        };
        let name = std::mem::take(&mut self.buf).trim().to_string();

        let mut token = Token::new(self.kind, name, offset);
        token.otag = self.otag.clone();
        token.ctag = self.ctag.clone();

        let mut next = i + self.ctag.len();
        self.state = State::Text;

        if self.kind == TagKind::Triple {
            if self.ctag == "}}" {
                if self.text[next..].starts_with('}') {
                    next += 1;
                }
            } else if token.name.ends_with('}') {
                token.name.pop();
            }
        }

        if self.kind.has_expression() {
            token.parse_expression()?;
        }

        self.tokens.push(token);
        Ok(next)
    }
}
