use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// 表达式或词法错误，行列号相对于出错的源文本
    #[error("{}", format_error("语法错误", *line, *col, context, message))]
    Syntax {
        line: usize,
        col: usize,
        message: String,
        context: String,
    },

    /// 标签嵌套结构错误
    #[error("{message}")]
    Structure { message: String },

    #[error("编译错误：{message}")]
    Compile { message: String },

    #[error("选项无效：{message}")]
    Options { message: String },

    #[error("序列化失败：{0}")]
    Serialize(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

fn format_error(kind: &str, line: usize, col: usize, context: &str, message: &str) -> String {
    let mut out = format!("{kind}\n  → {line}:{col}\n\n");
    if !context.is_empty() {
        out.push_str(context);
    }
    out.push_str(&format!("  错误：{message}"));
    out
}

impl Error {
    /// 在 `pos` 处创建语法错误，附带出错行与脱字符标记
    pub fn syntax_at(source: &str, pos: usize, message: impl Into<String>) -> Self {
        let lines = LineIndex::new(source);
        let (line, col) = lines.locate(source, pos);
        Self::Syntax {
            line,
            col,
            message: message.into(),
            context: build_error_context(lines.line_text(source, line), col),
        }
    }

    pub fn structure(message: impl Into<String>) -> Self {
        Self::Structure {
            message: message.into(),
        }
    }

    pub fn compile(message: impl Into<String>) -> Self {
        Self::Compile {
            message: message.into(),
        }
    }

    pub fn options(message: impl Into<String>) -> Self {
        Self::Options {
            message: message.into(),
        }
    }
}

/// 行首偏移表，末尾追加一个哨兵 `len + 1`
#[derive(Debug)]
pub struct LineIndex {
    starts: Vec<usize>,
}

impl LineIndex {
    pub fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(i, _)| i + 1));
        starts.push(source.len() + 1);
        Self { starts }
    }

    /// 返回 1 起始的 (行, 列)，列按字符计数
    pub fn locate(&self, source: &str, pos: usize) -> (usize, usize) {
        let pos = pos.min(source.len());
        let line = self.starts.partition_point(|&start| start <= pos).saturating_sub(1);
        let start = self.starts[line];
        let col = source.get(start..pos).map_or(0, |s| s.chars().count()) + 1;
        (line + 1, col)
    }

    pub fn line_text<'a>(&self, source: &'a str, line: usize) -> &'a str {
        let start = self.starts[line - 1].min(source.len());
        let end = self
            .starts
            .get(line)
            .map_or(source.len(), |next| next.saturating_sub(1))
            .min(source.len());
        source.get(start..end).unwrap_or_default()
    }
}

fn build_error_context(line: &str, col: usize) -> String {
    // 脱字符前的前缀保留制表符，其余字符替换为空格
    let pad: String = line
        .chars()
        .take(col - 1)
        .map(|c| if c.is_whitespace() { c } else { ' ' })
        .collect();
    format!("  {line}\n  {pad}^----\n")
}
