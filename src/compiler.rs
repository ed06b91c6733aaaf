pub mod cache;
pub mod codegen;
pub mod error;
pub mod expression;
pub mod lexer;
pub mod parser;
pub mod printer;
pub mod program;

pub use cache::{Compiled, Compiler, compile};
pub use codegen::generate;
pub use error::{Error, Result};
pub use program::{CompiledTemplate, Program, Runtime};

use parser::Node;
use serde::Deserialize;

/// 自定义 section 标签对，如 `{{_if}}...{{/if}}`
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SectionTag {
    pub open: String,
    pub close: String,
}

/// 编译选项
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Options {
    /// `"OPEN CLOSE"` 形式的初始定界符
    pub delimiters: Option<String>,
    /// 输出可持久化的文本形式
    pub as_string: bool,
    /// 运行时使用另一种数据模型查找方式，编译器只把它计入缓存键
    pub model_get: bool,
    pub section_tags: Vec<SectionTag>,
}

/// 扫描并构建语法树
pub fn parse(text: &str, options: &Options) -> Result<Vec<Node>> {
    let tokens = lexer::tokenize(text, options.delimiters.as_deref())?;
    parser::parse(tokens, &options.section_tags)
}

/// 完整的编译流程，不经过缓存
pub fn build(text: &str, options: &Options) -> Result<Compiled> {
    let tree = parse(text, options)?;
    let template = generate(&tree, text)?;
    Compiled::new(template, options.as_string)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options() {
        let options = Options::default();
        assert!(options.delimiters.is_none());
        assert!(!options.as_string);
        assert!(options.section_tags.is_empty());
    }

    #[test]
    fn parse_applies_delimiters_and_section_tags() {
        let options = Options {
            delimiters: Some("<% %>".into()),
            section_tags: vec![SectionTag {
                open: "_if".into(),
                close: "if".into(),
            }],
            ..Options::default()
        };
        let tree = parse("<%_if%>yes<%/if%>{{x}}", &options).unwrap();
        assert_eq!(tree.len(), 2);
        assert_eq!(tree[0].nodes[0].name(), "yes");
        assert_eq!(tree[1].name(), "{{x}}");
    }

    #[test]
    fn bad_delimiter_option() {
        let options = Options {
            delimiters: Some("<%".into()),
            ..Options::default()
        };
        assert!(matches!(parse("x", &options), Err(Error::Options { .. })));
    }

    #[test]
    fn build_honours_string_mode() {
        let options = Options {
            as_string: true,
            ..Options::default()
        };
        let Compiled::Serialized(text) = build("a{{b}}", &options).unwrap() else {
            panic!("expected serialized output");
        };
        let template = CompiledTemplate::from_serialized(&text).unwrap();
        assert_eq!(template.text, "a{{b}}");
        assert_eq!(template.program.ops.len(), 2);
    }
}
