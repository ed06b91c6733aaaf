use crate::compiler::SectionTag;
use crate::compiler::error::{Error, Result};
use crate::compiler::lexer::{TagKind, Token};

/// 语法树节点：token 加上作用域信息
#[derive(Debug, Clone, PartialEq)]
pub struct Node {
    pub token: Token,
    /// 作用域标签的子节点
    pub nodes: Vec<Node>,
    /// 对应关闭标签的开始位置
    pub end: usize,
    /// 换行之后紧跟另一个换行或输入结束
    pub last: bool,
}

impl Node {
    fn new(token: Token) -> Self {
        Self {
            token,
            nodes: Vec::new(),
            end: 0,
            last: false,
        }
    }

    pub fn kind(&self) -> TagKind {
        self.token.kind
    }

    pub fn name(&self) -> &str {
        &self.token.name
    }
}

/// `<` 父模板作用域内只允许出现的内容
fn allowed_in_super(kind: TagKind) -> bool {
    matches!(
        kind,
        TagKind::Text | TagKind::Newline | TagKind::Block | TagKind::Close
    )
}

/// 自定义开启标签会被改写为普通 section
fn is_opener(token: &mut Token, tags: &[SectionTag]) -> Result<bool> {
    if matches!(token.kind, TagKind::Text | TagKind::Newline | TagKind::Close) {
        return Ok(false);
    }
    if !tags.iter().any(|tag| tag.open == token.name) {
        return Ok(false);
    }
    token.kind = TagKind::Section;
    if token.expr.is_none() {
        token.parse_expression()?;
    }
    Ok(true)
}

/// 用显式栈把扁平 token 序列组装为嵌套树
pub fn parse(tokens: Vec<Token>, section_tags: &[SectionTag]) -> Result<Vec<Node>> {
    let mut root = Vec::new();
    let mut stack: Vec<Node> = Vec::new();
    let mut tokens = tokens.into_iter().peekable();

    while let Some(mut token) = tokens.next() {
        if let Some(tail) = stack.last()
            && tail.kind() == TagKind::Super
            && !allowed_in_super(token.kind)
        {
            return Err(Error::structure(format!(
                "illegal content in < super tag: {}{}",
                token.kind.sigil(),
                token.name
            )));
        }

        if token.kind.opens_scope() || is_opener(&mut token, section_tags)? {
            stack.push(Node::new(token));
            continue;
        }

        // 关闭标签只弹出栈顶，不比较名字
        if token.kind == TagKind::Close {
            let Some(mut opener) = stack.pop() else {
                return Err(Error::structure(format!(
                    "closing tag without opener: /{}",
                    token.name
                )));
            };
            opener.end = token.offset;
            attach(&mut stack, &mut root, opener);
            continue;
        }

        let mut node = Node::new(token);
        if node.kind() == TagKind::Newline {
            node.last = tokens
                .peek()
                .is_none_or(|next| next.kind == TagKind::Newline);
        }
        attach(&mut stack, &mut root, node);
    }

    if let Some(open) = stack.pop() {
        return Err(Error::structure(format!(
            "missing closing tag: {}",
            open.name()
        )));
    }

    tracing::trace!(nodes = root.len(), "语法树构建完成");
    Ok(root)
}

fn attach(stack: &mut [Node], root: &mut Vec<Node>, node: Node) {
    match stack.last_mut() {
        Some(parent) => parent.nodes.push(node),
        None => root.push(node),
    }
}
