use crate::compiler::error::{Error, Result};
use crate::compiler::expression::Expr;
use crate::compiler::lexer::TagKind;
use crate::compiler::parser::Node;
use crate::compiler::program::{
    CompiledTemplate, Op, Partial, PartialTable, Program, Section, Subs,
};
use std::mem;

/// 当前生成层级的上下文：主模板、父模板体或具名块各一个
#[derive(Default)]
struct Scope {
    ops: Vec<Op>,
    partials: PartialTable,
    subs: Subs,
    /// 嵌套在具名块中时，partial 符号带上块名
    prefix: String,
    /// 父模板体内的块只登记覆盖，不在原地展开
    in_super: bool,
}

struct Generator {
    /// partial 符号序号，每次顶层生成从 0 开始
    serial: usize,
}

/// 将语法树生成为可解释执行的编译产物
pub fn generate(tree: &[Node], text: &str) -> Result<CompiledTemplate> {
    let mut generator = Generator { serial: 0 };
    let mut scope = Scope::default();
    generator.walk(tree, &mut scope)?;

    tracing::trace!(
        ops = scope.ops.len(),
        partials = scope.partials.len(),
        subs = scope.subs.len(),
        "代码生成完成"
    );

    Ok(CompiledTemplate {
        program: Program::new(scope.ops),
        partials: scope.partials,
        subs: scope.subs,
        text: text.to_string(),
    })
}

impl Generator {
    fn walk(&mut self, nodes: &[Node], scope: &mut Scope) -> Result<()> {
        for node in nodes {
            self.node(node, scope)?;
        }
        Ok(())
    }

    /// 在同一上下文中生成子节点，返回单独收集的指令
    fn body(&mut self, nodes: &[Node], scope: &mut Scope) -> Result<Vec<Op>> {
        let outer = mem::take(&mut scope.ops);
        let result = self.walk(nodes, scope);
        let body = mem::replace(&mut scope.ops, outer);
        result.map(|()| body)
    }

    fn node(&mut self, node: &Node, scope: &mut Scope) -> Result<()> {
        let token = &node.token;
        match token.kind {
            TagKind::Text => scope.ops.push(Op::Text(token.name.clone())),
            TagKind::Newline => scope.ops.push(Op::Newline { last: node.last }),
            TagKind::Variable => scope.ops.push(Op::Escaped(expression(node)?)),
            TagKind::Triple | TagKind::Ampersand => {
                scope.ops.push(Op::Unescaped(expression(node)?))
            }
            TagKind::Section => {
                let test = expression(node)?;
                let body = self.body(&node.nodes, scope)?;
                scope.ops.push(Op::Section(Section {
                    test,
                    alias: token.alias.clone(),
                    start: token.offset,
                    end: node.end,
                    delimiters: format!("{} {}", token.otag, token.ctag),
                    body,
                }));
            }
            TagKind::Inverted => {
                let test = expression(node)?;
                let body = self.body(&node.nodes, scope)?;
                scope.ops.push(Op::Inverted { test, body });
            }
            TagKind::Partial => self.partial(node, scope, Partial::new(&token.name)),
            TagKind::Super => {
                let mut child = Scope {
                    in_super: true,
                    ..Scope::default()
                };
                self.walk(&node.nodes, &mut child)?;
                let partial = Partial {
                    partials: child.partials,
                    subs: child.subs,
                    ..Partial::new(&token.name)
                };
                self.partial(node, scope, partial);
            }
            TagKind::Block => self.block(node, scope)?,
            TagKind::Close | TagKind::Pragma | TagKind::Delimiter => {}
        }
        Ok(())
    }

    /// 分配符号、输出调用指令并登记到 partial 表
    fn partial(&mut self, node: &Node, scope: &mut Scope, partial: Partial) {
        let symbol = format!("<{}{}{}", scope.prefix, node.name(), self.serial);
        self.serial += 1;

        scope.ops.push(Op::Partial {
            symbol: symbol.clone(),
            indent: node.token.indent.clone().unwrap_or_default(),
        });
        scope.partials.insert(symbol, partial);
    }

    fn block(&mut self, node: &Node, scope: &mut Scope) -> Result<()> {
        let name = node.name().to_string();
        // 块体中的 partial 直接登记到外层表
        let mut child = Scope {
            partials: mem::take(&mut scope.partials),
            prefix: name.clone(),
            ..Scope::default()
        };
        let result = self.walk(&node.nodes, &mut child);
        scope.partials = mem::take(&mut child.partials);
        result?;

        for (nested, program) in child.subs {
            scope.subs.entry(nested).or_insert(program);
        }
        scope.subs.insert(name.clone(), Program::new(child.ops));

        if !scope.in_super {
            scope.ops.push(Op::Sub { name });
        }
        Ok(())
    }
}

fn expression(node: &Node) -> Result<Expr> {
    node.token.expr.clone().ok_or_else(|| {
        Error::compile(format!(
            "missing expression in {} tag",
            node.kind().sigil()
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::lexer::tokenize;
    use crate::compiler::parser::parse;

    fn compile(src: &str) -> Result<CompiledTemplate> {
        let tree = parse(tokenize(src, None)?, &[])?;
        generate(&tree, src)
    }

    #[test]
    fn text_and_newlines() {
        let tpl = compile("a\nb\n\nc").unwrap();
        assert_eq!(
            tpl.program.ops,
            vec![
                Op::Text("a".into()),
                Op::Newline { last: false },
                Op::Text("b".into()),
                Op::Newline { last: true },
                Op::Newline { last: false },
                Op::Text("c".into()),
            ]
        );
        assert_eq!(tpl.text, "a\nb\n\nc");
    }

    #[test]
    fn variables_choose_escaping() {
        let tpl = compile("{{a}}{{{b}}}{{&c}}").unwrap();
        assert!(matches!(&tpl.program.ops[0], Op::Escaped(Expr::Reference(n)) if n == "a"));
        assert!(matches!(&tpl.program.ops[1], Op::Unescaped(Expr::Reference(n)) if n == "b"));
        assert!(matches!(&tpl.program.ops[2], Op::Unescaped(Expr::Reference(n)) if n == "c"));
    }

    #[test]
    fn section_carries_span_and_delimiters() {
        let src = "{{#items : item}}<{{item}}>{{/items}}";
        let tpl = compile(src).unwrap();
        let Op::Section(section) = &tpl.program.ops[0] else {
            panic!("expected section");
        };
        assert_eq!(section.alias.as_deref(), Some("item"));
        assert_eq!(section.delimiters, "{{ }}");
        assert_eq!(&src[section.start..section.end], "<{{item}}>");
        assert_eq!(section.body.len(), 3);
    }

    #[test]
    fn inverted_section_inlines_body() {
        let tpl = compile("{{^empty}}none{{/empty}}").unwrap();
        assert_eq!(
            tpl.program.ops,
            vec![Op::Inverted {
                test: Expr::Reference("empty".into()),
                body: vec![Op::Text("none".into())],
            }]
        );
    }

    #[test]
    fn partial_symbols_are_serial() {
        let tpl = compile("  {{>row}}\n{{>row}}{{>cell}}").unwrap();
        let symbols: Vec<_> = tpl.partials.keys().cloned().collect();
        assert_eq!(symbols, vec!["<cell2", "<row0", "<row1"]);
        assert_eq!(
            tpl.program.ops[0],
            Op::Partial {
                symbol: "<row0".into(),
                indent: "  ".into()
            }
        );
        assert_eq!(tpl.partials["<row1"].name, "row");
    }

    #[test]
    fn symbols_restart_per_generation() {
        let first = compile("{{>a}}").unwrap();
        let second = compile("{{>a}}").unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn top_level_block_is_its_own_default() {
        let tpl = compile("{{@title}}Home{{/title}}").unwrap();
        assert_eq!(tpl.program.ops, vec![Op::Sub { name: "title".into() }]);
        assert_eq!(tpl.subs["title"].ops, vec![Op::Text("Home".into())]);
    }

    #[test]
    fn super_template_collects_overrides() {
        let src = "{{<layout}}{{@title}}Hi {{>name}}{{/title}}{{/layout}}";
        let tpl = compile(src).unwrap();

        assert_eq!(
            tpl.program.ops,
            vec![Op::Partial {
                symbol: "<layout1".into(),
                indent: String::new()
            }]
        );
        assert!(tpl.subs.is_empty());

        let layout = &tpl.partials["<layout1"];
        assert_eq!(layout.name, "layout");
        let title = &layout.subs["title"];
        assert_eq!(title.ops[0], Op::Text("Hi ".into()));
        assert!(matches!(&title.ops[1], Op::Partial { symbol, .. } if symbol == "<titlename0"));
        assert_eq!(layout.partials["<titlename0"].name, "name");
    }

    #[test]
    fn nested_blocks_fold_into_enclosing_table() {
        let tpl = compile("{{@outer}}a{{@inner}}b{{/inner}}{{/outer}}").unwrap();
        assert_eq!(
            tpl.subs["outer"].ops,
            vec![Op::Text("a".into()), Op::Sub { name: "inner".into() }]
        );
        assert_eq!(tpl.subs["inner"].ops, vec![Op::Text("b".into())]);
    }

    #[test]
    fn pragmas_generate_nothing() {
        let tpl = compile("{{%anything}}x").unwrap();
        assert_eq!(tpl.program.ops, vec![Op::Text("x".into())]);
    }

    #[test]
    fn section_without_expression_fails() {
        let err = compile("{{#}}x{{/}}").unwrap_err();
        assert_eq!(err.to_string(), "missing expression in # tag");
    }
}
