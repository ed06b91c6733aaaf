use crate::compiler::error::Result;
use crate::compiler::program::CompiledTemplate;
use crate::compiler::{Options, build};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, Mutex, MutexGuard, PoisonError};

/// 缓存键：源码、文本模式、定界符、查找模式
///
/// 自定义 section 标签不参与缓存键。
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    text: String,
    as_string: bool,
    delimiters: Option<String>,
    model_get: bool,
}

impl CacheKey {
    pub fn new(text: &str, options: &Options) -> Self {
        Self {
            text: text.to_string(),
            as_string: options.as_string,
            delimiters: options.delimiters.clone(),
            model_get: options.model_get,
        }
    }
}

/// 编译结果：可直接执行的程序，或其 JSON 文本形式
#[derive(Debug, Clone)]
pub enum Compiled {
    Template(Arc<CompiledTemplate>),
    Serialized(Arc<str>),
}

impl Compiled {
    pub(crate) fn new(template: CompiledTemplate, as_string: bool) -> Result<Self> {
        if as_string {
            Ok(Self::Serialized(template.to_serialized()?.into()))
        } else {
            Ok(Self::Template(Arc::new(template)))
        }
    }

    pub fn template(&self) -> Option<&Arc<CompiledTemplate>> {
        match self {
            Self::Template(template) => Some(template),
            Self::Serialized(_) => None,
        }
    }

    /// 两个结果是否为同一份缓存对象
    pub fn ptr_eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Self::Template(a), Self::Template(b)) => Arc::ptr_eq(a, b),
            (Self::Serialized(a), Self::Serialized(b)) => Arc::ptr_eq(a, b),
            _ => false,
        }
    }

    fn reset_instances(&self) {
        if let Self::Template(template) = self {
            template.reset_instances();
        }
    }
}

/// 带缓存的编译器
///
/// 编译本身不持锁；同一键并发未命中时各自编译，先写入者保留。
#[derive(Debug, Default)]
pub struct Compiler {
    cache: Mutex<HashMap<CacheKey, Compiled>>,
}

impl Compiler {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<CacheKey, Compiled>> {
        self.cache.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// 编译模板，命中缓存时清空 partial 实例绑定后返回同一对象
    pub fn compile(&self, text: &str, options: &Options) -> Result<Compiled> {
        let key = CacheKey::new(text, options);

        let hit = self.entries().get(&key).cloned();
        if let Some(hit) = hit {
            tracing::debug!(len = text.len(), as_string = options.as_string, "模板缓存命中");
            hit.reset_instances();
            return Ok(hit);
        }

        tracing::debug!(len = text.len(), as_string = options.as_string, "模板缓存未命中，开始编译");
        let compiled = build(text, options)?;
        tracing::debug!(len = text.len(), "模板编译完成");

        let stored = self.entries().entry(key).or_insert(compiled).clone();
        Ok(stored)
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    pub fn clear(&self) {
        self.entries().clear();
    }
}

static COMPILER: LazyLock<Compiler> = LazyLock::new(Compiler::new);

/// 使用进程级缓存编译
pub fn compile(text: &str, options: &Options) -> Result<Compiled> {
    COMPILER.compile(text, options)
}
