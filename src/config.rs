use crate::compiler::{Options, SectionTag, lexer};
use anyhow::Result;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_FILE: &str = "horseshoe.toml";

#[derive(Debug, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub compiler: CompilerConfig,
    #[serde(default)]
    pub log: LogConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct CompilerConfig {
    /// `"OPEN CLOSE"`
    #[serde(default)]
    pub delimiters: Option<String>,
    #[serde(default)]
    pub model_get: bool,
    #[serde(default)]
    pub section_tags: Vec<SectionTag>,
}

#[derive(Debug, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Config {
    /// 读取 `dir/horseshoe.toml`，文件不存在时使用默认配置
    pub fn load(dir: &Path) -> Result<Self> {
        let config_path = dir.join(CONFIG_FILE);
        if !config_path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(&config_path)
            .map_err(|e| anyhow::anyhow!("读取 {} 失败：{}", CONFIG_FILE, e))?;
        Self::parse(&content)
    }

    pub fn parse(content: &str) -> Result<Self> {
        let config: Config = toml::from_str(content)
            .map_err(|e| anyhow::anyhow!("解析 {} 失败：{}", CONFIG_FILE, e))?;
        if let Some(delimiters) = &config.compiler.delimiters {
            lexer::parse_delimiters(delimiters)?;
        }
        Ok(config)
    }

    /// `[compiler]` 段对应的编译选项
    pub fn options(&self) -> Options {
        Options {
            delimiters: self.compiler.delimiters.clone(),
            as_string: false,
            model_get: self.compiler.model_get,
            section_tags: self.compiler.section_tags.clone(),
        }
    }
}

// 默认值函数
fn default_log_level() -> String { "info".into() }

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_uses_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config.log.level, "info");
        assert_eq!(config.options(), Options::default());
    }

    #[test]
    fn compiler_section_maps_to_options() {
        let config = Config::parse(
            r#"
[compiler]
delimiters = "<% %>"
model_get = true
section_tags = [{ open = "_if", close = "if" }]

[log]
level = "debug"
"#,
        )
        .unwrap();

        let options = config.options();
        assert_eq!(options.delimiters.as_deref(), Some("<% %>"));
        assert!(options.model_get);
        assert!(!options.as_string);
        assert_eq!(options.section_tags[0].close, "if");
        assert_eq!(config.log.level, "debug");
    }

    #[test]
    fn malformed_delimiters_are_rejected() {
        let err = Config::parse("[compiler]\ndelimiters = \"<%\"").unwrap_err();
        assert!(err.to_string().contains("delimiters"));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = std::env::temp_dir().join("horseshoe-config-missing");
        let config = Config::load(&dir).unwrap();
        assert!(config.compiler.delimiters.is_none());
    }
}
