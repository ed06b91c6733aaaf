use crate::compiler::{self, Options};
use anyhow::Result;
use rayon::prelude::*;
use std::path::{Path, PathBuf};

pub struct CheckResult {
    pub checked: usize,
    pub errors: Vec<String>,
}

/// 并行编译所有模板，收集失败信息
pub fn run(files: &[PathBuf], options: &Options) -> CheckResult {
    let mut errors: Vec<String> = files
        .par_iter()
        .filter_map(|path| {
            check_file(path, options)
                .err()
                .map(|e| format!("{}: {e}", path.display()))
        })
        .collect();
    errors.sort();

    CheckResult {
        checked: files.len(),
        errors,
    }
}

fn check_file(path: &Path, options: &Options) -> Result<()> {
    let text = std::fs::read_to_string(path).map_err(|e| anyhow::anyhow!("读取模板失败：{}", e))?;
    compiler::build(&text, options)?;
    tracing::debug!(path = %path.display(), "模板检查通过");
    Ok(())
}
