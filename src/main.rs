use clap::{Parser, Subcommand, ValueEnum};
use horseshoe::compiler::{self, Compiled, lexer};
use horseshoe::{check, config};
use std::path::{Path, PathBuf};

#[derive(Parser)]
#[command(name = "horseshoe", about = "Mustache 系模板编译器", version = long_version())]
struct Cli {
    /// horseshoe.toml 所在目录（默认当前目录）
    #[arg(short, long, global = true, default_value = ".")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 编译模板并输出代码清单或 JSON
    Compile {
        file: PathBuf,

        #[arg(long, value_enum, default_value_t = Emit::Code)]
        emit: Emit,

        /// 覆盖配置中的定界符，如 "<% %>"
        #[arg(long)]
        delimiters: Option<String>,

        /// 输出文件（默认标准输出）
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// 检查模板能否编译
    Check {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// 打印扫描得到的 token 序列
    Tokens { file: PathBuf },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Emit {
    /// 代码清单
    Code,
    /// 可持久化的 JSON
    Json,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // 配置中的日志级别作为默认值，RUST_LOG 优先
    let config = config::Config::load(&cli.config);
    let default_level = config
        .as_ref()
        .map(|c| c.log.level.clone())
        .unwrap_or_else(|_| "info".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(&default_level)),
        )
        .init();

    let config = config?;
    let mut options = config.options();

    match cli.command {
        Commands::Compile {
            file,
            emit,
            delimiters,
            output,
        } => {
            let text = read_template(&file)?;
            if delimiters.is_some() {
                options.delimiters = delimiters;
            }
            options.as_string = emit == Emit::Json;

            let listing = match compiler::compile(&text, &options)? {
                Compiled::Template(template) => template.to_string(),
                Compiled::Serialized(json) => json.to_string(),
            };

            match output {
                Some(path) => {
                    std::fs::write(&path, listing)
                        .map_err(|e| anyhow::anyhow!("写入 {} 失败：{}", path.display(), e))?;
                    tracing::info!("已输出到 {}", path.display());
                }
                None => println!("{listing}"),
            }
        }
        Commands::Check { files } => {
            let result = check::run(&files, &options);

            for e in &result.errors {
                tracing::error!("{e}");
            }

            if result.errors.is_empty() {
                tracing::info!("检查通过（{} 个模板）", result.checked);
            } else {
                anyhow::bail!(
                    "检查未通过：{} 个模板中 {} 个失败",
                    result.checked,
                    result.errors.len()
                );
            }
        }
        Commands::Tokens { file } => {
            let text = read_template(&file)?;
            let tokens = lexer::tokenize(&text, options.delimiters.as_deref())?;
            for token in &tokens {
                println!(
                    "{:>2} {:<2} {:>5} {:?}",
                    token.kind.rank(),
                    token.kind.sigil().escape_default(),
                    token.offset,
                    token.name
                );
            }
        }
    }

    Ok(())
}

fn read_template(path: &Path) -> anyhow::Result<String> {
    std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("读取 {} 失败：{}", path.display(), e))
}

const fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        "\ncommit:  ",
        env!("HORSESHOE_GIT_COMMIT"),
        "\nbuild:   ",
        env!("HORSESHOE_BUILD_TIME"),
        "\ntarget:  ",
        env!("HORSESHOE_BUILD_TARGET"),
        "\nprofile: ",
        env!("HORSESHOE_BUILD_PROFILE"),
    )
}
