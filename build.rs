use std::process::Command;

/// 执行命令取标准输出，失败时返回 "unknown"
fn capture(program: &str, args: &[&str]) -> String {
    Command::new(program)
        .args(args)
        .output()
        .ok()
        .filter(|o| o.status.success())
        .map(|o| String::from_utf8_lossy(&o.stdout).trim().to_string())
        .unwrap_or_else(|| "unknown".to_string())
}

fn main() {
    let commit = capture("git", &["rev-parse", "--short", "HEAD"]);
    // 不引入时间库，直接用 date 命令
    let build_time = capture("date", &["-u", "+%Y-%m-%dT%H:%M:%SZ"]);
    let target = std::env::var("TARGET").unwrap_or_else(|_| "unknown".to_string());
    let profile = std::env::var("PROFILE").unwrap_or_else(|_| "unknown".to_string());

    println!("cargo:rustc-env=HORSESHOE_GIT_COMMIT={commit}");
    println!("cargo:rustc-env=HORSESHOE_BUILD_TIME={build_time}");
    println!("cargo:rustc-env=HORSESHOE_BUILD_TARGET={target}");
    println!("cargo:rustc-env=HORSESHOE_BUILD_PROFILE={profile}");

    println!("cargo:rerun-if-changed=.git/HEAD");
    println!("cargo:rerun-if-changed=.git/refs/");
}
