//! Mustache 系模板编译器：扫描、建树、表达式解析、代码生成与编译缓存

pub mod check;
pub mod compiler;
pub mod config;
