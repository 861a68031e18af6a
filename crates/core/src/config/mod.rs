//! 配置模块
//!
//! 配置在启动时从 TOML 文件与 `ARBITER_` 前缀的环境变量加载，
//! 校验后以值的形式注入各组件。

pub mod models;

pub use models::*;
