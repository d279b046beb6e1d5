//! 配置管理
//!
//! 加载顺序：
//! 1. 各配置段的默认值
//! 2. 配置文件（TOML）
//! 3. 环境变量覆盖（前缀 `TRACKER__`，层级分隔符 `__`）

pub mod models;
pub mod time_serde;

pub use models::*;
