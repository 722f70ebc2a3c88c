//! 可观测性：tracing 订阅器初始化
//!
//! 默认级别 info，`RUST_LOG` 覆盖；日志写 stderr，避免与 CLI 的流式回复混在 stdout。

use tracing_subscriber::{fmt, prelude::*, EnvFilter};

pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // 重复初始化（如测试中）时保留已有订阅器
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).with_target(false))
        .try_init();
}
