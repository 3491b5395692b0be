use std::io::Write;

/// 覆盖默认日志等级的环境变量，语法与 `RUST_LOG` 一致
pub const LOG_ENV: &str = "PRISM_LOG";

/// 彩色日志：等级着色，附带本地时间、模块与源码位置
pub fn init_log() {
    init_log_with_level(log::LevelFilter::Info);
}

pub fn init_log_with_level(level: log::LevelFilter) {
    // 重复初始化时（例如多个测试）静默忽略
    let _ = build_logger(level).try_init();
}

fn build_logger(level: log::LevelFilter) -> env_logger::Builder {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let level_style = match record.level() {
                log::Level::Error => level_color(buf, record.level(), anstyle::AnsiColor::Red),
                log::Level::Warn => level_color(buf, record.level(), anstyle::AnsiColor::Yellow),
                log::Level::Info => level_color(buf, record.level(), anstyle::AnsiColor::Green),
                log::Level::Debug | log::Level::Trace => buf.default_level_style(record.level()),
            };
            let location_style = anstyle::Style::new().fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));

            // windows 路径同样只保留文件名
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let line = record.line().unwrap_or(0);
            let time = chrono::Local::now().format("%H:%M:%S%.3f");

            writeln!(
                buf,
                "{level_style}[{time}] {:<5} {}{level_style:#}\n\t {location_style}{} ({file}:{line}){location_style:#}",
                record.level(),
                record.args(),
                record.module_path().unwrap_or(""),
            )
        })
        .filter(None, level);

    if let Ok(spec) = std::env::var(LOG_ENV) {
        builder.parse_filters(&spec);
    }
    builder
}

fn level_color(buf: &env_logger::fmt::Formatter, level: log::Level, color: anstyle::AnsiColor) -> anstyle::Style {
    buf.default_level_style(level).fg_color(Some(anstyle::Color::Ansi(color)))
}
