use rdb_inspector::core::config::LoggingConfig;
use env_logger::{Builder, Target};
use log::LevelFilter;
use std::fs::File;
use std::io::Write;
use std::str::FromStr;

pub fn setup_logger(config: &LoggingConfig) -> Result<(), Box<dyn std::error::Error>> {
    let level = LevelFilter::from_str(&config.level)?;

    // ログファイルが指定されていればファイルへ、なければ標準出力へ
    let target = match &config.file {
        Some(path) => Target::Pipe(Box::new(File::create(path)?)),
        None => Target::Stdout,
    };

    Builder::new()
        .filter_level(level)
        // タイムスタンプ付きのフォーマット
        .format(|buf, record| {
            writeln!(
                buf,
                "{} [{}] {} - {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                record.target(),
                record.args()
            )
        })
        .target(target)
        .try_init()?;

    Ok(())
}
