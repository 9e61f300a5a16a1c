use thiserror::Error;

#[derive(Error, Debug)]
pub enum InitProcessError {
    #[error("ロガーのセットアップに失敗しました: {0}")]
    LoggerError(String),

    #[error("設定の読み込みに失敗しました: {0}")]
    ConfigError(#[from] rdb_inspector::core::config::ConfigError),

    #[error("ルールの読み込みに失敗しました: {0}")]
    RuleLoadError(#[from] rdb_inspector::security::idps::RuleError),

    #[error("デバイス選択エラー: {0}")]
    DeviceSelectionError(String),

    #[error("パケットキャプチャエラー: {0}")]
    CaptureError(#[from] rdb_inspector::core::error::CaptureError),

    #[error("キャプチャタスクが異常終了しました: {0}")]
    TaskError(#[from] tokio::task::JoinError),
}
