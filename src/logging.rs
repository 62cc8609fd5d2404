//! ロガーの初期化
//!
//! # 責務
//!
//! - `tracing-subscriber` の fmt サブスクライバーをグローバルに登録
//! - 出力形式（テキスト / JSON）と出力先（標準エラー / ファイル）の切り替え
//!
//! ライブラリ側はサブスクライバーを登録しません。バイナリの起動時に一度だけ
//! [`init`] を呼び出してください。
//!
//! # 使用例
//!
//! ```rust,no_run
//! use stepchain::logging::{self, LogFormat, LogOptions};
//! use tracing::Level;
//!
//! let options = LogOptions {
//!     level: Level::DEBUG,
//!     format: LogFormat::Json,
//!     file: Some("logs/stepchain.log".into()),
//! };
//!
//! // ファイル出力の場合、ガードを保持している間だけ書き込まれる
//! let _guard = logging::init(&options).unwrap();
//! ```

use std::path::PathBuf;

use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::writer::BoxMakeWriter;

use crate::error::ConfigError;

/// 出力形式
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    /// 人間向けのテキスト
    #[default]
    Text,
    /// 1行1イベントの JSON
    Json,
}

/// ロガーの設定
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// 出力する最大レベル
    pub level: Level,
    /// 出力形式
    pub format: LogFormat,
    /// 出力先ファイル（`None` なら標準エラー）
    pub file: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: LogFormat::Text,
            file: None,
        }
    }
}

/// グローバルサブスクライバーを登録
///
/// # 戻り値
///
/// - `Ok(Some(WorkerGuard))`: ファイル出力の場合。破棄するとバッファがフラッシュされる
/// - `Ok(None)`: 標準エラー出力の場合
/// - `Err(ConfigError::Logging)`: 既にサブスクライバーが登録済み、またはファイル名が不正
pub fn init(options: &LogOptions) -> Result<Option<WorkerGuard>, ConfigError> {
    let (writer, guard) = match &options.file {
        Some(path) => {
            let file_name = path
                .file_name()
                .ok_or_else(|| ConfigError::Logging(format!("ファイル名が不正です: {}", path.display())))?;
            let directory = path
                .parent()
                .filter(|dir| !dir.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            std::fs::create_dir_all(directory).map_err(|e| {
                ConfigError::Logging(format!(
                    "ログディレクトリを作成できません: {}: {e}",
                    directory.display()
                ))
            })?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            (BoxMakeWriter::new(non_blocking), Some(guard))
        }
        None => (BoxMakeWriter::new(std::io::stderr), None),
    };

    let builder = tracing_subscriber::fmt()
        .with_max_level(options.level)
        .with_target(false)
        .with_ansi(options.file.is_none())
        .with_writer(writer);

    let result = match options.format {
        LogFormat::Text => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    result.map_err(|e| ConfigError::Logging(e.to_string()))?;

    Ok(guard)
}
