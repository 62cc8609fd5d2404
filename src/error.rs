//! エラー型の定義
//!
//! このモジュールは、stepchain 全体で使用されるエラー型を定義します。
//! ワークフロー実行そのものの失敗は [`ExecutionError`](crate::engine::ExecutionError) を参照してください。

use thiserror::Error;

/// 設定関連のエラー
#[derive(Debug, Error)]
pub enum ConfigError {
    /// ファイルの読み込みに失敗
    #[error("設定ファイルの読み込みに失敗しました: {0}")]
    FileRead(#[from] std::io::Error),

    /// TOML のデシリアライズに失敗
    #[error("TOML のデシリアライズに失敗しました: {0}")]
    TomlDeserialize(#[from] toml::de::Error),

    /// TOML のシリアライズに失敗
    #[error("TOML のシリアライズに失敗しました: {0}")]
    TomlSerialize(#[from] toml::ser::Error),

    /// バリデーションエラー
    #[error("設定のバリデーションに失敗しました: {0}")]
    Validation(String),

    /// ロガーの初期化に失敗
    #[error("ロガーの初期化に失敗しました: {0}")]
    Logging(String),
}

/// ジャンプ先が範囲外
///
/// `goto(target)` の `target` が `[0, step_count)` に収まらない場合に返されます。
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("ジャンプ先のステップ {target} は範囲外です（ステップ数: {step_count}）")]
pub struct JumpError {
    /// 要求されたジャンプ先
    pub target: usize,
    /// ワークフローのステップ数
    pub step_count: usize,
}

/// ステップが返すエラー
///
/// ステップ関数はこの型で失敗を報告します。
/// どのバリアントであっても、その時点で実行全体が中断されます。
#[derive(Debug, Error)]
pub enum StepError {
    /// メッセージのみのエラー
    #[error("{0}")]
    Message(String),

    /// 不正なジャンプ
    #[error(transparent)]
    Jump(#[from] JumpError),

    /// 任意のエラー
    #[error(transparent)]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

impl StepError {
    /// メッセージからエラーを生成
    pub fn msg(message: impl Into<String>) -> Self {
        Self::Message(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_jump_error_message() {
        let err = JumpError {
            target: 5,
            step_count: 3,
        };
        assert_eq!(
            err.to_string(),
            "ジャンプ先のステップ 5 は範囲外です（ステップ数: 3）"
        );
    }

    #[test]
    fn test_step_error_from_jump_is_transparent() {
        let err = StepError::from(JumpError {
            target: 1,
            step_count: 1,
        });
        assert!(matches!(err, StepError::Jump(_)));
        assert_eq!(
            err.to_string(),
            "ジャンプ先のステップ 1 は範囲外です（ステップ数: 1）"
        );
    }

    #[test]
    fn test_step_error_other() {
        let io = std::io::Error::other("disk full");
        let err = StepError::Other(Box::new(io));
        assert_eq!(err.to_string(), "disk full");
    }

    #[test]
    fn test_config_error_validation() {
        let err = ConfigError::Validation("name が空です".to_string());
        assert_eq!(
            err.to_string(),
            "設定のバリデーションに失敗しました: name が空です"
        );
    }
}
