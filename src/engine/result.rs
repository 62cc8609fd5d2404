//! ワークフロー実行結果の型定義
//!
//! # 責務
//!
//! - 実行レポート [`RunReport`] の型定義
//! - ステップ実行記録 [`StepRecord`] の型定義
//! - 実行エラー [`ExecutionError`] の型定義
//!
//! # 主要な型
//!
//! - [`RunReport`][]: 実行全体の結果（最終結果、最終値、実行回数、各ステップの記録）
//! - [`StepRecord`][]: ステップ1回分の実行記録（インデックス、次のインデックス、所要時間等）
//! - [`ExecutionError`][]: ワークフロー実行時のエラー型
//!
//! # 使用例
//!
//! ```rust,no_run
//! use stepchain::engine::result::RunReport;
//!
//! fn handle_report(report: RunReport) {
//!     println!("ワークフロー: {}", report.workflow_name);
//!     println!("結果: {}", report.result);
//!     println!("実行回数: {}", report.executions);
//!     println!("実行順: {:?}", report.executed_indices());
//!
//!     // JSON形式で出力
//!     if let Ok(json) = report.to_json() {
//!         println!("JSON: {}", json);
//!     }
//! }
//! ```

use crate::error::{JumpError, StepError};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

/// 実行レポート
///
/// 1回の `run()` の結果です。失敗した実行のレポートは存在しません。
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    /// ワークフロー名
    pub workflow_name: String,

    /// 最終結果（どのステップも設定しなければ `Null`）
    pub result: Value,

    /// 最後のステップが残した `value`
    pub value: Value,

    /// ワークフローのステップ数（空のステップを含む）
    pub step_count: usize,

    /// 実行されたステップ数（繰り返しを含む）
    pub executions: usize,

    /// 各ステップの実行記録（実行順）
    pub steps: Vec<StepRecord>,

    /// 総実行時間
    pub total_duration: Duration,
}

impl RunReport {
    /// 結果をJSON形式でシリアライズ
    ///
    /// # 戻り値
    ///
    /// - `Ok(String)`: JSON文字列
    /// - `Err(serde_json::Error)`: シリアライズ失敗
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// 実行されたステップのインデックス（実行順）
    pub fn executed_indices(&self) -> Vec<usize> {
        self.steps.iter().map(|step| step.index).collect()
    }

    /// 途中で `finish()` などにより打ち切られたか
    ///
    /// 最後に実行されたステップが末尾以外で、かつ次のインデックスが無い場合に `true`。
    pub fn finished_early(&self) -> bool {
        self.steps
            .last()
            .is_some_and(|last| last.next_index.is_none() && last.index + 1 < self.step_count)
    }
}

/// ステップ実行記録
#[derive(Debug, Clone, Serialize)]
pub struct StepRecord {
    /// ステップインデックス（0始まり）
    pub index: usize,

    /// 何回目の実行か（0始まり）
    pub execution: usize,

    /// 次に実行されたステップ（実行終了なら `None`）
    pub next_index: Option<usize>,

    /// ステップが空（スロットのみ）だったか
    pub skipped: bool,

    /// 値を明示して完了したか
    pub resolved: bool,

    /// 実行時間
    pub duration: Duration,
}

/// 実行エラー
///
/// ワークフロー実行時に発生する可能性のあるエラーを表します。
/// どのエラーも実行全体を中断し、それまでの `result` / `value` は破棄されます。
///
/// # エラー種別
///
/// - [`ExecutionError::StepFailed`] - ステップがエラーを返した（非同期ステップの失敗を含む）
/// - [`ExecutionError::InvalidJumpTarget`] - `goto` のジャンプ先が範囲外
#[derive(Debug, Error)]
pub enum ExecutionError {
    /// ステップの失敗
    #[error("ステップ {index} の実行に失敗しました: {source}")]
    StepFailed {
        /// 失敗したステップのインデックス
        index: usize,
        /// ステップが返したエラー
        #[source]
        source: StepError,
    },

    /// 不正なジャンプ先
    #[error("ステップ {index} で不正なジャンプが要求されました: {source}")]
    InvalidJumpTarget {
        /// ジャンプを要求したステップのインデックス
        index: usize,
        #[source]
        source: JumpError,
    },
}

impl ExecutionError {
    /// 失敗したステップのインデックス
    pub fn step_index(&self) -> usize {
        match self {
            Self::StepFailed { index, .. } | Self::InvalidJumpTarget { index, .. } => *index,
        }
    }
}
