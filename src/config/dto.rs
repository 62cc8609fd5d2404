//! TOML デシリアライズ用の DTO (Data Transfer Object)
//!
//! # 責務
//!
//! このモジュールは、TOML ファイルからのデータ読み込み専用の構造体を提供します。
//! DTO はバリデーション前の「生データ」を表現し、ドメインモデルとは分離されています。
//!
//! ## 設計思想
//!
//! - **単一責務**: TOML のデシリアライズのみを担当
//! - **バリデーション前の状態**: アクションに必要なフィールドが欠けていても一旦受け入れる
//! - **カプセル化**: config モジュール内部のみで使用（外部非公開）
//!
//! ## 変換フロー
//!
//! ```text
//! TOML ファイル
//!   ↓ (デシリアライズ)
//! WorkflowDto
//!   ↓ (TryFrom でバリデーション)
//! WorkflowDefinition (ドメインモデル)
//!   ↓ (build)
//! engine::Workflow
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// ワークフロー DTO
///
/// TOML の `[workflow]` セクションと `[[steps]]` 配列をデシリアライズ/シリアライズします。
///
/// **注**: この構造体は config モジュール内部の実装詳細です。
/// 外部からは [`WorkflowDefinition`](super::workflow::WorkflowDefinition) を使用してください。
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct WorkflowDto {
    /// ワークフローのメタデータ
    pub(super) workflow: WorkflowMetadataDto,
    /// ステップの配列
    #[serde(default)]
    pub(super) steps: Vec<WorkflowStepDto>,
}

/// ワークフローメタデータ DTO
#[derive(Debug, Serialize, Deserialize)]
pub(super) struct WorkflowMetadataDto {
    pub(super) name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) description: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) version: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) initial_value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) initial_state: Option<Value>,
}

/// ワークフローステップ DTO
///
/// どのアクションでも同じ形で受け取り、必須フィールドの確認は変換時に行います。
#[derive(Debug, Default, Serialize, Deserialize)]
pub(super) struct WorkflowStepDto {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) name: Option<String>,
    pub(super) action: ActionKindDto,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) value: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) factor: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) store: Option<SlotDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) key: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) millis: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) resolve: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) to: Option<JumpTargetDto>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) once: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub(super) message: Option<String>,
}

/// ステップのアクション種別
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(super) enum ActionKindDto {
    #[default]
    Noop,
    SetValue,
    SetResult,
    PassNext,
    TakePrevious,
    Multiply,
    SetState,
    Sleep,
    Jump,
    Finish,
    Fail,
}

/// 値の格納先
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(super) enum SlotDto {
    Value,
    Result,
    Next,
}

/// ジャンプ先（インデックス、または "first" / "last" / ステップ名）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub(super) enum JumpTargetDto {
    Index(usize),
    Label(String),
}
