//! Workflow 定義の読み込みと管理を行うモジュール
//!
//! # 責務
//!
//! このモジュールは、ワークフローを TOML 形式で宣言的に定義し、
//! それを実行可能な [`Workflow`](crate::engine::Workflow) に変換する機能を提供します。
//!
//! ## 主な機能
//!
//! - **TOML パース**: `workflows/` ディレクトリ内の TOML ファイルを読み込み、
//!   [`WorkflowDefinition`] にデシリアライズ
//! - **バリデーション**: ステップ名の重複やジャンプ先の不整合を読み込み時に検出
//! - **ワークフロー構築**: 各ステップを [`StepAction`] としてエンジンに登録
//!
//! ## 使用例
//!
//! ```toml
//! [workflow]
//! name = "repeat-once"
//! description = "初回だけ先頭に戻るワークフロー"
//!
//! [[steps]]
//! name = "loop"
//! action = "jump"
//! to = "first"
//! once = "looped"
//!
//! [[steps]]
//! name = "done"
//! action = "set_result"
//! value = "done"
//! ```
//!
//! ## 関連モジュール
//!
//! - [`crate::config::step`]: 各ステップの定義
//! - [`crate::engine::executor`]: ワークフローの実行エンジン

use std::collections::HashMap;
use std::path::Path;

use serde_json::Value;
use tracing::info;

use super::dto::{WorkflowDto, WorkflowMetadataDto};
use super::step::{JumpTarget, StepAction, StepDefinition};
use crate::engine::result::{ExecutionError, RunReport};
use crate::engine::Workflow;
use crate::error::ConfigError;

/// ワークフロー定義（ドメインモデル）
///
/// バリデーション済みの状態を保証します。
///
/// ## DTO との違い
///
/// - [`WorkflowDto`]: TOML デシリアライズ専用、バリデーション前の生データ
/// - [`WorkflowDefinition`]: バリデーション済み、エンジンへの変換を持つ
#[derive(Debug, Clone, PartialEq)]
pub struct WorkflowDefinition {
    name: String,
    description: Option<String>,
    version: Option<String>,
    initial_value: Value,
    initial_state: Value,
    steps: Vec<StepDefinition>,
}

impl WorkflowDefinition {
    /// TOML ファイルからワークフローを読み込む
    ///
    /// # 処理フロー
    ///
    /// 1. ファイル読み込み
    /// 2. TOML デシリアライズ → [`WorkflowDto`]
    /// 3. バリデーション & 変換 → [`WorkflowDefinition`]
    ///
    /// # 戻り値
    ///
    /// * `Ok(WorkflowDefinition)` - 読み込みに成功した場合
    /// * `Err(ConfigError)` - ファイルの読み込みまたはパースに失敗した場合
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let definition = Self::from_toml(&content)?;
        info!(
            path = %path.display(),
            workflow = %definition.name,
            steps = definition.steps.len(),
            "ワークフロー定義を読み込みました"
        );
        Ok(definition)
    }

    /// TOML 文字列からワークフローを読み込む
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        let dto: WorkflowDto = toml::from_str(toml)?;
        dto.try_into()
    }

    /// ワークフローを TOML 文字列に変換
    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        let dto = WorkflowDto::from(self.clone());
        Ok(toml::to_string(&dto)?)
    }

    /// ワークフローを TOML ファイルに保存
    pub fn to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        std::fs::write(path, self.to_toml_string()?)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// `run` に渡す初期値（未指定なら `Null`）
    pub fn initial_value(&self) -> &Value {
        &self.initial_value
    }

    /// 構築時にワークフローへ設定される永続状態
    pub fn initial_state(&self) -> &Value {
        &self.initial_state
    }

    pub fn steps(&self) -> &[StepDefinition] {
        &self.steps
    }

    /// 実行可能なワークフローを構築
    ///
    /// ステップ名によるジャンプ先はここでインデックスに解決されます。
    /// `noop` は空のステップとして登録されます。
    pub fn build(&self) -> Workflow {
        let indices = self.step_indices();
        let mut workflow = Workflow::named(self.name.clone());
        workflow.set_state(self.initial_state.clone());

        for step in &self.steps {
            match step.action() {
                StepAction::Noop => workflow.append_slot(None),
                StepAction::Jump {
                    to: JumpTarget::Step(name),
                    once,
                } => match indices.get(name.as_str()) {
                    Some(&index) => workflow.append(StepAction::Jump {
                        to: JumpTarget::Index(index),
                        once: once.clone(),
                    }),
                    None => workflow.append(step.action().clone()),
                },
                action => workflow.append(action.clone()),
            };
        }

        workflow
    }

    /// 構築して定義の初期値で実行
    pub async fn run(&self) -> Result<RunReport, ExecutionError> {
        self.build().run(self.initial_value.clone()).await
    }

    fn step_indices(&self) -> HashMap<&str, usize> {
        self.steps
            .iter()
            .enumerate()
            .filter_map(|(index, step)| step.name().map(|name| (name, index)))
            .collect()
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Validation("ワークフロー名が空です".to_string()));
        }

        let indices = self.step_indices();
        let named = self.steps.iter().filter(|step| step.name().is_some()).count();
        if indices.len() != named {
            return Err(ConfigError::Validation("ステップ名が重複しています".to_string()));
        }

        for (index, step) in self.steps.iter().enumerate() {
            let StepAction::Jump { to, .. } = step.action() else {
                continue;
            };
            match to {
                JumpTarget::Index(target) if *target >= self.steps.len() => {
                    return Err(ConfigError::Validation(format!(
                        "ステップ {index} のジャンプ先 {target} は範囲外です（ステップ数: {}）",
                        self.steps.len()
                    )));
                }
                JumpTarget::Step(name) if !indices.contains_key(name.as_str()) => {
                    return Err(ConfigError::Validation(format!(
                        "ステップ {index} のジャンプ先 '{name}' が見つかりません"
                    )));
                }
                _ => {}
            }
        }

        Ok(())
    }
}

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// # 処理フロー
///
/// 1. ステップの変換（`WorkflowStepDto` → `StepDefinition`）
/// 2. ワークフロー全体のバリデーション
impl TryFrom<WorkflowDto> for WorkflowDefinition {
    type Error = ConfigError;

    fn try_from(dto: WorkflowDto) -> Result<Self, Self::Error> {
        let steps = dto
            .steps
            .into_iter()
            .map(StepDefinition::try_from)
            .collect::<Result<Vec<_>, _>>()?;

        let definition = Self {
            name: dto.workflow.name,
            description: dto.workflow.description,
            version: dto.workflow.version,
            initial_value: dto.workflow.initial_value.unwrap_or(Value::Null),
            initial_state: dto.workflow.initial_state.unwrap_or(Value::Null),
            steps,
        };
        definition.validate()?;
        Ok(definition)
    }
}

/// ドメインモデルから DTO への変換（書き込み方向）
impl From<WorkflowDefinition> for WorkflowDto {
    fn from(definition: WorkflowDefinition) -> Self {
        let non_null = |value: Value| (!value.is_null()).then_some(value);
        WorkflowDto {
            workflow: WorkflowMetadataDto {
                name: definition.name,
                description: definition.description,
                version: definition.version,
                initial_value: non_null(definition.initial_value),
                initial_state: non_null(definition.initial_state),
            },
            steps: definition.steps.into_iter().map(Into::into).collect(),
        }
    }
}
