//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! このモジュールは、ステップ列を順番に実行する [`Workflow`] を提供します。
//! ステップは実行中に次のステップを変更でき（ジャンプ、繰り返し、早期終了）、
//! 同期ステップと非同期ステップを混在させられます。
//!
//! # 主要な型
//!
//! - [`Workflow`][]: ステップ列と永続状態を所有し、実行を制御する構造体
//!
//! # 実行フロー
//!
//! 1. `start()` 呼び出し時点のステップ列をスナップショットする
//! 2. 次のインデックスがステップ数未満である限り繰り返す
//!    - 直前のステップの値から新しい [`StepContext`] を生成
//!    - ステップを実行（非同期ステップは完了まで待機）
//!    - コンテキストから `value` / `result` / 次のインデックスを回収
//! 3. 最後に残った `result` を返す
//!
//! 失敗したステップがあれば、その時点で実行全体が失敗します。リトライはありません。
//!
//! # 使用例
//!
//! ```rust
//! use stepchain::engine::Workflow;
//! use stepchain::engine::step::{self, Completion};
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut workflow = Workflow::named("scale");
//!     workflow
//!         .append_fn(|ctx| {
//!             ctx.set_value(json!(1));
//!             Ok(())
//!         })
//!         .append_async(|ctx| {
//!             Box::pin(async move {
//!                 let value = ctx.value().as_i64().unwrap_or(0);
//!                 ctx.set_result(json!(value * 10));
//!                 Ok(Completion::Done)
//!             })
//!         });
//!
//!     let result = workflow.start(json!(null)).await?;
//!     assert_eq!(result, json!(10));
//!     Ok(())
//! }
//! ```

use std::sync::Arc;
use std::time::Instant;

use serde_json::Value;
use tracing::{Instrument, debug, info, info_span, warn};

use crate::engine::context::{Carry, StateHandle, StepContext};
use crate::engine::result::{ExecutionError, RunReport, StepRecord};
use crate::engine::step::{self, Completion, Step, StepFuture};
use crate::error::StepError;

/// デフォルトのワークフロー名
const DEFAULT_NAME: &str = "workflow";

/// ステップ列の1要素（`None` は空のステップ）
type StepSlot = Option<Arc<dyn Step>>;

/// ワークフロー
///
/// 順序付きのステップ列と、実行をまたいで保持される永続状態を所有します。
///
/// # フィールド
///
/// - `name`: ログとレポートに使うワークフロー名
/// - `steps`: ステップ列（挿入順が実行順）
/// - `state`: 永続状態（`reset()` / `reset_state()` まで保持される）
///
/// # 並行実行について
///
/// `start()` は `&self` を取るため、同じワークフローを並行して実行できます。
/// 各実行はそれぞれのスナップショットとカウンタを持ちますが、永続状態は
/// 調停なしに共有されるため、並行実行同士で状態の更新が競合する可能性があります。
#[derive(Clone)]
pub struct Workflow {
    name: String,
    steps: Vec<StepSlot>,
    state: StateHandle,
}

impl Default for Workflow {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Workflow {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Workflow")
            .field("name", &self.name)
            .field("steps", &self.steps.len())
            .field("state", &self.state.get())
            .finish()
    }
}

impl Workflow {
    /// 空のワークフローを生成
    pub fn new() -> Self {
        Self::named(DEFAULT_NAME)
    }

    /// 名前付きの空のワークフローを生成
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            steps: Vec::new(),
            state: StateHandle::default(),
        }
    }

    /// ワークフロー名
    pub fn name(&self) -> &str {
        &self.name
    }

    /// ステップ数
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    /// ステップが1つもないか
    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    /// ステップを末尾に追加
    ///
    /// ステップの内容は検証しません。チェーンできるよう自身を返します。
    pub fn append<S>(&mut self, step: S) -> &mut Self
    where
        S: Step + 'static,
    {
        self.steps.push(Some(Arc::new(step)));
        self
    }

    /// 同期クロージャをステップとして追加
    pub fn append_fn<F>(&mut self, f: F) -> &mut Self
    where
        F: Fn(&mut StepContext) -> Result<(), StepError> + Send + Sync + 'static,
    {
        self.append(step::from_fn(f))
    }

    /// 非同期クロージャをステップとして追加
    pub fn append_async<F>(&mut self, f: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut StepContext) -> StepFuture<'a> + Send + Sync + 'static,
    {
        self.append(step::from_async(f))
    }

    /// ステップスロットを追加
    ///
    /// `None` は空のステップとして扱われ、実行時には何もせず次へ進みます。
    pub fn append_slot(&mut self, step: Option<Arc<dyn Step>>) -> &mut Self {
        self.steps.push(step);
        self
    }

    /// ステップ列と永続状態をクリア
    pub fn reset(&mut self) -> &mut Self {
        self.clear_steps();
        self.reset_state();
        self
    }

    /// ステップ列のみクリア
    pub fn clear_steps(&mut self) -> &mut Self {
        self.steps.clear();
        self
    }

    /// 永続状態を `Null` に戻す
    pub fn reset_state(&self) {
        self.state.set(Value::Null);
    }

    /// 永続状態を取得（コピー）
    pub fn state(&self) -> Value {
        self.state.get()
    }

    /// 永続状態を置き換える
    pub fn set_state(&self, value: Value) {
        self.state.set(value);
    }

    /// 永続状態のハンドル
    pub fn state_handle(&self) -> &StateHandle {
        &self.state
    }

    /// ワークフローを実行し、最終結果を返す
    ///
    /// # 引数
    ///
    /// - `initial_value`: 最初のステップの `value`
    ///
    /// # 戻り値
    ///
    /// - `Ok(Value)`: いずれかのステップが設定した最後の `result`（未設定なら `Null`）
    /// - `Err(ExecutionError)`: 最初に失敗したステップのエラー
    pub async fn start(&self, initial_value: Value) -> Result<Value, ExecutionError> {
        self.run(initial_value).await.map(|report| report.result)
    }

    /// ワークフローを実行し、実行レポートを返す
    ///
    /// 実行内容は [`start`](Self::start) と同じです。
    pub async fn run(&self, initial_value: Value) -> Result<RunReport, ExecutionError> {
        let span = info_span!("workflow", name = %self.name, steps = self.steps.len());
        self.execute(initial_value).instrument(span).await
    }

    async fn execute(&self, initial_value: Value) -> Result<RunReport, ExecutionError> {
        // 実行中にステップ列が変更されても影響を受けないようにする
        let steps = self.steps.clone();
        let step_count = steps.len();
        let started = Instant::now();

        let mut records = Vec::new();
        let mut next_index = 0;
        let mut carry = Carry {
            executions: 0,
            previous_index: None,
            previous_value: Value::Null,
            value: initial_value,
            result: Value::Null,
        };

        while next_index < step_count {
            let index = next_index;
            let execution = carry.executions;
            debug!(index, execution, "ステップを実行します");

            let step_started = Instant::now();
            let mut ctx = StepContext::new(index, step_count, carry, self.state.clone());
            let outcome = match &steps[index] {
                Some(step) => step.run(&mut ctx).await,
                None => Ok(Completion::Done),
            };
            let parts = ctx.into_parts();

            // 無視されたジャンプエラーもここで拾う
            if let Some(source) = parts.jump_error {
                warn!(index, error = %source, "不正なジャンプ先が指定されました");
                return Err(ExecutionError::InvalidJumpTarget { index, source });
            }

            let completion = match outcome {
                Ok(completion) => completion,
                Err(StepError::Jump(source)) => {
                    warn!(index, error = %source, "不正なジャンプ先が指定されました");
                    return Err(ExecutionError::InvalidJumpTarget { index, source });
                }
                Err(source) => {
                    warn!(index, error = %source, "ステップが失敗しました");
                    return Err(ExecutionError::StepFailed { index, source });
                }
            };

            let resolved = matches!(completion, Completion::Resolved(_));
            let previous_value = match completion {
                Completion::Resolved(value) => value,
                Completion::Done => parts.next_value.unwrap_or(Value::Null),
            };

            next_index = parts.next_index;
            debug!(index, next_index, resolved, "ステップが完了しました");

            records.push(StepRecord {
                index,
                execution,
                next_index: (next_index < step_count).then_some(next_index),
                skipped: steps[index].is_none(),
                resolved,
                duration: step_started.elapsed(),
            });

            carry = Carry {
                executions: execution + 1,
                previous_index: Some(index),
                previous_value,
                value: parts.value,
                result: parts.result,
            };
        }

        info!(executions = carry.executions, "ワークフローが完了しました");

        Ok(RunReport {
            workflow_name: self.name.clone(),
            result: carry.result,
            value: carry.value,
            step_count,
            executions: carry.executions,
            steps: records,
            total_duration: started.elapsed(),
        })
    }
}
