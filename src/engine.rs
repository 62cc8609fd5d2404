//! ワークフロー実行エンジン
//!
//! # 責務
//!
//! - ステップ列を1つずつ順番に実行
//! - ステップ間の値（`value` / `result` / `previous_value`）の受け渡し
//! - ステップによる制御フローの変更（ジャンプ、繰り返し、早期終了）
//! - 実行をまたいで保持される永続状態の管理
//!
//! # モジュール構成
//!
//! - [`executor`][]: ワークフロー本体と実行ループ
//! - [`context`][]: ステップ実行コンテキスト（位置情報、値の受け渡し、制御操作）
//! - [`step`][]: ステップのトレイトとクロージャアダプター
//! - [`result`][]: 実行レポートと実行エラー
//!
//! # 使用例
//!
//! ```rust
//! use stepchain::engine::Workflow;
//! use serde_json::json;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let mut workflow = Workflow::named("repeat-once");
//!     workflow
//!         .append_fn(|ctx| {
//!             // 初回だけ先頭へ戻る
//!             if ctx.state().get("looped").is_none() {
//!                 ctx.set_state(json!({ "looped": true }));
//!                 ctx.goto_first();
//!             }
//!             Ok(())
//!         })
//!         .append_fn(|ctx| {
//!             ctx.set_result(json!("done"));
//!             Ok(())
//!         });
//!
//!     let report = workflow.run(json!(null)).await?;
//!
//!     println!("Result: {}", report.result);
//!     println!("Executions: {}", report.executions);
//!     for step in &report.steps {
//!         println!("  Step {} -> {:?}", step.index, step.next_index);
//!     }
//!
//!     Ok(())
//! }
//! ```

pub mod context;
pub mod executor;
pub mod result;
pub mod step;

// 公開APIの再エクスポート
pub use context::{StateHandle, StepContext};
pub use executor::Workflow;
pub use result::{ExecutionError, RunReport, StepRecord};
pub use step::{Completion, Step};
