//! 宣言的なワークフロー定義
//!
//! # 責務
//!
//! - TOML で書かれたワークフロー定義の読み込みと書き出し
//! - 定義のバリデーション（必須フィールド、ステップ名、ジャンプ先）
//! - 定義から実行可能な [`Workflow`](crate::engine::Workflow) の構築
//!
//! # モジュール構成
//!
//! - `dto` - TOML デシリアライズ専用の DTO（非公開）
//! - [`step`][]: ステップ定義と組み込みアクション
//! - [`workflow`][]: ワークフロー定義
//!
//! # 使用例
//!
//! ```rust,no_run
//! use stepchain::config::WorkflowDefinition;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let definition = WorkflowDefinition::from_file("workflows/example.toml")?;
//!     let report = definition.run().await?;
//!
//!     println!("Result: {}", report.result);
//!     Ok(())
//! }
//! ```

mod dto;
pub mod step;
pub mod workflow;

// 公開APIの再エクスポート
pub use step::{JumpTarget, Slot, StepAction, StepDefinition};
pub use workflow::WorkflowDefinition;
