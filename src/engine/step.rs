//! ステップの共通インターフェース定義
//!
//! # 責務
//!
//! - ワークフローを構成するステップの共通トレイト [`Step`] を定義
//! - ステップの完了の仕方を表す [`Completion`] を提供
//! - クロージャからステップを作るアダプター（[`from_fn`] / [`from_async`]）
//!
//! # 同期ステップと非同期ステップ
//!
//! 同期クロージャは常に [`Completion::Done`] で完了します。
//! 非同期クロージャは、値を明示して完了（[`Completion::Resolved`]）するか、
//! 値なしで完了（[`Completion::Done`]）するかを選べます。
//!
//! ```rust
//! use stepchain::engine::step::{self, Completion};
//! use stepchain::engine::Workflow;
//! use serde_json::json;
//!
//! let mut workflow = Workflow::new();
//! workflow
//!     .append(step::from_fn(|ctx| {
//!         ctx.set_value(json!(1));
//!         Ok(())
//!     }))
//!     .append(step::from_async(|ctx| {
//!         Box::pin(async move {
//!             ctx.set_result(ctx.value().clone());
//!             Ok(Completion::Resolved(json!("handed over")))
//!         })
//!     }));
//! ```

use std::future::Future;
use std::pin::Pin;

use async_trait::async_trait;
use serde_json::Value;

use super::context::StepContext;
use crate::error::StepError;

/// 非同期ステップが返す Future
pub type StepFuture<'a> = Pin<Box<dyn Future<Output = Result<Completion, StepError>> + Send + 'a>>;

/// ステップの完了の仕方
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    /// 値を明示せずに完了
    ///
    /// 次のステップの `previous_value` には `next_value`（未設定なら `Null`）が渡ります。
    Done,

    /// 値を明示して完了
    ///
    /// この値が次のステップの `previous_value` になります。`Null` を明示した場合も同様です。
    Resolved(Value),
}

/// ワークフローのステップ
///
/// # 実装要件
///
/// - `Send + Sync`: ワークフローは複数の実行から共有される
/// - 非同期実行対応（`async_trait`を使用）
///
/// エラーを返すと実行全体がその場で失敗し、以降のステップは実行されません。
#[async_trait]
pub trait Step: Send + Sync {
    /// ステップを実行する
    async fn run(&self, ctx: &mut StepContext) -> Result<Completion, StepError>;
}

/// 同期クロージャによるステップ
pub struct FnStep<F> {
    f: F,
}

#[async_trait]
impl<F> Step for FnStep<F>
where
    F: Fn(&mut StepContext) -> Result<(), StepError> + Send + Sync,
{
    async fn run(&self, ctx: &mut StepContext) -> Result<Completion, StepError> {
        (self.f)(ctx)?;
        Ok(Completion::Done)
    }
}

/// 非同期クロージャによるステップ
pub struct AsyncFnStep<F> {
    f: F,
}

#[async_trait]
impl<F> Step for AsyncFnStep<F>
where
    F: for<'a> Fn(&'a mut StepContext) -> StepFuture<'a> + Send + Sync,
{
    async fn run(&self, ctx: &mut StepContext) -> Result<Completion, StepError> {
        (self.f)(ctx).await
    }
}

/// 同期クロージャからステップを生成
pub fn from_fn<F>(f: F) -> FnStep<F>
where
    F: Fn(&mut StepContext) -> Result<(), StepError> + Send + Sync,
{
    FnStep { f }
}

/// 非同期クロージャからステップを生成
///
/// クロージャは `Box::pin(async move { ... })` を返します。
pub fn from_async<F>(f: F) -> AsyncFnStep<F>
where
    F: for<'a> Fn(&'a mut StepContext) -> StepFuture<'a> + Send + Sync,
{
    AsyncFnStep { f }
}
