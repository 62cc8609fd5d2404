//! ステップ実行コンテキストの管理
//!
//! # 責務
//!
//! - ステップ1回分の位置情報（インデックス、実行回数、先頭/末尾フラグ）を提供
//! - ステップ間で受け渡す値（`value` / `result` / `next_value`）を保持
//! - 次に実行するステップを変更する制御操作（`goto` / `goto_first` / `goto_last` / `finish`）
//! - ワークフローが所有する永続状態へのアクセサ（[`StateHandle`]）
//!
//! # 主要な型
//!
//! - [`StepContext`][]: ステップ呼び出しごとに新しく生成されるコンテキスト
//! - [`StateHandle`][]: ワークフローの永続状態を共有するハンドル
//!
//! # 使用例
//!
//! ```rust
//! use stepchain::engine::context::{StateHandle, StepContext};
//! use serde_json::json;
//!
//! let state = StateHandle::default();
//! let mut ctx = StepContext::detached(0, 3, json!(1), state.clone());
//!
//! ctx.set_result(json!("ok"));
//! ctx.set_state(json!({ "seen": true }));
//! ctx.goto_last();
//!
//! assert_eq!(ctx.next_index(), 2);
//! assert_eq!(state.get(), json!({ "seen": true }));
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;

use crate::error::JumpError;

/// ワークフローの永続状態へのハンドル
///
/// ワークフロー本体と、実行中の各 [`StepContext`] が同じ状態を共有します。
/// 値のコピーではなく別名なので、書き込みは即座にワークフロー側へ反映されます。
///
/// ロックは各メソッドの内部でのみ取得し、呼び出し元へは返しません。
#[derive(Debug, Clone, Default)]
pub struct StateHandle {
    inner: Arc<Mutex<Value>>,
}

impl StateHandle {
    /// 初期値を指定してハンドルを生成
    pub fn new(value: Value) -> Self {
        Self {
            inner: Arc::new(Mutex::new(value)),
        }
    }

    /// 現在の状態を取得（コピー）
    pub fn get(&self) -> Value {
        self.lock().clone()
    }

    /// 状態を置き換える
    pub fn set(&self, value: Value) {
        *self.lock() = value;
    }

    /// 状態をその場で更新
    ///
    /// クロージャの戻り値をそのまま返します。
    ///
    /// ```rust
    /// use stepchain::engine::context::StateHandle;
    /// use serde_json::json;
    ///
    /// let state = StateHandle::new(json!(1));
    /// let doubled = state.update(|v| {
    ///     *v = json!(v.as_i64().unwrap_or(0) * 2);
    ///     v.clone()
    /// });
    /// assert_eq!(doubled, json!(2));
    /// ```
    pub fn update<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        f(&mut self.lock())
    }

    /// 状態を取り出し、`Null` に戻す
    pub fn take(&self) -> Value {
        self.lock().take()
    }

    /// 同じ状態を指しているか
    pub fn ptr_eq(&self, other: &StateHandle) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    // 状態は常に丸ごと置き換わるので、ポイズンされても中身は壊れていない
    fn lock(&self) -> std::sync::MutexGuard<'_, Value> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// ステップ実行コンテキスト
///
/// `start()` の中でステップを1回呼び出すたびに新しく生成され、そのステップの
/// 完了とともに破棄されます。同時に生存するコンテキストは常に1つだけです。
///
/// # フィールド
///
/// - `step_count`: ワークフローのステップ総数
/// - `executions`: このステップより前に実行されたステップ数（繰り返しも数える）
/// - `index`: このステップのインデックス（0始まり、ステップ中は不変）
/// - `previous_index` / `previous_value`: 直前に実行されたステップの情報
/// - `value`: 次のステップへ引き継ぐ値
/// - `result`: 実行全体の最終結果
/// - `next_value`: 値を明示せずに完了した場合に `previous_value` として渡す値
/// - `next_index`: 次に実行するステップ（制御操作で変更される）
/// - `state`: ワークフローの永続状態
#[derive(Debug)]
pub struct StepContext {
    step_count: usize,
    executions: usize,
    index: usize,
    previous_index: Option<usize>,
    previous_value: Value,

    value: Value,
    result: Value,
    next_value: Option<Value>,

    next_index: usize,
    jump_error: Option<JumpError>,

    state: StateHandle,
}

/// ステップ完了後にエグゼキューターが回収する値
pub(crate) struct ContextParts {
    pub(crate) value: Value,
    pub(crate) result: Value,
    pub(crate) next_value: Option<Value>,
    pub(crate) next_index: usize,
    pub(crate) jump_error: Option<JumpError>,
}

/// 直前のステップから引き継ぐ値
pub(crate) struct Carry {
    pub(crate) executions: usize,
    pub(crate) previous_index: Option<usize>,
    pub(crate) previous_value: Value,
    pub(crate) value: Value,
    pub(crate) result: Value,
}

impl StepContext {
    pub(crate) fn new(index: usize, step_count: usize, carry: Carry, state: StateHandle) -> Self {
        Self {
            step_count,
            executions: carry.executions,
            index,
            previous_index: carry.previous_index,
            previous_value: carry.previous_value,
            value: carry.value,
            result: carry.result,
            next_value: None,
            next_index: index + 1,
            jump_error: None,
            state,
        }
    }

    /// ワークフローに属さない単独のコンテキストを生成
    ///
    /// ステップ単体のテストや、ステップを直接呼び出す場合に使用します。
    /// 直前のステップは存在せず、`executions` は 0 になります。
    pub fn detached(index: usize, step_count: usize, value: Value, state: StateHandle) -> Self {
        let carry = Carry {
            executions: 0,
            previous_index: None,
            previous_value: Value::Null,
            value,
            result: Value::Null,
        };
        Self::new(index, step_count, carry, state)
    }

    pub(crate) fn into_parts(self) -> ContextParts {
        ContextParts {
            value: self.value,
            result: self.result,
            next_value: self.next_value,
            next_index: self.next_index,
            jump_error: self.jump_error,
        }
    }

    /// ステップ総数
    pub fn step_count(&self) -> usize {
        self.step_count
    }

    /// このステップより前に実行されたステップ数
    pub fn executions(&self) -> usize {
        self.executions
    }

    /// このステップのインデックス
    pub fn index(&self) -> usize {
        self.index
    }

    /// 先頭のステップか
    pub fn is_first(&self) -> bool {
        self.index == 0
    }

    /// 末尾のステップか
    pub fn is_last(&self) -> bool {
        self.index + 1 == self.step_count
    }

    /// 先頭でも末尾でもないか
    pub fn is_between(&self) -> bool {
        !self.is_first() && !self.is_last()
    }

    /// 直前に実行されたステップのインデックス
    pub fn previous_index(&self) -> Option<usize> {
        self.previous_index
    }

    /// 直前のステップが渡した値（なければ `Null`）
    pub fn previous_value(&self) -> &Value {
        &self.previous_value
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn value_mut(&mut self) -> &mut Value {
        &mut self.value
    }

    pub fn set_value(&mut self, value: Value) {
        self.value = value;
    }

    pub fn result(&self) -> &Value {
        &self.result
    }

    pub fn set_result(&mut self, result: Value) {
        self.result = result;
    }

    pub fn next_value(&self) -> Option<&Value> {
        self.next_value.as_ref()
    }

    /// 次のステップの `previous_value` になる値を設定
    ///
    /// ステップが [`Completion::Resolved`](super::step::Completion::Resolved) で
    /// 値を明示した場合は、そちらが優先されます。
    pub fn set_next_value(&mut self, value: Value) {
        self.next_value = Some(value);
    }

    /// 永続状態を取得（コピー）
    pub fn state(&self) -> Value {
        self.state.get()
    }

    /// 永続状態を置き換える
    pub fn set_state(&self, value: Value) {
        self.state.set(value);
    }

    /// 永続状態をその場で更新
    pub fn update_state<R>(&self, f: impl FnOnce(&mut Value) -> R) -> R {
        self.state.update(f)
    }

    /// 永続状態のハンドル
    ///
    /// 非同期ステップで `await` をまたいで状態を扱う場合に複製して使います。
    pub fn state_handle(&self) -> &StateHandle {
        &self.state
    }

    /// 次に実行されるステップのインデックス
    ///
    /// `step_count` と等しい場合、このステップで実行が終了します。
    pub fn next_index(&self) -> usize {
        self.next_index
    }

    /// 指定したステップへジャンプ
    ///
    /// `target` が範囲外の場合は [`JumpError`] を返します。エラーはコンテキストにも
    /// 記録されるため、ステップが戻り値を無視しても実行は失敗します。
    pub fn goto(&mut self, target: usize) -> Result<(), JumpError> {
        if target >= self.step_count {
            let err = JumpError {
                target,
                step_count: self.step_count,
            };
            self.jump_error.get_or_insert_with(|| err.clone());
            return Err(err);
        }
        self.next_index = target;
        Ok(())
    }

    /// 先頭のステップへジャンプ
    ///
    /// 実行回数などのカウンタはリセットされません。
    pub fn goto_first(&mut self) {
        self.next_index = 0;
    }

    /// 末尾のステップへジャンプ
    pub fn goto_last(&mut self) {
        self.next_index = self.step_count.saturating_sub(1);
    }

    /// このステップを最後に実行を終了
    pub fn finish(&mut self) {
        self.next_index = self.step_count;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn ctx_at(index: usize, step_count: usize) -> StepContext {
        StepContext::detached(index, step_count, Value::Null, StateHandle::default())
    }

    /// 生成直後は次のステップへ進む
    #[test]
    fn test_new_context_advances_by_default() {
        let ctx = ctx_at(1, 4);
        assert_eq!(ctx.index(), 1);
        assert_eq!(ctx.next_index(), 2);
        assert_eq!(ctx.executions(), 0);
        assert!(ctx.previous_index().is_none());
        assert_eq!(ctx.previous_value(), &Value::Null);
        assert!(ctx.next_value().is_none());
    }

    /// 位置フラグのテスト
    #[test]
    fn test_position_flags() {
        let first = ctx_at(0, 3);
        assert!(first.is_first());
        assert!(!first.is_last());
        assert!(!first.is_between());

        let middle = ctx_at(1, 3);
        assert!(!middle.is_first());
        assert!(!middle.is_last());
        assert!(middle.is_between());

        let last = ctx_at(2, 3);
        assert!(!last.is_first());
        assert!(last.is_last());
        assert!(!last.is_between());

        // ステップが1つなら先頭かつ末尾
        let only = ctx_at(0, 1);
        assert!(only.is_first());
        assert!(only.is_last());
        assert!(!only.is_between());
    }

    /// 各制御操作の着地点
    #[test]
    fn test_control_operations_landing_index() {
        let mut ctx = ctx_at(2, 5);

        ctx.goto(4).unwrap();
        assert_eq!(ctx.next_index(), 4);

        ctx.goto(0).unwrap();
        assert_eq!(ctx.next_index(), 0);

        ctx.goto_last();
        assert_eq!(ctx.next_index(), 4);

        ctx.goto_first();
        assert_eq!(ctx.next_index(), 0);

        ctx.finish();
        assert_eq!(ctx.next_index(), 5);

        // インデックス自体は変わらない
        assert_eq!(ctx.index(), 2);
    }

    /// 範囲外の goto はエラーを返し、記録される
    #[test]
    fn test_goto_out_of_range() {
        let mut ctx = ctx_at(0, 3);
        let err = ctx.goto(3).unwrap_err();
        assert_eq!(
            err,
            JumpError {
                target: 3,
                step_count: 3
            }
        );
        // 次のインデックスは変わらない
        assert_eq!(ctx.next_index(), 1);

        // 最初のエラーが保持される
        let _ = ctx.goto(10);
        let parts = ctx.into_parts();
        assert_eq!(parts.jump_error.map(|e| e.target), Some(3));
    }

    /// 値スロットの読み書き
    #[test]
    fn test_value_slots() {
        let mut ctx = StepContext::detached(0, 2, json!(1), StateHandle::default());
        assert_eq!(ctx.value(), &json!(1));

        *ctx.value_mut() = json!(2);
        ctx.set_result(json!("r"));
        ctx.set_next_value(json!([1, 2]));

        let parts = ctx.into_parts();
        assert_eq!(parts.value, json!(2));
        assert_eq!(parts.result, json!("r"));
        assert_eq!(parts.next_value, Some(json!([1, 2])));
    }

    /// 状態はワークフローと共有される
    #[test]
    fn test_state_is_live_alias() {
        let state = StateHandle::new(json!({ "count": 1 }));
        let ctx = StepContext::detached(0, 1, Value::Null, state.clone());

        ctx.update_state(|s| s["count"] = json!(2));
        assert_eq!(state.get(), json!({ "count": 2 }));

        state.set(json!("outside"));
        assert_eq!(ctx.state(), json!("outside"));
        assert!(ctx.state_handle().ptr_eq(&state));
    }

    #[test]
    fn test_state_handle_take() {
        let state = StateHandle::new(json!(5));
        assert_eq!(state.take(), json!(5));
        assert_eq!(state.get(), Value::Null);
    }
}
