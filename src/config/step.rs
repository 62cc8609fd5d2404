//! ワークフローステップの定義
//!
//! # 責務
//!
//! TOML で宣言できるステップ（[`StepDefinition`]）と、その動作（[`StepAction`]）を提供する。
//! [`StepAction`] は [`Step`] を実装しており、そのままエンジンに追加できる。

use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Number, Value};
use tracing::debug;

use super::dto::{ActionKindDto, JumpTargetDto, SlotDto, WorkflowStepDto};
use crate::engine::step::{Completion, Step};
use crate::engine::StepContext;
use crate::error::{ConfigError, StepError};

/// ワークフローステップ（ドメインモデル）
///
/// ## DTO との違い
///
/// - [`WorkflowStepDto`](super::dto::WorkflowStepDto): TOML デシリアライズ専用
/// - [`StepDefinition`]: アクションに必要なフィールドが揃っていることを保証する
#[derive(Debug, Clone, PartialEq)]
pub struct StepDefinition {
    name: Option<String>,
    action: StepAction,
}

impl StepDefinition {
    pub fn new(name: Option<String>, action: StepAction) -> Self {
        Self { name, action }
    }

    /// ステップ名（ジャンプ先として参照される）
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn action(&self) -> &StepAction {
        &self.action
    }
}

/// ステップの動作
#[derive(Debug, Clone, PartialEq)]
pub enum StepAction {
    /// 空のステップ（何もせず次へ進む）
    Noop,
    /// `value` を設定
    SetValue(Value),
    /// `result` を設定（省略時は現在の `value`）
    SetResult(Option<Value>),
    /// `next_value` を設定（省略時は現在の `value`）
    PassNext(Option<Value>),
    /// 直前のステップが渡した値を `value` に取り込む
    TakePrevious,
    /// 数値の `value` に係数を掛けて格納
    Multiply { factor: f64, store: Slot },
    /// 永続状態のキーに書き込む
    SetState { key: String, value: Value },
    /// 待機してから完了（非同期ステップ）
    Sleep { millis: u64, resolve: Option<Value> },
    /// ジャンプ（`once` を指定すると、そのフラグが未設定の間だけジャンプする）
    Jump { to: JumpTarget, once: Option<String> },
    /// このステップで実行を終了
    Finish,
    /// ステップを失敗させる
    Fail(String),
}

/// 値の格納先
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Slot {
    Value,
    Result,
    Next,
}

/// ジャンプ先
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JumpTarget {
    First,
    Last,
    Index(usize),
    /// ステップ名（ワークフロー構築時にインデックスへ解決される）
    Step(String),
}

#[async_trait]
impl Step for StepAction {
    async fn run(&self, ctx: &mut StepContext) -> Result<Completion, StepError> {
        match self {
            StepAction::Noop => {}
            StepAction::SetValue(value) => ctx.set_value(value.clone()),
            StepAction::SetResult(value) => {
                let value = value.clone().unwrap_or_else(|| ctx.value().clone());
                ctx.set_result(value);
            }
            StepAction::PassNext(value) => {
                let value = value.clone().unwrap_or_else(|| ctx.value().clone());
                ctx.set_next_value(value);
            }
            StepAction::TakePrevious => {
                let previous = ctx.previous_value().clone();
                ctx.set_value(previous);
            }
            StepAction::Multiply { factor, store } => {
                let product = multiply(ctx.value(), *factor)?;
                match store {
                    Slot::Value => ctx.set_value(product),
                    Slot::Result => ctx.set_result(product),
                    Slot::Next => ctx.set_next_value(product),
                }
            }
            StepAction::SetState { key, value } => {
                ctx.update_state(|state| {
                    with_object(state, |map| map.insert(key.clone(), value.clone()))
                });
            }
            StepAction::Sleep { millis, resolve } => {
                tokio::time::sleep(Duration::from_millis(*millis)).await;
                return Ok(resolve.clone().map_or(Completion::Done, Completion::Resolved));
            }
            StepAction::Jump { to, once } => {
                if let Some(flag) = once {
                    let already_jumped = ctx.update_state(|state| {
                        with_object(state, |flags| {
                            let set = flags.get(flag).is_some_and(|v| !v.is_null());
                            if !set {
                                flags.insert(flag.clone(), Value::Bool(true));
                            }
                            set
                        })
                    });
                    if already_jumped {
                        debug!(index = ctx.index(), flag = %flag, "ジャンプ済みのためスキップします");
                        return Ok(Completion::Done);
                    }
                }
                match to {
                    JumpTarget::First => ctx.goto_first(),
                    JumpTarget::Last => ctx.goto_last(),
                    JumpTarget::Index(index) => ctx.goto(*index)?,
                    JumpTarget::Step(name) => {
                        return Err(StepError::msg(format!("未解決のジャンプ先です: {name}")));
                    }
                }
            }
            StepAction::Finish => ctx.finish(),
            StepAction::Fail(message) => return Err(StepError::msg(message.clone())),
        }
        Ok(Completion::Done)
    }
}

/// 状態をオブジェクトとして操作する（オブジェクトでなければ空のオブジェクトに置き換える）
fn with_object<R>(state: &mut Value, f: impl FnOnce(&mut Map<String, Value>) -> R) -> R {
    let mut map = match std::mem::take(state) {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    let output = f(&mut map);
    *state = Value::Object(map);
    output
}

/// 整数同士なら整数のまま、それ以外は浮動小数点で掛け算する
fn multiply(value: &Value, factor: f64) -> Result<Value, StepError> {
    let Value::Number(number) = value else {
        return Err(StepError::msg(format!("value が数値ではありません: {value}")));
    };

    if let Some(int) = number.as_i64() {
        if factor.fract() == 0.0 && factor.abs() < i64::MAX as f64 {
            if let Some(product) = int.checked_mul(factor as i64) {
                return Ok(Value::from(product));
            }
        }
    }

    let product = number.as_f64().unwrap_or_default() * factor;
    Number::from_f64(product)
        .map(Value::Number)
        .ok_or_else(|| StepError::msg(format!("計算結果が有限の数値ではありません: {product}")))
}

/// ジャンプ先の指定として予約されたステップ名
const RESERVED_STEP_NAMES: [&str; 2] = ["first", "last"];

/// DTO からドメインモデルへの変換（読み込み方向）
///
/// アクションに必要なフィールドが欠けている場合は [`ConfigError::Validation`] を返します。
impl TryFrom<WorkflowStepDto> for StepDefinition {
    type Error = ConfigError;

    fn try_from(dto: WorkflowStepDto) -> Result<Self, Self::Error> {
        if let Some(name) = &dto.name {
            if name.trim().is_empty() {
                return Err(ConfigError::Validation("ステップ名が空です".to_string()));
            }
            // ジャンプ先の "first" / "last" と区別できなくなる
            if RESERVED_STEP_NAMES.contains(&name.as_str()) {
                return Err(ConfigError::Validation(format!(
                    "ステップ名 '{name}' は予約されています"
                )));
            }
        }
        let label = dto.name.clone().unwrap_or_else(|| "(無名)".to_string());
        let missing = |field: &str| {
            ConfigError::Validation(format!(
                "ステップ '{label}' の {:?} には `{field}` が必要です",
                dto.action
            ))
        };

        let action = match dto.action {
            ActionKindDto::Noop => StepAction::Noop,
            ActionKindDto::SetValue => {
                StepAction::SetValue(dto.value.clone().ok_or_else(|| missing("value"))?)
            }
            ActionKindDto::SetResult => StepAction::SetResult(dto.value.clone()),
            ActionKindDto::PassNext => StepAction::PassNext(dto.value.clone()),
            ActionKindDto::TakePrevious => StepAction::TakePrevious,
            ActionKindDto::Multiply => {
                let factor = dto.factor.ok_or_else(|| missing("factor"))?;
                if !factor.is_finite() {
                    return Err(ConfigError::Validation(format!(
                        "ステップ '{label}' の factor が有限の数値ではありません"
                    )));
                }
                let store = match dto.store.unwrap_or(SlotDto::Value) {
                    SlotDto::Value => Slot::Value,
                    SlotDto::Result => Slot::Result,
                    SlotDto::Next => Slot::Next,
                };
                StepAction::Multiply { factor, store }
            }
            ActionKindDto::SetState => StepAction::SetState {
                key: dto.key.clone().ok_or_else(|| missing("key"))?,
                value: dto.value.clone().ok_or_else(|| missing("value"))?,
            },
            ActionKindDto::Sleep => StepAction::Sleep {
                millis: dto.millis.ok_or_else(|| missing("millis"))?,
                resolve: dto.resolve.clone(),
            },
            ActionKindDto::Jump => {
                let to = match dto.to.clone().ok_or_else(|| missing("to"))? {
                    JumpTargetDto::Index(index) => JumpTarget::Index(index),
                    JumpTargetDto::Label(label) => match label.as_str() {
                        "first" => JumpTarget::First,
                        "last" => JumpTarget::Last,
                        _ => JumpTarget::Step(label),
                    },
                };
                StepAction::Jump {
                    to,
                    once: dto.once.clone(),
                }
            }
            ActionKindDto::Finish => StepAction::Finish,
            ActionKindDto::Fail => {
                StepAction::Fail(dto.message.clone().ok_or_else(|| missing("message"))?)
            }
        };

        Ok(Self {
            name: dto.name,
            action,
        })
    }
}

/// ドメインモデルから DTO への変換（書き込み方向）
///
/// バリデーション済みのドメインモデルから DTO を生成するため、
/// この変換は失敗しません（`From` トレイトを使用）。
impl From<StepDefinition> for WorkflowStepDto {
    fn from(step: StepDefinition) -> Self {
        let mut dto = WorkflowStepDto {
            name: step.name,
            ..Default::default()
        };

        dto.action = match step.action {
            StepAction::Noop => ActionKindDto::Noop,
            StepAction::SetValue(value) => {
                dto.value = Some(value);
                ActionKindDto::SetValue
            }
            StepAction::SetResult(value) => {
                dto.value = value;
                ActionKindDto::SetResult
            }
            StepAction::PassNext(value) => {
                dto.value = value;
                ActionKindDto::PassNext
            }
            StepAction::TakePrevious => ActionKindDto::TakePrevious,
            StepAction::Multiply { factor, store } => {
                dto.factor = Some(factor);
                dto.store = Some(match store {
                    Slot::Value => SlotDto::Value,
                    Slot::Result => SlotDto::Result,
                    Slot::Next => SlotDto::Next,
                });
                ActionKindDto::Multiply
            }
            StepAction::SetState { key, value } => {
                dto.key = Some(key);
                dto.value = Some(value);
                ActionKindDto::SetState
            }
            StepAction::Sleep { millis, resolve } => {
                dto.millis = Some(millis);
                dto.resolve = resolve;
                ActionKindDto::Sleep
            }
            StepAction::Jump { to, once } => {
                dto.to = Some(match to {
                    JumpTarget::First => JumpTargetDto::Label("first".to_string()),
                    JumpTarget::Last => JumpTargetDto::Label("last".to_string()),
                    JumpTarget::Index(index) => JumpTargetDto::Index(index),
                    JumpTarget::Step(name) => JumpTargetDto::Label(name),
                });
                dto.once = once;
                ActionKindDto::Jump
            }
            StepAction::Finish => ActionKindDto::Finish,
            StepAction::Fail(message) => {
                dto.message = Some(message);
                ActionKindDto::Fail
            }
        };

        dto
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::StateHandle;
    use serde_json::json;

    fn dto(action: ActionKindDto) -> WorkflowStepDto {
        WorkflowStepDto {
            action,
            ..Default::default()
        }
    }

    async fn run_action(action: StepAction, ctx: &mut StepContext) -> Result<Completion, StepError> {
        action.run(ctx).await
    }

    #[test]
    fn test_missing_required_field() {
        let err = StepDefinition::try_from(dto(ActionKindDto::SetValue)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("`value`")));

        let err = StepDefinition::try_from(dto(ActionKindDto::Sleep)).unwrap_err();
        assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("`millis`")));
    }

    #[test]
    fn test_empty_step_name_is_rejected() {
        let mut step = dto(ActionKindDto::Finish);
        step.name = Some("  ".to_string());
        assert!(StepDefinition::try_from(step).is_err());
    }

    #[test]
    fn test_reserved_step_names_are_rejected() {
        for reserved in ["first", "last"] {
            let mut step = dto(ActionKindDto::SetResult);
            step.name = Some(reserved.to_string());
            let err = StepDefinition::try_from(step).unwrap_err();
            assert!(matches!(err, ConfigError::Validation(msg) if msg.contains("予約")));
        }

        let mut step = dto(ActionKindDto::SetResult);
        step.name = Some("lastly".to_string());
        assert!(StepDefinition::try_from(step).is_ok());
    }

    #[test]
    fn test_non_finite_factor_is_rejected() {
        let mut step = dto(ActionKindDto::Multiply);
        step.factor = Some(f64::INFINITY);
        assert!(StepDefinition::try_from(step).is_err());
    }

    #[test]
    fn test_jump_labels() {
        let mut step = dto(ActionKindDto::Jump);
        step.to = Some(JumpTargetDto::Label("last".to_string()));
        let def = StepDefinition::try_from(step).unwrap();
        assert_eq!(
            def.action(),
            &StepAction::Jump {
                to: JumpTarget::Last,
                once: None
            }
        );

        let mut step = dto(ActionKindDto::Jump);
        step.to = Some(JumpTargetDto::Label("review".to_string()));
        let def = StepDefinition::try_from(step).unwrap();
        assert!(matches!(
            def.action(),
            StepAction::Jump { to: JumpTarget::Step(name), .. } if name == "review"
        ));
    }

    #[test]
    fn test_dto_conversion_keeps_fields() {
        let def = StepDefinition::new(
            Some("scale".to_string()),
            StepAction::Multiply {
                factor: 2.5,
                store: Slot::Next,
            },
        );
        let dto = WorkflowStepDto::from(def.clone());

        assert_eq!(dto.action, ActionKindDto::Multiply);
        assert_eq!(dto.factor, Some(2.5));
        assert_eq!(dto.store, Some(SlotDto::Next));
        assert_eq!(StepDefinition::try_from(dto).unwrap(), def);
    }

    #[test]
    fn test_multiply() {
        assert_eq!(multiply(&json!(3), 10.0).unwrap(), json!(30));
        assert_eq!(multiply(&json!(3), 0.5).unwrap(), json!(1.5));
        assert_eq!(multiply(&json!(1.5), 2.0).unwrap(), json!(3.0));
        assert!(multiply(&json!("3"), 2.0).is_err());
        // 整数のオーバーフローは浮動小数点にフォールバック
        assert!(multiply(&json!(i64::MAX), 2.0).unwrap().is_f64());
        // i64 に収まらない係数も浮動小数点で計算する
        let big = 2f64.powi(63);
        assert_eq!(multiply(&json!(1), big).unwrap(), json!(big));
        assert!(multiply(&json!(1), -big).unwrap().is_f64());
    }

    #[test]
    fn test_with_object_keeps_existing_keys() {
        let mut state = json!({ "a": 1 });
        let previous = with_object(&mut state, |map| map.insert("b".to_string(), json!(2)));
        assert_eq!(previous, None);
        assert_eq!(state, json!({ "a": 1, "b": 2 }));

        let mut state = json!([1, 2]);
        let len = with_object(&mut state, |map| map.len());
        assert_eq!(len, 0);
        assert_eq!(state, json!({}));
    }

    #[tokio::test]
    async fn test_value_actions() {
        let mut ctx = StepContext::detached(0, 3, json!(4), StateHandle::default());

        run_action(
            StepAction::Multiply {
                factor: 10.0,
                store: Slot::Result,
            },
            &mut ctx,
        )
        .await
        .unwrap();
        assert_eq!(ctx.result(), &json!(40));

        run_action(StepAction::PassNext(None), &mut ctx).await.unwrap();
        assert_eq!(ctx.next_value(), Some(&json!(4)));

        run_action(StepAction::SetValue(json!("x")), &mut ctx).await.unwrap();
        run_action(StepAction::SetResult(None), &mut ctx).await.unwrap();
        assert_eq!(ctx.result(), &json!("x"));
    }

    #[tokio::test]
    async fn test_set_state_replaces_non_object() {
        let state = StateHandle::new(json!(1));
        let mut ctx = StepContext::detached(0, 1, Value::Null, state.clone());

        run_action(
            StepAction::SetState {
                key: "k".to_string(),
                value: json!("v"),
            },
            &mut ctx,
        )
        .await
        .unwrap();

        assert_eq!(state.get(), json!({ "k": "v" }));
    }

    #[tokio::test]
    async fn test_jump_once() {
        let state = StateHandle::default();
        let jump = StepAction::Jump {
            to: JumpTarget::First,
            once: Some("looped".to_string()),
        };

        let mut ctx = StepContext::detached(1, 2, Value::Null, state.clone());
        run_action(jump.clone(), &mut ctx).await.unwrap();
        assert_eq!(ctx.next_index(), 0);
        assert_eq!(state.get(), json!({ "looped": true }));

        let mut ctx = StepContext::detached(1, 2, Value::Null, state.clone());
        run_action(jump, &mut ctx).await.unwrap();
        assert_eq!(ctx.next_index(), 2);
    }

    #[tokio::test]
    async fn test_sleep_resolves() {
        let mut ctx = StepContext::detached(0, 1, Value::Null, StateHandle::default());
        let completion = run_action(
            StepAction::Sleep {
                millis: 1,
                resolve: Some(json!("woke")),
            },
            &mut ctx,
        )
        .await
        .unwrap();
        assert_eq!(completion, Completion::Resolved(json!("woke")));
    }

    #[tokio::test]
    async fn test_fail_action() {
        let mut ctx = StepContext::detached(0, 1, Value::Null, StateHandle::default());
        let err = run_action(StepAction::Fail("stop".to_string()), &mut ctx)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "stop");
    }
}
