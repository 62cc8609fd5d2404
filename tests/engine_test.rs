use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{Value, json};
use stepchain::engine::step::{self, Completion};
use stepchain::engine::{ExecutionError, StepContext, Workflow};
use stepchain::error::StepError;

/// 実行されたインデックスを記録するステップを追加する
fn traced(workflow: &mut Workflow, trace: &Arc<Mutex<Vec<usize>>>, f: fn(&mut StepContext)) {
    let trace = Arc::clone(trace);
    workflow.append_fn(move |ctx| {
        trace.lock().unwrap().push(ctx.index());
        f(ctx);
        Ok(())
    });
}

#[tokio::test]
async fn test_finish_at_each_position() {
    for stop_at in 0..4 {
        let trace = Arc::new(Mutex::new(Vec::new()));
        let mut workflow = Workflow::new();
        for i in 0..4 {
            let trace = Arc::clone(&trace);
            workflow.append_fn(move |ctx| {
                trace.lock().unwrap().push(ctx.index());
                if i == stop_at {
                    ctx.finish();
                }
                Ok(())
            });
        }

        workflow.start(Value::Null).await.unwrap();
        let expected: Vec<usize> = (0..=stop_at).collect();
        assert_eq!(*trace.lock().unwrap(), expected);
    }
}

#[tokio::test]
async fn test_backward_goto_with_guard() {
    let trace = Arc::new(Mutex::new(Vec::new()));
    let mut workflow = Workflow::new();
    traced(&mut workflow, &trace, |_| {});
    traced(&mut workflow, &trace, |_| {});
    traced(&mut workflow, &trace, |ctx| {
        // 1回だけステップ 1 へ戻る
        if ctx.executions() == 2 {
            ctx.goto(1).unwrap();
        }
    });

    let report = workflow.run(Value::Null).await.unwrap();

    assert_eq!(*trace.lock().unwrap(), vec![0, 1, 2, 1, 2]);
    assert_eq!(report.executions, 5);
}

#[tokio::test]
async fn test_mixed_sync_and_async_steps() {
    let mut workflow = Workflow::named("mixed");
    workflow
        .append_fn(|ctx| {
            ctx.set_value(json!(["a"]));
            Ok(())
        })
        .append_async(|ctx| {
            Box::pin(async move {
                tokio::time::sleep(Duration::from_millis(5)).await;
                if let Some(items) = ctx.value_mut().as_array_mut() {
                    items.push(json!("b"));
                }
                Ok(Completion::Resolved(json!("from async")))
            })
        })
        .append(step::from_fn(|ctx| {
            let joined = ctx
                .value()
                .as_array()
                .map(|items| items.iter().filter_map(Value::as_str).collect::<Vec<_>>().join(","))
                .unwrap_or_default();
            ctx.set_result(json!({ "joined": joined, "previous": ctx.previous_value() }));
            Ok(())
        }));

    let result = workflow.start(Value::Null).await.unwrap();

    assert_eq!(result, json!({ "joined": "a,b", "previous": "from async" }));
}

#[tokio::test]
async fn test_failure_discards_partial_result() {
    let mut workflow = Workflow::new();
    workflow
        .append_fn(|ctx| {
            ctx.set_result(json!("partial"));
            Ok(())
        })
        .append_async(|_ctx| Box::pin(async { Err(StepError::msg("upstream unavailable")) }));

    let err = workflow.start(Value::Null).await.unwrap_err();

    match err {
        ExecutionError::StepFailed { index, source } => {
            assert_eq!(index, 1);
            assert_eq!(source.to_string(), "upstream unavailable");
        }
        other => panic!("unexpected error: {other:?}"),
    }
}

#[tokio::test]
async fn test_state_written_in_one_step_is_read_in_later_step() {
    let mut workflow = Workflow::new();
    workflow
        .append_fn(|ctx| {
            ctx.set_state(json!({ "token": "abc" }));
            Ok(())
        })
        .append_async(|ctx| {
            let state = ctx.state_handle().clone();
            Box::pin(async move {
                tokio::task::yield_now().await;
                ctx.set_result(state.get()["token"].clone());
                Ok(Completion::Done)
            })
        });

    assert_eq!(workflow.start(Value::Null).await.unwrap(), json!("abc"));
    assert_eq!(workflow.state(), json!({ "token": "abc" }));
}

#[tokio::test]
async fn test_run_can_be_spawned() {
    let mut workflow = Workflow::new();
    workflow.append_async(|ctx| {
        Box::pin(async move {
            tokio::time::sleep(Duration::from_millis(1)).await;
            ctx.set_result(json!("spawned"));
            Ok(Completion::Done)
        })
    });

    let handle = tokio::spawn(async move { workflow.start(Value::Null).await });
    let result = handle.await.unwrap().unwrap();

    assert_eq!(result, json!("spawned"));
}
