//! A live document wired to the expression-language adapter, end to end.

use std::sync::Arc;
use std::time::Duration;

use runbook_core::doc::{BlockKind, InMemoryDocument, Transaction};
use runbook_core::executive::ExecutiveManager;
use runbook_core::state::ScriptRuntimeState;
use runbook_eval::EvalRuntime;

fn document(blocks: &[(BlockKind, &str)]) -> InMemoryDocument {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    InMemoryDocument::from_blocks(blocks.iter().map(|(k, t)| (*k, t.to_string())))
}

async fn manager_for(blocks: &[(BlockKind, &str)]) -> ExecutiveManager {
    let manager = ExecutiveManager::new(document(blocks));
    manager.register_runtime(Arc::new(EvalRuntime::new())).await;
    manager
}

async fn result_text(manager: &ExecutiveManager, index: usize) -> Option<String> {
    let regions = manager.regions().await;
    let snapshot = manager.snapshot().await;
    regions
        .regions
        .get(index)?
        .result
        .and_then(|r| snapshot.block_at(r.pos).map(|b| b.text.clone()))
}

async fn wait_for_result(manager: &ExecutiveManager, index: usize, expected: &str) {
    for _ in 0..2000 {
        if result_text(manager, index).await.as_deref() == Some(expected) {
            return;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!(
        "timed out waiting for result {expected:?}, last saw {:?}",
        result_text(manager, index).await
    );
}

#[tokio::test(start_paused = true)]
async fn test_arithmetic_block() {
    let manager = manager_for(&[
        (BlockKind::Text, "The sum of one and one:"),
        (BlockKind::Code, "1+1"),
    ])
    .await;

    wait_for_result(&manager, 0, "2").await;

    let state = manager.document_state();
    assert_eq!(state.code_block_states.len(), 1);
    assert_eq!(
        state.code_block_states[0].as_ref().map(|s| s.phase()),
        Some("succeeded")
    );
}

#[tokio::test(start_paused = true)]
async fn test_later_blocks_see_earlier_bindings() {
    let manager = manager_for(&[
        (BlockKind::Code, "x = 21"),
        (BlockKind::Code, "x * 2"),
    ])
    .await;

    // an assignment-only block has no expression value
    wait_for_result(&manager, 0, "null").await;
    wait_for_result(&manager, 1, "42").await;

    let state = manager.document_state();
    assert_eq!(state.global_variables, ["x"]);
}

#[tokio::test(start_paused = true)]
async fn test_thrown_error_is_rendered() {
    let manager = manager_for(&[(BlockKind::Code, "throw 'x'")]).await;

    for _ in 0..2000 {
        if let Some(ScriptRuntimeState::Failed { error, .. }) =
            manager.document_state().code_block_states.first().cloned().flatten()
        {
            assert!(error.message.contains('x'));
            break;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }

    wait_for_result(&manager, 0, "thrown: x").await;
}

#[tokio::test(start_paused = true)]
async fn test_unparseable_block_shows_placeholder() {
    let manager = manager_for(&[(BlockKind::Code, "1 +* 2")]).await;
    wait_for_result(&manager, 0, "No AST").await;

    let state = manager.document_state();
    assert_eq!(
        state.code_block_states[0].as_ref().map(|s| s.phase()),
        Some("unknown")
    );
}

#[tokio::test(start_paused = true)]
async fn test_editing_code_recomputes_result() {
    let manager = manager_for(&[(BlockKind::Code, "2+3")]).await;
    wait_for_result(&manager, 0, "5").await;

    // replace the code content; the result region follows
    let code = manager.regions().await.regions[0].code;
    let mut tr = Transaction::new();
    tr.replace(code.pos + 1, code.end() - 1, "2*3");
    manager.dispatch(tr).await.unwrap();

    wait_for_result(&manager, 0, "6").await;
}

#[tokio::test(start_paused = true)]
async fn test_print_output_lands_in_logs() {
    let manager = manager_for(&[(BlockKind::Code, "print('hello')\n5")]).await;
    wait_for_result(&manager, 0, "5").await;

    let state = manager.document_state();
    let logs = state.code_block_states[0]
        .as_ref()
        .and_then(ScriptRuntimeState::logs)
        .unwrap();
    assert_eq!(logs.len(), 1);
    assert_eq!(logs[0].text, "hello");
}

#[tokio::test(start_paused = true)]
async fn test_falsy_and_structured_results() {
    let manager = manager_for(&[
        (BlockKind::Code, "false"),
        (BlockKind::Code, "[1, 2]"),
    ])
    .await;

    wait_for_result(&manager, 0, "boolean false").await;
    wait_for_result(&manager, 1, "[\n  1,\n  2\n]").await;
}
