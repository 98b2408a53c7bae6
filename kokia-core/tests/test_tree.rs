//! デバッガツリーの構築・変更検出・状態復元の統合テスト

mod common;

use common::{child, labels, pause, program, resume, settle, start};
use crossbeam_channel::bounded;
use kokia_core::errors::{
    MSG_EVALUATING, MSG_NOT_SUSPENDED, MSG_NO_FRAMES, MSG_NO_FRAME_SELECTED, MSG_RUNNING,
    MSG_THREAD_NOT_SUSPENDED,
};
use kokia_core::{
    CoreError, DebuggerContext, DebuggerTree, HeadlessView, Icon, NodeState, Rect, TreeConfig,
    TreeView, ViewKind,
};
use kokia_render::{ChildSpec, ChildrenSink, RenderConfig, Renderer, RendererRegistry};
use kokia_target::{
    EvalResult, EvaluateError, Lvalue, SuspendContext, Target, Value,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

const WAIT: Duration = Duration::from_secs(5);

fn variables_tree(
    session: &kokia_core::DebugSession,
    view: HeadlessView,
) -> DebuggerTree<HeadlessView> {
    DebuggerTree::new(ViewKind::Variables, session, view, TreeConfig::default())
}

#[test]
fn test_variables_view_lists_this_and_locals() {
    let program = program();
    let counter = program.counter;
    let items = program.items;
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);

    // 結果が届くまではプレースホルダだけが見える
    let root = tree.root().unwrap();
    assert_eq!(labels(&tree, root), vec![MSG_EVALUATING]);

    settle(&session, &mut tree);
    assert_eq!(
        labels(&tree, root),
        vec![
            format!("this = {{Counter@{}}}", counter),
            "step = 1".to_string(),
            format!("items = {{int[3]@{}}}", items),
            "ratio = NaN".to_string(),
        ]
    );

    // 最初の構築では何も変化していない
    for id in tree.children(root) {
        assert!(!tree.node(*id).unwrap().descriptor().is_dirty());
    }
    let this = child(&tree, root, "this");
    assert_eq!(tree.node(this).unwrap().icon(), Icon::This);
    assert!(!tree.node(this).unwrap().is_leaf());
}

#[test]
fn test_changed_values_are_dirty_after_resume() {
    let mut program = program();
    let frame = program.frame.clone();
    let counter = program.counter;
    program.target.on_resume(move |t| {
        t.set_local(&frame, "step", Value::Int(2)).unwrap();
        t.set_field(counter, "count", Value::Int(5)).unwrap();
    });
    let (mut session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let this = child(&tree, root, "this");
    tree.expand(this);
    settle(&session, &mut tree);
    assert_eq!(labels(&tree, this), vec!["count = 0", "label = \"clicks\""]);

    resume(&mut session);
    let ctx = pause(&mut session);
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let dirty = |tree: &DebuggerTree<HeadlessView>, parent, prefix: &str| {
        let id = child(tree, parent, prefix);
        tree.node(id).unwrap().descriptor().is_dirty()
    };
    assert!(dirty(&tree, root, "step = 2"));
    assert!(!dirty(&tree, root, "this"));
    assert!(!dirty(&tree, root, "items"));
    // NaN から NaN は変化なし
    assert!(!dirty(&tree, root, "ratio = NaN"));

    // 展開状態が復元され、フィールドの変化も検出される
    let this = child(&tree, root, "this");
    assert!(tree.view().is_expanded(this));
    assert!(dirty(&tree, this, "count = 5"));
    assert!(!dirty(&tree, this, "label"));
}

#[test]
fn test_root_message_when_not_suspended() {
    let program = program();
    let (mut session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());

    resume(&mut session);
    tree.rebuild(ctx);
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    assert_eq!(tree.node(root).unwrap().label(), MSG_RUNNING);
    assert!(tree.children(root).is_empty());

    tree.rebuild(DebuggerContext::empty());
    let root = tree.root().unwrap();
    assert_eq!(tree.node(root).unwrap().label(), MSG_NOT_SUSPENDED);
    assert_eq!(session.state_text(), MSG_RUNNING);
}

#[test]
fn test_no_frame_selected() {
    let program = program();
    let (session, _ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(DebuggerContext::from_suspend(SuspendContext::new(99, None)));
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    assert_eq!(labels(&tree, root), vec![MSG_NO_FRAME_SELECTED]);
}

#[test]
fn test_resume_cancels_pending_commands() {
    let program = program();
    let (mut session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    let step = child(&tree, root, "step");
    let this = child(&tree, root, "this");

    // マネージャスレッドを止めている間に要求を積み、その間に再開する
    let (release, gate) = bounded::<()>(0);
    session
        .manager()
        .schedule("gate", None, move |_| {
            let _ = gate.recv();
        })
        .unwrap();
    tree.calc_value(step);
    tree.expand(this);
    assert_eq!(labels(&tree, this), vec![MSG_EVALUATING]);

    session.resume().unwrap();
    release.send(()).unwrap();
    settle(&session, &mut tree);

    let step_node = tree.node(step).unwrap();
    assert_eq!(step_node.label(), "step");
    assert_eq!(step_node.state(), NodeState::Cleared);
    assert!(step_node.descriptor().value().is_none());

    let this_node = tree.node(this).unwrap();
    assert_eq!(this_node.state(), NodeState::Cleared);
    assert!(tree.children(this).is_empty());
}

#[test]
fn test_expanded_and_selected_state_is_restored() {
    let program = program();
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let this = child(&tree, root, "this");
    tree.expand(this);
    settle(&session, &mut tree);
    let count = child(&tree, this, "count");
    tree.select(count);
    assert!(!tree.is_restoring());

    tree.refresh();
    assert!(tree.is_restoring());
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let this = child(&tree, root, "this");
    assert!(tree.view().is_expanded(this));
    let count = child(&tree, this, "count");
    assert!(tree.view().is_selected(count));
    let step = child(&tree, root, "step");
    assert!(!tree.view().is_expanded(step));

    // ユーザー操作で復元は終わる
    tree.collapse(this);
    assert!(!tree.is_restoring());
}

#[test]
fn test_scroll_position_is_restored() {
    let program = program();
    let (session, ctx) = start(program.target, RendererRegistry::default());
    // 4行分の表示領域
    let mut tree = variables_tree(&session, HeadlessView::new(4));
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let items = child(&tree, root, "items");
    tree.expand(items);
    settle(&session, &mut tree);
    assert_eq!(tree.children(items).len(), 3);

    // items と 3 要素だけが完全に見える位置
    tree.view_mut().set_scroll(48);
    let last = child(&tree, items, "[2]");
    let expected = tree.view().node_bounds(last).unwrap();
    assert_eq!(expected, Rect::new(0, 96, 400, 16));

    tree.refresh();
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let items = child(&tree, root, "items");
    assert!(tree.view().is_expanded(items));
    assert_eq!(tree.view().last_scroll(), Some(expected));
    assert_eq!(tree.view().visible_rect().unwrap().y, 48);
}

#[test]
fn test_threads_view_pins_current_thread() {
    let mut program = program();
    let main_group = program.target.thread(program.zeta).unwrap().group;
    let daemon = program.target.add_thread("daemon", main_group);
    program.target.keep_running(daemon).unwrap();
    let (session, ctx) = start(program.target, RendererRegistry::default());

    let mut tree = DebuggerTree::new(
        ViewKind::Threads,
        &session,
        HeadlessView::default(),
        TreeConfig::default(),
    );
    tree.rebuild(ctx.clone());
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    assert_eq!(labels(&tree, root), vec!["group \"system\"", "group \"aaa\""]);
    let system = child(&tree, root, "group \"system\"");
    assert_eq!(tree.node(system).unwrap().icon(), Icon::ThreadGroup);
    tree.expand(system);
    settle(&session, &mut tree);
    let main = child(&tree, system, "group \"main\"");
    tree.expand(main);
    settle(&session, &mut tree);

    let threads = labels(&tree, main);
    assert_eq!(threads.len(), 3);
    assert!(threads[0].starts_with("\"zeta\"@"), "{:?}", threads);
    assert!(threads[0].ends_with("in group \"main\": RUNNING"));
    assert!(threads[1].starts_with("\"alpha\"@"));
    assert!(threads[2].starts_with("\"daemon\"@"));

    // 走り続けているスレッドは展開できない
    let daemon_node = tree.node(child(&tree, main, "\"daemon\"")).unwrap();
    assert!(daemon_node.is_leaf());
    assert_eq!(daemon_node.icon(), Icon::ThreadRunning);

    let zeta = child(&tree, main, "\"zeta\"");
    tree.expand(zeta);
    settle(&session, &mut tree);
    assert_eq!(labels(&tree, zeta), vec!["tick():12, Counter", "main():3, Counter"]);

    // 固定しない設定では名前順
    let config = TreeConfig {
        pin_current_thread: false,
        ..TreeConfig::default()
    };
    let mut unpinned = DebuggerTree::new(ViewKind::Threads, &session, HeadlessView::default(), config);
    unpinned.rebuild(ctx);
    settle(&session, &mut unpinned);
    let root = unpinned.root().unwrap();
    assert_eq!(labels(&unpinned, root), vec!["group \"aaa\"", "group \"system\""]);
}

#[test]
fn test_threads_view_without_groups() {
    let program = program();
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let config = TreeConfig {
        show_thread_groups: false,
        ..TreeConfig::default()
    };
    let mut tree = DebuggerTree::new(ViewKind::Threads, &session, HeadlessView::default(), config);
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let threads = labels(&tree, root);
    assert_eq!(threads.len(), 2);
    assert!(threads[0].starts_with("\"zeta\"@"));
    assert!(threads[1].starts_with("\"alpha\"@"));
}

#[test]
fn test_thread_children_messages() {
    let mut program = program();
    let main_group = program.target.thread(program.zeta).unwrap().group;
    let idle = program.target.add_thread("idle", main_group);
    program
        .target
        .fail_frames(program.alpha, "connection reset")
        .unwrap();
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let config = TreeConfig {
        show_thread_groups: false,
        ..TreeConfig::default()
    };
    let mut tree = DebuggerTree::new(ViewKind::Threads, &session, HeadlessView::default(), config);
    tree.rebuild(ctx);
    settle(&session, &mut tree);
    let root = tree.root().unwrap();

    let alpha = child(&tree, root, "\"alpha\"");
    tree.expand(alpha);
    let idle_node = child(&tree, root, &format!("\"idle\"@{}", idle));
    tree.expand(idle_node);
    settle(&session, &mut tree);
    assert_eq!(labels(&tree, alpha), vec!["protocol error: connection reset"]);
    assert_eq!(
        tree.node(tree.children(alpha)[0]).unwrap().icon(),
        Icon::Error
    );
    assert_eq!(labels(&tree, idle_node), vec![MSG_NO_FRAMES]);

    // セッションを通さずに再開させると、展開時にはフレームを列挙できない
    let zeta = child(&tree, root, "\"zeta\"");
    session
        .manager()
        .invoke_and_wait(None, WAIT, |env| env.target_mut().resume())
        .unwrap()
        .unwrap();
    tree.expand(zeta);
    settle(&session, &mut tree);
    assert_eq!(labels(&tree, zeta), vec![MSG_THREAD_NOT_SUSPENDED]);
}

#[test]
fn test_locals_failure_keeps_this() {
    let mut program = program();
    program
        .target
        .fail_locals(&program.frame, "absent information")
        .unwrap();
    let counter = program.counter;
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    assert_eq!(
        labels(&tree, root),
        vec![
            format!("this = {{Counter@{}}}", counter),
            "protocol error: absent information".to_string(),
        ]
    );
}

#[test]
fn test_array_children_arrive_in_chunks() {
    let program = program();
    let config = RenderConfig {
        array_chunk_size: 2,
        ..RenderConfig::default()
    };
    let (session, ctx) = start(program.target, RendererRegistry::new(&config));
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let items = child(&tree, root, "items");
    tree.expand(items);
    settle(&session, &mut tree);
    // 2つ目のまとまりは置き換えずに追加される
    assert_eq!(labels(&tree, items), vec!["[0] = 1", "[1] = 2", "[2] = 3"]);
    assert_eq!(tree.node(items).unwrap().state(), NodeState::Built);
}

#[test]
fn test_long_array_is_truncated() {
    let program = program();
    let config = RenderConfig {
        max_array_elements: 2,
        ..RenderConfig::default()
    };
    let (session, ctx) = start(program.target, RendererRegistry::new(&config));
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let items = child(&tree, root, "items");
    tree.expand(items);
    settle(&session, &mut tree);
    assert_eq!(
        labels(&tree, items),
        vec!["[0] = 1", "[1] = 2", "... 1 more elements"]
    );
}

#[test]
fn test_collected_array_is_reported() {
    let mut program = program();
    let items = program.items;
    let counter = program.counter;
    program.target.on_resume(move |t| {
        t.collect(items);
        t.collect(counter);
    });
    let (mut session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    let node = child(&tree, root, "items");
    tree.expand(node);
    settle(&session, &mut tree);

    resume(&mut session);
    let ctx = pause(&mut session);
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    for name in ["items", "this"] {
        let id = child(&tree, root, name);
        let node = tree.node(id).unwrap();
        assert_eq!(
            node.descriptor().failure(),
            Some(&EvaluateError::ObjectCollected),
            "{}",
            name
        );
        assert_eq!(node.label(), format!("{} = object has been garbage collected", name));
        assert!(!node.descriptor().is_expandable());
        assert!(node.is_leaf());
        assert!(tree.children(id).is_empty());
    }
}

#[test]
fn test_set_value() {
    let program = program();
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx.clone());
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let step = child(&tree, root, "step");
    tree.set_value(step, Value::Int(42)).unwrap();
    settle(&session, &mut tree);
    let node = tree.node(step).unwrap();
    assert_eq!(node.label(), "step = 42");
    assert!(node.descriptor().is_dirty());
    assert!(tree.take_last_error().is_none());

    let this = child(&tree, root, "this");
    assert!(matches!(
        tree.set_value(this, Value::Null),
        Err(CoreError::NotLvalue(_))
    ));

    let mut watches = DebuggerTree::new(
        ViewKind::Watches,
        &session,
        HeadlessView::default(),
        TreeConfig::default(),
    );
    watches.add_watch("step");
    watches.rebuild(ctx);
    settle(&session, &mut watches);
    let root = watches.root().unwrap();
    let watch = child(&watches, root, "step");
    assert_eq!(watches.node(watch).unwrap().label(), "step = 42");
    assert!(matches!(
        watches.set_value(watch, Value::Int(1)),
        Err(CoreError::NotLvalue(name)) if name == "step"
    ));
}

#[test]
fn test_recalculating_root_refreshes_children() {
    let program = program();
    let frame = program.frame.clone();
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = DebuggerTree::new(
        ViewKind::Watches,
        &session,
        HeadlessView::default(),
        TreeConfig::default(),
    );
    tree.add_watch("step");
    tree.rebuild(ctx.clone());
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    assert_eq!(labels(&tree, root), vec!["step = 1"]);

    let lvalue = Lvalue::Local {
        frame,
        name: "step".to_string(),
    };
    session
        .manager()
        .invoke_and_wait(ctx.suspend().cloned(), WAIT, move |env| {
            env.target_mut().set_value(&lvalue, Value::Int(9))
        })
        .unwrap()
        .unwrap();

    // ルートの再評価はウォッチ式を評価し直す
    tree.calc_value(root);
    settle(&session, &mut tree);
    assert_eq!(labels(&tree, root), vec!["step = 9"]);
    assert!(tree.node(tree.children(root)[0]).unwrap().descriptor().is_dirty());

    let mut variables = variables_tree(&session, HeadlessView::default());
    variables.rebuild(ctx);
    settle(&session, &mut variables);
    let root = variables.root().unwrap();
    let before = variables.children(root).to_vec();
    variables.calc_representation(root);
    settle(&session, &mut variables);
    let after = variables.children(root).to_vec();
    assert_eq!(after.len(), before.len());
    assert!(after.iter().all(|id| !before.contains(id)));
    assert_eq!(variables.node(child(&variables, root, "step")).unwrap().label(), "step = 9");
}

#[test]
fn test_watches() {
    let mut program = program();
    let counter = program.counter;
    program.target.on_resume(move |t| {
        t.set_field(counter, "count", Value::Int(5)).unwrap();
    });
    let (mut session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = DebuggerTree::new(
        ViewKind::Watches,
        &session,
        HeadlessView::default(),
        TreeConfig::default(),
    );
    tree.add_watch("this.count");
    tree.add_watch("items.length");
    tree.add_watch("nope");
    tree.add_watch("nope");
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    assert_eq!(
        labels(&tree, root),
        vec![
            "this.count = 0",
            "items.length = 3",
            "nope = cannot find local variable 'nope'",
        ]
    );
    let failed = child(&tree, root, "nope");
    assert_eq!(tree.node(failed).unwrap().icon(), Icon::Error);

    assert!(tree.remove_watch("nope"));
    assert!(!tree.remove_watch("nope"));
    assert_eq!(tree.watches(), ["this.count", "items.length"]);
    assert_eq!(tree.children(root).len(), 2);

    resume(&mut session);
    let ctx = pause(&mut session);
    tree.rebuild(ctx);
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    let count = child(&tree, root, "this.count");
    let node = tree.node(count).unwrap();
    assert_eq!(node.label(), "this.count = 5");
    assert!(node.descriptor().is_dirty());
    assert!(!tree
        .node(child(&tree, root, "items.length"))
        .unwrap()
        .descriptor()
        .is_dirty());
}

#[test]
fn test_node_expression() {
    let program = program();
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx.clone());
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let this = child(&tree, root, "this");
    let items = child(&tree, root, "items");
    tree.expand(this);
    tree.expand(items);
    settle(&session, &mut tree);

    assert_eq!(tree.node_expression(this).as_deref(), Some("this"));
    let count = child(&tree, this, "count");
    assert_eq!(tree.node_expression(count).as_deref(), Some("this.count"));
    let element = child(&tree, items, "[1]");
    assert_eq!(tree.node_expression(element).as_deref(), Some("items[1]"));
    assert_eq!(tree.node_expression(root), None);

    // static メソッドのフレーム
    tree.rebuild(ctx.with_frame(1));
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    let statics = child(&tree, root, "static members of Counter");
    assert_eq!(tree.node(statics).unwrap().icon(), Icon::StaticScope);
    tree.expand(statics);
    settle(&session, &mut tree);
    assert_eq!(labels(&tree, statics), vec!["INSTANCES = 1"]);
    let field = child(&tree, statics, "INSTANCES");
    assert_eq!(tree.node(field).unwrap().icon(), Icon::StaticField);
    assert_eq!(
        tree.node_expression(field).as_deref(),
        Some("Counter.INSTANCES")
    );
}

#[test]
fn test_history_is_kept_per_thread() {
    let program = program();
    let frame = program.frame.clone();
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx.clone());
    settle(&session, &mut tree);

    // 別スレッドを表示している間に値を書き換える
    tree.rebuild(ctx.with_thread(program.alpha));
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    assert_eq!(labels(&tree, root), vec!["static members of Worker"]);

    let lvalue = Lvalue::Local {
        frame,
        name: "step".to_string(),
    };
    session
        .manager()
        .invoke_and_wait(ctx.suspend().cloned(), WAIT, move |env| {
            env.target_mut().set_value(&lvalue, Value::Int(7))
        })
        .unwrap()
        .unwrap();

    tree.rebuild(ctx);
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    let step = child(&tree, root, "step = 7");
    assert!(tree.node(step).unwrap().descriptor().is_dirty());
    assert!(!tree.node(step).unwrap().descriptor().is_new());
    let ratio = child(&tree, root, "ratio");
    assert!(!tree.node(ratio).unwrap().descriptor().is_dirty());
}

#[test]
fn test_value_for_display() {
    let program = program();
    let items = program.items;
    let (session, ctx) = start(program.target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let step = child(&tree, root, "step");
    assert_eq!(tree.value_for_display(step), Some(Value::Int(1)));
    let node = child(&tree, root, "items");
    let value = tree.value_for_display(node).unwrap();
    assert_eq!(value.object_id(), Some(items));
    assert_eq!(tree.value_for_display(root), None);
}

/// 整数を16進で表示するレンダラ
struct HexRenderer;

impl Renderer for HexRenderer {
    fn name(&self) -> &str {
        "hex"
    }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Int(_))
    }

    fn is_expandable(&self, _value: &Value, _target: &dyn Target) -> bool {
        false
    }

    fn calc_label(&self, value: &Value, _target: &dyn Target) -> EvalResult<String> {
        match value {
            Value::Int(v) => Ok(format!("0x{:x}", v)),
            other => Ok(other.to_string()),
        }
    }

    fn build_children(
        &self,
        _value: &Value,
        _target: &dyn Target,
        _sink: &mut dyn ChildrenSink,
    ) -> EvalResult<()> {
        Ok(())
    }
}

/// 展開できるかどうかを外から切り替えられる配列レンダラ
struct FoldingRenderer {
    expandable: Arc<AtomicBool>,
}

impl Renderer for FoldingRenderer {
    fn name(&self) -> &str {
        "folding"
    }

    fn is_applicable(&self, value: &Value) -> bool {
        matches!(value, Value::Array(_))
    }

    fn is_expandable(&self, _value: &Value, _target: &dyn Target) -> bool {
        self.expandable.load(Ordering::SeqCst)
    }

    fn calc_label(&self, _value: &Value, _target: &dyn Target) -> EvalResult<String> {
        Ok("folded".to_string())
    }

    fn build_children(
        &self,
        _value: &Value,
        _target: &dyn Target,
        sink: &mut dyn ChildrenSink,
    ) -> EvalResult<()> {
        sink.add_children(vec![ChildSpec::Message("first".to_string())]);
        sink.add_children(vec![ChildSpec::Message("second".to_string())]);
        Ok(())
    }
}

#[test]
fn test_built_node_that_becomes_leaf_drops_children() {
    let program = program();
    let expandable = Arc::new(AtomicBool::new(true));
    let mut renderers = RendererRegistry::default();
    renderers.register(Arc::new(FoldingRenderer {
        expandable: expandable.clone(),
    }));
    let (session, ctx) = start(program.target, renderers);
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let items = child(&tree, root, "items");
    tree.expand(items);
    settle(&session, &mut tree);
    assert_eq!(labels(&tree, items), vec!["first", "second"]);
    assert_eq!(tree.node(items).unwrap().state(), NodeState::Built);

    // ラベルだけの再計算でも、葉になったら子要素は消える
    expandable.store(false, Ordering::SeqCst);
    tree.calc_label(items);
    settle(&session, &mut tree);
    let node = tree.node(items).unwrap();
    assert!(node.is_leaf());
    assert_eq!(node.state(), NodeState::Unbuilt);
    assert!(tree.children(items).is_empty());
}

#[test]
fn test_assigned_renderer_survives_rebuild() {
    let mut program = program();
    program
        .target
        .add_local(&program.frame, "mask", "int", Value::Int(255))
        .unwrap();
    let mut renderers = RendererRegistry::default();
    renderers.register(Arc::new(HexRenderer));
    let (session, ctx) = start(program.target, renderers);
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let mask = child(&tree, root, "mask");
    assert_eq!(tree.node(mask).unwrap().label(), "mask = 0xff");

    tree.set_renderer(mask, Some("primitive")).unwrap();
    settle(&session, &mut tree);
    assert_eq!(tree.node(mask).unwrap().label(), "mask = 255");
    assert!(matches!(
        tree.set_renderer(mask, Some("missing")),
        Err(CoreError::Other(_))
    ));

    tree.refresh();
    settle(&session, &mut tree);
    let root = tree.root().unwrap();
    assert_eq!(tree.node(child(&tree, root, "mask")).unwrap().label(), "mask = 255");
    assert_eq!(tree.node(child(&tree, root, "step")).unwrap().label(), "step = 0x1");

    let mask = child(&tree, root, "mask");
    tree.set_renderer(mask, None).unwrap();
    settle(&session, &mut tree);
    assert_eq!(tree.node(mask).unwrap().label(), "mask = 0xff");
}

#[test]
fn test_static_scope_lists_static_fields_only() {
    let mut target = kokia_target::SnapshotTarget::new();
    target.define_type(
        "Config",
        None,
        &[("a", "int", false), ("b", "int", true), ("c", "String", true)],
    );
    target.set_static("Config", "b", Value::Int(2));
    let group = target.add_group("main", None);
    let thread = target.add_thread("main", group);
    target.push_frame(thread, "load", "Config", 20, None).unwrap();

    let (session, ctx) = start(target, RendererRegistry::default());
    let mut tree = variables_tree(&session, HeadlessView::default());
    tree.rebuild(ctx);
    settle(&session, &mut tree);

    let root = tree.root().unwrap();
    let statics = child(&tree, root, "static members of Config");
    tree.expand(statics);
    settle(&session, &mut tree);
    assert_eq!(labels(&tree, statics), vec!["b = 2", "c = null"]);
}
