//! 統合テスト用の共通ヘルパー

#![allow(dead_code)]

use kokia_core::{DebugSession, DebuggerContext, DebuggerTree, NodeId, SessionEvent, TreeView};
use kokia_render::RendererRegistry;
use kokia_target::{FrameRef, ObjectId, SnapshotTarget, ThreadId, Value};

/// テスト用プログラム
///
/// - グループ `system` > `main` にスレッド `zeta`（停止スレッド）と `alpha`
/// - `zeta` のフレーム: `tick`（Counter のインスタンスメソッド）と `main`（static）
pub struct Program {
    pub target: SnapshotTarget,
    pub zeta: ThreadId,
    pub alpha: ThreadId,
    pub frame: FrameRef,
    pub counter: ObjectId,
    pub items: ObjectId,
}

pub fn program() -> Program {
    let mut target = SnapshotTarget::new();
    target.define_type(
        "Counter",
        None,
        &[
            ("count", "int", false),
            ("label", "String", false),
            ("INSTANCES", "int", true),
        ],
    );
    let label = target.new_string("clicks");
    let counter = target.new_object("Counter", vec![("count", Value::Int(0)), ("label", label)]);
    target.set_static("Counter", "INSTANCES", Value::Int(1));
    let items = target.new_array("int[]", vec![Value::Int(1), Value::Int(2), Value::Int(3)]);

    let system = target.add_group("system", None);
    target.add_group("aaa", None);
    let main_group = target.add_group("main", Some(system));
    let zeta = target.add_thread("zeta", main_group);
    let alpha = target.add_thread("alpha", main_group);

    target
        .push_frame(zeta, "main", "Counter", 3, None)
        .expect("push static frame");
    let frame = target
        .push_frame(zeta, "tick", "Counter", 12, Some(counter.clone()))
        .expect("push frame");
    target.add_local(&frame, "step", "int", Value::Int(1)).unwrap();
    target.add_local(&frame, "items", "int[]", items.clone()).unwrap();
    target
        .add_local(&frame, "ratio", "double", Value::Double(f64::NAN))
        .unwrap();
    target.push_frame(alpha, "run", "Worker", 7, None).unwrap();

    Program {
        target,
        zeta,
        alpha,
        frame,
        counter: counter.object_id().unwrap(),
        items: items.object_id().unwrap(),
    }
}

/// セッションを開始し、最初の停止まで進める
pub fn start(target: SnapshotTarget, renderers: RendererRegistry) -> (DebugSession, DebuggerContext) {
    let mut session = DebugSession::start(target, renderers).expect("start session");
    let context = pause(&mut session);
    (session, context)
}

/// 停止させて新しいコンテキストを返す
pub fn pause(session: &mut DebugSession) -> DebuggerContext {
    session.pause().unwrap();
    session.flush().unwrap();
    let events = session.poll_events();
    assert!(
        events.iter().any(|e| matches!(e, SessionEvent::Paused(_))),
        "expected pause event, got {:?}",
        events
    );
    session.debugger_context()
}

/// 再開する
pub fn resume(session: &mut DebugSession) {
    session.resume().unwrap();
    session.flush().unwrap();
    session.poll_events();
}

/// マネージャスレッドのコマンドと結果の反映が落ち着くまで回す
pub fn settle<V: TreeView>(session: &DebugSession, tree: &mut DebuggerTree<V>) {
    for _ in 0..100 {
        session.flush().unwrap();
        if tree.process_events() == 0 {
            return;
        }
    }
    panic!("tree did not settle");
}

/// ラベルが `prefix` で始まる子ノード
pub fn child<V: TreeView>(tree: &DebuggerTree<V>, parent: NodeId, prefix: &str) -> NodeId {
    tree.find_child(parent, prefix).unwrap_or_else(|| {
        let labels: Vec<String> = tree
            .children(parent)
            .iter()
            .filter_map(|id| tree.node(*id).map(|n| n.label().to_string()))
            .collect();
        panic!("no child starting with '{}' in {:?}", prefix, labels)
    })
}

pub fn labels<V: TreeView>(tree: &DebuggerTree<V>, parent: NodeId) -> Vec<String> {
    tree.children(parent)
        .iter()
        .filter_map(|id| tree.node(*id).map(|n| n.label().to_string()))
        .collect()
}
