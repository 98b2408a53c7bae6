//! ノードの作成と履歴の管理
//!
//! [`NodeManager`] はツリーコントローラごとに1つ作られ、ノードIDの採番と
//! 履歴の切り替えを受け持つ。[`DescriptorFactory`] はマネージャスレッド側で
//! 記述子を履歴と対応付ける。

use crate::command::{NodeCommand, NodeOp};
use crate::config::{BuildOptions, TreeConfig};
use crate::context::DebuggerContext;
use crate::descriptor::{Descriptor, DescriptorKey, DescriptorKind, MessageDescriptor};
use crate::event::TreeEvent;
use crate::history::{ControllerId, HistoryCache};
use crate::manager::ManagerHandle;
use crate::node::{NodeId, TreeNode};
use crossbeam_channel::Sender;
use kokia_target::ThreadId;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, trace, warn};

static NEXT_CONTROLLER: AtomicU64 = AtomicU64::new(1);

/// 記述子を履歴と対応付けて作成する
pub(crate) struct DescriptorFactory<'a> {
    history: Option<&'a HistoryCache>,
}

impl<'a> DescriptorFactory<'a> {
    pub fn new(history: Option<&'a HistoryCache>) -> Self {
        Self { history }
    }

    pub fn create(&self, parent: &DescriptorKey, kind: DescriptorKind) -> Descriptor {
        let mut descriptor = Descriptor::new(parent, kind);
        self.reconcile(&mut descriptor);
        descriptor
    }

    /// 同じキーの前回の記述子があれば状態を引き継ぐ
    pub fn reconcile(&self, descriptor: &mut Descriptor) {
        match self.history.and_then(|h| h.lookup(descriptor.key())) {
            Some(previous) => {
                trace!(key = %descriptor.key(), "history hit");
                descriptor.set_ancestor(previous);
                descriptor.set_new(false);
            }
            None => descriptor.set_new(true),
        }
    }
}

/// ツリーコントローラ1つ分のノード管理
pub struct NodeManager {
    id: ControllerId,
    manager: ManagerHandle,
    events: Sender<TreeEvent>,
    next_node: u64,
    history_capacity: usize,
    options: BuildOptions,
}

impl NodeManager {
    pub(crate) fn new(manager: ManagerHandle, events: Sender<TreeEvent>, config: &TreeConfig) -> Self {
        Self {
            id: NEXT_CONTROLLER.fetch_add(1, Ordering::Relaxed),
            manager,
            events,
            next_node: 1,
            history_capacity: config.history_capacity,
            options: config.build_options(),
        }
    }

    pub fn id(&self) -> ControllerId {
        self.id
    }

    fn next_id(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    /// 記述子からノードを作成し、評価とラベル計算を要求する
    pub fn create_node(
        &mut self,
        descriptor: Descriptor,
        parent: Option<NodeId>,
        context: DebuggerContext,
    ) -> TreeNode {
        let mut node = TreeNode::new(self.next_id(), parent, descriptor, context);
        self.submit(&mut node, NodeOp::Prime);
        node
    }

    /// マネージャスレッドで評価済みの記述子からノードを作成する
    pub(crate) fn create_built_node(
        &mut self,
        descriptor: Descriptor,
        parent: Option<NodeId>,
        context: DebuggerContext,
    ) -> TreeNode {
        TreeNode::new(self.next_id(), parent, descriptor, context)
    }

    /// メッセージだけを表示するノードを作成する
    pub fn create_message_node(
        &mut self,
        parent: Option<NodeId>,
        parent_key: &DescriptorKey,
        message: impl Into<MessageDescriptor>,
        context: DebuggerContext,
    ) -> TreeNode {
        let descriptor = Descriptor::message(parent_key, message);
        TreeNode::new(self.next_id(), parent, descriptor, context)
    }

    /// ノードへの要求をマネージャスレッドへ送る
    pub(crate) fn submit(&self, node: &mut TreeNode, op: NodeOp) {
        let serial = node.begin(&op);
        let command = NodeCommand {
            controller: self.id,
            node: node.id(),
            serial,
            op,
            descriptor: node.descriptor().clone(),
            context: node.context().clone(),
            options: self.options,
            events: self.events.clone(),
        };
        if let Err(err) = self.manager.invoke_later(command) {
            warn!(node = %node.id(), error = %err, "cannot queue node command");
        }
    }

    /// 直前のツリーを履歴に保存し、新しいコンテキストのスレッドの履歴に切り替える
    pub fn set_history_by_context(
        &self,
        previous: Option<ThreadId>,
        context: &DebuggerContext,
        snapshot: Vec<Descriptor>,
    ) {
        let id = self.id;
        let capacity = self.history_capacity;
        let current = context.thread();
        debug!(controller = id, ?previous, ?current, "switching history");
        let result = self.manager.schedule("set-history", None, move |env| {
            env.histories_mut()
                .get_or_create(id, capacity)
                .set_history(previous, snapshot, current);
        });
        if let Err(err) = result {
            warn!(error = %err, "cannot queue history update");
        }
    }
}

impl Drop for NodeManager {
    fn drop(&mut self) {
        let id = self.id;
        let _ = self.manager.schedule("dispose-history", None, move |env| {
            env.histories_mut().remove(id);
        });
    }
}
