//! ツリーノード
//!
//! ノードはUIスレッドだけが持つ。ラベル・値・子要素の計算はマネージャスレッドへ
//! 要求し、結果は [`TreeEvent`] として反映する。要求ごとに通し番号を振り、
//! 新しい要求で上書きされた古い結果は捨てる。

use crate::command::NodeOp;
use crate::descriptor::{Descriptor, DescriptorKind, MessageDescriptor, MessageKind};
use crate::errors::MSG_EVALUATING;
use crate::event::TreeEvent;
use crate::context::DebuggerContext;
use crate::tree::DebuggerTree;
use crate::view::TreeView;
use std::fmt;
use tracing::{trace, warn};

/// ノードID（ツリー内で再利用しない）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u64);

impl NodeId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// 子要素の状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeState {
    /// まだ子要素を構築していない
    Unbuilt,
    /// プレースホルダを表示して構築待ち
    Evaluating,
    Built,
    /// 停止コンテキストの再開で取り消された
    Cleared,
}

/// ノードのアイコン
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Icon {
    ThreadGroup,
    ThreadSuspended,
    ThreadRunning,
    ThreadDead,
    Frame,
    StaticScope,
    Field,
    StaticField,
    Local,
    This,
    Element,
    Watch,
    Expression,
    Info,
    Error,
    Special,
}

impl Icon {
    pub fn for_descriptor(descriptor: &Descriptor) -> Self {
        if descriptor.failure().is_some() {
            return Icon::Error;
        }
        match descriptor.kind() {
            DescriptorKind::Message(message) => match message.kind {
                MessageKind::Info => Icon::Info,
                MessageKind::Error => Icon::Error,
                MessageKind::Special => Icon::Special,
            },
            DescriptorKind::ThreadGroup(_) => Icon::ThreadGroup,
            DescriptorKind::Thread(info) if !info.is_alive() => Icon::ThreadDead,
            DescriptorKind::Thread(info) if info.suspended => Icon::ThreadSuspended,
            DescriptorKind::Thread(_) => Icon::ThreadRunning,
            DescriptorKind::StackFrame(_) => Icon::Frame,
            DescriptorKind::StaticScope { .. } => Icon::StaticScope,
            DescriptorKind::Field { object: None, .. } => Icon::StaticField,
            DescriptorKind::Field { .. } => Icon::Field,
            DescriptorKind::Local { .. } => Icon::Local,
            DescriptorKind::This { .. } => Icon::This,
            DescriptorKind::ArrayElement { .. } => Icon::Element,
            DescriptorKind::Watch { .. } => Icon::Watch,
            DescriptorKind::UserExpression { .. } => Icon::Expression,
        }
    }

    /// 端末表示用の記号
    pub fn symbol(&self) -> &'static str {
        match self {
            Icon::ThreadGroup => "G",
            Icon::ThreadSuspended => "T",
            Icon::ThreadRunning => "t",
            Icon::ThreadDead => "x",
            Icon::Frame => "F",
            Icon::StaticScope => "S",
            Icon::Field => "f",
            Icon::StaticField => "s",
            Icon::Local => "l",
            Icon::This => "@",
            Icon::Element => "e",
            Icon::Watch => "w",
            Icon::Expression => "=",
            Icon::Info => "i",
            Icon::Error => "!",
            Icon::Special => "*",
        }
    }
}

/// ツリーノード
#[derive(Debug)]
pub struct TreeNode {
    id: NodeId,
    parent: Option<NodeId>,
    pub(crate) descriptor: Descriptor,
    pub(crate) children: Vec<NodeId>,
    label: String,
    icon: Icon,
    pub(crate) state: NodeState,
    context: DebuggerContext,
    next_serial: u64,
    pub(crate) pending_label: Option<u64>,
    pub(crate) pending_children: Option<u64>,
}

impl TreeNode {
    pub(crate) fn new(
        id: NodeId,
        parent: Option<NodeId>,
        descriptor: Descriptor,
        context: DebuggerContext,
    ) -> Self {
        let mut node = Self {
            id,
            parent,
            descriptor,
            children: Vec::new(),
            label: String::new(),
            icon: Icon::Info,
            state: NodeState::Unbuilt,
            context,
            next_serial: 0,
            pending_label: None,
            pending_children: None,
        };
        node.refresh();
        node
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn descriptor(&self) -> &Descriptor {
        &self.descriptor
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// 表示中のラベル
    pub fn label(&self) -> &str {
        &self.label
    }

    pub fn icon(&self) -> Icon {
        self.icon
    }

    pub fn state(&self) -> NodeState {
        self.state
    }

    /// ノード作成時のコンテキスト
    pub fn context(&self) -> &DebuggerContext {
        &self.context
    }

    pub fn is_leaf(&self) -> bool {
        !self.descriptor.is_expandable()
    }

    /// 要求を始め、その通し番号を返す
    pub(crate) fn begin(&mut self, op: &NodeOp) -> u64 {
        self.next_serial += 1;
        let serial = self.next_serial;
        if op.updates_label() {
            self.pending_label = Some(serial);
        }
        if op.updates_children() {
            self.pending_children = Some(serial);
        }
        serial
    }

    pub(crate) fn set_descriptor(&mut self, descriptor: Descriptor) {
        self.descriptor = descriptor;
        self.refresh();
    }

    /// 記述子からラベルとアイコンを取り直す
    pub(crate) fn refresh(&mut self) {
        self.label = self.descriptor.label().to_string();
        self.icon = Icon::for_descriptor(&self.descriptor);
    }
}

impl<V: TreeView> DebuggerTree<V> {
    /// ラベルだけを計算し直す
    pub fn calc_label(&mut self, id: NodeId) {
        self.submit(id, NodeOp::Label);
    }

    /// 現在の値のままラベルと子要素を計算し直す
    pub fn calc_representation(&mut self, id: NodeId) {
        if Some(id) == self.root {
            self.refresh_root();
            return;
        }
        let rebuild_children = self.children_built(id);
        if rebuild_children {
            self.show_placeholder(id);
        }
        self.submit(id, NodeOp::Representation { rebuild_children });
    }

    /// 値を評価し直し、ラベルと子要素を計算し直す
    pub fn calc_value(&mut self, id: NodeId) {
        if Some(id) == self.root {
            self.refresh_root();
            return;
        }
        let rebuild_children = self.children_built(id);
        if rebuild_children {
            self.show_placeholder(id);
        }
        self.submit(id, NodeOp::Value { rebuild_children });
    }

    /// 子要素の構築を要求する
    pub(crate) fn request_children(&mut self, id: NodeId) {
        self.show_placeholder(id);
        let op = if Some(id) == self.root {
            NodeOp::TopLevel(self.kind)
        } else {
            NodeOp::Children
        };
        self.submit(id, op);
    }

    pub(crate) fn children_built(&self, id: NodeId) -> bool {
        self.nodes
            .get(&id)
            .is_some_and(|n| matches!(n.state, NodeState::Built | NodeState::Evaluating))
    }

    pub(crate) fn submit(&mut self, id: NodeId, op: NodeOp) {
        let Some(node) = self.nodes.get_mut(&id) else {
            warn!(node = %id, "request for missing node");
            return;
        };
        self.node_manager.submit(node, op);
    }

    /// 子要素をプレースホルダ1つに置き換える
    pub(crate) fn show_placeholder(&mut self, id: NodeId) {
        let Some(key) = self.nodes.get(&id).map(|n| n.descriptor.key().clone()) else {
            return;
        };
        self.remove_children(id);
        let placeholder = self.node_manager.create_message_node(
            Some(id),
            &key,
            MessageDescriptor::new(MSG_EVALUATING, MessageKind::Special),
            self.context.clone(),
        );
        let placeholder_id = placeholder.id();
        self.nodes.insert(placeholder_id, placeholder);
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children.push(placeholder_id);
            node.state = NodeState::Evaluating;
        }
        self.view.children_changed(id, false);
        self.layout();
    }

    /// 子要素（と子孫）を取り除く
    pub(crate) fn remove_children(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        let mut stack = std::mem::take(&mut node.children);
        while let Some(child) = stack.pop() {
            if let Some(removed) = self.nodes.remove(&child) {
                stack.extend(removed.children);
                self.view.node_removed(child);
            }
        }
    }

    pub(crate) fn apply_event(&mut self, event: TreeEvent) {
        match event {
            TreeEvent::DescriptorUpdated {
                node,
                serial,
                descriptor,
            } => self.apply_descriptor(node, serial, descriptor),
            TreeEvent::ChildrenReady {
                node,
                serial,
                children,
                replace,
                last,
            } => self.apply_children(node, serial, children, replace, last),
            TreeEvent::Cancelled { node, serial } => self.apply_cancelled(node, serial),
            TreeEvent::SetValueFailed { node, error } => {
                warn!(node = %node, error = %error, "set value failed");
                self.last_error = Some(error);
            }
        }
    }

    fn apply_descriptor(&mut self, id: NodeId, serial: u64, descriptor: Descriptor) {
        let Some(node) = self.nodes.get_mut(&id) else {
            trace!(node = %id, "descriptor for removed node");
            return;
        };
        if node.pending_label != Some(serial) {
            trace!(node = %id, serial, "stale descriptor dropped");
            return;
        }
        node.pending_label = None;
        node.set_descriptor(descriptor);
        let unbuilt = node.state == NodeState::Unbuilt;
        let became_leaf = !node.descriptor.is_expandable()
            && !node.children.is_empty()
            && node.pending_children.is_none();
        let parent = node.parent;

        self.view.label_changed(id);
        if became_leaf {
            self.remove_children(id);
            if let Some(node) = self.nodes.get_mut(&id) {
                node.state = NodeState::Unbuilt;
            }
            self.view.children_changed(id, true);
            self.layout();
        }
        if self.restoring && unbuilt {
            if let Some(parent) = parent {
                self.restore_nodes(parent, &[id]);
            }
        }
    }

    fn apply_children(
        &mut self,
        id: NodeId,
        serial: u64,
        children: Vec<Descriptor>,
        replace: bool,
        last: bool,
    ) {
        let Some(node) = self.nodes.get(&id) else {
            trace!(node = %id, "children for removed node");
            return;
        };
        if node.pending_children != Some(serial) {
            trace!(node = %id, serial, "stale children dropped");
            return;
        }
        let context = node.context.clone();
        if !replace && children.is_empty() {
            // 追加なしの完了通知
            if let Some(node) = self.nodes.get_mut(&id) {
                node.state = NodeState::Built;
                if last {
                    node.pending_children = None;
                }
            }
            return;
        }
        if replace {
            self.remove_children(id);
        }

        let mut added = Vec::with_capacity(children.len());
        for descriptor in children {
            let child = self
                .node_manager
                .create_built_node(descriptor, Some(id), context.clone());
            added.push(child.id());
            self.nodes.insert(child.id(), child);
        }
        if let Some(node) = self.nodes.get_mut(&id) {
            node.children.extend(added.iter().copied());
            node.state = NodeState::Built;
            if last {
                node.pending_children = None;
            }
        }

        self.view.children_changed(id, replace);
        self.layout();
        if self.restoring {
            self.restore_nodes(id, &added);
        }
    }

    fn apply_cancelled(&mut self, id: NodeId, serial: u64) {
        let Some(node) = self.nodes.get_mut(&id) else {
            return;
        };
        if node.pending_label != Some(serial) && node.pending_children != Some(serial) {
            trace!(node = %id, serial, "stale cancellation dropped");
            return;
        }
        node.pending_label = None;
        node.pending_children = None;
        node.descriptor.clear_value();
        node.refresh();
        node.state = NodeState::Cleared;

        self.remove_children(id);
        self.view.label_changed(id);
        self.view.children_changed(id, true);
        self.layout();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::DescriptorKey;

    #[test]
    fn test_serials_track_pending_work() {
        let descriptor = Descriptor::new(
            &DescriptorKey::root(),
            DescriptorKind::Watch {
                expression: "x".to_string(),
            },
        );
        let mut node = TreeNode::new(NodeId(1), None, descriptor, DebuggerContext::empty());
        assert_eq!(node.icon(), Icon::Watch);
        assert_eq!(node.label(), "x");

        let first = node.begin(&NodeOp::Value {
            rebuild_children: true,
        });
        assert_eq!(node.pending_label, Some(first));
        assert_eq!(node.pending_children, Some(first));

        let second = node.begin(&NodeOp::Label);
        assert!(second > first);
        assert_eq!(node.pending_label, Some(second));
        assert_eq!(node.pending_children, Some(first));
    }
}
