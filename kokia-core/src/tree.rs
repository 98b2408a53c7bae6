//! デバッガツリーコントローラ
//!
//! 停止のたびにツリーを作り直し、作り直す前の展開・選択・スクロール位置を
//! 新しいツリーに復元する。復元は子要素が届くたびに少しずつ進み、
//! ユーザーが最初に展開・折りたたみ・選択をした時点で終わる。

use crate::config::TreeConfig;
use crate::context::DebuggerContext;
use crate::descriptor::{
    Descriptor, DescriptorKey, DescriptorKind, MessageDescriptor, MessageKind, UiState,
};
use crate::errors::{
    CoreError, MSG_NOT_SUSPENDED, MSG_RUNNING, MSG_THREADS_ROOT, MSG_VARIABLES_ROOT,
    MSG_WATCHES_ROOT,
};
use crate::event::TreeEvent;
use crate::manager::ManagerHandle;
use crate::node::{NodeId, NodeState, TreeNode};
use crate::node_manager::NodeManager;
use crate::session::DebugSession;
use crate::view::{Rect, TreeView};
use crossbeam_channel::{unbounded, Receiver, RecvTimeoutError};
use kokia_render::{ChildSpec, PrimitiveRenderer, Renderer, RendererRegistry};
use kokia_target::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// ツリーの種類
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViewKind {
    /// スレッドグループ → スレッド → フレーム → 変数
    Threads,
    /// 選択中のフレームの this / static と変数
    Variables,
    /// ウォッチ式
    Watches,
}

/// デバッガツリー
pub struct DebuggerTree<V: TreeView> {
    pub(crate) kind: ViewKind,
    pub(crate) config: TreeConfig,
    pub(crate) manager: ManagerHandle,
    pub(crate) renderers: Arc<RendererRegistry>,
    pub(crate) node_manager: NodeManager,
    pub(crate) events: Receiver<TreeEvent>,
    pub(crate) nodes: HashMap<NodeId, TreeNode>,
    pub(crate) root: Option<NodeId>,
    pub(crate) context: DebuggerContext,
    pub(crate) view: V,
    pub(crate) restoring: bool,
    pub(crate) watches: Vec<String>,
    pub(crate) last_error: Option<String>,
}

impl<V: TreeView> DebuggerTree<V> {
    pub fn new(kind: ViewKind, session: &DebugSession, view: V, config: TreeConfig) -> Self {
        let (sender, events) = unbounded();
        let manager = session.manager();
        let node_manager = NodeManager::new(manager.clone(), sender, &config);
        Self {
            kind,
            config,
            manager,
            renderers: session.renderers(),
            node_manager,
            events,
            nodes: HashMap::new(),
            root: None,
            context: DebuggerContext::empty(),
            view,
            restoring: false,
            watches: Vec::new(),
            last_error: None,
        }
    }

    pub fn kind(&self) -> ViewKind {
        self.kind
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn view_mut(&mut self) -> &mut V {
        &mut self.view
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes.get(&id).map(|n| n.children()).unwrap_or(&[])
    }

    pub fn context(&self) -> &DebuggerContext {
        &self.context
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// 復元中か
    pub fn is_restoring(&self) -> bool {
        self.restoring
    }

    pub fn watches(&self) -> &[String] {
        &self.watches
    }

    /// 直近の非同期エラー（値の代入失敗など）を取り出す
    pub fn take_last_error(&mut self) -> Option<String> {
        self.last_error.take()
    }

    /// コンテキストを切り替えてツリーを作り直す
    pub fn rebuild(&mut self, context: DebuggerContext) {
        self.save_state();
        let snapshot = self.snapshot();
        self.node_manager
            .set_history_by_context(self.context.thread(), &context, snapshot);
        debug!(view = ?self.kind, thread = ?context.thread(), "rebuilding tree");
        self.context = context;
        self.clear();
        self.restoring = true;
        self.build_root();
        self.layout();
    }

    /// 同じコンテキストのまま作り直す
    pub fn refresh(&mut self) {
        let context = self.context.clone();
        self.rebuild(context);
    }

    /// 現在の展開・選択・表示領域を記述子に保存する
    pub fn save_state(&mut self) {
        let visible = self.view.visible_rect();
        let ids: Vec<NodeId> = self.nodes.keys().copied().collect();
        for id in ids {
            let bounds = self.view.node_bounds(id);
            let ui = UiState {
                expanded: self.view.is_expanded(id),
                selected: self.view.is_selected(id),
                visible_rect: match (bounds, visible) {
                    (Some(bounds), Some(visible)) if visible.contains(&bounds) => Some(bounds),
                    _ => None,
                },
            };
            if let Some(node) = self.nodes.get_mut(&id) {
                node.descriptor.set_ui_state(ui);
            }
        }
    }

    fn snapshot(&self) -> Vec<Descriptor> {
        self.nodes.values().map(|n| n.descriptor.clone()).collect()
    }

    fn clear(&mut self) {
        for id in self.nodes.keys() {
            self.view.node_removed(*id);
        }
        self.nodes.clear();
        self.root = None;
    }

    fn build_root(&mut self) {
        let key = DescriptorKey::root();
        if !self.context.is_suspended() {
            let text = if self.context.suspend().is_some() {
                MSG_RUNNING
            } else {
                MSG_NOT_SUSPENDED
            };
            let node =
                self.node_manager
                    .create_message_node(None, &key, text, self.context.clone());
            self.root = Some(node.id());
            self.nodes.insert(node.id(), node);
            return;
        }

        let title = match self.kind {
            ViewKind::Threads => MSG_THREADS_ROOT,
            ViewKind::Variables => MSG_VARIABLES_ROOT,
            ViewKind::Watches => MSG_WATCHES_ROOT,
        };
        let root = self.node_manager.create_message_node(
            None,
            &key,
            MessageDescriptor::new(title, MessageKind::Special),
            self.context.clone(),
        );
        let root_id = root.id();
        self.root = Some(root_id);
        self.nodes.insert(root_id, root);
        self.view.expand(root_id);

        match self.kind {
            ViewKind::Watches => {
                if let Some(root) = self.nodes.get_mut(&root_id) {
                    root.state = NodeState::Built;
                }
                for expression in self.watches.clone() {
                    self.add_watch_node(expression);
                }
            }
            _ => self.request_children(root_id),
        }
    }

    pub(crate) fn refresh_root(&mut self) {
        let Some(root) = self.root else {
            return;
        };
        if !self.context.is_suspended() {
            return;
        }
        match self.kind {
            ViewKind::Watches => {
                for child in self.children(root).to_vec() {
                    self.calc_value(child);
                }
            }
            _ => self.request_children(root),
        }
    }

    /// ノードを展開する（ユーザー操作）
    pub fn expand(&mut self, id: NodeId) {
        self.end_restore();
        self.expand_node(id);
    }

    /// ノードを折りたたむ（ユーザー操作）
    pub fn collapse(&mut self, id: NodeId) {
        self.end_restore();
        self.view.collapse(id);
        self.layout();
    }

    /// ノードを選択する（ユーザー操作）
    pub fn select(&mut self, id: NodeId) {
        self.end_restore();
        self.view.select(id);
    }

    fn end_restore(&mut self) {
        if self.restoring {
            debug!("restore phase finished by user action");
            self.restoring = false;
        }
    }

    pub(crate) fn expand_node(&mut self, id: NodeId) {
        let Some(node) = self.nodes.get(&id) else {
            return;
        };
        let needs_build = matches!(node.state, NodeState::Unbuilt | NodeState::Cleared)
            && node.descriptor.is_expandable();
        self.view.expand(id);
        if needs_build {
            self.request_children(id);
        }
        self.layout();
    }

    /// 新しく届いたノードの展開・選択を復元し、記憶した表示位置へスクロールする
    pub(crate) fn restore_nodes(&mut self, parent: NodeId, added: &[NodeId]) {
        let mut selected = None;
        for &child in added {
            let Some(node) = self.nodes.get(&child) else {
                continue;
            };
            let ui = node.descriptor.ui_state().clone();
            let expandable = node.descriptor.is_expandable();
            if ui.selected {
                self.view.select(child);
                selected = Some(child);
            }
            if ui.expanded && expandable {
                self.expand_node(child);
            }
        }
        self.layout();

        if let Some(rect) = self.remembered_rect(parent) {
            self.view.scroll_to_rect(rect);
        } else if let Some(node) = selected {
            self.view.scroll_to_node(node);
        }
    }

    /// 部分木の表示行を下から見て、最初に見つかった記憶済みの表示領域
    fn remembered_rect(&self, subtree: NodeId) -> Option<Rect> {
        self.rows_from(subtree)
            .iter()
            .rev()
            .find_map(|(id, _)| self.nodes.get(id)?.descriptor.ui_state().visible_rect)
    }

    /// マネージャスレッドからの結果をすべて反映する
    pub fn process_events(&mut self) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            self.apply_event(event);
            applied += 1;
        }
        applied
    }

    /// 結果が届くまで最大 `timeout` 待ってから反映する
    pub fn wait_events(&mut self, timeout: Duration) -> usize {
        match self.events.recv_timeout(timeout) {
            Ok(event) => {
                self.apply_event(event);
                1 + self.process_events()
            }
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => 0,
        }
    }

    /// 展開状態に従った表示行
    pub fn visible_rows(&self) -> Vec<NodeId> {
        self.visible_rows_with_depth()
            .into_iter()
            .map(|(id, _)| id)
            .collect()
    }

    /// 表示行と深さ
    pub fn visible_rows_with_depth(&self) -> Vec<(NodeId, usize)> {
        match self.root {
            Some(root) => self.rows_from(root),
            None => Vec::new(),
        }
    }

    fn rows_from(&self, start: NodeId) -> Vec<(NodeId, usize)> {
        let mut rows = Vec::new();
        let mut stack = vec![(start, 0)];
        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            rows.push((id, depth));
            if self.view.is_expanded(id) {
                for child in node.children.iter().rev() {
                    stack.push((*child, depth + 1));
                }
            }
        }
        rows
    }

    pub(crate) fn layout(&mut self) {
        let rows = self.visible_rows();
        self.view.layout(&rows);
    }

    /// ラベルが `prefix` で始まる子ノード
    pub fn find_child(&self, parent: NodeId, prefix: &str) -> Option<NodeId> {
        self.children(parent)
            .iter()
            .copied()
            .find(|id| self.nodes.get(id).is_some_and(|n| n.label().starts_with(prefix)))
    }

    /// 値を代入する
    pub fn set_value(&mut self, id: NodeId, value: Value) -> Result<(), CoreError> {
        let node = self.nodes.get(&id).ok_or(CoreError::NodeNotFound(id.as_u64()))?;
        if !node.descriptor.value_data().is_some_and(|d| d.is_lvalue) {
            return Err(CoreError::NotLvalue(node.descriptor.name()));
        }
        let rebuild_children = self.children_built(id);
        if rebuild_children {
            self.show_placeholder(id);
        }
        self.submit(
            id,
            crate::command::NodeOp::SetValue {
                value,
                rebuild_children,
            },
        );
        Ok(())
    }

    /// レンダラを割り当てて表示し直す（`None` で自動選択に戻す）
    pub fn set_renderer(&mut self, id: NodeId, renderer: Option<&str>) -> Result<(), CoreError> {
        if let Some(name) = renderer {
            self.renderers.find(name)?;
        }
        let node = self
            .nodes
            .get_mut(&id)
            .ok_or(CoreError::NodeNotFound(id.as_u64()))?;
        node.descriptor.set_renderer(renderer.map(str::to_string));
        info!(node = %id, renderer = ?renderer, "renderer assigned");
        self.calc_representation(id);
        Ok(())
    }

    /// ウォッチ式を追加する
    pub fn add_watch(&mut self, expression: impl Into<String>) {
        let expression = expression.into();
        if self.watches.contains(&expression) {
            return;
        }
        self.watches.push(expression.clone());
        if self.kind == ViewKind::Watches && self.context.is_suspended() {
            self.add_watch_node(expression);
        }
    }

    /// ウォッチ式を削除する
    pub fn remove_watch(&mut self, expression: &str) -> bool {
        let Some(pos) = self.watches.iter().position(|w| w == expression) else {
            return false;
        };
        self.watches.remove(pos);

        let Some(root) = self.root else {
            return true;
        };
        let found = self.children(root).iter().copied().find(|id| {
            self.nodes.get(id).is_some_and(|n| {
                matches!(n.descriptor.kind(), DescriptorKind::Watch { expression: e } if e == expression)
            })
        });
        if let Some(id) = found {
            if let Some(removed) = self.nodes.remove(&id) {
                let mut stack = removed.children;
                while let Some(child) = stack.pop() {
                    if let Some(node) = self.nodes.remove(&child) {
                        stack.extend(node.children);
                        self.view.node_removed(child);
                    }
                }
            }
            self.view.node_removed(id);
            if let Some(root_node) = self.nodes.get_mut(&root) {
                root_node.children.retain(|c| *c != id);
            }
            self.view.children_changed(root, false);
            self.layout();
        }
        true
    }

    fn add_watch_node(&mut self, expression: String) {
        let Some(root) = self.root else {
            return;
        };
        let Some(key) = self.nodes.get(&root).map(|n| n.descriptor.key().clone()) else {
            return;
        };
        let descriptor = Descriptor::new(&key, DescriptorKind::Watch { expression });
        let node = self
            .node_manager
            .create_node(descriptor, Some(root), self.context.clone());
        let id = node.id();
        self.nodes.insert(id, node);
        if let Some(root_node) = self.nodes.get_mut(&root) {
            root_node.children.push(id);
        }
        self.view.children_changed(root, false);
        self.layout();
    }

    /// ノードの値を取り出す式
    pub fn node_expression(&self, id: NodeId) -> Option<String> {
        let node = self.nodes.get(&id)?;
        match node.descriptor.kind() {
            DescriptorKind::Local { local, .. } => Some(local.name.clone()),
            DescriptorKind::This { .. } => Some("this".to_string()),
            DescriptorKind::Watch { expression }
            | DescriptorKind::UserExpression { expression, .. } => Some(expression.clone()),
            DescriptorKind::Field { object, field } => {
                let child = ChildSpec::Field {
                    object: *object,
                    field: field.clone(),
                };
                self.child_expression(node, &child, object.is_none())
            }
            DescriptorKind::ArrayElement { array, index } => {
                let child = ChildSpec::ArrayElement {
                    array: array.clone(),
                    index: *index,
                };
                self.child_expression(node, &child, false)
            }
            _ => None,
        }
    }

    fn child_expression(&self, node: &TreeNode, child: &ChildSpec, is_static: bool) -> Option<String> {
        let parent = node.parent().and_then(|p| self.nodes.get(&p));
        let parent_expression = match parent.and_then(|p| self.node_expression(p.id())) {
            Some(expression) => expression,
            None if is_static => String::new(),
            None => return None,
        };
        let renderer = parent.and_then(|p| {
            let value = p.descriptor.value()?;
            self.renderers.select(p.descriptor.assigned_renderer(), value)
        });
        match renderer {
            Some(renderer) => renderer.child_value_expression(&parent_expression, child),
            None => PrimitiveRenderer.child_value_expression(&parent_expression, child),
        }
    }

    /// 表示用にノードの値を取得する
    ///
    /// 参照値はターゲット側で回収されている可能性があるため、マネージャスレッドで
    /// 確認して必要なら評価し直す。UIスレッドが同期的に待つのはここだけで、
    /// 待ち時間は `value_wait_timeout` まで。
    pub fn value_for_display(&mut self, id: NodeId) -> Option<Value> {
        let node = self.nodes.get(&id)?;
        let value = node.descriptor.value()?.clone();
        if value.is_primitive() {
            return Some(value);
        }
        let object = value.object_id()?;
        let mut descriptor = node.descriptor.clone();
        let context = node.context().clone();
        let suspend = context.suspend().cloned();

        let result = self.manager.invoke_and_wait(
            suspend,
            self.config.value_wait_timeout,
            move |env| {
                let target = env.target();
                if !target.is_collected(object) {
                    return Some(value);
                }
                descriptor.set_context(&context, &*target);
                descriptor.value().cloned()
            },
        );
        match result {
            Ok(value) => value,
            Err(err) => {
                warn!(node = %id, error = %err, "cannot fetch value for display");
                None
            }
        }
    }
}
