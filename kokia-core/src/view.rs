//! ツリー表示の境界

use crate::node::NodeId;
use std::collections::{HashMap, HashSet};

/// 表示座標上の矩形
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    /// `other` が完全に内側にあるか
    pub fn contains(&self, other: &Rect) -> bool {
        other.x >= self.x
            && other.y >= self.y
            && other.x + other.width <= self.x + self.width
            && other.bottom() <= self.bottom()
    }
}

/// ツリーを表示するビュー
///
/// コントローラはUIスレッドからだけ呼び出す。
pub trait TreeView {
    /// ノードのラベルが変わった
    fn label_changed(&mut self, node: NodeId);

    /// ノードの子要素が変わった
    ///
    /// `scroll_hint` は子要素全体が置き換わったことを示す。
    fn children_changed(&mut self, node: NodeId, scroll_hint: bool);

    /// 表示行（展開状態に従った深さ優先順）が確定した
    fn layout(&mut self, _rows: &[NodeId]) {}

    /// ノードが削除された
    fn node_removed(&mut self, _node: NodeId) {}

    fn is_expanded(&self, node: NodeId) -> bool;
    fn is_selected(&self, node: NodeId) -> bool;
    fn expand(&mut self, node: NodeId);
    fn collapse(&mut self, node: NodeId);
    fn select(&mut self, node: NodeId);

    /// 現在見えている領域
    fn visible_rect(&self) -> Option<Rect>;

    /// ノードの表示領域（表示されていなければ `None`）
    fn node_bounds(&self, node: NodeId) -> Option<Rect>;

    fn scroll_to_rect(&mut self, rect: Rect);
    fn scroll_to_node(&mut self, node: NodeId);
}

/// 画面を持たないビュー
///
/// 行の高さは一定で、行番号から表示領域を計算する。CLIとテストで使う。
#[derive(Debug)]
pub struct HeadlessView {
    row_height: i32,
    width: i32,
    viewport_height: i32,
    scroll_y: i32,
    expanded: HashSet<NodeId>,
    selected: HashSet<NodeId>,
    rows: Vec<NodeId>,
    row_index: HashMap<NodeId, usize>,
    last_scroll: Option<Rect>,
    last_scrolled_node: Option<NodeId>,
    label_events: usize,
    children_events: usize,
}

impl HeadlessView {
    pub fn new(viewport_rows: usize) -> Self {
        let row_height = 16;
        Self {
            row_height,
            width: 400,
            viewport_height: row_height * viewport_rows as i32,
            scroll_y: 0,
            expanded: HashSet::new(),
            selected: HashSet::new(),
            rows: Vec::new(),
            row_index: HashMap::new(),
            last_scroll: None,
            last_scrolled_node: None,
            label_events: 0,
            children_events: 0,
        }
    }

    pub fn rows(&self) -> &[NodeId] {
        &self.rows
    }

    /// 直前にスクロールした領域
    pub fn last_scroll(&self) -> Option<Rect> {
        self.last_scroll
    }

    pub fn last_scrolled_node(&self) -> Option<NodeId> {
        self.last_scrolled_node
    }

    pub fn selected(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.selected.iter().copied()
    }

    /// 表示位置を直接動かす
    pub fn set_scroll(&mut self, y: i32) {
        self.scroll_y = y.max(0);
    }

    pub fn label_events(&self) -> usize {
        self.label_events
    }

    pub fn children_events(&self) -> usize {
        self.children_events
    }
}

impl Default for HeadlessView {
    fn default() -> Self {
        Self::new(20)
    }
}

impl TreeView for HeadlessView {
    fn label_changed(&mut self, _node: NodeId) {
        self.label_events += 1;
    }

    fn children_changed(&mut self, _node: NodeId, _scroll_hint: bool) {
        self.children_events += 1;
    }

    fn layout(&mut self, rows: &[NodeId]) {
        self.rows = rows.to_vec();
        self.row_index = rows.iter().enumerate().map(|(i, id)| (*id, i)).collect();
    }

    fn node_removed(&mut self, node: NodeId) {
        self.expanded.remove(&node);
        self.selected.remove(&node);
    }

    fn is_expanded(&self, node: NodeId) -> bool {
        self.expanded.contains(&node)
    }

    fn is_selected(&self, node: NodeId) -> bool {
        self.selected.contains(&node)
    }

    fn expand(&mut self, node: NodeId) {
        self.expanded.insert(node);
    }

    fn collapse(&mut self, node: NodeId) {
        self.expanded.remove(&node);
    }

    fn select(&mut self, node: NodeId) {
        self.selected.clear();
        self.selected.insert(node);
    }

    fn visible_rect(&self) -> Option<Rect> {
        Some(Rect::new(0, self.scroll_y, self.width, self.viewport_height))
    }

    fn node_bounds(&self, node: NodeId) -> Option<Rect> {
        let row = *self.row_index.get(&node)? as i32;
        Some(Rect::new(0, row * self.row_height, self.width, self.row_height))
    }

    fn scroll_to_rect(&mut self, rect: Rect) {
        let visible = Rect::new(0, self.scroll_y, self.width, self.viewport_height);
        if !visible.contains(&rect) {
            self.scroll_y = if rect.y < self.scroll_y {
                rect.y
            } else {
                (rect.bottom() - self.viewport_height).max(0)
            };
        }
        self.last_scroll = Some(rect);
    }

    fn scroll_to_node(&mut self, node: NodeId) {
        if let Some(bounds) = self.node_bounds(node) {
            self.scroll_to_rect(bounds);
        }
        self.last_scrolled_node = Some(node);
    }
}
