//! マネージャスレッドからUIスレッドへのイベント

use crate::descriptor::Descriptor;
use crate::node::NodeId;

/// ツリーへの反映待ちの結果
///
/// `serial` はノードに対する要求の通し番号で、古い要求の結果は捨てられる。
#[derive(Debug, Clone)]
pub enum TreeEvent {
    /// 記述子の評価・ラベル計算が終わった
    DescriptorUpdated {
        node: NodeId,
        serial: u64,
        descriptor: Descriptor,
    },
    /// 子要素が揃った
    ///
    /// 段階的に届く場合、最初のまとまりだけ `replace` が立ち、
    /// 最後のまとまりに `last` が立つ。
    ChildrenReady {
        node: NodeId,
        serial: u64,
        children: Vec<Descriptor>,
        replace: bool,
        last: bool,
    },
    /// 停止コンテキストが再開されたため要求が取り消された
    Cancelled { node: NodeId, serial: u64 },
    /// 値の代入に失敗した
    SetValueFailed { node: NodeId, error: String },
}

impl TreeEvent {
    pub fn node(&self) -> NodeId {
        match self {
            TreeEvent::DescriptorUpdated { node, .. }
            | TreeEvent::ChildrenReady { node, .. }
            | TreeEvent::Cancelled { node, .. }
            | TreeEvent::SetValueFailed { node, .. } => *node,
        }
    }
}
