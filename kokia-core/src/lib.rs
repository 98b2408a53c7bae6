//! Kokia 変数ツリーのコア
//!
//! このクレートは、デバッガの変数・スレッド・ウォッチのツリーを提供します。
//! デバッグ対象との通信は専用のマネージャスレッドに集約し、UIスレッドは
//! コマンドの投入と結果イベントの反映だけを行います。
//! 停止のたびにツリーを作り直し、前回の展開・選択・スクロール位置と
//! 値の変化を引き継ぎます。

mod build;
mod command;
pub mod config;
pub mod context;
pub mod descriptor;
pub mod errors;
pub mod event;
pub mod history;
pub mod manager;
pub mod node;
pub mod node_manager;
pub mod session;
pub mod tree;
pub mod value;
pub mod view;

pub use config::TreeConfig;
pub use context::DebuggerContext;
pub use descriptor::{
    Descriptor, DescriptorKey, DescriptorKind, KeyPart, KindTag, MessageDescriptor, MessageKind,
    UiState,
};
pub use errors::CoreError;
pub use event::TreeEvent;
pub use manager::{ManagerCommand, ManagerEnv, ManagerError, ManagerHandle, ManagerThread, Priority};
pub use node::{Icon, NodeId, NodeState, TreeNode};
pub use session::{DebugSession, SessionEvent};
pub use tree::{DebuggerTree, ViewKind};
pub use value::ValueData;
pub use view::{HeadlessView, Rect, TreeView};

/// コアの結果型
pub type Result<T> = anyhow::Result<T>;
