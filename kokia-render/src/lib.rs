//! Kokia 値レンダラ
//!
//! このクレートは、リモート値を表示テキストと子要素に変換する
//! 差し替え可能なレンダラを提供します。
//! 子要素はインクリメンタルに [`ChildrenSink`] へ渡されます。

pub mod builtin;
pub mod config;
pub mod registry;
pub mod renderer;
pub mod text;

pub use builtin::{ArrayRenderer, ObjectRenderer, PrimitiveRenderer, StringRenderer};
pub use config::RenderConfig;
pub use registry::RendererRegistry;
pub use renderer::{ChildSpec, ChildrenSink, Renderer};
pub use text::{escape_string, truncate_chars};

/// レンダラの結果型
pub type Result<T> = anyhow::Result<T>;
