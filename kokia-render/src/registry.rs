//! レンダラの登録と選択

use crate::builtin::{ArrayRenderer, ObjectRenderer, PrimitiveRenderer, StringRenderer};
use crate::renderer::Renderer;
use crate::{RenderConfig, Result};
use kokia_target::Value;
use std::sync::Arc;

/// レンダラ一覧
///
/// 先に登録されたものほど優先される（ユーザー定義レンダラは先頭に入る）。
#[derive(Clone)]
pub struct RendererRegistry {
    renderers: Vec<Arc<dyn Renderer>>,
}

impl RendererRegistry {
    /// 組み込みレンダラで初期化する
    pub fn new(config: &RenderConfig) -> Self {
        Self {
            renderers: vec![
                Arc::new(StringRenderer::new(config)),
                Arc::new(ArrayRenderer::new(config)),
                Arc::new(ObjectRenderer),
                Arc::new(PrimitiveRenderer),
            ],
        }
    }

    /// レンダラを優先度最高で登録する
    pub fn register(&mut self, renderer: Arc<dyn Renderer>) {
        self.renderers.insert(0, renderer);
    }

    /// 名前で検索する
    pub fn find(&self, name: &str) -> Result<Arc<dyn Renderer>> {
        self.renderers
            .iter()
            .find(|r| r.name() == name)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("Unknown renderer '{}'", name))
    }

    /// 値に使うレンダラを選ぶ
    ///
    /// 割り当て済みで値に適用できるならそれを、そうでなければ自動選択する。
    pub fn select(&self, assigned: Option<&str>, value: &Value) -> Option<Arc<dyn Renderer>> {
        if let Some(name) = assigned {
            if let Some(renderer) = self
                .renderers
                .iter()
                .find(|r| r.name() == name && r.is_applicable(value))
            {
                return Some(renderer.clone());
            }
        }
        self.renderers
            .iter()
            .find(|r| r.is_applicable(value))
            .cloned()
    }

    /// 登録済みレンダラ名の一覧
    pub fn names(&self) -> Vec<String> {
        self.renderers.iter().map(|r| r.name().to_string()).collect()
    }
}

impl Default for RendererRegistry {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}
