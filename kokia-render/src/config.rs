//! レンダリング設定

/// レンダリング設定
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// 配列の最大表示要素数
    pub max_array_elements: usize,
    /// 配列の子要素を一度に渡す要素数
    pub array_chunk_size: usize,
    /// 文字列ラベルの最大表示文字数
    pub max_string_len: usize,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            max_array_elements: 100,
            array_chunk_size: 25,
            max_string_len: 256,
        }
    }
}
