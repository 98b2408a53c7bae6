//! 記述子の履歴
//!
//! ツリーを再構築する前の記述子をスレッドごとに保持し、再構築時に
//! 同じキーの記述子と対応付ける。マネージャスレッドだけが触る。

use crate::descriptor::{Descriptor, DescriptorKey, KindTag};
use kokia_target::ThreadId;
use std::collections::{HashMap, VecDeque};
use tracing::debug;

/// 履歴を持つツリーコントローラの識別子
pub type ControllerId = u64;

/// 履歴のキー（スレッドが選択されていなければ `None`）
pub type HistoryKey = Option<ThreadId>;

/// 1つのツリーの履歴
#[derive(Debug)]
pub struct HistoryCache {
    capacity: usize,
    entries: HashMap<HistoryKey, HashMap<DescriptorKey, Descriptor>>,
    /// 古いものから順
    order: VecDeque<HistoryKey>,
    active: HistoryKey,
}

impl HistoryCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: HashMap::new(),
            order: VecDeque::new(),
            active: None,
        }
    }

    /// 直前のツリーを `previous` の履歴として保存し、`current` の履歴を有効にする
    ///
    /// メッセージしかないツリーでは既存の履歴を上書きしない。
    pub fn set_history(
        &mut self,
        previous: HistoryKey,
        snapshot: Vec<Descriptor>,
        current: HistoryKey,
    ) {
        let descriptors: HashMap<DescriptorKey, Descriptor> = snapshot
            .into_iter()
            .filter(|d| d.tag() != KindTag::Message)
            .map(|d| (d.key().clone(), d))
            .collect();
        if !descriptors.is_empty() {
            debug!(thread = ?previous, count = descriptors.len(), "history saved");
            self.entries.insert(previous, descriptors);
            self.touch(previous);
        }

        self.entries.entry(current).or_default();
        self.touch(current);
        self.active = current;
        self.evict();
    }

    /// 有効な履歴から同じキーの記述子を探す
    pub fn lookup(&self, key: &DescriptorKey) -> Option<&Descriptor> {
        self.entries.get(&self.active)?.get(key)
    }

    pub fn active(&self) -> HistoryKey {
        self.active
    }

    /// 履歴を持つスレッド数
    pub fn thread_count(&self) -> usize {
        self.entries.len()
    }

    pub fn contains_thread(&self, thread: HistoryKey) -> bool {
        self.entries.contains_key(&thread)
    }

    fn touch(&mut self, key: HistoryKey) {
        self.order.retain(|k| *k != key);
        self.order.push_back(key);
    }

    fn evict(&mut self) {
        while self.order.len() > self.capacity {
            let Some(oldest) = self.order.iter().position(|k| *k != self.active) else {
                break;
            };
            if let Some(key) = self.order.remove(oldest) {
                debug!(thread = ?key, "history evicted");
                self.entries.remove(&key);
            }
        }
    }
}

/// コントローラごとの履歴
#[derive(Debug, Default)]
pub struct HistoryStore {
    caches: HashMap<ControllerId, HistoryCache>,
}

impl HistoryStore {
    pub fn get(&self, id: ControllerId) -> Option<&HistoryCache> {
        self.caches.get(&id)
    }

    pub fn get_or_create(&mut self, id: ControllerId, capacity: usize) -> &mut HistoryCache {
        self.caches
            .entry(id)
            .or_insert_with(|| HistoryCache::new(capacity))
    }

    pub fn remove(&mut self, id: ControllerId) -> Option<HistoryCache> {
        self.caches.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.caches.len()
    }

    pub fn is_empty(&self) -> bool {
        self.caches.is_empty()
    }
}
