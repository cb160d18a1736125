//! Crate - ワーカーを持たない単純な ID→値 ストア
//!
//! 画像バッファ、ランタイム間の値参照、端末スタイル、GPU バッファなど、
//! 直列化キューを必要としない値を保持します。
//! 変更系（add / remove / get_mut）は `&mut self` を取るので、
//! 「変更するのはスクリプトスレッドだけ」という契約は借用チェッカが保証します。

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::domain::{EaselError, EaselResult};
use crate::ports::{IdGenerator, SequentialIds};

/// Identifier of a value in a `Crate<V>`.
pub struct CrateId<V> {
    raw: u64,
    _value: PhantomData<fn() -> V>,
}

impl<V> CrateId<V> {
    pub const fn from_raw(raw: u64) -> Self {
        Self {
            raw,
            _value: PhantomData,
        }
    }

    pub const fn as_raw(self) -> u64 {
        self.raw
    }
}

impl<V> Clone for CrateId<V> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<V> Copy for CrateId<V> {}

impl<V> PartialEq for CrateId<V> {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl<V> Eq for CrateId<V> {}

impl<V> Hash for CrateId<V> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.raw.hash(state);
    }
}

impl<V> fmt::Debug for CrateId<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CrateId({})", self.raw)
    }
}

/// Named map from issued ids to values.
pub struct Crate<V> {
    name: &'static str,
    ids: SequentialIds,
    entries: HashMap<u64, V>,
}

impl<V> Crate<V> {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            ids: SequentialIds::new(),
            entries: HashMap::new(),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn add(&mut self, value: V) -> CrateId<V> {
        let id = CrateId::from_raw(self.ids.next_raw());
        self.entries.insert(id.raw, value);
        id
    }

    pub fn get(&self, id: CrateId<V>) -> EaselResult<&V> {
        self.entries
            .get(&id.raw)
            .ok_or_else(|| self.missing(id))
    }

    pub fn get_mut(&mut self, id: CrateId<V>) -> EaselResult<&mut V> {
        let missing = self.missing(id);
        self.entries.get_mut(&id.raw).ok_or(missing)
    }

    pub fn remove(&mut self, id: CrateId<V>) -> EaselResult<V> {
        let missing = self.missing(id);
        self.entries.remove(&id.raw).ok_or(missing)
    }

    pub fn contains(&self, id: CrateId<V>) -> bool {
        self.entries.contains_key(&id.raw)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn missing(&self, id: CrateId<V>) -> EaselError {
        EaselError::not_found(format!("{}#{}", self.name, id.raw))
    }
}

impl<V> fmt::Debug for Crate<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Crate")
            .field("name", &self.name)
            .field("len", &self.entries.len())
            .finish()
    }
}
