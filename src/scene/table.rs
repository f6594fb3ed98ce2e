//! 按稳定 id 持有对象的表
//!
//! 表拥有对象，其他地方只保存 [`Id<T>`]。初始化阶段单线程写入，
//! `freeze()` 之后不再接受插入，但已有条目仍可原地修改（材质动画）。

use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

use crate::core::error::{Result, SceneError};

/// 表内条目的稳定 id
pub struct Id<T> {
    index: u32,
    _marker: PhantomData<fn() -> T>,
}

impl<T> Id<T> {
    fn new(index: usize) -> Self {
        Self { index: index as u32, _marker: PhantomData }
    }

    /// 条目在表中的位置
    pub fn index(&self) -> usize {
        self.index as usize
    }
}

// 手写实现，避免派生宏给 T 加上多余的约束
impl<T> Clone for Id<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for Id<T> {}

impl<T> PartialEq for Id<T> {
    fn eq(&self, other: &Self) -> bool {
        self.index == other.index
    }
}

impl<T> Eq for Id<T> {}

impl<T> Hash for Id<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.index.hash(state);
    }
}

impl<T> fmt::Debug for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Id({})", self.index)
    }
}

/// 按名称和 id 双向查找的拥有型表
#[derive(Debug)]
pub struct Table<T> {
    entries: Vec<T>,
    names: Vec<String>,
    by_name: HashMap<String, Id<T>>,
    frozen: bool,
}

impl<T> Default for Table<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            names: Vec::new(),
            by_name: HashMap::new(),
            frozen: false,
        }
    }
}

impl<T> Table<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// 插入条目
    ///
    /// # 返回值
    ///
    /// 新条目的 id；名称重复或表已冻结时返回错误
    pub fn insert(&mut self, name: impl Into<String>, value: T) -> Result<Id<T>> {
        let name = name.into();
        if self.frozen {
            return Err(SceneError::Frozen(name).into());
        }
        if self.by_name.contains_key(&name) {
            return Err(SceneError::DuplicateName(name).into());
        }

        let id = Id::new(self.entries.len());
        self.entries.push(value);
        self.names.push(name.clone());
        self.by_name.insert(name, id);
        Ok(id)
    }

    /// 冻结表，之后的插入都会失败
    pub fn freeze(&mut self) {
        self.frozen = true;
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// 按名称查找 id
    pub fn id_of(&self, name: &str) -> Result<Id<T>> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SceneError::UnknownName(name.to_string()).into())
    }

    pub fn get(&self, id: Id<T>) -> &T {
        &self.entries[id.index()]
    }

    pub fn get_mut(&mut self, id: Id<T>) -> &mut T {
        &mut self.entries[id.index()]
    }

    pub fn name(&self, id: Id<T>) -> &str {
        &self.names[id.index()]
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// 按插入顺序遍历
    pub fn iter(&self) -> impl Iterator<Item = (Id<T>, &T)> {
        self.entries.iter().enumerate().map(|(i, e)| (Id::new(i), e))
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Id<T>, &mut T)> {
        self.entries.iter_mut().enumerate().map(|(i, e)| (Id::new(i), e))
    }
}
