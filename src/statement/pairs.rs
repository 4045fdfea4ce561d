//! 列名 / 字面量值对

use serde::Serialize;

/// 从 SQL 表达式中抽取出的一个（列名，字面量）对
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct KVPair {
    pub column: String,
    pub value: String,
}

impl KVPair {
    pub fn new<C: Into<String>, V: Into<String>>(column: C, value: V) -> Self {
        Self { column: column.into(), value: value.into() }
    }
}

/// 只追加的键值对集合
///
/// 由表达式遍历独占构建，子表达式的结果通过 [`KVPairs::merge`] 合并。
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct KVPairs {
    pairs: Vec<KVPair>,
}

impl KVPairs {
    pub fn new() -> Self {
        Self::default()
    }

    /// 追加一对；列名或值为空时忽略
    pub fn add(&mut self, column: Option<&str>, value: Option<&str>) {
        match (column, value) {
            (Some(column), Some(value))
                if !column.is_empty() && !value.is_empty() =>
            {
                self.pairs.push(KVPair::new(column, value));
            }
            _ => {}
        }
    }

    pub fn merge(&mut self, other: KVPairs) {
        self.pairs.extend(other.pairs);
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &KVPair> {
        self.pairs.iter()
    }

    pub fn into_vec(self) -> Vec<KVPair> {
        self.pairs
    }
}

impl IntoIterator for KVPairs {
    type Item = KVPair;
    type IntoIter = std::vec::IntoIter<KVPair>;

    fn into_iter(self) -> Self::IntoIter {
        self.pairs.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_add_ignores_empty_parts() {
        let mut pairs = KVPairs::new();
        pairs.add(Some("id"), Some("1"));
        pairs.add(Some(""), Some("1"));
        pairs.add(Some("id"), Some(""));
        pairs.add(None, Some("2"));
        pairs.add(Some("name"), None);
        assert_eq!(pairs.into_vec(), vec![KVPair::new("id", "1")]);
    }

    #[test]
    fn test_merge_keeps_order() {
        let mut left = KVPairs::new();
        left.add(Some("a"), Some("1"));
        let mut right = KVPairs::new();
        right.add(Some("b"), Some("2"));
        left.merge(right);
        let columns: Vec<_> = left.iter().map(|p| p.column.as_str()).collect();
        assert_eq!(columns, vec!["a", "b"]);
    }
}
