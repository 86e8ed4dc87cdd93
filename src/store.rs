use crate::error::McbError;
use crate::types::{BuiltStructure, WorldPos};
use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::PathBuf;

/// 建筑记录的持久化存储
///
/// 落盘形式是一个有序JSON数组；只存元数据，绝不存方块几何，
/// 重建几何时一律按蓝图ID回读蓝图（蓝图是形状的唯一事实来源）
pub struct StructureStore {
    path: PathBuf,
    records: Vec<BuiltStructure>,
}

impl StructureStore {
    /// 打开存储；文件不存在视为空存储
    pub fn open(path: impl Into<PathBuf>) -> Result<Self, McbError> {
        let path = path.into();
        let records = if path.exists() {
            let file = File::open(&path)?;
            serde_json::from_reader(BufReader::new(file))?
        } else {
            Vec::new()
        };
        Ok(Self { path, records })
    }

    /// 追加一条建筑记录并落盘
    pub fn save(&mut self, record: BuiltStructure) -> Result<(), McbError> {
        // 同ID记录只保留最新一条
        self.records.retain(|r| r.id != record.id);
        self.records.push(record);
        self.write_all()
    }

    /// 全部记录，按创建时间从旧到新排序
    pub fn load_all(&self) -> Vec<BuiltStructure> {
        let mut records = self.records.clone();
        records.sort_by_key(|r| r.created_at);
        records
    }

    /// 更新一条记录的世界位置（加载期冲突修复用）并落盘
    pub fn update_position(&mut self, id: &str, position: WorldPos) -> Result<(), McbError> {
        let record = self
            .records
            .iter_mut()
            .find(|r| r.id == id)
            .ok_or_else(|| McbError::StructureNotFound(id.to_string()))?;
        record.position = position;
        self.write_all()
    }

    /// 删除一条记录，返回被删除的内容
    pub fn delete(&mut self, id: &str) -> Result<BuiltStructure, McbError> {
        let index = self
            .records
            .iter()
            .position(|r| r.id == id)
            .ok_or_else(|| McbError::StructureNotFound(id.to_string()))?;
        let removed = self.records.remove(index);
        self.write_all()?;
        Ok(removed)
    }

    /// 删除全部记录，返回删除数量
    pub fn delete_all(&mut self) -> Result<usize, McbError> {
        let count = self.records.len();
        self.records.clear();
        self.write_all()?;
        Ok(count)
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// 先写临时文件再原地改名，崩溃时旧文件保持完整
    fn write_all(&self) -> Result<(), McbError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.path.with_extension("tmp");
        {
            let file = File::create(&tmp_path)?;
            let mut writer = BufWriter::new(file);
            serde_json::to_writer_pretty(&mut writer, &self.records)?;
            writer.flush()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Difficulty;
    use chrono::{TimeZone, Utc};

    fn record(id: &str, secs: i64) -> BuiltStructure {
        BuiltStructure {
            id: id.to_string(),
            blueprint_id: "hut".to_string(),
            name: "小屋".to_string(),
            difficulty: Difficulty::Easy,
            position: WorldPos::new(12.0, 0.0, 12.0),
            created_at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    #[test]
    fn save_and_reopen_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("structures.json");

        let mut store = StructureStore::open(&path).unwrap();
        store.save(record("bs-1", 100)).unwrap();
        store.save(record("bs-2", 50)).unwrap();

        let reopened = StructureStore::open(&path).unwrap();
        assert_eq!(reopened.len(), 2);
        assert_eq!(reopened.load_all(), store.load_all());
    }

    #[test]
    fn load_all_sorted_oldest_first() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StructureStore::open(dir.path().join("s.json")).unwrap();
        store.save(record("bs-new", 200)).unwrap();
        store.save(record("bs-old", 10)).unwrap();

        let records = store.load_all();
        assert_eq!(records[0].id, "bs-old");
        assert_eq!(records[1].id, "bs-new");
    }

    #[test]
    fn delete_removes_single_record() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = StructureStore::open(dir.path().join("s.json")).unwrap();
        store.save(record("bs-1", 1)).unwrap();
        store.save(record("bs-2", 2)).unwrap();

        let removed = store.delete("bs-1").unwrap();
        assert_eq!(removed.id, "bs-1");
        assert_eq!(store.len(), 1);
        assert!(matches!(
            store.delete("bs-1"),
            Err(McbError::StructureNotFound(_))
        ));
    }

    #[test]
    fn delete_all_clears_store() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let mut store = StructureStore::open(&path).unwrap();
        store.save(record("bs-1", 1)).unwrap();
        store.save(record("bs-2", 2)).unwrap();

        assert_eq!(store.delete_all().unwrap(), 2);
        assert!(StructureStore::open(&path).unwrap().is_empty());
    }

    #[test]
    fn update_position_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("s.json");
        let mut store = StructureStore::open(&path).unwrap();
        store.save(record("bs-1", 1)).unwrap();

        store
            .update_position("bs-1", WorldPos::new(36.0, 0.0, 60.0))
            .unwrap();

        let reopened = StructureStore::open(&path).unwrap();
        assert_eq!(reopened.load_all()[0].position, WorldPos::new(36.0, 0.0, 60.0));
    }
}
