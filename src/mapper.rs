use crate::registry;
use crate::types::{BlockKey, BlockTypeMapping, MappingKind};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use tracing::{debug, warn};

/// 经典格式数字ID到内部类型的静态映射表
const ID_TABLE: &[(u16, &str)] = &[
    (1, "stone"),
    (2, "grass"),
    (3, "dirt"),
    (4, "cobblestone"),
    (5, "plank"),
    (8, "water"),
    (9, "water"),
    (12, "sand"),
    (13, "gravel"),
    (17, "log"),
    (18, "leaves"),
    (20, "glass"),
    (35, "wool"),
    (45, "brick"),
    (78, "snow"),
    (80, "snow"),
];

/// 树状格式字符串名称到内部类型的静态映射表
const NAME_TABLE: &[(&str, &str)] = &[
    ("minecraft:stone", "stone"),
    ("minecraft:cobblestone", "cobblestone"),
    ("minecraft:dirt", "dirt"),
    ("minecraft:grass_block", "grass"),
    ("minecraft:grass", "grass"),
    ("minecraft:planks", "plank"),
    ("minecraft:oak_planks", "plank"),
    ("minecraft:spruce_planks", "plank"),
    ("minecraft:birch_planks", "plank"),
    ("minecraft:log", "log"),
    ("minecraft:oak_log", "log"),
    ("minecraft:spruce_log", "log"),
    ("minecraft:leaves", "leaves"),
    ("minecraft:oak_leaves", "leaves"),
    ("minecraft:bricks", "brick"),
    ("minecraft:brick_block", "brick"),
    ("minecraft:glass", "glass"),
    ("minecraft:sand", "sand"),
    ("minecraft:gravel", "gravel"),
    ("minecraft:wool", "wool"),
    ("minecraft:white_wool", "wool"),
    ("minecraft:snow", "snow"),
    ("minecraft:snow_block", "snow"),
    ("minecraft:water", "water"),
];

/// 审计条目的接收端；刷写失败由映射器记录日志，不向上传播
pub trait AuditSink {
    fn flush(&mut self, entries: &[BlockTypeMapping]) -> io::Result<()>;
}

/// 把审计条目逐行追加为JSON的文件接收端
pub struct JsonlAuditSink {
    path: PathBuf,
}

impl JsonlAuditSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl AuditSink for JsonlAuditSink {
    fn flush(&mut self, entries: &[BlockTypeMapping]) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        let mut writer = BufWriter::new(file);
        for entry in entries {
            let line = serde_json::to_string(entry)
                .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
            writeln!(writer, "{}", line)?;
        }
        writer.flush()
    }
}

/// 审计日志的两表导出形式（按数字ID、按字符串名称）
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditTables {
    pub by_id: Vec<BlockTypeMapping>,
    pub by_name: Vec<BlockTypeMapping>,
}

/// 方块映射器
///
/// 把外部方块键转换为内部类型ID，策略是确定性的：
/// 数字0与空气名称映射为哨兵"air"，查不到的键一律回退到"stone"，
/// 映射结果返回前还要确认其在内部注册表中存在。
/// 缓存键为 (类别, 源键, 源文件)，保证重复查询幂等且只产生一条审计记录。
pub struct BlockMapper {
    cache: HashMap<(MappingKind, String, String), &'static str>,
    log: Vec<BlockTypeMapping>,
    flushed: usize,
    sink: Option<Box<dyn AuditSink>>,
}

impl BlockMapper {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            log: Vec::new(),
            flushed: 0,
            sink: None,
        }
    }

    /// 挂接审计接收端
    pub fn with_sink(mut self, sink: Box<dyn AuditSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// 把一个外部方块键映射为内部类型ID
    pub fn map(&mut self, key: &BlockKey, source_file: &str) -> &'static str {
        let cache_key = (key.kind(), key.to_string(), source_file.to_string());
        if let Some(&mapped) = self.cache.get(&cache_key) {
            return mapped;
        }

        let mapped = resolve(key);
        self.cache.insert(cache_key, mapped);
        self.log.push(BlockTypeMapping {
            source_key: key.to_string(),
            mapping_kind: key.kind(),
            mapped_type_id: mapped.to_string(),
            source_file: source_file.to_string(),
        });
        mapped
    }

    /// 全部审计记录（含未刷写的）
    pub fn audit_log(&self) -> &[BlockTypeMapping] {
        &self.log
    }

    /// 按类别拆分的两表导出
    pub fn audit_tables(&self) -> AuditTables {
        let (by_id, by_name) = self
            .log
            .iter()
            .cloned()
            .partition(|entry| entry.mapping_kind == MappingKind::Id);
        AuditTables { by_id, by_name }
    }

    /// 把积压的审计条目批量刷写到接收端
    ///
    /// 刷写失败只记日志，条目保留在队列中等待下次刷写
    pub fn flush_audit(&mut self) {
        if self.flushed >= self.log.len() {
            return;
        }
        let Some(sink) = self.sink.as_mut() else {
            return;
        };
        match sink.flush(&self.log[self.flushed..]) {
            Ok(()) => self.flushed = self.log.len(),
            Err(e) => warn!("映射审计刷写失败: {}", e),
        }
    }
}

impl Default for BlockMapper {
    fn default() -> Self {
        Self::new()
    }
}

fn resolve(key: &BlockKey) -> &'static str {
    let candidate = match key {
        BlockKey::Id(0) => registry::AIR,
        BlockKey::Id(id) => ID_TABLE
            .iter()
            .find(|(k, _)| k == id)
            .map(|(_, mapped)| *mapped)
            .unwrap_or_else(|| {
                debug!("未知的数字方块ID {}，回退到 {}", id, registry::FALLBACK);
                registry::FALLBACK
            }),
        BlockKey::Name(name) => {
            if is_air_name(name) {
                registry::AIR
            } else {
                NAME_TABLE
                    .iter()
                    .find(|(k, _)| *k == name.as_str())
                    .map(|(_, mapped)| *mapped)
                    .unwrap_or_else(|| {
                        debug!("未知的方块名称 {}，回退到 {}", name, registry::FALLBACK);
                        registry::FALLBACK
                    })
            }
        }
    };

    // 映射表条目必须真实存在于内部注册表，否则同样回退
    match registry::canonical(candidate) {
        Some(id) => id,
        None => registry::FALLBACK,
    }
}

/// 空气的各种外部写法（含带命名空间的）
fn is_air_name(name: &str) -> bool {
    let path = name.rsplit(':').next().unwrap_or(name);
    matches!(path, "air" | "cave_air" | "void_air")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    #[test]
    fn id_zero_and_air_names_map_to_air() {
        let mut mapper = BlockMapper::new();
        assert_eq!(mapper.map(&BlockKey::Id(0), "a.schematic"), "air");
        assert_eq!(
            mapper.map(&BlockKey::Name("minecraft:air".into()), "a.nbt"),
            "air"
        );
        assert_eq!(
            mapper.map(&BlockKey::Name("minecraft:cave_air".into()), "a.nbt"),
            "air"
        );
    }

    #[test]
    fn unknown_keys_fall_back_to_stone() {
        let mut mapper = BlockMapper::new();
        assert_eq!(mapper.map(&BlockKey::Id(999), "a.schematic"), "stone");
        assert_eq!(
            mapper.map(&BlockKey::Name("mystery_block".into()), "a.nbt"),
            "stone"
        );
    }

    #[test]
    fn mapping_is_idempotent_with_single_audit_entry() {
        let mut mapper = BlockMapper::new();
        let key = BlockKey::Name("minecraft:oak_planks".into());
        let first = mapper.map(&key, "hut.nbt");
        let second = mapper.map(&key, "hut.nbt");

        assert_eq!(first, "plank");
        assert_eq!(first, second);
        assert_eq!(mapper.audit_log().len(), 1);

        // 不同源文件算不同的查询，各有一条审计记录
        mapper.map(&key, "tower.nbt");
        assert_eq!(mapper.audit_log().len(), 2);
    }

    #[test]
    fn fallback_recorded_with_source_file() {
        let mut mapper = BlockMapper::new();
        mapper.map(&BlockKey::Name("mystery_block".into()), "cave.nbt");

        let tables = mapper.audit_tables();
        assert!(tables.by_id.is_empty());
        assert_eq!(tables.by_name.len(), 1);
        assert_eq!(tables.by_name[0].mapped_type_id, "stone");
        assert_eq!(tables.by_name[0].source_file, "cave.nbt");
    }

    struct SharedSink(Rc<RefCell<Vec<BlockTypeMapping>>>);

    impl AuditSink for SharedSink {
        fn flush(&mut self, entries: &[BlockTypeMapping]) -> io::Result<()> {
            self.0.borrow_mut().extend_from_slice(entries);
            Ok(())
        }
    }

    #[test]
    fn flush_delivers_each_entry_once() {
        let delivered = Rc::new(RefCell::new(Vec::new()));
        let mut mapper = BlockMapper::new().with_sink(Box::new(SharedSink(delivered.clone())));

        mapper.map(&BlockKey::Id(1), "a.schematic");
        mapper.flush_audit();
        mapper.map(&BlockKey::Id(2), "a.schematic");
        mapper.flush_audit();
        mapper.flush_audit();

        let delivered = delivered.borrow();
        assert_eq!(delivered.len(), 2);
        assert_eq!(delivered[0].source_key, "1");
        assert_eq!(delivered[1].source_key, "2");
    }

    struct FailingSink;

    impl AuditSink for FailingSink {
        fn flush(&mut self, _: &[BlockTypeMapping]) -> io::Result<()> {
            Err(io::Error::new(io::ErrorKind::Other, "磁盘不可用"))
        }
    }

    #[test]
    fn flush_failure_does_not_abort_mapping() {
        let mut mapper = BlockMapper::new().with_sink(Box::new(FailingSink));
        mapper.map(&BlockKey::Id(1), "a.schematic");
        mapper.flush_audit();
        // 失败后映射照常工作，条目保留
        assert_eq!(mapper.map(&BlockKey::Id(1), "a.schematic"), "stone");
        assert_eq!(mapper.audit_log().len(), 1);
    }
}
