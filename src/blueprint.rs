use crate::error::McbError;
use crate::mapper::BlockMapper;
use crate::registry;
use crate::schematic::parse_schematic;
use crate::types::{BlueprintBlock, Difficulty, Dimensions, ParsedStructure};
use crate::utils::content_fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// 规范化后的蓝图，校验通过后不可变
///
/// 序列化形状即渲染端消费的交换格式
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blueprint {
    pub id: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub dimensions: Dimensions,
    pub blocks: Vec<BlueprintBlock>,
    pub from_file: bool,
    pub original_filename: Option<String>,
    /// 源文件内容指纹，交换格式之外的内部元数据
    #[serde(skip)]
    pub fingerprint: Option<String>,
}

impl Blueprint {
    /// 非空气方块数量（建造进度的分母）
    pub fn total_non_air_blocks(&self) -> usize {
        self.blocks
            .iter()
            .filter(|b| b.block_type_id != registry::AIR)
            .count()
    }
}

/// 构建蓝图时的元信息
#[derive(Debug, Clone)]
pub struct BlueprintMeta {
    pub id: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub from_file: bool,
    pub original_filename: Option<String>,
    pub fingerprint: Option<String>,
}

/// 校验并构建一个蓝图
///
/// 失败时返回的校验错误指明具体未通过的检查项
pub fn build_blueprint(
    dimensions: Dimensions,
    blocks: Vec<BlueprintBlock>,
    meta: BlueprintMeta,
) -> Result<Blueprint, McbError> {
    if dimensions.w == 0 || dimensions.h == 0 || dimensions.l == 0 {
        return Err(McbError::Validation(format!(
            "尺寸必须为正数: {}x{}x{}",
            dimensions.w, dimensions.h, dimensions.l
        )));
    }
    if blocks.is_empty() {
        return Err(McbError::Validation("方块列表为空".to_string()));
    }
    for (i, block) in blocks.iter().enumerate() {
        if !dimensions.contains(&block.position) {
            return Err(McbError::Validation(format!(
                "方块[{}]的位置 {} 超出尺寸 {}x{}x{}",
                i, block.position, dimensions.w, dimensions.h, dimensions.l
            )));
        }
        if !registry::is_registered(&block.block_type_id) {
            return Err(McbError::Validation(format!(
                "方块[{}]的类型 \"{}\" 不在内部注册表中",
                i, block.block_type_id
            )));
        }
    }

    Ok(Blueprint {
        id: meta.id,
        name: meta.name,
        difficulty: meta.difficulty,
        dimensions,
        blocks,
        from_file: meta.from_file,
        original_filename: meta.original_filename,
        fingerprint: meta.fingerprint,
    })
}

/// 把解析输出经映射器转换为蓝图方块
pub fn map_records(parsed: &ParsedStructure, mapper: &mut BlockMapper) -> Vec<BlueprintBlock> {
    parsed
        .records
        .iter()
        .map(|record| BlueprintBlock {
            block_type_id: mapper.map(&record.key, &parsed.source_file).to_string(),
            position: record.pos,
        })
        .collect()
}

/// 按非空气方块数量推定导入蓝图的难度
pub fn difficulty_for_block_count(count: usize) -> Difficulty {
    match count {
        0..=32 => Difficulty::Easy,
        33..=128 => Difficulty::Medium,
        _ => Difficulty::Hard,
    }
}

/// 蓝图库：唯一持有按ID索引的蓝图缓存
pub struct BlueprintLibrary {
    cache: HashMap<String, Blueprint>,
    source_files: Vec<PathBuf>,
}

impl BlueprintLibrary {
    pub fn new() -> Self {
        Self {
            cache: HashMap::new(),
            source_files: Vec::new(),
        }
    }

    /// 注册一个（非文件来源的）蓝图
    pub fn insert(&mut self, blueprint: Blueprint) {
        self.cache.insert(blueprint.id.clone(), blueprint);
    }

    pub fn get(&self, id: &str) -> Option<&Blueprint> {
        self.cache.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.cache.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }

    /// 全部蓝图ID，按字典序
    pub fn ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.cache.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// 从容器文件导入：解析 → 映射 → 校验 → 入缓存
    pub fn import_file(
        &mut self,
        path: &Path,
        mapper: &mut BlockMapper,
    ) -> Result<&Blueprint, McbError> {
        let bytes = fs::read(path)?;
        let blueprint = blueprint_from_bytes(&bytes, path, mapper)?;
        let id = blueprint.id.clone();

        if !self.source_files.iter().any(|p| p == path) {
            self.source_files.push(path.to_path_buf());
        }
        self.cache.insert(id.clone(), blueprint);
        info!("导入蓝图 {} ({})", id, path.display());
        Ok(&self.cache[&id])
    }

    /// 重新加载全部已注册的源文件
    ///
    /// 先在新表中完整重建，全部成功后一次性替换缓存；
    /// 中途任何失败都保持旧缓存原样，读者不会看到半空状态
    pub fn reload(&mut self, mapper: &mut BlockMapper) -> Result<usize, McbError> {
        let mut fresh = HashMap::new();
        for path in &self.source_files {
            let bytes = fs::read(path)?;
            let blueprint = blueprint_from_bytes(&bytes, path, mapper)?;
            fresh.insert(blueprint.id.clone(), blueprint);
        }
        // 非文件来源的蓝图不参与重建，原样保留
        for (id, blueprint) in &self.cache {
            if !blueprint.from_file {
                fresh.insert(id.clone(), blueprint.clone());
            }
        }

        self.cache = fresh;
        info!("蓝图缓存重建完成，共 {} 个", self.cache.len());
        Ok(self.cache.len())
    }
}

impl Default for BlueprintLibrary {
    fn default() -> Self {
        Self::new()
    }
}

fn blueprint_from_bytes(
    bytes: &[u8],
    path: &Path,
    mapper: &mut BlockMapper,
) -> Result<Blueprint, McbError> {
    let filename = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let parsed = parse_schematic(bytes, &filename)?;
    let blocks = map_records(&parsed, mapper);

    let stem = path
        .file_stem()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| filename.clone());
    let id = sanitize_id(&stem);
    let non_air = blocks
        .iter()
        .filter(|b| b.block_type_id != registry::AIR)
        .count();

    build_blueprint(
        parsed.dimensions,
        blocks,
        BlueprintMeta {
            id,
            name: stem,
            difficulty: difficulty_for_block_count(non_air),
            from_file: true,
            original_filename: Some(filename),
            fingerprint: Some(content_fingerprint(bytes)),
        },
    )
}

/// 文件名到蓝图ID：小写，非字母数字折叠为下划线
fn sanitize_id(stem: &str) -> String {
    let mut id = String::with_capacity(stem.len());
    let mut last_was_sep = false;
    for c in stem.chars() {
        if c.is_ascii_alphanumeric() {
            id.push(c.to_ascii_lowercase());
            last_was_sep = false;
        } else if !last_was_sep && !id.is_empty() {
            id.push('_');
            last_was_sep = true;
        }
    }
    while id.ends_with('_') {
        id.pop();
    }
    if id.is_empty() {
        "blueprint".to_string()
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockPos;

    fn meta(id: &str) -> BlueprintMeta {
        BlueprintMeta {
            id: id.to_string(),
            name: id.to_string(),
            difficulty: Difficulty::Easy,
            from_file: false,
            original_filename: None,
            fingerprint: None,
        }
    }

    fn stone_at(x: i32, y: i32, z: i32) -> BlueprintBlock {
        BlueprintBlock {
            block_type_id: "stone".to_string(),
            position: BlockPos::new(x, y, z),
        }
    }

    #[test]
    fn rejects_zero_dimension() {
        let err = build_blueprint(Dimensions::new(0, 1, 1), vec![stone_at(0, 0, 0)], meta("a"))
            .unwrap_err();
        match err {
            McbError::Validation(reason) => assert!(reason.contains("尺寸")),
            other => panic!("期望Validation错误，实际为 {:?}", other),
        }
    }

    #[test]
    fn rejects_empty_block_list() {
        let err = build_blueprint(Dimensions::new(1, 1, 1), vec![], meta("a")).unwrap_err();
        match err {
            McbError::Validation(reason) => assert!(reason.contains("方块列表")),
            other => panic!("期望Validation错误，实际为 {:?}", other),
        }
    }

    #[test]
    fn rejects_out_of_bounds_position() {
        let err = build_blueprint(Dimensions::new(2, 2, 2), vec![stone_at(2, 0, 0)], meta("a"))
            .unwrap_err();
        match err {
            McbError::Validation(reason) => assert!(reason.contains("超出尺寸")),
            other => panic!("期望Validation错误，实际为 {:?}", other),
        }
    }

    #[test]
    fn rejects_unregistered_block_type() {
        let blocks = vec![BlueprintBlock {
            block_type_id: "mystery".to_string(),
            position: BlockPos::new(0, 0, 0),
        }];
        let err = build_blueprint(Dimensions::new(1, 1, 1), blocks, meta("a")).unwrap_err();
        assert!(matches!(err, McbError::Validation(_)));
    }

    #[test]
    fn counts_non_air_blocks() {
        let blocks = vec![
            stone_at(0, 0, 0),
            BlueprintBlock {
                block_type_id: "air".to_string(),
                position: BlockPos::new(1, 0, 0),
            },
        ];
        let blueprint =
            build_blueprint(Dimensions::new(2, 1, 1), blocks, meta("a")).unwrap();
        assert_eq!(blueprint.total_non_air_blocks(), 1);
    }

    #[test]
    fn sanitizes_file_stems() {
        assert_eq!(sanitize_id("My Castle (v2)"), "my_castle_v2");
        assert_eq!(sanitize_id("hut"), "hut");
        assert_eq!(sanitize_id("---"), "blueprint");
    }

    #[test]
    fn exchange_shape_uses_camel_case() {
        let blueprint = build_blueprint(
            Dimensions::new(1, 1, 1),
            vec![stone_at(0, 0, 0)],
            BlueprintMeta {
                id: "hut".to_string(),
                name: "hut".to_string(),
                difficulty: Difficulty::Easy,
                from_file: true,
                original_filename: Some("hut.schematic".to_string()),
                fingerprint: Some("deadbeef".to_string()),
            },
        )
        .unwrap();

        let json = serde_json::to_value(&blueprint).unwrap();
        assert_eq!(json["fromFile"], true);
        assert_eq!(json["originalFilename"], "hut.schematic");
        assert_eq!(json["dimensions"]["w"], 1);
        assert_eq!(json["blocks"][0]["blockTypeId"], "stone");
        assert_eq!(json["blocks"][0]["position"]["x"], 0);
        // 指纹是内部元数据，不进交换格式
        assert!(json.get("fingerprint").is_none());
    }
}
