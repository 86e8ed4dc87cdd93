use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::SchematicFormat;

/// 蓝图内的方块位置（局部坐标，以蓝图原点为基准）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BlockPos {
    pub x: i32,
    pub y: i32,
    pub z: i32,
}

impl BlockPos {
    pub fn new(x: i32, y: i32, z: i32) -> Self {
        Self { x, y, z }
    }
}

impl fmt::Display for BlockPos {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.x, self.y, self.z)
    }
}

/// 世界坐标（摆放建筑时使用）
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct WorldPos {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl WorldPos {
    pub fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }
}

/// 蓝图尺寸（宽、高、长）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Dimensions {
    pub w: u32,
    pub h: u32,
    pub l: u32,
}

impl Dimensions {
    pub fn new(w: u32, h: u32, l: u32) -> Self {
        Self { w, h, l }
    }

    /// 体积（方块总数）
    pub fn volume(&self) -> usize {
        self.w as usize * self.h as usize * self.l as usize
    }

    /// 判断局部坐标是否落在 [0, 尺寸) 范围内
    pub fn contains(&self, pos: &BlockPos) -> bool {
        pos.x >= 0
            && pos.y >= 0
            && pos.z >= 0
            && (pos.x as u32) < self.w
            && (pos.y as u32) < self.h
            && (pos.z as u32) < self.l
    }
}

/// 外部方块标识：经典格式用数字ID，树状格式用字符串名称
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum BlockKey {
    Id(u16),
    Name(String),
}

impl BlockKey {
    pub fn kind(&self) -> MappingKind {
        match self {
            BlockKey::Id(_) => MappingKind::Id,
            BlockKey::Name(_) => MappingKind::Name,
        }
    }
}

impl fmt::Display for BlockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlockKey::Id(id) => write!(f, "{}", id),
            BlockKey::Name(name) => write!(f, "{}", name),
        }
    }
}

/// 映射类别：按数字ID或按字符串名称
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MappingKind {
    Id,
    Name,
}

/// 解析阶段产生的原始方块记录，仅在解析到映射之间存活
#[derive(Debug, Clone)]
pub struct RawBlockRecord {
    pub key: BlockKey,
    /// 附加元数据（经典格式的Data字节，树状格式无此数据时为0）
    pub aux: u8,
    pub pos: BlockPos,
}

/// 解析器的输出：声明的尺寸加上有序的原始方块记录
#[derive(Debug, Clone)]
pub struct ParsedStructure {
    pub format: SchematicFormat,
    pub dimensions: Dimensions,
    pub records: Vec<RawBlockRecord>,
    pub source_file: String,
}

/// 映射审计记录，按 (类别, 源键, 源文件) 去重，只追加不修改
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockTypeMapping {
    pub source_key: String,
    pub mapping_kind: MappingKind,
    pub mapped_type_id: String,
    pub source_file: String,
}

/// 蓝图中的单个方块
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlueprintBlock {
    pub block_type_id: String,
    pub position: BlockPos,
}

/// 建筑难度
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl fmt::Display for Difficulty {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Difficulty::Easy => write!(f, "easy"),
            Difficulty::Medium => write!(f, "medium"),
            Difficulty::Hard => write!(f, "hard"),
        }
    }
}

/// 已建成建筑的持久化记录；不保存方块几何，重建时按蓝图ID重新生成
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuiltStructure {
    pub id: String,
    pub blueprint_id: String,
    pub name: String,
    pub difficulty: Difficulty,
    pub position: WorldPos,
    pub created_at: DateTime<Utc>,
}

/// 摆放网格中的单个格子
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GridCell {
    pub grid_x: i32,
    pub grid_z: i32,
    pub occupied: bool,
    pub structure_id: Option<String>,
}
