use crate::types::{Difficulty, WorldPos};
use serde::Serialize;

/// 发往协作方（渲染端等）的结构事件
///
/// 位置占用查询与重新定位属于请求/响应式接口，
/// 由 [`crate::manager::StructureManager`] 的方法直接返回结果，不走事件
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum StructureEvent {
    #[serde(rename_all = "camelCase")]
    StructureBuilt {
        blueprint_id: String,
        name: String,
        difficulty: Difficulty,
        position: Option<WorldPos>,
    },
    #[serde(rename_all = "camelCase")]
    StructureDeleted { id: String },
    AllStructuresDeleted,
    StructuresReloaded,
}
