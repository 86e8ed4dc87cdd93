// 内部方块类型注册表
// 词汇表是固定的：渲染端按这些ID选择网格与贴图
// "air"是注册类型，但永远不计入建造进度

/// 空气哨兵类型
pub const AIR: &str = "air";

/// 无法解析的外部方块键的确定性回退类型
pub const FALLBACK: &str = "stone";

/// (内部类型ID, 展示名称)
const BLOCK_TYPES: &[(&str, &str)] = &[
    ("air", "空气"),
    ("stone", "石头"),
    ("cobblestone", "圆石"),
    ("dirt", "泥土"),
    ("grass", "草方块"),
    ("plank", "木板"),
    ("log", "原木"),
    ("leaves", "树叶"),
    ("brick", "砖块"),
    ("glass", "玻璃"),
    ("sand", "沙子"),
    ("gravel", "沙砾"),
    ("wool", "羊毛"),
    ("snow", "雪块"),
    ("water", "水"),
];

/// 判断类型ID是否在注册表中
pub fn is_registered(type_id: &str) -> bool {
    BLOCK_TYPES.iter().any(|(id, _)| *id == type_id)
}

/// 返回注册表中的静态类型ID（避免到处克隆字符串）
pub fn canonical(type_id: &str) -> Option<&'static str> {
    BLOCK_TYPES
        .iter()
        .find(|(id, _)| *id == type_id)
        .map(|(id, _)| *id)
}

/// 类型ID的展示名称
pub fn display_name(type_id: &str) -> Option<&'static str> {
    BLOCK_TYPES
        .iter()
        .find(|(id, _)| *id == type_id)
        .map(|(_, name)| *name)
}

/// 全部注册类型
pub fn all_types() -> &'static [(&'static str, &'static str)] {
    BLOCK_TYPES
}
