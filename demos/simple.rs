use mcbuilder::blueprint::{build_blueprint, BlueprintLibrary, BlueprintMeta};
use mcbuilder::grid::PlacementGrid;
use mcbuilder::manager::StructureManager;
use mcbuilder::mapper::BlockMapper;
use mcbuilder::store::StructureStore;
use mcbuilder::types::{BlockPos, BlueprintBlock, Difficulty, Dimensions};
use mcbuilder::McbError;

fn main() -> Result<(), McbError> {
    // 构造一个示例蓝图：3x2x3的石头小屋，中间一层是木板
    println!("创建示例蓝图...");
    let mut blocks = Vec::new();
    for x in 0..3 {
        for z in 0..3 {
            blocks.push(BlueprintBlock {
                block_type_id: "stone".to_string(),
                position: BlockPos::new(x, 0, z),
            });
            blocks.push(BlueprintBlock {
                block_type_id: if x == 1 && z == 1 { "air" } else { "plank" }.to_string(),
                position: BlockPos::new(x, 1, z),
            });
        }
    }

    let blueprint = build_blueprint(
        Dimensions::new(3, 2, 3),
        blocks,
        BlueprintMeta {
            id: "demo_hut".to_string(),
            name: "示例小屋".to_string(),
            difficulty: Difficulty::Easy,
            from_file: false,
            original_filename: None,
            fingerprint: None,
        },
    )?;
    println!(
        "蓝图 {} 尺寸 {}x{}x{}，非空气方块 {} 个",
        blueprint.id,
        blueprint.dimensions.w,
        blueprint.dimensions.h,
        blueprint.dimensions.l,
        blueprint.total_non_air_blocks()
    );

    // 组装管线：蓝图库 + 映射器 + 摆放网格 + 持久化存储
    let store_path = std::env::temp_dir().join("mcbuilder_demo_structures.json");
    let mut library = BlueprintLibrary::new();
    library.insert(blueprint);
    let mut manager = StructureManager::new(
        library,
        BlockMapper::new(),
        PlacementGrid::new(),
        StructureStore::open(&store_path)?,
    );

    // 模拟建造：逐个收集方块
    println!("\n开始建造...");
    manager.start_build("demo_hut")?;
    for _ in 0..9 {
        manager.collect("stone", None)?;
    }
    for _ in 0..8 {
        manager.collect("plank", None)?;
    }
    let session = manager.session().expect("会话存在");
    println!(
        "进度 {:.0}%，阶段 {:?}",
        session.progress() * 100.0,
        session.phase()
    );

    // 确认建造：预订格子、落盘记录
    let record = manager.confirm_build(None)?;
    println!(
        "\n建筑 {} 已摆放到 [{:.1}, {:.1}, {:.1}]",
        record.id, record.position.x, record.position.y, record.position.z
    );

    // 发出的事件
    println!("\n事件:");
    for event in manager.drain_events() {
        println!("  {}", serde_json::to_string(&event)?);
    }

    // 从存档重建（几何按蓝图重新生成）
    println!("\n重建存档中的建筑:");
    for rehydrated in manager.load_persisted()? {
        println!(
            "  {} ({}) 共 {} 个方块",
            rehydrated.record.id,
            rehydrated.record.name,
            rehydrated.blocks.len()
        );
    }

    // 清理演示数据
    manager.delete_all()?;
    println!("\n演示数据已清理");
    Ok(())
}
