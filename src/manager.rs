use crate::blueprint::BlueprintLibrary;
use crate::error::McbError;
use crate::events::StructureEvent;
use crate::grid::PlacementGrid;
use crate::mapper::BlockMapper;
use crate::store::StructureStore;
use crate::tracker::{BuildPhase, ConfirmOutcome, StructureTracker};
use crate::types::{BlockPos, BlueprintBlock, BuiltStructure, WorldPos};
use crate::utils::derive_structure_id;
use chrono::Utc;
use tracing::{info, warn};

/// 从存档重建出的建筑：持久化记录 + 按蓝图重新生成的方块几何
#[derive(Debug, Clone)]
pub struct RehydratedStructure {
    pub record: BuiltStructure,
    pub blocks: Vec<BlueprintBlock>,
}

/// 结构管线的持有者
///
/// 蓝图缓存、占用网格与持久化存储都作为显式成员注入并由这里独占，
/// 组件之间不共享可变全局状态；对外通信是方法调用加一个可排空的事件队列
pub struct StructureManager {
    library: BlueprintLibrary,
    mapper: BlockMapper,
    grid: PlacementGrid,
    store: StructureStore,
    session: Option<StructureTracker>,
    events: Vec<StructureEvent>,
    seq: u64,
}

impl StructureManager {
    pub fn new(
        library: BlueprintLibrary,
        mapper: BlockMapper,
        grid: PlacementGrid,
        store: StructureStore,
    ) -> Self {
        Self {
            library,
            mapper,
            grid,
            store,
            session: None,
            events: Vec::new(),
            seq: 0,
        }
    }

    pub fn library(&self) -> &BlueprintLibrary {
        &self.library
    }

    pub fn library_mut(&mut self) -> &mut BlueprintLibrary {
        &mut self.library
    }

    pub fn mapper_mut(&mut self) -> &mut BlockMapper {
        &mut self.mapper
    }

    pub fn grid(&self) -> &PlacementGrid {
        &self.grid
    }

    pub fn store(&self) -> &StructureStore {
        &self.store
    }

    /// 当前建造会话的跟踪器
    pub fn session(&self) -> Option<&StructureTracker> {
        self.session.as_ref()
    }

    /// 取走积压的事件
    pub fn drain_events(&mut self) -> Vec<StructureEvent> {
        std::mem::take(&mut self.events)
    }

    /// 开始一个蓝图的建造会话（替换掉上一个会话）
    pub fn start_build(&mut self, blueprint_id: &str) -> Result<(), McbError> {
        let blueprint = self
            .library
            .get(blueprint_id)
            .ok_or_else(|| McbError::BlueprintNotFound(blueprint_id.to_string()))?;
        self.session = Some(StructureTracker::new(blueprint));
        Ok(())
    }

    /// 转发"方块已收集"事件给当前会话
    pub fn collect(
        &mut self,
        block_type_id: &str,
        position: Option<BlockPos>,
    ) -> Result<bool, McbError> {
        let session = self.session.as_mut().ok_or(McbError::NoActiveSession)?;
        Ok(session.on_block_collected(block_type_id, position))
    }

    /// 转发"方块被收回"事件给当前会话
    pub fn revoke(&mut self, block_type_id: &str) -> Result<bool, McbError> {
        let session = self.session.as_mut().ok_or(McbError::NoActiveSession)?;
        Ok(session.on_block_removed(block_type_id))
    }

    /// 确认建造：预订格子、落盘记录、发出事件
    ///
    /// 只有Complete阶段的会话能触发摆放；重复确认返回已有记录，不再占格子。
    /// 格子预订失败时会话保持Complete，调用方可以在释放空间后重试
    pub fn confirm_build(
        &mut self,
        preferred: Option<WorldPos>,
    ) -> Result<BuiltStructure, McbError> {
        let session = self.session.as_mut().ok_or(McbError::NoActiveSession)?;

        if session.phase() == BuildPhase::PermanentlyPlaced {
            // 重复的建造请求：返回已有记录
            let blueprint_id = session.blueprint_id().to_string();
            return self
                .store
                .load_all()
                .into_iter()
                .rev()
                .find(|r| r.blueprint_id == blueprint_id)
                .ok_or(McbError::StructureNotFound(blueprint_id));
        }
        if session.phase() != BuildPhase::Complete {
            return Err(McbError::InvalidPhase {
                expected: BuildPhase::Complete.as_str(),
                actual: session.phase().as_str(),
            });
        }

        let blueprint = self
            .library
            .get(session.blueprint_id())
            .ok_or_else(|| McbError::BlueprintNotFound(session.blueprint_id().to_string()))?;

        let created_at = Utc::now();
        self.seq += 1;
        let id = derive_structure_id(&blueprint.id, created_at.timestamp_micros(), self.seq);

        // 先占格子再落盘；任何一步失败都不改变会话阶段
        let cell = self.grid.reserve(&id, preferred)?;
        let position = self.grid.cell_to_world(cell.grid_x, cell.grid_z);

        let record = BuiltStructure {
            id: id.clone(),
            blueprint_id: blueprint.id.clone(),
            name: blueprint.name.clone(),
            difficulty: blueprint.difficulty,
            position,
            created_at,
        };
        if let Err(e) = self.store.save(record.clone()) {
            self.grid.release(&id);
            return Err(e);
        }

        let outcome = session.confirm_build()?;
        debug_assert_eq!(outcome, ConfirmOutcome::Placed);

        info!("建筑 {} ({}) 已摆放到 格子[{}, {}]", id, record.name, cell.grid_x, cell.grid_z);
        self.events.push(StructureEvent::StructureBuilt {
            blueprint_id: record.blueprint_id.clone(),
            name: record.name.clone(),
            difficulty: record.difficulty,
            position: Some(position),
        });
        Ok(record)
    }

    /// 删除一座建筑：清记录、释放格子、发事件
    pub fn delete_structure(&mut self, id: &str) -> Result<(), McbError> {
        let removed = self.store.delete(id)?;
        self.grid.release(id);
        self.events.push(StructureEvent::StructureDeleted {
            id: removed.id,
        });
        Ok(())
    }

    /// 删除全部建筑
    pub fn delete_all(&mut self) -> Result<usize, McbError> {
        let count = self.store.delete_all()?;
        self.grid.clear();
        self.events.push(StructureEvent::AllStructuresDeleted);
        Ok(count)
    }

    /// 重新加载全部蓝图源文件
    ///
    /// 进行中的会话作废（随时可安全触发：缓存与网格都从源数据重建，
    /// 不做增量修补），蓝图缓存整体替换后发出重载事件
    pub fn reload(&mut self) -> Result<usize, McbError> {
        let count = self.library.reload(&mut self.mapper)?;
        self.mapper.flush_audit();
        self.session = None;
        self.events.push(StructureEvent::StructuresReloaded);
        Ok(count)
    }

    /// 从存档重建全部建筑，按创建时间从旧到新
    ///
    /// 位置冲突（迁移或崩溃后可能出现）在这里修复：
    /// 冲突记录换到新格子并回写存储，两条记录都保留
    pub fn load_persisted(&mut self) -> Result<Vec<RehydratedStructure>, McbError> {
        let mut rehydrated = Vec::new();

        for mut record in self.store.load_all() {
            let preferred = record.position;
            let cell = self.grid.reserve(&record.id, Some(preferred))?;
            let (wanted_x, wanted_z) = self.grid.world_to_cell(preferred);

            if (cell.grid_x, cell.grid_z) != (wanted_x, wanted_z) {
                let new_position = self.grid.cell_to_world(cell.grid_x, cell.grid_z);
                warn!(
                    "建筑 {} 的存档位置与既有占用冲突，重新安置到格子 [{}, {}]",
                    record.id, cell.grid_x, cell.grid_z
                );
                self.store.update_position(&record.id, new_position)?;
                record.position = new_position;
            }

            // 几何永远按蓝图重新生成，不信任任何缓存的方块快照
            let blocks = match self.library.get(&record.blueprint_id) {
                Some(blueprint) => blueprint.blocks.clone(),
                None => {
                    warn!(
                        "建筑 {} 引用的蓝图 {} 不在缓存中，暂无几何",
                        record.id, record.blueprint_id
                    );
                    Vec::new()
                }
            };

            rehydrated.push(RehydratedStructure { record, blocks });
        }

        Ok(rehydrated)
    }

    /// 查询一个世界位置是否被占用，以及占用者
    pub fn is_position_occupied(&self, position: WorldPos) -> (bool, Option<String>) {
        let (occupied, id) = self.grid.is_occupied(position);
        (occupied, id.map(str::to_string))
    }

    /// 给某蓝图的最新建筑换一个新位置
    pub fn find_new_position(&mut self, blueprint_id: &str) -> Result<WorldPos, McbError> {
        let record = self
            .store
            .load_all()
            .into_iter()
            .rev()
            .find(|r| r.blueprint_id == blueprint_id)
            .ok_or_else(|| McbError::StructureNotFound(blueprint_id.to_string()))?;

        let cell = self.grid.relocate(&record.id)?;
        let position = self.grid.cell_to_world(cell.grid_x, cell.grid_z);
        self.store.update_position(&record.id, position)?;
        Ok(position)
    }
}
