use crate::blueprint::Blueprint;
use crate::error::McbError;
use crate::registry;
use crate::types::BlockPos;
use tracing::warn;

/// 建造阶段状态机: Empty → InProgress → Complete → PermanentlyPlaced(终态)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildPhase {
    Empty,
    InProgress,
    Complete,
    PermanentlyPlaced,
}

impl BuildPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            BuildPhase::Empty => "empty",
            BuildPhase::InProgress => "in_progress",
            BuildPhase::Complete => "complete",
            BuildPhase::PermanentlyPlaced => "permanently_placed",
        }
    }
}

/// 确认建造的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfirmOutcome {
    /// 本次确认生效，应当触发摆放
    Placed,
    /// 已经摆放过，重复确认是无操作
    AlreadyPlaced,
}

/// 单个建造需求：蓝图中一个非空气方块
#[derive(Debug, Clone)]
struct Demand {
    block_type_id: String,
    position: BlockPos,
    completed: bool,
}

/// 建造进度跟踪器，每个进行中的蓝图会话一个实例
///
/// 需求列表在构造时经一次有界遍历固定下来，畸形条目跳过并记日志，
/// 之后的所有状态变更都只在这个固定列表上迭代，绝不递归
pub struct StructureTracker {
    blueprint_id: String,
    demands: Vec<Demand>,
    completed_count: usize,
    skipped_malformed: usize,
    phase: BuildPhase,
}

impl StructureTracker {
    pub fn new(blueprint: &Blueprint) -> Self {
        let mut demands = Vec::new();
        let mut skipped = 0usize;

        for block in &blueprint.blocks {
            if block.block_type_id == registry::AIR {
                continue;
            }
            // 防御性检查：蓝图数据如被破坏，跳过而不是让后续计算失控
            if !blueprint.dimensions.contains(&block.position) {
                warn!(
                    "蓝图 {} 含越界方块 {}，已跳过",
                    blueprint.id, block.position
                );
                skipped += 1;
                continue;
            }
            if !registry::is_registered(&block.block_type_id) {
                warn!(
                    "蓝图 {} 含未注册类型 \"{}\"，已跳过",
                    blueprint.id, block.block_type_id
                );
                skipped += 1;
                continue;
            }
            demands.push(Demand {
                block_type_id: block.block_type_id.clone(),
                position: block.position,
                completed: false,
            });
        }

        // 没有任何非空气需求的蓝图视为天然完成
        let phase = if demands.is_empty() {
            BuildPhase::Complete
        } else {
            BuildPhase::Empty
        };

        Self {
            blueprint_id: blueprint.id.clone(),
            demands,
            completed_count: 0,
            skipped_malformed: skipped,
            phase,
        }
    }

    pub fn blueprint_id(&self) -> &str {
        &self.blueprint_id
    }

    pub fn phase(&self) -> BuildPhase {
        self.phase
    }

    /// 非空气需求总数
    pub fn total_non_air_blocks(&self) -> usize {
        self.demands.len()
    }

    pub fn completed_count(&self) -> usize {
        self.completed_count
    }

    /// 构造时因畸形被跳过的条目数
    pub fn skipped_malformed(&self) -> usize {
        self.skipped_malformed
    }

    /// 完成比例，始终落在 [0, 1]
    pub fn progress(&self) -> f64 {
        if self.demands.is_empty() {
            return 1.0;
        }
        self.completed_count as f64 / self.demands.len() as f64
    }

    pub fn is_complete(&self) -> bool {
        self.completed_count >= self.demands.len()
    }

    /// 已完成的需求位置
    pub fn completed_positions(&self) -> Vec<BlockPos> {
        self.demands
            .iter()
            .filter(|d| d.completed)
            .map(|d| d.position)
            .collect()
    }

    /// 收到一个"方块已收集"事件
    ///
    /// 空气直接忽略；给定位置时优先精确匹配该位置的未完成需求，
    /// 否则按方块顺序取第一个该类型的未完成需求。返回是否计入进度
    pub fn on_block_collected(&mut self, block_type_id: &str, position: Option<BlockPos>) -> bool {
        if block_type_id == registry::AIR {
            return false;
        }
        if self.phase == BuildPhase::PermanentlyPlaced {
            return false;
        }

        let index = match position {
            Some(pos) => self
                .demands
                .iter()
                .position(|d| !d.completed && d.position == pos && d.block_type_id == block_type_id)
                .or_else(|| self.first_uncompleted_of_type(block_type_id)),
            None => self.first_uncompleted_of_type(block_type_id),
        };

        let Some(index) = index else {
            return false;
        };

        self.demands[index].completed = true;
        self.recompute();
        true
    }

    /// 收到一个"方块被收回"事件（答错题时撤销一个已收集方块）
    ///
    /// 取消该类型的第一个已完成需求；可能把Complete拉回InProgress
    pub fn on_block_removed(&mut self, block_type_id: &str) -> bool {
        if self.phase == BuildPhase::PermanentlyPlaced {
            return false;
        }

        let index = self
            .demands
            .iter()
            .position(|d| d.completed && d.block_type_id == block_type_id);

        let Some(index) = index else {
            return false;
        };

        self.demands[index].completed = false;
        self.recompute();
        true
    }

    /// 确认建造：只允许从Complete进入PermanentlyPlaced
    ///
    /// 已摆放后的重复确认是无操作，用于吞掉重复的建造请求
    pub fn confirm_build(&mut self) -> Result<ConfirmOutcome, McbError> {
        match self.phase {
            BuildPhase::PermanentlyPlaced => Ok(ConfirmOutcome::AlreadyPlaced),
            BuildPhase::Complete => {
                self.phase = BuildPhase::PermanentlyPlaced;
                Ok(ConfirmOutcome::Placed)
            }
            other => Err(McbError::InvalidPhase {
                expected: BuildPhase::Complete.as_str(),
                actual: other.as_str(),
            }),
        }
    }

    /// 回到初始状态，丢弃全部完成记录；切换到下一个蓝图前调用
    pub fn reset(&mut self) {
        for demand in &mut self.demands {
            demand.completed = false;
        }
        self.completed_count = 0;
        self.phase = if self.demands.is_empty() {
            BuildPhase::Complete
        } else {
            BuildPhase::Empty
        };
    }

    fn first_uncompleted_of_type(&self, block_type_id: &str) -> Option<usize> {
        self.demands
            .iter()
            .position(|d| !d.completed && d.block_type_id == block_type_id)
    }

    /// 在固定需求列表上做一轮有界重算，同步计数与阶段
    fn recompute(&mut self) {
        self.completed_count = self.demands.iter().filter(|d| d.completed).count();

        self.phase = if self.phase == BuildPhase::PermanentlyPlaced {
            BuildPhase::PermanentlyPlaced
        } else if self.completed_count >= self.demands.len() {
            BuildPhase::Complete
        } else if self.completed_count == 0 {
            BuildPhase::Empty
        } else {
            BuildPhase::InProgress
        };
    }
}
