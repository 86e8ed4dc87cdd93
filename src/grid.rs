use crate::error::McbError;
use crate::types::{GridCell, WorldPos};

/// 默认网格尺寸（格子数）
pub const GRID_WIDTH: i32 = 8;
pub const GRID_DEPTH: i32 = 8;

/// 每个格子的世界坐标边长
pub const CELL_SIZE: f64 = 24.0;

/// 摆放网格，唯一持有格子占用状态
///
/// 占用表是行主序的平面数组；检查与预订在同一次同步调用内完成，
/// 单线程执行模型下即可保证"先检查后预订"不存在空窗
pub struct PlacementGrid {
    width: i32,
    depth: i32,
    cell_size: f64,
    cells: Vec<Option<String>>,
}

impl PlacementGrid {
    pub fn new() -> Self {
        Self::with_size(GRID_WIDTH, GRID_DEPTH, CELL_SIZE)
    }

    pub fn with_size(width: i32, depth: i32, cell_size: f64) -> Self {
        Self {
            width,
            depth,
            cell_size,
            cells: vec![None; (width * depth) as usize],
        }
    }

    fn index(&self, grid_x: i32, grid_z: i32) -> Option<usize> {
        if grid_x < 0 || grid_x >= self.width || grid_z < 0 || grid_z >= self.depth {
            return None;
        }
        Some((grid_z * self.width + grid_x) as usize)
    }

    fn cell_view(&self, grid_x: i32, grid_z: i32) -> GridCell {
        let occupant = self
            .index(grid_x, grid_z)
            .and_then(|idx| self.cells[idx].clone());
        GridCell {
            grid_x,
            grid_z,
            occupied: occupant.is_some(),
            structure_id: occupant,
        }
    }

    /// 世界坐标落在哪个格子
    pub fn world_to_cell(&self, pos: WorldPos) -> (i32, i32) {
        (
            (pos.x / self.cell_size).floor() as i32,
            (pos.z / self.cell_size).floor() as i32,
        )
    }

    /// 格子中心的世界坐标
    pub fn cell_to_world(&self, grid_x: i32, grid_z: i32) -> WorldPos {
        WorldPos::new(
            (grid_x as f64 + 0.5) * self.cell_size,
            0.0,
            (grid_z as f64 + 0.5) * self.cell_size,
        )
    }

    /// 为一个建筑预订格子
    ///
    /// 给定期望位置且对应格子空闲时用它；否则按行主序扫描第一个空格。
    /// 期望位置被占用不算失败，冲突在这里直接消化；网格全满才报错
    pub fn reserve(
        &mut self,
        structure_id: &str,
        preferred: Option<WorldPos>,
    ) -> Result<GridCell, McbError> {
        // 同一建筑至多占一个格子：重复预订返回已有格子
        if let Some(existing) = self.cell_of(structure_id) {
            return Ok(existing);
        }

        if let Some(pos) = preferred {
            let (grid_x, grid_z) = self.world_to_cell(pos);
            if let Some(idx) = self.index(grid_x, grid_z) {
                if self.cells[idx].is_none() {
                    self.cells[idx] = Some(structure_id.to_string());
                    return Ok(self.cell_view(grid_x, grid_z));
                }
            }
        }

        for grid_z in 0..self.depth {
            for grid_x in 0..self.width {
                let idx = (grid_z * self.width + grid_x) as usize;
                if self.cells[idx].is_none() {
                    self.cells[idx] = Some(structure_id.to_string());
                    return Ok(self.cell_view(grid_x, grid_z));
                }
            }
        }

        Err(McbError::GridFull)
    }

    /// 把建筑挪到当前格子之外的第一个空格
    ///
    /// 没有其他空格时留在原格子；搬迁在一次调用内完成，
    /// 不会出现同一建筑同时占两个格子的瞬间
    pub fn relocate(&mut self, structure_id: &str) -> Result<GridCell, McbError> {
        let current = self
            .cell_of(structure_id)
            .ok_or_else(|| McbError::StructureNotFound(structure_id.to_string()))?;

        for grid_z in 0..self.depth {
            for grid_x in 0..self.width {
                if (grid_x, grid_z) == (current.grid_x, current.grid_z) {
                    continue;
                }
                let idx = (grid_z * self.width + grid_x) as usize;
                if self.cells[idx].is_none() {
                    self.cells[idx] = Some(structure_id.to_string());
                    let old_idx = (current.grid_z * self.width + current.grid_x) as usize;
                    self.cells[old_idx] = None;
                    return Ok(self.cell_view(grid_x, grid_z));
                }
            }
        }
        Ok(current)
    }

    /// 释放建筑占用的格子，返回是否确实占有过
    pub fn release(&mut self, structure_id: &str) -> bool {
        for cell in &mut self.cells {
            if cell.as_deref() == Some(structure_id) {
                *cell = None;
                return true;
            }
        }
        false
    }

    /// 查询世界坐标对应的格子是否被占用
    pub fn is_occupied(&self, pos: WorldPos) -> (bool, Option<&str>) {
        let (grid_x, grid_z) = self.world_to_cell(pos);
        match self.index(grid_x, grid_z) {
            Some(idx) => match &self.cells[idx] {
                Some(id) => (true, Some(id.as_str())),
                None => (false, None),
            },
            None => (false, None),
        }
    }

    /// 建筑当前占用的格子
    pub fn cell_of(&self, structure_id: &str) -> Option<GridCell> {
        self.cells.iter().position(|c| c.as_deref() == Some(structure_id)).map(|idx| {
            let grid_x = idx as i32 % self.width;
            let grid_z = idx as i32 / self.width;
            self.cell_view(grid_x, grid_z)
        })
    }

    pub fn occupied_count(&self) -> usize {
        self.cells.iter().filter(|c| c.is_some()).count()
    }

    pub fn capacity(&self) -> usize {
        self.cells.len()
    }

    /// 清空全部占用
    pub fn clear(&mut self) {
        for cell in &mut self.cells {
            *cell = None;
        }
    }
}

impl Default for PlacementGrid {
    fn default() -> Self {
        Self::new()
    }
}
