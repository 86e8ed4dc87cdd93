use thiserror::Error;
use std::io;

#[derive(Error, Debug)]
pub enum McbError {
    #[error("IO错误: {0}")]
    Io(#[from] io::Error),

    #[error("解析错误(偏移 {offset}, 最后标签 \"{last_tag}\"): {reason}")]
    Parse {
        offset: u64,
        last_tag: String,
        reason: String,
    },

    #[error("文件太大，超过64MB限制")]
    InputTooLarge,

    #[error("蓝图校验失败: {0}")]
    Validation(String),

    #[error("未找到蓝图: {0}")]
    BlueprintNotFound(String),

    #[error("未找到建筑记录: {0}")]
    StructureNotFound(String),

    #[error("摆放网格已满，没有空闲格子")]
    GridFull,

    #[error("建造阶段错误: 期望 {expected}, 当前 {actual}")]
    InvalidPhase {
        expected: &'static str,
        actual: &'static str,
    },

    #[error("JSON序列化错误: {0}")]
    Json(#[from] serde_json::Error),

    #[error("没有正在进行的建造会话")]
    NoActiveSession,
}

impl McbError {
    /// 构造一个解析错误，携带出错时的字节偏移与最后识别的标签名
    pub fn parse(offset: u64, last_tag: impl Into<String>, reason: impl Into<String>) -> Self {
        McbError::Parse {
            offset,
            last_tag: last_tag.into(),
            reason: reason.into(),
        }
    }
}
