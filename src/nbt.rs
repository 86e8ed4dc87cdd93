// NBT（大端序标签树）读取工具
// 两种遗留容器格式的载体都是NBT，这里实现完整的树解析
// 解析过程始终记录当前偏移与最后识别的标签名，供错误诊断使用

use crate::error::McbError;
use byteorder::{BigEndian, ReadBytesExt};
use std::collections::HashMap;
use std::io::{Cursor, Read};

/// 树的最大嵌套深度，超过即判定为恶意或损坏的输入
const MAX_DEPTH: u32 = 64;

/// NBT标签类型枚举
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum NbtTagType {
    End = 0,
    Byte = 1,
    Short = 2,
    Int = 3,
    Long = 4,
    Float = 5,
    Double = 6,
    ByteArray = 7,
    String = 8,
    List = 9,
    Compound = 10,
    IntArray = 11,
    LongArray = 12,
}

impl NbtTagType {
    fn from_u8(value: u8, offset: u64, last_tag: &str) -> Result<Self, McbError> {
        match value {
            0 => Ok(NbtTagType::End),
            1 => Ok(NbtTagType::Byte),
            2 => Ok(NbtTagType::Short),
            3 => Ok(NbtTagType::Int),
            4 => Ok(NbtTagType::Long),
            5 => Ok(NbtTagType::Float),
            6 => Ok(NbtTagType::Double),
            7 => Ok(NbtTagType::ByteArray),
            8 => Ok(NbtTagType::String),
            9 => Ok(NbtTagType::List),
            10 => Ok(NbtTagType::Compound),
            11 => Ok(NbtTagType::IntArray),
            12 => Ok(NbtTagType::LongArray),
            _ => Err(McbError::parse(
                offset,
                last_tag,
                format!("无效的NBT标签类型: {}", value),
            )),
        }
    }
}

/// 解析后的NBT值
#[derive(Debug, Clone, PartialEq)]
pub enum NbtValue {
    Byte(i8),
    Short(i16),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    ByteArray(Vec<u8>),
    String(String),
    List(Vec<NbtValue>),
    Compound(HashMap<String, NbtValue>),
    IntArray(Vec<i32>),
    LongArray(Vec<i64>),
}

impl NbtValue {
    /// 在复合标签中按名称取子标签
    pub fn get(&self, name: &str) -> Option<&NbtValue> {
        match self {
            NbtValue::Compound(map) => map.get(name),
            _ => None,
        }
    }

    pub fn as_compound(&self) -> Option<&HashMap<String, NbtValue>> {
        match self {
            NbtValue::Compound(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[NbtValue]> {
        match self {
            NbtValue::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            NbtValue::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_byte_array(&self) -> Option<&[u8]> {
        match self {
            NbtValue::ByteArray(bytes) => Some(bytes),
            _ => None,
        }
    }

    /// 整数宽容读取：Byte/Short/Int/Long都按i64返回
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            NbtValue::Byte(v) => Some(*v as i64),
            NbtValue::Short(v) => Some(*v as i64),
            NbtValue::Int(v) => Some(*v as i64),
            NbtValue::Long(v) => Some(*v),
            _ => None,
        }
    }
}

/// NBT树读取器，持有偏移与最后识别标签名的状态
pub struct NbtReader<'a> {
    cursor: Cursor<&'a [u8]>,
    last_tag: String,
}

impl<'a> NbtReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self {
            cursor: Cursor::new(data),
            last_tag: String::new(),
        }
    }

    /// 当前字节偏移
    pub fn offset(&self) -> u64 {
        self.cursor.position()
    }

    /// 最后成功识别的标签名
    pub fn last_tag(&self) -> &str {
        &self.last_tag
    }

    fn err(&self, reason: impl Into<String>) -> McbError {
        McbError::parse(self.cursor.position(), self.last_tag.clone(), reason)
    }

    fn remaining(&self) -> u64 {
        let len = self.cursor.get_ref().len() as u64;
        len.saturating_sub(self.cursor.position())
    }

    fn read_u8(&mut self) -> Result<u8, McbError> {
        self.cursor
            .read_u8()
            .map_err(|_| self.err("数据流提前结束"))
    }

    fn read_i16(&mut self) -> Result<i16, McbError> {
        self.cursor
            .read_i16::<BigEndian>()
            .map_err(|_| self.err("数据流提前结束"))
    }

    fn read_i32(&mut self) -> Result<i32, McbError> {
        self.cursor
            .read_i32::<BigEndian>()
            .map_err(|_| self.err("数据流提前结束"))
    }

    fn read_i64(&mut self) -> Result<i64, McbError> {
        self.cursor
            .read_i64::<BigEndian>()
            .map_err(|_| self.err("数据流提前结束"))
    }

    fn read_f32(&mut self) -> Result<f32, McbError> {
        self.cursor
            .read_f32::<BigEndian>()
            .map_err(|_| self.err("数据流提前结束"))
    }

    fn read_f64(&mut self) -> Result<f64, McbError> {
        self.cursor
            .read_f64::<BigEndian>()
            .map_err(|_| self.err("数据流提前结束"))
    }

    /// 读取带2字节长度前缀的UTF-8字符串
    fn read_string(&mut self) -> Result<String, McbError> {
        let len = self.read_i16()?;
        if len < 0 {
            return Err(self.err("字符串长度为负数"));
        }
        let len = len as usize;
        if (len as u64) > self.remaining() {
            return Err(self.err("字符串长度超出剩余数据"));
        }
        let mut buffer = vec![0u8; len];
        self.cursor
            .read_exact(&mut buffer)
            .map_err(|_| self.err("数据流提前结束"))?;
        String::from_utf8(buffer).map_err(|_| self.err("非UTF-8编码的标签名或字符串"))
    }

    /// 读取列表/数组的元素数量，校验不超过剩余字节数
    fn read_len(&mut self, what: &str) -> Result<usize, McbError> {
        let len = self.read_i32()?;
        if len < 0 {
            return Err(self.err(format!("{}长度为负数", what)));
        }
        // 任何元素至少占1字节，数量超过剩余字节数的声明必然是损坏数据
        if (len as u64) > self.remaining() {
            return Err(self.err(format!("{}长度 {} 超出剩余数据", what, len)));
        }
        Ok(len as usize)
    }

    /// 解析根标签：必须是一个具名复合标签，返回 (根名称, 根值)
    pub fn parse_root(&mut self) -> Result<(String, NbtValue), McbError> {
        let tag_byte = self.read_u8()?;
        let tag_type = NbtTagType::from_u8(tag_byte, self.offset(), &self.last_tag)?;
        if tag_type != NbtTagType::Compound {
            return Err(self.err(format!(
                "根标签必须是复合标签(10)，实际为 {}",
                tag_byte
            )));
        }
        let name = self.read_string()?;
        self.last_tag = name.clone();
        let value = self.read_payload(NbtTagType::Compound, 0)?;
        Ok((name, value))
    }

    fn read_payload(&mut self, tag_type: NbtTagType, depth: u32) -> Result<NbtValue, McbError> {
        if depth > MAX_DEPTH {
            return Err(self.err("NBT嵌套深度超过上限"));
        }

        match tag_type {
            NbtTagType::End => Err(self.err("End标签不携带数据")),
            NbtTagType::Byte => Ok(NbtValue::Byte(self.read_u8()? as i8)),
            NbtTagType::Short => Ok(NbtValue::Short(self.read_i16()?)),
            NbtTagType::Int => Ok(NbtValue::Int(self.read_i32()?)),
            NbtTagType::Long => Ok(NbtValue::Long(self.read_i64()?)),
            NbtTagType::Float => Ok(NbtValue::Float(self.read_f32()?)),
            NbtTagType::Double => Ok(NbtValue::Double(self.read_f64()?)),

            NbtTagType::ByteArray => {
                let len = self.read_len("字节数组")?;
                let mut buffer = vec![0u8; len];
                self.cursor
                    .read_exact(&mut buffer)
                    .map_err(|_| self.err("数据流提前结束"))?;
                Ok(NbtValue::ByteArray(buffer))
            }

            NbtTagType::String => Ok(NbtValue::String(self.read_string()?)),

            NbtTagType::List => {
                let elem_byte = self.read_u8()?;
                let elem_type = NbtTagType::from_u8(elem_byte, self.offset(), &self.last_tag)?;
                let len = self.read_len("列表")?;
                if elem_type == NbtTagType::End && len > 0 {
                    return Err(self.err("非空列表的元素类型不能是End"));
                }
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.read_payload(elem_type, depth + 1)?);
                }
                Ok(NbtValue::List(items))
            }

            NbtTagType::Compound => {
                let mut map = HashMap::new();
                loop {
                    let entry_byte = self.read_u8()?;
                    let entry_type =
                        NbtTagType::from_u8(entry_byte, self.offset(), &self.last_tag)?;
                    if entry_type == NbtTagType::End {
                        break;
                    }
                    let name = self.read_string()?;
                    self.last_tag = name.clone();
                    let value = self.read_payload(entry_type, depth + 1)?;
                    map.insert(name, value);
                }
                Ok(NbtValue::Compound(map))
            }

            NbtTagType::IntArray => {
                let len = self.read_len("整型数组")?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.read_i32()?);
                }
                Ok(NbtValue::IntArray(items))
            }

            NbtTagType::LongArray => {
                let len = self.read_len("长整型数组")?;
                let mut items = Vec::with_capacity(len);
                for _ in 0..len {
                    items.push(self.read_i64()?);
                }
                Ok(NbtValue::LongArray(items))
            }
        }
    }
}

/// 解析一段完整的NBT数据，返回根名称与根复合标签
pub fn parse_nbt(data: &[u8]) -> Result<(String, NbtValue), McbError> {
    if data.is_empty() {
        return Err(McbError::parse(0, "", "NBT数据为空"));
    }
    NbtReader::new(data).parse_root()
}
