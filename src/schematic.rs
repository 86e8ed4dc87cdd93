use crate::{
    compression::{decompress_gzip, is_gzip},
    error::McbError,
    nbt::{parse_nbt, NbtValue},
    types::{BlockKey, BlockPos, Dimensions, ParsedStructure, RawBlockRecord},
    SchematicFormat, COMPOUND_TAG_MARKER, MAX_INPUT_SIZE,
};
use byteorder::{BigEndian, ByteOrder};

/// 解析一个结构容器文件
///
/// 流程：gzip嗅探（必要时先解压）→ 格式判定 → 按格式解码
/// 任何结构性错误都返回 [`McbError::Parse`]，绝不回退到占位形状
pub fn parse_schematic(bytes: &[u8], filename: &str) -> Result<ParsedStructure, McbError> {
    if bytes.is_empty() {
        return Err(McbError::parse(0, "", "输入为空"));
    }
    if bytes.len() > MAX_INPUT_SIZE {
        return Err(McbError::InputTooLarge);
    }

    let decompressed;
    let data: &[u8] = if is_gzip(bytes) {
        decompressed = decompress_gzip(bytes)?;
        &decompressed
    } else {
        bytes
    };

    if data.is_empty() {
        return Err(McbError::parse(0, "", "解压后数据为空"));
    }

    if data[0] == COMPOUND_TAG_MARKER {
        let (_, root) = parse_nbt(data)?;
        // 复合标签根：按字段集合区分树状格式与NBT包装的经典格式
        if root.get("blocks").is_some() || root.get("size").is_some() {
            decode_tree(&root, filename)
        } else if root.get("Blocks").is_some() || root.get("Width").is_some() {
            decode_classic_compound(&root, filename)
        } else {
            Err(McbError::parse(
                0,
                "",
                "复合标签中没有可识别的结构字段（blocks/size或Width/Blocks）",
            ))
        }
    } else {
        decode_classic_stream(data, filename)
    }
}

// ---------------------------------------------------------------------------
// 经典格式（NBT包装）
// ---------------------------------------------------------------------------

fn decode_classic_compound(root: &NbtValue, filename: &str) -> Result<ParsedStructure, McbError> {
    let w = classic_dimension(root, "Width")?;
    let h = classic_dimension(root, "Height")?;
    let l = classic_dimension(root, "Length")?;

    let blocks = root
        .get("Blocks")
        .and_then(NbtValue::as_byte_array)
        .ok_or_else(|| McbError::parse(0, "Blocks", "缺少Blocks字节数组"))?;

    let aux = match root.get("Data") {
        Some(value) => Some(
            value
                .as_byte_array()
                .ok_or_else(|| McbError::parse(0, "Data", "Data字段不是字节数组"))?,
        ),
        None => None,
    };

    build_classic_records(Dimensions::new(w, h, l), blocks, aux, filename)
}

fn classic_dimension(root: &NbtValue, name: &str) -> Result<u32, McbError> {
    let value = root
        .get(name)
        .and_then(NbtValue::as_i64)
        .ok_or_else(|| McbError::parse(0, name, format!("缺少{}字段", name)))?;
    if value <= 0 || value > i16::MAX as i64 {
        return Err(McbError::parse(
            0,
            name,
            format!("{}取值非法: {}", name, value),
        ));
    }
    Ok(value as u32)
}

// ---------------------------------------------------------------------------
// 经典格式（裸标签流，按命名字段定位）
// ---------------------------------------------------------------------------

/// 在字节流中定位一个具名标签，返回其数据的起始偏移
fn locate_tag(data: &[u8], tag_type: u8, name: &str) -> Option<usize> {
    let name_bytes = name.as_bytes();
    let mut pattern = Vec::with_capacity(3 + name_bytes.len());
    pattern.push(tag_type);
    pattern.extend_from_slice(&(name_bytes.len() as u16).to_be_bytes());
    pattern.extend_from_slice(name_bytes);

    data.windows(pattern.len())
        .position(|window| window == pattern.as_slice())
        .map(|idx| idx + pattern.len())
}

fn read_named_short(data: &[u8], name: &str, last_tag: &mut String) -> Result<u32, McbError> {
    let payload = locate_tag(data, 2, name).ok_or_else(|| {
        McbError::parse(
            data.len() as u64,
            last_tag.clone(),
            format!("找不到{}字段", name),
        )
    })?;
    if payload + 2 > data.len() {
        return Err(McbError::parse(
            payload as u64,
            last_tag.clone(),
            format!("{}字段在数据边界处被截断", name),
        ));
    }
    *last_tag = name.to_string();
    let value = BigEndian::read_i16(&data[payload..]);
    if value <= 0 {
        return Err(McbError::parse(
            payload as u64,
            last_tag.clone(),
            format!("{}取值非法: {}", name, value),
        ));
    }
    Ok(value as u32)
}

fn require_named_byte_array<'a>(
    data: &'a [u8],
    name: &str,
    last_tag: &mut String,
) -> Result<&'a [u8], McbError> {
    match read_named_byte_array(data, name, last_tag)? {
        Some(bytes) => Ok(bytes),
        None => Err(McbError::parse(
            data.len() as u64,
            last_tag.clone(),
            format!("找不到{}字段", name),
        )),
    }
}

fn read_named_byte_array<'a>(
    data: &'a [u8],
    name: &str,
    last_tag: &mut String,
) -> Result<Option<&'a [u8]>, McbError> {
    let payload = match locate_tag(data, 7, name) {
        Some(offset) => offset,
        None => return Ok(None),
    };

    if payload + 4 > data.len() {
        return Err(McbError::parse(
            payload as u64,
            last_tag.clone(),
            format!("{}长度字段被截断", name),
        ));
    }
    let len = BigEndian::read_i32(&data[payload..]);
    if len < 0 {
        return Err(McbError::parse(
            payload as u64,
            last_tag.clone(),
            format!("{}长度为负数", name),
        ));
    }
    let start = payload + 4;
    let end = start + len as usize;
    if end > data.len() {
        return Err(McbError::parse(
            start as u64,
            last_tag.clone(),
            format!("{}数组超出数据边界", name),
        ));
    }
    *last_tag = name.to_string();
    Ok(Some(&data[start..end]))
}

fn decode_classic_stream(data: &[u8], filename: &str) -> Result<ParsedStructure, McbError> {
    let mut last_tag = String::new();
    let w = read_named_short(data, "Width", &mut last_tag)?;
    let h = read_named_short(data, "Height", &mut last_tag)?;
    let l = read_named_short(data, "Length", &mut last_tag)?;
    let blocks = require_named_byte_array(data, "Blocks", &mut last_tag)?;
    let aux = read_named_byte_array(data, "Data", &mut last_tag)?;

    build_classic_records(Dimensions::new(w, h, l), blocks, aux, filename)
}

/// 经典格式的共同收尾：体积校验 + 按索引展开为记录
///
/// 索引i对应位置 (i % w, (i / w) % h, i / (w*h))
fn build_classic_records(
    dimensions: Dimensions,
    blocks: &[u8],
    aux: Option<&[u8]>,
    filename: &str,
) -> Result<ParsedStructure, McbError> {
    let volume = dimensions.w as u64 * dimensions.h as u64 * dimensions.l as u64;
    if volume != blocks.len() as u64 {
        return Err(McbError::parse(
            0,
            "Blocks",
            format!(
                "尺寸乘积 {}x{}x{}={} 与方块数组长度 {} 不一致",
                dimensions.w,
                dimensions.h,
                dimensions.l,
                volume,
                blocks.len()
            ),
        ));
    }
    if let Some(aux) = aux {
        if aux.len() != blocks.len() {
            return Err(McbError::parse(
                0,
                "Data",
                format!(
                    "Data数组长度 {} 与Blocks长度 {} 不一致",
                    aux.len(),
                    blocks.len()
                ),
            ));
        }
    }

    let w = dimensions.w as usize;
    let h = dimensions.h as usize;
    let mut records = Vec::with_capacity(blocks.len());
    for (i, &id) in blocks.iter().enumerate() {
        let pos = BlockPos::new(
            (i % w) as i32,
            ((i / w) % h) as i32,
            (i / (w * h)) as i32,
        );
        records.push(RawBlockRecord {
            key: BlockKey::Id(id as u16),
            aux: aux.map(|a| a[i]).unwrap_or(0),
            pos,
        });
    }

    Ok(ParsedStructure {
        format: SchematicFormat::Classic,
        dimensions,
        records,
        source_file: filename.to_string(),
    })
}

// ---------------------------------------------------------------------------
// 树状格式
// ---------------------------------------------------------------------------

fn read_triplet(value: &NbtValue, what: &str) -> Result<(i32, i32, i32), McbError> {
    let items: Vec<i64> = match value {
        NbtValue::IntArray(items) => items.iter().map(|v| *v as i64).collect(),
        NbtValue::List(items) => items
            .iter()
            .map(|v| {
                v.as_i64()
                    .ok_or_else(|| McbError::parse(0, what, format!("{}包含非整数元素", what)))
            })
            .collect::<Result<_, _>>()?,
        _ => {
            return Err(McbError::parse(
                0,
                what,
                format!("{}不是整数三元组", what),
            ))
        }
    };
    if items.len() != 3 {
        return Err(McbError::parse(
            0,
            what,
            format!("{}应包含3个元素，实际为 {}", what, items.len()),
        ));
    }
    for v in &items {
        if *v < i32::MIN as i64 || *v > i32::MAX as i64 {
            return Err(McbError::parse(0, what, format!("{}数值越界", what)));
        }
    }
    Ok((items[0] as i32, items[1] as i32, items[2] as i32))
}

/// 读取调色板：支持字符串条目与带Name的复合条目，其余方案一律拒绝
fn read_palette(value: &NbtValue) -> Result<Vec<String>, McbError> {
    let list = value
        .as_list()
        .ok_or_else(|| McbError::parse(0, "palette", "palette不是列表"))?;

    list.iter()
        .enumerate()
        .map(|(i, entry)| match entry {
            NbtValue::String(s) => Ok(s.clone()),
            NbtValue::Compound(_) => entry
                .get("Name")
                .and_then(NbtValue::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    McbError::parse(0, "palette", format!("palette[{}]缺少Name字段", i))
                }),
            _ => Err(McbError::parse(
                0,
                "palette",
                format!("无法识别的调色板方案: palette[{}]", i),
            )),
        })
        .collect()
}

fn decode_tree(root: &NbtValue, filename: &str) -> Result<ParsedStructure, McbError> {
    let size = root
        .get("size")
        .ok_or_else(|| McbError::parse(0, "size", "缺少size字段"))?;
    let (sx, sy, sz) = read_triplet(size, "size")?;
    if sx <= 0 || sy <= 0 || sz <= 0 {
        return Err(McbError::parse(
            0,
            "size",
            format!("尺寸必须为正数: [{}, {}, {}]", sx, sy, sz),
        ));
    }
    let dimensions = Dimensions::new(sx as u32, sy as u32, sz as u32);

    let blocks = root
        .get("blocks")
        .and_then(NbtValue::as_list)
        .ok_or_else(|| McbError::parse(0, "blocks", "缺少blocks列表"))?;

    let palette = match root.get("palette") {
        Some(value) => Some(read_palette(value)?),
        None => None,
    };

    let mut records = Vec::with_capacity(blocks.len());
    for (i, entry) in blocks.iter().enumerate() {
        if entry.as_compound().is_none() {
            return Err(McbError::parse(
                0,
                "blocks",
                format!("blocks[{}]不是复合标签", i),
            ));
        }

        let pos_value = entry
            .get("pos")
            .ok_or_else(|| McbError::parse(0, "blocks", format!("blocks[{}]缺少pos字段", i)))?;
        let (x, y, z) = read_triplet(pos_value, "pos")?;
        let pos = BlockPos::new(x, y, z);
        if !dimensions.contains(&pos) {
            return Err(McbError::parse(
                0,
                "pos",
                format!("blocks[{}]的位置 {} 超出声明尺寸", i, pos),
            ));
        }

        // 方块寻址：优先调色板索引，其次直接ID
        let key = if let Some(state) = entry.get("state").and_then(NbtValue::as_i64) {
            let palette = palette.as_ref().ok_or_else(|| {
                McbError::parse(0, "state", format!("blocks[{}]使用调色板索引但文件无调色板", i))
            })?;
            if state < 0 || state as usize >= palette.len() {
                return Err(McbError::parse(
                    0,
                    "state",
                    format!(
                        "blocks[{}]的调色板索引 {} 超出范围(调色板大小 {})",
                        i,
                        state,
                        palette.len()
                    ),
                ));
            }
            BlockKey::Name(palette[state as usize].clone())
        } else if let Some(name) = entry
            .get("Name")
            .or_else(|| entry.get("id"))
            .and_then(NbtValue::as_str)
        {
            BlockKey::Name(name.to_string())
        } else {
            return Err(McbError::parse(
                0,
                "blocks",
                format!("blocks[{}]既无调色板索引也无直接方块ID", i),
            ));
        };

        records.push(RawBlockRecord { key, aux: 0, pos });
    }

    Ok(ParsedStructure {
        format: SchematicFormat::Tree,
        dimensions,
        records,
        source_file: filename.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    // ---- NBT字节构造工具（仅测试用） ----

    fn named(tag: u8, name: &str) -> Vec<u8> {
        let mut out = vec![tag];
        out.extend_from_slice(&(name.len() as u16).to_be_bytes());
        out.extend_from_slice(name.as_bytes());
        out
    }

    fn short_tag(name: &str, value: i16) -> Vec<u8> {
        let mut out = named(2, name);
        out.extend_from_slice(&value.to_be_bytes());
        out
    }

    fn byte_array_tag(name: &str, bytes: &[u8]) -> Vec<u8> {
        let mut out = named(7, name);
        out.extend_from_slice(&(bytes.len() as i32).to_be_bytes());
        out.extend_from_slice(bytes);
        out
    }

    fn int_list_tag(name: &str, values: &[i32]) -> Vec<u8> {
        let mut out = named(9, name);
        out.push(3);
        out.extend_from_slice(&(values.len() as i32).to_be_bytes());
        for v in values {
            out.extend_from_slice(&v.to_be_bytes());
        }
        out
    }

    fn string_payload(value: &str) -> Vec<u8> {
        let mut out = (value.len() as u16).to_be_bytes().to_vec();
        out.extend_from_slice(value.as_bytes());
        out
    }

    fn classic_schematic(w: i16, h: i16, l: i16, blocks: &[u8], data: Option<&[u8]>) -> Vec<u8> {
        let mut out = named(10, "Schematic");
        out.extend(short_tag("Width", w));
        out.extend(short_tag("Height", h));
        out.extend(short_tag("Length", l));
        out.extend(byte_array_tag("Blocks", blocks));
        if let Some(data) = data {
            out.extend(byte_array_tag("Data", data));
        }
        out.push(0);
        out
    }

    /// 树状格式: size + palette(复合条目) + blocks(state索引)
    fn tree_structure(size: [i32; 3], palette: &[&str], blocks: &[([i32; 3], i32)]) -> Vec<u8> {
        let mut out = named(10, "");
        out.extend(int_list_tag("size", &size));

        let mut palette_tag = named(9, "palette");
        palette_tag.push(10);
        palette_tag.extend_from_slice(&(palette.len() as i32).to_be_bytes());
        for name in palette {
            palette_tag.extend(named(8, "Name"));
            palette_tag.extend(string_payload(name));
            palette_tag.push(0);
        }
        out.extend(palette_tag);

        let mut blocks_tag = named(9, "blocks");
        blocks_tag.push(10);
        blocks_tag.extend_from_slice(&(blocks.len() as i32).to_be_bytes());
        for (pos, state) in blocks {
            blocks_tag.extend(int_list_tag("pos", pos));
            let mut state_tag = named(3, "state");
            state_tag.extend_from_slice(&state.to_be_bytes());
            blocks_tag.extend(state_tag);
            blocks_tag.push(0);
        }
        out.extend(blocks_tag);

        out.push(0);
        out
    }

    fn gzip(data: &[u8]) -> Vec<u8> {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        encoder.finish().unwrap()
    }

    // ---- 用例 ----

    #[test]
    fn classic_yields_volume_records() {
        let blocks = [1u8, 0, 1, 0, 1, 0, 1, 0]; // 2x2x2
        let bytes = classic_schematic(2, 2, 2, &blocks, None);
        let parsed = parse_schematic(&bytes, "cube.schematic").unwrap();

        assert_eq!(parsed.format, SchematicFormat::Classic);
        assert_eq!(parsed.records.len(), 8);
        assert_eq!(parsed.dimensions, Dimensions::new(2, 2, 2));
        // 索引映射规律: i=3 → (3%2, (3/2)%2, 3/4) = (1,1,0)
        assert_eq!(parsed.records[3].pos, BlockPos::new(1, 1, 0));
        assert_eq!(parsed.records[3].key, BlockKey::Id(0));
    }

    #[test]
    fn classic_gzip_wrapped() {
        let bytes = gzip(&classic_schematic(1, 1, 2, &[1, 4], Some(&[0, 2])));
        let parsed = parse_schematic(&bytes, "cube.schematic").unwrap();
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(parsed.records[1].key, BlockKey::Id(4));
        assert_eq!(parsed.records[1].aux, 2);
    }

    #[test]
    fn classic_dimension_mismatch_rejected() {
        let bytes = classic_schematic(2, 2, 2, &[1, 1, 1], None);
        let err = parse_schematic(&bytes, "bad.schematic").unwrap_err();
        match err {
            McbError::Parse { last_tag, .. } => assert_eq!(last_tag, "Blocks"),
            other => panic!("期望Parse错误，实际为 {:?}", other),
        }
    }

    #[test]
    fn classic_raw_stream_located_by_field_names() {
        // 不以复合标签开头的裸流：字段散落在前导垃圾之后
        let mut bytes = vec![0xFF, 0x42];
        bytes.extend(short_tag("Width", 1));
        bytes.extend(short_tag("Height", 1));
        bytes.extend(short_tag("Length", 3));
        bytes.extend(byte_array_tag("Blocks", &[1, 2, 3]));
        let parsed = parse_schematic(&bytes, "raw.schematic").unwrap();
        assert_eq!(parsed.records.len(), 3);
        assert_eq!(parsed.records[2].pos, BlockPos::new(0, 0, 2));
    }

    #[test]
    fn classic_raw_stream_missing_field_reports_last_tag() {
        let mut bytes = vec![0xFF];
        bytes.extend(short_tag("Width", 1));
        bytes.extend(short_tag("Height", 1));
        // 缺少Length
        let err = parse_schematic(&bytes, "raw.schematic").unwrap_err();
        match err {
            McbError::Parse { last_tag, .. } => assert_eq!(last_tag, "Height"),
            other => panic!("期望Parse错误，实际为 {:?}", other),
        }
    }

    #[test]
    fn tree_palette_addressing() {
        let bytes = tree_structure(
            [2, 1, 1],
            &["minecraft:stone", "minecraft:oak_planks"],
            &[([0, 0, 0], 0), ([1, 0, 0], 1)],
        );
        let parsed = parse_schematic(&bytes, "hut.nbt").unwrap();

        assert_eq!(parsed.format, SchematicFormat::Tree);
        assert_eq!(parsed.records.len(), 2);
        assert_eq!(
            parsed.records[1].key,
            BlockKey::Name("minecraft:oak_planks".to_string())
        );
    }

    #[test]
    fn tree_palette_index_out_of_range() {
        let bytes = tree_structure([1, 1, 1], &["minecraft:stone"], &[([0, 0, 0], 5)]);
        assert!(matches!(
            parse_schematic(&bytes, "bad.nbt"),
            Err(McbError::Parse { .. })
        ));
    }

    #[test]
    fn tree_position_out_of_declared_size() {
        let bytes = tree_structure([1, 1, 1], &["minecraft:stone"], &[([0, 2, 0], 0)]);
        assert!(matches!(
            parse_schematic(&bytes, "bad.nbt"),
            Err(McbError::Parse { .. })
        ));
    }

    #[test]
    fn tree_unrecognized_palette_scheme_rejected() {
        // 调色板条目是整数列表，既不是字符串也不是带Name的复合标签
        let mut out = named(10, "");
        out.extend(int_list_tag("size", &[1, 1, 1]));
        out.extend(int_list_tag("palette", &[7]));
        let mut blocks_tag = named(9, "blocks");
        blocks_tag.push(10);
        blocks_tag.extend_from_slice(&1i32.to_be_bytes());
        blocks_tag.extend(int_list_tag("pos", &[0, 0, 0]));
        let mut state_tag = named(3, "state");
        state_tag.extend_from_slice(&0i32.to_be_bytes());
        blocks_tag.extend(state_tag);
        blocks_tag.push(0);
        out.extend(blocks_tag);
        out.push(0);

        let err = parse_schematic(&out, "weird.nbt").unwrap_err();
        match err {
            McbError::Parse { last_tag, .. } => assert_eq!(last_tag, "palette"),
            other => panic!("期望Parse错误，实际为 {:?}", other),
        }
    }

    #[test]
    fn tree_direct_id_addressing() {
        // 无调色板，方块直接携带Name
        let mut out = named(10, "");
        out.extend(int_list_tag("size", &[1, 1, 1]));
        let mut blocks_tag = named(9, "blocks");
        blocks_tag.push(10);
        blocks_tag.extend_from_slice(&1i32.to_be_bytes());
        blocks_tag.extend(int_list_tag("pos", &[0, 0, 0]));
        blocks_tag.extend(named(8, "Name"));
        blocks_tag.extend(string_payload("minecraft:bricks"));
        blocks_tag.push(0);
        out.extend(blocks_tag);
        out.push(0);

        let parsed = parse_schematic(&out, "direct.nbt").unwrap();
        assert_eq!(
            parsed.records[0].key,
            BlockKey::Name("minecraft:bricks".to_string())
        );
    }

    #[test]
    fn empty_input_rejected() {
        assert!(parse_schematic(&[], "empty.schematic").is_err());
    }
}
