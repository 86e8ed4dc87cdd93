use clap::{Parser, Subcommand};
use mcbuilder::{
    blueprint::BlueprintLibrary,
    grid::PlacementGrid,
    manager::StructureManager,
    mapper::{BlockMapper, JsonlAuditSink},
    registry,
    store::StructureStore,
    McbError,
};
use std::fs;
use std::path::{Path, PathBuf};

/// MCBuilder命令行工具 - Minecraft建筑蓝图导入、建造进度与摆放管理
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// 建筑记录存储文件路径
    #[arg(long, default_value = "structures.json")]
    store: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 查看结构容器文件信息（只解析，不入库）
    Info {
        /// 容器文件路径（.schematic或.nbt，可为gzip包裹）
        #[arg(short, long)]
        file: PathBuf,

        /// 是否输出每个方块
        #[arg(short, long)]
        verbose: bool,
    },

    /// 导入容器文件为蓝图，输出渲染端交换格式JSON
    Import {
        /// 输入容器文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 输出JSON路径（缺省打印到标准输出）
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// 映射审计日志路径（JSON行格式，追加写入）
        #[arg(long)]
        audit: Option<PathBuf>,
    },

    /// 解析文件并导出方块映射审计表（按数字ID与名称两张表）
    Audit {
        /// 输入容器文件路径
        #[arg(short, long)]
        input: PathBuf,

        /// 输出JSON路径
        #[arg(short, long)]
        output: PathBuf,
    },

    /// 列出内部方块类型注册表
    Types,

    /// 列出已建成的建筑记录
    List,

    /// 删除一条建筑记录
    Delete {
        /// 建筑ID
        #[arg(short, long)]
        id: String,
    },

    /// 清空全部建筑记录
    Clear,
}

fn main() -> Result<(), McbError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Info { file, verbose } => cmd_info(file, *verbose),
        Commands::Import {
            input,
            output,
            audit,
        } => cmd_import(input, output.as_deref(), audit.as_deref()),
        Commands::Audit { input, output } => cmd_audit(input, output),
        Commands::Types => cmd_types(),
        Commands::List => cmd_list(&cli.store),
        Commands::Delete { id } => cmd_delete(&cli.store, id),
        Commands::Clear => cmd_clear(&cli.store),
    }
}

fn read_input(path: &Path) -> Result<Vec<u8>, McbError> {
    if !path.exists() {
        return Err(McbError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("输入文件不存在: {}", path.display()),
        )));
    }
    Ok(fs::read(path)?)
}

fn cmd_info(file: &Path, verbose: bool) -> Result<(), McbError> {
    println!("输入文件: {}", file.display());
    let bytes = read_input(file)?;
    let filename = file
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let parsed = mcbuilder::parse_schematic(&bytes, &filename)?;

    println!("文件信息:");
    println!("  格式: {:?}", parsed.format);
    println!(
        "  尺寸: {}x{}x{} (体积 {})",
        parsed.dimensions.w,
        parsed.dimensions.h,
        parsed.dimensions.l,
        parsed.dimensions.volume()
    );
    println!("  记录数量: {}", parsed.records.len());

    let mut mapper = BlockMapper::new();
    let mut non_air = 0usize;
    for record in &parsed.records {
        if mapper.map(&record.key, &parsed.source_file) != registry::AIR {
            non_air += 1;
        }
    }
    println!("  非空气方块: {}", non_air);
    println!("  映射查询(去重后): {}", mapper.audit_log().len());

    if verbose {
        println!("\n方块列表:");
        let mut mapper = BlockMapper::new();
        for record in &parsed.records {
            let mapped = mapper.map(&record.key, &parsed.source_file);
            if mapped == registry::AIR {
                continue;
            }
            let display = registry::display_name(mapped).unwrap_or(mapped);
            println!("  {} -> {}({}) 位于 {}", record.key, mapped, display, record.pos);
        }
    }

    Ok(())
}

fn cmd_types() -> Result<(), McbError> {
    println!("内部方块类型 ({} 个):", registry::all_types().len());
    for (id, name) in registry::all_types() {
        println!("  {} ({})", id, name);
    }
    Ok(())
}

fn cmd_import(
    input: &Path,
    output: Option<&Path>,
    audit: Option<&Path>,
) -> Result<(), McbError> {
    println!("输入文件: {}", input.display());
    read_input(input)?;

    let mut mapper = match audit {
        Some(path) => BlockMapper::new().with_sink(Box::new(JsonlAuditSink::new(path))),
        None => BlockMapper::new(),
    };

    let mut library = BlueprintLibrary::new();
    let blueprint = library.import_file(input, &mut mapper)?;

    println!("导入成功:");
    println!("  蓝图ID: {}", blueprint.id);
    println!("  名称: {}", blueprint.name);
    println!("  难度: {}", blueprint.difficulty);
    println!(
        "  尺寸: {}x{}x{}",
        blueprint.dimensions.w, blueprint.dimensions.h, blueprint.dimensions.l
    );
    println!("  方块数: {}", blueprint.blocks.len());
    println!("  非空气方块: {}", blueprint.total_non_air_blocks());

    let json = serde_json::to_string_pretty(blueprint)?;
    match output {
        Some(path) => {
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(path, json)?;
            println!("交换格式已写入: {}", path.display());
        }
        None => println!("{}", json),
    }

    mapper.flush_audit();
    Ok(())
}

fn cmd_audit(input: &Path, output: &Path) -> Result<(), McbError> {
    println!("输入文件: {}", input.display());
    let bytes = read_input(input)?;
    let filename = input
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let parsed = mcbuilder::parse_schematic(&bytes, &filename)?;
    let mut mapper = BlockMapper::new();
    for record in &parsed.records {
        mapper.map(&record.key, &parsed.source_file);
    }

    let tables = mapper.audit_tables();
    println!(
        "映射表: 数字ID {} 条, 名称 {} 条",
        tables.by_id.len(),
        tables.by_name.len()
    );

    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    fs::write(output, serde_json::to_string_pretty(&tables)?)?;
    println!("审计表已写入: {}", output.display());
    Ok(())
}

fn open_manager(store_path: &Path) -> Result<StructureManager, McbError> {
    let store = StructureStore::open(store_path)?;
    Ok(StructureManager::new(
        BlueprintLibrary::new(),
        BlockMapper::new(),
        PlacementGrid::new(),
        store,
    ))
}

fn cmd_list(store_path: &Path) -> Result<(), McbError> {
    let manager = open_manager(store_path)?;
    let records = manager.store().load_all();

    if records.is_empty() {
        println!("没有建筑记录");
        return Ok(());
    }

    println!("共 {} 条建筑记录:", records.len());
    for record in records {
        println!(
            "  {} | 蓝图 {} | {} | 难度 {} | 位置 [{:.1}, {:.1}, {:.1}] | {}",
            record.id,
            record.blueprint_id,
            record.name,
            record.difficulty,
            record.position.x,
            record.position.y,
            record.position.z,
            record.created_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

fn cmd_delete(store_path: &Path, id: &str) -> Result<(), McbError> {
    let mut manager = open_manager(store_path)?;
    manager.delete_structure(id)?;
    println!("已删除建筑: {}", id);
    Ok(())
}

fn cmd_clear(store_path: &Path) -> Result<(), McbError> {
    let mut manager = open_manager(store_path)?;
    let count = manager.delete_all()?;
    println!("已清空 {} 条建筑记录", count);
    Ok(())
}
