//! Kurikulum - 命令行入口
//!
//! 读取 JSON 输入文件，调用生成流程，把产物以 JSON 写到 stdout；`--save` 时同时写入 SQLite。

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use kurikulum::allocation::build_schedule;
use kurikulum::config::{load_config, AppConfig};
use kurikulum::curriculum::{flatten, AllocationRow, CurriculumTree, SequencedRow};
use kurikulum::generation::{CurriculumGenerator, ObjectiveRequest};
use kurikulum::llm::create_client;
use kurikulum::observability;
use kurikulum::store::{DocumentKind, DocumentStore, NewDocument, SqliteDocumentStore};

#[derive(Parser, Debug)]
#[command(name = "kurikulum")]
#[command(about = "Curriculum objective tree tooling with AI-assisted derivations")]
#[command(version)]
struct Args {
    /// 额外的配置文件（TOML）
    #[arg(short, long, env = "KURIKULUM_CONFIG")]
    config: Option<PathBuf>,

    /// 把产物写入数据库
    #[arg(long, global = true)]
    save: bool,

    /// 保存时使用的学科名
    #[arg(long, global = true, default_value = "")]
    subject: String,

    /// 保存派生产物时所属的课程树 id
    #[arg(long, global = true)]
    owner: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// 扁平化课程树（不调用生成服务）
    Flatten { tree: PathBuf },
    /// 根据要素 / CP 生成课程目标树
    Objectives { request: PathBuf },
    /// 生成 ATP 流程
    Flow { tree: PathBuf },
    /// 生成课时分配
    Allocate {
        flow: PathBuf,
        #[arg(long)]
        weekly_hours: Option<u32>,
    },
    /// 生成达成标准
    Criteria {
        flow: PathBuf,
        #[arg(long)]
        semester: Option<String>,
    },
    /// 由课时分配推导周计划（不调用生成服务）
    Schedule {
        allocation: PathBuf,
        #[arg(long)]
        weekly_hours: Option<u32>,
    },
}

fn read_json<T: DeserializeOwned>(path: &Path) -> anyhow::Result<T> {
    let data = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&data).with_context(|| format!("Invalid JSON in {}", path.display()))
}

fn print_json(value: &impl Serialize) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// 只在需要调用生成服务的子命令里创建客户端
fn generator(config: &AppConfig) -> anyhow::Result<CurriculumGenerator> {
    let llm = create_client(&config.llm).context("Failed to create LLM client")?;
    Ok(CurriculumGenerator::new(llm, config.generation.clone()))
}

/// 执行子命令；返回可保存的文档种类（flatten 为 None）与产物
async fn execute(
    command: &Command,
    config: &AppConfig,
) -> anyhow::Result<(Option<DocumentKind>, Value)> {
    let weekly_default = config.generation.weekly_hours;

    let produced = match command {
        Command::Flatten { tree } => {
            let tree: CurriculumTree = read_json(tree)?;
            (None, serde_json::to_value(flatten(&tree))?)
        }
        Command::Objectives { request } => {
            let request: ObjectiveRequest = read_json(request)?;
            let tree = generator(config)?.generate_objectives(&request).await?;
            (Some(DocumentKind::Tree), serde_json::to_value(tree)?)
        }
        Command::Flow { tree } => {
            let tree: CurriculumTree = read_json(tree)?;
            let flow = generator(config)?.generate_flow(&tree).await?;
            tracing::info!("Flow strategy: {:?}, {} recovery events", flow.strategy, flow.events.len());
            (Some(DocumentKind::Flow), serde_json::to_value(flow.rows)?)
        }
        Command::Allocate { flow, weekly_hours } => {
            let rows: Vec<SequencedRow> = read_json(flow)?;
            let weekly_hours = weekly_hours.unwrap_or(weekly_default);
            let allocation = generator(config)?
                .generate_allocation(&rows, weekly_hours)
                .await?;
            tracing::info!(
                "Allocation total {} (instructed {}), {} rows defaulted",
                allocation.total_budget,
                allocation.nominal_total,
                allocation.events.len()
            );
            (Some(DocumentKind::Allocation), serde_json::to_value(allocation.rows)?)
        }
        Command::Criteria { flow, semester } => {
            let rows: Vec<SequencedRow> = read_json(flow)?;
            let criteria = generator(config)?
                .generate_criteria(&rows, semester.as_deref())
                .await?;
            if criteria.failed_chunks > 0 {
                tracing::warn!("{} criteria chunks filled with defaults", criteria.failed_chunks);
            }
            (Some(DocumentKind::Criteria), serde_json::to_value(criteria.rows)?)
        }
        Command::Schedule { allocation, weekly_hours } => {
            let rows: Vec<AllocationRow> = read_json(allocation)?;
            let weeks = build_schedule(
                &rows,
                weekly_hours.unwrap_or(weekly_default),
                config.generation.weeks_per_semester,
            )?;
            (Some(DocumentKind::Schedule), serde_json::to_value(weeks)?)
        }
    };
    Ok(produced)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    observability::init();

    let args = Args::parse();
    let config = load_config(args.config.clone()).context("Failed to load config")?;

    let (kind, body) = execute(&args.command, &config).await?;
    print_json(&body)?;

    if let (true, Some(kind)) = (args.save, kind) {
        let store = SqliteDocumentStore::open(&config.app.database_path)
            .context("Failed to open document store")?;
        let mut doc = NewDocument::new(kind, args.subject.as_str(), &body)?;
        if let Some(owner) = &args.owner {
            doc = doc.owned_by(owner.as_str());
        }
        let id = store.create(doc)?;
        tracing::info!("Saved {:?} document {}", kind, id);
    }

    Ok(())
}
