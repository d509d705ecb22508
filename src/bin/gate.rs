use clap::{Parser, Subcommand};
use modelgate::sdk::{Client, ClientConfig, MockConfig};
use modelgate::{EntityRecord, ListQuery};
use serde_json::Value;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "http://127.0.0.1:8069")]
    url: String,

    #[arg(short, long)]
    token: Option<String>,

    /// Run against deterministic synthetic data instead of a live gateway.
    #[arg(long)]
    mock: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Clone)]
enum Commands {
    Models,
    List {
        model: String,
        #[arg(short, long)]
        limit: Option<usize>,
        #[arg(short, long)]
        offset: Option<usize>,
        #[arg(short, long)]
        search: Option<String>,
    },
    Get { model: String, id: i64 },
    Create { model: String, values: String },
    Update { model: String, id: i64, values: String },
    Delete { model: String, id: i64 },
}

fn parse_values(raw: &str) -> anyhow::Result<EntityRecord> {
    match serde_json::from_str::<Value>(raw)? {
        Value::Object(map) => Ok(map),
        _ => anyhow::bail!("values must be a JSON object"),
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = ClientConfig::new(&cli.url);
    if let Some(token) = &cli.token {
        config = config.token(token);
    }
    if cli.mock {
        config = config.mock(MockConfig::default());
    }
    let client = Client::new(config)?;

    match cli.command {
        Commands::Models => {
            let models = client.models().await?;
            println!("{}", serde_json::to_string_pretty(&models)?);
        }
        Commands::List {
            model,
            limit,
            offset,
            search,
        } => {
            let mut query = ListQuery::default();
            if let Some(limit) = limit {
                query = query.limit(limit);
            }
            if let Some(offset) = offset {
                query = query.offset(offset);
            }
            if let Some(search) = &search {
                query = query.search(search);
            }
            let page = client.list(&model, &query).await?;
            println!("{}", serde_json::to_string_pretty(&page)?);
        }
        Commands::Get { model, id } => {
            let record = client.get(&model, id, None).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Create { model, values } => {
            let record = client.create(&model, parse_values(&values)?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Update { model, id, values } => {
            let record = client.update(&model, id, parse_values(&values)?).await?;
            println!("{}", serde_json::to_string_pretty(&record)?);
        }
        Commands::Delete { model, id } => {
            let receipt = client.delete(&model, id).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }

    Ok(())
}
