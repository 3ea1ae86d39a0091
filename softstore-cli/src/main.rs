use clap::{Parser, Subcommand, ValueEnum};
use serde_json::Value;
use softstore::store::Visibility;
use softstore::{CollectionSchema, DocStore, Repository};
use std::path::PathBuf;
use std::process;

/// softstore CLI - inspect and maintain a softstore database
#[derive(Parser)]
#[command(name = "softstore", version, about)]
struct Cli {
    /// Path to the store database (default: ./softstore.db)
    #[arg(long, default_value = "softstore.db")]
    db: PathBuf,

    /// Output format
    #[arg(long, default_value = "pretty")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Pretty,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Get a single document by ID
    Get {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
        /// Look the document up on the soft-deleted side
        #[arg(long)]
        deleted: bool,
    },

    /// List documents in a collection
    List {
        /// Collection name
        collection: String,
        /// List soft-deleted documents instead of active ones
        #[arg(long)]
        deleted: bool,
        /// Maximum number of documents to return
        #[arg(long)]
        limit: Option<usize>,
        /// Number of documents to skip
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },

    /// Soft-delete a document
    Trash {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
        /// Actor recorded as the deleter
        #[arg(long)]
        actor: String,
    },

    /// Restore a soft-deleted document
    Restore {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
        /// Actor recorded on the restored document
        #[arg(long)]
        actor: String,
    },

    /// Permanently remove a soft-deleted document
    Purge {
        /// Collection name
        collection: String,
        /// Document ID
        id: String,
    },

    /// Permanently remove every soft-deleted document in a collection
    PurgeAll {
        /// Collection name
        collection: String,
    },

    /// Show active/deleted counts per collection
    Stats,
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = DocStore::open(&cli.db)?;

    match cli.command {
        Command::Get {
            collection,
            id,
            deleted,
        } => {
            let visibility = if deleted {
                Visibility::Deleted
            } else {
                Visibility::Active
            };
            let record = store
                .get(&collection, &id, visibility)?
                .ok_or_else(|| format!("Document not found: {collection}/{id}"))?;
            print_output(&record.to_json()?, &cli.format);
        }

        Command::List {
            collection,
            deleted,
            limit,
            offset,
        } => {
            let records = store.list(&collection, deleted, limit, offset)?;
            let items: Vec<Value> = records
                .iter()
                .filter_map(|record| record.to_json().ok())
                .collect();
            print_output(&Value::Array(items), &cli.format);
        }

        Command::Trash {
            collection,
            id,
            actor,
        } => {
            let repo = dynamic_repo(&store, &collection)?;
            let doc = repo.soft_delete(&id, &actor)?;
            print_output(&serde_json::to_value(&doc)?, &cli.format);
        }

        Command::Restore {
            collection,
            id,
            actor,
        } => {
            let repo = dynamic_repo(&store, &collection)?;
            let doc = repo.restore(&id, &actor)?;
            print_output(&serde_json::to_value(&doc)?, &cli.format);
        }

        Command::Purge { collection, id } => {
            let repo = dynamic_repo(&store, &collection)?;
            let doc = repo.hard_delete(&id)?;
            print_output(
                &serde_json::json!({ "ok": true, "purged": doc.id }),
                &cli.format,
            );
        }

        Command::PurgeAll { collection } => {
            let repo = dynamic_repo(&store, &collection)?;
            let purged = repo.purge_soft_deleted()?;
            print_output(
                &serde_json::json!({ "ok": true, "purged_count": purged }),
                &cli.format,
            );
        }

        Command::Stats => {
            let mut collections = serde_json::Map::new();
            for name in store.collections()? {
                let active = store.count(&name, false)?;
                let deleted = store.count(&name, true)?;
                collections.insert(
                    name,
                    serde_json::json!({ "active": active, "deleted": deleted }),
                );
            }
            print_output(&Value::Object(collections), &cli.format);
        }
    }

    Ok(())
}

/// Lifecycle operations need no declared fields, so a bare schema is enough
/// for any collection named on the command line.
fn dynamic_repo<'a>(
    store: &'a DocStore,
    collection: &str,
) -> softstore::Result<Repository<'a, Value>> {
    Repository::new(store, CollectionSchema::new(collection))
}

fn print_output(value: &Value, format: &OutputFormat) {
    match format {
        OutputFormat::Json => {
            println!("{value}");
        }
        OutputFormat::Pretty => {
            println!("{}", serde_json::to_string_pretty(value).unwrap());
        }
    }
}
