//! Audit Trail - append-only change history with a read-only reporting API.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use audit_trail::audit::{ActorContext, AuditError, AuditFilter, AuditLog, EntityRegistry};
use audit_trail::blog::{self, Blog, BlogError, NewComment, NewPost, PostPatch, PostStatus};
use audit_trail::config::{AppConfig, ConfigError, ConfigLoader};
use audit_trail::display;
use audit_trail::server::{ReportServer, ServerError};

#[derive(Parser)]
#[command(
    name = "audit-trail",
    about = "Append-only change history with a read-only reporting API",
    version
)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short = 'v', long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Config file to load instead of the default search paths.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Audit database file, overriding the config.
    #[arg(short, long, global = true)]
    database: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Serve the read-only report API.
    Serve {
        /// Host to bind to.
        #[arg(long)]
        host: Option<String>,
        /// Port to listen on.
        #[arg(short, long)]
        port: Option<u16>,
    },
    /// Show the latest records across all entities.
    Recent {
        /// Number of records to show.
        #[arg(short, long)]
        limit: Option<usize>,
    },
    /// Show the history of one entity, oldest first.
    Entity {
        /// Entity type tag, e.g. blog.post.
        entity_type: String,
        /// Entity key.
        entity_id: String,
    },
    /// Show everything one actor did, newest first.
    Actor {
        /// Actor identifier.
        actor_id: String,
    },
    /// List records page by page, newest first.
    List {
        /// Only records with this action.
        #[arg(short, long)]
        action: Option<String>,
        /// Only records for this entity type.
        #[arg(short, long)]
        entity_type: Option<String>,
        /// Page number, starting at 1.
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// Records per page.
        #[arg(long)]
        per_page: Option<u32>,
    },
    /// Show one record and the current state of its entity.
    Show {
        /// Record id.
        id: i64,
    },
    /// Show aggregate counts.
    Stats,
    /// Run a sample blog lifecycle and print its audit trail.
    Demo {
        /// Actor to attribute the changes to.
        #[arg(long, default_value = "demo-user")]
        actor: String,
    },
}

#[derive(thiserror::Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Audit(#[from] AuditError),

    #[error(transparent)]
    Blog(#[from] BlogError),

    #[error(transparent)]
    Server(#[from] ServerError),

    #[error("Audit record {0} not found")]
    RecordNotFound(i64),

    #[error("per_page must be between 1 and {0}")]
    PageSize(u32),
}

fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig, ConfigError> {
    match path {
        Some(path) => ConfigLoader::with_path(path).load(),
        None => ConfigLoader::new().load(),
    }
}

fn blog_registry() -> EntityRegistry {
    let mut registry = EntityRegistry::new();
    blog::register_loaders(&mut registry);
    registry
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let config = load_config(cli.config)?;
    let database = cli.database.unwrap_or_else(|| config.database_path());
    tracing::debug!(path = %database.display(), "Opening audit log");
    let log = AuditLog::open(&database).await?;

    match cli.command {
        Commands::Serve { host, port } => {
            let mut server_config = config.server.clone();
            if let Some(host) = host {
                server_config.host = host;
            }
            if let Some(port) = port {
                server_config.port = port;
            }

            // Tables must exist for the entity loaders to resolve.
            Blog::new(log.clone(), config.hooks()).await?;

            let server =
                ReportServer::new(log, blog_registry(), config.query).with_config(server_config);
            let cancel = server.cancel_token();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    cancel.cancel();
                }
            });
            server.run().await?;
        }
        Commands::Recent { limit } => {
            let records = log
                .get_recent(limit.unwrap_or(config.query.recent_limit))
                .await?;
            display::print_records(&records);
        }
        Commands::Entity {
            entity_type,
            entity_id,
        } => {
            display::print_records(&log.get_for_entity(entity_type, entity_id).await?);
        }
        Commands::Actor { actor_id } => {
            display::print_records(&log.get_by_actor(actor_id).await?);
        }
        Commands::List {
            action,
            entity_type,
            page,
            per_page,
        } => {
            let per_page = per_page.unwrap_or(config.query.default_page_size);
            if per_page == 0 || per_page > config.query.max_page_size {
                return Err(CliError::PageSize(config.query.max_page_size));
            }
            let filter = AuditFilter::parse(action.as_deref(), entity_type.as_deref())?;
            display::print_page(&log.get_paged(filter, page, per_page).await?);
        }
        Commands::Show { id } => {
            let record = log.find(id).await?.ok_or(CliError::RecordNotFound(id))?;
            Blog::new(log.clone(), config.hooks()).await?;
            let registry = blog_registry();
            let lookup = record.clone();
            let entity = log
                .read(move |conn| registry.load_audited(conn, &lookup))
                .await?;
            display::print_record_detail(&record, entity.as_ref());
        }
        Commands::Stats => {
            display::print_stats(&log.get_stats().await?);
        }
        Commands::Demo { actor } => {
            run_demo(Blog::new(log, config.hooks()).await?, &actor).await?;
        }
    }
    Ok(())
}

async fn run_demo(blog: Blog, actor: &str) -> Result<(), CliError> {
    let ctx = ActorContext::actor(actor).with_client_agent("audit-trail-demo");

    let post = blog
        .create_post(
            ctx.clone(),
            NewPost::new(actor, "Hello audit trail", "First draft"),
        )
        .await?;
    blog.update_post(
        ctx.clone(),
        post.id,
        PostPatch::default()
            .title("Hello, audit trail")
            .status(PostStatus::Published),
    )
    .await?;
    let comment = blog
        .add_comment(ctx.clone(), NewComment::new(post.id, actor, "Nice post"))
        .await?;
    blog.edit_comment(ctx.clone(), comment.id, "Nice post!").await?;
    blog.delete_post(ctx.clone(), post.id).await?;
    blog.restore_post(ctx, post.id).await?;

    tracing::info!(post = %post.id, "Demo lifecycle complete");
    let history = blog
        .audit_log()
        .get_for_entity(blog::POST_TYPE_TAG, post.id.to_string())
        .await?;
    display::print_records(&history);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            display::print_error(&err.to_string());
            ExitCode::FAILURE
        }
    }
}
