//! Administrative commands run against the service's database.

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};

use task_api::application::credentials::PasswordHasher;
use task_api::application::user_service::{UserError, UserService, UserServiceImpl};
use task_api::config::{self, Config};
use task_api::domain::repository::UserRepository;
use task_api::domain::user::GroupId;
use task_api::domain::validation::Payload;
use task_api::infrastructure::sqlite_user_repo::SqliteUserRepository;

#[derive(Parser)]
#[command(name = "manage", about = "Administer users and groups of the task API")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create a group (or look up an existing one) and print its id.
    CreateGroup { name: String },
    /// Create an active superuser and print its access token.
    CreateSuperuser {
        #[arg(long)]
        username: String,
        #[arg(long)]
        email: String,
        #[arg(long)]
        password: String,
        #[arg(long = "group")]
        groups: Vec<GroupId>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_env()?;
    config::init_tracing("warn");

    let repo = SqliteUserRepository::connect(&config.database_url).await?;
    repo.init().await?;

    match cli.command {
        Command::CreateGroup { name } => {
            let group = repo.ensure_group(&name).await?;
            println!("{}\t{}", group.id, group.name);
        }
        Command::CreateSuperuser { username, email, password, groups } => {
            let service = UserServiceImpl::new(repo, PasswordHasher::default());
            let mut payload = Payload::new();
            payload.insert("username".into(), username.into());
            payload.insert("email".into(), email.into());
            payload.insert("password".into(), password.into());
            payload.insert("groups".into(), groups.into());
            payload.insert("is_staff".into(), true.into());
            payload.insert("is_superuser".into(), true.into());
            let user = service.create(&payload).await.map_err(describe)?;
            let token = service
                .repository()
                .token_for(user.id)
                .await?
                .context("token missing for newly created user")?;
            println!("{token}");
        }
    }
    Ok(())
}

fn describe(err: UserError) -> anyhow::Error {
    match err {
        UserError::Validation(errors) => {
            let details = serde_json::to_string(&errors).unwrap_or_default();
            anyhow!("invalid user: {details}")
        }
        other => other.into(),
    }
}
