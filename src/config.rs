//! Command line and environment configuration

use clap::{Args, Parser, Subcommand};
use uuid::Uuid;

use crate::models::Role;
use crate::workflow::Authority;

#[derive(Debug, Parser)]
#[command(name = "actionlog", version, about = "Action log tracking and approval service")]
pub struct Config {
    /// SQLite database URL
    #[arg(
        long,
        env = "DATABASE_URL",
        default_value = "sqlite:actionlog.db?mode=rwc",
        global = true
    )]
    pub database_url: String,

    /// Address to listen on
    #[arg(long, env = "BIND_ADDR", default_value = "0.0.0.0:3000", global = true)]
    pub bind: String,

    /// Maximum pooled database connections
    #[arg(long, env = "DATABASE_MAX_CONNECTIONS", default_value_t = 5, global = true)]
    pub max_connections: u32,

    /// Tracing filter directives
    #[arg(
        long,
        env = "RUST_LOG",
        default_value = "actionlog=debug,tower_http=debug",
        global = true
    )]
    pub log_filter: String,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Run the HTTP server (default)
    Serve,
    /// Create a user, typically the first super admin
    CreateUser(CreateUserArgs),
}

#[derive(Debug, Args)]
pub struct CreateUserArgs {
    #[arg(long)]
    pub username: String,

    #[arg(long, default_value = "")]
    pub email: String,

    #[arg(long, default_value = "")]
    pub first_name: String,

    #[arg(long, default_value = "")]
    pub last_name: String,

    /// One of economist, senior_economist, principal_economist,
    /// assistant_commissioner, commissioner, super_admin
    #[arg(long, default_value = "super_admin")]
    pub role: Role,

    /// Approval authorities, comma separated
    #[arg(long, value_delimiter = ',')]
    pub authorities: Vec<Authority>,

    #[arg(long)]
    pub designation: Option<String>,

    #[arg(long)]
    pub department: Option<Uuid>,

    #[arg(long)]
    pub unit: Option<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::try_parse_from(["actionlog"]).unwrap();
        assert_eq!(config.max_connections, 5);
        assert!(config.command.is_none());
    }

    #[test]
    fn test_serve_bind() {
        let config = Config::try_parse_from(["actionlog", "serve", "--bind", "127.0.0.1:8080"]).unwrap();
        assert_eq!(config.bind, "127.0.0.1:8080");
        assert!(matches!(config.command, Some(Command::Serve)));
    }

    #[test]
    fn test_create_user_parses_role_and_authorities() {
        let config = Config::try_parse_from([
            "actionlog",
            "create-user",
            "--username",
            "mwangi",
            "--role",
            "commissioner",
            "--authorities",
            "commissioner,assistant_commissioner",
        ])
        .unwrap();
        match config.command {
            Some(Command::CreateUser(args)) => {
                assert_eq!(args.username, "mwangi");
                assert_eq!(args.role, Role::Commissioner);
                assert_eq!(
                    args.authorities,
                    vec![Authority::Commissioner, Authority::AssistantCommissioner]
                );
            }
            other => panic!("Expected create-user, got {:?}", other),
        }
    }

    #[test]
    fn test_rejects_unknown_role() {
        assert!(Config::try_parse_from(["actionlog", "create-user", "--username", "x", "--role", "chief"]).is_err());
    }
}
