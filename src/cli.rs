//! Command line definitions for the `crm` binary.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use crm_customers::{CustomerSource, CustomerStatus, SortDirection};

/// Terminal client for the CRM services
#[derive(Parser, Debug)]
#[command(name = "crm")]
#[command(about = "Sign in to the CRM and work with customers from the terminal")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to config.toml in the platform config directory)
    #[arg(long, global = true, env = "CRM_CONFIG")]
    pub config: Option<PathBuf>,

    /// Directory holding the encrypted token store
    #[arg(long, global = true, env = "CRM_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Sign in and store the session
    Login(LoginArgs),
    /// Create an account and sign in
    Register(RegisterArgs),
    /// Forget the stored session
    Logout,
    /// Show the signed-in user
    Whoami,
    /// Renew the access token and reload the profile
    Refresh,
    /// Work with customers
    #[command(subcommand)]
    Customers(CustomerCommands),
}

#[derive(Args, Debug)]
pub struct LoginArgs {
    pub username: String,

    #[arg(long, env = "CRM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,
}

#[derive(Args, Debug)]
pub struct RegisterArgs {
    pub username: String,

    #[arg(long)]
    pub email: String,

    #[arg(long)]
    pub first_name: String,

    #[arg(long)]
    pub last_name: String,

    #[arg(long, env = "CRM_PASSWORD", hide_env_values = true)]
    pub password: Option<String>,

    /// Must match the password when given
    #[arg(long)]
    pub confirm_password: Option<String>,

    /// Requested roles (the service may ignore them)
    #[arg(long = "role")]
    pub roles: Vec<String>,
}

#[derive(Subcommand, Debug)]
pub enum CustomerCommands {
    /// List customers page by page
    List {
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
        #[arg(long, default_value = "createdAt")]
        sort_by: String,
        #[arg(long, default_value = "desc")]
        sort_dir: SortDirection,
    },
    /// Search by name, email or company
    Search {
        term: String,
        #[arg(long, default_value_t = 0)]
        page: u32,
        #[arg(long, default_value_t = 20)]
        size: u32,
    },
    /// Show one customer
    Get {
        /// Customer id
        #[arg(required_unless_present = "email", conflicts_with = "email")]
        id: Option<i64>,
        /// Look the customer up by email address instead
        #[arg(long)]
        email: Option<String>,
    },
    /// Create a customer
    Create(CreateCustomerArgs),
    /// Change a customer's status
    Status { id: i64, status: CustomerStatus },
    /// Delete a customer
    Delete { id: i64 },
    /// Show customer counts
    Stats,
}

#[derive(Args, Debug)]
pub struct CreateCustomerArgs {
    #[arg(long)]
    pub first_name: String,
    #[arg(long)]
    pub last_name: String,
    #[arg(long)]
    pub email: String,
    #[arg(long)]
    pub phone: Option<String>,
    #[arg(long)]
    pub company: Option<String>,
    #[arg(long)]
    pub job_title: Option<String>,
    #[arg(long)]
    pub city: Option<String>,
    #[arg(long)]
    pub country: Option<String>,
    #[arg(long)]
    pub status: Option<CustomerStatus>,
    #[arg(long)]
    pub source: Option<CustomerSource>,
    #[arg(long)]
    pub assigned_to: Option<String>,
    #[arg(long)]
    pub notes: Option<String>,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parses_customer_status() {
        let cli = Cli::try_parse_from(["crm", "customers", "status", "7", "vip"]).unwrap();
        match cli.command {
            Commands::Customers(CustomerCommands::Status { id, status }) => {
                assert_eq!(id, 7);
                assert_eq!(status, CustomerStatus::Vip);
            }
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[test]
    fn test_get_needs_id_or_email() {
        assert!(Cli::try_parse_from(["crm", "customers", "get"]).is_err());
        assert!(Cli::try_parse_from(["crm", "customers", "get", "--email", "a@b.test"]).is_ok());
    }
}
