use anyhow::{Context, bail};
use crm_auth::CrmClient;
use crm_customers::{CreateCustomerRequest, CustomerClient, PageRequest};

use crate::cli::{CreateCustomerArgs, CustomerCommands};
use crate::output;

pub async fn run(client: &CrmClient, command: CustomerCommands) -> anyhow::Result<()> {
    if !client.session().is_authenticated() {
        bail!("Not signed in. Run `crm login <username>` first.");
    }

    let customers = CustomerClient::from_crm(client);

    match command {
        CustomerCommands::List {
            page,
            size,
            sort_by,
            sort_dir,
        } => {
            let request = PageRequest {
                page,
                size,
                sort_by,
                sort_dir,
            };
            let page = customers
                .list(&request)
                .await
                .context("Failed to list customers")?;
            output::print_customer_page(&page);
        }
        CustomerCommands::Search { term, page, size } => {
            let page = customers
                .search(&term, page, size)
                .await
                .context("Search failed")?;
            output::print_customer_page(&page);
        }
        CustomerCommands::Get { id, email } => {
            let found = match (id, email) {
                (Some(id), _) => customers.get(id).await,
                (None, Some(email)) => customers.get_by_email(&email).await,
                (None, None) => bail!("Give a customer id or --email"),
            }
            .context("Failed to load customer")?;

            match found {
                Some(customer) => output::print_customer(&customer),
                None => bail!("No such customer"),
            }
        }
        CustomerCommands::Create(args) => {
            let created = customers
                .create(&create_request(args))
                .await
                .context("Failed to create customer")?;
            println!("Created customer #{}", created.id);
            output::print_customer(&created);
        }
        CustomerCommands::Status { id, status } => {
            let updated = customers
                .update_status(id, status)
                .await
                .context("Failed to update status")?;
            println!("Customer #{} is now {}", updated.id, status);
        }
        CustomerCommands::Delete { id } => {
            customers
                .delete(id)
                .await
                .context("Failed to delete customer")?;
            println!("Deleted customer #{id}");
        }
        CustomerCommands::Stats => {
            let stats = customers
                .statistics()
                .await
                .context("Failed to load statistics")?;
            output::print_statistics(&stats);
        }
    }

    Ok(())
}

fn create_request(args: CreateCustomerArgs) -> CreateCustomerRequest {
    CreateCustomerRequest {
        first_name: args.first_name,
        last_name: args.last_name,
        email: args.email,
        phone: args.phone,
        company: args.company,
        job_title: args.job_title,
        city: args.city,
        country: args.country,
        status: args.status,
        source: args.source,
        assigned_to: args.assigned_to,
        notes: args.notes,
        ..Default::default()
    }
}
