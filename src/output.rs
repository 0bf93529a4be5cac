//! Terminal rendering of users and customers.

use crm_auth::User;
use crm_customers::{Customer, CustomerStatistics, Page};

/// Print a table with aligned columns.
///
/// `headers` and each row in `rows` must have the same length.
pub fn print_table(headers: &[&str], rows: &[Vec<String>]) {
    if rows.is_empty() {
        return;
    }

    let col_count = headers.len();
    let mut widths: Vec<usize> = headers.iter().map(|h| h.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate().take(col_count) {
            widths[i] = widths[i].max(cell.chars().count());
        }
    }

    let render = |cells: Vec<String>| {
        cells
            .iter()
            .enumerate()
            .map(|(i, c)| format!("{:<width$}", c, width = widths[i]))
            .collect::<Vec<_>>()
            .join("  ")
            .trim_end()
            .to_string()
    };

    println!("{}", render(headers.iter().map(|h| h.to_string()).collect()));
    for row in rows {
        println!("{}", render(row.iter().take(col_count).cloned().collect()));
    }
}

fn or_dash(value: Option<impl ToString>) -> String {
    value.map(|v| v.to_string()).unwrap_or_else(|| "-".to_string())
}

pub fn print_user(user: &User) {
    println!("{} ({})", user.display_name(), user.username);
    println!("  email: {}", user.email);
    if !user.primary_role.is_empty() {
        println!("  role:  {}", user.primary_role);
    }
    if user.roles.len() > 1 {
        println!("  roles: {}", user.roles.join(", "));
    }
}

pub fn print_customer_page(page: &Page<Customer>) {
    if page.is_empty() {
        println!("No customers found");
        return;
    }

    let rows: Vec<Vec<String>> = page
        .content
        .iter()
        .map(|c| {
            vec![
                c.id.to_string(),
                c.full_name(),
                c.email.clone(),
                or_dash(c.company.as_ref()),
                or_dash(c.status),
            ]
        })
        .collect();
    print_table(&["ID", "NAME", "EMAIL", "COMPANY", "STATUS"], &rows);
    println!(
        "\nPage {} of {} ({} customers)",
        page.number + 1,
        page.total_pages.max(1),
        page.total_elements
    );
}

pub fn print_customer(customer: &Customer) {
    println!("#{} {}", customer.id, customer.full_name());
    let fields = [
        ("email", Some(customer.email.clone())),
        ("phone", customer.phone.clone()),
        ("company", customer.company.clone()),
        ("job title", customer.job_title.clone()),
        ("city", customer.city.clone()),
        ("country", customer.country.clone()),
        ("status", customer.status.map(|s| s.to_string())),
        ("source", customer.source.map(|s| s.to_string())),
        ("assigned to", customer.assigned_to.clone()),
        ("orders", customer.total_orders.map(|o| o.to_string())),
        ("revenue", customer.total_revenue.map(|r| format!("{r:.2}"))),
        ("created", customer.created_at.map(|t| t.to_string())),
        ("last contact", customer.last_contact_date.map(|t| t.to_string())),
    ];
    for (label, value) in fields {
        if let Some(value) = value {
            println!("  {label:<12} {value}");
        }
    }
}

pub fn print_statistics(stats: &CustomerStatistics) {
    let rows = vec![
        vec!["total".to_string(), stats.total_customers.to_string()],
        vec!["active".to_string(), stats.active_customers.to_string()],
        vec!["inactive".to_string(), stats.inactive_customers.to_string()],
        vec!["prospect".to_string(), stats.prospect_customers.to_string()],
        vec!["lead".to_string(), stats.lead_customers.to_string()],
        vec!["vip".to_string(), stats.vip_customers.to_string()],
        vec!["from website".to_string(), stats.customers_by_website.to_string()],
        vec!["from referral".to_string(), stats.customers_by_referral.to_string()],
        vec![
            "from social media".to_string(),
            stats.customers_by_social_media.to_string(),
        ],
        vec!["from cold call".to_string(), stats.customers_by_cold_call.to_string()],
        vec!["from trade show".to_string(), stats.customers_by_trade_show.to_string()],
        vec!["other source".to_string(), stats.customers_by_other.to_string()],
    ];
    print_table(&["CUSTOMERS", "COUNT"], &rows);
}
