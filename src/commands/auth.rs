use anyhow::{Context, bail};
use crm_auth::{CrmClient, LoginRequest, RegisterRequest};

use crate::cli::{LoginArgs, RegisterArgs};
use crate::output;

fn password(given: Option<String>) -> anyhow::Result<String> {
    match given {
        Some(password) if !password.is_empty() => Ok(password),
        _ => bail!("A password is required (--password or CRM_PASSWORD)"),
    }
}

pub async fn login(client: &CrmClient, args: LoginArgs) -> anyhow::Result<()> {
    let credentials = LoginRequest::new(args.username, password(args.password)?);
    let user = client
        .session()
        .login(&credentials)
        .await
        .context("Login failed")?;

    println!("Signed in as {}", user.display_name());
    Ok(())
}

pub async fn register(client: &CrmClient, args: RegisterArgs) -> anyhow::Result<()> {
    let profile = RegisterRequest {
        username: args.username,
        email: args.email,
        password: password(args.password)?,
        first_name: args.first_name,
        last_name: args.last_name,
        roles: (!args.roles.is_empty()).then_some(args.roles),
        confirm_password: args.confirm_password,
    };

    let user = client
        .session()
        .register(&profile)
        .await
        .context("Registration failed")?;

    println!("Account created, signed in as {}", user.display_name());
    Ok(())
}

pub async fn logout(client: &CrmClient) -> anyhow::Result<()> {
    client.session().logout().await;
    println!("Signed out");
    Ok(())
}

pub fn whoami(client: &CrmClient) -> anyhow::Result<()> {
    let state = client.session().state();
    match state.user() {
        Some(user) if state.is_authenticated() => output::print_user(user),
        _ => println!("Not signed in"),
    }
    Ok(())
}

pub async fn refresh(client: &CrmClient) -> anyhow::Result<()> {
    let user = client
        .session()
        .refresh_auth()
        .await
        .context("Could not refresh the session")?;

    println!("Session refreshed for {}", user.display_name());
    Ok(())
}
