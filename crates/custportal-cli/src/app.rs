//! Application state and command handlers.
//!
//! Each handler corresponds to one view of the customer portal: sign-in,
//! sign-up, the dashboard with its customer list, and the create/update/
//! delete drawers.

use std::io::{self, Write};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use tracing::{debug, info, warn};

use custportal_core::models::{
    CustomerRegistrationRequest, CustomerUpdateRequest, Gender, UsernamePassword, Validate,
};
use custportal_core::utils::{format_expiry, truncate_string};
use custportal_core::{
    ApiClient, Config, GuardOutcome, Route, RouteGuard, SessionManager, TokenStore,
};

/// Environment variable checked before prompting for a password
const PASSWORD_ENV: &str = "CUSTPORTAL_PASSWORD";

/// Column widths for the customer list
const NAME_WIDTH: usize = 15;
const EMAIL_WIDTH: usize = 28;

pub struct App {
    config: Config,
    manager: Arc<SessionManager>,
    guard: RouteGuard,
}

/// Fields shared by `sign-up` and `customers create`
pub struct NewCustomer {
    pub name: String,
    pub email: String,
    pub age: u32,
    pub gender: Gender,
}

impl App {
    /// Build the session manager from config and restore any persisted session
    pub fn new(config: Config) -> Result<Self> {
        debug!(api = %config.api_base_url, store = %config.token_store, "App::new() starting");

        let store = config.token_store()?;
        Self::with_store(config, store)
    }

    fn with_store(config: Config, store: Arc<dyn TokenStore>) -> Result<Self> {
        let api = ApiClient::with_timeout(&config.api_base_url, store, config.request_timeout())
            .context("Failed to create API client")?;
        let manager = Arc::new(SessionManager::new(api));
        manager.restore_from_storage();
        let guard = RouteGuard::new(Arc::clone(&manager));

        Ok(Self {
            config,
            manager,
            guard,
        })
    }

    // =========================================================================
    // Authentication
    // =========================================================================

    pub async fn sign_in(&mut self, username: Option<String>) -> Result<()> {
        if let GuardOutcome::Redirect(to) = self.guard.navigate(Route::SignIn.path(), |r| r) {
            if let Some(session) = self.manager.current() {
                println!("Already signed in as {}.", session.subject);
            }
            return self.open(to.path()).await;
        }

        println!("=== {} ===\n", Route::SignIn.title());
        let username = match username.or_else(|| self.config.last_username.clone()) {
            Some(username) => username,
            None => prompt("Email: ")?,
        };
        let credentials = UsernamePassword::new(username, read_password()?);
        ensure_valid(&credentials)?;

        let session = self
            .manager
            .sign_in(&credentials)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        info!("Sign-in successful");

        self.config.last_username = Some(credentials.username);
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!("Signed in as {}.\n", session.subject);
        self.open(Route::Dashboard.path()).await
    }

    pub async fn sign_up(&mut self, customer: NewCustomer) -> Result<()> {
        if let GuardOutcome::Redirect(to) = self.guard.navigate(Route::SignUp.path(), |r| r) {
            return self.open(to.path()).await;
        }

        println!("=== {} ===\n", Route::SignUp.title());
        let registration = customer.into_registration(read_password()?);
        ensure_valid(&registration)?;

        let session = self
            .manager
            .sign_up(&registration)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;

        self.config.last_username = Some(session.subject.clone());
        if let Err(e) = self.config.save() {
            warn!(error = %e, "Failed to save config");
        }

        println!("Welcome, {}! Your account was created.\n", registration.name);
        self.open(Route::Dashboard.path()).await
    }

    pub fn sign_out(&self) {
        self.manager.sign_out();
        println!("Signed out.");
    }

    pub fn status(&self) {
        if !self.manager.is_authenticated() {
            println!("Not signed in.");
            return;
        }
        if let Some(session) = self.manager.current() {
            let scopes: Vec<&str> = session.scopes.iter().map(String::as_str).collect();
            println!("Signed in as {}", session.subject);
            println!("  Roles:   {}", scopes.join(", "));
            println!("  Expires: {}", format_expiry(session.expires_at, Utc::now()));
        }
        println!("  API:     {}", self.manager.api().base_url());
    }

    // =========================================================================
    // Views
    // =========================================================================

    /// Resolve a path through the route guard and render the resulting view
    pub async fn open(&self, path: &str) -> Result<()> {
        match self.guard.navigate(path, |route| route) {
            GuardOutcome::Redirect(to) => {
                debug!(from = path, %to, "Redirected");
                println!("Redirected to {} ({}).", to, to.title());
                if to == Route::SignIn {
                    println!("Run `custportal sign-in` to continue.");
                }
                Ok(())
            }
            GuardOutcome::Render(Route::Dashboard) => self.render_dashboard().await,
            GuardOutcome::Render(route) => {
                println!("{}", route.title());
                Ok(())
            }
        }
    }

    /// Fail unless the dashboard guard lets us through
    fn require_dashboard(&self) -> Result<()> {
        match self.guard.check(|| ()) {
            GuardOutcome::Render(()) => Ok(()),
            GuardOutcome::Redirect(to) => {
                bail!("Not signed in (redirected to {}). Run `custportal sign-in` first.", to)
            }
        }
    }

    async fn render_dashboard(&self) -> Result<()> {
        let customers = self.manager.api().get_customers().await?;
        if let Some(session) = self.manager.current() {
            println!("{} - {}", Route::Dashboard.title(), session.subject);
        }

        if customers.is_empty() {
            println!("No customers available");
            return Ok(());
        }

        println!(
            "{:>5}  {:<name$}  {:<email$}  {:>3}  {:<6}  {}",
            "ID", "NAME", "EMAIL", "AGE", "GENDER", "IMAGE",
            name = NAME_WIDTH,
            email = EMAIL_WIDTH
        );
        for customer in &customers {
            println!(
                "{:>5}  {:<name$}  {:<email$}  {:>3}  {:<6}  {}",
                customer.id,
                truncate_string(&customer.name, NAME_WIDTH),
                truncate_string(&customer.email, EMAIL_WIDTH),
                customer.age,
                customer.gender.display_name(),
                if customer.has_profile_image() { "yes" } else { "-" },
                name = NAME_WIDTH,
                email = EMAIL_WIDTH
            );
        }
        println!("\n{} customer(s)", customers.len());
        Ok(())
    }

    // =========================================================================
    // Customers
    // =========================================================================

    pub async fn list_customers(&self) -> Result<()> {
        self.require_dashboard()?;
        self.render_dashboard().await
    }

    pub async fn show_customer(&self, id: i64) -> Result<()> {
        self.require_dashboard()?;
        let customer = self.manager.api().get_customer(id).await?;
        println!("{}", customer.summary());
        println!("  Username: {}", customer.username);
        println!("  Roles:    {}", customer.roles.join(", "));
        println!("  Image:    {}", self.manager.api().profile_image_url(id));
        Ok(())
    }

    pub async fn create_customer(&self, customer: NewCustomer) -> Result<()> {
        let registration = customer.into_registration(read_password()?);
        ensure_valid(&registration)?;

        self.manager
            .api()
            .create_customer(&registration)
            .await
            .map_err(|e| anyhow::anyhow!(e.user_message()))?;
        println!("Customer saved: {} was successfully saved", registration.name);
        Ok(())
    }

    pub async fn update_customer(&self, id: i64, update: CustomerUpdateRequest) -> Result<()> {
        self.require_dashboard()?;
        if update.is_empty() {
            bail!("Nothing to update: pass --name, --email or --age");
        }
        ensure_valid(&update)?;

        self.manager.api().update_customer(id, &update).await?;
        println!("Customer updated: #{} was successfully updated", id);
        Ok(())
    }

    pub async fn delete_customer(&self, id: i64) -> Result<()> {
        self.require_dashboard()?;
        self.manager.api().delete_customer(id).await?;
        println!("Customer deleted: #{} was successfully deleted", id);
        Ok(())
    }

    pub async fn upload_image(&self, id: i64, file: &Path) -> Result<()> {
        self.require_dashboard()?;
        let bytes = std::fs::read(file)
            .with_context(|| format!("Failed to read {}", file.display()))?;
        let file_name = file
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "profile-image".to_string());

        self.manager
            .api()
            .upload_profile_image(id, &file_name, bytes)
            .await
            .context("Profile image failed to upload")?;
        println!("Profile image uploaded");
        Ok(())
    }

    pub fn image_url(&self, id: i64) {
        println!("{}", self.manager.api().profile_image_url(id));
    }
}

impl NewCustomer {
    fn into_registration(self, password: String) -> CustomerRegistrationRequest {
        CustomerRegistrationRequest {
            name: self.name,
            email: self.email,
            password,
            age: self.age,
            gender: self.gender,
        }
    }
}

fn ensure_valid(form: &impl Validate) -> Result<()> {
    let errors = form.validate();
    if errors.is_empty() {
        return Ok(());
    }
    for error in &errors {
        eprintln!("  {}", error);
    }
    bail!("Please fix {} field(s) and try again", errors.len())
}

fn prompt(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

fn read_password() -> Result<String> {
    match std::env::var(PASSWORD_ENV) {
        Ok(password) if !password.is_empty() => Ok(password),
        _ => Ok(rpassword::prompt_password("Password: ")?),
    }
}
