//! Login, registration and profile commands.

use bamazon_client::ShopContext;
use bamazon_client::auth::{RegistrationForm, User};

use super::{CliError, prompt_line};

/// Log in, prompting for the password when it was not given.
pub async fn login(
    ctx: &ShopContext,
    username: &str,
    password: Option<String>,
) -> Result<String, CliError> {
    let password = match password {
        Some(password) => password,
        None => prompt_line("Password: ")?,
    };

    let user = ctx.auth().login(username, &password).await?;
    // Pick up any server-side cart for the new session.
    ctx.cart().refresh().await?;

    Ok(format!("Logged in as {}", user.display_name()))
}

/// Registration details from the command line.
#[derive(Debug, Default)]
pub struct RegisterArgs {
    pub username: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub password: Option<String>,
}

/// Create an account and log in.
pub async fn register(ctx: &ShopContext, args: RegisterArgs) -> Result<String, CliError> {
    let (password, password_confirm) = match args.password {
        Some(password) => (password.clone(), password),
        None => (prompt_line("Password: ")?, prompt_line("Confirm password: ")?),
    };

    let form = RegistrationForm {
        username: args.username,
        email: args.email.unwrap_or_default(),
        password,
        password_confirm,
        first_name: args.first_name.unwrap_or_default(),
        last_name: args.last_name.unwrap_or_default(),
    };

    let user = ctx.auth().register(&form).await?;
    Ok(format!(
        "Welcome, {}! Your account ({}) is ready.",
        user.display_name(),
        user.email
    ))
}

pub async fn logout(ctx: &ShopContext) -> String {
    ctx.logout().await;
    "Logged out".to_string()
}

pub async fn profile(ctx: &ShopContext) -> Result<String, CliError> {
    if !ctx.auth().is_authenticated() {
        return Err(CliError::Redirect("Please log in first".to_string()));
    }
    let user = ctx.auth().profile().await?;
    Ok(render_profile(&user))
}

fn render_profile(user: &User) -> String {
    let mut lines = vec![
        format!("Username: {}", user.username),
        format!("Name:     {}", user.full_name().unwrap_or_else(|| "-".to_string())),
        format!("Email:    {}", if user.email.is_empty() { "-" } else { &user.email }),
    ];
    if user.is_staff {
        lines.push("Role:     staff".to_string());
    }
    lines.join("\n")
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_profile() {
        let user: User = serde_json::from_value(serde_json::json!({
            "id": 1,
            "username": "alice",
            "email": "",
            "first_name": "Alice",
            "last_name": "Liddell",
            "is_staff": true,
        }))
        .unwrap();

        let text = render_profile(&user);
        assert!(text.contains("Name:     Alice Liddell"));
        assert!(text.contains("Email:    -"));
        assert!(text.ends_with("Role:     staff"));
    }
}
