//! Interactive prompts for the login and registration forms.

use std::io::{self, BufRead, Write};

use anyhow::Result;
use taskdesk_core::auth::Registration;

fn read_line(label: &str) -> Result<String> {
    print!("{}", label);
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().lock().read_line(&mut input)?;
    Ok(input.trim().to_string())
}

/// Prompt for an email, offering `default` on an empty answer
pub fn email(default: Option<&str>) -> Result<String> {
    let answer = match default {
        Some(last) => {
            let input = read_line(&format!("Email [{}]: ", last))?;
            if input.is_empty() {
                last.to_string()
            } else {
                input
            }
        }
        None => read_line("Email: ")?,
    };
    if answer.is_empty() {
        anyhow::bail!("Email is required");
    }
    Ok(answer)
}

pub fn password(label: &str) -> Result<String> {
    Ok(rpassword::prompt_password(label)?)
}

/// Collect the sign-up form. Matching passwords are checked by the core.
pub fn registration() -> Result<Registration> {
    Ok(Registration {
        email: email(None)?,
        first_name: read_line("First name: ")?,
        last_name: read_line("Last name: ")?,
        phone_number: read_line("Phone number: ")?,
        password: password("Password: ")?,
        password2: password("Confirm password: ")?,
    })
}
